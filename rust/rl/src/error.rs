use crate::mdps::BoxError;
use crate::rollouts::Episode;

pub type Result<T> = std::result::Result<T, RolloutError>;

#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The environment failed in `reset` (`step == 0`, no records) or in `step`.
    #[error("environment failed in episode {episode} at step {step}: {source}")]
    Environment {
        episode: usize,
        step: usize,
        #[source]
        source: BoxError,
        /// Steps recorded before the failure, kept only when partial collection was requested.
        partial: Option<Box<Episode>>,
    },

    #[error("could not create environment for worker {worker}: {source}")]
    EnvironmentSetup {
        worker: usize,
        #[source]
        source: BoxError,
    },

    #[error("policy failed in episode {episode} at step {step}: {source}")]
    Policy {
        episode: usize,
        step: usize,
        #[source]
        source: BoxError,
        partial: Option<Box<Episode>>,
    },

    #[error("policy failed at grid point {point} on query {query}: {source}")]
    PolicyQuery {
        point: usize,
        query: usize,
        #[source]
        source: BoxError,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RolloutError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Episode index of a collaborator failure.
    pub fn episode(&self) -> Option<usize> {
        match self {
            Self::Environment { episode, .. } | Self::Policy { episode, .. } => Some(*episode),
            _ => None,
        }
    }

    /// Steps collected before the failure, if partial collection was requested.
    pub fn partial(&self) -> Option<&Episode> {
        match self {
            Self::Environment { partial, .. } | Self::Policy { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}
