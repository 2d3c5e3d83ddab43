use anyhow::Context;
use clap::Parser;
use rollout::config::ExperimentConfig;
use rollout::environments::GymAdapter;
use rollout::io::{save_json, write_batch_csv, write_policy_csv, ArtifactCache};
use rollout::mdps::{Environment, TabulatedPolicy};
use rollout::rollouts::{policy_function, simulate, simulate_parallel, RolloutBatch};
use std::path::PathBuf;

/// Simulate a policy against a gym-http-api environment and sample its policy function.
#[derive(Debug, Parser)]
#[command(name = "rollout", version)]
struct Args {
    /// Experiment file (JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides the experiment's output directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overrides the number of worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Simulate even if a cached batch exists.
    #[arg(long)]
    no_cache: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = ExperimentConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(output) = args.output {
        cfg.output_dir = output;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
    cfg.validate()?;

    let policy = cfg.build_policy()?;
    let run = || -> rollout::Result<RolloutBatch> {
        let env = &cfg.environment;
        let make = |_worker: usize| -> Result<GymAdapter, rollout::mdps::BoxError> {
            GymAdapter::create(&env.server, &env.env_id, env.max_episode_steps, &env.kwargs())
        };

        if cfg.workers > 1 {
            simulate_parallel(make, &*policy, &cfg.simulation, cfg.workers)
        } else {
            let mut env = make(0).map_err(|source| rollout::RolloutError::EnvironmentSetup {
                worker: 0,
                source,
            })?;
            tracing::info!(env = %env.name(), policy = %policy.name(), "simulating");
            simulate(&mut env, &*policy, &cfg.simulation)
        }
    };

    let batch = match (&cfg.cache_dir, args.no_cache) {
        (Some(dir), false) => {
            let cache = ArtifactCache::new(dir)?;
            cache.get_or_try_insert_with(&cfg.simulation_key()?, "sims", run)?
        }
        _ => run()?,
    };

    let summary = batch.summary();
    tracing::info!(
        episodes = summary.episodes,
        failed = summary.failed,
        mean_reward = summary.mean_reward,
        std_reward = summary.std_reward,
        mean_length = summary.mean_length,
        "simulation summary"
    );
    if !batch.failures.is_empty() {
        tracing::warn!(episodes = ?batch.failed_episodes(), "some episodes failed");
    }

    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("creating {}", cfg.output_dir.display()))?;
    let out = |suffix: &str| cfg.output_dir.join(format!("{}_{suffix}", cfg.name));

    write_batch_csv(&batch, out("sims.csv"))?;
    save_json(&summary, out("summary.json"))?;

    if let Some(pf) = &cfg.policy_function {
        let sample = policy_function(&*policy, &cfg.grid()?, &pf.options)?;
        write_policy_csv(&sample, out("policy.csv"))?;
        save_json(&TabulatedPolicy::from_sample(&sample)?, out("policy_table.json"))?;
        tracing::info!(points = sample.len(), "policy function sampled");
    }

    tracing::info!(dir = %cfg.output_dir.display(), "results written");
    Ok(())
}
