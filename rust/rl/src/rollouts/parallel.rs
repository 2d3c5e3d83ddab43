use super::{episode_seed, record_failure, run_episode, Episode, FailureMode, RolloutBatch, RolloutOptions};
use crate::error::{Result, RolloutError};
use crate::mdps::{BoxError, Environment, Policy};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// [`super::simulate`] spread over `workers` threads, one environment each.
///
/// Workers claim episode indices from a shared counter; results are put back
/// in index order, so the batch equals the serial one for the same seed. In
/// [`FailureMode::Abort`] the lowest failing episode is reported.
pub fn simulate_parallel<E, F, P>(
    factory: F,
    policy: &P,
    options: &RolloutOptions,
    workers: usize,
) -> Result<RolloutBatch>
where
    E: Environment + Send,
    F: Fn(usize) -> std::result::Result<E, BoxError>,
    P: Policy + Sync + ?Sized,
{
    options.validate()?;
    if workers == 0 {
        return Err(RolloutError::invalid("workers must be positive"));
    }
    let seed = options.resolve_seed();

    let envs = (0..workers.min(options.reps))
        .map(|w| factory(w).map_err(|source| RolloutError::EnvironmentSetup { worker: w, source }))
        .collect::<Result<Vec<E>>>()?;
    let environment = envs.first().map(|e| e.name()).unwrap_or_default();

    let next = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let mut results = thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, Result<Episode>)>();

        for mut env in envs {
            let tx = tx.clone();
            let (next, stop) = (&next, &stop);
            scope.spawn(move || loop {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let i = next.fetch_add(1, Ordering::AcqRel);
                if i >= options.reps {
                    break;
                }

                let r = run_episode(&mut env, policy, i, episode_seed(seed, i), options);
                if r.is_err() && options.failure_mode == FailureMode::Abort {
                    stop.store(true, Ordering::Release);
                }
                if tx.send((i, r)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        rx.into_iter().collect::<Vec<_>>()
    });
    results.sort_by_key(|(i, _)| *i);

    let mut episodes = Vec::with_capacity(results.len());
    let mut failures = vec![];
    for (_, r) in results {
        match r {
            Ok(ep) => episodes.push(ep),
            Err(e) => record_failure(e, options.failure_mode, &mut failures)?,
        }
    }

    tracing::debug!(
        env = %environment,
        workers,
        seed,
        episodes = episodes.len(),
        failed = failures.len(),
        "parallel simulation finished"
    );

    Ok(RolloutBatch {
        environment,
        policy: policy.name(),
        seed,
        max_steps: options.max_steps,
        episodes,
        failures,
    })
}
