//! Tabular and JSON persistence for rollout results.

mod cache;

pub use cache::*;

use crate::error::Result;
use crate::rollouts::{PolicySample, RolloutBatch};
use csv::Writer;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn columns(prefix: &str, n: usize) -> impl Iterator<Item = String> + '_ {
    (0..n).map(move |i| format!("{prefix}_{i}"))
}

fn cells(xs: &[f64]) -> impl Iterator<Item = String> + '_ {
    xs.iter().map(f64::to_string)
}

/// One row per step: `episode,step,state_*,action_*,reward`.
pub fn write_batch<W: Write>(batch: &RolloutBatch, out: W) -> Result<()> {
    let mut w = Writer::from_writer(out);

    let first = batch.records().next();
    let n_s = first.map_or(0, |r| r.state.len());
    let n_a = first.map_or(0, |r| r.action.len());

    let header = ["episode".to_string(), "step".to_string()]
        .into_iter()
        .chain(columns("state", n_s))
        .chain(columns("action", n_a))
        .chain(["reward".to_string()]);
    w.write_record(header)?;

    for r in batch.records() {
        let row = [r.episode.to_string(), r.step.to_string()]
            .into_iter()
            .chain(cells(&r.state))
            .chain(cells(&r.action))
            .chain([r.reward.to_string()]);
        w.write_record(row)?;
    }

    w.flush()?;
    Ok(())
}

/// One row per grid state: `state_*,mean_*,variance_*,queries`.
pub fn write_policy<W: Write>(sample: &PolicySample, out: W) -> Result<()> {
    let mut w = Writer::from_writer(out);

    let first = sample.points.first();
    let n_s = first.map_or(0, |p| p.state.len());
    let n_a = first.map_or(0, |p| p.mean.len());

    let header = columns("state", n_s)
        .chain(columns("mean", n_a))
        .chain(columns("variance", n_a))
        .chain(["queries".to_string()]);
    w.write_record(header)?;

    for p in &sample.points {
        let row = cells(&p.state)
            .chain(cells(&p.mean))
            .chain(cells(&p.variance))
            .chain([p.queries.to_string()]);
        w.write_record(row)?;
    }

    w.flush()?;
    Ok(())
}

pub fn batch_to_csv(batch: &RolloutBatch) -> Result<String> {
    let mut buf = Vec::new();
    write_batch(batch, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn policy_to_csv(sample: &PolicySample) -> Result<String> {
    let mut buf = Vec::new();
    write_policy(sample, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn write_batch_csv<P: AsRef<Path>>(batch: &RolloutBatch, path: P) -> Result<()> {
    write_batch(batch, BufWriter::new(File::create(path)?))
}

pub fn write_policy_csv<P: AsRef<Path>>(sample: &PolicySample, path: P) -> Result<()> {
    write_policy(sample, BufWriter::new(File::create(path)?))
}

pub fn save_json<T: Serialize, P: AsRef<Path>>(data: &T, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, data)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollouts::{Episode, PolicyPoint, StepRecord};

    fn batch() -> RolloutBatch {
        let steps = [(3., 1.), (2., 1.), (1., 1.)]
            .into_iter()
            .enumerate()
            .map(|(t, (s, a))| StepRecord {
                episode: 0,
                step: t,
                state: vec![s],
                action: vec![a],
                reward: 0.5 * a,
            })
            .collect();

        RolloutBatch {
            environment: "countdown".to_string(),
            policy: "fixed_action".to_string(),
            seed: 24,
            max_steps: 10,
            episodes: vec![Episode {
                index: 0,
                seed: 24,
                steps,
                terminated: true,
                terminal_state: vec![0.],
            }],
            failures: vec![],
        }
    }

    #[test]
    fn batch_csv_has_one_row_per_step() {
        insta::assert_snapshot!(batch_to_csv(&batch()).unwrap(), @r###"
        episode,step,state_0,action_0,reward
        0,0,3,1,0.5
        0,1,2,1,0.5
        0,2,1,1,0.5
        "###);
    }

    #[test]
    fn policy_csv_has_one_row_per_grid_state() {
        let sample = PolicySample {
            policy: "random_choice".to_string(),
            seed: 1,
            points: vec![PolicyPoint {
                state: vec![0.5],
                mean: vec![0.25],
                variance: vec![0.1875],
                queries: 4,
                distribution: None,
            }],
        };

        insta::assert_snapshot!(policy_to_csv(&sample).unwrap(), @r###"
        state_0,mean_0,variance_0,queries
        0.5,0.25,0.1875,4
        "###);
    }

    #[test]
    fn json_round_trips_batch_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sims.json");

        save_json(&batch(), &path).unwrap();
        assert_eq!(load_json::<RolloutBatch, _>(&path).unwrap(), batch());
    }
}
