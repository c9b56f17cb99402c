//! Crosser lifecycle drivers.
//!
//! A crosser arrives on its side, waits for the channel, spends the crossing
//! time on it, then leaves. Arrivals are spaced by `arrival`; each crosser runs
//! on its own thread (blocking arbiter) or task (async arbiter).

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use crossing::{Arbiter, ArbiterSnapshot, AsyncArbiter, CrossingError, Passage, Side};
use serde::Serialize;

use crate::config::SimConfig;

/// Hands out crosser numbers in arrival order.
#[derive(Debug, Default)]
pub struct CrosserIds {
    last: u64,
}

impl CrosserIds {
    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Crosser {
    pub id: u64,
    pub origin: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Crossed { waited_ms: u64 },
    GaveUp { waited_ms: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CrosserReport {
    pub id: u64,
    pub origin: Side,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub crossers: Vec<CrosserReport>,
    pub arbiter: ArbiterSnapshot,
}

impl SimReport {
    pub fn gave_up(&self) -> usize {
        self.crossers
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::GaveUp { .. }))
            .count()
    }
}

/// Pre-draw every crosser so both drivers see the same arrival sequence.
fn lineup(config: &SimConfig) -> Vec<Crosser> {
    let mut ids = CrosserIds::default();
    let mut picker = config.side_picker();
    (0..config.crossers)
        .map(|_| Crosser {
            id: ids.next_id(),
            origin: picker.next_side(),
        })
        .collect()
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Map the result of a timed entry to a passage, or to the give-up outcome.
fn admitted<'a>(
    crosser: Crosser,
    entry: crossing::Result<Passage<'a>>,
) -> anyhow::Result<Result<Passage<'a>, Outcome>> {
    match entry {
        Ok(passage) => Ok(Ok(passage)),
        Err(CrossingError::TimedOut { waited, .. }) => {
            tracing::warn!(crosser = crosser.id, side = %crosser.origin, waited = ?waited, "Crosser gave up waiting for the channel");
            Ok(Err(Outcome::GaveUp {
                waited_ms: millis(waited),
            }))
        }
        Err(e) => Err(e).with_context(|| format!("crosser {} could not enter", crosser.id)),
    }
}

fn finish(crosser: Crosser, passage: Passage<'_>, waited: Duration) -> anyhow::Result<CrosserReport> {
    tracing::info!(crosser = crosser.id, "Crosser finished crossing");
    passage
        .leave()
        .with_context(|| format!("crosser {} could not leave", crosser.id))?;
    tracing::info!(crosser = crosser.id, "Crosser let go of the channel and walks away");
    Ok(CrosserReport {
        id: crosser.id,
        origin: crosser.origin,
        outcome: Outcome::Crossed {
            waited_ms: millis(waited),
        },
    })
}

fn run_blocking_crosser(
    arbiter: &Arbiter,
    crosser: Crosser,
    crossing: Duration,
    timeout: Option<Duration>,
) -> anyhow::Result<CrosserReport> {
    tracing::info!(crosser = crosser.id, side = %crosser.origin, "Crosser arrives");
    let started = Instant::now();

    let passage = match timeout {
        None => arbiter.cross(crosser.origin),
        Some(timeout) => match admitted(crosser, arbiter.cross_timeout(crosser.origin, timeout))? {
            Ok(passage) => passage,
            Err(outcome) => {
                return Ok(CrosserReport {
                    id: crosser.id,
                    origin: crosser.origin,
                    outcome,
                });
            }
        },
    };
    let waited = started.elapsed();

    tracing::info!(crosser = crosser.id, side = %crosser.origin, "Crosser starts crossing");
    thread::sleep(crossing);
    finish(crosser, passage, waited)
}

async fn run_async_crosser(
    arbiter: &AsyncArbiter,
    crosser: Crosser,
    crossing: Duration,
    timeout: Option<Duration>,
) -> anyhow::Result<CrosserReport> {
    tracing::info!(crosser = crosser.id, side = %crosser.origin, "Crosser arrives");
    let started = Instant::now();

    let passage = match timeout {
        None => arbiter.cross(crosser.origin).await,
        Some(timeout) => {
            match admitted(crosser, arbiter.cross_timeout(crosser.origin, timeout).await)? {
                Ok(passage) => passage,
                Err(outcome) => {
                    return Ok(CrosserReport {
                        id: crosser.id,
                        origin: crosser.origin,
                        outcome,
                    });
                }
            }
        }
    };
    let waited = started.elapsed();

    tracing::info!(crosser = crosser.id, side = %crosser.origin, "Crosser starts crossing");
    tokio::time::sleep(crossing).await;
    finish(crosser, passage, waited)
}

/// One OS thread per crosser.
pub fn run_threads(config: &SimConfig) -> anyhow::Result<SimReport> {
    let arbiter = Arc::new(Arbiter::new(config.capacity)?);
    let mut handles = Vec::with_capacity(config.crossers);

    for crosser in lineup(config) {
        thread::sleep(config.arrival);
        let arbiter = Arc::clone(&arbiter);
        let (crossing, timeout) = (config.crossing, config.timeout);
        let handle = thread::Builder::new()
            .name(format!("crosser-{}", crosser.id))
            .spawn(move || run_blocking_crosser(&arbiter, crosser, crossing, timeout))
            .with_context(|| format!("failed to spawn crosser {}", crosser.id))?;
        handles.push((crosser.id, handle));
    }

    let mut crossers = Vec::with_capacity(handles.len());
    for (id, handle) in handles {
        let report = handle
            .join()
            .map_err(|_| anyhow!("crosser {id} panicked"))??;
        crossers.push(report);
    }

    Ok(SimReport {
        crossers,
        arbiter: arbiter.snapshot(),
    })
}

/// One tokio task per crosser.
pub async fn run_tasks(config: &SimConfig) -> anyhow::Result<SimReport> {
    let arbiter = Arc::new(AsyncArbiter::new(config.capacity)?);
    let mut handles = Vec::with_capacity(config.crossers);

    for crosser in lineup(config) {
        tokio::time::sleep(config.arrival).await;
        let arbiter = Arc::clone(&arbiter);
        let (crossing, timeout) = (config.crossing, config.timeout);
        let handle = tokio::spawn(async move {
            run_async_crosser(&arbiter, crosser, crossing, timeout).await
        });
        handles.push((crosser.id, handle));
    }

    let mut crossers = Vec::with_capacity(handles.len());
    let results = futures::future::join_all(handles.into_iter().map(|(id, handle)| async move {
        handle
            .await
            .with_context(|| format!("crosser {id} task failed"))
    }))
    .await;
    for result in results {
        crossers.push(result??);
    }

    Ok(SimReport {
        crossers,
        arbiter: arbiter.snapshot(),
    })
}
