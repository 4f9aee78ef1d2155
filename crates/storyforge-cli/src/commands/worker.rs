//! `storyforge worker`: run the pipeline daemon until SIGTERM/Ctrl-C.
//!
//! Spawns `config.pipeline.job_parallelism` lanes, each looping on
//! `Orchestrator::run_once`, wired into [`storyforge_core::runtime::Runtime`]
//! for graceful shutdown -- mirrors the teacher's `run::execute` spawning
//! one `Runtime`-tracked task per automation loop.

use std::sync::Arc;
use std::time::Duration;

use storyforge_core::broker::redis_broker::run_reaper;
use storyforge_core::config::Config;
use storyforge_core::orchestrator::{Orchestrator, ProcessOutcome};
use storyforge_core::runtime::Runtime;

use crate::wiring::Wiring;

/// How long a lane sleeps after finding the queue empty, before polling
/// again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How often the Redis reaper sweeps expired in-flight claims and due
/// delayed-requeue entries back onto the ready list.
const REAPER_TICK: Duration = Duration::from_secs(30);

pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let wiring = Wiring::build(config).await?;
    let redis_broker = wiring.redis_broker.clone();
    let queue_name = config.broker.queue_name.clone();
    let orchestrator = Arc::new(wiring.into_orchestrator(config));

    let mut runtime = Runtime::new();

    // The reaper only applies to the real Redis broker -- `MockBrokerClient`
    // (used under `mock_ai`) has no separate in-flight sorted set to sweep.
    if let Some(redis_broker) = redis_broker {
        let cancel = runtime.cancel_token();
        runtime.spawn("broker-reaper", async move {
            run_reaper(redis_broker, queue_name, REAPER_TICK, cancel).await;
        });
    }

    for lane in 0..config.pipeline.job_parallelism.max(1) {
        let orchestrator = orchestrator.clone();
        let cancel = runtime.cancel_token();
        runtime.spawn(format!("worker-lane-{lane}"), async move {
            run_lane(lane, orchestrator, cancel).await;
        });
    }

    tracing::info!(lanes = config.pipeline.job_parallelism, "worker started");
    runtime.run_until_shutdown().await;
    Ok(())
}

async fn run_lane(lane: usize, orchestrator: Arc<Orchestrator>, cancel: tokio_util::sync::CancellationToken) {
    while !cancel.is_cancelled() {
        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            result = orchestrator.run_once() => result,
        };

        match outcome {
            Ok(Some(ProcessOutcome::Acked)) | Ok(Some(ProcessOutcome::Nacked)) => {}
            Ok(Some(ProcessOutcome::DeadlineExceeded)) => {
                tracing::warn!(lane, "job exceeded its soft deadline");
            }
            Ok(None) => {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            }
            Err(e) => {
                tracing::error!(lane, error = %e, "broker error while dequeuing, backing off");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                }
            }
        }
    }
    tracing::info!(lane, "worker lane stopped");
}
