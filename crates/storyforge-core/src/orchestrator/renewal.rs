//! Background visibility-timeout renewal for one claimed job, generalized
//! from the teacher's `automation/mod.rs::run_token_refresh_loop`
//! periodic-refresh-with-cancellation shape (OAuth token refresh ->
//! broker visibility renewal, per §4.G's expansion note).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerClient, JobHandle};

/// Spawn a task that renews `handle`'s visibility every
/// `visibility_timeout / 3` (§4.E) until `cancel` fires.
pub fn spawn(broker: Arc<dyn BrokerClient>, handle: JobHandle, visibility_timeout: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    let interval = visibility_timeout / 3;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(interval) => {}
            }

            // A renewal failure is logged and the worker continues; if
            // renewals keep failing the visibility eventually expires and
            // redelivery takes over (§4.E).
            if let Err(e) = broker.renew(&handle, visibility_timeout).await {
                tracing::warn!(job_id = %handle.job_id, error = %e, "visibility renewal failed");
            }
        }
    })
}
