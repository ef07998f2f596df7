use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use harvest_core::{ErrorCause, ProgressEvent};
use tokio_util::sync::CancellationToken;

use crate::harvest::{ChannelProgressSink, HarvestRequest, Harvester, ProgressSink};

/// Blocking front end for one harvest running on a background thread.
///
/// The thread owns its own tokio runtime, so callers without one (UI loops,
/// plain `main`) can poll events. Dropping the handle cancels the run.
pub struct HarvestHandle {
    event_rx: mpsc::Receiver<ProgressEvent>,
    cancel: CancellationToken,
}

impl HarvestHandle {
    pub fn start(harvester: Arc<Harvester>, request: HarvestRequest) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        thread::spawn(move || {
            let sink = ChannelProgressSink::new(event_tx);
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    sink.emit(ProgressEvent::error(
                        ErrorCause::Internal,
                        format!("could not start tokio runtime: {err}"),
                    ));
                    return;
                }
            };
            let _ = runtime.block_on(harvester.run(&request, &sink, &token));
        });

        Self { event_rx, cancel }
    }

    /// Next event; `None` once the run has finished and every event was read.
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.event_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Asks the run to stop; it ends with an `Error` event of cause `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for HarvestHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
