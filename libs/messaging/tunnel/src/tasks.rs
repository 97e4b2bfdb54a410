//! Tasks spawned on behalf of one tunnel

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::error;

#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSet {
    /// Track `handle`, forgetting tasks that already finished
    pub(crate) fn push(&self, handle: JoinHandle<()>) -> AbortHandle {
        let abort = handle.abort_handle();
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        abort
    }

    pub(crate) fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Wait for every tracked task, including tasks pushed while waiting
    pub(crate) async fn join_all(&self) {
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!("Tunnel task panicked: {}", e);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}
