//! Runs puzzle service requests off the UI thread.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use sudoku_session::{dispatch, Outgoing, PuzzleService, RequestId, Response, ServiceResult};
use tracing::{debug, info, warn};

pub type Completion = (RequestId, ServiceResult<Response>);

/// A single worker thread that owns the backend and answers requests in order
pub struct Transport {
    backend: Arc<dyn PuzzleService>,
    requests: Option<Sender<Outgoing>>,
    completions: Receiver<Completion>,
}

impl Transport {
    pub fn spawn(backend: Arc<dyn PuzzleService>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<Outgoing>();
        let (done_tx, done_rx) = mpsc::channel();
        let worker_backend = Arc::clone(&backend);

        thread::Builder::new()
            .name("puzzle-service".into())
            .spawn(move || {
                for outgoing in request_rx {
                    let result = dispatch(worker_backend.as_ref(), &outgoing.request);
                    if done_tx.send((outgoing.id, result)).is_err() {
                        break;
                    }
                }
                debug!("puzzle service worker stopped");
            })?;

        Ok(Self {
            backend,
            requests: Some(request_tx),
            completions: done_rx,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Queue a request. It comes back when the worker has gone away.
    pub fn send(&self, outgoing: Outgoing) -> Result<(), Outgoing> {
        match &self.requests {
            Some(tx) => tx.send(outgoing).map_err(|e| e.0),
            None => Err(outgoing),
        }
    }

    /// Finished requests, without blocking
    pub fn poll(&self) -> Vec<Completion> {
        self.completions.try_iter().collect()
    }

    /// Wait up to `timeout` for the next finished request
    #[cfg(test)]
    pub fn wait(&self, timeout: std::time::Duration) -> Option<Completion> {
        self.completions.recv_timeout(timeout).ok()
    }

    /// Run a request on its own thread without waiting for it. Used for the
    /// final save on exit. The returned receiver yields the result once the
    /// backend is done; the process must stay alive until then for the
    /// request to land.
    pub fn send_detached(&self, outgoing: Outgoing) -> Option<Receiver<ServiceResult<Response>>> {
        let backend = Arc::clone(&self.backend);
        let (done_tx, done_rx) = mpsc::channel();
        let spawned = thread::Builder::new().name("puzzle-flush".into()).spawn(move || {
            let result = dispatch(backend.as_ref(), &outgoing.request);
            match &result {
                Ok(_) => info!(request = %outgoing.id, "final save delivered"),
                Err(e) => warn!(request = %outgoing.id, error = %e, "final save failed"),
            }
            // nobody may be listening any more
            let _ = done_tx.send(result);
        });
        match spawned {
            Ok(_) => Some(done_rx),
            Err(e) => {
                warn!(error = %e, "could not start final save");
                None
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // closing the channel lets the worker finish; it is not joined
        self.requests.take();
    }
}
