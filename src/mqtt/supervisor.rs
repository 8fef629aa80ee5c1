//! Owns every [`BrokerSession`], the shared work queue, and the worker pool
//! that drains it (§4.1). Cancellation drains the queue, awaits the
//! workers, then lets sessions unwind.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::session::BrokerSession;
use crate::config::Config;
use crate::constants::WORK_QUEUE_CAPACITY;

/// One raw MQTT delivery, handed from a [`BrokerSession`] to a worker.
/// `payload` is the same `bytes::Bytes` rumqttc hands back, so fanning a
/// frame out to a worker is a refcount bump rather than a copy.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub broker: String,
    pub topic: String,
    pub payload: Bytes,
}

/// Owns all broker sessions and the worker pool that consumes their output.
pub struct Supervisor {
    session_handles: Vec<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Spawns one task per configured broker and `worker_count` worker
    /// tasks, each running `handle_frame` on frames pulled from the shared
    /// queue.
    pub fn spawn<F, Fut>(config: Arc<Config>, cancel: CancellationToken, handle_frame: F) -> Self
    where
        F: Fn(RawFrame) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (frame_tx, frame_rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
        let frame_rx = Arc::new(tokio::sync::Mutex::new(frame_rx));
        let handle_frame = Arc::new(handle_frame);

        let mut session_handles = Vec::new();
        for broker in &config.brokers {
            let session = BrokerSession::new(broker.clone(), frame_tx.clone(), cancel.clone());
            session_handles.push(tokio::spawn(session.run()));
        }
        drop(frame_tx);

        let mut worker_handles = Vec::new();
        for worker_id in 0..config.worker_concurrency {
            let frame_rx = frame_rx.clone();
            let handle_frame = handle_frame.clone();
            let cancel = cancel.clone();
            worker_handles.push(tokio::spawn(async move {
                loop {
                    let frame = {
                        let mut rx = frame_rx.lock().await;
                        // Biased: always drain a frame already sitting in the
                        // queue before honoring cancellation, so shutdown
                        // empties the queue rather than racing it (§5).
                        tokio::select! {
                            biased;
                            frame = rx.recv() => frame,
                            _ = cancel.cancelled(), if rx.is_empty() => None,
                        }
                    };
                    match frame {
                        Some(frame) => handle_frame(frame).await,
                        None => break,
                    }
                }
                info!(worker_id, "worker drained and exiting");
            }));
        }

        Self {
            session_handles,
            worker_handles,
            cancel,
        }
    }

    /// Signals shutdown, drains the queue, and awaits every worker and
    /// session task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.worker_handles {
            let _ = handle.await;
        }
        for handle in self.session_handles {
            let _ = handle.await;
        }
    }
}
