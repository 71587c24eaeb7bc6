//! Rate-limited FIFO send queues.
//!
//! Outbound traffic is split into three independently limited classes
//! (messages, commands, joins) so that e.g. a burst of JOINs cannot starve
//! chat messages. Each queue runs one worker task that executes an item,
//! then sleeps the configured interval before taking the next.

use crate::emitter::EventEmitter;
use crate::error::Error;
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

pub(crate) type SendFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), Error>> + Send>;

pub(crate) struct QueueItem {
    pub callback: SendFn,
    pub delay: Option<Duration>,
}

struct Worker {
    tx: mpsc::UnboundedSender<QueueItem>,
    kill: Option<oneshot::Sender<()>>,
}

/// One rate-limited outbound class. The worker has an explicit lifecycle:
/// it is started on connect and stopped on disconnect, dropping any items
/// that are still pending.
pub(crate) struct MessageQueue {
    default_delay: Duration,
    worker: Mutex<Option<Worker>>,
}

impl MessageQueue {
    pub fn new(default_delay: Duration) -> MessageQueue {
        MessageQueue {
            default_delay,
            worker: Mutex::new(None),
        }
    }

    /// Spawns the worker task. A previous worker, if any, is stopped first.
    pub fn start(&self, emitter: Arc<EventEmitter>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(Self::run(rx, kill_rx, self.default_delay, emitter));

        let previous = self.worker.lock().unwrap().replace(Worker {
            tx,
            kill: Some(kill_tx),
        });
        if let Some(mut previous) = previous {
            if let Some(kill) = previous.kill.take() {
                kill.send(()).ok();
            }
        }
    }

    /// Cancels the worker and drops all pending items.
    pub fn stop(&self) {
        if let Some(mut worker) = self.worker.lock().unwrap().take() {
            if let Some(kill) = worker.kill.take() {
                kill.send(()).ok();
            }
        }
    }

    /// Enqueues one send. Fails when the queue is not running.
    pub fn add(&self, callback: SendFn) -> Result<(), Error> {
        self.add_delayed(callback, None)
    }

    pub fn add_delayed(&self, callback: SendFn, delay: Option<Duration>) -> Result<(), Error> {
        let worker = self.worker.lock().unwrap();
        let worker = worker.as_ref().ok_or(Error::NotConnected)?;
        worker
            .tx
            .send(QueueItem { callback, delay })
            .map_err(|_| Error::NotConnected)
    }

    async fn run(
        mut rx: mpsc::UnboundedReceiver<QueueItem>,
        mut kill: oneshot::Receiver<()>,
        default_delay: Duration,
        emitter: Arc<EventEmitter>,
    ) {
        debug!("Send queue worker started");
        loop {
            let item = tokio::select! {
                _ = &mut kill => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            if let Err(e) = (item.callback)().await {
                if let Err(e) = emitter.emit_error(Arc::new(e)) {
                    error!("Send queue item failed: {}", e);
                }
            }

            let delay = item.delay.unwrap_or(default_delay);
            tokio::select! {
                _ = &mut kill => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Send queue worker ended");
    }
}
