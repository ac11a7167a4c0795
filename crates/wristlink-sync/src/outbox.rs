//! Fire-and-forget send queue.
//!
//! One task drains a FIFO queue and awaits [`Transport::send`] one message at
//! a time, so commands reach the peer in the order they were queued. Send
//! failures are logged here and never reach the caller.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wristlink_core::{Command, WireMessage};

use crate::error::{Result, SyncError};
use crate::transport::Transport;

/// Called once the message has been attempted; `true` if it was sent.
pub type SendCallback = Box<dyn FnOnce(bool) + Send>;

enum Outgoing {
    Send {
        command: Command,
        notify: Option<SendCallback>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Handle to the outbox task. Cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Outbox {
    /// Spawn the outbox task. It stops once every handle is dropped.
    pub fn spawn(transport: Arc<dyn Transport>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Outgoing::Send { command, notify } => {
                        let delivered = deliver(transport.as_ref(), &command).await;
                        if let Some(notify) = notify {
                            notify(delivered);
                        }
                    }
                    Outgoing::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("outbox closed");
        });

        (Self { tx }, task)
    }

    /// Queue a command.
    pub fn send(&self, command: Command) {
        self.enqueue(command, None);
    }

    /// Queue a command and get told whether it was sent.
    pub fn send_then(&self, command: Command, notify: SendCallback) {
        self.enqueue(command, Some(notify));
    }

    /// Wait until every command queued before this call has been attempted.
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Outgoing::Barrier(done))
            .map_err(|_| SyncError::OutboxClosed)?;
        wait.await.map_err(|_| SyncError::OutboxClosed)
    }

    fn enqueue(&self, command: Command, notify: Option<SendCallback>) {
        let name = command.name();
        if let Err(mpsc::error::SendError(Outgoing::Send { notify, .. })) =
            self.tx.send(Outgoing::Send { command, notify })
        {
            warn!(command = name, "outbox closed, dropping command");
            if let Some(notify) = notify {
                notify(false);
            }
        }
    }
}

async fn deliver(transport: &dyn Transport, command: &Command) -> bool {
    let message = match WireMessage::encode(command) {
        Ok(message) => message,
        Err(e) => {
            warn!(command = command.name(), error = %e, "failed to encode command");
            return false;
        }
    };

    match transport.send(message).await {
        Ok(()) => {
            debug!(command = command.name(), "sent");
            true
        }
        Err(e) => {
            warn!(command = command.name(), error = %e, "send failed");
            false
        }
    }
}
