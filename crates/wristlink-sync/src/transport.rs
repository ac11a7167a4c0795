//! Transport abstraction between phone and wearable.
//!
//! The platform channel delivers flat [`WireMessage`] maps. Delivery is
//! push-based: a single dispatcher is registered with [`Transport::on_receive`].
//! Messages that arrive while no dispatcher is registered are buffered by the
//! platform and fetched with [`Transport::drain_queued`].

use std::sync::Arc;

use async_trait::async_trait;

use wristlink_core::WireMessage;

use crate::error::Result;

/// Receive callback. Invoked from the transport's delivery context.
pub type Dispatcher = Arc<dyn Fn(WireMessage) + Send + Sync>;

/// Transport trait for exchanging wire messages with the peer device.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to the peer.
    ///
    /// A failure is a value; callers log it and carry on.
    async fn send(&self, message: WireMessage) -> Result<()>;

    /// Register the receive dispatcher, replacing any previous one.
    fn on_receive(&self, dispatcher: Dispatcher);

    /// Fetch and remove messages buffered while no dispatcher was registered.
    ///
    /// Call once right after [`Transport::on_receive`].
    async fn drain_queued(&self) -> Result<Vec<WireMessage>>;
}

/// An in-memory transport pair for testing.
///
/// Supports fault injection: failing sends, duplicate delivery, and buffering
/// while a side has no dispatcher.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use wristlink_core::Side;

    use crate::error::SyncError;

    #[derive(Default)]
    struct Endpoint {
        dispatcher: Option<Dispatcher>,
        queued: VecDeque<WireMessage>,
    }

    /// Shared state of one phone/wearable link.
    #[derive(Default)]
    struct Link {
        phone: Mutex<Endpoint>,
        wearable: Mutex<Endpoint>,
    }

    impl Link {
        fn endpoint(&self, side: Side) -> MutexGuard<'_, Endpoint> {
            let endpoint = match side {
                Side::Phone => &self.phone,
                Side::Wearable => &self.wearable,
            };
            endpoint.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Builds connected transport pairs.
    pub struct MemoryLink;

    impl MemoryLink {
        /// Create a connected `(phone, wearable)` pair.
        pub fn pair() -> (Arc<MemoryTransport>, Arc<MemoryTransport>) {
            let link = Arc::new(Link::default());
            (
                Arc::new(MemoryTransport::new(Side::Phone, Arc::clone(&link))),
                Arc::new(MemoryTransport::new(Side::Wearable, link)),
            )
        }
    }

    /// One side of a [`MemoryLink`].
    pub struct MemoryTransport {
        side: Side,
        link: Arc<Link>,
        fail_next: AtomicUsize,
        duplicate: AtomicBool,
        sent: Mutex<Vec<WireMessage>>,
    }

    impl MemoryTransport {
        fn new(side: Side, link: Arc<Link>) -> Self {
            Self {
                side,
                link,
                fail_next: AtomicUsize::new(0),
                duplicate: AtomicBool::new(false),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn side(&self) -> Side {
            self.side
        }

        /// Make the next `n` sends from this side fail.
        pub fn fail_next_sends(&self, n: usize) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        /// Deliver every message sent from this side twice.
        pub fn set_duplicate_delivery(&self, enabled: bool) {
            self.duplicate.store(enabled, Ordering::SeqCst);
        }

        /// Every message successfully sent from this side, in order.
        pub fn sent(&self) -> Vec<WireMessage> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Unregister this side's dispatcher. Later deliveries are buffered.
        pub fn clear_receiver(&self) {
            self.link.endpoint(self.side).dispatcher = None;
        }

        /// Number of messages buffered for this side.
        pub fn queued_len(&self) -> usize {
            self.link.endpoint(self.side).queued.len()
        }

        fn take_failure(&self) -> bool {
            self.fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, message: WireMessage) -> Result<()> {
            if self.take_failure() {
                return Err(SyncError::Transport("injected send failure".into()));
            }

            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());

            let copies = if self.duplicate.load(Ordering::SeqCst) { 2 } else { 1 };

            // Never call the dispatcher while holding the endpoint lock.
            let dispatcher = {
                let mut peer = self.link.endpoint(self.side.peer());
                match peer.dispatcher.clone() {
                    Some(dispatcher) => dispatcher,
                    None => {
                        for _ in 0..copies {
                            peer.queued.push_back(message.clone());
                        }
                        return Ok(());
                    }
                }
            };

            for _ in 0..copies {
                dispatcher(message.clone());
            }
            Ok(())
        }

        fn on_receive(&self, dispatcher: Dispatcher) {
            self.link.endpoint(self.side).dispatcher = Some(dispatcher);
        }

        async fn drain_queued(&self) -> Result<Vec<WireMessage>> {
            Ok(self.link.endpoint(self.side).queued.drain(..).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryLink;
    use super::*;
    use std::sync::Mutex;
    use wristlink_core::Command;

    fn wire(command: Command) -> WireMessage {
        WireMessage::encode(&command).unwrap()
    }

    fn collector() -> (Dispatcher, Arc<Mutex<Vec<WireMessage>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let dispatcher: Dispatcher = Arc::new(move |message| sink.lock().unwrap().push(message));
        (dispatcher, received)
    }

    #[tokio::test]
    async fn test_memory_transport_send_recv() {
        let (phone, wearable) = MemoryLink::pair();
        let (dispatcher, received) = collector();
        wearable.on_receive(dispatcher);

        phone.send(wire(Command::Ping)).await.unwrap();

        assert_eq!(received.lock().unwrap().as_slice(), &[wire(Command::Ping)]);
        assert_eq!(phone.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_transport_buffers_until_drained() {
        let (phone, wearable) = MemoryLink::pair();

        wearable.send(wire(Command::PauseSession)).await.unwrap();
        wearable.send(wire(Command::ResumeSession)).await.unwrap();
        assert_eq!(phone.queued_len(), 2);

        let drained = phone.drain_queued().await.unwrap();
        assert_eq!(
            drained,
            vec![wire(Command::PauseSession), wire(Command::ResumeSession)]
        );
        assert!(phone.drain_queued().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_transport_fault_injection() {
        let (phone, wearable) = MemoryLink::pair();
        let (dispatcher, received) = collector();
        wearable.on_receive(dispatcher);

        phone.fail_next_sends(1);
        assert!(phone.send(wire(Command::Ping)).await.is_err());
        assert!(phone.send(wire(Command::Ping)).await.is_ok());

        phone.set_duplicate_delivery(true);
        phone.send(wire(Command::PingResponse)).await.unwrap();

        assert_eq!(received.lock().unwrap().len(), 3);
        assert_eq!(phone.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_transport_clear_receiver() {
        let (phone, wearable) = MemoryLink::pair();
        let (dispatcher, received) = collector();
        phone.on_receive(dispatcher);
        phone.clear_receiver();

        wearable.send(wire(Command::Ping)).await.unwrap();

        assert!(received.lock().unwrap().is_empty());
        assert_eq!(phone.queued_len(), 1);
    }
}
