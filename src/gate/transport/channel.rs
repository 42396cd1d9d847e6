//! In-memory channel transport.
//!
//! An implementation of the [`Publisher`](crate::gate::transport::Publisher)
//! and [`Subscriber`](crate::gate::transport::Subscriber) contract over
//! unbounded tokio channels. Tests drive the gateway through it, and an
//! embedding process can use it to run the gateway core in-process with the
//! trading core.
//!
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::gate::error::OfferError;
use crate::gate::transport::{Publisher, Subscriber};

// Fragments drained per poll, mirroring a fragment-limited transport poll.
const FRAGMENT_LIMIT: usize = 10;

/// Channel-backed [`Publisher`]; the paired receiver observes every offer.
pub struct ChannelPublisher {
    tx: UnboundedSender<String>,
    closed: AtomicBool,
    position: std::sync::atomic::AtomicI64,
}

/// Creates a publisher and the receiving end observing its offers.
pub fn publisher_pair() -> (ChannelPublisher, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelPublisher {
            tx,
            closed: AtomicBool::new(false),
            position: std::sync::atomic::AtomicI64::new(0),
        },
        rx,
    )
}

impl Publisher for ChannelPublisher {
    fn offer(&self, message: &str) -> Result<i64, OfferError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OfferError::Closed);
        }
        self.tx
            .send(message.to_string())
            .map_err(|_| OfferError::NotConnected)?;
        Ok(self
            .position
            .fetch_add(message.len() as i64, Ordering::SeqCst)
            + message.len() as i64)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Channel-backed [`Subscriber`]; the paired sender feeds its polls.
pub struct ChannelSubscriber {
    rx: UnboundedReceiver<String>,
}

/// Creates a subscriber and the sending end feeding it.
pub fn subscriber_pair() -> (UnboundedSender<String>, ChannelSubscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelSubscriber { rx })
}

impl Subscriber for ChannelSubscriber {
    fn poll(&mut self, handler: &mut dyn FnMut(&str)) -> Result<usize, OfferError> {
        let mut fragments = 0;
        while fragments < FRAGMENT_LIMIT {
            match self.rx.try_recv() {
                Ok(message) => {
                    handler(&message);
                    fragments += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(fragments)
    }

    fn close(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_poll_drains_up_to_fragment_limit() {
        let (tx, mut subscriber) = subscriber_pair();
        for i in 0..15 {
            tx.send(format!("m{i}")).unwrap();
        }
        let mut seen = Vec::new();
        let count = subscriber.poll(&mut |m| seen.push(m.to_string())).unwrap();
        assert_eq!(count, FRAGMENT_LIMIT);
        assert_eq!(seen.first().map(String::as_str), Some("m0"));

        let count = subscriber.poll(&mut |m| seen.push(m.to_string())).unwrap();
        assert_eq!(count, 5);
        assert_eq!(seen.last().map(String::as_str), Some("m14"));
    }

    #[test]
    fn test_closed_publisher_reports_closed() {
        let (publisher, _rx) = publisher_pair();
        publisher.close();
        assert!(matches!(publisher.offer("x"), Err(OfferError::Closed)));
    }

    #[test]
    fn test_dropped_receiver_reports_not_connected() {
        let (publisher, rx) = publisher_pair();
        drop(rx);
        assert!(matches!(
            publisher.offer("x"),
            Err(OfferError::NotConnected)
        ));
    }
}
