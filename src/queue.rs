//! Bounded, typed FIFO queues: the only way tasks talk to each other.
//!
//! Thin wrapper over an `embassy-sync` channel that adds the two
//! operations every task loop needs: a send and a receive that each take a
//! maximum wait. A zero wait is a non-blocking attempt; a non-zero wait
//! blocks the calling task on an `async-io-mini` timer raced against the
//! channel future. There is no wait-forever variant.
//!
//! ```text
//!  producer ──send(msg, wait)──▶ ┌───────────────┐ ──receive(wait)──▶ owner task
//!  driver cb ──post(msg)───────▶ │ Channel<T, N> │
//!                                └───────────────┘
//! ```
//!
//! A full queue drops the message; the sender re-sends fresher state on
//! its next tick.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use futures_lite::future;
use log::debug;

use crate::app::ports::Outbox;
use crate::error::QueueError;

/// Wait value for a non-blocking attempt.
pub const NO_WAIT: Duration = Duration::ZERO;

/// Wait a task allows itself on a full downstream inbox.
pub const SEND_WAIT: Duration = Duration::from_millis(10);

/// A named, fixed-capacity MPMC queue.
pub struct Queue<T, const N: usize> {
    name: &'static str,
    channel: Channel<CriticalSectionRawMutex, T, N>,
}

impl<T, const N: usize> Queue<T, N> {
    /// Create an empty queue. `const` so inboxes can live in `static`s.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            channel: Channel::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Send `msg`, blocking at most `wait` while the queue is full.
    ///
    /// On expiry the message is dropped and `QueueError::Full` returned.
    pub fn send(&self, msg: T, wait: Duration) -> Result<(), QueueError> {
        let msg = match self.channel.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(msg)) => msg,
        };
        if wait.is_zero() {
            return Err(QueueError::Full);
        }

        let sent = future::block_on(future::or(
            async {
                self.channel.send(msg).await;
                true
            },
            async {
                async_io_mini::Timer::after(wait).await;
                false
            },
        ));

        if sent { Ok(()) } else { Err(QueueError::Full) }
    }

    /// Non-blocking fire-and-forget send.
    ///
    /// This is the only operation driver callbacks (radio stack, BLE host)
    /// may call: it never blocks and never touches anything but the queue.
    pub fn post(&self, msg: T) {
        if self.channel.try_send(msg).is_err() {
            debug!("Queue[{}]: full, message dropped", self.name);
        }
    }

    /// Receive the oldest message, waiting at most `wait` for one to arrive.
    pub fn receive(&self, wait: Duration) -> Option<T> {
        if let Ok(msg) = self.channel.try_receive() {
            return Some(msg);
        }
        if wait.is_zero() {
            return None;
        }

        future::block_on(future::or(
            async { Some(self.channel.receive().await) },
            async {
                async_io_mini::Timer::after(wait).await;
                None
            },
        ))
    }

    /// Non-blocking receive.
    pub fn try_receive(&self) -> Option<T> {
        self.receive(NO_WAIT)
    }
}

impl<T, const N: usize> Outbox<T> for &Queue<T, N> {
    fn deliver(&mut self, msg: T) {
        if self.send(msg, SEND_WAIT).is_err() {
            debug!("Queue[{}]: still full after {:?}, message dropped", self.name, SEND_WAIT);
        }
    }
}
