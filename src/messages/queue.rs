//! # Removable FIFO shared by submitters and the drain worker.
//!
//! Every accepted message gets a ticket (`u64`). A submitter that loses the
//! post-enqueue running check withdraws its own message by ticket; if the drain
//! worker already took it, withdrawal fails and the message is processed anyway.
//!
//! Waiting is done with two [`Notify`]s: `not_empty` wakes the poller,
//! `not_full` wakes blocked submitters. Both waits are bounded by a timeout.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

struct Slots<M> {
    next_ticket: u64,
    items: VecDeque<(u64, M)>,
}

/// Bounded (or unbounded) FIFO with ticket-based removal.
pub(crate) struct MessageQueue<M> {
    slots: Mutex<Slots<M>>,
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl<M> MessageQueue<M> {
    /// `None` = unbounded.
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                next_ticket: 0,
                items: VecDeque::new(),
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Enqueues without waiting; hands the message back when full.
    pub(crate) fn try_push(&self, msg: M) -> Result<u64, M> {
        let ticket = {
            let mut slots = self.slots.lock();
            if self.capacity.is_some_and(|cap| slots.items.len() >= cap) {
                return Err(msg);
            }
            let ticket = slots.next_ticket;
            slots.next_ticket += 1;
            slots.items.push_back((ticket, msg));
            ticket
        };
        self.not_empty.notify_one();
        Ok(ticket)
    }

    /// Enqueues, waiting up to `wait` for space.
    pub(crate) async fn push_timeout(&self, msg: M, wait: Duration) -> Result<u64, M> {
        let deadline = Instant::now() + wait;
        let mut msg = msg;
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(msg) {
                Ok(ticket) => return Ok(ticket),
                Err(back) => msg = back,
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.try_push(msg);
            }
        }
    }

    /// Takes the head without waiting.
    pub(crate) fn try_pop(&self) -> Option<M> {
        let msg = self.slots.lock().items.pop_front().map(|(_, msg)| msg);
        if msg.is_some() {
            self.not_full.notify_one();
        }
        msg
    }

    /// Takes the head, waiting up to `wait` for one to arrive.
    pub(crate) async fn poll(&self, wait: Duration) -> Option<M> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(msg) = self.try_pop() {
                return Some(msg);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Withdraws the message with `ticket`; `false` if it was already taken.
    pub(crate) fn remove(&self, ticket: u64) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            match slots.items.iter().position(|(t, _)| *t == ticket) {
                Some(idx) => slots.items.remove(idx).is_some(),
                None => false,
            }
        };
        if removed {
            self.not_full.notify_one();
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().items.len()
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
