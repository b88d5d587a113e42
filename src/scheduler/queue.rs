use async_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::piece::PieceWork;

/// A piece waiting in the queue, with the number of failed attempts so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    work: PieceWork,
    failures: u32,
}

impl Ticket {
    pub fn work(&self) -> &PieceWork {
        &self.work
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Multi-producer, multi-consumer queue of outstanding pieces.
///
/// Capacity equals the piece count and each piece is either queued or held
/// by exactly one worker, so pushes never block. Closing the queue wakes
/// every worker parked in [`WorkQueue::pop`].
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<Ticket>,
    rx: Receiver<Ticket>,
    max_attempts: Option<u32>,
}

impl WorkQueue {
    pub fn new(works: Vec<PieceWork>, max_attempts: Option<u32>) -> Self {
        let (tx, rx) = async_channel::bounded(works.len().max(1));
        let queue = Self {
            tx,
            rx,
            max_attempts,
        };
        for work in works {
            queue.push(Ticket { work, failures: 0 });
        }
        queue
    }

    /// Next piece to attempt, or `None` once the queue has been closed.
    pub async fn pop(&self) -> Option<Ticket> {
        if self.is_closed() {
            return None;
        }
        self.rx.recv().await.ok()
    }

    /// Puts a piece back without counting it as a failure.
    pub fn requeue(&self, ticket: Ticket) {
        self.push(ticket);
    }

    /// Puts a failed piece back, unless it has used up its attempts.
    ///
    /// Returns `false` when the piece was abandoned.
    pub fn retry(&self, mut ticket: Ticket) -> bool {
        ticket.failures += 1;
        if self
            .max_attempts
            .is_some_and(|max| ticket.failures >= max)
        {
            return false;
        }
        self.push(ticket);
        true
    }

    pub fn close(&self) {
        self.tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn push(&self, ticket: Ticket) {
        match self.tx.try_send(ticket) {
            Ok(()) => {}
            Err(TrySendError::Closed(ticket)) => {
                debug!(index = ticket.work.index, "queue closed, dropping piece");
            }
            // Unreachable while every piece has a single owner.
            Err(TrySendError::Full(ticket)) => {
                debug!(index = ticket.work.index, "queue full, dropping piece");
            }
        }
    }
}
