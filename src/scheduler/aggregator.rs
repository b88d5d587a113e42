use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::output::ProgressReporter;
use crate::peer::Bitfield;
use crate::piece::PieceResult;
use crate::scheduler::queue::WorkQueue;

/// Single consumer of verified pieces; owns the output buffer.
#[derive(Debug)]
pub struct Aggregator {
    buf: Vec<u8>,
    piece_length: u64,
    received: Bitfield,
    done: usize,
}

impl Aggregator {
    pub fn new(piece_length: u32, total_length: u64, piece_count: usize) -> Self {
        Self {
            buf: vec![0; total_length as usize],
            piece_length: piece_length as u64,
            received: Bitfield::new(piece_count),
            done: 0,
        }
    }

    /// Collects results until every piece has arrived, then closes the queue.
    ///
    /// Fails with [`Error::Incomplete`] if every worker hangs up first.
    pub async fn collect<R>(
        mut self,
        mut results: mpsc::Receiver<PieceResult>,
        queue: &WorkQueue,
        peers: usize,
        reporter: &mut R,
    ) -> Result<Vec<u8>>
    where
        R: ProgressReporter,
    {
        let total = self.received.piece_count();

        while self.done < total {
            let Some(result) = results.recv().await else {
                queue.close();
                return Err(Error::Incomplete {
                    done: self.done,
                    total,
                });
            };

            if self.place(&result)? {
                self.done += 1;
                reporter.report(self.done, total, result.index, peers);
            }
        }

        queue.close();
        debug!(pieces = total, "all pieces collected");
        Ok(self.buf)
    }

    /// Copies a piece to its offset. Returns `false` for a duplicate.
    fn place(&mut self, result: &PieceResult) -> Result<bool> {
        let index = result.index as usize;
        if self.received.has_piece(index)? {
            warn!(index, "duplicate piece result ignored");
            return Ok(false);
        }

        let begin = result.index as u64 * self.piece_length;
        let end = begin + result.data.len() as u64;
        let slot = self
            .buf
            .get_mut(begin as usize..end as usize)
            .ok_or(Error::IndexOutOfRange {
                index,
                capacity: self.received.piece_count(),
            })?;
        slot.copy_from_slice(&result.data);

        self.received.mark_piece(index)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceWork;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Recorder(Vec<(usize, usize, u32, usize)>);

    impl ProgressReporter for Recorder {
        fn report(&mut self, done: usize, total: usize, index: u32, peers: usize) {
            self.0.push((done, total, index, peers));
        }
    }

    #[tokio::test]
    async fn test_places_pieces_at_their_offsets() {
        let queue = WorkQueue::new(Vec::new(), None);
        let (tx, rx) = mpsc::channel(1);
        let mut recorder = Recorder::default();

        tokio::spawn(async move {
            for (index, data) in [(2, vec![3u8; 2]), (0, vec![1u8; 4]), (1, vec![2u8; 4])] {
                tx.send(PieceResult { index, data }).await.unwrap();
            }
        });

        let buf = Aggregator::new(4, 10, 3)
            .collect(rx, &queue, 2, &mut recorder)
            .await
            .unwrap();

        assert_eq!(buf, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3]);
        assert_eq!(recorder.0, [(1, 3, 2, 2), (2, 3, 0, 2), (3, 3, 1, 2)]);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_duplicates_are_not_counted() {
        let queue = WorkQueue::new(Vec::new(), None);
        let (tx, rx) = mpsc::channel(4);
        let mut recorder = Recorder::default();

        tx.send(PieceResult { index: 0, data: vec![1; 2] }).await.unwrap();
        tx.send(PieceResult { index: 0, data: vec![9; 2] }).await.unwrap();
        tx.send(PieceResult { index: 1, data: vec![2; 2] }).await.unwrap();

        let buf = Aggregator::new(2, 4, 2)
            .collect(rx, &queue, 1, &mut recorder)
            .await
            .unwrap();

        assert_eq!(buf, [1, 1, 2, 2]);
        assert_eq!(recorder.0.len(), 2);
    }

    #[tokio::test]
    async fn test_incomplete_when_workers_hang_up() {
        let queue = WorkQueue::new(vec![PieceWork::new(1, [0; 20], 4)], None);
        let (tx, rx) = mpsc::channel(1);

        tx.send(PieceResult { index: 0, data: vec![0; 4] }).await.unwrap();
        drop(tx);

        let result = Aggregator::new(4, 8, 2)
            .collect(rx, &queue, 1, &mut Recorder::default())
            .await;

        assert_matches!(result, Err(Error::Incomplete { done: 1, total: 2 }));
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_zero_pieces_finishes_immediately() {
        let queue = WorkQueue::new(Vec::new(), None);
        let (_tx, rx) = mpsc::channel(1);

        let buf = Aggregator::new(16, 0, 0)
            .collect(rx, &queue, 0, &mut Recorder::default())
            .await
            .unwrap();
        assert!(buf.is_empty());
    }
}
