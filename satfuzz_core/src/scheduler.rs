use crate::corpus::RunOutcome;
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// Nothing has been queued for mutation yet, or the queue ran dry.
    #[error("Work queue is empty, cannot schedule next test case")]
    QueueEmpty,
}

/// A `Scheduler` decides which crashing test case is mutated next.
///
/// The engine pushes every case worth mutating and pops one per mutation
/// round. A case that is popped is gone until the feedback puts it back.
pub trait Scheduler: Send {
    /// Queues `outcome` for a later mutation round.
    fn push(&mut self, outcome: RunOutcome);

    /// Removes and returns the next case to mutate.
    ///
    /// # Returns
    /// The selected case, or `SchedulerError::QueueEmpty` if there is none.
    fn next(&mut self) -> Result<RunOutcome, SchedulerError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First in, first out. Cases the feedback keeps are re-queued at the
/// back, so every queued crash gets its turn.
#[derive(Default, Debug)]
pub struct QueueScheduler {
    queue: VecDeque<RunOutcome>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        QueueScheduler {
            queue: VecDeque::new(),
        }
    }
}

impl Scheduler for QueueScheduler {
    fn push(&mut self, outcome: RunOutcome) {
        self.queue.push_back(outcome);
    }

    fn next(&mut self) -> Result<RunOutcome, SchedulerError> {
        self.queue.pop_front().ok_or(SchedulerError::QueueEmpty)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CrashKind, ProgramCrash};
    use std::path::PathBuf;

    fn outcome(name: &str) -> RunOutcome {
        RunOutcome::new(
            PathBuf::from(name),
            ProgramCrash {
                kind: CrashKind::LeakSanitizer,
                location: None,
            },
            0.0,
            name.as_bytes(),
        )
    }

    #[test]
    fn queue_scheduler_next_from_empty_queue_returns_queue_empty_error() {
        let mut scheduler = QueueScheduler::new();
        assert!(scheduler.is_empty());
        match scheduler.next() {
            Err(SchedulerError::QueueEmpty) => {}
            Ok(outcome) => panic!("Expected QueueEmpty, got {:?}", outcome.test_file),
        }
    }

    #[test]
    fn queue_scheduler_is_fifo() {
        let mut scheduler = QueueScheduler::new();
        scheduler.push(outcome("first.cnf"));
        scheduler.push(outcome("second.cnf"));
        assert_eq!(scheduler.len(), 2);

        let first = scheduler.next().unwrap();
        assert_eq!(first.test_file, PathBuf::from("first.cnf"));
        scheduler.push(first);

        let order: Vec<PathBuf> = std::iter::from_fn(|| scheduler.next().ok())
            .map(|o| o.test_file)
            .collect();
        assert_eq!(
            order,
            vec![PathBuf::from("second.cnf"), PathBuf::from("first.cnf")]
        );
        assert!(matches!(scheduler.next(), Err(SchedulerError::QueueEmpty)));
    }
}
