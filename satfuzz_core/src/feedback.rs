use crate::corpus::RunOutcome;

/// Which of a mutation's parent and child go back onto the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub keep_child: bool,
    pub keep_parent: bool,
}

impl Verdict {
    pub const KEEP_BOTH: Verdict = Verdict {
        keep_child: true,
        keep_parent: true,
    };
    pub const CHILD_ONLY: Verdict = Verdict {
        keep_child: true,
        keep_parent: false,
    };
    pub const PARENT_ONLY: Verdict = Verdict {
        keep_child: false,
        keep_parent: true,
    };
}

pub trait Feedback: Send + Sync {
    fn name(&self) -> &'static str;

    /// Judges the crashing `child` produced by mutating `parent`.
    /// `kind_was_known` tells whether the child's crash kind had been
    /// recorded before this run.
    fn judge(&self, parent: &RunOutcome, child: &RunOutcome, kind_was_known: bool) -> Verdict;
}

/// Keeps mutating along a lineage while it finds new bugs or reaches more
/// of the solver with the same bug.
#[derive(Default, Debug, Clone, Copy)]
pub struct MutationFeedback;

impl MutationFeedback {
    pub fn new() -> Self {
        MutationFeedback
    }
}

impl Feedback for MutationFeedback {
    fn name(&self) -> &'static str {
        "MutationFeedback"
    }

    fn judge(&self, parent: &RunOutcome, child: &RunOutcome, kind_was_known: bool) -> Verdict {
        if !kind_was_known || child.crash != parent.crash {
            return Verdict::KEEP_BOTH;
        }
        if child.coverage > parent.coverage {
            return Verdict::CHILD_ONLY;
        }
        Verdict::PARENT_ONLY
    }
}
