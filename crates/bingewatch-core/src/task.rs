//! Request sequencing for overlapping async work.
//!
//! Every dispatched request gets a `TaskId` from a `TaskSeq`. When a request
//! settles, its result only applies if its id is still the latest issued;
//! anything older is stale and gets dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

#[derive(Debug, Default)]
pub struct TaskSeq {
    next: u64,
    latest: Option<TaskId>,
}

impl TaskSeq {
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next = self.next.wrapping_add(1);
        self.latest = Some(id);
        id
    }

    /// Returns the most recently issued id, if any.
    pub fn latest(&self) -> Option<TaskId> {
        self.latest
    }

    pub fn is_latest(&self, id: TaskId) -> bool {
        self.latest == Some(id)
    }

    /// Invalidates every outstanding id without issuing a usable one.
    pub fn invalidate(&mut self) {
        self.next_id();
    }
}
