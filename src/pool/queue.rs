//! # Priority multi-queue.
//!
//! One FIFO lane per [`Priority`]. Admission pops from the highest non-empty
//! lane, FIFO within a lane, so both push and pop are O(1).
//!
//! ```text
//! Critical   [j7]
//! High       []
//! Normal     [j1, j2, j3]   ──► pop() order: j7, j1, j2, j3, j4
//! Low        [j4]
//! Background []
//! ```

use std::collections::VecDeque;

use crate::tasks::job::Job;
use crate::tasks::{BatchId, Estimate, Priority};

/// Ordered set of FIFO lanes, one per priority.
pub(crate) struct PriorityQueues {
    lanes: [VecDeque<Job>; 5],
    len: usize,
}

impl PriorityQueues {
    pub(crate) fn new() -> Self {
        Self {
            lanes: Default::default(),
            len: 0,
        }
    }

    /// Total number of queued jobs.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Queued jobs per priority, in [`Priority::ALL`] order.
    pub(crate) fn counts(&self) -> [usize; 5] {
        let mut out = [0; 5];
        for (slot, lane) in out.iter_mut().zip(&self.lanes) {
            *slot = lane.len();
        }
        out
    }

    /// Appends `job` to the lane of its priority.
    pub(crate) fn push(&mut self, job: Job) {
        let lane = job.meta.estimate.priority.index();
        self.lanes[lane].push_back(job);
        self.len += 1;
    }

    /// Removes the oldest job of the highest non-empty priority.
    pub(crate) fn pop(&mut self) -> Option<Job> {
        let job = self.lanes.iter_mut().find_map(VecDeque::pop_front)?;
        self.len -= 1;
        Some(job)
    }

    /// Estimate of the job [`pop`](Self::pop) would return.
    pub(crate) fn peek_estimate(&self) -> Option<Estimate> {
        self.lanes
            .iter()
            .find_map(VecDeque::front)
            .map(|job| job.meta.estimate)
    }

    /// Removes every queued job of `batch`, preserving the order of the rest.
    pub(crate) fn remove_batch(&mut self, batch: BatchId) -> Vec<Job> {
        let mut removed = Vec::new();
        for lane in &mut self.lanes {
            if !lane.iter().any(|j| j.meta.batch == Some(batch)) {
                continue;
            }
            let (taken, kept): (VecDeque<Job>, VecDeque<Job>) = lane
                .drain(..)
                .partition(|j| j.meta.batch == Some(batch));
            *lane = kept;
            removed.extend(taken);
        }
        self.len -= removed.len();
        removed
    }

    /// Removes every queued job.
    pub(crate) fn drain_all(&mut self) -> Vec<Job> {
        let mut all = Vec::with_capacity(self.len);
        for lane in &mut self.lanes {
            all.extend(lane.drain(..));
        }
        self.len = 0;
        all
    }

    /// Number of queued jobs at `priority`.
    #[cfg(test)]
    pub(crate) fn lane_len(&self, priority: Priority) -> usize {
        self.lanes[priority.index()].len()
    }
}
