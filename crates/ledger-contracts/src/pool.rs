//! Bounded pool of execution stacks
//!
//! Procedures may run on any stack. Functions skip the first
//! `reserved_for_procedures` stacks so request handling can never starve
//! the tick processor.

use crate::stack::StackBuffer;
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Execution stacks shared by all invocations
#[derive(Debug)]
pub struct StackPool {
    stacks: Vec<Mutex<StackBuffer>>,
    reserved_for_procedures: usize,
    waiting: AtomicUsize,
    max_waiting: AtomicUsize,
}

/// Exclusive use of one stack, returned to the pool on drop
#[derive(Debug)]
pub struct StackGuard<'a> {
    index: usize,
    stack: MutexGuard<'a, StackBuffer>,
}

impl StackGuard<'_> {
    /// Position of the stack in the pool
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for StackGuard<'_> {
    type Target = StackBuffer;

    fn deref(&self) -> &StackBuffer {
        &self.stack
    }
}

impl DerefMut for StackGuard<'_> {
    fn deref_mut(&mut self) -> &mut StackBuffer {
        &mut self.stack
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if self.stack.size() != 0 {
            tracing::warn!(
                stack = self.index,
                size = self.stack.size(),
                "Execution stack released with live blocks"
            );
            self.stack.free_all();
        }
    }
}

impl StackPool {
    /// `count` stacks of `stack_size` bytes; at least two stacks are created.
    pub fn new(count: usize, stack_size: usize, reserved_for_procedures: usize) -> Self {
        let count = count.max(2);
        Self {
            stacks: (0..count).map(|_| Mutex::new(StackBuffer::new(stack_size))).collect(),
            reserved_for_procedures: reserved_for_procedures.min(count - 1),
            waiting: AtomicUsize::new(0),
            max_waiting: AtomicUsize::new(0),
        }
    }

    /// Number of stacks
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Always false; a pool has at least two stacks
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Highest number of callers seen waiting at once
    pub fn max_waiting(&self) -> usize {
        self.max_waiting.load(Ordering::Relaxed)
    }

    /// Claim a stack for a procedure, trying at most `attempts` slots.
    pub fn acquire_for_procedure(&self, attempts: u32) -> Option<StackGuard<'_>> {
        self.acquire(0, attempts)
    }

    /// Claim a stack for a function, skipping the reserved stacks.
    pub fn acquire_for_function(&self, attempts: u32) -> Option<StackGuard<'_>> {
        self.acquire(self.reserved_for_procedures, attempts)
    }

    fn acquire(&self, first: usize, attempts: u32) -> Option<StackGuard<'_>> {
        let waiting = self.waiting.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_waiting.fetch_max(waiting, Ordering::Relaxed);

        let mut index = first;
        let mut claimed = None;
        for _ in 0..attempts.max(1) {
            if let Some(stack) = self.stacks[index].try_lock() {
                claimed = Some(StackGuard { index, stack });
                break;
            }
            index += 1;
            if index == self.stacks.len() {
                index = first;
                std::thread::yield_now();
            }
        }

        self.waiting.fetch_sub(1, Ordering::AcqRel);
        claimed
    }

    /// Whether every stack is idle and empty
    pub fn all_idle_and_empty(&self) -> bool {
        self.stacks
            .iter()
            .all(|stack| stack.try_lock().is_some_and(|s| s.size() == 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functions_skip_reserved_stack() {
        let pool = StackPool::new(2, 64, 1);
        let guard = pool.acquire_for_function(4).unwrap();
        assert_eq!(guard.index(), 1);
        assert!(pool.acquire_for_function(4).is_none());
        let procedure = pool.acquire_for_procedure(4).unwrap();
        assert_eq!(procedure.index(), 0);
    }

    #[test]
    fn test_release_clears_leftover_blocks() {
        let pool = StackPool::new(2, 64, 1);
        {
            let mut guard = pool.acquire_for_procedure(1).unwrap();
            guard.allocate(8).unwrap();
        }
        assert!(pool.all_idle_and_empty());
    }

    #[test]
    fn test_pool_has_at_least_two_stacks() {
        let pool = StackPool::new(0, 64, 5);
        assert_eq!(pool.len(), 2);
        let _procedure = pool.acquire_for_procedure(1).unwrap();
        assert!(pool.acquire_for_function(2).is_some());
    }
}
