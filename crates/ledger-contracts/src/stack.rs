//! LIFO arena backing contract invocations
//!
//! Every invocation carves its context, input, output and locals out of one
//! `StackBuffer`, and nested calls keep carving from the same buffer. Blocks
//! are released strictly in reverse order. Each block is charged a small
//! header, so the usable capacity is slightly below the buffer size.
//!
//! Besides data blocks the arena holds rollback records: markers pushed when
//! an invocation takes a contract lock, so an aborted invocation can tell
//! which locks it held by unwinding the stack.

use serde::{Deserialize, Serialize};

/// Bytes charged per block on top of its payload
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Reference to an allocated block
///
/// Handles go stale when their block is freed; a stale handle resolves to
/// nothing even if a later block reuses the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackHandle {
    offset: u32,
    len: u32,
    generation: u32,
}

impl StackHandle {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Lock taken by an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackRecord {
    /// Write lock of a contract state
    WriteLock(u32),
    /// Read lock of a contract state
    ReadLock(u32),
}

#[derive(Debug, Clone, Copy)]
enum BlockKind {
    Data { offset: usize, len: usize },
    Rollback(RollbackRecord),
}

#[derive(Debug, Clone, Copy)]
struct Block {
    size_before: usize,
    generation: u32,
    kind: BlockKind,
}

/// One execution stack
#[derive(Debug, Clone)]
pub struct StackBuffer {
    data: Vec<u8>,
    blocks: Vec<Block>,
    allocated: usize,
    generation: u32,
    max_allocated: usize,
    failed_allocations: u32,
}

impl StackBuffer {
    /// Empty stack of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            blocks: Vec::new(),
            allocated: 0,
            generation: 0,
            max_allocated: 0,
            failed_allocations: 0,
        }
    }

    /// Buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes in use, headers included
    pub fn size(&self) -> usize {
        self.allocated
    }

    /// Number of live blocks
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Peak of `size()` since creation
    pub fn max_size_observed(&self) -> usize {
        self.max_allocated
    }

    /// Allocations refused for lack of space
    pub fn failed_allocations(&self) -> u32 {
        self.failed_allocations
    }

    fn reserve(&mut self, size: usize) -> Option<usize> {
        let new_size = self
            .allocated
            .checked_add(size)
            .and_then(|s| s.checked_add(BLOCK_HEADER_SIZE))
            .filter(|s| *s <= self.capacity());
        let Some(new_size) = new_size else {
            self.failed_allocations += 1;
            return None;
        };
        let offset = self.allocated;
        self.allocated = new_size;
        self.max_allocated = self.max_allocated.max(new_size);
        self.generation = self.generation.wrapping_add(1);
        Some(offset)
    }

    /// Allocate a zeroed block of `size` bytes, or `None` if it does not fit.
    pub fn allocate(&mut self, size: usize) -> Option<StackHandle> {
        let offset = self.reserve(size)?;
        self.data[offset..offset + size].fill(0);
        self.blocks.push(Block {
            size_before: offset,
            generation: self.generation,
            kind: BlockKind::Data { offset, len: size },
        });
        Some(StackHandle {
            offset: offset as u32,
            len: size as u32,
            generation: self.generation,
        })
    }

    /// Push a rollback record, or `false` if it does not fit.
    pub fn push_rollback(&mut self, record: RollbackRecord) -> bool {
        let Some(offset) = self.reserve(std::mem::size_of::<u32>()) else {
            return false;
        };
        self.blocks.push(Block {
            size_before: offset,
            generation: self.generation,
            kind: BlockKind::Rollback(record),
        });
        true
    }

    /// Release the most recent block. Returns its rollback record, if it was one.
    pub fn free(&mut self) -> Option<RollbackRecord> {
        let block = self.blocks.pop()?;
        self.allocated = block.size_before;
        match block.kind {
            BlockKind::Rollback(record) => Some(record),
            BlockKind::Data { .. } => None,
        }
    }

    /// Release every block
    pub fn free_all(&mut self) {
        self.blocks.clear();
        self.allocated = 0;
    }

    /// Release blocks until only `depth` remain, collecting rollback records.
    pub fn unwind_to(&mut self, depth: usize) -> Vec<RollbackRecord> {
        let mut released = Vec::new();
        while self.blocks.len() > depth {
            if let Some(record) = self.free() {
                released.push(record);
            }
        }
        released
    }

    /// Rollback records from the top of the stack down
    pub fn rollback_records(&self) -> impl Iterator<Item = RollbackRecord> + '_ {
        self.blocks.iter().rev().filter_map(|block| match block.kind {
            BlockKind::Rollback(record) => Some(record),
            BlockKind::Data { .. } => None,
        })
    }

    fn resolve(&self, handle: &StackHandle) -> Option<(usize, usize)> {
        let live = self.blocks.iter().rev().find(|b| b.generation == handle.generation)?;
        match live.kind {
            BlockKind::Data { offset, len } if offset == handle.offset as usize && len == handle.len as usize => {
                Some((offset, len))
            }
            _ => None,
        }
    }

    /// Payload of a live block
    pub fn bytes(&self, handle: &StackHandle) -> Option<&[u8]> {
        let (offset, len) = self.resolve(handle)?;
        Some(&self.data[offset..offset + len])
    }

    /// Mutable payload of a live block
    pub fn bytes_mut(&mut self, handle: &StackHandle) -> Option<&mut [u8]> {
        let (offset, len) = self.resolve(handle)?;
        Some(&mut self.data[offset..offset + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free_lifo() {
        let mut stack = StackBuffer::new(64);
        let a = stack.allocate(10).unwrap();
        let b = stack.allocate(20).unwrap();
        assert_eq!(stack.size(), 10 + 20 + 2 * BLOCK_HEADER_SIZE);
        stack.bytes_mut(&b).unwrap()[0] = 7;
        assert_eq!(stack.free(), None);
        assert!(stack.bytes(&b).is_none());
        assert_eq!(stack.size(), 10 + BLOCK_HEADER_SIZE);
        assert!(stack.bytes(&a).is_some());
        stack.free();
        assert_eq!(stack.size(), 0);
    }

    #[test]
    fn test_allocation_fails_when_full() {
        let mut stack = StackBuffer::new(32);
        assert!(stack.allocate(28).is_some());
        assert!(stack.allocate(0).is_none());
        assert_eq!(stack.failed_allocations(), 1);
        stack.free();
        assert!(stack.allocate(29).is_none());
        assert!(stack.allocate(usize::MAX).is_none());
    }

    #[test]
    fn test_reallocation_is_zeroed_and_stale_handles_rejected() {
        let mut stack = StackBuffer::new(64);
        let first = stack.allocate(8).unwrap();
        stack.bytes_mut(&first).unwrap().fill(0xff);
        stack.free();
        let second = stack.allocate(8).unwrap();
        assert!(stack.bytes(&first).is_none());
        assert_eq!(stack.bytes(&second).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn test_unwind_reports_rollback_records() {
        let mut stack = StackBuffer::new(128);
        stack.allocate(16).unwrap();
        let depth = stack.depth();
        assert!(stack.push_rollback(RollbackRecord::WriteLock(3)));
        stack.allocate(8).unwrap();
        assert!(stack.push_rollback(RollbackRecord::ReadLock(1)));
        let records: Vec<_> = stack.rollback_records().collect();
        assert_eq!(records, vec![RollbackRecord::ReadLock(1), RollbackRecord::WriteLock(3)]);

        let released = stack.unwind_to(depth);
        assert_eq!(released, vec![RollbackRecord::ReadLock(1), RollbackRecord::WriteLock(3)]);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.size(), 16 + BLOCK_HEADER_SIZE);
        stack.unwind_to(0);
        assert_eq!(stack.size(), 0);
    }
}
