//! Policy layer: the allocator's public operations and the helpers they
//! share (heap extension, best-fit search, placement with splitting, and
//! coalescing).
//!
//! [`Allocator`] owns everything the allocator needs: the heap bounds, the
//! `last`-block reference, the segregated index, and the [`HeapGrower`] it
//! grows through. It replaces the spec's global mutable state with an
//! ordinary value whose methods are the public operations — construction
//! does the job the spec's initialization routine does.

use std::ptr;

use crate::align::align_up;
use crate::block::{self, TAG_SIZE};
use crate::error::{HeapError, HeapResult};
use crate::freelist;
use crate::grower::HeapGrower;
use crate::segregated::SegregatedIndex;

/// A segregated free-list allocator over a monotonically growable heap.
pub struct Allocator<G: HeapGrower> {
  grower: G,
  align: usize,
  heap_base: *mut u8,
  heap_end: *mut u8,
  last: Option<*mut u8>,
  index: SegregatedIndex,
}

// Safety: every raw pointer an `Allocator` holds addresses memory owned
// exclusively by that `Allocator` (heap regions handed out by its own
// `HeapGrower`), never memory shared with another thread behind the
// caller's back. Moving the whole value to another thread, or accessing it
// from one under external synchronization (the process-wide singleton uses
// a `Mutex`), is sound as long as `G` itself is.
unsafe impl<G: HeapGrower + Send> Send for Allocator<G> {}

impl<G: HeapGrower> Allocator<G> {
  /// Builds a new allocator over `grower`, reserving the pad/prologue/
  /// epilogue sentinels up front.
  ///
  /// `align` is the host-supplied alignment constant `A` from the spec: a
  /// power of two, at least 8 (§6 names 16 as the practical value but
  /// requires the implementation to parameterize rather than hardwire it).
  pub fn new(mut grower: G, align: usize) -> HeapResult<Self> {
    debug_assert!(align.is_power_of_two() && align >= 8);

    // pad(TAG_SIZE) + prologue(2*align - 2*TAG_SIZE) + epilogue(TAG_SIZE) = 2*align,
    // which lands the first real block at heap_base + 2*align, itself a
    // multiple of `align` — see the open-question resolution in DESIGN.md.
    let reserve = align * 2;
    let base = grower.grow(reserve)?;
    let prologue = unsafe { base.add(TAG_SIZE) };
    let prologue_size = reserve - 2 * TAG_SIZE;
    let epilogue = unsafe { base.add(reserve - TAG_SIZE) };

    unsafe {
      // The epilogue has no successor of its own to touch, so it is
      // written directly rather than through `make_block`.
      block::write_raw_header(epilogue, 0, true, false);
      block::make_block(prologue, prologue_size, true, false);
    }

    tracing::debug!(?base, reserve, align, "heap initialized");

    Ok(Self {
      grower,
      align,
      heap_base: base,
      heap_end: unsafe { base.add(reserve) },
      last: None,
      index: SegregatedIndex::new(),
    })
  }

  /// The address of the first block a forward traversal should start at
  /// (the prologue).
  pub(crate) fn first_block(&self) -> *mut u8 {
    unsafe { self.heap_base.add(TAG_SIZE) }
  }

  pub(crate) fn heap_end(&self) -> *mut u8 {
    self.heap_end
  }

  pub(crate) fn heap_base(&self) -> *mut u8 {
    self.heap_base
  }

  pub(crate) fn last_block(&self) -> Option<*mut u8> {
    self.last
  }

  pub(crate) fn bucket_head(&self, bucket: usize) -> Option<*mut u8> {
    self.index.head(bucket)
  }

  /// The block size (header included) needed to satisfy a `requested`-byte
  /// payload, rounded up to the allocator's alignment.
  fn block_size_for(&self, requested: usize) -> HeapResult<usize> {
    let with_header = requested.checked_add(TAG_SIZE).ok_or(HeapError::Overflow)?;
    if with_header > usize::MAX - self.align {
      return Err(HeapError::Overflow);
    }
    Ok(align_up(with_header, self.align))
  }

  /// Requests `bytes` additional raw bytes from the grower and relocates
  /// the epilogue to the new heap end. Returns the address the old
  /// epilogue occupied — the start of the newly usable span.
  fn extend_raw(&mut self, bytes: usize) -> HeapResult<*mut u8> {
    self.grower.grow(bytes)?;
    let old_epilogue = unsafe { self.heap_end.sub(TAG_SIZE) };
    let new_heap_end = unsafe { self.heap_end.add(bytes) };
    let new_epilogue = unsafe { new_heap_end.sub(TAG_SIZE) };
    unsafe { block::write_raw_header(new_epilogue, 0, true, false) };
    self.heap_end = new_heap_end;
    Ok(old_epilogue)
  }

  /// §4.4.2: grows the heap to produce a fresh used block of exactly
  /// `asize` bytes (the caller has already subtracted any trailing free
  /// block's size from `bytes` so the two combine back to `asize`).
  fn extend_heap(&mut self, bytes: usize) -> HeapResult<*mut u8> {
    let merge_with_last = self.last.is_some_and(|l| unsafe { block::is_free(l) });

    let preserved_prevfree = if merge_with_last {
      unsafe { block::prevfree(self.last.unwrap()) }
    } else {
      let old_epilogue = unsafe { self.heap_end.sub(TAG_SIZE) };
      unsafe { block::prevfree(old_epilogue) }
    };

    let raw_base = self.extend_raw(bytes)?;

    let (base, total_size) = if merge_with_last {
      let last = self.last.unwrap();
      unsafe { self.index.remove(self.heap_base, last) };
      (last, bytes + unsafe { block::size(last) })
    } else {
      (raw_base, bytes)
    };

    unsafe { block::make_block(base, total_size, true, preserved_prevfree) };
    self.last = Some(base);
    tracing::trace!(?base, total_size, "heap extended for a new block");
    Ok(base)
  }

  /// §4.4.1: best-fit search starting at `asize`'s bucket.
  fn find_fit(&self, asize: usize) -> Option<*mut u8> {
    for bucket in crate::segregated::bucket_of(asize)..crate::segregated::BUCKET_COUNT {
      let mut best: Option<*mut u8> = None;
      let mut cur = self.index.head(bucket);
      while let Some(b) = cur {
        let sz = unsafe { block::size(b) };
        if sz >= asize {
          best = match best {
            None => Some(b),
            Some(prev_best) if sz < unsafe { block::size(prev_best) } => Some(b),
            Some(prev_best) => Some(prev_best),
          };
        }
        cur = unsafe { freelist::next_free(self.heap_base, b) };
      }
      if best.is_some() {
        return best;
      }
    }
    None
  }

  /// §4.4.3: removes `b` from its free list and carves out `asize` bytes
  /// for it, splitting off a free tail when the remainder is at least a
  /// minimum block.
  fn place(&mut self, b: *mut u8, asize: usize) -> *mut u8 {
    unsafe {
      self.index.remove(self.heap_base, b);
      let fsize = block::size(b);
      let incoming_prevfree = block::prevfree(b);

      if fsize - asize >= self.align {
        block::make_block(b, asize, true, incoming_prevfree);
        let remainder = b.add(asize);
        block::make_block(remainder, fsize - asize, false, false);
        self.index.insert(self.heap_base, remainder);
        if self.last.is_none_or(|l| remainder as usize > l as usize) {
          self.last = Some(remainder);
        }
      } else {
        block::make_block(b, fsize, true, incoming_prevfree);
      }

      b.add(TAG_SIZE)
    }
  }

  /// §4.4.4: merges `b` with any free neighbor(s) and reinserts the result.
  fn coalesce(&mut self, mut b: *mut u8) -> *mut u8 {
    unsafe {
      let mut size = block::size(b);
      let mut tail_involved = self.last == Some(b);

      let succ = b.add(size);
      if block::is_free(succ) {
        tail_involved |= self.last == Some(succ);
        self.index.remove(self.heap_base, succ);
        size += block::size(succ);
      }

      if block::prevfree(b) {
        let p = block::prev(b);
        self.index.remove(self.heap_base, p);
        size += block::size(p);
        b = p;
      }

      let new_prevfree = block::prevfree(b);
      block::make_block(b, size, false, new_prevfree);
      self.index.insert(self.heap_base, b);

      if tail_involved {
        self.last = Some(b);
      }
      b
    }
  }

  /// Services a `malloc`-shaped request.
  pub fn allocate(&mut self, requested: usize) -> HeapResult<*mut u8> {
    if requested == 0 {
      return Ok(ptr::null_mut());
    }
    let asize = self.block_size_for(requested)?;

    if let Some(b) = self.find_fit(asize) {
      return Ok(self.place(b, asize));
    }

    let mut extend_by = asize;
    if let Some(last) = self.last {
      if unsafe { block::is_free(last) } {
        extend_by -= unsafe { block::size(last) };
      }
    }
    let b = self.extend_heap(extend_by)?;
    Ok(unsafe { b.add(TAG_SIZE) })
  }

  /// Services a `free`-shaped request. A null `payload` is a no-op.
  pub fn deallocate(&mut self, payload: *mut u8) {
    if payload.is_null() {
      return;
    }
    unsafe {
      let b = payload.sub(TAG_SIZE);
      let keep_prevfree = block::prevfree(b);
      block::make_block(b, block::size(b), false, keep_prevfree);

      let succ = b.add(block::size(b));
      if keep_prevfree || block::is_free(succ) {
        self.coalesce(b);
      } else {
        self.index.insert(self.heap_base, b);
      }
    }
    tracing::trace!(?payload, "block freed");
  }

  /// Services a `realloc`-shaped request.
  pub fn reallocate(&mut self, payload: *mut u8, new_size: usize) -> HeapResult<*mut u8> {
    if payload.is_null() {
      return self.allocate(new_size);
    }
    if new_size == 0 {
      self.deallocate(payload);
      return Ok(ptr::null_mut());
    }

    let asize = self.block_size_for(new_size)?;

    unsafe {
      let b = payload.sub(TAG_SIZE);
      let bsize = block::size(b);
      let succ = b.add(bsize);
      let succ_free = block::is_free(succ);
      let avail = bsize + if succ_free { block::size(succ) } else { 0 };

      if avail >= asize {
        let touches_last = self.last == Some(b) || (succ_free && self.last == Some(succ));
        if succ_free {
          self.index.remove(self.heap_base, succ);
        }
        let prevfree_b = block::prevfree(b);

        if avail - asize >= self.align {
          block::make_block(b, asize, true, prevfree_b);
          let tail = b.add(asize);
          block::make_block(tail, avail - asize, false, false);
          self.index.insert(self.heap_base, tail);
          if touches_last {
            self.last = Some(tail);
          }
        } else {
          block::make_block(b, avail, true, prevfree_b);
          if touches_last {
            self.last = Some(b);
          }
        }
        return Ok(payload);
      }

      let grow_in_place = (!succ_free && self.last == Some(b)) || (succ_free && self.last == Some(succ));
      if grow_in_place {
        if succ_free {
          self.index.remove(self.heap_base, succ);
        }
        let preserved_prevfree = block::prevfree(b);
        self.extend_raw(asize - avail)?;
        block::make_block(b, asize, true, preserved_prevfree);
        self.last = Some(b);
        return Ok(payload);
      }
    }

    let new_payload = self.allocate(new_size)?;
    if new_payload.is_null() {
      return Ok(ptr::null_mut());
    }
    unsafe {
      let b = payload.sub(TAG_SIZE);
      let copy_len = (block::size(b) - TAG_SIZE).min(new_size);
      ptr::copy_nonoverlapping(payload, new_payload, copy_len);
    }
    self.deallocate(payload);
    Ok(new_payload)
  }

  /// Services a `calloc`-shaped request: `nmemb * size` bytes, zeroed.
  pub fn zeroed_allocate(&mut self, nmemb: usize, size: usize) -> HeapResult<*mut u8> {
    let total = nmemb.checked_mul(size).ok_or(HeapError::Overflow)?;
    let payload = self.allocate(total)?;
    if !payload.is_null() {
      unsafe { ptr::write_bytes(payload, 0, total) };
    }
    Ok(payload)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grower::VecGrower;

  fn fresh(capacity: usize) -> Allocator<VecGrower> {
    Allocator::new(VecGrower::with_capacity(capacity), 16).unwrap()
  }

  #[test]
  fn malloc_zero_returns_null_without_mutation() {
    let mut a = fresh(4096);
    let end_before = a.heap_end();
    assert!(a.allocate(0).unwrap().is_null());
    assert_eq!(a.heap_end(), end_before);
  }

  #[test]
  fn smallest_allocation_carves_minimum_block() {
    let mut a = fresh(4096);
    let p = a.allocate(1).unwrap();
    assert!(!p.is_null());
    unsafe {
      let b = p.sub(TAG_SIZE);
      assert_eq!(block::size(b), 16);
    }
  }

  #[test]
  fn free_then_allocate_same_size_reuses_address() {
    let mut a = fresh(4096);
    let p = a.allocate(24).unwrap();
    a.deallocate(p);
    let q = a.allocate(24).unwrap();
    assert_eq!(p, q);
  }

  #[test]
  fn adjacent_frees_coalesce() {
    let mut a = fresh(4096);
    let p = a.allocate(24).unwrap();
    let q = a.allocate(24).unwrap();
    a.deallocate(p);
    a.deallocate(q);
    // two adjacent 32-byte blocks merge into one 64-byte free block.
    unsafe {
      let head = a.bucket_head(crate::segregated::bucket_of(64));
      assert!(head.is_some());
      assert_eq!(block::size(head.unwrap()), 64);
    }
  }

  #[test]
  fn split_leaves_a_free_tail() {
    let mut a = fresh(4096);
    let p = a.allocate(40).unwrap(); // carves a 48-byte block.
    a.deallocate(p);
    let q = a.allocate(16).unwrap(); // needs only 32, splits off a 16-byte tail.
    assert_eq!(p, q);
    let tail_head = a.bucket_head(crate::segregated::bucket_of(16));
    assert!(tail_head.is_some());
    unsafe { assert_eq!(block::size(tail_head.unwrap()), 16) };
  }

  #[test]
  fn realloc_null_is_malloc() {
    let mut a = fresh(4096);
    let p = a.reallocate(ptr::null_mut(), 32).unwrap();
    assert!(!p.is_null());
  }

  #[test]
  fn realloc_zero_frees_and_returns_null() {
    let mut a = fresh(4096);
    let p = a.allocate(32).unwrap();
    let r = a.reallocate(p, 0).unwrap();
    assert!(r.is_null());
  }

  #[test]
  fn realloc_last_block_grows_in_place() {
    let mut a = fresh(1 << 16);
    let p = a.allocate(100).unwrap();
    let q = a.reallocate(p, 200).unwrap();
    assert_eq!(p, q);
  }

  #[test]
  fn realloc_with_used_neighbor_relocates_and_copies() {
    let mut a = fresh(1 << 16);
    let p = a.allocate(100).unwrap();
    unsafe { ptr::write_bytes(p, 0xAB, 100) };
    let _q = a.allocate(8).unwrap();
    let r = a.reallocate(p, 200).unwrap();
    assert_ne!(r, p);
    let mut expected = vec![0xABu8; 100];
    let mut actual = vec![0u8; 100];
    unsafe { ptr::copy_nonoverlapping(r, actual.as_mut_ptr(), 100) };
    expected.truncate(100);
    assert_eq!(actual, expected);
  }

  #[test]
  fn calloc_zeroes_memory() {
    let mut a = fresh(4096);
    let p = a.zeroed_allocate(16, 4).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn calloc_overflow_returns_error() {
    let mut a = fresh(4096);
    let result = a.zeroed_allocate(usize::MAX, 2);
    assert_eq!(result, Err(HeapError::Overflow));
  }

  #[test]
  fn many_allocations_then_reverse_frees_leave_one_big_block() {
    let mut a = fresh(1 << 20);
    let mut ptrs = Vec::new();
    for _ in 0..512 {
      ptrs.push(a.allocate(32).unwrap());
    }
    for &p in ptrs.iter().rev() {
      a.deallocate(p);
    }
    let head = a.bucket_head(crate::segregated::BUCKET_COUNT - 1);
    assert!(head.is_some());
    unsafe {
      assert!(freelist::next_free(a.heap_base(), head.unwrap()).is_none());
    }
  }

  #[test]
  fn out_of_memory_returns_error_and_leaves_heap_intact() {
    let mut a = fresh(64); // only room for init sentinels, nothing more.
    let end_before = a.heap_end();
    let last_before = a.last_block();
    let result = a.allocate(1 << 20);
    assert_eq!(result, Err(HeapError::OutOfMemory));
    assert_eq!(a.heap_end(), end_before);
    assert_eq!(a.last_block(), last_before);
  }
}
