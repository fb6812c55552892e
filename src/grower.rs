//! The heap-growth primitive the allocator is built on top of.
//!
//! The specification calls this collaborator "sbrk-like": something that can
//! only ever extend a contiguous region and hands back the address of the
//! newly appended bytes. [`HeapGrower`] is that abstraction; [`SbrkGrower`]
//! is the production implementation (a thin wrapper over `libc::sbrk`, in
//! the same spirit as this crate's bump-allocator ancestor); [`VecGrower`]
//! is a deterministic, process-heap-independent stand-in used by tests so
//! the policy layer's structural invariants can be checked without
//! perturbing the test harness's own allocations.

use std::ffi::c_void;

use crate::error::{HeapError, HeapResult};

/// Something that can monotonically extend a contiguous byte region.
///
/// # Safety
///
/// Implementors must return a pointer to `bytes` freshly-appended,
/// previously-unused bytes, adjacent to (and immediately following) every
/// region returned by prior calls. The allocator relies on this contiguity
/// for its boundary-tag traversal.
pub unsafe trait HeapGrower {
  /// Requests `bytes` additional bytes. Returns the address of the first
  /// newly appended byte, or `Err(HeapError::OutOfMemory)` if the region
  /// could not be extended. On failure the region is left exactly as it
  /// was — no partial growth.
  fn grow(&mut self, bytes: usize) -> HeapResult<*mut u8>;
}

/// Grows the heap via the POSIX `sbrk(2)` system call.
///
/// This is the collaborator named in the specification's external
/// interfaces (§6): a synchronous call whose only failure mode is an
/// out-of-memory sentinel (`sbrk` returning `(void*)-1`).
#[derive(Debug, Default)]
pub struct SbrkGrower {
  _private: (),
}

impl SbrkGrower {
  pub const fn new() -> Self {
    Self { _private: () }
  }
}

// Safety: `sbrk` hands back memory immediately adjacent to the current
// program break and never reuses previously-returned addresses.
unsafe impl HeapGrower for SbrkGrower {
  fn grow(&mut self, bytes: usize) -> HeapResult<*mut u8> {
    let addr = unsafe { libc::sbrk(bytes as libc::intptr_t) };
    if addr == usize::MAX as *mut c_void {
      tracing::warn!(bytes, "sbrk exhausted, heap cannot grow");
      return Err(HeapError::OutOfMemory);
    }
    tracing::trace!(bytes, ?addr, "sbrk grew the heap");
    Ok(addr as *mut u8)
  }
}

/// A fixed-capacity, heap-independent stand-in for [`SbrkGrower`] used in
/// tests.
///
/// The backing buffer is allocated once, up front, and never reallocated —
/// growth only ever advances an internal cursor within it — so pointers
/// handed out by `grow` stay valid for the grower's lifetime exactly like
/// real `sbrk`-obtained addresses do.
pub struct VecGrower {
  buf: Vec<u8>,
  len: usize,
}

impl VecGrower {
  /// Creates a grower backed by `capacity` pre-allocated bytes.
  pub fn with_capacity(capacity: usize) -> Self {
    Self { buf: vec![0u8; capacity], len: 0 }
  }
}

// Safety: the backing `Vec` is allocated once in `with_capacity` and never
// resized afterwards, so addresses handed out by `grow` remain valid and
// are never reused for the lifetime of the grower.
unsafe impl HeapGrower for VecGrower {
  fn grow(&mut self, bytes: usize) -> HeapResult<*mut u8> {
    if self.len + bytes > self.buf.len() {
      return Err(HeapError::OutOfMemory);
    }
    let addr = unsafe { self.buf.as_mut_ptr().add(self.len) };
    self.len += bytes;
    Ok(addr)
  }
}
