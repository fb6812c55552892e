//! # segalloc — a segregated free-list allocator
//!
//! This crate provides a general-purpose dynamic storage allocator that
//! manages a single contiguous, monotonically extensible byte region (the
//! "heap") and services allocate/free/reallocate/zero-allocate requests
//! against it, in the shape of the standard `malloc`/`free`/`realloc`/
//! `calloc` interface.
//!
//! ## Design
//!
//! ```text
//!   Boundary-tag block:
//!
//!   ┌─────────┬──────────────────────────────────────┬─────────┐
//!   │ header  │              payload                 │ footer  │
//!   │  4 B    │   size − 4 (used) / size − 8 (free)   │  4 B*   │
//!   └─────────┴──────────────────────────────────────┴─────────┘
//!                                                     * free blocks only
//! ```
//!
//! Free blocks are additionally threaded onto one of nine segregated
//! free lists, bucketed by size class, so placement only has to search
//! the list whose blocks are already roughly the right size. Free-list
//! sibling pointers are stored as 4-byte heap-relative offsets rather
//! than native pointers, which is what keeps the minimum block size at
//! 16 bytes regardless of host pointer width.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align       - alignment helpers (align_up, align_to!)
//!   ├── error       - the internal HeapError taxonomy
//!   ├── grower      - the sbrk-like heap growth abstraction
//!   ├── block       - boundary-tag header/footer layer
//!   ├── freelist    - compressed free-list link layer
//!   ├── segregated  - the nine-bucket free-list index
//!   ├── heap        - the Allocator type and its public operations
//!   └── debug       - check_heap, an optional diagnostic heap walker
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use segalloc::Allocator;
//! use segalloc::grower::VecGrower;
//!
//! let mut allocator = Allocator::new(VecGrower::with_capacity(4096), 16).unwrap();
//! let p = allocator.allocate(24).unwrap();
//! assert!(!p.is_null());
//! allocator.deallocate(p);
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded core**: the [`Allocator`] type itself has no internal
//!   synchronization; the process-wide [`malloc`]/[`free`]/[`realloc`]/
//!   [`calloc`] functions serialize access with a mutex so they're safe to
//!   call from multiple threads, but concurrent calls simply block rather
//!   than proceed in parallel.
//! - **Heap only grows**: freed memory is reused internally but never
//!   returned to the operating system.
//! - **No misuse hardening**: double-free, freeing an unowned pointer, and
//!   writing past a payload are all undefined behavior, matching the
//!   contract of the interface this crate replaces.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! The boundary-tag, free-list, and segregated-index layers operate on raw
//! `*mut u8` addresses with no bounds checking; callers of [`Allocator`]'s
//! public operations, and the public C-style functions built on it, uphold
//! the usual `malloc` family contract instead.

pub mod align;
mod block;
pub mod debug;
pub mod error;
mod freelist;
pub mod grower;
pub mod heap;
mod segregated;

use std::sync::Mutex;
use std::sync::OnceLock;

pub use error::{HeapError, HeapResult};
pub use heap::Allocator;

use grower::SbrkGrower;

fn global() -> &'static Mutex<Allocator<SbrkGrower>> {
  static INSTANCE: OnceLock<Mutex<Allocator<SbrkGrower>>> = OnceLock::new();
  INSTANCE.get_or_init(|| {
    Mutex::new(Allocator::new(SbrkGrower::new(), align::DEFAULT_ALIGN).expect("failed to initialize process heap"))
  })
}

/// Allocates `size` bytes from the process-wide heap. Returns null on
/// failure or when `size` is zero.
pub fn malloc(size: usize) -> *mut u8 {
  global().lock().unwrap().allocate(size).unwrap_or(std::ptr::null_mut())
}

/// Releases a block previously returned by [`malloc`], [`realloc`], or
/// [`calloc`]. A null `ptr` is a no-op.
pub fn free(ptr: *mut u8) {
  global().lock().unwrap().deallocate(ptr);
}

/// Resizes a previously allocated block, preserving its contents up to the
/// smaller of the old and new sizes. See [`Allocator::reallocate`] for the
/// null/zero special cases.
pub fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
  global().lock().unwrap().reallocate(ptr, size).unwrap_or(std::ptr::null_mut())
}

/// Allocates `nmemb * size` zero-initialized bytes. Returns null on
/// overflow or allocation failure.
pub fn calloc(nmemb: usize, size: usize) -> *mut u8 {
  global().lock().unwrap().zeroed_allocate(nmemb, size).unwrap_or(std::ptr::null_mut())
}

/// C-ABI exports, for linking this crate in place of the system allocator
/// (e.g. via `LD_PRELOAD` or a direct link-time substitution).
#[cfg(feature = "capi")]
mod capi {
  use std::ffi::c_void;

  #[unsafe(no_mangle)]
  pub extern "C" fn malloc(size: usize) -> *mut c_void {
    super::malloc(size) as *mut c_void
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn free(ptr: *mut c_void) {
    super::free(ptr as *mut u8)
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    super::realloc(ptr as *mut u8, size) as *mut c_void
  }

  #[unsafe(no_mangle)]
  pub extern "C" fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    super::calloc(nmemb, size) as *mut c_void
  }
}
