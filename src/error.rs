//! The allocator's internal error taxonomy.
//!
//! The public C-ABI surface (`malloc`/`free`/`realloc`/`calloc`) has no room
//! for a typed error — it communicates failure the only way that interface
//! allows, a null pointer. Internally, though, the policy layer threads a
//! real [`HeapError`] through `Result` so its helpers compose with `?`; only
//! [`crate::malloc`], [`crate::realloc`] and [`crate::calloc`] collapse that
//! back down to `null`.

use thiserror::Error;

/// Failure modes the policy layer can hit while servicing a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// The heap-growth primitive could not supply more memory.
  #[error("heap growth primitive is exhausted")]
  OutOfMemory,

  /// A size computation overflowed (e.g. `calloc`'s `nmemb * size`, or a
  /// requested size so large that rounding it up to the block alignment
  /// would wrap).
  #[error("requested size overflows a block size computation")]
  Overflow,
}

pub type HeapResult<T> = Result<T, HeapError>;
