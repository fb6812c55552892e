//! Boundary-tag layer.
//!
//! Every block in the heap begins with a 4-byte header packing its size and
//! two flag bits (`used`, `prevfree`) into a single `u32`. Free blocks carry
//! an identical 4-byte footer so a backward scan can recover the size of
//! the block immediately preceding any block whose `prevfree` bit is set,
//! without every allocated block paying for a footer it doesn't need.
//!
//! All functions here work in terms of raw `*mut u8` addresses into the
//! heap region; they carry no information about the heap's extent and
//! perform no bounds checking, matching the spec's "no type information"
//! framing of the region. Callers ([`crate::heap::Allocator`]) are
//! responsible for only ever pointing these at valid block headers.

use std::ptr;

use static_assertions::const_assert;

/// Width, in bytes, of a header or footer word.
pub const TAG_SIZE: usize = 4;

const USED_BIT: u32 = 0b01;
const PREVFREE_BIT: u32 = 0b10;
const FLAG_BITS: u32 = USED_BIT | PREVFREE_BIT;

// The low two bits of a size are always free to use as flags because every
// block size is a multiple of at least 4 (the smallest alignment the spec
// allows).
const_assert!(FLAG_BITS < 4);

#[inline]
unsafe fn read_word(addr: *mut u8) -> u32 {
  unsafe { ptr::read_unaligned(addr as *const u32) }
}

#[inline]
unsafe fn write_word(addr: *mut u8, word: u32) {
  unsafe { ptr::write_unaligned(addr as *mut u32, word) }
}

#[inline]
fn pack(size: usize, used: bool, prevfree: bool) -> u32 {
  debug_assert_eq!(size & FLAG_BITS as usize, 0, "block size must be a multiple of 4");
  size as u32 | if used { USED_BIT } else { 0 } | if prevfree { PREVFREE_BIT } else { 0 }
}

/// Reads the size encoded in the block's header, in bytes.
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn size(b: *mut u8) -> usize {
  (unsafe { read_word(b) } & !FLAG_BITS) as usize
}

/// Reads the block's `used` flag.
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn is_used(b: *mut u8) -> bool {
  (unsafe { read_word(b) }) & USED_BIT != 0
}

/// Reads the block's `free` state (the complement of [`is_used`]).
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn is_free(b: *mut u8) -> bool {
  unsafe { !is_used(b) }
}

/// Reads the block's `prevfree` flag: whether the block immediately
/// preceding `b` in address order is free.
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn prevfree(b: *mut u8) -> bool {
  (unsafe { read_word(b) }) & PREVFREE_BIT != 0
}

/// Address of `b`'s footer, valid only when `b` is a free block.
///
/// # Safety
/// `b` must point at a valid free block header.
#[inline]
pub unsafe fn footer_addr(b: *mut u8) -> *mut u8 {
  unsafe { b.add(size(b) - TAG_SIZE) }
}

/// Reads `b`'s footer word. Only meaningful for free blocks.
///
/// # Safety
/// `b` must point at a valid free block header with a corresponding footer.
#[inline]
pub unsafe fn footer(b: *mut u8) -> u32 {
  unsafe { read_word(footer_addr(b)) }
}

/// Locates the block immediately preceding `b`, which is only possible when
/// `prevfree(b)` holds: the previous block's footer, sitting in the 4 bytes
/// immediately before `b`, records its size.
///
/// # Safety
/// Callers must check `prevfree(b)` before calling; if it's clear there is
/// no footer to read and this function's result is meaningless.
#[inline]
pub unsafe fn prev(b: *mut u8) -> *mut u8 {
  unsafe {
    let prev_footer = b.sub(TAG_SIZE);
    let prev_size = (read_word(prev_footer) & !FLAG_BITS) as usize;
    b.sub(prev_size)
  }
}

/// Sets `b`'s `prevfree` bit, recording that the block immediately
/// preceding `b` in address order is free. Refreshes `b`'s footer too, if
/// `b` is itself free (a free block's footer must mirror its header
/// bit-for-bit).
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn set_prevfree(b: *mut u8) {
  unsafe {
    let word = read_word(b) | PREVFREE_BIT;
    write_word(b, word);
    if word & USED_BIT == 0 {
      write_word(footer_addr(b), word);
    }
  }
}

/// Clears `b`'s `prevfree` bit. See [`set_prevfree`].
///
/// # Safety
/// `b` must point at a valid block header.
#[inline]
pub unsafe fn clear_prevfree(b: *mut u8) {
  unsafe {
    let word = read_word(b) & !PREVFREE_BIT;
    write_word(b, word);
    if word & USED_BIT == 0 {
      write_word(footer_addr(b), word);
    }
  }
}

/// Writes a block header (and, for free blocks, footer) at `b`, then
/// maintains the `prevfree` invariant on `b`'s successor — the block
/// immediately at `b + size`, which in practice is either another real
/// block or the epilogue — via [`set_prevfree`]/[`clear_prevfree`].
///
/// # Safety
/// `b` must point at valid, writable memory for at least `size` bytes, and
/// `b + size` must point at a valid (already-initialized) block header.
pub unsafe fn make_block(b: *mut u8, size: usize, used: bool, prevfree: bool) {
  unsafe {
    let word = pack(size, used, prevfree);
    write_word(b, word);
    if !used {
      write_word(footer_addr(b), word);
    }

    let succ = b.add(size);
    if used {
      clear_prevfree(succ);
    } else {
      set_prevfree(succ);
    }
  }
}

/// Writes a block header in isolation, touching no successor.
///
/// Used only for the two sentinels that don't have a "successor" in the
/// usual sense: the epilogue (whose successor would be out of bounds) and
/// the very first write to a brand-new epilogue/prologue pair during
/// allocator initialization, before any real predecessor/successor
/// relationship exists to maintain.
///
/// # Safety
/// `addr` must point at valid, writable memory for at least [`TAG_SIZE`]
/// bytes.
#[inline]
pub unsafe fn write_raw_header(addr: *mut u8, size: usize, used: bool, prevfree: bool) {
  unsafe { write_word(addr, pack(size, used, prevfree)) }
}
