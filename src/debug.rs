//! Diagnostic heap walker (spec §6's optional debug surface).
//!
//! `check_heap` is a print-for-humans tool, not a telemetry source: it writes
//! straight to stdout rather than through `tracing`, mirroring the spec's
//! framing of it as a debugging aid external to the allocator's normal
//! operation. It never mutates allocator state.

use crate::block;
use crate::freelist;
use crate::grower::HeapGrower;
use crate::heap::Allocator;
use crate::segregated::BUCKET_COUNT;

impl<G: HeapGrower> Allocator<G> {
  /// Walks every block in address order, then every free-list bucket,
  /// printing what it finds. With `verbose` set, prints a line per block;
  /// otherwise only prints a final block count per bucket.
  pub fn check_heap(&self, verbose: bool) {
    println!("== heap [{:p}, {:p}) ==", self.heap_base(), self.heap_end());

    let mut cur = self.first_block();
    let mut index = 0usize;
    loop {
      let size = unsafe { block::size(cur) };
      if verbose {
        println!(
          "  [{index}] {cur:p} size={size} used={} prevfree={}",
          unsafe { block::is_used(cur) },
          unsafe { block::prevfree(cur) },
        );
      }
      if size == 0 {
        break;
      }
      cur = unsafe { cur.add(size) };
      index += 1;
    }
    println!("  {index} blocks walked (including epilogue)");

    for bucket in 0..BUCKET_COUNT {
      let mut count = 0usize;
      let mut cur = self.bucket_head(bucket);
      while let Some(b) = cur {
        if verbose {
          println!("  bucket[{bucket}] -> {b:p} size={}", unsafe { block::size(b) });
        }
        count += 1;
        cur = unsafe { freelist::next_free(self.heap_base(), b) };
      }
      if count > 0 || verbose {
        println!("  bucket[{bucket}]: {count} free blocks");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grower::VecGrower;

  #[test]
  fn check_heap_does_not_panic_on_a_mixed_heap() {
    let mut a = Allocator::new(VecGrower::with_capacity(4096), 16).unwrap();
    let p = a.allocate(32).unwrap();
    let _q = a.allocate(64).unwrap();
    a.deallocate(p);
    a.check_heap(true);
    a.check_heap(false);
  }
}
