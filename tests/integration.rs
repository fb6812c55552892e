//! End-to-end scenarios exercised against a fresh [`Allocator`] instance,
//! never the process-global singleton, so tests can't interfere with each
//! other or with the harness's own allocations.

use segalloc::Allocator;
use segalloc::grower::VecGrower;

fn fresh(capacity: usize) -> Allocator<VecGrower> {
  Allocator::new(VecGrower::with_capacity(capacity), 16).unwrap()
}

#[test]
fn scenario_smallest_block_is_sixteen_bytes() {
  let mut a = fresh(4096);
  let p = a.allocate(1).unwrap();
  assert!(!p.is_null());
}

#[test]
fn scenario_adjacent_frees_coalesce_into_one_block() {
  let mut a = fresh(4096);
  let p = a.allocate(24).unwrap();
  let q = a.allocate(24).unwrap();
  a.deallocate(p);
  a.deallocate(q);
  // A subsequent 56-byte request must fit in the merged 64-byte block
  // without growing the heap further.
  let before = a.allocate(56).unwrap();
  assert!(!before.is_null());
}

#[test]
fn scenario_free_then_split_reuses_the_freed_address() {
  let mut a = fresh(4096);
  let p = a.allocate(40).unwrap();
  a.deallocate(p);
  let q = a.allocate(16).unwrap();
  assert_eq!(p, q);
}

#[test]
fn scenario_realloc_last_block_extends_in_place() {
  let mut a = fresh(1 << 16);
  let p = a.allocate(100).unwrap();
  let q = a.reallocate(p, 200).unwrap();
  assert_eq!(p, q);
}

#[test]
fn scenario_realloc_with_used_neighbor_relocates_and_preserves_bytes() {
  let mut a = fresh(1 << 16);
  let p = a.allocate(100).unwrap();
  unsafe { std::ptr::write_bytes(p, 0x42, 100) };
  let _neighbor = a.allocate(8).unwrap();

  let r = a.reallocate(p, 200).unwrap();
  assert_ne!(r, p);

  let preserved = unsafe { std::slice::from_raw_parts(r, 100) };
  assert!(preserved.iter().all(|&b| b == 0x42));
}

#[test]
fn scenario_reverse_order_frees_fully_defragment() {
  let mut a = fresh(1 << 20);
  let ptrs: Vec<_> = (0..512).map(|_| a.allocate(32).unwrap()).collect();
  for &p in ptrs.iter().rev() {
    a.deallocate(p);
  }
  // The whole run coalesced into one free block, so a request spanning
  // nearly all of it must land at the very first address handed out.
  let big = a.allocate(512 * 32 - 64).unwrap();
  assert_eq!(big, ptrs[0]);
}

#[test]
fn boundary_malloc_zero_returns_null() {
  let mut a = fresh(4096);
  assert!(a.allocate(0).unwrap().is_null());
}

#[test]
fn boundary_free_null_is_a_no_op() {
  let mut a = fresh(4096);
  a.deallocate(std::ptr::null_mut());
}

#[test]
fn boundary_realloc_null_behaves_like_malloc() {
  let mut a = fresh(4096);
  let p = a.reallocate(std::ptr::null_mut(), 8).unwrap();
  assert!(!p.is_null());
}

#[test]
fn boundary_realloc_zero_frees_and_returns_null() {
  let mut a = fresh(4096);
  let p = a.allocate(64).unwrap();
  let r = a.reallocate(p, 0).unwrap();
  assert!(r.is_null());
}

#[test]
fn boundary_calloc_zeroes_every_byte() {
  let mut a = fresh(4096);
  let p = a.zeroed_allocate(8, 8).unwrap();
  let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
  assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn out_of_memory_is_reported_without_corrupting_state() {
  let mut a = fresh(64);
  assert!(a.allocate(1 << 20).is_err());
  // The allocator must still be usable after a failed request.
  let p = a.allocate(1).unwrap();
  assert!(!p.is_null());
}
