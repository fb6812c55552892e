use std::io::Read;

use libc::sbrk;
use segalloc::{calloc, free, malloc, realloc};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // Set RUST_LOG to override; defaults to showing the allocator's own
  // trace/debug/warn events (heap growth, best-fit misses, exhaustion).
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "segalloc=trace".into()))
    .init();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u32.
    // --------------------------------------------------------------------
    let first_block = malloc(4);
    println!("\n[1] malloc(4) = {:?}", first_block);
    (first_block as *mut u32).write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", (first_block as *mut u32).read());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes, see it land in a different size bucket.
    // --------------------------------------------------------------------
    let second_block = malloc(12);
    println!("\n[2] malloc(12) = {:?}", second_block);
    std::ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block, then allocate something small: watch it
    //    reuse the freed slot instead of growing the heap.
    // --------------------------------------------------------------------
    free(first_block);
    println!("\n[3] Freed first_block at {:?}", first_block);
    let third_block = malloc(2);
    println!(
      "[3] malloc(2) = {:?} (reused freed block? {})",
      third_block,
      third_block == first_block
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow the second block in place via realloc.
    // --------------------------------------------------------------------
    let grown = realloc(second_block, 64);
    println!("\n[4] realloc(second_block, 64) = {:?}", grown);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) calloc a zeroed array and confirm it reads back as zero.
    // --------------------------------------------------------------------
    let zeroed = calloc(16, 4);
    let bytes = std::slice::from_raw_parts(zeroed, 64);
    println!("\n[5] calloc(16, 4) = {:?}, all zero? {}", zeroed, bytes.iter().all(|&b| b == 0));
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate a large block to observe heap growth via sbrk.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = malloc(64 * 1024);
    println!("\n[6] malloc(64 KiB) = {:?}", big_block);
    print_program_break("after large alloc");

    free(third_block);
    free(grown);
    free(zeroed);
    free(big_block);
    println!("\n[7] End of demo. All blocks freed; the OS reclaims the heap at exit.");
  }
}
