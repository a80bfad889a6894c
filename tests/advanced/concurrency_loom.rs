#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for request id allocation using loom.
//!
//! `loom` explores interleavings of concurrent `next` calls to check that no
//! two callers observe the same identifier, including across the wrap.

use loom::{model, sync::Arc, thread};
use snacframe::RequestIdAllocator;

#[test]
fn concurrent_allocations_are_distinct() {
    model(|| {
        let alloc = Arc::new(RequestIdAllocator::new());
        let other = Arc::clone(&alloc);
        let t = thread::spawn(move || other.next());
        let mine = alloc.next();
        let theirs = t.join().expect("allocator thread panicked");
        assert_ne!(mine, theirs);
        assert!(mine.is_client() && theirs.is_client());
    });
}

#[test]
fn wrap_hands_out_each_slot_once() {
    model(|| {
        let alloc = Arc::new(RequestIdAllocator::with_range(1, 2));
        let other = Arc::clone(&alloc);
        let t = thread::spawn(move || other.next().as_u32());
        let mine = alloc.next().as_u32();
        let theirs = t.join().expect("allocator thread panicked");
        let mut seen = [mine, theirs];
        seen.sort_unstable();
        assert_eq!(seen, [1, 2]);
    });
}
