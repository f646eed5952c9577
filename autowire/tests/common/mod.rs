#![allow(dead_code)]

use std::sync::Arc;

/// Routes the container's `tracing` events to the test output.
/// Set `RUST_LOG=fibre_autowire=trace` to see every resolution.
pub fn init_logging() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Whether two handles, possibly of different static types, point at the
/// same object.
pub fn same_object<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
  Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}
