//! Integration test binary -- all integration tests consolidated into a single
//! binary.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod deletion_sweep;
mod dispatch_end_to_end;
mod progress_lifecycle;
