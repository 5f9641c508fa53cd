use crate::*;
use context::OpContext;

mod disk_tests;

/// Deterministic payload for index-derived test content.
pub(crate) fn payload(i: u64) -> Vec<u8> {
    format!("content-{i}").into_bytes()
}
