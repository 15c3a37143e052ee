//! Small helpers shared across the on-disk structures.

use std::mem::size_of;
use std::slice;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Views a `#[repr(C, packed)]` value as its raw on-disk bytes.
///
/// Safety: `T` must have no padding and no invalid bit patterns, which holds
/// for every `#[repr(C, packed)]` struct of plain integers used by this
/// crate's on-disk structures.
pub unsafe fn as_bytes<T>(v: &T) -> &[u8] {
	slice::from_raw_parts(v as *const T as *const u8, size_of::<T>())
}

/// Views a `#[repr(C, packed)]` value as its raw on-disk bytes, mutably.
///
/// Safety: see [`as_bytes`].
pub unsafe fn as_bytes_mut<T>(v: &mut T) -> &mut [u8] {
	slice::from_raw_parts_mut(v as *mut T as *mut u8, size_of::<T>())
}

/// Rounds `a / b` up to the nearest integer.
pub const fn ceil_div(a: u32, b: u32) -> u32 {
	(a + b - 1) / b
}

/// Returns the current time as (seconds, nanoseconds) since the Unix epoch.
pub fn now() -> (i64, u32) {
	let d = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::ZERO);
	(d.as_secs() as i64, d.subsec_nanos())
}
