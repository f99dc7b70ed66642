//! Helpers for the fixed-size, NUL-terminated name arrays Vulkan reports.

use std::cmp::Ordering;
use std::ffi::{c_char, CStr};

/// Views a driver-filled name array as a `CStr`. A missing terminator yields
/// the empty name.
pub fn raw_name(raw: &[c_char]) -> &CStr {
    // SAFETY: c_char and u8 share size and alignment.
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr().cast::<u8>(), raw.len()) };
    CStr::from_bytes_until_nul(bytes).unwrap_or_default()
}

/// Returns the first `required` name absent from `available`.
///
/// Both lists must be sorted ascending. One forward pass over each.
pub fn first_missing<'r>(required: &[&'r CStr], available: &[&CStr]) -> Option<&'r CStr> {
    let mut have = available.iter().peekable();
    'next: for &want in required {
        while let Some(&&name) = have.peek() {
            match name.cmp(want) {
                Ordering::Less => {
                    have.next();
                }
                Ordering::Equal => continue 'next,
                Ordering::Greater => return Some(want),
            }
        }
        return Some(want);
    }
    None
}

/// Sorts and dedups a name list so it can feed [`first_missing`].
pub fn sort_names(names: &mut Vec<&CStr>) {
    names.sort_unstable();
    names.dedup();
}
