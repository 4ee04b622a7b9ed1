//! Cache key derivation
//!
//! Keys have the form `<student>::<code>`. Each component is escaped so that
//! only ASCII alphanumerics, `-`, `_` and `.` appear verbatim; every other
//! byte is percent-encoded. The separator therefore never occurs inside a
//! component, which makes the mapping injective and guarantees that
//! [`student_prefix`] matches exactly one student's keys.

use std::fmt::Write;

use super::error::{CacheError, Result};

/// Separator between the student and misconception components
pub const KEY_SEPARATOR: &str = "::";

/// Derive the cache key for a (student, misconception) pair
pub fn derive_key(student_id: &str, misconception_code: &str) -> Result<String> {
    let mut key = student_prefix(student_id)?;
    if misconception_code.is_empty() {
        return Err(CacheError::InvalidInput(
            "misconception code must not be empty".to_string(),
        ));
    }
    escape_into(&mut key, misconception_code);
    Ok(key)
}

/// Key prefix shared by every entry of one student
pub fn student_prefix(student_id: &str) -> Result<String> {
    if student_id.is_empty() {
        return Err(CacheError::InvalidInput(
            "student id must not be empty".to_string(),
        ));
    }
    let mut prefix = String::with_capacity(student_id.len() + KEY_SEPARATOR.len());
    escape_into(&mut prefix, student_id);
    prefix.push_str(KEY_SEPARATOR);
    Ok(prefix)
}

fn escape_into(out: &mut String, component: &str) {
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(byte as char);
        } else {
            // Writing to a String cannot fail
            let _ = write!(out, "%{:02X}", byte);
        }
    }
}
