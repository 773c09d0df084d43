//! Bearer-token checks

use subtle::ConstantTimeEq;

/// Constant-time comparison of two byte slices.
///
/// Prevents timing attacks where an attacker could learn how many bytes
/// match from the comparison time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Check a presented token against the configured secret.
///
/// A frame without a token never matches a configured secret.
#[must_use]
pub fn token_matches(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(token) => constant_time_eq(token.as_bytes(), expected.as_bytes()),
        None => expected.is_empty(),
    }
}
