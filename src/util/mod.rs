//! Utility module
//!
//! This module provides common utilities and helper functions used
//! throughout the library: logging setup and the checks applied to
//! protocol output.

use tracing::Level;

use crate::core::{Error, Result, Word};

/// Installs a fmt subscriber at `level` for drivers, demos and tests.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Order-independent wrapping sum of keys
pub fn checksum(keys: &[Word]) -> u64 {
    keys.iter().fold(0u64, |acc, k| acc.wrapping_add(*k as u64))
}

/// Whether `keys` is in non-decreasing order
pub fn is_sorted(keys: &[Word]) -> bool {
    keys.windows(2).all(|w| w[0] <= w[1])
}

/// Fails unless `keys` is in non-decreasing order
pub fn ensure_sorted(check: &'static str, keys: &[Word]) -> Result<()> {
    match keys.windows(2).position(|w| w[0] > w[1]) {
        Some(i) => Err(Error::postcondition(
            check,
            format!("position {} holds {} before {}", i, keys[i], keys[i + 1]),
        )),
        None => Ok(()),
    }
}

/// Fails unless `output` holds the same multiset of keys as `input`
pub fn ensure_permutation(check: &'static str, input: &[Word], output: &[Word]) -> Result<()> {
    if input.len() != output.len() {
        return Err(Error::postcondition(
            check,
            format!("{} keys in, {} keys out", input.len(), output.len()),
        ));
    }
    if checksum(input) != checksum(output) {
        return Err(Error::postcondition(
            check,
            format!(
                "checksum {} in, {} out",
                checksum(input),
                checksum(output)
            ),
        ));
    }

    let mut before = input.to_vec();
    let mut after = output.to_vec();
    before.sort_unstable();
    after.sort_unstable();
    match before.iter().zip(&after).position(|(x, y)| x != y) {
        Some(i) => Err(Error::postcondition(
            check,
            format!("sorted inputs differ at {}: {} vs {}", i, before[i], after[i]),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_ignores_order() {
        assert_eq!(checksum(&[3, 1, 2]), checksum(&[1, 2, 3]));
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_sortedness() {
        assert!(is_sorted(&[1, 1, 2, 9]));
        assert!(is_sorted(&[]));
        assert!(!is_sorted(&[2, 1]));
        assert!(ensure_sorted("merge", &[0, 4, 4]).is_ok());
        let err = ensure_sorted("merge", &[0, 5, 4]).unwrap_err();
        assert!(matches!(err, Error::PostconditionViolation { check: "merge", .. }));
    }

    #[test]
    fn test_permutation_check() {
        assert!(ensure_permutation("sort", &[5, 1, 3], &[1, 3, 5]).is_ok());
        assert!(ensure_permutation("sort", &[5, 1], &[1, 3, 5]).is_err());
        // Same sum, different multiset
        assert!(ensure_permutation("sort", &[2, 2], &[1, 3]).is_err());
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(Level::DEBUG);
        init_tracing(Level::TRACE);
    }
}
