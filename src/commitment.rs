//! Hash-based commitments to a transfer amount: binding (the committer
//! cannot later open to a different value) and hiding (the digest alone
//! reveals nothing about the value) as long as the blinding factor is
//! unpredictable and never reused.

use crate::primitives::{ct_eq, sha256_concat};

const DOMAIN: &[u8] = b"styx-amount-v1";

/// `SHA-256(domain || value_LE || blinding)`.
pub fn commit(value: u64, blinding: &[u8; 32]) -> [u8; 32] {
    sha256_concat(&[DOMAIN, &value.to_le_bytes(), blinding])
}

/// Recompute the commitment and compare in constant time.
pub fn open(digest: &[u8; 32], value: u64, blinding: &[u8; 32]) -> bool {
    ct_eq(&commit(value, blinding), digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_with_matching_value_and_blinding() {
        let blinding = [9u8; 32];
        let digest = commit(42_000, &blinding);
        assert!(open(&digest, 42_000, &blinding));
    }

    #[test]
    fn rejects_wrong_value() {
        let blinding = [9u8; 32];
        let digest = commit(42_000, &blinding);
        assert!(!open(&digest, 42_001, &blinding));
    }

    #[test]
    fn rejects_wrong_blinding() {
        let blinding = [9u8; 32];
        let digest = commit(42_000, &blinding);
        assert!(!open(&digest, 42_000, &[8u8; 32]));
    }

    #[test]
    fn same_value_different_blinding_hides_equality() {
        let a = commit(100, &[1u8; 32]);
        let b = commit(100, &[2u8; 32]);
        assert_ne!(a, b);
    }
}
