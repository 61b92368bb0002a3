use sha2::{Digest, Sha256};

use crate::qa::domain::UserId;

/// Deterministically maps a user to a bucket in 0..=99 for a named feature.
/// The same user always lands in the same bucket, so raising the rollout
/// percentage only ever adds users, never flips existing ones out.
pub fn bucket(user: &UserId, feature: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(feature.as_bytes());
    hasher.update(b":");
    hasher.update(user.0.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

pub fn enrolled(user: &UserId, feature: &str, percent: u8) -> bool {
    bucket(user, feature) < percent.min(100)
}
