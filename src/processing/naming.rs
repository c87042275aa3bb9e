//! Peering names.

use crate::config::HASH_SUFFIX_LEN;
use sha2::{Digest, Sha256};

/// `{prefix}-{source}-to-{target}`, or a hash-suffixed truncation of it when
/// that would exceed `max_len` characters.
///
/// The result depends only on the arguments, so every run picks the same name
/// for the same pair of VNets.
pub fn peering_name(prefix: &str, source: &str, target: &str, max_len: usize) -> String {
    let full = format!("{prefix}-{source}-to-{target}");
    if full.chars().count() <= max_len {
        return full;
    }

    let suffix = name_hash(source, target);
    let fixed = prefix.chars().count() + "-".len() + "-to-".len() + "-".len() + suffix.len();
    let budget = max_len.saturating_sub(fixed);
    let (source_len, target_len) = split_budget(
        source.chars().count(),
        target.chars().count(),
        budget,
    );

    format!(
        "{prefix}-{}-to-{}-{suffix}",
        truncate(source, source_len),
        truncate(target, target_len)
    )
}

/// First hex characters of SHA-256(`source|target`).
fn name_hash(source: &str, target: &str) -> String {
    let digest = Sha256::digest(format!("{source}|{target}").as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_SUFFIX_LEN);
    hex
}

/// Share `budget` between two names, the shorter one handing over what it does not use.
fn split_budget(source_len: usize, target_len: usize, budget: usize) -> (usize, usize) {
    let half = budget / 2;
    if source_len <= half {
        (source_len, (budget - source_len).min(target_len))
    } else if target_len <= budget - half {
        ((budget - target_len).min(source_len), target_len)
    } else {
        (half, budget - half)
    }
}

fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
