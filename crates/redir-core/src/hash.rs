//! Hash functions for rule identifiers
//!
//! Declarative rule ids must be positive 32-bit integers that stay the same
//! for the same logical rule across reconciliation passes and restarts. We
//! derive them from a Murmur3 32-bit hash of the rule's defining strings.
//!
//! # Collisions
//!
//! Ids are 31 bits wide. With the default cap of 5000 dynamic rules the
//! birthday bound puts the chance of any collision at roughly 0.6%, so callers
//! that keep a table of ids must still probe (see [`next_rule_id`]).

/// Largest id the declarative engine accepts.
pub const MAX_RULE_ID: u32 = i32::MAX as u32;

const RULE_ID_SEED: u32 = 0x9e3779b9; // Golden ratio

/// Murmur3 32-bit hash implementation.
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2;
    while i < chunks {
        let k = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);

        i += 4;
    }

    // Process remaining bytes
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Compute the stable id for a rule.
///
/// The hashed key is `pattern:substitution:domain1,domain2,...`. The result is
/// always in `1..=MAX_RULE_ID`.
pub fn rule_id(pattern: &str, substitution: &str, excluded_initiator_domains: &[String]) -> u32 {
    let key = format!(
        "{}:{}:{}",
        pattern,
        substitution,
        excluded_initiator_domains.join(",")
    );
    let id = murmur3_32(key.as_bytes(), RULE_ID_SEED) & MAX_RULE_ID;
    if id == 0 {
        1
    } else {
        id
    }
}

/// The id probed after `id` when it is already taken.
#[inline]
pub fn next_rule_id(id: u32) -> u32 {
    if id >= MAX_RULE_ID {
        1
    } else {
        id + 1
    }
}
