//! Non-cryptographic content fingerprint for duplicate suggestions.
//!
//! Two 32-bit multiplicative accumulators with independent seeds, each
//! cross-mixed with the other at the end, concatenated into 16 hex chars.
//! Collisions only produce a spurious "similar block" suggestion; nothing
//! that resolves content reads this value.

use crate::constants::NO_HASH;

const SEED_A: u32 = 0xdead_beef;
const SEED_B: u32 = 0x41c6_ce57;
const MUL_A: u32 = 2_654_435_761;
const MUL_B: u32 = 1_597_334_677;
const MIX_A: u32 = 2_246_822_507;
const MIX_B: u32 = 3_266_489_909;

/// Fixed-width fingerprint of `content`. Empty content yields [`NO_HASH`].
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return NO_HASH.to_string();
    }

    let mut h1 = SEED_A;
    let mut h2 = SEED_B;
    for unit in content.encode_utf16() {
        let ch = u32::from(unit);
        h1 = (h1 ^ ch).wrapping_mul(MUL_A);
        h2 = (h2 ^ ch).wrapping_mul(MUL_B);
    }

    h1 = (h1 ^ (h1 >> 16)).wrapping_mul(MIX_A);
    h1 ^= (h2 ^ (h2 >> 13)).wrapping_mul(MIX_B);
    h2 = (h2 ^ (h2 >> 16)).wrapping_mul(MIX_A);
    h2 ^= (h1 ^ (h1 >> 13)).wrapping_mul(MIX_B);

    format!("{h2:08x}{h1:08x}")
}

/// Whether `hash` is a real fingerprint that may be matched against others.
pub fn is_matchable(hash: &str) -> bool {
    hash != NO_HASH && !hash.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(content_hash("Same text"), content_hash("Same text"));
    }

    #[test]
    fn test_fixed_width_hex() {
        for s in ["a", "Same text", "a much longer piece of content\nwith lines"] {
            let h = content_hash(s);
            assert_eq!(h.len(), 16);
            assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_empty_is_sentinel() {
        assert_eq!(content_hash(""), NO_HASH);
        assert!(!is_matchable(&content_hash("")));
        assert!(is_matchable(&content_hash("x")));
    }

    #[test]
    fn test_sentinel_never_equals_real_hash() {
        for s in ["", " ", "-", "0", "\n"] {
            if !s.is_empty() {
                assert_ne!(content_hash(s), NO_HASH);
            }
        }
    }

    #[test]
    fn test_small_edits_change_hash() {
        assert_ne!(content_hash("Guideline v1"), content_hash("Guideline v2"));
        assert_ne!(content_hash("ab"), content_hash("ba"));
    }

    #[test]
    fn test_non_ascii() {
        assert_ne!(content_hash("café"), content_hash("cafe"));
        assert_eq!(content_hash("日本語"), content_hash("日本語"));
    }
}
