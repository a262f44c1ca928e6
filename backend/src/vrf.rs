//! Deterministic VRF output computation.
//!
//! Uses HMAC-SHA256 keyed by the oracle's secret to produce a 32-byte
//! pseudo-random output that is deterministic (same inputs = same output)
//! but unpredictable without the secret key.

use hmac::{Hmac, Mac};
use raffle::RandomWord;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Derive the seed for a request from its routing parameters.
///
/// ```text
/// seed = SHA256(key_hash || subscription_id_le || request_id_le)
/// ```
pub fn request_seed(key_hash: &str, subscription_id: u64, request_id: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key_hash.as_bytes());
    hasher.update(subscription_id.to_le_bytes());
    hasher.update(request_id.to_le_bytes());

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    seed
}

/// Compute the 32-byte base VRF output for a randomness request.
///
/// ```text
/// output = HMAC-SHA256(secret, seed || request_id_le)
/// ```
pub fn compute_randomness(hmac_secret: &[u8], seed: &[u8; 32], request_id: u64) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(hmac_secret).expect("HMAC accepts keys of any size");

    mac.update(seed);
    mac.update(&request_id.to_le_bytes());

    let result = mac.finalize();
    let bytes = result.into_bytes();

    let mut output = [0u8; 32];
    output.copy_from_slice(&bytes);
    output
}

/// Expand base randomness into words: `word[i] = SHA256(randomness || i_le)`.
pub fn expand_randomness(base_randomness: &[u8; 32], num_words: u32) -> Vec<RandomWord> {
    (0..num_words)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(base_randomness);
            hasher.update(i.to_le_bytes());
            let mut word = [0u8; 32];
            word.copy_from_slice(&hasher.finalize());
            RandomWord(word)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let secret = b"test-secret";
        let seed = [1u8; 32];

        let r1 = compute_randomness(secret, &seed, 0);
        let r2 = compute_randomness(secret, &seed, 0);
        assert_eq!(r1, r2);
    }

    #[test]
    fn different_for_different_seeds() {
        let secret = b"test-secret";

        let r1 = compute_randomness(secret, &[1u8; 32], 0);
        let r2 = compute_randomness(secret, &[2u8; 32], 0);
        assert_ne!(r1, r2);
    }

    #[test]
    fn different_for_different_ids() {
        let secret = b"test-secret";
        let seed = [1u8; 32];

        let r1 = compute_randomness(secret, &seed, 0);
        let r2 = compute_randomness(secret, &seed, 1);
        assert_ne!(r1, r2);
    }

    #[test]
    fn different_for_different_secrets() {
        let seed = [1u8; 32];

        let r1 = compute_randomness(b"secret-a", &seed, 0);
        let r2 = compute_randomness(b"secret-b", &seed, 0);
        assert_ne!(r1, r2);
    }

    #[test]
    fn seed_binds_request_parameters() {
        assert_ne!(request_seed("lane", 1, 1), request_seed("lane", 1, 2));
        assert_ne!(request_seed("lane", 1, 1), request_seed("lane", 2, 1));
        assert_ne!(request_seed("lane-a", 1, 1), request_seed("lane-b", 1, 1));
    }

    #[test]
    fn expanded_words_are_distinct() {
        let words = expand_randomness(&[9u8; 32], 3);
        assert_eq!(words.len(), 3);
        assert_ne!(words[0], words[1]);
        assert_ne!(words[1], words[2]);
        assert_eq!(words, expand_randomness(&[9u8; 32], 3));
    }
}
