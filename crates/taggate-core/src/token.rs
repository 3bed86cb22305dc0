//! Short redemption codes.
//!
//! Codes are `TOKEN_LENGTH` symbols drawn uniformly from `ALPHABET`
//! (uppercase letters and the digits 1-9, no zero). That is 35^6, about
//! 1.8e9 codes or roughly 30.7 bits per tag.

use rand::Rng;

pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ123456789";
pub const TOKEN_LENGTH: usize = 6;

pub fn generate() -> String {
    generate_with(&mut rand::rng())
}

pub fn generate_with<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// True if `candidate` could have been produced by `generate`.
pub fn is_well_formed(candidate: &str) -> bool {
    candidate.len() == TOKEN_LENGTH && candidate.bytes().all(|b| ALPHABET.contains(&b))
}
