//! Opaque project identifiers.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Mint a fresh identifier of the form `proj_<unix-millis>_<9 base-36 chars>`.
pub fn mint_project_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    mint_project_id_with(millis, &mut rand::thread_rng())
}

/// Deterministic variant of [`mint_project_id`] for a given clock and RNG.
pub fn mint_project_id_with<R: Rng + ?Sized>(millis: u128, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("proj_{}_{}", millis, suffix)
}
