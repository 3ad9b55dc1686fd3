//! Capability tokens handed out at registration time.

use rand::Rng;

/// Length of every issued token.
pub const TOKEN_LENGTH: usize = 64;

/// URL-safe alphabet tokens are drawn from.
pub const TOKEN_ALPHABET: &[u8] =
    b"_-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Draws a fresh token from the thread-local CSPRNG.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Cheap shape check, done before any storage access.
pub fn is_valid_format(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}
