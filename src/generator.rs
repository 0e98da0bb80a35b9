//! Random password generation.

use rand::Rng;
use rand::rngs::OsRng;

/// Default length for generated passwords.
pub const DEFAULT_LENGTH: usize = 16;

const LETTERS_AND_DIGITS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Generate a random password of the requested length.
///
/// Characters are drawn uniformly from letters and digits, plus
/// punctuation when `symbols` is set. Sampling goes through the OS
/// random generator with range-based indexing, so no alphabet position
/// is favored.
pub fn generate(length: usize, symbols: bool) -> String {
    let mut alphabet: Vec<char> = LETTERS_AND_DIGITS.chars().collect();
    if symbols {
        alphabet.extend(SYMBOLS.chars());
    }

    let mut rng = OsRng;
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}
