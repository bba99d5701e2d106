//! Human-typable promo codes.
//!
//! Codes are bearer tokens for money, so every symbol is drawn from a CSPRNG
//! (`rand::rng()` is a ChaCha12 generator reseeded from the OS). Each position is an
//! independent `random_range` draw, which rejection-samples and therefore carries no
//! modulo bias.

use crate::models::promo_code::PROMO_CODE_LEN;
use rand::{CryptoRng, Rng};

/// Uppercase letters without `L` and `O`, digits without `0`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKMNPQRSTUVWXYZ123456789";

/// Position after which the display form carries a dash.
const DISPLAY_SPLIT: usize = 3;

pub fn generate_code() -> String {
    generate_code_with(&mut rand::rng())
}

pub fn generate_code_with<R>(rng: &mut R) -> String
where
    R: Rng + CryptoRng,
{
    (0..PROMO_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical -> display: `ABC123` -> `ABC-123`. Inputs of unexpected length are returned as-is.
pub fn format_code(code: &str) -> String {
    match code.len() {
        PROMO_CODE_LEN if code.is_ascii() => {
            let (head, tail) = code.split_at(DISPLAY_SPLIT);
            format!("{head}-{tail}")
        }
        _ => code.to_owned(),
    }
}

/// Any user input -> canonical: strips everything that is not ASCII alphanumeric and uppercases.
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Shape check applied to request bodies after normalization.
pub fn is_well_formed(canonical: &str) -> bool {
    canonical.len() == PROMO_CODE_LEN && canonical.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_codes_use_alphabet_only() {
        for _ in 0..1_000 {
            let code = generate_code();
            assert_eq!(code.len(), PROMO_CODE_LEN);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)), "{code}");
            assert!(!code.contains(['L', 'O', '0']), "{code}");
        }
    }

    #[test]
    fn ten_thousand_codes_barely_collide() {
        // birthday bound over 33^6 gives ~0.04 expected duplicates; three or more is ~1e-5
        let codes = (0..10_000).map(|_| generate_code()).collect::<HashSet<_>>();
        assert!(10_000 - codes.len() <= 2, "{} duplicates", 10_000 - codes.len());
    }

    #[test]
    fn every_symbol_shows_up() {
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            seen.extend(generate_code().bytes());
        }
        assert_eq!(seen.len(), CODE_ALPHABET.len());
    }

    #[test]
    fn format_inserts_dash_after_third_char() {
        assert_eq!(format_code("ABC123"), "ABC-123");
        assert_eq!(format_code("ABC"), "ABC");
    }

    #[test]
    fn normalize_accepts_all_typed_variants() {
        for input in ["abc123", "ABC123", "abc-123", "ABC-123", " aBc 1-2-3 "] {
            assert_eq!(normalize_code(input), "ABC123", "{input:?}");
        }
    }

    #[test]
    fn normalize_undoes_format() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(normalize_code(&format_code(&code)), code);
        }
    }

    #[test]
    fn well_formed_requires_six_alphanumerics() {
        assert!(is_well_formed("ABC123"));
        assert!(!is_well_formed("ABC12"));
        assert!(!is_well_formed("ABC1234"));
        assert!(!is_well_formed(""));
    }
}
