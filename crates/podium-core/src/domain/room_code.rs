//! Room-code generation, normalization, and format checking.
//!
//! Room codes are short strings a person reads off a display and types (or
//! speaks) into a controller, so the alphabet excludes visually confusable
//! characters: no `0`/`O` and no `1`/`I`. Matching is case-insensitive —
//! every code is normalized to uppercase before lookup.

use rand::Rng;

/// The 32 unambiguous characters codes are drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Minimum accepted code length.
pub const MIN_CODE_LEN: usize = 4;

/// Maximum accepted code length.
pub const MAX_CODE_LEN: usize = 6;

/// Length of server-generated codes unless configured otherwise.
pub const DEFAULT_CODE_LEN: usize = 5;

/// Generates a random room code of `len` characters from [`CODE_ALPHABET`].
///
/// `len` is clamped into `[MIN_CODE_LEN, MAX_CODE_LEN]`, so a misconfigured
/// length can never produce an out-of-spec code.
///
/// Uniqueness against existing rooms is the room table's job — it retries
/// until the generated code is unused.
pub fn generate_code(len: usize) -> String {
    let len = len.clamp(MIN_CODE_LEN, MAX_CODE_LEN);
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalizes a caller-supplied code for lookup: trims surrounding
/// whitespace and uppercases.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Format check for caller-supplied codes.
///
/// A code is acceptable when its normalized form is `MIN_CODE_LEN` to
/// `MAX_CODE_LEN` characters, all drawn from [`CODE_ALPHABET`]. A code that
/// fails this check is not an error — the server simply generates a fresh
/// code instead of honoring the request.
pub fn is_acceptable(code: &str) -> bool {
    let normalized = normalize(code);
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&normalized.len())
        && normalized.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_has_32_characters() {
        assert_eq!(CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_alphabet_excludes_confusable_characters() {
        for excluded in [b'0', b'O', b'1', b'I'] {
            assert!(
                !CODE_ALPHABET.contains(&excluded),
                "alphabet must not contain {:?}",
                excluded as char
            );
        }
    }

    #[test]
    fn test_generated_codes_have_requested_length() {
        for len in MIN_CODE_LEN..=MAX_CODE_LEN {
            assert_eq!(generate_code(len).len(), len);
        }
    }

    #[test]
    fn test_generated_length_is_clamped_into_spec_range() {
        assert_eq!(generate_code(1).len(), MIN_CODE_LEN);
        assert_eq!(generate_code(64).len(), MAX_CODE_LEN);
    }

    #[test]
    fn test_generated_codes_use_only_alphabet_characters() {
        // A few hundred samples cover the generator well enough to catch an
        // off-by-one in the index range.
        for _ in 0..300 {
            let code = generate_code(DEFAULT_CODE_LEN);
            assert!(
                code.bytes().all(|b| CODE_ALPHABET.contains(&b)),
                "generated code {code} contains a character outside the alphabet"
            );
        }
    }

    #[test]
    fn test_generated_codes_pass_the_format_check() {
        for _ in 0..50 {
            assert!(is_acceptable(&generate_code(DEFAULT_CODE_LEN)));
        }
    }

    #[test]
    fn test_normalize_trims_and_uppercases() {
        assert_eq!(normalize("  qmx7p "), "QMX7P");
    }

    #[test]
    fn test_is_acceptable_is_case_insensitive() {
        assert!(is_acceptable("qmx7p"));
        assert!(is_acceptable("QMX7P"));
    }

    #[test]
    fn test_is_acceptable_rejects_short_and_long_codes() {
        assert!(!is_acceptable("ABC"));
        assert!(!is_acceptable("ABCDEFG"));
        assert!(!is_acceptable(""));
    }

    #[test]
    fn test_is_acceptable_rejects_confusable_characters() {
        assert!(!is_acceptable("ROOM0"));
        assert!(!is_acceptable("AB1CD"));
    }
}
