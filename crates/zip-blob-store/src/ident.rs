//! Random blob identifiers

use rand::distr::{Alphanumeric, SampleString};

/// Length of identifiers handed out by the store
pub const ID_LENGTH: usize = 8;

/// Generate `length` characters drawn uniformly from `[A-Za-z0-9]`.
///
/// Uses the calling thread's generator, so concurrent callers never share state.
pub fn generate(length: usize) -> String {
    Alphanumeric.sample_string(&mut rand::rng(), length)
}

/// Whether `id` could have been produced by [`generate`]
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_length_and_alphabet() {
        for _ in 0..1000 {
            let id = generate(ID_LENGTH);
            assert_eq!(id.len(), ID_LENGTH);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{}", id);
        }
    }

    #[test]
    fn test_generate_other_lengths() {
        assert_eq!(generate(0), "");
        assert_eq!(generate(32).len(), 32);
    }

    #[test]
    fn test_generate_concurrent_calls_are_distinct() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| generate(ID_LENGTH)).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate identifier across threads");
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn test_generate_uses_whole_alphabet() {
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            seen.extend(generate(ID_LENGTH).chars());
        }
        // 16000 draws over 62 symbols; missing one is vanishingly unlikely
        assert_eq!(seen.len(), 62);
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("aB3dE6gH"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(".."));
        assert!(!is_valid_identifier("abc/def"));
        assert!(!is_valid_identifier("abc.zip"));
    }
}
