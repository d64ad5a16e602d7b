//! Shared utility functions.

use sha2::{Digest, Sha256};

/// Short, stable hash used to build active-process registry keys like
/// `sqli-endpoint-<hash>-<phase>` without leaking the full URL into a map
/// key (URLs can be arbitrarily long and contain characters that are
/// awkward in log lines).
pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for byte in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{byte:02x}"));
    }
    s.truncate(chars);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_deterministic_and_fixed_length() {
        let a = short_hash("http://example.test/login?id=1");
        let b = short_hash("http://example.test/login?id=1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn short_hash_differs_for_different_input() {
        assert_ne!(short_hash("a"), short_hash("b"));
    }
}
