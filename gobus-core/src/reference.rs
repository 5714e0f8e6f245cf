use chrono::Utc;
use rand::Rng;

/// Source of booking references. A seam rather than a free function so the
/// orchestrator's collision-retry loop can be exercised deterministically.
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator: `BK-` + 8 random base36 characters + the last five
/// digits of the unix millisecond clock. Uniqueness is ultimately enforced
/// by the storage layer's unique constraint on the reference column; the
/// random width just keeps collisions rare enough that the retry loop almost
/// never runs.
pub struct SystemReferences;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

impl ReferenceGenerator for SystemReferences {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let random: String = (0..8)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let millis = Utc::now().timestamp_millis().rem_euclid(100_000);
        format!("BK-{random}{millis:05}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn reference_shape() {
        let reference = SystemReferences.generate();
        assert!(reference.starts_with("BK-"));
        assert_eq!(reference.len(), 3 + 8 + 5);
        assert!(reference[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn ten_thousand_references_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(SystemReferences.generate()));
        }
    }
}
