//! Attribute hashing for change detection.
//!
//! Fingerprints are stored with every state record so that `plan` can tell
//! whether a configuration entry changed since the last apply without
//! comparing attribute by attribute.

use sha2::{Digest, Sha256};

use crate::resource::{AttributeSet, AttributeValue};

/// Hasher for computing attribute set fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeHasher;

impl AttributeHasher {
    /// Creates a new attribute hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of an attribute set.
    ///
    /// Unset values are skipped, so `{a: ""}` and `{}` hash the same. Keys
    /// are visited in sorted order, which makes the hash independent of the
    /// order attributes were written in.
    #[must_use]
    pub fn hash_attributes(&self, attributes: &AttributeSet) -> String {
        let mut hasher = Sha256::new();

        for (name, value) in attributes.iter() {
            if value.is_unset() {
                continue;
            }
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            Self::update_value(&mut hasher, value);
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 12 characters) for display.
    #[must_use]
    pub fn short_hash(&self, attributes: &AttributeSet) -> String {
        let full = self.hash_attributes(attributes);
        full.get(..12).unwrap_or(&full).to_string()
    }

    // Type tags keep `1` and `"1"` apart.
    fn update_value(hasher: &mut Sha256, value: &AttributeValue) {
        match value {
            AttributeValue::Bool(b) => {
                hasher.update(b"b");
                hasher.update(if *b { [1u8] } else { [0u8] });
            }
            AttributeValue::Integer(i) => {
                hasher.update(b"i");
                hasher.update(i.to_be_bytes());
            }
            AttributeValue::String(s) => {
                hasher.update(b"s");
                hasher.update(s.as_bytes());
            }
            AttributeValue::Null => hasher.update(b"n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttributeSet {
        AttributeSet::new()
            .with("compute_profile_name", "cp1")
            .with("compute_group_name", "cg1")
            .with("timeout", 30)
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = AttributeHasher::new();
        assert_eq!(hasher.hash_attributes(&sample()), hasher.hash_attributes(&sample()));
    }

    #[test]
    fn test_hash_changes_with_value() {
        let hasher = AttributeHasher::new();
        let changed = sample().with("timeout", 60);
        assert_ne!(hasher.hash_attributes(&sample()), hasher.hash_attributes(&changed));
    }

    #[test]
    fn test_hash_ignores_unset_values() {
        let hasher = AttributeHasher::new();
        let with_blank = sample().with("query_strategy", "");
        assert_eq!(hasher.hash_attributes(&sample()), hasher.hash_attributes(&with_blank));
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let hasher = AttributeHasher::new();
        let int = AttributeSet::new().with("timeout", 1);
        let text = AttributeSet::new().with("timeout", "1");
        assert_ne!(hasher.hash_attributes(&int), hasher.hash_attributes(&text));
    }

    #[test]
    fn test_short_hash() {
        let hasher = AttributeHasher::new();
        let short = hasher.short_hash(&sample());
        assert_eq!(short.len(), 12);
        assert!(hasher.hash_attributes(&sample()).starts_with(&short));
    }
}
