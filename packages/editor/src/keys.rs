use crc32fast::Hasher;

use crate::node::NodeKey;

const DEFAULT_SEED_SOURCE: &str = "inkwell";

/// Derive a stable key seed from a note id using CRC32
pub fn key_seed(note_id: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(note_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential key generator for nodes of one editor
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    seed: String,
    count: u64,
}

impl KeyGenerator {
    pub fn new(note_id: Option<&str>) -> Self {
        Self {
            seed: key_seed(note_id.unwrap_or(DEFAULT_SEED_SOURCE)),
            count: 0,
        }
    }

    /// Generate the next key. Keys are never reused within one generator.
    pub fn next_key(&mut self) -> NodeKey {
        self.count += 1;
        NodeKey::new(format!("{}-{}", self.seed, self.count))
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_stable_per_note() {
        assert_eq!(key_seed("note-1"), key_seed("note-1"));
        assert_ne!(key_seed("note-1"), key_seed("note-2"));
    }

    #[test]
    fn test_sequential_keys() {
        let mut keys = KeyGenerator::new(Some("note-1"));
        let a = keys.next_key();
        let b = keys.next_key();

        assert!(a.as_str().ends_with("-1"));
        assert!(b.as_str().ends_with("-2"));
        assert!(a.as_str().starts_with(keys.seed()));
    }
}
