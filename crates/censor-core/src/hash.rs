//! Content hashing for deduplication

use crate::types::{Resource, ResourceType};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of text content
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a media URL
pub fn hash_url(url: &str) -> String {
    hash_text(url)
}

/// Dedup key for a resource: text content for text, URL otherwise
pub fn resource_hash(resource: &Resource) -> String {
    match resource.resource_type {
        ResourceType::Text => hash_text(&resource.content_text),
        ResourceType::Image | ResourceType::Video => hash_url(&resource.content_url),
    }
}

/// Shorten a hash for display
pub fn truncate_hash(hash: &str, len: usize) -> &str {
    match hash.get(..len) {
        Some(prefix) => prefix,
        None => hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_text_known_value() {
        assert_eq!(
            hash_text("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_resource_hash_by_type() {
        let text = Resource::text("r1", "https://cdn/a.png");
        let image = Resource::image("r2", "https://cdn/a.png");
        assert_eq!(resource_hash(&text), resource_hash(&image));

        let other = Resource::image("r3", "https://cdn/b.png");
        assert_ne!(resource_hash(&image), resource_hash(&other));
    }

    #[test]
    fn test_truncate_hash() {
        assert_eq!(truncate_hash("abcdef", 3), "abc");
        assert_eq!(truncate_hash("ab", 8), "ab");
    }
}
