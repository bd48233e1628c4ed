//! Cache key derivation.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiles_types::Descriptor;

/// Hex SHA-256 digest identifying a descriptor's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key over `trim(title)|trim(channel)|duration_sec`.
///
/// Snippet and page context do not participate, so the same video seen on
/// the home feed and in search shares one cache entry. A `|` or `\` inside
/// a field is backslash-escaped, so field boundaries stay unambiguous.
pub fn derive_key(descriptor: &Descriptor) -> CacheKey {
    let material = format!(
        "{}|{}|{}",
        escape_field(descriptor.title.trim()),
        escape_field(descriptor.channel.trim()),
        descriptor.duration_sec
    );
    let digest = Sha256::digest(material.as_bytes());
    CacheKey(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if !field.contains(['|', '\\']) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c == '|' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiles_types::PageContext;

    #[test]
    fn deterministic() {
        let d = Descriptor::new("Rust in 100 seconds", "Fireship", 100);
        assert_eq!(derive_key(&d), derive_key(&d.clone()));
    }

    #[test]
    fn hex_sha256_shape() {
        let key = derive_key(&Descriptor::new("a", "b", 1));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_digest() {
        // sha256("a|b|1")
        let key = derive_key(&Descriptor::new("a", "b", 1));
        let expected: String = Sha256::digest(b"a|b|1")
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn trims_title_and_channel() {
        let a = derive_key(&Descriptor::new("  Title ", " Chan", 60));
        let b = derive_key(&Descriptor::new("Title", "Chan", 60));
        assert_eq!(a, b);
    }

    #[test]
    fn ignores_snippet_and_context() {
        let a = derive_key(&Descriptor::new("T", "C", 60));
        let b = derive_key(
            &Descriptor::new("T", "C", 60)
                .with_snippet("desc")
                .with_context(PageContext::Search),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn duration_and_fields_distinguish() {
        let base = derive_key(&Descriptor::new("T", "C", 60));
        assert_ne!(base, derive_key(&Descriptor::new("T", "C", 61)));
        assert_ne!(base, derive_key(&Descriptor::new("T", "D", 60)));
        assert_ne!(base, derive_key(&Descriptor::new("U", "C", 60)));
    }

    #[test]
    fn delimiter_inside_a_field_does_not_collide() {
        let a = derive_key(&Descriptor::new("a|b", "c", 1));
        let b = derive_key(&Descriptor::new("a", "b|c", 1));
        assert_ne!(a, b);

        let c = derive_key(&Descriptor::new("a\\", "|b", 1));
        let d = derive_key(&Descriptor::new("a\\|", "b", 1));
        assert_ne!(c, d);
    }

    #[test]
    fn escaped_material_digest() {
        // sha256("a\\|b|c|1")
        let key = derive_key(&Descriptor::new("a|b", "c", 1));
        let expected: String = Sha256::digest(b"a\\|b|c|1")
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = derive_key(&Descriptor::new("a", "b", 1));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.as_str()));
    }
}
