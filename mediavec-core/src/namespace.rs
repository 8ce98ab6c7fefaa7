//! Provider-scoped index namespaces.
//!
//! Vectors from different providers are never comparable, so every provider
//! identity gets its own directory. The directory name is a readable slug of
//! the identity followed by a CRC32 of the full identity, which keeps two
//! identities that slug identically (`clip/b32` and `clip:b32`) apart.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Longest slug kept from an identity before the checksum suffix.
const MAX_SLUG_LEN: usize = 48;

/// The isolation boundary keyed by embedding-provider identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexNamespace {
    identity: String,
    dir_name: String,
}

impl IndexNamespace {
    /// Derives the namespace for a provider identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for a blank identity.
    ///
    /// # Example
    ///
    /// ```
    /// use mediavec_core::IndexNamespace;
    ///
    /// let a = IndexNamespace::new("clip/ViT-B-32").unwrap();
    /// let b = IndexNamespace::new("clip:ViT-B-32").unwrap();
    /// assert!(a.dir_name().starts_with("clip-vit-b-32-"));
    /// assert_ne!(a.dir_name(), b.dir_name());
    /// ```
    pub fn new(identity: &str) -> Result<Self> {
        if identity.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "provider identity must not be blank".into(),
            ));
        }

        let dir_name = format!(
            "{}-{:08x}",
            slug(identity, MAX_SLUG_LEN),
            crc32fast::hash(identity.as_bytes())
        );

        Ok(Self {
            identity: identity.to_string(),
            dir_name,
        })
    }

    /// The provider identity this namespace belongs to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Directory name used below an index root.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Full path of this namespace below `index_root`.
    pub fn dir_in(&self, index_root: &Path) -> PathBuf {
        index_root.join(&self.dir_name)
    }
}

impl fmt::Display for IndexNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

/// Lower-cases ASCII alphanumerics and collapses everything else into `-`.
pub(crate) fn slug(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_len));
    for c in input.chars() {
        if out.len() >= max_len {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "ns".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_stable() {
        let a = IndexNamespace::new("clip-b32").unwrap();
        let b = IndexNamespace::new("clip-b32").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.identity(), "clip-b32");
    }

    #[test]
    fn test_distinct_identities_distinct_dirs() {
        let a = IndexNamespace::new("clip-b32").unwrap();
        let b = IndexNamespace::new("clip-b32@fp16").unwrap();
        assert_ne!(a.dir_name(), b.dir_name());
        assert_ne!(a.dir_in(Path::new("/idx")), b.dir_in(Path::new("/idx")));
    }

    #[test]
    fn test_blank_identity_rejected() {
        assert!(matches!(
            IndexNamespace::new("  "),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("OpenAI/CLIP ViT-L@14", 48), "openai-clip-vit-l-14");
        assert_eq!(slug("***", 48), "ns");
        assert_eq!(slug("abcdef", 3), "abc");
    }
}
