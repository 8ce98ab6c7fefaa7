//! Embedding provider capability.
//!
//! The engine never runs a model itself. It consumes anything implementing
//! [`EmbeddingProvider`]: a stable identity string plus functions that turn
//! media bytes or query text into fixed-length vectors. The identity is the
//! only thing that decides which index namespace a provider reads and writes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::MediaKind;

/// A source of embedding vectors.
///
/// Implementations must be deterministic per identity: two providers
/// reporting the same [`identity`](Self::identity) are assumed to produce
/// comparable vectors, two with different identities never are.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identity, typically model name plus configuration.
    fn identity(&self) -> &str;

    /// Embeds the encoded bytes of an image file.
    fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>>;

    /// Embeds a natural-language query.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds the encoded bytes of a video file.
    fn embed_video(&self, _bytes: &[u8]) -> Result<Vec<f32>> {
        Err(Error::EmbeddingUnavailable(format!(
            "provider {} cannot embed videos",
            self.identity()
        )))
    }

    /// Whether the provider handles this kind of media at all.
    ///
    /// Unsupported items are left out of the index instead of being
    /// reported as failures on every reconcile.
    fn supports(&self, kind: MediaKind) -> bool {
        kind == MediaKind::Photo
    }

    /// Output dimension, when known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Embeds a media item by dispatching on its kind.
    fn embed_media(&self, kind: MediaKind, bytes: &[u8]) -> Result<Vec<f32>> {
        match kind {
            MediaKind::Photo => self.embed_image(bytes),
            MediaKind::Video => self.embed_video(bytes),
        }
    }
}

/// The set of providers a [`Library`](crate::Library) may use, keyed by
/// identity.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn EmbeddingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own identity. Chainable.
    ///
    /// A provider registered later with the same identity replaces the
    /// earlier one.
    pub fn with_provider<P: EmbeddingProvider + 'static>(mut self, provider: P) -> Self {
        self.register(Arc::new(provider));
        self
    }

    /// Registers a shared provider under its own identity.
    pub fn register(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.providers
            .insert(provider.identity().to_string(), provider);
    }

    /// Looks up a provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] for an unknown identity.
    pub fn get(&self, identity: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        self.providers.get(identity).cloned().ok_or_else(|| {
            Error::ConfigurationError(format!("unknown embedding provider: {}", identity))
        })
    }

    /// Registered identities in sorted order.
    pub fn identities(&self) -> impl Iterator<Item = &str> + '_ {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("identities", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
