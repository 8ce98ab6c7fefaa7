//! Indexes a small folder with a toy provider and runs a filtered query.
//!
//! Run with: RUST_LOG=mediavec_core=debug cargo run --example quickstart

use std::fs;
use std::sync::Arc;

use mediavec::prelude::*;
use tracing_subscriber::EnvFilter;

const DIM: usize = 16;

/// Buckets bytes (or words) into a fixed-size histogram. Good enough to show
/// the flow; a real provider wraps an image-text model.
struct HistogramProvider;

fn histogram<I: IntoIterator<Item = usize>>(values: I) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for x in values {
        v[x % DIM] += 1.0;
    }
    v
}

impl EmbeddingProvider for HistogramProvider {
    fn identity(&self) -> &str {
        "histogram-v1"
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.is_empty() {
            return Err(Error::EmbeddingUnavailable("empty image".into()));
        }
        Ok(histogram(bytes.iter().map(|b| *b as usize)))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(histogram(text.bytes().map(|b| b as usize)))
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIM)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let folder = std::env::temp_dir().join("mediavec_quickstart");
    let _ = fs::remove_dir_all(&folder);
    fs::create_dir_all(&folder).map_err(|e| Error::IoError(e.to_string()))?;

    let files: [(&str, &[u8]); 4] = [
        ("sunset_beach.jpg", b"sunset over the sea"),
        ("forest.png", b"tall green trees"),
        ("dog_beach.jpg", b"a dog running on sand"),
        ("empty.jpg", b""),
    ];
    for (name, bytes) in files {
        fs::write(folder.join(name), bytes).map_err(|e| Error::IoError(e.to_string()))?;
    }

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(HistogramProvider));
    let library = Library::new(LibraryConfig::default(), providers)?;

    let report = library.reconcile(&folder, "histogram-v1")?;
    println!(
        "reconciled: {} added, {} failed ({} unchanged)",
        report.added, report.failed, report.unchanged
    );
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.message);
    }

    // Second pass finds nothing to do.
    let again = library.reconcile(&folder, "histogram-v1")?;
    println!("second pass: {} changes", again.changes());

    let folder = fs::canonicalize(&folder).map_err(|e| Error::IoError(e.to_string()))?;
    let tags = TagMap::new()
        .with_tags(folder.join("sunset_beach.jpg"), ["beach", "sunset"])
        .with_tags(folder.join("dog_beach.jpg"), ["beach", "dog"]);

    println!("\nall results for \"sunset\":");
    for hit in library.search(&folder, "histogram-v1", "sunset", 5, None, &tags)? {
        println!("  {:.3}  {}", hit.score, hit.path.display());
    }

    let filter = Expression::parse_str("beach dog NOT AND")?;
    println!("\nfiltered by `{}`:", filter);
    for hit in library.search(&folder, "histogram-v1", "sunset", 5, Some(&filter), &tags)? {
        println!("  {:.3}  {}", hit.score, hit.path.display());
    }

    library.close()?;
    let _ = fs::remove_dir_all(&folder);
    Ok(())
}
