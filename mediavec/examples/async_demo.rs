//! Async API demo using AsyncLibrary.
//!
//! Run with: cargo run --example async_demo --features async

#[cfg(feature = "async")]
#[tokio::main]
async fn main() -> mediavec::Result<()> {
    use std::sync::Arc;

    use mediavec::prelude::*;
    use mediavec::{AsyncLibrary, NoTags};

    struct LengthProvider;

    impl EmbeddingProvider for LengthProvider {
        fn identity(&self) -> &str {
            "length-v1"
        }

        fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
            Ok(vec![1.0, bytes.len() as f32 / 64.0])
        }

        fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32 / 64.0])
        }
    }

    tracing_subscriber::fmt::init();

    let folder = std::env::temp_dir().join("mediavec_async_demo");
    let _ = std::fs::remove_dir_all(&folder);
    std::fs::create_dir_all(&folder).map_err(|e| Error::IoError(e.to_string()))?;
    for i in 1..=50 {
        std::fs::write(folder.join(format!("img_{:02}.jpg", i)), vec![0u8; i])
            .map_err(|e| Error::IoError(e.to_string()))?;
    }

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(LengthProvider));
    let library = AsyncLibrary::from_sync(Library::new(LibraryConfig::default(), providers)?);

    let start = std::time::Instant::now();
    let report = library.reconcile(folder.clone(), "length-v1").await?;
    println!("indexed {} files in {:?}", report.added, start.elapsed());

    // Concurrent queries share the same committed generation.
    let mut handles = Vec::new();
    for query in ["short", "a somewhat longer query string", "x"] {
        let library = library.clone();
        let folder = folder.clone();
        handles.push(tokio::spawn(async move {
            let hits = library
                .search(folder, "length-v1", query, 3, None, Arc::new(NoTags))
                .await?;
            Ok::<_, Error>((query, hits))
        }));
    }
    for handle in handles {
        let (query, hits) = handle
            .await
            .map_err(|e| Error::InvalidState(e.to_string()))??;
        let names: Vec<_> = hits
            .iter()
            .filter_map(|h| h.path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        println!("{:>32} -> {:?}", query, names);
    }

    library.close().await?;
    let _ = std::fs::remove_dir_all(&folder);
    Ok(())
}

#[cfg(not(feature = "async"))]
fn main() {
    println!("Run with: cargo run --example async_demo --features async");
}
