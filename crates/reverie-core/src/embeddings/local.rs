//! Local embedding generation via fastembed (ONNX, CPU).
//!
//! Uses BAAI/bge-small-en-v1.5 (384 dimensions). The model is loaded lazily
//! on first use into a process-wide slot; [`LocalEmbedder`] is the service
//! handle over it.

use std::sync::{Mutex, MutexGuard, OnceLock};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{BATCH_SIZE, EMBEDDING_DIMENSIONS, EmbeddingError, MAX_TEXT_LENGTH, TextEmbedder};

static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Cache directory for downloaded model files. Respects
/// `REVERIE_MODEL_CACHE`, falling back to the platform cache directory.
fn model_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("REVERIE_MODEL_CACHE") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("io", "grain", "reverie") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache_dir = model_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create model cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
            format!(
                "Failed to initialize bge-small-en-v1.5: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                e
            )
        })
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Model lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

fn truncate(text: &str) -> &str {
    if text.len() > MAX_TEXT_LENGTH {
        // Back off to a char boundary
        let mut end = MAX_TEXT_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    } else {
        text
    }
}

/// fastembed-backed [`TextEmbedder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Eagerly load the model (downloads on first run).
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }

    /// Whether the model is loadable.
    pub fn is_ready(&self) -> bool {
        match get_model() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Embedding model not ready: {}", e);
                false
            }
        }
    }

    pub fn model_name(&self) -> &'static str {
        "BAAI/bge-small-en-v1.5"
    }

    pub fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

impl TextEmbedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".into()));
        }

        let mut model = get_model()?;
        let embeddings = model
            .embed(vec![truncate(text)], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = get_model()?;
        let mut all = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk.iter().map(|t| truncate(t)).collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            all.extend(embeddings);
        }

        Ok(all)
    }
}
