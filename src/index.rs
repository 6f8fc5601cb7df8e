//! Persisted retrieval index.
//!
//! [`RagIndex`] keeps every [`DocumentChunk`] in memory keyed by chunk id and
//! mirrors the set into a single JSON file. Re-ingesting a source replaces
//! all of that source's chunks in one step; readers see either the old or
//! the new chunk set, never a mix.
//!
//! # On-disk format
//!
//! ```json
//! { "version": 1,
//!   "chunks": [ { "chunk_id": "…", "source_path": "…",
//!                 "offset_range": {"start": 0, "end": 800},
//!                 "text": "…", "embedding": "<base64 of LE f32s>" } ] }
//! ```
//!
//! Writes go to a sibling temp file that is renamed over the index, so a
//! crash mid-save leaves the previous index intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use wallo_core::chunk::chunk_source;
use wallo_core::embedding::{blob_to_vec, rank_chunks, vec_to_blob};
use wallo_core::error::{Error, Result};
use wallo_core::models::{DocumentChunk, ScoredChunk};

use crate::config::RagConfig;
use crate::extract::{self, DocumentType};
use crate::router::ServiceRouter;

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    chunks: Vec<StoredChunk>,
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    #[serde(flatten)]
    chunk: DocumentChunk,
    embedding: String,
}

/// Chunk set keyed by chunk id.
pub type ChunkMap = BTreeMap<String, DocumentChunk>;

/// Read a persisted index. A missing file is an empty index.
///
/// # Errors
///
/// [`Error::IndexCorrupted`] when the file exists but cannot be decoded.
pub async fn load(path: &Path) -> Result<ChunkMap> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ChunkMap::new()),
        Err(e) => {
            return Err(Error::IndexCorrupted(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    let corrupted = |detail: String| Error::IndexCorrupted(format!("{}: {}", path.display(), detail));
    let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| corrupted(e.to_string()))?;
    if file.version != FORMAT_VERSION {
        return Err(corrupted(format!("unknown format version {}", file.version)));
    }

    let mut chunks = ChunkMap::new();
    for stored in file.chunks {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(&stored.embedding)
            .map_err(|e| corrupted(format!("chunk {}: {}", stored.chunk.chunk_id, e)))?;
        let mut chunk = stored.chunk;
        chunk.embedding = blob_to_vec(&blob)?;
        chunks.insert(chunk.chunk_id.clone(), chunk);
    }
    Ok(chunks)
}

/// Write `chunks` to `path` atomically (temp file + rename).
pub async fn save(path: &Path, chunks: &ChunkMap) -> Result<()> {
    let persist = |e: std::io::Error| Error::IndexPersistFailed(format!("{}: {}", path.display(), e));

    let file = IndexFile {
        version: FORMAT_VERSION,
        chunks: chunks
            .values()
            .map(|chunk| StoredChunk {
                embedding: base64::engine::general_purpose::STANDARD
                    .encode(vec_to_blob(&chunk.embedding)),
                chunk: chunk.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_vec(&file)
        .map_err(|e| Error::IndexPersistFailed(format!("{}: {}", path.display(), e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(persist)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, &json).await.map_err(persist)?;
    tokio::fs::rename(&tmp, path).await.map_err(persist)?;
    Ok(())
}

/// Ranked hits plus any degradation the caller should surface.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub hits: Vec<ScoredChunk>,
    /// Set when the persisted index was unreadable and is being treated as empty.
    pub warning: Option<Error>,
}

/// Outcome of [`RagIndex::ingest_path`].
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    /// Files that could not be extracted, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

struct IndexState {
    chunks: ChunkMap,
    warning: Option<Error>,
}

pub struct RagIndex {
    path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
    embedding_service: Option<String>,
    router: Arc<ServiceRouter>,
    state: RwLock<IndexState>,
    /// Serializes read-then-replace-and-save across concurrent ingests.
    ingest_lock: Mutex<()>,
}

impl RagIndex {
    /// Open the index at `settings.path`. A corrupted file opens as an empty
    /// index and the condition is reported by every query until the next
    /// successful save.
    pub async fn open(settings: &RagConfig, router: Arc<ServiceRouter>) -> Result<Self> {
        if settings.chunk_size == 0 || settings.chunk_overlap >= settings.chunk_size {
            return Err(Error::InvalidArgument(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                settings.chunk_overlap, settings.chunk_size
            )));
        }

        if settings.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "embedding batch size must be >= 1".to_string(),
            ));
        }

        let (chunks, warning) = match load(&settings.path).await {
            Ok(chunks) => {
                info!(path = %settings.path.display(), chunks = chunks.len(), "index loaded");
                (chunks, None)
            }
            Err(e) => {
                warn!(path = %settings.path.display(), "{}; continuing with an empty index", e);
                (ChunkMap::new(), Some(e))
            }
        };

        Ok(Self {
            path: settings.path.clone(),
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            batch_size: settings.batch_size,
            embedding_service: settings.embedding_service.clone(),
            router,
            state: RwLock::new(IndexState { chunks, warning }),
            ingest_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Distinct source paths, sorted.
    pub async fn sources(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut sources: Vec<String> = state
            .chunks
            .values()
            .map(|c| c.source_path.clone())
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    pub async fn warning(&self) -> Option<Error> {
        self.state.read().await.warning.clone()
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.router
            .embed(self.embedding_service.as_deref(), texts)
            .await
            .map_err(|e| Error::EmbeddingServiceUnavailable(e.to_string()))
    }

    /// Chunk and embed `text`, then replace every chunk of `source_path`
    /// and persist. Returns the number of chunks now stored for the source.
    ///
    /// Chunks are embedded `batch_size` at a time before any lock is taken;
    /// if any batch fails the index is unchanged. If saving fails the
    /// in-memory index is unchanged too.
    pub async fn ingest(&self, source_path: &str, text: &str) -> Result<usize> {
        let mut chunks = chunk_source(source_path, text, self.chunk_size, self.chunk_overlap)?;
        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed(texts).await?;
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }
        }
        let count = chunks.len();
        debug!(source = source_path, chunks = count, batch_size = self.batch_size, "embedded");

        let _guard = self.ingest_lock.lock().await;
        let mut next: ChunkMap = {
            let state = self.state.read().await;
            state
                .chunks
                .iter()
                .filter(|(_, c)| c.source_path != source_path)
                .map(|(id, c)| (id.clone(), c.clone()))
                .collect()
        };
        for chunk in chunks {
            next.insert(chunk.chunk_id.clone(), chunk);
        }

        save(&self.path, &next).await?;
        let mut state = self.state.write().await;
        state.chunks = next;
        state.warning = None;
        drop(state);

        info!(source = source_path, chunks = count, "ingested");
        Ok(count)
    }

    /// Extract a single file and ingest it under its path.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let text = extract::load_file(path.to_path_buf()).await?;
        self.ingest(&path.display().to_string(), &text).await
    }

    /// Ingest a file, or every supported file below a directory.
    ///
    /// Files that fail extraction are skipped and listed in the report;
    /// embedding or persistence failures abort the walk.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let files: Vec<PathBuf> = if path.is_dir() {
            WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| DocumentType::from_path(p).is_ok())
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        for file in files {
            match self.ingest_file(&file).await {
                Ok(count) => {
                    report.files += 1;
                    report.chunks += count;
                }
                Err(e @ (Error::UnsupportedFormat(_) | Error::ExtractionFailed(_))) => {
                    warn!(path = %file.display(), "skipped: {}", e);
                    report.skipped.push((file, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Top-`k` chunks by cosine similarity to `text`.
    ///
    /// An empty index answers without calling the embedding service.
    pub async fn query(&self, text: &str, k: i64) -> Result<QueryResult> {
        if k <= 0 {
            return Err(Error::InvalidArgument(format!("k must be >= 1, got {}", k)));
        }
        {
            let state = self.state.read().await;
            if state.chunks.is_empty() {
                return Ok(QueryResult {
                    hits: Vec::new(),
                    warning: state.warning.clone(),
                });
            }
        }

        let mut vectors = self.embed(vec![text.to_string()]).await?;
        let query_vec = vectors.pop().unwrap_or_default();

        let state = self.state.read().await;
        let hits = rank_chunks(&query_vec, state.chunks.values(), k)?;
        debug!(k, hits = hits.len(), "query answered");
        Ok(QueryResult {
            hits,
            warning: state.warning.clone(),
        })
    }
}
