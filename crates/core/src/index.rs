use crate::config::ensure_dir;
use crate::error::{RagError, Result};
use crate::models::{Chunk, IndexedRecord, RetrievedRecord, RetrievedResult};
use crate::traits::EmbeddingService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 2;
const METRIC: &str = "cosine";
const EMBED_BATCH: usize = 32;

pub fn vectors_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.vectors.json"))
}

pub fn records_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.records.json"))
}

/// Both files must be present; a half-written pair counts as absent.
pub fn persisted_index_exists(dir: &Path, name: &str) -> bool {
    vectors_path(dir, name).is_file() && records_path(dir, name).is_file()
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    version: u32,
    #[serde(default)]
    build_id: String,
    metric: String,
    dimension: usize,
    stamp: String,
    built_at: DateTime<Utc>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    #[serde(default)]
    build_id: String,
    records: Vec<IndexedRecord>,
}

/// Exact nearest-neighbour index over cosine similarity. Immutable once built.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    records: Vec<IndexedRecord>,
    dimension: usize,
    stamp: String,
    built_at: DateTime<Utc>,
    build_id: String,
}

impl VectorIndex {
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingService,
        stamp: impl Into<String>,
    ) -> Result<Self> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let embedded = embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(RagError::embedding(
                    embedder.model_name(),
                    format!("expected {} vectors, got {}", texts.len(), embedded.len()),
                ));
            }
            vectors.extend(embedded);
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
            return Err(RagError::embedding(
                embedder.model_name(),
                format!("inconsistent vector dimension {} (expected {dimension})", bad.len()),
            ));
        }

        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedRecord::from_chunk(chunk, vector))
            .collect::<Vec<_>>();

        info!(
            records = records.len(),
            dimension,
            model = embedder.model_name(),
            "built vector index"
        );

        let stamp = stamp.into();
        let built_at = Utc::now();
        let build_id = build_id(&stamp, built_at, &records);
        Ok(Self {
            records,
            dimension,
            stamp,
            built_at,
            build_id,
        })
    }

    pub fn persist(&self, dir: &Path, name: &str) -> Result<()> {
        ensure_dir(dir)?;

        let record_file = RecordFile {
            version: FORMAT_VERSION,
            build_id: self.build_id.clone(),
            records: self.records.clone(),
        };
        let vector_file = VectorFile {
            version: FORMAT_VERSION,
            build_id: self.build_id.clone(),
            metric: METRIC.to_string(),
            dimension: self.dimension,
            stamp: self.stamp.clone(),
            built_at: self.built_at,
            vectors: self.records.iter().map(|record| record.vector.clone()).collect(),
        };

        // The vectors file goes last so its presence implies a complete pair.
        write_atomically(&records_path(dir, name), &serde_json::to_vec(&record_file)?)?;
        write_atomically(&vectors_path(dir, name), &serde_json::to_vec(&vector_file)?)?;

        info!(dir = %dir.display(), name, records = self.records.len(), "persisted vector index");
        Ok(())
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        if !persisted_index_exists(dir, name) {
            return Err(RagError::IndexNotFound {
                dir: dir.display().to_string(),
                name: name.to_string(),
            });
        }

        let vector_file: VectorFile = serde_json::from_slice(&fs::read(vectors_path(dir, name))?)?;
        let record_file: RecordFile = serde_json::from_slice(&fs::read(records_path(dir, name))?)?;

        if vector_file.version != FORMAT_VERSION || record_file.version != FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported format version {}/{}",
                vector_file.version, record_file.version
            )));
        }
        if vector_file.build_id.is_empty() || vector_file.build_id != record_file.build_id {
            return Err(RagError::CorruptIndex(
                "vectors and records come from different builds".to_string(),
            ));
        }
        if vector_file.metric != METRIC {
            return Err(RagError::CorruptIndex(format!(
                "unsupported metric {}",
                vector_file.metric
            )));
        }
        if vector_file.vectors.len() != record_file.records.len() {
            return Err(RagError::CorruptIndex(format!(
                "{} vectors for {} records",
                vector_file.vectors.len(),
                record_file.records.len()
            )));
        }
        if vector_file
            .vectors
            .iter()
            .any(|vector| vector.len() != vector_file.dimension)
        {
            return Err(RagError::CorruptIndex(format!(
                "vector dimension differs from declared {}",
                vector_file.dimension
            )));
        }

        let records = record_file
            .records
            .into_iter()
            .zip(vector_file.vectors)
            .map(|(record, vector)| IndexedRecord { vector, ..record })
            .collect::<Vec<_>>();

        info!(dir = %dir.display(), name, records = records.len(), "loaded vector index");

        Ok(Self {
            records,
            dimension: vector_file.dimension,
            stamp: vector_file.stamp,
            built_at: vector_file.built_at,
            build_id: vector_file.build_id,
        })
    }

    /// The `k` records most similar to `query_vector`, best first. Equal
    /// scores keep insertion order.
    pub fn query(&self, query_vector: &[f32], k: usize) -> Result<RetrievedResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be at least 1".to_string()));
        }
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (position, cosine_similarity(query_vector, &record.vector)))
            .collect();

        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        let hits = scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (position, score))| RetrievedRecord {
                rank: rank + 1,
                score,
                record: self.records[position].clone(),
            })
            .collect::<Vec<_>>();

        debug!(k, returned = hits.len(), "vector query");
        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn records(&self) -> &[IndexedRecord] {
        &self.records
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Ties a vectors file to the records file written by the same build.
fn build_id(stamp: &str, built_at: DateTime<Utc>, records: &[IndexedRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stamp.as_bytes());
    hasher.update(built_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    for record in records {
        hasher.update(record.text.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}
