//! Persistence of pipeline artifacts: index, embedding matrix, results and
//! metrics files.
//!
//! The index supports both JSON (human-readable) and bincode (compact binary)
//! formats, chosen by file extension. Embeddings are a headerless CSV matrix.

use crate::chunker::{Chunk, ChunkId, Index};
use crate::embeddings::EmbeddingMatrix;
use crate::error::{RagEvalError, Result};
use crate::evaluation::{EvaluationRecord, QueryId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Save format for the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON object keyed by chunk id.
    Json,
    /// Bincode-encoded chunk list in id order.
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SaveFormat::Json,
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| RagEvalError::io(parent, e))?;
        }
    }
    Ok(())
}

fn require(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(RagEvalError::ArtifactNotFound(path.to_path_buf()))
    }
}

/// Save the index in the format implied by the extension.
pub fn save_index(index: &Index, path: &Path) -> Result<()> {
    save_index_with_format(index, path, SaveFormat::from_path(path))
}

/// Save the index with a specific format.
pub fn save_index_with_format(index: &Index, path: &Path, format: SaveFormat) -> Result<()> {
    ensure_parent(path)?;

    let data = match format {
        SaveFormat::Json => serde_json::to_string_pretty(&index.to_map())?.into_bytes(),
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            bincode::encode_to_vec(index.chunks(), config)
                .map_err(|e| RagEvalError::Serialization(e.to_string()))?
        }
    };

    fs::write(path, &data).map_err(|e| RagEvalError::io(path, e))?;
    debug!(path = %path.display(), chunks = index.len(), ?format, "saved index");
    Ok(())
}

/// Load the index. Identifiers must be exactly `0..n`.
pub fn load_index(path: &Path) -> Result<Index> {
    if !path.exists() {
        return Err(RagEvalError::IndexNotFound(path.to_path_buf()));
    }
    load_index_with_format(path, SaveFormat::from_path(path))
}

/// Load the index with a specific format.
pub fn load_index_with_format(path: &Path, format: SaveFormat) -> Result<Index> {
    let data = fs::read(path).map_err(|e| RagEvalError::io(path, e))?;

    match format {
        SaveFormat::Json => {
            let map: BTreeMap<ChunkId, Chunk> = serde_json::from_slice(&data)?;
            Index::from_map(map)
        }
        SaveFormat::Bincode => {
            let config = bincode::config::standard();
            let (chunks, _): (Vec<Chunk>, usize) = bincode::decode_from_slice(&data, config)
                .map_err(|e| RagEvalError::Serialization(e.to_string()))?;
            Index::from_map(chunks.into_iter().enumerate().collect())
        }
    }
}

/// Write the embedding matrix as comma-delimited rows without a header.
pub fn save_embeddings(matrix: &EmbeddingMatrix, path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| RagEvalError::Serialization(e.to_string()))?;

    for row in matrix.iter_rows() {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| RagEvalError::Serialization(e.to_string()))?;
    }
    writer.flush().map_err(|e| RagEvalError::io(path, e))?;

    debug!(path = %path.display(), rows = matrix.rows(), dim = matrix.dim(), "saved embeddings");
    Ok(())
}

/// Read an embedding matrix written by [`save_embeddings`].
pub fn load_embeddings(path: &Path) -> Result<EmbeddingMatrix> {
    require(path)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RagEvalError::Serialization(e.to_string()))?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RagEvalError::Serialization(e.to_string()))?;
        let row = record
            .iter()
            .map(|field| {
                field.trim().parse::<f32>().map_err(|e| {
                    RagEvalError::DataIntegrity(format!(
                        "embedding row {}: invalid value '{}': {}",
                        i, field, e
                    ))
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        rows.push(row);
    }

    EmbeddingMatrix::from_rows(rows)
}

/// Write any serialisable artifact as pretty JSON.
pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| RagEvalError::io(path, e))?;
    Ok(())
}

/// Read a JSON artifact.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    require(path)?;
    let content = fs::read_to_string(path).map_err(|e| RagEvalError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the results artifact, keyed by query id.
pub fn save_results(results: &BTreeMap<QueryId, EvaluationRecord>, path: &Path) -> Result<()> {
    save_json(results, path)?;
    debug!(path = %path.display(), records = results.len(), "saved results");
    Ok(())
}

/// Read the results artifact.
pub fn load_results(path: &Path) -> Result<BTreeMap<QueryId, EvaluationRecord>> {
    load_json(path)
}

/// Check if an artifact file exists at the given path.
pub fn artifact_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get the size of an artifact in bytes.
pub fn artifact_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| RagEvalError::io(path, e))?;
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkConfig, IndexBuilder};
    use tempfile::TempDir;

    fn create_test_index() -> Index {
        let mut builder = IndexBuilder::new(ChunkConfig {
            chunk_size: 6,
            chunk_overlap: 2,
        })
        .unwrap();
        builder.add_document("a.txt", "Ownership and borrowing");
        builder.add_document("b.txt", "Lifetimes");
        builder.build()
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let original = create_test_index();
        save_index(&original, &path).unwrap();
        assert!(artifact_exists(&path));

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");

        let original = create_test_index();
        save_index(&original, &path).unwrap();

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_json_index_is_keyed_by_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        save_index(&create_test_index(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["0"]["file_name"], "a.txt");
        assert_eq!(value["0"]["start_chr"], 0);
        assert_eq!(value["0"]["end_chr"], 6);
        assert_eq!(value["0"]["text"], "Owners");
    }

    #[test]
    fn test_gap_in_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        fs::write(
            &path,
            r#"{"0": {"file_name": "a", "chunk_index": 0, "start_chr": 0, "end_chr": 1, "text": "x"},
                "2": {"file_name": "a", "chunk_index": 1, "start_chr": 1, "end_chr": 2, "text": "y"}}"#,
        )
        .unwrap();

        assert!(matches!(
            load_index(&path),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SaveFormat::from_path(Path::new("index.json")),
            SaveFormat::Json
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("index.bin")),
            SaveFormat::Bincode
        );
        assert_eq!(
            SaveFormat::from_path(Path::new("index.bincode")),
            SaveFormat::Bincode
        );
        assert_eq!(SaveFormat::from_path(Path::new("index")), SaveFormat::Json);
    }

    #[test]
    fn test_load_nonexistent() {
        assert!(matches!(
            load_index(Path::new("/nonexistent/index.json")),
            Err(RagEvalError::IndexNotFound(_))
        ));
        assert!(matches!(
            load_embeddings(Path::new("/nonexistent/embeddings.csv")),
            Err(RagEvalError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_embeddings_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("embeddings.csv");

        let matrix =
            EmbeddingMatrix::from_rows(vec![vec![0.5, -1.25, 3.0], vec![0.0, 1.0, 2.5]]).unwrap();
        save_embeddings(&matrix, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next().unwrap(), "0.5,-1.25,3");

        let loaded = load_embeddings(&path).unwrap();
        assert_eq!(loaded, matrix);
        assert!(artifact_size(&path).unwrap() > 0);
    }

    #[test]
    fn test_ragged_embeddings_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("embeddings.csv");
        fs::write(&path, "1,2,3\n4,5\n").unwrap();
        assert!(matches!(
            load_embeddings(&path),
            Err(RagEvalError::DataIntegrity(_))
        ));

        fs::write(&path, "1,2\n4,abc\n").unwrap();
        assert!(matches!(
            load_embeddings(&path),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_results_round_trip_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        let mut results = BTreeMap::new();
        results.insert(
            10,
            EvaluationRecord {
                question: "What is a borrow?".to_string(),
                solution: "A reference.".to_string(),
                answer: None,
                retrieved_docs: vec![2, 0],
                relevant_docs: vec![0],
                label: Some("-1".to_string()),
            },
        );
        save_results(&results, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["10"]["answer"].is_null());
        assert_eq!(load_results(&path).unwrap(), results);
    }
}
