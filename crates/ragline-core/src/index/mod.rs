//! Shared, concurrently-accessed document index.
//!
//! [`DocumentIndex`] bundles the document catalog, the chunk catalog,
//! the BM25 index, and the vector index behind reader-writer locks so a
//! query never observes a document half-indexed into one store and not
//! the other: ingestion and deletion take all write guards for the
//! duration of the operation, while retrieval holds all read guards.
//!
//! Lock order everywhere: `docs → chunks → lexical → vector`.

pub mod lexical;
pub mod vector;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, DocumentStats, IndexStats};

use lexical::{Bm25Index, Bm25Params};
use vector::{DistanceMetric, VectorIndex};

/// Dual-index store over ingested documents.
pub struct DocumentIndex {
    pub(crate) docs: RwLock<HashMap<String, Document>>,
    pub(crate) chunks: RwLock<HashMap<String, Chunk>>,
    pub(crate) lexical: RwLock<Bm25Index>,
    pub(crate) vector: RwLock<VectorIndex>,
}

impl DocumentIndex {
    pub fn new(dims: usize, metric: DistanceMetric, bm25: Bm25Params) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            lexical: RwLock::new(Bm25Index::new(bm25)),
            vector: RwLock::new(VectorIndex::new(dims, metric)),
        }
    }

    /// Index a document and its chunks atomically.
    ///
    /// A document id that is already present is rejected with
    /// [`RagError::DuplicateDocument`] unless `replace` is set, in which
    /// case the old chunks are removed from both indexes first. All
    /// embeddings are dimension-checked before any state is touched, so
    /// a failed insert leaves the index unchanged.
    pub fn insert_document(
        &self,
        document: Document,
        chunks: Vec<Chunk>,
        replace: bool,
    ) -> Result<usize> {
        let mut docs = self.docs.write().unwrap();
        let mut chunk_map = self.chunks.write().unwrap();
        let mut lexical = self.lexical.write().unwrap();
        let mut vector = self.vector.write().unwrap();

        if docs.contains_key(&document.id) {
            if !replace {
                return Err(RagError::DuplicateDocument(document.id));
            }
            chunk_map.retain(|_, c| c.document_id != document.id);
            lexical.remove_document(&document.id);
            vector.remove_document(&document.id);
        }

        // Validate up front so the insert below cannot fail partway.
        let dims = vector.dims();
        for chunk in &chunks {
            if let Some(embedding) = &chunk.embedding {
                if embedding.len() != dims {
                    return Err(RagError::DimensionMismatch {
                        expected: dims,
                        actual: embedding.len(),
                    });
                }
            }
        }

        let count = chunks.len();
        for chunk in chunks {
            lexical.add(&chunk);
            if let Some(embedding) = &chunk.embedding {
                vector.add(&chunk.id, &chunk.document_id, embedding.clone())?;
            }
            chunk_map.insert(chunk.id.clone(), chunk);
        }
        docs.insert(document.id.clone(), document);

        Ok(count)
    }

    /// Remove a document and all its chunks from both indexes. Returns
    /// the number of chunks removed.
    ///
    /// Because this takes the write guards, it waits for in-flight
    /// retrievals reading these chunks to complete.
    pub fn remove_document(&self, document_id: &str) -> Result<usize> {
        let mut docs = self.docs.write().unwrap();
        let mut chunk_map = self.chunks.write().unwrap();
        let mut lexical = self.lexical.write().unwrap();
        let mut vector = self.vector.write().unwrap();

        if docs.remove(document_id).is_none() {
            return Err(RagError::document_not_found(document_id));
        }

        let before = chunk_map.len();
        chunk_map.retain(|_, c| c.document_id != document_id);
        let removed = before - chunk_map.len();

        lexical.remove_document(document_id);
        vector.remove_document(document_id);

        Ok(removed)
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.docs.read().unwrap().contains_key(document_id)
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// Corpus statistics with a per-document breakdown, ordered by
    /// filename then id for stable output.
    pub fn stats(&self) -> IndexStats {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();

        let mut per_doc: HashMap<&str, (usize, usize)> = HashMap::new();
        for chunk in chunks.values() {
            let entry = per_doc.entry(chunk.document_id.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += chunk.text.len();
        }

        let mut documents: Vec<DocumentStats> = docs
            .values()
            .map(|d| {
                let (chunk_count, characters) =
                    per_doc.get(d.id.as_str()).copied().unwrap_or((0, 0));
                DocumentStats {
                    id: d.id.clone(),
                    filename: d.filename.clone(),
                    chunk_count,
                    characters,
                }
            })
            .collect();
        documents.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.id.cmp(&b.id)));

        IndexStats {
            total_documents: docs.len(),
            total_chunks: chunks.len(),
            documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, filename: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: filename.to_string(),
            text: String::new(),
            metadata: serde_json::json!({}),
            ingested_at: Utc::now(),
        }
    }

    fn chunk(id: &str, doc_id: &str, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc_id.to_string(),
            seq: 0,
            text: text.to_string(),
            start: 0,
            end: text.len(),
            hash: String::new(),
            embedding,
        }
    }

    fn index() -> DocumentIndex {
        DocumentIndex::new(2, DistanceMetric::Cosine, Bm25Params::default())
    }

    #[test]
    fn test_insert_and_stats() {
        let idx = index();
        idx.insert_document(
            doc("d1", "a.txt"),
            vec![
                chunk("c1", "d1", "hello", Some(vec![1.0, 0.0])),
                chunk("c2", "d1", "world", Some(vec![0.0, 1.0])),
            ],
            false,
        )
        .unwrap();

        let stats = idx.stats();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.documents[0].chunk_count, 2);
        assert_eq!(stats.documents[0].characters, 10);
    }

    #[test]
    fn test_duplicate_rejected_without_replace() {
        let idx = index();
        idx.insert_document(doc("d1", "a.txt"), vec![chunk("c1", "d1", "one", None)], false)
            .unwrap();
        let err = idx
            .insert_document(doc("d1", "a.txt"), vec![chunk("c2", "d1", "two", None)], false)
            .unwrap_err();
        assert!(matches!(err, RagError::DuplicateDocument(_)));
        // Old content untouched.
        assert_eq!(idx.chunk_count(), 1);
    }

    #[test]
    fn test_replace_swaps_chunk_set() {
        let idx = index();
        idx.insert_document(doc("d1", "a.txt"), vec![chunk("c1", "d1", "one", None)], false)
            .unwrap();
        idx.insert_document(
            doc("d1", "a.txt"),
            vec![
                chunk("c2", "d1", "two", None),
                chunk("c3", "d1", "three", None),
            ],
            true,
        )
        .unwrap();
        assert_eq!(idx.chunk_count(), 2);
        assert!(!idx.chunks.read().unwrap().contains_key("c1"));
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_unchanged() {
        let idx = index();
        let err = idx
            .insert_document(
                doc("d1", "a.txt"),
                vec![
                    chunk("c1", "d1", "fine", Some(vec![1.0, 0.0])),
                    chunk("c2", "d1", "broken", Some(vec![1.0, 0.0, 0.0])),
                ],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert_eq!(idx.document_count(), 0);
        assert_eq!(idx.chunk_count(), 0);
    }

    #[test]
    fn test_remove_document_clears_both_indexes() {
        let idx = index();
        idx.insert_document(
            doc("d1", "a.txt"),
            vec![
                chunk("c1", "d1", "alpha beta", Some(vec![1.0, 0.0])),
                chunk("c2", "d1", "gamma delta", Some(vec![0.0, 1.0])),
            ],
            false,
        )
        .unwrap();

        let removed = idx.remove_document("d1").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(idx.chunk_count(), 0);
        assert!(idx.lexical.read().unwrap().is_empty());
        assert!(idx.vector.read().unwrap().is_empty());
        assert!(matches!(
            idx.remove_document("d1"),
            Err(RagError::NotFound { .. })
        ));
    }
}
