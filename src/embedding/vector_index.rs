/// HNSW vector index with a caller-supplied search effort parameter
use hnsw_rs::prelude::*;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// A raw index hit: document id and cosine similarity
#[derive(Debug, Clone, Copy)]
pub struct IndexHit {
    pub id: u64,
    /// Cosine similarity (higher is more similar)
    pub score: f32,
}

/// HNSW index wrapper over cosine distance
///
/// The `ef_search` argument to [`VectorIndex::search`] is the effort knob
/// the adaptive tuner controls: higher values trade latency for recall.
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    dimension: usize,
    count: RwLock<u64>,
}

impl VectorIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `m` - HNSW M parameter (connections per layer)
    /// * `ef_construction` - Build-time effort (higher = better recall, slower build)
    pub fn new(dimension: usize, m: usize, ef_construction: usize) -> Self {
        let max_elements = 200;
        let index = Hnsw::<f32, DistCosine>::new(m, dimension, ef_construction, max_elements, DistCosine);

        Self {
            index: RwLock::new(index),
            dimension,
            count: RwLock::new(0),
        }
    }

    /// Insert a vector under a document id
    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let data = vector.to_vec();

        let index = self.index.write().unwrap();
        index.insert((&data, id as usize));

        let mut count = self.count.write().unwrap();
        *count += 1;

        Ok(())
    }

    /// Search for the k nearest neighbors with the given effort
    ///
    /// Results are sorted by similarity descending; equal scores are ordered
    /// by document id so repeated searches are reproducible. An empty index
    /// yields an empty list, not an error.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<IndexHit>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if self.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index.read().unwrap();
        let neighbours = index.search(query, k, ef_search);

        let mut hits: Vec<IndexHit> = neighbours
            .into_iter()
            .map(|n| IndexHit {
                id: n.d_id as u64,
                score: 1.0 - n.distance,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    pub fn len(&self) -> u64 {
        *self.count.read().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vec(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = VectorIndex::new(8, 16, 100);
        let results = index.search(&vec![1.0; 8], 5, 50).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(8, 16, 100);

        index.insert(1, &unit_vec(8, 0)).unwrap();
        index.insert(2, &unit_vec(8, 1)).unwrap();

        let mut near_zero = unit_vec(8, 0);
        near_zero[1] = 0.1;
        index.insert(3, &near_zero).unwrap();

        let results = index.search(&unit_vec(8, 0), 2, 50).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].score > 0.99);
    }

    #[test]
    fn test_search_ordering_deterministic() {
        let index = VectorIndex::new(8, 16, 100);
        for id in 0..20u64 {
            index.insert(id, &unit_vec(8, (id % 8) as usize)).unwrap();
        }

        let query = unit_vec(8, 3);
        let first = index.search(&query, 10, 100).unwrap();
        for _ in 0..5 {
            let again = index.search(&query, 10, 100).unwrap();
            let ids: Vec<u64> = again.iter().map(|h| h.id).collect();
            let first_ids: Vec<u64> = first.iter().map(|h| h.id).collect();
            assert_eq!(ids, first_ids);
        }
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(8, 16, 100);
        assert!(index.insert(1, &vec![1.0; 4]).is_err());
        assert!(index.search(&vec![1.0; 4], 5, 50).is_err());
    }
}
