//! Exact nearest-neighbour index over embedding vectors.
//!
//! Vectors are stored row-major in one contiguous buffer; position `i` in
//! the index is position `i` in the corpus it was built from. Search is a
//! brute-force scan computing squared L2 distance against every row.

/// Vector index errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A vector does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Vectors passed to a build disagree on dimension.
    #[error("vector {position} has dimension {got}, first vector has {expected}")]
    RaggedInput {
        position: usize,
        expected: usize,
        got: usize,
    },

    /// Vector and document counts disagree.
    #[error("{vectors} vectors for {documents} documents")]
    CountMismatch { vectors: usize, documents: usize },
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index holding exactly `vectors`, in order.
    pub fn from_vectors(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let mut index = Self::new();
        index.build(vectors)?;
        Ok(index)
    }

    /// Replaces all content with `vectors`.
    ///
    /// On error the index is left unchanged.
    pub fn build(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(dims * vectors.len());
        for (position, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                return Err(IndexError::RaggedInput {
                    position,
                    expected: dims,
                    got: v.len(),
                });
            }
            data.extend_from_slice(v);
        }
        self.dims = dims;
        self.data = data;
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns up to `k` `(position, distance)` pairs, nearest first.
    ///
    /// `k` is clamped to the number of stored vectors. Equal distances are
    /// ordered by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: query.len(),
            });
        }

        let mut hits: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Squared Euclidean distance.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Maps a distance to a relevance score in `(0, 1]`.
///
/// Strictly decreasing in `distance`; a distance of zero scores `1.0`.
pub fn relevance_score(distance: f32) -> f64 {
    1.0 / (1.0 + f64::from(distance.max(0.0)))
}
