use rayon::prelude::*;
use serde::Serialize;

use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    /// Squared Euclidean distance; smaller is closer.
    pub distance: f32,
    pub entry_index: usize,
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Exact nearest-neighbor index over a fixed set of vectors, stored
/// row-major in one contiguous buffer. Read-only once built.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn build(embeddings: &[Vec<f32>]) -> Result<Self, IndexError> {
        let dim = match embeddings.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(IndexError::Empty),
        };

        let mut data = Vec::with_capacity(dim * embeddings.len());
        for (position, v) in embeddings.iter().enumerate() {
            if v.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dim,
                    actual: v.len(),
                });
            }
            data.extend_from_slice(v);
        }

        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Up to `k` neighbors sorted by ascending distance, ties broken by
    /// ascending entry index.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dim,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dim)
            .enumerate()
            .map(|(entry_index, row)| Neighbor {
                distance: squared_l2(vector, row),
                entry_index,
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.entry_index.cmp(&b.entry_index))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn nearest(&self, vector: &[f32]) -> Result<Option<Neighbor>, IndexError> {
        Ok(self.query(vector, 1)?.into_iter().next())
    }
}
