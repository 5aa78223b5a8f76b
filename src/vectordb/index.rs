use crate::error::{EngineError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk layout of the embedding index
#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimensions: usize,
    vectors: Vec<f32>,
}

/// Append-only exact inner-product index over L2-normalized vectors
///
/// Rows are never removed or reordered except by [`FlatIndex::rebuild`];
/// a row number stays valid for the lifetime of the index file.
pub struct FlatIndex {
    path: PathBuf,
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Load the index at `path`, or start an empty one if the file is absent
    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        if !path.exists() {
            debug!("No index at {}, starting empty", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                dimensions,
                data: Vec::new(),
            });
        }

        let reader = BufReader::new(File::open(path)?);
        let file: IndexFile = bincode::deserialize_from(reader)?;

        if file.dimensions != dimensions {
            return Err(EngineError::DimensionMismatch {
                expected: dimensions,
                actual: file.dimensions,
            });
        }
        if file.vectors.len() % dimensions != 0 {
            return Err(EngineError::Internal(format!(
                "Corrupt index {}: {} floats is not a multiple of {}",
                path.display(),
                file.vectors.len(),
                dimensions
            )));
        }

        debug!(
            "Loaded {} vectors from {}",
            file.vectors.len() / dimensions,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
            data: file.vectors,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored vectors, live or orphaned
    pub fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors (normalized on the way in), returning their row numbers
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Vec<u32>> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        let first = self.len();
        let rows = (first..first + vectors.len()).map(|r| r as u32).collect();

        self.data.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            let mut normalized = vector.clone();
            l2_normalize(&mut normalized);
            self.data.extend_from_slice(&normalized);
        }

        Ok(rows)
    }

    pub fn vector(&self, row: u32) -> Option<&[f32]> {
        let start = row as usize * self.dimensions;
        self.data.get(start..start + self.dimensions)
    }

    /// Up to `k` rows by descending inner product with the normalized query
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        if query.len() != self.dimensions {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(u32, f32)> = self
            .data
            .par_chunks_exact(self.dimensions)
            .enumerate()
            .map(|(row, vector)| (row as u32, dot(vector, &query)))
            .collect();

        let by_score = |a: &(u32, f32), b: &(u32, f32)| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_score);
            scored.truncate(k);
        }
        scored.sort_by(by_score);

        Ok(scored)
    }

    /// Replace the contents with the given rows, in order
    ///
    /// Returns the new row number of each kept row (same order as `keep`).
    pub fn rebuild(&mut self, keep: &[u32]) -> Vec<u32> {
        let mut data = Vec::with_capacity(keep.len() * self.dimensions);
        let mut new_rows = Vec::with_capacity(keep.len());
        for &row in keep {
            if let Some(vector) = self.vector(row) {
                new_rows.push((data.len() / self.dimensions) as u32);
                data.extend_from_slice(vector);
            }
        }
        self.data = data;
        new_rows
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Write the index atomically (temp file + rename)
    pub fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("idx.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(
                &mut writer,
                &IndexFile {
                    dimensions: self.dimensions,
                    vectors: self.data.clone(),
                },
            )?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!("Persisted {} vectors to {}", self.len(), self.path.display());
        Ok(())
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit length in place; zero vectors are left untouched
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
