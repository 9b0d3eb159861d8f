//! Immutable word -> vector table
//!
//! The table is built once from a GloVe-style text file (`word v1 v2 ... vD`
//! per line) and never mutated afterwards, so concurrent readers need no
//! locking. Vectors are stored row-major in a single `Array2<f32>` with their
//! L2 norms precomputed for cosine ranking.

use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::models::{Embedding, EmbeddingError, EmbeddingResult};

/// Read-only capability the query façade needs from a loaded table
pub trait VectorLookup: Send + Sync {
    /// Fixed dimensionality of every vector
    fn dimension(&self) -> usize;

    /// Number of words in the vocabulary
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row index of an exact key
    fn index_of(&self, word: &str) -> Option<usize>;

    /// Word stored at a row index
    fn word_at(&self, index: usize) -> &str;

    /// Vector stored at a row index
    fn vector_at(&self, index: usize) -> ArrayView1<'_, f32>;

    /// L2 norm of the vector at a row index
    fn norm_at(&self, index: usize) -> f32 {
        self.vector_at(index).dot(&self.vector_at(index)).sqrt()
    }

    /// Copy of the vector for an exact key
    fn lookup_vector(&self, word: &str) -> Option<Embedding> {
        self.index_of(word).map(|index| self.vector_at(index).to_vec())
    }
}

/// Counters reported after parsing a table file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub header_skipped: bool,
}

/// In-memory embedding table
#[derive(Debug)]
pub struct EmbeddingTable {
    words: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Array2<f32>,
    norms: Vec<f32>,
}

impl EmbeddingTable {
    /// Build a table from `(word, vector)` entries
    ///
    /// Every vector must have exactly `dimension` components. Repeated words
    /// keep their first vector.
    pub fn from_entries<I, S>(dimension: usize, entries: I) -> EmbeddingResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<f32>)>,
        S: Into<String>,
    {
        let mut builder = TableBuilder::new(dimension);
        for (word, vector) in entries {
            let word = word.into();
            if vector.len() != dimension {
                return Err(EmbeddingError::invalid_input(format!(
                    "Vector for '{}' has {} dimensions, expected {}",
                    word,
                    vector.len(),
                    dimension
                )));
            }
            builder.push(word, &vector);
        }
        builder.finish()
    }

    /// Parse a GloVe / word2vec text file from disk
    pub fn from_text_file<P: AsRef<Path>>(
        path: P,
        dimension: usize,
    ) -> EmbeddingResult<(Self, ParseStats)> {
        let path = path.as_ref();
        info!("📖 Reading embedding table from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::with_capacity(1 << 20, file), dimension)
    }

    /// Parse GloVe text rows from any buffered reader
    ///
    /// `dimension = 0` infers the size from the word2vec header when present,
    /// otherwise from the first row.
    pub fn from_reader<R: BufRead>(
        reader: R,
        dimension: usize,
    ) -> EmbeddingResult<(Self, ParseStats)> {
        let mut stats = ParseStats::default();
        let mut builder: Option<TableBuilder> = (dimension > 0).then(|| TableBuilder::new(dimension));
        let mut row = Vec::with_capacity(dimension.max(1));

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let word = match parts.next() {
                Some(word) => word,
                None => continue,
            };

            row.clear();
            let mut finite = true;
            for part in parts {
                match part.parse::<f32>() {
                    Ok(value) if value.is_finite() => row.push(value),
                    _ => {
                        finite = false;
                        break;
                    }
                }
            }

            if line_no == 0 && row.len() == 1 && is_word2vec_header(word, row[0]) {
                stats.header_skipped = true;
                if builder.is_none() {
                    builder = Some(TableBuilder::new(row[0] as usize));
                }
                continue;
            }

            if !finite || row.is_empty() {
                stats.malformed += 1;
                continue;
            }

            let builder = builder.get_or_insert_with(|| TableBuilder::new(row.len()));
            if row.len() != builder.dimension {
                stats.malformed += 1;
                continue;
            }

            if builder.push(word.to_string(), &row) {
                stats.rows += 1;
            } else {
                stats.duplicates += 1;
            }
        }

        if stats.malformed > 0 {
            warn!("⚠️  Skipped {} malformed rows while parsing embedding table", stats.malformed);
        }
        if stats.duplicates > 0 {
            debug!("Ignored {} duplicate words", stats.duplicates);
        }

        let builder = builder.ok_or_else(|| EmbeddingError::ModelLoadFailed {
            error: "Embedding table contains no vectors".to_string(),
        })?;
        Ok((builder.finish()?, stats))
    }
}

impl VectorLookup for EmbeddingTable {
    fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    fn index_of(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    fn word_at(&self, index: usize) -> &str {
        &self.words[index]
    }

    fn vector_at(&self, index: usize) -> ArrayView1<'_, f32> {
        self.vectors.row(index)
    }

    fn norm_at(&self, index: usize) -> f32 {
        self.norms[index]
    }
}

fn is_word2vec_header(first: &str, second: f32) -> bool {
    first.parse::<usize>().is_ok() && second.fract() == 0.0 && second >= 1.0
}

struct TableBuilder {
    dimension: usize,
    words: Vec<String>,
    index: HashMap<String, usize>,
    flat: Vec<f32>,
}

impl TableBuilder {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            words: Vec::new(),
            index: HashMap::new(),
            flat: Vec::new(),
        }
    }

    /// Returns false when the word is already present
    fn push(&mut self, word: String, vector: &[f32]) -> bool {
        if self.index.contains_key(&word) {
            return false;
        }
        self.index.insert(word.clone(), self.words.len());
        self.words.push(word);
        self.flat.extend_from_slice(vector);
        true
    }

    fn finish(self) -> EmbeddingResult<EmbeddingTable> {
        if self.words.is_empty() || self.dimension == 0 {
            return Err(EmbeddingError::ModelLoadFailed {
                error: "Embedding table contains no vectors".to_string(),
            });
        }

        let vectors = Array2::from_shape_vec((self.words.len(), self.dimension), self.flat)
            .map_err(|e| EmbeddingError::ModelLoadFailed {
                error: format!("Failed to shape embedding table: {}", e),
            })?;
        let norms = vectors.rows().into_iter().map(|row| row.dot(&row).sqrt()).collect();

        Ok(EmbeddingTable {
            words: self.words,
            index: self.index,
            vectors,
            norms,
        })
    }
}
