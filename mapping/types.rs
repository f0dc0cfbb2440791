// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use crate::batch::MappingError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Selects which gene identifier the rows of the expression table are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdMode {
    /// Rows are keyed by the model's primary gene id.
    #[default]
    PrimaryId,
    /// Rows are keyed by the gene's alias (usually the gene product name).
    AliasName,
}

impl IdMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryId => "primary-id",
            Self::AliasName => "alias-name",
        }
    }
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdMode {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary-id" | "primary" | "id" => Ok(Self::PrimaryId),
            "alias-name" | "alias" | "name" => Ok(Self::AliasName),
            _ => Err(MappingError::UnknownIdMode(s.to_string())),
        }
    }
}

/// The batch-wide rule for merging the two operands of an `OR`.
///
/// Resolved once per batch call; the evaluator never re-interprets policy text per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrPolicy {
    /// Isozymes add up: `a OR b == a + b`.
    #[default]
    Sum,
    /// Only the strongest isozyme counts: `a OR b == max(a, b)`.
    Max,
}

impl OrPolicy {
    #[inline]
    pub fn combine(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Sum => left + right,
            Self::Max => left.max(right),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for OrPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrPolicy {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "max" => Ok(Self::Max),
            _ => Err(MappingError::AggregationPolicy(s.to_string())),
        }
    }
}

/// Picks one sample column of the expression table, either by header name or by
/// 0-based position among the sample columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum SampleSelector {
    Index(usize),
    Name(String),
}

impl fmt::Display for SampleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// `#3` selects the fourth sample column; anything else is taken as a column name.
impl FromStr for SampleSelector {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('#') {
            Some(position) => position.parse().map(Self::Index),
            None => Ok(Self::Name(s.to_string())),
        }
    }
}

impl From<&str> for SampleSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<usize> for SampleSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// The dense reactions-by-samples result of a batch call.
///
/// Rows follow the model's reaction order and columns follow the caller's sample
/// order. The matrix is only ever constructed complete, so every cell holds a score.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionActivityMatrix {
    reaction_ids: Vec<String>,
    sample_ids: Vec<String>,
    values: Array2<f64>,
}

impl ReactionActivityMatrix {
    /// Assembles the matrix from per-sample columns, each holding one score per reaction.
    pub(crate) fn from_columns(
        reaction_ids: Vec<String>,
        sample_ids: Vec<String>,
        columns: &[Vec<f64>],
    ) -> Self {
        debug_assert_eq!(sample_ids.len(), columns.len());
        debug_assert!(columns.iter().all(|c| c.len() == reaction_ids.len()));
        let values = Array2::from_shape_fn((reaction_ids.len(), sample_ids.len()), |(r, s)| {
            columns[s][r]
        });
        Self {
            reaction_ids,
            sample_ids,
            values,
        }
    }

    pub fn reaction_ids(&self) -> &[String] {
        &self.reaction_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// The full score table, shape `[n_reactions, n_samples]`.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_reactions(&self) -> usize {
        self.reaction_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Looks up one cell by reaction and sample id. Duplicate sample ids resolve to the
    /// first matching column.
    pub fn get(&self, reaction_id: &str, sample_id: &str) -> Option<f64> {
        let row = self.reaction_position(reaction_id)?;
        let col = self.sample_position(sample_id)?;
        Some(self.values[[row, col]])
    }

    pub fn row(&self, reaction_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.reaction_position(reaction_id)
            .map(|row| self.values.row(row))
    }

    pub fn column(&self, sample_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.sample_position(sample_id)
            .map(|col| self.values.column(col))
    }

    fn reaction_position(&self, reaction_id: &str) -> Option<usize> {
        self.reaction_ids.iter().position(|id| id == reaction_id)
    }

    fn sample_position(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }
}
