//! Per-sample expression lookup.
//!
//! A lookup is a total function over the model's gene universe: every declared
//! identifier has a value, and identifiers the sample never measured read as `0.0`.
//! This keeps the rule reduction free of "missing" special cases. Identifiers outside
//! the universe have no entry at all, which is how the evaluator tells an unknown
//! gene apart from an unmeasured one.

use crate::batch::MappingError;
use crate::model::GeneUniverse;
use crate::table::ExpressionTable;
use crate::types::{IdMode, SampleSelector};
use ahash::AHashMap;
use log::debug;

#[derive(Debug, Clone)]
pub struct ExpressionLookup<'u> {
    values: AHashMap<&'u str, f64>,
    measured: usize,
    duplicates: usize,
}

impl<'u> ExpressionLookup<'u> {
    /// Builds the lookup for one sample column of `table`, keyed by the universe's
    /// identifiers under `mode`.
    ///
    /// Fails only when `selector` names no column of the table.
    pub fn build(
        table: &ExpressionTable,
        selector: &SampleSelector,
        universe: &'u GeneUniverse,
        mode: IdMode,
    ) -> Result<Self, MappingError> {
        let column = table.resolve(selector)?;
        let values = table.column(column);
        let raw = table
            .row_ids()
            .iter()
            .map(String::as_str)
            .zip(values.iter().copied());
        let lookup = Self::from_pairs(raw, universe.identifiers(mode));

        if lookup.duplicates > 0 {
            debug!(
                "Sample {}: skipped {} duplicate row(s), kept the first occurrence of each gene.",
                table.sample_ids()[column],
                lookup.duplicates
            );
        }
        Ok(lookup)
    }

    /// Builds a lookup from raw `(identifier, value)` pairs.
    ///
    /// Raw identifiers that are not in `known` are dropped. When an identifier appears
    /// more than once, the first occurrence wins. Every `known` identifier that was not
    /// seen is entered as `0.0`.
    pub fn from_pairs<'r, I>(raw: I, known: &'u [String]) -> Self
    where
        I: IntoIterator<Item = (&'r str, f64)>,
    {
        let mut slots: AHashMap<&'u str, Option<f64>> =
            known.iter().map(|id| (id.as_str(), None)).collect();
        let mut measured = 0;
        let mut duplicates = 0;

        for (identifier, value) in raw {
            if let Some(slot) = slots.get_mut(identifier) {
                if slot.is_none() {
                    *slot = Some(value);
                    measured += 1;
                } else {
                    duplicates += 1;
                }
            }
        }

        let values = slots
            .into_iter()
            .map(|(id, value)| (id, value.unwrap_or(0.0)))
            .collect();

        Self {
            values,
            measured,
            duplicates,
        }
    }

    /// The value of a declared identifier, or `None` if it is outside the universe.
    #[inline]
    pub fn get(&self, identifier: &str) -> Option<f64> {
        self.values.get(identifier).copied()
    }

    /// Number of declared identifiers (measured or defaulted).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of declared identifiers that received a measured value.
    pub fn measured(&self) -> usize {
        self.measured
    }

    /// Number of raw rows discarded because their identifier had already been seen.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}
