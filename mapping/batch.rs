// ========================================================================================
//
//                         The batch mapper: every rule, every sample
//
// ========================================================================================
//
// This module orchestrates the expression lookup and the rule evaluator across all
// (reaction, sample) pairs and assembles the result matrix.
//
// 1.  **Pre-flight:** Everything that can be checked without evaluating a rule is
//     checked first: the gene universe is non-empty, the worker count is positive,
//     every sample selector names a column, and alias rules can be derived. The raw
//     table is then cut down to rows whose identifier is a declared gene.
//
// 2.  **Fan-out:** One job per selected sample runs on a dedicated Rayon pool. A job
//     builds its sample's lookup, evaluates every reaction against it, and returns
//     one column. Jobs share only read-only data.
//
// 3.  **Join:** Columns are collected by sample position, so the matrix's column order
//     is the caller's order no matter which worker finishes first. The first failure
//     stops the collection and is returned alone; no partial matrix ever leaves this
//     module.

use crate::config::MappingConfig;
use crate::lookup::ExpressionLookup;
use crate::model::MetabolicModel;
use crate::rule::{self, RuleError};
use crate::table::ExpressionTable;
use crate::types::{OrPolicy, ReactionActivityMatrix, SampleSelector};
use ahash::AHashSet;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::borrow::Cow;
use std::time::Instant;
use thiserror::Error;

// ========================================================================================
//                                  Error handling
// ========================================================================================

/// The four failure categories a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid sample selector, empty gene universe, bad worker count or id mode.
    Configuration,
    /// A rule is malformed.
    RuleSyntax,
    /// A rule names a gene the model does not declare.
    UnknownIdentifier,
    /// The OR policy is not `sum` or `max`.
    AggregationPolicy,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Sample selector {0} does not match any column of the expression table.")]
    SampleNotFound(SampleSelector),
    #[error("The model declares no genes; there is nothing to map expression values onto.")]
    EmptyGeneUniverse,
    #[error("The worker count must be a positive integer, got {0}.")]
    InvalidWorkerCount(usize),
    #[error("Unrecognized identifier mode '{0}'. Expected 'primary-id' or 'alias-name'.")]
    UnknownIdMode(String),
    #[error("Unrecognized OR policy '{0}'. Expected 'sum' or 'max'.")]
    AggregationPolicy(String),
    #[error("Failed to start the worker pool: {0}")]
    WorkerPool(#[from] ThreadPoolBuildError),
    #[error("Could not derive the alias rule of reaction '{reaction}': {source}")]
    RuleTranslation {
        reaction: String,
        #[source]
        source: RuleError,
    },
    #[error("Reaction '{reaction}' could not be evaluated for sample '{sample}': {source}")]
    Evaluation {
        sample: String,
        reaction: String,
        #[source]
        source: RuleError,
    },
}

impl MappingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SampleNotFound(_)
            | Self::EmptyGeneUniverse
            | Self::InvalidWorkerCount(_)
            | Self::UnknownIdMode(_)
            | Self::WorkerPool(_) => ErrorKind::Configuration,
            Self::AggregationPolicy(_) => ErrorKind::AggregationPolicy,
            Self::RuleTranslation { source, .. } | Self::Evaluation { source, .. } => {
                match source {
                    RuleError::Syntax { .. } => ErrorKind::RuleSyntax,
                    RuleError::UnknownIdentifier { .. } => ErrorKind::UnknownIdentifier,
                }
            }
        }
    }
}

// ========================================================================================
//                                Progress reporting
// ========================================================================================

/// Observer for per-sample progress. Called from worker threads, so it must be `Sync`.
pub trait MappingProgress: Sync {
    fn on_start(&self, total_samples: usize) {
        let _ = total_samples;
    }
    fn on_sample_finished(&self, sample: &str) {
        let _ = sample;
    }
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct NoopProgress;

impl MappingProgress for NoopProgress {}

// ========================================================================================
//                                   Worker pool
// ========================================================================================

/// A fixed-size pool that runs independent jobs and joins their results in job order.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, MappingError> {
        if workers == 0 {
            return Err(MappingError::InvalidWorkerCount(workers));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("rxnmap-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `job` once per element of `jobs` and returns the outputs in input order.
    ///
    /// Blocks until every job has finished or one has failed. On failure the remaining
    /// jobs are abandoned and only that error is returned.
    pub fn run_ordered<J, T, E, F>(&self, jobs: &[J], job: F) -> Result<Vec<T>, E>
    where
        J: Sync,
        T: Send,
        E: Send,
        F: Fn(usize, &J) -> Result<T, E> + Sync,
    {
        self.pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .map(|(position, item)| job(position, item))
                .collect()
        })
    }
}

// ========================================================================================
//                                   Batch mapper
// ========================================================================================

/// A selected sample, resolved against the expression table.
#[derive(Debug, Clone)]
struct ResolvedSample {
    column: usize,
    name: String,
}

/// Everything the workers read, built once before the fan-out.
struct BatchPlan<'m> {
    rules: Vec<Cow<'m, str>>,
    table: ExpressionTable,
    samples: Vec<ResolvedSample>,
}

pub struct BatchMapper<'a> {
    model: &'a MetabolicModel,
    config: &'a MappingConfig,
    progress: &'a dyn MappingProgress,
}

impl<'a> BatchMapper<'a> {
    pub fn new(model: &'a MetabolicModel, config: &'a MappingConfig) -> Self {
        Self {
            model,
            config,
            progress: &NoopProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn MappingProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Maps every selected sample of `table` onto every reaction of the model.
    pub fn run(&self, table: &ExpressionTable) -> Result<ReactionActivityMatrix, MappingError> {
        let start_time = Instant::now();
        let plan = self.plan(table)?;
        let pool = WorkerPool::new(self.config.workers)?;

        info!(
            "Mapping {} sample(s) onto {} reaction(s) with {} worker(s) (id mode: {}, OR policy: {}).",
            plan.samples.len(),
            plan.rules.len(),
            pool.workers(),
            self.config.id_mode,
            self.config.or_policy
        );

        self.progress.on_start(plan.samples.len());
        let outcome = pool.run_ordered(&plan.samples, |_, sample| -> Result<_, MappingError> {
            let column = self.evaluate_sample(&plan.rules, &plan.table, sample)?;
            self.progress.on_sample_finished(&sample.name);
            Ok(column)
        });
        self.progress.on_finish();
        let columns = outcome?;

        let sample_ids = plan.samples.into_iter().map(|s| s.name).collect();
        let matrix =
            ReactionActivityMatrix::from_columns(self.model.reaction_ids(), sample_ids, &columns);

        info!(
            "Mapped {} reaction(s) x {} sample(s) in {:.2?}.",
            matrix.n_reactions(),
            matrix.n_samples(),
            start_time.elapsed()
        );
        Ok(matrix)
    }

    fn plan(&self, table: &ExpressionTable) -> Result<BatchPlan<'a>, MappingError> {
        let universe = self.model.universe();
        let mode = self.config.id_mode;

        if universe.is_empty() {
            return Err(MappingError::EmptyGeneUniverse);
        }
        if self.config.workers == 0 {
            return Err(MappingError::InvalidWorkerCount(self.config.workers));
        }

        let samples = resolve_samples(table, &self.config.samples)?;
        let rules = self.model.rules(mode)?;

        let filtered = table.retain_rows(|id| universe.contains(id, mode));
        debug!(
            "Kept {} of {} expression rows matching declared {} identifiers.",
            filtered.n_rows(),
            table.n_rows(),
            mode
        );

        let duplicated = filtered.duplicated_row_ids();
        if !duplicated.is_empty() {
            warn!(
                "{} gene identifier(s) appear on more than one expression row ({}); only the first row of each is used.",
                duplicated.len(),
                duplicated.iter().take(5).join(", ")
            );
        }

        let measured: AHashSet<&str> = filtered.row_ids().iter().map(String::as_str).collect();
        let unmeasured = rules
            .iter()
            .flat_map(|text| rule::identifiers(text))
            .filter(|id| universe.contains(id, mode) && !measured.contains(id))
            .unique()
            .count();
        if unmeasured > 0 {
            debug!("{unmeasured} gene(s) referenced by rules have no expression row and read as 0.");
        }

        Ok(BatchPlan {
            rules,
            table: filtered,
            samples,
        })
    }

    fn evaluate_sample(
        &self,
        rules: &[Cow<'_, str>],
        table: &ExpressionTable,
        sample: &ResolvedSample,
    ) -> Result<Vec<f64>, MappingError> {
        let lookup = ExpressionLookup::build(
            table,
            &SampleSelector::Index(sample.column),
            self.model.universe(),
            self.config.id_mode,
        )?;
        evaluate_column(
            self.model,
            rules,
            &lookup,
            &sample.name,
            self.config.or_policy,
        )
    }
}

fn resolve_samples(
    table: &ExpressionTable,
    selectors: &[SampleSelector],
) -> Result<Vec<ResolvedSample>, MappingError> {
    let to_sample = |column: usize| ResolvedSample {
        column,
        name: table.sample_ids()[column].clone(),
    };
    if selectors.is_empty() {
        return Ok((0..table.n_samples()).map(to_sample).collect());
    }
    selectors
        .iter()
        .map(|selector| table.resolve(selector).map(to_sample))
        .collect()
}

fn evaluate_column(
    model: &MetabolicModel,
    rules: &[Cow<'_, str>],
    lookup: &ExpressionLookup<'_>,
    sample: &str,
    or_policy: OrPolicy,
) -> Result<Vec<f64>, MappingError> {
    model
        .reactions()
        .iter()
        .zip(rules)
        .map(|(reaction, rule)| {
            rule::evaluate(rule, lookup, or_policy).map_err(|source| MappingError::Evaluation {
                sample: sample.to_string(),
                reaction: reaction.id.clone(),
                source,
            })
        })
        .collect()
}

/// Maps the selected samples of `table` onto every reaction of `model`.
pub fn map_expression_to_reactions(
    model: &MetabolicModel,
    table: &ExpressionTable,
    config: &MappingConfig,
) -> Result<ReactionActivityMatrix, MappingError> {
    BatchMapper::new(model, config).run(table)
}

/// Maps a single sample on the calling thread and returns one score per reaction, in
/// model order. `config.samples` and `config.workers` are ignored.
pub fn map_sample(
    model: &MetabolicModel,
    table: &ExpressionTable,
    selector: &SampleSelector,
    config: &MappingConfig,
) -> Result<Vec<f64>, MappingError> {
    if model.universe().is_empty() {
        return Err(MappingError::EmptyGeneUniverse);
    }
    let column = table.resolve(selector)?;
    let rules = model.rules(config.id_mode)?;
    let lookup = ExpressionLookup::build(
        table,
        &SampleSelector::Index(column),
        model.universe(),
        config.id_mode,
    )?;
    evaluate_column(
        model,
        &rules,
        &lookup,
        &table.sample_ids()[column],
        config.or_policy,
    )
}
