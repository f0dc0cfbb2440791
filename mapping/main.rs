// ========================================================================================
//
//                               The driver: rxnmap
//
// ========================================================================================
//
// This module turns command-line requests into library calls. It owns the file
// boundaries (model, expression table, output) and the progress display; the mapping
// itself lives in `batch`.

use crate::batch::{BatchMapper, MappingError, MappingProgress};
use crate::config::{ConfigError, MappingConfig};
use crate::lookup::ExpressionLookup;
use crate::model::{ModelError, MetabolicModel};
use crate::report::{self, ReportError};
use crate::rule::{self, RuleError};
use crate::table::{ExpressionTable, TableError};
use crate::types::{OrPolicy, ReactionActivityMatrix};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Expression table error: {0}")]
    Table(#[from] TableError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// A fully resolved `map` request.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub model_path: PathBuf,
    pub expression_path: PathBuf,
    pub config: MappingConfig,
    pub output: Option<PathBuf>,
}

/// Loads the inputs, maps every selected sample and writes the matrix as TSV.
/// Returns the path that was written.
pub fn run_map(request: &MapRequest) -> Result<PathBuf, DriverError> {
    let overall_start_time = Instant::now();
    let output_path = request
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&request.expression_path));
    if output_path.exists() {
        return Err(ReportError::OutputExists(output_path).into());
    }

    let model = MetabolicModel::from_path(&request.model_path)?;
    info!(
        "Loaded model '{}': {} genes, {} reactions.",
        request.model_path.display(),
        model.genes().len(),
        model.reactions().len()
    );

    let table = ExpressionTable::from_path(&request.expression_path)?;
    info!(
        "Loaded expression table '{}': {} rows, {} samples.",
        request.expression_path.display(),
        table.n_rows(),
        table.n_samples()
    );

    let matrix = map_with_progress(&model, &table, &request.config)?;
    report::write_matrix_tsv(&output_path, &matrix)?;

    info!(
        "Wrote {} x {} activity matrix to '{}' ({:.2?} total).",
        matrix.n_reactions(),
        matrix.n_samples(),
        output_path.display(),
        overall_start_time.elapsed()
    );
    Ok(output_path)
}

/// Reads the mapping configuration file, or returns the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<MappingConfig, DriverError> {
    let Some(path) = path else {
        return Ok(MappingConfig::default());
    };
    let config = MappingConfig::from_path(path)?;
    info!(
        "Loaded configuration '{}' ({} worker(s), OR policy {}).",
        path.display(),
        config.workers,
        config.or_policy
    );
    Ok(config)
}

/// Evaluates one rule against inline `(gene, value)` pairs. The listed genes form
/// the gene universe.
pub fn evaluate_inline(
    rule_text: &str,
    values: &[(String, f64)],
    or_policy: OrPolicy,
) -> Result<f64, DriverError> {
    let known: Vec<String> = values.iter().map(|(id, _)| id.clone()).collect();
    let lookup =
        ExpressionLookup::from_pairs(values.iter().map(|(id, v)| (id.as_str(), *v)), &known);
    Ok(rule::evaluate(rule_text, &lookup, or_policy)?)
}

/// `<dir>/<stem>.rxn.tsv` next to the expression file.
pub fn default_output_path(expression_path: &Path) -> PathBuf {
    let stem = expression_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "expression".to_string());
    expression_path.with_file_name(format!("{stem}.rxn.tsv"))
}

fn map_with_progress(
    model: &MetabolicModel,
    table: &ExpressionTable,
    config: &MappingConfig,
) -> Result<ReactionActivityMatrix, MappingError> {
    let progress = BarProgress::new();
    BatchMapper::new(model, config)
        .with_progress(&progress)
        .run(table)
}

/// Draws a per-sample progress bar on stderr when it is a terminal.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        Self { bar }
    }
}

impl MappingProgress for BarProgress {
    fn on_start(&self, total_samples: usize) {
        self.bar.set_length(total_samples as u64);
        self.bar.set_message("Mapping samples...");
    }

    fn on_sample_finished(&self, _sample: &str) {
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}
