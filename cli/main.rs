#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use rxnmap::main::{self as driver, MapRequest};
use rxnmap::types::{IdMode, OrPolicy, SampleSelector};

#[derive(Parser)]
#[command(
    name = "rxnmap",
    about = "Map gene expression onto metabolic reaction activity",
    long_about = "Evaluates each reaction's gene-protein-reaction rule against per-sample \
                 expression values and writes a reaction x sample activity matrix."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Map an expression table onto the reactions of a model
    #[command(about = "Compute reaction activity per sample (outputs: <table>.rxn.tsv)")]
    Map {
        /// Path to the metabolic model (.toml)
        #[arg(value_name = "MODEL")]
        model: PathBuf,

        /// Path to the expression table (first column: gene ids, remaining columns: samples)
        #[arg(value_name = "EXPRESSION")]
        expression: PathBuf,

        /// Mapping configuration file (.toml); flags below override its values
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Sample to map, by column name or `#INDEX`; repeat to select several
        #[arg(long = "sample", value_name = "NAME|#INDEX", value_parser = parse_sample_selector)]
        samples: Vec<SampleSelector>,

        /// Match rules against gene aliases instead of primary ids
        #[arg(long)]
        alias: bool,

        /// How OR combines its operands: `sum` or `max`
        #[arg(long, value_name = "POLICY")]
        or_policy: Option<String>,

        /// Number of worker threads
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Output path (default: next to the expression table)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Evaluate a single rule against inline values
    #[command(about = "Evaluate one rule and print its value")]
    Eval {
        /// Rule text, e.g. "(a and b) or c"
        #[arg(value_name = "RULE")]
        rule: String,

        /// Gene value as `ID=VALUE`; repeat for each gene
        #[arg(long = "value", value_name = "ID=VALUE", value_parser = parse_gene_value)]
        values: Vec<(String, f64)>,

        /// How OR combines its operands: `sum` or `max`
        #[arg(long, value_name = "POLICY")]
        or_policy: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Map {
            model,
            expression,
            config,
            samples,
            alias,
            or_policy,
            workers,
            out,
        }) => run_map(
            model, expression, config, samples, alias, or_policy, workers, out,
        ),
        Some(Commands::Eval {
            rule,
            values,
            or_policy,
        }) => run_eval(rule, values, or_policy),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_map(
    model: PathBuf,
    expression: PathBuf,
    config: Option<PathBuf>,
    samples: Vec<SampleSelector>,
    alias: bool,
    or_policy: Option<String>,
    workers: Option<usize>,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mapping_config = driver::load_config(config.as_deref())?;
    if alias {
        mapping_config.id_mode = IdMode::AliasName;
    }
    if let Some(policy) = or_policy {
        mapping_config.or_policy = policy.parse()?;
    }
    if let Some(workers) = workers {
        mapping_config.workers = workers;
    }
    if !samples.is_empty() {
        mapping_config.samples = samples;
    }
    mapping_config.validate()?;

    let request = MapRequest {
        model_path: model,
        expression_path: expression,
        config: mapping_config,
        output: out,
    };
    let written = driver::run_map(&request)?;
    println!("{}", written.display());
    Ok(())
}

fn run_eval(
    rule: String,
    values: Vec<(String, f64)>,
    or_policy: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let policy = match or_policy {
        Some(policy) => policy.parse()?,
        None => OrPolicy::default(),
    };
    let value = driver::evaluate_inline(&rule, &values, policy)?;
    println!("{}", ryu::Buffer::new().format(value));
    Ok(())
}

fn parse_gene_value(raw: &str) -> Result<(String, f64), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{raw}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing gene id in '{raw}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in '{raw}': {e}"))?;
    Ok((id.to_string(), value))
}

fn parse_sample_selector(raw: &str) -> Result<SampleSelector, String> {
    raw.parse()
        .map_err(|e| format!("invalid sample position in '{raw}': {e}"))
}
