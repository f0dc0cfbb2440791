#![deny(dead_code)]
#![deny(unused_imports)]
pub mod batch;
pub mod config;
pub mod lookup;
pub mod main;
pub mod model;
pub mod report;
pub mod rule;
pub mod table;
pub mod types;

pub use batch::{
    BatchMapper, ErrorKind, MappingError, MappingProgress, WorkerPool, map_expression_to_reactions,
    map_sample,
};
pub use config::MappingConfig;
pub use lookup::ExpressionLookup;
pub use model::{Gene, GeneUniverse, MetabolicModel, Reaction};
pub use rule::{RuleError, SyntaxFault, evaluate};
pub use table::ExpressionTable;
pub use types::{IdMode, OrPolicy, ReactionActivityMatrix, SampleSelector};
