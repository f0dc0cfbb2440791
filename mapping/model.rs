// ========================================================================================
//
//                     The model collaborator: genes, reactions and their rules
//
// ========================================================================================
//
// Only the parts of a metabolic model that rule evaluation needs are represented:
// the declared genes (the "gene universe") and the ordered reactions with their
// gene-reaction rules. Models are described in TOML:
//
//     [[genes]]
//     id = "HGNC:8877"
//     name = "PFKM"
//
//     [[reactions]]
//     id = "PFK"
//     rule = "HGNC:8877 or HGNC:8878"

use crate::batch::MappingError;
use crate::rule::{self, RuleError};
use crate::types::IdMode;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use serde::Deserialize;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Gene '{0}' is declared more than once.")]
    DuplicateGene(String),
    #[error("Reaction '{0}' is declared more than once.")]
    DuplicateReaction(String),
    #[error(
        "The {kind} '{value}' cannot appear in a rule: identifiers must be non-empty, contain no whitespace or parentheses, and must not be the keywords AND/OR."
    )]
    InvalidIdentifier { kind: &'static str, value: String },
}

/// A declared gene. The optional `name` is its alias (usually the gene product name).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Gene {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Gene {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
        }
    }
}

/// A reaction with its gene-reaction rule over primary gene ids.
///
/// `name_rule` is the same rule written over gene aliases. When absent it is derived
/// from `rule` on demand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reaction {
    pub id: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub name_rule: Option<String>,
}

impl Reaction {
    pub fn new(id: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rule: rule.into(),
            name_rule: None,
        }
    }

    /// The rule to evaluate when expression rows are keyed by `mode`.
    pub fn rule_for<'a>(
        &'a self,
        mode: IdMode,
        universe: &GeneUniverse,
    ) -> Result<Cow<'a, str>, RuleError> {
        match (mode, &self.name_rule) {
            (IdMode::PrimaryId, _) => Ok(Cow::Borrowed(&self.rule)),
            (IdMode::AliasName, Some(name_rule)) => Ok(Cow::Borrowed(name_rule)),
            (IdMode::AliasName, None) => {
                rule::translate_identifiers(&self.rule, |id| universe.alias_of(id)).map(Cow::Owned)
            }
        }
    }
}

/// The declared genes of a model, viewed through either identifier mode.
///
/// Identifier lists are de-duplicated and keep declaration order. A gene without an
/// alias is known by its primary id in alias mode.
#[derive(Debug, Clone, Default)]
pub struct GeneUniverse {
    primary: Vec<String>,
    alias: Vec<String>,
    primary_set: AHashSet<String>,
    alias_set: AHashSet<String>,
    alias_of: AHashMap<String, String>,
}

impl GeneUniverse {
    pub fn from_genes(genes: &[Gene]) -> Self {
        let mut universe = Self::default();
        for gene in genes {
            let alias = gene.name.as_deref().unwrap_or(&gene.id);
            if universe.primary_set.insert(gene.id.clone()) {
                universe.primary.push(gene.id.clone());
                universe
                    .alias_of
                    .insert(gene.id.clone(), alias.to_string());
            }
            if universe.alias_set.insert(alias.to_string()) {
                universe.alias.push(alias.to_string());
            }
        }
        universe
    }

    /// Every declared identifier under `mode`, in declaration order.
    pub fn identifiers(&self, mode: IdMode) -> &[String] {
        match mode {
            IdMode::PrimaryId => &self.primary,
            IdMode::AliasName => &self.alias,
        }
    }

    pub fn contains(&self, identifier: &str, mode: IdMode) -> bool {
        match mode {
            IdMode::PrimaryId => self.primary_set.contains(identifier),
            IdMode::AliasName => self.alias_set.contains(identifier),
        }
    }

    /// The alias-mode identifier of the gene with primary id `primary`.
    pub fn alias_of(&self, primary: &str) -> Option<&str> {
        self.alias_of.get(primary).map(String::as_str)
    }

    /// Number of declared genes.
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelFile {
    #[serde(default)]
    genes: Vec<Gene>,
    #[serde(default)]
    reactions: Vec<Reaction>,
}

/// The validated, read-only view of a metabolic model that the mapper consumes.
#[derive(Debug, Clone)]
pub struct MetabolicModel {
    genes: Vec<Gene>,
    reactions: Vec<Reaction>,
    universe: GeneUniverse,
}

impl MetabolicModel {
    /// Validates identifiers and uniqueness. Rules are not checked here: a malformed or
    /// unknown-gene rule is reported when it is evaluated.
    pub fn new(genes: Vec<Gene>, reactions: Vec<Reaction>) -> Result<Self, ModelError> {
        let mut seen_genes = AHashSet::with_capacity(genes.len());
        for gene in &genes {
            if !rule::is_valid_identifier(&gene.id) {
                return Err(ModelError::InvalidIdentifier {
                    kind: "gene id",
                    value: gene.id.clone(),
                });
            }
            if let Some(name) = &gene.name {
                if !rule::is_valid_identifier(name) {
                    return Err(ModelError::InvalidIdentifier {
                        kind: "gene name",
                        value: name.clone(),
                    });
                }
            }
            if !seen_genes.insert(gene.id.as_str()) {
                return Err(ModelError::DuplicateGene(gene.id.clone()));
            }
        }

        if let Some(duplicate) = reactions.iter().map(|r| r.id.as_str()).duplicates().next() {
            return Err(ModelError::DuplicateReaction(duplicate.to_string()));
        }

        let universe = GeneUniverse::from_genes(&genes);
        Ok(Self {
            genes,
            reactions,
            universe,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let file: ModelFile = toml::from_str(content)?;
        Self::new(file.genes, file.reactions)
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn universe(&self) -> &GeneUniverse {
        &self.universe
    }

    /// Reaction ids in model order.
    pub fn reaction_ids(&self) -> Vec<String> {
        self.reactions.iter().map(|r| r.id.clone()).collect()
    }

    /// Every reaction's rule under `mode`, in model order.
    pub fn rules(&self, mode: IdMode) -> Result<Vec<Cow<'_, str>>, MappingError> {
        self.reactions
            .iter()
            .map(|reaction| {
                reaction
                    .rule_for(mode, &self.universe)
                    .map_err(|source| MappingError::RuleTranslation {
                        reaction: reaction.id.clone(),
                        source,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
[[genes]]
id = "g1"
name = "PFK"

[[genes]]
id = "g2"
name = "ALDO"

[[genes]]
id = "g3"

[[reactions]]
id = "r1"
rule = "g1 and (g2 or g3)"

[[reactions]]
id = "r2"
rule = "g2"
name_rule = "ALDO"

[[reactions]]
id = "exchange"
"#;

    #[test]
    fn loads_genes_and_reactions_in_declared_order() {
        let model = MetabolicModel::from_toml_str(MODEL).unwrap();
        assert_eq!(model.genes().len(), 3);
        assert_eq!(model.reaction_ids(), vec!["r1", "r2", "exchange"]);
        assert_eq!(model.reactions()[2].rule, "");
        assert_eq!(
            model.universe().identifiers(IdMode::PrimaryId),
            &["g1", "g2", "g3"]
        );
        assert_eq!(
            model.universe().identifiers(IdMode::AliasName),
            &["PFK", "ALDO", "g3"]
        );
    }

    #[test]
    fn alias_rules_are_derived_or_taken_verbatim() {
        let model = MetabolicModel::from_toml_str(MODEL).unwrap();
        let rules = model.rules(IdMode::AliasName).unwrap();
        assert_eq!(rules[0], "PFK and (ALDO or g3)");
        assert_eq!(rules[1], "ALDO");
        assert_eq!(rules[2], "");

        let primary = model.rules(IdMode::PrimaryId).unwrap();
        assert_eq!(primary[0], "g1 and (g2 or g3)");
    }

    #[test]
    fn alias_derivation_reports_unknown_genes_with_reaction_context() {
        let model = MetabolicModel::new(
            vec![Gene::new("g1", Some("PFK"))],
            vec![Reaction::new("r1", "g1 or g7")],
        )
        .unwrap();
        match model.rules(IdMode::AliasName) {
            Err(MappingError::RuleTranslation { reaction, source }) => {
                assert_eq!(reaction, "r1");
                assert!(matches!(source, RuleError::UnknownIdentifier { ref identifier, .. } if identifier == "g7"));
            }
            other => panic!("expected RuleTranslation error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let err = MetabolicModel::new(
            vec![Gene::new("g1", None), Gene::new("g1", Some("X"))],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateGene(ref id) if id == "g1"));

        let err = MetabolicModel::new(
            vec![Gene::new("g1", None)],
            vec![Reaction::new("r1", "g1"), Reaction::new("r1", "")],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateReaction(ref id) if id == "r1"));
    }

    #[test]
    fn identifiers_that_cannot_be_tokenized_are_rejected() {
        let err = MetabolicModel::new(vec![Gene::new("g 1", None)], vec![]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidIdentifier { kind: "gene id", .. }));

        let err =
            MetabolicModel::new(vec![Gene::new("g1", Some("ATP synthase"))], vec![]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidIdentifier { kind: "gene name", .. }));
    }

    #[test]
    fn shared_aliases_collapse_into_one_identifier() {
        let universe = GeneUniverse::from_genes(&[
            Gene::new("g1", Some("HK")),
            Gene::new("g2", Some("HK")),
        ]);
        assert_eq!(universe.len(), 2);
        assert_eq!(universe.identifiers(IdMode::AliasName), &["HK"]);
        assert!(universe.contains("HK", IdMode::AliasName));
        assert!(!universe.contains("HK", IdMode::PrimaryId));
    }

    #[test]
    fn unknown_fields_in_the_model_file_are_an_error() {
        let err = MetabolicModel::from_toml_str("[[genez]]\nid = \"g1\"\n").unwrap_err();
        assert!(matches!(err, ModelError::TomlParseError(_)));
    }
}
