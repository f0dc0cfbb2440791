use std::fs;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rxnmap::config::MappingConfig;
use rxnmap::report::write_matrix_tsv;
use rxnmap::{
    ErrorKind, ExpressionTable, Gene, IdMode, MetabolicModel, OrPolicy, Reaction,
    ReactionActivityMatrix, SampleSelector, map_expression_to_reactions, map_sample,
};
use tempfile::tempdir;

fn small_model() -> MetabolicModel {
    MetabolicModel::new(
        vec![Gene::new("a", None), Gene::new("b", None)],
        vec![Reaction::new("r1", "a AND b"), Reaction::new("r2", "a OR b")],
    )
    .unwrap()
}

fn small_table() -> ExpressionTable {
    ExpressionTable::from_columns(
        vec!["a".into(), "b".into()],
        vec![("s1".into(), vec![4.0, 2.0]), ("s2".into(), vec![0.0, 7.0])],
    )
    .unwrap()
}

fn config(workers: usize) -> MappingConfig {
    MappingConfig {
        workers,
        ..MappingConfig::default()
    }
}

fn random_rule(rng: &mut StdRng, genes: &[String], depth: usize) -> String {
    let operands = rng.gen_range(1..=4);
    let mut rule = String::new();
    for i in 0..operands {
        if i > 0 {
            rule.push_str(if rng.gen_bool(0.5) { " and " } else { " OR " });
        }
        if depth > 0 && rng.gen_bool(0.3) {
            rule.push('(');
            rule.push_str(&random_rule(rng, genes, depth - 1));
            rule.push(')');
        } else {
            rule.push_str(&genes[rng.gen_range(0..genes.len())]);
        }
    }
    rule
}

/// A model with nested rules and a table that also carries rows outside the model.
fn random_inputs(seed: u64) -> (MetabolicModel, ExpressionTable) {
    let mut rng = StdRng::seed_from_u64(seed);
    let gene_ids: Vec<String> = (0..50).map(|i| format!("g{i}")).collect();
    let genes: Vec<Gene> = gene_ids.iter().map(|id| Gene::new(id.as_str(), None)).collect();
    let reactions: Vec<Reaction> = (0..200)
        .map(|i| Reaction::new(format!("r{i}"), random_rule(&mut rng, &gene_ids, 3)))
        .collect();
    let model = MetabolicModel::new(genes, reactions).unwrap();

    // Only the first 40 genes are measured; ten unrelated rows are mixed in.
    let mut row_ids: Vec<String> = gene_ids[..40].to_vec();
    row_ids.extend((0..10).map(|i| format!("unrelated{i}")));
    let columns: Vec<(String, Vec<f64>)> = (0..12)
        .map(|s| {
            let values: Vec<f64> = (0..row_ids.len()).map(|_| rng.gen_range(0.0..100.0)).collect();
            (format!("sample{s}"), values)
        })
        .collect();
    let table = ExpressionTable::from_columns(row_ids, columns).unwrap();
    (model, table)
}

fn bits(matrix: &ReactionActivityMatrix) -> Vec<u64> {
    matrix.values().iter().map(|v| v.to_bits()).collect()
}

#[test]
fn batch_scenario_produces_expected_matrix() {
    let matrix = map_expression_to_reactions(&small_model(), &small_table(), &config(2)).unwrap();

    assert_eq!(matrix.reaction_ids(), ["r1", "r2"]);
    assert_eq!(matrix.sample_ids(), ["s1", "s2"]);
    assert_eq!(matrix.row("r1").unwrap().to_vec(), vec![2.0, 0.0]);
    assert_eq!(matrix.row("r2").unwrap().to_vec(), vec![6.0, 7.0]);
}

#[test]
fn worker_count_does_not_change_the_result() {
    let model = small_model();
    let table = small_table();
    let one = map_expression_to_reactions(&model, &table, &config(1)).unwrap();
    let eight = map_expression_to_reactions(&model, &table, &config(8)).unwrap();
    assert_eq!(bits(&one), bits(&eight));

    for seed in [7, 19, 2024] {
        let (model, table) = random_inputs(seed);
        let one = map_expression_to_reactions(&model, &table, &config(1)).unwrap();
        let eight = map_expression_to_reactions(&model, &table, &config(8)).unwrap();
        assert_eq!(one.sample_ids(), eight.sample_ids());
        assert_eq!(bits(&one), bits(&eight), "seed {seed}");
    }
}

#[test]
fn batch_columns_match_single_sample_mapping() {
    let (model, table) = random_inputs(42);
    let cfg = MappingConfig {
        or_policy: OrPolicy::Max,
        ..config(4)
    };
    let matrix = map_expression_to_reactions(&model, &table, &cfg).unwrap();

    for (index, sample) in table.sample_ids().iter().enumerate() {
        let single = map_sample(&model, &table, &SampleSelector::Index(index), &cfg).unwrap();
        assert_eq!(matrix.column(sample).unwrap().to_vec(), single);
    }
}

#[test]
fn selected_samples_follow_caller_order() {
    let (model, table) = random_inputs(5);
    let cfg = MappingConfig {
        samples: vec![
            "sample9".into(),
            SampleSelector::Index(0),
            "sample3".into(),
        ],
        ..config(3)
    };
    let matrix = map_expression_to_reactions(&model, &table, &cfg).unwrap();
    assert_eq!(matrix.sample_ids(), ["sample9", "sample0", "sample3"]);
    assert_eq!(matrix.n_reactions(), 200);
}

#[test]
fn any_failing_reaction_fails_the_whole_batch() {
    let model = MetabolicModel::new(
        vec![Gene::new("a", None), Gene::new("b", None)],
        vec![
            Reaction::new("ok", "a or b"),
            Reaction::new("broken", "a and (b"),
        ],
    )
    .unwrap();
    let err = map_expression_to_reactions(&model, &small_table(), &config(4)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuleSyntax);

    let model = MetabolicModel::new(
        vec![Gene::new("a", None), Gene::new("b", None)],
        vec![Reaction::new("r1", "a"), Reaction::new("r2", "b or ghost")],
    )
    .unwrap();
    let err = map_expression_to_reactions(&model, &small_table(), &config(4)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownIdentifier);
    assert!(err.to_string().contains("r2"));
}

#[test]
fn alias_mode_matches_rows_by_gene_name() {
    let model = MetabolicModel::new(
        vec![Gene::new("HGNC:1", Some("PFKM")), Gene::new("HGNC:2", Some("PFKL"))],
        vec![Reaction::new("PFK", "HGNC:1 or HGNC:2")],
    )
    .unwrap();
    let table = ExpressionTable::from_columns(
        vec!["PFKM".into(), "PFKL".into()],
        vec![("s1".into(), vec![3.0, 5.0])],
    )
    .unwrap();
    let cfg = MappingConfig {
        id_mode: IdMode::AliasName,
        ..config(1)
    };
    let matrix = map_expression_to_reactions(&model, &table, &cfg).unwrap();
    assert_eq!(matrix.get("PFK", "s1"), Some(8.0));
}

#[test]
fn files_on_disk_map_to_a_tsv_report() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.toml");
    let table_path = dir.path().join("expression.csv");
    let out_path = dir.path().join("activity.tsv");

    fs::write(
        &model_path,
        r#"
[[genes]]
id = "a"

[[genes]]
id = "b"

[[reactions]]
id = "r1"
rule = "a AND b"

[[reactions]]
id = "r2"
rule = "a OR b"

[[reactions]]
id = "exchange"
"#,
    )
    .unwrap();
    fs::write(&table_path, "gene,s1,s2\na,4,0\nb,2,7\nzzz,9,9\n").unwrap();

    let model = MetabolicModel::from_path(&model_path).unwrap();
    let table = ExpressionTable::from_path(&table_path).unwrap();
    let matrix = map_expression_to_reactions(&model, &table, &config(2)).unwrap();
    write_matrix_tsv(&out_path, &matrix).unwrap();

    assert_eq!(
        fs::read_to_string(&out_path).unwrap(),
        "#REACTION\ts1\ts2\nr1\t2.0\t0.0\nr2\t6.0\t7.0\nexchange\t0.0\t0.0\n"
    );
}

#[test]
fn numeric_looking_gene_ids_survive_loading_from_disk() {
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.toml");
    let table_path = dir.path().join("expression.csv");

    fs::write(
        &model_path,
        r#"
[[genes]]
id = "007"

[[genes]]
id = "1.50"

[[genes]]
id = "5213"

[[reactions]]
id = "r1"
rule = "007 OR 1.50"

[[reactions]]
id = "r2"
rule = "5213 and 007"
"#,
    )
    .unwrap();
    fs::write(&table_path, "gene,s1,s2\n007,4,1\n1.50,2,3\n5213,10,0.5\n").unwrap();

    let model = MetabolicModel::from_path(&model_path).unwrap();
    let table = ExpressionTable::from_path(&table_path).unwrap();
    assert_eq!(table.row_ids(), ["007", "1.50", "5213"]);

    let matrix = map_expression_to_reactions(&model, &table, &config(2)).unwrap();
    assert_eq!(matrix.row("r1").unwrap().to_vec(), vec![6.0, 4.0]);
    assert_eq!(matrix.row("r2").unwrap().to_vec(), vec![4.0, 0.5]);
}
