use std::fs;
use std::process::Command;

use tempfile::tempdir;

const MODEL: &str = "[[genes]]\nid = \"a\"\n[[genes]]\nid = \"b\"\n\
[[reactions]]\nid = \"r1\"\nrule = \"a AND b\"\n\
[[reactions]]\nid = \"r2\"\nrule = \"a OR b\"\n";

#[test]
fn map_command_writes_matrix_next_to_the_table() {
    let tmp = tempdir().expect("temporary directory");
    let model_path = tmp.path().join("model.toml");
    let table_path = tmp.path().join("tpm.tsv");
    fs::write(&model_path, MODEL).expect("write model");
    fs::write(&table_path, "gene\ts1\ts2\na\t4\t0\nb\t2\t7\n").expect("write table");

    let exe = env!("CARGO_BIN_EXE_rxnmap");
    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "map",
            model_path.to_str().expect("path str"),
            table_path.to_str().expect("path str"),
            "--or-policy",
            "max",
            "--sample",
            "s2",
            "--sample",
            "#0",
            "--workers",
            "2",
        ])
        .output()
        .expect("run rxnmap cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let written = tmp.path().join("tpm.rxn.tsv");
    assert_eq!(
        fs::read_to_string(written).expect("read output"),
        "#REACTION\ts2\ts1\nr1\t0.0\t2.0\nr2\t7.0\t4.0\n"
    );
}

#[test]
fn unknown_or_policy_exits_with_error() {
    let tmp = tempdir().expect("temporary directory");
    let model_path = tmp.path().join("model.toml");
    let table_path = tmp.path().join("tpm.tsv");
    fs::write(&model_path, MODEL).expect("write model");
    fs::write(&table_path, "gene\ts1\na\t1\nb\t2\n").expect("write table");

    let output = Command::new(env!("CARGO_BIN_EXE_rxnmap"))
        .args([
            "map",
            model_path.to_str().expect("path str"),
            table_path.to_str().expect("path str"),
            "--or-policy",
            "mean",
        ])
        .output()
        .expect("run rxnmap cli");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OR policy 'mean'"), "stderr: {stderr}");
    assert!(!tmp.path().join("tpm.rxn.tsv").exists());
}

#[test]
fn eval_command_prints_the_rule_value() {
    let output = Command::new(env!("CARGO_BIN_EXE_rxnmap"))
        .args([
            "eval",
            "(a and b) or c",
            "--value",
            "a=3",
            "--value",
            "b=5",
            "--value",
            "c=1.5",
        ])
        .output()
        .expect("run rxnmap cli");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "4.5");
}
