use std::fs;
use std::process::{Command, Output};

use tempfile::tempdir;

fn vexl_binary() -> &'static str {
    env!("CARGO_BIN_EXE_vexl")
}

fn vexl(args: &[&str]) -> Output {
    Command::new(vexl_binary())
        .args(args)
        .output()
        .expect("run vexl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn evaluates_inline_expressions() {
    let output = vexl(&["eval", "clamp(2 * 3, 0, 5) + 1"]);
    assert!(output.status.success(), "eval should succeed");
    assert_eq!(stdout(&output), "6\n");

    let output = vexl(&["eval", "concat(\"vex\", \"l\")"]);
    assert_eq!(stdout(&output), "vexl\n");
}

#[test]
fn variables_come_from_var_flags() {
    let output = vexl(&[
        "eval",
        "$P * $scale",
        "--var",
        "P=[1, 2, 3]",
        "--var",
        "scale=2",
    ]);
    assert!(output.status.success(), "eval should succeed");
    assert_eq!(stdout(&output), "[2, 4, 6]\n");
}

#[test]
fn reads_expressions_from_files() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("shade.vexl");
    fs::write(
        &path,
        "# brighten a color\nbase = [0.25, 0.5, 1];\nmix(base, [1, 1, 1], 0.5)\n",
    )?;

    let output = vexl(&["eval", "--file", path.to_str().expect("utf-8 path")]);
    assert!(output.status.success(), "eval should succeed");
    assert_eq!(stdout(&output), "[0.625, 0.75, 1]\n");
    Ok(())
}

#[test]
fn batch_files_evaluate_every_entry_in_order() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("batch.json");
    let rows: Vec<String> = (0..20).map(|index| format!("{{\"x\": {index}}}")).collect();
    fs::write(&path, format!("[{}]", rows.join(", ")))?;

    let output = vexl(&[
        "eval",
        "$x * $k",
        "--var",
        "k=10",
        "--batch",
        path.to_str().expect("utf-8 path"),
        "--threads",
        "3",
        "--json",
    ]);
    assert!(output.status.success(), "batch should succeed");
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let results: Vec<f64> = parsed["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|value| value.as_f64().expect("number"))
        .collect();
    let expected: Vec<f64> = (0..20).map(|index| f64::from(index) * 10.0).collect();
    assert_eq!(results, expected);
    assert_eq!(parsed["type"], "Float");
    Ok(())
}

#[test]
fn stats_and_bytecode_describe_the_program() -> anyhow::Result<()> {
    let output = vexl(&["eval", "abs($x)", "--var", "x=-3", "--stats", "--json"]);
    assert!(output.status.success(), "eval should succeed");
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(parsed["result"], 3.0);
    assert_eq!(parsed["statistics"]["calls.abs"], 1.0);

    let output = vexl(&["eval", "abs($x)", "--var", "x=-3", "--dump-bytecode"]);
    let text = stdout(&output);
    assert!(text.contains("LOAD_VAR"), "{text}");
    assert!(text.contains("f0 = abs"), "{text}");
    assert!(text.ends_with("3\n"), "{text}");
    Ok(())
}

#[test]
fn type_errors_report_a_location() {
    let output = vexl(&["eval", "length([1, 2])"]);
    assert!(!output.status.success(), "eval should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Diagnostics:"), "{stderr}");
    assert!(stderr.contains("<inline>:1:8"), "{stderr}");
    assert!(stderr.contains("Compilation failed"), "{stderr}");
}

#[test]
fn conflicting_variable_types_are_rejected() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("batch.json");
    fs::write(&path, r#"[{"x": 1}, {"x": "one"}]"#)?;

    let output = vexl(&["eval", "$x", "--batch", path.to_str().expect("utf-8 path")]);
    assert!(!output.status.success(), "eval should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("$x is used both as"), "{stderr}");
    Ok(())
}

#[test]
fn lists_registered_functions() -> anyhow::Result<()> {
    let output = vexl(&["functions", "--json"]);
    assert!(output.status.success(), "functions should succeed");
    let names: Vec<String> = serde_json::from_slice(&output.stdout)?;
    for name in ["abs", "concat", "pick", "rand", "vardim"] {
        assert!(names.iter().any(|known| known == name), "missing {name}");
    }
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    Ok(())
}
