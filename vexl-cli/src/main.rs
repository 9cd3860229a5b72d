use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::debug;
use serde_json::json;
use vexl_compiler::{
    global_registry, CompileOptions, Compilation, Compiler, Diagnostic, DiagnosticLevel,
    SourceFile, SourceId, Value, ValueType, VariableBlock,
};

#[derive(Parser)]
#[command(
    name = "vexl",
    version,
    about = "Compile and evaluate vexl expressions.",
    long_about = "Compile a vexl expression once and evaluate it against one or many sets of variable values."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate an expression given inline or read from a file.
    Eval(EvalArgs),
    /// List the functions expressions may call.
    Functions {
        /// Print the names as a JSON array.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// Expression source text.
    #[arg(value_name = "EXPR", required_unless_present = "file", conflicts_with = "file")]
    expression: Option<String>,

    /// Read the expression from a file instead.
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Host variable available as `$NAME`. VALUE is a number, a JSON array of
    /// numbers, or any other text as a string.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// JSON file holding an array of objects, one evaluation per object.
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,

    /// Worker threads for batch evaluation (defaults to available parallelism).
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Ask for a scalar result.
    #[arg(long)]
    scalar: bool,

    /// Dump the token stream produced by the lexer.
    #[arg(long)]
    dump_tokens: bool,

    /// Print the compiled instructions before evaluating.
    #[arg(long)]
    dump_bytecode: bool,

    /// Print program statistics after evaluating.
    #[arg(long)]
    stats: bool,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Eval(args) => run_eval(args),
        Command::Functions { json } => list_functions(json),
    }
}

fn list_functions(as_json: bool) -> Result<()> {
    let registry = global_registry();
    let names = registry.names();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    let source = match (&args.expression, &args.file) {
        (_, Some(path)) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            SourceFile::new(SourceId(0), path.clone(), contents)
        }
        (Some(expression), None) => SourceFile::inline(expression.as_str()),
        (None, None) => bail!("an expression or --file is required"),
    };

    let base = args
        .vars
        .iter()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<BTreeMap<_, _>>>()?;
    let rows = match &args.batch {
        Some(path) => Some(read_batch(path)?),
        None => None,
    };

    let mut compiler = Compiler::new(CompileOptions {
        dump_tokens: args.dump_tokens,
        wants_scalar: args.scalar,
        ..CompileOptions::default()
    });
    for (name, ty) in infer_variable_types(&base, rows.as_deref().unwrap_or_default())? {
        compiler
            .declare_variable(name.as_str(), ty)
            .with_context(|| format!("Failed to declare ${name}"))?;
    }

    let compilation = match compiler.compile(&source) {
        Ok(compilation) => compilation,
        Err(err) => {
            if !compiler.diagnostics().is_empty() {
                eprintln!("Diagnostics:");
                let lines: Vec<&str> = source.contents.lines().collect();
                for diagnostic in compiler.diagnostics().entries() {
                    print_diagnostic(&source, &lines, diagnostic);
                }
            }
            return Err(err.context("Compilation failed"));
        }
    };
    let program = &compilation.program;

    if args.dump_bytecode {
        println!("{}", program.disassemble());
    }

    let results = match &rows {
        Some(rows) => {
            let blocks = rows
                .iter()
                .enumerate()
                .map(|(index, row)| {
                    build_block(&compilation, &base, row)
                        .with_context(|| format!("Invalid batch entry {index}"))
                })
                .collect::<Result<Vec<_>>>()?;
            let threads = match args.threads {
                Some(threads) => threads,
                None => thread::available_parallelism().map_or(1, |count| count.get()),
            };
            debug!("evaluating {} batch entries", blocks.len());
            program.evaluate_batch(&blocks, threads)?
        }
        None => {
            let block = build_block(&compilation, &base, &BTreeMap::new())?;
            vec![program.evaluate(&block)?]
        }
    };

    if args.json {
        let mut output = json!({
            "type": compilation.result_type.to_string(),
        });
        if rows.is_some() {
            output["results"] = json!(results);
        } else if let Some(result) = results.first() {
            output["result"] = json!(result);
        }
        if args.stats {
            output["statistics"] = json!(program.statistics());
            output["size_in_bytes"] = json!(program.size_in_bytes());
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for result in &results {
        println!("{result}");
    }
    if args.stats {
        for (name, value) in program.statistics() {
            println!("{name}: {value}");
        }
        println!("size_in_bytes: {}", program.size_in_bytes());
    }
    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, found '{raw}'"))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        bail!("variable name missing in '{raw}'");
    }
    Ok((name.to_string(), parse_value(value)))
}

/// Numbers and JSON arrays parse as numeric values, a JSON string as its
/// contents, and anything else as the raw text.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn read_batch(path: &Path) -> Result<Vec<BTreeMap<String, Value>>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array of objects", path.display()))
}

/// Declared type of every variable mentioned by `--var` or the batch file.
fn infer_variable_types(
    base: &BTreeMap<String, Value>,
    rows: &[BTreeMap<String, Value>],
) -> Result<BTreeMap<String, ValueType>> {
    let mut types: BTreeMap<String, ValueType> = BTreeMap::new();
    let values = base.iter().chain(rows.iter().flat_map(|row| row.iter()));
    for (name, value) in values {
        let ty = value.value_type();
        if !ty.is_valid() {
            bail!("${name} has no usable type");
        }
        match types.get(name) {
            Some(existing) if *existing != ty => {
                bail!("${name} is used both as {existing} and as {ty}")
            }
            Some(_) => {}
            None => {
                types.insert(name.clone(), ty);
            }
        }
    }
    Ok(types)
}

fn build_block(
    compilation: &Compilation,
    base: &BTreeMap<String, Value>,
    row: &BTreeMap<String, Value>,
) -> Result<VariableBlock> {
    let mut block = compilation.program.new_variable_block();
    for (name, value) in base.iter().chain(row.iter()) {
        block.set(name, value.clone())?;
    }
    Ok(block)
}

fn print_diagnostic(source: &SourceFile, lines: &[&str], diagnostic: &Diagnostic) {
    let label = match diagnostic.level {
        DiagnosticLevel::Error => "error",
        DiagnosticLevel::Warning => "warning",
    };
    eprintln!("  - {label}: {}", diagnostic.message);
    let Some(span) = diagnostic.span else {
        return;
    };
    eprintln!(
        "     --> {}:{}:{}",
        source.display_name(),
        span.line,
        span.column
    );
    let Some(raw_line) = lines.get(span.line.saturating_sub(1)) else {
        return;
    };
    eprintln!("      {raw_line}");
    let indent: String = raw_line
        .chars()
        .take(span.column.saturating_sub(1))
        .map(|ch| if ch == '\t' { '\t' } else { ' ' })
        .collect();
    let width = if span.end_line == span.line {
        span.end_column.saturating_sub(span.column) + 1
    } else {
        1
    };
    eprintln!("      {indent}{}", "^".repeat(width.max(1)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_as_numbers_vectors_or_strings() {
        assert_eq!(parse_value("2.5"), Value::Number(2.5));
        assert_eq!(parse_value("[1, 2, 3]"), Value::Vector(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_value("hello"), Value::String("hello".into()));
        assert_eq!(parse_value("\"quoted\""), Value::String("quoted".into()));
    }

    #[test]
    fn assignments_accept_a_leading_dollar() -> Result<()> {
        let (name, value) = parse_assignment("$P=[0,1,0]")?;
        assert_eq!(name, "P");
        assert_eq!(value, Value::Vector(vec![0.0, 1.0, 0.0]));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=3").is_err());
        Ok(())
    }

    #[test]
    fn conflicting_types_are_rejected() {
        let base = BTreeMap::from([("x".to_string(), Value::Number(1.0))]);
        let rows = vec![BTreeMap::from([(
            "x".to_string(),
            Value::String("one".into()),
        )])];
        assert!(infer_variable_types(&base, &rows).is_err());
        let types = infer_variable_types(&base, &[]).expect("types");
        assert_eq!(types.get("x"), Some(&ValueType::scalar()));
    }
}
