use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vexl_compiler::extension::generic_prep;
use vexl_compiler::runtime::{RegisterBudget, VmError};
use vexl_compiler::{
    ArgHandle, CallCheck, CallSiteState, CompileOptions, Compiler, FunctionDeclaration,
    FunctionRegistry, SimpleFunction, SourceFile, Value, VarEnvBuilder, ValueType, VariableBlock,
};

/// Returns its argument and counts how often it ran.
struct Tick {
    declaration: FunctionDeclaration,
    calls: Arc<AtomicUsize>,
    thread_safe: bool,
}

impl SimpleFunction for Tick {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        generic_prep(call, wants_scalar, env, &self.declaration)
    }

    fn eval(&self, args: &mut ArgHandle<'_>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = args.in_scalar(0);
        args.set_out_scalar(value);
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
}

fn registry_with_tick(calls: &Arc<AtomicUsize>, thread_safe: bool) -> Arc<FunctionRegistry> {
    let mut registry = FunctionRegistry::with_builtins();
    registry
        .register_simple(
            "tick",
            Tick {
                declaration: FunctionDeclaration::new(vec![ValueType::scalar()], ValueType::scalar()),
                calls: Arc::clone(calls),
                thread_safe,
            },
        )
        .expect("register tick");
    Arc::new(registry)
}

fn eval(source: &str) -> anyhow::Result<Value> {
    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = compiler.compile(&SourceFile::inline(source))?;
    let block = compilation.program.new_variable_block();
    Ok(compilation.program.evaluate(&block)?)
}

#[test]
fn builtins_evaluate() -> anyhow::Result<()> {
    assert_eq!(eval("abs(-4)")?, Value::Number(4.0));
    assert_eq!(eval("clamp(5, 0, 1)")?, Value::Number(1.0));
    assert_eq!(eval("min(3, 1, 2)")?, Value::Number(1.0));
    assert_eq!(eval("max(3, 1, 2)")?, Value::Number(3.0));
    assert_eq!(eval("sum(1, 2, 3, 4)")?, Value::Number(10.0));
    assert_eq!(eval("length([3, 4, 0])")?, Value::Number(5.0));
    assert_eq!(eval("dot([1, 2, 3], [4, 5, 6])")?, Value::Number(32.0));
    assert_eq!(
        eval("mix([0, 0, 0], [2, 4, 8], 0.5)")?,
        Value::Vector(vec![1.0, 2.0, 4.0])
    );
    assert_eq!(eval("floor(2.7)")?, Value::Number(2.0));
    assert_eq!(eval("strlen(\"héllo\")")?, Value::Number(5.0));
    assert_eq!(
        eval("concat(\"a\", 'b', \"c\")")?,
        Value::String("abc".to_string())
    );
    let hash = eval("hash(\"vexl\")")?.as_number().expect("number");
    assert!((0.0..1.0).contains(&hash));
    Ok(())
}

#[test]
fn operators_broadcast_scalars_over_vectors() -> anyhow::Result<()> {
    assert_eq!(eval("[1, 2, 3] * 2")?, Value::Vector(vec![2.0, 4.0, 6.0]));
    assert_eq!(eval("-[1, 2] + 1")?, Value::Vector(vec![0.0, -1.0]));
    assert_eq!(eval("2 ^ 3 ^ 2")?, Value::Number(512.0));
    assert_eq!(eval("[1, 5] > 2")?, Value::Vector(vec![0.0, 1.0]));
    assert!(eval("[1, 2] + [1, 2, 3]").is_err());
    assert!(eval("\"a\" + 1").is_err());
    Ok(())
}

#[test]
fn locals_and_host_variables() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    compiler.declare_variable("P", ValueType::vector(3))?;
    compiler.declare_variable("scale", ValueType::scalar())?;
    let compilation = compiler.compile(&SourceFile::inline(
        "offset = [1, 1, 1];\nmoved = $P + offset;\nmoved * $scale",
    ))?;
    assert_eq!(compilation.result_type, ValueType::vector(3));

    let program = &compilation.program;
    let mut block = program.new_variable_block();
    block.set("P", Value::Vector(vec![1.0, 2.0, 3.0]))?;
    block.set("scale", Value::Number(2.0))?;
    assert_eq!(program.evaluate(&block)?, Value::Vector(vec![4.0, 6.0, 8.0]));

    block.set("scale", Value::Number(0.5))?;
    assert_eq!(program.evaluate(&block)?, Value::Vector(vec![1.0, 1.5, 2.0]));
    Ok(())
}

#[test]
fn unknown_names_fail_with_a_location() {
    let mut compiler = Compiler::new(CompileOptions::default());
    assert!(compiler.compile(&SourceFile::inline("1 + nope(2)")).is_err());
    let diagnostic = &compiler.diagnostics().entries()[0];
    assert!(diagnostic.message.contains("nope"), "{}", diagnostic.message);
    assert_eq!(diagnostic.span.map(|span| span.column), Some(5));

    assert!(compiler.compile(&SourceFile::inline("$missing * 2")).is_err());
    assert!(compiler.diagnostics().entries()[0]
        .message
        .contains("$missing"));
}

#[test]
fn pick_runs_only_the_chosen_branch() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut compiler =
        Compiler::with_registry(CompileOptions::default(), registry_with_tick(&calls, true));
    compiler.declare_variable("c", ValueType::scalar())?;
    let compilation = compiler.compile(&SourceFile::inline("pick($c, tick(10), tick(20))"))?;
    let program = &compilation.program;

    let mut block = program.new_variable_block();
    block.set("c", Value::Number(1.0))?;
    assert_eq!(program.evaluate(&block)?, Value::Number(10.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    block.set("c", Value::Number(0.0))?;
    assert_eq!(program.evaluate(&block)?, Value::Number(20.0));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn pick_promotes_scalars_and_handles_strings() -> anyhow::Result<()> {
    assert_eq!(
        eval("pick(0, 1, [4, 5, 6])")?,
        Value::Vector(vec![4.0, 5.0, 6.0])
    );
    assert_eq!(eval("pick(1, 1, [4, 5, 6])")?, Value::Vector(vec![1.0; 3]));
    assert_eq!(eval("pick(1, \"yes\", \"no\")")?, Value::String("yes".into()));
    assert!(eval("pick(1, \"yes\", 2)").is_err());
    assert!(eval("pick([1, 0], 1, 2)").is_err());
    Ok(())
}

#[test]
fn vardim_reports_variable_widths() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    compiler.declare_variable("P", ValueType::vector(3))?;
    compiler.declare_variable("name", ValueType::string())?;
    let compilation = compiler.compile(&SourceFile::inline(
        "v = [1, 2];\nvardim(\"$P\") * 100 + vardim(\"v\") * 10 + vardim(\"$name\")",
    ))?;
    let block = compilation.program.new_variable_block();
    assert_eq!(compilation.program.evaluate(&block)?, Value::Number(320.0));

    assert!(compiler.compile(&SourceFile::inline("vardim(\"nope\")")).is_err());
    assert!(compiler.compile(&SourceFile::inline("vardim(1)")).is_err());
    Ok(())
}

#[test]
fn every_call_site_ends_up_emitted() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = compiler.compile(&SourceFile::inline("x = abs(-1); max(x, floor(2.5))"))?;
    assert_eq!(compilation.call_sites.len(), 3);
    assert!(compilation
        .call_sites
        .values()
        .all(|state| matches!(state, CallSiteState::CodeEmitted(_))));
    Ok(())
}

#[test]
fn register_exhaustion_discards_the_whole_expression() -> anyhow::Result<()> {
    let options = CompileOptions {
        register_budget: RegisterBudget {
            numeric: 4,
            strings: 4,
        },
        ..CompileOptions::default()
    };
    let mut compiler = Compiler::new(options);
    let small = compiler.compile(&SourceFile::inline("abs(-1)"))?;
    assert!(small.program.numeric_register_count() <= 4);

    let error = compiler
        .compile(&SourceFile::inline("sum(1, 2, 3, 4, 5)"))
        .err()
        .expect("budget should be exhausted");
    assert_eq!(error.to_string(), "Code generation failed");
    let diagnostic = &compiler.diagnostics().entries()[0];
    assert!(
        diagnostic.message.contains("numeric register budget of 4 exhausted"),
        "{}",
        diagnostic.message
    );

    let mut unbounded = Compiler::new(CompileOptions::default());
    assert!(unbounded
        .compile(&SourceFile::inline("sum(1, 2, 3, 4, 5)"))
        .is_ok());
    Ok(())
}

#[test]
fn thread_safety_is_the_conjunction_of_all_calls() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let unsafe_registry = registry_with_tick(&calls, false);

    let mut compiler = Compiler::new(CompileOptions::default());
    for (source, thread_safe) in [
        ("1 + 2", true),
        ("abs(-1) + floor(2.5) + strlen(\"x\")", true),
        ("pick(1, 2, 3)", true),
        ("rand()", false),
        ("pick(1, 2, rand())", false),
        ("x = rand(); abs(1)", false),
    ] {
        let compilation = compiler.compile(&SourceFile::inline(source))?;
        assert_eq!(compilation.program.is_thread_safe(), thread_safe, "{source}");
    }

    let mut compiler = Compiler::with_registry(CompileOptions::default(), unsafe_registry);
    let compilation = compiler.compile(&SourceFile::inline("abs(tick(1))"))?;
    assert!(!compilation.program.is_thread_safe());
    Ok(())
}

#[test]
fn rand_is_never_folded() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = compiler.compile(&SourceFile::inline("rand()"))?;
    let program = &compilation.program;
    let block = program.new_variable_block();
    let first = program.evaluate(&block)?.as_number().expect("number");
    let second = program.evaluate(&block)?.as_number().expect("number");
    assert_ne!(first, second);
    assert!((0.0..1.0).contains(&first));
    assert!(program.statistics()["rand.draws"] >= 2.0);
    Ok(())
}

#[test]
fn batch_evaluation_preserves_input_order() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut compiler =
        Compiler::with_registry(CompileOptions::default(), registry_with_tick(&calls, true));
    compiler.declare_variable("x", ValueType::scalar())?;
    let compilation = compiler.compile(&SourceFile::inline("tick($x) * 2"))?;
    let program = &compilation.program;
    assert!(program.is_thread_safe());

    let blocks = (0..97)
        .map(|index| -> anyhow::Result<VariableBlock> {
            let mut block = program.new_variable_block();
            block.set("x", Value::Number(index as f64))?;
            Ok(block)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let results = program.evaluate_batch(&blocks, 4)?;
    let expected: Vec<Value> = (0..97).map(|index| Value::Number(index as f64 * 2.0)).collect();
    assert_eq!(results, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 97);
    assert_eq!(program.statistics()["calls.tick"], 97.0);

    assert_eq!(program.evaluate_batch(&blocks, 0), Err(VmError::NoThreads));
    Ok(())
}

#[test]
fn unsafe_programs_still_evaluate_batches() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut compiler =
        Compiler::with_registry(CompileOptions::default(), registry_with_tick(&calls, false));
    compiler.declare_variable("x", ValueType::scalar())?;
    let compilation = compiler.compile(&SourceFile::inline("tick($x) + 1"))?;
    let program = &compilation.program;
    assert!(!program.is_thread_safe());

    let blocks = (0..10)
        .map(|index| -> anyhow::Result<VariableBlock> {
            let mut block = program.new_variable_block();
            block.set("x", Value::Number(index as f64))?;
            Ok(block)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let results = program.evaluate_batch(&blocks, 8)?;
    assert_eq!(results[9], Value::Number(10.0));
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    Ok(())
}

#[test]
fn variable_blocks_must_match_the_program_layout() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    let plain = compiler.compile(&SourceFile::inline("1"))?;
    compiler.declare_variable("x", ValueType::scalar())?;
    let with_variable = compiler.compile(&SourceFile::inline("$x"))?;

    let block = with_variable.program.new_variable_block();
    assert_eq!(plain.program.evaluate(&block), Err(VmError::LayoutMismatch));
    Ok(())
}

#[test]
fn statistics_and_disassembly_describe_the_program() -> anyhow::Result<()> {
    let mut compiler = Compiler::new(CompileOptions::default());
    compiler.declare_variable("x", ValueType::scalar())?;
    let compilation = compiler.compile(&SourceFile::inline("abs($x) + abs(-2)"))?;
    let program = &compilation.program;
    let mut block = program.new_variable_block();
    block.set("x", Value::Number(-3.0))?;
    assert_eq!(program.evaluate(&block)?, Value::Number(5.0));
    assert_eq!(program.evaluate(&block)?, Value::Number(5.0));

    let statistics = program.statistics();
    assert_eq!(statistics["calls.abs"], 4.0);
    assert_eq!(
        statistics["instructions"],
        program.instructions().len() as f64
    );
    assert!(program.size_in_bytes() > 0);
    assert_eq!(program.extension_names().collect::<Vec<_>>(), vec!["abs"]);

    let listing = program.disassemble();
    assert!(listing.contains("CALL f0"), "{listing}");
    assert!(listing.contains("f0 = abs"), "{listing}");
    assert!(listing.contains("LOAD_VAR"), "{listing}");
    Ok(())
}
