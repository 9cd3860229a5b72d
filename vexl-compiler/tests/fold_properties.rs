//! Property tests: a call whose arguments are all literals must produce the
//! same value as the same call fed through host variables.

use proptest::prelude::*;

use vexl_compiler::{CompileOptions, Compiler, SourceFile, Value, ValueType};

fn literal() -> impl Strategy<Value = String> {
    (-1000.0f64..1000.0).prop_map(|value| format!("{value:.4}"))
}

fn parse(literal: &str) -> f64 {
    literal.parse().expect("formatted literal parses")
}

/// Compiles `name(literals...)`, evaluates it twice and checks the two runs agree.
fn constant_call(name: &str, literals: &[String]) -> Value {
    let source = format!("{name}({})", literals.join(", "));
    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = compiler
        .compile(&SourceFile::inline(source.as_str()))
        .expect("constant call compiles");
    let block = compilation.program.new_variable_block();
    let first = compilation.program.evaluate(&block).expect("first run");
    let second = compilation.program.evaluate(&block).expect("second run");
    assert_eq!(first, second, "{source} changed between runs");
    first
}

fn live_call(name: &str, values: &[Value]) -> Value {
    let mut compiler = Compiler::new(CompileOptions::default());
    let mut params = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let var = format!("a{index}");
        compiler
            .declare_variable(var.as_str(), value.value_type())
            .expect("declare");
        params.push(format!("${var}"));
    }
    let source = format!("{name}({})", params.join(", "));
    let compilation = compiler
        .compile(&SourceFile::inline(source.as_str()))
        .expect("live call compiles");
    let mut block = compilation.program.new_variable_block();
    for (index, value) in values.iter().enumerate() {
        block
            .set(&format!("a{index}"), value.clone())
            .expect("set variable");
    }
    compilation.program.evaluate(&block).expect("live run")
}

fn numbers(literals: &[String]) -> Vec<Value> {
    literals
        .iter()
        .map(|literal| Value::Number(parse(literal)))
        .collect()
}

proptest! {
    #[test]
    fn variadic_numeric_calls_fold_to_their_live_result(
        name in prop::sample::select(vec!["min", "max", "sum"]),
        literals in prop::collection::vec(literal(), 1..6),
    ) {
        let folded = constant_call(name, &literals);
        let live = live_call(name, &numbers(&literals));
        prop_assert_eq!(folded, live);
    }

    #[test]
    fn fixed_arity_calls_fold_to_their_live_result(
        value in literal(),
        low in literal(),
        high in literal(),
    ) {
        let args = vec![value.clone(), low, high];
        prop_assert_eq!(constant_call("clamp", &args), live_call("clamp", &numbers(&args)));

        let single = vec![value];
        prop_assert_eq!(constant_call("abs", &single), live_call("abs", &numbers(&single)));
        prop_assert_eq!(constant_call("floor", &single), live_call("floor", &numbers(&single)));
    }

    #[test]
    fn concat_folds_to_its_live_result(
        parts in prop::collection::vec("[a-z]{0,8}", 1..5),
    ) {
        let literals: Vec<String> = parts.iter().map(|part| format!("\"{part}\"")).collect();
        let values: Vec<Value> = parts.iter().cloned().map(Value::String).collect();
        let folded = constant_call("concat", &literals);
        prop_assert_eq!(&folded, &Value::String(parts.concat()));
        prop_assert_eq!(folded, live_call("concat", &values));
    }

    #[test]
    fn vector_calls_fold_to_their_live_result(
        lanes in prop::collection::vec(literal(), 3),
    ) {
        let vector = format!("[{}]", lanes.join(", "));
        let value = Value::Vector(lanes.iter().map(|lane| parse(lane)).collect());
        prop_assert_eq!(value.value_type(), ValueType::vector(3));

        let folded = constant_call("length", &[vector.clone()]);
        prop_assert_eq!(folded, live_call("length", &[value.clone()]));

        let folded = constant_call("dot", &[vector.clone(), vector]);
        prop_assert_eq!(folded, live_call("dot", &[value.clone(), value]));
    }
}
