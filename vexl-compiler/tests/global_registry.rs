//! The process-wide registry can be installed once. Kept in its own test
//! binary so no other test touches the global first.

use vexl_compiler::{
    global_registry, init_global_registry, CompileOptions, Compiler, FunctionDeclaration,
    RegistryError, SourceFile, Value, ValueType,
};

#[test]
fn global_registry_is_installed_once_and_then_frozen() -> anyhow::Result<()> {
    let installed = init_global_registry(|registry| {
        registry.register_closure(
            "half",
            FunctionDeclaration::new(vec![ValueType::scalar()], ValueType::scalar()),
            |args| {
                let value = args.in_scalar(0) / 2.0;
                args.set_out_scalar(value);
            },
        )
    })?;
    assert!(installed.contains("half"));
    assert!(installed.contains("abs"), "builtins are always present");

    let second = init_global_registry(|_| Ok(()));
    assert_eq!(second.err(), Some(RegistryError::AlreadyInitialized));

    let shared = global_registry();
    assert!(shared.contains("half"));
    assert_eq!(shared.len(), installed.len());

    let mut compiler = Compiler::new(CompileOptions::default());
    let compilation = compiler.compile(&SourceFile::inline("half(5)"))?;
    let block = compilation.program.new_variable_block();
    assert_eq!(compilation.program.evaluate(&block)?, Value::Number(2.5));
    Ok(())
}
