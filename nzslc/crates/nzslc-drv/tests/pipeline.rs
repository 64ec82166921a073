//! End-to-end pipeline scenarios: lex -> parse -> canonical pass
//! pipeline, checked against the IR each scenario must produce.

use nzslc_drv::{compile_source, BackendParameters};
use nzslc_par::ast::*;
use nzslc_res::FilesystemModuleResolver;
use nzslc_sem::module_resolver::ModuleResolver;
use nzslc_ser::{
    deserialize_archive, serialize_archive, serialize_module, Archive, ArchiveEntryFlags,
    ArchiveEntryKind, Deserializer, Serializer,
};
use std::sync::Arc;

fn compile(source: &str) -> (Module, nzslc_sem::TransformerContext) {
    compile_source(source, Some("test.nzsl"), &BackendParameters::default())
        .expect("compilation failed")
}

fn entry_function<'m>(module: &'m Module) -> &'m DeclareFunctionStatement {
    module
        .root
        .statements
        .iter()
        .find_map(|stmt| match stmt {
            Statement::DeclareFunction(func) if func.entry_stage.has_value() => Some(func),
            _ => None,
        })
        .expect("entry function")
}

#[test]
fn scalar_swizzle_lowering() {
    let (module, _) = compile(
        r#"[nzsl_version("1.0")]
module;

[entry(frag)]
fn main()
{
    let value = 42.0;
    let vec = value.xxx;
}
"#,
    );

    let main = entry_function(&module);
    let Statement::DeclareVariable(vec_var) = &main.statements[1] else {
        panic!("expected variable declaration");
    };
    assert_eq!(vec_var.ty.as_value().unwrap().to_string(), "vec3[f32]");

    // IR contains CastExpression(target=vec3[f32], expressions=[value,
    // value, value])
    let Some(Expression::Cast(cast)) = vec_var.initial_expression.as_deref() else {
        panic!(
            "expected cast, got {:?}",
            vec_var.initial_expression.as_deref()
        );
    };
    assert_eq!(
        cast.target_type.as_value(),
        Some(&ExpressionType::vector(3, PrimitiveType::Float32))
    );
    assert_eq!(cast.expressions.len(), 3);
    let Statement::DeclareVariable(value_var) = &main.statements[0] else {
        panic!("expected value declaration");
    };
    let value_index = value_var.var_index.unwrap();
    for component in &cast.expressions {
        let Expression::IdentifierValue(reference) = component else {
            panic!("expected variable reference, got {component:?}");
        };
        assert_eq!(reference.kind, IdentifierKind::Variable);
        assert_eq!(reference.index, value_index);
    }
}

#[test]
fn constant_folding() {
    let (module, _) = compile(
        r#"[nzsl_version("1.0")]
module;

[entry(frag)]
fn main()
{
    let output = 8.0 * (7.0 + 5.0) * 2.0 / 4.0 - 6.0 % 7.0;
}
"#,
    );

    let main = entry_function(&module);
    let Statement::DeclareVariable(output) = &main.statements[0] else {
        panic!("expected variable declaration");
    };
    assert_eq!(output.ty.as_value(), Some(&ExpressionType::f32()));
    let Some(Expression::ConstantValue(constant)) = output.initial_expression.as_deref() else {
        panic!(
            "expected folded constant, got {:?}",
            output.initial_expression.as_deref()
        );
    };
    assert_eq!(constant.value, ConstantValue::f32(42.0));
}

#[test]
fn auto_binding_assignment() {
    let (module, _) = compile(
        r#"[nzsl_version("1.0")]
module;

struct A { v: f32 }
struct B { v: f32 }
struct C { v: f32 }

[auto_binding]
external
{
    a: uniform[A],
    [binding(0)] b: uniform[B],
    c: uniform[C]
}

[entry(frag)]
fn main()
{
    let total = a.v + b.v + c.v;
}
"#,
    );

    let Some(Statement::DeclareExternal(external)) = module
        .root
        .statements
        .iter()
        .find(|stmt| matches!(stmt, Statement::DeclareExternal(_)))
    else {
        panic!("expected external block");
    };

    let bindings: Vec<(String, u32, u32)> = external
        .external_vars
        .iter()
        .map(|var| {
            (
                var.name.clone(),
                *var.binding_set.as_value().unwrap(),
                *var.binding_index.as_value().unwrap(),
            )
        })
        .collect();

    assert_eq!(
        bindings,
        vec![
            (String::from("a"), 0, 1),
            (String::from("b"), 0, 0),
            (String::from("c"), 0, 2),
        ]
    );
}

#[test]
fn const_if_keeps_taken_branch() {
    let source = r#"[nzsl_version("1.0")]
module;

option UseInt: bool = false;

[entry(frag)]
fn main()
{
    let data_value = 7;
    let value = 0.0;
    const if (UseInt)
    {
        value = f32(data_value);
    }
    else
    {
        value = 1.0;
    }
}
"#;

    let mut parameters = BackendParameters::default();
    parameters
        .option_values
        .insert(hash_option("UseInt"), ConstantValue::bool(true));
    let (module, _) =
        compile_source(source, None, &parameters).expect("compilation failed");

    let main = entry_function(&module);
    // the branch statement was replaced by the taken branch's body; the
    // surrounding function scope is preserved
    assert!(!main
        .statements
        .iter()
        .any(|stmt| matches!(stmt, Statement::Branch(_))));

    fn find_cast_assign(stmt: &Statement) -> bool {
        match stmt {
            Statement::Expression(expression) => match &expression.expression {
                Expression::Assign(assign) => {
                    matches!(assign.right.as_ref(), Expression::Cast(_))
                }
                _ => false,
            },
            Statement::Multi(multi) => multi.statements.iter().any(find_cast_assign),
            Statement::Scoped(scoped) => find_cast_assign(&scoped.statement),
            _ => false,
        }
    }
    assert!(
        main.statements.iter().any(find_cast_assign),
        "the f32(data_value) branch must remain: {:?}",
        main.statements
    );
}

#[test]
fn loop_unrolling() {
    let (module, ctx) = compile(
        r#"[nzsl_version("1.0")]
module;

[entry(frag)]
fn main()
{
    let counter = 0;
    [unroll] for i in 0 -> 3
    {
        counter += i;
    }
}
"#,
    );

    let main = entry_function(&module);

    // three iteration constants with values 0, 1, 2
    let mut iteration_values = Vec::new();
    fn collect_consts(
        stmt: &Statement,
        ctx: &nzslc_sem::TransformerContext,
        out: &mut Vec<ConstantValue>,
    ) {
        match stmt {
            Statement::DeclareConst(decl) if decl.name == "i" => {
                let index = decl.const_index.expect("const index");
                out.push(
                    ctx.constants
                        .try_retrieve(index)
                        .and_then(|data| data.value.clone())
                        .expect("iteration value"),
                );
            }
            Statement::Multi(multi) => {
                for inner in &multi.statements {
                    collect_consts(inner, ctx, out);
                }
            }
            Statement::Scoped(scoped) => collect_consts(&scoped.statement, ctx, out),
            _ => {}
        }
    }
    for stmt in &main.statements {
        collect_consts(stmt, &ctx, &mut iteration_values);
    }
    assert_eq!(
        iteration_values,
        vec![
            ConstantValue::i32(0),
            ConstantValue::i32(1),
            ConstantValue::i32(2),
        ]
    );

    // no loop remains
    fn has_loop(stmt: &Statement) -> bool {
        match stmt {
            Statement::For(_) | Statement::ForEach(_) | Statement::While(_) => true,
            Statement::Multi(multi) => multi.statements.iter().any(has_loop),
            Statement::Scoped(scoped) => has_loop(&scoped.statement),
            _ => false,
        }
    }
    assert!(!main.statements.iter().any(has_loop));
}

#[test]
fn archive_round_trip_through_resolver() {
    let module_names = [
        "Engine.InstanceData",
        "Engine.LightData",
        "Engine.SkeletalData",
        "Engine.SkinningLinear",
        "Engine.ViewerData",
    ];

    let mut archive = Archive::new();
    for name in module_names {
        let source = format!(
            "[nzsl_version(\"1.0\")]\nmodule {name};\n[export]\nconst Marker: i32 = 1;\n"
        );
        let module = nzslc_par::parse(&source).expect("parse");
        archive
            .add_module(
                name,
                ArchiveEntryKind::BinaryShaderModule,
                &serialize_module(&module),
                ArchiveEntryFlags::COMPRESSED_LZ4,
            )
            .expect("add module");
    }

    // write and re-read the container
    let mut serializer = Serializer::new();
    serialize_archive(&mut serializer, &archive);
    let bytes = serializer.into_data();
    let restored = deserialize_archive(&mut Deserializer::new(&bytes)).expect("read archive");
    assert_eq!(restored.modules().len(), 5);

    let resolver = FilesystemModuleResolver::new();
    resolver.register_archive(&restored).expect("register");

    for name in module_names {
        let resolved = resolver.resolve(name).expect("module resolves");
        assert_eq!(resolved.name(), name);
    }
    assert!(resolver.resolve("missing").is_none());
}

#[test]
fn import_through_resolver() {
    let resolver = Arc::new(FilesystemModuleResolver::new());
    resolver.register_module(
        "Engine.Utils",
        nzslc_par::parse(
            "[nzsl_version(\"1.0\")]\nmodule Engine.Utils;\n[export]\nfn double(v: f32) -> f32 { return v * 2.0; }\n",
        )
        .expect("parse imported module"),
    );

    let source = r#"[nzsl_version("1.0")]
module;

import double from Engine.Utils;

[entry(frag)]
fn main()
{
    let value = double(21.0);
}
"#;

    let mut parameters = BackendParameters::default();
    let resolver: Arc<dyn ModuleResolver> = resolver;
    parameters.module_resolver = Some(resolver);
    let (module, _) = compile_source(source, None, &parameters).expect("compilation failed");

    // the imported module was attached and typed
    assert_eq!(module.imported_modules.len(), 1);
    assert_eq!(module.imported_modules[0].identifier, "Engine.Utils");

    // import statements are gone after the pipeline
    assert!(!module
        .root
        .statements
        .iter()
        .any(|stmt| matches!(stmt, Statement::Import(_))));

    let main = entry_function(&module);
    let Statement::DeclareVariable(value) = &main.statements[0] else {
        panic!("expected variable");
    };
    let Some(Expression::CallFunction(call)) = value.initial_expression.as_deref() else {
        panic!("expected call, got {:?}", value.initial_expression.as_deref());
    };
    let Expression::IdentifierValue(target) = call.target.as_ref() else {
        panic!("expected resolved target");
    };
    // the alias to the imported function was expanded away
    assert_eq!(target.kind, IdentifierKind::Function);
}

#[test]
fn missing_module_fails() {
    let source = r#"[nzsl_version("1.0")]
module;

import anything from Engine.Nope;
"#;
    let err = compile_source(source, None, &BackendParameters::default()).unwrap_err();
    assert!(err.to_string().contains("Engine.Nope was not found"));
}

#[test]
fn compound_assignment_is_lowered() {
    let (module, _) = compile(
        r#"[nzsl_version("1.0")]
module;

[entry(frag)]
fn main()
{
    let counter = 0;
    counter += 1;
}
"#,
    );

    let main = entry_function(&module);
    let Statement::Expression(stmt) = &main.statements[1] else {
        panic!("expected expression statement");
    };
    let Expression::Assign(assign) = &stmt.expression else {
        panic!("expected assignment");
    };
    assert_eq!(assign.op, AssignType::Simple);
    assert!(matches!(assign.right.as_ref(), Expression::Binary(_)));
}

#[test]
fn no_untyped_literal_survives() {
    let (module, _) = compile(
        r#"[nzsl_version("1.0")]
module;

[entry(frag)]
fn main()
{
    let a = 1;
    let b = 2.5;
    let c = a + 3;
}
"#,
    );

    fn check_expression(expr: &Expression) {
        assert!(
            !expr
                .cached_type()
                .expect("expression must be typed")
                .contains_literal(),
            "untyped literal leaked: {expr:?}"
        );
    }
    let main = entry_function(&module);
    for stmt in &main.statements {
        if let Statement::DeclareVariable(decl) = stmt {
            assert!(!decl.ty.as_value().unwrap().contains_literal());
            if let Some(init) = &decl.initial_expression {
                check_expression(init);
            }
        }
    }
}
