//! End-to-end pipeline scenarios: literal programs through tokenizing,
//! parsing, escape analysis, semantic analysis, and IR translation.

use pretty_assertions::assert_eq;

use sablec::{
    analyze_source, compile_source,
    diagnostics::Error,
    frontend::SourceFile,
    ir::{
        tree::{Exp, Stm},
        Fragment,
    },
    semantic::types::Type,
    translate::{frame::Access, mips32::Mips32Dialect, x64::X64Dialect},
};

fn compile(source: &str) -> Result<Vec<Fragment>, Error> {
    compile_source(&SourceFile::from_string(source), &X64Dialect)
}

fn program_type(source: &str) -> Type {
    let source = SourceFile::from_string(source);
    let (_, analysis) = analyze_source(&source).expect("expected a well-typed program");

    analysis.program_type
}

fn semantic_error(source: &str) -> String {
    match compile(source) {
        Err(Error::Semantic(error)) => error.message,
        Err(other) => panic!("expected a semantic error, got: {other}"),
        Ok(_) => panic!("expected an error for: {source}"),
    }
}

fn proc_labels(fragments: &[Fragment]) -> Vec<String> {
    fragments
        .iter()
        .filter_map(|fragment| match fragment {
            Fragment::Proc { frame, .. } => Some(frame.borrow().name().to_string()),
            Fragment::String { .. } => None,
        })
        .collect()
}

#[test]
fn constant_program() {
    let fragments = compile("42").expect("accepted");

    assert_eq!(fragments.len(), 1);
    assert_eq!(proc_labels(&fragments), vec!["_main"]);
    assert!(matches!(program_type("42"), Type::Int));
}

#[test]
fn local_variable_stays_in_a_register() {
    let source = SourceFile::from_string("let var x := 5 in x end");
    let (program, analysis) = analyze_source(&source).expect("accepted");
    assert!(matches!(analysis.program_type, Type::Int));

    // The only declaration is x, and it does not escape
    let sablec::frontend::ast::ExprKind::Let { decls, .. } = &program.kind else {
        panic!("expected let");
    };
    let sablec::frontend::ast::DeclKind::Var(x) = &decls[0].kind else {
        panic!("expected var");
    };
    assert!(!x.escape.get());

    let fragments = compile("let var x := 5 in x end").expect("accepted");
    assert_eq!(fragments.len(), 1);
}

#[test]
fn captured_variable_escapes_and_adds_a_fragment() {
    let source = SourceFile::from_string("let var x := 5 function f():int = x in f() end");
    let (program, analysis) = analyze_source(&source).expect("accepted");
    assert!(matches!(analysis.program_type, Type::Int));

    let sablec::frontend::ast::ExprKind::Let { decls, .. } = &program.kind else {
        panic!("expected let");
    };
    let sablec::frontend::ast::DeclKind::Var(x) = &decls[0].kind else {
        panic!("expected var");
    };
    assert!(x.escape.get());

    let fragments =
        compile("let var x := 5 function f():int = x in f() end").expect("accepted");
    assert_eq!(proc_labels(&fragments), vec!["f", "_main"]);

    // f's first formal is the static link, and it is a frame slot
    let Fragment::Proc { frame, .. } = &fragments[0] else {
        panic!("expected f's proc fragment");
    };
    let frame = frame.borrow();
    assert!(matches!(frame.formals()[0], Access::InFrame(_)));
}

#[test]
fn captured_variable_body_shape() {
    // f's body is Move(Temp rv, Mem(static-link chain + offset of x)), up to
    // Seq associativity and temp renaming
    let fragments =
        compile("let var x := 5 function f():int = x in f() end").expect("accepted");

    let Fragment::Proc { body, .. } = &fragments[0] else {
        panic!("expected f's proc fragment");
    };

    let Stm::Move(destination, source) = body else {
        panic!("expected a move, got {body:?}");
    };
    assert!(matches!(**destination, Exp::Temp(_)));

    // Source is a load whose address goes through the static link
    let Exp::Mem(address) = &**source else {
        panic!("expected a memory load, got {source:?}");
    };
    let Exp::BinOp(_, base, offset) = &**address else {
        panic!("expected base + offset, got {address:?}");
    };
    assert!(matches!(**base, Exp::Mem(_)));
    assert!(matches!(**offset, Exp::Const(_)));
}

#[test]
fn alias_cycle_is_rejected_with_both_names() {
    let message = semantic_error("let type a = b type b = a in 0 end");

    assert!(message.contains("cycle"), "message: {message}");
    assert!(message.contains("`a`"), "message: {message}");
    assert!(message.contains("`b`"), "message: {message}");
}

#[test]
fn mutually_recursive_records_resolve() {
    let source = SourceFile::from_string(
        "let type tree = {key: int, children: treelist} \
             type treelist = {head: tree, tail: treelist} \
             var t := tree{key=0, children=nil} \
         in t end",
    );
    let (_, analysis) = analyze_source(&source).expect("accepted");

    let Type::Record(tree) = analysis.program_type.actual() else {
        panic!("expected a record type");
    };

    // treelist's actual is a record whose head field's actual is tree itself
    let Type::Record(treelist) = tree.fields[1].ty.actual() else {
        panic!("expected treelist to resolve to a record");
    };
    let Type::Record(head) = treelist.fields[0].ty.actual() else {
        panic!("expected head to resolve to a record");
    };
    assert_eq!(head.id, tree.id);
}

#[test]
fn assignment_to_loop_index_is_rejected() {
    let message = semantic_error("for i := 1 to 10 do i := 5");
    assert!(message.contains("loop variable"), "message: {message}");
}

#[test]
fn mismatched_if_branches_are_rejected() {
    semantic_error("if 1 then \"a\" else 2");
}

#[test]
fn break_inside_a_loop_is_accepted() {
    assert!(matches!(program_type("while 1 do break"), Type::Unit));
    compile("while 1 do break").expect("accepted");
}

#[test]
fn break_outside_a_loop_is_rejected() {
    semantic_error("break");
}

#[test]
fn wrong_argument_type_is_rejected() {
    let message = semantic_error("let function f(x:int):int = x + 1 in f(\"s\") end");
    assert!(message.contains("argument"), "message: {message}");
}

#[test]
fn nominally_identical_arrays_are_distinct() {
    semantic_error(
        "let type a = array of int \
             type b = array of int \
             var x := a[4] of 0 \
             var y : b := x \
         in 0 end",
    );
}

#[test]
fn alias_of_int_is_int() {
    assert!(matches!(
        program_type("let type a = int var x : a := 1 in x + 1 end"),
        Type::Int
    ));
}

#[test]
fn string_fragments_in_first_encounter_order() {
    let fragments = compile("(print(\"alpha\"); print(\"beta\"); print(\"alpha\"))")
        .expect("accepted");

    let strings: Vec<&str> = fragments
        .iter()
        .filter_map(|fragment| match fragment {
            Fragment::String { value, .. } => Some(value.as_str()),
            Fragment::Proc { .. } => None,
        })
        .collect();

    assert_eq!(strings, vec!["alpha", "beta", "alpha"]);
}

#[test]
fn program_body_fragment_is_last() {
    let fragments = compile(
        "let function f() = print(\"in f\") \
             function g() = f() \
         in g() end",
    )
    .expect("accepted");

    assert_eq!(proc_labels(&fragments), vec!["f", "g", "_main"]);
    assert!(matches!(
        fragments.last(),
        Some(Fragment::Proc { .. })
    ));
}

#[test]
fn mips32_dialect_translates_too() {
    let fragments = compile_source(
        &SourceFile::from_string("let var x := 5 function f():int = x in f() end"),
        &Mips32Dialect,
    )
    .expect("accepted");

    let Fragment::Proc { frame, .. } = &fragments[0] else {
        panic!("expected f's fragment");
    };
    let frame = frame.borrow();
    assert_eq!(frame.word_size(), 4);
    // The static link escapes into the first local slot
    assert_eq!(frame.formals()[0], Access::InFrame(-4));
}

#[test]
fn larger_program_compiles() {
    let source = r#"
        /* a tiny list library plus a driver /* with a nested comment */ */
        let
            type intlist = {head: int, tail: intlist}

            function range(lo: int, hi: int): intlist =
                if lo > hi then nil
                else intlist{head = lo, tail = range(lo + 1, hi)}

            function sum(l: intlist): int =
                if l = nil then 0 else l.head + sum(l.tail)

            var total := 0
        in
            total := sum(range(1, 10));
            printi(total);
            print("\n")
        end
    "#;

    let fragments = compile(source).expect("accepted");
    assert_eq!(proc_labels(&fragments), vec!["range", "sum", "_main"]);
}

#[test]
fn lexical_and_syntax_errors_are_positioned() {
    let source = SourceFile::from_string("let var x := 5 in\n  x ! 1\nend");
    let error = compile_source(&source, &X64Dialect).expect_err("expected an error");

    match error {
        Error::Lexical(error) => {
            assert_eq!(error.line, 2);
        }
        other => panic!("expected a lexical error, got {other}"),
    }

    let source = SourceFile::from_string("if 1 then");
    let error = compile_source(&source, &X64Dialect).expect_err("expected an error");
    assert!(matches!(error, Error::Syntax(_)));
}
