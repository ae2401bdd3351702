//! Parser tests: instructions, blocks, expressions, error handling

use oto::ast::*;
use oto::lexer::Lexer;
use oto::parser::Parser;

fn parse(source: &str) -> Program {
    let tokens = Lexer::new(source, "test.oto").tokenize().unwrap();
    Parser::new(tokens, "test.oto").parse().unwrap()
}

fn parse_err(source: &str) -> String {
    let tokens = Lexer::new(source, "test.oto").tokenize().unwrap();
    Parser::new(tokens, "test.oto").parse().unwrap_err().message
}

fn instruction(program: &Program, index: usize) -> &Instruction {
    match &program.statements[index] {
        Statement::Instruction(instr) => instr,
        other => panic!("expected instruction, got {:?}", other),
    }
}

fn block(program: &Program, index: usize) -> &Block {
    match &program.statements[index] {
        Statement::Block(block) => block,
        other => panic!("expected block, got {:?}", other),
    }
}

/// Parse a single expression through an instruction argument.
fn expr(source: &str) -> Expr {
    let program = parse(&format!("@core/set value={{{}}}", source));
    instruction(&program, 0).argument("value").unwrap().clone()
}

// ── Instructions ────────────────────────────────────────────

#[test]
fn simple_instruction() {
    let program = parse("@core/set value=1 output=counter\n");
    let instr = instruction(&program, 0);
    assert_eq!(instr.action, ActionId::new("core", "set"));
    assert_eq!(instr.args.len(), 1);
    assert_eq!(instr.argument("value"), Some(&Expr::number(1.0)));
    assert_eq!(instr.output.as_deref(), Some("counter"));
    assert_eq!(instr.loc.line, 1);
}

#[test]
fn reserved_attributes_are_not_arguments() {
    let program = parse("@flow/goto target=\"loop\" if={n < 3} label=back");
    let instr = instruction(&program, 0);
    assert_eq!(instr.args.len(), 1);
    assert_eq!(instr.label.as_deref(), Some("back"));
    assert!(instr.condition.is_some());
}

#[test]
fn hyphenated_names() {
    let program = parse("@my-ns/do-thing label=step-2");
    let instr = instruction(&program, 0);
    assert_eq!(instr.action.to_string(), "@my-ns/do-thing");
    assert_eq!(instr.label.as_deref(), Some("step-2"));
}

#[test]
fn dotted_and_scoped_output_targets() {
    let program = parse("@core/set value=1 output=user.name\n@core/set value=2 output=scope.a.b");
    assert_eq!(instruction(&program, 0).output.as_deref(), Some("user.name"));
    assert_eq!(instruction(&program, 1).output.as_deref(), Some("scope.a.b"));
}

#[test]
fn unbraced_values() {
    let program = parse("@x/y a=\"s\" b=-2 c=true d=null e=[1, 2] f=user.name");
    let instr = instruction(&program, 0);
    assert_eq!(instr.argument("a"), Some(&Expr::string("s")));
    assert_eq!(instr.argument("b"), Some(&Expr::number(-2.0)));
    assert_eq!(instr.argument("c"), Some(&Expr::BoolLiteral { value: true }));
    assert_eq!(instr.argument("d"), Some(&Expr::NullLiteral));
    assert!(matches!(instr.argument("e"), Some(Expr::ArrayLiteral { elements }) if elements.len() == 2));
    assert!(matches!(instr.argument("f"), Some(Expr::Member { .. })));
}

#[test]
fn statements_in_order() {
    let program = parse("@a/one\n\n# comment\n@a/two\n@a/three\n");
    let names: Vec<String> = (0..3).map(|i| instruction(&program, i).action.name.clone()).collect();
    assert_eq!(names, vec!["one", "two", "three"]);
    assert_eq!(instruction(&program, 1).loc.line, 4);
}

// ── Blocks ──────────────────────────────────────────────────

#[test]
fn conditional_block() {
    let program = parse("@block if={ready}\n  @core/log message=\"go\"\n@core/log message=\"after\"\n");
    assert_eq!(program.statements.len(), 2);
    let b = block(&program, 0);
    assert!(matches!(&b.kind, BlockKind::Conditional(Expr::Identifier { name }) if name == "ready"));
    assert_eq!(b.body.len(), 1);
}

#[test]
fn for_each_block() {
    let program = parse("@block forEach={items} as=item\n  @core/log message={item}\n");
    match &block(&program, 0).kind {
        BlockKind::ForEach(spec) => {
            assert_eq!(spec.item, "item");
            assert_eq!(spec.source, Expr::ident("items"));
        }
        other => panic!("expected forEach, got {:?}", other),
    }
}

#[test]
fn nested_blocks() {
    let source = "@block\n  @block forEach={xs} as=x\n    @core/log message={x}\n  @core/log message=\"end\"\n";
    let program = parse(source);
    let outer = block(&program, 0);
    assert_eq!(outer.kind, BlockKind::Plain);
    assert_eq!(outer.body.len(), 2);
    match &outer.body[0] {
        Statement::Block(inner) => assert_eq!(inner.body.len(), 1),
        other => panic!("expected block, got {:?}", other),
    }
}

#[test]
fn label_on_block_is_rejected() {
    assert!(parse_err("@block label=x\n  @a/b\n").contains("only be attached to instructions"));
}

#[test]
fn if_and_for_each_conflict() {
    assert!(parse_err("@block if={a} forEach={b} as=c\n  @a/b\n").contains("both"));
}

#[test]
fn for_each_requires_as() {
    assert!(parse_err("@block forEach={b}\n  @a/b\n").contains("'as'"));
}

#[test]
fn block_without_body() {
    assert!(parse_err("@block if={a}\n@a/b\n").contains("indented block body"));
    assert!(parse_err("@block if={a}").contains("no body"));
}

#[test]
fn stray_indentation() {
    assert!(parse_err("@a/b\n  @a/c\n").contains("Unexpected indentation"));
}

// ── Expressions ─────────────────────────────────────────────

#[test]
fn precedence_arithmetic() {
    assert_eq!(expr("1 + 2 * 3").to_string(), "(1 + (2 * 3))");
}

#[test]
fn precedence_logical_and_comparison() {
    assert_eq!(expr("a < 1 || b == 2 && c").to_string(), "((a < 1) || ((b == 2) && c))");
}

#[test]
fn unary_operators() {
    assert!(matches!(expr("!done"), Expr::Unary { op: UnaryOp::Not, .. }));
    assert!(matches!(expr("-x"), Expr::Unary { op: UnaryOp::Neg, .. }));
    assert!(matches!(expr("+x"), Expr::Unary { op: UnaryOp::Plus, .. }));
}

#[test]
fn member_paths() {
    match expr("order.items[0].price") {
        Expr::Member { object, path, computed } => {
            assert_eq!(*object, Expr::ident("order"));
            assert_eq!(path.len(), 3);
            assert!(computed);
        }
        other => panic!("expected member, got {:?}", other),
    }
}

#[test]
fn pipe_chain_with_arguments() {
    match expr("names | unique | join(\", \")") {
        Expr::Pipe { input, segments } => {
            assert_eq!(*input, Expr::ident("names"));
            assert_eq!(segments.len(), 2);
            assert_eq!(segments[1].name, "join");
            assert_eq!(segments[1].args, vec![Expr::string(", ")]);
        }
        other => panic!("expected pipe, got {:?}", other),
    }
}

#[test]
fn mapper_binds_tighter_than_pipe() {
    match expr("users -> \"name\" | unique") {
        Expr::Pipe { input, .. } => {
            assert!(matches!(*input, Expr::Mapper { ref target, .. } if target == "name"));
        }
        other => panic!("expected pipe, got {:?}", other),
    }
}

#[test]
fn duplicate_arguments_are_rejected() {
    assert!(parse_err("@a/b x=1 x=2").contains("Duplicate argument 'x'"));
}

#[test]
fn invalid_label() {
    assert!(parse_err("@a/b label=\"9lives\"").contains("Invalid label"));
}

#[test]
fn missing_at_sign() {
    assert!(parse_err("core/set value=1").contains("Expected '@'"));
}

#[test]
fn missing_slash() {
    assert!(parse_err("@core value=1").contains("Expected '/'"));
}

#[test]
fn parse_error_location() {
    let tokens = Lexer::new("@a/b\n@a/c x=", "loc.oto").tokenize().unwrap();
    let err = Parser::new(tokens, "loc.oto").parse().unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.to_string().starts_with("loc.oto:2:"));
}
