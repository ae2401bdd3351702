//! Lexer tests: tokens, indentation, comments, error handling

use oto::lexer::tokens::TokenType;
use oto::lexer::Lexer;

fn lex(source: &str) -> Vec<(TokenType, String)> {
    let tokens = Lexer::new(source, "test.oto").tokenize().unwrap();
    tokens
        .into_iter()
        .filter(|t| !matches!(t.token_type, TokenType::Eof))
        .map(|t| (t.token_type, t.value))
        .collect()
}

fn lex_types(source: &str) -> Vec<TokenType> {
    lex(source).into_iter().map(|(tt, _)| tt).collect()
}

fn lex_err(source: &str) -> String {
    Lexer::new(source, "test.oto").tokenize().unwrap_err().message
}

// ── Basic tokens ────────────────────────────────────────────

#[test]
fn identifier() {
    let tokens = lex("hello");
    assert_eq!(tokens, vec![(TokenType::Identifier, "hello".into())]);
}

#[test]
fn number_literals() {
    assert_eq!(lex("42")[0], (TokenType::Number, "42".into()));
    assert_eq!(lex("3.14")[0], (TokenType::Number, "3.14".into()));
}

#[test]
fn number_followed_by_dot_member_is_not_a_float() {
    assert_eq!(
        lex_types("1.x"),
        vec![TokenType::Number, TokenType::Dot, TokenType::Identifier]
    );
}

#[test]
fn string_literal_with_escapes() {
    let tokens = lex(r#""say \"hi\"\n""#);
    assert_eq!(tokens[0], (TokenType::StringLit, "say \"hi\"\n".into()));
}

#[test]
fn escapes_and_unknown_escapes() {
    let tokens = lex(r#""a\tb\\c\qd""#);
    assert_eq!(tokens[0], (TokenType::StringLit, "a\tb\\cqd".into()));
}

#[test]
fn number_takes_one_fraction_and_names_take_underscores() {
    assert_eq!(
        lex("1.2.3 _tmp_2"),
        vec![
            (TokenType::Number, "1.2".into()),
            (TokenType::Dot, ".".into()),
            (TokenType::Number, "3".into()),
            (TokenType::Identifier, "_tmp_2".into()),
        ]
    );
}

#[test]
fn keywords() {
    assert_eq!(
        lex_types("true false null"),
        vec![TokenType::True, TokenType::False, TokenType::Null]
    );
}

#[test]
fn instruction_header() {
    assert_eq!(
        lex_types("@core/set value=1"),
        vec![
            TokenType::At,
            TokenType::Identifier,
            TokenType::Slash,
            TokenType::Identifier,
            TokenType::Identifier,
            TokenType::Assign,
            TokenType::Number,
        ]
    );
}

#[test]
fn two_character_operators() {
    assert_eq!(
        lex_types("== != <= >= && || ->"),
        vec![
            TokenType::Equals,
            TokenType::NotEquals,
            TokenType::LessEqual,
            TokenType::GreaterEqual,
            TokenType::AndAnd,
            TokenType::OrOr,
            TokenType::Arrow,
        ]
    );
}

#[test]
fn pipe_and_braces() {
    assert_eq!(
        lex_types("{items | unique}"),
        vec![
            TokenType::LBrace,
            TokenType::Identifier,
            TokenType::Pipe,
            TokenType::Identifier,
            TokenType::RBrace,
        ]
    );
}

// ── Layout ──────────────────────────────────────────────────

#[test]
fn indent_and_dedent_around_block_body() {
    let source = "@block\n  @core/log message=\"a\"\n@core/log message=\"b\"\n";
    let types = lex_types(source);
    assert_eq!(types.iter().filter(|t| **t == TokenType::Indent).count(), 1);
    assert_eq!(types.iter().filter(|t| **t == TokenType::Dedent).count(), 1);
    let indent = types.iter().position(|t| *t == TokenType::Indent).unwrap();
    assert_eq!(types[indent - 1], TokenType::Newline);
}

#[test]
fn dedents_are_closed_at_end_of_input() {
    let source = "@block\n  @block\n    @core/log message=1";
    let types = lex_types(source);
    assert_eq!(types.iter().filter(|t| **t == TokenType::Dedent).count(), 2);
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let source = "# header\n\n@core/log message=1 # trailing\n";
    let types = lex_types(source);
    assert!(!types.contains(&TokenType::Indent));
    assert_eq!(types.first(), Some(&TokenType::At));
    assert_eq!(types.last(), Some(&TokenType::Newline));
}

#[test]
fn token_positions() {
    let tokens = Lexer::new("@core/set\n@flow/exit code=2", "pos.oto")
        .tokenize()
        .unwrap();
    let code = tokens.iter().find(|t| t.value == "code").unwrap();
    assert_eq!(code.line, 2);
    assert_eq!(code.column, 12);
    assert_eq!(code.file, "pos.oto");
}

// ── Errors ──────────────────────────────────────────────────

#[test]
fn tabs_are_rejected() {
    assert!(lex_err("@block\n\t@core/log message=1").contains("Tabs"));
}

#[test]
fn odd_indentation_is_rejected() {
    assert!(lex_err("@block\n   @core/log message=1").contains("multiple of 2"));
}

#[test]
fn double_indent_step_is_rejected() {
    assert!(lex_err("@block\n    @core/log message=1").contains("exactly 2"));
}

#[test]
fn unterminated_string() {
    assert!(lex_err("@core/log message=\"oops").contains("Unterminated"));
}

#[test]
fn unexpected_character() {
    assert!(lex_err("@core/log message=$x").contains("Unexpected character"));
}

#[test]
fn error_display_carries_location() {
    let err = Lexer::new("@a/b x=\"", "where.oto").tokenize().unwrap_err();
    assert_eq!(err.to_string(), "where.oto:1:8: Unterminated string literal");
}
