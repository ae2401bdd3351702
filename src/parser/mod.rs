use std::collections::HashSet;
use std::fmt;

use crate::ast::*;
use crate::lexer::tokens::{Token, TokenType};
use crate::verify::labels::is_valid_label;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

const MAX_PARSER_DEPTH: usize = 256;

/// Keyword that opens a block header: `@block if={...}`.
const BLOCK_KEYWORD: &str = "block";

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            filename: filename.to_string(),
            depth: 0,
        }
    }

    fn enter_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            Err(self.error_here(format!(
                "Maximum nesting depth ({}) exceeded, expression is too deeply nested",
                MAX_PARSER_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    // ── Public API ──────────────────────────────────────────────────────

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let loc = SourceLocation::new(&self.filename, 1, 1);
        let statements = self.parse_statement_list()?;
        self.skip_newlines();
        if !self.at_end() {
            let tok = self.current();
            return Err(self.error_at(
                tok,
                format!("Unexpected {:?} at top level", tok.token_type),
            ));
        }
        Ok(Program { statements, loc })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_statement_list(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenType::Dedent) || self.at_end() {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.loc();

        if self.check(TokenType::Indent) {
            return Err(self.error_here(
                "Unexpected indentation: only '@block' lines may be followed by an indented body"
                    .to_string(),
            ));
        }
        if !self.check(TokenType::At) {
            let tok = self.current();
            return Err(self.error_at(
                tok,
                format!(
                    "Expected '@' to start an instruction or block, got {:?} ({:?})",
                    tok.token_type, tok.value
                ),
            ));
        }
        self.advance();

        let head = self.parse_hyphenated_name()?;
        if self.check(TokenType::Slash) {
            self.advance();
            let name = self.parse_hyphenated_name()?;
            let action = ActionId::new(&head, &name);
            return self.parse_instruction(action, loc).map(Statement::Instruction);
        }
        if head == BLOCK_KEYWORD {
            return self.parse_block(loc).map(Statement::Block);
        }

        Err(ParseError {
            message: format!("Expected '/' after namespace '{}' (commands look like @namespace/name)", head),
            line: loc.line,
            column: loc.column,
            file: loc.file,
        })
    }

    fn parse_instruction(
        &mut self,
        action: ActionId,
        loc: SourceLocation,
    ) -> Result<Instruction, ParseError> {
        let mut instruction = Instruction {
            action,
            args: Vec::new(),
            output: None,
            condition: None,
            label: None,
            loc,
        };
        let mut seen = HashSet::new();

        while !self.at_line_end() {
            let name_tok = self.expect_name()?.clone();
            if !seen.insert(name_tok.value.clone()) {
                return Err(self.error_at(
                    &name_tok,
                    format!("Duplicate argument '{}' in {}", name_tok.value, instruction.action),
                ));
            }
            self.expect(TokenType::Assign)?;

            match name_tok.value.as_str() {
                "output" => instruction.output = Some(self.parse_output_target()?),
                "if" => instruction.condition = Some(self.parse_attribute_value()?),
                "label" => instruction.label = Some(self.parse_label()?),
                _ => {
                    let value = self.parse_attribute_value()?;
                    instruction.args.push(Argument {
                        name: name_tok.value.clone(),
                        value,
                    });
                }
            }
        }
        self.end_line()?;

        Ok(instruction)
    }

    fn parse_block(&mut self, loc: SourceLocation) -> Result<Block, ParseError> {
        let mut condition = None;
        let mut source = None;
        let mut item = None;
        let mut seen = HashSet::new();

        while !self.at_line_end() {
            let name_tok = self.expect_name()?.clone();
            if !seen.insert(name_tok.value.clone()) {
                return Err(self.error_at(
                    &name_tok,
                    format!("Duplicate block attribute '{}'", name_tok.value),
                ));
            }
            self.expect(TokenType::Assign)?;

            match name_tok.value.as_str() {
                "if" => condition = Some(self.parse_attribute_value()?),
                "forEach" => source = Some(self.parse_attribute_value()?),
                "as" => item = Some(self.expect(TokenType::Identifier)?.value.clone()),
                "label" => {
                    return Err(self.error_at(
                        &name_tok,
                        "Labels can only be attached to instructions, not blocks".to_string(),
                    ))
                }
                other => {
                    return Err(self.error_at(
                        &name_tok,
                        format!("Unknown block attribute '{}'", other),
                    ))
                }
            }
        }

        let kind = match (condition, source, item) {
            (Some(_), Some(_), _) => {
                return Err(self.error_at_loc(
                    &loc,
                    "A block cannot declare both 'if' and 'forEach'".to_string(),
                ))
            }
            (None, Some(source), Some(item)) => BlockKind::ForEach(ForEachSpec { source, item }),
            (None, Some(_), None) => {
                return Err(self.error_at_loc(
                    &loc,
                    "'forEach' requires an 'as' iterator name".to_string(),
                ))
            }
            (_, None, Some(_)) => {
                return Err(self.error_at_loc(
                    &loc,
                    "'as' is only valid together with 'forEach'".to_string(),
                ))
            }
            (Some(condition), None, None) => BlockKind::Conditional(condition),
            (None, None, None) => BlockKind::Plain,
        };

        if !self.check(TokenType::Newline) {
            return Err(self.error_here("Block has no body".to_string()));
        }
        self.advance();
        if !self.check(TokenType::Indent) {
            return Err(self.error_here("Expected an indented block body".to_string()));
        }
        self.advance();

        let body = self.parse_statement_list()?;
        if self.check(TokenType::Dedent) {
            self.advance();
        }

        Ok(Block { kind, body, loc })
    }

    fn parse_output_target(&mut self) -> Result<String, ParseError> {
        if self.check(TokenType::StringLit) {
            let tok = self.advance().clone();
            if tok.value.is_empty() {
                return Err(self.error_at(&tok, "Output target cannot be empty".to_string()));
            }
            return Ok(tok.value);
        }
        let mut parts = vec![self.expect_name()?.value.clone()];
        while self.check(TokenType::Dot) {
            self.advance();
            parts.push(self.expect_name()?.value.clone());
        }
        Ok(parts.join("."))
    }

    fn parse_label(&mut self) -> Result<String, ParseError> {
        let tok = self.current().clone();
        let label = if tok.token_type == TokenType::StringLit {
            self.advance();
            tok.value.clone()
        } else {
            self.parse_hyphenated_name()?
        };
        if !is_valid_label(&label) {
            return Err(self.error_at(
                &tok,
                format!(
                    "Invalid label '{}': labels start with a letter or '_' and contain only letters, digits, '_' or '-'",
                    label
                ),
            ));
        }
        Ok(label)
    }

    /// `name` or `name-with-dashes`; dashes must touch both neighbours.
    fn parse_hyphenated_name(&mut self) -> Result<String, ParseError> {
        let first = self.expect_name()?.clone();
        let mut name = first.value.clone();
        let mut end = first.end_column();
        let line = first.line;

        while self.check(TokenType::Minus) {
            let dash = self.current().clone();
            let next_adjacent = self
                .tokens
                .get(self.pos + 1)
                .map_or(false, |t| {
                    t.line == line
                        && t.column == dash.end_column()
                        && matches!(t.token_type, TokenType::Identifier | TokenType::Number)
                });
            if dash.line != line || dash.column != end || !next_adjacent {
                break;
            }
            self.advance();
            let part = self.advance().clone();
            name.push('-');
            name.push_str(&part.value);
            end = part.end_column();
        }

        Ok(name)
    }

    fn parse_attribute_value(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenType::LBrace) {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(TokenType::RBrace)?;
            return Ok(expr);
        }
        self.parse_unary()
    }

    // ── Expressions (precedence climbing) ───────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter_depth()?;
        let result = self.parse_pipe_expr();
        self.exit_depth();
        result
    }

    fn parse_pipe_expr(&mut self) -> Result<Expr, ParseError> {
        let input = self.parse_mapper_expr()?;
        let mut segments = Vec::new();
        while self.check(TokenType::Pipe) {
            self.advance();
            let name = self.expect_name()?.value.clone();
            let mut args = Vec::new();
            if self.check(TokenType::LParen) {
                self.advance();
                if !self.check(TokenType::RParen) {
                    args.push(self.parse_expression()?);
                    while self.check(TokenType::Comma) {
                        self.advance();
                        args.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenType::RParen)?;
            }
            segments.push(PipeSegment { name, args });
        }
        if segments.is_empty() {
            Ok(input)
        } else {
            Ok(Expr::Pipe {
                input: Box::new(input),
                segments,
            })
        }
    }

    fn parse_mapper_expr(&mut self) -> Result<Expr, ParseError> {
        let source = self.parse_or_expr()?;
        if !self.check(TokenType::Arrow) {
            return Ok(source);
        }
        self.advance();
        let tok = self.current().clone();
        let target = match tok.token_type {
            TokenType::StringLit | TokenType::Identifier => {
                self.advance();
                tok.value
            }
            _ => {
                return Err(self.error_at(
                    &tok,
                    format!("Expected a field name after '->', got {:?}", tok.token_type),
                ))
            }
        };
        Ok(Expr::Mapper {
            source: Box::new(source),
            target,
        })
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.check(TokenType::OrOr) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check(TokenType::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Equals => BinaryOp::Eq,
                TokenType::NotEquals => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().token_type {
                TokenType::LessThan => BinaryOp::Lt,
                TokenType::LessEqual => BinaryOp::LtEq,
                TokenType::GreaterThan => BinaryOp::Gt,
                TokenType::GreaterEqual => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.current().token_type {
            TokenType::Bang => UnaryOp::Not,
            TokenType::Minus => UnaryOp::Neg,
            TokenType::Plus => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.advance();

        // Fold `-3` into a literal so goto/exit arguments stay literal
        if op == UnaryOp::Neg && self.check(TokenType::Number) {
            if let Expr::NumberLiteral { value } = self.parse_primary()? {
                return Ok(Expr::NumberLiteral { value: -value });
            }
        }

        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(TokenType::Dot) {
                self.advance();
                let field = self.expect_name()?.value.clone();
                expr = extend_member(expr, MemberSegment::Field(field));
            } else if self.check(TokenType::LBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(TokenType::RBracket)?;
                expr = extend_member(expr, MemberSegment::Index(Box::new(index)));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.current().clone();

        match tok.token_type {
            TokenType::StringLit => {
                self.advance();
                Ok(Expr::StringLiteral { value: tok.value })
            }
            TokenType::Number => {
                self.advance();
                let value: f64 = tok.value.parse().map_err(|_| {
                    self.error_at(&tok, format!("Invalid number literal: {}", tok.value))
                })?;
                Ok(Expr::NumberLiteral { value })
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::BoolLiteral { value: true })
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::BoolLiteral { value: false })
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::NullLiteral)
            }
            TokenType::Identifier => {
                self.advance();
                Ok(Expr::Identifier { name: tok.value })
            }
            TokenType::LBracket => self.parse_array_literal(),
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            _ => Err(self.error_at(
                &tok,
                format!("Expected expression, got {:?} ({:?})", tok.token_type, tok.value),
            )),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenType::LBracket)?;
        let mut elements = Vec::new();
        if !self.check(TokenType::RBracket) {
            elements.push(self.parse_expression()?);
            while self.check(TokenType::Comma) {
                self.advance();
                if self.check(TokenType::RBracket) {
                    break;
                }
                elements.push(self.parse_expression()?);
            }
        }
        self.expect(TokenType::RBracket)?;
        Ok(Expr::ArrayLiteral { elements })
    }

    // ── Token stream helpers ────────────────────────────────────────────

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos.min(self.tokens.len().saturating_sub(1));
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn expect(&mut self, token_type: TokenType) -> Result<&Token, ParseError> {
        let tok = self.current();
        if tok.token_type != token_type {
            return Err(self.error_at(
                tok,
                format!(
                    "Expected {:?}, got {:?} ({:?})",
                    token_type, tok.token_type, tok.value
                ),
            ));
        }
        Ok(self.advance())
    }

    fn expect_name(&mut self) -> Result<&Token, ParseError> {
        let tok = self.current();
        if tok.token_type == TokenType::Identifier || tok.token_type.can_be_identifier() {
            Ok(self.advance())
        } else {
            Err(self.error_at(
                tok,
                format!("Expected identifier, got {:?} ({:?})", tok.token_type, tok.value),
            ))
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.current().token_type,
            TokenType::Newline | TokenType::Eof | TokenType::Dedent
        )
    }

    fn end_line(&mut self) -> Result<(), ParseError> {
        match self.current().token_type {
            TokenType::Newline => {
                self.advance();
                Ok(())
            }
            TokenType::Eof | TokenType::Dedent => Ok(()),
            _ => {
                let tok = self.current();
                Err(self.error_at(
                    tok,
                    format!("Expected end of line, got {:?} ({:?})", tok.token_type, tok.value),
                ))
            }
        }
    }

    fn at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenType::Newline) {
            self.advance();
        }
    }

    fn loc(&self) -> SourceLocation {
        let tok = self.current();
        SourceLocation::new(&tok.file, tok.line, tok.column)
    }

    fn error_at(&self, tok: &Token, message: String) -> ParseError {
        ParseError {
            message,
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        }
    }

    fn error_at_loc(&self, loc: &SourceLocation, message: String) -> ParseError {
        ParseError {
            message,
            line: loc.line,
            column: loc.column,
            file: loc.file.clone(),
        }
    }

    fn error_here(&self, message: String) -> ParseError {
        self.error_at(self.current(), message)
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn extend_member(expr: Expr, segment: MemberSegment) -> Expr {
    let segment_computed = matches!(segment, MemberSegment::Index(_));
    match expr {
        Expr::Member {
            object,
            mut path,
            computed,
        } => {
            path.push(segment);
            Expr::Member {
                object,
                path,
                computed: computed || segment_computed,
            }
        }
        other => Expr::Member {
            object: Box::new(other),
            path: vec![segment],
            computed: segment_computed,
        },
    }
}

/// Lex and parse a source string in one step.
pub fn parse_source(source: &str, filename: &str) -> Result<Program, Box<dyn std::error::Error + Send + Sync>> {
    let tokens = crate::lexer::Lexer::new(source, filename).tokenize()?;
    let program = Parser::new(tokens, filename).parse()?;
    Ok(program)
}
