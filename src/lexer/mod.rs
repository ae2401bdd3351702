pub mod tokens;

use std::cmp::Ordering;

use tokens::{keyword_type, Token, TokenType};

#[derive(Debug, thiserror::Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

const INDENT_WIDTH: usize = 2;

const OPERATORS: [([char; 2], TokenType); 7] = [
    (['-', '>'], TokenType::Arrow),
    (['=', '='], TokenType::Equals),
    (['!', '='], TokenType::NotEquals),
    (['<', '='], TokenType::LessEqual),
    (['>', '='], TokenType::GreaterEqual),
    (['&', '&'], TokenType::AndAnd),
    (['|', '|'], TokenType::OrOr),
];

const PUNCTUATION: [(char, TokenType); 19] = [
    ('@', TokenType::At),
    ('(', TokenType::LParen),
    (')', TokenType::RParen),
    ('[', TokenType::LBracket),
    (']', TokenType::RBracket),
    ('{', TokenType::LBrace),
    ('}', TokenType::RBrace),
    (',', TokenType::Comma),
    ('.', TokenType::Dot),
    ('+', TokenType::Plus),
    ('-', TokenType::Minus),
    ('*', TokenType::Star),
    ('/', TokenType::Slash),
    ('%', TokenType::Percent),
    ('<', TokenType::LessThan),
    ('>', TokenType::GreaterThan),
    ('=', TokenType::Assign),
    ('!', TokenType::Bang),
    ('|', TokenType::Pipe),
];

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The character a backslash escape stands for. Unknown escapes keep the
/// escaped character as is.
fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}

/// Turns OTO source into tokens. Leading spaces are significant: each block
/// body sits exactly [`INDENT_WIDTH`] spaces deeper than its header, and the
/// lexer brackets it with `Indent`/`Dedent` tokens.
pub struct Lexer {
    chars: Vec<char>,
    file: String,
    pos: usize,
    line: usize,
    column: usize,
    out: Vec<Token>,
    levels: Vec<usize>,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            file: filename.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            out: Vec::new(),
            levels: vec![0],
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        while self.current().is_some() {
            self.line_start()?;
        }

        let at = self.here();
        while self.levels.len() > 1 {
            self.levels.pop();
            self.emit(TokenType::Dedent, "", at);
        }
        self.emit(TokenType::Eof, "", at);
        Ok(self.out)
    }

    fn line_start(&mut self) -> Result<(), LexerError> {
        let indent = self.eat_while(|c| c == ' ').len();
        self.eat('\r');

        match self.current() {
            None => return Ok(()),
            Some('\n') => {
                self.bump();
                return Ok(());
            }
            Some('#') => {
                self.eat_while(|c| c != '\n');
                self.eat('\n');
                return Ok(());
            }
            Some('\t') => return Err(self.error("Tabs are not allowed, use 2-space indentation")),
            Some(_) => {}
        }

        self.layout(indent)?;
        self.line_body()
    }

    fn layout(&mut self, indent: usize) -> Result<(), LexerError> {
        if indent % INDENT_WIDTH != 0 {
            return Err(self.error(format!(
                "Indentation must be a multiple of {} spaces, got {}",
                INDENT_WIDTH, indent
            )));
        }

        let at = self.here();
        match indent.cmp(&self.depth()) {
            Ordering::Equal => {}
            Ordering::Greater if indent - self.depth() == INDENT_WIDTH => {
                self.levels.push(indent);
                self.emit(TokenType::Indent, "", at);
            }
            Ordering::Greater => {
                return Err(self.error(format!(
                    "Block body must be indented by exactly {} spaces",
                    INDENT_WIDTH
                )));
            }
            Ordering::Less => {
                while self.depth() > indent {
                    self.levels.pop();
                    self.emit(TokenType::Dedent, "", at);
                }
                if self.depth() != indent {
                    return Err(self.error(format!(
                        "Dedent to level {} does not match any outer indentation level",
                        indent
                    )));
                }
            }
        }
        Ok(())
    }

    fn line_body(&mut self) -> Result<(), LexerError> {
        loop {
            self.eat_while(|c| c == ' ' || c == '\r');
            match self.current() {
                None => return Ok(()),
                Some('\n') => {
                    let at = self.here();
                    self.emit(TokenType::Newline, "\n", at);
                    self.bump();
                    return Ok(());
                }
                Some('#') => {
                    self.eat_while(|c| c != '\n');
                }
                Some(c) => self.token(c)?,
            }
        }
    }

    fn token(&mut self, c: char) -> Result<(), LexerError> {
        let at = self.here();

        if c == '"' {
            let text = self.string_body(at)?;
            self.emit(TokenType::StringLit, text, at);
            return Ok(());
        }
        if c.is_ascii_digit() {
            let text = self.number();
            self.emit(TokenType::Number, text, at);
            return Ok(());
        }
        if is_name_start(c) {
            let word = self.eat_while(is_name_char);
            let token_type = keyword_type(&word).unwrap_or(TokenType::Identifier);
            self.emit(token_type, word, at);
            return Ok(());
        }

        let next = self.lookahead(1);
        if let Some((pair, token_type)) = OPERATORS.iter().find(|(pair, _)| Some(pair[1]) == next && pair[0] == c) {
            self.bump();
            self.bump();
            self.emit(*token_type, pair.iter().collect::<String>(), at);
            return Ok(());
        }
        if let Some((_, token_type)) = PUNCTUATION.iter().find(|(p, _)| *p == c) {
            self.bump();
            self.emit(*token_type, c.to_string(), at);
            return Ok(());
        }

        Err(self.error(format!("Unexpected character: {:?}", c)))
    }

    /// Consume a quoted literal and return its unescaped contents. Errors
    /// point at the opening quote.
    fn string_body(&mut self, (line, column): (usize, usize)) -> Result<String, LexerError> {
        let unterminated = |file: &str| LexerError {
            message: "Unterminated string literal".to_string(),
            line,
            column,
            file: file.to_string(),
        };

        self.bump();
        let mut text = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(unterminated(&self.file)),
                Some('"') => break,
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some(escaped) => text.push(unescape(escaped)),
                        None => return Err(unterminated(&self.file)),
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.bump();
        Ok(text)
    }

    /// Digits with at most one fractional part. A dot not followed by a digit
    /// is left for member access (`1.x`).
    fn number(&mut self) -> String {
        let mut text = self.eat_while(|c| c.is_ascii_digit());
        if self.current() == Some('.') && self.lookahead(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            text.push('.');
            text.push_str(&self.eat_while(|c| c.is_ascii_digit()));
        }
        text
    }

    // ── Cursor ──────────────────────────────────────────────────────────

    fn depth(&self) -> usize {
        self.levels.last().copied().unwrap_or(0)
    }

    fn here(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    fn current(&self) -> Option<char> {
        self.lookahead(0)
    }

    fn lookahead(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.current()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        let matched = self.current() == Some(expected);
        if matched {
            self.bump();
        }
        matched
    }

    fn eat_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut taken = String::new();
        while let Some(c) = self.current().filter(|c| keep(*c)) {
            taken.push(c);
            self.bump();
        }
        taken
    }

    fn error(&self, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            line: self.line,
            column: self.column,
            file: self.file.clone(),
        }
    }

    fn emit(&mut self, token_type: TokenType, value: impl Into<String>, (line, column): (usize, usize)) {
        self.out.push(Token {
            token_type,
            value: value.into(),
            line,
            column,
            file: self.file.clone(),
        });
    }
}
