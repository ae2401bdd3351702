use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Structure
    Indent,
    Dedent,
    Newline,
    Eof,

    // Literals
    StringLit,
    Number,
    True,
    False,
    Null,

    // Identifiers & punctuation
    Identifier,
    At,
    Dot,
    Comma,
    Arrow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Assign,

    // Comparison / arithmetic
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Logic / pipes
    Bang,
    AndAnd,
    OrOr,
    Pipe,
}

impl TokenType {
    /// Whether this keyword token can appear where a name is expected
    /// (attribute names, member paths).
    pub fn can_be_identifier(&self) -> bool {
        matches!(self, TokenType::True | TokenType::False | TokenType::Null)
    }
}

/// Look up a keyword string and return its TokenType, or None if it's a plain identifier.
pub fn keyword_type(word: &str) -> Option<TokenType> {
    match word {
        "true" => Some(TokenType::True),
        "false" => Some(TokenType::False),
        "null" => Some(TokenType::Null),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl Token {
    /// Column just past the last character of this token.
    pub fn end_column(&self) -> usize {
        self.column + self.value.chars().count()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Indent | TokenType::Dedent | TokenType::Newline | TokenType::Eof => {
                write!(f, "Token({:?}, {}:{})", self.token_type, self.line, self.column)
            }
            _ => {
                write!(
                    f,
                    "Token({:?}, {:?}, {}:{})",
                    self.token_type, self.value, self.line, self.column
                )
            }
        }
    }
}
