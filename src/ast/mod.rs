use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: &str, line: usize, column: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
            column,
        }
    }

    /// Location used for nodes built in code rather than parsed from a file.
    pub fn synthetic() -> Self {
        Self::new("<memory>", 0, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

// ── Operators ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────

/// One step of a member path: `.name` or `[expr]`.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberSegment {
    Field(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipeSegment {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier {
        name: String,
    },
    StringLiteral {
        value: String,
    },
    NumberLiteral {
        value: f64,
    },
    BoolLiteral {
        value: bool,
    },
    NullLiteral,
    Member {
        object: Box<Expr>,
        path: Vec<MemberSegment>,
        computed: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
    },
    Pipe {
        input: Box<Expr>,
        segments: Vec<PipeSegment>,
    },
    Mapper {
        source: Box<Expr>,
        target: String,
    },
}

impl Expr {
    /// Short node-kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Identifier { .. } => "identifier",
            Expr::StringLiteral { .. } => "literal-string",
            Expr::NumberLiteral { .. } => "literal-number",
            Expr::BoolLiteral { .. } => "literal-boolean",
            Expr::NullLiteral => "literal-null",
            Expr::Member { .. } => "member",
            Expr::Unary { .. } => "unary",
            Expr::Binary { .. } => "binary",
            Expr::Logical { .. } => "logical",
            Expr::ArrayLiteral { .. } => "array-literal",
            Expr::Pipe { .. } => "pipe-expression",
            Expr::Mapper { .. } => "mapper",
        }
    }

    pub fn ident(name: &str) -> Self {
        Expr::Identifier {
            name: name.to_string(),
        }
    }

    pub fn string(value: &str) -> Self {
        Expr::StringLiteral {
            value: value.to_string(),
        }
    }

    pub fn number(value: f64) -> Self {
        Expr::NumberLiteral { value }
    }

    /// The literal string value, if this node is a string literal.
    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expr::StringLiteral { value } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier { name } => write!(f, "{}", name),
            Expr::StringLiteral { value } => write!(f, "{:?}", value),
            Expr::NumberLiteral { value } => write!(f, "{}", value),
            Expr::BoolLiteral { value } => write!(f, "{}", value),
            Expr::NullLiteral => write!(f, "null"),
            Expr::Member { object, path, .. } => {
                write!(f, "{}", object)?;
                for segment in path {
                    match segment {
                        MemberSegment::Field(name) => write!(f, ".{}", name)?,
                        MemberSegment::Index(index) => write!(f, "[{}]", index)?,
                    }
                }
                Ok(())
            }
            Expr::Unary { op, operand } => write!(f, "{}{}", op, operand),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Logical { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::ArrayLiteral { elements } => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Expr::Pipe { input, segments } => {
                write!(f, "{}", input)?;
                for segment in segments {
                    write!(f, " | {}", segment.name)?;
                    if !segment.args.is_empty() {
                        let args: Vec<String> = segment.args.iter().map(|a| a.to_string()).collect();
                        write!(f, "({})", args.join(", "))?;
                    }
                }
                Ok(())
            }
            Expr::Mapper { source, target } => write!(f, "{} -> {:?}", source, target),
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────────

/// `@namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionId {
    pub namespace: String,
    pub name: String,
}

impl ActionId {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse the `@namespace/name` form (leading `@` optional).
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.strip_prefix('@').unwrap_or(id);
        let (namespace, name) = id.split_once('/')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub action: ActionId,
    pub args: Vec<Argument>,
    pub output: Option<String>,
    pub condition: Option<Expr>,
    pub label: Option<String>,
    pub loc: SourceLocation,
}

impl Instruction {
    pub fn new(action: ActionId) -> Self {
        Self {
            action,
            args: Vec::new(),
            output: None,
            condition: None,
            label: None,
            loc: SourceLocation::synthetic(),
        }
    }

    pub fn arg(mut self, name: &str, value: Expr) -> Self {
        self.args.push(Argument {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn output(mut self, target: &str) -> Self {
        self.output = Some(target.to_string());
        self
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Expr> {
        self.args.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

// ── Blocks ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachSpec {
    pub source: Expr,
    pub item: String,
}

/// A block is either a plain grouping, a conditional, or an iteration;
/// never both a condition and a loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Plain,
    Conditional(Expr),
    ForEach(ForEachSpec),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub body: Vec<Statement>,
    pub loc: SourceLocation,
}

// ── Statements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Instruction(Instruction),
    Block(Block),
}

impl Statement {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Statement::Instruction(instruction) => &instruction.loc,
            Statement::Block(block) => &block.loc,
        }
    }
}

// ── Program ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub loc: SourceLocation,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            loc: SourceLocation::synthetic(),
        }
    }
}
