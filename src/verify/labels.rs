//! Label indexing and pre-flight jump validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{Instruction, Program, Statement};

/// The only command whose target is checked statically.
pub const GOTO_COMMAND: &str = "@flow/goto";
pub const GOTO_TARGET_ARG: &str = "target";

static LABEL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

pub fn is_valid_label(label: &str) -> bool {
    LABEL_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(label))
}

/// Where a labeled instruction lives: `path` holds the statement index at
/// each nesting level, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEntry {
    pub path: Vec<usize>,
    pub instruction: Instruction,
}

pub type LabelIndex = BTreeMap<String, LabelEntry>;

/// Map every label to its location. If a label is declared twice the first
/// declaration is kept; `validate_labels` reports the conflict.
pub fn build_label_index(program: &Program) -> LabelIndex {
    let mut index = LabelIndex::new();
    let mut path = Vec::new();
    index_statements(&program.statements, &mut path, &mut index);
    index
}

fn index_statements(statements: &[Statement], path: &mut Vec<usize>, index: &mut LabelIndex) {
    for (i, stmt) in statements.iter().enumerate() {
        path.push(i);
        match stmt {
            Statement::Instruction(instr) => {
                if let Some(label) = &instr.label {
                    index.entry(label.clone()).or_insert_with(|| LabelEntry {
                        path: path.clone(),
                        instruction: instr.clone(),
                    });
                }
            }
            Statement::Block(block) => index_statements(&block.body, path, index),
        }
        path.pop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    FailFast,
    CollectAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelIssueKind {
    DuplicateLabel,
    UnknownTarget,
    InvalidTarget,
}

impl LabelIssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            LabelIssueKind::DuplicateLabel => "L001",
            LabelIssueKind::UnknownTarget => "L002",
            LabelIssueKind::InvalidTarget => "L003",
        }
    }
}

/// A single pre-flight problem. `instructions` are positions in the
/// pre-order sequence of all instructions in the program (blocks are not
/// counted), which is also the order a straight-line run would log them.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelIssue {
    pub kind: LabelIssueKind,
    pub message: String,
    pub label: Option<String>,
    pub instructions: Vec<usize>,
    pub lines: Vec<usize>,
}

impl fmt::Display for LabelIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct LabelValidationError {
    pub issues: Vec<LabelIssue>,
}

impl fmt::Display for LabelValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label validation failed: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", issue.message)?;
        }
        Ok(())
    }
}

pub fn validate_labels(program: &Program, mode: ValidationMode) -> Result<(), LabelValidationError> {
    let issues = collect_issues(program);
    if issues.is_empty() {
        return Ok(());
    }
    let issues = match mode {
        ValidationMode::FailFast => issues.into_iter().take(1).collect(),
        ValidationMode::CollectAll => issues,
    };
    Err(LabelValidationError { issues })
}

fn collect_issues(program: &Program) -> Vec<LabelIssue> {
    let mut instructions = Vec::new();
    flatten(&program.statements, &mut instructions);

    let mut declared: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
    for (i, instr) in instructions.iter().enumerate() {
        if let Some(label) = &instr.label {
            declared
                .entry(label.as_str())
                .or_default()
                .push((i, instr.loc.line));
        }
    }

    let mut issues = Vec::new();

    let mut duplicates: Vec<(&str, &Vec<(usize, usize)>)> = declared
        .iter()
        .filter(|(_, sites)| sites.len() > 1)
        .map(|(label, sites)| (*label, sites))
        .collect();
    duplicates.sort_by_key(|(_, sites)| sites[0].0);
    for (label, sites) in duplicates {
        let positions: Vec<String> = sites.iter().map(|(i, _)| i.to_string()).collect();
        issues.push(LabelIssue {
            kind: LabelIssueKind::DuplicateLabel,
            message: format!(
                "Duplicate label '{}' on instructions {}",
                label,
                positions.join(", ")
            ),
            label: Some(label.to_string()),
            instructions: sites.iter().map(|(i, _)| *i).collect(),
            lines: sites.iter().map(|(_, line)| *line).collect(),
        });
    }

    for (i, instr) in instructions.iter().enumerate() {
        if instr.action.to_string() != GOTO_COMMAND {
            continue;
        }
        let line = instr.loc.line;
        match instr.argument(GOTO_TARGET_ARG) {
            Some(expr) => match expr.as_string_literal() {
                Some(target) if declared.contains_key(target) => {}
                Some(target) => issues.push(LabelIssue {
                    kind: LabelIssueKind::UnknownTarget,
                    message: format!("Unknown goto target '{}' at instruction {}", target, i),
                    label: Some(target.to_string()),
                    instructions: vec![i],
                    lines: vec![line],
                }),
                None => issues.push(LabelIssue {
                    kind: LabelIssueKind::InvalidTarget,
                    message: format!(
                        "goto target at instruction {} must be a string literal, got {}",
                        i,
                        expr.kind()
                    ),
                    label: None,
                    instructions: vec![i],
                    lines: vec![line],
                }),
            },
            None => issues.push(LabelIssue {
                kind: LabelIssueKind::InvalidTarget,
                message: format!("goto at instruction {} has no target", i),
                label: None,
                instructions: vec![i],
                lines: vec![line],
            }),
        }
    }

    issues
}

fn flatten<'a>(statements: &'a [Statement], out: &mut Vec<&'a Instruction>) {
    for stmt in statements {
        match stmt {
            Statement::Instruction(instr) => out.push(instr),
            Statement::Block(block) => flatten(&block.body, out),
        }
    }
}
