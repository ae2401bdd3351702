//! Block-local variable frames.
//!
//! The chain is an explicit stack: index 0 is the program's root frame and the
//! last element is the innermost one. Reads walk innermost → root; writes only
//! ever touch the innermost frame, which is what lets a loop's iterator shadow
//! an outer variable without mutating it.

use serde::Serialize;

use super::value::{Map, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScopeError {
    #[error("cannot pop the root scope frame")]
    EmptyChain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeChain {
    frames: Vec<Map>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    /// A chain holding a single empty root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Map::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Map::new());
    }

    /// Drop the innermost frame and return its bindings.
    pub fn pop(&mut self) -> Result<Map, ScopeError> {
        if self.frames.len() <= 1 {
            return Err(ScopeError::EmptyChain);
        }
        self.frames.pop().ok_or(ScopeError::EmptyChain)
    }

    /// First hit wins, innermost first. Stored `null`/`false`/`0`/`""` are hits.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn write(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Number of frames, root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> &Map {
        // `frames` is never empty: `pop` refuses to remove the root
        &self.frames[self.frames.len() - 1]
    }

    /// All visible bindings, inner frames shadowing outer ones.
    pub fn flatten(&self) -> Map {
        let mut merged = Map::new();
        for frame in &self.frames {
            for (k, v) in frame {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }
}
