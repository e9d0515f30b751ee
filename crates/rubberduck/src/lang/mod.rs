//! Restricted compiler
//!
//! Source text is tokenized, parsed and validated against a
//! [`SandboxPolicy`]. Only programs that pass every check become an
//! [`ExecutableUnit`].

use std::fmt;

use crate::config::SandboxPolicy;

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod validate;

/// A rejected program, with the location of the offending construct when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub line: Option<u32>,
    pub col: Option<u32>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            col: None,
        }
    }

    pub fn at(message: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            col: Some(col),
        }
    }

    pub fn on_line(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            col: None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.col) {
            (Some(line), Some(col)) => write!(f, "{} (line {line}, column {col})", self.message),
            (Some(line), None) => write!(f, "{} (line {line})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// A program that has passed validation.
///
/// Holding one is proof that the program names no disallowed module and no
/// reserved identifier; everything else is mediated at run time.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    program: ast::Program,
}

impl ExecutableUnit {
    pub fn program(&self) -> &ast::Program {
        &self.program
    }
}

/// Compile source text under the given policy
pub fn compile(source: &str, policy: &SandboxPolicy) -> Result<ExecutableUnit, CompileError> {
    let program = parser::parse(source)?;
    validate::check(&program, policy)?;
    Ok(ExecutableUnit { program })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let err = CompileError::at("invalid syntax", 3, 7);
        assert_eq!(err.to_string(), "invalid syntax (line 3, column 7)");
        let err = CompileError::on_line("'break' outside loop", 2);
        assert_eq!(err.to_string(), "'break' outside loop (line 2)");
        assert_eq!(CompileError::new("boom").to_string(), "boom");
    }

    #[test]
    fn compile_accepts_plain_program() {
        let unit = compile("print(2 + 2)", &SandboxPolicy::default()).unwrap();
        assert_eq!(unit.program().body.len(), 1);
    }

    #[test]
    fn compile_rejects_disallowed_import() {
        let err = compile("import os", &SandboxPolicy::default()).unwrap_err();
        assert!(err.message.contains("'os'"));
    }

    #[test]
    fn compile_is_deterministic() {
        let policy = SandboxPolicy::default();
        for source in ["print(1)", "import sys", "def f(:", "x = _y"] {
            let first = compile(source, &policy).map(|_| ());
            let second = compile(source, &policy).map(|_| ());
            assert_eq!(first, second);
        }
    }
}
