//! Script-level exceptions

use std::fmt;

/// Exception types visible to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ArithmeticError,
    LookupError,
    ValueError,
    TypeError,
    ZeroDivisionError,
    OverflowError,
    KeyError,
    IndexError,
    NameError,
    AttributeError,
    ImportError,
    RuntimeError,
    RecursionError,
    MemoryError,
    AssertionError,
    NotImplementedError,
}

impl ExcKind {
    pub const ALL: [ExcKind; 17] = [
        Self::Exception,
        Self::ArithmeticError,
        Self::LookupError,
        Self::ValueError,
        Self::TypeError,
        Self::ZeroDivisionError,
        Self::OverflowError,
        Self::KeyError,
        Self::IndexError,
        Self::NameError,
        Self::AttributeError,
        Self::ImportError,
        Self::RuntimeError,
        Self::RecursionError,
        Self::MemoryError,
        Self::AssertionError,
        Self::NotImplementedError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Exception => "Exception",
            Self::ArithmeticError => "ArithmeticError",
            Self::LookupError => "LookupError",
            Self::ValueError => "ValueError",
            Self::TypeError => "TypeError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::OverflowError => "OverflowError",
            Self::KeyError => "KeyError",
            Self::IndexError => "IndexError",
            Self::NameError => "NameError",
            Self::AttributeError => "AttributeError",
            Self::ImportError => "ImportError",
            Self::RuntimeError => "RuntimeError",
            Self::RecursionError => "RecursionError",
            Self::MemoryError => "MemoryError",
            Self::AssertionError => "AssertionError",
            Self::NotImplementedError => "NotImplementedError",
        }
    }

    pub fn parent(self) -> Option<ExcKind> {
        match self {
            Self::Exception => None,
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::ArithmeticError),
            Self::KeyError | Self::IndexError => Some(Self::LookupError),
            Self::RecursionError | Self::NotImplementedError => Some(Self::RuntimeError),
            _ => Some(Self::Exception),
        }
    }

    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// An exception raised while a script runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub kind: ExcKind,
    pub message: String,
    /// Line of the statement that raised, filled in as the error propagates
    pub line: Option<u32>,
}

impl Exception {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

pub fn type_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcKind::TypeError, message)
}

pub fn value_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcKind::ValueError, message)
}

pub fn index_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcKind::IndexError, message)
}

pub fn overflow() -> Exception {
    Exception::new(ExcKind::OverflowError, "integer overflow")
}

pub fn memory_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcKind::MemoryError, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy() {
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::Exception));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::RecursionError.is_subclass_of(ExcKind::RuntimeError));
        assert!(!ExcKind::ValueError.is_subclass_of(ExcKind::TypeError));
        for kind in ExcKind::ALL {
            assert!(kind.is_subclass_of(ExcKind::Exception));
        }
    }

    #[test]
    fn display_with_and_without_message() {
        let exc = Exception::new(ExcKind::ZeroDivisionError, "division by zero").at_line(1);
        assert_eq!(exc.to_string(), "ZeroDivisionError: division by zero (line 1)");
        let exc = Exception::new(ExcKind::AssertionError, "");
        assert_eq!(exc.to_string(), "AssertionError");
    }

    #[test]
    fn innermost_line_wins() {
        let exc = Exception::new(ExcKind::ValueError, "x").at_line(5).at_line(2);
        assert_eq!(exc.line, Some(5));
    }
}
