//! Compile-time checks on a parsed program
//!
//! The walk is pure and deterministic: it looks only at the tree and the
//! policy.

use crate::config::SandboxPolicy;
use crate::lang::CompileError;
use crate::lang::ast::{
    Arg, Comprehension, ExceptHandler, Expr, ExprKind, FStringPart, FunctionDef, ImportAlias,
    Program, Stmt, StmtKind, Target,
};

/// Validate a program against a policy
pub fn check(program: &Program, policy: &SandboxPolicy) -> Result<(), CompileError> {
    let mut validator = Validator {
        policy,
        loop_depth: 0,
        in_function: false,
    };
    validator.block(&program.body)
}

/// Whether a script may refer to an identifier
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_') && name != "_"
}

struct Validator<'a> {
    policy: &'a SandboxPolicy,
    loop_depth: usize,
    in_function: bool,
}

type Checked = Result<(), CompileError>;

impl Validator<'_> {
    fn block(&mut self, body: &[Stmt]) -> Checked {
        body.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn name(&self, name: &str, line: u32, col: Option<u32>) -> Checked {
        if !is_reserved_name(name) {
            return Ok(());
        }
        let message = format!("name '{name}' is not allowed: names starting with '_' are reserved");
        Err(match col {
            Some(col) => CompileError::at(message, line, col),
            None => CompileError::on_line(message, line),
        })
    }

    fn module(&self, alias: &ImportAlias, module: &str) -> Checked {
        if self.policy.allows_module(module) {
            Ok(())
        } else {
            Err(CompileError::at(
                format!("import of module '{module}' is not allowed"),
                alias.line,
                alias.col,
            ))
        }
    }

    fn statement(&mut self, stmt: &Stmt) -> Checked {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.target(target, line)?;
                }
                self.expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.target(target, line)?;
                self.expr(value)
            }
            StmtKind::If { test, body, orelse } => {
                self.expr(test)?;
                self.block(body)?;
                self.block(orelse)
            }
            StmtKind::While { test, body, orelse } => {
                self.expr(test)?;
                self.loop_body(body)?;
                self.block(orelse)
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.target(target, line)?;
                self.expr(iter)?;
                self.loop_body(body)?;
                self.block(orelse)
            }
            StmtKind::FunctionDef(def) => {
                self.name(&def.name, line, None)?;
                self.function(def)
            }
            StmtKind::Return(value) => {
                if !self.in_function {
                    return Err(CompileError::on_line("'return' outside function", line));
                }
                value.iter().try_for_each(|v| self.expr(v))
            }
            StmtKind::Pass => Ok(()),
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let word = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(CompileError::on_line(
                        format!("'{word}' outside loop"),
                        line,
                    ));
                }
                Ok(())
            }
            StmtKind::Import(names) => {
                for alias in names {
                    self.module(alias, &alias.name)?;
                    self.name(alias.bound_name(), alias.line, Some(alias.col))?;
                }
                Ok(())
            }
            StmtKind::ImportFrom { module, names } => {
                if let Some(first) = names.first() {
                    self.module(first, module)?;
                }
                for alias in names {
                    self.name(&alias.name, alias.line, Some(alias.col))?;
                    self.name(alias.bound_name(), alias.line, Some(alias.col))?;
                }
                Ok(())
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body)?;
                for handler in handlers {
                    self.handler(handler)?;
                }
                self.block(orelse)?;
                self.block(finalbody)
            }
            StmtKind::Raise(exc) => exc.iter().try_for_each(|e| self.expr(e)),
            StmtKind::Assert { test, msg } => {
                self.expr(test)?;
                msg.iter().try_for_each(|m| self.expr(m))
            }
            StmtKind::Del(targets) => targets.iter().try_for_each(|t| self.target(t, line)),
        }
    }

    fn loop_body(&mut self, body: &[Stmt]) -> Checked {
        self.loop_depth += 1;
        let result = self.block(body);
        self.loop_depth -= 1;
        result
    }

    fn handler(&mut self, handler: &ExceptHandler) -> Checked {
        if let Some(kind) = &handler.kind {
            self.expr(kind)?;
        }
        if let Some(name) = &handler.name {
            self.name(name, handler.line, None)?;
        }
        self.block(&handler.body)
    }

    fn function(&mut self, def: &FunctionDef) -> Checked {
        for param in &def.params {
            self.name(&param.name, def.line, None)?;
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        if let Some(vararg) = &def.vararg {
            self.name(vararg, def.line, None)?;
        }

        let saved = (self.loop_depth, self.in_function);
        self.loop_depth = 0;
        self.in_function = true;
        let result = self.block(&def.body);
        (self.loop_depth, self.in_function) = saved;
        result
    }

    fn target(&mut self, target: &Target, line: u32) -> Checked {
        match target {
            Target::Name(name) => self.name(name, line, None),
            Target::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            Target::Attribute { value, .. } => self.expr(value),
            Target::Tuple(items) => items.iter().try_for_each(|t| self.target(t, line)),
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension], line: u32) -> Checked {
        for generator in generators {
            self.target(&generator.target, line)?;
            self.expr(&generator.iter)?;
            generator.ifs.iter().try_for_each(|cond| self.expr(cond))?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Checked {
        match &expr.kind {
            ExprKind::Name(name) => self.name(name, expr.line, Some(expr.col)),
            ExprKind::Const(_) => Ok(()),
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Field { expr, .. } = part {
                        self.expr(expr)?;
                    }
                }
                Ok(())
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().try_for_each(|item| self.expr(item))
            }
            ExprKind::Dict(pairs) => {
                for (key, value) in pairs {
                    self.expr(key)?;
                    self.expr(value)?;
                }
                Ok(())
            }
            ExprKind::ListComp { elt, generators } => {
                self.comprehensions(generators, expr.line)?;
                self.expr(elt)
            }
            ExprKind::BinOp { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            ExprKind::UnaryOp { operand, .. } => self.expr(operand),
            ExprKind::Compare { left, ops } => {
                self.expr(left)?;
                ops.iter().try_for_each(|(_, right)| self.expr(right))
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(test)?;
                self.expr(body)?;
                self.expr(orelse)
            }
            ExprKind::Call { func, args } => {
                self.expr(func)?;
                for arg in args {
                    match arg {
                        Arg::Positional(value) | Arg::Star(value) => self.expr(value)?,
                        Arg::Keyword(name, value) => {
                            self.name(name, value.line, None)?;
                            self.expr(value)?;
                        }
                    }
                }
                Ok(())
            }
            // Attribute names are mediated by the access gate at run time
            ExprKind::Attribute { value, .. } => self.expr(value),
            ExprKind::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            ExprKind::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .try_for_each(|bound| self.expr(bound)),
            ExprKind::Lambda(def) => self.function(def),
        }
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::lang::compile;

    proptest! {
        #[test]
        fn compile_never_panics(source in "\\PC{0,200}") {
            let _ = compile(&source, &SandboxPolicy::default());
        }

        #[test]
        fn compile_decision_is_deterministic(
            source in "[a-z_0-9 +*()\\[\\]\\n:=,.\\-]{0,80}"
        ) {
            let policy = SandboxPolicy::default();
            let first = compile(&source, &policy).map(|_| ());
            let second = compile(&source, &policy).map(|_| ());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn underscore_identifiers_never_compile(name in "_[a-z_]{1,10}") {
            let source = format!("{name} = 1");
            prop_assert!(compile(&source, &SandboxPolicy::default()).is_err());
        }
    }
}
