//! Sandboxed execution environment
//!
//! An [`Environment`] is the complete set of capabilities a script can
//! reach: the builtin table, the importable modules named by the policy and
//! an [`AccessGate`] that vets every attribute lookup. A fresh environment
//! is built for each execution and dropped with it, so no state carries
//! over between scripts.

use std::collections::HashMap;

use crate::config::SandboxPolicy;
use crate::lang::ExecutableUnit;

pub mod builtins;
pub mod exception;
pub mod format;
pub mod gate;
pub mod interp;
pub mod methods;
pub mod modules;
pub mod output;
pub mod value;

pub use exception::{ExcKind, Exception};
pub use gate::{Access, AccessGate, DefaultGate};
pub use value::Value;

pub struct Environment {
    policy: SandboxPolicy,
    gate: Box<dyn AccessGate>,
    builtins: HashMap<&'static str, Value>,
}

impl Environment {
    /// Build an environment guarded by the [`DefaultGate`]
    pub fn new(policy: &SandboxPolicy) -> Self {
        Self::with_gate(policy, DefaultGate)
    }

    /// Build an environment with a custom attribute gate
    pub fn with_gate(policy: &SandboxPolicy, gate: impl AccessGate + 'static) -> Self {
        Self {
            policy: policy.clone(),
            gate: Box::new(gate),
            builtins: builtins::table(),
        }
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    pub fn gate(&self) -> &dyn AccessGate {
        self.gate.as_ref()
    }

    pub fn builtin(&self, name: &str) -> Option<&Value> {
        self.builtins.get(name)
    }

    /// Names visible without an import, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.builtins.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Execute a validated unit, consuming the environment.
    ///
    /// Returns everything the script printed, or the exception that ended it.
    pub fn run(self, unit: &ExecutableUnit) -> Result<String, Exception> {
        interp::Interpreter::new(self).run(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_builtins_and_exceptions() {
        let env = Environment::new(&SandboxPolicy::default());
        let names = env.names();
        assert!(names.contains(&"print"));
        assert!(names.contains(&"ZeroDivisionError"));
        assert!(!names.contains(&"open"));
        assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn custom_gate_is_installed() {
        let env = Environment::with_gate(&SandboxPolicy::default(), |_: &Value, _: &str| {
            Access::Denied("closed".to_owned())
        });
        assert_eq!(
            env.gate().check(&Value::None, "anything"),
            Access::Denied("closed".to_owned())
        );
    }
}
