use serde::{Deserialize, Serialize};

/// Modules importable when a config does not say otherwise
pub const DEFAULT_MODULES: [&str; 4] = ["math", "random", "string", "statistics"];

/// Limits and allow-lists applied to every script execution.
///
/// The policy is read once at process start and shipped with every request
/// to the workers, so each execution sees exactly the same capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// Module names scripts may import
    #[serde(default = "default_modules")]
    pub allowed_modules: Vec<String>,

    /// Maximum captured output in bytes
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    /// Maximum call depth
    #[serde(default = "default_max_recursion")]
    pub max_recursion: u32,

    /// Maximum length of any sequence a script materialises
    #[serde(default = "default_max_sequence")]
    pub max_sequence: usize,
}

impl SandboxPolicy {
    /// Check whether a module (or a dotted submodule of it) is allow-listed
    pub fn allows_module(&self, name: &str) -> bool {
        self.allowed_modules.iter().any(|allowed| allowed == name)
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output = bytes;
        self
    }

    pub fn with_max_recursion(mut self, depth: u32) -> Self {
        self.max_recursion = depth;
        self
    }

    pub fn with_max_sequence(mut self, len: usize) -> Self {
        self.max_sequence = len;
        self
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_modules: default_modules(),
            max_output: default_max_output(),
            max_recursion: default_max_recursion(),
            max_sequence: default_max_sequence(),
        }
    }
}

fn default_modules() -> Vec<String> {
    DEFAULT_MODULES.iter().map(|m| (*m).to_owned()).collect()
}

fn default_max_output() -> usize {
    64 * 1024
}

fn default_max_recursion() -> u32 {
    200
}

fn default_max_sequence() -> usize {
    1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_default_modules() {
        let policy = SandboxPolicy::default();
        for module in DEFAULT_MODULES {
            assert!(policy.allows_module(module));
        }
        assert!(!policy.allows_module("os"));
        assert!(!policy.allows_module("sys"));
    }

    #[test]
    fn with_modules_replaces_list() {
        let policy = SandboxPolicy::default().with_modules(["math"]);
        assert!(policy.allows_module("math"));
        assert!(!policy.allows_module("random"));
    }

    #[test]
    fn builder_sets_limits() {
        let policy = SandboxPolicy::default()
            .with_max_output(10)
            .with_max_recursion(5)
            .with_max_sequence(100);
        assert_eq!(policy.max_output, 10);
        assert_eq!(policy.max_recursion, 5);
        assert_eq!(policy.max_sequence, 100);
    }

    #[test]
    fn policy_roundtrips_through_json() {
        let policy = SandboxPolicy::default().with_modules(["math", "string"]);
        let json = serde_json::to_string(&policy).unwrap();
        let back: SandboxPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
