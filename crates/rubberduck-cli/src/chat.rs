//! Chat message handling
//!
//! Turns chat messages into script source and results into reply text.

use rubberduck::{ExecutionResult, TimedResult};

const FENCE: &str = "```";

/// Collects messages from a line-oriented transcript.
///
/// A message starts on a line beginning with the prefix. If it opens a code
/// fence it continues until the fence is closed; otherwise it is that one line.
#[derive(Debug)]
pub struct MessageReader {
    prefix: String,
    pending: Option<String>,
}

impl MessageReader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pending: None,
        }
    }

    /// Feed one line; returns the message body once a message is complete
    pub fn push(&mut self, line: &str) -> Option<String> {
        if let Some(mut pending) = self.pending.take() {
            pending.push('\n');
            pending.push_str(line);
            if line.contains(FENCE) {
                return Some(pending);
            }
            self.pending = Some(pending);
            return None;
        }

        let body = line.strip_prefix(self.prefix.as_str())?.trim_start();
        if body.matches(FENCE).count() % 2 == 1 {
            self.pending = Some(body.to_owned());
            return None;
        }
        Some(body.to_owned())
    }

    /// A message still open when the input ends
    pub fn finish(self) -> Option<String> {
        self.pending
    }
}

/// Strip code fence markers (and a language tag) from a message body
pub fn extract_code(message: &str) -> String {
    let text = message.trim();

    if let Some(fenced) = text.strip_prefix(FENCE) {
        let body = fenced.strip_suffix(FENCE).unwrap_or(fenced);
        let body = match body.split_once('\n') {
            Some((tag, rest)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest,
            _ => body,
        };
        return body.trim_matches('\n').to_owned();
    }

    text.trim_matches('`').to_owned()
}

/// Reply text for a result
pub fn render(timed: &TimedResult) -> String {
    let body = match &timed.result {
        ExecutionResult::Success(output) if output.trim().is_empty() => "(no output)".to_owned(),
        ExecutionResult::Success(output) => output.trim_end().to_owned(),
        other => other.describe(),
    };
    format!(
        "{body}\n[{}] finished in {:.3}s",
        timed.status(),
        timed.elapsed.as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn single_line_messages() {
        let mut reader = MessageReader::new(">>");
        assert_eq!(reader.push(">> print(1)"), Some("print(1)".to_owned()));
        assert_eq!(reader.push("just chatting"), None);
        assert_eq!(reader.push(">>print(2)"), Some("print(2)".to_owned()));
    }

    #[test]
    fn fenced_messages_span_lines() {
        let mut reader = MessageReader::new(">>");
        assert_eq!(reader.push(">> ```py"), None);
        assert_eq!(reader.push("for i in range(2):"), None);
        assert_eq!(reader.push("    print(i)"), None);
        assert_eq!(
            reader.push("```"),
            Some("```py\nfor i in range(2):\n    print(i)\n```".to_owned())
        );
        assert!(reader.finish().is_none());
    }

    #[test]
    fn unterminated_fence_is_flushed() {
        let mut reader = MessageReader::new(">>");
        reader.push(">> ```");
        reader.push("print(1)");
        assert_eq!(reader.finish(), Some("```\nprint(1)".to_owned()));
    }

    #[test]
    fn extract_plain_and_inline() {
        assert_eq!(extract_code("print(2 + 2)"), "print(2 + 2)");
        assert_eq!(extract_code("`print(1)`"), "print(1)");
        assert_eq!(extract_code("```print(1)```"), "print(1)");
    }

    #[test]
    fn extract_fenced_block_keeps_indentation() {
        let message = "```python\nfor i in range(2):\n    print(i)\n```";
        assert_eq!(extract_code(message), "for i in range(2):\n    print(i)");

        let message = "```\nprint(1)\n```";
        assert_eq!(extract_code(message), "print(1)");
    }

    #[test]
    fn render_substitutes_empty_output() {
        let timed = TimedResult {
            result: ExecutionResult::Success(String::new()),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(render(&timed), "(no output)\n[OK] finished in 1.500s");
    }

    #[test]
    fn render_describes_failures() {
        let timed = TimedResult {
            result: ExecutionResult::Timeout,
            elapsed: Duration::from_secs(10),
        };
        let text = render(&timed);
        assert!(text.starts_with("Timeout error - do you have an infinite loop?"));
        assert!(text.contains("[TO]"));
    }
}
