use crate::sandbox::exception::{Exception, memory_error};

/// Collects everything a script prints.
///
/// Fragments are only ever appended; [`OutputCapture::finish`] consumes the
/// capture, so nothing can be added once execution has ended.
#[derive(Debug)]
pub struct OutputCapture {
    fragments: Vec<String>,
    bytes: usize,
    limit: usize,
}

impl OutputCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            fragments: Vec::new(),
            bytes: 0,
            limit,
        }
    }

    pub fn write(&mut self, text: impl Into<String>) -> Result<(), Exception> {
        let text = text.into();
        if self.bytes + text.len() > self.limit {
            return Err(memory_error("output limit exceeded"));
        }
        self.bytes += text.len();
        self.fragments.push(text);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn finish(self) -> String {
        self.fragments.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::exception::ExcKind;

    #[test]
    fn appends_in_order() {
        let mut out = OutputCapture::new(100);
        out.write("a").unwrap();
        out.write(String::from("b\n")).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.finish(), "ab\n");
    }

    #[test]
    fn limit_is_enforced() {
        let mut out = OutputCapture::new(4);
        out.write("abcd").unwrap();
        let err = out.write("e").unwrap_err();
        assert_eq!(err.kind, ExcKind::MemoryError);
        assert_eq!(err.message, "output limit exceeded");
        assert_eq!(out.finish(), "abcd");
    }
}
