//! Line writer with a selectable terminator.

use std::io::Write;

use crate::{LineEnding, TextError};

/// Writes lines to any [`Write`], appending a configured terminator.
#[derive(Debug)]
pub struct TextWriter<W> {
    inner: W,
    line_ending: LineEnding,
}

impl<W: Write> TextWriter<W> {
    /// Creates a writer that ends lines the native way.
    pub fn new(inner: W) -> Self {
        Self::with_line_ending(inner, LineEnding::Native)
    }

    pub fn with_line_ending(inner: W, line_ending: LineEnding) -> Self {
        Self { inner, line_ending }
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn set_line_ending(&mut self, line_ending: LineEnding) {
        self.line_ending = line_ending;
    }

    /// Writes `line` followed by the configured terminator.
    pub fn write_line(&mut self, line: &[u8]) -> Result<(), TextError> {
        self.write_line_with(line, self.line_ending)
    }

    /// Writes `line` followed by the terminator for `line_ending`.
    pub fn write_line_with(&mut self, line: &[u8], line_ending: LineEnding) -> Result<(), TextError> {
        self.inner.write_all(line)?;
        self.inner.write_all(line_ending.as_bytes())?;
        Ok(())
    }

    /// Writes `text` as is, with no terminator.
    pub fn write_string(&mut self, text: &[u8]) -> Result<(), TextError> {
        self.inner.write_all(text)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TextError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_uses_configured_ending() {
        let mut w = TextWriter::with_line_ending(Vec::new(), LineEnding::CrLf);
        w.write_line(b"a").unwrap();
        w.set_line_ending(LineEnding::Cr);
        w.write_line(b"b").unwrap();
        assert_eq!(w.into_inner(), b"a\r\nb\r");
    }

    #[test]
    fn test_write_line_with_overrides_for_one_line() {
        let mut w = TextWriter::with_line_ending(Vec::new(), LineEnding::Lf);
        w.write_line_with(b"raw\r\n", LineEnding::Supplied).unwrap();
        w.write_line(b"next").unwrap();
        assert_eq!(w.get_ref().as_slice(), b"raw\r\nnext\n");
    }

    #[test]
    fn test_write_string_adds_no_terminator() {
        let mut w = TextWriter::new(Vec::new());
        w.write_string(b"abc").unwrap();
        w.flush().unwrap();
        assert_eq!(w.into_inner(), b"abc");
    }

    #[test]
    fn test_native_default() {
        let mut w = TextWriter::new(Vec::new());
        w.write_line(b"x").unwrap();
        let expected: &[u8] = if cfg!(windows) { b"x\r\n" } else { b"x\n" };
        assert_eq!(w.into_inner(), expected);
    }
}
