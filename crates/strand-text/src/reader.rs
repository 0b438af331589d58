//! Line reader that understands LF, CRLF, and bare CR terminators.
//!
//! Bytes are consumed one at a time through a small state machine. A CR
//! can't be classified until the byte after it has been seen: if that
//! byte is LF the pair is one CRLF terminator, otherwise the CR ended the
//! line on its own and the extra byte already belongs to the next line.
//! That byte is kept in a one-byte pending slot and handed out before the
//! underlying reader is touched again.

use std::io::{ErrorKind, Read};

use crate::{DetectedLineEndings, LineEnding, TextError};

const LF: u8 = b'\n';
const CR: u8 = b'\r';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Ready,
    GotCr,
}

/// Reads lines from any [`Read`], tracking the terminator convention.
///
/// The reader pulls single bytes from `inner`. Wrap unbuffered sources
/// such as a socket stream in a [`BufReader`](std::io::BufReader) if
/// throughput matters.
#[derive(Debug)]
pub struct TextReader<R> {
    inner: R,
    pending: Option<u8>,
    state: ReadState,
    detected: DetectedLineEndings,
    /// The previous line was ended by a CR at end of stream. Its detection
    /// is applied when the next call starts.
    cr_at_eof: bool,
}

impl<R: Read> TextReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: None,
            state: ReadState::Ready,
            detected: DetectedLineEndings::Unknown,
            cr_at_eof: false,
        }
    }

    /// Reads the next line.
    ///
    /// With `include_terminator` the returned bytes end with the line's
    /// terminator exactly as it appeared in the input. A final line without
    /// a terminator is returned as is.
    ///
    /// # Errors
    /// [`TextError::Eof`] if the stream is exhausted before any byte of a
    /// new line; [`TextError::Io`] if the underlying reader fails.
    pub fn read_line(&mut self, include_terminator: bool) -> Result<Vec<u8>, TextError> {
        if std::mem::take(&mut self.cr_at_eof) {
            self.observe(DetectedLineEndings::Cr);
        }

        let mut line = Vec::new();
        let mut consumed = 0usize;
        self.state = ReadState::Ready;

        loop {
            let Some(byte) = self.next_byte()? else {
                if self.state == ReadState::GotCr {
                    if include_terminator {
                        line.push(CR);
                    }
                    self.state = ReadState::Ready;
                    self.cr_at_eof = true;
                    return Ok(line);
                }
                if consumed == 0 {
                    return Err(TextError::Eof);
                }
                return Ok(line);
            };
            consumed += 1;

            match (self.state, byte) {
                (ReadState::Ready, LF) => {
                    if include_terminator {
                        line.push(LF);
                    }
                    self.observe(DetectedLineEndings::Lf);
                    return Ok(line);
                }
                (ReadState::Ready, CR) => self.state = ReadState::GotCr,
                (ReadState::Ready, other) => line.push(other),
                (ReadState::GotCr, LF) => {
                    if include_terminator {
                        line.extend_from_slice(&[CR, LF]);
                    }
                    self.state = ReadState::Ready;
                    self.observe(DetectedLineEndings::CrLf);
                    return Ok(line);
                }
                (ReadState::GotCr, other) => {
                    if include_terminator {
                        line.push(CR);
                    }
                    self.pending = Some(other);
                    self.state = ReadState::Ready;
                    self.observe(DetectedLineEndings::Cr);
                    return Ok(line);
                }
            }
        }
    }

    /// Reads one raw byte, honoring the pending slot.
    ///
    /// # Errors
    /// [`TextError::Eof`] at end of stream.
    pub fn read_character(&mut self) -> Result<u8, TextError> {
        self.next_byte()?.ok_or(TextError::Eof)
    }

    /// The terminator convention observed so far.
    pub fn detected_line_endings(&self) -> DetectedLineEndings {
        self.detected
    }

    /// The terminator to use when answering whoever wrote this input.
    pub fn line_endings_for_write(&self) -> LineEnding {
        LineEnding::from(self.detected)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Returns the inner reader. A byte still in the pending slot is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn observe(&mut self, seen: DetectedLineEndings) {
        let before = self.detected;
        self.detected = before.observe(seen);
        if before != self.detected && self.detected == DetectedLineEndings::Mixed {
            tracing::debug!(previous = ?before, seen = ?seen, "line endings are mixed");
        }
    }

    /// The pending byte if there is one, otherwise the next byte of
    /// `inner`. `None` at end of stream.
    fn next_byte(&mut self) -> Result<Option<u8>, TextError> {
        if let Some(byte) = self.pending.take() {
            return Ok(Some(byte));
        }

        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TextError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &[u8]) -> TextReader<&[u8]> {
        TextReader::new(input)
    }

    #[test]
    fn test_mixed_line_endings() {
        let mut r = reader(b"a\nb\r\nc\rd");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Unknown);

        assert_eq!(r.read_line(false).unwrap(), b"a");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Lf);

        assert_eq!(r.read_line(false).unwrap(), b"b");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Mixed);

        assert_eq!(r.read_line(false).unwrap(), b"c");
        assert_eq!(r.read_line(false).unwrap(), b"d");
        assert!(r.read_line(false).unwrap_err().is_eof());
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Mixed);
    }

    #[test]
    fn test_empty_line() {
        let mut r = reader(b"\n");
        assert_eq!(r.read_line(false).unwrap(), b"");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Lf);
        assert!(r.read_line(false).unwrap_err().is_eof());
    }

    #[test]
    fn test_final_line_without_terminator_returned_once() {
        let mut r = reader(b"one\ntwo");
        assert_eq!(r.read_line(true).unwrap(), b"one\n");
        assert_eq!(r.read_line(true).unwrap(), b"two");
        assert!(matches!(r.read_line(true), Err(TextError::Eof)));
    }

    #[test]
    fn test_pending_byte_starts_next_line() {
        let mut r = reader(b"x\ryz\n");
        assert_eq!(r.read_line(true).unwrap(), b"x\r");
        assert_eq!(r.read_line(true).unwrap(), b"yz\n");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Mixed);
    }

    #[test]
    fn test_pending_byte_can_be_a_terminator() {
        let mut r = reader(b"a\r\rb");
        assert_eq!(r.read_line(false).unwrap(), b"a");
        assert_eq!(r.read_line(false).unwrap(), b"");
        assert_eq!(r.read_line(false).unwrap(), b"b");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Cr);
    }

    #[test]
    fn test_cr_at_eof_is_detected_on_next_call() {
        let mut r = reader(b"last\r");
        assert_eq!(r.read_line(true).unwrap(), b"last\r");
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Unknown);

        assert!(r.read_line(true).unwrap_err().is_eof());
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Cr);
    }

    #[test]
    fn test_only_crlf_detected_as_crlf() {
        let mut r = reader(b"a\r\nb\r\n");
        r.read_line(false).unwrap();
        r.read_line(false).unwrap();
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::CrLf);
        assert_eq!(r.line_endings_for_write(), LineEnding::CrLf);
    }

    #[test]
    fn test_read_character_consumes_pending_first() {
        let mut r = reader(b"a\rbc");
        r.read_line(false).unwrap();
        assert_eq!(r.read_character().unwrap(), b'b');
        assert_eq!(r.read_character().unwrap(), b'c');
        assert!(r.read_character().unwrap_err().is_eof());
    }

    #[test]
    fn test_empty_input_is_eof() {
        let mut r = reader(b"");
        assert!(r.read_line(false).unwrap_err().is_eof());
        assert_eq!(r.detected_line_endings(), DetectedLineEndings::Unknown);
    }

    #[test]
    fn test_io_error_is_surfaced() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::ConnectionReset))
            }
        }
        let mut r = TextReader::new(Failing);
        assert!(matches!(r.read_line(false), Err(TextError::Io(_))));
    }
}
