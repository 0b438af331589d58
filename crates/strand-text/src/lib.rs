//! Text line I/O for Strand.
//!
//! Peers don't agree on how lines end. [`TextReader`] accepts LF, CRLF,
//! and bare CR in the same stream and reports which conventions it has
//! seen; [`TextWriter`] ends lines with whichever convention the caller
//! picks, typically the one the reader detected:
//!
//! ```rust
//! use strand_text::{DetectedLineEndings, TextReader, TextWriter};
//!
//! let mut reader = TextReader::new(&b"HELO\r\nQUIT\r\n"[..]);
//! assert_eq!(reader.read_line(false).unwrap(), b"HELO");
//! assert_eq!(reader.detected_line_endings(), DetectedLineEndings::CrLf);
//!
//! let mut writer = TextWriter::with_line_ending(Vec::new(), reader.line_endings_for_write());
//! writer.write_line(b"250 OK").unwrap();
//! assert_eq!(writer.into_inner(), b"250 OK\r\n");
//! ```

mod error;
mod line_ending;
mod reader;
mod writer;

pub use error::TextError;
pub use line_ending::{DetectedLineEndings, LineEnding};
pub use reader::TextReader;
pub use writer::TextWriter;
