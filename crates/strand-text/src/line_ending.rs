//! Line terminator conventions.

/// What a [`TextReader`](crate::TextReader) has observed so far.
///
/// Starts at `Unknown`, moves to the kind of the first terminator seen,
/// and becomes `Mixed` the first time a different kind shows up. `Mixed`
/// never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectedLineEndings {
    #[default]
    Unknown,
    Lf,
    CrLf,
    Cr,
    Mixed,
}

impl DetectedLineEndings {
    /// Folds one more observed terminator into the detection.
    pub(crate) fn observe(self, seen: DetectedLineEndings) -> Self {
        match self {
            Self::Unknown => seen,
            Self::Mixed => Self::Mixed,
            current if current == seen => current,
            _ => Self::Mixed,
        }
    }
}

/// Terminator appended by [`TextWriter`](crate::TextWriter) after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
    /// The platform convention: CRLF on Windows, LF elsewhere.
    #[default]
    Native,
    /// The caller already put a terminator in the line; nothing is appended.
    Supplied,
}

impl LineEnding {
    /// The bytes written after a line.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
            Self::Cr => b"\r",
            Self::Native if cfg!(windows) => b"\r\n",
            Self::Native => b"\n",
            Self::Supplied => b"",
        }
    }
}

impl From<DetectedLineEndings> for LineEnding {
    /// Picks the convention to answer a peer in. Without a single clear
    /// convention, falls back to native.
    fn from(detected: DetectedLineEndings) -> Self {
        match detected {
            DetectedLineEndings::Lf => Self::Lf,
            DetectedLineEndings::CrLf => Self::CrLf,
            DetectedLineEndings::Cr => Self::Cr,
            DetectedLineEndings::Unknown | DetectedLineEndings::Mixed => Self::Native,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_sticks_on_mixed() {
        let d = DetectedLineEndings::Unknown
            .observe(DetectedLineEndings::Lf)
            .observe(DetectedLineEndings::Lf);
        assert_eq!(d, DetectedLineEndings::Lf);

        let d = d.observe(DetectedLineEndings::Cr);
        assert_eq!(d, DetectedLineEndings::Mixed);
        assert_eq!(d.observe(DetectedLineEndings::Lf), DetectedLineEndings::Mixed);
    }

    #[test]
    fn test_detected_maps_to_write_kind() {
        assert_eq!(LineEnding::from(DetectedLineEndings::CrLf), LineEnding::CrLf);
        assert_eq!(LineEnding::from(DetectedLineEndings::Mixed), LineEnding::Native);
        assert_eq!(LineEnding::from(DetectedLineEndings::Unknown), LineEnding::Native);
    }

    #[test]
    fn test_supplied_appends_nothing() {
        assert!(LineEnding::Supplied.as_bytes().is_empty());
        assert_eq!(LineEnding::CrLf.as_bytes(), b"\r\n");
    }
}
