use std::io;
use std::path::PathBuf;

use crate::record::RecordError;

/// Failure of a single pass. Every variant aborts the pass and leaves the
/// previous output (if any) untouched.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("input file not found: {}", .path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed line {line_no} in {}: {reason}: {line:?}", .path.display())]
    MalformedLine {
        path: PathBuf,
        line_no: usize,
        line: String,
        #[source]
        reason: RecordError,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PassError {
    /// Process exit status used by the CLI for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PassError::MissingFile { .. } => 2,
            PassError::Read { .. } | PassError::MalformedLine { .. } => 3,
            PassError::Write { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_line_message_has_location_and_content() {
        let e = PassError::MalformedLine {
            path: PathBuf::from("total_pwds.txt"),
            line_no: 7,
            line: "a, b".to_string(),
            reason: RecordError::TooFewFields {
                expected: 6,
                found: 2,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("total_pwds.txt"));
        assert!(msg.contains("\"a, b\""));
        assert!(msg.contains("expected at least 6 fields, found 2"));
        assert_eq!(e.exit_code(), 3);
    }
}
