//! Positional field access for event log lines.
//!
//! A line is a `", "` separated sequence of segments. The first three carry
//! the timestamp, host and event header; from index 3 onward each segment is a
//! `name = value` pair. [`EventRecord`] names the three segments the passes
//! care about (pid, vpid, mount) and reports a [`RecordError`] per field
//! instead of panicking on short lines.

/// Separator between fields on a single line.
pub const FIELD_SEPARATOR: &str = ", ";
/// Separator between a field's name and its value.
pub const VALUE_SEPARATOR: &str = "= ";

pub const PID_INDEX: usize = 3;
pub const VPID_INDEX: usize = 4;
pub const MOUNT_INDEX: usize = 5;

/// Number of trailing characters compared by the namespace filter.
pub const ID_TAIL_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("{name} field {field:?} has no \"= \" separator")]
    MissingSeparator { name: &'static str, field: String },
    #[error("{name} field {field:?} is shorter than {min} characters")]
    FieldTooShort {
        name: &'static str,
        field: String,
        min: usize,
    },
    #[error("no {name} attribute")]
    MissingAttribute { name: &'static str },
    #[error("{name} value {value:?} is not a number")]
    InvalidNumber { name: String, value: String },
}

/// Split a line into its raw fields.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split(FIELD_SEPARATOR).collect()
}

/// Fetch the raw text of field `index`, requiring at least `index + 1` fields.
pub fn raw_field<'a>(fields: &[&'a str], index: usize) -> Result<&'a str, RecordError> {
    fields
        .get(index)
        .copied()
        .ok_or(RecordError::TooFewFields {
            expected: index + 1,
            found: fields.len(),
        })
}

/// Value of a `name = value` field: the text between the first and second
/// `"= "`, matching how the log's values were historically cut.
pub fn field_value<'a>(name: &'static str, field: &'a str) -> Result<&'a str, RecordError> {
    field
        .split(VALUE_SEPARATOR)
        .nth(1)
        .ok_or_else(|| RecordError::MissingSeparator {
            name,
            field: field.to_string(),
        })
}

/// Last `ID_TAIL_LEN` characters of a field's raw text.
pub fn id_tail<'a>(name: &'static str, field: &'a str) -> Result<&'a str, RecordError> {
    let too_short = || RecordError::FieldTooShort {
        name,
        field: field.to_string(),
        min: ID_TAIL_LEN,
    };
    // char_indices keeps the cut on a UTF-8 boundary
    let (start, _) = field
        .char_indices()
        .rev()
        .nth(ID_TAIL_LEN - 1)
        .ok_or_else(too_short)?;
    Ok(&field[start..])
}

/// The pid/vpid/mount view of one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord<'a> {
    pub pid: &'a str,
    pub vpid: &'a str,
    pub mount: &'a str,
}

impl<'a> EventRecord<'a> {
    /// Parse the values of fields 3, 4 and 5. Needs at least six fields.
    pub fn parse(line: &'a str) -> Result<Self, RecordError> {
        let fields = split_fields(line);
        if fields.len() <= MOUNT_INDEX {
            return Err(RecordError::TooFewFields {
                expected: MOUNT_INDEX + 1,
                found: fields.len(),
            });
        }
        Ok(Self {
            pid: field_value("pid", fields[PID_INDEX])?,
            vpid: field_value("vpid", fields[VPID_INDEX])?,
            mount: field_value("mount", fields[MOUNT_INDEX])?,
        })
    }
}
