//! Keeps events raised by namespaced (containerized) processes: lines whose
//! pid and vpid fields end differently.
//!
//! The comparison runs on the raw field text, `name = ` prefix included, and
//! only looks at the trailing four characters.
use std::io::{self, Write};

use crate::engine::Pass;
use crate::record::{PID_INDEX, RecordError, VPID_INDEX, id_tail, raw_field, split_fields};

/// Whether a line belongs to a process whose pid and vpid differ.
pub fn is_namespaced(line: &str) -> Result<bool, RecordError> {
    let fields = split_fields(line);
    let vpid = raw_field(&fields, VPID_INDEX)?;
    let pid = raw_field(&fields, PID_INDEX)?;
    Ok(id_tail("pid", pid)? != id_tail("vpid", vpid)?)
}

#[derive(Debug, Default, Clone)]
pub struct NamespaceFilter {
    kept: Vec<String>,
}

impl NamespaceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kept(&self) -> &[String] {
        &self.kept
    }
}

impl Pass for NamespaceFilter {
    fn name(&self) -> &'static str {
        "namespace-filter"
    }

    fn observe(&mut self, line: &str) -> Result<(), RecordError> {
        if is_namespaced(line)? {
            self.kept.push(line.to_string());
        }
        Ok(())
    }

    fn emitted(&self) -> usize {
        self.kept.len()
    }

    fn write_output(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in &self.kept {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}
