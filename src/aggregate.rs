//! Collects the distinct pid, vpid and mount values seen in a set of events.
//!
//! Values are kept in sorted sets so the rendered summary is reproducible
//! regardless of input order or duplicated lines.
use std::collections::BTreeSet;
use std::io::{self, Write};

use crate::engine::Pass;
use crate::record::{EventRecord, RecordError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountSummary {
    pub pids: BTreeSet<String>,
    pub vpids: BTreeSet<String>,
    pub mounts: BTreeSet<String>,
}

impl MountSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: &EventRecord<'_>) {
        if !self.pids.contains(record.pid) {
            self.pids.insert(record.pid.to_string());
        }
        if !self.vpids.contains(record.vpid) {
            self.vpids.insert(record.vpid.to_string());
        }
        if !self.mounts.contains(record.mount) {
            self.mounts.insert(record.mount.to_string());
        }
    }

    /// `(label, values)` in output order.
    pub fn sections(&self) -> [(&'static str, &BTreeSet<String>); 3] {
        [
            ("pids", &self.pids),
            ("vpids", &self.vpids),
            ("mounts", &self.mounts),
        ]
    }

    /// The three summary lines, e.g. `pids: 0001 0002`.
    pub fn render_lines(&self) -> Vec<String> {
        self.sections()
            .iter()
            .map(|(label, values)| {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{}: {}", label, joined.join(" "))
            })
            .collect()
    }
}

impl Pass for MountSummary {
    fn name(&self) -> &'static str {
        "mount-aggregator"
    }

    fn observe(&mut self, line: &str) -> Result<(), RecordError> {
        let record = EventRecord::parse(line)?;
        self.insert(&record);
        Ok(())
    }

    fn emitted(&self) -> usize {
        self.pids.len() + self.vpids.len() + self.mounts.len()
    }

    fn write_output(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in self.render_lines() {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}
