//! Keeps the log lines that mention a given path, by default `etc/passwd`.
use std::io::{self, Write};

use crate::engine::Pass;
use crate::record::RecordError;

pub const DEFAULT_NEEDLE: &str = "etc/passwd";

#[derive(Debug, Clone)]
pub struct PathFilter {
    needle: String,
    kept: Vec<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NEEDLE)
    }
}

impl PathFilter {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            kept: Vec::new(),
        }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, line: &str) -> bool {
        line.contains(self.needle.as_str())
    }

    /// Matching lines in input order.
    pub fn kept(&self) -> &[String] {
        &self.kept
    }
}

impl Pass for PathFilter {
    fn name(&self) -> &'static str {
        "passwd-filter"
    }

    fn observe(&mut self, line: &str) -> Result<(), RecordError> {
        if self.matches(line) {
            log::trace!("keep: {}", line);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_on_str;

    #[test]
    fn keeps_matching_lines_in_order_without_dedup() {
        let input = "open /etc/passwd\nopen /etc/shadow\nread etc/passwd\nopen /etc/passwd\n";
        let out = run_on_str(PathFilter::default(), input).unwrap();
        assert_eq!(out, "open /etc/passwd\nread etc/passwd\nopen /etc/passwd\n");
    }

    #[test]
    fn filtering_twice_is_stable() {
        let input = "x etc/passwd 1\ny\nz etc/passwd 2\n";
        let once = run_on_str(PathFilter::default(), input).unwrap();
        let twice = run_on_str(PathFilter::default(), &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn custom_needle_and_empty_result() {
        let f = PathFilter::new("/proc/self");
        assert_eq!(f.needle(), "/proc/self");
        let out = run_on_str(f, "open /etc/passwd\n").unwrap();
        assert_eq!(out, "");
        assert_eq!(run_on_str(PathFilter::default(), "").unwrap(), "");
    }
}
