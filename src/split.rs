//! Splits a raw event log into one file per syscall category.
//!
//! The event name is the identifier directly before `": {"` (for example
//! `syscall_entry_openat`). It is mapped to the first entry of [`CATEGORIES`]
//! it contains, so `umount` wins over `mount` and `execve` over `exec`.
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::NamedTempFile;

use crate::io::staged_file;

pub const DEFAULT_PREFIX: &str = "filtered";

/// Category names in match priority order.
pub const CATEGORIES: [&str; 19] = [
    "chdir",
    "chroot",
    "pivot_root",
    "setns",
    "fork",
    "execve",
    "exec",
    "mkdir",
    "umount",
    "mount",
    "connect",
    "read",
    "write",
    "open",
    "close",
    "accept",
    "socket",
    "bind",
    "listen",
];

fn event_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)([A-Za-z_][A-Za-z0-9_]*):\s*\{").expect("valid event name regex")
    })
}

/// Event name of a log line, if it has one.
pub fn event_name(line: &str) -> Option<&str> {
    event_name_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// First category contained in `event`.
pub fn categorize(event: &str) -> Option<&'static str> {
    CATEGORIES.iter().copied().find(|c| event.contains(c))
}

/// Streams lines into one staged file per category. Nothing is visible under
/// the final names until [`SyscallSplit::finish`] persists every category.
#[derive(Debug)]
pub struct SyscallSplit {
    dir: PathBuf,
    prefix: String,
    writers: BTreeMap<&'static str, (BufWriter<NamedTempFile>, usize)>,
    pub skipped: usize,
}

impl SyscallSplit {
    /// Prepare a split writing `<dir>/<prefix>-<category>.out` files.
    pub fn create(dir: impl AsRef<Path>, prefix: &str) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            writers: BTreeMap::new(),
            skipped: 0,
        })
    }

    pub fn observe(&mut self, line: &str) -> io::Result<()> {
        let Some(category) = event_name(line).and_then(categorize) else {
            self.skipped += 1;
            return Ok(());
        };
        let (w, count) = match self.writers.entry(category) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let file = staged_file(&self.dir)?;
                e.insert((BufWriter::new(file), 0))
            }
        };
        writeln!(w, "{}", line)?;
        *count += 1;
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.writers.values().map(|(_, n)| n).sum()
    }

    /// Output path for one category.
    pub fn path_for(dir: &Path, prefix: &str, category: &str) -> PathBuf {
        dir.join(format!("{}-{}.out", prefix, category))
    }

    /// Flush every category, then move them all to their final names.
    /// Returns the written paths in category order.
    pub fn finish(self) -> io::Result<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(self.writers.len());
        for (category, (w, count)) in self.writers {
            let file = w.into_inner().map_err(|e| e.into_error())?;
            staged.push((Self::path_for(&self.dir, &self.prefix, category), file, count));
        }
        let mut written = Vec::with_capacity(staged.len());
        for (path, file, count) in staged {
            file.persist(&path).map_err(|e| e.error)?;
            log::debug!("wrote {} lines to {}", count, path.display());
            written.push(path);
        }
        Ok(written)
    }
}
