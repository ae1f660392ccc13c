//! Engine: drives passes over input lines and writes their output.
//!
//! Each pass is a single sequential scan. The engine numbers lines, turns
//! field errors into [`PassError::MalformedLine`] (blank lines included) and
//! only writes output once the whole input has been consumed, through a
//! temporary file that is renamed into place.
//!
//! Typical usage:
//!
//! ```no_run
//! use eventsift::{engine::Engine, passwd::PathFilter};
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = Engine::new();
//! engine.run_file(&mut PathFilter::default(), "result.out", "total_pwds.txt")?;
//! println!("{}", eventsift::report::render_summary(&engine));
//! # Ok(())
//! # }
//! ```
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::PassError;
use crate::io::{DEFAULT_MMAP_THRESHOLD_BYTES, iter_lines_auto, write_atomic};
use crate::record::RecordError;
use crate::split::SyscallSplit;

/// A filter or aggregation applied line by line.
pub trait Pass {
    /// Short name used in logs and the summary.
    fn name(&self) -> &'static str;
    /// Consume one input line, trailing whitespace removed.
    fn observe(&mut self, line: &str) -> Result<(), RecordError>;
    /// Number of lines (or values, for aggregates) the pass will emit.
    fn emitted(&self) -> usize;
    /// Write the pass result once all input has been observed.
    fn write_output(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Outcome of one pass run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub pass: &'static str,
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub lines_read: usize,
    pub emitted: usize,
}

/// Runs passes and remembers their stats for reporting.
#[derive(Debug)]
pub struct Engine {
    pub mmap_threshold: u64,
    pub stats: Vec<PassStats>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_MMAP_THRESHOLD_BYTES)
    }

    pub fn with_threshold(mmap_threshold: u64) -> Self {
        Self {
            mmap_threshold,
            stats: Vec::new(),
        }
    }

    /// Run `pass` over the file at `input` and write its result to `output`.
    pub fn run_file<P: Pass>(
        &mut self,
        pass: &mut P,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<PassStats, PassError> {
        self.run_file_with(pass, input, output, |_| Ok(Vec::new()))
    }

    /// Like [`Engine::run_file`], but calls `extra` with the finished pass
    /// before `output` is written. Paths returned by `extra` are recorded as
    /// additional outputs; if it fails, `output` is left untouched.
    pub fn run_file_with<P, F>(
        &mut self,
        pass: &mut P,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        extra: F,
    ) -> Result<PassStats, PassError>
    where
        P: Pass,
        F: FnOnce(&P) -> Result<Vec<PathBuf>, PassError>,
    {
        let (input, output) = (input.as_ref(), output.as_ref());
        log::info!(
            "{}: {} -> {}",
            pass.name(),
            input.display(),
            output.display()
        );
        let lines = self.open(input)?;
        let lines_read = drive(input, lines, |line| pass.observe(line))?;
        let extra_outputs = extra(pass)?;
        write_atomic(output, |w| pass.write_output(w)).map_err(|source| PassError::Write {
            path: output.to_path_buf(),
            source,
        })?;
        let mut outputs = vec![output.to_path_buf()];
        outputs.extend(extra_outputs);
        let stats = PassStats {
            pass: pass.name(),
            input: input.to_path_buf(),
            outputs,
            lines_read,
            emitted: pass.emitted(),
        };
        log::info!(
            "{}: read {} lines, emitted {}",
            stats.pass,
            stats.lines_read,
            stats.emitted
        );
        self.stats.push(stats.clone());
        Ok(stats)
    }

    /// Split the file at `input` into per-category files under `dir`.
    /// Category files only appear once the whole input has been read.
    pub fn run_split(
        &mut self,
        input: impl AsRef<Path>,
        dir: impl AsRef<Path>,
        prefix: &str,
    ) -> Result<PassStats, PassError> {
        let (input, dir) = (input.as_ref(), dir.as_ref());
        log::info!("syscall-split: {} -> {}", input.display(), dir.display());
        let write_err = |source: io::Error| PassError::Write {
            path: dir.to_path_buf(),
            source,
        };
        let lines = self.open(input)?;
        let mut split = SyscallSplit::create(dir, prefix).map_err(write_err)?;
        let mut lines_read = 0;
        for line in lines {
            let line = line.map_err(|source| PassError::Read {
                path: input.to_path_buf(),
                source,
            })?;
            lines_read += 1;
            split.observe(&line).map_err(write_err)?;
        }
        if split.skipped > 0 {
            log::debug!(
                "syscall-split: {} lines had no known category",
                split.skipped
            );
        }
        let emitted = split.total();
        let outputs = split.finish().map_err(write_err)?;
        let stats = PassStats {
            pass: "syscall-split",
            input: input.to_path_buf(),
            outputs,
            lines_read,
            emitted,
        };
        self.stats.push(stats.clone());
        Ok(stats)
    }

    fn open(&self, input: &Path) -> Result<crate::io::LineIter, PassError> {
        if !input.exists() {
            return Err(PassError::MissingFile {
                path: input.to_path_buf(),
            });
        }
        iter_lines_auto(input, self.mmap_threshold).map_err(|source| PassError::Read {
            path: input.to_path_buf(),
            source,
        })
    }
}

/// Feed every line to `observe`, numbering lines from 1. Returns the number
/// of lines read.
fn drive<I, F>(source: &Path, lines: I, mut observe: F) -> Result<usize, PassError>
where
    I: IntoIterator<Item = io::Result<String>>,
    F: FnMut(&str) -> Result<(), RecordError>,
{
    let mut count = 0;
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.map_err(|err| PassError::Read {
            path: source.to_path_buf(),
            source: err,
        })?;
        count = idx + 1;
        observe(&line).map_err(|reason| PassError::MalformedLine {
            path: source.to_path_buf(),
            line_no: count,
            line: line.clone(),
            reason,
        })?;
    }
    Ok(count)
}

/// Run `pass` over in-memory `contents` and return what it would have written.
pub fn run_on_str<P: Pass>(mut pass: P, contents: &str) -> Result<String, PassError> {
    let source = Path::new("<memory>");
    let lines = contents.lines().map(|l| Ok(l.trim_end().to_string()));
    drive(source, lines, |line| pass.observe(line))?;
    let mut out = Vec::new();
    pass.write_output(&mut out)
        .map_err(|err| PassError::Write {
            path: source.to_path_buf(),
            source: err,
        })?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
