//! Line readers and atomic output for pass files.
//!
//! Inputs are read either through a buffered reader or, for files at or above
//! a size threshold, through a memory map scanned with `memchr`. Outputs are
//! staged in a temporary file next to the destination and renamed into place
//! only once fully written.
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use tempfile::{Builder, NamedTempFile};

/// Threshold in bytes above which we attempt to use mmap for reading.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

pub type LineIter = Box<dyn Iterator<Item = io::Result<String>> + Send + 'static>;

/// Decide whether to use mmap based on file size and threshold.
pub fn should_use_mmap(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes >= threshold_bytes
}

/// Iterate lines from a file path using buffered reader (non-mmap).
pub fn iter_lines_bufread<P: AsRef<Path>>(path: P) -> io::Result<LineIter> {
    let file = File::open(path)?;
    let lines = BufReader::new(file)
        .lines()
        .map(|l| l.map(|s| s.trim_end().to_string()));
    Ok(Box::new(lines))
}

/// Iterate lines from a file path using mmap.
pub fn iter_lines_mmap<P: AsRef<Path>>(path: P) -> io::Result<LineIter> {
    let file = File::open(path)?;
    // SAFETY: the map is read-only and lives only for the duration of one scan.
    let mmap = unsafe { Mmap::map(&file) }?;
    Ok(Box::new(MmapLines { mmap, pos: 0 }))
}

struct MmapLines {
    mmap: Mmap,
    pos: usize,
}

impl Iterator for MmapLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        let data: &[u8] = &self.mmap;
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        if let Some(off) = memchr::memchr(b'\n', &data[self.pos..]) {
            let end = self.pos + off;
            self.pos = end + 1;
            Some(line_from_bytes(&data[start..end]))
        } else {
            // Last line without trailing newline
            self.pos = data.len();
            Some(line_from_bytes(&data[start..]))
        }
    }
}

fn line_from_bytes(bytes: &[u8]) -> io::Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.trim_end().to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Choose mmap or bufread and return an iterator over lines with trailing
/// whitespace removed.
pub fn iter_lines_auto<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> io::Result<LineIter> {
    let meta = std::fs::metadata(&path)?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        iter_lines_mmap(path)
    } else {
        iter_lines_bufread(path)
    }
}

/// Create a temporary file in `dir` that can later be persisted over an
/// output path. It is created with the mode a plain `File::create` would get
/// (0666 masked by the process umask) rather than tempfile's owner-only 0600.
pub fn staged_file(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".eventsift-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Directory a file at `path` lives in, `.` for bare file names.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Write `path` through `write`, replacing any existing file only after
/// `write` succeeds. On error the destination is left as it was.
pub fn write_atomic<P, F>(path: P, write: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let path = path.as_ref();
    let mut tmp = staged_file(parent_dir(path))?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        write(&mut w)?;
        w.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn collect(iter: LineIter) -> Vec<String> {
        iter.map(|l| l.unwrap()).collect()
    }

    #[test]
    fn bufread_and_mmap_agree() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("log.out");
        std::fs::write(&p, "first  \r\nsecond\n\nlast").unwrap();
        let buffered = collect(iter_lines_auto(&p, u64::MAX).unwrap());
        let mapped = collect(iter_lines_auto(&p, 1).unwrap());
        assert_eq!(buffered, vec!["first", "second", "", "last"]);
        assert_eq!(buffered, mapped);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(should_use_mmap(10, 10));
        assert!(!should_use_mmap(9, 10));
    }

    #[test]
    fn atomic_write_keeps_old_file_on_error() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("out.txt");
        std::fs::write(&p, "old\n").unwrap();
        let res = write_atomic(&p, |w| {
            writeln!(w, "partial")?;
            Err(io::Error::other("boom"))
        });
        assert!(res.is_err());
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "old\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        write_atomic(&p, |w| writeln!(w, "new")).unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "new\n");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_uses_regular_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, "x\n").unwrap();
        let staged = dir.path().join("staged.txt");
        write_atomic(&staged, |w| writeln!(w, "x")).unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&staged), mode(&plain));
        assert_ne!(mode(&staged), 0o600);
    }
}
