//! Replays process and filesystem events to resolve which file each open
//! really touched.
//!
//! Threads are keyed by `(pid, tid, vpid, vtid)` and follow the mount and
//! network namespaces reported on every event. Each mount namespace carries a
//! root that `chroot`/`pivot_root` move, and each thread a working directory
//! that `chdir` moves and `sched_process_fork` hands to the child. An
//! `open`/`openat` is then reported with its filename resolved against the
//! thread's working directory and its namespace root.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};
use std::sync::OnceLock;

use regex::Regex;

use crate::engine::Pass;
use crate::record::RecordError;
use crate::split::event_name;

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(v?[pt]id)\s*=\s*(\d+)").expect("valid id regex"))
}

fn ns_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(mnt|net)_ns\s*=\s*(\d+)").expect("valid ns regex"))
}

fn params_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}$").expect("valid params regex"))
}

fn second_vtid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[1\]\s*=\s*(\d+)").expect("valid vtids regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId {
    pub pid: u64,
    pub tid: u64,
    pub vpid: u64,
    pub vtid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NsKind {
    Mnt,
    Net,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ThreadState {
    /// Working directory, relative to the mount namespace root.
    pub wd: String,
    pub mnt_ns: Option<u64>,
    pub net_ns: Option<u64>,
}

/// One resolved `open`/`openat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccess {
    pub thread: ThreadId,
    pub filename: String,
    pub wd: String,
    pub root: String,
    pub resolved: String,
}

fn parse_number(name: &str, value: &str) -> Result<u64, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidNumber {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Thread identity of an event. All four ids must be present; the last
/// occurrence of each wins.
pub fn parse_thread_id(line: &str) -> Result<ThreadId, RecordError> {
    let mut ids: HashMap<&str, u64> = HashMap::new();
    for c in id_re().captures_iter(line) {
        let (_, [name, value]) = c.extract();
        ids.insert(name, parse_number(name, value)?);
    }
    let get = |name: &'static str| {
        ids.get(name)
            .copied()
            .ok_or(RecordError::MissingAttribute { name })
    };
    Ok(ThreadId {
        pid: get("pid")?,
        tid: get("tid")?,
        vpid: get("vpid")?,
        vtid: get("vtid")?,
    })
}

/// Mount and network namespace inodes of an event.
pub fn parse_namespaces(line: &str) -> Result<(u64, u64), RecordError> {
    let (mut mnt, mut net) = (None, None);
    for c in ns_re().captures_iter(line) {
        let (_, [kind, value]) = c.extract();
        let inum = parse_number(kind, value)?;
        if kind == "mnt" {
            mnt = Some(inum);
        } else {
            net = Some(inum);
        }
    }
    Ok((
        mnt.ok_or(RecordError::MissingAttribute { name: "mnt_ns" })?,
        net.ok_or(RecordError::MissingAttribute { name: "net_ns" })?,
    ))
}

/// Split the payload on `", "` except where an array element (`[n]`) follows.
fn split_params(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, _) in s.match_indices(", ") {
        if i < start || s[i + 2..].starts_with('[') {
            continue;
        }
        out.push(&s[start..i]);
        start = i + 2;
    }
    out.push(&s[start..]);
    out
}

/// Split `key = value` on the first ` = ` that does not follow an array index.
fn split_key_value(s: &str) -> Option<(&str, &str)> {
    s.match_indices(" = ")
        .find(|(i, _)| !s[..*i].ends_with(']'))
        .map(|(i, sep)| (s[..i].trim(), s[i + sep.len()..].trim()))
}

/// Event payload: the trailing `{ ... }` group as key/value pairs.
pub fn parse_params(line: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let Some(inner) = params_re().captures(line.trim_end()).and_then(|c| c.get(1)) else {
        return params;
    };
    let inner = inner.as_str().trim();
    if inner.is_empty() {
        return params;
    }
    for field in split_params(inner) {
        if let Some((k, v)) = split_key_value(field) {
            params.insert(k.to_string(), v.to_string());
        }
    }
    params
}

/// Strip one pair of surrounding double quotes.
pub fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Lexically remove `.` and `..` segments.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }
    let body = parts.join("/");
    if absolute { format!("/{}", body) } else { body }
}

/// Resolve `path` against the directory `base`.
pub fn resolve(base: &str, path: &str) -> String {
    if path.starts_with('/') || base.is_empty() {
        normalize(path)
    } else {
        normalize(&format!("{}/{}", base, path))
    }
}

/// Place a namespace-relative path under `root`.
pub fn under_root(root: &str, path: &str) -> String {
    if root.is_empty() {
        path.to_string()
    } else {
        normalize(&format!("{}/{}", root, path))
    }
}

fn param<'a>(
    params: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, RecordError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or(RecordError::MissingAttribute { name })
}

/// Thread, namespace and file access state rebuilt from a raw event log.
#[derive(Debug, Default, Clone)]
pub struct Tracker {
    threads: HashMap<ThreadId, ThreadState>,
    roots: HashMap<u64, String>,
    members: BTreeMap<(NsKind, u64), BTreeSet<ThreadId>>,
    accesses: Vec<FileAccess>,
    pid_filter: Option<u64>,
    vpid_filter: Option<u64>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report opens by threads with these ids.
    pub fn with_filter(pid: Option<u64>, vpid: Option<u64>) -> Self {
        Self {
            pid_filter: pid,
            vpid_filter: vpid,
            ..Self::default()
        }
    }

    pub fn thread(&self, id: &ThreadId) -> Option<&ThreadState> {
        self.threads.get(id)
    }

    /// Root of a mount namespace, empty when never changed.
    pub fn root(&self, mnt_ns: u64) -> &str {
        self.roots.get(&mnt_ns).map(String::as_str).unwrap_or("")
    }

    /// Threads currently in each namespace.
    pub fn members(&self) -> &BTreeMap<(NsKind, u64), BTreeSet<ThreadId>> {
        &self.members
    }

    pub fn accesses(&self) -> &[FileAccess] {
        &self.accesses
    }

    fn enter(&mut self, id: ThreadId, mnt: u64, net: u64) {
        let state = self.threads.entry(id).or_default();
        for (kind, slot, ns) in [
            (NsKind::Mnt, &mut state.mnt_ns, mnt),
            (NsKind::Net, &mut state.net_ns, net),
        ] {
            if *slot == Some(ns) {
                continue;
            }
            if let Some(old) = slot.replace(ns) {
                log::debug!("{:?} moves {:?} namespace {} -> {}", id, kind, old, ns);
                if let Some(set) = self.members.get_mut(&(kind, old)) {
                    set.remove(&id);
                }
            }
            self.members.entry((kind, ns)).or_default().insert(id);
        }
    }

    fn state_mut(&mut self, id: &ThreadId) -> &mut ThreadState {
        self.threads.entry(*id).or_default()
    }

    fn mnt_root(&self, id: &ThreadId) -> (Option<u64>, String) {
        let ns = self.threads.get(id).and_then(|t| t.mnt_ns);
        (ns, ns.map(|n| self.root(n).to_string()).unwrap_or_default())
    }

    fn fork(&mut self, parent: &ThreadId, params: &BTreeMap<String, String>) -> Result<(), RecordError> {
        let pid = parse_number("child_pid", param(params, "child_pid")?)?;
        let tid = parse_number("child_tid", param(params, "child_tid")?)?;
        let nested = match params.get("_vtids_length") {
            Some(n) => parse_number("_vtids_length", n)? > 1,
            None => false,
        };
        let (vpid, vtid) = if nested {
            // vtids[1] is the child's id inside its own pid namespace
            let vtids = param(params, "vtids")?;
            let inner = second_vtid_re()
                .captures(vtids)
                .and_then(|c| c.get(1))
                .ok_or(RecordError::MissingAttribute { name: "vtids[1]" })?;
            let v = parse_number("vtids[1]", inner.as_str())?;
            (v, v)
        } else {
            (pid, tid)
        };
        let child = ThreadId {
            pid,
            tid,
            vpid,
            vtid,
        };
        let wd = self.state_mut(parent).wd.clone();
        self.state_mut(&child).wd = wd;
        Ok(())
    }

    fn change_root(&mut self, id: &ThreadId, new_root: &str) {
        let (ns, old_root) = self.mnt_root(id);
        let Some(ns) = ns else {
            return;
        };
        let wd = self.state_mut(id).wd.clone();
        let root = under_root(&old_root, &resolve(&wd, unquote(new_root)));
        log::debug!("mount namespace {} root {:?} -> {:?}", ns, old_root, root);
        self.roots.insert(ns, root);
    }

    fn open(&mut self, id: &ThreadId, filename: &str) {
        if self.pid_filter.is_some_and(|p| p != id.pid)
            || self.vpid_filter.is_some_and(|v| v != id.vpid)
        {
            return;
        }
        let (_, root) = self.mnt_root(id);
        let wd = self.state_mut(id).wd.clone();
        let filename = unquote(filename).to_string();
        let resolved = under_root(&root, &resolve(&wd, &filename));
        self.accesses.push(FileAccess {
            thread: *id,
            filename,
            wd,
            root,
            resolved,
        });
    }
}

impl Pass for Tracker {
    fn name(&self) -> &'static str {
        "namespace-tracker"
    }

    fn observe(&mut self, line: &str) -> Result<(), RecordError> {
        let event = event_name(line).ok_or(RecordError::MissingAttribute { name: "event" })?;
        let id = parse_thread_id(line)?;
        let (mnt, net) = parse_namespaces(line)?;
        self.enter(id, mnt, net);

        let params = parse_params(line);
        match event {
            "sched_process_fork" => self.fork(&id, &params)?,
            "syscall_entry_chdir" => {
                let target = unquote(param(&params, "filename")?);
                let state = self.state_mut(&id);
                state.wd = resolve(&state.wd, target);
            }
            "syscall_entry_chroot" => self.change_root(&id, param(&params, "filename")?),
            "syscall_entry_pivot_root" => self.change_root(&id, param(&params, "new_root")?),
            "syscall_entry_open" | "syscall_entry_openat" => {
                self.open(&id, param(&params, "filename")?)
            }
            _ => {}
        }
        Ok(())
    }

    fn emitted(&self) -> usize {
        self.accesses.len()
    }

    fn write_output(&self, out: &mut dyn Write) -> io::Result<()> {
        for a in &self.accesses {
            writeln!(
                out,
                "{} ({}) accessed {} -> {} (cwd {:?}, root {:?})",
                a.thread.pid, a.thread.vpid, a.filename, a.resolved, a.wd, a.root
            )?;
        }
        Ok(())
    }
}
