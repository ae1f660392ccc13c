//! CSV export of the aggregated pid/vpid/mount values.
//!
//! One `kind,value` row per distinct value, grouped in the same order as the
//! text summary.
use std::path::Path;

use serde::Serialize;

use crate::aggregate::MountSummary;
use crate::error::PassError;
use crate::io::write_atomic;

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    kind: &'static str,
    value: &'a str,
}

pub fn save_summary_csv<P: AsRef<Path>>(summary: &MountSummary, path: P) -> Result<(), PassError> {
    let path = path.as_ref();
    write_atomic(path, |w| {
        let mut wtr = csv::Writer::from_writer(w);
        for (kind, values) in summary.sections() {
            for value in values {
                wtr.serialize(SummaryRow {
                    kind,
                    value: value.as_str(),
                })?;
            }
        }
        wtr.flush()
    })
    .map_err(|source| PassError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Pass;
    use tempfile::tempdir;

    #[test]
    fn writes_header_and_rows() {
        let mut s = MountSummary::new();
        s.observe("a, b, c, pid = 10, vpid = 1, mount = /etc").unwrap();
        s.observe("a, b, c, pid = 11, vpid = 1, mount = /etc, extra").unwrap();
        let dir = tempdir().unwrap();
        let p = dir.path().join("pwds_info.csv");
        save_summary_csv(&s, &p).unwrap();
        let content = std::fs::read_to_string(p).unwrap();
        assert_eq!(
            content,
            "kind,value\npids,10\npids,11\nvpids,1\nmounts,/etc\n"
        );
    }
}
