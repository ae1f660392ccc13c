//! Human-readable run summary for terminal output.
use colored::*;

use crate::engine::{Engine, PassStats};

fn section_header(title: &str, width: usize) -> String {
    format!("\n{}\n{}\n\n", title, "─".repeat(width))
}

fn render_pass(s: &PassStats) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} lines read from {}",
        s.pass.bold().blue(),
        s.lines_read,
        s.input.display()
    )];
    let what = match s.pass {
        "mount-aggregator" => "distinct values",
        "namespace-tracker" => "opens resolved",
        _ => "lines kept",
    };
    lines.push(format!("  {}: {}", what, s.emitted));
    for out in &s.outputs {
        lines.push(format!("  -> {}", out.display()));
    }
    lines
}

pub fn render_summary(engine: &Engine) -> String {
    let title = "Event Log Passes";
    let mut out = String::new();
    out.push_str(&section_header(
        &title.bold().yellow().to_string(),
        title.len(),
    ));
    if engine.stats.is_empty() {
        out.push_str(&format!("{}\n", "(No passes run)".dimmed()));
        return out;
    }
    for s in &engine.stats {
        for line in render_pass(s) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn lists_each_pass_with_counts() {
        let mut e = Engine::new();
        e.stats.push(PassStats {
            pass: "passwd-filter",
            input: PathBuf::from("result.out"),
            outputs: vec![PathBuf::from("total_pwds.txt")],
            lines_read: 40,
            emitted: 3,
        });
        e.stats.push(PassStats {
            pass: "mount-aggregator",
            input: PathBuf::from("total_pwds.txt"),
            outputs: vec![PathBuf::from("pwds_info.txt")],
            lines_read: 3,
            emitted: 5,
        });
        let s = render_summary(&e);
        assert!(s.contains("40 lines read from result.out"));
        assert!(s.contains("lines kept: 3"));
        assert!(s.contains("distinct values: 5"));
        assert!(s.contains("-> pwds_info.txt"));
    }

    #[test]
    fn empty_engine_says_so() {
        assert!(render_summary(&Engine::new()).contains("(No passes run)"));
    }
}
