use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const LOG: &[&str] = &[
    "[14:46:54.102] (+0.000), ARECIBO-U syscall_entry_openat: { cpu_id = 2 }, { comm = \"cat\" }, pid = 68263, vpid = 00166, mount = /var/lib/lxc/c1/rootfs, filename = \"/etc/passwd\"",
    "[14:46:54.103] (+0.001), ARECIBO-U syscall_entry_read: { cpu_id = 2 }, { comm = \"bash\" }, pid = 1200, vpid = 1200, mount = /, fd = 3",
    "[14:46:54.104] (+0.001), ARECIBO-U syscall_entry_openat: { cpu_id = 0 }, { comm = \"sshd\" }, pid = 0901, vpid = 0901, mount = /, filename = \"/etc/passwd\"",
];

fn write_log(path: &std::path::Path) {
    let mut f = fs::File::create(path).unwrap();
    for line in LOG {
        writeln!(f, "{}", line).unwrap();
    }
}

#[test]
fn default_file_names_chain_passes() {
    let tmp = tempdir().unwrap();
    write_log(&tmp.path().join("result.out"));

    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .arg("passwd")
        .assert()
        .success()
        .stdout(predicate::str::contains("passwd-filter"));
    let filtered = fs::read_to_string(tmp.path().join("total_pwds.txt")).unwrap();
    assert_eq!(filtered, format!("{}\n{}\n", LOG[0], LOG[2]));

    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .args(["aggregate", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    let info = fs::read_to_string(tmp.path().join("pwds_info.txt")).unwrap();
    assert_eq!(
        info,
        "pids: 0901 68263\nvpids: 00166 0901\nmounts: / /var/lib/lxc/c1/rootfs\n"
    );

    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .arg("namespaces")
        .assert()
        .success();
    let namespaced = fs::read_to_string(tmp.path().join("results-filtered.txt")).unwrap();
    assert_eq!(namespaced, format!("{}\n", LOG[0]));
}

#[test]
fn all_writes_three_outputs() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("trace.out");
    let outdir = tmp.path().join("out");
    fs::create_dir_all(&outdir).unwrap();
    write_log(&input);

    Command::cargo_bin("eventsift")
        .unwrap()
        .arg("all")
        .arg("-i")
        .arg(&input)
        .arg("-d")
        .arg(&outdir)
        .args(["--color", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Event Log Passes"));

    for name in ["total_pwds.txt", "pwds_info.txt", "results-filtered.txt"] {
        assert!(outdir.join(name).exists(), "missing {}", name);
    }
}

#[test]
fn split_writes_category_files() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("result.out");
    write_log(&input);
    let dir = tmp.path().join("split");

    Command::cargo_bin("eventsift")
        .unwrap()
        .arg("split")
        .arg("-i")
        .arg(&input)
        .arg("-d")
        .arg(&dir)
        .arg("-q")
        .assert()
        .success();

    let open = fs::read_to_string(dir.join("filtered-open.out")).unwrap();
    assert_eq!(open.lines().count(), 2);
    let read = fs::read_to_string(dir.join("filtered-read.out")).unwrap();
    assert_eq!(read, format!("{}\n", LOG[1]));
}

#[test]
fn aggregate_csv_export() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("total_pwds.txt");
    fs::write(&input, "a, b, c, pid = 0001, vpid = 0099, mount = /etc\n").unwrap();
    let csv = tmp.path().join("info.csv");

    Command::cargo_bin("eventsift")
        .unwrap()
        .arg("aggregate")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("pwds_info.txt"))
        .arg("--csv")
        .arg(&csv)
        .assert()
        .success();

    let content = fs::read_to_string(csv).unwrap();
    assert_eq!(content, "kind,value\npids,0001\nvpids,0099\nmounts,/etc\n");
}

#[test]
fn missing_input_exits_with_code_2() {
    let tmp = tempdir().unwrap();
    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .arg("passwd")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("input file not found"));
    assert!(!tmp.path().join("total_pwds.txt").exists());
}

#[test]
fn malformed_line_exits_with_code_3_and_reports_line() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("total_pwds.txt");
    fs::write(
        &input,
        "a, b, c, pid = 1, vpid = 1, mount = /m\nbroken etc/passwd line\n",
    )
    .unwrap();

    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .arg("aggregate")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("malformed line 2"));
    assert!(!tmp.path().join("pwds_info.txt").exists());
}

#[test]
fn unwritable_output_exits_with_code_4() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("result.out");
    write_log(&input);
    Command::cargo_bin("eventsift")
        .unwrap()
        .arg("namespaces")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(tmp.path().join("missing").join("out.txt"))
        .assert()
        .failure()
        .code(4);
}

#[test]
fn mmap_and_buffered_reads_agree() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("result.out");
    write_log(&input);
    let a = tmp.path().join("a.txt");
    let b = tmp.path().join("b.txt");

    for (out, threshold) in [(&a, "0"), (&b, "16")] {
        Command::cargo_bin("eventsift")
            .unwrap()
            .arg("passwd")
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(out)
            .args(["--mmap-threshold", threshold, "-q"])
            .assert()
            .success();
    }
    assert_eq!(
        fs::read_to_string(a).unwrap(),
        fs::read_to_string(b).unwrap()
    );
}

#[test]
fn blank_line_exits_with_code_3() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("result.out");
    fs::write(&input, format!("{}\n\n{}\n", LOG[0], LOG[1])).unwrap();
    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .arg("namespaces")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("malformed line 2"));
    assert!(!tmp.path().join("results-filtered.txt").exists());
}

#[test]
fn failed_csv_export_writes_no_summary() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("total_pwds.txt");
    fs::write(&input, "a, b, c, pid = 0001, vpid = 0099, mount = /etc\n").unwrap();
    let info = tmp.path().join("pwds_info.txt");

    Command::cargo_bin("eventsift")
        .unwrap()
        .arg("aggregate")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&info)
        .arg("--csv")
        .arg(tmp.path().join("missing").join("info.csv"))
        .assert()
        .failure()
        .code(4);
    assert!(!info.exists());
}

#[test]
fn track_resolves_opens_inside_chroot() {
    let tmp = tempdir().unwrap();
    let ids = "pid = 68263, tid = 68263, vpid = 166, vtid = 166, mnt_ns = 4026532200, net_ns = 4026532300";
    let lines = [
        format!("[14:46:54.100] (+0.000) ARECIBO-U syscall_entry_chroot: {{ cpu_id = 1 }}, {{ {ids} }}, {{ filename = \"/var/lib/lxc/c1/rootfs\" }}"),
        format!("[14:46:54.101] (+0.001) ARECIBO-U syscall_entry_chdir: {{ cpu_id = 1 }}, {{ {ids} }}, {{ filename = \"/etc\" }}"),
        format!("[14:46:54.102] (+0.001) ARECIBO-U syscall_entry_openat: {{ cpu_id = 1 }}, {{ {ids} }}, {{ dfd = -100, filename = \"passwd\", flags = 0, mode = 0 }}"),
    ];
    fs::write(tmp.path().join("result.out"), lines.join("\n")).unwrap();

    Command::cargo_bin("eventsift")
        .unwrap()
        .current_dir(tmp.path())
        .args(["track", "--vpid", "166", "--color", "never"])
        .assert()
        .success()
        .stdout(predicate::str::contains("opens resolved: 1"));
    let opens = fs::read_to_string(tmp.path().join("opens.txt")).unwrap();
    assert!(
        opens.starts_with("68263 (166) accessed passwd -> /var/lib/lxc/c1/rootfs/etc/passwd"),
        "{}",
        opens
    );
}
