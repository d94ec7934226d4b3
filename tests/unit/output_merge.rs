//! Merge, naming and atomic write behavior

use std::path::PathBuf;
use tempfile::TempDir;

use report_segment_downloader::output::{
    collect_segment_files, merge, segment_file_name, write_atomic, MergeError, ReportLayout,
};

fn write_files(dir: &TempDir, contents: &[&str]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let path = dir.path().join(segment_file_name(i + 1, contents.len()));
            std::fs::write(&path, body).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_three_files_one_header() {
    let dir = TempDir::new().unwrap();
    let paths = write_files(&dir, &["a,b\n1,2\n", "a,b\n3,4\n", "a,b\n5,6\n"]);
    let out = dir.path().join("merged.csv");

    let summary = merge(&paths, &out).unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "a,b\n1,2\n3,4\n5,6\n");
    assert_eq!(summary.files_merged, 3);
    assert_eq!(summary.data_lines, 3);
    assert_eq!(summary.header.as_deref(), Some("a,b"));
}

#[test]
fn test_missing_inputs_and_blank_lines_are_skipped() {
    let dir = TempDir::new().unwrap();
    let mut paths = write_files(&dir, &["\n\na,b\n\n1,2\n", "a,b\n3,4\n\n"]);
    paths.insert(1, dir.path().join("segment-999.csv"));
    let out = dir.path().join("merged.csv");

    let summary = merge(&paths, &out).unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "a,b\n1,2\n3,4\n");
    assert_eq!(summary.files_missing, 1);
    assert_eq!(summary.files_merged, 2);
}

#[test]
fn test_input_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let paths = write_files(&dir, &["h\nfirst\n", "h\nsecond\n"]);
    let reversed: Vec<PathBuf> = paths.iter().rev().cloned().collect();
    let out = dir.path().join("merged.csv");

    merge(&reversed, &out).unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "h\nsecond\nfirst\n");
}

#[test]
fn test_segment_without_header_keeps_first_row() {
    let dir = TempDir::new().unwrap();
    let paths = write_files(&dir, &["a,b\n1,2\n", "3,4\n5,6\n", "a,b\n7,8\n"]);
    let out = dir.path().join("merged.csv");

    let summary = merge(&paths, &out).unwrap();

    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "a,b\n1,2\n3,4\n5,6\n7,8\n"
    );
    assert_eq!(summary.data_lines, 4);
}

#[test]
fn test_merge_rewrites_output_in_full() {
    let dir = TempDir::new().unwrap();
    let paths = write_files(&dir, &["a\n1\n"]);
    let out = dir.path().join("merged.csv");
    std::fs::write(&out, "old,contents\nthat,are\nlonger\n").unwrap();

    merge(&paths, &out).unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "a\n1\n");
}

#[test]
fn test_nothing_to_merge() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("merged.csv");
    assert!(matches!(merge(&[], &out), Err(MergeError::NothingToMerge)));
    assert!(!out.exists());
}

#[test]
fn test_collect_ignores_non_segment_files() {
    let dir = TempDir::new().unwrap();
    write_files(&dir, &["a\n1\n", "a\n2\n"]);
    std::fs::write(dir.path().join("merged.csv"), "a\n1\n2\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let files = collect_segment_files(dir.path()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["segment-001.csv", "segment-002.csv"]);
}

#[test]
fn test_layout_paths() {
    let layout = ReportLayout::new("/data/reports");
    assert_eq!(
        layout.instance_dir("req-1", "42"),
        PathBuf::from("/data/reports/req-1/instance-42")
    );
    assert_eq!(
        layout.merged_path("req-1", "42"),
        PathBuf::from("/data/reports/req-1/instance-42/merged.csv")
    );
    assert_eq!(
        layout.request_dir("../escape"),
        PathBuf::from("/data/reports/___escape")
    );
}

#[test]
fn test_atomic_write_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("segment-001.csv");
    write_atomic(&target, b"first").unwrap();
    write_atomic(&target, b"second").unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"second");
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}
