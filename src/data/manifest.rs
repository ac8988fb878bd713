// ============================================================
// Layer 4 — Dataset Manifest
// ============================================================
// The dataset root contains a CSV manifest listing every image
// with its age label and split assignment:
//
//   path,age,split
//   AgeDB/0001_MariaCallas_35.jpg,35,train
//   AgeDB/0002_MariaCallas_40.jpg,40,val
//   ...
//
// Rows are parsed strictly — a malformed age or an unknown
// split aborts the run with the offending line number rather
// than training on a silently truncated dataset.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::domain::{AgeRecord, Split};
use crate::ml::model::DatasetKind;

/// Full path of the manifest file for a dataset kind.
pub fn manifest_path(data_folder: &str, dataset: DatasetKind) -> PathBuf {
    Path::new(data_folder).join(dataset.manifest_file())
}

/// Load every record of the manifest, all splits included.
pub fn load_records(data_folder: &str, dataset: DatasetKind) -> Result<Vec<AgeRecord>> {
    let path = manifest_path(data_folder, dataset);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read dataset manifest '{}'", path.display()))?;
    parse_manifest(&text).with_context(|| format!("malformed manifest '{}'", path.display()))
}

/// Filter a record list down to one split, preserving manifest order.
pub fn split_records(records: &[AgeRecord], split: Split) -> Vec<AgeRecord> {
    records
        .iter()
        .filter(|r| r.split == split)
        .cloned()
        .collect()
}

fn parse_manifest(text: &str) -> Result<Vec<AgeRecord>> {
    let mut lines = text.lines().enumerate();

    // Header row is required; accepting headerless files would make an
    // off-by-one split assignment invisible.
    match lines.next() {
        Some((_, header)) if header.trim() == "path,age,split" => {}
        Some((_, header)) => bail!("unexpected manifest header '{header}' (want 'path,age,split')"),
        None => bail!("manifest is empty"),
    }

    let mut records = Vec::new();
    for (line_no, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Fixed three-column layout; image paths never contain commas.
        let mut fields = line.split(',');
        let (path, age, split) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(p), Some(a), Some(s), None) => (p, a, s),
            _ => bail!("line {}: expected 3 comma separated fields", line_no + 1),
        };

        let age: f32 = age
            .trim()
            .parse()
            .with_context(|| format!("line {}: invalid age '{}'", line_no + 1, age))?;
        let split: Split = split
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("line {}: {e}", line_no + 1))?;

        records.push(AgeRecord {
            path: path.trim().to_string(),
            age,
            split,
        });
    }

    if records.is_empty() {
        bail!("manifest contains a header but no records");
    }
    Ok(records)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MANIFEST: &str = "path,age,split\n\
                            a/young.jpg,21.5,train\n\
                            a/old.jpg,67,val\n\
                            \n\
                            a/mid.jpg,40,test\n";

    #[test]
    fn test_parses_records_and_skips_blank_lines() {
        let records = parse_manifest(MANIFEST).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].path, "a/young.jpg");
        assert_eq!(records[0].age, 21.5);
        assert_eq!(records[0].split, Split::Train);
        assert_eq!(records[2].split, Split::Test);
    }

    #[test]
    fn test_split_filter_preserves_order() {
        let records = parse_manifest(MANIFEST).unwrap();
        let val = split_records(&records, Split::Val);
        assert_eq!(val.len(), 1);
        assert_eq!(val[0].path, "a/old.jpg");
    }

    #[test]
    fn test_bad_header_is_fatal() {
        assert!(parse_manifest("file,label\nx,1").is_err());
    }

    #[test]
    fn test_bad_age_reports_line() {
        let err = parse_manifest("path,age,split\nx.jpg,old,train\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("line 2"), "unexpected error: {err}");
    }

    #[test]
    fn test_unknown_split_is_fatal() {
        assert!(parse_manifest("path,age,split\nx.jpg,30,validation\n").is_err());
    }
}
