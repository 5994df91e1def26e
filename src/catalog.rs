//! Selection of reviewed clips for downstream training.
//!
//! Walks the `YYYYMMDD` directories written by the event store, matches
//! each metadata file against a set of criteria and copies the sibling
//! `.mp4` of every match into one flat output directory.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::storage::{METADATA_EXT, VIDEO_FINAL_EXT};

/// Metadata filter. Every entry must match.
///
/// - `"a.b": v` follows nested objects.
/// - A list value matches when the field equals any element.
/// - Anything else must be equal; numbers compare by value.
#[derive(Clone, Debug, Default)]
pub struct Criteria(Map<String, Value>);

impl Criteria {
    pub fn new(entries: Map<String, Value>) -> Self {
        Self(entries)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read criteria file {}: {}", path.display(), e))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid criteria file {}: {}", path.display(), e))?;
        match value {
            Value::Object(entries) => Ok(Self(entries)),
            _ => Err(anyhow!(
                "criteria file {} must contain a JSON object",
                path.display()
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &Value) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| entry_matches(metadata, key, expected))
    }
}

fn entry_matches(metadata: &Value, key: &str, expected: &Value) -> bool {
    if key.contains('.') {
        let mut current = metadata;
        for part in key.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => return false,
            }
        }
        return values_equal(current, expected);
    }
    let Some(actual) = metadata.get(key) else {
        return false;
    };
    match expected {
        Value::Array(options) => options.iter().any(|option| values_equal(actual, option)),
        _ => values_equal(actual, expected),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

/// `YYYYMMDD` that is also a real calendar date.
pub fn is_date_dir(name: &str) -> bool {
    name.len() == 8 && NaiveDate::parse_from_str(name, "%Y%m%d").is_ok()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub metadata_files: usize,
    pub skipped: usize,
    pub matched: usize,
    pub copied: Vec<PathBuf>,
    pub missing_video: usize,
}

/// Copy the clip of every matching event under `input` into `output`.
pub fn sort_clips(input: &Path, output: &Path, criteria: &Criteria) -> Result<SortSummary> {
    if !input.is_dir() {
        return Err(anyhow!("input directory does not exist: {}", input.display()));
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut summary = SortSummary::default();
    for day in sorted_entries(input)? {
        let is_day = day.is_dir()
            && day
                .file_name()
                .and_then(|name| name.to_str())
                .map(is_date_dir)
                .unwrap_or(false);
        if !is_day {
            continue;
        }
        log::debug!("processing directory {}", day.display());

        for path in sorted_entries(&day)? {
            if path.extension().and_then(|ext| ext.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            summary.metadata_files += 1;
            let metadata = match read_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::warn!("skipping {}: {:#}", path.display(), err);
                    summary.skipped += 1;
                    continue;
                }
            };
            if !criteria.matches(&metadata) {
                continue;
            }
            summary.matched += 1;

            let video = path.with_extension(VIDEO_FINAL_EXT);
            if !video.exists() {
                log::warn!("no matching {} file for {}", VIDEO_FINAL_EXT, path.display());
                summary.missing_video += 1;
                continue;
            }
            let Some(file_name) = video.file_name() else {
                continue;
            };
            let target = output.join(file_name);
            match std::fs::copy(&video, &target) {
                Ok(_) => {
                    log::debug!("copied {}", file_name.to_string_lossy());
                    summary.copied.push(target);
                }
                Err(err) => log::error!("failed to copy {}: {}", video.display(), err),
            }
        }
    }

    log::info!(
        "processed {} metadata files, copied {} clips to {}",
        summary.metadata_files,
        summary.copied.len(),
        output.display()
    );
    Ok(summary)
}

/// Remove the regular files directly inside `dir`, creating it if needed.
/// Returns how many were removed.
pub fn clean_directory(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        log::info!("created output directory {}", dir.display());
        return Ok(0);
    }
    let mut removed = 0;
    for path in sorted_entries(dir)? {
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => log::error!("failed to remove {}: {}", path.display(), err),
        }
    }
    log::info!("cleaned {} ({} files removed)", dir.display(), removed);
    Ok(removed)
}

fn read_metadata(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).context("read metadata")?;
    let value: Value = serde_json::from_str(&raw).context("parse metadata")?;
    if !value.is_object() {
        return Err(anyhow!("metadata is not a JSON object"));
    }
    Ok(value)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria(value: Value) -> Criteria {
        match value {
            Value::Object(map) => Criteria::new(map),
            _ => panic!("criteria must be an object"),
        }
    }

    #[test]
    fn exact_list_and_nested_matching() {
        let metadata = json!({
            "class": "dog",
            "max_instances": 2,
            "named_direction": "OUT",
            "review": {"tag": "good"}
        });
        assert!(criteria(json!({"class": "dog"})).matches(&metadata));
        assert!(criteria(json!({"max_instances": 2.0})).matches(&metadata));
        assert!(criteria(json!({"named_direction": ["OUT", "BACK"]})).matches(&metadata));
        assert!(criteria(json!({"review.tag": "good"})).matches(&metadata));
        assert!(!criteria(json!({"review.tag": "bad"})).matches(&metadata));
        assert!(!criteria(json!({"review.missing.tag": "good"})).matches(&metadata));
        assert!(!criteria(json!({"label": "dogs_OUT"})).matches(&metadata));
        assert!(criteria(json!({})).matches(&metadata));
    }

    #[test]
    fn date_dirs_must_be_calendar_dates() {
        assert!(is_date_dir("20250601"));
        assert!(!is_date_dir("20251301"));
        assert!(!is_date_dir("2025-06-01"));
        assert!(!is_date_dir("output"));
    }
}
