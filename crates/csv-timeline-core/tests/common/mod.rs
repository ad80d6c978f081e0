#![allow(dead_code)]

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use chrono::{DateTime, TimeDelta, Utc};
use csv_timeline_core::dialect::Dialect;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn write_file(path: &Path, contents: &str) -> TestResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

pub fn append(path: &Path, contents: &str) -> TestResult {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Offsets of the data rows of `contents`, found without the engine.
pub fn expected_offsets(contents: &str, dialect: &Dialect) -> Vec<u64> {
    let mut offsets = Vec::new();
    let mut header_pending = dialect.header;
    let mut pos = 0u64;
    for line in contents.split_inclusive('\n') {
        let offset = pos;
        pos += line.len() as u64;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(|c: char| dialect.comment.contains(c)) {
            continue;
        }
        if header_pending {
            header_pending = false;
            continue;
        }
        offsets.push(offset);
    }
    offsets
}

pub fn base_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000)
}

/// `Time` in the standard layout, for use in data lines.
pub fn stamp(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

/// `Time,Value` rows one second apart starting at `base_time() + first` seconds.
pub fn timed_rows(first: i64, values: &[&str]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let time = base_time() + TimeDelta::seconds(first + i as i64);
            format!("{},{value}\n", stamp(time))
        })
        .collect()
}
