//! Attendance data files.
//!
//! Two JSON shapes are accepted. The envelope written by the scraper and by
//! `import`/`seed`:
//!
//! ```json
//! { "timestamp": "20260114_093000", "date": "2026-01-14 09:30:00",
//!   "source": "Acharya ERP",
//!   "data": [ { "subject": "Operating Systems", "total": 40, "present": 33 } ] }
//! ```
//!
//! and a flat mapping from subject name to its counts, either as an object
//! or as a `[held, attended]` pair:
//!
//! ```json
//! { "Operating Systems": { "total_classes": 40, "attended_classes": 33 },
//!   "Compiler Design": [38, 25] }
//! ```
//!
//! Held is read from `total`, `total_classes` or `held`; attended from
//! `present`, `attended_classes` or `attended`. Subjects keep file order.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_INPUT;
use crate::error::BunkError;
use crate::models::{AttendanceData, SourceInfo, SubjectRecord};

const HELD_KEYS: [&str; 3] = ["total", "total_classes", "held"];
const ATTENDED_KEYS: [&str; 3] = ["present", "attended_classes", "attended"];
const SNAPSHOT_PREFIX: &str = "attendance_";

/// Explicit path wins; otherwise `attendance.json`, then the newest timestamped snapshot.
pub fn resolve_input(explicit: Option<&Path>, data_dir: &Path) -> Result<PathBuf, BunkError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let fixed = data_dir.join(DEFAULT_INPUT);
    if fixed.is_file() {
        return Ok(fixed);
    }

    let entries = std::fs::read_dir(data_dir).map_err(|err| BunkError::InputNotFound {
        path: data_dir.to_path_buf(),
        source: Some(err),
    })?;

    let newest = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let is_snapshot = name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(".json");
            (is_snapshot && entry.path().is_file()).then_some(name)
        })
        .max();

    match newest {
        Some(name) => {
            debug!(file = %name, "using newest attendance snapshot");
            Ok(data_dir.join(name))
        }
        None => Err(BunkError::InputNotFound {
            path: fixed,
            source: None,
        }),
    }
}

pub fn load(path: &Path, skip_invalid: bool) -> Result<AttendanceData, BunkError> {
    let text = std::fs::read_to_string(path).map_err(|err| BunkError::InputNotFound {
        path: path.to_path_buf(),
        source: Some(err),
    })?;
    let data = parse_document(&text, skip_invalid)?;
    info!(path = %path.display(), subjects = data.records.len(), "loaded attendance data");
    Ok(data)
}

/// Top-level object entries in file order, repeated keys included.
struct Entries(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a JSON object at the top level")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, Value>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Entries {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == key).map(|(_, value)| value)
    }
}

/// Counts for one subject, as a `[held, attended]` pair or an object with aliased keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCounts {
    Pair(Value, Value),
    Fields {
        #[serde(alias = "total", alias = "total_classes")]
        held: Option<Value>,
        #[serde(alias = "present", alias = "attended_classes")]
        attended: Option<Value>,
    },
}

pub fn parse_document(text: &str, skip_invalid: bool) -> Result<AttendanceData, BunkError> {
    let entries: Entries = serde_json::from_str(text)
        .map_err(|err| BunkError::MalformedInput(format!("not valid JSON: {err}")))?;

    let mut info = SourceInfo::default();
    let mut parsed = Vec::new();

    match entries.get("data") {
        Some(Value::Array(rows)) if rows.first().map_or(true, Value::is_object) => {
            info.source = entries.get("source").and_then(Value::as_str).map(str::to_string);
            info.captured = entries.get("date").and_then(Value::as_str).map(str::to_string);
            for (index, row) in rows.iter().enumerate() {
                parsed.push(envelope_row(index, row));
            }
        }
        _ => {
            for (subject, counts) in &entries.0 {
                parsed.push(
                    parse_counts(subject, counts).map(|(held, attended)| SubjectRecord {
                        name: subject.clone(),
                        held,
                        attended,
                    }),
                );
            }
        }
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(parsed.len());
    for result in parsed {
        let checked = result.and_then(|record| {
            validate(&record)?;
            if !seen.insert(record.name.clone()) {
                return Err(BunkError::MalformedInput(format!(
                    "subject '{}' appears more than once",
                    record.name
                )));
            }
            Ok(record)
        });

        match checked {
            Ok(record) => records.push(record),
            Err(err) if skip_invalid && err.is_record_level() => {
                warn!(error = %err, "skipping invalid attendance record");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(AttendanceData { info, records })
}

pub fn validate(record: &SubjectRecord) -> Result<(), BunkError> {
    if record.attended > record.held {
        return Err(BunkError::InvalidRecord {
            subject: record.name.clone(),
            held: record.held,
            attended: record.attended,
        });
    }
    Ok(())
}

fn envelope_row(index: usize, row: &Value) -> Result<SubjectRecord, BunkError> {
    let subject = row
        .get("subject")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            BunkError::MalformedInput(format!("entry #{}: missing string field 'subject'", index + 1))
        })?
        .to_string();
    let (held, attended) = parse_counts(&subject, row)?;
    Ok(SubjectRecord {
        name: subject,
        held,
        attended,
    })
}

fn parse_counts(subject: &str, value: &Value) -> Result<(u64, u64), BunkError> {
    let raw = RawCounts::deserialize(value).map_err(|_| {
        BunkError::MalformedInput(format!(
            "subject '{subject}': expected an object or a [held, attended] pair"
        ))
    })?;

    let (held, attended) = match raw {
        RawCounts::Pair(held, attended) => (held, attended),
        RawCounts::Fields { held, attended } => (
            held.ok_or_else(|| missing(subject, "held", &HELD_KEYS))?,
            attended.ok_or_else(|| missing(subject, "attended", &ATTENDED_KEYS))?,
        ),
    };
    Ok((count(subject, "held", &held)?, count(subject, "attended", &attended)?))
}

fn missing(subject: &str, field: &str, keys: &[&str]) -> BunkError {
    BunkError::malformed_field(
        subject,
        field,
        &format!("is missing (expected one of {})", keys.join(", ")),
    )
}

fn count(subject: &str, field: &str, value: &Value) -> Result<u64, BunkError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let problem = match value {
        Value::Number(n) if n.as_i64().is_some() => "must not be negative",
        Value::Number(n) if n.is_f64() => "must be a whole number",
        Value::Number(_) => "is out of range",
        _ => "must be a non-negative integer",
    };
    Err(BunkError::malformed_field(subject, field, problem))
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    timestamp: String,
    date: String,
    source: &'a str,
    data: Vec<EnvelopeRow<'a>>,
}

#[derive(Debug, Serialize)]
struct EnvelopeRow<'a> {
    subject: &'a str,
    present: u64,
    total: u64,
    percentage: f64,
}

/// `attendance_YYYYMMDD_HHMMSS.json`, the name the scraper writes.
pub fn snapshot_name(now: &DateTime<Local>) -> String {
    format!("{SNAPSHOT_PREFIX}{}.json", now.format("%Y%m%d_%H%M%S"))
}

pub fn write_document(
    path: &Path,
    records: &[SubjectRecord],
    source: &str,
    now: &DateTime<Local>,
) -> anyhow::Result<()> {
    let envelope = Envelope {
        timestamp: now.format("%Y%m%d_%H%M%S").to_string(),
        date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        source,
        data: records
            .iter()
            .map(|record| EnvelopeRow {
                subject: &record.name,
                present: record.attended,
                total: record.held,
                percentage: if record.held == 0 {
                    0.0
                } else {
                    (record.attended as f64 / record.held as f64 * 10_000.0).round() / 100.0
                },
            })
            .collect(),
    };

    let body = serde_json::to_string_pretty(&envelope)?;
    std::fs::write(path, body + "\n")
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn import_csv(csv_path: &Path, out: &Path, now: &DateTime<Local>) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        #[serde(alias = "name")]
        subject: String,
        #[serde(alias = "total", alias = "total_classes")]
        held: u64,
        #[serde(alias = "present", alias = "attended_classes")]
        attended: u64,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut records: Vec<SubjectRecord> = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("row {} of {}", index + 1, csv_path.display()))?;
        let record = SubjectRecord {
            name: row.subject.trim().to_string(),
            held: row.held,
            attended: row.attended,
        };
        validate(&record)?;
        if records.iter().any(|existing| existing.name == record.name) {
            return Err(BunkError::MalformedInput(format!(
                "subject '{}' appears more than once",
                record.name
            ))
            .into());
        }
        records.push(record);
    }

    let source = csv_path
        .file_name()
        .map(|name| format!("CSV import ({})", name.to_string_lossy()))
        .unwrap_or_else(|| "CSV import".to_string());
    write_document(out, &records, &source, now)?;
    Ok(records.len())
}

pub fn seed(out: &Path, now: &DateTime<Local>) -> anyhow::Result<usize> {
    let samples = [
        ("Operating Systems", 40, 33),
        ("Compiler Design", 38, 25),
        ("Computer Networks", 35, 27),
        ("Data Structures", 53, 23),
        ("Physics Lab", 10, 10),
        ("Open Elective", 0, 0),
    ];

    let records: Vec<SubjectRecord> = samples
        .iter()
        .map(|(name, held, attended)| SubjectRecord {
            name: name.to_string(),
            held: *held,
            attended: *attended,
        })
        .collect();

    write_document(out, &records, "Sample data", now)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_extractor_envelope() {
        let text = r#"{
            "timestamp": "20260114_093000",
            "date": "2026-01-14 09:30:00",
            "source": "Acharya ERP",
            "data": [
                {"subject": "Operating Systems", "present": 33, "total": 40, "percentage": 82.5},
                {"subject": "Compiler Design", "present": 25, "total": 38}
            ]
        }"#;
        let data = parse_document(text, false).unwrap();
        assert_eq!(data.info.source.as_deref(), Some("Acharya ERP"));
        assert_eq!(data.info.captured.as_deref(), Some("2026-01-14 09:30:00"));
        assert_eq!(data.records.len(), 2);
        assert_eq!(data.records[1].name, "Compiler Design");
        assert_eq!((data.records[1].held, data.records[1].attended), (38, 25));
    }

    #[test]
    fn reads_flat_mapping_in_file_order() {
        let text = r#"{
            "Zoology": {"total_classes": 12, "attended_classes": 9},
            "Algebra": [20, 18],
            "Music": {"held": 3, "attended": 0}
        }"#;
        let data = parse_document(text, false).unwrap();
        let names: Vec<_> = data.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Zoology", "Algebra", "Music"]);
        assert_eq!(data.info, SourceInfo::default());
    }

    #[test]
    fn malformed_fields_name_the_subject() {
        let cases = [
            (r#"{"Art": {"total_classes": 5}}"#, "is missing"),
            (r#"{"Art": {"total_classes": -5, "attended_classes": 1}}"#, "must not be negative"),
            (r#"{"Art": {"total_classes": 5.5, "attended_classes": 1}}"#, "whole number"),
            (r#"{"Art": {"total_classes": "5", "attended_classes": 1}}"#, "non-negative integer"),
            (r#"{"Art": 7}"#, "pair"),
            (r#"{"Art": {"total": 5, "held": 5, "present": 1}}"#, "pair"),
        ];
        for (text, needle) in cases {
            let err = parse_document(text, false).unwrap_err();
            let message = err.to_string();
            assert!(matches!(err, BunkError::MalformedInput(_)), "{text}");
            assert!(message.contains("Art") && message.contains(needle), "{message}");
        }
    }

    #[test]
    fn attended_above_held_is_invalid() {
        let err = parse_document(r#"{"Art": [3, 4]}"#, false).unwrap_err();
        assert!(matches!(err, BunkError::InvalidRecord { .. }));
    }

    #[test]
    fn skip_invalid_drops_bad_records_only() {
        let text = r#"{"Art": [3, 4], "Law": {"total": 10}, "Math": [10, 8]}"#;
        let data = parse_document(text, true).unwrap();
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].name, "Math");
    }

    #[test]
    fn duplicate_envelope_subjects_are_rejected() {
        let text = r#"{"data": [
            {"subject": "Math", "total": 4, "present": 3},
            {"subject": "Math", "total": 5, "present": 5}
        ]}"#;
        assert!(matches!(
            parse_document(text, false),
            Err(BunkError::MalformedInput(_))
        ));
    }

    #[test]
    fn repeated_flat_keys_are_duplicates() {
        let err = parse_document(r#"{"Math": [10, 2], "Math": [10, 10]}"#, false).unwrap_err();
        assert!(matches!(err, BunkError::MalformedInput(_)));
        assert!(err.to_string().contains("'Math' appears more than once"));

        let data = parse_document(r#"{"Math": [10, 2], "Math": [10, 10], "Art": [4, 4]}"#, true).unwrap();
        assert_eq!(data.records.len(), 2);
        assert_eq!((data.records[0].name.as_str(), data.records[0].attended), ("Math", 2));
    }

    #[test]
    fn non_object_top_level_is_fatal_even_when_skipping() {
        assert!(parse_document("[1, 2]", true).is_err());
        assert!(parse_document("not json", true).is_err());
    }

    #[test]
    fn resolves_fixed_name_before_snapshots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("attendance_20260101_080000.json"), "{}").unwrap();
        std::fs::write(dir.path().join("attendance_20260214_080000.json"), "{}").unwrap();
        let newest = resolve_input(None, dir.path()).unwrap();
        assert!(newest.ends_with("attendance_20260214_080000.json"));

        std::fs::write(dir.path().join(DEFAULT_INPUT), "{}").unwrap();
        assert!(resolve_input(None, dir.path()).unwrap().ends_with(DEFAULT_INPUT));
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve_input(None, dir.path()),
            Err(BunkError::InputNotFound { .. })
        ));
        assert!(matches!(
            load(&dir.path().join("nope.json"), false),
            Err(BunkError::InputNotFound { .. })
        ));
    }

    #[test]
    fn imported_csv_reloads() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("attendance.csv");
        std::fs::write(&csv_path, "subject,total,present\nAlgebra,20,18\nGeometry,12,6\n").unwrap();
        let out = dir.path().join("out.json");

        let count = import_csv(&csv_path, &out, &Local::now()).unwrap();
        assert_eq!(count, 2);

        let data = load(&out, false).unwrap();
        assert_eq!(data.info.source.as_deref(), Some("CSV import (attendance.csv)"));
        assert_eq!(data.records[1], SubjectRecord { name: "Geometry".to_string(), held: 12, attended: 6 });
    }

    #[test]
    fn csv_rows_with_attended_above_held_fail() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("bad.csv");
        std::fs::write(&csv_path, "subject,held,attended\nAlgebra,2,3\n").unwrap();
        assert!(import_csv(&csv_path, &dir.path().join("out.json"), &Local::now()).is_err());
    }
}
