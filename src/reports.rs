//! Admin reports over the whole application set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::models::EnrollmentStatus;

pub const NO_STATUS: &str = "none";

#[derive(Debug, Serialize, PartialEq)]
pub struct UniversityCount {
    pub university: String,
    pub student_count: u64,
}

#[derive(Debug, Serialize)]
pub struct UniversityReport {
    pub report_date: DateTime<Utc>,
    pub total_enrolled: u64,
    pub universities: Vec<UniversityCount>,
    pub generated_by: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentStatistics {
    pub report_date: DateTime<Utc>,
    pub total_applications: u64,
    pub status_counts: BTreeMap<String, u64>,
    pub generated_by: String,
}

/// The two columns both reports read.
pub struct StatusRow {
    pub enrollment_status: Option<EnrollmentStatus>,
    pub enrolled_university: Option<String>,
}

pub fn load_status_rows(conn: &Connection) -> rusqlite::Result<Vec<StatusRow>> {
    let mut stmt = conn.prepare("SELECT enrollment_status, enrolled_university FROM applications")?;
    let rows = stmt.query_map([], |row| {
        // Blank legacy values fall into the `none` bucket
        let status: Option<String> = row.get(0)?;
        Ok(StatusRow {
            enrollment_status: status.and_then(|status| status.trim().parse().ok()),
            enrolled_university: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Enrolled applications grouped by university, sorted by name.
pub fn count_by_university(rows: &[StatusRow]) -> Vec<UniversityCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();

    for row in rows {
        if row.enrollment_status != Some(EnrollmentStatus::Enrolled) {
            continue;
        }
        match row.enrolled_university.as_deref().map(str::trim) {
            Some(university) if !university.is_empty() => *counts.entry(university).or_default() += 1,
            _ => {}
        }
    }

    counts
        .into_iter()
        .map(|(university, student_count)| UniversityCount {
            university: university.to_string(),
            student_count,
        })
        .collect()
}

/// Applications per status. Every known status is listed; `none` only
/// appears when some application has no status.
pub fn count_by_status(rows: &[StatusRow]) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = EnrollmentStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();

    for row in rows {
        let key = row.enrollment_status.map_or(NO_STATUS, |status| status.as_str());
        *counts.entry(key.to_string()).or_default() += 1;
    }

    counts
}

pub fn university_report(rows: &[StatusRow], generated_by: &str) -> UniversityReport {
    let universities = count_by_university(rows);

    UniversityReport {
        report_date: Utc::now(),
        total_enrolled: universities.iter().map(|entry| entry.student_count).sum(),
        universities,
        generated_by: generated_by.to_string(),
    }
}

pub fn enrollment_statistics(rows: &[StatusRow], generated_by: &str) -> EnrollmentStatistics {
    EnrollmentStatistics {
        report_date: Utc::now(),
        total_applications: rows.len() as u64,
        status_counts: count_by_status(rows),
        generated_by: generated_by.to_string(),
    }
}
