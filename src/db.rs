use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type DbConnection = Arc<Mutex<Connection>>;

pub fn establish_connection(path: &Path) -> Result<DbConnection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            first_name TEXT,
            last_name TEXT,
            contact_number TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS auth_tokens (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            original_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_type TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            uploaded_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS applications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            first_name TEXT,
            middle_name TEXT,
            last_name TEXT,
            contact_number TEXT,
            gender TEXT,
            final_percentage REAL,
            tentative_ranking TEXT,
            final_year_project TEXT,
            other_projects TEXT,
            publications TEXT,
            extracurricular TEXT,
            professional_experience TEXT,
            strong_points TEXT,
            weak_points TEXT,
            transcript TEXT REFERENCES files (id) ON DELETE SET NULL,
            cv TEXT REFERENCES files (id) ON DELETE SET NULL,
            photo TEXT REFERENCES files (id) ON DELETE SET NULL,
            preferred_programs TEXT,
            \"references\" TEXT,
            statement_of_purpose TEXT,
            intended_research_areas TEXT,
            english_proficiency TEXT,
            leadership_experience TEXT,
            availability_to_start TEXT,
            additional_certifications TEXT,
            enrollment_status TEXT,
            target_universities TEXT,
            applied_universities TEXT,
            accepted_universities TEXT,
            enrolled_university TEXT,
            study_program TEXT,
            admission_year INTEGER,
            scholarship_status TEXT,
            admin_notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_applications_user ON applications (user_id);
        CREATE INDEX IF NOT EXISTS idx_files_user ON files (user_id);",
    )
}

/// Read an RFC 3339 timestamp column.
pub fn get_timestamp(row: &rusqlite::Row<'_>, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub fn get_uuid(row: &rusqlite::Row<'_>, column: &str) -> Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

pub fn get_opt_uuid(row: &rusqlite::Row<'_>, column: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| {
        Uuid::parse_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
pub fn test_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
