use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use crate::applications;
use crate::error::{AppError, AppResult};
use crate::models::{FileKind, FileRecord, User};
use crate::storage::StoredFile;

pub fn insert(
    conn: &Connection,
    user_id: Uuid,
    original_name: &str,
    kind: FileKind,
    stored: &StoredFile,
) -> rusqlite::Result<FileRecord> {
    let record = FileRecord {
        id: Uuid::new_v4(),
        user_id,
        original_name: original_name.to_owned(),
        file_path: stored.path.to_string_lossy().into_owned(),
        file_type: kind,
        mime_type: stored.mime_type.clone(),
        file_size: stored.size,
        uploaded_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO files (id, user_id, original_name, file_path, file_type, mime_type, file_size, uploaded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.id.to_string(),
            record.user_id.to_string(),
            record.original_name,
            record.file_path,
            record.file_type,
            record.mime_type,
            record.file_size,
            record.uploaded_at.to_rfc3339(),
        ],
    )?;

    Ok(record)
}

pub fn find(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<FileRecord>> {
    conn.query_row("SELECT * FROM files WHERE id = ?", [id.to_string()], FileRecord::from_row)
        .optional()
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> rusqlite::Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM files WHERE user_id = ? ORDER BY uploaded_at")?;
    let files = stmt.query_map([user_id.to_string()], FileRecord::from_row)?;
    files.collect()
}

/// Look up a file the requester owns, or any file for admins.
pub fn fetch_accessible(conn: &Connection, requester: &User, id: Uuid) -> AppResult<FileRecord> {
    let record = find(conn, id)?.ok_or(AppError::NotFound("File"))?;
    if !requester.can_access(record.user_id) {
        return Err(AppError::Forbidden);
    }

    Ok(record)
}

/// Whether any application other than `except` points at the file.
pub fn is_referenced_elsewhere(conn: &Connection, file_id: Uuid, except: Uuid) -> rusqlite::Result<bool> {
    let file_id = file_id.to_string();
    conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM applications
            WHERE id != ?1 AND (transcript = ?2 OR cv = ?2 OR photo = ?2)
         )",
        params![except.to_string(), file_id],
        |row| row.get(0),
    )
}

/// Record freshly stored bytes and link them into the uploader's application.
/// The row and the link commit together or not at all.
pub fn record_upload(
    conn: &mut Connection,
    owner: &User,
    original_name: &str,
    kind: FileKind,
    stored: &StoredFile,
    application_id: Option<Uuid>,
) -> AppResult<FileRecord> {
    let tx = conn.transaction()?;
    let record = insert(&tx, owner.id, original_name, kind, stored)?;

    if let Some(application_id) = application_id.filter(|_| kind.has_application_slot()) {
        if !applications::link_document(&tx, owner, application_id, kind, record.id)? {
            warn!(%application_id, user_id = %owner.id, "Upload not linked to application");
        }
    }

    tx.commit()?;
    Ok(record)
}

pub fn delete(conn: &Connection, id: Uuid) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM files WHERE id = ?", [id.to_string()])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::ApplicationChanges;
    use crate::users::{self, UserProfile};
    use std::path::PathBuf;

    fn stored(name: &str) -> StoredFile {
        StoredFile {
            path: PathBuf::from(format!("uploads/x/{name}")),
            size: 3,
            mime_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn access_is_owner_or_admin() {
        let conn = test_connection();
        let owner = users::insert(&conn, "owner@example.com", "h", false, UserProfile::default()).unwrap();
        let other = users::insert(&conn, "other@example.com", "h", false, UserProfile::default()).unwrap();
        let admin = users::insert(&conn, "admin@example.com", "h", true, UserProfile::default()).unwrap();

        let record = insert(&conn, owner.id, "cv.pdf", FileKind::Cv, &stored("cv.pdf")).unwrap();

        assert_eq!(fetch_accessible(&conn, &owner, record.id).unwrap().id, record.id);
        assert_eq!(fetch_accessible(&conn, &admin, record.id).unwrap().file_type, FileKind::Cv);
        assert!(matches!(fetch_accessible(&conn, &other, record.id), Err(AppError::Forbidden)));
        assert!(matches!(
            fetch_accessible(&conn, &owner, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn lists_only_own_files() {
        let conn = test_connection();
        let owner = users::insert(&conn, "owner@example.com", "h", false, UserProfile::default()).unwrap();
        let other = users::insert(&conn, "other@example.com", "h", false, UserProfile::default()).unwrap();
        insert(&conn, owner.id, "a.pdf", FileKind::Transcript, &stored("a.pdf")).unwrap();
        insert(&conn, other.id, "b.pdf", FileKind::Transcript, &stored("b.pdf")).unwrap();

        let files = list_for_user(&conn, owner.id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "a.pdf");
    }

    #[test]
    fn upload_is_linked_into_own_application() {
        let mut conn = test_connection();
        let owner = users::insert(&conn, "owner@example.com", "h", false, UserProfile::default()).unwrap();
        let (app, _) = applications::submit(&conn, &owner, ApplicationChanges::default()).unwrap();

        let record =
            record_upload(&mut conn, &owner, "cv.pdf", FileKind::Cv, &stored("cv.pdf"), Some(app.id)).unwrap();

        let app = applications::find(&conn, app.id).unwrap().unwrap();
        assert_eq!(app.documents.cv, Some(record.id));
    }

    #[test]
    fn failed_link_rolls_back_the_row() {
        let mut conn = test_connection();
        let owner = users::insert(&conn, "owner@example.com", "h", false, UserProfile::default()).unwrap();
        let (app, _) = applications::submit(&conn, &owner, ApplicationChanges::default()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER block_updates BEFORE UPDATE ON applications
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        )
        .unwrap();

        let result = record_upload(&mut conn, &owner, "cv.pdf", FileKind::Cv, &stored("cv.pdf"), Some(app.id));

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(list_for_user(&conn, owner.id).unwrap().is_empty());
    }
}
