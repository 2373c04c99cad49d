use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::files;
use crate::models::{
    Application, ApplicationChanges, DocumentChanges, Documents, FileKind, FileRecord, NotesChange,
    ProfileDetails, StatusChanges, StatusDetails, User,
};

const DOCUMENT_COLUMNS: [&str; 3] = ["transcript", "cv", "photo"];

/// Every column an application write touches after creation, in bind order.
fn mutable_columns() -> Vec<&'static str> {
    let mut columns = Vec::new();
    columns.extend_from_slice(ProfileDetails::COLUMNS);
    columns.extend_from_slice(&DOCUMENT_COLUMNS);
    columns.extend_from_slice(StatusDetails::COLUMNS);
    columns.extend_from_slice(&["admin_notes", "updated_at"]);
    columns
}

fn quoted(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|column| format!("\"{column}\"")).collect()
}

fn persist(conn: &Connection, app: &Application, create: bool) -> rusqlite::Result<()> {
    let transcript = app.documents.transcript.map(|id| id.to_string());
    let cv = app.documents.cv.map(|id| id.to_string());
    let photo = app.documents.photo.map(|id| id.to_string());
    let updated_at = app.updated_at.to_rfc3339();
    let id = app.id.to_string();

    let mut values: Vec<&dyn ToSql> = app.profile.values();
    values.extend([&transcript as &dyn ToSql, &cv, &photo]);
    values.extend(app.status.values());
    values.push(&app.admin_notes);
    values.push(&updated_at);

    let columns = quoted(&mutable_columns());
    if create {
        let user_id = app.user_id.to_string();
        let created_at = app.created_at.to_rfc3339();
        values.extend([&id as &dyn ToSql, &user_id, &created_at]);

        let sql = format!(
            "INSERT INTO applications ({}, id, user_id, created_at) VALUES ({})",
            columns.join(", "),
            vec!["?"; columns.len() + 3].join(", ")
        );
        conn.execute(&sql, values.as_slice())?;
    } else {
        values.push(&id);

        let assignments: Vec<String> = columns.iter().map(|column| format!("{column} = ?")).collect();
        let sql = format!("UPDATE applications SET {} WHERE id = ?", assignments.join(", "));
        conn.execute(&sql, values.as_slice())?;
    }

    Ok(())
}

pub fn find(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Application>> {
    conn.query_row("SELECT * FROM applications WHERE id = ?", [id.to_string()], Application::from_row)
        .optional()
}

pub fn find_for_user(conn: &Connection, user_id: Uuid) -> rusqlite::Result<Option<Application>> {
    conn.query_row(
        "SELECT * FROM applications WHERE user_id = ? ORDER BY created_at LIMIT 1",
        [user_id.to_string()],
        Application::from_row,
    )
    .optional()
}

pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<Application>> {
    let mut stmt = conn.prepare("SELECT * FROM applications ORDER BY created_at")?;
    let applications = stmt.query_map([], Application::from_row)?;
    applications.collect()
}

pub fn fetch_accessible(conn: &Connection, requester: &User, id: Uuid) -> AppResult<Application> {
    let app = find(conn, id)?.ok_or(AppError::NotFound("Application"))?;
    if !requester.can_access(app.user_id) {
        return Err(AppError::Forbidden);
    }

    Ok(app)
}

/// Linked documents must exist and belong to the application's owner.
fn check_documents(conn: &Connection, owner: Uuid, changes: &DocumentChanges) -> AppResult<()> {
    for file_id in changes.linked_ids() {
        match files::find(conn, file_id)? {
            Some(file) if file.user_id == owner => {}
            _ => {
                return Err(AppError::bad_request(format!(
                    "File {file_id} does not belong to the applicant"
                )))
            }
        }
    }

    Ok(())
}

fn apply_changes(conn: &Connection, app: &mut Application, changes: ApplicationChanges) -> AppResult<()> {
    check_documents(conn, app.user_id, &changes.documents)?;

    changes.profile.apply(&mut app.profile);
    changes.documents.apply(&mut app.documents);
    changes.status.apply(&mut app.status);
    Ok(())
}

fn mutate<F>(conn: &Connection, requester: &User, id: Uuid, change: F) -> AppResult<Application>
where
    F: FnOnce(&mut Application) -> AppResult<()>,
{
    let mut app = fetch_accessible(conn, requester, id)?;
    change(&mut app)?;
    app.updated_at = Utc::now();
    persist(conn, &app, false)?;

    debug!(application_id = %app.id, requester = %requester.id, "Updated application");
    Ok(app)
}

/// Create the user's application, or update it if one exists. The flag is
/// `true` when a new application was created.
pub fn submit(conn: &Connection, user: &User, changes: ApplicationChanges) -> AppResult<(Application, bool)> {
    if let Some(mut app) = find_for_user(conn, user.id)? {
        apply_changes(conn, &mut app, changes)?;
        app.updated_at = Utc::now();
        persist(conn, &app, false)?;
        return Ok((app, false));
    }

    let now = Utc::now();
    let mut app = Application {
        id: Uuid::new_v4(),
        user_id: user.id,
        profile: ProfileDetails::default(),
        documents: Documents::default(),
        status: StatusDetails::default(),
        admin_notes: None,
        created_at: now,
        updated_at: now,
    };
    apply_changes(conn, &mut app, changes)?;
    persist(conn, &app, true)?;

    info!(application_id = %app.id, user_id = %user.id, "Application submitted");
    Ok((app, true))
}

pub fn update(conn: &Connection, requester: &User, id: Uuid, changes: ApplicationChanges) -> AppResult<Application> {
    mutate(conn, requester, id, |app| apply_changes(conn, app, changes))
}

pub fn update_status(conn: &Connection, requester: &User, id: Uuid, changes: StatusChanges) -> AppResult<Application> {
    mutate(conn, requester, id, |app| {
        changes.apply(&mut app.status);
        Ok(())
    })
}

/// Callers must have checked that `admin` is an admin.
pub fn update_notes(conn: &Connection, admin: &User, id: Uuid, change: NotesChange) -> AppResult<Application> {
    mutate(conn, admin, id, |app| {
        app.admin_notes = change.admin_notes;
        Ok(())
    })
}

/// Point a document field of the owner's application at a freshly uploaded
/// file. Applications of other users are left alone.
pub fn link_document(
    conn: &Connection,
    owner: &User,
    application_id: Uuid,
    kind: FileKind,
    file_id: Uuid,
) -> AppResult<bool> {
    let Some(mut app) = find(conn, application_id)? else {
        return Ok(false);
    };
    if app.user_id != owner.id {
        return Ok(false);
    }

    let Some(slot) = app.documents.slot_mut(kind) else {
        return Ok(false);
    };
    *slot = Some(file_id);
    app.updated_at = Utc::now();
    persist(conn, &app, false)?;

    Ok(true)
}

/// Delete an application and the file rows no other application references.
/// Returns the removed file records so their bytes can be discarded.
pub fn delete(conn: &mut Connection, requester: &User, id: Uuid) -> AppResult<Vec<FileRecord>> {
    let tx = conn.transaction()?;
    let app = fetch_accessible(&tx, requester, id)?;

    let mut orphaned = Vec::new();
    for file_id in app.documents.file_ids() {
        if files::is_referenced_elsewhere(&tx, file_id, app.id)? {
            debug!(%file_id, "File still referenced, keeping it");
            continue;
        }
        if let Some(record) = files::find(&tx, file_id)? {
            files::delete(&tx, file_id)?;
            orphaned.push(record);
        }
    }

    tx.execute("DELETE FROM applications WHERE id = ?", [app.id.to_string()])?;
    tx.commit()?;

    info!(application_id = %id, removed_files = orphaned.len(), "Application deleted");
    Ok(orphaned)
}
