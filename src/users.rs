use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User};

#[derive(Debug, Default, Clone)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: User,
    pub has_application: bool,
    pub application_id: Option<Uuid>,
}

pub fn insert(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    is_admin: bool,
    profile: UserProfile,
) -> AppResult<User> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_owned(),
        password_hash: password_hash.to_owned(),
        is_admin,
        first_name: profile.first_name,
        last_name: profile.last_name,
        contact_number: profile.contact_number,
        created_at: Utc::now(),
    };

    let result = conn.execute(
        "INSERT INTO users (id, email, password_hash, is_admin, first_name, last_name, contact_number, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            user.is_admin,
            user.first_name,
            user.last_name,
            user.contact_number,
            user.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(user),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(AppError::bad_request("Email already registered"))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row("SELECT * FROM users WHERE email = ?", [email], User::from_row)
        .optional()
}

pub fn find_by_id(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<User>> {
    conn.query_row("SELECT * FROM users WHERE id = ?", [id.to_string()], User::from_row)
        .optional()
}

pub fn validate_credentials(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }
    Ok(())
}

/// Create an account from a registration body whose password the caller
/// already hashed. `is_admin` in the body is only honoured when
/// `allow_admin` is set.
pub fn register(conn: &Connection, new_user: NewUser, password_hash: &str, allow_admin: bool) -> AppResult<User> {
    validate_credentials(&new_user.email, &new_user.password)?;

    let email = new_user.email.trim();
    if find_by_email(conn, email)?.is_some() {
        return Err(AppError::bad_request("Email already registered"));
    }

    let user = insert(
        conn,
        email,
        password_hash,
        allow_admin && new_user.is_admin,
        UserProfile {
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            contact_number: new_user.contact_number,
        },
    )?;

    info!(user_id = %user.id, is_admin = user.is_admin, "Registered user");
    Ok(user)
}

/// Check a password against the account found for a login email.
pub fn authenticate(candidate: Option<User>, password: &str) -> AppResult<User> {
    match candidate {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(AppError::InvalidCredentials),
    }
}

pub fn list_with_applications(conn: &Connection) -> rusqlite::Result<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT users.*, (
            SELECT applications.id FROM applications
            WHERE applications.user_id = users.id
            ORDER BY applications.created_at LIMIT 1
         ) AS application_id
         FROM users ORDER BY users.created_at",
    )?;

    let rows = stmt.query_map([], |row| {
        let application_id = crate::db::get_opt_uuid(row, "application_id")?;
        Ok(UserSummary {
            user: User::from_row(row)?,
            has_application: application_id.is_some(),
            application_id,
        })
    })?;

    rows.collect()
}

/// Removes the user row; sessions, applications and file rows cascade.
pub fn delete(conn: &Connection, id: Uuid) -> rusqlite::Result<bool> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?", [id.to_string()])?;
    Ok(deleted > 0)
}

/// Create the initial admin account when the database has no users yet.
pub fn seed_admin(conn: &Connection, email: &str, password: &str) -> AppResult<Option<User>> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(None);
    }

    let user = insert(
        conn,
        email,
        &hash_password(password)?,
        true,
        UserProfile {
            first_name: Some("Admin".to_string()),
            last_name: Some("User".to_string()),
            contact_number: None,
        },
    )?;

    warn!("Created default admin account {email}, change its password");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications;
    use crate::auth::{create_auth_token, find_session};
    use crate::db::test_connection;
    use crate::files;
    use crate::models::FileKind;
    use crate::storage::StoredFile;
    use serde_json::json;
    use std::path::PathBuf;

    fn new_user(email: &str, is_admin: bool) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "secret".to_string(),
            is_admin,
            first_name: Some("Ada".to_string()),
            last_name: None,
            contact_number: None,
        }
    }

    fn register_plain(conn: &Connection, body: NewUser, allow_admin: bool) -> AppResult<User> {
        // Low cost keeps the tests fast
        let hashed = bcrypt::hash(&body.password, 4)?;
        register(conn, body, &hashed, allow_admin)
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let conn = test_connection();
        register_plain(&conn, new_user("ada@example.com", false), false).unwrap();

        let err = register_plain(&conn, new_user("ada@example.com", false), false).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref msg) if msg == "Email already registered"));
    }

    #[test]
    fn public_registration_never_grants_admin() {
        let conn = test_connection();
        let user = register_plain(&conn, new_user("eve@example.com", true), false).unwrap();
        assert!(!user.is_admin);

        let admin = register_plain(&conn, new_user("root@example.com", true), true).unwrap();
        assert!(admin.is_admin);
    }

    #[test]
    fn missing_credentials_are_bad_requests() {
        let conn = test_connection();
        let mut body = new_user("", false);
        body.password.clear();
        assert!(matches!(register(&conn, body, "hash", false), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_credentials("ada@example.com", ""), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn authenticate_checks_password() {
        let conn = test_connection();
        register_plain(&conn, new_user("ada@example.com", false), false).unwrap();

        let candidate = || find_by_email(&conn, "ada@example.com").unwrap();
        assert!(authenticate(candidate(), "secret").is_ok());
        assert!(matches!(authenticate(candidate(), "wrong"), Err(AppError::InvalidCredentials)));
        assert!(matches!(authenticate(None, "secret"), Err(AppError::InvalidCredentials)));
    }

    #[test]
    fn seeds_admin_only_once() {
        let conn = test_connection();
        let admin = seed_admin(&conn, "admin@example.com", "admin123").unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(seed_admin(&conn, "other@example.com", "pw").unwrap().is_none());
    }

    #[test]
    fn listing_reports_application_presence() {
        let conn = test_connection();
        let user = insert(&conn, "ada@example.com", "hash", false, UserProfile::default()).unwrap();
        let summaries = list_with_applications(&conn).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].user.id, user.id);
        assert!(!summaries[0].has_application);
    }

    #[test]
    fn delete_cascades_to_owned_rows() {
        let conn = test_connection();
        let user = insert(&conn, "ada@example.com", "hash", false, UserProfile::default()).unwrap();
        let stored = StoredFile {
            path: PathBuf::from("uploads/x/cv.pdf"),
            size: 3,
            mime_type: "application/pdf".to_string(),
        };
        let file = files::insert(&conn, user.id, "cv.pdf", FileKind::Cv, &stored).unwrap();
        let changes = serde_json::from_value(json!({ "cv": file.id.to_string() })).unwrap();
        applications::submit(&conn, &user, changes).unwrap();
        let token = create_auth_token(&conn, &user.id).unwrap();

        assert!(delete(&conn, user.id).unwrap());

        for table in ["applications", "files", "auth_tokens"] {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?"),
                    [user.id.to_string()],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "{table} still has rows");
        }
        assert!(find_session(&conn, &token).unwrap().is_none());
        assert!(!delete(&conn, user.id).unwrap());
    }
}
