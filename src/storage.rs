//! Uploaded document bytes on local disk, one directory per user.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{FileKind, FileRecord};

#[derive(Debug)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: i64,
    pub mime_type: String,
}

/// Lowercased extension including the dot, empty when there is none.
pub fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Reduce a client supplied filename to a safe basename.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

pub fn validate_extension(kind: FileKind, filename: &str) -> AppResult<()> {
    let Some(allowed) = kind.allowed_extensions() else {
        return Ok(());
    };

    if allowed.contains(&extension(filename).as_str()) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "Invalid file type. Allowed types for {kind}: {}",
            allowed.join(", ")
        )))
    }
}

pub fn stored_name(kind: FileKind, filename: &str) -> String {
    format!("{kind}_{}{}", Uuid::new_v4(), extension(filename))
}

pub fn user_dir(root: &Path, user_id: Uuid) -> PathBuf {
    root.join(user_id.to_string())
}

pub async fn save(root: &Path, user_id: Uuid, kind: FileKind, filename: &str, data: &[u8]) -> AppResult<StoredFile> {
    let dir = user_dir(root, user_id);
    fs::create_dir_all(&dir).await?;

    let path = dir.join(stored_name(kind, filename));
    fs::write(&path, data).await?;
    debug!(path = %path.display(), size = data.len(), "Stored upload");

    Ok(StoredFile {
        mime_type: mime_guess::from_path(&path).first_or_octet_stream().to_string(),
        size: data.len() as i64,
        path,
    })
}

/// Remove a stored file, a file that is already gone is not an error.
pub async fn remove(path: &Path) -> AppResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "File already missing from disk");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Remove the bytes of records whose rows were deleted. Failures are logged;
/// the rows are already gone at this point.
pub async fn discard(records: &[FileRecord]) {
    for record in records {
        if let Err(err) = remove(Path::new(&record.file_path)).await {
            warn!(file_id = %record.id, "Failed to remove file from disk: {err}");
        }
    }
}

pub async fn remove_user_dir(root: &Path, user_id: Uuid) -> AppResult<()> {
    match fs::remove_dir_all(user_dir(root, user_id)).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
pub fn test_root() -> PathBuf {
    std::env::temp_dir().join(format!("applytrack-test-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(extension("Transcript.PDF"), ".pdf");
        assert_eq!(extension("archive.tar.gz"), ".gz");
        assert_eq!(extension("README"), "");
    }

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my cv (final).pdf"), "my_cv__final_.pdf");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn extension_allow_list_per_kind() {
        assert!(validate_extension(FileKind::Transcript, "grades.docx").is_ok());
        assert!(validate_extension(FileKind::Photo, "me.JPEG").is_ok());
        assert!(validate_extension(FileKind::Document, "notes.txt").is_ok());

        let err = validate_extension(FileKind::Cv, "cv.png").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file type. Allowed types for cv: .pdf, .doc, .docx"
        );
    }

    #[test]
    fn stored_names_are_unique() {
        let a = stored_name(FileKind::Photo, "me.png");
        let b = stored_name(FileKind::Photo, "me.png");
        assert!(a.starts_with("photo_") && a.ends_with(".png"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn save_and_remove() {
        let root = test_root();
        let user_id = Uuid::new_v4();

        let stored = save(&root, user_id, FileKind::Cv, "cv.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(stored.size, 8);
        assert_eq!(stored.mime_type, "application/pdf");
        assert!(stored.path.starts_with(user_dir(&root, user_id)));
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"%PDF-1.4");

        remove(&stored.path).await.unwrap();
        assert!(!stored.path.exists());
        // Second removal is a no-op
        remove(&stored.path).await.unwrap();

        remove_user_dir(&root, user_id).await.unwrap();
        assert!(!user_dir(&root, user_id).exists());
        let _ = fs::remove_dir_all(&root).await;
    }
}
