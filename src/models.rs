use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Row, ToSql,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::db::{get_opt_uuid, get_timestamp, get_uuid};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: get_uuid(row, "id")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            is_admin: row.get("is_admin")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            contact_number: row.get("contact_number")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    /// Admins may touch anything, everyone else only what they own.
    pub fn can_access(&self, owner: Uuid) -> bool {
        self.is_admin || self.id == owner
    }
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub contact_number: Option<String>,
}

/// Logical role of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Transcript,
    Cv,
    Photo,
    Document,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Transcript => "transcript",
            FileKind::Cv => "cv",
            FileKind::Photo => "photo",
            FileKind::Document => "document",
        }
    }

    /// `None` means any extension is accepted.
    pub fn allowed_extensions(&self) -> Option<&'static [&'static str]> {
        match self {
            FileKind::Transcript | FileKind::Cv => Some(&[".pdf", ".doc", ".docx"]),
            FileKind::Photo => Some(&[".jpg", ".jpeg", ".png"]),
            FileKind::Document => None,
        }
    }

    /// Whether an application has a document field of this kind.
    pub fn has_application_slot(&self) -> bool {
        !matches!(self, FileKind::Document)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcript" => Ok(FileKind::Transcript),
            "cv" => Ok(FileKind::Cv),
            "photo" => Ok(FileKind::Photo),
            "document" => Ok(FileKind::Document),
            other => Err(format!("Unknown file type: {other}")),
        }
    }
}

impl ToSql for FileKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_type: FileKind,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FileRecord {
            id: get_uuid(row, "id")?,
            user_id: get_uuid(row, "user_id")?,
            original_name: row.get("original_name")?,
            file_path: row.get("file_path")?,
            file_type: row.get("file_type")?,
            mime_type: row.get("mime_type")?,
            file_size: row.get("file_size")?,
            uploaded_at: get_timestamp(row, "uploaded_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Planning,
    Applied,
    Accepted,
    Enrolled,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 4] = [
        EnrollmentStatus::Planning,
        EnrollmentStatus::Applied,
        EnrollmentStatus::Accepted,
        EnrollmentStatus::Enrolled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Planning => "planning",
            EnrollmentStatus::Applied => "applied",
            EnrollmentStatus::Accepted => "accepted",
            EnrollmentStatus::Enrolled => "enrolled",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid enrollment status: {s}"))
    }
}

impl ToSql for EnrollmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EnrollmentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Patch semantics for one field: absent leaves it alone, `null` or a blank
/// string clears it, anything else must parse as `T`.
fn lenient<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Value(T),
        Text(String),
    }

    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(Some(None)),
        Some(Raw::Value(value)) => Ok(Some(Some(value))),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(Some(None)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(|value| Some(Some(value)))
            .map_err(de::Error::custom),
    }
}

/// Declares a group of nullable application columns together with the
/// allow-listed change set that may write them.
macro_rules! field_group {
    ($details:ident, $changes:ident { $($name:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        pub struct $details {
            $(pub $name: Option<$ty>,)*
        }

        impl $details {
            pub const COLUMNS: &'static [&'static str] = &[$(stringify!($name)),*];

            pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
                Ok(Self {
                    $($name: row.get(stringify!($name))?,)*
                })
            }

            pub fn values(&self) -> Vec<&dyn ToSql> {
                vec![$(&self.$name as &dyn ToSql),*]
            }
        }

        #[derive(Debug, Default, Deserialize)]
        pub struct $changes {
            $(
                #[serde(default, deserialize_with = "lenient")]
                pub $name: Option<Option<$ty>>,
            )*
        }

        impl $changes {
            pub fn apply(self, target: &mut $details) {
                $(
                    if let Some(value) = self.$name {
                        target.$name = value;
                    }
                )*
            }
        }
    };
}

field_group!(ProfileDetails, ProfileChanges {
    first_name: String,
    middle_name: String,
    last_name: String,
    contact_number: String,
    gender: String,
    final_percentage: f64,
    tentative_ranking: String,
    final_year_project: String,
    other_projects: String,
    publications: String,
    extracurricular: String,
    professional_experience: String,
    strong_points: String,
    weak_points: String,
    preferred_programs: String,
    references: String,
    statement_of_purpose: String,
    intended_research_areas: String,
    english_proficiency: String,
    leadership_experience: String,
    availability_to_start: String,
    additional_certifications: String,
});

field_group!(StatusDetails, StatusChanges {
    enrollment_status: EnrollmentStatus,
    target_universities: String,
    applied_universities: String,
    accepted_universities: String,
    enrolled_university: String,
    study_program: String,
    admission_year: i64,
    scholarship_status: String,
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Documents {
    pub transcript: Option<Uuid>,
    pub cv: Option<Uuid>,
    pub photo: Option<Uuid>,
}

impl Documents {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Documents {
            transcript: get_opt_uuid(row, "transcript")?,
            cv: get_opt_uuid(row, "cv")?,
            photo: get_opt_uuid(row, "photo")?,
        })
    }

    pub fn slot_mut(&mut self, kind: FileKind) -> Option<&mut Option<Uuid>> {
        match kind {
            FileKind::Transcript => Some(&mut self.transcript),
            FileKind::Cv => Some(&mut self.cv),
            FileKind::Photo => Some(&mut self.photo),
            FileKind::Document => None,
        }
    }

    /// Referenced file ids without duplicates.
    pub fn file_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(3);
        for id in [self.transcript, self.cv, self.photo].into_iter().flatten() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentChanges {
    #[serde(default, deserialize_with = "lenient")]
    pub transcript: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "lenient")]
    pub cv: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "lenient")]
    pub photo: Option<Option<Uuid>>,
}

impl DocumentChanges {
    /// File ids this change set wants to link.
    pub fn linked_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        [self.transcript, self.cv, self.photo]
            .into_iter()
            .flatten()
            .flatten()
    }

    pub fn apply(self, target: &mut Documents) {
        if let Some(value) = self.transcript {
            target.transcript = value;
        }
        if let Some(value) = self.cv {
            target.cv = value;
        }
        if let Some(value) = self.photo {
            target.photo = value;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub profile: ProfileDetails,
    #[serde(flatten)]
    pub documents: Documents,
    #[serde(flatten)]
    pub status: StatusDetails,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Application {
            id: get_uuid(row, "id")?,
            user_id: get_uuid(row, "user_id")?,
            profile: ProfileDetails::from_row(row)?,
            documents: Documents::from_row(row)?,
            status: StatusDetails::from_row(row)?,
            admin_notes: row.get("admin_notes")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

/// Body accepted by submit and update: every applicant-editable field.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationChanges {
    #[serde(flatten)]
    pub profile: ProfileChanges,
    #[serde(flatten)]
    pub documents: DocumentChanges,
    #[serde(flatten)]
    pub status: StatusChanges,
}

#[derive(Debug, Deserialize)]
pub struct NotesChange {
    pub admin_notes: Option<String>,
}
