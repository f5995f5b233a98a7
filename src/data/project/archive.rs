use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Violation;

const ARCHIVE_MEDIA_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
    "multipart/x-zip",
];

/// Metadata of an uploaded project archive; the bytes themselves are stored elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveUpload {
    pub file_name: String,
    #[serde(default)]
    pub media_type: Option<String>,
    pub size: u64,
}

impl ArchiveUpload {
    pub fn is_archive(&self) -> bool {
        let by_media_type = self
            .media_type
            .as_deref()
            .map(|it| ARCHIVE_MEDIA_TYPES.contains(&it.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);

        by_media_type || self.file_name.to_ascii_lowercase().ends_with(".zip")
    }

    /// Accepts ZIP archives up to `limit` bytes, returning the reference to store.
    pub fn validate(&self, limit: u64) -> Result<String, Violation> {
        if !self.is_archive() {
            tracing::debug!("rejected non-archive upload {}", self.file_name);
            return Err(Violation::InvalidFileType {
                file_name: self.file_name.clone(),
            });
        }

        if self.size > limit {
            tracing::debug!("rejected {} byte upload", self.size);
            return Err(Violation::FileTooLarge {
                size: self.size,
                limit,
            });
        }

        Ok(self.file_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_ARCHIVE_BYTES;

    fn upload(name: &str, media_type: Option<&str>, size: u64) -> ArchiveUpload {
        ArchiveUpload {
            file_name: name.into(),
            media_type: media_type.map(String::from),
            size,
        }
    }

    #[test]
    fn zip_by_extension_or_media_type() {
        assert!(upload("project.zip", None, 10).is_archive());
        assert!(upload("PROJECT.ZIP", None, 10).is_archive());
        assert!(upload("project", Some("application/zip"), 10).is_archive());
        assert!(upload("project.bin", Some("application/x-zip-compressed"), 10).is_archive());
        assert!(!upload("project.tar.gz", Some("application/gzip"), 10).is_archive());
        assert!(!upload("notes.txt", None, 10).is_archive());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = upload("report.pdf", Some("application/pdf"), 10)
            .validate(DEFAULT_MAX_ARCHIVE_BYTES)
            .unwrap_err();
        assert_eq!(
            err,
            Violation::InvalidFileType {
                file_name: "report.pdf".into()
            }
        );
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        assert_eq!(
            upload("p.zip", None, DEFAULT_MAX_ARCHIVE_BYTES).validate(DEFAULT_MAX_ARCHIVE_BYTES),
            Ok("p.zip".to_string())
        );

        let err = upload("p.zip", None, DEFAULT_MAX_ARCHIVE_BYTES + 1)
            .validate(DEFAULT_MAX_ARCHIVE_BYTES)
            .unwrap_err();
        assert_eq!(
            err,
            Violation::FileTooLarge {
                size: DEFAULT_MAX_ARCHIVE_BYTES + 1,
                limit: DEFAULT_MAX_ARCHIVE_BYTES,
            }
        );
    }
}
