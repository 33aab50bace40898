// Copyright 2025 Cadence Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Input validation utilities.
//!
//! Validation failures are rejected immediately, never retried, and logged
//! by the caller with enough context to reproduce. Rules cover:
//! - identifier shape (record ids, workflow names, provider tags)
//! - LinkedIn invitation notes (trimmed, non-empty, at most 300 chars)
//! - video download destinations (confinement + extension allowlist)

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Maximum length of a LinkedIn connection note, imposed by LinkedIn itself.
pub const MAX_LINKEDIN_MESSAGE_LEN: usize = 300;
/// Maximum allowed length for workflow names
pub const MAX_WORKFLOW_NAME_LEN: usize = 256;
/// Maximum allowed length for record identifiers
pub const MAX_ID_LEN: usize = 128;
/// Video file extensions the download path may carry
pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];

/// Validation error types.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length
    #[error("Input exceeds maximum length of {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// Input is empty when a value is required
    #[error("Required field cannot be empty: {field}")]
    Empty { field: String },

    /// Input contains invalid characters
    #[error("Input contains invalid characters: {details}")]
    InvalidCharacters { details: String },

    /// Input format is invalid
    #[error("Invalid format for {field}: {details}")]
    InvalidFormat { field: String, details: String },

    /// A path escapes its confinement directory or carries a bad extension
    #[error("Unsafe path: {details}")]
    UnsafePath { details: String },
}

/// Input validator.
pub struct Validator;

impl Validator {
    /// Validates a workflow name.
    ///
    /// Rules: non-empty after trimming, at most 256 characters, no control
    /// characters.
    pub fn validate_workflow_name(name: &str) -> Result<String, ValidationError> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "workflow_name".to_string(),
            });
        }

        if trimmed.len() > MAX_WORKFLOW_NAME_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_WORKFLOW_NAME_LEN,
                actual: trimmed.len(),
            });
        }

        if trimmed.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacters {
                details: "workflow name cannot contain control characters".to_string(),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Validates a record identifier (instance, enrollment, execution ids).
    ///
    /// Rules: non-empty, at most 128 characters, alphanumeric plus
    /// underscore and hyphen. These ids are interpolated into record-id
    /// positions, so the character set is strict.
    pub fn validate_id(id: &str) -> Result<String, ValidationError> {
        let trimmed = id.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "id".to_string(),
            });
        }

        if trimmed.len() > MAX_ID_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_ID_LEN,
                actual: trimmed.len(),
            });
        }

        if !trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidCharacters {
                details: "id can only contain alphanumeric characters, underscore, and hyphen"
                    .to_string(),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Validates a LinkedIn invitation note.
    ///
    /// Rules: non-empty after trimming, at most 300 characters. The trimmed
    /// form is what gets dispatched.
    pub fn validate_linkedin_message(message: &str) -> Result<String, ValidationError> {
        let trimmed = message.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "linkedin_message".to_string(),
            });
        }

        if trimmed.chars().count() > MAX_LINKEDIN_MESSAGE_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_LINKEDIN_MESSAGE_LEN,
                actual: trimmed.chars().count(),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Validates a video download destination.
    ///
    /// The destination must stay inside `download_dir` after lexically
    /// resolving `.`/`..` components (no filesystem access, so the check
    /// also covers not-yet-existing files), and its extension must be one of
    /// `.mp4`, `.webm`, `.mov`.
    pub fn validate_download_path(
        download_dir: &Path,
        destination: &Path,
    ) -> Result<PathBuf, ValidationError> {
        let extension = destination
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ValidationError::UnsafePath {
                details: "destination has no file extension".to_string(),
            })?;

        if !ALLOWED_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::UnsafePath {
                details: format!(
                    "extension '.{}' is not allowed (expected one of .mp4, .webm, .mov)",
                    extension
                ),
            });
        }

        // Anchor relative destinations inside the download directory, then
        // resolve traversal components lexically.
        let candidate = if destination.is_absolute() {
            destination.to_path_buf()
        } else {
            download_dir.join(destination)
        };

        let mut resolved = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(ValidationError::UnsafePath {
                            details: "path traversal above filesystem root".to_string(),
                        });
                    }
                }
                Component::CurDir => {}
                other => resolved.push(other),
            }
        }

        let mut root = PathBuf::new();
        for component in download_dir.components() {
            match component {
                Component::CurDir => {}
                other => root.push(other),
            }
        }

        if !resolved.starts_with(&root) {
            return Err(ValidationError::UnsafePath {
                details: format!(
                    "destination '{}' escapes the download directory",
                    destination.display()
                ),
            });
        }

        Ok(resolved)
    }

    /// Validates an HTTPS download URL against a host allowlist.
    pub fn validate_download_url(
        url: &str,
        allowed_domains: &[String],
    ) -> Result<(), ValidationError> {
        let rest = url
            .strip_prefix("https://")
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "url".to_string(),
                details: "download URLs must use https".to_string(),
            })?;

        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("")
            .split('@')
            .next_back()
            .unwrap_or("")
            .split(':')
            .next()
            .unwrap_or("")
            .to_lowercase();

        if host.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                details: "download URL has no host".to_string(),
            });
        }

        let allowed = allowed_domains.iter().any(|domain| {
            let domain = domain.to_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        });

        if !allowed {
            return Err(ValidationError::InvalidFormat {
                field: "url".to_string(),
                details: format!("host '{}' is not on the provider's allowed-domain list", host),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_name_rules() {
        assert_eq!(
            Validator::validate_workflow_name("  prospect pipeline  ").unwrap(),
            "prospect pipeline"
        );
        assert!(Validator::validate_workflow_name("   ").is_err());
        assert!(Validator::validate_workflow_name(&"x".repeat(300)).is_err());
        assert!(Validator::validate_workflow_name("bad\x07name").is_err());
    }

    #[test]
    fn test_id_rules() {
        assert!(Validator::validate_id("inst_123-abc").is_ok());
        assert!(Validator::validate_id("").is_err());
        assert!(Validator::validate_id("drop table; --").is_err());
        assert!(Validator::validate_id("id with spaces").is_err());
    }

    #[test]
    fn test_linkedin_message_bounds() {
        assert!(Validator::validate_linkedin_message("Hi, let's connect!").is_ok());
        assert!(Validator::validate_linkedin_message("").is_err());
        assert!(Validator::validate_linkedin_message("   \t  ").is_err());

        let exactly_300 = "a".repeat(300);
        assert!(Validator::validate_linkedin_message(&exactly_300).is_ok());

        let over = "a".repeat(301);
        assert!(Validator::validate_linkedin_message(&over).is_err());
    }

    #[test]
    fn test_linkedin_message_trims_before_length_check() {
        let padded = format!("  {}  ", "a".repeat(300));
        assert_eq!(
            Validator::validate_linkedin_message(&padded).unwrap().len(),
            300
        );
    }

    #[test]
    fn test_download_path_confinement() {
        let dir = Path::new("/var/lib/cadence/videos");

        let ok = Validator::validate_download_path(dir, Path::new("intro.mp4")).unwrap();
        assert_eq!(ok, Path::new("/var/lib/cadence/videos/intro.mp4"));

        // Traversal out of the directory
        assert!(Validator::validate_download_path(dir, Path::new("../../etc/passwd.mp4")).is_err());

        // Absolute path outside the directory
        assert!(Validator::validate_download_path(dir, Path::new("/tmp/out.mp4")).is_err());

        // Traversal that stays inside is fine
        let ok =
            Validator::validate_download_path(dir, Path::new("nested/../intro.webm")).unwrap();
        assert_eq!(ok, Path::new("/var/lib/cadence/videos/intro.webm"));
    }

    #[test]
    fn test_download_path_extension_allowlist() {
        let dir = Path::new("/var/lib/cadence/videos");
        assert!(Validator::validate_download_path(dir, Path::new("a.mp4")).is_ok());
        assert!(Validator::validate_download_path(dir, Path::new("a.webm")).is_ok());
        assert!(Validator::validate_download_path(dir, Path::new("a.MOV")).is_ok());
        assert!(Validator::validate_download_path(dir, Path::new("a.exe")).is_err());
        assert!(Validator::validate_download_path(dir, Path::new("a")).is_err());
    }

    #[test]
    fn test_download_url_rules() {
        let allowed = vec!["heygen.com".to_string()];

        assert!(Validator::validate_download_url(
            "https://cdn.heygen.com/videos/v1.mp4",
            &allowed
        )
        .is_ok());
        assert!(Validator::validate_download_url("https://heygen.com/v1.mp4", &allowed).is_ok());

        // Plain HTTP
        assert!(
            Validator::validate_download_url("http://cdn.heygen.com/v1.mp4", &allowed).is_err()
        );
        // Host not on the allowlist
        assert!(
            Validator::validate_download_url("https://evil.example.com/v1.mp4", &allowed).is_err()
        );
        // Suffix spoofing does not pass the suffix check
        assert!(
            Validator::validate_download_url("https://notheygen.com/v1.mp4", &allowed).is_err()
        );
    }
}
