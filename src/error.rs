use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::data::project::ProjectStatus;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("security material missing: {0}")]
    MissingSecret(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    // External errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}

/// A single unmet input rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum Violation {
    MissingField { field: &'static str },
    InvalidEmail { email: String },
    PasswordLength { min: usize, max: usize },
    /// Neither a GitHub link nor an archive was supplied.
    MissingSource,
    MalformedGithubLink { link: String },
    ConflictingDestination,
    UnknownClassKey { key: String },
    NotATeacher { id: String },
    InvalidFileType {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    FileTooLarge { size: u64, limit: u64 },
    IncompleteRubric { field: &'static str },
    ScoreOutOfRange { field: &'static str, score: i32 },
    MissingFeedback,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::MissingField { field } => write!(f, "'{}' is required", field),
            Violation::InvalidEmail { email } => {
                write!(f, "'{}' is not a valid e-mail address", email)
            }
            Violation::PasswordLength { min, max } => {
                write!(f, "password must be {} to {} bytes long", min, max)
            }
            Violation::MissingSource => {
                write!(f, "either a GitHub link or a project archive is required")
            }
            Violation::MalformedGithubLink { link } => write!(
                f,
                "'{}' is not a https://github.com/<owner>/<repo> link",
                link
            ),
            Violation::ConflictingDestination => {
                write!(f, "a project goes to a class or to a teacher, not both")
            }
            Violation::UnknownClassKey { key } => write!(f, "no class uses key '{}'", key),
            Violation::NotATeacher { id } => write!(f, "user '{}' is not a teacher", id),
            Violation::InvalidFileType { file_name } => {
                write!(f, "'{}' is not a ZIP archive", file_name)
            }
            Violation::FileTooLarge { size, limit } => write!(
                f,
                "archive is {} bytes, the limit is {} bytes",
                size, limit
            ),
            Violation::IncompleteRubric { field } => write!(f, "'{}' was not scored", field),
            Violation::ScoreOutOfRange { field, score } => {
                write!(f, "'{}' score {} is outside 1..=10", field, score)
            }
            Violation::MissingFeedback => write!(f, "feedback is required"),
        }
    }
}

/// Every violated rule of one request, in the order they were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Violations {
        Violations(Vec::new())
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, violation: &Violation) -> bool {
        self.0.contains(violation)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok(())` when nothing was violated, a validation error otherwise.
    pub fn into_result(self) -> Result<(), PortalError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PortalError::Validation(self))
        }
    }
}

impl From<Violation> for Violations {
    fn from(violation: Violation) -> Self {
        Violations(vec![violation])
    }
}

impl Display for Violations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("validation failed: {0}")]
    Validation(Violations),
    #[error("{kind} '{id}' doesn't exist")]
    NotFound { kind: &'static str, id: String },
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("class key '{0}' is already in use")]
    DuplicateKey(String),
    #[error("bad email or password")]
    InvalidCredentials,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("project can't move from {from} to {to}")]
    InvalidTransition {
        from: ProjectStatus,
        to: ProjectStatus,
    },
}

impl PortalError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> PortalError {
        PortalError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn not_authorized(reason: impl ToString) -> PortalError {
        PortalError::NotAuthorized(reason.to_string())
    }
}

impl From<Violation> for PortalError {
    fn from(violation: Violation) -> Self {
        PortalError::Validation(violation.into())
    }
}
