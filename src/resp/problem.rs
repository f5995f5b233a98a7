use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::hyper::header::CONTENT_LANGUAGE;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::{BackendError, PortalError};

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn instance_uri(&mut self, value: String) -> &mut Problem {
        self.instance_uri = Some(value);
        self
    }

    /// Adds `value` to the body; values that can't be represented as JSON become `null`.
    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.body.insert(key.to_string(), value);
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body;

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri));
        body.insert(String::from("title"), Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), Value::from(detail));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        if let Some(instance) = self.instance_uri {
            body.insert(String::from("instance"), Value::from(instance));
        }

        let body_string = Value::Object(body).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header(CONTENT_LANGUAGE.as_str(), "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    #[inline]
    pub fn not_found_problem() -> Problem {
        Problem::new_untyped(Status::NotFound, "Requested resource doesn't exist.")
    }

    pub fn unknown_class_key(key: &str) -> Problem {
        Problem::new(
            Status::NotFound,
            "/problems/unknown-class-key",
            "No class uses this key.",
        )
        .insert_str("key", key)
        .clone()
    }
}

impl From<PortalError> for Problem {
    fn from(e: PortalError) -> Self {
        let detail = e.to_string();
        let mut problem = match e {
            PortalError::Validation(violations) => {
                let mut problem = Problem::new(
                    Status::BadRequest,
                    "/problems/validation",
                    "Submitted data is invalid.",
                );
                problem.insert("violations", violations);
                problem
            }
            PortalError::NotFound { kind, id } => {
                let mut problem = Problem::new(
                    Status::NotFound,
                    "/problems/not-found",
                    "Requested resource doesn't exist.",
                );
                problem.insert_str("kind", kind).insert_str("id", id);
                problem
            }
            PortalError::DuplicateEmail(email) => {
                let mut problem = Problem::new(
                    Status::Conflict,
                    "/problems/duplicate-email",
                    "Email is already registered.",
                );
                problem.insert_str("email", email);
                problem
            }
            PortalError::DuplicateKey(key) => {
                let mut problem = Problem::new(
                    Status::Conflict,
                    "/problems/duplicate-key",
                    "Class key is already in use.",
                );
                problem.insert_str("key", key);
                problem
            }
            PortalError::InvalidCredentials => Problem::new(
                Status::Unauthorized,
                "/problems/invalid-credentials",
                "Bad email or password.",
            ),
            PortalError::NotAuthenticated => {
                Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
            }
            PortalError::NotAuthorized(_) => Problem::new(
                Status::Forbidden,
                "/problems/not-authorized",
                "Operation isn't allowed for this user.",
            ),
            PortalError::InvalidTransition { from, to } => {
                let mut problem = Problem::new(
                    Status::Conflict,
                    "/problems/invalid-transition",
                    "Project can't change into the requested status.",
                );
                problem.insert("from", from).insert("to", to);
                problem
            }
        };

        problem.detail(detail);
        problem
    }
}

impl From<BackendError> for Problem {
    fn from(e: BackendError) -> Self {
        tracing::error!("backend error while handling request: {}", e);
        Problem::new_untyped(Status::InternalServerError, "Server is misconfigured.")
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing JSON data.",
        )
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => {
                Problem::new_untyped(Status::Unauthorized, "Expired JWT signature.")
            }
            _ => Problem::new_untyped(Status::Unauthorized, "Error while handling JWT."),
        }
    }
}

impl From<std::io::Error> for Problem {
    fn from(_: std::io::Error) -> Self {
        Problem::new_untyped(Status::InternalServerError, "Server IO error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::project::ProjectStatus;
    use crate::error::Violation;

    #[test]
    fn portal_errors_map_to_statuses() {
        let cases = [
            (PortalError::from(Violation::MissingSource), Status::BadRequest),
            (PortalError::not_found("project", "x"), Status::NotFound),
            (PortalError::DuplicateEmail("a@b.c".into()), Status::Conflict),
            (PortalError::DuplicateKey("ABCD1234".into()), Status::Conflict),
            (PortalError::InvalidCredentials, Status::Unauthorized),
            (PortalError::NotAuthenticated, Status::Unauthorized),
            (PortalError::not_authorized("no"), Status::Forbidden),
            (
                PortalError::InvalidTransition {
                    from: ProjectStatus::Graded,
                    to: ProjectStatus::Graded,
                },
                Status::Conflict,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(Problem::from(error).status, status);
        }
    }

    #[test]
    fn validation_problem_lists_violations() {
        let problem = Problem::from(PortalError::from(Violation::MissingField { field: "title" }));
        assert_eq!(problem.body["violations"][0]["rule"], "missingField");
        assert_eq!(problem.body["violations"][0]["field"], "title");
        assert_eq!(
            problem.detail.as_deref(),
            Some("validation failed: 'title' is required")
        );
    }
}
