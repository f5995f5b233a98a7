use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Build, Catcher, Request, Rocket, Route};

pub mod class;
pub mod project;
pub mod users;

use class::*;
use project::*;
use users::*;

use utoipa::OpenApi;

use crate::{
    data::{
        class::{
            db::{ClassCreateData, JoinClassData},
            ClassInfo, ClassKey,
        },
        project::{
            archive::ArchiveUpload,
            db::{ProjectStats, ProjectSubmitData},
            grading::{GradeData, Grading, RubricScores},
            Project, ProjectCategory, ProjectStatus, ProjectType,
        },
        user::{
            db::{ProfileUpdate, UserLoginData, UserResponse, UserSignupData},
            ProfileLinks, UserProfile,
        },
    },
    resp::{
        jwt::{auth_problem, doc::JWTAuth},
        problem::{problems, Problem},
    },
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        user_create,
        login_submit,
        logout,
        user_me,
        user_update,
        user_list,
        user_admin_create,
        user_set_role,
        user_set_active,
        user_edit,
        class_create,
        class_by_key,
        class_join,
        class_teaching,
        class_enrolled,
        project_submit,
        project_archive,
        project_list,
        project_mine,
        project_assigned,
        project_stats,
        project_get,
        project_review,
        project_reject,
        project_grade
    ),
    components(schemas(
        Role,
        UserProfile,
        ProfileLinks,
        UserResponse,
        UserLoginData,
        UserSignupData,
        ProfileUpdate,
        AuthResponse,
        RoleChange,
        ActiveChange,
        ClassInfo,
        ClassKey,
        ClassCreateData,
        JoinClassData,
        Project,
        ProjectStatus,
        ProjectCategory,
        ProjectType,
        ProjectSubmitData,
        ProjectStats,
        ArchiveUpload,
        ArchiveReceipt,
        Grading,
        RubricScores,
        GradeData,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

#[get("/openapi.json")]
pub fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

pub fn api_v1() -> Vec<Route> {
    routes![
        openapi_json,
        user_create,
        login_submit,
        logout,
        user_me,
        user_update,
        user_list,
        user_admin_create,
        user_set_role,
        user_set_active,
        user_edit,
        class_create,
        class_by_key,
        class_join,
        class_teaching,
        class_enrolled,
        project_submit,
        project_archive,
        project_list,
        project_mine,
        project_assigned,
        project_stats,
        project_get,
        project_review,
        project_reject,
        project_grade
    ]
}

#[catch(400)]
fn bad_request() -> Problem {
    problems::parse_problem()
}

#[catch(401)]
fn unauthorized() -> Problem {
    auth_problem("Missing, invalid or expired session token.")
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Problem {
    problems::not_found_problem()
        .instance_uri(req.uri().to_string())
        .clone()
}

#[catch(422)]
fn unprocessable(status: Status, _: &Request<'_>) -> Problem {
    let mut problem = problems::parse_problem();
    problem.status = status;
    problem
}

pub fn api_catchers() -> Vec<Catcher> {
    catchers![bad_request, unauthorized, not_found, unprocessable]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .register("/", api_catchers())
}

#[cfg(test)]
pub(crate) mod testing {
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};

    use super::users::AuthResponse;
    use crate::config::Config;
    use crate::data::memory::MemoryStore;
    use crate::security::Security;

    pub async fn client() -> Client {
        let rocket = crate::build(Config::testing(), Security::ephemeral(), MemoryStore::new())
            .expect("invalid backend");
        Client::untracked(rocket).await.expect("invalid backend")
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    /// Registers `<name>@example.com` through the API.
    pub async fn signup(client: &Client, name: &str, role: &str) -> AuthResponse {
        let response = client
            .post("/api/v1/user")
            .header(ContentType::JSON)
            .body(format!(
                r#"{{"name":"{0}","email":"{0}@example.com","password":"password123","role":"{1}"}}"#,
                name, role
            ))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "signup of {} failed", name);

        response.into_json().await.expect("invalid signup response")
    }

    pub async fn problem_type(response: LocalResponse<'_>) -> String {
        let body: serde_json::Value = response.into_json().await.expect("invalid problem json");
        body["type"].as_str().unwrap_or_default().to_string()
    }
}
