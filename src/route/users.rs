use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::memory::MemoryStore;
use crate::data::user::db::{IdentityExt, ProfileUpdate, UserLoginData, UserSignupData};
use crate::data::user::UserProfile;
use crate::middleware::paging::PageState;
use crate::resp::jwt::{Session, AUTH_COOKIE_NAME};
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

/// Issued session token and the account it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActiveChange {
    pub active: bool,
}

fn start_session(
    session: Session,
    user: UserProfile,
    cookies: &CookieJar<'_>,
    config: &Config,
    security: &Security,
) -> Result<Json<AuthResponse>, Problem> {
    let token = session.encode_jwt(&security.session_secret)?;
    tracing::debug!("session of {} expires at {}", session.user, session.expires());
    cookies.add(session.cookie(&security.session_secret, config.secure_cookies)?);

    Ok(Json(AuthResponse { token, user }))
}

/// Register a new account
#[utoipa::path(
    request_body = UserSignupData,
    responses(
        (status = 200, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid signup data", body = Problem),
        (status = 409, description = "Email already registered", body = Problem),
    )
)]
#[post("/user", format = "application/json", data = "<signup>")]
#[tracing::instrument(skip(cookies, store, config, security))]
pub async fn user_create(
    signup: Json<UserSignupData>,
    cookies: &CookieJar<'_>,
    store: &State<MemoryStore>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<Json<AuthResponse>, Problem> {
    let (session, user) = store.register(signup.into_inner(), config).await?;
    start_session(session, user, cookies, config, security)
}

/// Sign in with email and password
#[utoipa::path(
    request_body = UserLoginData,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad email or password", body = Problem),
    )
)]
#[post("/login", format = "application/json", data = "<login>")]
#[tracing::instrument(skip(cookies, store, config, security))]
pub async fn login_submit(
    login: Json<UserLoginData>,
    cookies: &CookieJar<'_>,
    store: &State<MemoryStore>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<Json<AuthResponse>, Problem> {
    let (session, user) = store.login(login.into_inner(), config).await?;
    start_session(session, user, cookies, config, security)
}

/// Sign out, dropping the session cookie
#[utoipa::path(responses((status = 200, description = "Session cookie removed")))]
#[post("/logout")]
#[tracing::instrument(skip(cookies, store))]
pub async fn logout(
    session: Option<Session>,
    cookies: &CookieJar<'_>,
    store: &State<MemoryStore>,
) {
    if let Some(session) = session {
        store.logout(session);
    }
    cookies.remove(AUTH_COOKIE_NAME);
}

/// Profile of the signed in user
#[utoipa::path(
    responses(
        (status = 200, description = "Current profile", body = UserProfile),
        (status = 401, description = "Missing or expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user/me")]
#[tracing::instrument(skip(store))]
pub async fn user_me(
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(store.current_user(&session).await?))
}

/// Update the signed in user's profile
#[utoipa::path(
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid profile data", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/me", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(store))]
pub async fn user_update(
    update: Json<ProfileUpdate>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(store.update_profile(&session, update.into_inner()).await?))
}

/// List accounts, optionally matching a name or email fragment
#[utoipa::path(
    responses(
        (status = 200, description = "Page of accounts", body = Vec<UserProfile>),
        (status = 403, description = "Caller isn't staff", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/user?<search>")]
#[tracing::instrument(skip(store))]
pub async fn user_list(
    search: Option<String>,
    page: PageState,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<UserProfile>>, Problem> {
    let users = store
        .list_users_matching(&session, search.as_deref())
        .await?;
    Ok(Json(page.apply(users)))
}

/// Create an account on someone's behalf
#[utoipa::path(
    request_body = UserSignupData,
    responses(
        (status = 200, description = "Created account", body = UserProfile),
        (status = 403, description = "Caller isn't a superadmin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/user/admin", format = "application/json", data = "<signup>")]
#[tracing::instrument(skip(store, config))]
pub async fn user_admin_create(
    signup: Json<UserSignupData>,
    session: Session,
    store: &State<MemoryStore>,
    config: &State<Config>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(
        store
            .create_user(&session, signup.into_inner(), config)
            .await?,
    ))
}

/// Change the role of an account
#[utoipa::path(
    request_body = RoleChange,
    params(("id", description = "account ID")),
    responses(
        (status = 200, description = "Updated account", body = UserProfile),
        (status = 403, description = "Change isn't allowed", body = Problem),
        (status = 404, description = "Account doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/<id>/role", format = "application/json", data = "<change>")]
#[tracing::instrument(skip(store))]
pub async fn user_set_role(
    id: Uuid,
    change: Json<RoleChange>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(store.set_role(&session, id, change.role).await?))
}

/// Activate or deactivate an account
#[utoipa::path(
    request_body = ActiveChange,
    params(("id", description = "account ID")),
    responses(
        (status = 200, description = "Updated account", body = UserProfile),
        (status = 403, description = "Change isn't allowed", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/<id>/active", format = "application/json", data = "<change>")]
#[tracing::instrument(skip(store))]
pub async fn user_set_active(
    id: Uuid,
    change: Json<ActiveChange>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(store.set_active(&session, id, change.active).await?))
}

/// Edit another account's name, email or profile
#[utoipa::path(
    request_body = ProfileUpdate,
    params(("id", description = "account ID")),
    responses(
        (status = 200, description = "Updated account", body = UserProfile),
        (status = 403, description = "Caller isn't a superadmin", body = Problem),
        (status = 404, description = "Account doesn't exist", body = Problem),
        (status = 409, description = "Email already registered", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/user/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument(skip(store))]
pub async fn user_edit(
    id: Uuid,
    update: Json<ProfileUpdate>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<UserProfile>, Problem> {
    Ok(Json(
        store
            .update_user_as(&session, id, update.into_inner())
            .await?,
    ))
}

#[cfg(test)]
mod user_endpoints {
    use rocket::http::{ContentType, Cookie, Status};

    use super::AuthResponse;
    use crate::data::user::UserProfile;
    use crate::resp::jwt::AUTH_COOKIE_NAME;
    use crate::role::Role;
    use crate::route::testing::{bearer, client, problem_type, signup};

    #[rocket::async_test]
    async fn v1_user_create_sets_cookie_and_token() {
        let client = client().await;

        let response = client
            .post("/api/v1/user")
            .header(ContentType::JSON)
            .body(r#"{"name":"Ana","email":"ana@example.com","password":"password123"}"#)
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok, "an ok response");
        assert_eq!(response.content_type(), Some(ContentType::JSON));
        assert!(
            response.cookies().get(AUTH_COOKIE_NAME).is_some(),
            "session cookie wasn't present"
        );

        let created: AuthResponse = response.into_json().await.expect("invalid response json");
        assert_eq!(created.user.role, Role::User);
        assert!(!created.token.is_empty());
    }

    #[rocket::async_test]
    async fn v1_user_create_reports_violations() {
        let client = client().await;

        let response = client
            .post("/api/v1/user")
            .header(ContentType::JSON)
            .body(r#"{"name":"","email":"nope","password":"short"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let body: serde_json::Value = response.into_json().await.unwrap();
        assert_eq!(body["type"], "/problems/validation");
        assert_eq!(body["violations"].as_array().map(Vec::len), Some(3));
    }

    #[rocket::async_test]
    async fn v1_login_submit_checks_password() {
        let client = client().await;
        signup(&client, "ana", "user").await;

        let response = client
            .post("/api/v1/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"ana@example.com","password":"password123"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get(AUTH_COOKIE_NAME).is_some());

        let response = client
            .post("/api/v1/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"ana@example.com","password":"wrong-password"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(problem_type(response).await, "/problems/invalid-credentials");
    }

    #[rocket::async_test]
    async fn v1_user_me_needs_session() {
        let client = client().await;
        let ana = signup(&client, "ana", "user").await;

        let response = client.get("/api/v1/user/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client
            .get("/api/v1/user/me")
            .header(bearer(&ana.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let me: UserProfile = response.into_json().await.unwrap();
        assert_eq!(me.id, ana.user.id);
    }

    #[rocket::async_test]
    async fn v1_user_update_changes_name() {
        let client = client().await;
        let ana = signup(&client, "ana", "user").await;

        let response = client
            .put("/api/v1/user/me")
            .header(ContentType::JSON)
            .header(bearer(&ana.token))
            .body(r#"{"name":"Ana Lovelace","links":{"github":"https://github.com/ana"}}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let me: UserProfile = response.into_json().await.unwrap();
        assert_eq!(me.name, "Ana Lovelace");
        assert_eq!(me.links.github.as_deref(), Some("https://github.com/ana"));
    }

    #[rocket::async_test]
    async fn v1_user_list_is_paged_and_staff_only() {
        let client = client().await;
        let teacher = signup(&client, "teacher", "admin").await;
        let student = signup(&client, "student", "user").await;
        for name in ["s1", "s2", "s3"] {
            signup(&client, name, "user").await;
        }

        let response = client
            .get("/api/v1/user?len=2&page=1")
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let users: Vec<UserProfile> = response.into_json().await.unwrap();
        let names: Vec<&str> = users.iter().map(|it| it.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2"]);

        let response = client
            .get("/api/v1/user?search=teach")
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        let users: Vec<UserProfile> = response.into_json().await.unwrap();
        assert_eq!(users.len(), 1);

        let response = client
            .get("/api/v1/user")
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn v1_role_change_by_teacher() {
        let client = client().await;
        let teacher = signup(&client, "teacher", "admin").await;
        let student = signup(&client, "student", "user").await;

        let response = client
            .put(format!("/api/v1/user/{}/role", student.user.id))
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(r#"{"role":"admin"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let promoted: UserProfile = response.into_json().await.unwrap();
        assert_eq!(promoted.role, Role::Admin);

        let response = client
            .put(format!("/api/v1/user/{}/role", teacher.user.id))
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(r#"{"role":"superadmin"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn v1_deactivated_user_loses_access() {
        let client = client().await;
        let teacher = signup(&client, "teacher", "admin").await;
        let student = signup(&client, "student", "user").await;

        let response = client
            .put(format!("/api/v1/user/{}/active", student.user.id))
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(r#"{"active":false}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get("/api/v1/user/me")
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn v1_admin_create_is_superadmin_only() {
        let client = client().await;
        let root = signup(&client, "root", "superadmin").await;
        let teacher = signup(&client, "teacher", "admin").await;
        let body = r#"{"name":"New","email":"new@example.com","password":"password123","role":"admin"}"#;

        let response = client
            .post("/api/v1/user/admin")
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .post("/api/v1/user/admin")
            .header(ContentType::JSON)
            .header(bearer(&root.token))
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let created: UserProfile = response.into_json().await.unwrap();
        assert_eq!(created.role, Role::Admin);
    }

    #[rocket::async_test]
    async fn v1_logout_removes_cookie() {
        let client = client().await;
        let ana = signup(&client, "ana", "user").await;

        let response = client
            .post("/api/v1/logout")
            .cookie(Cookie::new(AUTH_COOKIE_NAME, ana.token.clone()))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let removal = response.cookies().get(AUTH_COOKIE_NAME).map(|it| it.value().to_string());
        assert_eq!(removal.as_deref(), Some(""));
    }

    #[rocket::async_test]
    async fn v1_superadmin_edits_account() {
        let client = client().await;
        let root = signup(&client, "root", "superadmin").await;
        let teacher = signup(&client, "teacher", "admin").await;
        let student = signup(&client, "student", "user").await;
        let path = format!("/api/v1/user/{}", student.user.id);

        let response = client
            .put(path.clone())
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(r#"{"name":"Renamed"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .put(path.clone())
            .header(ContentType::JSON)
            .header(bearer(&root.token))
            .body(r#"{"name":"Renamed","email":"renamed@example.com"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let edited: UserProfile = response.into_json().await.unwrap();
        assert_eq!(edited.name, "Renamed");
        assert_eq!(edited.email, "renamed@example.com");

        let response = client
            .put(path)
            .header(ContentType::JSON)
            .header(bearer(&root.token))
            .body(r#"{"email":"teacher@example.com"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(problem_type(response).await, "/problems/duplicate-email");
    }
}
