use rocket::serde::json::Json;
use rocket::State;

use crate::data::class::db::{ClassCreateData, ClassRegistryExt, JoinClassData};
use crate::data::class::ClassInfo;
use crate::data::memory::MemoryStore;
use crate::data::user::db::IdentityExt;
use crate::resp::jwt::Session;
use crate::resp::problem::{problems, Problem};

/// Create a class taught by the signed in teacher
#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 200, description = "Created class with its join key", body = ClassInfo),
        (status = 403, description = "Caller isn't a teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/class", format = "application/json", data = "<class>")]
#[tracing::instrument(skip(store))]
pub async fn class_create(
    class: Json<ClassCreateData>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<ClassInfo>, Problem> {
    Ok(Json(store.create_class(&session, class.into_inner()).await?))
}

/// Look up a class by its join key
#[utoipa::path(
    params(("key", description = "class join key")),
    responses(
        (status = 200, description = "Class using the key", body = ClassInfo),
        (status = 404, description = "No class uses the key", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/class/key/<key>")]
#[tracing::instrument(skip(store))]
pub async fn class_by_key(
    key: &str,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<ClassInfo>, Problem> {
    store.current_user(&session).await?;

    store
        .find_by_key(key)
        .await
        .map(Json)
        .ok_or_else(|| problems::unknown_class_key(key))
}

/// Join a class with its key
#[utoipa::path(
    request_body = JoinClassData,
    responses(
        (status = 200, description = "Joined class", body = ClassInfo),
        (status = 404, description = "No class uses the key", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/class/join", format = "application/json", data = "<join>")]
#[tracing::instrument(skip(store))]
pub async fn class_join(
    join: Json<JoinClassData>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<ClassInfo>, Problem> {
    let student = store.current_user(&session).await?;

    if !store.join_by_key(student.id, &join.key).await? {
        return Err(problems::unknown_class_key(&join.key));
    }

    store
        .find_by_key(&join.key)
        .await
        .map(Json)
        .ok_or_else(|| problems::unknown_class_key(&join.key))
}

/// Classes taught by the signed in user
#[utoipa::path(
    responses((status = 200, description = "Taught classes", body = Vec<ClassInfo>)),
    security(("jwt" = []))
)]
#[get("/class/teaching")]
#[tracing::instrument(skip(store))]
pub async fn class_teaching(
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<ClassInfo>>, Problem> {
    let teacher = store.current_user(&session).await?;
    Ok(Json(store.list_by_teacher(teacher.id).await))
}

/// Classes the signed in user is enrolled in
#[utoipa::path(
    responses((status = 200, description = "Enrolled classes", body = Vec<ClassInfo>)),
    security(("jwt" = []))
)]
#[get("/class/enrolled")]
#[tracing::instrument(skip(store))]
pub async fn class_enrolled(
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<ClassInfo>>, Problem> {
    let student = store.current_user(&session).await?;
    Ok(Json(store.list_by_student(student.id).await))
}

#[cfg(test)]
mod class_endpoints {
    use rocket::http::{ContentType, Status};

    use crate::data::class::ClassInfo;
    use crate::route::testing::{bearer, client, problem_type, signup};

    #[rocket::async_test]
    async fn v1_cs101_join_flow() {
        let client = client().await;
        let teacher = signup(&client, "teacher", "admin").await;
        let student = signup(&client, "student", "user").await;

        let response = client
            .post("/api/v1/class")
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(r#"{"name":"CS101","description":"Intro to programming"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let class: ClassInfo = response.into_json().await.unwrap();
        assert_eq!(class.key.len(), 8);
        assert!(class
            .key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let response = client
            .post("/api/v1/class/join")
            .header(ContentType::JSON)
            .header(bearer(&student.token))
            .body(format!(r#"{{"key":"{}"}}"#, class.key))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let joined: ClassInfo = response.into_json().await.unwrap();
        assert_eq!(joined.students, vec![student.user.id]);

        let response = client
            .get("/api/v1/class/enrolled")
            .header(bearer(&student.token))
            .dispatch()
            .await;
        let enrolled: Vec<ClassInfo> = response.into_json().await.unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].id, class.id);

        let response = client
            .get("/api/v1/class/teaching")
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        let teaching: Vec<ClassInfo> = response.into_json().await.unwrap();
        assert_eq!(teaching.len(), 1);

        let response = client
            .get(format!("/api/v1/class/key/{}", class.key))
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn v1_join_with_unknown_key_is_not_found() {
        let client = client().await;
        let student = signup(&client, "student", "user").await;

        let response = client
            .post("/api/v1/class/join")
            .header(ContentType::JSON)
            .header(bearer(&student.token))
            .body(r#"{"key":"NOPE0000"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(problem_type(response).await, "/problems/unknown-class-key");

        let response = client
            .get("/api/v1/class/enrolled")
            .header(bearer(&student.token))
            .dispatch()
            .await;
        let enrolled: Vec<ClassInfo> = response.into_json().await.unwrap();
        assert!(enrolled.is_empty());
    }

    #[rocket::async_test]
    async fn v1_students_cannot_create_classes() {
        let client = client().await;
        let student = signup(&client, "student", "user").await;

        let response = client
            .post("/api/v1/class")
            .header(ContentType::JSON)
            .header(bearer(&student.token))
            .body(r#"{"name":"CS101"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }
}
