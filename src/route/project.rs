use std::str::FromStr;

use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::memory::MemoryStore;
use crate::data::project::archive::ArchiveUpload;
use crate::data::project::db::{
    ProjectFilter, ProjectRegistryExt, ProjectStats, ProjectSubmitData,
};
use crate::data::project::grading::{GradeData, GradingExt};
use crate::data::project::{Project, ProjectCategory, ProjectStatus};
use crate::data::user::db::IdentityExt;
use crate::error::PortalError;
use crate::middleware::paging::PageState;
use crate::resp::jwt::Session;
use crate::resp::problem::{problems, Problem};

/// Reference under which an accepted archive is stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReceipt {
    pub zip_file: String,
}

fn parse_query<T: FromStr<Err = String>>(
    name: &str,
    value: Option<&str>,
) -> Result<Option<T>, Problem> {
    match crate::util::non_blank(value) {
        Some(it) => it.parse().map(Some).map_err(|e: String| {
            problems::parse_problem()
                .detail(e)
                .insert_str("parameter", name)
                .clone()
        }),
        None => Ok(None),
    }
}

/// Submit a project
#[utoipa::path(
    request_body = ProjectSubmitData,
    responses(
        (status = 200, description = "Submitted project, pending review", body = Project),
        (status = 400, description = "Every violated submission rule", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/project", format = "application/json", data = "<project>")]
#[tracing::instrument(skip(store, config))]
pub async fn project_submit(
    project: Json<ProjectSubmitData>,
    session: Session,
    store: &State<MemoryStore>,
    config: &State<Config>,
) -> Result<Json<Project>, Problem> {
    Ok(Json(
        store.submit(&session, project.into_inner(), config).await?,
    ))
}

/// Check an archive before uploading it
#[utoipa::path(
    request_body = ArchiveUpload,
    responses(
        (status = 200, description = "Archive is accepted", body = ArchiveReceipt),
        (status = 400, description = "Wrong file type or too large", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/project/archive", format = "application/json", data = "<archive>")]
#[tracing::instrument(skip(store, config))]
pub async fn project_archive(
    archive: Json<ArchiveUpload>,
    session: Session,
    store: &State<MemoryStore>,
    config: &State<Config>,
) -> Result<Json<ArchiveReceipt>, Problem> {
    store.current_user(&session).await?;

    let zip_file = archive
        .validate(config.max_archive_bytes)
        .map_err(PortalError::from)?;
    Ok(Json(ArchiveReceipt { zip_file }))
}

/// Search projects; students only see their own
#[utoipa::path(
    responses(
        (status = 200, description = "Page of matching projects", body = Vec<Project>),
        (status = 400, description = "Unknown category or status", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/project?<search>&<category>&<status>")]
#[tracing::instrument(skip(store))]
pub async fn project_list(
    search: Option<String>,
    category: Option<String>,
    status: Option<String>,
    page: PageState,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<Project>>, Problem> {
    let filter = ProjectFilter {
        search,
        category: parse_query::<ProjectCategory>("category", category.as_deref())?,
        status: parse_query::<ProjectStatus>("status", status.as_deref())?,
        ..Default::default()
    };

    let projects = store.filter(&session, filter).await?;
    Ok(Json(page.apply(projects)))
}

/// Projects submitted by the signed in user
#[utoipa::path(
    responses((status = 200, description = "Own submissions", body = Vec<Project>)),
    security(("jwt" = []))
)]
#[get("/project/mine")]
#[tracing::instrument(skip(store))]
pub async fn project_mine(
    page: PageState,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<Project>>, Problem> {
    let user = store.current_user(&session).await?;
    Ok(Json(page.apply(store.list_submitted_by(user.id).await)))
}

/// Projects the signed in teacher is responsible for
#[utoipa::path(
    responses((status = 200, description = "Assigned projects", body = Vec<Project>)),
    security(("jwt" = []))
)]
#[get("/project/assigned")]
#[tracing::instrument(skip(store))]
pub async fn project_assigned(
    page: PageState,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Vec<Project>>, Problem> {
    let teacher = store.current_user(&session).await?;
    Ok(Json(page.apply(store.list_assigned_to(teacher.id).await)))
}

/// Grading dashboard counters
#[utoipa::path(
    responses(
        (status = 200, description = "Project counters", body = ProjectStats),
        (status = 403, description = "Caller isn't a teacher", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/project/stats")]
#[tracing::instrument(skip(store))]
pub async fn project_stats(
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<ProjectStats>, Problem> {
    Ok(Json(store.stats(&session).await?))
}

/// Get a project
#[utoipa::path(
    params(("id", description = "project ID")),
    responses(
        (status = 200, description = "Project", body = Project),
        (status = 403, description = "Caller is neither submitter nor teacher", body = Problem),
        (status = 404, description = "Project doesn't exist", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/project/<id>")]
#[tracing::instrument(skip(store))]
pub async fn project_get(
    id: Uuid,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Project>, Problem> {
    Ok(Json(store.get(&session, id).await?))
}

/// Start reviewing a pending project
#[utoipa::path(
    params(("id", description = "project ID")),
    responses(
        (status = 200, description = "Project under review", body = Project),
        (status = 409, description = "Project isn't pending", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/project/<id>/review")]
#[tracing::instrument(skip(store))]
pub async fn project_review(
    id: Uuid,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Project>, Problem> {
    Ok(Json(store.start_review(&session, id).await?))
}

/// Reject a project
#[utoipa::path(
    params(("id", description = "project ID")),
    responses(
        (status = 200, description = "Rejected project", body = Project),
        (status = 409, description = "Project was already graded or rejected", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/project/<id>/reject")]
#[tracing::instrument(skip(store))]
pub async fn project_reject(
    id: Uuid,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Project>, Problem> {
    Ok(Json(store.reject(&session, id).await?))
}

/// Grade a project against the rubric
#[utoipa::path(
    params(("id", description = "project ID")),
    request_body = GradeData,
    responses(
        (status = 200, description = "Graded project", body = Project),
        (status = 400, description = "Incomplete rubric or missing feedback", body = Problem),
        (status = 409, description = "Project was already graded or rejected", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/project/<id>/grade", format = "application/json", data = "<grade>")]
#[tracing::instrument(skip(store))]
pub async fn project_grade(
    id: Uuid,
    grade: Json<GradeData>,
    session: Session,
    store: &State<MemoryStore>,
) -> Result<Json<Project>, Problem> {
    Ok(Json(
        store
            .grade(&session, id, grade.scores(), &grade.feedback)
            .await?,
    ))
}
