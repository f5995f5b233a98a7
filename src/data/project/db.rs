use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::archive::ArchiveUpload;
use super::grading::Grading;
use super::{Project, ProjectCategory, ProjectStatus, ProjectType};
use crate::config::Config;
use crate::data::class::db::ClassRepository;
use crate::data::class::ClassKey;
use crate::data::user::db::{IdentityExt, UserRepository};
use crate::error::{PortalError, Violation, Violations};
use crate::resp::jwt::Session;

lazy_static! {
    static ref GITHUB_REPOSITORY: regex::Regex =
        regex::Regex::new(r"^https://github\.com/[A-Za-z0-9-]+/[A-Za-z0-9._-]+/?$")
            .expect("github pattern is valid");
}

pub fn is_github_repository(link: &str) -> bool {
    GITHUB_REPOSITORY.is_match(link)
}

/// Storage boundary for projects.
pub trait ProjectRepository {
    async fn insert_project(&self, project: Project) -> Result<(), PortalError>;
    async fn get_project(&self, id: Uuid) -> Option<Project>;
    /// Matching projects in submission order.
    async fn list_projects(&self, filter: &ProjectFilter) -> Vec<Project>;
    /// Moves the project into `to` if its current status allows it, in one step.
    ///
    /// Fails with [PortalError::InvalidTransition] otherwise and leaves the
    /// project untouched.
    async fn update_status_and_grade(
        &self,
        id: Uuid,
        to: ProjectStatus,
        grading: Option<Grading>,
        reviewed_by: Uuid,
    ) -> Result<Project, PortalError>;
}

/// Projects a teacher is responsible for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub teacher: Uuid,
    pub class_keys: Vec<ClassKey>,
}

impl Assignment {
    pub fn covers(&self, project: &Project) -> bool {
        project.assigned_teacher_id == Some(self.teacher)
            || project
                .class_key
                .as_ref()
                .map(|key| self.class_keys.contains(key))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub search: Option<String>,
    pub category: Option<ProjectCategory>,
    pub status: Option<ProjectStatus>,
    pub submitted_by: Option<Uuid>,
    pub assignment: Option<Assignment>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(search) = crate::util::non_blank(self.search.as_deref()) {
            if !project.matches_search(search) {
                return false;
            }
        }

        self.category.map_or(true, |it| it == project.category)
            && self.status.map_or(true, |it| it == project.status)
            && self.submitted_by.map_or(true, |it| it == project.submitted_by)
            && self
                .assignment
                .as_ref()
                .map_or(true, |it| it.covers(project))
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSubmitData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<ProjectCategory>,
    #[serde(default)]
    pub project_type: Option<ProjectType>,
    #[serde(default)]
    pub github_link: Option<String>,
    #[serde(default)]
    pub zip_file: Option<ArchiveUpload>,
    #[serde(default)]
    pub class_key: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<Uuid>,
}

/// Counters for the grading dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total: usize,
    /// Pending and in-review projects.
    pub awaiting_review: usize,
    pub graded: usize,
    pub rejected: usize,
    pub unique_submitters: usize,
    pub average_score: Option<f64>,
}

impl ProjectStats {
    pub fn collect(projects: &[Project]) -> ProjectStats {
        let mut stats = ProjectStats {
            total: projects.len(),
            ..Default::default()
        };
        let mut submitters = HashSet::new();
        let mut score_sum = 0u64;

        for project in projects {
            submitters.insert(project.submitted_by);
            match project.status {
                it if it.is_awaiting_review() => stats.awaiting_review += 1,
                ProjectStatus::Graded => stats.graded += 1,
                _ => stats.rejected += 1,
            }
            if let Some(grading) = &project.grades {
                score_sum += u64::from(grading.total_score());
            }
        }

        stats.unique_submitters = submitters.len();
        if stats.graded > 0 {
            stats.average_score = Some(score_sum as f64 / stats.graded as f64);
        }
        stats
    }
}

pub trait ProjectRegistryExt {
    async fn submit(
        &self,
        session: &Session,
        data: ProjectSubmitData,
        config: &Config,
    ) -> Result<Project, PortalError>;

    /// Visible to its submitter and to graders.
    async fn get(&self, session: &Session, id: Uuid) -> Result<Project, PortalError>;

    async fn list_all(&self, session: &Session) -> Result<Vec<Project>, PortalError>;

    async fn list_submitted_by(&self, submitter: Uuid) -> Vec<Project>;

    /// Assigned to the teacher directly or submitted to one of their classes.
    async fn list_assigned_to(&self, teacher: Uuid) -> Vec<Project>;

    /// Students only ever see their own projects.
    async fn filter(
        &self,
        session: &Session,
        filter: ProjectFilter,
    ) -> Result<Vec<Project>, PortalError>;

    async fn stats(&self, session: &Session) -> Result<ProjectStats, PortalError>;
}

impl<T: ProjectRepository + ClassRepository + UserRepository + Sync> ProjectRegistryExt for T {
    async fn submit(
        &self,
        session: &Session,
        data: ProjectSubmitData,
        config: &Config,
    ) -> Result<Project, PortalError> {
        let submitter = self.current_user(session).await?;
        let mut violations = Violations::new();

        let title = data.title.trim();
        if title.is_empty() {
            violations.push(Violation::MissingField { field: "title" });
        }
        let description = data.description.trim();
        if description.is_empty() {
            violations.push(Violation::MissingField { field: "description" });
        }
        if data.category.is_none() {
            violations.push(Violation::MissingField { field: "category" });
        }

        let github_link = crate::util::non_blank(data.github_link.as_deref()).map(String::from);
        if let Some(link) = &github_link {
            if !is_github_repository(link) {
                violations.push(Violation::MalformedGithubLink { link: link.clone() });
            }
        }

        let zip_file = match &data.zip_file {
            Some(upload) => match upload.validate(config.max_archive_bytes) {
                Ok(reference) => Some(reference),
                Err(violation) => {
                    violations.push(violation);
                    None
                }
            },
            None => None,
        };

        if github_link.is_none() && data.zip_file.is_none() {
            violations.push(Violation::MissingSource);
        }

        let class_key = crate::util::non_blank(data.class_key.as_deref()).map(ClassKey::from);
        let mut assigned_teacher = None;

        match (&class_key, data.teacher_id) {
            (Some(_), Some(_)) => violations.push(Violation::ConflictingDestination),
            (Some(key), None) => {
                if self.get_class_by_key(key).await.is_none() {
                    violations.push(Violation::UnknownClassKey {
                        key: key.to_string(),
                    });
                }
            }
            (None, Some(id)) => match self.get_user(id).await {
                Some(teacher) if teacher.role.can_grade() => assigned_teacher = Some(teacher),
                _ => violations.push(Violation::NotATeacher { id: id.to_string() }),
            },
            (None, None) => {}
        }

        violations.into_result()?;

        let project = Project {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            category: data.category.unwrap_or(ProjectCategory::Other),
            project_type: data.project_type,
            submitted_by: submitter.id,
            submitted_by_name: submitter.name.clone(),
            assigned_teacher_id: assigned_teacher.as_ref().map(|it| it.id),
            assigned_teacher_name: assigned_teacher.map(|it| it.name),
            class_key,
            github_link,
            zip_file,
            status: ProjectStatus::Pending,
            grades: None,
            reviewed_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.insert_project(project.clone()).await?;
        tracing::info!("{} submitted project '{}'", submitter.id, project.title);

        Ok(project)
    }

    async fn get(&self, session: &Session, id: Uuid) -> Result<Project, PortalError> {
        let viewer = self.current_user(session).await?;
        let project = self
            .get_project(id)
            .await
            .ok_or_else(|| PortalError::not_found("project", id))?;

        if project.submitted_by != viewer.id && !viewer.role.can_grade() {
            return Err(PortalError::not_authorized(
                "only the submitter and teachers can view a project",
            ));
        }

        Ok(project)
    }

    async fn list_all(&self, session: &Session) -> Result<Vec<Project>, PortalError> {
        let viewer = self.current_user(session).await?;
        if !viewer.role.can_grade() {
            return Err(PortalError::not_authorized("only teachers can list all projects"));
        }

        Ok(self.list_projects(&ProjectFilter::default()).await)
    }

    async fn list_submitted_by(&self, submitter: Uuid) -> Vec<Project> {
        self.list_projects(&ProjectFilter {
            submitted_by: Some(submitter),
            ..Default::default()
        })
        .await
    }

    async fn list_assigned_to(&self, teacher: Uuid) -> Vec<Project> {
        let class_keys = self
            .list_classes_by_teacher(teacher)
            .await
            .into_iter()
            .map(|it| it.key)
            .collect();

        self.list_projects(&ProjectFilter {
            assignment: Some(Assignment {
                teacher,
                class_keys,
            }),
            ..Default::default()
        })
        .await
    }

    async fn filter(
        &self,
        session: &Session,
        mut filter: ProjectFilter,
    ) -> Result<Vec<Project>, PortalError> {
        let viewer = self.current_user(session).await?;
        if !viewer.role.can_grade() {
            filter.submitted_by = Some(viewer.id);
        }
        tracing::debug!("filtering projects with {:?}", filter);

        Ok(self.list_projects(&filter).await)
    }

    async fn stats(&self, session: &Session) -> Result<ProjectStats, PortalError> {
        let viewer = self.current_user(session).await?;
        if !viewer.role.can_grade() {
            return Err(PortalError::not_authorized("only teachers can see statistics"));
        }

        let projects = self.list_projects(&ProjectFilter::default()).await;
        Ok(ProjectStats::collect(&projects))
    }
}
