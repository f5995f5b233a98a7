use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::db::ProjectRepository;
use super::{Project, ProjectStatus};
use crate::data::class::db::ClassRepository;
use crate::data::user::db::{IdentityExt, UserRepository};
use crate::data::user::UserProfile;
use crate::error::{PortalError, Violation, Violations};
use crate::resp::jwt::Session;
use crate::role::Role;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// Scores of the four rubric dimensions. Missing dimensions deserialize as 0.
///
/// Scores are wide enough to carry any JSON integer a grader sends, so bad
/// values surface as violations rather than parse failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RubricScores {
    #[serde(default)]
    pub code_quality: i32,
    #[serde(default)]
    pub documentation: i32,
    #[serde(default)]
    pub innovation: i32,
    #[serde(default)]
    pub functionality: i32,
}

impl RubricScores {
    pub fn new(code_quality: i32, documentation: i32, innovation: i32, functionality: i32) -> Self {
        RubricScores {
            code_quality,
            documentation,
            innovation,
            functionality,
        }
    }

    fn fields(&self) -> [(&'static str, i32); 4] {
        [
            ("codeQuality", self.code_quality),
            ("documentation", self.documentation),
            ("innovation", self.innovation),
            ("functionality", self.functionality),
        ]
    }

    pub fn check(&self, violations: &mut Violations) {
        for (field, score) in self.fields() {
            if score == 0 {
                violations.push(Violation::IncompleteRubric { field });
            } else if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                violations.push(Violation::ScoreOutOfRange { field, score });
            }
        }
    }

    /// Sum of the dimensions, each clamped into `0..=MAX_SCORE`.
    pub fn total(&self) -> u8 {
        self.fields().iter().fold(0u8, |total, (_, score)| {
            total.saturating_add((*score).clamp(0, MAX_SCORE) as u8)
        })
    }
}

/// Grade record attached to a project once it is graded.
///
/// Only [GradingExt::grade] builds one, so `total_score` always equals the
/// sum of the four dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct Grading {
    #[serde(flatten)]
    scores: RubricScores,
    total_score: u8,
    feedback: String,
    graded_at: DateTime<Utc>,
}

impl Grading {
    fn compute(scores: RubricScores, feedback: &str) -> Result<Grading, PortalError> {
        let mut violations = Violations::new();
        scores.check(&mut violations);
        if feedback.trim().is_empty() {
            violations.push(Violation::MissingFeedback);
        }
        violations.into_result()?;

        Ok(Grading {
            scores,
            total_score: scores.total(),
            feedback: feedback.trim().to_string(),
            graded_at: Utc::now(),
        })
    }

    pub fn scores(&self) -> RubricScores {
        self.scores
    }

    pub fn total_score(&self) -> u8 {
        self.total_score
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn graded_at(&self) -> DateTime<Utc> {
        self.graded_at
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradeData {
    #[serde(default)]
    pub code_quality: i32,
    #[serde(default)]
    pub documentation: i32,
    #[serde(default)]
    pub innovation: i32,
    #[serde(default)]
    pub functionality: i32,
    #[serde(default)]
    pub feedback: String,
}

impl GradeData {
    pub fn scores(&self) -> RubricScores {
        RubricScores::new(
            self.code_quality,
            self.documentation,
            self.innovation,
            self.functionality,
        )
    }
}

/// Moves projects through `pending → review → graded|rejected`.
pub trait GradingExt {
    async fn start_review(&self, session: &Session, project: Uuid) -> Result<Project, PortalError>;

    async fn grade(
        &self,
        session: &Session,
        project: Uuid,
        scores: RubricScores,
        feedback: &str,
    ) -> Result<Project, PortalError>;

    async fn reject(&self, session: &Session, project: Uuid) -> Result<Project, PortalError>;
}

async fn authorize_grader<T>(
    store: &T,
    session: &Session,
    project: Uuid,
) -> Result<(UserProfile, Project), PortalError>
where
    T: ProjectRepository + ClassRepository + UserRepository + Sync,
{
    let grader = store.current_user(session).await?;
    if !grader.role.can_grade() {
        return Err(PortalError::not_authorized("only teachers can review projects"));
    }

    let project = store
        .get_project(project)
        .await
        .ok_or_else(|| PortalError::not_found("project", project))?;

    if grader.role == Role::SuperAdmin {
        return Ok((grader, project));
    }

    if let Some(teacher) = project.assigned_teacher_id {
        if teacher != grader.id {
            tracing::warn!("{} isn't the assigned teacher of {}", grader.id, project.id);
            return Err(PortalError::not_authorized(
                "project is assigned to another teacher",
            ));
        }
    }

    if let Some(key) = &project.class_key {
        let owner = store.get_class_by_key(key).await.map(|it| it.teacher_id);
        if owner != Some(grader.id) {
            tracing::warn!("{} doesn't teach class {}", grader.id, key);
            return Err(PortalError::not_authorized(
                "project belongs to another teacher's class",
            ));
        }
    }

    Ok((grader, project))
}

impl<T: ProjectRepository + ClassRepository + UserRepository + Sync> GradingExt for T {
    async fn start_review(&self, session: &Session, project: Uuid) -> Result<Project, PortalError> {
        let (grader, project) = authorize_grader(self, session, project).await?;

        let updated = self
            .update_status_and_grade(project.id, ProjectStatus::Review, None, grader.id)
            .await?;
        tracing::info!("{} started reviewing {}", grader.id, updated.id);

        Ok(updated)
    }

    async fn grade(
        &self,
        session: &Session,
        project: Uuid,
        scores: RubricScores,
        feedback: &str,
    ) -> Result<Project, PortalError> {
        let (grader, project) = authorize_grader(self, session, project).await?;
        let grading = Grading::compute(scores, feedback)?;

        let updated = self
            .update_status_and_grade(project.id, ProjectStatus::Graded, Some(grading), grader.id)
            .await?;
        tracing::info!(
            "{} graded {} with {}",
            grader.id,
            updated.id,
            updated.grades.as_ref().map(Grading::total_score).unwrap_or_default()
        );

        Ok(updated)
    }

    async fn reject(&self, session: &Session, project: Uuid) -> Result<Project, PortalError> {
        let (grader, project) = authorize_grader(self, session, project).await?;

        let updated = self
            .update_status_and_grade(project.id, ProjectStatus::Rejected, None, grader.id)
            .await?;
        tracing::info!("{} rejected {}", grader.id, updated.id);

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::class::db::{ClassCreateData, ClassRegistryExt};
    use crate::data::memory::{registered, MemoryStore};
    use crate::data::project::db::{ProjectFilter, ProjectRegistryExt, ProjectSubmitData};
    use crate::data::project::ProjectCategory;

    fn todo_app() -> ProjectSubmitData {
        ProjectSubmitData {
            title: "Todo App".into(),
            description: "Tracks things to do".into(),
            category: Some(ProjectCategory::WebDevelopment),
            github_link: Some("https://github.com/a/todo".into()),
            ..Default::default()
        }
    }

    #[test]
    fn every_valid_rubric_sums_within_bounds() {
        for code_quality in MIN_SCORE..=MAX_SCORE {
            for documentation in MIN_SCORE..=MAX_SCORE {
                for innovation in MIN_SCORE..=MAX_SCORE {
                    for functionality in MIN_SCORE..=MAX_SCORE {
                        let scores =
                            RubricScores::new(code_quality, documentation, innovation, functionality);
                        let grading = Grading::compute(scores, "ok").unwrap();
                        assert_eq!(
                            i32::from(grading.total_score()),
                            code_quality + documentation + innovation + functionality
                        );
                        assert!((4..=40).contains(&grading.total_score()));
                    }
                }
            }
        }
    }

    #[test]
    fn each_bad_dimension_is_reported() {
        let err = Grading::compute(RubricScores::new(0, 11, 5, 0), "  ").unwrap_err();
        match err {
            PortalError::Validation(violations) => {
                assert_eq!(violations.len(), 4);
                assert!(violations.contains(&Violation::IncompleteRubric {
                    field: "codeQuality"
                }));
                assert!(violations.contains(&Violation::ScoreOutOfRange {
                    field: "documentation",
                    score: 11
                }));
                assert!(violations.contains(&Violation::IncompleteRubric {
                    field: "functionality"
                }));
                assert!(violations.contains(&Violation::MissingFeedback));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn negative_and_huge_scores_name_their_field() {
        let err = Grading::compute(RubricScores::new(-1, 300, 5, 5), "ok").unwrap_err();
        match err {
            PortalError::Validation(violations) => {
                assert_eq!(violations.len(), 2);
                assert!(violations.contains(&Violation::ScoreOutOfRange {
                    field: "codeQuality",
                    score: -1
                }));
                assert!(violations.contains(&Violation::ScoreOutOfRange {
                    field: "documentation",
                    score: 300
                }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn grading_serializes_flat() {
        let grading = Grading::compute(RubricScores::new(8, 7, 9, 6), "Good job").unwrap();
        let json = serde_json::to_value(&grading).unwrap();
        assert_eq!(json["codeQuality"], 8);
        assert_eq!(json["functionality"], 6);
        assert_eq!(json["totalScore"], 30);
        assert_eq!(json["feedback"], "Good job");
    }

    #[tokio::test]
    async fn todo_app_is_graded_once() {
        let store = MemoryStore::new();
        let config = Config::testing();
        let (student, student_user) = registered(&store, "a", Role::User).await;

        let project = store.submit(&student, todo_app(), &config).await.unwrap();
        assert_eq!(project.status, ProjectStatus::Pending);
        assert_eq!(project.submitted_by, student_user.id);

        let (teacher, teacher_user) = registered(&store, "t", Role::Admin).await;
        let graded = store
            .grade(&teacher, project.id, RubricScores::new(8, 7, 9, 6), "Good job")
            .await
            .unwrap();

        assert_eq!(graded.status, ProjectStatus::Graded);
        assert_eq!(graded.reviewed_by, Some(teacher_user.id));
        assert!(graded.updated_at.is_some());
        let grading = graded.grades.as_ref().unwrap();
        assert_eq!(grading.total_score(), 30);
        assert_eq!(grading.feedback(), "Good job");

        let pending = store
            .filter(
                &teacher,
                ProjectFilter {
                    status: Some(ProjectStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(pending.iter().all(|it| it.id != project.id));

        let regrade = store
            .grade(&teacher, project.id, RubricScores::new(10, 10, 10, 10), "Better")
            .await
            .unwrap_err();
        assert_eq!(
            regrade,
            PortalError::InvalidTransition {
                from: ProjectStatus::Graded,
                to: ProjectStatus::Graded
            }
        );
        assert_eq!(store.get_project(project.id).await, Some(graded));
    }

    #[tokio::test]
    async fn invalid_grade_leaves_project_pending() {
        let store = MemoryStore::new();
        let (student, _) = registered(&store, "a", Role::User).await;
        let (teacher, _) = registered(&store, "t", Role::Admin).await;
        let project = store
            .submit(&student, todo_app(), &Config::testing())
            .await
            .unwrap();

        let err = store
            .grade(&teacher, project.id, RubricScores::new(8, 0, 9, 6), "Good job")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PortalError::from(Violation::IncompleteRubric {
                field: "documentation"
            })
        );

        let stored = store.get_project(project.id).await.unwrap();
        assert_eq!(stored.status, ProjectStatus::Pending);
        assert_eq!(stored.grades, None);
    }

    #[tokio::test]
    async fn review_then_reject() {
        let store = MemoryStore::new();
        let (student, _) = registered(&store, "a", Role::User).await;
        let (teacher, _) = registered(&store, "t", Role::Admin).await;
        let project = store
            .submit(&student, todo_app(), &Config::testing())
            .await
            .unwrap();

        let reviewing = store.start_review(&teacher, project.id).await.unwrap();
        assert_eq!(reviewing.status, ProjectStatus::Review);
        assert_eq!(
            store.start_review(&teacher, project.id).await.unwrap_err(),
            PortalError::InvalidTransition {
                from: ProjectStatus::Review,
                to: ProjectStatus::Review
            }
        );

        let rejected = store.reject(&teacher, project.id).await.unwrap();
        assert_eq!(rejected.status, ProjectStatus::Rejected);
        assert_eq!(rejected.grades, None);
        assert!(store
            .grade(&teacher, project.id, RubricScores::new(5, 5, 5, 5), "late")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn students_cannot_grade() {
        let store = MemoryStore::new();
        let (student, _) = registered(&store, "a", Role::User).await;
        let project = store
            .submit(&student, todo_app(), &Config::testing())
            .await
            .unwrap();

        let err = store
            .grade(&student, project.id, RubricScores::new(10, 10, 10, 10), "mine")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn only_the_class_teacher_grades_class_projects() {
        let store = MemoryStore::new();
        let config = Config::testing();
        let (owner, _) = registered(&store, "owner", Role::Admin).await;
        let (other, _) = registered(&store, "other", Role::Admin).await;
        let (student, _) = registered(&store, "a", Role::User).await;
        let (root, _) = store
            .register(
                crate::data::user::db::UserSignupData::new(
                    "Root",
                    "root@example.com",
                    "password123",
                )
                .with_role(Role::SuperAdmin),
                &config,
            )
            .await
            .unwrap();

        let class = store
            .create_class(
                &owner,
                ClassCreateData {
                    name: "CS101".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let mut data = todo_app();
        data.class_key = Some(class.key.to_string());
        let project = store.submit(&student, data, &config).await.unwrap();

        let err = store.start_review(&other, project.id).await.unwrap_err();
        assert!(matches!(err, PortalError::NotAuthorized(_)));

        assert!(store.start_review(&owner, project.id).await.is_ok());
        let graded = store
            .grade(&root, project.id, RubricScores::new(1, 1, 1, 1), "Needs work")
            .await
            .unwrap();
        assert_eq!(graded.grades.unwrap().total_score(), 4);
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let store = MemoryStore::new();
        let (teacher, _) = registered(&store, "t", Role::Admin).await;
        let id = Uuid::new_v4();

        assert_eq!(
            store.reject(&teacher, id).await.unwrap_err(),
            PortalError::not_found("project", id)
        );
    }
}
