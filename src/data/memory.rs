use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::class::db::ClassRepository;
use super::class::ClassInfo;
use super::project::db::{ProjectFilter, ProjectRepository};
use super::project::grading::Grading;
use super::project::{Project, ProjectStatus};
use super::user::db::UserRepository;
use super::user::UserProfile;
use crate::error::PortalError;

/// Process-local storage for every registry. Records keep insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Vec<UserProfile>>,
    classes: RwLock<Vec<ClassInfo>>,
    projects: RwLock<Vec<Project>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl UserRepository for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Option<UserProfile> {
        self.users.read().await.iter().find(|it| it.id == id).cloned()
    }

    async fn get_user_by_email(&self, email: &str) -> Option<UserProfile> {
        self.users
            .read()
            .await
            .iter()
            .find(|it| it.email == email)
            .cloned()
    }

    async fn insert_user(&self, user: UserProfile) -> Result<(), PortalError> {
        let mut users = self.users.write().await;
        if users.iter().any(|it| it.email == user.email) {
            return Err(PortalError::DuplicateEmail(user.email));
        }
        users.push(user);
        Ok(())
    }

    async fn modify_user<F>(&self, id: Uuid, change: F) -> Result<UserProfile, PortalError>
    where
        F: FnOnce(&mut UserProfile) -> Result<(), PortalError> + Send,
    {
        let mut users = self.users.write().await;
        let index = users
            .iter()
            .position(|it| it.id == id)
            .ok_or_else(|| PortalError::not_found("user", id))?;

        let mut user = users[index].clone();
        change(&mut user)?;
        if users.iter().any(|it| it.id != id && it.email == user.email) {
            return Err(PortalError::DuplicateEmail(user.email));
        }

        users[index] = user.clone();
        Ok(user)
    }

    async fn list_users(&self) -> Vec<UserProfile> {
        self.users.read().await.clone()
    }
}

impl ClassRepository for MemoryStore {
    async fn get_class(&self, id: Uuid) -> Option<ClassInfo> {
        self.classes
            .read()
            .await
            .iter()
            .find(|it| it.id == id)
            .cloned()
    }

    async fn get_class_by_key(&self, key: &str) -> Option<ClassInfo> {
        self.classes
            .read()
            .await
            .iter()
            .find(|it| it.key.as_str() == key)
            .cloned()
    }

    async fn insert_class(&self, class: ClassInfo) -> Result<(), PortalError> {
        let mut classes = self.classes.write().await;
        if classes.iter().any(|it| it.key == class.key) {
            return Err(PortalError::DuplicateKey(class.key.to_string()));
        }
        classes.push(class);
        Ok(())
    }

    async fn append_student(&self, class: Uuid, student: Uuid) -> Result<bool, PortalError> {
        let mut classes = self.classes.write().await;
        let class = classes
            .iter_mut()
            .find(|it| it.id == class)
            .ok_or_else(|| PortalError::not_found("class", class))?;

        if class.has_student(student) {
            return Ok(false);
        }
        class.students.push(student);
        Ok(true)
    }

    async fn list_classes_by_teacher(&self, teacher: Uuid) -> Vec<ClassInfo> {
        self.classes
            .read()
            .await
            .iter()
            .filter(|it| it.teacher_id == teacher)
            .cloned()
            .collect()
    }

    async fn list_classes_by_student(&self, student: Uuid) -> Vec<ClassInfo> {
        self.classes
            .read()
            .await
            .iter()
            .filter(|it| it.has_student(student))
            .cloned()
            .collect()
    }
}

impl ProjectRepository for MemoryStore {
    async fn insert_project(&self, project: Project) -> Result<(), PortalError> {
        self.projects.write().await.push(project);
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Option<Project> {
        self.projects
            .read()
            .await
            .iter()
            .find(|it| it.id == id)
            .cloned()
    }

    async fn list_projects(&self, filter: &ProjectFilter) -> Vec<Project> {
        self.projects
            .read()
            .await
            .iter()
            .filter(|it| filter.matches(it))
            .cloned()
            .collect()
    }

    async fn update_status_and_grade(
        &self,
        id: Uuid,
        to: ProjectStatus,
        grading: Option<Grading>,
        reviewed_by: Uuid,
    ) -> Result<Project, PortalError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .iter_mut()
            .find(|it| it.id == id)
            .ok_or_else(|| PortalError::not_found("project", id))?;

        if !project.status.can_move_to(to) {
            tracing::warn!("refused to move {} from {} to {}", id, project.status, to);
            return Err(PortalError::InvalidTransition {
                from: project.status,
                to,
            });
        }

        project.status = to;
        if grading.is_some() {
            project.grades = grading;
        }
        project.reviewed_by = Some(reviewed_by);
        project.updated_at = Some(Utc::now());

        Ok(project.clone())
    }
}

/// Registers `<name>@example.com` with the given role on a cheap password hash.
#[cfg(test)]
pub(crate) async fn registered(
    store: &MemoryStore,
    name: &str,
    role: crate::role::Role,
) -> (crate::resp::jwt::Session, UserProfile) {
    use crate::data::user::db::{IdentityExt, UserSignupData};

    store
        .register(
            UserSignupData::new(name, format!("{}@example.com", name), "password123")
                .with_role(role),
            &crate::config::Config::testing(),
        )
        .await
        .expect("unable to register test user")
}
