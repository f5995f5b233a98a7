use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ClassInfo, ClassKey};
use crate::data::user::db::{IdentityExt, UserRepository};
use crate::error::{PortalError, Violation};
use crate::resp::jwt::Session;

/// Fresh keys drawn before giving up on finding an unused one.
const KEY_ATTEMPTS: usize = 16;

/// Storage boundary for classes.
pub trait ClassRepository {
    async fn get_class(&self, id: Uuid) -> Option<ClassInfo>;
    async fn get_class_by_key(&self, key: &str) -> Option<ClassInfo>;
    /// Fails with [PortalError::DuplicateKey] when another class uses the key.
    async fn insert_class(&self, class: ClassInfo) -> Result<(), PortalError>;
    /// Returns `false` when the student was already enrolled.
    async fn append_student(&self, class: Uuid, student: Uuid) -> Result<bool, PortalError>;
    async fn list_classes_by_teacher(&self, teacher: Uuid) -> Vec<ClassInfo>;
    async fn list_classes_by_student(&self, student: Uuid) -> Vec<ClassInfo>;
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassCreateData {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct JoinClassData {
    pub key: String,
}

pub trait ClassRegistryExt {
    async fn create_class(
        &self,
        session: &Session,
        data: ClassCreateData,
    ) -> Result<ClassInfo, PortalError>;

    /// [ClassRegistryExt::create_class] drawing keys from `rng`.
    async fn create_class_with<R: Rng + Send>(
        &self,
        session: &Session,
        data: ClassCreateData,
        rng: &mut R,
    ) -> Result<ClassInfo, PortalError>;

    async fn find_by_key(&self, key: &str) -> Option<ClassInfo>;

    /// `Ok(false)` when no class uses `key`; nothing is changed then.
    async fn join_by_key(&self, student: Uuid, key: &str) -> Result<bool, PortalError>;

    async fn list_by_teacher(&self, teacher: Uuid) -> Vec<ClassInfo>;
    async fn list_by_student(&self, student: Uuid) -> Vec<ClassInfo>;
}

impl<T: ClassRepository + UserRepository + Sync> ClassRegistryExt for T {
    async fn create_class(
        &self,
        session: &Session,
        data: ClassCreateData,
    ) -> Result<ClassInfo, PortalError> {
        self.create_class_with(session, data, &mut StdRng::from_entropy())
            .await
    }

    async fn create_class_with<R: Rng + Send>(
        &self,
        session: &Session,
        data: ClassCreateData,
        rng: &mut R,
    ) -> Result<ClassInfo, PortalError> {
        let teacher = self.current_user(session).await?;
        if !teacher.role.can_grade() {
            return Err(PortalError::not_authorized("only teachers can create classes"));
        }

        let name = data.name.trim();
        if name.is_empty() {
            return Err(Violation::MissingField { field: "name" }.into());
        }

        let mut class = ClassInfo {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key: ClassKey::generate(rng),
            teacher_id: teacher.id,
            teacher_name: teacher.name.clone(),
            description: crate::util::non_blank(data.description.as_deref()).map(String::from),
            created_at: Utc::now(),
            students: vec![],
        };

        let mut attempt = 1;
        loop {
            match self.insert_class(class.clone()).await {
                Ok(()) => break,
                Err(PortalError::DuplicateKey(key)) if attempt < KEY_ATTEMPTS => {
                    tracing::warn!("class key {} collided, drawing another", key);
                    class.key = ClassKey::generate(rng);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.modify_user(teacher.id, |it| {
            it.created_classes.push(class.id);
            Ok(())
        })
        .await?;
        tracing::info!("created class '{}' with key {}", class.name, class.key);

        Ok(class)
    }

    async fn find_by_key(&self, key: &str) -> Option<ClassInfo> {
        let key = key.trim();
        if !ClassKey::is_well_formed(key) {
            return None;
        }
        self.get_class_by_key(key).await
    }

    async fn join_by_key(&self, student: Uuid, key: &str) -> Result<bool, PortalError> {
        if self.get_user(student).await.is_none() {
            return Err(PortalError::not_found("user", student));
        }

        let class = match self.find_by_key(key).await {
            Some(it) => it,
            None => {
                tracing::debug!("no class uses key '{}'", key);
                return Ok(false);
            }
        };

        if self.append_student(class.id, student).await? {
            tracing::info!("{} joined class {}", student, class.id);
        }
        self.modify_user(student, |it| {
            if !it.enrolled_classes.contains(&class.id) {
                it.enrolled_classes.push(class.id);
            }
            Ok(())
        })
        .await?;

        Ok(true)
    }

    async fn list_by_teacher(&self, teacher: Uuid) -> Vec<ClassInfo> {
        self.list_classes_by_teacher(teacher).await
    }

    async fn list_by_student(&self, student: Uuid) -> Vec<ClassInfo> {
        self.list_classes_by_student(student).await
    }
}
