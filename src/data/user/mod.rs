use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use crypto::util::fixed_time_eq;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::role::Role;

pub type Salt = [u8; 16];

/// Salted bcrypt hash of a SHA-256 prehashed password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash {
    cost: u32,
    salt: Salt,
    hash: [u8; 24],
}

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, cost: u32) -> PasswordHash {
        let salt: Salt = rand::random();
        PasswordHash {
            cost,
            salt,
            hash: Self::digest(password.as_ref(), cost, &salt),
        }
    }

    fn digest(password: &str, cost: u32, salt: &Salt) -> [u8; 24] {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_bytes());

        bcrypt(cost, salt, sha.finalize().as_slice(), &mut pw_hash);

        pw_hash
    }

    pub fn verify(&self, password: impl AsRef<str>) -> bool {
        let candidate = Self::digest(password.as_ref(), self.cost, &self.salt);
        fixed_time_eq(&candidate, &self.hash)
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordHash(cost={})", self.cost)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
}

impl ProfileLinks {
    /// Overwrites only the links present in `other`.
    pub fn merge(&mut self, other: ProfileLinks) {
        if other.github.is_some() {
            self.github = other.github;
        }
        if other.linkedin.is_some() {
            self.linkedin = other.linkedin;
        }
        if other.portfolio.is_some() {
            self.portfolio = other.portfolio;
        }
    }
}

fn true_bool() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub enrolled_classes: Vec<Uuid>,
    #[serde(default)]
    pub created_classes: Vec<Uuid>,
    #[serde(default)]
    pub links: ProfileLinks,
    #[serde(default = "true_bool")]
    pub active: bool,
    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub pw_hash: Option<PasswordHash>,
}

impl UserProfile {
    pub fn new(
        name: impl ToString,
        email: impl ToString,
        password: impl AsRef<str>,
        role: Role,
        cost: u32,
    ) -> UserProfile {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new user with UUID: {}", id);

        UserProfile {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            profile_image: None,
            enrolled_classes: vec![],
            created_classes: vec![],
            links: ProfileLinks::default(),
            active: true,
            created_at: Utc::now(),
            pw_hash: Some(PasswordHash::new(password, cost)),
        }
    }

    pub fn check_password(&self, password: impl AsRef<str>) -> bool {
        match &self.pw_hash {
            Some(hash) => hash.verify(password),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_original() {
        let hash = PasswordHash::new("correct horse", 4);
        assert!(hash.verify("correct horse"));
        assert!(!hash.verify("correct horse "));
        assert!(!hash.verify(""));
    }

    #[test]
    fn password_hashes_are_salted() {
        let a = PasswordHash::new("same password", 4);
        let b = PasswordHash::new("same password", 4);
        assert_ne!(a, b);
    }

    #[test]
    fn profile_json_hides_password() {
        let user = UserProfile::new("Ana", "ana@example.com", "hunter2hunter2", Role::User, 4);
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("pwHash").is_none());
        assert!(json.get("pw_hash").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["enrolledClasses"], serde_json::json!([]));
        assert!(user.check_password("hunter2hunter2"));
    }

    #[test]
    fn links_merge_keeps_absent_entries() {
        let mut links = ProfileLinks {
            github: Some("https://github.com/ana".into()),
            linkedin: None,
            portfolio: Some("https://ana.dev".into()),
        };
        links.merge(ProfileLinks {
            linkedin: Some("https://linkedin.com/in/ana".into()),
            portfolio: Some("https://ana.example".into()),
            ..Default::default()
        });

        assert_eq!(links.github.as_deref(), Some("https://github.com/ana"));
        assert_eq!(links.linkedin.as_deref(), Some("https://linkedin.com/in/ana"));
        assert_eq!(links.portfolio.as_deref(), Some("https://ana.example"));
    }
}
