use std::fmt::{Display, Formatter};
use std::ops::Deref;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

pub const CLASS_KEY_LENGTH: usize = 8;
const CLASS_KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Join code a teacher hands out so students can enroll themselves.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ClassKey(String);

impl ClassKey {
    /// Draws [CLASS_KEY_LENGTH] characters uniformly from `[A-Z0-9]`.
    pub fn generate(rng: &mut impl Rng) -> ClassKey {
        let key = (0..CLASS_KEY_LENGTH)
            .map(|_| CLASS_KEY_ALPHABET[rng.gen_range(0..CLASS_KEY_ALPHABET.len())] as char)
            .collect();
        ClassKey(key)
    }

    /// Whether `key` has the shape of a generated key.
    pub fn is_well_formed(key: &str) -> bool {
        key.len() == CLASS_KEY_LENGTH && key.bytes().all(|b| CLASS_KEY_ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ClassKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ClassKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassKey {
    fn from(s: &str) -> Self {
        ClassKey(s.to_string())
    }
}

impl From<String> for ClassKey {
    fn from(s: String) -> Self {
        ClassKey(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: Uuid,
    pub name: String,
    pub key: ClassKey,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub students: Vec<Uuid>,
}

impl ClassInfo {
    pub fn has_student(&self, student: Uuid) -> bool {
        self.students.contains(&student)
    }
}
