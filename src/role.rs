use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// Portal-wide role of an account.
///
/// `User` accounts are students, `Admin` accounts are teachers. Ordering follows privilege.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Indicates whether user with role can create classes and grade projects
    pub fn can_grade(self) -> bool {
        match self {
            Role::User => false,
            Role::Admin | Role::SuperAdmin => true,
        }
    }

    /// Indicates whether user with role can list and moderate other accounts
    pub fn can_manage_users(self) -> bool {
        self.can_grade()
    }

    /// Whether a user with this role may move an account from `from` to `to`.
    pub fn can_assign(self, from: Role, to: Role) -> bool {
        match self {
            Role::User => false,
            Role::Admin => from != Role::SuperAdmin && to != Role::SuperAdmin,
            Role::SuperAdmin => true,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Role::User => "student",
            Role::Admin => "teacher",
            Role::SuperAdmin => "administrator",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
            Role::SuperAdmin => write!(f, "superadmin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::User < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn only_staff_can_grade() {
        assert!(!Role::User.can_grade());
        assert!(Role::Admin.can_grade());
        assert!(Role::SuperAdmin.can_grade());
    }

    #[test]
    fn admins_cannot_touch_superadmin() {
        assert!(Role::Admin.can_assign(Role::User, Role::Admin));
        assert!(!Role::Admin.can_assign(Role::User, Role::SuperAdmin));
        assert!(!Role::Admin.can_assign(Role::SuperAdmin, Role::User));
        assert!(Role::SuperAdmin.can_assign(Role::Admin, Role::SuperAdmin));
        assert!(!Role::User.can_assign(Role::User, Role::User));
    }

    #[test]
    fn role_names_round_trip_through_strings() {
        for role in [Role::User, Role::Admin, Role::SuperAdmin] {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
        assert!("teacher".parse::<Role>().is_err());
        assert_eq!(
            serde_json::to_string(&Role::SuperAdmin).unwrap(),
            "\"superadmin\""
        );
    }
}
