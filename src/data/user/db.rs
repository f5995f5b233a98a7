use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PortalError, Violation, Violations};
use crate::resp::jwt::Session;
use crate::role::Role;

use super::{ProfileLinks, UserProfile};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only looks at this many bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

lazy_static! {
    static ref EMAIL_PATTERN: regex::Regex =
        regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Storage boundary for accounts.
pub trait UserRepository {
    async fn get_user(&self, id: Uuid) -> Option<UserProfile>;
    async fn get_user_by_email(&self, email: &str) -> Option<UserProfile>;
    /// Fails with [PortalError::DuplicateEmail] when the email is taken.
    async fn insert_user(&self, user: UserProfile) -> Result<(), PortalError>;
    /// Applies `change` to the stored record in one step and returns the result.
    ///
    /// An error from `change`, an unknown id, or an email taken by another
    /// account leaves the record untouched.
    async fn modify_user<F>(&self, id: Uuid, change: F) -> Result<UserProfile, PortalError>
    where
        F: FnOnce(&mut UserProfile) -> Result<(), PortalError> + Send;
    async fn list_users(&self) -> Vec<UserProfile>;
}

fn default_role() -> Role {
    Role::User
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserSignupData {
    pub name: String,
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}:{}", self.email, self.role)
    }
}

impl UserSignupData {
    pub fn new(name: impl ToString, email: impl ToString, password: impl ToString) -> Self {
        UserSignupData {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::User,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn validate(&self) -> Result<(), PortalError> {
        let mut violations = Violations::new();

        if self.name.trim().is_empty() {
            violations.push(Violation::MissingField { field: "name" });
        }

        if self.email.trim().is_empty() {
            violations.push(Violation::MissingField { field: "email" });
        } else if !is_valid_email(&self.email) {
            violations.push(Violation::InvalidEmail {
                email: self.email.clone(),
            });
        }

        if self.password.len() < MIN_PASSWORD_LENGTH || self.password.len() > MAX_PASSWORD_LENGTH {
            violations.push(Violation::PasswordLength {
                min: MIN_PASSWORD_LENGTH,
                max: MAX_PASSWORD_LENGTH,
            });
        }

        violations.into_result()
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    #[schema(format = "email")]
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginData:{}", self.email)
    }
}

/// Partial profile; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub links: Option<ProfileLinks>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), PortalError> {
        let mut violations = Violations::new();

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                violations.push(Violation::MissingField { field: "name" });
            }
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                violations.push(Violation::InvalidEmail {
                    email: email.clone(),
                });
            }
        }

        violations.into_result()
    }

    pub fn apply_to(self, user: &mut UserProfile) {
        if let Some(name) = self.name {
            user.name = name.trim().to_string();
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if self.profile_image.is_some() {
            user.profile_image = self.profile_image;
        }
        if let Some(links) = self.links {
            user.links.merge(links);
        }
    }
}

/// Account as other users see it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub links: ProfileLinks,
}

impl From<UserProfile> for UserResponse {
    fn from(user: UserProfile) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            role: user.role,
            profile_image: user.profile_image,
            links: user.links,
        }
    }
}

pub trait IdentityExt {
    /// Creates an account and signs it in.
    async fn register(
        &self,
        signup: UserSignupData,
        config: &Config,
    ) -> Result<(Session, UserProfile), PortalError>;

    async fn login(
        &self,
        login: UserLoginData,
        config: &Config,
    ) -> Result<(Session, UserProfile), PortalError>;

    fn logout(&self, session: Session);

    /// Account behind the session, which may have been changed since it was issued.
    async fn current_user(&self, session: &Session) -> Result<UserProfile, PortalError>;

    async fn update_profile(
        &self,
        session: &Session,
        update: ProfileUpdate,
    ) -> Result<UserProfile, PortalError>;

    /// Superadmin edit of someone else's account.
    async fn update_user_as(
        &self,
        session: &Session,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, PortalError>;

    async fn list_users_matching(
        &self,
        session: &Session,
        search: Option<&str>,
    ) -> Result<Vec<UserProfile>, PortalError>;

    /// Account created by a superadmin on someone else's behalf; nobody is signed in.
    async fn create_user(
        &self,
        session: &Session,
        signup: UserSignupData,
        config: &Config,
    ) -> Result<UserProfile, PortalError>;

    async fn set_role(
        &self,
        session: &Session,
        id: Uuid,
        role: Role,
    ) -> Result<UserProfile, PortalError>;

    async fn set_active(
        &self,
        session: &Session,
        id: Uuid,
        active: bool,
    ) -> Result<UserProfile, PortalError>;
}

impl<T: UserRepository + Sync> IdentityExt for T {
    async fn register(
        &self,
        signup: UserSignupData,
        config: &Config,
    ) -> Result<(Session, UserProfile), PortalError> {
        signup.validate()?;

        if signup.role == Role::SuperAdmin && !config.is_superadmin_email(&signup.email) {
            tracing::warn!("refused superadmin self-registration for {}", signup.email);
            return Err(PortalError::not_authorized(
                "superadmin accounts can't be self-registered",
            ));
        }

        if self.get_user_by_email(&signup.email).await.is_some() {
            return Err(PortalError::DuplicateEmail(signup.email));
        }

        let user = UserProfile::new(
            signup.name.trim(),
            &signup.email,
            &signup.password,
            signup.role,
            config.password_cost,
        );
        self.insert_user(user.clone()).await?;
        tracing::info!("registered {} as {}", user.email, user.role.describe());

        Ok((Session::new(&user, config.session_ttl()), user))
    }

    async fn login(
        &self,
        login: UserLoginData,
        config: &Config,
    ) -> Result<(Session, UserProfile), PortalError> {
        // VULN: Nothing throttles repeated attempts for one email.
        let user = self
            .get_user_by_email(&login.email)
            .await
            .ok_or(PortalError::InvalidCredentials)?;

        if !user.check_password(&login.password) {
            tracing::debug!("wrong password for {}", login.email);
            return Err(PortalError::InvalidCredentials);
        }

        if !user.active {
            return Err(PortalError::not_authorized("account is deactivated"));
        }

        tracing::info!("{} signed in", user.email);
        Ok((Session::new(&user, config.session_ttl()), user))
    }

    fn logout(&self, session: Session) {
        tracing::info!("user {} signed out", session.user);
    }

    async fn current_user(&self, session: &Session) -> Result<UserProfile, PortalError> {
        match self.get_user(session.user).await {
            Some(user) if user.active => Ok(user),
            Some(_) => Err(PortalError::not_authorized("account is deactivated")),
            None => Err(PortalError::NotAuthenticated),
        }
    }

    async fn update_profile(
        &self,
        session: &Session,
        update: ProfileUpdate,
    ) -> Result<UserProfile, PortalError> {
        let user = self.current_user(session).await?;
        update.validate()?;

        let user = self
            .modify_user(user.id, |it| {
                update.apply_to(it);
                Ok(())
            })
            .await?;
        tracing::info!("updated profile of {}", user.id);

        Ok(user)
    }

    async fn update_user_as(
        &self,
        session: &Session,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, PortalError> {
        let actor = self.current_user(session).await?;
        if actor.role != Role::SuperAdmin {
            return Err(PortalError::not_authorized(
                "only a superadmin can edit other accounts",
            ));
        }
        update.validate()?;

        let user = self
            .modify_user(id, |it| {
                update.apply_to(it);
                Ok(())
            })
            .await?;
        tracing::info!("{} edited account {}", actor.id, user.id);

        Ok(user)
    }

    async fn list_users_matching(
        &self,
        session: &Session,
        search: Option<&str>,
    ) -> Result<Vec<UserProfile>, PortalError> {
        let actor = self.current_user(session).await?;
        if !actor.role.can_manage_users() {
            return Err(PortalError::not_authorized("only staff can list accounts"));
        }

        let users = self.list_users().await;
        let needle = match crate::util::non_blank(search) {
            Some(it) => it.to_lowercase(),
            None => return Ok(users),
        };

        Ok(users
            .into_iter()
            .filter(|it| {
                it.name.to_lowercase().contains(&needle)
                    || it.email.to_lowercase().contains(&needle)
            })
            .collect())
    }

    async fn create_user(
        &self,
        session: &Session,
        signup: UserSignupData,
        config: &Config,
    ) -> Result<UserProfile, PortalError> {
        let actor = self.current_user(session).await?;
        if actor.role != Role::SuperAdmin {
            return Err(PortalError::not_authorized(
                "only a superadmin can create accounts",
            ));
        }

        signup.validate()?;
        if self.get_user_by_email(&signup.email).await.is_some() {
            return Err(PortalError::DuplicateEmail(signup.email));
        }

        let user = UserProfile::new(
            signup.name.trim(),
            &signup.email,
            &signup.password,
            signup.role,
            config.password_cost,
        );
        self.insert_user(user.clone()).await?;
        tracing::info!("{} created account {} as {}", actor.id, user.email, user.role);

        Ok(user)
    }

    async fn set_role(
        &self,
        session: &Session,
        id: Uuid,
        role: Role,
    ) -> Result<UserProfile, PortalError> {
        let actor = self.current_user(session).await?;
        if actor.id == id {
            return Err(PortalError::not_authorized("you can't change your own role"));
        }

        let user = self
            .modify_user(id, |it| {
                if !actor.role.can_assign(it.role, role) {
                    tracing::warn!("{} tried to move {} from {} to {}", actor.id, id, it.role, role);
                    return Err(PortalError::not_authorized(format!(
                        "{} can't change a {} into a {}",
                        actor.role, it.role, role
                    )));
                }
                it.role = role;
                Ok(())
            })
            .await?;
        tracing::info!("{} is now {}", user.id, role);

        Ok(user)
    }

    async fn set_active(
        &self,
        session: &Session,
        id: Uuid,
        active: bool,
    ) -> Result<UserProfile, PortalError> {
        let actor = self.current_user(session).await?;
        if !actor.role.can_manage_users() {
            return Err(PortalError::not_authorized("only staff can moderate accounts"));
        }
        if actor.id == id {
            return Err(PortalError::not_authorized("you can't deactivate yourself"));
        }

        let user = self
            .modify_user(id, |it| {
                if it.role > actor.role {
                    return Err(PortalError::not_authorized(
                        "account outranks the moderator",
                    ));
                }
                it.active = active;
                Ok(())
            })
            .await?;
        tracing::info!("{} active: {}", user.id, active);

        Ok(user)
    }
}
