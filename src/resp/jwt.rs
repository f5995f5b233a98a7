use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome::{Error, Success};
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::user::UserProfile;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

pub static AUTH_COOKIE_NAME: &str = "portal_session";

/// Signed-in user, passed explicitly into every operation that acts on their behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
}

impl Session {
    pub fn new(user: &UserProfile, ttl: Duration) -> Session {
        let now = Utc::now();
        Session {
            iat: now,
            exp: now + ttl,
            user: user.id,
            role: user.role,
        }
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, secret: impl AsRef<[u8]>) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_ref());

        encode(&header, &self, &key)
    }

    pub fn decode_jwt(
        token: &str,
        secret: impl AsRef<[u8]>,
    ) -> Result<Session, jsonwebtoken::errors::Error> {
        decode::<Session>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }

    pub fn cookie(
        &self,
        secret: impl AsRef<[u8]>,
        secure: bool,
    ) -> Result<Cookie<'static>, jsonwebtoken::errors::Error> {
        Ok(Cookie::build((AUTH_COOKIE_NAME, self.encode_jwt(secret)?))
            .secure(secure)
            .expires(OffsetDateTime::from_unix_timestamp(self.exp.timestamp()).ok())
            .path("/")
            .http_only(true)
            .build())
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Reads the session from the `Authorization: Bearer` header, falling back to the cookie.
pub fn extract_session(
    req: &Request<'_>,
    cookies: &CookieJar<'_>,
    secret: impl AsRef<[u8]>,
) -> Result<Session, Problem> {
    let token = match bearer_token(req) {
        Some(token) => token.to_string(),
        None => match cookies.get(AUTH_COOKIE_NAME) {
            Some(jwt) => jwt.value().to_owned(),
            None => return Err(auth_problem("No session token.")),
        },
    };
    tracing::trace!("extracted session token");

    match Session::decode_jwt(&token, secret) {
        Ok(it) => {
            tracing::debug!("decoded session for user: {}", it.user);
            Ok(it)
        }
        Err(e) => Err(Problem::from(e)),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security: &Security = match req.rocket().state() {
            Some(it) => it,
            None => {
                return Error((
                    Status::InternalServerError,
                    Problem::new_untyped(
                        Status::InternalServerError,
                        "Session signing secret isn't loaded.",
                    ),
                ))
            }
        };

        match extract_session(req, req.cookies(), &security.session_secret) {
            Ok(session) => Success(session),
            Err(e) => {
                tracing::debug!("unable to extract session: {}", e);
                Error((Status::Unauthorized, e))
            }
        }
    }
}

mod date_time_as_unix_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| de::Error::custom(format!("invalid unix timestamp {}", seconds)))
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> SecurityScheme {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}
