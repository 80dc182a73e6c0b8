use std::fmt;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_login::{AuthUser, AuthnBackend, UserId};
use log::debug;
use scrypt::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Params, Scrypt,
};
use thiserror::Error;
use tokio::task;

use crate::{db, db::DBConnection, error::AppError, models::Member, utils};

pub type AuthSession = axum_login::AuthSession<Backend>;

impl AuthUser for Member {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }

    /// Changing the password invalidates existing sessions
    fn session_auth_hash(&self) -> &[u8] {
        self.password_hash.as_bytes()
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Db(#[from] anyhow::Error),
    #[error(transparent)]
    TaskJoin(#[from] task::JoinError),
}

/// Member store seen from the session layer
#[derive(Clone)]
pub struct Backend {
    db_conn: DBConnection,
}

impl Backend {
    pub fn new(db_conn: DBConnection) -> Self {
        Backend { db_conn }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthnBackend for Backend {
    type User = Member;
    type Credentials = Credentials;
    type Error = BackendError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let email = utils::normalize_email(&creds.email);
        let Some(member) = db::member_by_email(&self.db_conn, &email).await? else {
            debug!("login attempt for unknown email {email}");
            return Ok(None);
        };

        // scrypt blocks for a while, run it on the blocking pool
        let password_hash = member.password_hash.clone();
        let valid =
            task::spawn_blocking(move || verify_password(&creds.password, &password_hash)).await?;

        Ok(valid.then_some(member))
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        Ok(db::get_member(&self.db_conn, *user_id).await?)
    }
}

#[cfg(not(test))]
fn scrypt_params() -> Params {
    Params::recommended()
}

// cheap parameters so tests don't spend seconds per hash
#[cfg(test)]
fn scrypt_params() -> Params {
    Params::new(4, 8, 1, Params::RECOMMENDED_LEN).expect("valid scrypt parameters")
}

pub fn hash_password(password: &str) -> Result<String, scrypt::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Scrypt
        .hash_password_customized(password.as_bytes(), None, None, scrypt_params(), &salt)?
        .to_string();

    Ok(password_hash)
}

/// `hash_password` run on the blocking pool, for use inside handlers
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(|err| AppError::Password(err.to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| Scrypt.verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// The logged in member of a request. Anonymous requests are redirected to the login page with
/// the original path in `next`.
#[derive(Debug, Clone)]
pub struct CurrentMember(pub Member);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentMember
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_session = AuthSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        if let Some(member) = auth_session.user {
            return Ok(CurrentMember(member));
        }

        // nested routers strip their prefix from `parts.uri`
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let next = uri
            .path_and_query()
            .map(|path| path.as_str())
            .unwrap_or_else(|| uri.path());

        debug!("anonymous request to {next}");
        Err(utils::login_redirect(next))
    }
}
