pub mod bugs;
pub mod members;
pub mod projects;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::debug;
use serde::Deserialize;

use crate::{
    db,
    error::{AppError, Result},
    forms::FormData,
    models::{Bug, Member, Project},
    session_auth::AuthSession,
    utils, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/profile/", get(members::profile))
        .merge(members::router())
        .merge(projects::router())
        .merge(bugs::router())
}

/// Landing page: the login form, or the profile for members already logged in
async fn index(auth_session: AuthSession, State(state): State<AppState>) -> Result<Response> {
    if auth_session.user.is_some() {
        return Ok(utils::redirect("/profile/"));
    }
    members::render_login(&state, "", "", vec![]).map(IntoResponse::into_response)
}

/// `?show_inactive=<anything non empty>` on list pages
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    show_inactive: Option<String>,
}

impl ListQuery {
    pub fn show_inactive(&self) -> bool {
        self.show_inactive.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Numeric record id from the `:id` path segment. Ids that don't parse name no record, so they
/// are rejected as not found.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdPath(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound)?;
        raw.parse().map(IdPath).map_err(|_| {
            debug!("no record behind path id {raw:?}");
            AppError::NotFound
        })
    }
}

pub(crate) async fn load_member(state: &AppState, id: i64) -> Result<Member> {
    db::get_member(&state.db_conn, id)
        .await?
        .ok_or(AppError::NotFound)
}

pub(crate) async fn load_project(state: &AppState, id: i64) -> Result<Project> {
    db::get_project(&state.db_conn, id)
        .await?
        .ok_or(AppError::NotFound)
}

pub(crate) async fn load_bug(state: &AppState, id: i64) -> Result<Bug> {
    db::get_bug(&state.db_conn, id).await?.ok_or(AppError::NotFound)
}

/// First id of `ids` without a member behind it
pub(crate) async fn unknown_member(state: &AppState, ids: &[i64]) -> Result<Option<i64>> {
    let members = db::members_by_ids(&state.db_conn, ids).await?;
    Ok(ids
        .iter()
        .copied()
        .find(|id| !members.iter().any(|member| member.id == *id)))
}

/// Rejects an action payload naming members that don't exist
pub(crate) async fn ensure_members_exist(state: &AppState, ids: &[i64]) -> Result<()> {
    match unknown_member(state, ids).await? {
        Some(id) => Err(AppError::bad_request(format!("Member {id} does not exist"))),
        None => Ok(()),
    }
}

/// The `status` field of a status change form
pub(crate) fn status_field(form: &FormData) -> Result<&str> {
    form.get("status")
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .ok_or_else(|| AppError::bad_request("No status given"))
}
