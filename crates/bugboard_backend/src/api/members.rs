use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{load_member, IdPath};
use crate::{
    db,
    error::{AppError, Result},
    forms::FormData,
    models::Member,
    permissions,
    session_auth::{self, AuthSession, Credentials, CurrentMember},
    templates::{self, BugRow, MemberRow, MessageRow, ProjectRow},
    utils, AppState,
};

/// Messages listed on a profile page
const RECENT_MESSAGES: usize = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/members/", get(list))
        .route("/members/login", get(login_page).post(login))
        .route("/members/logout", post(logout))
        .route("/members/register", get(register_page).post(register))
        .route("/members/:id", get(detail))
        .route("/members/:id/edit", get(edit_page).post(edit))
        .route("/members/:id/delete", post(delete))
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

pub(crate) fn render_login(
    state: &AppState,
    next: &str,
    email: &str,
    errors: Vec<String>,
) -> Result<Html<String>> {
    let mut context = tera::Context::new();
    context.insert("next", next);
    context.insert("email", email);
    context.insert("errors", &errors);
    state.render("login.html", &context)
}

async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
) -> Result<Html<String>> {
    let next = query.next.as_deref().and_then(utils::safe_next).unwrap_or_default();
    render_login(&state, next, "", vec![])
}

async fn login(
    mut auth_session: AuthSession,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let form = FormData::parse(&body)?;
    let next = form.get("next").and_then(utils::safe_next);
    let credentials = Credentials {
        email: form.text("email"),
        password: form.get("password").unwrap_or_default().to_owned(),
    };

    let Some(member) = auth_session.authenticate(credentials.clone()).await? else {
        warn!("failed login for {}", credentials.email);
        let errors = vec![String::from("Please enter a correct email and password.")];
        return render_login(&state, next.unwrap_or_default(), &credentials.email, errors)
            .map(IntoResponse::into_response);
    };

    auth_session.login(&member).await?;
    info!("member {} logged in", member.id);

    Ok(utils::redirect(next.unwrap_or("/profile/")))
}

async fn logout(
    CurrentMember(current): CurrentMember,
    mut auth_session: AuthSession,
) -> Result<Response> {
    auth_session.logout().await?;
    info!("member {} logged out", current.id);
    Ok(utils::redirect("/"))
}

async fn list(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
) -> Result<Html<String>> {
    let members = db::list_members(&state.db_conn).await?;

    let mut context = templates::page(&current);
    context.insert(
        "members",
        &members.iter().map(MemberRow::from).collect::<Vec<_>>(),
    );
    state.render("members/list.html", &context)
}

pub(crate) async fn profile(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
) -> Result<Html<String>> {
    render_profile(&state, &current, &current).await
}

async fn detail(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let member = load_member(&state, id).await?;
    render_profile(&state, &current, &member).await
}

async fn render_profile(state: &AppState, current: &Member, member: &Member) -> Result<Html<String>> {
    let projects = db::projects_of_member(&state.db_conn, member.id).await?;
    let bugs = db::bugs_assigned_to(&state.db_conn, member.id).await?;
    let messages = db::messages_by_writer(&state.db_conn, member.id).await?;

    let mut context = templates::page(current);
    context.insert("member", &MemberRow::from(member));
    context.insert("is_self", &(current.id == member.id));
    context.insert(
        "can_edit",
        &permissions::is_current_or_superuser(current, member.id),
    );
    context.insert(
        "projects",
        &projects.iter().map(ProjectRow::from).collect::<Vec<_>>(),
    );
    context.insert(
        "bugs",
        &bugs
            .iter()
            .filter(|bug| bug.status.is_active())
            .map(BugRow::from)
            .collect::<Vec<_>>(),
    );
    context.insert(
        "messages",
        &messages
            .iter()
            .take(RECENT_MESSAGES)
            .map(|message| MessageRow::new(message, Some(member)))
            .collect::<Vec<_>>(),
    );
    state.render("members/profile.html", &context)
}

/// Values and wording of the member form, shared by registration and editing
#[derive(Debug, Serialize)]
struct MemberFormView {
    heading: &'static str,
    action: String,
    name: String,
    email: String,
    is_superuser: bool,
    /// Only superusers may grant or revoke the superuser flag
    show_superuser: bool,
    password_required: bool,
}

fn render_member_form(
    state: &AppState,
    current: &Member,
    form: &MemberFormView,
    errors: &[String],
) -> Result<Html<String>> {
    let mut context = templates::page(current);
    context.insert("form", form);
    context.insert("errors", errors);
    state.render("members/form.html", &context)
}

/// Validated fields of a submitted member form
struct MemberInput {
    name: String,
    email: String,
    password: String,
    is_superuser: bool,
}

/// Checks the submitted fields. `editing` is the member being edited, whose own email doesn't
/// count as taken and whose password may be left blank.
async fn validate_member(
    state: &AppState,
    form: &FormData,
    editing: Option<&Member>,
) -> Result<(MemberInput, Vec<String>)> {
    let input = MemberInput {
        name: form.text("name"),
        email: utils::normalize_email(&form.text("email")),
        password: form.get("password").unwrap_or_default().to_owned(),
        is_superuser: form.flag("is_superuser"),
    };

    let mut errors = vec![];
    if input.name.is_empty() {
        errors.push(String::from("Name is required."));
    }
    if input.email.is_empty() {
        errors.push(String::from("Email is required."));
    } else if !utils::is_valid_email(&input.email) {
        errors.push(String::from("Enter a valid email address."));
    } else if db::member_by_email(&state.db_conn, &input.email)
        .await?
        .is_some_and(|other| editing.map_or(true, |member| member.id != other.id))
    {
        errors.push(String::from("A member with this email already exists."));
    }
    if input.password.is_empty() && editing.is_none() {
        errors.push(String::from("Password is required."));
    }

    Ok((input, errors))
}

fn register_form(current: &Member) -> MemberFormView {
    MemberFormView {
        heading: "Register member",
        action: String::from("/members/register"),
        name: String::new(),
        email: String::new(),
        is_superuser: false,
        show_superuser: current.is_superuser,
        password_required: true,
    }
}

async fn register_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
) -> Result<Html<String>> {
    permissions::ensure(permissions::is_superuser(&current))?;
    render_member_form(&state, &current, &register_form(&current), &[])
}

async fn register(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    permissions::ensure(permissions::is_superuser(&current))?;
    let form = FormData::parse(&body)?;

    let (input, errors) = validate_member(&state, &form, None).await?;
    if !errors.is_empty() {
        let view = MemberFormView {
            name: input.name,
            email: input.email,
            is_superuser: input.is_superuser,
            ..register_form(&current)
        };
        return render_member_form(&state, &current, &view, &errors).map(IntoResponse::into_response);
    }

    let password_hash = session_auth::hash_password_blocking(input.password).await?;
    let member = db::create_member(
        &state.db_conn,
        &input.name,
        &input.email,
        password_hash,
        input.is_superuser,
    )
    .await?;
    info!("member {} registered member {}", current.id, member.id);

    Ok(utils::redirect("/members/"))
}

fn edit_form(current: &Member, member: &Member) -> MemberFormView {
    MemberFormView {
        heading: "Edit member",
        action: format!("/members/{}/edit", member.id),
        name: member.name.clone(),
        email: member.email.clone(),
        is_superuser: member.is_superuser,
        show_superuser: current.is_superuser,
        password_required: false,
    }
}

async fn edit_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let member = load_member(&state, id).await?;
    permissions::ensure(permissions::is_current_or_superuser(&current, member.id))?;
    render_member_form(&state, &current, &edit_form(&current, &member), &[])
}

async fn edit(
    CurrentMember(current): CurrentMember,
    mut auth_session: AuthSession,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut member = load_member(&state, id).await?;
    permissions::ensure(permissions::is_current_or_superuser(&current, member.id))?;
    let form = FormData::parse(&body)?;

    let (input, errors) = validate_member(&state, &form, Some(&member)).await?;
    if !errors.is_empty() {
        let view = MemberFormView {
            name: input.name,
            email: input.email,
            ..edit_form(&current, &member)
        };
        return render_member_form(&state, &current, &view, &errors).map(IntoResponse::into_response);
    }

    member.name = input.name;
    member.email = input.email;
    if current.is_superuser {
        member.is_superuser = input.is_superuser;
    }
    if !input.password.is_empty() {
        member.password_hash = session_auth::hash_password_blocking(input.password).await?;
    }
    db::save_member(&state.db_conn, &member).await?;
    info!("member {} edited member {}", current.id, member.id);

    // a new password changes the session hash, log in again to keep this session alive
    if member.id == current.id {
        auth_session.login(&member).await?;
    }

    Ok(utils::redirect(&format!("/members/{}", member.id)))
}

async fn delete(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response> {
    let member = load_member(&state, id).await?;
    permissions::ensure(permissions::is_superuser(&current))?;
    if member.id == current.id {
        return Err(AppError::bad_request("You can't delete your own account"));
    }

    db::delete_member(&state.db_conn, member.id).await?;
    info!("member {} deleted member {}", current.id, member.id);

    Ok(utils::redirect("/members/"))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::super::test_utils::*;
    use crate::{db, session_auth::verify_password};

    fn form(fields: &[(&str, &str)]) -> String {
        serde_urlencoded::to_string(fields).unwrap()
    }

    #[tokio::test]
    async fn login_redirects_to_next_or_profile() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;

        let body = form(&[
            ("email", "sample_user@gotmail.com"),
            ("password", PASSWORD),
            ("next", "/projects/"),
        ]);
        let res = app.request(Method::POST, "/members/login", None, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/projects/");

        let body = form(&[
            ("email", member.email.as_str()),
            ("password", PASSWORD),
            ("next", "https://elsewhere.example/"),
        ]);
        let res = app.request(Method::POST, "/members/login", None, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/profile/");
    }

    #[tokio::test]
    async fn wrong_password_renders_the_form_again() {
        let app = TestApp::new().await;
        app.member("Sample Member", "sample_user@gotmail.com").await;

        let body = form(&[("email", "sample_user@gotmail.com"), ("password", "nope")]);
        let res = app.request(Method::POST, "/members/login", None, &body).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Please enter a correct email and password."));
        assert!(html.contains("sample_user@gotmail.com"));
    }

    #[tokio::test]
    async fn login_page_keeps_next() {
        let app = TestApp::new().await;
        let res = app
            .request(Method::GET, "/members/login?next=%2Fbugs%2F3", None, "")
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("value=\"&#x2F;bugs&#x2F;3\""));
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&member).await;

        let res = app.post("/members/logout", &cookie, "").await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/");

        let res = app.get("/profile/", &cookie).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(location(&res).starts_with("/members/login"));
    }

    #[tokio::test]
    async fn list_and_profile_pages() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let other = app.member("Another Member", "another@gotmail.com").await;
        let project = app.project(&member, &[other.id]).await;
        let mut bug = app.bug(&member, &project, "Assigned Bug").await;
        bug.assign(&project, &[other.id]).unwrap();
        db::save_bug(&app.db_conn, &bug).await.unwrap();
        let cookie = app.login(&member).await;

        let res = app.get("/members/", &cookie).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        let another = html.find("Another Member").unwrap();
        let sample = html.find("Sample Member").unwrap();
        assert!(another < sample);

        let res = app.get(&format!("/members/{}", other.id), &cookie).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Sample Project"));
        assert!(html.contains("Assigned Bug"));

        let res = app.get("/profile/", &cookie).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("sample_user@gotmail.com"));
    }

    #[tokio::test]
    async fn only_superusers_register_members() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&member).await;
        let body = form(&[
            ("name", "New Member"),
            ("email", "new@gotmail.com"),
            ("password", "newpass"),
        ]);

        assert_eq!(app.get("/members/register", &cookie).await.status(), StatusCode::FORBIDDEN);
        let res = app.post("/members/register", &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(db::member_by_email(&app.db_conn, "new@gotmail.com").await.unwrap().is_none());

        let admin = app.superuser().await;
        let cookie = app.login(&admin).await;
        assert_eq!(app.get("/members/register", &cookie).await.status(), StatusCode::OK);
        let res = app.post("/members/register", &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/members/");

        let created = db::member_by_email(&app.db_conn, "new@gotmail.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.name, "New Member");
        assert!(!created.is_superuser);
        assert!(verify_password("newpass", &created.password_hash));
    }

    #[tokio::test]
    async fn registration_is_validated() {
        let app = TestApp::new().await;
        let admin = app.superuser().await;
        let cookie = app.login(&admin).await;

        let body = form(&[("name", ""), ("email", "not an email"), ("password", "")]);
        let res = app.post("/members/register", &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Name is required."));
        assert!(html.contains("Enter a valid email address."));
        assert!(html.contains("Password is required."));

        let body = form(&[
            ("name", "Copy"),
            ("email", "admin@gotmail.com"),
            ("password", "pw"),
        ]);
        let res = app.post("/members/register", &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("A member with this email already exists."));
        assert_eq!(db::list_members(&app.db_conn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn members_edit_themselves_only() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let other = app.member("Another Member", "another@gotmail.com").await;
        let cookie = app.login(&member).await;

        let res = app.get(&format!("/members/{}/edit", other.id), &cookie).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let body = form(&[
            ("name", "Renamed Member"),
            ("email", "sample_user@gotmail.com"),
            ("password", "newpass"),
            ("is_superuser", "on"),
        ]);
        let res = app.post(&format!("/members/{}/edit", member.id), &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), format!("/members/{}", member.id));

        let updated = db::get_member(&app.db_conn, member.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "Renamed Member");
        assert!(!updated.is_superuser);
        assert!(verify_password("newpass", &updated.password_hash));
    }

    #[tokio::test]
    async fn superusers_edit_anyone() {
        let app = TestApp::new().await;
        let admin = app.superuser().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&admin).await;

        let body = form(&[
            ("name", "Sample Member"),
            ("email", "admin@gotmail.com"),
        ]);
        let res = app.post(&format!("/members/{}/edit", member.id), &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("A member with this email already exists."));

        let body = form(&[
            ("name", "Sample Member"),
            ("email", "sample_user@gotmail.com"),
            ("is_superuser", "on"),
        ]);
        let res = app.post(&format!("/members/{}/edit", member.id), &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);

        let updated = db::get_member(&app.db_conn, member.id).await.unwrap().unwrap();
        assert!(updated.is_superuser);
        assert!(verify_password(PASSWORD, &updated.password_hash));
    }

    #[tokio::test]
    async fn superusers_delete_other_members() {
        let app = TestApp::new().await;
        let admin = app.superuser().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let project = app.project(&admin, &[member.id]).await;
        let bug = app.bug(&member, &project, "Reported Bug").await;

        let cookie = app.login(&member).await;
        let res = app.post(&format!("/members/{}/delete", admin.id), &cookie, "").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(db::get_member(&app.db_conn, admin.id).await.unwrap().is_some());

        let cookie = app.login(&admin).await;
        let res = app.post(&format!("/members/{}/delete", admin.id), &cookie, "").await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(db::get_member(&app.db_conn, admin.id).await.unwrap().is_some());

        let res = app.post(&format!("/members/{}/delete", member.id), &cookie, "").await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/members/");

        assert!(db::get_member(&app.db_conn, member.id).await.unwrap().is_none());
        assert!(db::get_bug(&app.db_conn, bug.id).await.unwrap().is_none());
        let project = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert!(!project.has_member(member.id));
    }
}
