use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::Serialize;

use super::{
    ensure_members_exist, load_project, status_field, unknown_member, IdPath, ListQuery,
};
use crate::{
    db,
    error::{AppError, Result},
    forms::{member_choices, FormData},
    models::{Member, Project, ProjectStatus},
    permissions,
    session_auth::CurrentMember,
    templates::{self, status_options, BugRow, MemberRow, ProjectRow},
    utils, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/", get(list))
        .route("/projects/create", get(create_page).post(create))
        .route("/projects/:id", get(detail))
        .route("/projects/:id/edit", get(edit_page).post(edit))
        .route("/projects/:id/add_member", post(add_member))
        .route("/projects/:id/add_supervisor", post(add_supervisor))
        .route("/projects/:id/change_status", post(change_status))
        .route("/projects/:id/delete", post(delete))
}

async fn list(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Html<String>> {
    let show_inactive = query.show_inactive();
    let projects = db::list_projects(&state.db_conn, show_inactive).await?;

    let mut context = templates::page(&current);
    context.insert("show_inactive", &show_inactive);
    context.insert(
        "projects",
        &projects.iter().map(ProjectRow::from).collect::<Vec<_>>(),
    );
    state.render("projects/list.html", &context)
}

async fn detail(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let project = load_project(&state, id).await?;
    permissions::ensure(permissions::in_project(&current, &project))?;

    let roster = db::members_by_ids(&state.db_conn, &project.members).await?;
    let bugs = db::bugs_of_project(&state.db_conn, project.id).await?;
    let (my_bugs, other_bugs): (Vec<_>, Vec<_>) = bugs
        .iter()
        .filter(|bug| bug.status.is_active())
        .partition(|bug| bug.is_assigned(current.id));
    let is_supervisor = permissions::is_supervisor(&current, &project);

    let mut context = templates::page(&current);
    context.insert("project", &ProjectRow::from(&project));
    context.insert(
        "members",
        &roster.iter().map(MemberRow::from).collect::<Vec<_>>(),
    );
    context.insert(
        "supervisors",
        &roster
            .iter()
            .filter(|member| project.has_supervisor(member.id))
            .map(MemberRow::from)
            .collect::<Vec<_>>(),
    );
    context.insert(
        "my_bugs",
        &my_bugs.into_iter().map(BugRow::from).collect::<Vec<_>>(),
    );
    context.insert(
        "other_bugs",
        &other_bugs.into_iter().map(BugRow::from).collect::<Vec<_>>(),
    );
    context.insert("is_supervisor", &is_supervisor);

    if is_supervisor {
        let everyone = db::list_members(&state.db_conn).await?;
        context.insert(
            "member_candidates",
            &member_choices(
                everyone.iter().filter(|member| !project.has_member(member.id)),
                &[],
            ),
        );
        context.insert(
            "supervisor_candidates",
            &member_choices(
                roster.iter().filter(|member| !project.has_supervisor(member.id)),
                &[],
            ),
        );
        context.insert(
            "statuses",
            &status_options(
                &ProjectStatus::ALL.map(ProjectStatus::as_str),
                project.status.as_str(),
            ),
        );
    }

    state.render("projects/detail.html", &context)
}

/// Values and wording of the project form, shared by creation and editing
#[derive(Debug, Serialize)]
struct ProjectFormView {
    heading: &'static str,
    action: String,
    title: String,
    description: String,
    /// Supervisors are only picked when editing
    editing: bool,
}

struct ProjectInput {
    title: String,
    description: String,
    member_ids: Vec<i64>,
    supervisor_ids: Vec<i64>,
}

impl ProjectInput {
    fn parse(form: &FormData) -> Result<Self> {
        Ok(ProjectInput {
            title: form.text("title"),
            description: form.text("description"),
            member_ids: form.ids("member_ids")?,
            supervisor_ids: form.ids("supervisor_ids")?,
        })
    }
}

async fn render_project_form(
    state: &AppState,
    current: &Member,
    form: &ProjectFormView,
    input: &ProjectInput,
    supervisor_options: &[Member],
    errors: &[String],
) -> Result<Html<String>> {
    let everyone = db::list_members(&state.db_conn).await?;

    let mut context = templates::page(current);
    context.insert("form", form);
    context.insert("members", &member_choices(&everyone, &input.member_ids));
    context.insert(
        "supervisors",
        &member_choices(supervisor_options, &input.supervisor_ids),
    );
    context.insert("errors", errors);
    state.render("projects/form.html", &context)
}

fn create_form() -> ProjectFormView {
    ProjectFormView {
        heading: "New project",
        action: String::from("/projects/create"),
        title: String::new(),
        description: String::new(),
        editing: false,
    }
}

async fn create_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
) -> Result<Html<String>> {
    let input = ProjectInput {
        title: String::new(),
        description: String::new(),
        member_ids: vec![],
        supervisor_ids: vec![],
    };
    render_project_form(&state, &current, &create_form(), &input, &[], &[]).await
}

async fn create(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let form = FormData::parse(&body)?;
    let input = ProjectInput::parse(&form)?;

    let mut errors = vec![];
    if input.title.is_empty() {
        errors.push(String::from("Title is required."));
    }
    if let Some(id) = unknown_member(&state, &input.member_ids).await? {
        errors.push(format!("Member {id} does not exist."));
    }
    if !errors.is_empty() {
        let view = ProjectFormView {
            title: input.title.clone(),
            description: input.description.clone(),
            ..create_form()
        };
        return render_project_form(&state, &current, &view, &input, &[], &errors)
            .await
            .map(IntoResponse::into_response);
    }

    let project = db::create_project(
        &state.db_conn,
        &input.title,
        &input.description,
        current.id,
        &input.member_ids,
    )
    .await?;

    Ok(utils::redirect(&format!("/projects/{}", project.id)))
}

fn edit_form(project: &Project) -> ProjectFormView {
    ProjectFormView {
        heading: "Edit project",
        action: format!("/projects/{}/edit", project.id),
        title: project.title.clone(),
        description: project.description.clone(),
        editing: true,
    }
}

async fn edit_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;

    let roster = db::members_by_ids(&state.db_conn, &project.members).await?;
    let input = ProjectInput {
        title: project.title.clone(),
        description: project.description.clone(),
        member_ids: project.members.clone(),
        supervisor_ids: project.supervisors.clone(),
    };
    render_project_form(&state, &current, &edit_form(&project), &input, &roster, &[]).await
}

async fn edit(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;
    let input = ProjectInput::parse(&form)?;

    let mut errors = vec![];
    if input.title.is_empty() {
        errors.push(String::from("Title is required."));
    }
    if input.member_ids.is_empty() {
        errors.push(String::from("Select at least one member."));
    } else if let Some(id) = unknown_member(&state, &input.member_ids).await? {
        errors.push(format!("Member {id} does not exist."));
    }
    if input.supervisor_ids.is_empty() {
        errors.push(String::from("Select at least one supervisor."));
    } else if input
        .supervisor_ids
        .iter()
        .any(|id| !input.member_ids.contains(id))
    {
        errors.push(String::from("Supervisors must be members of the project."));
    }
    if !errors.is_empty() {
        let roster = db::members_by_ids(&state.db_conn, &project.members).await?;
        let view = ProjectFormView {
            title: input.title.clone(),
            description: input.description.clone(),
            ..edit_form(&project)
        };
        return render_project_form(&state, &current, &view, &input, &roster, &errors)
            .await
            .map(IntoResponse::into_response);
    }

    let removed = project.set_roster(&input.member_ids, &input.supervisor_ids)?;
    project.title = input.title;
    project.description = input.description;
    db::save_project_roster(&state.db_conn, &project, &removed).await?;
    info!("member {} edited project {}", current.id, project.id);

    Ok(utils::redirect(&format!("/projects/{}", project.id)))
}

async fn add_member(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let ids = form.ids("member_ids")?;
    if ids.is_empty() {
        return Err(AppError::bad_request("No members selected"));
    }
    ensure_members_exist(&state, &ids).await?;

    project.add_members(&ids);
    db::save_project(&state.db_conn, &project).await?;
    info!("member {} added {ids:?} to project {}", current.id, project.id);

    Ok(utils::redirect(&format!("/projects/{}", project.id)))
}

async fn add_supervisor(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let ids = form.ids("supervisor_ids")?;
    if ids.is_empty() {
        return Err(AppError::bad_request("No members selected"));
    }
    ensure_members_exist(&state, &ids).await?;

    project.add_supervisors(&ids)?;
    db::save_project(&state.db_conn, &project).await?;
    info!(
        "member {} made {ids:?} supervisors of project {}",
        current.id, project.id
    );

    Ok(utils::redirect(&format!("/projects/{}", project.id)))
}

async fn change_status(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let status = status_field(&form)?;
    if let Err(err) = project.set_status(status) {
        warn!("rejected status {status:?} for project {}", project.id);
        return Err(err.into());
    }
    db::save_project(&state.db_conn, &project).await?;
    info!(
        "member {} moved project {} to {}",
        current.id, project.id, project.status
    );

    Ok(utils::redirect(&format!("/projects/{}", project.id)))
}

async fn delete(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response> {
    let project = load_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;

    db::delete_project(&state.db_conn, project.id).await?;
    info!("member {} deleted project {}", current.id, project.id);

    Ok(utils::redirect("/projects/"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;

    use super::super::test_utils::*;
    use crate::{
        db,
        models::{BugStatus, ProjectStatus},
    };

    fn form(fields: &[(&str, &str)]) -> String {
        serde_urlencoded::to_string(fields).unwrap()
    }

    #[tokio::test]
    async fn creator_joins_the_new_project() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let other = app.member("Another Member", "another@gotmail.com").await;
        let cookie = app.login(&member).await;

        assert_eq!(app.get("/projects/create", &cookie).await.status(), StatusCode::OK);

        let other_id = other.id.to_string();
        let body = form(&[
            ("title", "New Project"),
            ("description", "Fresh"),
            ("member_ids", other_id.as_str()),
        ]);
        let res = app.post("/projects/create", &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);

        let projects = db::list_projects(&app.db_conn, true).await.unwrap();
        assert_eq!(projects.len(), 1);
        let project = &projects[0];
        assert_eq!(location(&res), format!("/projects/{}", project.id));
        assert_eq!(project.title, "New Project");
        assert_eq!(project.status, ProjectStatus::OnGoing);
        assert!(project.has_member(member.id));
        assert!(project.has_member(other.id));
        assert!(project.has_supervisor(member.id));
        assert!(!project.has_supervisor(other.id));
        assert!(Utc::now() - project.created < chrono::Duration::minutes(1));
    }

    #[tokio::test]
    async fn create_requires_a_title() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&member).await;

        let res = app.post("/projects/create", &cookie, &form(&[("title", "  ")])).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("Title is required."));
        assert!(db::list_projects(&app.db_conn, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_hides_inactive_projects_by_default() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&member).await;
        db::create_project(&app.db_conn, "Running Project", "", member.id, &[])
            .await
            .unwrap();
        let mut paused = db::create_project(&app.db_conn, "Paused Project", "", member.id, &[])
            .await
            .unwrap();
        paused.set_status("PAUSED").unwrap();
        db::save_project(&app.db_conn, &paused).await.unwrap();

        let html = body_text(app.get("/projects/", &cookie).await).await;
        assert!(html.contains("Running Project"));
        assert!(!html.contains("Paused Project"));

        let html = body_text(app.get("/projects/?show_inactive=1", &cookie).await).await;
        assert!(html.contains("Running Project"));
        assert!(html.contains("Paused Project"));
        assert!(html.find("Paused Project").unwrap() < html.find("Running Project").unwrap());
    }

    #[tokio::test]
    async fn list_says_when_empty() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let cookie = app.login(&member).await;

        let html = body_text(app.get("/projects/", &cookie).await).await;
        assert!(html.contains("No projects found"));
    }

    #[tokio::test]
    async fn detail_is_for_project_members() {
        let app = TestApp::new().await;
        let member = app.member("Sample Member", "sample_user@gotmail.com").await;
        let outsider = app.member("Outsider", "outsider@gotmail.com").await;
        let project = app.project(&member, &[]).await;
        app.bug(&member, &project, "Visible Bug").await;
        let uri = format!("/projects/{}", project.id);

        let cookie = app.login(&member).await;
        let res = app.get(&uri, &cookie).await;
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Sample Project"));
        assert!(html.contains("Visible Bug"));
        assert!(html.contains("add_member"));

        let cookie = app.login(&outsider).await;
        assert_eq!(app.get(&uri, &cookie).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn supervisors_add_members_atomically() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let newcomer = app.member("Newcomer", "newcomer@gotmail.com").await;
        let project = app.project(&supervisor, &[]).await;
        let cookie = app.login(&supervisor).await;
        let uri = format!("/projects/{}/add_member", project.id);
        let newcomer_id = newcomer.id.to_string();

        for body in [
            String::new(),
            form(&[("member_ids", "abc")]),
            form(&[("member_ids", newcomer_id.as_str()), ("member_ids", "999")]),
        ] {
            let res = app.post(&uri, &cookie, &body).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert!(!stored.has_member(newcomer.id));

        let res = app.post(&uri, &cookie, &form(&[("member_ids", newcomer_id.as_str())])).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), format!("/projects/{}", project.id));
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert!(stored.has_member(newcomer.id));
    }

    #[tokio::test]
    async fn plain_members_cant_manage_the_project() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let member = app.member("Plain Member", "plain@gotmail.com").await;
        let project = app.project(&supervisor, &[member.id]).await;
        let cookie = app.login(&member).await;
        let member_id = member.id.to_string();

        let cases = [
            ("add_member", form(&[("member_ids", member_id.as_str())])),
            ("add_supervisor", form(&[("supervisor_ids", member_id.as_str())])),
            ("change_status", form(&[("status", "CLOSED")])),
            ("edit", form(&[("title", "Hijacked")])),
            ("delete", String::new()),
        ];
        for (action, body) in cases {
            let res = app
                .post(&format!("/projects/{}/{action}", project.id), &cookie, &body)
                .await;
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{action}");
        }
        // refused before the payload is looked at
        let res = app
            .post(&format!("/projects/{}/change_status", project.id), &cookie, "%%%")
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app.get(&format!("/projects/{}/edit", project.id), &cookie).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert_eq!(stored.title, project.title);
        assert_eq!(stored.status, ProjectStatus::OnGoing);
        assert_eq!(stored.supervisors, vec![supervisor.id]);
    }

    #[tokio::test]
    async fn supervisors_come_from_the_roster() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let member = app.member("Plain Member", "plain@gotmail.com").await;
        let outsider = app.member("Outsider", "outsider@gotmail.com").await;
        let project = app.project(&supervisor, &[member.id]).await;
        let cookie = app.login(&supervisor).await;
        let uri = format!("/projects/{}/add_supervisor", project.id);
        let member_id = member.id.to_string();
        let outsider_id = outsider.id.to_string();

        let body = form(&[
            ("supervisor_ids", member_id.as_str()),
            ("supervisor_ids", outsider_id.as_str()),
        ]);
        assert_eq!(app.post(&uri, &cookie, &body).await.status(), StatusCode::BAD_REQUEST);
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert!(!stored.has_supervisor(member.id));

        let body = form(&[("supervisor_ids", member_id.as_str())]);
        assert_eq!(app.post(&uri, &cookie, &body).await.status(), StatusCode::FOUND);
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert!(stored.has_supervisor(member.id));
    }

    #[tokio::test]
    async fn change_status_validates_the_value() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let project = app.project(&supervisor, &[]).await;
        let cookie = app.login(&supervisor).await;
        let uri = format!("/projects/{}/change_status", project.id);

        for body in ["", "status=", "status=DONE", "status=on-going"] {
            let res = app.post(&uri, &cookie, body).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::OnGoing);

        let res = app.post(&uri, &cookie, "status=FINISHED").await;
        assert_eq!(res.status(), StatusCode::FOUND);
        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Finished);
        assert_eq!(stored.closed.unwrap().date_naive(), Utc::now().date_naive());
    }

    #[tokio::test]
    async fn edit_replaces_the_roster() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let member = app.member("Plain Member", "plain@gotmail.com").await;
        let project = app.project(&supervisor, &[member.id]).await;
        let cookie = app.login(&supervisor).await;
        let uri = format!("/projects/{}/edit", project.id);
        let supervisor_id = supervisor.id.to_string();
        let member_id = member.id.to_string();

        assert_eq!(app.get(&uri, &cookie).await.status(), StatusCode::OK);

        let body = form(&[
            ("title", "Renamed"),
            ("member_ids", supervisor_id.as_str()),
            ("supervisor_ids", member_id.as_str()),
        ]);
        let res = app.post(&uri, &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("Supervisors must be members of the project."));

        let body = form(&[("title", "Renamed")]);
        let html = body_text(app.post(&uri, &cookie, &body).await).await;
        assert!(html.contains("Select at least one member."));
        assert!(html.contains("Select at least one supervisor."));

        let body = form(&[
            ("title", "Renamed"),
            ("description", "New description"),
            ("member_ids", member_id.as_str()),
            ("member_ids", supervisor_id.as_str()),
            ("supervisor_ids", member_id.as_str()),
        ]);
        let res = app.post(&uri, &cookie, &body).await;
        assert_eq!(res.status(), StatusCode::FOUND);

        let stored = db::get_project(&app.db_conn, project.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.description, "New description");
        assert!(stored.has_member(supervisor.id));
        assert!(stored.has_supervisor(member.id));
        assert!(!stored.has_supervisor(supervisor.id));
    }

    #[tokio::test]
    async fn members_dropped_from_the_roster_lose_their_assignments() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let member = app.member("Plain Member", "plain@gotmail.com").await;
        let project = app.project(&supervisor, &[member.id]).await;
        let mut bug = app.bug(&supervisor, &project, "Assigned Bug").await;
        bug.assign(&project, &[member.id]).unwrap();
        db::save_bug(&app.db_conn, &bug).await.unwrap();

        let cookie = app.login(&supervisor).await;
        let supervisor_id = supervisor.id.to_string();
        let body = form(&[
            ("title", "Sample Project"),
            ("member_ids", supervisor_id.as_str()),
            ("supervisor_ids", supervisor_id.as_str()),
        ]);
        let res = app
            .post(&format!("/projects/{}/edit", project.id), &cookie, &body)
            .await;
        assert_eq!(res.status(), StatusCode::FOUND);

        let stored = db::get_bug(&app.db_conn, bug.id).await.unwrap().unwrap();
        assert!(stored.assigned_members.is_empty());

        let cookie = app.login(&member).await;
        let res = app
            .post(&format!("/bugs/{}/change_working_status", bug.id), &cookie, "starting=1")
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let stored = db::get_bug(&app.db_conn, bug.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BugStatus::Waiting);
    }

    #[tokio::test]
    async fn delete_removes_the_project_and_its_bugs() {
        let app = TestApp::new().await;
        let supervisor = app.member("Sample Member", "sample_user@gotmail.com").await;
        let project = app.project(&supervisor, &[]).await;
        let bug = app.bug(&supervisor, &project, "Doomed Bug").await;
        let cookie = app.login(&supervisor).await;

        let res = app
            .post(&format!("/projects/{}/delete", project.id), &cookie, "")
            .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/projects/");
        assert!(db::get_project(&app.db_conn, project.id).await.unwrap().is_none());
        assert!(db::get_bug(&app.db_conn, bug.id).await.unwrap().is_none());
    }
}
