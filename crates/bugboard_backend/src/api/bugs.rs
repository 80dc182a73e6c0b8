use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{ensure_members_exist, load_bug, load_project, status_field, IdPath, ListQuery};
use crate::{
    db,
    error::{AppError, Result},
    forms::{member_choices, Choice, FormData},
    models::{Bug, BugStatus, Member, Project},
    permissions,
    session_auth::CurrentMember,
    templates::{self, status_options, BugRow, MemberRow, MessageRow, ProjectRow},
    utils, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bugs/", get(list))
        .route("/bugs/create", get(create_page).post(create))
        .route("/bugs/:id", get(detail))
        .route("/bugs/:id/edit", get(edit_page).post(edit))
        .route("/bugs/:id/edit_info", get(edit_info_page).post(edit_info))
        .route("/bugs/:id/assign_member", post(assign_member))
        .route("/bugs/:id/change_status", post(change_status))
        .route("/bugs/:id/change_working_status", post(change_working_status))
        .route("/bugs/:id/create_message", post(create_message))
        .route("/bugs/:id/delete", post(delete))
}

fn bug_url(bug: &Bug) -> String {
    format!("/bugs/{}", bug.id)
}

/// A bug together with the project owning it
async fn load_bug_in_project(state: &AppState, id: i64) -> Result<(Bug, Project)> {
    let bug = load_bug(state, id).await?;
    let project = load_project(state, bug.project).await?;
    Ok((bug, project))
}

async fn list(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Html<String>> {
    let show_inactive = query.show_inactive();
    let bugs = db::list_bugs(&state.db_conn, show_inactive).await?;

    let mut context = templates::page(&current);
    context.insert("show_inactive", &show_inactive);
    context.insert("bugs", &bugs.iter().map(BugRow::from).collect::<Vec<_>>());
    state.render("bugs/list.html", &context)
}

async fn detail(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let (bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::in_project(&current, &project))?;

    let assignees = db::members_by_ids(&state.db_conn, &bug.assigned_members).await?;
    let creator = db::get_member(&state.db_conn, bug.creator).await?;
    let messages = db::messages_of_bug(&state.db_conn, bug.id).await?;

    let mut writer_ids = messages.iter().map(|message| message.writer).collect::<Vec<_>>();
    writer_ids.sort_unstable();
    writer_ids.dedup();
    let writers: HashMap<i64, Member> = db::members_by_ids(&state.db_conn, &writer_ids)
        .await?
        .into_iter()
        .map(|member| (member.id, member))
        .collect();

    let is_supervisor = permissions::is_supervisor(&current, &project);

    let mut context = templates::page(&current);
    context.insert("bug", &BugRow::from(&bug));
    context.insert("project", &ProjectRow::from(&project));
    context.insert("creator", &creator.as_ref().map(MemberRow::from));
    context.insert(
        "assignees",
        &assignees.iter().map(MemberRow::from).collect::<Vec<_>>(),
    );
    context.insert(
        "messages",
        &messages
            .iter()
            .map(|message| MessageRow::new(message, writers.get(&message.writer)))
            .collect::<Vec<_>>(),
    );
    context.insert("is_supervisor", &is_supervisor);
    context.insert(
        "can_work",
        &permissions::is_supervisor_or_assigned(&current, &project, &bug),
    );
    context.insert("is_creator", &permissions::is_creator(&current, &bug));
    context.insert("is_working", &(bug.status == BugStatus::BeingWorked));

    if is_supervisor {
        let roster = db::members_by_ids(&state.db_conn, &project.members).await?;
        context.insert(
            "assign_candidates",
            &member_choices(
                roster.iter().filter(|member| !bug.is_assigned(member.id)),
                &[],
            ),
        );
        context.insert(
            "statuses",
            &status_options(&BugStatus::ALL.map(BugStatus::as_str), bug.status.as_str()),
        );
    }

    state.render("bugs/detail.html", &context)
}

/// Values and wording of the bug forms
#[derive(Debug, Serialize)]
struct BugFormView {
    heading: &'static str,
    action: String,
    title: String,
    description: String,
}

/// Extra selects of the bug form: the project on creation, the assignees on a full edit
#[derive(Debug, Default, Serialize)]
struct BugFormChoices {
    projects: Option<Vec<ProjectChoice>>,
    assignees: Option<Vec<Choice>>,
}

#[derive(Debug, Serialize)]
struct ProjectChoice {
    pk: i64,
    title: String,
    selected: bool,
}

fn render_bug_form(
    state: &AppState,
    current: &Member,
    form: &BugFormView,
    choices: &BugFormChoices,
    errors: &[String],
) -> Result<Html<String>> {
    let mut context = templates::page(current);
    context.insert("form", form);
    context.insert("choices", choices);
    context.insert("errors", errors);
    state.render("bugs/form.html", &context)
}

#[derive(Debug, Deserialize)]
struct CreateQuery {
    project: Option<String>,
}

/// Projects the member may file bugs in
async fn project_choices(state: &AppState, current: &Member, selected: Option<i64>) -> Result<Vec<ProjectChoice>> {
    let projects = if current.is_superuser {
        db::list_projects(&state.db_conn, true).await?
    } else {
        db::projects_of_member(&state.db_conn, current.id).await?
    };

    Ok(projects
        .into_iter()
        .map(|project| ProjectChoice {
            pk: project.id,
            selected: selected == Some(project.id),
            title: project.title,
        })
        .collect())
}

fn create_form() -> BugFormView {
    BugFormView {
        heading: "Report a bug",
        action: String::from("/bugs/create"),
        title: String::new(),
        description: String::new(),
    }
}

async fn create_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
) -> Result<Html<String>> {
    let selected = query.project.and_then(|project| project.trim().parse().ok());
    let choices = BugFormChoices {
        projects: Some(project_choices(&state, &current, selected).await?),
        ..Default::default()
    };
    render_bug_form(&state, &current, &create_form(), &choices, &[])
}

async fn create(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let form = FormData::parse(&body)?;
    let title = form.text("title");
    let description = form.text("description");
    let project_field = form.text("project");

    let mut errors = vec![];
    if title.is_empty() {
        errors.push(String::from("Title is required."));
    }
    let project = if project_field.is_empty() {
        errors.push(String::from("Project is required."));
        None
    } else {
        match project_field.parse::<i64>() {
            Ok(id) => {
                let project = db::get_project(&state.db_conn, id).await?;
                if project.is_none() {
                    errors.push(String::from("Select a valid project."));
                }
                project
            },
            Err(_) => {
                errors.push(String::from("Select a valid project."));
                None
            },
        }
    };

    if let Some(project) = &project {
        if !permissions::in_project(&current, project) {
            warn!(
                "member {} tried to report a bug in project {}",
                current.id, project.id
            );
            return Err(AppError::Forbidden);
        }
    }

    let project = match project {
        Some(project) if errors.is_empty() => project,
        project => {
            let view = BugFormView {
                title,
                description,
                ..create_form()
            };
            let choices = BugFormChoices {
                projects: Some(
                    project_choices(&state, &current, project.map(|project| project.id)).await?,
                ),
                ..Default::default()
            };
            return render_bug_form(&state, &current, &view, &choices, &errors)
                .map(IntoResponse::into_response);
        },
    };

    let bug = db::create_bug(&state.db_conn, &title, &description, current.id, project.id).await?;

    Ok(utils::redirect(&bug_url(&bug)))
}

fn edit_form(bug: &Bug) -> BugFormView {
    BugFormView {
        heading: "Edit bug",
        action: format!("/bugs/{}/edit", bug.id),
        title: bug.title.clone(),
        description: bug.description.clone(),
    }
}

async fn assignee_choices(state: &AppState, project: &Project, selected: &[i64]) -> Result<BugFormChoices> {
    let roster = db::members_by_ids(&state.db_conn, &project.members).await?;
    Ok(BugFormChoices {
        assignees: Some(member_choices(&roster, selected)),
        ..Default::default()
    })
}

async fn edit_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let (bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;

    let choices = assignee_choices(&state, &project, &bug.assigned_members).await?;
    render_bug_form(&state, &current, &edit_form(&bug), &choices, &[])
}

async fn edit(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let (mut bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let title = form.text("title");
    let description = form.text("description");
    let member_ids = form.ids("member_ids")?;

    let mut errors = vec![];
    if title.is_empty() {
        errors.push(String::from("Title is required."));
    }
    if let Some(outsider) = member_ids.iter().find(|id| !project.has_member(**id)) {
        errors.push(format!("Member {outsider} is not part of the project."));
    }
    if !errors.is_empty() {
        let view = BugFormView {
            title,
            description,
            ..edit_form(&bug)
        };
        let choices = assignee_choices(&state, &project, &member_ids).await?;
        return render_bug_form(&state, &current, &view, &choices, &errors)
            .map(IntoResponse::into_response);
    }

    bug.set_assignees(&project, &member_ids)?;
    bug.title = title;
    bug.description = description;
    db::save_bug(&state.db_conn, &bug).await?;
    info!("member {} edited bug {}", current.id, bug.id);

    Ok(utils::redirect(&bug_url(&bug)))
}

fn edit_info_form(bug: &Bug) -> BugFormView {
    BugFormView {
        heading: "Edit bug report",
        action: format!("/bugs/{}/edit_info", bug.id),
        title: bug.title.clone(),
        description: bug.description.clone(),
    }
}

async fn edit_info_page(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Html<String>> {
    let bug = load_bug(&state, id).await?;
    permissions::ensure(permissions::is_creator(&current, &bug))?;

    render_bug_form(
        &state,
        &current,
        &edit_info_form(&bug),
        &BugFormChoices::default(),
        &[],
    )
}

async fn edit_info(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let mut bug = load_bug(&state, id).await?;
    permissions::ensure(permissions::is_creator(&current, &bug))?;
    let form = FormData::parse(&body)?;

    let title = form.text("title");
    let description = form.text("description");
    if title.is_empty() {
        let view = BugFormView {
            title,
            description,
            ..edit_info_form(&bug)
        };
        let errors = [String::from("Title is required.")];
        return render_bug_form(&state, &current, &view, &BugFormChoices::default(), &errors)
            .map(IntoResponse::into_response);
    }

    bug.title = title;
    bug.description = description;
    db::save_bug(&state.db_conn, &bug).await?;
    info!("member {} edited the report of bug {}", current.id, bug.id);

    Ok(utils::redirect(&bug_url(&bug)))
}

async fn assign_member(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let (mut bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let ids = form.ids("member_ids")?;
    if ids.is_empty() {
        return Err(AppError::bad_request("No members selected"));
    }
    ensure_members_exist(&state, &ids).await?;

    bug.assign(&project, &ids)?;
    db::save_bug(&state.db_conn, &bug).await?;
    info!("member {} assigned {ids:?} to bug {}", current.id, bug.id);

    Ok(utils::redirect(&bug_url(&bug)))
}

async fn change_status(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let (mut bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;
    let form = FormData::parse(&body)?;

    let status = status_field(&form)?;
    if let Err(err) = bug.set_status(status) {
        warn!("rejected status {status:?} for bug {}", bug.id);
        return Err(err.into());
    }
    db::save_bug(&state.db_conn, &bug).await?;
    info!("member {} moved bug {} to {}", current.id, bug.id, bug.status);

    Ok(utils::redirect(&bug_url(&bug)))
}

/// `starting` of a working status change: whether work on the bug starts or stops
fn parse_starting(value: Option<&str>) -> Result<bool> {
    match value.map(str::trim) {
        Some("1" | "true") => Ok(true),
        Some("0" | "false") => Ok(false),
        _ => Err(AppError::bad_request("starting must be one of 1, true, 0, false")),
    }
}

async fn change_working_status(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let (mut bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor_or_assigned(&current, &project, &bug))?;
    let form = FormData::parse(&body)?;

    let status = if parse_starting(form.get("starting"))? {
        BugStatus::BeingWorked
    } else {
        BugStatus::Waiting
    };
    bug.apply_status(status, chrono::Utc::now());
    db::save_bug(&state.db_conn, &bug).await?;
    info!("member {} moved bug {} to {}", current.id, bug.id, bug.status);

    Ok(utils::redirect(&bug_url(&bug)))
}

async fn create_message(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    body: Bytes,
) -> Result<Response> {
    let (bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::in_project(&current, &project))?;
    let form = FormData::parse(&body)?;

    let content = form.text("content");
    if content.is_empty() {
        debug!("empty message for bug {} refused", bug.id);
        return Err(AppError::bad_request("Message can't be empty"));
    }
    db::create_message(&state.db_conn, current.id, bug.id, &content).await?;

    Ok(utils::redirect(&bug_url(&bug)))
}

async fn delete(
    CurrentMember(current): CurrentMember,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response> {
    let (bug, project) = load_bug_in_project(&state, id).await?;
    permissions::ensure(permissions::is_supervisor(&current, &project))?;

    db::delete_bug(&state.db_conn, bug.id).await?;
    info!("member {} deleted bug {}", current.id, bug.id);

    Ok(utils::redirect("/bugs/"))
}
