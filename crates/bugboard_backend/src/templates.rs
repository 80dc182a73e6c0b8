use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};

use crate::models::{Bug, Member, Message, Project};

/// Pages compiled into the binary, keyed by the name handlers render them with
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("members/list.html", include_str!("../templates/members/list.html")),
    ("members/profile.html", include_str!("../templates/members/profile.html")),
    ("members/form.html", include_str!("../templates/members/form.html")),
    ("projects/list.html", include_str!("../templates/projects/list.html")),
    ("projects/detail.html", include_str!("../templates/projects/detail.html")),
    ("projects/form.html", include_str!("../templates/projects/form.html")),
    ("bugs/list.html", include_str!("../templates/bugs/list.html")),
    ("bugs/detail.html", include_str!("../templates/bugs/detail.html")),
    ("bugs/form.html", include_str!("../templates/bugs/form.html")),
];

pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    Ok(tera)
}

/// Context every authenticated page starts from, carrying the member for the navigation bar
pub fn page(current: &Member) -> Context {
    let mut context = Context::new();
    context.insert("current", &MemberRow::from(current));
    context
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

/// A member as pages show it, without the password hash
#[derive(Debug, Serialize)]
pub struct MemberRow {
    pub pk: i64,
    pub name: String,
    pub short_name: String,
    pub email: String,
    pub is_superuser: bool,
    pub joined: String,
}

impl From<&Member> for MemberRow {
    fn from(member: &Member) -> Self {
        MemberRow {
            pk: member.id,
            name: member.name.clone(),
            short_name: member.short_name(),
            email: member.email.clone(),
            is_superuser: member.is_superuser,
            joined: format_date(&member.joined),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectRow {
    pub pk: i64,
    pub title: String,
    pub description: String,
    pub status: &'static str,
    pub status_class: &'static str,
    pub created: String,
    pub closed: Option<String>,
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        ProjectRow {
            pk: project.id,
            title: project.title.clone(),
            description: project.description.clone(),
            status: project.status.as_str(),
            status_class: project.status.css_class(),
            created: format_date(&project.created),
            closed: project.closed.as_ref().map(format_date),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BugRow {
    pub pk: i64,
    pub title: String,
    pub description: String,
    pub status: &'static str,
    pub status_class: &'static str,
    pub created: String,
    pub closed: Option<String>,
    pub project: i64,
}

impl From<&Bug> for BugRow {
    fn from(bug: &Bug) -> Self {
        BugRow {
            pk: bug.id,
            title: bug.title.clone(),
            description: bug.description.clone(),
            status: bug.status.as_str(),
            status_class: bug.status.css_class(),
            created: format_date(&bug.created),
            closed: bug.closed.as_ref().map(format_date),
            project: bug.project,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub pk: i64,
    pub bug: i64,
    pub writer: Option<MemberRow>,
    pub created: String,
    pub content: String,
    pub preview: String,
}

impl MessageRow {
    /// `writer` is `None` when the writer can't be resolved any more
    pub fn new(message: &Message, writer: Option<&Member>) -> Self {
        MessageRow {
            pk: message.id,
            bug: message.bug,
            writer: writer.map(MemberRow::from),
            created: format_date(&message.created),
            content: message.content.clone(),
            preview: writer
                .map(|writer| message.preview(writer))
                .unwrap_or_else(|| message.content.clone()),
        }
    }
}

/// An entry of a status select box
#[derive(Debug, Serialize)]
pub struct StatusOption {
    pub value: &'static str,
    pub selected: bool,
}

pub fn status_options(values: &[&'static str], current: &str) -> Vec<StatusOption> {
    values
        .iter()
        .map(|&value| StatusOption {
            value,
            selected: value == current,
        })
        .collect()
}
