use std::cmp::Reverse;

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use surrealdb::{
    engine::any::{self, Any},
    opt::auth::Root,
    Surreal,
};

use crate::models::{Bug, BugStatus, Member, Message, Project, ProjectStatus};

pub type DBConnection = Surreal<Any>;

pub const MEMBER: &str = "member";
pub const PROJECT: &str = "project";
pub const BUG: &str = "bug";
pub const MESSAGE: &str = "message";

/// Connect to `mem://` for a throwaway store or `ws://host:port` for a server
pub async fn connect(
    connection_string: &str,
    credentials: Option<(&str, &str)>,
    namespace: &str,
    database: &str,
) -> surrealdb::Result<DBConnection> {
    let db = any::connect(connection_string).await?;

    if let Some((username, password)) = credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(namespace).use_db(database).await?;

    info!("Successfully connected to database {connection_string}");

    Ok(db)
}

/// Initialize database
pub async fn migrate(db_conn: &DBConnection) -> Result<()> {
    db_conn
        .query("DEFINE INDEX member_email ON TABLE member COLUMNS email UNIQUE")
        .await?
        .check()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Sequence {
    counter: i64,
}

/// Allocate the next record id of `table`
async fn next_id(db_conn: &DBConnection, table: &str) -> Result<i64> {
    let mut res = db_conn
        .query("UPDATE type::thing('sequence', $table) SET counter = (counter OR 0) + 1")
        .bind(("table", table))
        .await?;
    let sequence: Option<Sequence> = res.take(0)?;
    sequence
        .map(|sequence| sequence.counter)
        .ok_or_else(|| anyhow!("sequence of table {table} was not updated"))
}

fn newest_first<T>(records: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<Utc>, i64)) {
    records.sort_by_key(|record| Reverse(key(record)));
}

// Members

pub async fn create_member(
    db_conn: &DBConnection,
    name: &str,
    email: &str,
    password_hash: String,
    is_superuser: bool,
) -> Result<Member> {
    let member = Member {
        id: next_id(db_conn, MEMBER).await?,
        name: name.to_owned(),
        email: email.to_owned(),
        password_hash,
        is_superuser,
        joined: Utc::now(),
    };

    let _: Option<Member> = db_conn
        .create((MEMBER, member.id))
        .content(&member)
        .await?;

    info!("created member {} <{}>", member.id, member.email);
    Ok(member)
}

pub async fn get_member(db_conn: &DBConnection, id: i64) -> Result<Option<Member>> {
    let member = db_conn.select((MEMBER, id)).await?;
    Ok(member)
}

pub async fn member_by_email(db_conn: &DBConnection, email: &str) -> Result<Option<Member>> {
    let mut res = db_conn
        .query("SELECT * FROM member WHERE email = $email")
        .bind(("email", email))
        .await?;
    let members: Vec<Member> = res.take(0)?;
    Ok(members.into_iter().next())
}

pub async fn superuser_exists(db_conn: &DBConnection) -> Result<bool> {
    let mut res = db_conn
        .query("SELECT * FROM member WHERE is_superuser = true LIMIT 1")
        .await?;
    let superusers: Vec<Member> = res.take(0)?;
    Ok(!superusers.is_empty())
}

/// All members ordered by name
pub async fn list_members(db_conn: &DBConnection) -> Result<Vec<Member>> {
    let mut members: Vec<Member> = db_conn.select(MEMBER).await?;
    members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(members)
}

/// Members among `ids`, ordered by name. Unknown ids are skipped.
pub async fn members_by_ids(db_conn: &DBConnection, ids: &[i64]) -> Result<Vec<Member>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let mut res = db_conn
        .query("SELECT * FROM member WHERE pk INSIDE $ids")
        .bind(("ids", ids.to_vec()))
        .await?;
    let mut members: Vec<Member> = res.take(0)?;
    members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(members)
}

pub async fn save_member(db_conn: &DBConnection, member: &Member) -> Result<()> {
    let _: Option<Member> = db_conn
        .update((MEMBER, member.id))
        .content(member)
        .await?;
    Ok(())
}

/// Remove a member with everything they authored, and take them off every roster
pub async fn delete_member(db_conn: &DBConnection, id: i64) -> Result<()> {
    let created_bugs: Vec<i64> = bugs_created_by(db_conn, id)
        .await?
        .iter()
        .map(|bug| bug.id)
        .collect();

    db_conn
        .query(
            "BEGIN TRANSACTION;
            UPDATE project SET members -= $member, supervisors -= $member WHERE members CONTAINS $member;
            UPDATE bug SET assigned_members -= $member WHERE assigned_members CONTAINS $member;
            DELETE message WHERE writer = $member OR bug INSIDE $bugs;
            DELETE bug WHERE creator = $member;
            DELETE member WHERE pk = $member;
            COMMIT TRANSACTION;",
        )
        .bind(("member", id))
        .bind(("bugs", created_bugs))
        .await?
        .check()?;

    info!("deleted member {id}");
    Ok(())
}

// Projects

pub async fn create_project(
    db_conn: &DBConnection,
    title: &str,
    description: &str,
    creator: i64,
    members: &[i64],
) -> Result<Project> {
    let id = next_id(db_conn, PROJECT).await?;
    let mut project = Project::new(id, title.to_owned(), description.to_owned(), creator, Utc::now());
    project.add_members(members);

    let _: Option<Project> = db_conn
        .create((PROJECT, project.id))
        .content(&project)
        .await?;

    info!("member {creator} created project {}", project.id);
    Ok(project)
}

pub async fn get_project(db_conn: &DBConnection, id: i64) -> Result<Option<Project>> {
    let project = db_conn.select((PROJECT, id)).await?;
    Ok(project)
}

/// Newest projects first, only the on-going ones unless `show_inactive` is set
pub async fn list_projects(db_conn: &DBConnection, show_inactive: bool) -> Result<Vec<Project>> {
    let mut projects: Vec<Project> = if show_inactive {
        db_conn.select(PROJECT).await?
    } else {
        let mut res = db_conn
            .query("SELECT * FROM project WHERE status INSIDE $statuses")
            .bind(("statuses", ProjectStatus::ACTIVE.to_vec()))
            .await?;
        res.take(0)?
    };
    newest_first(&mut projects, |project| (project.created, project.id));
    Ok(projects)
}

/// Projects having the member on their roster
pub async fn projects_of_member(db_conn: &DBConnection, member: i64) -> Result<Vec<Project>> {
    let mut res = db_conn
        .query("SELECT * FROM project WHERE members CONTAINS $member")
        .bind(("member", member))
        .await?;
    let mut projects: Vec<Project> = res.take(0)?;
    newest_first(&mut projects, |project| (project.created, project.id));
    Ok(projects)
}

pub async fn save_project(db_conn: &DBConnection, project: &Project) -> Result<()> {
    let _: Option<Project> = db_conn
        .update((PROJECT, project.id))
        .content(project)
        .await?;
    debug!("saved project {}", project.id);
    Ok(())
}

/// Save an edited project. Members taken off the roster are unassigned from the project's bugs
/// in the same transaction.
pub async fn save_project_roster(
    db_conn: &DBConnection,
    project: &Project,
    removed: &[i64],
) -> Result<()> {
    db_conn
        .query(
            "BEGIN TRANSACTION;
            UPDATE project SET title = $title, description = $description,
                members = $members, supervisors = $supervisors WHERE pk = $project;
            UPDATE bug SET assigned_members = array::complement(assigned_members, $removed)
                WHERE project = $project;
            COMMIT TRANSACTION;",
        )
        .bind(("project", project.id))
        .bind(("title", project.title.clone()))
        .bind(("description", project.description.clone()))
        .bind(("members", project.members.clone()))
        .bind(("supervisors", project.supervisors.clone()))
        .bind(("removed", removed.to_vec()))
        .await?
        .check()?;

    debug!("saved project {} without members {removed:?}", project.id);
    Ok(())
}

/// Remove a project together with its bugs and their messages
pub async fn delete_project(db_conn: &DBConnection, id: i64) -> Result<()> {
    let bugs: Vec<i64> = bugs_of_project(db_conn, id)
        .await?
        .iter()
        .map(|bug| bug.id)
        .collect();

    db_conn
        .query(
            "BEGIN TRANSACTION;
            DELETE message WHERE bug INSIDE $bugs;
            DELETE bug WHERE project = $project;
            DELETE project WHERE pk = $project;
            COMMIT TRANSACTION;",
        )
        .bind(("project", id))
        .bind(("bugs", bugs))
        .await?
        .check()?;

    info!("deleted project {id}");
    Ok(())
}

// Bugs

pub async fn create_bug(
    db_conn: &DBConnection,
    title: &str,
    description: &str,
    creator: i64,
    project: i64,
) -> Result<Bug> {
    let id = next_id(db_conn, BUG).await?;
    let bug = Bug::new(
        id,
        title.to_owned(),
        description.to_owned(),
        creator,
        project,
        Utc::now(),
    );

    let _: Option<Bug> = db_conn.create((BUG, bug.id)).content(&bug).await?;

    info!("member {creator} created bug {} in project {project}", bug.id);
    Ok(bug)
}

pub async fn get_bug(db_conn: &DBConnection, id: i64) -> Result<Option<Bug>> {
    let bug = db_conn.select((BUG, id)).await?;
    Ok(bug)
}

/// Newest bugs first, only the unresolved ones unless `show_inactive` is set
pub async fn list_bugs(db_conn: &DBConnection, show_inactive: bool) -> Result<Vec<Bug>> {
    let mut bugs: Vec<Bug> = if show_inactive {
        db_conn.select(BUG).await?
    } else {
        let mut res = db_conn
            .query("SELECT * FROM bug WHERE status INSIDE $statuses")
            .bind(("statuses", BugStatus::ACTIVE.to_vec()))
            .await?;
        res.take(0)?
    };
    newest_first(&mut bugs, |bug| (bug.created, bug.id));
    Ok(bugs)
}

pub async fn bugs_of_project(db_conn: &DBConnection, project: i64) -> Result<Vec<Bug>> {
    let mut res = db_conn
        .query("SELECT * FROM bug WHERE project = $project")
        .bind(("project", project))
        .await?;
    let mut bugs: Vec<Bug> = res.take(0)?;
    newest_first(&mut bugs, |bug| (bug.created, bug.id));
    Ok(bugs)
}

pub async fn bugs_assigned_to(db_conn: &DBConnection, member: i64) -> Result<Vec<Bug>> {
    let mut res = db_conn
        .query("SELECT * FROM bug WHERE assigned_members CONTAINS $member")
        .bind(("member", member))
        .await?;
    let mut bugs: Vec<Bug> = res.take(0)?;
    newest_first(&mut bugs, |bug| (bug.created, bug.id));
    Ok(bugs)
}

pub async fn bugs_created_by(db_conn: &DBConnection, member: i64) -> Result<Vec<Bug>> {
    let mut res = db_conn
        .query("SELECT * FROM bug WHERE creator = $member")
        .bind(("member", member))
        .await?;
    let bugs: Vec<Bug> = res.take(0)?;
    Ok(bugs)
}

pub async fn save_bug(db_conn: &DBConnection, bug: &Bug) -> Result<()> {
    let _: Option<Bug> = db_conn.update((BUG, bug.id)).content(bug).await?;
    debug!("saved bug {}", bug.id);
    Ok(())
}

/// Remove a bug and its message board
pub async fn delete_bug(db_conn: &DBConnection, id: i64) -> Result<()> {
    db_conn
        .query(
            "BEGIN TRANSACTION;
            DELETE message WHERE bug = $bug;
            DELETE bug WHERE pk = $bug;
            COMMIT TRANSACTION;",
        )
        .bind(("bug", id))
        .await?
        .check()?;

    info!("deleted bug {id}");
    Ok(())
}

// Messages

pub async fn create_message(
    db_conn: &DBConnection,
    writer: i64,
    bug: i64,
    content: &str,
) -> Result<Message> {
    let message = Message {
        id: next_id(db_conn, MESSAGE).await?,
        writer,
        bug,
        created: Utc::now(),
        content: content.to_owned(),
    };

    let _: Option<Message> = db_conn
        .create((MESSAGE, message.id))
        .content(&message)
        .await?;

    debug!("member {writer} posted message {} on bug {bug}", message.id);
    Ok(message)
}

/// Message board of a bug, newest first
pub async fn messages_of_bug(db_conn: &DBConnection, bug: i64) -> Result<Vec<Message>> {
    let mut res = db_conn
        .query("SELECT * FROM message WHERE bug = $bug")
        .bind(("bug", bug))
        .await?;
    let mut messages: Vec<Message> = res.take(0)?;
    newest_first(&mut messages, |message| (message.created, message.id));
    Ok(messages)
}

pub async fn messages_by_writer(db_conn: &DBConnection, writer: i64) -> Result<Vec<Message>> {
    let mut res = db_conn
        .query("SELECT * FROM message WHERE writer = $writer")
        .bind(("writer", writer))
        .await?;
    let mut messages: Vec<Message> = res.take(0)?;
    newest_first(&mut messages, |message| (message.created, message.id));
    Ok(messages)
}
