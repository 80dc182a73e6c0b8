use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised by `set_status` when the value is outside the fixed set of statuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} status must be one of the following: {allowed}")]
pub struct InvalidStatus {
    kind: &'static str,
    allowed: String,
}

impl InvalidStatus {
    fn new(kind: &'static str, allowed: &[&str]) -> Self {
        let allowed = allowed
            .iter()
            .map(|status| format!("'{status}'"))
            .collect::<Vec<_>>()
            .join(", ");
        InvalidStatus { kind, allowed }
    }
}

/// Raised when a roster change would leave a supervisor or assignee outside the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("member {0} is not part of the project")]
    NotAMember(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[serde(rename = "ON-GOING")]
    OnGoing,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::OnGoing,
        ProjectStatus::Finished,
        ProjectStatus::Paused,
        ProjectStatus::Closed,
    ];
    /// Statuses shown by default in listings
    pub const ACTIVE: [ProjectStatus; 1] = [ProjectStatus::OnGoing];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::OnGoing => "ON-GOING",
            ProjectStatus::Finished => "FINISHED",
            ProjectStatus::Paused => "PAUSED",
            ProjectStatus::Closed => "CLOSED",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// Whether entering this status marks the project as closed
    pub fn is_final(self) -> bool {
        matches!(self, ProjectStatus::Finished | ProjectStatus::Closed)
    }

    /// Badge class used when rendering the status
    pub fn css_class(self) -> &'static str {
        match self {
            ProjectStatus::OnGoing => "badge-primary",
            ProjectStatus::Finished => "badge-success",
            ProjectStatus::Paused => "badge-warning",
            ProjectStatus::Closed => "badge-secondary",
        }
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::OnGoing
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus::new("Project", &Self::ALL.map(ProjectStatus::as_str)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BugStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "BEING WORKED")]
    BeingWorked,
    #[serde(rename = "FIXED")]
    Fixed,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl BugStatus {
    pub const ALL: [BugStatus; 4] = [
        BugStatus::Waiting,
        BugStatus::BeingWorked,
        BugStatus::Fixed,
        BugStatus::Closed,
    ];
    /// Unresolved statuses, shown by default in listings
    pub const ACTIVE: [BugStatus; 2] = [BugStatus::Waiting, BugStatus::BeingWorked];

    pub fn as_str(self) -> &'static str {
        match self {
            BugStatus::Waiting => "WAITING",
            BugStatus::BeingWorked => "BEING WORKED",
            BugStatus::Fixed => "FIXED",
            BugStatus::Closed => "CLOSED",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn css_class(self) -> &'static str {
        match self {
            BugStatus::Waiting => "badge-danger",
            BugStatus::BeingWorked => "badge-warning",
            BugStatus::Fixed => "badge-success",
            BugStatus::Closed => "badge-secondary",
        }
    }
}

impl Default for BugStatus {
    fn default() -> Self {
        BugStatus::Waiting
    }
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus::new("Bug", &Self::ALL.map(BugStatus::as_str)))
    }
}

/// Closing timestamp after a status change: every closing status records the time it was set,
/// reopening clears it
fn closing_stamp(closes: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    closes.then_some(now)
}

fn push_unique(ids: &mut Vec<i64>, id: i64) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "pk")]
    pub id: i64,
    pub name: String,
    /// Login identifier, unique across members
    pub email: String,
    /// scrypt hash in PHC string format
    pub password_hash: String,
    pub is_superuser: bool,
    pub joined: DateTime<Utc>,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .field("is_superuser", &self.is_superuser)
            .finish()
    }
}

impl Member {
    /// First word of the name, plus the second one when the first is very short ("Dr. Haha")
    pub fn short_name(&self) -> String {
        let mut words = self.name.split_whitespace();
        let Some(first) = words.next() else {
            return String::new();
        };

        match words.next() {
            Some(second) if first.chars().count() < 5 => format!("{first} {second}"),
            _ => first.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "pk")]
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created: DateTime<Utc>,
    pub closed: Option<DateTime<Utc>>,
    /// Ids of the members working on the project
    pub members: Vec<i64>,
    /// Ids of the members with elevated rights, always a subset of `members`
    pub supervisors: Vec<i64>,
}

impl Project {
    /// A fresh on-going project whose creator is both member and supervisor
    pub fn new(id: i64, title: String, description: String, creator: i64, now: DateTime<Utc>) -> Self {
        Project {
            id,
            title,
            description,
            status: ProjectStatus::default(),
            created: now,
            closed: None,
            members: vec![creator],
            supervisors: vec![creator],
        }
    }

    pub fn set_status(&mut self, status: &str) -> Result<(), InvalidStatus> {
        let status = status.parse()?;
        self.apply_status(status, Utc::now());
        Ok(())
    }

    pub fn apply_status(&mut self, status: ProjectStatus, now: DateTime<Utc>) {
        self.status = status;
        self.closed = closing_stamp(status.is_final(), now);
    }

    pub fn has_member(&self, member_id: i64) -> bool {
        self.members.contains(&member_id)
    }

    pub fn has_supervisor(&self, member_id: i64) -> bool {
        self.supervisors.contains(&member_id)
    }

    pub fn add_members(&mut self, member_ids: &[i64]) {
        for id in member_ids {
            push_unique(&mut self.members, *id);
        }
    }

    /// Promote members to supervisors. Nothing changes if any id is not on the roster.
    pub fn add_supervisors(&mut self, member_ids: &[i64]) -> Result<(), RosterError> {
        if let Some(outsider) = member_ids.iter().find(|id| !self.has_member(**id)) {
            return Err(RosterError::NotAMember(*outsider));
        }
        for id in member_ids {
            push_unique(&mut self.supervisors, *id);
        }
        Ok(())
    }

    /// Replace both rosters at once, returning the members taken off the project. Their bug
    /// assignments in this project must be dropped along with the roster change.
    pub fn set_roster(&mut self, members: &[i64], supervisors: &[i64]) -> Result<Vec<i64>, RosterError> {
        if let Some(outsider) = supervisors.iter().find(|id| !members.contains(id)) {
            return Err(RosterError::NotAMember(*outsider));
        }
        let removed = self
            .members
            .iter()
            .copied()
            .filter(|id| !members.contains(id))
            .collect();

        self.members.clear();
        self.add_members(members);
        self.supervisors.clear();
        for id in supervisors {
            push_unique(&mut self.supervisors, *id);
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    #[serde(rename = "pk")]
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: BugStatus,
    pub created: DateTime<Utc>,
    pub closed: Option<DateTime<Utc>>,
    pub creator: i64,
    pub project: i64,
    pub assigned_members: Vec<i64>,
}

impl Bug {
    pub fn new(
        id: i64,
        title: String,
        description: String,
        creator: i64,
        project: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Bug {
            id,
            title,
            description,
            status: BugStatus::default(),
            created: now,
            closed: None,
            creator,
            project,
            assigned_members: vec![],
        }
    }

    pub fn set_status(&mut self, status: &str) -> Result<(), InvalidStatus> {
        let status = status.parse()?;
        self.apply_status(status, Utc::now());
        Ok(())
    }

    pub fn apply_status(&mut self, status: BugStatus, now: DateTime<Utc>) {
        self.status = status;
        self.closed = closing_stamp(!status.is_active(), now);
    }

    pub fn is_assigned(&self, member_id: i64) -> bool {
        self.assigned_members.contains(&member_id)
    }

    /// Add assignees. Every id must belong to the project roster, otherwise nothing is assigned.
    pub fn assign(&mut self, project: &Project, member_ids: &[i64]) -> Result<(), RosterError> {
        if let Some(outsider) = member_ids.iter().find(|id| !project.has_member(**id)) {
            return Err(RosterError::NotAMember(*outsider));
        }
        for id in member_ids {
            push_unique(&mut self.assigned_members, *id);
        }
        Ok(())
    }

    pub fn set_assignees(&mut self, project: &Project, member_ids: &[i64]) -> Result<(), RosterError> {
        if let Some(outsider) = member_ids.iter().find(|id| !project.has_member(**id)) {
            return Err(RosterError::NotAMember(*outsider));
        }
        self.assigned_members.clear();
        for id in member_ids {
            push_unique(&mut self.assigned_members, *id);
        }
        Ok(())
    }
}

/// Longest preview of a message, ellipsis included
const PREVIEW_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "pk")]
    pub id: i64,
    pub writer: i64,
    pub bug: i64,
    pub created: DateTime<Utc>,
    pub content: String,
}

impl Message {
    /// "<short name> - <content>", cut down to a single line
    pub fn preview(&self, writer: &Member) -> String {
        let full = format!("{} - {}", writer.short_name(), self.content);
        if full.chars().count() <= PREVIEW_LEN {
            return full;
        }

        let cut: String = full.chars().take(PREVIEW_LEN - 3).collect();
        format!("{cut}...")
    }
}
