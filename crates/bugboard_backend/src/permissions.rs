//! Role checks over a requester and the resource they address
//!
//! Every predicate is true for superusers. Handlers load the resource first, so a missing
//! resource answers 404 before any of these run, then combine predicates as the endpoint needs.

use crate::{
    error::AppError,
    models::{Bug, Member, Project},
};

pub fn is_superuser(member: &Member) -> bool {
    member.is_superuser
}

/// Member of the project, or of the project owning the bug being looked at
pub fn in_project(member: &Member, project: &Project) -> bool {
    member.is_superuser || project.has_member(member.id)
}

pub fn is_supervisor(member: &Member, project: &Project) -> bool {
    member.is_superuser || project.has_supervisor(member.id)
}

pub fn is_supervisor_or_assigned(member: &Member, project: &Project, bug: &Bug) -> bool {
    is_supervisor(member, project) || bug.is_assigned(member.id)
}

pub fn is_creator(member: &Member, bug: &Bug) -> bool {
    member.is_superuser || bug.creator == member.id
}

/// The member addressed by the path is the requester
pub fn is_current_or_superuser(member: &Member, target: i64) -> bool {
    member.is_superuser || member.id == target
}

pub fn ensure(allowed: bool) -> Result<(), AppError> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
