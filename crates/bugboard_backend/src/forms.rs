//! Parsing of urlencoded form bodies
//!
//! Bodies are taken as raw bytes and decoded only once the permission checks of a handler have
//! passed, so an unauthorized request is refused before its payload is looked at.

use serde::Serialize;

use crate::{error::AppError, models::Member};

/// Decoded form body keeping repeated keys, like a multi-select sends them
#[derive(Debug, Default)]
pub struct FormData(Vec<(String, String)>);

impl FormData {
    pub fn parse(body: &[u8]) -> Result<FormData, AppError> {
        serde_urlencoded::from_bytes(body)
            .map(FormData)
            .map_err(|_| AppError::bad_request("Malformed form body"))
    }

    /// First value sent for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    pub fn get_all<'a, 'k>(&'a self, key: &'k str) -> impl Iterator<Item = &'a str> + 'k
    where
        'a: 'k,
    {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value, empty when absent
    pub fn text(&self, key: &str) -> String {
        self.get(key).map(str::trim).unwrap_or_default().to_owned()
    }

    /// Checkbox semantics: present with any value but an explicit false
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(v) if !matches!(v, "" | "0" | "false" | "off"))
    }

    /// All ids sent under `key`, in order and without duplicates. Blank entries are skipped.
    pub fn ids(&self, key: &str) -> Result<Vec<i64>, AppError> {
        let mut ids = vec![];
        for raw in self.get_all(key).map(str::trim).filter(|v| !v.is_empty()) {
            let id = raw
                .parse::<i64>()
                .map_err(|_| AppError::bad_request("Ids must be integers"))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// An entry of a member select box
#[derive(Debug, Serialize)]
pub struct Choice {
    pub pk: i64,
    pub label: String,
    pub selected: bool,
}

pub fn member_choices<'a>(
    members: impl IntoIterator<Item = &'a Member>,
    selected: &[i64],
) -> Vec<Choice> {
    members
        .into_iter()
        .map(|member| Choice {
            pk: member.id,
            label: format!("{} <{}>", member.name, member.email),
            selected: selected.contains(&member.id),
        })
        .collect()
}
