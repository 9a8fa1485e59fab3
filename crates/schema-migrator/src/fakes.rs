//! In-memory fake for the database port (testing only)
//!
//! `MemoryDatabase` understands just enough DDL to behave like Postgres on
//! re-runs: creating an object that already exists fails with the same
//! message and SQLSTATE Postgres would return, unless the statement says
//! `IF NOT EXISTS` or `OR REPLACE`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::database::DatabaseApi;
use crate::error::MigrationError;
use crate::Result;

#[derive(Debug, Default)]
struct DbState {
    objects: HashSet<(String, String)>,
    executed: Vec<String>,
    secrets: BTreeMap<String, String>,
}

/// In-memory `DatabaseApi`.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<DbState>,
    fatal_markers: Vec<(String, String)>,
    failing_secrets: HashSet<String>,
    reject_auth: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `marker` fail with `message` (SQLSTATE 42601).
    pub fn failing_on(mut self, marker: &str, message: &str) -> Self {
        self.fatal_markers
            .push((marker.to_string(), message.to_string()));
        self
    }

    pub fn failing_secret(mut self, name: &str) -> Self {
        self.failing_secrets.insert(name.to_string());
        self
    }

    /// Every call answers 401.
    pub fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    /// Statements that succeeded, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn has_object(&self, kind: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .objects
            .contains(&(kind.to_string(), name.to_string()))
    }

    pub fn secrets(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().secrets.clone()
    }

    fn unauthorized() -> MigrationError {
        MigrationError::Unauthorized {
            status: 401,
            body: "{\"message\":\"Unauthorized\"}".to_string(),
        }
    }
}

/// `(kind, name)` created by a plain `CREATE` statement. `None` for
/// statements that cannot conflict.
fn created_object(sql: &str) -> Option<(String, String)> {
    let code: String = sql
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join(" ");
    let tokens: Vec<String> = code.split_whitespace().map(|t| t.to_lowercase()).collect();
    if tokens.first().map(String::as_str) != Some("create") {
        return None;
    }
    let mut i = 1;
    if tokens.get(i).map(String::as_str) == Some("or") {
        return None;
    }
    if tokens.get(i).map(String::as_str) == Some("unique") {
        i += 1;
    }
    let kind = tokens.get(i)?.clone();
    i += 1;
    if tokens.get(i).map(String::as_str) == Some("if") {
        return None;
    }
    let raw = tokens.get(i)?;
    let name = raw
        .split('(')
        .next()
        .unwrap_or(raw)
        .trim_matches('"')
        .trim_start_matches("public.")
        .to_string();
    Some((kind, name))
}

fn already_exists(kind: &str, name: &str) -> MigrationError {
    let (code, message) = match kind {
        "table" | "index" | "view" | "sequence" => ("42P07", format!("relation \"{}\" already exists", name)),
        "function" | "procedure" => (
            "42723",
            format!("function \"{}\" already exists with same argument types", name),
        ),
        "schema" => ("42P06", format!("schema \"{}\" already exists", name)),
        other => ("42710", format!("{} \"{}\" already exists", other, name)),
    };
    MigrationError::Query {
        status: 400,
        message: format!("ERROR: {}: {}", code, message),
        code: Some(code.to_string()),
    }
}

#[async_trait]
impl DatabaseApi for MemoryDatabase {
    async fn execute(&self, sql: &str) -> Result<()> {
        if self.reject_auth {
            return Err(Self::unauthorized());
        }
        if let Some((_, message)) = self.fatal_markers.iter().find(|(m, _)| sql.contains(m.as_str())) {
            return Err(MigrationError::Query {
                status: 400,
                message: message.clone(),
                code: Some("42601".to_string()),
            });
        }
        let mut state = self.state.lock().unwrap();
        if let Some(object) = created_object(sql) {
            if state.objects.contains(&object) {
                return Err(already_exists(&object.0, &object.1));
            }
            state.objects.insert(object);
        }
        state.executed.push(sql.to_string());
        Ok(())
    }

    async fn upsert_secret(&self, name: &str, value: &str) -> Result<()> {
        if self.reject_auth {
            return Err(Self::unauthorized());
        }
        if self.failing_secrets.contains(name) {
            return Err(MigrationError::RemoteApi {
                operation: "secret upsert".to_string(),
                status: 500,
                body: "secret store unavailable".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_object_parsing() {
        assert_eq!(
            created_object("CREATE TABLE public.profiles (id uuid)"),
            Some(("table".to_string(), "profiles".to_string()))
        );
        assert_eq!(
            created_object("create unique index idx_a on t (a)"),
            Some(("index".to_string(), "idx_a".to_string()))
        );
        assert_eq!(created_object("CREATE TABLE IF NOT EXISTS t (id int)"), None);
        assert_eq!(created_object("CREATE OR REPLACE FUNCTION f() ..."), None);
        assert_eq!(created_object("INSERT INTO t VALUES (1)"), None);
    }
}
