//! Scripted backend for connection-level tests
//!
//! Records every physical statement it receives and answers statements
//! from a queue of scripted replies (0 rows affected once the queue runs
//! dry), so nesting and upsert behaviour can be asserted exactly.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use starport_db::connection::Backend;
use starport_db::cursor::{BufferedRows, ResultSet};
use starport_db::error::{Error, ErrorKind, Result};
use starport_db::types::{Cell, ColumnInfo, Value};
use starport_db::{BackendKind, Connection, ConnectionConfig};

/// Scripted answer to the next statement
#[derive(Debug, Clone)]
pub enum Reply {
    Affected(u64),
    Id(i64),
    Rows(Vec<ColumnInfo>, Vec<Vec<Cell>>),
    Fail(ErrorKind),
}

#[derive(Debug, Default)]
struct State {
    log: Vec<String>,
    binds: Vec<Vec<String>>,
    replies: VecDeque<Reply>,
    fail_begin: bool,
    fail_commit: bool,
    fail_savepoint_rollback: bool,
    closed: bool,
}

/// Handle shared between a test and the backend it scripts
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<State>>,
}

impl Script {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.lock().replies.push_back(reply);
        self
    }

    pub fn fail_begin(&self) {
        self.lock().fail_begin = true;
    }

    pub fn fail_commit(&self) {
        self.lock().fail_commit = true;
    }

    /// Next ROLLBACK TO SAVEPOINT fails with a connection error
    pub fn fail_savepoint_rollback(&self) {
        self.lock().fail_savepoint_rollback = true;
    }

    /// Physical statements in the order received
    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Rendered binds per logged data statement
    pub fn binds(&self) -> Vec<Vec<String>> {
        self.lock().binds.clone()
    }

    pub fn count(&self, statement: &str) -> usize {
        self.lock().log.iter().filter(|s| *s == statement).count()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Backend double driven by a [`Script`]
pub struct ScriptedBackend {
    kind: BackendKind,
    aborts: bool,
    script: Script,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind, script: Script) -> Self {
        Self {
            kind,
            aborts: kind == BackendKind::Postgres,
            script,
        }
    }

    fn record(&self, sql: &str) {
        self.script.lock().log.push(sql.to_string());
    }

    fn next(&self, sql: &str, params: &[Value<'_>]) -> Option<Reply> {
        let mut state = self.script.lock();
        state.log.push(sql.to_string());
        state
            .binds
            .push(params.iter().map(|v| format!("{:?}", v)).collect());
        state.replies.pop_front()
    }
}

fn scripted(kind: ErrorKind) -> Error {
    Error::database(kind, None, format!("scripted {} failure", kind))
}

impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn close(&mut self) -> Result<()> {
        self.script.lock().closed = true;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.record("BEGIN");
        if self.script.lock().fail_begin {
            return Err(scripted(ErrorKind::Connection));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.record("COMMIT");
        if std::mem::take(&mut self.script.lock().fail_commit) {
            return Err(scripted(ErrorKind::Transient));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK");
        Ok(())
    }

    fn execute_affected(&mut self, sql: &str, params: &[Value<'_>]) -> Result<u64> {
        match self.next(sql, params) {
            None => Ok(0),
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Fail(kind)) => Err(scripted(kind)),
            Some(other) => panic!("unexpected reply {:?} for execute", other),
        }
    }

    fn execute_returning_id(&mut self, sql: &str, params: &[Value<'_>]) -> Result<i64> {
        match self.next(sql, params) {
            Some(Reply::Id(id)) => Ok(id),
            Some(Reply::Fail(kind)) => Err(scripted(kind)),
            other => panic!("unexpected reply {:?} for insert", other),
        }
    }

    fn query(&mut self, sql: &str, params: &[Value<'_>]) -> Result<Box<dyn ResultSet>> {
        match self.next(sql, params) {
            None => Ok(Box::new(BufferedRows::empty())),
            Some(Reply::Rows(columns, rows)) => Ok(Box::new(BufferedRows::new(columns, rows))),
            Some(Reply::Fail(kind)) => Err(scripted(kind)),
            Some(other) => panic!("unexpected reply {:?} for query", other),
        }
    }

    fn failure_aborts_transaction(&self) -> bool {
        self.aborts
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.record(&format!("SAVEPOINT {}", name));
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.record(&format!("ROLLBACK TO SAVEPOINT {}", name));
        if std::mem::take(&mut self.script.lock().fail_savepoint_rollback) {
            return Err(scripted(ErrorKind::Connection));
        }
        Ok(())
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.record(&format!("RELEASE SAVEPOINT {}", name));
        Ok(())
    }
}

/// Connection over a scripted backend of the given kind
pub fn scripted_connection(kind: BackendKind) -> (Connection, Script) {
    let script = Script::default();
    let backend = ScriptedBackend::new(kind, script.clone());
    let config = ConnectionConfig::new(kind, "scripted");
    (Connection::with_backend(config, Box::new(backend)), script)
}
