//! Named-command execution.
//!
//! The engine never writes SQL. It issues dialect-independent command names
//! (`MergeAccountsDetailed`, ...) with positional arguments, and an executor
//! resolves each name to a parameterized statement for its backend.

use crate::error::{StoreError, StoreResult};
use crate::value::SqlValue;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Database backend flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite.
    #[default]
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// Microsoft SQL Server.
    Mssql,
}

impl Dialect {
    /// All supported dialects.
    pub const ALL: [Dialect; 3] = [Dialect::Sqlite, Dialect::Postgres, Dialect::Mssql];

    /// Returns the dialect name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            other => Err(StoreError::backend(format!("unsupported dialect: {other}"))),
        }
    }
}

/// Runs named commands against the local store.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `command` with positional `args`.
    async fn run(&self, command: &str, args: Vec<SqlValue>) -> StoreResult<()>;

    /// Returns the active dialect.
    fn dialect(&self) -> Dialect;

    /// Returns true if the active dialect has a statement for `command`.
    fn has_command(&self, command: &str) -> bool;
}

/// Checks that `executor` can resolve every name in `commands`.
///
/// Returns the first missing command as [`StoreError::UnknownCommand`].
pub fn verify_commands(executor: &dyn CommandExecutor, commands: &[&str]) -> StoreResult<()> {
    match commands.iter().find(|name| !executor.has_command(name)) {
        Some(missing) => Err(StoreError::UnknownCommand {
            command: (*missing).to_string(),
            dialect: executor.dialect().to_string(),
        }),
        None => Ok(()),
    }
}

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    /// Command name.
    pub command: String,
    /// Positional arguments.
    pub args: Vec<SqlValue>,
}

impl CommandCall {
    /// Returns the first argument, conventionally the row key.
    pub fn key(&self) -> Option<&SqlValue> {
        self.args.first()
    }
}

#[derive(Debug, Clone)]
struct FailRule {
    command: String,
    key: Option<SqlValue>,
    message: String,
}

impl FailRule {
    fn applies(&self, command: &str, args: &[SqlValue]) -> bool {
        self.command == command
            && self
                .key
                .as_ref()
                .map_or(true, |key| args.first() == Some(key))
    }
}

/// An in-memory executor that records every command.
///
/// Useful for testing. Knows every command name unless told otherwise, and
/// can be scripted to fail specific commands or specific rows.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    dialect: Dialect,
    missing: HashSet<String>,
    calls: Mutex<Vec<CommandCall>>,
    failures: Mutex<Vec<FailRule>>,
    closed: AtomicBool,
}

impl RecordingExecutor {
    /// Creates an executor for the default dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reported dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Pretends the dialect has no statement for `command`.
    #[must_use]
    pub fn without_command(mut self, command: &str) -> Self {
        self.missing.insert(command.to_string());
        self
    }

    /// Makes every invocation of `command` fail.
    pub fn fail_command(&self, command: &str, message: &str) {
        self.failures.lock().push(FailRule {
            command: command.to_string(),
            key: None,
            message: message.to_string(),
        });
    }

    /// Makes invocations of `command` whose first argument equals `key` fail.
    pub fn fail_on(&self, command: &str, key: impl Into<SqlValue>, message: &str) {
        self.failures.lock().push(FailRule {
            command: command.to_string(),
            key: Some(key.into()),
            message: message.to_string(),
        });
    }

    /// Simulates a closed database; every later call fails.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns every successful invocation, in order.
    pub fn calls(&self) -> Vec<CommandCall> {
        self.calls.lock().clone()
    }

    /// Returns the successful invocations of `command`.
    pub fn calls_for(&self, command: &str) -> Vec<CommandCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.command == command)
            .cloned()
            .collect()
    }

    /// Returns the number of successful invocations.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, command: &str, args: Vec<SqlValue>) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if !self.has_command(command) {
            return Err(StoreError::UnknownCommand {
                command: command.to_string(),
                dialect: self.dialect.to_string(),
            });
        }
        if let Some(rule) = self
            .failures
            .lock()
            .iter()
            .find(|rule| rule.applies(command, &args))
        {
            return Err(StoreError::backend(rule.message.clone()));
        }

        tracing::trace!(command, args = args.len(), "command executed");
        self.calls.lock().push(CommandCall {
            command: command.to_string(),
            args,
        });
        Ok(())
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn has_command(&self, command: &str) -> bool {
        !self.missing.contains(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let executor = RecordingExecutor::new();
        executor
            .run("MergeRoutes", vec![SqlValue::Int(1)])
            .await
            .unwrap();
        executor
            .run("MergeRoutes", vec![SqlValue::Int(2)])
            .await
            .unwrap();
        let keys: Vec<_> = executor
            .calls_for("MergeRoutes")
            .iter()
            .filter_map(|c| c.key().and_then(SqlValue::as_int))
            .collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let executor = RecordingExecutor::new();
        executor.fail_on("MergeAccountsDetailed", 2i64, "constraint failed");

        assert!(executor
            .run("MergeAccountsDetailed", vec![SqlValue::Int(1)])
            .await
            .is_ok());
        let err = executor
            .run("MergeAccountsDetailed", vec![SqlValue::Int(2)])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::backend("constraint failed"));
        assert_eq!(executor.call_count(), 1);

        executor.close();
        let err = executor.run("MergeRoutes", vec![]).await.unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn verify_reports_missing_command() {
        let executor = RecordingExecutor::new()
            .with_dialect(Dialect::Mssql)
            .without_command("MergeRoutes");
        assert!(verify_commands(&executor, &["MergeAccountsDetailed"]).is_ok());
        let err = verify_commands(&executor, &["MergeAccountsDetailed", "MergeRoutes"]).unwrap_err();
        assert_eq!(
            err,
            StoreError::UnknownCommand {
                command: "MergeRoutes".into(),
                dialect: "mssql".into()
            }
        );
    }

    #[test]
    fn dialect_parsing() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::ALL.len(), 3);
    }
}
