//! Statement execution context
//!
//! A [`Session`] is either autocommit (each statement runs on a pooled
//! connection) or inside a transaction. Code that must compose with an
//! already-open transaction takes `&mut Session` and calls
//! [`Session::transaction`]: only the outermost call owns the transaction,
//! nested calls run inline.

use crate::db::retry::{with_retry, RetryPolicy};
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::query::Query;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    fn to_query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, param| match param {
                SqlValue::Null => query.bind(None::<i64>),
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
            })
    }
}

enum Conn {
    Autocommit,
    Transaction(Transaction<'static, Sqlite>),
}

type CommitHook = Box<dyn FnOnce() + Send>;

/// Execution context for statements
pub struct Session {
    pool: SqlitePool,
    conn: Conn,
    retry: RetryPolicy,
    on_commit: Vec<CommitHook>,
}

impl Session {
    pub(crate) fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self {
            pool,
            conn: Conn::Autocommit,
            retry,
            on_commit: Vec::new(),
        }
    }

    /// Whether statements currently run inside an open transaction
    pub fn in_transaction(&self) -> bool {
        matches!(self.conn, Conn::Transaction(_))
    }

    /// Run a statement and return every row it produces
    pub async fn query(&mut self, stmt: &Statement) -> Result<Vec<SqliteRow>, sqlx::Error> {
        let pool = self.pool.clone();
        let retry = self.retry.clone();
        with_retry(&retry, stmt.sql(), &mut self.conn, |conn| {
            let stmt = stmt.clone();
            let pool = pool.clone();
            Box::pin(async move {
                match conn {
                    Conn::Autocommit => stmt.to_query().fetch_all(&pool).await,
                    Conn::Transaction(tx) => stmt.to_query().fetch_all(&mut **tx).await,
                }
            })
        })
        .await
    }

    /// Run a statement and return at most one row
    pub async fn query_one(&mut self, stmt: &Statement) -> Result<Option<SqliteRow>, sqlx::Error> {
        Ok(self.query(stmt).await?.into_iter().next())
    }

    /// Run a mutating statement
    pub async fn execute(&mut self, stmt: &Statement) -> Result<SqliteQueryResult, sqlx::Error> {
        let pool = self.pool.clone();
        let retry = self.retry.clone();
        with_retry(&retry, stmt.sql(), &mut self.conn, |conn| {
            let stmt = stmt.clone();
            let pool = pool.clone();
            Box::pin(async move {
                match conn {
                    Conn::Autocommit => stmt.to_query().execute(&pool).await,
                    Conn::Transaction(tx) => stmt.to_query().execute(&mut **tx).await,
                }
            })
        })
        .await
    }

    /// Enter a transactional scope.
    ///
    /// If this session is already inside a transaction the returned scope
    /// does not own it: its `commit` is a no-op and dropping it rolls
    /// nothing back, the outer owner decides.
    pub async fn transaction(&mut self) -> Result<TransactionScope<'_>, sqlx::Error> {
        if self.in_transaction() {
            return Ok(TransactionScope {
                session: self,
                owner: false,
                finished: false,
            });
        }

        let tx = self.pool.begin().await?;
        debug!("Transaction started");
        self.conn = Conn::Transaction(tx);

        Ok(TransactionScope {
            session: self,
            owner: true,
            finished: false,
        })
    }

    /// Defer `hook` until the outermost transaction commits.
    ///
    /// Runs immediately on an autocommit session. Discarded on rollback.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        if self.in_transaction() {
            self.on_commit.push(Box::new(hook));
        } else {
            hook();
        }
    }

    fn take_transaction(&mut self) -> Option<Transaction<'static, Sqlite>> {
        match std::mem::replace(&mut self.conn, Conn::Autocommit) {
            Conn::Transaction(tx) => Some(tx),
            Conn::Autocommit => None,
        }
    }
}

/// Guard for a transactional scope opened by [`Session::transaction`].
///
/// Dereferences to the session so repository calls take `&mut scope`.
pub struct TransactionScope<'s> {
    session: &'s mut Session,
    owner: bool,
    finished: bool,
}

impl TransactionScope<'_> {
    /// Whether this scope opened the transaction
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Commit if this scope owns the transaction, then run deferred hooks
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        if !self.owner {
            return Ok(());
        }

        let hooks = std::mem::take(&mut self.session.on_commit);
        if let Some(tx) = self.session.take_transaction() {
            tx.commit().await?;
            debug!("Transaction committed");
        }

        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Roll back if this scope owns the transaction
    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        if !self.owner {
            return Ok(());
        }

        self.session.on_commit.clear();
        if let Some(tx) = self.session.take_transaction() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }
}

impl Deref for TransactionScope<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.owner && !self.finished {
            self.session.on_commit.clear();
            // Dropping the sqlx transaction queues its rollback.
            if self.session.take_transaction().is_some() {
                debug!("Transaction dropped without commit, rolled back");
            }
        }
    }
}
