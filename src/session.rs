//! Database session.
//!
//! One [`Session`] owns the single SQLite connection used for a load. It is
//! passed explicitly to every component that touches the database and the
//! connection closes when the session is dropped, whether the load
//! succeeded or not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tracing::debug;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors opening or configuring a database session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("database file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to open database '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to configure database connection: {0}")]
    Configure(#[source] rusqlite::Error),

    #[error("failed to close database connection: {0}")]
    Close(#[source] rusqlite::Error),
}

/// Connection settings applied on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            foreign_keys: false,
        }
    }
}

/// An open database connection.
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Session {
    /// Open an existing database file read-write.
    ///
    /// The file is never created: the target schema must already exist.
    pub fn open(path: &Path, options: &SessionOptions) -> SessionResult<Self> {
        if !path.exists() {
            return Err(SessionError::NotFound(path.to_path_buf()));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| SessionError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let session = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        session.configure(options)?;
        debug!(path = %path.display(), "opened database session");
        Ok(session)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(options: &SessionOptions) -> SessionResult<Self> {
        let conn = Connection::open_in_memory().map_err(SessionError::Configure)?;
        let session = Self { conn, path: None };
        session.configure(options)?;
        Ok(session)
    }

    fn configure(&self, options: &SessionOptions) -> SessionResult<()> {
        self.conn
            .busy_timeout(options.busy_timeout)
            .map_err(SessionError::Configure)?;
        self.conn
            .pragma_update(None, "foreign_keys", options.foreign_keys)
            .map_err(SessionError::Configure)?;
        Ok(())
    }

    /// Database file path, `None` for in-memory sessions.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, needed to start transactions.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Close the connection, surfacing any error from SQLite.
    pub fn close(self) -> SessionResult<()> {
        self.conn.close().map_err(|(_, e)| SessionError::Close(e))
    }
}
