use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("{}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Build error: {0}")]
    BuildError(#[from] deadpool_postgres::BuildError),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
}

impl DbError {
    /// SQLSTATE of the underlying database error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            DbError::PostgresError(e) => e.as_db_error().map(|db_err| db_err.code().code()),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.sql_state() == Some("23505")
    }
}

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("log filter requires a non-empty name")]
    EmptyFilterName,

    #[error("log filter '{0}' already exists")]
    DuplicateFilter(String),

    #[error("log filter '{0}' does not exist")]
    FilterNotFound(String),

    #[error("failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("{0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepositoryError::Db(e) if e.is_unique_violation())
    }
}

impl From<tokio_postgres::Error> for RepositoryError {
    fn from(e: tokio_postgres::Error) -> Self {
        RepositoryError::Db(DbError::PostgresError(e))
    }
}

impl From<deadpool_postgres::PoolError> for RepositoryError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        RepositoryError::Db(DbError::PoolError(e))
    }
}

fn format_pg_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = format!(
            "PostgreSQL error [{}]: {}",
            db_err.code().code(),
            db_err.message()
        );
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        if let Some(table) = db_err.table() {
            msg.push_str(&format!("\n  Table: {}", table));
        }
        if let Some(constraint) = db_err.constraint() {
            msg.push_str(&format!("\n  Constraint: {}", constraint));
        }
        msg
    } else {
        format!("PostgreSQL error: {}", e)
    }
}
