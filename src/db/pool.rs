use std::path::Path;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::NoTls;

use super::error::{DbError, RepositoryError};
use super::traits::OperationSink;
use super::types::{DbOperation, DbValue};

pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    pub async fn new(database_url: &str, max_size: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        // Fail fast on bad credentials instead of on the first query.
        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created (max {} connections)", max_size);

        Ok(Self { pool })
    }

    pub fn inner(&self) -> &Pool {
        &self.pool
    }

    /// Applies `operations` in order inside a single transaction.
    pub async fn execute_transaction(&self, operations: Vec<DbOperation>) -> Result<(), DbError> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        for op in &operations {
            let sql = build_upsert_sql(op);
            let params: Vec<SqlParam<'_>> = op.values.iter().map(SqlParam).collect();
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            if let Err(e) = transaction.execute(sql.as_str(), &param_refs).await {
                let db_err = DbError::from(e);
                tracing::error!("Write to {} failed\n  SQL: {}\n  Error: {}", op.table, sql, db_err);
                return Err(db_err);
            }
        }

        transaction.commit().await?;
        tracing::debug!("Committed {} operation(s)", operations.len());
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), DbError> {
        super::migrations::run(&self.pool, Path::new(super::migrations::MIGRATIONS_DIR)).await
    }
}

#[async_trait]
impl OperationSink for DbPool {
    async fn execute(&self, operations: Vec<DbOperation>) -> Result<(), RepositoryError> {
        Ok(self.execute_transaction(operations).await?)
    }
}

/// Borrowed [`DbValue`] bound as a statement parameter.
#[derive(Debug)]
struct SqlParam<'a>(&'a DbValue);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            DbValue::Null => Ok(IsNull::Yes),
            DbValue::Int64(v) => v.to_sql(ty, out),
            DbValue::Text(v) | DbValue::Numeric(v) => v.to_sql(ty, out),
            DbValue::Bytes(v) => v.as_slice().to_sql(ty, out),
            DbValue::Address(v) => v.as_slice().to_sql(ty, out),
            DbValue::Bytes32(v) => v.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <&[u8] as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

/// `$N`, with a cast for values sent as text but stored as NUMERIC.
fn placeholder(value: &DbValue, index: usize) -> String {
    match value {
        DbValue::Numeric(_) => format!("${}::text::numeric", index),
        _ => format!("${}", index),
    }
}

/// Quote an identifier so reserved words like `number` and `hash` work as
/// column names.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_list(names: &[String]) -> String {
    names.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn build_upsert_sql(op: &DbOperation) -> String {
    let placeholders = op
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder(v, i + 1))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        op.table,
        quote_list(&op.columns),
        placeholders
    );

    if op.conflict_columns.is_empty() {
        return sql;
    }

    sql.push_str(&format!(" ON CONFLICT ({})", quote_list(&op.conflict_columns)));
    if op.update_columns.is_empty() {
        sql.push_str(" DO NOTHING");
    } else {
        let updates = op
            .update_columns
            .iter()
            .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" DO UPDATE SET {}", updates));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_ignore_sql() {
        let op = DbOperation::insert_ignore(
            "watched_event_records",
            &["transformer", "log_id"],
            vec![DbValue::Text("transfers".to_string()), DbValue::Int64(7)],
            &["transformer", "log_id"],
        );

        assert_eq!(
            build_upsert_sql(&op),
            "INSERT INTO watched_event_records (\"transformer\", \"log_id\") VALUES ($1, $2) \
             ON CONFLICT (\"transformer\", \"log_id\") DO NOTHING"
        );
    }

    #[test]
    fn test_upsert_sql_updates_listed_columns() {
        let op = DbOperation::upsert(
            "block_miner_rewards",
            &["block_number", "reward"],
            vec![DbValue::Int64(1), DbValue::Numeric("5000000000000000000".to_string())],
            &["block_number"],
            &["reward"],
        );

        assert_eq!(
            build_upsert_sql(&op),
            "INSERT INTO block_miner_rewards (\"block_number\", \"reward\") \
             VALUES ($1, $2::text::numeric) \
             ON CONFLICT (\"block_number\") DO UPDATE SET \"reward\" = EXCLUDED.\"reward\""
        );
    }

    #[test]
    fn test_plain_insert_without_conflict_columns() {
        let op = DbOperation::upsert("facts", &["value"], vec![DbValue::Null], &[], &[]);
        assert_eq!(build_upsert_sql(&op), "INSERT INTO facts (\"value\") VALUES ($1)");
    }
}
