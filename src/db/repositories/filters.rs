use std::sync::Arc;

use async_trait::async_trait;

use super::{get_address, get_topics, topic_param};
use crate::db::traits::FilterRepository;
use crate::db::{DbError, DbPool, RepositoryError};
use crate::types::chain::LogFilter;

pub struct PgFilterRepository {
    pool: Arc<DbPool>,
}

impl PgFilterRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FilterRepository for PgFilterRepository {
    async fn create_filter(&self, filter: &LogFilter) -> Result<(), RepositoryError> {
        if filter.name.trim().is_empty() {
            return Err(RepositoryError::EmptyFilterName);
        }

        let client = self.pool.inner().get().await?;
        let result = client
            .execute(
                "INSERT INTO log_filters
                    (name, from_block, to_block, address, topic0, topic1, topic2, topic3)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &filter.name,
                    &filter.from_block,
                    &filter.to_block,
                    &filter.address.as_slice(),
                    &topic_param(&filter.topics, 0),
                    &topic_param(&filter.topics, 1),
                    &topic_param(&filter.topics, 2),
                    &topic_param(&filter.topics, 3),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    Err(RepositoryError::DuplicateFilter(filter.name.clone()))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn get_filter(&self, name: &str) -> Result<LogFilter, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let row = client
            .query_opt(
                "SELECT name, from_block, to_block, address, topic0, topic1, topic2, topic3
                 FROM log_filters WHERE name = $1",
                &[&name],
            )
            .await?
            .ok_or_else(|| RepositoryError::FilterNotFound(name.to_string()))?;

        Ok(LogFilter {
            name: row.try_get("name")?,
            from_block: row.try_get("from_block")?,
            to_block: row.try_get("to_block")?,
            address: get_address(&row, "address")?,
            topics: get_topics(&row)?,
        })
    }
}
