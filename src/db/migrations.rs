use std::collections::HashSet;
use std::path::Path;

use deadpool_postgres::Pool;

use super::error::DbError;

pub const MIGRATIONS_DIR: &str = "migrations";

/// Applies every `.sql` file in `dir` that is not yet recorded in
/// `_migrations`, in file-name order, one transaction per file.
pub async fn run(pool: &Pool, dir: &Path) -> Result<(), DbError> {
    let client = pool.get().await?;

    client
        .execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
            &[],
        )
        .await?;

    let rows = client.query("SELECT name FROM _migrations", &[]).await?;
    let applied: HashSet<String> = rows.iter().map(|row| row.get(0)).collect();

    if !dir.exists() {
        tracing::info!("No migrations directory at {}, skipping migrations", dir.display());
        return Ok(());
    }

    let names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    for name in pending(names, &applied) {
        let sql = std::fs::read_to_string(dir.join(&name))?;

        let mut client = pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(&sql).await.map_err(|e| {
            DbError::MigrationError(format!("Failed to run migration {}: {}", name, e))
        })?;

        tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[&name])
            .await?;

        tx.commit().await?;

        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("All migrations up to date");
    Ok(())
}

/// SQL files not yet applied, sorted by name.
fn pending(mut names: Vec<String>, applied: &HashSet<String>) -> Vec<String> {
    names.retain(|name| name.ends_with(".sql") && !applied.contains(name));
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_sorts_and_skips_applied() {
        let applied: HashSet<String> = ["0001_nodes.sql".to_string()].into_iter().collect();
        let names = vec![
            "0003_headers.sql".to_string(),
            "README.md".to_string(),
            "0001_nodes.sql".to_string(),
            "0002_blocks.sql".to_string(),
        ];

        assert_eq!(
            pending(names, &applied),
            vec!["0002_blocks.sql".to_string(), "0003_headers.sql".to_string()]
        );
    }
}
