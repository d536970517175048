use crate::db::{FilterRepository, RepositoryError};
use crate::types::chain::LogFilter;

/// Registers every configured filter. A filter already stored with identical
/// contents is accepted, so restarts are harmless; a different filter under
/// an existing name is rejected.
pub async fn register_filters(
    repository: &dyn FilterRepository,
    filters: &[LogFilter],
) -> Result<(), RepositoryError> {
    for filter in filters {
        match repository.create_filter(filter).await {
            Ok(()) => tracing::info!("Registered log filter {}", filter.name),
            Err(RepositoryError::DuplicateFilter(name)) => {
                let existing = repository.get_filter(&name).await?;
                if existing != *filter {
                    return Err(RepositoryError::DuplicateFilter(name));
                }
                tracing::debug!("Log filter {} already registered", name);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
