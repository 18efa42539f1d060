use crate::{
    domain::{QueryCriteria, Ticket, TicketId},
    error::Result,
};
use async_trait::async_trait;
use std::path::PathBuf;

pub mod aliases;
pub mod deadline;
pub mod file_storage;
pub mod memory_storage;
pub mod record;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

pub use deadline::DeadlineRepository;
pub use file_storage::FileTicketRepository;
pub use memory_storage::InMemoryTicketRepository;
#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteTicketRepository;

/// Persistence contract every ticket backend fulfils
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Inserts or replaces a ticket by ID
    ///
    /// Replacing keeps the stored creation timestamp.
    async fn save(&self, ticket: &Ticket) -> Result<()>;

    /// Loads a ticket, `None` if no record has this ID
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Returns tickets matching every criterion, most recently updated first
    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>>;

    /// Removes a ticket, failing with `TicketNotFound` if it does not exist
    async fn delete(&self, id: &TicketId) -> Result<()>;

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Ticket>>;

    async fn is_alias_available(&self, alias: &str) -> Result<bool>;

    /// All aliases in use, sorted and deduplicated
    async fn get_all_aliases(&self) -> Result<Vec<String>>;

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>>;
}

#[async_trait]
impl<R: TicketRepository + ?Sized> TicketRepository for Box<R> {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        (**self).save(ticket).await
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        (**self).find_by_id(id).await
    }

    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>> {
        (**self).query_tickets(criteria).await
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        (**self).delete(id).await
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Ticket>> {
        (**self).find_by_alias(alias).await
    }

    async fn is_alias_available(&self, alias: &str) -> Result<bool> {
        (**self).is_alias_available(alias).await
    }

    async fn get_all_aliases(&self) -> Result<Vec<String>> {
        (**self).get_all_aliases().await
    }

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>> {
        (**self).find_tickets_with_aliases().await
    }
}

/// Storage backend selected at start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// JSON array in a single file
    File(PathBuf),
    #[cfg(feature = "sqlite-storage")]
    Sqlite(PathBuf),
    #[cfg(feature = "sqlite-storage")]
    SqliteInMemory,
    InMemory,
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::File(_) => "file",
            #[cfg(feature = "sqlite-storage")]
            StorageBackend::Sqlite(_) | StorageBackend::SqliteInMemory => "sqlite",
            StorageBackend::InMemory => "in_memory",
        }
    }
}

/// Builds the repository for `backend`
///
/// # Errors
///
/// Returns a configuration error when a path-based backend gets an empty path.
pub fn create_repository(backend: StorageBackend) -> Result<Box<dyn TicketRepository>> {
    tracing::debug!(backend = backend.name(), "Creating ticket repository");
    Ok(match backend {
        StorageBackend::File(path) => Box::new(FileTicketRepository::new(path)?),
        #[cfg(feature = "sqlite-storage")]
        StorageBackend::Sqlite(path) => Box::new(SqliteTicketRepository::open(path)?),
        #[cfg(feature = "sqlite-storage")]
        StorageBackend::SqliteInMemory => Box::new(SqliteTicketRepository::in_memory()),
        StorageBackend::InMemory => Box::new(InMemoryTicketRepository::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TasklineError;

    #[test]
    fn test_empty_file_path_rejected() {
        assert!(matches!(
            create_repository(StorageBackend::File(PathBuf::new())),
            Err(TasklineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_boxed_repository_delegates() {
        let repo = create_repository(StorageBackend::InMemory).unwrap();
        let boxed: Box<Box<dyn TicketRepository>> = Box::new(repo);
        assert!(boxed.get_all_aliases().await.unwrap().is_empty());
    }
}
