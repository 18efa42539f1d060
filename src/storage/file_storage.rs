use crate::{
    domain::{apply_criteria, QueryCriteria, Ticket, TicketId},
    error::{Result, TasklineError},
    storage::{
        aliases::{collect_aliases, ensure_aliases_available, find_alias_owner},
        record::{
            convert_batch, ensure_update_order, format_timestamp, to_domain_list, to_persistence,
            RawTicketRecord,
        },
        TicketRepository,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

/// Flat-file storage: one JSON array holding every ticket record
///
/// Mutations run load → mutate → write inside a per-instance lock, so
/// concurrent saves from the same process never lose an update. There is no
/// OS-level locking: only one process may write a given file.
pub struct FileTicketRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTicketRepository {
    const REPOSITORY: &'static str = "file";

    /// Creates a repository backed by the file at `path`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `path` is empty.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(TasklineError::Config(
                "file repository path must not be empty".to_string(),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, operation: &'static str, source: std::io::Error) -> TasklineError {
        TasklineError::Persistence {
            operation,
            path: self.path.clone(),
            source,
        }
    }

    /// Reads the raw records. Missing or corrupt files read as empty.
    async fn load_records(&self, operation: &'static str) -> Result<Vec<Value>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Ticket file not found, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(path = %self.path.display(), error = %e, "Ticket file is not valid UTF-8, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.persistence_error(operation, e)),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(records)) => {
                debug!(path = %self.path.display(), count = records.len(), "Loaded ticket records");
                Ok(records)
            }
            Ok(_) => {
                warn!(path = %self.path.display(), "Ticket file does not hold a JSON array, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ticket file is corrupt, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn load_tickets(&self, operation: &'static str) -> Result<Vec<Ticket>> {
        let records = self.load_records(operation).await?;
        Ok(to_domain_list(&records, operation)?.tickets)
    }

    /// Writes the whole array through a temp file and an atomic rename
    async fn write_records(&self, operation: &'static str, records: &[Value]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error(operation, e))?;
        }

        let json = serde_json::to_string_pretty(records)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, json)
            .await
            .map_err(|e| self.persistence_error(operation, e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.persistence_error(operation, e))?;

        debug!(path = %self.path.display(), count = records.len(), operation, "Wrote ticket file");
        Ok(())
    }
}

fn has_id(record: &Value, id: &str) -> bool {
    record
        .record_id()
        .is_some_and(|r| r.eq_ignore_ascii_case(id))
}

#[async_trait]
impl TicketRepository for FileTicketRepository {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        const OP: &str = "save";
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_records(OP).await?;
        // Unreadable records are written back untouched
        let existing = convert_batch(&records, OP).tickets;
        ensure_aliases_available(&existing, ticket)?;

        let mut record = to_persistence(ticket);
        match records.iter().position(|r| has_id(r, ticket.id.as_str())) {
            Some(index) => {
                if let Some(current) = existing.iter().find(|t| t.id == ticket.id) {
                    ensure_update_order(&current.created_at, ticket)?;
                    record.created_at = format_timestamp(&current.created_at);
                }
                records[index] = serde_json::to_value(&record)?;
                debug!(id = %ticket.id, "Updating ticket");
            }
            None => {
                records.push(serde_json::to_value(&record)?);
                debug!(id = %ticket.id, "Inserting ticket");
            }
        }

        self.write_records(OP, &records).await
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        const OP: &str = "find_by_id";
        let records = self.load_records(OP).await?;
        records
            .iter()
            .find(|r| has_id(r, id.as_str()))
            .map(|r| r.to_domain(OP))
            .transpose()
    }

    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>> {
        let tickets = self.load_tickets("query_tickets").await?;
        Ok(apply_criteria(tickets, criteria))
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        const OP: &str = "delete";
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_records(OP).await?;
        let index = records
            .iter()
            .position(|r| has_id(r, id.as_str()))
            .ok_or_else(|| TasklineError::TicketNotFound {
                repository: Self::REPOSITORY,
                id: id.to_string(),
            })?;
        records.remove(index);

        self.write_records(OP, &records).await?;
        debug!(id = %id, "Deleted ticket");
        Ok(())
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Ticket>> {
        let tickets = self.load_tickets("find_by_alias").await?;
        Ok(find_alias_owner(&tickets, alias).cloned())
    }

    async fn is_alias_available(&self, alias: &str) -> Result<bool> {
        let tickets = self.load_tickets("is_alias_available").await?;
        Ok(find_alias_owner(&tickets, alias).is_none())
    }

    async fn get_all_aliases(&self) -> Result<Vec<String>> {
        let tickets = self.load_tickets("get_all_aliases").await?;
        Ok(collect_aliases(&tickets))
    }

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>> {
        let tickets = self.load_tickets("find_tickets_with_aliases").await?;
        Ok(tickets
            .into_iter()
            .filter(|t| !t.alias_list().is_empty())
            .collect())
    }
}
