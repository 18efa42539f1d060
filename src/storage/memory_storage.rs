use crate::{
    domain::{apply_criteria, QueryCriteria, Ticket, TicketId},
    error::{Result, TasklineError},
    storage::{
        aliases::{collect_aliases, ensure_aliases_available, find_alias_owner},
        record::{
            convert_batch, ensure_update_order, format_timestamp, to_domain, to_domain_list,
            to_persistence, TicketRecord,
        },
        TicketRepository,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Ephemeral repository, mainly a reference implementation and test double
///
/// Tickets are kept in their persistence form so every read goes through the
/// same mapper as the persistent backends.
#[derive(Default)]
pub struct InMemoryTicketRepository {
    records: RwLock<HashMap<TicketId, TicketRecord>>,
}

impl InMemoryTicketRepository {
    const REPOSITORY: &'static str = "in_memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with `tickets`
    pub fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let records = tickets
            .into_iter()
            .map(|t| (t.id.clone(), to_persistence(&t)))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn all_tickets(&self, operation: &'static str) -> Result<Vec<Ticket>> {
        let records: Vec<TicketRecord> = self.records.read().await.values().cloned().collect();
        Ok(to_domain_list(&records, operation)?.tickets)
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        let mut records = self.records.write().await;

        // Unreadable records must not block unrelated saves
        let stored: Vec<TicketRecord> = records.values().cloned().collect();
        let existing = convert_batch(&stored, "save").tickets;
        ensure_aliases_available(&existing, ticket)?;

        let mut record = to_persistence(ticket);
        if let Some(current) = existing.iter().find(|t| t.id == ticket.id) {
            ensure_update_order(&current.created_at, ticket)?;
            record.created_at = format_timestamp(&current.created_at);
        }
        records.insert(ticket.id.clone(), record);
        debug!(id = %ticket.id, "Saved ticket in memory");
        Ok(())
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(|r| to_domain(r, "find_by_id"))
            .transpose()
    }

    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>> {
        let tickets = self.all_tickets("query_tickets").await?;
        Ok(apply_criteria(tickets, criteria))
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TasklineError::TicketNotFound {
                repository: Self::REPOSITORY,
                id: id.to_string(),
            })
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Ticket>> {
        let tickets = self.all_tickets("find_by_alias").await?;
        Ok(find_alias_owner(&tickets, alias).cloned())
    }

    async fn is_alias_available(&self, alias: &str) -> Result<bool> {
        let tickets = self.all_tickets("is_alias_available").await?;
        Ok(find_alias_owner(&tickets, alias).is_none())
    }

    async fn get_all_aliases(&self) -> Result<Vec<String>> {
        let tickets = self.all_tickets("get_all_aliases").await?;
        Ok(collect_aliases(&tickets))
    }

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>> {
        let tickets = self.all_tickets("find_tickets_with_aliases").await?;
        Ok(tickets
            .into_iter()
            .filter(|t| !t.alias_list().is_empty())
            .collect())
    }
}
