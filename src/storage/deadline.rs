//! Per-operation deadlines for any repository.
//!
//! Dropping a repository future cancels it. The file backend releases its
//! write lock on drop and never renames a half-written temp file, so a timed
//! out save leaves the previous store intact.

use crate::{
    domain::{QueryCriteria, Ticket, TicketId},
    error::{Result, TasklineError},
    storage::TicketRepository,
};
use async_trait::async_trait;
use std::{future::Future, time::Duration};
use tracing::warn;

/// Decorator that fails any call taking longer than `deadline`
pub struct DeadlineRepository<R> {
    inner: R,
    deadline: Duration,
}

impl<R: TicketRepository> DeadlineRepository<R> {
    pub fn new(inner: R, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn run<T>(&self, operation: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, deadline_ms = self.deadline.as_millis() as u64, "Repository operation timed out");
                Err(TasklineError::Timeout {
                    operation,
                    after: self.deadline,
                })
            }
        }
    }
}

#[async_trait]
impl<R: TicketRepository> TicketRepository for DeadlineRepository<R> {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        self.run("save", self.inner.save(ticket)).await
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        self.run("find_by_id", self.inner.find_by_id(id)).await
    }

    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>> {
        self.run("query_tickets", self.inner.query_tickets(criteria)).await
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        self.run("delete", self.inner.delete(id)).await
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Ticket>> {
        self.run("find_by_alias", self.inner.find_by_alias(alias)).await
    }

    async fn is_alias_available(&self, alias: &str) -> Result<bool> {
        self.run("is_alias_available", self.inner.is_alias_available(alias)).await
    }

    async fn get_all_aliases(&self) -> Result<Vec<String>> {
        self.run("get_all_aliases", self.inner.get_all_aliases()).await
    }

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>> {
        self.run("find_tickets_with_aliases", self.inner.find_tickets_with_aliases())
            .await
    }
}
