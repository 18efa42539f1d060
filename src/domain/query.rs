use crate::domain::ticket::{Priority, Ticket, TicketStatus, TicketType};
use std::cmp::Ordering;

/// Ticket fields a text search can look at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Title,
    Description,
}

/// Filter, search and pagination options for `query_tickets`
///
/// Equality filters are combined with AND. Pagination is applied after
/// filtering and ordering (offset first, then limit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCriteria {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub ticket_type: Option<TicketType>,
    pub search: Option<String>,
    /// Fields the search applies to; empty means title and description
    pub search_in: Vec<SearchField>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn ticket_type(mut self, ticket_type: TicketType) -> Self {
        self.ticket_type = Some(ticket_type);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn search_in(mut self, fields: &[SearchField]) -> Self {
        self.search_in = fields.to_vec();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The search term, if one is set and not blank
    ///
    /// A non-blank term is used as given, surrounding whitespace included.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Returns true when the search covers the given field
    pub fn searches(&self, field: SearchField) -> bool {
        self.search_in.is_empty() || self.search_in.contains(&field)
    }

    /// Checks a single ticket against the filters and search term
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.status.is_some_and(|s| s != ticket.status)
            || self.priority.is_some_and(|p| p != ticket.priority)
            || self.ticket_type.is_some_and(|t| t != ticket.ticket_type)
        {
            return false;
        }

        let Some(term) = self.search_term() else {
            return true;
        };
        let term = term.to_lowercase();

        let title_matches =
            self.searches(SearchField::Title) && ticket.title.to_lowercase().contains(&term);
        let description_matches = self.searches(SearchField::Description)
            && ticket
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(&term))
                .unwrap_or(false);

        title_matches || description_matches
    }
}

/// Most recently updated first; ties broken by id so pages are stable
pub fn compare_recency(a: &Ticket, b: &Ticket) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Filters, orders and paginates an in-memory ticket list
pub fn apply_criteria(tickets: Vec<Ticket>, criteria: &QueryCriteria) -> Vec<Ticket> {
    let mut matching: Vec<Ticket> = tickets.into_iter().filter(|t| criteria.matches(t)).collect();
    matching.sort_by(compare_recency);

    matching
        .into_iter()
        .skip(criteria.offset.unwrap_or(0))
        .take(criteria.limit.unwrap_or(usize::MAX))
        .collect()
}
