pub mod query;
pub mod ticket;

pub use query::{apply_criteria, QueryCriteria, SearchField};
pub use ticket::{Priority, Ticket, TicketAliases, TicketId, TicketStatus, TicketType};
