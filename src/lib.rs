//! # Taskline Core
//!
//! Ticket persistence for Taskline: the ticket domain model, ULID and alias
//! generation, and interchangeable storage backends behind one async
//! repository trait.
//!
//! Backends:
//! - a JSON flat file (`FileTicketRepository`)
//! - an embedded SQLite database (`SqliteTicketRepository`, feature `sqlite-storage`)
//! - an in-memory map (`InMemoryTicketRepository`)
//!
//! A store file must have a single writer process. Writes are atomic renames,
//! so readers always see a complete file, but two processes saving to the same
//! file concurrently will lose one of the updates.

pub mod alias;
pub mod config;
pub mod domain;
pub mod error;
pub mod id_generation;
pub mod logging;
pub mod storage;

// Re-export commonly used types
pub use alias::AliasGenerator;
pub use config::{open_repository, StorageConfig};
pub use domain::{
    query::{QueryCriteria, SearchField},
    ticket::{Priority, Ticket, TicketAliases, TicketId, TicketStatus, TicketType},
};
pub use error::{DomainError, Result, TasklineError};
pub use id_generation::{HexIdGenerator, IdGenerator, UlidGenerator};
pub use storage::{create_repository, StorageBackend, TicketRepository};
