use crate::{
    domain::{QueryCriteria, SearchField, Ticket, TicketId},
    error::{DomainError, Result, TasklineError},
    storage::{
        record::{to_domain, to_domain_list, to_persistence, TicketRecord},
        TicketRepository,
    },
};
use async_trait::async_trait;
use rusqlite::{functions::FunctionFlags, Connection, OptionalExtension, Row, ToSql};
use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    type TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tickets_updated_at ON tickets (updated_at);
";

const SELECT_COLUMNS: &str =
    "SELECT id, title, description, status, priority, type, created_at, updated_at FROM tickets";

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed ticket repository
///
/// The connection is opened lazily on first use; concurrent first callers
/// share a single initialization. Aliases are not stored by this backend.
pub struct SqliteTicketRepository {
    location: Location,
    connection: OnceCell<Arc<Mutex<Connection>>>,
}

impl SqliteTicketRepository {
    const BACKEND: &'static str = "sqlite";

    /// Creates a repository for the database file at `path`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `path` is empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(TasklineError::Config(
                "sqlite repository path must not be empty".to_string(),
            ));
        }
        Ok(Self {
            location: Location::File(path.to_path_buf()),
            connection: OnceCell::new(),
        })
    }

    /// Creates a repository over a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            connection: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        self.connection
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let conn = tokio::task::spawn_blocking(move || open_connection(&location))
                    .await
                    .map_err(|e| TasklineError::TaskJoin(e.to_string()))??;
                Ok::<_, TasklineError>(Arc::new(Mutex::new(conn)))
            })
            .await
            .cloned()
    }

    /// Runs `f` against the connection on the blocking thread pool
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let connection = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            let conn = connection
                .lock()
                .map_err(|_| TasklineError::TaskJoin("connection mutex poisoned".to_string()))?;
            f(&conn).map_err(|source| TasklineError::Database { operation, source })
        })
        .await
        .map_err(|e| TasklineError::TaskJoin(e.to_string()))?
    }
}

fn open_connection(location: &Location) -> Result<Connection> {
    const OP: &str = "initialize";
    let conn = match location {
        Location::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| TasklineError::Persistence {
                    operation: OP,
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            Connection::open(path)
        }
        Location::Memory => Connection::open_in_memory(),
    }
    .map_err(|source| TasklineError::Database { operation: OP, source })?;

    // SQLite's LOWER() only folds ASCII
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|value| value.to_lowercase())),
    )
    .map_err(|source| TasklineError::Database { operation: OP, source })?;

    conn.execute_batch(SCHEMA)
        .map_err(|source| TasklineError::Database { operation: OP, source })?;
    info!(location = ?location, "Initialized SQLite ticket store");
    Ok(conn)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TicketRecord> {
    Ok(TicketRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        ticket_type: row.get(5)?,
        aliases: None,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Escapes LIKE wildcards so the search term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Builds the filtered query. Every value is a bound parameter.
fn build_query(criteria: &QueryCriteria) -> (String, Vec<Box<dyn ToSql + Send>>) {
    let mut sql = format!("{} WHERE 1=1", SELECT_COLUMNS);
    let mut params: Vec<Box<dyn ToSql + Send>> = Vec::new();

    if let Some(status) = criteria.status {
        sql.push_str(" AND status = ?");
        params.push(Box::new(status.as_str()));
    }
    if let Some(priority) = criteria.priority {
        sql.push_str(" AND priority = ?");
        params.push(Box::new(priority.as_str()));
    }
    if let Some(ticket_type) = criteria.ticket_type {
        sql.push_str(" AND type = ?");
        params.push(Box::new(ticket_type.as_str()));
    }

    if let Some(term) = criteria.search_term() {
        let pattern = like_pattern(term);
        let mut clauses = Vec::new();
        if criteria.searches(SearchField::Title) {
            clauses.push("unicode_lower(title) LIKE ? ESCAPE '\\'");
            params.push(Box::new(pattern.clone()));
        }
        if criteria.searches(SearchField::Description) {
            clauses.push("unicode_lower(COALESCE(description, '')) LIKE ? ESCAPE '\\'");
            params.push(Box::new(pattern));
        }
        let _ = write!(sql, " AND ({})", clauses.join(" OR "));
    }

    sql.push_str(" ORDER BY updated_at DESC, id DESC");

    if criteria.limit.is_some() || criteria.offset.is_some() {
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        let limit = criteria
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let offset = i64::try_from(criteria.offset.unwrap_or(0)).unwrap_or(i64::MAX);
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Box::new(limit));
        params.push(Box::new(offset));
    }

    (sql, params)
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        if ticket.aliases.is_some() {
            warn!(id = %ticket.id, "SQLite backend does not persist aliases; dropping them");
        }
        let record = to_persistence(ticket);
        let updated_at = record.updated_at.clone();
        let rejected_by = self
            .with_connection("save", move |conn| {
                let changed = conn.execute(
                    "INSERT INTO tickets (id, title, description, status, priority, type, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                         title = excluded.title,
                         description = excluded.description,
                         status = excluded.status,
                         priority = excluded.priority,
                         type = excluded.type,
                         updated_at = excluded.updated_at
                     WHERE excluded.updated_at >= tickets.created_at",
                    rusqlite::params![
                        record.id,
                        record.title,
                        record.description,
                        record.status,
                        record.priority,
                        record.ticket_type,
                        record.created_at,
                        record.updated_at,
                    ],
                )?;
                if changed > 0 {
                    return Ok(None);
                }
                // The guarded update was skipped; report the stored creation time
                conn.query_row(
                    "SELECT created_at FROM tickets WHERE id = ?1",
                    [record.id],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await?;

        if let Some(created_at) = rejected_by {
            return Err(DomainError::TimestampOrder {
                created_at,
                updated_at,
            }
            .into());
        }
        debug!(id = %ticket.id, "Upserted ticket");
        Ok(())
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let key = id.to_string();
        let record = self
            .with_connection("find_by_id", move |conn| {
                conn.query_row(
                    &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                    [key],
                    record_from_row,
                )
                .optional()
            })
            .await?;
        record.map(|r| to_domain(&r, "find_by_id")).transpose()
    }

    async fn query_tickets(&self, criteria: &QueryCriteria) -> Result<Vec<Ticket>> {
        let (sql, params) = build_query(criteria);
        debug!(sql = %sql, params = params.len(), "Querying tickets");
        let records = self
            .with_connection("query_tickets", move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let params_refs: Vec<&dyn ToSql> =
                    params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
                let rows = stmt
                    .query_map(params_refs.as_slice(), record_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(to_domain_list(&records, "query_tickets")?.tickets)
    }

    async fn delete(&self, id: &TicketId) -> Result<()> {
        let key = id.to_string();
        let deleted = self
            .with_connection("delete", move |conn| {
                conn.execute("DELETE FROM tickets WHERE id = ?1", [key])
            })
            .await?;
        if deleted == 0 {
            return Err(TasklineError::TicketNotFound {
                repository: Self::BACKEND,
                id: id.to_string(),
            });
        }
        debug!(id = %id, "Deleted ticket");
        Ok(())
    }

    async fn find_by_alias(&self, _alias: &str) -> Result<Option<Ticket>> {
        Err(unsupported("find_by_alias"))
    }

    async fn is_alias_available(&self, _alias: &str) -> Result<bool> {
        Err(unsupported("is_alias_available"))
    }

    async fn get_all_aliases(&self) -> Result<Vec<String>> {
        Err(unsupported("get_all_aliases"))
    }

    async fn find_tickets_with_aliases(&self) -> Result<Vec<Ticket>> {
        Err(unsupported("find_tickets_with_aliases"))
    }
}

fn unsupported(operation: &'static str) -> TasklineError {
    TasklineError::Unsupported {
        backend: SqliteTicketRepository::BACKEND,
        operation,
    }
}
