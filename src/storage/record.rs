//! Domain ↔ persistence mapping.
//!
//! [`TicketRecord`] is the serializable shadow of a [`Ticket`]. Records come
//! from untyped sources (a JSON file someone may have edited, SQL rows), so
//! conversion back to the domain re-checks everything:
//!
//! - structural problems (missing field, wrong JSON type, unparsable
//!   timestamp) become [`TasklineError::MalformedData`]
//! - values the domain rejects (unknown status, blank title, ...) become
//!   [`TasklineError::DomainReconstruction`]
//!
//! Bulk conversion skips bad records instead of failing the whole load,
//! unless every record in the batch is bad.

use crate::{
    domain::ticket::{Priority, Ticket, TicketAliases, TicketId, TicketStatus, TicketType},
    error::{DomainError, Result, TasklineError},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Serializable alias block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default)]
    pub custom: Vec<String>,
}

/// On-disk / on-table form of a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<AliasRecord>,
    pub created_at: String,
    pub updated_at: String,
}

impl TicketRecord {
    /// Structural validation of an untyped JSON value
    ///
    /// Every required field must be present and a string; optional fields must
    /// have the right JSON type when present (`null` counts as absent).
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| TasklineError::MalformedData {
            field: "<record>".to_string(),
            id: None,
        })?;
        let id = object.get("id").and_then(Value::as_str).map(str::to_string);
        let malformed = |field: &str| TasklineError::MalformedData {
            field: field.to_string(),
            id: id.clone(),
        };

        let required = |field: &str| -> Result<String> {
            object
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| malformed(field))
        };

        let record = Self {
            id: required("id")?,
            title: required("title")?,
            description: optional_string(object, "description").map_err(|_| malformed("description"))?,
            status: required("status")?,
            priority: required("priority")?,
            ticket_type: required("type")?,
            aliases: alias_block(object).map_err(|field| malformed(&field))?,
            created_at: required("createdAt")?,
            updated_at: required("updatedAt")?,
        };
        Ok(record)
    }

    /// Sanitized field-length summary, safe to log
    pub fn summary(&self) -> String {
        let (canonical, custom) = self
            .aliases
            .as_ref()
            .map(|a| (usize::from(a.canonical.is_some()), a.custom.len()))
            .unwrap_or((0, 0));
        format!(
            "title_len={}, description_len={}, canonical_aliases={}, custom_aliases={}",
            self.title.chars().count(),
            self.description.as_ref().map(|d| d.chars().count()).unwrap_or(0),
            canonical,
            custom,
        )
    }
}

fn optional_string(object: &Map<String, Value>, field: &str) -> std::result::Result<Option<String>, ()> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(()),
    }
}

fn alias_block(object: &Map<String, Value>) -> std::result::Result<Option<AliasRecord>, String> {
    let aliases = match object.get("aliases") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(a)) => a,
        Some(_) => return Err("aliases".to_string()),
    };
    let canonical =
        optional_string(aliases, "canonical").map_err(|_| "aliases.canonical".to_string())?;
    let custom = match aliases.get("custom") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "aliases.custom".to_string())?,
        Some(_) => return Err("aliases.custom".to_string()),
    };
    Ok(Some(AliasRecord { canonical, custom }))
}

/// Fixed-width RFC 3339 form: lexical order equals chronological order
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(record: &TicketRecord, field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TasklineError::MalformedData {
            field: field.to_string(),
            id: Some(record.id.clone()),
        })
}

/// Pure structural copy of a ticket into its persistence form
pub fn to_persistence(ticket: &Ticket) -> TicketRecord {
    TicketRecord {
        id: ticket.id.to_string(),
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        status: ticket.status.as_str().to_string(),
        priority: ticket.priority.as_str().to_string(),
        ticket_type: ticket.ticket_type.as_str().to_string(),
        aliases: ticket.aliases.as_ref().map(|a| AliasRecord {
            canonical: a.canonical.clone(),
            custom: a.custom.clone(),
        }),
        created_at: format_timestamp(&ticket.created_at),
        updated_at: format_timestamp(&ticket.updated_at),
    }
}

/// Rejects an update whose `updated_at` precedes the stored `created_at`
pub fn ensure_update_order(stored_created_at: &DateTime<Utc>, ticket: &Ticket) -> Result<()> {
    if ticket.updated_at < *stored_created_at {
        return Err(DomainError::TimestampOrder {
            created_at: format_timestamp(stored_created_at),
            updated_at: format_timestamp(&ticket.updated_at),
        }
        .into());
    }
    Ok(())
}

/// Converts a record back into a validated domain ticket
pub fn to_domain(record: &TicketRecord, operation: &'static str) -> Result<Ticket> {
    let created_at = parse_timestamp(record, "createdAt", &record.created_at)?;
    let updated_at = parse_timestamp(record, "updatedAt", &record.updated_at)?;

    let wrap = |source: DomainError| TasklineError::DomainReconstruction {
        id: record.id.clone(),
        operation,
        summary: record.summary(),
        source,
    };

    let id: TicketId = record
        .id
        .parse()
        .map_err(|_| wrap(DomainError::InvalidIdentifier(record.id.clone())))?;

    let status: TicketStatus = record.status.parse().map_err(wrap)?;
    let priority: Priority = record.priority.parse().map_err(wrap)?;
    let ticket_type: TicketType = record.ticket_type.parse().map_err(wrap)?;
    let aliases = record
        .aliases
        .as_ref()
        .map(|a| TicketAliases {
            canonical: a.canonical.clone(),
            custom: a.custom.clone(),
        });

    Ticket::restore(
        id,
        record.title.clone(),
        record.description.clone(),
        status,
        priority,
        ticket_type,
        aliases,
        created_at,
        updated_at,
    )
    .map_err(wrap)
}

/// Anything that can be fed to a bulk conversion
pub trait RawTicketRecord {
    /// Id of the record, if it can be read at all
    fn record_id(&self) -> Option<String>;

    fn to_domain(&self, operation: &'static str) -> Result<Ticket>;
}

impl RawTicketRecord for TicketRecord {
    fn record_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn to_domain(&self, operation: &'static str) -> Result<Ticket> {
        to_domain(self, operation)
    }
}

impl RawTicketRecord for Value {
    fn record_id(&self) -> Option<String> {
        self.get("id").and_then(Value::as_str).map(str::to_string)
    }

    fn to_domain(&self, operation: &'static str) -> Result<Ticket> {
        to_domain(&TicketRecord::from_value(self)?, operation)
    }
}

/// A record dropped during bulk conversion
#[derive(Debug)]
pub struct SkippedRecord {
    /// Record id, or "unknown" if it could not be read
    pub id: String,
    pub error: TasklineError,
}

/// Outcome of converting a batch of records
#[derive(Debug, Default)]
pub struct BatchConversion {
    pub tickets: Vec<Ticket>,
    pub skipped: Vec<SkippedRecord>,
}

impl BatchConversion {
    pub fn total(&self) -> usize {
        self.tickets.len() + self.skipped.len()
    }
}

/// Converts every record independently, keeping successes and failures apart
pub fn convert_batch<R: RawTicketRecord>(records: &[R], operation: &'static str) -> BatchConversion {
    records
        .iter()
        .fold(BatchConversion::default(), |mut acc, record| {
            match record.to_domain(operation) {
                Ok(ticket) => acc.tickets.push(ticket),
                Err(error) => acc.skipped.push(SkippedRecord {
                    id: record.record_id().unwrap_or_else(|| "unknown".to_string()),
                    error,
                }),
            }
            acc
        })
}

/// Converts a batch and applies the partial-failure policy
///
/// - every record of a non-empty batch failed: `AllRecordsInvalid`
/// - some failed: one warning per skipped record plus an aggregate warning
pub fn to_domain_list<R: RawTicketRecord>(
    records: &[R],
    operation: &'static str,
) -> Result<BatchConversion> {
    let conversion = convert_batch(records, operation);
    if conversion.tickets.is_empty() && !conversion.skipped.is_empty() {
        return Err(TasklineError::AllRecordsInvalid {
            operation,
            count: conversion.skipped.len(),
        });
    }

    if !conversion.skipped.is_empty() {
        for skipped in &conversion.skipped {
            warn!(
                record_id = %skipped.id,
                operation,
                error = %skipped.error,
                "Skipping invalid ticket record"
            );
        }
        warn!(
            operation,
            total = conversion.total(),
            loaded = conversion.tickets.len(),
            skipped = conversion.skipped.len(),
            "Loaded tickets with invalid records skipped"
        );
    }
    Ok(conversion)
}
