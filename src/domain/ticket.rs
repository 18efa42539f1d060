use crate::error::{DomainError, TasklineError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Crockford base32 alphabet used by sortable identifiers.
pub const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const TICKET_ID_LENGTH: usize = 26;
/// Leading characters of a ticket id that encode its creation time
pub const TIMESTAMP_LENGTH: usize = 10;
pub const TITLE_MAX_LENGTH: usize = 200;
pub const DESCRIPTION_MAX_LENGTH: usize = 10_000;
pub const ALIAS_MAX_LENGTH: usize = 64;

/// Sortable unique identifier of a ticket (26 Crockford base32 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    /// Returns the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the trailing random segment (the last 16 characters)
    pub fn random_segment(&self) -> &str {
        &self.0[TIMESTAMP_LENGTH..]
    }
}

impl FromStr for TicketId {
    type Err = TasklineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Crockford base32 is case-insensitive; store the upper-case form
        let normalized = s.trim().to_ascii_uppercase();
        if normalized.len() != TICKET_ID_LENGTH
            || !normalized.bytes().all(|b| CROCKFORD_ALPHABET.contains(&b))
        {
            return Err(TasklineError::InvalidTicketId(s.to_string()));
        }
        // The leading character carries only 3 bits of the 48-bit timestamp
        if normalized.as_bytes()[0] > b'7' {
            return Err(TasklineError::InvalidTicketId(s.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for TicketId {
    type Error = TasklineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! wire_enum {
    ($name:ident, $field:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Every declared value, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the wire representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(DomainError::InvalidEnumValue {
                        field: $field,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle status of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Completed,
    Archived,
}

wire_enum!(TicketStatus, "status", {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Archived => "archived",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

wire_enum!(Priority, "priority", {
    High => "high",
    Medium => "medium",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Feature,
    Bug,
    Task,
}

wire_enum!(TicketType, "type", {
    Feature => "feature",
    Bug => "bug",
    Task => "task",
});

/// Validates alias syntax and returns the normalized (lower-case) form
pub fn normalize_alias(alias: &str) -> Result<String, DomainError> {
    let trimmed = alias.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidAlias {
            alias: alias.to_string(),
            reason: "alias must not be empty".to_string(),
        });
    }
    if trimmed.chars().count() > ALIAS_MAX_LENGTH {
        return Err(DomainError::InvalidAlias {
            alias: alias.to_string(),
            reason: format!("alias exceeds {} characters", ALIAS_MAX_LENGTH),
        });
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(DomainError::InvalidAlias {
            alias: alias.to_string(),
            reason: format!("character '{}' is not allowed", bad),
        });
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Aliases attached to a ticket: at most one canonical plus an ordered set of custom ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAliases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default)]
    pub custom: Vec<String>,
}

impl TicketAliases {
    /// Builds a validated alias set, normalizing every entry to lower case
    pub fn new(canonical: Option<String>, custom: Vec<String>) -> Result<Self, DomainError> {
        let mut aliases = Self {
            canonical: canonical.as_deref().map(normalize_alias).transpose()?,
            custom: Vec::with_capacity(custom.len()),
        };
        for alias in custom {
            aliases.push_custom(&alias)?;
        }
        Ok(aliases)
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_none() && self.custom.is_empty()
    }

    /// Iterates over canonical then custom aliases
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.canonical
            .iter()
            .chain(self.custom.iter())
            .map(String::as_str)
    }

    /// Case-insensitive membership test
    pub fn contains(&self, alias: &str) -> bool {
        self.iter().any(|a| a.eq_ignore_ascii_case(alias.trim()))
    }

    fn push_custom(&mut self, alias: &str) -> Result<(), DomainError> {
        let normalized = normalize_alias(alias)?;
        if self.contains(&normalized) {
            return Err(DomainError::DuplicateAlias(normalized));
        }
        self.custom.push(normalized);
        Ok(())
    }
}

/// A persisted unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<TicketAliases>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a new pending ticket
    pub fn new(
        id: TicketId,
        title: impl Into<String>,
        ticket_type: TicketType,
        priority: Priority,
    ) -> Result<Self, DomainError> {
        let title = title.into();
        validate_title(&title)?;
        let now = Utc::now();
        Ok(Self {
            id,
            title,
            description: None,
            status: TicketStatus::Pending,
            priority,
            ticket_type,
            aliases: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds a ticket from stored parts, re-running every validation
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: TicketId,
        title: String,
        description: Option<String>,
        status: TicketStatus,
        priority: Priority,
        ticket_type: TicketType,
        aliases: Option<TicketAliases>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_title(&title)?;
        if let Some(description) = &description {
            validate_description(description)?;
        }
        if updated_at < created_at {
            return Err(DomainError::TimestampOrder {
                created_at: created_at.to_rfc3339(),
                updated_at: updated_at.to_rfc3339(),
            });
        }
        let aliases = match aliases {
            Some(a) => {
                let a = TicketAliases::new(a.canonical, a.custom)?;
                (!a.is_empty()).then_some(a)
            }
            None => None,
        };
        Ok(Self {
            id,
            title,
            description,
            status,
            priority,
            ticket_type,
            aliases,
            created_at,
            updated_at,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self, DomainError> {
        self.set_description(Some(description.into()))?;
        Ok(self)
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), DomainError> {
        let title = title.into();
        validate_title(&title)?;
        self.title = title;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) -> Result<(), DomainError> {
        if let Some(d) = &description {
            validate_description(d)?;
        }
        self.description = description;
        self.touch();
        Ok(())
    }

    /// Changes the status. Transition rules belong to the calling use case.
    pub fn set_status(&mut self, status: TicketStatus) {
        self.status = status;
        self.touch();
    }

    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
        self.touch();
    }

    pub fn set_type(&mut self, ticket_type: TicketType) {
        self.ticket_type = ticket_type;
        self.touch();
    }

    /// Sets or replaces the canonical alias
    pub fn set_canonical_alias(&mut self, alias: &str) -> Result<(), DomainError> {
        let normalized = normalize_alias(alias)?;
        let aliases = self.aliases.get_or_insert_with(TicketAliases::default);
        if aliases.custom.iter().any(|a| *a == normalized) {
            return Err(DomainError::DuplicateAlias(normalized));
        }
        aliases.canonical = Some(normalized);
        self.touch();
        Ok(())
    }

    pub fn add_custom_alias(&mut self, alias: &str) -> Result<(), DomainError> {
        self.aliases
            .get_or_insert_with(TicketAliases::default)
            .push_custom(alias)?;
        self.touch();
        Ok(())
    }

    /// Removes an alias (canonical or custom), matched case-insensitively
    pub fn remove_alias(&mut self, alias: &str) -> Result<(), DomainError> {
        let target = alias.trim().to_ascii_lowercase();
        let aliases = self
            .aliases
            .as_mut()
            .filter(|a| a.contains(&target))
            .ok_or_else(|| DomainError::AliasNotFound(alias.to_string()))?;

        if aliases.canonical.as_deref() == Some(target.as_str()) {
            aliases.canonical = None;
        } else {
            aliases.custom.retain(|a| *a != target);
        }
        if aliases.is_empty() {
            self.aliases = None;
        }
        self.touch();
        Ok(())
    }

    /// All aliases of this ticket, canonical first
    pub fn alias_list(&self) -> Vec<&str> {
        self.aliases.iter().flat_map(|a| a.iter()).collect()
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.as_ref().is_some_and(|a| a.contains(alias))
    }

    // Always strictly advances, even if the clock has not moved since the last change
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::nanoseconds(1)
        };
    }
}

fn validate_title(title: &str) -> Result<(), DomainError> {
    let length = title.trim().chars().count();
    if length == 0 {
        return Err(DomainError::EmptyTitle);
    }
    if length > TITLE_MAX_LENGTH {
        return Err(DomainError::TitleTooLong {
            length,
            max: TITLE_MAX_LENGTH,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), DomainError> {
    let length = description.chars().count();
    if length > DESCRIPTION_MAX_LENGTH {
        return Err(DomainError::DescriptionTooLong {
            length,
            max: DESCRIPTION_MAX_LENGTH,
        });
    }
    Ok(())
}
