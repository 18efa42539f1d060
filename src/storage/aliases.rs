//! Alias lookups shared by the backends that keep aliases.

use crate::{
    domain::Ticket,
    error::{Result, TasklineError},
};
use std::collections::BTreeSet;

/// Ticket owning `alias` (canonical or custom, case-insensitive)
pub fn find_alias_owner<'a, I>(tickets: I, alias: &str) -> Option<&'a Ticket>
where
    I: IntoIterator<Item = &'a Ticket>,
{
    tickets.into_iter().find(|t| t.has_alias(alias))
}

/// Fails if any alias of `candidate` already belongs to a different ticket
pub fn ensure_aliases_available<'a, I>(tickets: I, candidate: &Ticket) -> Result<()>
where
    I: IntoIterator<Item = &'a Ticket>,
{
    let aliases = candidate.alias_list();
    if aliases.is_empty() {
        return Ok(());
    }
    for other in tickets.into_iter().filter(|t| t.id != candidate.id) {
        if let Some(alias) = aliases.iter().find(|a| other.has_alias(a)) {
            return Err(TasklineError::AliasConflict {
                alias: alias.to_string(),
                owner: other.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Every alias in use, deduplicated and sorted
pub fn collect_aliases<'a, I>(tickets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Ticket>,
{
    tickets
        .into_iter()
        .flat_map(|t| t.alias_list())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
