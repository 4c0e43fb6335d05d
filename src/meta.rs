//! Per-request list parameters: limit, offset, ordering, filters.

use crate::error::{ApiError, FieldErrors};
use crate::filter::{Filter, FilterClause};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

impl OrderKey {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderKey {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderKey {
            column: column.into(),
            descending: true,
        }
    }
}

/// Derived once per List request; never persisted. Only limit and offset
/// are echoed back in the response envelope.
#[derive(Clone, Debug, Serialize)]
pub struct ListMeta {
    pub limit: u32,
    pub offset: u32,
    #[serde(skip)]
    pub order: Vec<OrderKey>,
    #[serde(skip)]
    pub filters: Vec<FilterClause>,
}

impl ListMeta {
    /// Derive list parameters from raw query parameters against the
    /// resource's column whitelist. Unknown parameters are ignored; a
    /// recognized filter with an unparseable value is a field error.
    pub fn parse(
        params: &HashMap<String, String>,
        filters: &BTreeMap<String, Filter>,
        sortable: &[String],
        primary_key: &str,
        default_limit: u32,
    ) -> Result<Self, ApiError> {
        let limit = params
            .get("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_limit)
            .min(MAX_LIMIT);
        let offset = params
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let order = parse_order(
            params.get("order").map(String::as_str).unwrap_or(""),
            sortable,
            primary_key,
        );

        let mut clauses = Vec::new();
        let mut errors = FieldErrors::new();
        // BTreeMap iteration keeps filter order deterministic.
        for (name, filter) in filters {
            if let Some(raw) = params.get(name) {
                match filter.apply(raw) {
                    Ok(clause) => clauses.push(clause),
                    Err(msg) => errors.set(name.clone(), msg),
                }
            }
        }
        errors.into_result()?;

        Ok(ListMeta {
            limit,
            offset,
            order,
            filters: clauses,
        })
    }
}

/// Parse the `order` parameter: comma-separated column names, `-` prefix
/// for descending. Unrecognized columns are skipped; an empty result falls
/// back to the primary key ascending.
pub fn parse_order(raw: &str, sortable: &[String], primary_key: &str) -> Vec<OrderKey> {
    let mut order = Vec::new();
    for part in raw.split(',') {
        let (name, descending) = match part.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (part, false),
        };
        if sortable.iter().any(|s| s == name) {
            order.push(OrderKey {
                column: name.to_string(),
                descending,
            });
        }
    }
    if order.is_empty() {
        order.push(OrderKey::asc(primary_key));
    }
    order
}
