//! Filtered, paged invoice listing

use serde::{Deserialize, Serialize};

use crate::services::aggregator::Aggregator;
use crate::types::{EsgError, InvoiceRecord, Result};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest invoice first
    #[default]
    Desc,
    /// Oldest first; undated invoices lead
    Asc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceQuery {
    /// Free text matched against company, filename, tax invoice id and account
    pub q: Option<String>,
    /// Case-insensitive substring of the company name
    pub company: Option<String>,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
    pub sort: SortOrder,
}

impl Default for InvoiceQuery {
    fn default() -> Self {
        Self {
            q: None,
            company: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct QueryPage {
    pub items: Vec<InvoiceRecord>,
    /// Matches before paging
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn matches_text(record: &InvoiceRecord, needle: &str) -> bool {
    contains_ci(&record.company_name, needle)
        || contains_ci(&record.filename, needle)
        || record
            .tax_invoice_id
            .as_deref()
            .is_some_and(|id| contains_ci(id, needle))
        || record
            .account_number
            .as_deref()
            .is_some_and(|acct| contains_ci(acct, needle))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

pub fn query(records: &[InvoiceRecord], query: &InvoiceQuery) -> Result<QueryPage> {
    if query.page == 0 {
        return Err(EsgError::Query("page must be 1 or greater".into()));
    }
    if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
        return Err(EsgError::Query(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let company = non_blank(&query.company);
    let needle = non_blank(&query.q);

    let ordered: Vec<usize> = match query.sort {
        SortOrder::Desc => Aggregator::latest_indices(records),
        SortOrder::Asc => {
            let mut indices: Vec<usize> = (0..records.len()).collect();
            indices.sort_by_key(|&i| records[i].invoice_date.unwrap_or_default());
            indices
        }
    };

    let matched: Vec<&InvoiceRecord> = ordered
        .into_iter()
        .map(|i| &records[i])
        .filter(|r| {
            company
                .as_deref()
                .map_or(true, |c| contains_ci(&r.company_name, c))
        })
        .filter(|r| needle.as_deref().map_or(true, |n| matches_text(r, n)))
        .collect();

    let total = matched.len();
    let items = matched
        .into_iter()
        .skip((query.page - 1).saturating_mul(query.page_size))
        .take(query.page_size)
        .cloned()
        .collect();

    Ok(QueryPage {
        items,
        total,
        page: query.page,
        page_size: query.page_size,
    })
}
