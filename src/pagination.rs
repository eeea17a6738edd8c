//! This modules defines the common functionality for paging data.

use serde::Deserialize;

/// The most records a client can ask for in one page.
pub const MAX_PAGE_SIZE: u64 = 100;

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The maximum number of records per page when not specified in a request.
    pub default_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 10,
        }
    }
}

/// The `page` and `limit` query parameters accepted by list endpoints.
///
/// Zero is treated the same as a missing value. Limits above [MAX_PAGE_SIZE] are reduced to it.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    /// The 1-based page number.
    pub page: Option<u64>,
    /// The number of records per page.
    pub limit: Option<u64>,
}

/// A resolved page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// The 1-based page number.
    pub number: u64,
    /// The number of records per page, between one and [MAX_PAGE_SIZE].
    pub limit: u64,
}

impl Page {
    /// Resolve the query parameters against the defaults in `config`.
    pub fn from_query(query: PageQuery, config: &PaginationConfig) -> Self {
        let number = query
            .page
            .filter(|&page| page > 0)
            .unwrap_or(config.default_page)
            .max(1);
        let limit = query
            .limit
            .filter(|&limit| limit > 0)
            .unwrap_or(config.default_page_size)
            .clamp(1, MAX_PAGE_SIZE);

        Self { number, limit }
    }

    /// The number of records to skip to get to this page.
    ///
    /// Pages past the largest offset SQLite accepts are capped to it, which gives an empty page.
    pub fn offset(&self) -> i64 {
        (self.number - 1)
            .checked_mul(self.limit)
            .and_then(|offset| i64::try_from(offset).ok())
            .unwrap_or(i64::MAX)
    }

    /// The page size as an SQL parameter.
    pub fn sql_limit(&self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }

    /// The number of pages needed to show `total` records.
    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}
