use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// Offset-based pagination parameters for list queries.
/// Both page and limit are optional; when neither is provided the query
/// returns all rows.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(crate = "rocket::serde")]
pub struct PaginationParams {
    /// Page number (1-indexed). When None, returns all results.
    pub page: Option<i64>,
    /// Number of items per page. When None, uses default or returns all.
    pub limit: Option<i64>,
}

impl PaginationParams {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Self {
        Self { page, limit }
    }

    /// SQL OFFSET derived from page and the effective (capped) limit so page
    /// boundaries stay consistent.
    pub fn offset(&self) -> Option<i64> {
        if let Some(effective_limit) = self.effective_limit() {
            let page = self.page.unwrap_or(1).max(1);
            Some((page - 1) * effective_limit)
        } else {
            None
        }
    }

    pub fn effective_limit(&self) -> Option<i64> {
        match self.limit {
            Some(limit) => Some(limit.clamp(1, Self::MAX_LIMIT)),
            None if self.page.is_some() => Some(Self::DEFAULT_LIMIT),
            None => None, // No pagination when both are None
        }
    }
}

/// Paginated response wrapper with metadata
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(crate = "rocket::serde")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    /// Current page number (1-indexed)
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total_items: i64) -> Self {
        let limit = params.effective_limit().unwrap_or(total_items.max(1));
        let page = params.page.unwrap_or(1).max(1);
        let total_pages = if limit > 0 { (total_items + limit - 1) / limit } else { 1 };

        Self {
            data,
            page,
            limit,
            total_items,
            total_pages,
        }
    }
}
