//! Offset pagination shared by every listing.

use serde::{Deserialize, Serialize};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 15;

/// Upper bound on page size.
pub const MAX_PAGE_SIZE: u32 = 50;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request with the default bounds (15 per page, capped at 50).
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self::bounded(page, limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Build a request with explicit default/maximum page sizes.
    ///
    /// Page numbers below 1 become 1; a zero limit falls back to the default.
    pub fn bounded(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = match limit {
            Some(0) | None => default_limit,
            Some(l) => l,
        };
        Self {
            page,
            limit: limit.min(max_limit.max(1)),
        }
    }

    /// A single page large enough to hold `limit` rows.
    pub fn first(limit: u32) -> Self {
        Self {
            page: 1,
            limit: limit.max(1),
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub prev_page: u32,
    pub next_page: u32,
}

impl Pagination {
    pub fn new(request: PageRequest, total_items: u64) -> Self {
        let limit = u64::from(request.limit.max(1));
        let total_pages = u32::try_from(total_items.div_ceil(limit)).unwrap_or(u32::MAX);
        Self {
            current_page: request.page,
            total_pages,
            total_items,
            prev_page: request.page.saturating_sub(1).max(1),
            next_page: request.page.saturating_add(1).min(total_pages),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            pagination: Pagination::new(request, total_items),
        }
    }

    /// Slice an already-filtered, already-ordered collection.
    pub fn from_slice(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.limit as usize)
            .collect();
        Self::new(items, request, total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
