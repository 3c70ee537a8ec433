//! Paging for transfer history queries.

use serde::{Deserialize, Serialize};

/// Largest page a caller may request; larger values are clamped.
pub const MAX_PER_PAGE: u32 = 100;

/// Request parameters for a page of results.
///
/// Pages are 1-indexed. Page 0 is read as page 1 and `per_page` is clamped
/// to `1..=MAX_PER_PAGE` by [`PageRequest::offset`] and [`PageRequest::limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Number of items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

const fn default_page() -> u32 {
    1
}

const fn default_per_page() -> u32 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(default_page(), default_per_page())
    }
}

impl PageRequest {
    /// Creates a request for one page.
    #[must_use]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Effective page number.
    #[must_use]
    pub const fn page_number(&self) -> u32 {
        if self.page == 0 { 1 } else { self.page }
    }

    /// Effective page size.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    /// Number of rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number() - 1) * u64::from(self.page_size())
    }

    /// Number of rows to return.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size())
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// The items in the current page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Effective page number.
    pub page: u32,
    /// Effective page size.
    pub per_page: u32,
    /// Total number of items across all pages.
    pub total: u64,
    /// Total number of pages, at least 1.
    pub total_pages: u32,
    /// Whether a later page exists.
    pub has_more: bool,
}

impl<T> PageResponse<T> {
    /// Wraps one page of `data` fetched for `request` out of `total` items.
    #[must_use]
    pub fn new(data: Vec<T>, request: &PageRequest, total: u64) -> Self {
        let page = request.page_number();
        let per_page = request.page_size();
        let total_pages = u32::try_from(total.div_ceil(u64::from(per_page)))
            .unwrap_or(u32::MAX)
            .max(1);

        Self {
            data,
            meta: PageMeta {
                page,
                per_page,
                total,
                total_pages,
                has_more: page < total_pages,
            },
        }
    }
}
