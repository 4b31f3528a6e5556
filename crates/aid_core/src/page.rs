use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Clamped page/limit pair. Construct through `clamped` so out-of-range
/// client input can never produce a zero or unbounded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp raw client values: page below 1 becomes 1, limit is forced
    /// into `1..=max_limit`.
    pub fn clamped(page: i64, limit: i64, max_limit: u32) -> Self {
        let page = page.max(1).min(u32::MAX as i64) as u32;
        let limit = limit.clamp(1, max_limit as i64) as u32;
        Self { page, limit }
    }

    pub fn skip(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Pagination metadata computed from the total count under the same
/// predicate as the items, so `pages` is always consistent with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: &PageRequest) -> Self {
        Self {
            total,
            page: page.page,
            limit: page.limit,
            pages: total.div_ceil(page.limit as u64),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}
