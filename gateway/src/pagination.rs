//! Shared pagination query params and response envelope (§6): `page >= 1`, `limit` clamped
//! to `[1, 200]`, default 50.

use serde::{Deserialize, Serialize};

use prompt_eval_core::repo::Page;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

impl PageQuery {
    /// Clamps caller-supplied values into the allowed range rather than rejecting them.
    pub fn normalized(&self) -> (i64, i64) {
        (self.page.max(1), self.limit.clamp(1, 200))
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            pages: page.pages(),
            items: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_page_one_limit_fifty() {
        let query: PageQuery = serde_json::from_str("{}").expect("empty object deserializes");
        assert_eq!(query.normalized(), (1, 50));
    }

    #[test]
    fn clamps_limit_above_two_hundred() {
        let query = PageQuery { page: 1, limit: 10_000 };
        assert_eq!(query.normalized(), (1, 200));
    }

    #[test]
    fn clamps_non_positive_page_and_limit() {
        let query = PageQuery { page: -5, limit: 0 };
        assert_eq!(query.normalized(), (1, 1));
    }

    #[test]
    fn page_response_computes_pages_from_total_and_limit() {
        let page = Page {
            items: vec![1, 2, 3],
            total: 25,
            page: 1,
            limit: 10,
        };
        let response: PageResponse<i32> = page.into();
        assert_eq!(response.pages, 3);
    }
}
