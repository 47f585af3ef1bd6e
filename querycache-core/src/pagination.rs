//! Pagination context: where "the current page" comes from.
//!
//! The context is always passed explicitly. A connection binds one, and
//! rebinding it (e.g. per incoming request) yields a new connection.

use std::collections::BTreeMap;

/// Supplies the active page number for pagination calls without an explicit page.
pub trait PaginationContext: Send + Sync {
    /// The current page for the given page parameter name, if any.
    fn current_page(&self, page_name: &str) -> Option<u64>;
}

/// No ambient page; pagination defaults to page 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPagination;

impl PaginationContext for NoPagination {
    fn current_page(&self, _page_name: &str) -> Option<u64> {
        None
    }
}

/// A fixed page, regardless of parameter name.
#[derive(Debug, Clone, Copy)]
pub struct FixedPage(pub u64);

impl PaginationContext for FixedPage {
    fn current_page(&self, _page_name: &str) -> Option<u64> {
        Some(self.0)
    }
}

/// Query-string parameters of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    params: BTreeMap<String, String>,
}

impl RequestParams {
    /// Parse `a=1&page=2` style query strings. A leading `?` is ignored.
    ///
    /// Later occurrences of a parameter win. Percent-decoding is not applied;
    /// page numbers never need it.
    pub fn parse(query: &str) -> Self {
        let params = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { params }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl PaginationContext for RequestParams {
    /// Non-numeric or zero page values are ignored.
    fn current_page(&self, page_name: &str) -> Option<u64> {
        self.get(page_name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|page| *page >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_params_current_page() {
        let params = RequestParams::parse("?sort=name&page=2");
        assert_eq!(params.current_page("page"), Some(2));
        assert_eq!(params.current_page("users_page"), None);
    }

    #[test]
    fn test_request_params_ignores_invalid_pages() {
        assert_eq!(RequestParams::parse("page=abc").current_page("page"), None);
        assert_eq!(RequestParams::parse("page=0").current_page("page"), None);
        assert_eq!(RequestParams::parse("page=-1").current_page("page"), None);
    }

    #[test]
    fn test_custom_page_name() {
        let params = RequestParams::default().with("comments_page", "4");
        assert_eq!(params.current_page("comments_page"), Some(4));
    }

    #[test]
    fn test_fixed_and_none() {
        assert_eq!(FixedPage(5).current_page("page"), Some(5));
        assert_eq!(NoPagination.current_page("page"), None);
    }
}
