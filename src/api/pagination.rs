//! Pagination headers returned by list endpoints

use reqwest::header::HeaderMap;

pub const PAGE_HEADER: &str = "x-pagination-page";
pub const LIMIT_HEADER: &str = "x-pagination-limit";
pub const PAGE_COUNT_HEADER: &str = "x-pagination-page-count";
pub const ITEM_COUNT_HEADER: &str = "x-pagination-item-count";

/// Position of a page within a paginated listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub page_count: u32,
    pub item_count: u32,
}

impl Pagination {
    /// Read the pagination headers; `None` when the endpoint is not paginated
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let page = header_u32(headers, PAGE_HEADER)?;
        Some(Self {
            page,
            limit: header_u32(headers, LIMIT_HEADER).unwrap_or(0),
            page_count: header_u32(headers, PAGE_COUNT_HEADER).unwrap_or(page),
            item_count: header_u32(headers, ITEM_COUNT_HEADER).unwrap_or(0),
        })
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// One page of results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

impl<T> Page<T> {
    pub fn next_page(&self) -> Option<u32> {
        self.pagination
            .filter(Pagination::has_next)
            .map(|p| p.page + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_full_pagination_headers() {
        let map = headers(&[
            (PAGE_HEADER, "2"),
            (LIMIT_HEADER, "10"),
            (PAGE_COUNT_HEADER, "5"),
            (ITEM_COUNT_HEADER, "48"),
        ]);
        let pagination = Pagination::from_headers(&map).unwrap();
        assert_eq!(
            pagination,
            Pagination { page: 2, limit: 10, page_count: 5, item_count: 48 }
        );
        assert!(pagination.has_next());
    }

    #[test]
    fn test_missing_headers() {
        assert_eq!(Pagination::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_garbage_page_header() {
        let map = headers(&[(PAGE_HEADER, "two")]);
        assert_eq!(Pagination::from_headers(&map), None);
    }

    #[test]
    fn test_last_page_has_no_next() {
        let map = headers(&[(PAGE_HEADER, "3"), (PAGE_COUNT_HEADER, "3")]);
        let page = Page::<()> { items: vec![], pagination: Pagination::from_headers(&map) };
        assert_eq!(page.next_page(), None);
    }
}
