use crate::error::{Error, Result};

pub const APPLICATIONS_PAGE_LIMIT: usize = 50;
pub const POLICIES_PAGE_LIMIT: usize = 50;

// Hard stop for servers that keep returning full pages with no total.
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<usize>) -> Self {
        Self { items, total }
    }
}

// Walk an offset/limit listing until a short page or the reported total.
pub fn collect_pages<T>(
    limit: usize,
    mut fetch: impl FnMut(usize, usize) -> Result<Page<T>>,
) -> Result<Vec<T>> {
    if limit == 0 {
        return Err(Error::msg("page limit must be greater than zero"));
    }
    let mut out = Vec::new();
    let mut offset = 0usize;
    for _ in 0..MAX_PAGES {
        let page = fetch(offset, limit)?;
        let count = page.items.len();
        out.extend(page.items);
        let short = count < limit;
        let reached_total = page.total.is_some_and(|t| offset + count >= t);
        if short || reached_total {
            return Ok(out);
        }
        offset += limit;
    }
    Err(Error::fetch(format!(
        "listing did not terminate after {MAX_PAGES} pages"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(all: &[u32], total: Option<usize>) -> impl FnMut(usize, usize) -> Result<Page<u32>> + '_ {
        move |offset, limit| {
            let end = (offset + limit).min(all.len());
            let items = all.get(offset..end).unwrap_or_default().to_vec();
            Ok(Page::new(items, total))
        }
    }

    #[test]
    fn stops_on_short_page() {
        let all = (0..7).collect::<Vec<_>>();
        let mut calls = 0;
        let mut inner = paged(&all, None);
        let got = collect_pages(3, |o, l| {
            calls += 1;
            inner(o, l)
        })
        .expect("pages");
        assert_eq!(got, all);
        assert_eq!(calls, 3);
    }

    #[test]
    fn stops_on_reported_total_without_extra_request() {
        let all = (0..6).collect::<Vec<_>>();
        let mut calls = 0;
        let mut inner = paged(&all, Some(6));
        let got = collect_pages(3, |o, l| {
            calls += 1;
            inner(o, l)
        })
        .expect("pages");
        assert_eq!(got.len(), 6);
        assert_eq!(calls, 2);
    }

    #[test]
    fn exact_multiple_without_total_needs_one_empty_page() {
        let all = (0..6).collect::<Vec<_>>();
        let mut offsets = Vec::new();
        let mut inner = paged(&all, None);
        collect_pages(3, |o, l| {
            offsets.push(o);
            inner(o, l)
        })
        .expect("pages");
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn fetch_error_aborts() {
        let err = collect_pages::<u32>(5, |_, _| Err(Error::fetch("boom"))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Fetch);
    }
}
