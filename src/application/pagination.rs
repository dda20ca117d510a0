//! Page-number pagination shared by every post listing.
//!
//! Requested numbers never fail: anything unparsable lands on the first page
//! and numbers past either end are clamped to the nearest existing page.

use std::num::NonZeroU32;

use serde::Serialize;

/// Posts shown per listing page.
pub const POSTS_PER_PAGE: NonZeroU32 = match NonZeroU32::new(10) {
    Some(value) => value,
    None => panic!("page size must be non-zero"),
};

/// One-based page number as requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(NonZeroU32::MIN);

    /// Interpret the raw `page` query value; missing or non-numeric input is page 1.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::FIRST;
        };

        match raw.parse::<i64>() {
            Ok(value) if value < 1 => Self::FIRST,
            Ok(value) => Self::new(u32::try_from(value).unwrap_or(u32::MAX)),
            Err(_) => Self::FIRST,
        }
    }

    /// Build a page number, treating zero as the first page.
    pub fn new(value: u32) -> Self {
        NonZeroU32::new(value).map_or(Self::FIRST, Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Offset/limit pair handed to repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub offset: u64,
    pub limit: u32,
}

/// Result of clamping a requested page against the size of the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
    pub per_page: u32,
}

impl PageWindow {
    pub fn resolve(requested: PageNumber, total: u64, per_page: NonZeroU32) -> Self {
        let per_page = per_page.get();
        let pages = total.div_ceil(u64::from(per_page)).max(1);
        let num_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        let number = requested.get().min(num_pages);

        Self {
            number,
            num_pages,
            total,
            per_page,
        }
    }

    pub fn slice(&self) -> PageSlice {
        PageSlice {
            offset: u64::from(self.number - 1) * u64::from(self.per_page),
            limit: self.per_page,
        }
    }

    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
        }
    }
}

/// A single page of results together with its position in the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> Option<u32> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<u32> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_items_split_into_ten_and_three() {
        let first = PageWindow::resolve(PageNumber::FIRST, 13, POSTS_PER_PAGE);
        assert_eq!(first.num_pages, 2);
        assert_eq!(first.slice(), PageSlice { offset: 0, limit: 10 });

        let second = PageWindow::resolve(PageNumber::new(2), 13, POSTS_PER_PAGE);
        assert_eq!(second.number, 2);
        assert_eq!(second.slice().offset, 10);
    }

    #[test]
    fn overflow_clamps_to_last_page() {
        let window = PageWindow::resolve(PageNumber::new(99), 13, POSTS_PER_PAGE);
        assert_eq!(window.number, 2);
    }

    #[test]
    fn empty_listing_has_single_page() {
        let window = PageWindow::resolve(PageNumber::new(3), 0, POSTS_PER_PAGE);
        assert_eq!(window.number, 1);
        assert_eq!(window.num_pages, 1);
        assert_eq!(window.slice().offset, 0);
    }

    #[test]
    fn parse_falls_back_to_first_page() {
        assert_eq!(PageNumber::parse(None), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some("")), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some("abc")), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some("0")), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some("-4")), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some(" 2 ")).get(), 2);
        assert_eq!(PageNumber::parse(Some("99999999999")).get(), u32::MAX);
    }

    #[test]
    fn page_navigation_flags() {
        let page = PageWindow::resolve(PageNumber::new(2), 25, POSTS_PER_PAGE).into_page(vec![1]);
        assert!(page.has_previous());
        assert!(page.has_next());
        assert_eq!(page.previous_number(), Some(1));
        assert_eq!(page.next_number(), Some(3));
    }
}
