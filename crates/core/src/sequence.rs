//! Lazy, pull-based iteration over paginated collections.
//!
//! A [`Sequence`] fetches one page at a time through a page loader and hands
//! items out one by one. A short page (fewer items than requested) marks the
//! end of the collection. Once exhausted, or after the loader failed, the
//! sequence is finished and keeps answering `Ok(None)`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use crate::errors::GitHubError;

/// Page size used when none is configured.
pub const DEFAULT_PER_PAGE: usize = 100;

/// Coordinates of one page. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub per_page: usize,
}

impl Page {
    pub fn first(per_page: usize) -> Self {
        Self {
            number: 1,
            per_page: per_page.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            number: self.number + 1,
            ..self
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(DEFAULT_PER_PAGE)
    }
}

/// Future returned by a page loader.
pub type PageFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<Vec<T>, E>> + Send + 'a>>;

type Loader<'a, T, E> = Box<dyn FnMut(Page) -> PageFuture<'a, T, E> + Send + 'a>;
type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + Send + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Exhausted,
    Failed,
}

pub struct Sequence<'a, T, E = GitHubError> {
    loader: Loader<'a, T, E>,
    page: Page,
    buffer: VecDeque<T>,
    filters: Vec<Predicate<'a, T>>,
    state: State,
}

impl<'a, T: Send + 'a, E> Sequence<'a, T, E> {
    pub fn new<F>(per_page: usize, loader: F) -> Self
    where
        F: FnMut(Page) -> PageFuture<'a, T, E> + Send + 'a,
    {
        Self {
            loader: Box::new(loader),
            page: Page::first(per_page),
            buffer: VecDeque::new(),
            filters: Vec::new(),
            state: State::Active,
        }
    }

    /// Keep only the items matching `predicate`. Filters stack.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + 'a,
    {
        self.filters.push(Box::new(predicate));
        self
    }

    /// Next item, fetching another page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<T>, E> {
        loop {
            while let Some(item) = self.buffer.pop_front() {
                if self.filters.iter().all(|keep| keep(&item)) {
                    return Ok(Some(item));
                }
            }
            if self.state != State::Active {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the remaining items.
    pub async fn collect_all(mut self) -> Result<Vec<T>, E> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    pub fn is_finished(&self) -> bool {
        self.state != State::Active && self.buffer.is_empty()
    }

    async fn fetch_page(&mut self) -> Result<(), E> {
        let page = self.page;
        match (self.loader)(page).await {
            Ok(batch) => {
                if batch.len() < page.per_page {
                    self.state = State::Exhausted;
                }
                self.page = page.next();
                self.buffer.extend(batch);
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }
}

impl<T, E> std::fmt::Debug for Sequence<'_, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("page", &self.page)
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Sequence over `0..total`, counting loader calls.
    fn numbers(total: usize, per_page: usize, calls: Arc<AtomicUsize>) -> Sequence<'static, usize, String> {
        Sequence::new(per_page, move |page: Page| {
            calls.fetch_add(1, Ordering::SeqCst);
            let start = (page.number as usize - 1) * page.per_page;
            let end = (start + page.per_page).min(total);
            let batch: Vec<usize> = (start.min(end)..end).collect();
            Box::pin(async move { Ok(batch) })
        })
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut seq = numbers(10, 3, calls.clone());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(seq.next().await.unwrap(), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seq.next().await.unwrap(), Some(1));
        assert_eq!(seq.next().await.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seq.next().await.unwrap(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_page_ends_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let all = numbers(7, 3, calls.clone()).collect_all().await.unwrap();
        assert_eq!(all, (0..7).collect::<Vec<_>>());
        // 3 + 3 + 1: the short third page ends it.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut seq = numbers(6, 3, calls.clone());
        let mut seen = Vec::new();
        while let Some(n) = seq.next().await.unwrap() {
            seen.push(n);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(seq.is_finished());
        assert_eq!(seq.next().await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_filters_stack() {
        let calls = Arc::new(AtomicUsize::new(0));
        let evens_over_four = numbers(12, 5, calls)
            .filter(|n| n % 2 == 0)
            .filter(|n| *n > 4)
            .collect_all()
            .await
            .unwrap();
        assert_eq!(evens_over_four, vec![6, 8, 10]);
    }

    #[tokio::test]
    async fn test_error_finishes_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut seq: Sequence<'static, u32, String> = Sequence::new(2, move |page: Page| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if page.number == 1 {
                    Ok(vec![1, 2])
                } else {
                    Err("boom".to_string())
                }
            })
        });

        assert_eq!(seq.next().await.unwrap(), Some(1));
        assert_eq!(seq.next().await.unwrap(), Some(2));
        assert_eq!(seq.next().await, Err("boom".to_string()));
        assert_eq!(seq.next().await, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_page_defaults() {
        let page = Page::default();
        assert_eq!(page.number, 1);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(Page::first(0).per_page, 1);
        assert_eq!(page.next().number, 2);
    }
}
