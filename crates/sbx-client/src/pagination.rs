//! # Paged Find
//!
//! Loads every page of a find. Page 1 is loaded alone because it carries
//! `total_pages`; pages `2..=total_pages` then load concurrently, a fixed
//! number of workers at a time, each next page spawned as a slot frees up.
//! All spawned loads are joined before the merge, and the merge is done by
//! this task alone once the join set is drained.

use std::sync::Arc;

use sbx_core::{Error, Result};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::codec::PageResponse;

/// Source of find pages, numbered from 1.
#[async_trait::async_trait]
pub trait PageLoader: Send + Sync + 'static {
    async fn load_page(&self, page: u32) -> Result<PageResponse>;
}

/// Merged outcome of a paged find: every row that loaded, plus the failure
/// that stopped it from being complete, if any.
#[derive(Debug, Default)]
pub struct LoadAll {
    pub rows: Vec<Value>,
    pub error: Option<Error>,
}

impl LoadAll {
    fn failed(error: Error) -> Self {
        Self {
            rows: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Rows if every page loaded, the error otherwise.
    pub fn into_result(self) -> Result<Vec<Value>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.rows),
        }
    }
}

/// Turn a page response into its rows. `success == false` is a server error.
fn page_rows(page: u32, response: PageResponse) -> Result<Vec<Value>> {
    if !response.success {
        return Err(Error::Server(response.error));
    }
    match response.results {
        Some(rows) => Ok(rows),
        None => {
            tracing::debug!("page {} has no results", page);
            Ok(Vec::new())
        }
    }
}

/// Load every page through `loader`, running at most `max_concurrency`
/// loads at once.
pub async fn load_all<L: PageLoader + ?Sized>(loader: Arc<L>, max_concurrency: usize) -> LoadAll {
    let first = match loader.load_page(1).await {
        Ok(first) => first,
        Err(e) => {
            tracing::warn!("page 1 failed: {}", e);
            return LoadAll::failed(e);
        }
    };

    if !first.success {
        tracing::warn!("page 1 rejected: {}", first.error.as_deref().unwrap_or("no message"));
        return LoadAll::failed(Error::Server(first.error));
    }
    let (Some(total_pages), Some(mut rows)) = (first.total_pages, first.results) else {
        return LoadAll::failed(Error::Decode(
            "first page is missing total_pages or results".into(),
        ));
    };

    if total_pages <= 1 {
        return LoadAll { rows, error: None };
    }

    let remaining = usize::try_from(total_pages - 1).unwrap_or(usize::MAX);
    let workers = max_concurrency.clamp(1, remaining);
    tracing::debug!("loading pages 2..={} with {} workers", total_pages, workers);

    // A page is only spawned once a worker slot is free.
    let mut pending = 2..=total_pages;
    let mut tasks = JoinSet::new();
    for page in pending.by_ref().take(workers) {
        spawn_page(&mut tasks, &loader, page);
    }

    let mut loaded = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Some(page) = pending.next() {
            spawn_page(&mut tasks, &loader, page);
        }
        match joined {
            Ok((page, Ok(chunk))) => loaded.push((page, chunk)),
            Ok((page, Err(e))) => {
                tracing::warn!("page {} failed: {}", page, e);
                failures.push((page, e));
            }
            Err(e) => {
                tracing::warn!("page task failed: {}", e);
                failures.push((u32::MAX, Error::transport(format!("page task failed: {}", e))));
            }
        }
    }

    loaded.sort_by_key(|(page, _)| *page);
    for (_, chunk) in loaded {
        rows.extend(chunk);
    }

    let error = failures
        .into_iter()
        .min_by_key(|(page, _)| *page)
        .map(|(_, e)| e);

    LoadAll { rows, error }
}

fn spawn_page<L: PageLoader + ?Sized>(
    tasks: &mut JoinSet<(u32, Result<Vec<Value>>)>,
    loader: &Arc<L>,
    page: u32,
) {
    let loader = Arc::clone(loader);
    tasks.spawn(async move {
        let result = loader.load_page(page).await.and_then(|r| page_rows(page, r));
        (page, result)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    enum Canned {
        Page(PageResponse),
        Fail(Error),
    }

    struct MockLoader {
        pages: HashMap<u32, (Canned, u64)>,
        requested: Mutex<Vec<u32>>,
        finished: Mutex<Vec<u32>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockLoader {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                requested: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn page(mut self, n: u32, total: u32, rows: Vec<Value>, delay_ms: u64) -> Self {
            let response = PageResponse {
                success: true,
                error: None,
                results: Some(rows),
                total_pages: Some(total),
            };
            self.pages.insert(n, (Canned::Page(response), delay_ms));
            self
        }

        fn raw(mut self, n: u32, response: PageResponse) -> Self {
            self.pages.insert(n, (Canned::Page(response), 0));
            self
        }

        fn fail(mut self, n: u32, error: Error, delay_ms: u64) -> Self {
            self.pages.insert(n, (Canned::Fail(error), delay_ms));
            self
        }
    }

    #[async_trait::async_trait]
    impl PageLoader for MockLoader {
        async fn load_page(&self, page: u32) -> Result<PageResponse> {
            self.requested.lock().unwrap().push(page);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let (canned, delay) = self.pages.get(&page).expect("unexpected page");
            tokio::time::sleep(Duration::from_millis(*delay)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.lock().unwrap().push(page);
            match canned {
                Canned::Page(p) => Ok(p.clone()),
                Canned::Fail(Error::Server(m)) => Err(Error::Server(m.clone())),
                Canned::Fail(_) => Err(Error::transport("connection reset")),
            }
        }
    }

    #[tokio::test]
    async fn test_single_page() {
        let loader = Arc::new(MockLoader::new().page(1, 1, vec![json!({"id": 1})], 0));
        let out = load_all(loader.clone(), 4).await;
        assert!(out.is_complete());
        assert_eq!(out.rows, vec![json!({"id": 1})]);
        assert_eq!(*loader.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_rows_are_merged_in_page_order() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 4, vec![json!(1)], 0)
                .page(2, 4, vec![json!(2)], 30)
                .page(3, 4, vec![json!(3)], 0)
                .page(4, 4, vec![json!(4), json!(5)], 10),
        );
        let out = load_all(loader, 8).await;
        assert_eq!(out.into_result().unwrap(), vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[tokio::test]
    async fn test_late_failure_waits_for_every_page() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 3, vec![json!({"p": 1})], 0)
                .page(2, 3, vec![json!({"p": 2})], 0)
                .fail(3, Error::transport("boom"), 50),
        );
        let out = load_all(loader.clone(), 8).await;

        let finished = loader.finished.lock().unwrap().clone();
        assert!(finished.contains(&3), "result produced before page 3 finished");
        assert_eq!(out.rows, vec![json!({"p": 1}), json!({"p": 2})]);
        assert!(matches!(out.error, Some(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn test_first_page_failure_stops_everything() {
        let loader = Arc::new(MockLoader::new().fail(1, Error::transport("down"), 0));
        let out = load_all(loader.clone(), 8).await;
        assert!(out.rows.is_empty());
        assert!(out.error.is_some());
        assert_eq!(*loader.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_first_page_rejected_by_server() {
        let loader = Arc::new(MockLoader::new().raw(
            1,
            PageResponse {
                success: false,
                error: Some("invalid token".into()),
                results: None,
                total_pages: Some(5),
            },
        ));
        let out = load_all(loader.clone(), 8).await;
        assert!(matches!(out.error, Some(Error::Server(Some(ref m))) if m == "invalid token"));
        assert_eq!(*loader.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_first_page_without_total_is_decode_error() {
        let loader = Arc::new(MockLoader::new().raw(
            1,
            PageResponse {
                success: true,
                error: None,
                results: Some(vec![json!(1)]),
                total_pages: None,
            },
        ));
        let out = load_all(loader, 8).await;
        assert!(matches!(out.error, Some(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_later_page_rejected_and_empty() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 3, vec![json!(1)], 0)
                .raw(
                    2,
                    PageResponse {
                        success: false,
                        error: None,
                        results: None,
                        total_pages: None,
                    },
                )
                .raw(
                    3,
                    PageResponse {
                        success: true,
                        error: None,
                        results: None,
                        total_pages: Some(3),
                    },
                ),
        );
        let out = load_all(loader, 8).await;
        assert_eq!(out.rows, vec![json!(1)]);
        assert!(matches!(out.error, Some(Error::Server(None))));
    }

    #[tokio::test]
    async fn test_lowest_failing_page_wins() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 4, vec![], 0)
                .fail(2, Error::Server(Some("page two".into())), 40)
                .page(3, 4, vec![json!(3)], 0)
                .fail(4, Error::transport("page four"), 0),
        );
        let out = load_all(loader, 8).await;
        assert_eq!(out.rows, vec![json!(3)]);
        assert!(matches!(out.error, Some(Error::Server(Some(ref m))) if m == "page two"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut loader = MockLoader::new().page(1, 10, vec![], 0);
        for n in 2..=10 {
            loader = loader.page(n, 10, vec![json!(n)], 10);
        }
        let loader = Arc::new(loader);
        let out = load_all(loader.clone(), 3).await;

        assert_eq!(out.rows.len(), 9);
        assert!(loader.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_unbounded_concurrency_is_clamped_to_page_count() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 3, vec![json!(1)], 0)
                .page(2, 3, vec![json!(2)], 0)
                .page(3, 3, vec![json!(3)], 0),
        );
        let out = load_all(loader.clone(), usize::MAX).await;
        assert_eq!(out.into_result().unwrap(), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(loader.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_loads() {
        let loader = Arc::new(
            MockLoader::new()
                .page(1, 3, vec![json!(1)], 0)
                .page(2, 3, vec![json!(2)], 5)
                .page(3, 3, vec![json!(3)], 0),
        );
        let out = load_all(loader.clone(), 0).await;
        assert_eq!(out.into_result().unwrap(), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(loader.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pages_are_requested_as_workers_free_up() {
        let mut loader = MockLoader::new().page(1, 8, vec![], 0);
        for n in 2..=8 {
            loader = loader.page(n, 8, vec![json!(n)], 15);
        }
        let loader = Arc::new(loader);
        let handle = tokio::spawn(load_all(loader.clone(), 2));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut started = loader.requested.lock().unwrap().clone();
        started.sort();
        assert_eq!(started, vec![1, 2, 3]);

        let out = handle.await.unwrap();
        assert_eq!(out.rows.len(), 7);
        assert_eq!(loader.requested.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_page_one_finishes_before_others_start() {
        struct Ordered {
            first_done: AtomicBool,
            violated: AtomicBool,
        }

        #[async_trait::async_trait]
        impl PageLoader for Ordered {
            async fn load_page(&self, page: u32) -> Result<PageResponse> {
                if page == 1 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    self.first_done.store(true, Ordering::SeqCst);
                } else if !self.first_done.load(Ordering::SeqCst) {
                    self.violated.store(true, Ordering::SeqCst);
                }
                Ok(PageResponse {
                    success: true,
                    error: None,
                    results: Some(vec![json!(page)]),
                    total_pages: Some(3),
                })
            }
        }

        let loader = Arc::new(Ordered {
            first_done: AtomicBool::new(false),
            violated: AtomicBool::new(false),
        });
        let out = load_all(loader.clone(), 8).await;
        assert_eq!(out.rows, vec![json!(1), json!(2), json!(3)]);
        assert!(!loader.violated.load(Ordering::SeqCst));
    }
}
