use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tb_core::{Article, ArticleStorage, Error, Result, UpsertOutcome};

/// A storage driver whose calls block the current thread.
pub trait SyncArticleStore: Send + 'static {
    fn upsert_articles(&mut self, articles: &[Article]) -> Result<UpsertOutcome>;

    fn get_by_link(&self, link: &str) -> Result<Option<Article>>;

    fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>>;

    fn count(&self) -> Result<usize>;
}

/// Runs a [`SyncArticleStore`] on the blocking thread pool so callers never
/// stall the async scheduler.
pub struct BlockingStorage<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for BlockingStorage<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SyncArticleStore> BlockingStorage<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut store = inner
                .lock()
                .map_err(|_| Error::Storage("storage lock poisoned".to_string()))?;
            f(&mut store)
        })
        .await
        .map_err(|e| Error::Storage(format!("blocking storage task failed: {}", e)))?
    }
}

#[async_trait]
impl<S: SyncArticleStore> ArticleStorage for BlockingStorage<S> {
    async fn upsert_articles(&self, articles: &[Article]) -> Result<UpsertOutcome> {
        let articles = articles.to_vec();
        self.run(move |store| store.upsert_articles(&articles)).await
    }

    async fn get_by_link(&self, link: &str) -> Result<Option<Article>> {
        let link = link.to_string();
        self.run(move |store| store.get_by_link(&link)).await
    }

    async fn fetch_recent(&self, days_ago: u32, limit: usize) -> Result<Vec<Article>> {
        self.run(move |store| store.fetch_recent(days_ago, limit)).await
    }

    async fn count(&self) -> Result<usize> {
        self.run(|store| store.count()).await
    }
}
