//! Persistence seam for articles.
//!
//! [`RevisionStore`](super::RevisionStore) keeps the working set in memory and
//! writes through to a repository on every commit, so suspended workflows
//! survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RevisionResult;
use crate::state_machine::Article;

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Every persisted article, in no particular order.
    async fn load_all(&self) -> RevisionResult<Vec<Article>>;

    /// Insert or replace an article.
    async fn save(&self, article: &Article) -> RevisionResult<()>;

    /// Remove an article. Returns whether anything was removed.
    async fn remove(&self, id: &str) -> RevisionResult<bool>;
}

/// Non-durable repository for tests and throwaway runs.
#[derive(Default)]
pub struct InMemoryRepository {
    articles: RwLock<HashMap<String, Article>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleRepository for InMemoryRepository {
    async fn load_all(&self) -> RevisionResult<Vec<Article>> {
        Ok(self.articles.read().await.values().cloned().collect())
    }

    async fn save(&self, article: &Article) -> RevisionResult<()> {
        self.articles
            .write()
            .await
            .insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> RevisionResult<bool> {
        Ok(self.articles.write().await.remove(id).is_some())
    }
}
