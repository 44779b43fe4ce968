//! Canonical home of every article.
//!
//! The store keeps the working set in memory, writes through to an
//! [`ArticleRepository`] on each commit and serializes transitions per article
//! id with [`ArticleLease`].
//!
//! # Concurrency
//!
//! Each article id has its own mutex. A lease takes it without waiting; if a
//! transition is already in flight the caller gets
//! [`RevisionError::ConcurrentModification`] and nothing changes. Leases on
//! different ids never contend, and no store-wide lock is held across a
//! generation call.
//!
//! A repository write and the matching in-memory swap run as one step on a
//! spawned task that holds the map's write lock, so a caller cancelled
//! mid-commit never leaves memory and disk disagreeing.

mod file;
mod repository;

pub use file::JsonFileRepository;
pub use repository::{ArticleRepository, InMemoryRepository};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::{RevisionError, RevisionResult};
use crate::state_machine::{Article, ArticleSummary};

pub struct RevisionStore {
    articles: Arc<RwLock<HashMap<String, Article>>>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    repository: Arc<dyn ArticleRepository>,
}

impl RevisionStore {
    /// Open a store over `repository`, loading every persisted article.
    pub async fn open(repository: Arc<dyn ArticleRepository>) -> RevisionResult<Self> {
        let loaded = repository.load_all().await?;
        info!(count = loaded.len(), "loaded persisted articles");

        let articles = loaded
            .into_iter()
            .map(|article| (article.id.clone(), article))
            .collect();

        Ok(Self {
            articles: Arc::new(RwLock::new(articles)),
            locks: RwLock::new(HashMap::new()),
            repository,
        })
    }

    /// A store with no durable backing.
    pub fn in_memory() -> Self {
        Self {
            articles: Arc::new(RwLock::new(HashMap::new())),
            locks: RwLock::new(HashMap::new()),
            repository: Arc::new(InMemoryRepository::new()),
        }
    }

    /// Allocate and persist a new article in the CREATED state.
    pub async fn create(&self, topic: &str, max_iteration: u32) -> RevisionResult<Article> {
        let article = Article::new(topic, max_iteration)?;
        self.commit(Change::Save(article.clone())).await?;
        info!(article_id = %article.id, topic = %article.topic, max_iteration, "article created");
        Ok(article)
    }

    pub async fn get(&self, id: &str) -> RevisionResult<Article> {
        self.articles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RevisionError::not_found(id))
    }

    /// Summaries of every article, newest first.
    pub async fn list(&self) -> Vec<ArticleSummary> {
        let mut summaries: Vec<ArticleSummary> = self
            .articles
            .read()
            .await
            .values()
            .map(Article::summary)
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }

    /// Apply one atomic transition to the article `id`.
    pub async fn update<T, F>(&self, id: &str, mutator: F) -> RevisionResult<T>
    where
        F: FnOnce(&mut Article) -> RevisionResult<T>,
    {
        self.lease(id).await?.update(mutator).await
    }

    /// Remove the article `id`. Deleting an absent id is `NotFound`.
    pub async fn delete(&self, id: &str) -> RevisionResult<()> {
        let lease = self.lease(id).await?;
        self.commit(Change::Remove(id.to_string())).await?;
        self.locks.write().await.remove(id);
        drop(lease);
        info!(article_id = %id, "article deleted");
        Ok(())
    }

    /// Claim exclusive transition rights on `id` without waiting.
    pub async fn lease(&self, id: &str) -> RevisionResult<ArticleLease<'_>> {
        if !self.articles.read().await.contains_key(id) {
            return Err(RevisionError::not_found(id));
        }

        let lock = self.lock_for(id).await;
        let guard = lock.try_lock_owned().map_err(|_| {
            RevisionError::ConcurrentModification(format!(
                "article {id} already has a transition in flight"
            ))
        })?;

        // The article may have been deleted between the check and the claim.
        if !self.articles.read().await.contains_key(id) {
            return Err(RevisionError::not_found(id));
        }

        debug!(article_id = %id, "lease acquired");
        Ok(ArticleLease {
            store: self,
            id: id.to_string(),
            _guard: guard,
        })
    }

    /// Apply `change` to the repository and then to memory.
    ///
    /// The map's write lock is taken first and moved into a spawned task with
    /// the repository call, so once the write starts it always finishes on
    /// both sides, and readers wait until it has.
    async fn commit(&self, change: Change) -> RevisionResult<()> {
        let mut articles = Arc::clone(&self.articles).write_owned().await;
        let repository = Arc::clone(&self.repository);
        let task = tokio::spawn(async move {
            match change {
                Change::Save(article) => {
                    repository.save(&article).await?;
                    articles.insert(article.id.clone(), article);
                }
                Change::Remove(id) => {
                    repository.remove(&id).await?;
                    articles.remove(&id);
                }
            }
            Ok::<(), RevisionError>(())
        });
        task.await
            .map_err(|e| RevisionError::storage(format!("commit task failed: {e}")))?
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(id) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.locks.write().await;
        Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

enum Change {
    Save(Article),
    Remove(String),
}

/// Exclusive right to run transitions on one article.
///
/// Released on drop. Dropping a lease mid-transition (for instance when the
/// owning future is cancelled) commits nothing.
pub struct ArticleLease<'a> {
    store: &'a RevisionStore,
    id: String,
    _guard: OwnedMutexGuard<()>,
}

impl ArticleLease<'_> {
    /// Current committed article.
    pub async fn article(&self) -> RevisionResult<Article> {
        self.store.get(&self.id).await
    }

    /// Run `mutator` against a staged copy and commit it.
    ///
    /// The staged copy is validated, persisted and only then swapped into
    /// memory; any error along the way leaves the committed article untouched.
    /// A mutator that changes nothing is a pure read and always succeeds, even
    /// on a terminal article. Any change to a terminal article fails with
    /// [`RevisionError::TerminalStateViolation`].
    pub async fn update<T, F>(&self, mutator: F) -> RevisionResult<T>
    where
        F: FnOnce(&mut Article) -> RevisionResult<T>,
    {
        let current = self.article().await?;
        let mut staged = current.clone();
        let output = mutator(&mut staged)?;

        if staged == current {
            return Ok(output);
        }
        if current.is_terminal() {
            return Err(RevisionError::TerminalStateViolation {
                id: current.id,
                evaluation: current.evaluation,
            });
        }
        if staged.id != current.id
            || staged.topic != current.topic
            || staged.max_iteration != current.max_iteration
            || staged.created_at != current.created_at
        {
            return Err(RevisionError::InvariantViolation(
                "id, topic, max_iteration and created_at are immutable".into(),
            ));
        }
        if staged.iteration < current.iteration {
            return Err(RevisionError::InvariantViolation(format!(
                "iteration may not decrease from {} to {}",
                current.iteration, staged.iteration
            )));
        }
        if !extends(&current.article_history, &staged.article_history)
            || !extends(&current.feedback_history, &staged.feedback_history)
            || !extends(
                &current.human_feedback_history,
                &staged.human_feedback_history,
            )
        {
            return Err(RevisionError::InvariantViolation(
                "history sequences are append-only".into(),
            ));
        }

        staged.updated_at = Utc::now();
        staged.check_invariants()?;

        let (state, iteration) = (staged.state, staged.iteration);
        self.store.commit(Change::Save(staged)).await?;
        debug!(article_id = %self.id, %state, iteration, "article committed");
        Ok(output)
    }
}

fn extends(before: &[String], after: &[String]) -> bool {
    after.len() >= before.len() && after[..before.len()] == *before
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use super::*;
    use crate::state_machine::{EvaluationStatus, WorkflowState};

    async fn approved(store: &RevisionStore) -> Article {
        let article = store.create("topic", 3).await.unwrap();
        store
            .update(&article.id, |a| {
                a.article_history.push("v1".into());
                a.final_article = "v1".into();
                a.feedback_history.push("great".into());
                a.feedback = "great".into();
                a.score = Some(10);
                a.evaluation = EvaluationStatus::Approved;
                a.state = WorkflowState::Approved;
                Ok(())
            })
            .await
            .unwrap();
        store.get(&article.id).await.unwrap()
    }

    #[tokio::test]
    async fn create_validates_input() {
        let store = RevisionStore::in_memory();
        assert!(matches!(
            store.create("", 3).await,
            Err(RevisionError::InvalidInput(_))
        ));
        assert!(matches!(
            store.create("topic", 0).await,
            Err(RevisionError::InvalidInput(_))
        ));
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = RevisionStore::in_memory();
        assert!(matches!(
            store.get("nope").await,
            Err(RevisionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let store = RevisionStore::in_memory();
        let article = store.create("topic", 3).await.unwrap();

        store.delete(&article.id).await.unwrap();
        assert!(matches!(
            store.delete(&article.id).await,
            Err(RevisionError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("never-existed").await,
            Err(RevisionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = RevisionStore::in_memory();
        let first = store.create("first", 3).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create("second", 3).await.unwrap();

        let ids: Vec<String> = store.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn failed_mutator_changes_nothing() {
        let store = RevisionStore::in_memory();
        let article = store.create("topic", 3).await.unwrap();

        let result: RevisionResult<()> = store
            .update(&article.id, |a| {
                a.iteration = 2;
                Err(RevisionError::invalid_input("nope"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(&article.id).await.unwrap(), article);
    }

    #[tokio::test]
    async fn invariant_breaking_commit_is_refused() {
        let store = RevisionStore::in_memory();
        let article = store.create("topic", 3).await.unwrap();

        let err = store
            .update(&article.id, |a| {
                a.article_history.push("orphan".into());
                a.final_article = "orphan".into();
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::InvariantViolation(_)));
        assert_eq!(store.get(&article.id).await.unwrap(), article);
    }

    #[tokio::test]
    async fn history_rewrite_is_refused() {
        let store = RevisionStore::in_memory();
        let article = store.create("topic", 3).await.unwrap();
        store
            .update(&article.id, |a| {
                a.human_feedback_history.push("first".into());
                Ok(())
            })
            .await
            .unwrap();

        let err = store
            .update(&article.id, |a| {
                a.human_feedback_history[0] = "rewritten".into();
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn approved_article_only_allows_reads() {
        let store = RevisionStore::in_memory();
        let article = approved(&store).await;

        let text = store
            .update(&article.id, |a| Ok(a.final_article.clone()))
            .await
            .unwrap();
        assert_eq!(text, "v1");

        let mutations: Vec<Box<dyn FnOnce(&mut Article) -> RevisionResult<()>>> = vec![
            Box::new(|a: &mut Article| {
                a.final_article = "changed".into();
                Ok(())
            }),
            Box::new(|a: &mut Article| {
                a.iteration += 1;
                Ok(())
            }),
            Box::new(|a: &mut Article| {
                a.article_history.push("v2".into());
                Ok(())
            }),
            Box::new(|a: &mut Article| {
                a.feedback_history.push("more".into());
                Ok(())
            }),
            Box::new(|a: &mut Article| {
                a.human_feedback_history.push("human".into());
                Ok(())
            }),
        ];
        for mutation in mutations {
            let err = store.update(&article.id, mutation).await.unwrap_err();
            assert!(matches!(err, RevisionError::TerminalStateViolation { .. }));
        }
        assert_eq!(store.get(&article.id).await.unwrap(), article);
    }

    #[tokio::test]
    async fn second_lease_on_same_id_conflicts() {
        let store = RevisionStore::in_memory();
        let a = store.create("a", 3).await.unwrap();
        let b = store.create("b", 3).await.unwrap();

        let lease = store.lease(&a.id).await.unwrap();
        assert!(matches!(
            store.lease(&a.id).await,
            Err(RevisionError::ConcurrentModification(_))
        ));
        assert!(matches!(
            store.delete(&a.id).await,
            Err(RevisionError::ConcurrentModification(_))
        ));
        // Other articles are unaffected.
        store.lease(&b.id).await.unwrap();

        drop(lease);
        store.lease(&a.id).await.unwrap();
    }

    /// Repository whose saves take `delay` once armed.
    struct SlowRepository {
        inner: InMemoryRepository,
        armed: AtomicBool,
        delay: Duration,
    }

    #[async_trait]
    impl ArticleRepository for SlowRepository {
        async fn load_all(&self) -> RevisionResult<Vec<Article>> {
            self.inner.load_all().await
        }

        async fn save(&self, article: &Article) -> RevisionResult<()> {
            if self.armed.load(Ordering::SeqCst) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.save(article).await
        }

        async fn remove(&self, id: &str) -> RevisionResult<bool> {
            self.inner.remove(id).await
        }
    }

    fn slow_repository() -> Arc<SlowRepository> {
        Arc::new(SlowRepository {
            inner: InMemoryRepository::new(),
            armed: AtomicBool::new(false),
            delay: Duration::from_millis(100),
        })
    }

    async fn persisted(repo: &dyn ArticleRepository, id: &str) -> Article {
        repo.load_all()
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.id == id)
            .unwrap()
    }

    fn push_note(a: &mut Article) -> RevisionResult<()> {
        a.human_feedback_history.push("note".into());
        Ok(())
    }

    #[tokio::test]
    async fn commit_cancelled_before_writing_changes_nothing() {
        let repo = slow_repository();
        let store = RevisionStore::open(repo.clone()).await.unwrap();
        let article = store.create("topic", 3).await.unwrap();
        let lease = store.lease(&article.id).await.unwrap();

        let reader = store.articles.read().await;
        let result = timeout(Duration::from_millis(50), lease.update(push_note)).await;
        assert!(result.is_err());
        drop(reader);
        drop(lease);

        let in_memory = store.get(&article.id).await.unwrap();
        assert_eq!(in_memory, article);
        assert_eq!(persisted(repo.as_ref(), &article.id).await, in_memory);
    }

    #[tokio::test]
    async fn commit_cancelled_mid_write_lands_in_memory_and_on_disk() {
        let repo = slow_repository();
        let store = RevisionStore::open(repo.clone()).await.unwrap();
        let article = store.create("topic", 3).await.unwrap();
        let lease = store.lease(&article.id).await.unwrap();

        repo.armed.store(true, Ordering::SeqCst);
        let result = timeout(Duration::from_millis(20), lease.update(push_note)).await;
        assert!(result.is_err());
        drop(lease);

        // Reads wait for the in-flight write to finish.
        let in_memory = store.get(&article.id).await.unwrap();
        assert_eq!(in_memory.human_feedback_history, vec!["note"]);
        assert_eq!(persisted(repo.as_ref(), &article.id).await, in_memory);

        // The next commit builds on the landed state.
        repo.armed.store(false, Ordering::SeqCst);
        store
            .update(&article.id, |a| {
                a.human_feedback_history.push("second".into());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(
            persisted(repo.as_ref(), &article.id).await.human_feedback_history,
            vec!["note", "second"]
        );
    }
}
