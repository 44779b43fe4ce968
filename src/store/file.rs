use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::repository::ArticleRepository;
use crate::error::{RevisionError, RevisionResult};
use crate::state_machine::Article;

/// Stores each article as pretty-printed JSON in `<dir>/<id>.json`.
///
/// Writes go to a temporary file that is renamed over the target, so a crash
/// mid-write never leaves a truncated article behind.
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Open the repository, creating `dir` if it does not exist.
    pub async fn open(dir: impl Into<PathBuf>) -> RevisionResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            RevisionError::storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> RevisionResult<PathBuf> {
        // Ids become file names; refuse anything that could escape the directory.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(RevisionError::not_found(id));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl ArticleRepository for JsonFileRepository {
    async fn load_all(&self) -> RevisionResult<Vec<Article>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            RevisionError::storage(format!("cannot read {}: {e}", self.dir.display()))
        })?;

        let mut articles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RevisionError::storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = match fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable article file");
                    continue;
                }
            };
            match serde_json::from_str::<Article>(&contents) {
                Ok(article) => articles.push(article),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed article file");
                }
            }
        }
        Ok(articles)
    }

    async fn save(&self, article: &Article) -> RevisionResult<()> {
        let path = self.path_for(&article.id)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(article)
            .map_err(|e| RevisionError::storage(format!("cannot serialize article: {e}")))?;

        fs::write(&tmp, json)
            .await
            .map_err(|e| RevisionError::storage(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| RevisionError::storage(format!("cannot replace {}: {e}", path.display())))?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> RevisionResult<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RevisionError::storage(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }
}
