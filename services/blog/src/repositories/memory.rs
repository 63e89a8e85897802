//! In-process blog store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{BlogRepository, RepositoryError, RepositoryResult};
use crate::models::{Author, Post, PostData, ProfileData, UserProfile};

/// Repository operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOp {
    CreatePost,
    UpdatePost,
    DeletePost,
    GetPost,
    ListAllPosts,
    ListUserPosts,
    IncrementViews,
    GetProfile,
    UpsertProfile,
    BatchUpdateAuthorName,
}

#[derive(Default)]
struct Inner {
    posts: HashMap<String, Post>,
    profiles: HashMap<String, UserProfile>,
    last_timestamp: Option<DateTime<Utc>>,
    faults: HashSet<RepositoryOp>,
}

impl Inner {
    /// Server-assigned timestamp, strictly increasing across calls
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn check(&self, op: RepositoryOp) -> RepositoryResult<()> {
        if self.faults.contains(&op) {
            warn!("Injected failure for {:?}", op);
            return Err(RepositoryError::Unavailable(format!(
                "injected failure for {:?}",
                op
            )));
        }
        Ok(())
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

/// Blog repository kept entirely in memory.
///
/// Writes happen under a single lock, so batches are atomic and view
/// increments never get lost.
#[derive(Default)]
pub struct MemoryBlogRepository {
    inner: RwLock<Inner>,
    latency_ms: AtomicU64,
}

impl MemoryBlogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail until cleared
    pub async fn fail_on(&self, op: RepositoryOp) {
        self.inner.write().await.faults.insert(op);
    }

    /// Stop failing `op`
    pub async fn recover(&self, op: RepositoryOp) {
        self.inner.write().await.faults.remove(&op);
    }

    /// Delay every call by `latency` before it touches the store
    pub fn set_latency(&self, latency: std::time::Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
        }
    }

    /// Number of stored posts
    pub async fn post_count(&self) -> usize {
        self.inner.read().await.posts.len()
    }
}

#[async_trait]
impl BlogRepository for MemoryBlogRepository {
    async fn create_post(
        &self,
        data: &PostData,
        author_id: &str,
        author_name: &str,
    ) -> RepositoryResult<Post> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;
        inner.check(RepositoryOp::CreatePost)?;

        let now = inner.tick();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: data.title.clone(),
            content: data.content.clone(),
            header_image: data.header_image().to_string(),
            author: Author {
                id: author_id.to_string(),
                name: author_name.to_string(),
            },
            created_at: now,
            updated_at: now,
            views: 0,
        };
        inner.posts.insert(post.id.clone(), post.clone());

        info!("Created post {} for author {}", post.id, author_id);
        Ok(post)
    }

    async fn update_post(&self, id: &str, data: &PostData) -> RepositoryResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;
        inner.check(RepositoryOp::UpdatePost)?;

        let now = inner.tick();
        let post = inner
            .posts
            .get_mut(id)
            .ok_or_else(|| RepositoryError::PostNotFound(id.to_string()))?;
        post.title = data.title.clone();
        post.content = data.content.clone();
        post.header_image = data.header_image().to_string();
        post.updated_at = now;

        Ok(())
    }

    async fn delete_post(&self, id: &str) -> RepositoryResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;
        inner.check(RepositoryOp::DeletePost)?;

        if inner.posts.remove(id).is_none() {
            info!("Post {} already absent", id);
        }
        Ok(())
    }

    async fn get_post(&self, id: &str) -> RepositoryResult<Option<Post>> {
        self.simulate_latency().await;
        let inner = self.inner.read().await;
        inner.check(RepositoryOp::GetPost)?;
        Ok(inner.posts.get(id).cloned())
    }

    async fn list_all_posts(&self) -> RepositoryResult<Vec<Post>> {
        self.simulate_latency().await;
        let inner = self.inner.read().await;
        inner.check(RepositoryOp::ListAllPosts)?;
        Ok(newest_first(inner.posts.values().cloned().collect()))
    }

    async fn list_user_posts(&self, user_id: &str) -> RepositoryResult<Vec<Post>> {
        self.simulate_latency().await;
        let inner = self.inner.read().await;
        inner.check(RepositoryOp::ListUserPosts)?;
        let posts = inner
            .posts
            .values()
            .filter(|post| post.is_authored_by(user_id))
            .cloned()
            .collect();
        Ok(newest_first(posts))
    }

    async fn increment_views(&self, id: &str) -> RepositoryResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;
        inner.check(RepositoryOp::IncrementViews)?;

        let post = inner
            .posts
            .get_mut(id)
            .ok_or_else(|| RepositoryError::PostNotFound(id.to_string()))?;
        post.views = post.views.saturating_add(1);
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> UserProfile {
        self.simulate_latency().await;
        let inner = self.inner.read().await;
        if let Err(e) = inner.check(RepositoryOp::GetProfile) {
            warn!("Falling back to default profile for {}: {}", user_id, e);
            return UserProfile::default();
        }
        inner.profiles.get(user_id).cloned().unwrap_or_default()
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        data: &ProfileData,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> RepositoryResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;
        inner.check(RepositoryOp::UpsertProfile)?;

        let now = inner.tick();
        let profile = inner.profiles.entry(user_id.to_string()).or_default();
        if let Some(about_me) = &data.about_me {
            profile.about_me = about_me.clone();
        }
        profile.display_name = Some(display_name.to_string());
        if let Some(avatar_url) = avatar_url {
            profile.avatar_url = Some(avatar_url.to_string());
        }
        profile.updated_at = Some(now);

        Ok(())
    }

    async fn batch_update_author_name(
        &self,
        user_id: &str,
        new_name: &str,
    ) -> RepositoryResult<usize> {
        self.simulate_latency().await;
        let mut inner = self.inner.write().await;

        let staged: Vec<String> = inner
            .posts
            .values()
            .filter(|post| post.is_authored_by(user_id))
            .map(|post| post.id.clone())
            .collect();

        // Commit point: a failure here must leave every post untouched.
        inner.check(RepositoryOp::BatchUpdateAuthorName)?;

        let now = inner.tick();
        for id in &staged {
            if let Some(post) = inner.posts.get_mut(id) {
                post.author.name = new_name.to_string();
                post.updated_at = now;
            }
        }

        info!("Updated {} posts with new display name", staged.len());
        Ok(staged.len())
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        self.simulate_latency().await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn data(title: &str) -> PostData {
        PostData {
            title: title.to_string(),
            content: "World".to_string(),
            header_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_post_assigns_store_fields() {
        let repo = MemoryBlogRepository::new();
        let post = repo.create_post(&data("Hello"), "u1", "Alice").await.unwrap();

        assert_eq!(post.views, 0);
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(post.author.name, "Alice");
        assert_eq!(repo.get_post(&post.id).await.unwrap(), Some(post));
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let repo = MemoryBlogRepository::new();
        let first = repo.create_post(&data("one"), "u1", "Alice").await.unwrap();
        let second = repo.create_post(&data("two"), "u2", "Bob").await.unwrap();
        let third = repo.create_post(&data("three"), "u1", "Alice").await.unwrap();

        let all: Vec<_> = repo
            .list_all_posts()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(all, vec![third.id.clone(), second.id, first.id.clone()]);

        let mine: Vec<_> = repo
            .list_user_posts("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(mine, vec![third.id, first.id]);
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp_but_keeps_creation_time() {
        let repo = MemoryBlogRepository::new();
        let post = repo.create_post(&data("Hello"), "u1", "Alice").await.unwrap();

        repo.update_post(&post.id, &data("Hello again")).await.unwrap();
        let updated = repo.get_post(&post.id).await.unwrap().unwrap();

        assert_eq!(updated.title, "Hello again");
        assert_eq!(updated.created_at, post.created_at);
        assert!(updated.updated_at > post.updated_at);
        assert_eq!(updated.author, post.author);
    }

    #[tokio::test]
    async fn test_update_missing_post_is_not_found() {
        let repo = MemoryBlogRepository::new();
        let result = repo.update_post("missing", &data("x")).await;
        assert!(matches!(result, Err(RepositoryError::PostNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_all_counted() {
        let repo = Arc::new(MemoryBlogRepository::new());
        let post = repo.create_post(&data("Hello"), "u1", "Alice").await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let repo = repo.clone();
                let id = post.id.clone();
                tokio::spawn(async move { repo.increment_views(&id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repo.get_post(&post.id).await.unwrap().unwrap().views, 50);
    }

    #[tokio::test]
    async fn test_failed_increment_leaves_counter_unchanged() {
        let repo = MemoryBlogRepository::new();
        let post = repo.create_post(&data("Hello"), "u1", "Alice").await.unwrap();

        repo.fail_on(RepositoryOp::IncrementViews).await;
        assert!(repo.increment_views(&post.id).await.is_err());
        repo.recover(RepositoryOp::IncrementViews).await;

        assert_eq!(repo.get_post(&post.id).await.unwrap().unwrap().views, 0);
    }

    #[tokio::test]
    async fn test_missing_profile_defaults_every_time() {
        let repo = MemoryBlogRepository::new();
        assert_eq!(repo.get_profile("nobody").await, UserProfile::default());
        assert_eq!(repo.get_profile("nobody").await.about_me, "");
    }

    #[tokio::test]
    async fn test_profile_upsert_merges_fields() {
        let repo = MemoryBlogRepository::new();
        let about = ProfileData {
            about_me: Some("I write".to_string()),
        };
        repo.upsert_profile("u1", &about, "Alice", Some("https://a/p.png"))
            .await
            .unwrap();
        repo.upsert_profile("u1", &ProfileData::default(), "Alicia", None)
            .await
            .unwrap();

        let profile = repo.get_profile("u1").await;
        assert_eq!(profile.about_me, "I write");
        assert_eq!(profile.display_name.as_deref(), Some("Alicia"));
        assert_eq!(profile.avatar_url.as_deref(), Some("https://a/p.png"));
    }

    #[tokio::test]
    async fn test_failed_batch_changes_no_post() {
        let repo = MemoryBlogRepository::new();
        repo.create_post(&data("one"), "u1", "Alice").await.unwrap();
        repo.create_post(&data("two"), "u1", "Alice").await.unwrap();

        repo.fail_on(RepositoryOp::BatchUpdateAuthorName).await;
        assert!(repo.batch_update_author_name("u1", "Alicia").await.is_err());

        let posts = repo.list_user_posts("u1").await.unwrap();
        assert!(posts.iter().all(|p| p.author.name == "Alice"));
    }

    #[tokio::test]
    async fn test_batch_only_touches_the_authors_posts() {
        let repo = MemoryBlogRepository::new();
        repo.create_post(&data("one"), "u1", "Alice").await.unwrap();
        let other = repo.create_post(&data("two"), "u2", "Bob").await.unwrap();

        let count = repo.batch_update_author_name("u1", "Alicia").await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            repo.get_post(&other.id).await.unwrap().unwrap().author.name,
            "Bob"
        );
    }
}
