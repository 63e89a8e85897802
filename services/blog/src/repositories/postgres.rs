//! PostgreSQL-backed blog repository

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{info, warn};
use uuid::Uuid;

use super::{BlogRepository, RepositoryError, RepositoryResult};
use crate::models::{Author, Post, PostData, ProfileData, UserProfile};

const POST_COLUMNS: &str = "id, title, content, header_image, author_id, author_name, \
                            created_at, updated_at, views";

/// Blog repository for database operations
#[derive(Clone)]
pub struct PgBlogRepository {
    pool: PgPool,
}

impl PgBlogRepository {
    /// Create a new blog repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn post_from_row(row: &PgRow) -> Result<Post, sqlx::Error> {
        let views: i64 = row.try_get("views")?;
        Ok(Post {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            header_image: row.try_get("header_image")?,
            author: Author {
                id: row.try_get("author_id")?,
                name: row.try_get("author_name")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            views: u64::try_from(views).unwrap_or_default(),
        })
    }

    fn posts_from_rows(rows: Vec<PgRow>) -> RepositoryResult<Vec<Post>> {
        rows.iter()
            .map(Self::post_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RepositoryError::from)
    }

    async fn fetch_profile(&self, user_id: &str) -> RepositoryResult<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT about_me, display_name, avatar_url, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(UserProfile {
                about_me: row.try_get("about_me")?,
                display_name: row.try_get("display_name")?,
                avatar_url: row.try_get("avatar_url")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BlogRepository for PgBlogRepository {
    async fn create_post(
        &self,
        data: &PostData,
        author_id: &str,
        author_name: &str,
    ) -> RepositoryResult<Post> {
        info!("Creating post for author: {}", author_id);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO posts (id, title, content, header_image, author_id, author_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&data.title)
        .bind(&data.content)
        .bind(data.header_image())
        .bind(author_id)
        .bind(author_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::post_from_row(&row)?)
    }

    async fn update_post(&self, id: &str, data: &PostData) -> RepositoryResult<()> {
        info!("Updating post: {}", id);

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = $2, content = $3, header_image = $4, updated_at = clock_timestamp()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.content)
        .bind(data.header_image())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::PostNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_post(&self, id: &str) -> RepositoryResult<()> {
        info!("Deleting post: {}", id);

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_post(&self, id: &str) -> RepositoryResult<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::post_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_all_posts(&self) -> RepositoryResult<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::posts_from_rows(rows)
    }

    async fn list_user_posts(&self, user_id: &str) -> RepositoryResult<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Self::posts_from_rows(rows)
    }

    async fn increment_views(&self, id: &str) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::PostNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> UserProfile {
        match self.fetch_profile(user_id).await {
            Ok(profile) => profile.unwrap_or_default(),
            Err(e) => {
                warn!("Error loading user profile {}: {}", user_id, e);
                UserProfile::default()
            }
        }
    }

    async fn upsert_profile(
        &self,
        user_id: &str,
        data: &ProfileData,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> RepositoryResult<()> {
        info!("Upserting profile for user: {}", user_id);

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, about_me, display_name, avatar_url, updated_at)
            VALUES ($1, COALESCE($2, ''), $3, $4, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
            about_me = COALESCE($2, user_profiles.about_me),
            display_name = EXCLUDED.display_name,
            avatar_url = COALESCE($4, user_profiles.avatar_url),
            updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(data.about_me.as_deref())
        .bind(display_name)
        .bind(avatar_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn batch_update_author_name(
        &self,
        user_id: &str,
        new_name: &str,
    ) -> RepositoryResult<usize> {
        let mut tx = self.pool.begin().await?;

        let staged: Vec<String> =
            sqlx::query_scalar("SELECT id FROM posts WHERE author_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;

        if !staged.is_empty() {
            sqlx::query(
                r#"
                UPDATE posts
                SET author_name = $1, updated_at = clock_timestamp()
                WHERE id = ANY($2)
                "#,
            )
            .bind(new_name)
            .bind(&staged)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!("Updated {} posts with new display name", staged.len());
        Ok(staged.len())
    }

    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(common::database::health_check(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::database::{DatabaseConfig, init_pool, run_migrations};

    async fn repository() -> PgBlogRepository {
        let config = DatabaseConfig::from_env().expect("database config");
        let pool = init_pool(&config).await.expect("database pool");
        run_migrations(&pool, &crate::MIGRATOR)
            .await
            .expect("migrations");
        PgBlogRepository::new(pool)
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_batch_renames_every_post_of_the_author() {
        let repo = repository().await;
        let author = format!("pg-{}", Uuid::new_v4());
        let data = PostData {
            title: "Hello".to_string(),
            content: "World".to_string(),
            header_image_url: None,
        };
        let post = repo.create_post(&data, &author, "Alice").await.unwrap();

        let count = repo.batch_update_author_name(&author, "Alicia").await.unwrap();
        assert_eq!(count, 1);

        let renamed = repo.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(renamed.author.name, "Alicia");
        assert!(renamed.updated_at >= post.updated_at);

        repo.delete_post(&post.id).await.unwrap();
        assert!(repo.get_post(&post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_profile_merge_keeps_about_me() {
        let repo = repository().await;
        let user = format!("pg-{}", Uuid::new_v4());
        let about = ProfileData {
            about_me: Some("I write".to_string()),
        };

        repo.upsert_profile(&user, &about, "Alice", None).await.unwrap();
        repo.upsert_profile(&user, &ProfileData::default(), "Alicia", None)
            .await
            .unwrap();

        let profile = repo.get_profile(&user).await;
        assert_eq!(profile.about_me, "I write");
        assert_eq!(profile.display_name.as_deref(), Some("Alicia"));
    }
}
