use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, query, query_as};
use time::OffsetDateTime;

use crate::application::pagination::PageSlice;
use crate::application::repos::{
    CreatePostParams, PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{AuthorRef, GroupRef, PostRecord};

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "p.id, p.text, p.image, p.created_at, p.updated_at, \
    u.id AS author_id, u.username AS author_username, \
    g.id AS group_id, g.slug AS group_slug, g.title AS group_title";

const POST_JOINS: &str = " INNER JOIN users u ON u.id = p.author_id \
    LEFT JOIN groups g ON g.id = p.group_id";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    image: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_id: i64,
    author_username: String,
    group_id: Option<i64>,
    group_slug: Option<String>,
    group_title: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let group = match (row.group_id, row.group_slug, row.group_title) {
            (Some(id), Some(slug), Some(title)) => Some(GroupRef { id, slug, title }),
            _ => None,
        };

        Self {
            id: row.id,
            text: row.text,
            image: row.image,
            author: AuthorRef {
                id: row.author_id,
                username: row.author_username,
            },
            group,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn apply_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PostQueryFilter) {
        if let Some(group_id) = filter.group_id {
            qb.push(" AND p.group_id = ");
            qb.push_bind(group_id);
        }

        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.author_id = ");
            qb.push_bind(author_id);
        }

        if let Some(user_id) = filter.followed_by {
            qb.push(" AND p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ");
            qb.push_bind(user_id);
            qb.push(")");
        }
    }

    /// Wraps a data-modifying statement that returns a `posts` row so the
    /// result carries the joined author and group columns.
    fn joined_post_sql(modifying: &str) -> String {
        format!("WITH p AS ({modifying}) SELECT {POST_COLUMNS} FROM p{POST_JOINS}")
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1");
        Self::apply_post_filter(&mut qb, filter);

        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        u64::try_from(total).map_err(|_| RepoError::Integrity {
            message: format!("negative post count `{total}`"),
        })
    }

    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        slice: PageSlice,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let offset = i64::try_from(slice.offset).map_err(|_| RepoError::InvalidInput {
            message: format!("page offset `{}` out of range", slice.offset),
        })?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p");
        qb.push(POST_JOINS);
        qb.push(" WHERE 1=1");
        Self::apply_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(slice.limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p{POST_JOINS} WHERE p.id = $1");
        let row = query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let sql = Self::joined_post_sql(
            "INSERT INTO posts (author_id, group_id, text, image, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING *",
        );
        let row = query_as::<_, PostRow>(&sql)
            .bind(params.author_id)
            .bind(params.group_id)
            .bind(params.text)
            .bind(params.image)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = Self::joined_post_sql(
            "UPDATE posts SET group_id = $2, text = $3, image = $4, updated_at = $5 \
             WHERE id = $1 RETURNING *",
        );
        let row = query_as::<_, PostRow>(&sql)
            .bind(params.id)
            .bind(params.group_id)
            .bind(params.text)
            .bind(params.image)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let result = query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }
}
