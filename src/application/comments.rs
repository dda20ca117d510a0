use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::forms::{CommentInput, FieldErrors, require_text};
use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::application::sessions::CurrentUser;
use crate::domain::entities::CommentRecord;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("post {0} not found")]
    UnknownPost(i64),
    #[error("invalid comment: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    pub async fn add_comment(
        &self,
        author: &CurrentUser,
        post_id: i64,
        input: CommentInput,
    ) -> Result<CommentRecord, CommentError> {
        if self.posts.find_post_by_id(post_id).await?.is_none() {
            return Err(CommentError::UnknownPost(post_id));
        }

        let mut errors = FieldErrors::new();
        require_text(&mut errors, "text", &input.text);
        errors.finish(()).map_err(CommentError::Invalid)?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author.id,
                text: input.text,
            })
            .await
            .map_err(|err| match err {
                // The post vanished between the lookup and the insert.
                RepoError::Integrity { .. } => CommentError::UnknownPost(post_id),
                other => CommentError::Repo(other),
            })?;

        info!(
            target = "inkwell::application::comments",
            post_id,
            comment_id = comment.id,
            author = %author.username,
            "comment added"
        );
        Ok(comment)
    }

    pub async fn comments_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        self.comments.list_comments_for_post(post_id).await
    }
}
