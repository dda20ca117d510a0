use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::forms::{
    FieldErrors, INVALID_GROUP, INVALID_IMAGE, PostInput, require_text,
};
use crate::application::repos::{
    CommentsRepo, CreatePostParams, GroupsRepo, PostQueryFilter, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams,
};
use crate::application::sessions::CurrentUser;
use crate::cache::CacheTrigger;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::infra::uploads::{UploadStorage, UploadStorageError};

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {0} not found")]
    NotFound(i64),
    #[error("user `{username}` may not modify post {post_id}")]
    Forbidden { post_id: i64, username: String },
    #[error("invalid post: {0}")]
    Invalid(FieldErrors),
    #[error("failed to store image: {0}")]
    Media(#[from] UploadStorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Everything the detail page shows about one post.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub author_post_count: u64,
    pub comments: Vec<CommentRecord>,
}

struct ValidPost {
    text: String,
    group_id: Option<i64>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    media: Arc<UploadStorage>,
    cache_trigger: Option<CacheTrigger>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        media: Arc<UploadStorage>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            comments,
            media,
            cache_trigger: None,
        }
    }

    /// Flush the page cache after every successful write.
    pub fn with_cache_trigger_opt(mut self, trigger: Option<CacheTrigger>) -> Self {
        self.cache_trigger = trigger;
        self
    }

    pub async fn post_detail(&self, post_id: i64) -> Result<PostDetail, PostError> {
        let post = self.find(post_id).await?;
        let author_post_count = self
            .posts
            .count_posts(&PostQueryFilter::author(post.author.id))
            .await?;
        let comments = self.comments.list_comments_for_post(post_id).await?;

        Ok(PostDetail {
            post,
            author_post_count,
            comments,
        })
    }

    /// Load a post for editing; only its author may.
    pub async fn editable_post(
        &self,
        editor: &CurrentUser,
        post_id: i64,
    ) -> Result<PostRecord, PostError> {
        let post = self.find(post_id).await?;
        ensure_author(&post, editor)?;
        Ok(post)
    }

    pub async fn groups(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create_post(
        &self,
        author: &CurrentUser,
        input: PostInput,
    ) -> Result<PostRecord, PostError> {
        let valid = self.validate(&input).await?;
        let image = match input.image {
            Some(upload) => Some(
                self.media
                    .store_post_image(&upload.file_name, upload.data)
                    .await?
                    .stored_path,
            ),
            None => None,
        };

        let post = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;

        info!(
            target = "inkwell::application::posts",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        if let Some(trigger) = &self.cache_trigger {
            trigger.post_upserted(post.id);
        }
        Ok(post)
    }

    /// Apply an edit. A post without a new image keeps its current one.
    pub async fn update_post(
        &self,
        editor: &CurrentUser,
        post_id: i64,
        input: PostInput,
    ) -> Result<PostRecord, PostError> {
        let existing = self.editable_post(editor, post_id).await?;
        let valid = self.validate(&input).await?;

        let image = match input.image {
            Some(upload) => Some(
                self.media
                    .store_post_image(&upload.file_name, upload.data)
                    .await?
                    .stored_path,
            ),
            None => existing.image.clone(),
        };

        let post = self
            .writer
            .update_post(UpdatePostParams {
                id: post_id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => PostError::NotFound(post_id),
                other => PostError::Repo(other),
            })?;

        if existing.image.is_some() && existing.image != post.image {
            self.discard_image(existing.image.as_deref()).await;
        }

        info!(
            target = "inkwell::application::posts",
            post_id,
            editor = %editor.username,
            "post updated"
        );
        if let Some(trigger) = &self.cache_trigger {
            trigger.post_upserted(post_id);
        }
        Ok(post)
    }

    pub async fn delete_post(&self, editor: &CurrentUser, post_id: i64) -> Result<(), PostError> {
        let existing = self.editable_post(editor, post_id).await?;
        self.writer
            .delete_post(post_id)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => PostError::NotFound(post_id),
                other => PostError::Repo(other),
            })?;
        self.discard_image(existing.image.as_deref()).await;

        info!(
            target = "inkwell::application::posts",
            post_id,
            editor = %editor.username,
            "post deleted"
        );
        if let Some(trigger) = &self.cache_trigger {
            trigger.post_deleted(post_id);
        }
        Ok(())
    }

    async fn find(&self, post_id: i64) -> Result<PostRecord, PostError> {
        self.posts
            .find_post_by_id(post_id)
            .await?
            .ok_or(PostError::NotFound(post_id))
    }

    async fn validate(&self, input: &PostInput) -> Result<ValidPost, PostError> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "text", &input.text);

        let group_id = match input.group_slug() {
            Some(slug) => match self.groups.find_group_by_slug(slug).await? {
                Some(group) => Some(group.id),
                None => {
                    errors.add("group", INVALID_GROUP);
                    None
                }
            },
            None => None,
        };

        if let Some(upload) = &input.image
            && !upload.is_image()
        {
            errors.add("image", INVALID_IMAGE);
        }

        errors
            .finish(ValidPost {
                text: input.text.clone(),
                group_id,
            })
            .map_err(PostError::Invalid)
    }

    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.media.delete(path).await {
            warn!(
                target = "inkwell::application::posts",
                path,
                error = %err,
                "failed to remove replaced image"
            );
        }
    }
}

fn ensure_author(post: &PostRecord, user: &CurrentUser) -> Result<(), PostError> {
    if post.is_authored_by(user.id) {
        Ok(())
    } else {
        Err(PostError::Forbidden {
            post_id: post.id,
            username: user.username.clone(),
        })
    }
}
