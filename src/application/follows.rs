use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::application::sessions::CurrentUser;
use crate::domain::entities::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Following yourself is accepted but never stored.
    SelfFollow,
}

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error("`{follower}` does not follow `{author}`")]
    NotFollowing { follower: String, author: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    pub async fn follow(
        &self,
        follower: &CurrentUser,
        target_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        if follower.username == target_username {
            return Ok(FollowOutcome::SelfFollow);
        }

        let author = self.find_author(target_username).await?;
        let created = self.follows.create_follow(follower.id, author.id).await?;

        if created {
            info!(
                target = "inkwell::application::follows",
                follower = %follower.username,
                author = %author.username,
                "follow created"
            );
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    pub async fn unfollow(
        &self,
        follower: &CurrentUser,
        target_username: &str,
    ) -> Result<(), FollowError> {
        let author = self.find_author(target_username).await?;
        let removed = self.follows.delete_follow(follower.id, author.id).await?;
        if !removed {
            return Err(FollowError::NotFollowing {
                follower: follower.username.clone(),
                author: author.username,
            });
        }

        info!(
            target = "inkwell::application::follows",
            follower = %follower.username,
            author = %author.username,
            "follow removed"
        );
        Ok(())
    }

    /// True when `viewer` is signed in and follows `author`.
    pub async fn is_following(
        &self,
        viewer: Option<&CurrentUser>,
        author: &UserRecord,
    ) -> Result<bool, FollowError> {
        match viewer {
            Some(viewer) if viewer.id != author.id => Ok(self
                .follows
                .is_following(viewer.id, author.id)
                .await?),
            _ => Ok(false),
        }
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownAuthor(username.to_string()))
    }
}
