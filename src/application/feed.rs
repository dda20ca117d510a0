use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{POSTS_PER_PAGE, Page, PageNumber, PageWindow};
use crate::application::repos::{GroupsRepo, PostQueryFilter, PostsRepo, RepoError, UsersRepo};
use crate::domain::entities::{GroupRecord, PostRecord, UserRecord};

/// Which slice of posts a listing shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedView {
    All,
    ByGroup(String),
    ByAuthor(String),
    /// Posts by authors the given user follows. Callers reject anonymous viewers first.
    FollowedBy(i64),
}

impl FeedView {
    pub fn base_path(&self) -> String {
        match self {
            FeedView::All => "/".to_string(),
            FeedView::ByGroup(slug) => format!("/group/{slug}/"),
            FeedView::ByAuthor(username) => format!("/profile/{username}/"),
            FeedView::FollowedBy(_) => "/follow/".to_string(),
        }
    }
}

/// What the listing is about, resolved from the requested view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSubject {
    Index,
    Group(GroupRecord),
    Author(UserRecord),
    Following,
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub subject: FeedSubject,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("unknown author `{0}`")]
    UnknownAuthor(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
        }
    }

    pub async fn build_feed(&self, view: FeedView, page: PageNumber) -> Result<Feed, FeedError> {
        let (subject, filter) = self.resolve(view).await?;

        let total = self.posts.count_posts(&filter).await?;
        let window = PageWindow::resolve(page, total, POSTS_PER_PAGE);
        let items = self.posts.list_posts(&filter, window.slice()).await?;

        debug!(
            target = "inkwell::application::feed",
            requested = page.get(),
            page = window.number,
            pages = window.num_pages,
            total,
            "feed page built"
        );

        Ok(Feed {
            subject,
            page: window.into_page(items),
        })
    }

    async fn resolve(&self, view: FeedView) -> Result<(FeedSubject, PostQueryFilter), FeedError> {
        match view {
            FeedView::All => Ok((FeedSubject::Index, PostQueryFilter::all())),
            FeedView::ByGroup(slug) => {
                let group = self
                    .groups
                    .find_group_by_slug(&slug)
                    .await?
                    .ok_or(FeedError::UnknownGroup(slug))?;
                let filter = PostQueryFilter::group(group.id);
                Ok((FeedSubject::Group(group), filter))
            }
            FeedView::ByAuthor(username) => {
                let author = self
                    .users
                    .find_user_by_username(&username)
                    .await?
                    .ok_or(FeedError::UnknownAuthor(username))?;
                let filter = PostQueryFilter::author(author.id);
                Ok((FeedSubject::Author(author), filter))
            }
            FeedView::FollowedBy(user_id) => Ok((
                FeedSubject::Following,
                PostQueryFilter::followed_by(user_id),
            )),
        }
    }
}
