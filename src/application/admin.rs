//! Operator actions behind the management CLI.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateGroupParams, CreateUserParams, GroupsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{GroupRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

const MAX_USERNAME_CHARS: usize = 150;
const MAX_GROUP_TITLE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("`{0}` is already taken")]
    Taken(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for AdminError {
    fn from(error: SlugAsyncError<RepoError>) -> Self {
        match error {
            SlugAsyncError::Slug(err) => AdminError::Slug(err),
            SlugAsyncError::Predicate(err) => AdminError::Repo(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct AdminService {
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
}

impl AdminService {
    pub fn new(users: Arc<dyn UsersRepo>, groups: Arc<dyn GroupsRepo>) -> Self {
        Self { users, groups }
    }

    pub async fn create_user(&self, username: &str) -> Result<UserRecord, AdminError> {
        let username = username.trim();
        validate_username(username)?;

        let user = self
            .users
            .create_user(CreateUserParams {
                username: username.to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminError::Taken(username.to_string()),
                other => AdminError::Repo(other),
            })?;

        info!(
            target = "inkwell::application::admin",
            user_id = user.id,
            username = %user.username,
            "user created"
        );
        Ok(user)
    }

    pub async fn find_user(&self, username: &str) -> Result<UserRecord, AdminError> {
        self.users
            .find_user_by_username(username.trim())
            .await?
            .ok_or_else(|| DomainError::not_found("user").into())
    }

    pub async fn create_group(&self, cmd: CreateGroupCommand) -> Result<GroupRecord, AdminError> {
        let title = cmd.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("group title must not be empty").into());
        }
        if title.chars().count() > MAX_GROUP_TITLE_CHARS {
            return Err(DomainError::validation(format!(
                "group title must be at most {MAX_GROUP_TITLE_CHARS} characters"
            ))
            .into());
        }

        let slug = match cmd.slug.map(|slug| slug.trim().to_string()) {
            Some(slug) => {
                validate_slug(&slug)?;
                slug
            }
            None => {
                let groups = self.groups.clone();
                generate_unique_slug_async(&title, move |candidate| {
                    let groups = groups.clone();
                    let candidate = candidate.to_string();
                    async move {
                        groups
                            .find_group_by_slug(&candidate)
                            .await
                            .map(|existing| existing.is_none())
                    }
                })
                .await?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                slug: slug.clone(),
                title,
                description: cmd.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminError::Taken(slug),
                other => AdminError::Repo(other),
            })?;

        info!(
            target = "inkwell::application::admin",
            group_id = group.id,
            slug = %group.slug,
            "group created"
        );
        Ok(group)
    }
}

/// Letters, digits and `@ . + - _`, at most 150 characters.
fn validate_username(username: &str) -> Result<(), DomainError> {
    if username.is_empty() {
        return Err(DomainError::validation("username must not be empty"));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(DomainError::validation(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(DomainError::validation(
            "username may only contain letters, digits and @/./+/-/_",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_allow_punctuation_subset() {
        assert!(validate_username("leo.tolstoy+1@x_y-z").is_ok());
        assert!(validate_username("Лев").is_ok());
        assert!(validate_username("two words").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }
}
