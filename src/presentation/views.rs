use crate::application::error::{ErrorReport, HttpError};
use crate::application::forms::FieldErrors;
use crate::application::pagination::Page;
use crate::application::sessions::CurrentUser;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::{HUMAN_DATE_FORMAT, HUMAN_DATETIME_FORMAT};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const SITE_TITLE: &str = "Inkwell";
const EXCERPT_CHARS: usize = 280;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Renders the shared error page for a failure, attaching `report` for the response log.
pub fn render_error_response(chrome: LayoutChrome, report: ErrorReport) -> Response {
    let status = report.status;
    let content = ErrorPageView::server_error();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, status);
    report.attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
    pub profile_href: String,
}

/// Header state shared by every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: String,
    pub page_title: String,
    pub navigation: Vec<NavigationLinkView>,
    pub viewer: Option<ViewerView>,
    /// Where the sign-in link sends the visitor back to.
    pub login_href: String,
}

impl LayoutChrome {
    pub fn new(viewer: Option<&CurrentUser>) -> Self {
        let mut navigation = vec![
            NavigationLinkView {
                label: "Latest".to_string(),
                href: "/".to_string(),
            },
        ];
        if viewer.is_some() {
            navigation.push(NavigationLinkView {
                label: "Following".to_string(),
                href: "/follow/".to_string(),
            });
            navigation.push(NavigationLinkView {
                label: "New post".to_string(),
                href: "/create/".to_string(),
            });
        }

        Self {
            site_title: SITE_TITLE.to_string(),
            page_title: SITE_TITLE.to_string(),
            navigation,
            viewer: viewer.map(|user| ViewerView {
                username: user.username.clone(),
                profile_href: profile_href(&user.username),
            }),
            login_href: "/auth/login/".to_string(),
        }
    }

    pub fn with_title(self, title: impl AsRef<str>) -> Self {
        Self {
            page_title: format!("{} · {}", title.as_ref(), self.site_title),
            ..self
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub chrome: LayoutChrome,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self { chrome, content }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub href: String,
    pub headline: String,
    pub excerpt: String,
    pub author: String,
    pub author_href: String,
    pub group: Option<GroupBadge>,
    pub image_url: Option<String>,
    pub iso_date: String,
    pub published: String,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            href: post_href(post.id),
            headline: post.to_string(),
            excerpt: excerpt(&post.text, EXCERPT_CHARS),
            author: post.author.username.clone(),
            author_href: profile_href(&post.author.username),
            group: post.group.as_ref().map(|group| GroupBadge {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_url),
            iso_date: iso_date(post.created_at),
            published: human_date(post.created_at),
        }
    }
}

/// Previous/next links for a paginated listing.
#[derive(Clone)]
pub struct PaginatorView {
    pub number: u32,
    pub num_pages: u32,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
}

impl PaginatorView {
    pub fn new<T>(page: &Page<T>, base_path: &str) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous_href: page
                .previous_number()
                .map(|number| page_href(base_path, number)),
            next_href: page.next_number().map(|number| page_href(base_path, number)),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

pub struct FeedContext {
    pub heading: String,
    pub description: Option<String>,
    pub posts: Vec<PostCard>,
    pub has_results: bool,
    pub total_count: u64,
    pub paginator: PaginatorView,
    pub empty_message: String,
}

impl FeedContext {
    pub fn new(heading: impl Into<String>, page: &Page<PostRecord>, base_path: &str) -> Self {
        Self {
            heading: heading.into(),
            description: None,
            posts: page.items.iter().map(PostCard::from).collect(),
            has_results: !page.is_empty(),
            total_count: page.total,
            paginator: PaginatorView::new(page, base_path),
            empty_message: "No posts yet.".to_string(),
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            description: (!description.trim().is_empty()).then_some(description),
            ..self
        }
    }

    pub fn with_empty_message(self, message: impl Into<String>) -> Self {
        Self {
            empty_message: message.into(),
            ..self
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct ProfileContext {
    pub username: String,
    pub post_count: u64,
    pub following: bool,
    /// Follow controls are hidden from anonymous visitors and from the author.
    pub show_follow_controls: bool,
    pub follow_action: String,
    pub unfollow_action: String,
    pub feed: FeedContext,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

pub struct CommentView {
    pub author: String,
    pub author_href: String,
    pub text: String,
    pub posted: String,
    pub iso_date: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author.username.clone(),
            author_href: profile_href(&comment.author.username),
            text: comment.text.clone(),
            posted: human_datetime(comment.created_at),
            iso_date: iso_date(comment.created_at),
        }
    }
}

pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub errors: Vec<String>,
}

impl CommentFormView {
    pub fn blank(post_id: i64) -> Self {
        Self {
            action: format!("/posts/{post_id}/comment/"),
            text: String::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(self, text: String, errors: &FieldErrors) -> Self {
        Self {
            text,
            errors: errors.field("text").to_vec(),
            ..self
        }
    }
}

pub struct PostDetailContext {
    pub card: PostCard,
    pub text: String,
    pub author_post_count: u64,
    pub can_edit: bool,
    pub edit_href: String,
    pub delete_action: String,
    pub comments: Vec<CommentView>,
    /// Present only for signed-in viewers.
    pub comment_form: Option<CommentFormView>,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct GroupOption {
    pub slug: String,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub current_image: Option<String>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormContext {
    pub fn create(groups: &[GroupRecord]) -> Self {
        Self {
            is_edit: false,
            action: "/create/".to_string(),
            text: String::new(),
            groups: group_options(groups, None),
            current_image: None,
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    pub fn edit(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        Self {
            is_edit: true,
            action: format!("/posts/{}/edit/", post.id),
            text: post.text.clone(),
            groups: group_options(groups, post.group.as_ref().map(|g| g.slug.as_str())),
            current_image: post.image.as_deref().map(media_url),
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    /// Re-fill the form from a rejected submission.
    pub fn resubmitted(
        self,
        text: String,
        group: Option<&str>,
        groups: &[GroupRecord],
        errors: &FieldErrors,
    ) -> Self {
        Self {
            text,
            groups: group_options(groups, group),
            text_errors: errors.field("text").to_vec(),
            group_errors: errors.field("group").to_vec(),
            image_errors: errors.field("image").to_vec(),
            ..self
        }
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct LoginContext {
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            title: "Something Went Wrong".to_string(),
            message: "The request could not be completed. Please try again later.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

fn page_href(base_path: &str, number: u32) -> String {
    format!("{base_path}?page={number}")
}

fn group_options(groups: &[GroupRecord], selected: Option<&str>) -> Vec<GroupOption> {
    groups
        .iter()
        .map(|group| GroupOption {
            slug: group.slug.clone(),
            title: group.to_string(),
            selected: selected == Some(group.slug.as_str()),
        })
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", trimmed[..end].trim_end()),
        None => trimmed.to_string(),
    }
}

fn human_date(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATE_FORMAT).unwrap_or_default()
}

fn human_datetime(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATETIME_FORMAT).unwrap_or_default()
}

fn iso_date(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AuthorRef, GroupRef};
    use time::macros::datetime;

    fn post() -> PostRecord {
        PostRecord {
            id: 7,
            text: "Тестовый пост про Rust".to_string(),
            image: Some("posts/cat.gif".to_string()),
            author: AuthorRef {
                id: 1,
                username: "leo".to_string(),
            },
            group: Some(GroupRef {
                id: 3,
                slug: "rust".to_string(),
                title: "Rust".to_string(),
            }),
            created_at: datetime!(2024-03-05 10:30 UTC),
            updated_at: datetime!(2024-03-05 10:30 UTC),
        }
    }

    #[test]
    fn post_card_links_author_group_and_media() {
        let card = PostCard::from(&post());

        assert_eq!(card.href, "/posts/7/");
        assert_eq!(card.headline, "Тестовый пост п");
        assert_eq!(card.author_href, "/profile/leo/");
        assert_eq!(card.group.map(|g| g.href).as_deref(), Some("/group/rust/"));
        assert_eq!(card.image_url.as_deref(), Some("/media/posts/cat.gif"));
        assert_eq!(card.published, "5 March 2024");
    }

    #[test]
    fn paginator_links_neighbouring_pages() {
        let page = Page {
            items: vec![(); 10],
            number: 2,
            num_pages: 3,
            total: 23,
        };
        let paginator = PaginatorView::new(&page, "/group/rust/");

        assert!(paginator.is_paginated());
        assert_eq!(
            paginator.previous_href.as_deref(),
            Some("/group/rust/?page=1")
        );
        assert_eq!(paginator.next_href.as_deref(), Some("/group/rust/?page=3"));
    }

    #[test]
    fn excerpt_truncates_on_character_boundary() {
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("абвгдеёжз", 3), "абв…");
    }

    #[test]
    fn chrome_navigation_depends_on_viewer() {
        let anonymous = LayoutChrome::new(None);
        assert_eq!(anonymous.navigation.len(), 1);
        assert!(anonymous.viewer.is_none());

        let user = CurrentUser {
            id: 1,
            username: "leo".to_string(),
        };
        let signed_in = LayoutChrome::new(Some(&user)).with_title("Following");
        assert_eq!(signed_in.navigation.len(), 3);
        assert_eq!(signed_in.page_title, "Following · Inkwell");
    }
}
