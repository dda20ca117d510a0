use std::{io::ErrorKind, sync::Arc};

use axum::{
    Extension, Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        comments::{CommentError, CommentService},
        error::{ErrorReport, HttpError},
        feed::{Feed, FeedError, FeedService, FeedSubject, FeedView},
        follows::{FollowError, FollowService},
        forms::{CommentInput, FieldErrors, PostInput},
        pagination::PageNumber,
        posts::{PostDetail, PostError, PostService},
        repos::RepoError,
        sessions::{CurrentUser, SessionService},
    },
    cache::{CacheState, index_cache_layer},
    infra::uploads::{UploadStorage, UploadStorageError},
    presentation::views::{
        CommentFormView, CommentView, FeedContext, FollowTemplate, GroupTemplate, IndexTemplate,
        LayoutChrome, LayoutContext, PostCard, PostDetailContext, PostDetailTemplate,
        PostFormContext, PostFormTemplate, ProfileContext, ProfileTemplate, post_href,
        profile_href, render_error_response, render_not_found_response, render_template_response,
    },
};

use super::{
    auth::{SessionCookie, Viewer, login_form, login_submit, logout, require_login, resolve_viewer},
    forms::read_post_form,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub sessions: Arc<SessionService>,
    pub media: Arc<UploadStorage>,
    pub session_cookie: SessionCookie,
    pub cache: Option<CacheState>,
    pub upload_body_limit: usize,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the global index is served from the page cache.
    let index_routes = Router::new().route("/", get(index));
    let index_routes = if let Some(cache_state) = state.cache.clone() {
        index_routes.layer(middleware::from_fn_with_state(
            cache_state,
            index_cache_layer,
        ))
    } else {
        index_routes
    };

    let member_routes = Router::new()
        .route("/follow/", get(follow_index))
        .route("/create/", get(create_form).post(create_submit))
        .route("/posts/{id}/edit/", get(edit_form).post(edit_submit))
        .route("/posts/{id}/delete/", post(delete_post))
        .route("/posts/{id}/comment/", post(add_comment))
        .route(
            "/profile/{username}/follow/",
            get(follow_author).post(follow_author),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(unfollow_author).post(unfollow_author),
        )
        .route_layer(middleware::from_fn(require_login))
        .layer(DefaultBodyLimit::max(state.upload_body_limit));

    let open_routes = Router::new()
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/posts/{id}/", get(post_detail))
        .route("/auth/login/", get(login_form).post(login_submit))
        .route("/auth/logout/", post(logout))
        .route("/media/{*path}", get(serve_media));

    index_routes
        .merge(member_routes)
        .merge(open_routes)
        .fallback(not_found)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, resolve_viewer))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn number(&self) -> PageNumber {
        PageNumber::parse(self.page.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    text: String,
}

async fn index(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref());
    let view = FeedView::All;
    let base_path = view.base_path();

    match state.feed.build_feed(view, query.number()).await {
        Ok(feed) => {
            let content = FeedContext::new("Latest posts", &feed.page, &base_path);
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref());
    let view = FeedView::ByGroup(slug);
    let base_path = view.base_path();

    match state.feed.build_feed(view, query.number()).await {
        Ok(Feed {
            subject: FeedSubject::Group(group),
            page,
        }) => {
            let content = FeedContext::new(group.to_string(), &page, &base_path)
                .with_description(group.description.clone())
                .with_empty_message("This group has no posts yet.");
            let view = LayoutContext::new(chrome.with_title(&group.title), content);
            render_template_response(GroupTemplate { view }, StatusCode::OK)
        }
        Ok(_) => unexpected_subject(chrome, "infra::http::public::group_posts"),
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    const SOURCE: &str = "infra::http::public::profile";

    let chrome = LayoutChrome::new(viewer.as_ref());
    let view = FeedView::ByAuthor(username);
    let base_path = view.base_path();

    let (author, page) = match state.feed.build_feed(view, query.number()).await {
        Ok(Feed {
            subject: FeedSubject::Author(author),
            page,
        }) => (author, page),
        Ok(_) => return unexpected_subject(chrome, SOURCE),
        Err(err) => return feed_error_to_response(err, chrome),
    };

    let following = match state.follows.is_following(viewer.as_ref(), &author).await {
        Ok(following) => following,
        Err(err) => return follow_error_to_response(err, chrome),
    };

    let content = ProfileContext {
        username: author.username.clone(),
        post_count: page.total,
        following,
        show_follow_controls: viewer.as_ref().is_some_and(|user| user.id != author.id),
        follow_action: format!("/profile/{}/follow/", author.username),
        unfollow_action: format!("/profile/{}/unfollow/", author.username),
        feed: FeedContext::new(format!("Posts by {}", author.username), &page, &base_path),
    };
    let view = LayoutContext::new(chrome.with_title(&author.username), content);
    render_template_response(ProfileTemplate { view }, StatusCode::OK)
}

async fn follow_index(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user)).with_title("Following");
    let view = FeedView::FollowedBy(user.id);
    let base_path = view.base_path();

    match state.feed.build_feed(view, query.number()).await {
        Ok(feed) => {
            let content = FeedContext::new("Posts from authors you follow", &feed.page, &base_path)
                .with_empty_message("Follow some authors to see their posts here.");
            let view = LayoutContext::new(chrome, content);
            render_template_response(FollowTemplate { view }, StatusCode::OK)
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Viewer(viewer): Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref());
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.post_detail(post_id).await {
        Ok(detail) => {
            let form = viewer.as_ref().map(|_| CommentFormView::blank(post_id));
            render_post_detail(chrome, viewer.as_ref(), detail, form)
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn add_comment(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    let input = CommentInput {
        text: form.text.clone(),
    };
    match state.comments.add_comment(&user, post_id, input).await {
        Ok(_) => Redirect::to(&post_href(post_id)).into_response(),
        Err(CommentError::Invalid(errors)) => match state.posts.post_detail(post_id).await {
            Ok(detail) => {
                let form = CommentFormView::blank(post_id).with_errors(form.text, &errors);
                render_post_detail(chrome, Some(&user), detail, Some(form))
            }
            Err(err) => post_error_to_response(err, chrome),
        },
        Err(CommentError::UnknownPost(_)) => render_not_found_response(chrome),
        Err(CommentError::Repo(err)) => {
            repo_error_response(chrome, "infra::http::public::add_comment", &err)
        }
    }
}

async fn create_form(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user)).with_title("New post");
    match state.posts.groups().await {
        Ok(groups) => {
            let view = LayoutContext::new(chrome, PostFormContext::create(&groups));
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn create_submit(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Response {
    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };
    let chrome = LayoutChrome::new(Some(&user)).with_title("New post");
    let submitted = input.clone();

    match state.posts.create_post(&user, input).await {
        Ok(_) => Redirect::to(&profile_href(&user.username)).into_response(),
        Err(PostError::Invalid(errors)) => {
            render_rejected_form(&state, chrome, None, submitted, &errors).await
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn edit_form(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user)).with_title("Edit post");
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    let post = match state.posts.editable_post(&user, post_id).await {
        Ok(post) => post,
        Err(err) => return post_error_to_response(err, chrome),
    };
    match state.posts.groups().await {
        Ok(groups) => {
            let view = LayoutContext::new(chrome, PostFormContext::edit(&post, &groups));
            render_template_response(PostFormTemplate { view }, StatusCode::OK)
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn edit_submit(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user)).with_title("Edit post");
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };
    let input = match read_post_form(&mut multipart).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };
    let submitted = input.clone();

    match state.posts.update_post(&user, post_id, input).await {
        Ok(_) => Redirect::to(&post_href(post_id)).into_response(),
        Err(PostError::Invalid(errors)) => {
            let post = match state.posts.editable_post(&user, post_id).await {
                Ok(post) => post,
                Err(err) => return post_error_to_response(err, chrome),
            };
            render_rejected_form(&state, chrome, Some(&post), submitted, &errors).await
        }
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn delete_post(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(Some(&user));
    let Some(post_id) = parse_post_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.delete_post(&user, post_id).await {
        Ok(()) => Redirect::to(&profile_href(&user.username)).into_response(),
        Err(err) => post_error_to_response(err, chrome),
    }
}

async fn follow_author(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Response {
    match state.follows.follow(&user, &username).await {
        Ok(_) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => follow_error_to_response(err, LayoutChrome::new(Some(&user))),
    }
}

async fn unfollow_author(
    State(state): State<HttpState>,
    Extension(user): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Response {
    match state.follows.unfollow(&user, &username).await {
        Ok(()) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => follow_error_to_response(err, LayoutChrome::new(Some(&user))),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn not_found(Viewer(viewer): Viewer) -> Response {
    render_not_found_response(LayoutChrome::new(viewer.as_ref()))
}

fn render_post_detail(
    chrome: LayoutChrome,
    viewer: Option<&CurrentUser>,
    detail: PostDetail,
    comment_form: Option<CommentFormView>,
) -> Response {
    let PostDetail {
        post,
        author_post_count,
        comments,
    } = detail;

    let content = PostDetailContext {
        card: PostCard::from(&post),
        text: post.text.clone(),
        author_post_count,
        can_edit: viewer.is_some_and(|user| post.is_authored_by(user.id)),
        edit_href: format!("/posts/{}/edit/", post.id),
        delete_action: format!("/posts/{}/delete/", post.id),
        comments: comments.iter().map(CommentView::from).collect(),
        comment_form,
    };
    let view = LayoutContext::new(chrome.with_title(post.to_string()), content);
    render_template_response(PostDetailTemplate { view }, StatusCode::OK)
}

async fn render_rejected_form(
    state: &HttpState,
    chrome: LayoutChrome,
    existing: Option<&crate::domain::entities::PostRecord>,
    submitted: PostInput,
    errors: &FieldErrors,
) -> Response {
    let groups = match state.posts.groups().await {
        Ok(groups) => groups,
        Err(err) => return post_error_to_response(err, chrome),
    };

    let form = match existing {
        Some(post) => PostFormContext::edit(post, &groups),
        None => PostFormContext::create(&groups),
    };
    let group = submitted.group_slug().map(str::to_string);
    let form = form.resubmitted(submitted.text, group.as_deref(), &groups, errors);
    let view = LayoutContext::new(chrome, form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

/// Path ids are positive integers; anything else names no post.
fn parse_post_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    const SOURCE: &str = "infra::http::public::feed_error_to_response";

    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(SOURCE, StatusCode::NOT_FOUND, &err).attach(&mut response);
            response
        }
        FeedError::Repo(repo) => repo_error_response(chrome, SOURCE, &repo),
    }
}

fn post_error_to_response(err: PostError, chrome: LayoutChrome) -> Response {
    const SOURCE: &str = "infra::http::public::post_error_to_response";

    match err {
        PostError::NotFound(_) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(SOURCE, StatusCode::NOT_FOUND, &err).attach(&mut response);
            response
        }
        PostError::Forbidden { post_id, .. } => Redirect::to(&post_href(post_id)).into_response(),
        PostError::Repo(repo) => repo_error_response(chrome, SOURCE, &repo),
        PostError::Invalid(_) | PostError::Media(_) => render_error_response(
            chrome,
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err),
        ),
    }
}

fn follow_error_to_response(err: FollowError, chrome: LayoutChrome) -> Response {
    const SOURCE: &str = "infra::http::public::follow_error_to_response";

    match err {
        FollowError::UnknownAuthor(_) | FollowError::NotFollowing { .. } => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(SOURCE, StatusCode::NOT_FOUND, &err).attach(&mut response);
            response
        }
        FollowError::Repo(repo) => repo_error_response(chrome, SOURCE, &repo),
    }
}

fn repo_error_response(chrome: LayoutChrome, source: &'static str, err: &RepoError) -> Response {
    let status = match err {
        RepoError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    render_error_response(chrome, ErrorReport::from_error(source, status, err))
}

fn unexpected_subject(chrome: LayoutChrome, source: &'static str) -> Response {
    render_error_response(
        chrome,
        ErrorReport::from_message(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "feed resolved to an unexpected subject",
        ),
    )
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"));

    response
}
