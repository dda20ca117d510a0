//! In-memory repositories and an app harness for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use inkwell::{
    application::{
        admin::{AdminService, CreateGroupCommand},
        comments::CommentService,
        feed::FeedService,
        follows::FollowService,
        pagination::PageSlice,
        posts::PostService,
        repos::{
            CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
            CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, PostQueryFilter,
            PostsRepo, PostsWriteRepo, RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
        },
        sessions::{CurrentUser, SessionService},
    },
    cache::{CacheConfig, CacheState, CacheTrigger, MemoryPageCache, PageCache},
    domain::entities::{
        AuthorRef, CommentRecord, FollowRecord, GroupRecord, GroupRef, PostRecord, SessionRecord,
        UserRecord,
    },
    infra::{
        http::{AdminState, DatabaseHealth, HttpState, SessionCookie, build_admin_router, build_router},
        uploads::UploadStorage,
    },
};
use tempfile::TempDir;
use time::{OffsetDateTime, macros::datetime};
use tokio::sync::Mutex;
use tower::ServiceExt;

pub const SESSION_COOKIE: &str = "inkwell_session";

/// 1×1 transparent GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x21, 0xf9,
    0x04, 0x01, 0x0a, 0x00, 0x01, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
    0x00, 0x02, 0x02, 0x4c, 0x01, 0x00, 0x3b,
];

#[derive(Default)]
struct Tables {
    next_id: i64,
    ticks: i64,
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so creation order is observable.
    fn tick(&mut self) -> OffsetDateTime {
        self.ticks += 1;
        datetime!(2024-01-01 00:00 UTC) + time::Duration::minutes(self.ticks)
    }

    fn matches(&self, post: &PostRecord, filter: &PostQueryFilter) -> bool {
        if let Some(group_id) = filter.group_id
            && post.group.as_ref().map(|g| g.id) != Some(group_id)
        {
            return false;
        }
        if let Some(author_id) = filter.author_id
            && post.author.id != author_id
        {
            return false;
        }
        if let Some(user_id) = filter.followed_by
            && !self
                .follows
                .iter()
                .any(|f| f.user_id == user_id && f.author_id == post.author.id)
        {
            return false;
        }
        true
    }

    fn group_ref(&self, group_id: Option<i64>) -> Result<Option<GroupRef>, RepoError> {
        match group_id {
            None => Ok(None),
            Some(id) => self
                .groups
                .iter()
                .find(|g| g.id == id)
                .map(|g| {
                    Some(GroupRef {
                        id: g.id,
                        slug: g.slug.clone(),
                        title: g.title.clone(),
                    })
                })
                .ok_or_else(|| RepoError::Integrity {
                    message: format!("group {id} does not exist"),
                }),
        }
    }

    fn author_ref(&self, user_id: i64) -> Result<AuthorRef, RepoError> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| AuthorRef {
                id: u.id,
                username: u.username.clone(),
            })
            .ok_or_else(|| RepoError::Integrity {
                message: format!("user {user_id} does not exist"),
            })
    }
}

/// Every repository trait over one mutex-guarded set of tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub async fn comment_count(&self, post_id: i64) -> usize {
        self.tables
            .lock()
            .await
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .count()
    }

    pub async fn follow_count(&self, user_id: i64, author_id: i64) -> usize {
        self.tables
            .lock()
            .await
            .follows
            .iter()
            .filter(|f| f.user_id == user_id && f.author_id == author_id)
            .count()
    }

    pub async fn all_follows(&self) -> usize {
        self.tables.lock().await.follows.len()
    }
}

#[async_trait]
impl UsersRepo for MemoryStore {
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            created_at: tables.tick(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl GroupsRepo for MemoryStore {
    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let mut groups = self.tables.lock().await.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|g| g.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            slug: params.slug,
            title: params.title,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn count_posts(&self, filter: &PostQueryFilter) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|p| tables.matches(p, filter))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        slice: PageSlice,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<PostRecord> = tables
            .posts
            .iter()
            .filter(|p| tables.matches(p, filter))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts
            .into_iter()
            .skip(slice.offset as usize)
            .take(slice.limit as usize)
            .collect())
    }

    async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.posts.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let author = tables.author_ref(params.author_id)?;
        let group = tables.group_ref(params.group_id)?;
        let now = tables.tick();
        let post = PostRecord {
            id: tables.next_id(),
            text: params.text,
            image: params.image,
            author,
            group,
            created_at: now,
            updated_at: now,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let group = tables.group_ref(params.group_id)?;
        let now = tables.tick();
        let post = tables
            .posts
            .iter_mut()
            .find(|p| p.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group = group;
        post.image = params.image;
        post.updated_at = now;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != id);
        if tables.posts.len() == before {
            return Err(RepoError::NotFound);
        }
        tables.comments.retain(|c| c.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_comments_for_post(
        &self,
        post_id: i64,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.posts.iter().any(|p| p.id == params.post_id) {
            return Err(RepoError::Integrity {
                message: format!("post {} does not exist", params.post_id),
            });
        }
        let author = tables.author_ref(params.author_id)?;
        let comment = CommentRecord {
            id: tables.next_id(),
            post_id: params.post_id,
            author,
            text: params.text,
            created_at: tables.tick(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn create_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if user_id == author_id {
            return Err(RepoError::Integrity {
                message: "follows_not_self".to_string(),
            });
        }
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(false);
        }
        let follow = FollowRecord {
            id: tables.next_id(),
            user_id,
            author_id,
            created_at: tables.tick(),
        };
        tables.follows.push(follow);
        Ok(true)
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() != before)
    }
}

#[async_trait]
impl SessionsRepo for MemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            user_id: params.user_id,
            prefix: params.prefix,
            secret_hash: params.secret_hash,
            expires_at: params.expires_at,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.prefix == prefix).cloned())
    }

    async fn revoke_session(&self, id: i64, revoked_at: OffsetDateTime) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(session) = tables.sessions.iter_mut().find(|s| s.id == id) {
            session.revoked_at.get_or_insert(revoked_at);
        }
        Ok(())
    }
}

struct AlwaysHealthy;

#[async_trait]
impl DatabaseHealth for AlwaysHealthy {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

/// Services wired over one [`MemoryStore`], plus the public and admin routers.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryPageCache>,
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub sessions: Arc<SessionService>,
    pub admin: AdminService,
    pub router: Router,
    pub admin_router: Router,
    _media: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn with_cache(cache_config: CacheConfig) -> Self {
        let store = MemoryStore::new();
        let media_dir = tempfile::tempdir().expect("create media dir");
        let media = Arc::new(
            UploadStorage::new(media_dir.path().to_path_buf()).expect("init media storage"),
        );

        let cache = Arc::new(MemoryPageCache::new(&cache_config));
        let page_cache: Arc<dyn PageCache> = cache.clone();
        let trigger = (cache_config.enabled && cache_config.flush_on_write)
            .then(|| CacheTrigger::new(page_cache.clone()));
        let cache_state = cache_config.enabled.then(|| CacheState {
            config: cache_config.clone(),
            store: page_cache.clone(),
        });

        let feed = Arc::new(FeedService::new(store.clone(), store.clone(), store.clone()));
        let posts = Arc::new(
            PostService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                media.clone(),
            )
            .with_cache_trigger_opt(trigger),
        );
        let comments = Arc::new(CommentService::new(store.clone(), store.clone()));
        let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
        let sessions = Arc::new(SessionService::new(
            store.clone(),
            store.clone(),
            Duration::from_secs(3600),
        ));
        let admin = AdminService::new(store.clone(), store.clone());

        let router = build_router(HttpState {
            feed: feed.clone(),
            posts: posts.clone(),
            comments: comments.clone(),
            follows: follows.clone(),
            sessions: sessions.clone(),
            media,
            session_cookie: SessionCookie::new(SESSION_COOKIE, Duration::from_secs(3600)),
            cache: cache_state,
            upload_body_limit: 1024 * 1024,
        });
        let admin_router = build_admin_router(AdminState {
            db: Arc::new(AlwaysHealthy),
            cache: page_cache,
        });

        Self {
            store,
            cache,
            feed,
            posts,
            comments,
            follows,
            sessions,
            admin,
            router,
            admin_router,
            _media: media_dir,
        }
    }

    pub async fn user(&self, username: &str) -> UserRecord {
        self.admin.create_user(username).await.expect("create user")
    }

    pub async fn group(&self, title: &str, slug: &str) -> GroupRecord {
        self.admin
            .create_group(CreateGroupCommand {
                title: title.to_string(),
                slug: Some(slug.to_string()),
                description: format!("All about {title}"),
            })
            .await
            .expect("create group")
    }

    pub async fn post(&self, author: &UserRecord, text: &str, group: Option<&GroupRecord>) -> PostRecord {
        self.store
            .create_post(CreatePostParams {
                author_id: author.id,
                text: text.to_string(),
                group_id: group.map(|g| g.id),
                image: None,
            })
            .await
            .expect("create post")
    }

    /// `Cookie` header value carrying a fresh session for `user`.
    pub async fn login(&self, user: &UserRecord) -> String {
        let issued = self.sessions.issue(user).await.expect("issue session");
        format!("{SESSION_COOKIE}={}", issued.token)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        form: &MultipartBody,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, form.content_type());
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(form.bytes())).expect("request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn flush_cache(&self) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri("/cache/flush")
            .body(Body::empty())
            .expect("request");
        self.admin_router
            .clone()
            .oneshot(request)
            .await
            .expect("admin router should respond")
    }
}

pub fn current(user: &UserRecord) -> CurrentUser {
    CurrentUser::from(user)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Hand-built `multipart/form-data` payload.
pub struct MultipartBody {
    boundary: &'static str,
    parts: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "inkwell-test-boundary",
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.parts.extend_from_slice(data);
        self.parts.extend_from_slice(b"\r\n");
        self
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn bytes(&self) -> Vec<u8> {
        let mut body = self.parts.clone();
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}
