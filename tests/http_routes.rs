mod support;

use axum::http::StatusCode;
use bytes::Bytes;
use inkwell::application::forms::{ImageUpload, PostInput};
use inkwell::cache::CacheConfig;
use support::{MultipartBody, SMALL_GIF, TestApp, body_text, location};

fn uncached() -> TestApp {
    TestApp::with_cache(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    })
}

#[tokio::test]
async fn anonymous_comment_redirects_to_login() {
    let app = uncached();
    let author = app.user("author").await;
    let post = app.post(&author, "Commentable", None).await;
    let uri = format!("/posts/{}/comment/", post.id);

    let response = app.post_form(&uri, "text=sneaky", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("/auth/login/?next=/posts/{}/comment/", post.id)
    );
    assert_eq!(app.store.comment_count(post.id).await, 0);
}

#[tokio::test]
async fn anonymous_member_pages_redirect_to_login() {
    let app = uncached();
    let author = app.user("author").await;
    let post = app.post(&author, "Guarded", None).await;

    for uri in [
        "/follow/".to_string(),
        "/create/".to_string(),
        "/profile/author/follow/".to_string(),
        "/profile/author/unfollow/".to_string(),
        format!("/posts/{}/edit/", post.id),
    ] {
        let response = app.get(&uri, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), format!("/auth/login/?next={uri}"));
    }
    assert_eq!(app.store.all_follows().await, 0);
}

#[tokio::test]
async fn signed_in_comment_is_saved() {
    let app = uncached();
    let author = app.user("author").await;
    let reader = app.user("reader").await;
    let post = app.post(&author, "Commentable", None).await;
    let cookie = app.login(&reader).await;

    let response = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            "text=Great+read",
            Some(&cookie),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));
    assert_eq!(app.store.comment_count(post.id).await, 1);

    let detail = body_text(app.get(&format!("/posts/{}/", post.id), None).await).await;
    assert!(detail.contains("Great read"));
}

#[tokio::test]
async fn blank_comment_rerenders_detail_with_error() {
    let app = uncached();
    let author = app.user("author").await;
    let post = app.post(&author, "Commentable", None).await;
    let cookie = app.login(&author).await;

    let response = app
        .post_form(&format!("/posts/{}/comment/", post.id), "text=+", Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("This field is required."));
    assert_eq!(app.store.comment_count(post.id).await, 0);
}

#[tokio::test]
async fn unknown_pages_render_not_found() {
    let app = uncached();

    for uri in [
        "/unexisting_page/",
        "/posts/999/",
        "/posts/abc/",
        "/group/missing/",
        "/profile/nobody/",
    ] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn public_pages_render() {
    let app = uncached();
    let author = app.user("author").await;
    let group = app.group("Travel", "travel").await;
    let post = app.post(&author, "Hello from the road", Some(&group)).await;

    for uri in [
        "/".to_string(),
        "/group/travel/".to_string(),
        "/profile/author/".to_string(),
        format!("/posts/{}/", post.id),
        "/auth/login/".to_string(),
    ] {
        let response = app.get(&uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }

    let group_page = body_text(app.get("/group/travel/", None).await).await;
    assert!(group_page.contains("Hello from the road"));
    assert!(group_page.contains("All about Travel"));
}

#[tokio::test]
async fn index_paginates_by_ten() {
    let app = uncached();
    let author = app.user("author").await;
    for n in 0..13 {
        app.post(&author, &format!("numbered post {n:02}"), None).await;
    }

    let first = body_text(app.get("/", None).await).await;
    assert_eq!(first.matches("class=\"post-card\"").count(), 10);
    assert!(first.contains("Page 1 of 2"));
    assert!(first.contains("numbered post 12"));

    let second = body_text(app.get("/?page=2", None).await).await;
    assert_eq!(second.matches("class=\"post-card\"").count(), 3);
    assert!(second.contains("numbered post 00"));

    let clamped = body_text(app.get("/?page=50", None).await).await;
    assert!(clamped.contains("Page 2 of 2"));
}

#[tokio::test]
async fn create_post_redirects_to_profile() {
    let app = uncached();
    let author = app.user("author").await;
    app.group("Travel", "travel").await;
    let cookie = app.login(&author).await;

    let form = MultipartBody::new()
        .text("text", "Fresh post")
        .text("group", "travel")
        .file("image", "small.gif", SMALL_GIF);
    let response = app.post_multipart("/create/", &form, Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/author/");
    assert_eq!(app.store.post_count().await, 1);

    let media = app.get("/media/posts/small.gif", None).await;
    assert_eq!(media.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_create_rerenders_form() {
    let app = uncached();
    let author = app.user("author").await;
    let cookie = app.login(&author).await;

    let form = MultipartBody::new().text("text", "").text("group", "");
    let response = app.post_multipart("/create/", &form, Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("This field is required."));
    assert_eq!(app.store.post_count().await, 0);
}

#[tokio::test]
async fn non_author_edit_redirects_to_detail() {
    let app = uncached();
    let author = app.user("author").await;
    let intruder = app.user("intruder").await;
    let post = app.post(&author, "Original", None).await;
    let cookie = app.login(&intruder).await;

    let response = app
        .get(&format!("/posts/{}/edit/", post.id), Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));

    let form = MultipartBody::new().text("text", "Hijacked");
    let response = app
        .post_multipart(&format!("/posts/{}/edit/", post.id), &form, Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let detail = app.posts.post_detail(post.id).await.expect("detail");
    assert_eq!(detail.post.text, "Original");
}

#[tokio::test]
async fn author_edit_updates_post() {
    let app = uncached();
    let author = app.user("author").await;
    let post = app.post(&author, "Original", None).await;
    let cookie = app.login(&author).await;

    let edit_page = app
        .get(&format!("/posts/{}/edit/", post.id), Some(&cookie))
        .await;
    assert_eq!(edit_page.status(), StatusCode::OK);

    let form = MultipartBody::new().text("text", "Revised");
    let response = app
        .post_multipart(&format!("/posts/{}/edit/", post.id), &form, Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}/", post.id));
    let detail = app.posts.post_detail(post.id).await.expect("detail");
    assert_eq!(detail.post.text, "Revised");
}

#[tokio::test]
async fn follow_routes_manage_edges() {
    let app = uncached();
    let reader = app.user("reader").await;
    let author = app.user("author").await;
    app.post(&author, "Worth following", None).await;
    let cookie = app.login(&reader).await;

    let response = app
        .post_form("/profile/author/follow/", "", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/author/");
    assert_eq!(app.store.follow_count(reader.id, author.id).await, 1);

    let feed = body_text(app.get("/follow/", Some(&cookie)).await).await;
    assert!(feed.contains("Worth following"));

    let response = app.get("/profile/author/unfollow/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.store.follow_count(reader.id, author.id).await, 0);

    let response = app
        .post_form("/profile/author/unfollow/", "", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_with_token_sets_cookie() {
    let app = uncached();
    let user = app.user("member").await;
    let issued = app.sessions.issue(&user).await.expect("issue");

    let response = app
        .post_form(
            "/auth/login/",
            &format!("token={}&next=%2Fcreate%2F", issued.token),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/create/");
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    assert!(cookie.starts_with(&format!("{}=", support::SESSION_COOKIE)));

    let rejected = app.post_form("/auth/login/", "token=bogus", None).await;
    assert_eq!(rejected.status(), StatusCode::OK);
    assert!(body_text(rejected).await.contains("invalid or has expired"));
}

#[tokio::test]
async fn deleting_post_keeps_identical_image_of_another_post() {
    let app = uncached();
    let author = app.user("author").await;
    let viewer = support::current(&author);

    let mut images = Vec::new();
    let mut ids = Vec::new();
    for n in 0..3 {
        let post = app
            .posts
            .create_post(
                &viewer,
                PostInput {
                    text: format!("copy {n}"),
                    group: None,
                    image: Some(ImageUpload {
                        file_name: "x.gif".to_string(),
                        data: Bytes::from_static(SMALL_GIF),
                    }),
                },
            )
            .await
            .expect("create post");
        ids.push(post.id);
        images.push(post.image.expect("image stored"));
    }
    assert_ne!(images[1], images[2]);

    app.posts.delete_post(&viewer, ids[2]).await.expect("delete");

    for image in &images[..2] {
        let response = app.get(&format!("/media/{image}"), None).await;
        assert_eq!(response.status(), StatusCode::OK, "{image}");
    }
}

#[tokio::test]
async fn login_ignores_next_with_embedded_tab() {
    let app = uncached();
    let user = app.user("member").await;
    let issued = app.sessions.issue(&user).await.expect("issue");

    let response = app
        .post_form(
            "/auth/login/",
            &format!("token={}&next=%2F%09%2Fevil.example", issued.token),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}
