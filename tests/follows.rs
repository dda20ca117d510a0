mod support;

use inkwell::application::follows::{FollowError, FollowOutcome};
use support::{TestApp, current};

#[tokio::test]
async fn following_twice_keeps_one_edge() {
    let app = TestApp::new();
    let reader = app.user("reader").await;
    let author = app.user("author").await;
    let viewer = current(&reader);

    let first = app.follows.follow(&viewer, "author").await.expect("follow");
    let second = app.follows.follow(&viewer, "author").await.expect("follow again");

    assert_eq!(first, FollowOutcome::Created);
    assert_eq!(second, FollowOutcome::AlreadyFollowing);
    assert_eq!(app.store.follow_count(reader.id, author.id).await, 1);
}

#[tokio::test]
async fn following_yourself_stores_nothing() {
    let app = TestApp::new();
    let solo = app.user("solo").await;

    let outcome = app
        .follows
        .follow(&current(&solo), "solo")
        .await
        .expect("self follow");

    assert_eq!(outcome, FollowOutcome::SelfFollow);
    assert_eq!(app.store.all_follows().await, 0);
}

#[tokio::test]
async fn unknown_author_cannot_be_followed() {
    let app = TestApp::new();
    let reader = app.user("reader").await;

    let err = app
        .follows
        .follow(&current(&reader), "ghost")
        .await
        .expect_err("unknown author");
    assert!(matches!(err, FollowError::UnknownAuthor(name) if name == "ghost"));
}

#[tokio::test]
async fn unfollow_removes_edge() {
    let app = TestApp::new();
    let reader = app.user("reader").await;
    let author = app.user("author").await;
    let viewer = current(&reader);

    app.follows.follow(&viewer, "author").await.expect("follow");
    assert!(
        app.follows
            .is_following(Some(&viewer), &author)
            .await
            .expect("lookup")
    );

    app.follows.unfollow(&viewer, "author").await.expect("unfollow");

    assert_eq!(app.store.follow_count(reader.id, author.id).await, 0);
    assert!(
        !app.follows
            .is_following(Some(&viewer), &author)
            .await
            .expect("lookup")
    );
}

#[tokio::test]
async fn unfollow_without_edge_is_reported() {
    let app = TestApp::new();
    let reader = app.user("reader").await;
    app.user("author").await;

    let err = app
        .follows
        .unfollow(&current(&reader), "author")
        .await
        .expect_err("not following");
    assert!(matches!(err, FollowError::NotFollowing { .. }));
}

#[tokio::test]
async fn anonymous_viewer_never_follows() {
    let app = TestApp::new();
    let author = app.user("author").await;

    assert!(
        !app.follows
            .is_following(None, &author)
            .await
            .expect("lookup")
    );
}
