//! Feed sessions against a running service.
//!
//! Each session talks to the server over HTTP and receives the store's change feed
//! through a `ChangeEventBus`, the way an embedded viewer would.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::MockServer;

use emoji_client::{
    ChangeEventBus, EmojiClient, EntryState, FeedSynchronizer, LikeError, Viewer,
};
use emoji_core::{EmojiArtifact, NewArtifact, UserId};
use emoji_service::{create_router, AppState, InferenceProvider, ReplicateClient};
use emoji_store::{LocalBlobStore, MemoryStore, Store};

struct Running {
    base_url: String,
    store: Arc<MemoryStore>,
    _blob_dir: TempDir,
}

impl Running {
    async fn start() -> Self {
        Self::start_with(None).await
    }

    async fn start_with_replicate(api_url: &str) -> Self {
        let client = ReplicateClient::new(api_url, "r8_test_token", "test-version")
            .expect("Failed to build Replicate client");
        Self::start_with(Some(Arc::new(client))).await
    }

    async fn start_with(provider: Option<Arc<dyn InferenceProvider>>) -> Self {
        let blob_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(LocalBlobStore::new(blob_dir.path(), common::PUBLIC_BASE_URL));
        let state = AppState::with_provider(
            store.clone(),
            blobs,
            provider,
            common::test_config(&blob_dir),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            axum::serve(listener, create_router(state))
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            store,
            _blob_dir: blob_dir,
        }
    }

    fn client(&self, token: &str) -> EmojiClient {
        EmojiClient::new(&self.base_url)
            .expect("Failed to build client")
            .with_access_token(token)
    }

    /// A session for `viewer`, connected to the change feed.
    async fn session(&self, viewer: Viewer, token: &str) -> FeedSynchronizer {
        let feed = FeedSynchronizer::spawn(viewer, Arc::new(self.client(token)));
        ChangeEventBus::new(self.store.subscribe(), feed.clone()).spawn();
        feed.initialize().await.expect("Failed to load feed");
        feed
    }

    fn seed(&self, prompt: &str) -> EmojiArtifact {
        self.store
            .insert_artifact(NewArtifact {
                image_url: format!("{}/seed/{prompt}.png", common::PUBLIC_BASE_URL),
                prompt: prompt.to_string(),
                creator_id: UserId::generate(),
            })
            .expect("Failed to seed artifact")
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn like_propagates_to_other_sessions() {
    let server = Running::start().await;
    let cat = server.seed("cat");

    let alice = UserId::generate();
    let bob = UserId::generate();
    let alice_feed = server
        .session(Viewer::user(alice.clone()), &format!("test-token:{alice}"))
        .await;
    let bob_feed = server
        .session(Viewer::user(bob.clone()), &format!("test-token:{bob}"))
        .await;

    let receipt = alice_feed.toggle_like(&alice, cat.id).await.unwrap();
    assert!(receipt.liked);
    assert_eq!(receipt.likes_count, 1);

    let mine = alice_feed.snapshot().get(&cat.id).cloned().unwrap();
    assert!(mine.is_liked_by_user);
    assert_eq!(mine.likes_count, 1);

    eventually("bob to see the like", || {
        bob_feed
            .snapshot()
            .get(&cat.id)
            .is_some_and(|e| e.likes_count == 1 && !e.is_liked_by_user)
    })
    .await;
}

#[tokio::test]
async fn generated_emoji_loads_into_a_session() {
    let mock = MockServer::start().await;
    common::mock_successful_prediction(&mock, "pred_feed").await;
    let server = Running::start_with_replicate(&mock.uri()).await;

    let user = UserId::generate();
    let token = format!("test-token:{user}");
    let client = server.client(&token);
    client.ensure_profile().await.unwrap();

    let generated = client.generate("a cat").await.unwrap();
    let feed = server.session(Viewer::user(user.clone()), &token).await;

    let entry = feed.snapshot().get(&generated.artifact.id).cloned().unwrap();
    assert_eq!(entry.artifact.prompt, "a cat");
    assert_eq!(entry.artifact.image_url, generated.url);
    assert_eq!(entry.likes_count, 0);
    assert!(!entry.artifact.deleted);
    assert!(!entry.is_liked_by_user);
    assert_eq!(entry.state, EntryState::Confirmed);
    assert_eq!(client.get_balance().await.unwrap().balance, 2);
}

#[tokio::test]
async fn new_artifacts_appear_in_open_sessions() {
    let server = Running::start().await;
    let user = UserId::generate();
    let feed = server
        .session(Viewer::user(user.clone()), &format!("test-token:{user}"))
        .await;
    assert!(feed.snapshot().entries.is_empty());

    let cat = server.seed("cat");

    eventually("the insert", || feed.snapshot().get(&cat.id).is_some()).await;
    assert_eq!(
        feed.snapshot().get(&cat.id).unwrap().state,
        EntryState::Confirmed
    );
}

#[tokio::test]
async fn soft_delete_hides_entry_for_users_and_flags_it_for_admins() {
    let server = Running::start().await;
    let cat = server.seed("cat");

    let admin = UserId::generate();
    let user = UserId::generate();
    let admin_feed = server
        .session(Viewer::admin(admin.clone()), &format!("test-admin:{admin}"))
        .await;
    let user_feed = server
        .session(Viewer::user(user.clone()), &format!("test-token:{user}"))
        .await;
    assert!(user_feed.snapshot().get(&cat.id).is_some());

    admin_feed.soft_delete(cat.id).await.unwrap();

    let flagged = admin_feed.snapshot().get(&cat.id).cloned().unwrap();
    assert_eq!(flagged.state, EntryState::SoftDeleted);

    eventually("the user session to drop the entry", || {
        user_feed.snapshot().get(&cat.id).is_none()
    })
    .await;

    // A fresh load agrees with the event stream.
    user_feed.initialize().await.unwrap();
    assert!(user_feed.snapshot().get(&cat.id).is_none());
}

#[tokio::test]
async fn anonymous_session_cannot_like() {
    let server = Running::start().await;
    let cat = server.seed("cat");
    let feed = FeedSynchronizer::spawn(
        Viewer::anonymous(),
        Arc::new(EmojiClient::new(&server.base_url).unwrap()),
    );
    feed.initialize().await.unwrap();

    let err = feed
        .toggle_like(&UserId::generate(), cat.id)
        .await
        .unwrap_err();

    assert!(matches!(err, LikeError::NotSignedIn));
    assert_eq!(feed.snapshot().get(&cat.id).unwrap().likes_count, 0);
}
