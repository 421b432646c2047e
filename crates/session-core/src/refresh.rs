//! Single-flight session refresh
//!
//! Any number of callers may discover that the access token is stale at the
//! same time (concurrent `401`s, the idle prompt's "I'm here"). Exactly one
//! refresh call goes out; everyone else queues behind it and receives the
//! same outcome, in the order they arrived.
//!
//! State machine: `Idle → Refreshing → Idle`. The refresh network call runs
//! on its own spawned task, so a caller that gives up (dropped future, aborted
//! task) cannot strand the queue. Each refresh carries a generation number;
//! `force_logout` bumps the state back to `Idle`, and a refresh that settles
//! for a stale generation is discarded without touching the store.

use std::sync::Arc;

use common::Secret;
use session_auth::{AuthEvent, AuthEvents, TokenPair, TokenStore};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::RefreshError;

type Waiter = oneshot::Sender<Result<Secret<String>, RefreshError>>;

enum Phase {
    Idle,
    Refreshing { generation: u64, waiters: Vec<Waiter> },
}

struct State {
    phase: Phase,
    generation: u64,
}

struct Inner {
    store: Arc<TokenStore>,
    events: AuthEvents,
    http: reqwest::Client,
    api_url: String,
    state: Mutex<State>,
}

/// Cloneable handle to the refresh coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// `http` must be a plain client: the refresh call never goes through
    /// the intercepting `ApiClient`.
    pub fn new(
        store: Arc<TokenStore>,
        events: AuthEvents,
        http: reqwest::Client,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                events,
                http,
                api_url: api_url.into(),
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn events(&self) -> &AuthEvents {
        &self.inner.events
    }

    /// Obtain a fresh access token, joining an in-flight refresh if there is
    /// one.
    ///
    /// On failure the session has already been cleared and `Logout`
    /// broadcast by the time this returns.
    pub async fn refresh(&self) -> Result<Secret<String>, RefreshError> {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            match &mut state.phase {
                Phase::Refreshing { waiters, .. } => {
                    waiters.push(tx);
                    debug!(queued = waiters.len(), "joined in-flight refresh");
                    None
                }
                Phase::Idle => {
                    state.generation += 1;
                    let generation = state.generation;
                    state.phase = Phase::Refreshing {
                        generation,
                        waiters: vec![tx],
                    };
                    Some(generation)
                }
            }
        };

        if let Some(generation) = start {
            debug!(generation, "starting session refresh");
            let this = self.clone();
            tokio::spawn(async move { this.run(generation).await });
        }

        rx.await.unwrap_or(Err(RefreshError::Cancelled))
    }

    /// Tear the session down: reject queued callers with `Cancelled`, clear
    /// the store and broadcast `Logout`. Any refresh still in flight will be
    /// discarded when it settles.
    pub async fn force_logout(&self) {
        let mut state = self.inner.state.lock().await;
        if let Phase::Refreshing { waiters, .. } =
            std::mem::replace(&mut state.phase, Phase::Idle)
        {
            debug!(cancelled = waiters.len(), "cancelling queued refresh callers");
            for waiter in waiters {
                let _ = waiter.send(Err(RefreshError::Cancelled));
            }
        }
        self.inner.store.clear_session().await;
        drop(state);

        info!("session logged out");
        self.inner.events.publish(AuthEvent::Logout);
    }

    /// Whether a refresh call is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        matches!(self.inner.state.lock().await.phase, Phase::Refreshing { .. })
    }

    /// Number of callers waiting on the in-flight refresh.
    pub async fn pending(&self) -> usize {
        match &self.inner.state.lock().await.phase {
            Phase::Refreshing { waiters, .. } => waiters.len(),
            Phase::Idle => 0,
        }
    }

    async fn run(&self, generation: u64) {
        let result = self.request_tokens().await;

        // Hold the state lock through the store write so a concurrent
        // force_logout cannot interleave and be undone by this write
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let waiters = match &mut state.phase {
            Phase::Refreshing {
                generation: current,
                waiters,
            } if *current == generation => std::mem::take(waiters),
            _ => {
                debug!(generation, "discarding refresh result after logout");
                metrics::counter!("session_refresh_total", "outcome" => "discarded").increment(1);
                return;
            }
        };
        state.phase = Phase::Idle;

        let outcome = match result {
            Ok(pair) => match self.inner.store.update_tokens(&pair).await {
                Ok(user) => {
                    debug!(user_id = %user.id, "refreshed session stored");
                    Ok(pair)
                }
                Err(e) => Err(RefreshError::from(e)),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(pair) => {
                info!(waiters = waiters.len(), "session refresh succeeded");
                metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
                self.inner
                    .events
                    .publish(AuthEvent::TokenRefreshed(pair.clone()));
                for waiter in waiters {
                    let _ = waiter.send(Ok(pair.access_token.clone()));
                }
            }
            Err(e) => {
                warn!(error = %e, waiters = waiters.len(), "session refresh failed, logging out");
                metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
                self.inner.store.clear_session().await;
                self.inner.events.publish(AuthEvent::Logout);
                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
            }
        }
    }

    async fn request_tokens(&self) -> Result<TokenPair, RefreshError> {
        let refresh = self
            .inner
            .store
            .refresh_token()
            .await
            .ok_or(RefreshError::NoRefreshToken)?;
        Ok(session_auth::refresh_token(&self.inner.http, &self.inner.api_url, &refresh).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::State as AxumState;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use session_auth::{User, now_millis};
    use tokio::sync::Notify;

    pub(crate) fn token(sub: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(
                serde_json::json!({ "sub": sub, "userId": 1, "exp": now_millis() / 1000 + 3600 })
                    .to_string()
            )
        )
    }

    /// Refresh endpoint double. Counts hits, optionally blocks until released.
    pub(crate) struct MockAuth {
        pub hits: AtomicUsize,
        pub gate: Option<Notify>,
        pub status: StatusCode,
    }

    impl MockAuth {
        pub fn ok() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                gate: None,
                status: StatusCode::OK,
            })
        }

        pub fn gated() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                gate: Some(Notify::new()),
                status: StatusCode::OK,
            })
        }

        pub fn failing(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicUsize::new(0),
                gate: None,
                status,
            })
        }

        pub fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    async fn refresh_handler(AxumState(mock): AxumState<Arc<MockAuth>>) -> Response {
        let n = mock.hits.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &mock.gate {
            gate.notified().await;
        }
        if mock.status != StatusCode::OK {
            return (mock.status, "refresh unavailable").into_response();
        }
        axum::Json(serde_json::json!({
            "accessToken": token(&format!("refreshed-{n}@example.com")),
            "refreshToken": format!("rt_{n}"),
        }))
        .into_response()
    }

    /// Serve the mock under `/api/v1/auth/refresh`; returns the API base URL.
    pub(crate) async fn serve_refresh(mock: Arc<MockAuth>, extra: Router) -> String {
        let app = Router::new()
            .route("/api/v1/auth/refresh", get(refresh_handler))
            .with_state(mock)
            .merge(extra);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api/v1")
    }

    pub(crate) async fn signed_in_store(dir: &tempfile::TempDir, api_url: &str) -> Arc<TokenStore> {
        let store = TokenStore::new(
            dir.path().join("session.json"),
            reqwest::Url::parse(api_url).unwrap(),
        );
        store
            .set_session(
                User {
                    id: "1".into(),
                    email: "traveler@example.com".into(),
                    role: "ROLE_USER".into(),
                },
                Secret::new(token("traveler@example.com")),
                Secret::from("rt_0"),
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending().await < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("callers never queued");
    }

    fn logout_count(rx: &mut tokio::sync::broadcast::Receiver<AuthEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AuthEvent::Logout) {
                count += 1;
            }
        }
        count
    }

    async fn setup(mock: Arc<MockAuth>) -> (tempfile::TempDir, RefreshCoordinator) {
        let api_url = serve_refresh(mock, Router::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let store = signed_in_store(&dir, &api_url).await;
        let coordinator =
            RefreshCoordinator::new(store, AuthEvents::new(), reqwest::Client::new(), api_url);
        (dir, coordinator)
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_call() {
        let mock = MockAuth::gated();
        let (_dir, coordinator) = setup(mock.clone()).await;

        let mut handles = vec![];
        for _ in 0..5 {
            let c = coordinator.clone();
            handles.push(tokio::spawn(async move { c.refresh().await }));
        }
        wait_for_pending(&coordinator, 5).await;
        assert!(coordinator.is_refreshing().await);
        mock.release();

        let mut tokens = vec![];
        for h in handles {
            tokens.push(h.await.unwrap().unwrap().expose().clone());
        }
        assert_eq!(mock.hits(), 1);
        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(
            coordinator.store().access_token().await.unwrap().expose(),
            &tokens[0]
        );
        assert_eq!(coordinator.store().refresh_token().await.unwrap().expose(), "rt_1");
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn queued_callers_resume_in_arrival_order() {
        let mock = MockAuth::gated();
        let (_dir, coordinator) = setup(mock.clone()).await;
        let resumed = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = vec![];
        for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
            let c = coordinator.clone();
            let resumed = resumed.clone();
            handles.push(tokio::spawn(async move {
                c.refresh().await.unwrap();
                resumed.lock().unwrap().push(name);
            }));
            wait_for_pending(&coordinator, i + 1).await;
        }
        mock.release();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*resumed.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn failure_rejects_everyone_and_logs_out_once() {
        let mock = MockAuth::failing(StatusCode::INTERNAL_SERVER_ERROR);
        let (_dir, coordinator) = setup(mock.clone()).await;
        let mut events = coordinator.events().subscribe();

        let results = tokio::join!(
            coordinator.refresh(),
            coordinator.refresh(),
            coordinator.refresh()
        );
        for result in [results.0, results.1, results.2] {
            assert_eq!(result.unwrap_err(), RefreshError::Rejected { status: 500 });
        }

        assert_eq!(mock.hits(), 1);
        assert!(!coordinator.store().is_authenticated().await);
        assert!(!coordinator.store().path().exists());
        assert_eq!(logout_count(&mut events), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_network_call() {
        let mock = MockAuth::ok();
        let (_dir, coordinator) = setup(mock.clone()).await;
        coordinator.store().clear_session().await;
        let mut events = coordinator.events().subscribe();

        let err = coordinator.refresh().await.unwrap_err();
        assert_eq!(err, RefreshError::NoRefreshToken);
        assert_eq!(mock.hits(), 0);
        assert_eq!(logout_count(&mut events), 1);
    }

    #[tokio::test]
    async fn success_broadcasts_refreshed_pair() {
        let mock = MockAuth::ok();
        let (_dir, coordinator) = setup(mock).await;
        let mut events = coordinator.events().subscribe();

        let access = coordinator.refresh().await.unwrap();
        match events.try_recv().unwrap() {
            AuthEvent::TokenRefreshed(pair) => {
                assert_eq!(pair.access_token.expose(), access.expose());
                assert_eq!(pair.refresh_token.expose(), "rt_1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn settled_refresh_allows_a_new_call() {
        let mock = MockAuth::ok();
        let (_dir, coordinator) = setup(mock.clone()).await;

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();
        assert_eq!(mock.hits(), 2);
        assert_eq!(coordinator.store().refresh_token().await.unwrap().expose(), "rt_2");
    }

    #[tokio::test]
    async fn force_logout_cancels_waiters_and_discards_late_result() {
        let mock = MockAuth::gated();
        let (_dir, coordinator) = setup(mock.clone()).await;
        let mut events = coordinator.events().subscribe();

        let a = tokio::spawn({
            let c = coordinator.clone();
            async move { c.refresh().await }
        });
        let b = tokio::spawn({
            let c = coordinator.clone();
            async move { c.refresh().await }
        });
        wait_for_pending(&coordinator, 2).await;

        coordinator.force_logout().await;
        assert_eq!(a.await.unwrap().unwrap_err(), RefreshError::Cancelled);
        assert_eq!(b.await.unwrap().unwrap_err(), RefreshError::Cancelled);

        // Let the in-flight call settle; its tokens must not revive the session
        mock.release();
        tokio::time::timeout(Duration::from_secs(5), async {
            while mock.hits() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!coordinator.store().is_authenticated().await);
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(logout_count(&mut events), 1);
    }

    #[tokio::test]
    async fn dropped_initiator_does_not_strand_queue() {
        let mock = MockAuth::gated();
        let (_dir, coordinator) = setup(mock.clone()).await;

        let initiator = tokio::spawn({
            let c = coordinator.clone();
            async move { c.refresh().await }
        });
        wait_for_pending(&coordinator, 1).await;
        let follower = tokio::spawn({
            let c = coordinator.clone();
            async move { c.refresh().await }
        });
        wait_for_pending(&coordinator, 2).await;

        initiator.abort();
        mock.release();

        assert!(follower.await.unwrap().is_ok());
        assert_eq!(mock.hits(), 1);
    }
}
