// std
use std::sync::atomic::{AtomicU32, Ordering};
// self
use apigen_runtime::{
	_preludet::*,
	auth::{Secret, TokenFuture, TokenGrant, TokenManager, TokenSource, TokenState},
	error::AuthError,
};

struct SlowSource {
	calls: AtomicU32,
	fail_first: bool,
}
impl SlowSource {
	fn new(fail_first: bool) -> Arc<Self> {
		Arc::new(Self { calls: AtomicU32::new(0), fail_first })
	}
}
impl TokenSource for SlowSource {
	fn acquire(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			tokio::time::sleep(Duration::from_millis(250)).await;

			if self.fail_first && n == 1 {
				return Err(AuthError::Unavailable { reason: "provider down".into() });
			}

			Ok(TokenGrant::new(format!("token-{n}"), Duration::from_secs(3600)))
		})
	}
}

struct RotatingSource {
	acquired: AtomicU32,
	refreshed: AtomicU32,
	lifetime: Duration,
}
impl RotatingSource {
	fn new(lifetime: Duration) -> Arc<Self> {
		Arc::new(Self { acquired: AtomicU32::new(0), refreshed: AtomicU32::new(0), lifetime })
	}
}
impl TokenSource for RotatingSource {
	fn acquire(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			self.acquired.fetch_add(1, Ordering::SeqCst);

			Ok(TokenGrant::new("a1", self.lifetime).with_refresh_token("rt-1"))
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a Secret) -> TokenFuture<'a> {
		Box::pin(async move {
			assert_eq!(refresh_token.expose(), "rt-1");

			let n = self.refreshed.fetch_add(1, Ordering::SeqCst) + 1;

			tokio::time::sleep(Duration::from_millis(250)).await;

			Ok(TokenGrant::new(format!("r{n}"), self.lifetime))
		})
	}
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_acquisition() {
	let source = SlowSource::new(false);
	let manager = Arc::new(TokenManager::new(source.clone(), Duration::from_secs(60)));
	let mut tasks = Vec::new();

	for _ in 0..16 {
		let manager = manager.clone();

		tasks.push(tokio::spawn(async move { manager.get_token(None).await }));
	}

	for task in tasks {
		let token = task
			.await
			.expect("Token task should not panic.")
			.expect("Every caller should receive the shared token.");

		assert_eq!(token.access_token().expose(), "token-1");
	}

	assert_eq!(source.calls.load(Ordering::SeqCst), 1);
	assert_eq!(manager.metrics().attempts(), 1);
	assert_eq!(manager.state(), TokenState::Valid);
}

#[tokio::test(start_paused = true)]
async fn failed_first_acquisition_can_be_retried() {
	let source = SlowSource::new(true);
	let manager = TokenManager::new(source.clone(), Duration::from_secs(60));
	let err = manager.get_token(None).await.expect_err("Provider outage should fail.");

	assert!(matches!(err, AuthError::Unavailable { .. }));
	assert_eq!(manager.state(), TokenState::NoToken);

	let token = manager.get_token(None).await.expect("Second acquisition should succeed.");

	assert_eq!(token.access_token().expose(), "token-2");
	assert_eq!(manager.metrics().failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn waiters_respect_their_own_deadline() {
	let source = SlowSource::new(false);
	let manager = Arc::new(TokenManager::new(source.clone(), Duration::from_secs(60)));
	let leader = {
		let manager = manager.clone();

		tokio::spawn(async move { manager.get_token(None).await })
	};

	tokio::task::yield_now().await;

	let deadline = Instant::now() + Duration::from_millis(50);

	assert_eq!(manager.get_token(Some(deadline)).await, Err(AuthError::Timeout));

	let token = leader
		.await
		.expect("Leader task should not panic.")
		.expect("Leader should finish its acquisition.");

	assert_eq!(token.access_token().expose(), "token-1");
	assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn tokens_refresh_inside_the_margin() {
	let source = SlowSource::new(false);
	let manager = TokenManager::new(source.clone(), Duration::from_secs(60));

	manager.get_token(None).await.expect("Acquisition should succeed.");
	tokio::time::advance(Duration::from_secs(3541)).await;

	assert_eq!(manager.state(), TokenState::Expiring);
	assert_eq!(
		manager.get_token(None).await.expect("Refresh should succeed.").access_token().expose(),
		"token-2"
	);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_refresh() {
	let source = RotatingSource::new(Duration::from_secs(3600));
	let manager = Arc::new(TokenManager::new(source.clone(), Duration::from_secs(60)));

	manager.get_token(None).await.expect("Initial acquisition should succeed.");
	tokio::time::advance(Duration::from_secs(3541)).await;

	assert_eq!(manager.state(), TokenState::Expiring);

	let mut tasks = Vec::new();

	for _ in 0..16 {
		let manager = manager.clone();

		tasks.push(tokio::spawn(async move { manager.get_token(None).await }));
	}

	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(manager.state(), TokenState::Refreshing);

	for task in tasks {
		let token = task
			.await
			.expect("Token task should not panic.")
			.expect("Every caller should receive the refreshed token.");

		assert_eq!(token.access_token().expose(), "r1");
		assert_eq!(token.refresh_token().map(Secret::expose), Some("rt-1"));
	}

	assert_eq!(source.acquired.load(Ordering::SeqCst), 1);
	assert_eq!(source.refreshed.load(Ordering::SeqCst), 1);
	assert_eq!(manager.metrics().refreshes(), 1);
	assert_eq!(manager.state(), TokenState::Valid);
}

#[tokio::test(start_paused = true)]
async fn unbounded_lifetimes_are_clamped_instead_of_panicking() {
	let source = RotatingSource::new(Duration::from_secs(u64::MAX));
	let manager = Arc::new(TokenManager::new(source.clone(), Duration::MAX));
	let task = {
		let manager = manager.clone();

		tokio::spawn(async move { manager.get_token(None).await })
	};
	let token = task
		.await
		.expect("Oversized expiry should not panic.")
		.expect("Oversized expiry should still yield a token.");

	assert_eq!(token.access_token().expose(), "a1");
	assert_eq!(manager.state(), TokenState::Expiring);
}
