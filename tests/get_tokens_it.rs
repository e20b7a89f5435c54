#![cfg(feature = "test")]

// self
use slashauth::{
	_preludet::*,
	config::ClientOptions,
	cookie::{CookieOptions, CookieStore, LEGACY_AUTHENTICATED_COOKIE},
	flows::{GetTokensOptions, SlashAuthClient, TokenResult},
	http::{TokenEndpointResponse, TokenRequest},
};

async fn seed_session(client: &SlashAuthClient, rig: &TestRig, expires_in: i64) {
	client
		.process_token(token_response("seed-access", Some("seed-refresh"), expires_in))
		.await
		.expect("Seeding a session should succeed.");

	assert_eq!(rig.verifier.calls(), 1);
}

#[tokio::test]
async fn fresh_cache_hit_skips_lock_and_network() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;

	let token = client
		.get_access_token()
		.await
		.expect("Cached lookup should succeed.")
		.expect("A cached token should be returned.");

	assert_eq!(token.expose(), "seed-access");
	assert_eq!(rig.locker.acquisitions(), 0);
	assert_eq!(rig.endpoint.calls(), 0);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 100).await;
	rig.clock.advance(Duration::seconds(90));
	rig.endpoint.set_delay(std::time::Duration::from_millis(50));
	rig.endpoint.push_ok(token_response("rotated", Some("refresh-2"), 3600));

	let handles = (0..5)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move { client.get_tokens(GetTokensOptions::default()).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let result = handle
			.await
			.expect("Task should not panic.")
			.expect("Refresh should succeed.")
			.expect("A token should be returned.");

		assert_eq!(result.access_token().expose(), "rotated");
	}

	assert_eq!(rig.endpoint.calls(), 1);
	assert_eq!(rig.locker.acquisitions(), 1);
	assert_eq!(rig.locker.releases(), 1);
	assert_eq!(client.refresh_metrics.successes(), 1);

	match rig.endpoint.requests().first() {
		Some(TokenRequest::RefreshToken { refresh_token, scope, .. }) => {
			assert_eq!(refresh_token.expose(), "seed-refresh");
			assert_eq!(scope.normalized(), "offline_access openid");
		},
		other => panic!("Expected a refresh-token grant, got {other:?}."),
	}
}

#[tokio::test]
async fn a_peer_waiting_on_the_lock_reuses_the_refreshed_entry() {
	let options = ClientOptions::builder("https://auth.example.com", TEST_CLIENT_ID)
		.lock_backoff(Duration::milliseconds(20))
		.build()
		.expect("Options should be valid.");
	let (first, rig) = build_test_client_with(options.clone());
	let second = build_peer_client(options, &rig);

	seed_session(&first, &rig, 100).await;
	rig.clock.advance(Duration::seconds(90));
	rig.endpoint.set_delay(std::time::Duration::from_millis(50));
	rig.endpoint.push_ok(token_response("rotated", Some("refresh-2"), 3600));

	let (x, y) = tokio::join!(
		first.get_tokens(GetTokensOptions::default()),
		second.get_tokens(GetTokensOptions::default())
	);

	for result in [x, y] {
		let result = result.expect("Lookup should succeed.").expect("A token should be returned.");

		assert_eq!(result.access_token().expose(), "rotated");
	}

	assert_eq!(rig.endpoint.calls(), 1);
	assert_eq!(rig.locker.releases(), 2);
	assert!(rig.locker.acquisitions() > 2, "The peer retried while the lock was held.");
	assert_eq!(first.refresh_metrics.attempts() + second.refresh_metrics.attempts(), 1);
}

#[tokio::test]
async fn wider_scopes_redeem_the_session_refresh_token() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;
	rig.endpoint.push_ok(token_response("wide", Some("refresh-2"), 3600));

	let wide = client
		.get_tokens(GetTokensOptions::default().scope("read:foo"))
		.await
		.expect("Lookup should succeed.")
		.expect("The session refresh token should cover the wider scope.");

	assert_eq!(wide.access_token().expose(), "wide");
	assert_eq!(rig.endpoint.calls(), 1);
	assert!(client.is_authenticated().await);

	match rig.endpoint.requests().first() {
		Some(TokenRequest::RefreshToken { refresh_token, scope, .. }) => {
			assert_eq!(refresh_token.expose(), "seed-refresh");
			assert_eq!(scope.normalized(), "offline_access openid read:foo");
		},
		other => panic!("Expected a refresh-token grant, got {other:?}."),
	}

	let again = client
		.get_tokens(GetTokensOptions::default().scope("read:foo"))
		.await
		.expect("Lookup should succeed.")
		.expect("The wider entry should be cached.");

	assert_eq!(again.access_token().expose(), "wide");
	assert_eq!(rig.endpoint.calls(), 1, "The wider entry is cached under its own key.");
}

#[tokio::test]
async fn refresh_keeps_previous_refresh_and_id_token_when_omitted() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 100).await;
	rig.clock.advance(Duration::seconds(200));
	rig.endpoint.push_ok(TokenEndpointResponse {
		access_token: "rotated".into(),
		refresh_token: None,
		id_token: None,
		expires_in: 3600,
		scope: None,
		client_id: None,
	});

	let detailed = client
		.get_detailed_tokens(GetTokensOptions::default())
		.await
		.expect("Refresh should succeed.");

	assert_eq!(detailed.access_token.expose(), "rotated");
	assert_eq!(detailed.id_token.as_deref(), Some("id-seed-access"));
	assert_eq!(detailed.expires_in, 3600);
	assert!(!format!("{detailed:?}").contains("seed-refresh"));

	rig.clock.advance(Duration::seconds(3600));
	rig.endpoint.push_ok(token_response("third", None, 3600));
	client.get_access_token().await.expect("Second refresh should succeed.");

	match rig.endpoint.requests().last() {
		Some(TokenRequest::RefreshToken { refresh_token, .. }) =>
			assert_eq!(refresh_token.expose(), "seed-refresh"),
		other => panic!("Expected a refresh-token grant, got {other:?}."),
	}
}

#[tokio::test]
async fn ignore_cache_always_calls_the_endpoint() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;
	rig.endpoint.push_ok(token_response("forced", Some("refresh-2"), 3600));

	let result = client
		.get_tokens(GetTokensOptions::default().ignore_cache())
		.await
		.expect("Forced refresh should succeed.");

	assert_eq!(result.map(|r| r.access_token().expose().to_owned()).as_deref(), Some("forced"));
	assert_eq!(rig.endpoint.calls(), 1);
	assert_eq!(rig.locker.acquisitions(), 1);
}

#[tokio::test]
async fn lock_exhaustion_times_out_without_side_effects() {
	let options = ClientOptions::builder("https://auth.example.com", TEST_CLIENT_ID)
		.lock_backoff(Duration::ZERO)
		.lock_attempts(3)
		.build()
		.expect("Options should be valid.");
	let (client, rig) = build_test_client_with(options);

	seed_session(&client, &rig, 100).await;
	rig.clock.advance(Duration::seconds(200));
	rig.locker.hold_elsewhere(true);

	let before = rig.store.len();
	let result = client.get_tokens(GetTokensOptions::default()).await;

	assert!(matches!(result, Err(Error::Timeout)), "Timeouts surface even without detail.");
	assert_eq!(rig.locker.acquisitions(), 3);
	assert_eq!(rig.locker.releases(), 0);
	assert_eq!(rig.endpoint.calls(), 0);
	assert_eq!(rig.store.len(), before);
}

#[tokio::test]
async fn rejected_refresh_logs_out_locally() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 100).await;
	rig.clock.advance(Duration::seconds(200));
	rig.endpoint.push_err(Error::Unauthorized { status: 401, reason: "invalid_grant".into() });

	let result = client.get_tokens(GetTokensOptions::detailed()).await;

	assert!(matches!(result, Err(Error::Unauthorized { status: 401, .. })));
	assert!(rig.store.is_empty());
	assert!(rig.cookies.get(client.session_cookies().authenticated()).is_none());
	assert_eq!(rig.locker.releases(), 1);
	assert_eq!(client.refresh_metrics.session_ends(), 1);
}

#[tokio::test]
async fn missing_session_fails_without_network() {
	let (client, rig) = build_test_client();

	assert!(
		client
			.get_tokens(GetTokensOptions::default())
			.await
			.expect("Non-detailed calls never fail.")
			.is_none()
	);
	assert!(matches!(
		client.get_tokens(GetTokensOptions::detailed()).await,
		Err(Error::NotLoggedIn)
	));
	assert_eq!(rig.endpoint.calls(), 0);
}

#[tokio::test]
async fn transient_failures_are_hidden_unless_detailed() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 100).await;
	rig.clock.advance(Duration::seconds(200));
	rig.endpoint.push_err(
		TransientError::TokenEndpoint { message: "busy".into(), status: Some(503), retry_after: None }
			.into(),
	);

	assert!(client.get_access_token().await.expect("Failures map to None.").is_none());

	rig.endpoint.push_err(
		TransientError::TokenEndpoint { message: "busy".into(), status: Some(503), retry_after: None }
			.into(),
	);

	let detailed = client.get_tokens(GetTokensOptions::detailed()).await;

	assert_eq!(detailed.err().and_then(|e| e.status()), Some(503));
	assert!(!rig.store.is_empty(), "Transient failures keep the session.");
}

#[tokio::test]
async fn detailed_results_carry_the_id_token() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;

	let Some(TokenResult::Detailed(detailed)) = client
		.get_tokens(GetTokensOptions::detailed())
		.await
		.expect("Cached lookup should succeed.")
	else {
		panic!("Detailed responses were requested.");
	};

	assert_eq!(detailed.id_token.as_deref(), Some("id-seed-access"));
	assert_eq!(detailed.expires_in, 3600);
}

#[tokio::test]
async fn check_session_needs_a_marker_cookie() {
	let (client, rig) = build_test_client();

	rig.endpoint.push_ok(token_response("never", Some("r"), 3600));

	assert!(!client.check_session(GetTokensOptions::default()).await);
	assert_eq!(rig.endpoint.calls(), 0);

	seed_session(&client, &rig, 3600).await;

	assert!(client.check_session(GetTokensOptions::default()).await);
}

#[tokio::test]
async fn check_session_migrates_the_legacy_marker() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;
	rig.cookies.remove(client.session_cookies().authenticated());
	rig.cookies.save(LEGACY_AUTHENTICATED_COOKIE, "true", &CookieOptions::default());

	assert!(client.check_session(GetTokensOptions::default()).await);
	assert!(rig.cookies.get(LEGACY_AUTHENTICATED_COOKIE).is_none());
	assert_eq!(
		rig.cookies.get(client.session_cookies().authenticated()).as_deref(),
		Some("true")
	);
}

#[tokio::test]
async fn audiences_are_cached_separately() {
	let (client, rig) = build_test_client();

	seed_session(&client, &rig, 3600).await;

	let other = client
		.get_tokens(GetTokensOptions::detailed().audience("https://api.example.com"))
		.await;

	assert!(matches!(other, Err(Error::NotLoggedIn)));
	assert!(rig.store.is_empty(), "A missing refresh token ends the local session.");
}
