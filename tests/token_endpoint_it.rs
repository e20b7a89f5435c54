#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use slashauth::{
	_preludet::*,
	auth::{ScopeSet, TokenSecret},
	cache::{CacheStore, MemoryCache},
	clock::ManualClock,
	config::{ClientInfo, ClientOptions},
	flows::{GetTokensOptions, SlashAuthClient},
	http::{CLIENT_HEADER, ReqwestTokenEndpoint, TokenEndpoint, TokenRequest},
	verify::IdTokenVerifier,
};

const CLIENT_ID: &str = "client-http";

fn options_for(server: &MockServer) -> ClientOptions {
	ClientOptions::builder(server.base_url(), CLIENT_ID)
		.client_subdomain(false)
		.token_endpoint(
			Url::parse(&server.url("/oauth/token")).expect("Mock token endpoint should parse."),
		)
		.lock_backoff(Duration::ZERO)
		.build()
		.expect("Client options should be valid.")
}

fn refresh_request() -> TokenRequest {
	TokenRequest::RefreshToken {
		client_id: CLIENT_ID.into(),
		refresh_token: TokenSecret::new("refresh-1"),
		audience: "default".into(),
		scope: ScopeSet::from_delimited("openid offline_access"),
		redirect_uri: None,
	}
}

#[tokio::test]
async fn refresh_grant_is_sent_as_query_parameters() {
	let server = MockServer::start_async().await;
	let options = options_for(&server);
	let header = ClientInfo::default().header_value();
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/oauth/token")
				.query_param("grant_type", "refresh_token")
				.query_param("client_id", CLIENT_ID)
				.query_param("refresh_token", "refresh-1")
				.query_param("audience", "default")
				.query_param("scope", "offline_access openid")
				.header(CLIENT_HEADER, header.as_str());
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-2\",\"id_token\":\"id-1\",\"expires_in\":900,\"scope\":\"openid offline_access\"}",
			);
		})
		.await;
	let endpoint = ReqwestTokenEndpoint::new(&options).expect("Transport should build.");
	let response = endpoint.exchange(refresh_request()).await.expect("Exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(response.access_token, "access-1");
	assert_eq!(response.refresh_token.as_deref(), Some("refresh-2"));
	assert_eq!(response.id_token.as_deref(), Some("id-1"));
	assert_eq!(response.expires_in, 900);
}

#[tokio::test]
async fn rejected_sessions_map_to_unauthorized() {
	let server = MockServer::start_async().await;
	let options = options_for(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth/token");
			then.status(403).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"Refresh token revoked.\"}",
			);
		})
		.await;
	let endpoint = ReqwestTokenEndpoint::new(&options).expect("Transport should build.");
	let err = endpoint.exchange(refresh_request()).await.expect_err("403 must fail.");

	match err {
		Error::Unauthorized { status, reason } => {
			assert_eq!(status, 403);
			assert_eq!(reason, "Refresh token revoked.");
		},
		other => panic!("Expected an unauthorized error, got {other:?}."),
	}
}

#[tokio::test]
async fn server_errors_are_transient_with_retry_hint() {
	let server = MockServer::start_async().await;
	let options = options_for(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth/token");
			then.status(503).header("retry-after", "7").body("maintenance");
		})
		.await;
	let endpoint = ReqwestTokenEndpoint::new(&options).expect("Transport should build.");
	let err = endpoint.exchange(refresh_request()).await.expect_err("503 must fail.");

	match err {
		Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
			assert_eq!(status, Some(503));
			assert_eq!(retry_after, Some(Duration::seconds(7)));
		},
		other => panic!("Expected a transient error, got {other:?}."),
	}
}

#[tokio::test]
async fn malformed_success_bodies_fail_to_parse() {
	let server = MockServer::start_async().await;
	let options = options_for(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":42,\"expires_in\":900}");
		})
		.await;
	let endpoint = ReqwestTokenEndpoint::new(&options).expect("Transport should build.");
	let err = endpoint.exchange(refresh_request()).await.expect_err("Bad JSON must fail.");

	assert!(matches!(
		err,
		Error::Transient(TransientError::TokenResponseParse { status: Some(200), .. })
	));
	assert_eq!(err.status(), Some(200));
}

#[tokio::test]
async fn client_refreshes_expired_tokens_over_http() {
	let server = MockServer::start_async().await;
	let options = options_for(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/oauth/token")
				.query_param("grant_type", "refresh_token")
				.query_param("refresh_token", "seed-refresh");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-http\",\"refresh_token\":\"refresh-http\",\"expires_in\":1800}",
			);
		})
		.await;
	let endpoint = Arc::new(ReqwestTokenEndpoint::new(&options).expect("Transport should build."));
	let store = Arc::new(MemoryCache::default());
	let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
	let verifier: Arc<dyn IdTokenVerifier> = Arc::new(StaticVerifier::default());
	let cache_store: Arc<dyn CacheStore> = store.clone();
	let client = SlashAuthClient::with_token_endpoint(options, cache_store, endpoint, verifier)
		.with_clock(clock.clone());

	client
		.process_token(token_response("seed-access", Some("seed-refresh"), 120))
		.await
		.expect("Seeding a session should succeed.");
	clock.advance(Duration::seconds(90));

	let token = client
		.get_tokens(GetTokensOptions::default())
		.await
		.expect("Refresh should succeed.")
		.expect("A token should be returned.");

	mock.assert_async().await;

	assert_eq!(token.access_token().expose(), "access-http");

	let cached = client
		.get_tokens(GetTokensOptions::default())
		.await
		.expect("Cached lookup should succeed.")
		.expect("A token should be returned.");

	assert_eq!(cached.access_token().expose(), "access-http");
	assert_eq!(client.refresh_metrics.attempts(), 1);
}
