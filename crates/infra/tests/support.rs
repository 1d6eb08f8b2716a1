#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use pawlink_common::auth::{TokenManager, TokenSet};
use pawlink_common::testing::{fake_jwt, MemoryCredentialStore, ScriptedRefreshExchange};
use pawlink_domain::{AuthConfig, ClientConfig};
use pawlink_infra::api::{ApiClient, ConnectivityFlag};

pub type TestTokenManager = TokenManager<ScriptedRefreshExchange, MemoryCredentialStore>;

/// Client wired to in-memory credential fakes, plus handles to inspect them.
pub struct Harness {
    pub client: ApiClient,
    pub auth: Arc<TestTokenManager>,
    pub exchange: ScriptedRefreshExchange,
    pub store: MemoryCredentialStore,
    pub connectivity: ConnectivityFlag,
}

/// Configuration with a 10ms backoff unit so retry tests stay fast.
pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(
        base_url,
        AuthConfig::new("https://auth.pawlink.test/oauth/token", "integration-tests"),
    );
    config.retry.backoff_unit_ms = 10;
    config.request_timeout_secs = 5;
    config
}

pub fn harness(base_url: &str) -> Harness {
    harness_with(base_url, |_| {})
}

pub fn harness_with(base_url: &str, configure: impl FnOnce(&mut ClientConfig)) -> Harness {
    let mut config = test_config(base_url);
    configure(&mut config);

    let exchange = ScriptedRefreshExchange::new();
    let store = MemoryCredentialStore::new();
    let auth = Arc::new(TokenManager::new(
        exchange.clone(),
        Arc::new(store.clone()),
        &config.auth.account,
        config.auth.refresh_buffer_secs,
    ));
    let connectivity = ConnectivityFlag::default();

    let client = ApiClient::builder(config, auth.clone())
        .connectivity(Arc::new(connectivity.clone()))
        .build()
        .expect("client should build");

    Harness { client, auth, exchange, store, connectivity }
}

/// Token set whose access token expires in `seconds`.
pub fn tokens_expiring_in(seconds: i64, refresh_token: &str) -> TokenSet {
    TokenSet::new(
        fake_jwt(Utc::now().timestamp() + seconds),
        Some(refresh_token.to_string()),
        Some(seconds),
    )
}

impl Harness {
    /// Install credentials expiring in `seconds`; returns the access token.
    pub async fn sign_in(&self, seconds: i64) -> String {
        let tokens = tokens_expiring_in(seconds, "refresh-1");
        let access = tokens.access_token.clone();
        self.auth.store(tokens).await.expect("credentials should store");
        access
    }

    /// Queue a successful refresh; returns the access token it hands out.
    ///
    /// Refreshed tokens live two hours, so they differ from any token
    /// installed by `sign_in` with a shorter lifetime.
    pub fn script_refresh(&self, refresh_token: &str) -> String {
        let tokens = tokens_expiring_in(7200, refresh_token);
        let access = tokens.access_token.clone();
        self.exchange.push_ok(tokens);
        access
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
