use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};

const APP_NAME: &str = "mailpilot";
const TOKEN_KEY: &str = "gmail_token";
const LLM_KEY: &str = "llm_api_key";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

pub type GmailAuthenticator = yup_oauth2::authenticator::Authenticator<
    hyper_rustls::HttpsConnector<hyper::client::HttpConnector>,
>;

fn entry(key: &str) -> Result<Entry> {
    Entry::new(APP_NAME, key).map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

pub struct RingStorage;

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let entry = entry(TOKEN_KEY)?;

        let mut data = self.get_all().await.unwrap_or_default();
        data.tokens.clear();
        data.tokens.push(token);

        let serialized = serde_json::to_string(&data).context("Failed to serialize tokens")?;

        entry
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.get_all()
            .await
            .ok()
            .and_then(|data| data.tokens.first().cloned())
    }
}

impl RingStorage {
    async fn get_all(&self) -> Result<TokenData> {
        match entry(TOKEN_KEY)?.get_password() {
            Ok(serialized) => {
                serde_json::from_str(&serialized).context("Failed to deserialize tokens")
            }
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub async fn clear_token(&self) -> Result<()> {
        match entry(TOKEN_KEY)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

/// Hands the consent URL to the UI loop and opens the browser.
pub struct TuiDelegate {
    pub tx: mpsc::Sender<String>,
}

impl InstalledFlowDelegate for TuiDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let _ = self.tx.send(url.to_string()).await;
            if let Err(e) = open::that(url) {
                warn!("Failed to open browser: {}", e);
            }
            Ok(String::new())
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        read_application_secret(path)
            .await
            .context("Failed to read application secret")
    }

    pub async fn authenticate(
        secret: ApplicationSecret,
        delegate: TuiDelegate,
    ) -> Result<GmailAuthenticator> {
        let auth =
            InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::HTTPRedirect)
                .with_storage(Box::new(RingStorage))
                .flow_delegate(Box::new(delegate))
                .build()
                .await
                .context("Failed to build authenticator")?;

        Ok(auth)
    }
}

/// Current bearer token, refreshed by the authenticator when it expires.
pub async fn access_token(auth: &GmailAuthenticator) -> Option<String> {
    match auth.token(SCOPES).await {
        Ok(token) => token.token().map(str::to_string),
        Err(e) => {
            warn!("Failed to obtain access token: {}", e);
            None
        }
    }
}

/// The user's own LLM credential. Never leaves this machine except on
/// requests to the LLM provider.
pub struct ApiKeyStore;

impl ApiKeyStore {
    pub fn load() -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        match entry(LLM_KEY).and_then(|e| {
            e.get_password()
                .map_err(|err| anyhow::anyhow!("Keyring error: {}", err))
        }) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            Ok(_) => None,
            Err(e) => {
                info!("No stored LLM key: {}", e);
                None
            }
        }
    }

    pub fn save(key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Self::clear();
        }
        entry(LLM_KEY)?
            .set_password(key)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
    }

    pub fn clear() -> Result<()> {
        match entry(LLM_KEY)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}
