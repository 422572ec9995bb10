use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::auth::{B2cLogin, Credentials};
use super::dashboard::{extract_meter_data, looks_like_dashboard};
use super::html::auto_post_form;
use super::session::{Page, PortalSession};
use crate::config::{AuthMode, WaterscopeConfig};
use crate::domain::MeterReadings;
use crate::error::{Result, WaterscopeError};

/// Anything that can produce a fresh set of meter readings.
#[async_trait]
pub trait MeterSource: Send + Sync {
    async fn fetch(&self) -> Result<MeterReadings>;

    /// Drop the current session; the next fetch logs in from scratch.
    async fn reset_session(&self) -> Result<()>;

    fn is_authenticated(&self) -> bool;

    async fn health(&self) -> ClientHealth;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientHealth {
    pub authenticated: bool,
    pub session_available: bool,
    pub auth_mode: &'static str,
}

/// Waterscope portal client.
///
/// Holds one [`PortalSession`] at a time. A fetch logs in lazily, and an
/// expired session flips the client back to unauthenticated so the caller
/// can retry.
pub struct WaterscopeClient {
    cfg: WaterscopeConfig,
    session: RwLock<Arc<PortalSession>>,
    authenticated: AtomicBool,
}

impl WaterscopeClient {
    pub fn new(cfg: WaterscopeConfig) -> Result<Self> {
        let session = PortalSession::new(&cfg)?;
        Ok(Self {
            cfg,
            session: RwLock::new(Arc::new(session)),
            authenticated: AtomicBool::new(false),
        })
    }

    pub fn account(&self) -> &str {
        self.cfg.account()
    }

    /// Log in (credentials) or import and check cookies (cookie mode) on a fresh session.
    pub async fn authenticate(&self) -> Result<()> {
        let session = Arc::new(PortalSession::new(&self.cfg)?);
        self.authenticated.store(false, Ordering::SeqCst);

        match self.cfg.auth_mode {
            AuthMode::Credentials => {
                let creds = Credentials::new(&self.cfg.username, &self.cfg.password);
                B2cLogin::new(&session, &creds).run().await?;
            }
            AuthMode::Cookies => {
                session.import_cookies(&self.cfg.session_cookies)?;
                verify_session(&session).await?;
            }
        }

        *self.session.write().await = session;
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn fetch_meter_data(&self) -> Result<MeterReadings> {
        if !self.is_authenticated() {
            self.authenticate().await?;
        }
        let session = self.session.read().await.clone();

        let html = match dashboard_html(&session).await {
            Ok(html) => html,
            Err(e) => {
                if e.is_auth() {
                    self.authenticated.store(false, Ordering::SeqCst);
                }
                return Err(e);
            }
        };
        let fetched_at = Utc::now();

        let raw = extract_meter_data(&html);
        MeterReadings::from_raw(raw, fetched_at)
    }

    /// `name=value; ...` cookie string of the logged-in session.
    pub async fn cookie_header(&self) -> Result<String> {
        if !self.is_authenticated() {
            return Err(WaterscopeError::auth("not authenticated"));
        }
        Ok(self.session.read().await.cookie_header())
    }
}

#[async_trait]
impl MeterSource for WaterscopeClient {
    async fn fetch(&self) -> Result<MeterReadings> {
        self.fetch_meter_data().await
    }

    async fn reset_session(&self) -> Result<()> {
        let fresh = Arc::new(PortalSession::new(&self.cfg)?);
        *self.session.write().await = fresh;
        self.authenticated.store(false, Ordering::SeqCst);
        debug!("session reset");
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn health(&self) -> ClientHealth {
        let session_available = self.session.read().await.has_auth_cookie();
        ClientHealth {
            authenticated: self.is_authenticated(),
            session_available,
            auth_mode: match self.cfg.auth_mode {
                AuthMode::Credentials => "credentials",
                AuthMode::Cookies => "cookies",
            },
        }
    }
}

/// Home page (plus any pending token hand-off), then the consumer dashboard.
async fn dashboard_html(session: &PortalSession) -> Result<String> {
    let ep = session.endpoints();

    let resp = session.follow().get(ep.home()).send().await?;
    let home = Page::read(resp).await?.ensure_ok("load portal home")?;
    if let Some(form) = auto_post_form(&home.body, &ep.home()) {
        debug!(fields = ?form.names(), "submitting token hand-off form");
        let resp = session
            .follow()
            .post(ep.home())
            .form(&form.fields)
            .send()
            .await?;
        Page::read(resp).await?.ensure_ok("submit token hand-off")?;
    }

    let resp = session.follow().get(ep.consumer_dashboard()).send().await?;
    let page = Page::read(resp).await?;
    if ep.is_login_redirect(&page.url) {
        warn!(url = %page.url, "dashboard redirected to login");
        return Err(WaterscopeError::auth("session expired"));
    }
    let page = page.ensure_ok("load dashboard")?;
    info!(bytes = page.body.len(), "dashboard loaded");
    Ok(page.body)
}

/// Check imported cookies by opening the dashboard with them.
async fn verify_session(session: &PortalSession) -> Result<()> {
    let ep = session.endpoints();
    let resp = session.follow().get(ep.legacy_dashboard()).send().await?;
    let page = Page::read(resp).await?;

    if ep.is_login_redirect(&page.url) {
        return Err(WaterscopeError::auth("session cookies are expired or invalid"));
    }
    if page.status != reqwest::StatusCode::OK {
        return Err(WaterscopeError::auth(format!(
            "session check returned HTTP {}",
            page.status
        )));
    }
    if !looks_like_dashboard(&page.body) {
        return Err(WaterscopeError::auth("session cookies did not open the dashboard"));
    }
    info!("session cookies accepted");
    Ok(())
}
