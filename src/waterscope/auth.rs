//! Azure AD B2C sign-in, replayed over plain HTTP.
//!
//! The portal delegates login to a B2C tenant. The flow below reproduces
//! what a browser does: portal login page, username post, B2C authorize
//! page, the `SelfAsserted` XHR with the password, the `confirmed` page
//! that renders the token form, and the form post back to the portal.

use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::html::{first_form, form_actions, meta_refresh_url, transaction_state, FormData};
use super::session::{Page, PortalSession};
use crate::error::{Result, WaterscopeError};
use crate::mask_username;

const CSRF_COOKIE: &str = "x-ms-cpim-csrf";
const XHR_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &mask_username(&self.username))
            .field("password", &"***")
            .finish()
    }
}

/// Tokens picked off the B2C authorize page.
#[derive(Debug, Clone)]
struct AuthorizePage {
    url: String,
    csrf: String,
    state: String,
}

/// Body shape of a `SelfAsserted` reply. B2C answers 200 even for a bad
/// password and reports the outcome here.
#[derive(Debug, Deserialize)]
struct SelfAssertedReply {
    status: Option<serde_json::Value>,
    message: Option<String>,
}

impl SelfAssertedReply {
    fn accepted(&self) -> bool {
        match &self.status {
            None => true,
            Some(serde_json::Value::String(s)) => s == "200",
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(200),
            Some(_) => false,
        }
    }
}

/// One login run against a fresh [`PortalSession`].
pub struct B2cLogin<'a> {
    session: &'a PortalSession,
    credentials: &'a Credentials,
}

impl<'a> B2cLogin<'a> {
    pub fn new(session: &'a PortalSession, credentials: &'a Credentials) -> Self {
        Self {
            session,
            credentials,
        }
    }

    /// Run every step; on success the session's jar holds the portal auth cookies.
    pub async fn run(&self) -> Result<()> {
        let user = mask_username(&self.credentials.username);
        info!(%user, "starting Waterscope login");

        self.load_login_page().await?;
        let authorize_url = self.submit_username().await?;
        debug!(url = %truncate(&authorize_url, 50), "authorize URL");

        let page = self.load_authorize_page(&authorize_url).await?;
        debug!(
            csrf = %truncate(&page.csrf, 10),
            state = %truncate(&page.state, 20),
            "authorize page tokens"
        );

        self.submit_password(&page).await?;
        let form = self.confirm(&page).await?;
        debug!(fields = ?form.names(), "token form");

        self.exchange_tokens(&form).await?;
        info!(%user, "Waterscope login complete");
        Ok(())
    }

    async fn load_login_page(&self) -> Result<()> {
        let url = self.session.endpoints().login_page();
        let resp = self.session.follow().get(&url).send().await?;
        Page::read(resp).await?.ensure_ok("load login page")?;
        Ok(())
    }

    async fn submit_username(&self) -> Result<String> {
        let ep = self.session.endpoints();
        let resp = self
            .session
            .manual()
            .post(ep.login_page())
            .header(ORIGIN, ep.origin())
            .header(REFERER, ep.login_page())
            .form(&[("txtSearchUserName", self.credentials.username.as_str())])
            .send()
            .await?;
        let page = Page::read(resp).await?;

        if page.is_redirect() {
            if let Some(location) = page.location.as_deref() {
                if ep.is_identity_provider(location) {
                    return Ok(location.to_string());
                }
                debug!(%location, "redirect does not point at the identity provider");
            }
        }
        let resolve = |target: String| match page.url.join(&target) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                debug!(%target, error = %e, "unusable redirect target");
                None
            }
        };
        if let Some(url) = meta_refresh_url(&page.body).and_then(resolve) {
            return Ok(url);
        }
        if let Some(action) = form_actions(&page.body)
            .into_iter()
            .filter_map(resolve)
            .find(|a| ep.is_identity_provider(a))
        {
            return Ok(action);
        }

        warn!(status = %page.status, body = %page.snippet(), "no authorize redirect after username");
        Err(WaterscopeError::auth("could not find the sign-in redirect"))
    }

    async fn load_authorize_page(&self, authorize_url: &str) -> Result<AuthorizePage> {
        let ep = self.session.endpoints();
        let resp = self
            .session
            .follow()
            .get(authorize_url)
            .header(REFERER, ep.home())
            .send()
            .await?;
        let page = Page::read(resp).await?.ensure_ok("load sign-in page")?;

        let csrf = self
            .session
            .cookie_containing(page.url.as_str(), CSRF_COOKIE)
            .or_else(|| self.session.cookie_containing(&ep.self_asserted(), CSRF_COOKIE))
            .ok_or_else(|| WaterscopeError::auth("no CSRF cookie on the sign-in page"))?;

        let state = match transaction_state(&page.url, &page.body) {
            Some(state) => state,
            None => {
                warn!("no transaction state on sign-in page, using CSRF token");
                csrf.clone()
            }
        };

        Ok(AuthorizePage {
            url: page.url.to_string(),
            csrf,
            state,
        })
    }

    async fn submit_password(&self, page: &AuthorizePage) -> Result<()> {
        let ep = self.session.endpoints();
        let creds = self.credentials;
        let prefixed = format!("StateProperties={}", page.state);

        let email_body = [
            ("request_type", "RESPONSE"),
            ("email", creds.username.as_str()),
            ("password", creds.password.as_str()),
        ];
        let sign_in_body = [
            ("signInName", creds.username.as_str()),
            ("password", creds.password.as_str()),
            ("request_type", "RESPONSE"),
        ];
        let attempts: [(&str, &[(&str, &str)]); 3] = [
            (page.state.as_str(), &email_body[..]),
            (prefixed.as_str(), &email_body[..]),
            (page.state.as_str(), &sign_in_body[..]),
        ];

        let mut rejection = None;
        for (n, (tx, body)) in attempts.iter().enumerate() {
            let attempt = n + 1;
            let resp = self
                .session
                .follow()
                .post(ep.self_asserted())
                .query(&[("tx", *tx), ("p", ep.policy())])
                .header(ACCEPT, XHR_ACCEPT)
                .header("X-CSRF-TOKEN", &page.csrf)
                .header("X-Requested-With", "XMLHttpRequest")
                .header(ORIGIN, ep.b2c_origin())
                .header(REFERER, &page.url)
                .form(*body)
                .send()
                .await;

            let page_resp = match resp {
                Ok(resp) => Page::read(resp).await,
                Err(e) => Err(e.into()),
            };
            let reply = match page_resp {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(attempt, error = %e, "credential submission failed");
                    continue;
                }
            };

            if reply.status != reqwest::StatusCode::OK {
                warn!(attempt, status = %reply.status, body = %reply.snippet(), "credentials not accepted");
                continue;
            }
            match serde_json::from_str::<SelfAssertedReply>(&reply.body) {
                Ok(json) if !json.accepted() => {
                    warn!(attempt, status = ?json.status, "sign-in rejected");
                    rejection = json.message;
                    continue;
                }
                _ => {}
            }

            info!(attempt, "credentials accepted");
            return Ok(());
        }

        Err(WaterscopeError::auth(match rejection {
            Some(msg) => format!("credentials rejected: {msg}"),
            None => "credential submission failed".to_string(),
        }))
    }

    async fn confirm(&self, page: &AuthorizePage) -> Result<FormData> {
        let ep = self.session.endpoints();
        let diags = serde_json::json!({
            "pageViewId": Uuid::new_v4().to_string(),
            "pageId": "CombinedSigninAndSignup",
            "trace": [],
        })
        .to_string();
        let prefixed = format!("StateProperties={}", page.state);

        let variants: [Vec<(&str, &str)>; 3] = [
            vec![
                ("rememberMe", "false"),
                ("csrf_token", page.csrf.as_str()),
                ("state", page.state.as_str()),
                ("p", ep.policy()),
                ("diags", diags.as_str()),
            ],
            vec![
                ("rememberMe", "false"),
                ("csrf_token", page.csrf.as_str()),
                ("tx", prefixed.as_str()),
                ("p", ep.policy()),
                ("diags", diags.as_str()),
            ],
            vec![
                ("rememberMe", "false"),
                ("csrf_token", page.csrf.as_str()),
                ("p", ep.policy()),
            ],
        ];

        for (n, query) in variants.iter().enumerate() {
            let attempt = n + 1;
            let resp = match self
                .session
                .follow()
                .get(ep.confirmed())
                .query(query)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt, error = %e, "confirmation request failed");
                    continue;
                }
            };
            let reply = match Page::read(resp).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(attempt, error = %e, "confirmation response unreadable");
                    continue;
                }
            };
            if reply.status != reqwest::StatusCode::OK {
                warn!(attempt, status = %reply.status, body = %reply.snippet(), "confirmation refused");
                continue;
            }
            match first_form(&reply.body) {
                Some(form) if !form.fields.is_empty() => {
                    info!(attempt, "sign-in confirmed");
                    return Ok(form);
                }
                Some(_) => warn!(attempt, "confirmation form has no values"),
                None => warn!(attempt, "no form on confirmation page"),
            }
        }

        Err(WaterscopeError::auth("sign-in confirmation failed"))
    }

    async fn exchange_tokens(&self, form: &FormData) -> Result<()> {
        let ep = self.session.endpoints();
        let target = form
            .action
            .as_deref()
            .filter(|a| a.starts_with(ep.origin()))
            .map(str::to_string)
            .unwrap_or_else(|| ep.home());

        let resp = self
            .session
            .follow()
            .post(&target)
            .header(ORIGIN, ep.b2c_origin())
            .header(REFERER, format!("{}/", ep.b2c_origin()))
            .form(&form.fields)
            .send()
            .await?;
        let status = Page::read(resp).await?.status;
        if status != reqwest::StatusCode::OK {
            return Err(WaterscopeError::auth(format!("token exchange returned HTTP {status}")));
        }

        if !self.session.has_auth_cookie() {
            return Err(WaterscopeError::auth("no portal session cookie after token exchange"));
        }

        let resp = self
            .session
            .manual()
            .get(ep.consumer_dashboard())
            .send()
            .await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(WaterscopeError::auth(format!(
                "dashboard check after login returned HTTP {status}"
            )));
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
