use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, UPGRADE_INSECURE_REQUESTS,
};
use reqwest::{redirect, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::WaterscopeConfig;
use crate::error::{Result, WaterscopeError};

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

/// Cookies the portal issues once the token exchange has succeeded.
pub const AUTH_COOKIES: [&str; 2] = [".ASPXAUTH", ".AspNet.Cookies"];

/// URLs of the portal and of its B2C identity provider.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
    b2c: String,
    tenant: String,
    policy: String,
}

impl Endpoints {
    pub fn from_config(cfg: &WaterscopeConfig) -> Self {
        Self {
            base: cfg.base_url.trim_end_matches('/').to_string(),
            b2c: cfg.b2c_base_url.trim_end_matches('/').to_string(),
            tenant: cfg.tenant.clone(),
            policy: cfg.policy.clone(),
        }
    }

    /// Portal origin, without trailing slash.
    pub fn origin(&self) -> &str {
        &self.base
    }

    pub fn b2c_origin(&self) -> &str {
        &self.b2c
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn home(&self) -> String {
        format!("{}/", self.base)
    }

    pub fn login_page(&self) -> String {
        format!("{}/Home/Main", self.base)
    }

    pub fn consumer_dashboard(&self) -> String {
        format!("{}/Consumer/Consumer/Index", self.base)
    }

    /// Older dashboard route, used to verify imported cookies.
    pub fn legacy_dashboard(&self) -> String {
        format!("{}/Dashboard", self.base)
    }

    pub fn self_asserted(&self) -> String {
        format!("{}/{}/{}/SelfAsserted", self.b2c, self.tenant, self.policy)
    }

    pub fn confirmed(&self) -> String {
        format!(
            "{}/{}/{}/api/CombinedSigninAndSignup/confirmed",
            self.b2c, self.tenant, self.policy
        )
    }

    pub fn is_identity_provider(&self, url: &str) -> bool {
        url.contains("b2clogin.com") || url.starts_with(&self.b2c)
    }

    /// True when a dashboard request was bounced back to a login page.
    pub fn is_login_redirect(&self, url: &Url) -> bool {
        let s = url.as_str();
        s.contains("Home/Main") || s.to_ascii_lowercase().contains("login")
    }
}

/// A fetched page with the bits the login flow inspects.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: StatusCode,
    pub url: Url,
    pub location: Option<String>,
    pub body: String,
}

impl Page {
    pub async fn read(resp: Response) -> Result<Self> {
        let status = resp.status();
        let url = resp.url().clone();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await?;
        debug!(%status, %url, bytes = body.len(), "response");
        Ok(Self {
            status,
            url,
            location,
            body,
        })
    }

    pub fn ensure_ok(self, context: &str) -> Result<Self> {
        if self.status == StatusCode::OK {
            Ok(self)
        } else {
            Err(WaterscopeError::http(self.status, context))
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, StatusCode::FOUND | StatusCode::SEE_OTHER)
    }

    /// Start of the body, for log lines on unexpected responses.
    pub fn snippet(&self) -> &str {
        let end = self
            .body
            .char_indices()
            .nth(200)
            .map(|(i, _)| i)
            .unwrap_or(self.body.len());
        &self.body[..end]
    }
}

/// One browser-like session against the portal and its identity provider.
///
/// Two clients share a cookie jar: `follow` behaves like a browser
/// navigation, `manual` leaves 3xx responses to the caller.
pub struct PortalSession {
    follow: reqwest::Client,
    manual: reqwest::Client,
    jar: Arc<Jar>,
    endpoints: Endpoints,
}

impl PortalSession {
    pub fn new(cfg: &WaterscopeConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("dnt", HeaderValue::from_static("1"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let builder = || {
            reqwest::Client::builder()
                .user_agent(cfg.user_agent.clone())
                .default_headers(headers.clone())
                .cookie_provider(jar.clone())
                .timeout(cfg.http_timeout())
                .connect_timeout(cfg.connect_timeout())
                .http1_only()
        };

        let follow = builder()
            .redirect(redirect::Policy::limited(10))
            .build()?;
        let manual = builder().redirect(redirect::Policy::none()).build()?;

        Ok(Self {
            follow,
            manual,
            jar,
            endpoints: Endpoints::from_config(cfg),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn follow(&self) -> &reqwest::Client {
        &self.follow
    }

    pub fn manual(&self) -> &reqwest::Client {
        &self.manual
    }

    /// Cookies the jar would send to `url`, as name/value pairs.
    pub fn cookies_for(&self, url: &str) -> Vec<(String, String)> {
        let Ok(url) = Url::parse(url) else {
            return Vec::new();
        };
        self.jar
            .cookies(&url)
            .and_then(|v| v.to_str().ok().map(parse_cookie_pairs))
            .unwrap_or_default()
    }

    /// First cookie for `url` whose name contains `needle`.
    pub fn cookie_containing(&self, url: &str, needle: &str) -> Option<String> {
        self.cookies_for(url)
            .into_iter()
            .find(|(name, _)| name.contains(needle))
            .map(|(_, value)| value)
    }

    pub fn has_auth_cookie(&self) -> bool {
        self.cookies_for(&self.endpoints.home())
            .iter()
            .any(|(name, _)| AUTH_COOKIES.contains(&name.as_str()))
    }

    /// `name=value; ...` header for the portal, for reuse outside this session.
    pub fn cookie_header(&self) -> String {
        self.cookies_for(&self.endpoints.home())
            .into_iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Import a `a=1; b=2` cookie string captured from a browser.
    pub fn import_cookies(&self, raw: &str) -> Result<usize> {
        let pairs = parse_cookie_pairs(raw);
        if pairs.is_empty() {
            return Err(WaterscopeError::Config("no session cookies provided".into()));
        }
        let url = Url::parse(&self.endpoints.home())?;
        for (name, value) in &pairs {
            self.jar.add_cookie_str(&format!("{name}={value}; Path=/"), &url);
        }
        debug!(count = pairs.len(), "imported session cookies");
        Ok(pairs.len())
    }
}

/// Split a `Cookie:` style string into pairs, skipping fragments without `=`.
pub fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
