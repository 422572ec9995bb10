//! Wiremock stand-in for the Waterscope portal and its B2C tenant.
//!
//! One mock server plays both sites: the portal at the root and the
//! identity provider under `/b2c`.
#![allow(dead_code)]

use waterscope_bridge::config::Config;
use wiremock::matchers::{body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

pub const USERNAME: &str = "someone@example.com";
pub const PASSWORD: &str = "hunter2";
pub const CSRF: &str = "CSRF-0123456789abcdef";
pub const TX_STATE: &str = "eyJUSUQiOiJ0ZXN0In0";
pub const SESSION_COOKIE: &str = ".ASPXAUTH=SESSION42";

const TENANT: &str = "metronb2c.onmicrosoft.com";
const POLICY: &str = "B2C_1_mainsso_web";

pub const DASHBOARD_HTML: &str = r#"<html><head><title>Consumer Portal</title></head><body>
  <a href="/Consumer/Consumer/Index">Dashboard</a>
  <div class="src-int_wrp-extended">
    <label class="src-int_lbl-extended">LCD Read</label>
    <span id="lcd-read_NEW">006456.29</span><span>Ft3</span>
  </div>
  <div class="src-int_wrp-extended">
    <label class="src-int_lbl-extended">Water Consumption</label>
    <span id="last24HrUsage">16.81</span>
  </div>
  <div class="src-int_wrp-extended">
    <label class="src-int_lbl-extended">Daily Average</label>
    <span id="last24HrUsage">12.53</span>
  </div>
  <div class="src-int_wrp-extended">
    <label class="src-int_lbl-extended">So far this cycle</label>
    <span>213</span>
  </div>
  <span id="billing-read_NEW">006213</span>
  <table style="font-size: 11px"><tr>
    <td><span>innov8-VN LTE</span></td>
    <td><span class="metermname">  Metron   12345678 </span></td>
  </tr></table>
</body></html>"#;

const LOGIN_HTML: &str = r#"<html><body>
  <form method="post" action="/Home/Main">
    <input type="text" name="txtSearchUserName" />
    <button type="submit">Next</button>
  </form>
</body></html>"#;

/// Service config pointing at `base` and `b2c`; `extra_waterscope` is
/// appended to the `[waterscope]` table.
pub fn config_for(base: &str, b2c: &str, extra_waterscope: &str) -> Config {
    let raw = format!(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0
        request_timeout_secs = 30

        [waterscope]
        username = "{USERNAME}"
        password = "{PASSWORD}"
        base_url = "{base}"
        b2c_base_url = "{b2c}"
        tenant = "{TENANT}"
        policy = "{POLICY}"
        user_agent = "Mozilla/5.0 (test)"
        http_timeout_seconds = 5
        connect_timeout_seconds = 5
        {extra_waterscope}

        [poller]
        interval_seconds = 86400
        max_login_attempts = 2
        retry_delay_seconds = 0

        [telemetry]
        json = false
        "#
    );
    Config::from_toml_str(&raw).expect("test config")
}

/// Matches every request.
pub fn any_request() -> impl Match + 'static {
    |_: &Request| true
}

/// Matches requests whose query string lacks `key`.
pub fn without_query_param(key: &'static str) -> impl Match + 'static {
    move |req: &Request| !req.url.query_pairs().any(|(k, _)| k == key)
}

pub struct MockPortal {
    pub server: MockServer,
}

impl MockPortal {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn b2c(&self) -> String {
        format!("{}/b2c", self.server.uri())
    }

    fn b2c_path(&self, rest: &str) -> String {
        format!("/b2c/{TENANT}/{POLICY}/{rest}")
    }

    pub fn config(&self, extra_waterscope: &str) -> Config {
        config_for(&self.uri(), &self.b2c(), extra_waterscope)
    }

    /// Login page plus the unauthenticated fallbacks that bounce to it.
    pub async fn mount_portal(&self) {
        Mock::given(method("GET"))
            .and(path("/Home/Main"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_HTML))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Welcome</body></html>"))
            .mount(&self.server)
            .await;

        for page in ["/Consumer/Consumer/Index", "/Dashboard"] {
            Mock::given(method("GET"))
                .and(path(page))
                .and(header_regex("cookie", r"\.ASPXAUTH=SESSION42"))
                .respond_with(ResponseTemplate::new(200).set_body_string(DASHBOARD_HTML))
                .mount(&self.server)
                .await;

            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(
                    ResponseTemplate::new(302).insert_header("location", "/Home/Main"),
                )
                .with_priority(10)
                .mount(&self.server)
                .await;
        }
    }

    /// Username post, authorize page, SelfAsserted, confirmed and token exchange.
    pub async fn mount_login(&self, password_ok: bool) {
        self.mount_username_redirect().await;
        self.mount_authorize(true, true).await;
        self.mount_self_asserted(password_ok, any_request()).await;
        self.mount_confirmed(query_param("state", TX_STATE)).await;
        self.mount_token_exchange(true).await;
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize?p={POLICY}&client_id=portal", self.b2c())
    }

    pub fn self_asserted_path(&self) -> String {
        self.b2c_path("SelfAsserted")
    }

    pub fn confirmed_path(&self) -> String {
        self.b2c_path("api/CombinedSigninAndSignup/confirmed")
    }

    /// Username post answered with a 302 to the authorize page.
    pub async fn mount_username_redirect(&self) {
        self.mount_username_reply(
            ResponseTemplate::new(302).insert_header("location", self.authorize_url().as_str()),
        )
        .await;
    }

    pub async fn mount_username_reply(&self, reply: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/Home/Main"))
            .and(body_string_contains("txtSearchUserName=someone%40example.com"))
            .respond_with(reply)
            .mount(&self.server)
            .await;
    }

    /// B2C sign-in page, optionally without the CSRF cookie or the transaction id.
    pub async fn mount_authorize(&self, with_csrf: bool, with_state: bool) {
        let settings = if with_state {
            format!(r#"{{"transId":"StateProperties={TX_STATE}","api":"CombinedSigninAndSignup"}}"#)
        } else {
            r#"{"api":"CombinedSigninAndSignup"}"#.to_string()
        };
        let mut reply = ResponseTemplate::new(200)
            .set_body_string(format!("<html><script>var SETTINGS = {settings};</script></html>"));
        if with_csrf {
            reply = reply.insert_header("set-cookie", format!("x-ms-cpim-csrf={CSRF}; Path=/").as_str());
        }
        Mock::given(method("GET"))
            .and(path("/b2c/authorize"))
            .respond_with(reply)
            .mount(&self.server)
            .await;
    }

    /// SelfAsserted endpoint; only requests that also satisfy `extra` get the JSON reply.
    pub async fn mount_self_asserted(&self, password_ok: bool, extra: impl Match + 'static) {
        let reply = if password_ok {
            serde_json::json!({ "status": "200" })
        } else {
            serde_json::json!({
                "status": "400",
                "errorCode": "AADB2C90225",
                "message": "Your password is incorrect."
            })
        };
        Mock::given(method("POST"))
            .and(path(self.self_asserted_path()))
            .and(header("x-csrf-token", CSRF))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(body_string_contains("password=hunter2"))
            .and(extra)
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&self.server)
            .await;
    }

    /// Confirmation page with the `form#auto` token form; `extra` narrows which query wins.
    pub async fn mount_confirmed(&self, extra: impl Match + 'static) {
        Mock::given(method("GET"))
            .and(path(self.confirmed_path()))
            .and(query_param("csrf_token", CSRF))
            .and(extra)
            .respond_with(ResponseTemplate::new(200).set_body_string(self.token_form("AUTHCODE")))
            .mount(&self.server)
            .await;
    }

    /// Self-submitting token form posting back to the portal root.
    pub fn token_form(&self, code: &str) -> String {
        format!(
            r#"<html><body onload="document.forms[0].submit()">
               <form id="auto" method="post" action="{}/">
                 <input type="hidden" name="state" value="OIDC-STATE" />
                 <input type="hidden" name="code" value="{code}" />
                 <input type="hidden" name="id_token" value="ID.TOKEN.SIG" />
               </form></body></html>"#,
            self.uri()
        )
    }

    /// Portal root accepting the token form, with or without issuing the session cookie.
    pub async fn mount_token_exchange(&self, set_cookie: bool) {
        let mut reply = ResponseTemplate::new(200).set_body_string("<html><body>Signed in</body></html>");
        if set_cookie {
            reply = reply.insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/; HttpOnly").as_str());
        }
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_string_contains("code=AUTHCODE"))
            .respond_with(reply)
            .mount(&self.server)
            .await;
    }

    /// Requests the server saw whose path matches.
    pub async fn hits(&self, method_name: &str, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == method_name && r.url.path() == request_path)
            .count()
    }
}
