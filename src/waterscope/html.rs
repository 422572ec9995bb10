//! HTML helpers shared by the login flow and the dashboard scraper.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

static FORM: Lazy<Selector> = Lazy::new(|| selector("form"));
static INPUT: Lazy<Selector> = Lazy::new(|| selector("input"));
static HIDDEN_INPUT: Lazy<Selector> = Lazy::new(|| selector(r#"input[type="hidden"]"#));
static META: Lazy<Selector> = Lazy::new(|| selector("meta[http-equiv]"));
static TX_INPUT: Lazy<Selector> = Lazy::new(|| selector(r#"input[name="tx"]"#));
static AUTO_FORM: Lazy<Selector> = Lazy::new(|| selector("form#auto"));

static REFRESH_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)url=(.+)").expect("regex"));
static TX_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tx=([^&\s"']+)"#).expect("regex"));
static STATE_PROPERTIES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"StateProperties=([^&\s"']+)"#).expect("regex"));

/// A form found on a page: where it posts and its name/value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormData {
    pub action: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl FormData {
    fn from_element(form: ElementRef<'_>, inputs: &Selector) -> Self {
        let fields = form
            .select(inputs)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value")?;
                (!name.is_empty() && !value.is_empty())
                    .then(|| (name.to_string(), value.to_string()))
            })
            .collect();
        Self {
            action: form.value().attr("action").map(str::to_string),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Text of an element with each fragment trimmed and empty fragments dropped.
pub fn stripped_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|s| !s.is_empty()).collect()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `<form>` on the page with every input that has a name and a value.
pub fn first_form(html: &str) -> Option<FormData> {
    let doc = Html::parse_document(html);
    let form = doc.select(&FORM).next()?;
    Some(FormData::from_element(form, &INPUT))
}

/// Target of a `<meta http-equiv="refresh" content="0; url=...">`.
pub fn meta_refresh_url(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&META)
        .filter(|m| {
            m.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
        })
        .filter_map(|m| m.value().attr("content"))
        .find_map(|content| {
            REFRESH_URL
                .captures(content)
                .map(|c| c[1].trim().trim_matches(|ch| ch == '\'' || ch == '"').to_string())
        })
}

pub fn form_actions(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&FORM)
        .filter_map(|f| f.value().attr("action"))
        .map(str::to_string)
        .collect()
}

/// Transaction state of a B2C sign-in page.
///
/// Lookup order: `tx` query parameter, `state` query parameter, a `tx=`
/// fragment in the body, a `StateProperties=` fragment in the body, then
/// an `<input name="tx">`.
pub fn transaction_state(page_url: &Url, body: &str) -> Option<String> {
    let query = |key: &str| {
        page_url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    query("tx")
        .or_else(|| query("state"))
        .or_else(|| TX_PARAM.captures(body).map(|c| c[1].to_string()))
        .or_else(|| STATE_PROPERTIES.captures(body).map(|c| c[1].to_string()))
        .or_else(|| {
            let doc = Html::parse_document(body);
            doc.select(&TX_INPUT)
                .next()
                .and_then(|i| i.value().attr("value"))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
}

/// The self-submitting `form#auto` the portal serves to finish the token hand-off.
///
/// Only returned when the form posts back to the portal root.
pub fn auto_post_form(html: &str, portal_home: &str) -> Option<FormData> {
    let doc = Html::parse_document(html);
    let form = doc.select(&AUTO_FORM).next()?;
    let action = form.value().attr("action")?;
    if action.trim_end_matches('/') != portal_home.trim_end_matches('/') {
        return None;
    }
    Some(FormData::from_element(form, &HIDDEN_INPUT))
}
