//! Dashboard scrape.
//!
//! The consumer dashboard has no API; every value is pulled out of the
//! rendered HTML by element id, by the label next to it, or by a regex over
//! the raw markup. Each lookup is independent and yields `None` on a miss.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::html::{collapse_whitespace, selector, stripped_text};
use crate::domain::RawMeterData;

const LCD_READ_IDS: [&str; 2] = ["#lcd-read_NEW", "#lcd-read_NEW_1"];
const WRAPPER_CLASS: &str = "src-int_wrp-extended";

static LABELS: Lazy<Selector> = Lazy::new(|| selector("label.src-int_lbl-extended"));
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static BILLING_READ: Lazy<Selector> = Lazy::new(|| selector("span#billing-read_NEW"));
static TABLE: Lazy<Selector> = Lazy::new(|| selector("table"));
static DASHBOARD_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[href*="Dashboard"]"#));
static DIV: Lazy<Selector> = Lazy::new(|| selector("div"));
static CANVAS_OR_TABLE: Lazy<Selector> = Lazy::new(|| selector("canvas, table"));

static LCD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{6}\.\d{2}\b").expect("regex"));
static LCD_LABELLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)LCD Read[^0-9]*(\d+(?:\.\d+)?)\s*Ft3").expect("regex"));
static LCD_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)LCD Read").expect("regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("regex"));
static NUMBER_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("regex"));
static DASHBOARD_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)dashboard").expect("regex"));
static USAGE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)meter|reading|usage").expect("regex"));

/// Labelled figures: the label keywords that identify each one.
const PREVIOUS_DAY: &[&str] = &["Water", "Consumption"];
const DAILY_AVERAGE: &[&str] = &["Daily", "Average"];
const CYCLE_TOTAL: &[&str] = &["So far this", "cycle"];

/// Pull every known figure out of the consumer dashboard.
pub fn extract_meter_data(html: &str) -> RawMeterData {
    if !html.contains("lcd-read_NEW") {
        warn!("dashboard markup has no lcd-read_NEW element");
    }
    if !(html.contains("Consumer/Consumer/Index") || html.contains("Consumer Portal")) {
        debug!("page does not look like the consumer dashboard");
    }

    let doc = Html::parse_document(html);
    let data = RawMeterData {
        meter_reading: lcd_read(&doc, html),
        previous_day_consumption: labelled_value(&doc, PREVIOUS_DAY),
        daily_average_consumption: labelled_value(&doc, DAILY_AVERAGE),
        billing_read: billing_read(&doc),
        current_cycle_total: labelled_value(&doc, CYCLE_TOTAL),
        device_name: device_name(&doc),
    };
    debug!(?data, "dashboard scrape");
    data
}

fn lcd_read(doc: &Html, html: &str) -> Option<String> {
    for css in LCD_READ_IDS {
        if let Some(el) = doc.select(&selector(css)).next() {
            let text = stripped_text(el);
            if !text.is_empty() && text != "NA" && text.contains('.') {
                info!(selector = css, value = %text, "LCD read from element");
                return Some(text);
            }
            debug!(selector = css, text = %text, "LCD element present but unusable");
        }
    }

    if let Some(m) = LCD_PATTERN
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|s| plausible_register(s))
    {
        info!(value = m, "LCD read from register pattern");
        return Some(m.to_string());
    }

    if let Some(c) = LCD_LABELLED.captures(html) {
        info!(value = &c[1], "LCD read next to label text");
        return Some(c[1].to_string());
    }

    // Parent element of any text node mentioning the label.
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if !LCD_TEXT.is_match(text) {
            continue;
        }
        let Some(parent) = node.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let parent_text: String = parent.text().collect();
        if let Some(n) = NUMBER
            .find_iter(&parent_text)
            .map(|m| m.as_str())
            .find(|s| s.contains('.') && plausible_register(s))
        {
            info!(value = n, "LCD read from labelled element");
            return Some(n.to_string());
        }
    }

    warn!("could not extract LCD read");
    None
}

fn plausible_register(s: &str) -> bool {
    s.parse::<f64>().is_ok_and(|v| v > 0.0 && v < 999_999.0)
}

/// Value of the first `label.src-int_lbl-extended` containing every keyword.
///
/// The number lives in a sibling span inside the label's
/// `div.src-int_wrp-extended` wrapper; ids on those spans are reused
/// across figures, so the label text is the only reliable anchor.
fn labelled_value(doc: &Html, keywords: &[&str]) -> Option<String> {
    let label = doc
        .select(&LABELS)
        .find(|l| {
            let text = stripped_text(*l);
            keywords.iter().all(|k| text.contains(k))
        })?;

    let wrapper = label.ancestors().filter_map(ElementRef::wrap).find(|el| {
        el.value().name() == "div"
            && el.value().has_class(WRAPPER_CLASS, scraper::CaseSensitivity::CaseSensitive)
    })?;

    let value = wrapper
        .select(&SPAN)
        .map(stripped_text)
        .find(|t| NUMBER_ONLY.is_match(t));
    if let Some(v) = &value {
        info!(label = %keywords.join(" "), value = %v, "labelled dashboard value");
    }
    value
}

fn billing_read(doc: &Html) -> Option<String> {
    let text = stripped_text(doc.select(&BILLING_READ).next()?);
    if text.is_empty() || text == "NA" {
        return None;
    }
    NUMBER.find(&text).map(|m| m.as_str().to_string())
}

/// "<model> <meter id>" from the small meter-info table.
fn device_name(doc: &Html) -> Option<String> {
    let table = doc.select(&TABLE).find(|t| {
        t.value()
            .attr("style")
            .is_some_and(|s| s.contains("font-size: 11px"))
    })?;

    let mut model = None;
    let mut meter = None;
    for span in table.select(&SPAN) {
        let text = stripped_text(span);
        if text.contains("innov8-VN LTE") {
            model = Some(text);
        } else if span.value().classes().eq(["metermname"]) {
            meter = Some(span.text().collect::<String>());
        }
    }

    let name = format!("{} {}", model?, collapse_whitespace(&meter?));
    info!(device = %name, "device name");
    Some(name)
}

/// Whether an authenticated page looks like a dashboard rather than a login form.
pub fn looks_like_dashboard(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let indicators = [
        doc.select(&DASHBOARD_LINK).next().is_some(),
        doc.root_element()
            .descendants()
            .filter_map(|n| n.value().as_text().map(|t| &**t))
            .any(|t| DASHBOARD_WORD.is_match(t)),
        doc.select(&DIV).any(|d| {
            d.value()
                .attr("class")
                .is_some_and(|c| USAGE_CLASS.is_match(c))
        }),
        doc.select(&CANVAS_OR_TABLE).next().is_some(),
    ];
    debug!(?indicators, "dashboard indicators");
    indicators.iter().any(|&hit| hit)
}
