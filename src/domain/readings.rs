use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WaterscopeError};

/// Strings exactly as scraped from the dashboard, before any conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawMeterData {
    pub meter_reading: Option<String>,
    pub previous_day_consumption: Option<String>,
    pub daily_average_consumption: Option<String>,
    pub billing_read: Option<String>,
    pub current_cycle_total: Option<String>,
    pub device_name: Option<String>,
}

/// Typed values from one poll. Volumes are in cubic feet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    /// LCD read: the register shown on the meter display.
    pub meter_reading: f64,
    pub raw_meter_text: String,
    pub previous_day_consumption: Option<f64>,
    pub daily_average_consumption: Option<f64>,
    pub billing_read: Option<f64>,
    pub current_cycle_total: Option<f64>,
    pub device_name: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl MeterReadings {
    /// Convert a scrape into typed readings.
    ///
    /// The LCD read is mandatory; every other figure degrades to `None`
    /// with a warning when it is missing or malformed.
    pub fn from_raw(raw: RawMeterData, fetched_at: DateTime<Utc>) -> Result<Self> {
        let text = raw
            .meter_reading
            .ok_or_else(|| WaterscopeError::extraction("No LCD meter reading found"))?;
        let meter_reading = parse_number(&text).ok_or_else(|| {
            WaterscopeError::extraction(format!("Invalid meter reading format: {text}"))
        })?;
        info!(lcd_read = meter_reading, "LCD meter reading (ft3)");

        Ok(Self {
            meter_reading,
            raw_meter_text: format!("{} Ft3", text.trim()),
            previous_day_consumption: optional("previous_day_consumption", raw.previous_day_consumption),
            daily_average_consumption: optional("daily_average_consumption", raw.daily_average_consumption),
            billing_read: optional("billing_read", raw.billing_read),
            current_cycle_total: optional("current_cycle_total", raw.current_cycle_total),
            device_name: raw.device_name,
            fetched_at,
        })
    }
}

fn optional(field: &'static str, value: Option<String>) -> Option<f64> {
    let Some(text) = value else {
        warn!(field, "value not found on dashboard");
        return None;
    };
    match parse_number(&text) {
        Some(v) => {
            info!(field, value = v, "dashboard value (ft3)");
            Some(v)
        }
        None => {
            warn!(field, raw = %text, "invalid number format, ignoring");
            None
        }
    }
}

/// Parse a dashboard number, tolerating surrounding whitespace and thousands separators.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
