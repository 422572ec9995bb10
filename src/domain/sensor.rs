//! Sensor view over [`MeterReadings`].
//!
//! Each [`SensorKind`] maps one reading to a descriptor (unit, classes,
//! icon) and a stable unique id. Snapshots are rebuilt from the latest
//! readings on every request; nothing here holds state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use super::MeterReadings;

pub const INTEGRATION: &str = "waterscope";
pub const DEFAULT_DEVICE_NAME: &str = "Waterscope";
pub const MANUFACTURER: &str = "Waterscope";
pub const MODEL: &str = "Water Usage Monitor";
pub const UNIT_CUBIC_FEET: &str = "ft³";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    LcdRead,
    PreviousDayConsumption,
    DailyAverageConsumption,
    BillingRead,
    CurrentCycleTotal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Water,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    pub kind: SensorKind,
    pub name: &'static str,
    pub unit: &'static str,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
    pub icon: &'static str,
}

impl SensorKind {
    pub fn descriptor(self) -> SensorDescriptor {
        let (name, state_class, icon) = match self {
            SensorKind::LcdRead => ("LCD Read", StateClass::TotalIncreasing, "mdi:water-gauge"),
            SensorKind::PreviousDayConsumption => {
                ("Previous Day Consumption", StateClass::Measurement, "mdi:water")
            }
            SensorKind::DailyAverageConsumption => {
                ("Daily Average Consumption", StateClass::Measurement, "mdi:chart-line")
            }
            SensorKind::BillingRead => ("Billing Read", StateClass::TotalIncreasing, "mdi:receipt"),
            SensorKind::CurrentCycleTotal => {
                ("Current Cycle Total", StateClass::Total, "mdi:calendar-month")
            }
        };
        SensorDescriptor {
            kind: self,
            name,
            unit: UNIT_CUBIC_FEET,
            device_class: DeviceClass::Water,
            state_class,
            icon,
        }
    }

    pub fn value(self, r: &MeterReadings) -> Option<f64> {
        match self {
            SensorKind::LcdRead => Some(r.meter_reading),
            SensorKind::PreviousDayConsumption => r.previous_day_consumption,
            SensorKind::DailyAverageConsumption => r.daily_average_consumption,
            SensorKind::BillingRead => r.billing_read,
            SensorKind::CurrentCycleTotal => r.current_cycle_total,
        }
    }

    pub fn unique_id(self, account: &str) -> String {
        format!("{account}_{self}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: &'static str,
}

impl DeviceInfo {
    pub fn new(account: &str, readings: Option<&MeterReadings>) -> Self {
        let name = readings
            .and_then(|r| r.device_name.clone())
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());
        Self {
            identifier: format!("{INTEGRATION}_{account}"),
            name,
            manufacturer: MANUFACTURER,
            model: MODEL,
            sw_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAttributes {
    pub integration: &'static str,
    pub data_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_meter_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub unique_id: String,
    #[serde(flatten)]
    pub descriptor: SensorDescriptor,
    pub value: Option<f64>,
    pub available: bool,
    pub attributes: SensorAttributes,
}

/// All sensors for one account, as of the latest poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub device: DeviceInfo,
    pub sensors: Vec<SensorSnapshot>,
}

pub fn build_report(
    account: &str,
    readings: Option<&MeterReadings>,
    last_update_success: bool,
) -> SensorReport {
    let sensors = SensorKind::iter()
        .map(|kind| SensorSnapshot {
            unique_id: kind.unique_id(account),
            descriptor: kind.descriptor(),
            value: readings.and_then(|r| kind.value(r)),
            available: last_update_success,
            attributes: SensorAttributes {
                integration: INTEGRATION,
                data_source: "dashboard",
                raw_meter_text: match kind {
                    SensorKind::LcdRead => readings.map(|r| r.raw_meter_text.clone()),
                    _ => None,
                },
                last_updated: readings.map(|r| r.fetched_at),
            },
        })
        .collect();

    SensorReport {
        device: DeviceInfo::new(account, readings),
        sensors,
    }
}
