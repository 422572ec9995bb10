//! Waterscope consumer portal: B2C login, session handling and dashboard scraping.

pub mod auth;
pub mod client;
pub mod dashboard;
pub mod html;
pub mod session;

pub use auth::{B2cLogin, Credentials};
pub use client::{ClientHealth, MeterSource, WaterscopeClient};
pub use dashboard::{extract_meter_data, looks_like_dashboard};
pub use session::{Endpoints, PortalSession};
