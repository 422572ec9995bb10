pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod telemetry;
pub mod waterscope;

pub use error::{Result, WaterscopeError};

/// First three characters of a username followed by `***`, for log output.
pub fn mask_username(username: &str) -> String {
    let head: String = username.chars().take(3).collect();
    format!("{head}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_username() {
        assert_eq!(mask_username("someone@example.com"), "som***");
        assert_eq!(mask_username("ab"), "ab***");
        assert_eq!(mask_username(""), "***");
    }
}
