use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::PollerConfig;
use crate::domain::MeterReadings;
use crate::error::Result;
use crate::waterscope::{ClientHealth, MeterSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollError {
    pub kind: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Outcome of the polls so far. Readings survive a failed poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollSnapshot {
    pub readings: Option<MeterReadings>,
    pub last_update_success: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<PollError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthState {
    Healthy,
    NotAuthenticated,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    #[serde(flatten)]
    pub client: ClientHealth,
    pub last_update_success: bool,
    pub last_data: Option<DateTime<Utc>>,
    pub last_error: Option<PollError>,
}

/// Polls a [`MeterSource`] and keeps the latest result.
pub struct MeterPoller {
    source: Arc<dyn MeterSource>,
    snapshot: RwLock<PollSnapshot>,
    poll_lock: Mutex<()>,
    max_login_attempts: u32,
    retry_delay: Duration,
}

impl MeterPoller {
    pub fn new(source: Arc<dyn MeterSource>, cfg: &PollerConfig) -> Self {
        Self {
            source,
            snapshot: RwLock::new(PollSnapshot::default()),
            poll_lock: Mutex::new(()),
            max_login_attempts: cfg.max_login_attempts.max(1),
            retry_delay: Duration::from_secs(cfg.retry_delay_seconds),
        }
    }

    /// Poll on a fixed interval; the first poll runs immediately.
    pub async fn run(self: Arc<Self>, interval_seconds: u64) {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.poll().await {
                warn!(error = %e, kind = e.kind(), "scheduled poll failed");
            }
        }
    }

    /// One poll. Concurrent callers queue behind each other.
    pub async fn poll(&self) -> Result<MeterReadings> {
        let _guard = self.poll_lock.lock().await;
        let started = Utc::now();
        let result = self.fetch_with_login_retry().await;

        let mut snap = self.snapshot.write().await;
        snap.last_attempt = Some(started);
        match &result {
            Ok(readings) => {
                info!(
                    lcd_read = readings.meter_reading,
                    previous_day = ?readings.previous_day_consumption,
                    billing_read = ?readings.billing_read,
                    "meter data updated"
                );
                snap.readings = Some(readings.clone());
                snap.last_update_success = true;
                snap.last_success = Some(readings.fetched_at);
                snap.last_error = None;
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "meter update failed");
                snap.last_update_success = false;
                snap.last_error = Some(PollError {
                    kind: e.kind(),
                    message: e.to_string(),
                    at: Utc::now(),
                });
            }
        }
        result
    }

    async fn fetch_with_login_retry(&self) -> Result<MeterReadings> {
        let mut attempt = 1;
        loop {
            match self.source.fetch().await {
                Ok(readings) => return Ok(readings),
                Err(e) if e.is_auth() && attempt < self.max_login_attempts => {
                    warn!(
                        attempt,
                        max = self.max_login_attempts,
                        error = %e,
                        "authentication failed, retrying with a fresh session"
                    );
                    self.source.reset_session().await?;
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn snapshot(&self) -> PollSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn health(&self) -> HealthStatus {
        let client = self.source.health().await;
        let snap = self.snapshot.read().await;
        let status = if !client.authenticated {
            HealthState::NotAuthenticated
        } else if !snap.last_update_success {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        HealthStatus {
            status,
            client,
            last_update_success: snap.last_update_success,
            last_data: snap.last_success,
            last_error: snap.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WaterscopeError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Replays scripted fetch outcomes.
    struct ScriptedSource {
        outcomes: std::sync::Mutex<VecDeque<Result<MeterReadings>>>,
        fetches: AtomicUsize,
        resets: AtomicUsize,
        authenticated: AtomicBool,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<MeterReadings>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: std::sync::Mutex::new(outcomes.into()),
                fetches: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
                authenticated: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl MeterSource for ScriptedSource {
        async fn fetch(&self) -> Result<MeterReadings> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(WaterscopeError::extraction("script exhausted")));
            self.authenticated
                .store(!matches!(&next, Err(e) if e.is_auth()), Ordering::SeqCst);
            next
        }

        async fn reset_session(&self) -> Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.authenticated.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        async fn health(&self) -> ClientHealth {
            ClientHealth {
                authenticated: self.is_authenticated(),
                session_available: self.is_authenticated(),
                auth_mode: "credentials",
            }
        }
    }

    fn readings(lcd: f64) -> MeterReadings {
        MeterReadings {
            meter_reading: lcd,
            raw_meter_text: format!("{lcd} Ft3"),
            previous_day_consumption: Some(16.81),
            daily_average_consumption: None,
            billing_read: None,
            current_cycle_total: None,
            device_name: None,
            fetched_at: Utc::now(),
        }
    }

    fn poller(source: Arc<ScriptedSource>, attempts: u32) -> MeterPoller {
        let cfg = PollerConfig {
            interval_seconds: 86400,
            max_login_attempts: attempts,
            retry_delay_seconds: 0,
        };
        MeterPoller::new(source, &cfg)
    }

    #[tokio::test]
    async fn test_successful_poll_updates_snapshot() {
        let source = ScriptedSource::new(vec![Ok(readings(6456.29))]);
        let poller = poller(source.clone(), 2);

        let r = poller.poll().await.unwrap();
        assert_eq!(r.meter_reading, 6456.29);

        let snap = poller.snapshot().await;
        assert!(snap.last_update_success);
        assert_eq!(snap.last_success, Some(r.fetched_at));
        assert!(snap.last_error.is_none());
        assert_eq!(poller.health().await.status, HealthState::Healthy);
    }

    #[tokio::test]
    async fn test_auth_failure_retries_with_fresh_session() {
        let source = ScriptedSource::new(vec![
            Err(WaterscopeError::auth("session expired")),
            Ok(readings(100.5)),
        ]);
        let poller = poller(source.clone(), 2);

        assert_eq!(poller.poll().await.unwrap().meter_reading, 100.5);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_retries_are_bounded() {
        let source = ScriptedSource::new(vec![
            Err(WaterscopeError::auth("bad password")),
            Err(WaterscopeError::auth("bad password")),
            Ok(readings(1.0)),
        ]);
        let poller = poller(source.clone(), 2);

        assert!(poller.poll().await.unwrap_err().is_auth());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        let health = poller.health().await;
        assert_eq!(health.status, HealthState::NotAuthenticated);
        assert_eq!(health.last_error.unwrap().kind, "auth");
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_retried_and_keeps_readings() {
        let source = ScriptedSource::new(vec![
            Ok(readings(10.0)),
            Err(WaterscopeError::extraction("No LCD meter reading found")),
        ]);
        let poller = poller(source.clone(), 3);

        poller.poll().await.unwrap();
        assert!(poller.poll().await.is_err());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.resets.load(Ordering::SeqCst), 0);

        let snap = poller.snapshot().await;
        assert!(!snap.last_update_success);
        assert_eq!(snap.readings.unwrap().meter_reading, 10.0);
        assert_eq!(poller.health().await.status, HealthState::Degraded);
    }
}
