//! Health supervision (§4.E "Health supervisor").
//!
//! Three probes feed a rolling history: proxy responsiveness (a TCP connect
//! to the listening port with a 5s timeout), port occupancy (a second,
//! independent connect attempt), and storage writability (the store's own
//! last-write-succeeded flag, since the supervisor has no business opening
//! a second connection to the database). A restart policy applies bounded,
//! delayed restarts when health degrades, and a callback fires once per
//! healthy/unhealthy transition, never on every sample.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const HISTORY_CAP: usize = 50;
const MEMORY_TREND_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthSample {
    pub proxy_responsive: bool,
    pub port_occupied: bool,
    pub storage_writable: bool,
    pub memory_bytes: u64,
    pub timestamp_ms: i64,
}

impl HealthSample {
    fn state(&self) -> HealthState {
        if self.proxy_responsive && self.port_occupied && self.storage_writable {
            HealthState::Healthy
        } else if self.proxy_responsive || self.port_occupied {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub state: HealthState,
    pub uptime_pct: f64,
    pub memory_trend_bytes: i64,
    pub samples_taken: usize,
    pub last_sample: Option<HealthSample>,
}

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub restart_delay: Duration,
    pub settle_time: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            restart_delay: Duration::from_secs(5),
            settle_time: Duration::from_secs(2),
        }
    }
}

/// Reports whether the store's last write succeeded, so the storage probe
/// doesn't need its own connection to the database (§4.E "Storage probe").
#[derive(Clone, Default)]
pub struct StorageWritableFlag {
    inner: Arc<AtomicBool>,
}

impl StorageWritableFlag {
    pub fn new() -> Self {
        Self { inner: Arc::new(AtomicBool::new(true)) }
    }

    pub fn set(&self, writable: bool) {
        self.inner.store(writable, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

type HealthCallback = Box<dyn Fn(HealthState, HealthState) + Send + Sync>;

pub struct HealthSupervisor {
    listen_addr: SocketAddr,
    storage_flag: StorageWritableFlag,
    history: Mutex<Vec<HealthSample>>,
    last_state: Mutex<Option<HealthState>>,
    restart_attempts: AtomicU64,
    policy: RestartPolicy,
    on_change: Mutex<Option<HealthCallback>>,
    system: Mutex<System>,
    pid: Pid,
}

impl HealthSupervisor {
    pub fn new(listen_addr: SocketAddr, storage_flag: StorageWritableFlag) -> Self {
        Self::with_policy(listen_addr, storage_flag, RestartPolicy::default())
    }

    pub fn with_policy(
        listen_addr: SocketAddr,
        storage_flag: StorageWritableFlag,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            listen_addr,
            storage_flag,
            history: Mutex::new(Vec::with_capacity(HISTORY_CAP)),
            last_state: Mutex::new(None),
            restart_attempts: AtomicU64::new(0),
            policy,
            on_change: Mutex::new(None),
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().unwrap_or(Pid::from(0)),
        }
    }

    /// Register a callback invoked exactly once per healthy/unhealthy edge
    /// (§4.E "fires once per transition, not on every sample").
    pub fn on_health_change<F>(&self, callback: F)
    where
        F: Fn(HealthState, HealthState) + Send + Sync + 'static,
    {
        *self.on_change.lock() = Some(Box::new(callback));
    }

    /// Run one round of probes, append to history, and fire the transition
    /// callback if the aggregate state changed since the previous sample.
    pub async fn probe_once(&self, now_ms: i64) -> HealthSample {
        let proxy_responsive = probe_connect(self.listen_addr).await;
        let port_occupied = probe_connect(self.listen_addr).await;
        let storage_writable = self.storage_flag.get();
        let memory_bytes = self.sample_memory();

        let sample = HealthSample {
            proxy_responsive,
            port_occupied,
            storage_writable,
            memory_bytes,
            timestamp_ms: now_ms,
        };

        self.record(sample);
        sample
    }

    fn sample_memory(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn record(&self, sample: HealthSample) {
        let new_state = sample.state();

        {
            let mut history = self.history.lock();
            if history.len() >= HISTORY_CAP {
                history.remove(0);
            }
            history.push(sample);
        }

        let mut last_state = self.last_state.lock();
        let previous = *last_state;
        *last_state = Some(new_state);
        drop(last_state);

        if let Some(previous) = previous {
            if previous != new_state {
                info!(?previous, ?new_state, "health state transition");
                if let Some(callback) = self.on_change.lock().as_ref() {
                    callback(previous, new_state);
                }
            }
        }
    }

    /// Current aggregate report over the whole retained history window.
    pub fn report(&self) -> HealthReport {
        let history = self.history.lock();
        let samples_taken = history.len();

        let state = history.last().map(|s| s.state()).unwrap_or(HealthState::Unhealthy);

        let uptime_pct = if samples_taken == 0 {
            0.0
        } else {
            let healthy = history.iter().filter(|s| s.state() == HealthState::Healthy).count();
            (healthy as f64 / samples_taken as f64) * 100.0
        };

        // §4.E: memory trend is over the last three samples, not the whole
        // retained history.
        let window = &history[history.len().saturating_sub(3)..];
        let memory_trend_bytes = match (window.first(), window.last()) {
            (Some(first), Some(last)) if window.len() > 1 => {
                last.memory_bytes as i64 - first.memory_bytes as i64
            }
            _ => 0,
        };

        HealthReport {
            state,
            uptime_pct,
            memory_trend_bytes,
            samples_taken,
            last_sample: history.last().copied(),
        }
    }

    /// True when the memory trend crosses the supervisor's growth threshold
    /// (§4.E "Memory trend"), a signal (not itself a restart trigger) that a
    /// leak may be underway.
    pub fn memory_trend_exceeds_threshold(&self) -> bool {
        self.report().memory_trend_bytes.unsigned_abs() > MEMORY_TREND_THRESHOLD_BYTES
    }

    /// Whether another restart attempt is permitted under the bounded
    /// restart policy (§4.E "Restart policy").
    pub fn can_restart(&self) -> bool {
        self.restart_attempts.load(Ordering::Relaxed) < self.policy.max_attempts as u64
    }

    pub fn record_restart_attempt(&self) -> u64 {
        self.restart_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_restart_attempts(&self) {
        self.restart_attempts.store(0, Ordering::Relaxed);
    }

    pub fn restart_delay(&self) -> Duration {
        self.policy.restart_delay
    }

    pub fn settle_time(&self) -> Duration {
        self.policy.settle_time
    }
}

async fn probe_connect(addr: SocketAddr) -> bool {
    match timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            warn!(%addr, error = %e, "health probe connect failed");
            false
        }
        Err(_) => {
            warn!(%addr, "health probe connect timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn history_is_capped() {
        let supervisor = HealthSupervisor::new(
            "127.0.0.1:0".parse().unwrap(),
            StorageWritableFlag::new(),
        );
        for i in 0..(HISTORY_CAP + 10) {
            supervisor.record(HealthSample {
                proxy_responsive: true,
                port_occupied: true,
                storage_writable: true,
                memory_bytes: 0,
                timestamp_ms: i as i64,
            });
        }
        assert_eq!(supervisor.history.lock().len(), HISTORY_CAP);
    }

    #[test]
    fn transition_callback_fires_once_per_edge() {
        let supervisor = HealthSupervisor::new(
            "127.0.0.1:0".parse().unwrap(),
            StorageWritableFlag::new(),
        );
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        supervisor.on_health_change(move |_, _| {
            fired_clone.fetch_add(1, Ordering::Relaxed);
        });

        let healthy = HealthSample {
            proxy_responsive: true,
            port_occupied: true,
            storage_writable: true,
            memory_bytes: 0,
            timestamp_ms: 0,
        };
        let unhealthy = HealthSample { proxy_responsive: false, port_occupied: false, ..healthy };

        supervisor.record(healthy);
        supervisor.record(healthy);
        assert_eq!(fired.load(Ordering::Relaxed), 0);

        supervisor.record(unhealthy);
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        supervisor.record(unhealthy);
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        supervisor.record(healthy);
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn restart_attempts_are_bounded() {
        let supervisor = HealthSupervisor::new(
            "127.0.0.1:0".parse().unwrap(),
            StorageWritableFlag::new(),
        );
        assert!(supervisor.can_restart());
        supervisor.record_restart_attempt();
        supervisor.record_restart_attempt();
        supervisor.record_restart_attempt();
        assert!(!supervisor.can_restart());
        supervisor.reset_restart_attempts();
        assert!(supervisor.can_restart());
    }
}
