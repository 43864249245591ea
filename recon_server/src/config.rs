use std::{env, time::Duration};

use log::*;
use prc_common::parse_boolean_flag;
use provider_tools::{ProviderConfig, ProviderId};
use recon_engine::helpers::{FeeRate, FeeSchedule};

const DEFAULT_PRC_HOST: &str = "127.0.0.1";
const DEFAULT_PRC_PORT: u16 = 8360;
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 5;
const DEFAULT_DISPATCH_BATCH: u32 = 20;
const DEFAULT_DISPATCH_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WORKER_CONCURRENCY: usize = 2;
const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 64;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;
/// Minutes after the payment is first watched at which the poller re-queries the provider.
const DEFAULT_POLL_BACKOFF_MINS: [u64; 3] = [3, 10, 30];

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub fee_schedule: FeeSchedule,
    pub dispatcher: DispatcherConfig,
    pub poller: PollerConfig,
    pub worker: WorkerConfig,
    pub event_buffer_size: usize,
    /// Providers the server accepts webhooks from and can query for status.
    pub providers: Vec<ProviderConfig>,
    /// When true, a webhook carrying an unknown (non-terminal) status registers a fallback
    /// status watcher for the order.
    pub watch_on_pending_webhook: bool,
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub interval: Duration,
    pub batch_size: u32,
    pub max_attempts: i64,
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_DISPATCH_INTERVAL_SECS),
            batch_size: DEFAULT_DISPATCH_BATCH,
            max_attempts: DEFAULT_DISPATCH_MAX_ATTEMPTS,
            request_timeout: Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Delays after which each successive status query fires. Once the list is exhausted the
    /// watcher gives up.
    pub backoff: Vec<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { backoff: DEFAULT_POLL_BACKOFF_MINS.iter().map(|m| Duration::from_secs(m * 60)).collect() }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_WORKER_CONCURRENCY, queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PRC_HOST.to_string(),
            port: DEFAULT_PRC_PORT,
            database_url: String::default(),
            fee_schedule: default_fee_schedule(),
            dispatcher: DispatcherConfig::default(),
            poller: PollerConfig::default(),
            worker: WorkerConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            providers: Vec::new(),
            watch_on_pending_webhook: true,
        }
    }
}

fn default_fee_schedule() -> FeeSchedule {
    FeeSchedule { weekday: FeeRate::new(1.0, 0), weekend: FeeRate::new(1.0, 0) }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PRC_HOST").ok().unwrap_or_else(|| DEFAULT_PRC_HOST.into());
        let port = env::var("PRC_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PRC_PORT. {e} Using the default, {DEFAULT_PRC_PORT}, instead."
                    );
                    DEFAULT_PRC_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PRC_PORT);
        let database_url = env::var("PRC_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PRC_DATABASE_URL is not set. Please set it to the URL for the orders database.");
            String::default()
        });
        let providers = ProviderId::ALL.iter().map(|p| ProviderConfig::from_env_or_default(*p)).collect();
        let watch_on_pending_webhook = parse_boolean_flag(env::var("PRC_WATCH_ON_PENDING_WEBHOOK").ok(), true);
        Self {
            host,
            port,
            database_url,
            fee_schedule: fee_schedule_from_env(),
            dispatcher: dispatcher_from_env(),
            poller: poller_from_env(),
            worker: worker_from_env(),
            event_buffer_size: env_parse("PRC_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE),
            providers,
            watch_on_pending_webhook,
        }
    }
}

fn fee_schedule_from_env() -> FeeSchedule {
    let weekday_percent = env_parse("PRC_FEE_WEEKDAY_PERCENT", 1.0);
    let weekday_flat = env_parse("PRC_FEE_WEEKDAY_FLAT", 0i64);
    let weekend_percent = env_parse("PRC_FEE_WEEKEND_PERCENT", weekday_percent);
    let weekend_flat = env_parse("PRC_FEE_WEEKEND_FLAT", weekday_flat);
    FeeSchedule {
        weekday: FeeRate::new(weekday_percent, weekday_flat),
        weekend: FeeRate::new(weekend_percent, weekend_flat),
    }
}

fn dispatcher_from_env() -> DispatcherConfig {
    DispatcherConfig {
        interval: Duration::from_secs(env_parse("PRC_DISPATCH_INTERVAL_SECS", DEFAULT_DISPATCH_INTERVAL_SECS)),
        batch_size: env_parse("PRC_DISPATCH_BATCH", DEFAULT_DISPATCH_BATCH),
        max_attempts: env_parse("PRC_DISPATCH_MAX_ATTEMPTS", DEFAULT_DISPATCH_MAX_ATTEMPTS),
        request_timeout: Duration::from_secs(env_parse("PRC_DISPATCH_TIMEOUT_SECS", DEFAULT_DISPATCH_TIMEOUT_SECS)),
    }
}

fn poller_from_env() -> PollerConfig {
    let backoff = match env::var("PRC_POLL_BACKOFF_MINS") {
        Ok(s) => {
            let parsed: Vec<Duration> = s
                .split(',')
                .filter_map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|e| {
                            warn!("🪛️ Ignoring invalid entry ({v}) in PRC_POLL_BACKOFF_MINS: {e}");
                            e
                        })
                        .ok()
                })
                .map(|m| Duration::from_secs(m * 60))
                .collect();
            if parsed.is_empty() {
                warn!("🪛️ PRC_POLL_BACKOFF_MINS contained no valid entries. Using the default schedule.");
                PollerConfig::default().backoff
            } else {
                parsed
            }
        },
        Err(_) => PollerConfig::default().backoff,
    };
    PollerConfig { backoff }
}

fn worker_from_env() -> WorkerConfig {
    WorkerConfig {
        concurrency: env_parse("PRC_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY).max(1),
        queue_capacity: env_parse("PRC_WORKER_QUEUE_CAPACITY", DEFAULT_WORKER_QUEUE_CAPACITY).max(1),
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|_| {
            warn!("🪛️ {s} is not a valid value for {key}. Using the default instead.");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PRC_PORT);
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.poller.backoff.len(), 3);
        assert_eq!(config.poller.backoff[0], Duration::from_secs(180));
        assert_eq!(config.dispatcher.max_attempts, 5);
    }
}
