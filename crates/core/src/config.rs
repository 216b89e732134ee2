// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-sourced configuration, read once at startup.
//!
//! Durations accept plain seconds (`"300"`) or a humane suffix
//! (`"30m"`, `"6h"`, `"45s"`, `"7d"`). Unparseable values fall back to the
//! default with a warning so a typo never prevents startup.

use std::path::PathBuf;
use std::time::Duration;

/// Complete daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the git sidecar syncs the catalog into.
    pub catalog_root: PathBuf,
    /// Subdirectory of `catalog_root` holding `<id>.json` model files.
    pub models_subdir: String,
    pub catalog_refresh_interval: Duration,
    /// Kubernetes namespace of the managed InferenceService.
    pub namespace: String,
    /// Name of the single active InferenceService resource.
    pub inference_service_name: String,
    /// Shared storage root for model weights.
    pub weights_storage_path: PathBuf,
    /// Ambient deadline for one install job.
    pub weights_install_timeout: Duration,
    /// PVC backing the weights volume (for `pvc://` storage URIs).
    pub weights_pvc_name: String,
    /// Path the inference runtime mounts the weights at.
    pub inference_model_root: String,
    pub hf_token: Option<String>,
    pub hf_cache_ttl: Duration,
    pub github_token: Option<String>,
    pub vllm_cache_ttl: Duration,
    /// Local state directory (default datastore location).
    pub state_path: PathBuf,
    /// `sqlite` or `postgres`.
    pub datastore_driver: String,
    pub datastore_dsn: String,
    pub redis_addr: Option<String>,
    pub redis_db: i64,
    pub redis_tls: bool,
    pub redis_tls_insecure: bool,
    /// Broker pub/sub channel for events.
    pub events_channel: String,
    /// Broker stream for install jobs.
    pub job_stream: String,
    /// Bearer token required on mutating endpoints when set.
    pub api_token: Option<String>,
    pub gpu_profiles_path: Option<PathBuf>,
    /// Fraction of PVC usage above which stats flag the volume.
    pub pvc_alert_threshold: f64,
    pub automation_job_ttl: Duration,
    pub automation_history_ttl: Duration,
    pub automation_weight_ttl: Duration,
}

impl Config {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Self {
        let state_path = env_path("STATE_PATH", "/var/lib/model-manager");
        let datastore_driver = env_str("DATASTORE_DRIVER", "sqlite");
        let default_dsn = format!("sqlite://{}/state.db", state_path.display());
        Self {
            catalog_root: env_path("CATALOG_ROOT", "/data/catalog"),
            models_subdir: env_str("MODELS_SUBDIR", "models"),
            catalog_refresh_interval: env_duration(
                "CATALOG_REFRESH_INTERVAL",
                Duration::from_secs(30 * 60),
            ),
            namespace: env_str("NAMESPACE", "default"),
            inference_service_name: env_str("INFERENCE_SERVICE_NAME", "venus-model"),
            weights_storage_path: env_path("WEIGHTS_STORAGE_PATH", "/mnt/models"),
            weights_install_timeout: env_duration(
                "WEIGHTS_INSTALL_TIMEOUT",
                Duration::from_secs(6 * 60 * 60),
            ),
            weights_pvc_name: env_str("WEIGHTS_PVC_NAME", "venus-model-storage"),
            inference_model_root: env_str("INFERENCE_MODEL_ROOT", "/mnt/models"),
            hf_token: env_opt("HF_TOKEN"),
            hf_cache_ttl: env_duration("HF_CACHE_TTL", Duration::from_secs(60 * 60)),
            github_token: env_opt("GITHUB_TOKEN"),
            vllm_cache_ttl: env_duration("VLLM_CACHE_TTL", Duration::from_secs(24 * 60 * 60)),
            datastore_driver,
            datastore_dsn: env_str("DATASTORE_DSN", &default_dsn),
            state_path,
            redis_addr: env_opt("REDIS_ADDR"),
            redis_db: env_parse("REDIS_DB", 0),
            redis_tls: env_bool("REDIS_TLS", false),
            redis_tls_insecure: env_bool("REDIS_TLS_INSECURE", false),
            events_channel: env_str("EVENTS_CHANNEL", "model-manager:events"),
            job_stream: env_str("JOB_STREAM", "model-manager:jobs"),
            api_token: env_opt("API_TOKEN"),
            gpu_profiles_path: env_opt("GPU_PROFILES_PATH").map(PathBuf::from),
            pvc_alert_threshold: env_parse("PVC_ALERT_THRESHOLD", 0.9),
            automation_job_ttl: env_duration("AUTOMATION_JOB_TTL", Duration::from_secs(72 * 60 * 60)),
            automation_history_ttl: env_duration(
                "AUTOMATION_HISTORY_TTL",
                Duration::from_secs(30 * 24 * 60 * 60),
            ),
            automation_weight_ttl: env_duration("AUTOMATION_WEIGHT_TTL", Duration::ZERO),
        }
    }

    /// Redis connection URL, when a broker is configured. TLS uses the
    /// `rediss` scheme; `REDIS_TLS_INSECURE` appends the client's
    /// `#insecure` fragment to skip certificate verification.
    pub fn redis_url(&self) -> Option<String> {
        let addr = self.redis_addr.as_deref()?;
        let scheme = if self.redis_tls { "rediss" } else { "redis" };
        let insecure = if self.redis_tls && self.redis_tls_insecure { "#insecure" } else { "" };
        Some(format!("{scheme}://{addr}/{}{insecure}", self.redis_db))
    }

    /// Directory the catalog store loads model JSON files from.
    pub fn models_dir(&self) -> PathBuf {
        self.catalog_root.join(&self.models_subdir)
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_str(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_str(key, default))
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        Some(other) => {
            tracing::warn!(key, value = other, "unrecognized boolean, using default");
            default
        }
        None => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_opt(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable value, using default");
            default
        }),
        None => default,
    }
}

fn env_duration(key: &str, default: Duration) -> Duration {
    match env_opt(key) {
        Some(raw) => parse_duration(&raw).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "unparseable duration, using default");
            default
        }),
        None => default,
    }
}

/// Parse `"300"`, `"45s"`, `"30m"`, `"6h"`, or `"7d"`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (value, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, ""),
    };
    let n: u64 = value.parse().ok()?;
    let secs = match unit {
        "" | "s" => n,
        "m" => n * 60,
        "h" => n * 60 * 60,
        "d" => n * 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
