//! Configuration: DSP/matching parameters and task-runtime settings.
//!
//! Mirrors the teacher's `config` crate + environment-override pattern
//! (`config::Environment::with_prefix(...)`), generalized to this engine's
//! keys (spec §6): a bare-name environment var (`SR`, `MIN_VOTES`, ...) is
//! read first, then an `ENGINE_`-prefixed one overrides it, so a host can
//! namespace its overrides without losing compatibility with the spec's
//! documented bare key names.

use serde::{Deserialize, Serialize};

/// Tunable parameters for spectrogram generation, peak finding, hashing, and
/// matching. Kept separate from the broader [`Config`] so tests can
/// construct one directly without touching environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Params {
    pub sr: u32,
    pub n_fft: usize,
    pub hop: usize,
    pub peak_neighborhood: usize,
    pub min_amp: f32,
    pub fp_reduction: usize,
    pub zone_start: usize,
    pub zone_width: usize,
    pub max_pairs: usize,
    pub min_votes: u32,
    pub sim_threshold_low: f32,
    pub sim_top_n: usize,
    pub softmax_temp: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            sr: 22050,
            n_fft: 4096,
            hop: 2048,
            peak_neighborhood: 20,
            min_amp: 0.01,
            fp_reduction: 20,
            zone_start: 5,
            zone_width: 100,
            max_pairs: 3,
            min_votes: 5,
            sim_threshold_low: 0.30,
            sim_top_n: 10,
            softmax_temp: 0.05,
        }
    }
}

/// Top-level engine configuration: DSP/matching parameters plus task-runtime
/// settings. There is no config-file layer (unlike the teacher's database/
/// server settings) since the core has no deployment-specific settings of
/// its own — only environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub params: Params,
    pub task_timeout_sec: u64,
    pub result_ttl_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self { params: Params::default(), task_timeout_sec: 60, result_ttl_sec: 3600 }
    }
}

impl Config {
    /// Load defaults, then let bare environment variables (`SR`, `N_FFT`,
    /// ...) override them, then let `ENGINE_`-prefixed variables override
    /// those. Never fails: a malformed or missing variable just falls back
    /// to the layer beneath it.
    pub fn load() -> Self {
        let defaults = Self::default();
        let mut builder = config::Config::builder();

        builder = set_defaults(builder, &defaults);
        builder = builder.add_source(config::Environment::default().try_parsing(true));
        builder = builder.add_source(config::Environment::with_prefix("ENGINE").separator("_").try_parsing(true));

        match builder.build().and_then(|c| c.try_deserialize()) {
            Ok(config) => config,
            Err(_) => defaults,
        }
    }
}

fn set_defaults(mut builder: config::ConfigBuilder<config::builder::DefaultState>, d: &Config) -> config::ConfigBuilder<config::builder::DefaultState> {
    macro_rules! default {
        ($key:expr, $val:expr) => {
            builder = builder.set_default($key, $val).unwrap_or(builder);
        };
    }
    default!("sr", d.params.sr as i64);
    default!("n_fft", d.params.n_fft as i64);
    default!("hop", d.params.hop as i64);
    default!("peak_neighborhood", d.params.peak_neighborhood as i64);
    default!("min_amp", d.params.min_amp as f64);
    default!("fp_reduction", d.params.fp_reduction as i64);
    default!("zone_start", d.params.zone_start as i64);
    default!("zone_width", d.params.zone_width as i64);
    default!("max_pairs", d.params.max_pairs as i64);
    default!("min_votes", d.params.min_votes as i64);
    default!("sim_threshold_low", d.params.sim_threshold_low as f64);
    default!("sim_top_n", d.params.sim_top_n as i64);
    default!("softmax_temp", d.params.softmax_temp as f64);
    default!("task_timeout_sec", d.task_timeout_sec as i64);
    default!("result_ttl_sec", d.result_ttl_sec as i64);
    builder
}
