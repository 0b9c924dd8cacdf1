// src/config.rs
use crate::canvas::transform::ScaleBounds;
use crate::errors::DesignError;
use crate::services::generation_service::{GenerationDefaults, GenerationProtocol};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub design_api_url: String,
    pub processing_api_url: String,
    pub protocol: GenerationProtocol,
    pub request_timeout: Duration,
    pub history_limit: usize,
    pub scale_bounds: ScaleBounds,
    pub generation_defaults: GenerationDefaults,
}

impl Default for Config {
    fn default() -> Self {
        let design_api_url = "http://127.0.0.1:8000".to_string();
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            processing_api_url: design_api_url.clone(),
            design_api_url,
            protocol: GenerationProtocol::Polling {
                interval: Duration::from_millis(1000),
                max_attempts: 60,
            },
            request_timeout: Duration::from_secs(120),
            history_limit: 20,
            scale_bounds: ScaleBounds::default(),
            generation_defaults: GenerationDefaults::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, DesignError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DesignError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let design_api_url = get("DESIGN_API_URL").unwrap_or(defaults.design_api_url);
        let processing_api_url =
            get("PROCESSING_API_URL").unwrap_or_else(|| design_api_url.clone());

        let protocol = match get("GENERATION_PROTOCOL").as_deref() {
            None | Some("polling") => GenerationProtocol::Polling {
                interval: Duration::from_millis(parse_or(&get, "POLL_INTERVAL_MS", 1000u64)?),
                max_attempts: parse_or(&get, "POLL_MAX_ATTEMPTS", 60u32)?.max(1),
            },
            Some("direct") => GenerationProtocol::Direct,
            Some(other) => {
                return Err(DesignError::Config(format!(
                    "GENERATION_PROTOCOL must be 'direct' or 'polling', got '{}'",
                    other
                )));
            }
        };

        let scale_bounds = ScaleBounds {
            min: parse_or(&get, "SCALE_MIN", defaults.scale_bounds.min)?,
            max: parse_or(&get, "SCALE_MAX", defaults.scale_bounds.max)?,
        };
        if !(scale_bounds.min > 0.0 && scale_bounds.min <= scale_bounds.max) {
            return Err(DesignError::Config(format!(
                "Invalid scale bounds {}..{}",
                scale_bounds.min, scale_bounds.max
            )));
        }

        Ok(Self {
            bind_addr: get("TEE_CANVAS_BIND").unwrap_or(defaults.bind_addr),
            design_api_url,
            processing_api_url,
            protocol,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 120u64)?),
            history_limit: parse_or(&get, "HISTORY_LIMIT", defaults.history_limit)?,
            scale_bounds,
            generation_defaults: GenerationDefaults {
                negative_prompt: get("NEGATIVE_PROMPT"),
                num_inference_steps: parse_or(&get, "INFERENCE_STEPS", 30u32)?,
                guidance_scale: parse_or(&get, "GUIDANCE_SCALE", 7.5f32)?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, DesignError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DesignError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
