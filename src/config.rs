//! Process configuration loaded from the environment.

use crate::ai::ProviderKind;
use crate::{Error, Result};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_GEMINI_BASE_URL: &str = crate::ai::gemini::client::DEFAULT_BASE_URL;
pub const DEFAULT_HF_SPACE: &str = "yisol/IDM-VTON";
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Stock photographs used by the admin smoke test.
pub const SMOKE_TEST_PERSON_URL: &str =
    "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=768&q=80";
pub const SMOKE_TEST_GARMENT_URL: &str =
    "https://images.unsplash.com/photo-1521572163474-6864f9cf17ab?w=768&q=80";

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SmokeTestImages {
    pub person_url: String,
    pub garment_url: String,
}

impl Default for SmokeTestImages {
    fn default() -> Self {
        Self {
            person_url: SMOKE_TEST_PERSON_URL.to_string(),
            garment_url: SMOKE_TEST_GARMENT_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub allowed_origin: String,
    pub max_body_size: usize,
    pub provider: ProviderKind,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_base_url: String,
    pub hf_token: Option<String>,
    pub hf_space: String,
    /// Overrides the URL derived from `hf_space`.
    pub hf_space_url: Option<String>,
    pub trusted_domains: Vec<String>,
    pub admin: AdminCredentials,
    pub gemini_timeout: Duration,
    pub hf_timeout: Duration,
    pub fetch_timeout: Duration,
    pub smoke_test: SmokeTestImages,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origin: "*".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            provider: ProviderKind::Gemini,
            gemini_api_key: None,
            gemini_model: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            hf_token: None,
            hf_space: DEFAULT_HF_SPACE.to_string(),
            hf_space_url: None,
            trusted_domains: Vec::new(),
            admin: AdminCredentials {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                password: generate_password(),
            },
            gemini_timeout: Duration::from_secs(120),
            hf_timeout: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
            smoke_test: SmokeTestImages::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let port = match env_opt("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT '{}'", raw)))?,
            None => defaults.port,
        };

        let max_body_size = match env_opt("MAX_BODY_SIZE") {
            Some(raw) => parse_byte_size(&raw)?,
            None => defaults.max_body_size,
        };

        let provider = match env_opt("AI_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => defaults.provider,
        };

        let admin_password = match env_opt("ADMIN_PASSWORD") {
            Some(password) => password,
            None => {
                tracing::warn!(
                    "ADMIN_PASSWORD not set; generated admin password for this process: {}",
                    defaults.admin.password
                );
                defaults.admin.password.clone()
            }
        };

        Ok(Self {
            port,
            allowed_origin: env_opt("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
            max_body_size,
            provider,
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_opt("GEMINI_MODEL"),
            gemini_base_url: env_opt("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            hf_token: env_opt("HF_TOKEN"),
            hf_space: env_opt("HF_SPACE").unwrap_or(defaults.hf_space),
            hf_space_url: env_opt("HF_SPACE_URL"),
            trusted_domains: env_opt("TRUSTED_DOMAINS")
                .map(|raw| parse_domain_list(&raw))
                .unwrap_or_default(),
            admin: AdminCredentials {
                username: env_opt("ADMIN_USERNAME").unwrap_or(defaults.admin.username),
                password: admin_password,
            },
            gemini_timeout: env_secs("GEMINI_TIMEOUT_SECS")?.unwrap_or(defaults.gemini_timeout),
            hf_timeout: env_secs("HF_TIMEOUT_SECS")?.unwrap_or(defaults.hf_timeout),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS")?.unwrap_or(defaults.fetch_timeout),
            smoke_test: defaults.smoke_test,
        })
    }

    /// Base URL of the Gradio space used by the HuggingFace provider.
    pub fn hf_space_url(&self) -> String {
        self.hf_space_url
            .clone()
            .unwrap_or_else(|| space_url(&self.hf_space))
    }
}

/// Non-empty environment variable.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_secs(key: &str) -> Result<Option<Duration>> {
    env_opt(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::Config(format!("Invalid {} '{}'", key, raw)))
        })
        .transpose()
}

fn generate_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Public URL of a HuggingFace space, e.g. `yisol/IDM-VTON` becomes
/// `https://yisol-idm-vton.hf.space`.
pub fn space_url(space: &str) -> String {
    let host: String = space
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '/' || c == '.' || c == '_' { '-' } else { c })
        .collect();
    format!("https://{}.hf.space", host)
}

/// Parse sizes such as `10mb`, `512kb`, `1gb` or a plain byte count.
pub fn parse_byte_size(raw: &str) -> Result<usize> {
    let normalized = raw.trim().to_lowercase();
    let split = normalized
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split);

    let value: usize = number
        .parse()
        .map_err(|_| Error::Config(format!("Invalid size '{}'", raw)))?;

    let multiplier: usize = match unit.trim() {
        "" | "b" => 1,
        "kb" | "k" => 1024,
        "mb" | "m" => 1024 * 1024,
        "gb" | "g" => 1024 * 1024 * 1024,
        other => {
            return Err(Error::Config(format!(
                "Invalid size unit '{}' in '{}'",
                other, raw
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("Size '{}' is too large", raw)))
}

/// Split a comma-separated domain list into normalized allowlist entries.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .map(|d| {
            d.trim_start_matches("*.")
                .trim_start_matches('.')
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|d| !d.is_empty())
        .collect()
}
