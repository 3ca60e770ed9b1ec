use crate::error::IngestError;
use crate::reconstructor::DEFAULT_LINE_THRESHOLD;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Runtime settings for the capability handles and the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub extraction_temperature: f32,
    pub aws_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub textract_endpoint: Option<String>,
    /// No timeout unless configured.
    pub request_timeout: Option<Duration>,
    pub line_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            extraction_temperature: DEFAULT_TEMPERATURE,
            aws_region: DEFAULT_AWS_REGION.to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            textract_endpoint: None,
            request_timeout: None,
            line_threshold: DEFAULT_LINE_THRESHOLD,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            extraction_temperature: parse_var(&get, "EXTRACTION_TEMPERATURE")?
                .unwrap_or(defaults.extraction_temperature),
            aws_region: get("AWS_REGION").unwrap_or(defaults.aws_region),
            aws_access_key_id: get("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: get("AWS_SESSION_TOKEN"),
            textract_endpoint: get("TEXTRACT_ENDPOINT"),
            request_timeout: parse_var::<u64, _>(&get, "REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            line_threshold: parse_threshold(&get)?.unwrap_or(defaults.line_threshold),
        })
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, IngestError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Result<Option<T>, IngestError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| IngestError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

fn parse_threshold<F>(get: &F) -> Result<Option<f64>, IngestError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<f64, _>(get, "LINE_THRESHOLD")? {
        Some(threshold) if !threshold.is_finite() || threshold < 0.0 => Err(IngestError::Config(
            format!("LINE_THRESHOLD must be a finite, non-negative number, got {threshold}"),
        )),
        threshold => Ok(threshold),
    }
}
