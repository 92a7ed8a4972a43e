use crate::core::event::EventType;
use crate::core::probability::normalize;
use crate::sources::ssf::registry::RELYING_PARTIES;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Error while loading or parsing a run file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid overrides table: {0}")]
    Overrides(#[from] serde_json::Error),
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),
}

/// Deployment environment a run targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Build,
    Staging,
}

impl Environment {
    /// Inbound SSF endpoint used when a run does not name one.
    pub fn inbound_endpoint_url(self) -> &'static str {
        match self {
            Environment::Development => "https://inbound-ssf.dev.account.gov.uk",
            Environment::Build => "https://inbound-ssf.build.account.gov.uk",
            Environment::Staging => "https://inbound-ssf.staging.account.gov.uk",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "development" => Ok(Environment::Development),
            "build" => Ok(Environment::Build),
            "staging" => Ok(Environment::Staging),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Build => "build",
            Environment::Staging => "staging",
        };
        f.write_str(name)
    }
}

/// Largest `numMessages` a single run accepts.
pub const MAX_NUM_MESSAGES: u64 = 1_000_000;

/// Top-level run file for the `gen` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunFile {
    /// Optional RNG seed for deterministic output.
    pub seed: Option<u64>,
    /// Environment that supplies the default inbound endpoint.
    #[serde(default)]
    pub environment: Environment,
    /// Queue name messages are sent to.
    pub destination: Option<String>,
    /// Queue sink settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Raw generation overrides, validated like an API request body.
    pub overrides: Option<toml::Value>,
}

impl RunFile {
    /// Loads a run file from TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Returns the overrides table as JSON, if present.
    pub fn overrides_json(&self) -> Result<Option<Value>, ConfigError> {
        match &self.overrides {
            Some(table) => Ok(Some(serde_json::to_value(table)?)),
            None => Ok(None),
        }
    }
}

/// Spool queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory that receives spooled messages.
    pub dir: String,
    /// Target spool file size before a new file is started.
    #[serde(default = "default_target_size_mb")]
    pub target_size_mb: u64,
    /// Optional spool compression (`gzip`).
    pub compression: Option<String>,
    /// Probability that the queue drops an individual entry.
    pub failure_rate: Option<f64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: "out".to_string(),
            target_size_mb: default_target_size_mb(),
            compression: None,
            failure_rate: None,
        }
    }
}

fn default_target_size_mb() -> u64 {
    16
}

/// Resolved parameters for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub num_messages: u64,
    /// Probability of each relying party originating a message.
    pub rp_split: Vec<f64>,
    /// Probability of each event type, in [`EventType::ALL`] order.
    pub event_type_split: Vec<f64>,
    /// Probability that a message is corrupted.
    pub error_rate: f64,
    #[serde(rename = "inboundEndpointURL")]
    pub inbound_endpoint_url: String,
}

impl RunConfig {
    /// Defaults for an environment: ten messages, all from the first RP,
    /// all of the first event type, no corruption.
    pub fn defaults_for(environment: Environment) -> Self {
        let mut rp_split = vec![0.0; RELYING_PARTIES.len()];
        rp_split[0] = 1.0;
        let mut event_type_split = vec![0.0; EventType::ALL.len()];
        event_type_split[0] = 1.0;
        Self {
            num_messages: 10,
            rp_split,
            event_type_split,
            error_rate: 0.0,
            inbound_endpoint_url: environment.inbound_endpoint_url().to_string(),
        }
    }
}

/// A rejected override field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Invalid entry for numMessages parameter")]
    NumMessages,
    #[error("Invalid entry for rpSplit parameter")]
    RpSplit,
    #[error("Invalid entry for eventTypeSplit parameter")]
    EventTypeSplit,
    #[error("Invalid entry for errorRate parameter")]
    ErrorRate,
    #[error("Invalid entry for inboundURL parameter")]
    InboundEndpointUrl,
}

/// Every field rejected by one [`ConfigParams::apply_overrides`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub failures: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("\n"))
    }
}

impl std::error::Error for ValidationError {}

/// Run configuration built from environment defaults plus caller overrides.
#[derive(Debug, Clone)]
pub struct ConfigParams {
    config: RunConfig,
}

impl ConfigParams {
    pub fn new(environment: Environment) -> Self {
        Self {
            config: RunConfig::defaults_for(environment),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn into_config(self) -> RunConfig {
        self.config
    }

    /// Validates and applies the override fields present in `raw`.
    ///
    /// All five fields are checked before anything is reported. On failure
    /// nothing is applied and the error lists every rejected field in the
    /// order numMessages, rpSplit, eventTypeSplit, errorRate,
    /// inboundEndpointURL.
    pub fn apply_overrides(&mut self, raw: &Value) -> Result<(), ValidationError> {
        let num_messages = parse_num_messages(raw.get("numMessages"));
        let rp_split = parse_rp_split(raw.get("rpSplit"));
        let event_type_split = parse_event_type_split(raw.get("eventTypeSplit"));
        let error_rate = parse_error_rate(raw.get("errorRate"));
        let endpoint = parse_inbound_endpoint_url(raw.get("inboundEndpointURL"));

        let failures: Vec<FieldError> = [
            num_messages.as_ref().err(),
            rp_split.as_ref().err(),
            event_type_split.as_ref().err(),
            error_rate.as_ref().err(),
            endpoint.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .copied()
        .collect();
        if !failures.is_empty() {
            return Err(ValidationError { failures });
        }

        if let Ok(Some(value)) = num_messages {
            self.config.num_messages = value;
        }
        if let Ok(Some(value)) = rp_split {
            self.config.rp_split = value;
        }
        if let Ok(Some(value)) = event_type_split {
            self.config.event_type_split = value;
        }
        if let Ok(Some(value)) = error_rate {
            self.config.error_rate = value;
        }
        if let Ok(Some(value)) = endpoint {
            self.config.inbound_endpoint_url = value;
        }
        Ok(())
    }
}

// Absent, null, false, zero and empty strings all leave the default in place.
fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => true,
        Some(Value::Number(number)) => number.as_f64() == Some(0.0),
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

fn parse_num_messages(value: Option<&Value>) -> Result<Option<u64>, FieldError> {
    if is_unset(value) {
        return Ok(None);
    }
    let number = value
        .and_then(Value::as_f64)
        .ok_or(FieldError::NumMessages)?
        .abs()
        .ceil();
    if !number.is_finite() || number > MAX_NUM_MESSAGES as f64 {
        return Err(FieldError::NumMessages);
    }
    Ok(Some(number as u64))
}

fn parse_rp_split(value: Option<&Value>) -> Result<Option<Vec<f64>>, FieldError> {
    if is_unset(value) {
        return Ok(None);
    }
    let entries = value
        .and_then(Value::as_array)
        .ok_or(FieldError::RpSplit)?;
    if entries.len() != RELYING_PARTIES.len() {
        return Err(FieldError::RpSplit);
    }
    let weights = entries
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
        .ok_or(FieldError::RpSplit)?;
    normalize(&weights)
        .map(Some)
        .map_err(|_| FieldError::RpSplit)
}

fn parse_event_type_split(value: Option<&Value>) -> Result<Option<Vec<f64>>, FieldError> {
    if is_unset(value) {
        return Ok(None);
    }
    let entries = value
        .and_then(Value::as_object)
        .ok_or(FieldError::EventTypeSplit)?;
    let weights = EventType::ALL
        .iter()
        .map(|event_type| entries.get(event_type.key()).and_then(Value::as_f64))
        .collect::<Option<Vec<f64>>>()
        .ok_or(FieldError::EventTypeSplit)?;
    normalize(&weights)
        .map(Some)
        .map_err(|_| FieldError::EventTypeSplit)
}

fn parse_error_rate(value: Option<&Value>) -> Result<Option<f64>, FieldError> {
    if is_unset(value) {
        return Ok(None);
    }
    let rate = value
        .and_then(Value::as_f64)
        .ok_or(FieldError::ErrorRate)?;
    if rate.abs() > 1.0 {
        return Err(FieldError::ErrorRate);
    }
    Ok(Some(rate.abs()))
}

fn parse_inbound_endpoint_url(value: Option<&Value>) -> Result<Option<String>, FieldError> {
    if is_unset(value) {
        return Ok(None);
    }
    value
        .and_then(Value::as_str)
        .map(|url| Some(url.to_string()))
        .ok_or(FieldError::InboundEndpointUrl)
}
