use std::path::PathBuf;

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub audit: AuditSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuditSettings {
    /// Exact `class` attribute values whose `href="#"` anchors are not flagged.
    pub ignored_classes: Vec<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub fetch_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_body_bytes: usize,
    pub user_agent: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_batch_bytes: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_batch_urls: usize,
    pub report_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub report_retention_secs: u64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            ignored_classes: vec![],
            fetch_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            user_agent: "Mozilla/5.0 (compatible; PageAudit/0.1)".to_string(),
            concurrency: 1,
            max_batch_bytes: 1024 * 1024,
            max_batch_urls: 5_000,
            report_dir: PathBuf::from("reports"),
            report_retention_secs: 24 * 60 * 60,
        }
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    // PORT is the conventional hosting variable and wins over the files
    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("application.port", std::env::var("PORT").ok())?
        .build()?;

    settings.try_deserialize::<Settings>()
}
