use chain_schema_core::{configuration::ResolverConfig, types::tracing_level_format};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Representation of a configuration used by this project.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Log level, default is `INFO`. See `<https://docs.rs/log/0.4.14/log/enum.LevelFilter.html>` for possible log level values. (default: `INFO`).
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// If set to true, logs are displayed in JSON format, which is used for structured logging. Otherwise, plain text format is used (default: false).
	pub log_format_json: bool,
	/// File system path of the JSON snapshot with runtime metadata blobs (default: "snapshot.json").
	pub snapshot_path: String,
	/// Backoff used when a source fails (default: fibonacci, 6 retries).
	#[serde(flatten)]
	pub resolver: ResolverConfig,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfig {
			log_level: Level::INFO,
			log_format_json: false,
			snapshot_path: "snapshot.json".to_owned(),
			resolver: Default::default(),
		}
	}
}
