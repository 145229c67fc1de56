use crate::{
	cli::{CliOpts, Command},
	config::RuntimeConfig,
};
use chain_schema_core::{
	chain::{Binding, Chain, Resolved},
	source::{MetadataSource, SnapshotSource, VersionSource},
	utils::{default_subscriber, install_panic_hooks, json_subscriber},
	ItemKind,
};
use clap::Parser;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use serde::Serialize;
use serde_json::json;
use std::{fs, path::Path, sync::Arc};
use tracing::{error, info};

#[cfg(all(not(target_env = "msvc"), not(target_arch = "wasm32")))]
use tikv_jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), not(target_arch = "wasm32")))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod config;

fn print<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn resolved_json<T: Serialize>(resolved: Resolved<T>) -> serde_json::Value {
	match resolved {
		Resolved::Matched(value) => json!({ "matched": value }),
		Resolved::Mismatched { expected, actual } => {
			json!({ "mismatched": { "expected": expected, "actual": actual } })
		},
	}
}

async fn run<V, M>(chain: Chain<V, M>, command: Command) -> Result<()>
where
	V: VersionSource + 'static,
	M: MetadataSource + 'static,
{
	match command {
		Command::Version { block } => {
			let block_number = chain.resolver().block_number(block).await?;
			let spec_version = chain.resolver().spec_version(block).await?;
			print(&json!({ "blockNumber": block_number, "specVersion": spec_version }))
		},
		Command::Items {
			block,
			pallet,
			kind,
		} => {
			let description = chain.describe(block).await?;
			let items = description
				.items()
				.filter(|(name, _)| pallet.as_ref().map_or(true, |pallet| name.pallet == *pallet))
				.filter(|(name, _)| kind.map_or(true, |kind| name.kind == kind))
				.map(|(name, item)| {
					json!({
						"kind": name.kind,
						"pallet": name.pallet,
						"item": name.item,
						"fingerprint": item.fingerprint,
					})
				})
				.collect::<Vec<_>>();
			print(&json!({ "specVersion": description.spec_version, "items": items }))
		},
		Command::Hash {
			block,
			kind,
			pallet,
			item,
		} => {
			let fingerprint = chain.item_hash(block, kind, &pallet, &item).await?;
			print(&fingerprint)
		},
		Command::Decode {
			block,
			kind,
			pallet,
			item,
			bytes,
			fingerprint,
		} => {
			let fingerprint = match fingerprint {
				Some(fingerprint) => fingerprint,
				None => chain.item_hash(block, kind, &pallet, &item).await?,
			};
			let binding = Binding::new(kind, &pallet, &item, fingerprint);
			let resolved = chain.resolve(block, &binding, &bytes.0).await?;
			print(&resolved_json(resolved))
		},
		Command::Constant {
			block,
			pallet,
			item,
		} => {
			let fingerprint = chain
				.item_hash(block, ItemKind::Constant, &pallet, &item)
				.await?;
			let binding = Binding::constant(&pallet, &item, fingerprint);
			print(&chain.constant(block, &binding).await?)
		},
		Command::DecodeCall { block, bytes } => print(&chain.decode_call(block, &bytes.0).await?),
		Command::DecodeEvent { block, bytes } => {
			print(&chain.decode_event(block, &bytes.0).await?)
		},
	}
}

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {}", config_path))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags override the config parameters
	if let Some(snapshot) = &opts.snapshot {
		cfg.snapshot_path = snapshot.to_string();
	}

	Ok(cfg)
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks()?;

	info!("Using config: {cfg:?}");
	let source = Arc::new(SnapshotSource::load(Path::new(&cfg.snapshot_path))?);
	let chain = Chain::new(source.clone(), source, &cfg.resolver);

	if let Err(error) = run(chain, opts.command).await {
		error!("{error:#}");
		return Err(error.wrap_err("Command failed"));
	};
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_schema_core::configuration::RetryConfig;
	use std::io::Write;

	#[test]
	fn flags_override_config_file() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		writeln!(
			file,
			r#"
log_level = "DEBUG"
snapshot_path = "/var/lib/chain/snapshot.json"

[retry]
type = "exponential"
base = 2
max_delay = 500
retries = 3
"#
		)
		.unwrap();
		let path = file.path().to_str().unwrap();

		let opts = CliOpts::parse_from(["chain-schema-client", "-c", path, "version", "1"]);
		let cfg = load_runtime_config(&opts).unwrap();
		assert_eq!(cfg.log_level, tracing::Level::DEBUG);
		assert_eq!(cfg.snapshot_path, "/var/lib/chain/snapshot.json");
		assert!(!cfg.log_format_json);
		assert!(matches!(cfg.resolver.retry, RetryConfig::Exponential(_)));

		let opts = CliOpts::parse_from([
			"chain-schema-client",
			"-c",
			path,
			"--snapshot",
			"other.json",
			"--logs-json",
			"version",
			"1",
		]);
		let cfg = load_runtime_config(&opts).unwrap();
		assert_eq!(cfg.snapshot_path, "other.json");
		assert!(cfg.log_format_json);
	}

	#[test]
	fn missing_config_file() {
		let opts =
			CliOpts::parse_from(["chain-schema-client", "-c", "/nonexistent.toml", "version", "1"]);
		assert!(load_runtime_config(&opts).is_err());
	}
}
