use super::{MetadataSource, VersionSource};
use crate::types::{hex_bytes_format, SpecVersion};
use async_trait::async_trait;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::info;

/// Runtime metadata blobs of a chain, together with the height at which each became active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
	pub runtimes: Vec<SnapshotRuntime>,
	#[serde(default)]
	pub block_hashes: Vec<SnapshotBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRuntime {
	pub spec_version: SpecVersion,
	pub first_block: u32,
	#[serde(with = "hex_bytes_format")]
	pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBlock {
	pub hash: H256,
	pub number: u32,
}

/// Serves runtime versions and metadata from a [`Snapshot`], without a node.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
	/// Sorted by first block.
	runtimes: Vec<SnapshotRuntime>,
	hashes: HashMap<H256, u32>,
}

impl SnapshotSource {
	pub fn new(mut snapshot: Snapshot) -> Result<Self> {
		snapshot.runtimes.sort_by_key(|runtime| runtime.first_block);
		for pair in snapshot.runtimes.windows(2) {
			if pair[1].spec_version < pair[0].spec_version {
				return Err(eyre!(
					"Runtime {} activated at block #{} follows runtime {}",
					pair[1].spec_version,
					pair[1].first_block,
					pair[0].spec_version
				));
			}
		}
		let hashes = snapshot
			.block_hashes
			.into_iter()
			.map(|block| (block.hash, block.number))
			.collect();
		Ok(SnapshotSource {
			runtimes: snapshot.runtimes,
			hashes,
		})
	}

	pub fn load(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.wrap_err_with(|| format!("Cannot read snapshot {}", path.display()))?;
		let snapshot: Snapshot = serde_json::from_str(&content)
			.wrap_err_with(|| format!("Cannot parse snapshot {}", path.display()))?;
		info!(
			runtimes = snapshot.runtimes.len(),
			blocks = snapshot.block_hashes.len(),
			"Loaded snapshot {}",
			path.display()
		);
		Self::new(snapshot)
	}

	pub fn runtimes(&self) -> &[SnapshotRuntime] {
		&self.runtimes
	}
}

#[async_trait]
impl VersionSource for SnapshotSource {
	async fn block_number(&self, hash: H256) -> Result<u32> {
		self.hashes
			.get(&hash)
			.copied()
			.ok_or_else(|| eyre!("Block {hash:?} is not in the snapshot"))
	}

	async fn spec_version(&self, block_number: u32) -> Result<SpecVersion> {
		self.runtimes
			.iter()
			.rev()
			.find(|runtime| runtime.first_block <= block_number)
			.map(|runtime| runtime.spec_version)
			.ok_or_else(|| eyre!("Block #{block_number} precedes every runtime in the snapshot"))
	}
}

#[async_trait]
impl MetadataSource for SnapshotSource {
	async fn metadata(&self, spec_version: SpecVersion) -> Result<Vec<u8>> {
		self.runtimes
			.iter()
			.find(|runtime| runtime.spec_version == spec_version)
			.map(|runtime| runtime.metadata.clone())
			.ok_or_else(|| eyre!("Runtime {spec_version} is not in the snapshot"))
	}
}
