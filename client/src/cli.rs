use chain_schema_core::{BlockRef, Fingerprint, ItemKind};
use clap::{command, Parser, Subcommand};
use std::str::FromStr;
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// Path to the JSON snapshot with runtime metadata blobs
	#[arg(short, long, value_name = "FILE")]
	pub snapshot: Option<String>,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
	/// Runtime version active at a block
	Version { block: BlockRef },
	/// Items of the runtime active at a block, with their fingerprints
	Items {
		block: BlockRef,
		/// Only list items of this pallet
		#[arg(long)]
		pallet: Option<String>,
		/// Only list items of this kind (call, constant, storageEntry, event)
		#[arg(long)]
		kind: Option<ItemKind>,
	},
	/// Fingerprint of an item at a block
	Hash {
		block: BlockRef,
		kind: ItemKind,
		pallet: String,
		item: String,
	},
	/// Decodes hex encoded bytes as an item
	Decode {
		block: BlockRef,
		kind: ItemKind,
		pallet: String,
		item: String,
		bytes: HexBytes,
		/// Expected fingerprint, the layout active at the block is used if omitted
		#[arg(long)]
		fingerprint: Option<Fingerprint>,
	},
	/// Value of a constant at a block
	Constant {
		block: BlockRef,
		pallet: String,
		item: String,
	},
	/// Identifies and decodes a hex encoded call, pallet and call indices included
	DecodeCall { block: BlockRef, bytes: HexBytes },
	/// Identifies and decodes a hex encoded event, pallet and event indices included
	DecodeEvent { block: BlockRef, bytes: HexBytes },
}

/// Bytes given as a hex string, with or without `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

impl FromStr for HexBytes {
	type Err = hex::FromHexError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		hex::decode(s.strip_prefix("0x").unwrap_or(s)).map(HexBytes)
	}
}
