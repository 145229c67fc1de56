//! Shared identifiers and serde helpers.
use codec::{Decode, Encode};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::{
	fmt::{self, Display, Formatter},
	str::FromStr,
};

/// Opaque identifier of one immutable snapshot of a runtime's binary layouts.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Hash,
	Serialize,
	Deserialize,
	Encode,
	Decode,
)]
#[serde(transparent)]
pub struct SpecVersion(pub u32);

impl Display for SpecVersion {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "v{}", self.0)
	}
}

impl From<u32> for SpecVersion {
	fn from(value: u32) -> Self {
		SpecVersion(value)
	}
}

/// Point in finalized chain history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockRef {
	Number(u32),
	Hash(H256),
}

impl From<u32> for BlockRef {
	fn from(value: u32) -> Self {
		BlockRef::Number(value)
	}
}

impl From<H256> for BlockRef {
	fn from(value: H256) -> Self {
		BlockRef::Hash(value)
	}
}

impl Display for BlockRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			BlockRef::Number(number) => write!(f, "#{number}"),
			BlockRef::Hash(hash) => write!(f, "{hash:?}"),
		}
	}
}

impl FromStr for BlockRef {
	type Err = String;

	/// Parses either a decimal block number or a `0x`-prefixed 32 byte block hash.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if let Some(hex) = s.strip_prefix("0x") {
			let bytes = hex::decode(hex).map_err(|error| format!("Invalid block hash: {error}"))?;
			let hash: [u8; 32] = bytes
				.try_into()
				.map_err(|_| "Block hash must be 32 bytes long".to_string())?;
			return Ok(BlockRef::Hash(H256(hash)));
		}
		s.parse::<u32>()
			.map(BlockRef::Number)
			.map_err(|error| format!("Invalid block number: {error}"))
	}
}

pub mod duration_millis_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

/// Hex string with an optional `0x` prefix, as used by node RPCs for byte blobs.
pub mod hex_bytes_format {
	use serde::{self, Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		let value = value.strip_prefix("0x").unwrap_or(&value);
		hex::decode(value).map_err(serde::de::Error::custom)
	}
}
