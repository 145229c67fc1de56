//! Immutable description of one runtime version, built from SCALE encoded runtime metadata.
use crate::{
	error::{Error, Result},
	fingerprint::{Fingerprint, Hasher},
	schema::{ItemKind, ItemName, TypeRegistry, TypeSchema},
	types::{hex_bytes_format, SpecVersion},
};
use serde::{Deserialize, Serialize};
use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};
use strum::Display;

mod convert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum StorageModifier {
	/// Missing values read as `None`.
	Optional,
	/// Missing values read as the entry's default.
	Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum StorageHasher {
	Blake2_128,
	Blake2_256,
	Blake2_128Concat,
	Twox128,
	Twox256,
	Twox64Concat,
	Identity,
}

/// Kind specific data of a runtime item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemDetail {
	Call {
		pallet_index: u8,
		call_index: u8,
	},
	Event {
		pallet_index: u8,
		event_index: u8,
	},
	Constant {
		#[serde(with = "hex_bytes_format")]
		value: Vec<u8>,
	},
	StorageEntry {
		modifier: StorageModifier,
		hashers: Vec<StorageHasher>,
		/// Key layout of map entries; `None` for plain values.
		key: Option<TypeSchema>,
		#[serde(with = "hex_bytes_format")]
		default: Vec<u8>,
	},
}

impl ItemDetail {
	pub fn kind(&self) -> ItemKind {
		match self {
			ItemDetail::Call { .. } => ItemKind::Call,
			ItemDetail::Event { .. } => ItemKind::Event,
			ItemDetail::Constant { .. } => ItemKind::Constant,
			ItemDetail::StorageEntry { .. } => ItemKind::StorageEntry,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeItem {
	pub schema: TypeSchema,
	pub fingerprint: Fingerprint,
	pub detail: ItemDetail,
}

/// Binary layouts of every call, constant, event and storage value of one runtime version.
#[derive(Debug, Clone)]
pub struct RuntimeDescription {
	pub spec_version: SpecVersion,
	pub types: TypeRegistry,
	items: BTreeMap<ItemName, Arc<RuntimeItem>>,
	calls: HashMap<(u8, u8), ItemName>,
	events: HashMap<(u8, u8), ItemName>,
}

impl RuntimeDescription {
	/// Builds a description, fingerprinting every item against `types`.
	pub fn new(
		spec_version: SpecVersion,
		types: TypeRegistry,
		items: impl IntoIterator<Item = (ItemName, TypeSchema, ItemDetail)>,
	) -> Self {
		let mut hasher = Hasher::new(&types);
		let mut calls = HashMap::new();
		let mut events = HashMap::new();
		let mut described = BTreeMap::new();

		for (name, schema, detail) in items {
			match detail {
				ItemDetail::Call {
					pallet_index,
					call_index,
				} => {
					calls.insert((pallet_index, call_index), name.clone());
				},
				ItemDetail::Event {
					pallet_index,
					event_index,
				} => {
					events.insert((pallet_index, event_index), name.clone());
				},
				ItemDetail::Constant { .. } | ItemDetail::StorageEntry { .. } => {},
			}
			let fingerprint = hasher.fingerprint(&schema);
			described.insert(
				name,
				Arc::new(RuntimeItem {
					schema,
					fingerprint,
					detail,
				}),
			);
		}
		drop(hasher);

		RuntimeDescription {
			spec_version,
			types,
			items: described,
			calls,
			events,
		}
	}

	/// Parses SCALE encoded, magic-prefixed runtime metadata (V14 or V15).
	pub fn from_metadata(spec_version: SpecVersion, bytes: &[u8]) -> Result<Self> {
		let (types, items) = convert::convert(bytes).map_err(|error| match error {
			convert::ConvertError::Unsupported(version) => Error::UnsupportedMetadata {
				spec_version,
				version,
			},
			convert::ConvertError::Invalid(reason) => Error::InvalidMetadata {
				spec_version,
				reason,
			},
		})?;
		Ok(Self::new(spec_version, types, items))
	}

	pub fn item(&self, name: &ItemName) -> Option<&Arc<RuntimeItem>> {
		self.items.get(name)
	}

	/// Items ordered by kind, pallet and name.
	pub fn items(&self) -> impl Iterator<Item = (&ItemName, &Arc<RuntimeItem>)> {
		self.items.iter()
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn call_by_index(
		&self,
		pallet_index: u8,
		call_index: u8,
	) -> Option<(&ItemName, &Arc<RuntimeItem>)> {
		let name = self.calls.get(&(pallet_index, call_index))?;
		self.items.get_key_value(name)
	}

	pub fn event_by_index(
		&self,
		pallet_index: u8,
		event_index: u8,
	) -> Option<(&ItemName, &Arc<RuntimeItem>)> {
		let name = self.events.get(&(pallet_index, event_index))?;
		self.items.get_key_value(name)
	}
}
