//! Content-addressed digests of type schemas.
//!
//! A schema is canonicalized node by node: one tag byte for the node kind, then its payload
//! (names, lengths, indices; SCALE encoded) and the digests of its children in declaration order.
//! Each node is hashed with BLAKE2b-256, so a digest is a Merkle root over the schema tree.
//!
//! References into the [`TypeRegistry`] hash the referenced name together with the digest of the
//! referenced type. A reference back into a type that is still being hashed (a recursive type)
//! contributes its name only. Digests of named types are memoized only when they cannot depend on
//! an enclosing type that is still in progress, so memoization never changes a result.
use crate::{
	error::Error,
	schema::{BitOrder, BitStore, Primitive, TypeId, TypeRegistry, TypeSchema},
	utils::blake2_256,
};
use codec::{Compact, Encode};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
	collections::HashMap,
	fmt::{self, Debug, Display, Formatter},
	str::FromStr,
};

pub const FINGERPRINT_LEN: usize = 32;

const TAG_PRIMITIVE: u8 = 0x00;
const TAG_COMPACT: u8 = 0x01;
const TAG_OPTION: u8 = 0x02;
const TAG_FIXED_ARRAY: u8 = 0x03;
const TAG_SEQUENCE: u8 = 0x04;
const TAG_TUPLE: u8 = 0x05;
const TAG_COMPOSITE: u8 = 0x06;
const TAG_VARIANT: u8 = 0x07;
const TAG_BIT_SEQUENCE: u8 = 0x08;
const TAG_REF: u8 = 0x09;
const TAG_CYCLE: u8 = 0x0a;
const TAG_DANGLING: u8 = 0x0b;

/// BLAKE2b-256 digest of a canonicalized [`TypeSchema`], rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
	pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
		Fingerprint(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}
}

impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Fingerprint({})", self.to_hex())
	}
}

impl FromStr for Fingerprint {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let hex_str = s.strip_prefix("0x").unwrap_or(s);
		let mut bytes = [0u8; FINGERPRINT_LEN];
		hex::decode_to_slice(hex_str, &mut bytes)
			.map_err(|_| Error::InvalidFingerprint(s.to_string()))?;
		Ok(Fingerprint(bytes))
	}
}

impl Serialize for Fingerprint {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Fingerprint {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = String::deserialize(deserializer)?;
		value.parse().map_err(de::Error::custom)
	}
}

/// Computes the fingerprint of a single schema.
pub fn fingerprint(schema: &TypeSchema, registry: &TypeRegistry) -> Fingerprint {
	Hasher::new(registry).fingerprint(schema)
}

/// Fingerprints many schemas against one registry, sharing memoized digests of named types.
pub struct Hasher<'a> {
	registry: &'a TypeRegistry,
	memo: HashMap<TypeId, [u8; FINGERPRINT_LEN]>,
	in_progress: Vec<TypeId>,
}

impl<'a> Hasher<'a> {
	pub fn new(registry: &'a TypeRegistry) -> Self {
		Hasher {
			registry,
			memo: HashMap::new(),
			in_progress: vec![],
		}
	}

	pub fn fingerprint(&mut self, schema: &TypeSchema) -> Fingerprint {
		let (digest, _) = self.node(schema);
		Fingerprint(digest)
	}

	fn node(&mut self, schema: &TypeSchema) -> ([u8; FINGERPRINT_LEN], Dependency) {
		let mut buf = vec![];
		let mut dependency = Dependency::default();
		match schema {
			TypeSchema::Primitive { primitive } => {
				buf.extend([TAG_PRIMITIVE, primitive_code(primitive)]);
			},
			TypeSchema::Compact { inner } => {
				buf.push(TAG_COMPACT);
				dependency.merge(self.child(inner, &mut buf));
			},
			TypeSchema::Option { inner } => {
				buf.push(TAG_OPTION);
				dependency.merge(self.child(inner, &mut buf));
			},
			TypeSchema::FixedArray { len, inner } => {
				buf.push(TAG_FIXED_ARRAY);
				len.encode_to(&mut buf);
				dependency.merge(self.child(inner, &mut buf));
			},
			TypeSchema::Sequence { inner } => {
				buf.push(TAG_SEQUENCE);
				dependency.merge(self.child(inner, &mut buf));
			},
			TypeSchema::Tuple { items } => {
				buf.push(TAG_TUPLE);
				Compact(items.len() as u32).encode_to(&mut buf);
				for item in items {
					dependency.merge(self.child(item, &mut buf));
				}
			},
			TypeSchema::Composite { fields } => {
				buf.push(TAG_COMPOSITE);
				Compact(fields.len() as u32).encode_to(&mut buf);
				for field in fields {
					field.name.encode_to(&mut buf);
					dependency.merge(self.child(&field.ty, &mut buf));
				}
			},
			TypeSchema::Variant { variants } => {
				buf.push(TAG_VARIANT);
				Compact(variants.len() as u32).encode_to(&mut buf);
				for variant in variants {
					buf.push(variant.index);
					variant.name.encode_to(&mut buf);
					Compact(variant.fields.len() as u32).encode_to(&mut buf);
					for field in &variant.fields {
						field.name.encode_to(&mut buf);
						dependency.merge(self.child(&field.ty, &mut buf));
					}
				}
			},
			TypeSchema::BitSequence { store, order } => {
				let store = match store {
					BitStore::U8 => 0u8,
					BitStore::U16 => 1,
					BitStore::U32 => 2,
					BitStore::U64 => 3,
				};
				let order = match order {
					BitOrder::Lsb0 => 0u8,
					BitOrder::Msb0 => 1,
				};
				buf.extend([TAG_BIT_SEQUENCE, store, order]);
			},
			TypeSchema::Ref { id } => return self.reference(*id),
		}
		(blake2_256(&buf), dependency)
	}

	fn child(&mut self, schema: &TypeSchema, buf: &mut Vec<u8>) -> Dependency {
		let (digest, dependency) = self.node(schema);
		buf.extend(digest);
		dependency
	}

	fn reference(&mut self, id: TypeId) -> ([u8; FINGERPRINT_LEN], Dependency) {
		let Some(named) = self.registry.get(id) else {
			let mut buf = vec![TAG_DANGLING];
			id.0.encode_to(&mut buf);
			return (blake2_256(&buf), Dependency::default());
		};

		let mut buf = vec![];
		if let Some(position) = self.in_progress.iter().position(|pending| *pending == id) {
			buf.push(TAG_CYCLE);
			named.name.encode_to(&mut buf);
			let dependency = Dependency {
				lowest: position,
				unmemoized: false,
			};
			return (blake2_256(&buf), dependency);
		}

		buf.push(TAG_REF);
		named.name.encode_to(&mut buf);

		if let Some(digest) = self.memo.get(&id) {
			buf.extend(digest);
			return (blake2_256(&buf), Dependency::default());
		}

		let depth = self.in_progress.len();
		self.in_progress.push(id);
		let (digest, mut dependency) = self.node(&named.schema);
		self.in_progress.pop();

		// Only cycles back to this very type may remain, and every named type expanded below
		// must itself have been memoized.
		if dependency.lowest >= depth && !dependency.unmemoized {
			self.memo.insert(id, digest);
			dependency = Dependency::default();
		} else {
			dependency.unmemoized = true;
		}

		buf.extend(digest);
		(blake2_256(&buf), dependency)
	}
}

/// How a digest depends on the types that are still being hashed.
#[derive(Clone, Copy)]
struct Dependency {
	/// Lowest in-progress stack position referenced by a cycle, `usize::MAX` if none.
	lowest: usize,
	/// Some named type below was expanded without being memoized.
	unmemoized: bool,
}

impl Default for Dependency {
	fn default() -> Self {
		Dependency {
			lowest: usize::MAX,
			unmemoized: false,
		}
	}
}

impl Dependency {
	fn merge(&mut self, other: Dependency) {
		self.lowest = self.lowest.min(other.lowest);
		self.unmemoized |= other.unmemoized;
	}
}

fn primitive_code(primitive: &Primitive) -> u8 {
	match primitive {
		Primitive::Bool => 0,
		Primitive::Char => 1,
		Primitive::Str => 2,
		Primitive::Bytes => 3,
		Primitive::U8 => 4,
		Primitive::U16 => 5,
		Primitive::U32 => 6,
		Primitive::U64 => 7,
		Primitive::U128 => 8,
		Primitive::U256 => 9,
		Primitive::I8 => 10,
		Primitive::I16 => 11,
		Primitive::I32 => 12,
		Primitive::I64 => 13,
		Primitive::I128 => 14,
		Primitive::I256 => 15,
	}
}
