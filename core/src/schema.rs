//! Structural description of binary layouts.
//!
//! A [`TypeSchema`] is a tree describing how a value is laid out on the wire. Types that carry a
//! name in runtime metadata are not embedded structurally but live in a flat [`TypeRegistry`] and
//! are referenced by [`TypeId`]; this is what makes recursive chain types (a struct holding a
//! vector of itself) representable without an infinite tree.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use strum::{Display as StrumDisplay, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl Display for TypeId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
	Bool,
	Char,
	Str,
	/// Length prefixed raw bytes.
	Bytes,
	U8,
	U16,
	U32,
	U64,
	U128,
	U256,
	I8,
	I16,
	I32,
	I64,
	I128,
	I256,
}

impl Primitive {
	/// Width in bits of fixed-width integers.
	pub fn int_bits(&self) -> Option<u32> {
		match self {
			Primitive::U8 | Primitive::I8 => Some(8),
			Primitive::U16 | Primitive::I16 => Some(16),
			Primitive::U32 | Primitive::I32 => Some(32),
			Primitive::U64 | Primitive::I64 => Some(64),
			Primitive::U128 | Primitive::I128 => Some(128),
			Primitive::U256 | Primitive::I256 => Some(256),
			Primitive::Bool | Primitive::Char | Primitive::Str | Primitive::Bytes => None,
		}
	}

	pub fn is_signed(&self) -> bool {
		matches!(
			self,
			Primitive::I8
				| Primitive::I16 | Primitive::I32
				| Primitive::I64 | Primitive::I128
				| Primitive::I256
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitStore {
	U8,
	U16,
	U32,
	U64,
}

impl BitStore {
	pub fn bits(&self) -> usize {
		match self {
			BitStore::U8 => 8,
			BitStore::U16 => 16,
			BitStore::U32 => 32,
			BitStore::U64 => 64,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitOrder {
	Lsb0,
	Msb0,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
	pub name: String,
	pub ty: TypeSchema,
}

impl Field {
	pub fn new(name: impl Into<String>, ty: TypeSchema) -> Self {
		Field {
			name: name.into(),
			ty,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantDef {
	pub index: u8,
	pub name: String,
	/// Empty for tag-only variants.
	pub fields: Vec<Field>,
}

impl VariantDef {
	pub fn new(index: u8, name: impl Into<String>, fields: Vec<Field>) -> Self {
		VariantDef {
			index,
			name: name.into(),
			fields,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeSchema {
	Primitive {
		primitive: Primitive,
	},
	Compact {
		inner: Box<TypeSchema>,
	},
	Option {
		inner: Box<TypeSchema>,
	},
	FixedArray {
		len: u32,
		inner: Box<TypeSchema>,
	},
	Sequence {
		inner: Box<TypeSchema>,
	},
	Tuple {
		items: Vec<TypeSchema>,
	},
	Composite {
		fields: Vec<Field>,
	},
	Variant {
		variants: Vec<VariantDef>,
	},
	BitSequence {
		store: BitStore,
		order: BitOrder,
	},
	/// Named type stored in the [`TypeRegistry`].
	Ref {
		id: TypeId,
	},
}

impl TypeSchema {
	pub fn primitive(primitive: Primitive) -> Self {
		TypeSchema::Primitive { primitive }
	}

	pub fn compact(inner: TypeSchema) -> Self {
		TypeSchema::Compact {
			inner: Box::new(inner),
		}
	}

	pub fn option(inner: TypeSchema) -> Self {
		TypeSchema::Option {
			inner: Box::new(inner),
		}
	}

	pub fn array(len: u32, inner: TypeSchema) -> Self {
		TypeSchema::FixedArray {
			len,
			inner: Box::new(inner),
		}
	}

	pub fn sequence(inner: TypeSchema) -> Self {
		TypeSchema::Sequence {
			inner: Box::new(inner),
		}
	}

	pub fn tuple(items: Vec<TypeSchema>) -> Self {
		TypeSchema::Tuple { items }
	}

	pub fn composite(fields: Vec<Field>) -> Self {
		TypeSchema::Composite { fields }
	}

	pub fn variant(variants: Vec<VariantDef>) -> Self {
		TypeSchema::Variant { variants }
	}

	pub fn bit_sequence() -> Self {
		TypeSchema::BitSequence {
			store: BitStore::U8,
			order: BitOrder::Lsb0,
		}
	}

	pub fn reference(id: TypeId) -> Self {
		TypeSchema::Ref { id }
	}

	/// The unit type, encoded as zero bytes.
	pub fn unit() -> Self {
		TypeSchema::Tuple { items: vec![] }
	}
}

/// A type stored in the registry under a display name (its metadata path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
	pub name: String,
	pub schema: TypeSchema,
}

/// Flat arena of named types, indexed by [`TypeId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRegistry {
	types: Vec<NamedType>,
}

impl TypeRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserves a slot so that a type can refer to itself before its schema is known.
	pub fn reserve(&mut self, name: impl Into<String>) -> TypeId {
		let id = TypeId(self.types.len() as u32);
		self.types.push(NamedType {
			name: name.into(),
			schema: TypeSchema::unit(),
		});
		id
	}

	pub fn define(&mut self, id: TypeId, schema: TypeSchema) {
		if let Some(named) = self.types.get_mut(id.0 as usize) {
			named.schema = schema;
		}
	}

	pub fn insert(&mut self, name: impl Into<String>, schema: TypeSchema) -> TypeId {
		let id = self.reserve(name);
		self.define(id, schema);
		id
	}

	pub fn get(&self, id: TypeId) -> Option<&NamedType> {
		self.types.get(id.0 as usize)
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	/// Follows references until a structural node is reached.
	///
	/// Returns `None` for dangling references and for reference cycles that never reach a
	/// structural node.
	pub fn resolve<'a>(&'a self, mut schema: &'a TypeSchema) -> Option<&'a TypeSchema> {
		let mut hops = 0;
		while let TypeSchema::Ref { id } = schema {
			if hops > self.types.len() {
				return None;
			}
			schema = &self.get(*id)?.schema;
			hops += 1;
		}
		Some(schema)
	}
}

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
	StrumDisplay,
	EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ItemKind {
	Call,
	Constant,
	StorageEntry,
	Event,
}

/// Qualified name of one call, constant, storage entry or event within a runtime version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemName {
	pub kind: ItemKind,
	pub pallet: String,
	pub item: String,
}

impl ItemName {
	pub fn new(kind: ItemKind, pallet: impl Into<String>, item: impl Into<String>) -> Self {
		ItemName {
			kind,
			pallet: pallet.into(),
			item: item.into(),
		}
	}

	pub fn call(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		Self::new(ItemKind::Call, pallet, item)
	}

	pub fn constant(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		Self::new(ItemKind::Constant, pallet, item)
	}

	pub fn storage(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		Self::new(ItemKind::StorageEntry, pallet, item)
	}

	pub fn event(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		Self::new(ItemKind::Event, pallet, item)
	}
}

impl Display for ItemName {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}.{}", self.kind, self.pallet, self.item)
	}
}
