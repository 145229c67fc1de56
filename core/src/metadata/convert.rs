use super::{ItemDetail, StorageHasher, StorageModifier};
use crate::schema::{
	BitOrder, BitStore, Field, ItemName, Primitive, TypeId, TypeRegistry, TypeSchema, VariantDef,
};
use codec::Decode;
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed, META_RESERVED};
use scale_info::{
	form::PortableForm, PortableRegistry, Type, TypeDef, TypeDefPrimitive, Variant,
};
use std::collections::HashMap;

pub enum ConvertError {
	Unsupported(u32),
	Invalid(String),
}

type Items = Vec<(ItemName, TypeSchema, ItemDetail)>;

/// Walks the pallets of V14 and V15 metadata, which share their layout but not their types.
macro_rules! pallet_items {
	($metadata:expr, $version:ident) => {{
		let mut converter = TypeConverter::new(&$metadata.types);
		let mut items = Items::new();
		for pallet in &$metadata.pallets {
			let name = pallet.name.as_str();
			if let Some(calls) = &pallet.calls {
				for variant in converter.variants(calls.ty.id)? {
					let schema = converter.fields(&variant.fields)?;
					let detail = ItemDetail::Call {
						pallet_index: pallet.index,
						call_index: variant.index,
					};
					items.push((ItemName::call(name, &variant.name), schema, detail));
				}
			}
			if let Some(event) = &pallet.event {
				for variant in converter.variants(event.ty.id)? {
					let schema = converter.fields(&variant.fields)?;
					let detail = ItemDetail::Event {
						pallet_index: pallet.index,
						event_index: variant.index,
					};
					items.push((ItemName::event(name, &variant.name), schema, detail));
				}
			}
			for constant in &pallet.constants {
				let schema = converter.schema(constant.ty.id)?;
				let detail = ItemDetail::Constant {
					value: constant.value.clone(),
				};
				items.push((ItemName::constant(name, &constant.name), schema, detail));
			}
			for entry in pallet.storage.iter().flat_map(|storage| &storage.entries) {
				use frame_metadata::$version::{
					StorageEntryModifier, StorageEntryType, StorageHasher as Hasher,
				};
				let modifier = match entry.modifier {
					StorageEntryModifier::Optional => StorageModifier::Optional,
					StorageEntryModifier::Default => StorageModifier::Default,
				};
				let (schema, key, hashers) = match &entry.ty {
					StorageEntryType::Plain(value) => (converter.schema(value.id)?, None, vec![]),
					StorageEntryType::Map {
						hashers,
						key,
						value,
					} => {
						let hashers = hashers
							.iter()
							.map(|hasher| match hasher {
								Hasher::Blake2_128 => StorageHasher::Blake2_128,
								Hasher::Blake2_256 => StorageHasher::Blake2_256,
								Hasher::Blake2_128Concat => StorageHasher::Blake2_128Concat,
								Hasher::Twox128 => StorageHasher::Twox128,
								Hasher::Twox256 => StorageHasher::Twox256,
								Hasher::Twox64Concat => StorageHasher::Twox64Concat,
								Hasher::Identity => StorageHasher::Identity,
							})
							.collect();
						(
							converter.schema(value.id)?,
							Some(converter.schema(key.id)?),
							hashers,
						)
					},
				};
				let detail = ItemDetail::StorageEntry {
					modifier,
					hashers,
					key,
					default: entry.default.clone(),
				};
				items.push((ItemName::storage(name, &entry.name), schema, detail));
			}
		}
		(converter.finish(), items)
	}};
}

/// Decodes magic-prefixed metadata into a type arena and the runtime items.
pub fn convert(bytes: &[u8]) -> Result<(TypeRegistry, Items), ConvertError> {
	let prefixed = RuntimeMetadataPrefixed::decode(&mut &bytes[..])
		.map_err(|error| ConvertError::Invalid(format!("Cannot decode metadata: {error}")))?;
	if prefixed.0 != META_RESERVED {
		return Err(ConvertError::Invalid(format!(
			"Unexpected metadata magic number {:#010x}",
			prefixed.0
		)));
	}

	let converted = match &prefixed.1 {
		RuntimeMetadata::V14(metadata) => pallet_items!(metadata, v14),
		RuntimeMetadata::V15(metadata) => pallet_items!(metadata, v15),
		other => return Err(ConvertError::Unsupported(other.version())),
	};
	Ok(converted)
}

/// Converts portable types into schemas. Types with a path become named entries of the arena and
/// are referenced, anonymous types are inlined.
struct TypeConverter<'a> {
	portable: &'a PortableRegistry,
	registry: TypeRegistry,
	named: HashMap<u32, TypeId>,
	inlining: Vec<u32>,
}

impl<'a> TypeConverter<'a> {
	fn new(portable: &'a PortableRegistry) -> Self {
		TypeConverter {
			portable,
			registry: TypeRegistry::new(),
			named: HashMap::new(),
			inlining: vec![],
		}
	}

	fn finish(self) -> TypeRegistry {
		self.registry
	}

	fn resolve(&self, id: u32) -> Result<&'a Type<PortableForm>, ConvertError> {
		self.portable
			.resolve(id)
			.ok_or_else(|| ConvertError::Invalid(format!("Unknown type id {id}")))
	}

	fn variants(&self, id: u32) -> Result<&'a [Variant<PortableForm>], ConvertError> {
		match &self.resolve(id)?.type_def {
			TypeDef::Variant(def) => Ok(&def.variants),
			_ => Err(ConvertError::Invalid(format!(
				"Type {id} is expected to be an enum"
			))),
		}
	}

	/// Item payload: named fields, or positional fields named by their index.
	fn fields(
		&mut self,
		fields: &[scale_info::Field<PortableForm>],
	) -> Result<TypeSchema, ConvertError> {
		self.named_fields(fields).map(TypeSchema::composite)
	}

	fn named_fields(
		&mut self,
		fields: &[scale_info::Field<PortableForm>],
	) -> Result<Vec<Field>, ConvertError> {
		fields
			.iter()
			.enumerate()
			.map(|(position, field)| {
				let name = field.name.clone().unwrap_or_else(|| position.to_string());
				Ok(Field::new(name, self.schema(field.ty.id)?))
			})
			.collect()
	}

	fn schema(&mut self, id: u32) -> Result<TypeSchema, ConvertError> {
		let ty = self.resolve(id)?;

		if let Some(inner) = option_inner(ty) {
			return Ok(TypeSchema::option(self.schema(inner)?));
		}

		if ty.path.segments.is_empty() {
			if self.inlining.contains(&id) {
				return Err(ConvertError::Invalid(format!(
					"Anonymous type {id} refers to itself"
				)));
			}
			self.inlining.push(id);
			let schema = self.definition(&ty.type_def);
			self.inlining.pop();
			return schema;
		}

		if let Some(type_id) = self.named.get(&id) {
			return Ok(TypeSchema::reference(*type_id));
		}
		let type_id = self.registry.reserve(ty.path.segments.join("::"));
		self.named.insert(id, type_id);
		let schema = self.definition(&ty.type_def)?;
		self.registry.define(type_id, schema);
		Ok(TypeSchema::reference(type_id))
	}

	fn definition(&mut self, def: &TypeDef<PortableForm>) -> Result<TypeSchema, ConvertError> {
		Ok(match def {
			TypeDef::Composite(composite) => {
				if composite.fields.iter().any(|field| field.name.is_none()) {
					let items = composite
						.fields
						.iter()
						.map(|field| self.schema(field.ty.id))
						.collect::<Result<_, _>>()?;
					TypeSchema::tuple(items)
				} else {
					self.fields(&composite.fields)?
				}
			},
			TypeDef::Variant(variant) => {
				let variants = variant
					.variants
					.iter()
					.map(|variant| {
						let fields = self.named_fields(&variant.fields)?;
						Ok(VariantDef::new(variant.index, variant.name.clone(), fields))
					})
					.collect::<Result<_, _>>()?;
				TypeSchema::variant(variants)
			},
			TypeDef::Sequence(sequence) => TypeSchema::sequence(self.schema(sequence.type_param.id)?),
			TypeDef::Array(array) => TypeSchema::array(array.len, self.schema(array.type_param.id)?),
			TypeDef::Tuple(tuple) => TypeSchema::tuple(
				tuple
					.fields
					.iter()
					.map(|field| self.schema(field.id))
					.collect::<Result<_, _>>()?,
			),
			TypeDef::Primitive(primitive) => TypeSchema::primitive(match primitive {
				TypeDefPrimitive::Bool => Primitive::Bool,
				TypeDefPrimitive::Char => Primitive::Char,
				TypeDefPrimitive::Str => Primitive::Str,
				TypeDefPrimitive::U8 => Primitive::U8,
				TypeDefPrimitive::U16 => Primitive::U16,
				TypeDefPrimitive::U32 => Primitive::U32,
				TypeDefPrimitive::U64 => Primitive::U64,
				TypeDefPrimitive::U128 => Primitive::U128,
				TypeDefPrimitive::U256 => Primitive::U256,
				TypeDefPrimitive::I8 => Primitive::I8,
				TypeDefPrimitive::I16 => Primitive::I16,
				TypeDefPrimitive::I32 => Primitive::I32,
				TypeDefPrimitive::I64 => Primitive::I64,
				TypeDefPrimitive::I128 => Primitive::I128,
				TypeDefPrimitive::I256 => Primitive::I256,
			}),
			TypeDef::Compact(compact) => TypeSchema::compact(self.schema(compact.type_param.id)?),
			TypeDef::BitSequence(bits) => {
				let store = match &self.resolve(bits.bit_store_type.id)?.type_def {
					TypeDef::Primitive(TypeDefPrimitive::U8) => BitStore::U8,
					TypeDef::Primitive(TypeDefPrimitive::U16) => BitStore::U16,
					TypeDef::Primitive(TypeDefPrimitive::U32) => BitStore::U32,
					TypeDef::Primitive(TypeDefPrimitive::U64) => BitStore::U64,
					other => {
						return Err(ConvertError::Invalid(format!(
							"Unsupported bit store type {other:?}"
						)))
					},
				};
				let order_type = self.resolve(bits.bit_order_type.id)?;
				let order = match order_type.path.ident().as_deref() {
					Some("Lsb0") => BitOrder::Lsb0,
					Some("Msb0") => BitOrder::Msb0,
					_ => {
						return Err(ConvertError::Invalid(format!(
							"Unsupported bit order type {}",
							order_type.path.segments.join("::")
						)))
					},
				};
				TypeSchema::BitSequence { store, order }
			},
		})
	}
}

/// Payload type of `Option<T>`, which is described as an ordinary enum in metadata.
fn option_inner(ty: &Type<PortableForm>) -> Option<u32> {
	if ty.path.segments != ["Option"] {
		return None;
	}
	let TypeDef::Variant(def) = &ty.type_def else {
		return None;
	};
	match def.variants.as_slice() {
		[none, some]
			if none.name == "None"
				&& none.index == 0
				&& none.fields.is_empty()
				&& some.name == "Some"
				&& some.index == 1
				&& some.fields.len() == 1 =>
		{
			Some(some.fields[0].ty.id)
		},
		_ => None,
	}
}
