//! Dynamic SCALE codec.
//!
//! Values are decoded and encoded against a [`TypeSchema`] at runtime rather than through static
//! Rust types, so that any historical layout described by runtime metadata can be read. The wire
//! format is bit-exact with `parity-scale-codec`.
use crate::{
	error::{DecodeError, EncodeError},
	schema::{TypeRegistry, TypeSchema},
};

pub mod compact;
mod decode;
mod encode;
mod value;

pub use decode::Decoder;
pub use encode::Encoder;
pub use value::Value;

/// Maximum schema nesting followed while decoding.
pub const MAX_DEPTH: usize = 256;

/// Maximum length accepted for a sequence whose elements encode to zero bytes.
pub const MAX_ZERO_SIZED_ELEMENTS: usize = 1 << 16;

/// Decodes one value starting at `offset`, returning it with the offset just past it.
pub fn decode(
	bytes: &[u8],
	offset: usize,
	schema: &TypeSchema,
	registry: &TypeRegistry,
) -> Result<(Value, usize), DecodeError> {
	let mut decoder = Decoder::new(registry, bytes, offset);
	let value = decoder.decode(schema)?;
	Ok((value, decoder.offset()))
}

/// Decodes a value that must span the whole buffer.
pub fn decode_all(
	bytes: &[u8],
	schema: &TypeSchema,
	registry: &TypeRegistry,
) -> Result<Value, DecodeError> {
	let (value, offset) = decode(bytes, 0, schema, registry)?;
	if offset != bytes.len() {
		return Err(DecodeError::TrailingBytes {
			offset,
			remaining: bytes.len() - offset,
		});
	}
	Ok(value)
}

pub fn encode(
	value: &Value,
	schema: &TypeSchema,
	registry: &TypeRegistry,
) -> Result<Vec<u8>, EncodeError> {
	let mut encoder = Encoder::new(registry);
	encoder.encode(value, schema)?;
	Ok(encoder.finish())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::{BitOrder, BitStore, Field, Primitive, VariantDef};
	use codec::{Compact, Encode};
	use proptest::{collection::vec, option, prelude::*};

	fn prim(primitive: Primitive) -> TypeSchema {
		TypeSchema::primitive(primitive)
	}

	fn round_trip(value: &Value, schema: &TypeSchema, registry: &TypeRegistry) -> Value {
		let bytes = encode(value, schema, registry).unwrap();
		decode_all(&bytes, schema, registry).unwrap()
	}

	fn event_registry() -> (TypeRegistry, TypeSchema) {
		let mut registry = TypeRegistry::new();
		let account = registry.insert("AccountId32", TypeSchema::array(32, prim(Primitive::U8)));
		let event = registry.insert(
			"pallet_balances::Event",
			TypeSchema::variant(vec![
				VariantDef::new(
					0,
					"Endowed",
					vec![
						Field::new("account", TypeSchema::reference(account)),
						Field::new("free_balance", prim(Primitive::U128)),
					],
				),
				VariantDef::new(
					2,
					"Transfer",
					vec![
						Field::new("from", TypeSchema::reference(account)),
						Field::new("to", TypeSchema::reference(account)),
						Field::new("amount", TypeSchema::compact(prim(Primitive::U128))),
					],
				),
				VariantDef::new(7, "Paused", vec![]),
			]),
		);
		(registry, TypeSchema::reference(event))
	}

	#[test]
	fn nested_event_round_trip() {
		let (registry, schema) = event_registry();
		let value = Value::variant(
			2,
			"Transfer",
			[
				("from", Value::Bytes(vec![1; 32])),
				("to", Value::Bytes(vec![2; 32])),
				("amount", Value::UInt(u128::MAX)),
			],
		);
		assert_eq!(round_trip(&value, &schema, &registry), value);

		let paused = Value::variant::<String>(7, "Paused", []);
		assert_eq!(encode(&paused, &schema, &registry), Ok(vec![7]));
	}

	#[test]
	fn bit_sequences_round_trip() {
		let registry = TypeRegistry::new();
		let bits: Vec<bool> = (0..37).map(|i| i % 3 == 0).collect();
		for store in [BitStore::U8, BitStore::U16, BitStore::U32, BitStore::U64] {
			for order in [BitOrder::Lsb0, BitOrder::Msb0] {
				let schema = TypeSchema::BitSequence { store, order };
				let value = Value::BitSequence(bits.clone());
				let bytes = encode(&value, &schema, &registry).unwrap();
				assert_eq!(bytes.len(), 1 + 37usize.div_ceil(store.bits()) * store.bits() / 8);
				assert_eq!(decode_all(&bytes, &schema, &registry), Ok(value));
			}
		}
	}

	proptest! {
		#[test]
		fn tuples_of_integers(a: u8, b: i16, c: u64, d: i128) {
			let registry = TypeRegistry::new();
			let schema = TypeSchema::tuple(vec![
				prim(Primitive::U8),
				prim(Primitive::I16),
				prim(Primitive::U64),
				prim(Primitive::I128),
			]);
			let value = Value::Tuple(vec![
				Value::UInt(a.into()),
				Value::Int(b.into()),
				Value::UInt(c.into()),
				Value::Int(d),
			]);
			let bytes = encode(&value, &schema, &registry).unwrap();
			prop_assert_eq!(&bytes, &(a, b, c, d).encode());
			prop_assert_eq!(decode_all(&bytes, &schema, &registry).unwrap(), value);
		}

		#[test]
		fn strings_and_sequences(text in ".*", items in vec(any::<u32>(), 0..64)) {
			let registry = TypeRegistry::new();
			let schema = TypeSchema::composite(vec![
				Field::new("text", prim(Primitive::Str)),
				Field::new("items", TypeSchema::sequence(TypeSchema::compact(prim(Primitive::U32)))),
			]);
			let value = Value::composite([
				("text", Value::Str(text.clone())),
				("items", Value::Sequence(items.iter().map(|item| Value::UInt((*item).into())).collect())),
			]);
			let expected = (text, items.iter().map(|item| Compact(*item)).collect::<Vec<_>>()).encode();
			let bytes = encode(&value, &schema, &registry).unwrap();
			prop_assert_eq!(&bytes, &expected);
			prop_assert_eq!(round_trip(&value, &schema, &registry), value);
		}

		#[test]
		fn optional_values(inner in option::of(any::<u16>()), flag in option::of(any::<bool>())) {
			let registry = TypeRegistry::new();
			let schema = TypeSchema::tuple(vec![
				TypeSchema::option(prim(Primitive::U16)),
				TypeSchema::option(prim(Primitive::Bool)),
			]);
			let value = Value::Tuple(vec![
				inner.map_or(Value::none(), |inner| Value::some(Value::UInt(inner.into()))),
				flag.map_or(Value::none(), |flag| Value::some(Value::Bool(flag))),
			]);
			let bytes = encode(&value, &schema, &registry).unwrap();
			prop_assert_eq!(&bytes, &(inner, flag).encode());
			prop_assert_eq!(decode_all(&bytes, &schema, &registry).unwrap(), value);
		}

		#[test]
		fn events_with_arbitrary_accounts(from: [u8; 32], balance: u128) {
			let (registry, schema) = event_registry();
			let value = Value::variant(
				0,
				"Endowed",
				[("account", Value::Bytes(from.to_vec())), ("free_balance", Value::UInt(balance))],
			);
			prop_assert_eq!(round_trip(&value, &schema, &registry), value);
		}
	}
}
