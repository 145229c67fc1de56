use super::{compact, value::Value};
use crate::{
	error::EncodeError,
	schema::{BitOrder, BitStore, Field, Primitive, TypeRegistry, TypeSchema, VariantDef},
};
use codec::{Compact, Encode};
use num::{BigInt, BigUint, Signed};

/// Writes values into a buffer following the layout of a schema.
pub struct Encoder<'a> {
	registry: &'a TypeRegistry,
	out: Vec<u8>,
}

fn mismatch(expected: &'static str, found: &Value) -> EncodeError {
	EncodeError::TypeMismatch {
		expected,
		found: found.kind(),
	}
}

impl<'a> Encoder<'a> {
	pub fn new(registry: &'a TypeRegistry) -> Self {
		Encoder {
			registry,
			out: vec![],
		}
	}

	pub fn finish(self) -> Vec<u8> {
		self.out
	}

	pub fn encode(&mut self, value: &Value, schema: &TypeSchema) -> Result<(), EncodeError> {
		match schema {
			TypeSchema::Primitive { primitive } => self.primitive(value, *primitive),
			TypeSchema::Compact { inner } => self.compact(value, inner),
			TypeSchema::Option { inner } => self.option(value, inner),
			TypeSchema::FixedArray { len, inner } => {
				let found = match value {
					Value::Bytes(bytes) => bytes.len(),
					Value::Sequence(values) => values.len(),
					other => return Err(mismatch("array", other)),
				};
				if found != *len as usize {
					return Err(EncodeError::LengthMismatch {
						expected: *len as usize,
						found,
					});
				}
				self.elements(value, inner)
			},
			TypeSchema::Sequence { inner } => {
				match value {
					Value::Bytes(bytes) => compact::encode_u128(bytes.len() as u128, &mut self.out),
					Value::Sequence(values) => {
						compact::encode_u128(values.len() as u128, &mut self.out)
					},
					other => return Err(mismatch("sequence", other)),
				}
				self.elements(value, inner)
			},
			TypeSchema::Tuple { items } => {
				let Value::Tuple(values) = value else {
					return Err(mismatch("tuple", value));
				};
				if values.len() != items.len() {
					return Err(EncodeError::LengthMismatch {
						expected: items.len(),
						found: values.len(),
					});
				}
				values
					.iter()
					.zip(items)
					.try_for_each(|(value, item)| self.encode(value, item))
			},
			TypeSchema::Composite { fields } => {
				let Value::Composite(values) = value else {
					return Err(mismatch("composite", value));
				};
				self.fields(values, fields)
			},
			TypeSchema::Variant { variants } => self.variant(value, variants),
			TypeSchema::BitSequence { store, order } => {
				let Value::BitSequence(bits) = value else {
					return Err(mismatch("bit sequence", value));
				};
				self.bits(bits, *store, *order)
			},
			TypeSchema::Ref { id } => {
				let target = self
					.registry
					.resolve(schema)
					.ok_or(EncodeError::UnknownType(*id))?;
				self.encode(value, target)
			},
		}
	}

	fn primitive(&mut self, value: &Value, primitive: Primitive) -> Result<(), EncodeError> {
		match (primitive, value) {
			(Primitive::Bool, Value::Bool(flag)) => flag.encode_to(&mut self.out),
			(Primitive::Char, Value::Char(code)) => u32::from(*code).encode_to(&mut self.out),
			(Primitive::Str, Value::Str(text)) => text.encode_to(&mut self.out),
			(Primitive::Bytes, Value::Bytes(bytes)) => bytes.encode_to(&mut self.out),
			(Primitive::U256, value) => {
				let value = unsigned(value)?;
				self.out.extend(fixed_width(value.to_bytes_le(), 32, 0, 256)?);
			},
			(Primitive::I256, value) => {
				let value = signed(value)?;
				let fill = if value.is_negative() { 0xff } else { 0x00 };
				self.out
					.extend(fixed_width(value.to_signed_bytes_le(), 32, fill, 256)?);
			},
			(integer, value) if integer.int_bits().is_some() => {
				let bits = integer.int_bits().unwrap_or(128);
				let width = bits as usize / 8;
				let out_of_range = EncodeError::IntegerOutOfRange { bits };
				if integer.is_signed() {
					let value = signed(value)?;
					let value = i128::try_from(&value).map_err(|_| out_of_range.clone())?;
					let limit = 1i128.checked_shl(bits - 1).unwrap_or(i128::MAX);
					if bits < 128 && (value < -limit || value >= limit) {
						return Err(out_of_range);
					}
					self.out.extend_from_slice(&value.to_le_bytes()[..width]);
				} else {
					let value = unsigned(value)?;
					let value = u128::try_from(&value).map_err(|_| out_of_range.clone())?;
					if bits < 128 && value >> bits != 0 {
						return Err(out_of_range);
					}
					self.out.extend_from_slice(&value.to_le_bytes()[..width]);
				}
			},
			(Primitive::Bool, other) => return Err(mismatch("bool", other)),
			(Primitive::Char, other) => return Err(mismatch("char", other)),
			(Primitive::Str, other) => return Err(mismatch("string", other)),
			(_, other) => return Err(mismatch("bytes", other)),
		}
		Ok(())
	}

	fn compact(&mut self, value: &Value, inner: &TypeSchema) -> Result<(), EncodeError> {
		let target = self
			.registry
			.resolve(inner)
			.ok_or_else(|| mismatch("compact integer", value))?;
		match (target, value) {
			(TypeSchema::Primitive { primitive }, value)
				if primitive.int_bits().is_some() && !primitive.is_signed() =>
			{
				let bits = primitive.int_bits().unwrap_or(256);
				let value = unsigned(value)?;
				if value.bits() > u64::from(bits) {
					return Err(EncodeError::IntegerOutOfRange { bits });
				}
				compact::encode_big(&value, &mut self.out);
				Ok(())
			},
			(TypeSchema::Composite { fields }, Value::Composite(values))
				if fields.len() == 1 && values.len() == 1 =>
			{
				if values[0].0 != fields[0].name {
					return Err(EncodeError::FieldMismatch {
						expected: fields[0].name.clone(),
						found: values[0].0.clone(),
					});
				}
				self.compact(&values[0].1, &fields[0].ty)
			},
			(TypeSchema::Tuple { items }, Value::Tuple(values))
				if items.len() == 1 && values.len() == 1 =>
			{
				self.compact(&values[0], &items[0])
			},
			(_, other) => Err(mismatch("compact integer", other)),
		}
	}

	fn option(&mut self, value: &Value, inner: &TypeSchema) -> Result<(), EncodeError> {
		let Value::Option(option) = value else {
			return Err(mismatch("option", value));
		};
		match option {
			None => self.out.push(0),
			Some(inner_value) => {
				self.out.push(1);
				self.encode(inner_value, inner)?;
			},
		}
		Ok(())
	}

	fn elements(&mut self, value: &Value, inner: &TypeSchema) -> Result<(), EncodeError> {
		match value {
			Value::Bytes(bytes) => {
				match self.registry.resolve(inner) {
					Some(TypeSchema::Primitive {
						primitive: Primitive::U8,
					}) => self.out.extend_from_slice(bytes),
					_ => return Err(mismatch("sequence", value)),
				}
				Ok(())
			},
			Value::Sequence(values) => values
				.iter()
				.try_for_each(|value| self.encode(value, inner)),
			other => Err(mismatch("sequence", other)),
		}
	}

	fn fields(&mut self, values: &[(String, Value)], fields: &[Field]) -> Result<(), EncodeError> {
		if values.len() != fields.len() {
			return Err(EncodeError::LengthMismatch {
				expected: fields.len(),
				found: values.len(),
			});
		}
		for ((name, value), field) in values.iter().zip(fields) {
			if *name != field.name {
				return Err(EncodeError::FieldMismatch {
					expected: field.name.clone(),
					found: name.clone(),
				});
			}
			self.encode(value, &field.ty)?;
		}
		Ok(())
	}

	fn variant(&mut self, value: &Value, variants: &[VariantDef]) -> Result<(), EncodeError> {
		let Value::Variant {
			index,
			name,
			fields,
		} = value
		else {
			return Err(mismatch("variant", value));
		};
		let variant = variants
			.iter()
			.find(|variant| variant.index == *index && variant.name == *name)
			.ok_or_else(|| EncodeError::UnknownVariant {
				index: *index,
				name: name.clone(),
			})?;
		self.out.push(variant.index);
		self.fields(fields, &variant.fields)
	}

	fn bits(
		&mut self,
		bits: &[bool],
		store: BitStore,
		order: BitOrder,
	) -> Result<(), EncodeError> {
		bit_count(bits.len())?.encode_to(&mut self.out);
		let store_bytes = store.bits() / 8;
		for chunk in bits.chunks(store.bits()) {
			let mut word = 0u64;
			for (position, bit) in chunk.iter().enumerate() {
				if *bit {
					let shift = match order {
						BitOrder::Lsb0 => position,
						BitOrder::Msb0 => store.bits() - 1 - position,
					};
					word |= 1 << shift;
				}
			}
			self.out
				.extend_from_slice(&word.to_le_bytes()[..store_bytes]);
		}
		Ok(())
	}
}

/// Bit sequences are prefixed with their length in bits as a compact `u32`.
fn bit_count(len: usize) -> Result<Compact<u32>, EncodeError> {
	u32::try_from(len)
		.map(Compact)
		.map_err(|_| EncodeError::LengthOutOfRange {
			len,
			max: u32::MAX as usize,
		})
}

fn unsigned(value: &Value) -> Result<BigUint, EncodeError> {
	match value {
		Value::UInt(value) => Ok(BigUint::from(*value)),
		Value::BigUInt(value) => Ok(value.clone()),
		other => Err(mismatch("unsigned integer", other)),
	}
}

fn signed(value: &Value) -> Result<BigInt, EncodeError> {
	match value {
		Value::Int(value) => Ok(BigInt::from(*value)),
		Value::BigInt(value) => Ok(value.clone()),
		other => Err(mismatch("signed integer", other)),
	}
}

/// Pads a little-endian integer to `width` bytes, failing if it is already wider.
fn fixed_width(mut bytes: Vec<u8>, width: usize, fill: u8, bits: u32) -> Result<Vec<u8>, EncodeError> {
	if bytes.len() > width {
		return Err(EncodeError::IntegerOutOfRange { bits });
	}
	bytes.resize(width, fill);
	Ok(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scale::encode;
	use crate::schema::TypeId;
	use codec::Encode;
	use test_case::test_case;

	fn prim(primitive: Primitive) -> TypeSchema {
		TypeSchema::primitive(primitive)
	}

	#[test]
	fn matches_derived_encoding() {
		#[derive(Encode)]
		enum Call {
			#[codec(index = 0)]
			Remark { text: Vec<u8> },
			#[codec(index = 3)]
			Transfer {
				dest: [u8; 32],
				#[codec(compact)]
				value: u128,
				keep_alive: Option<bool>,
			},
		}

		let registry = TypeRegistry::new();
		let schema = TypeSchema::variant(vec![
			VariantDef::new(
				0,
				"Remark",
				vec![Field::new("text", TypeSchema::sequence(prim(Primitive::U8)))],
			),
			VariantDef::new(
				3,
				"Transfer",
				vec![
					Field::new("dest", TypeSchema::array(32, prim(Primitive::U8))),
					Field::new("value", TypeSchema::compact(prim(Primitive::U128))),
					Field::new("keep_alive", TypeSchema::option(prim(Primitive::Bool))),
				],
			),
		]);
		let value = Value::variant(
			3,
			"Transfer",
			[
				("dest", Value::Bytes(vec![9; 32])),
				("value", Value::UInt(10_000_000_000)),
				("keep_alive", Value::some(Value::Bool(false))),
			],
		);
		let expected = Call::Transfer {
			dest: [9; 32],
			value: 10_000_000_000,
			keep_alive: Some(false),
		}
		.encode();
		assert_eq!(encode(&value, &schema, &registry), Ok(expected));

		let remark = Value::variant(0, "Remark", [("text", Value::Bytes(b"hi".to_vec()))]);
		assert_eq!(
			encode(&remark, &schema, &registry),
			Ok(Call::Remark {
				text: b"hi".to_vec()
			}
			.encode())
		);
	}

	#[test]
	fn byte_arrays_accept_element_sequences() {
		let registry = TypeRegistry::new();
		let schema = TypeSchema::array(2, prim(Primitive::U8));
		let value = Value::Sequence(vec![Value::UInt(1), Value::UInt(2)]);
		assert_eq!(encode(&value, &schema, &registry), Ok(vec![1, 2]));
	}

	#[test]
	fn wide_integers_are_padded() {
		let registry = TypeRegistry::new();
		let encoded = encode(&Value::Int(-1), &prim(Primitive::I256), &registry).unwrap();
		assert_eq!(encoded, vec![0xff; 32]);
		let encoded = encode(&Value::UInt(1), &prim(Primitive::U256), &registry).unwrap();
		assert_eq!(encoded[0], 1);
		assert_eq!(encoded.len(), 32);
	}

	#[test_case(Value::UInt(256), prim(Primitive::U8) => EncodeError::IntegerOutOfRange { bits: 8 }; "u8 overflow")]
	#[test_case(Value::Int(-129), prim(Primitive::I8) => EncodeError::IntegerOutOfRange { bits: 8 }; "i8 underflow")]
	#[test_case(Value::Int(128), prim(Primitive::I8) => EncodeError::IntegerOutOfRange { bits: 8 }; "i8 overflow")]
	#[test_case(Value::UInt(70_000), TypeSchema::compact(prim(Primitive::U16)) => EncodeError::IntegerOutOfRange { bits: 16 }; "compact overflow")]
	#[test_case(Value::Bool(true), prim(Primitive::U32) => EncodeError::TypeMismatch { expected: "unsigned integer", found: "bool" }; "kind mismatch")]
	#[test_case(Value::Bytes(vec![1]), TypeSchema::array(2, prim(Primitive::U8)) => EncodeError::LengthMismatch { expected: 2, found: 1 }; "short array")]
	#[test_case(Value::composite([("b", Value::UInt(1))]), TypeSchema::composite(vec![Field::new("a", prim(Primitive::U8))]) => EncodeError::FieldMismatch { expected: "a".into(), found: "b".into() }; "field name")]
	#[test_case(Value::variant::<String>(1, "B", []), TypeSchema::variant(vec![VariantDef::new(0, "A", vec![])]) => EncodeError::UnknownVariant { index: 1, name: "B".into() }; "unknown variant")]
	#[test_case(Value::UInt(1), TypeSchema::reference(TypeId(3)) => EncodeError::UnknownType(TypeId(3)); "dangling reference")]
	fn encode_failures(value: Value, schema: TypeSchema) -> EncodeError {
		encode(&value, &schema, &TypeRegistry::new()).unwrap_err()
	}

	#[test]
	fn bit_count_fits_in_u32() {
		assert_eq!(bit_count(37), Ok(Compact(37)));
		assert_eq!(bit_count(u32::MAX as usize), Ok(Compact(u32::MAX)));
		#[cfg(target_pointer_width = "64")]
		assert_eq!(
			bit_count(u32::MAX as usize + 1),
			Err(EncodeError::LengthOutOfRange {
				len: u32::MAX as usize + 1,
				max: u32::MAX as usize,
			})
		);
	}
}
