use super::{
	compact::{self, CompactInt},
	value::Value,
	MAX_DEPTH, MAX_ZERO_SIZED_ELEMENTS,
};
use crate::{
	error::DecodeError,
	schema::{BitOrder, BitStore, Field, Primitive, TypeRegistry, TypeSchema, VariantDef},
};
use num::{BigInt, BigUint};

/// Cursor over a byte buffer, decoding values against schemas resolved through a registry.
pub struct Decoder<'a> {
	registry: &'a TypeRegistry,
	bytes: &'a [u8],
	offset: usize,
	depth: usize,
}

impl<'a> Decoder<'a> {
	pub fn new(registry: &'a TypeRegistry, bytes: &'a [u8], offset: usize) -> Self {
		Decoder {
			registry,
			bytes,
			offset,
			depth: 0,
		}
	}

	pub fn offset(&self) -> usize {
		self.offset
	}

	pub fn remaining(&self) -> usize {
		self.bytes.len().saturating_sub(self.offset)
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
		let end = self.offset.saturating_add(len);
		let Some(slice) = self.bytes.get(self.offset..end) else {
			return Err(DecodeError::BufferUnderrun {
				offset: self.offset,
				needed: end - self.bytes.len().max(self.offset),
			});
		};
		self.offset = end;
		Ok(slice)
	}

	fn byte(&mut self) -> Result<u8, DecodeError> {
		Ok(self.take(1)?[0])
	}

	fn compact(&mut self) -> Result<CompactInt, DecodeError> {
		let (value, next) = compact::decode(self.bytes, self.offset)?;
		self.offset = next;
		Ok(value)
	}

	fn len_prefix(&mut self) -> Result<usize, DecodeError> {
		let (len, next) = compact::decode_len(self.bytes, self.offset)?;
		self.offset = next;
		Ok(len)
	}

	pub fn decode(&mut self, schema: &TypeSchema) -> Result<Value, DecodeError> {
		if self.depth >= MAX_DEPTH {
			return Err(DecodeError::RecursionLimit {
				offset: self.offset,
			});
		}
		self.depth += 1;
		let value = self.decode_node(schema);
		self.depth -= 1;
		value
	}

	fn decode_node(&mut self, schema: &TypeSchema) -> Result<Value, DecodeError> {
		match schema {
			TypeSchema::Primitive { primitive } => self.primitive(*primitive),
			TypeSchema::Compact { inner } => self.compact_value(inner),
			TypeSchema::Option { inner } => self.option(inner),
			TypeSchema::FixedArray { len, inner } => self.elements(*len as usize, inner),
			TypeSchema::Sequence { inner } => {
				let start = self.offset;
				let len = self.len_prefix()?;
				if len > self.remaining() {
					// Each element of a sized type takes at least one byte.
					if !is_zero_sized(inner, self.registry, 0) {
						return Err(DecodeError::BufferUnderrun {
							offset: start,
							needed: len - self.remaining(),
						});
					}
					if len > MAX_ZERO_SIZED_ELEMENTS {
						return Err(DecodeError::SequenceTooLong { offset: start, len });
					}
				}
				self.elements(len, inner)
			},
			TypeSchema::Tuple { items } => items
				.iter()
				.map(|item| self.decode(item))
				.collect::<Result<_, _>>()
				.map(Value::Tuple),
			TypeSchema::Composite { fields } => self.fields(fields).map(Value::Composite),
			TypeSchema::Variant { variants } => self.variant(variants),
			TypeSchema::BitSequence { store, order } => self.bits(*store, *order),
			TypeSchema::Ref { id } => {
				let named = self.registry.get(*id).ok_or(DecodeError::UnknownType {
					offset: self.offset,
					id: *id,
				})?;
				self.decode(&named.schema)
			},
		}
	}

	fn primitive(&mut self, primitive: Primitive) -> Result<Value, DecodeError> {
		let start = self.offset;
		match primitive {
			Primitive::Bool => match self.byte()? {
				0 => Ok(Value::Bool(false)),
				1 => Ok(Value::Bool(true)),
				byte => Err(DecodeError::InvalidBooleanByte {
					offset: start,
					byte,
				}),
			},
			Primitive::Char => {
				let raw = self.take(4)?;
				let code = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
				char::from_u32(code)
					.map(Value::Char)
					.ok_or(DecodeError::InvalidChar {
						offset: start,
						code,
					})
			},
			Primitive::Str => {
				let len = self.len_prefix()?;
				let text_offset = self.offset;
				let raw = self.take(len)?;
				String::from_utf8(raw.to_vec())
					.map(Value::Str)
					.map_err(|_| DecodeError::InvalidUtf8 {
						offset: text_offset,
					})
			},
			Primitive::Bytes => {
				let len = self.len_prefix()?;
				Ok(Value::Bytes(self.take(len)?.to_vec()))
			},
			Primitive::U256 => Ok(Value::BigUInt(BigUint::from_bytes_le(self.take(32)?))),
			Primitive::I256 => Ok(Value::BigInt(BigInt::from_signed_bytes_le(self.take(32)?))),
			integer => {
				// Remaining primitives are fixed-width integers of at most 128 bits.
				let width = integer.int_bits().unwrap_or(128) as usize / 8;
				let raw = self.take(width)?;
				let mut buffer = [0u8; 16];
				buffer[..width].copy_from_slice(raw);
				if integer.is_signed() {
					let negative = raw[width - 1] & 0x80 != 0;
					if negative {
						buffer[width..].fill(0xff);
					}
					Ok(Value::Int(i128::from_le_bytes(buffer)))
				} else {
					Ok(Value::UInt(u128::from_le_bytes(buffer)))
				}
			},
		}
	}

	fn compact_value(&mut self, inner: &TypeSchema) -> Result<Value, DecodeError> {
		let start = self.offset;
		let target = self
			.registry
			.resolve(inner)
			.ok_or(DecodeError::UnsupportedCompact { offset: start })?;

		match target {
			TypeSchema::Primitive { primitive } if !primitive.is_signed() => {
				let bits = primitive
					.int_bits()
					.ok_or(DecodeError::UnsupportedCompact { offset: start })?;
				let value = self.compact()?.check_width(start, bits)?;
				Ok(match value {
					CompactInt::Small(value) if bits < 256 => Value::UInt(value),
					CompactInt::Small(value) => Value::BigUInt(BigUint::from(value)),
					CompactInt::Big(value) => Value::BigUInt(value),
				})
			},
			TypeSchema::Composite { fields } if fields.len() == 1 => {
				let value = self.compact_value(&fields[0].ty)?;
				Ok(Value::Composite(vec![(fields[0].name.clone(), value)]))
			},
			TypeSchema::Tuple { items } if items.len() == 1 => {
				Ok(Value::Tuple(vec![self.compact_value(&items[0])?]))
			},
			_ => Err(DecodeError::UnsupportedCompact { offset: start }),
		}
	}

	fn option(&mut self, inner: &TypeSchema) -> Result<Value, DecodeError> {
		let start = self.offset;
		match self.byte()? {
			0 => Ok(Value::none()),
			1 => Ok(Value::some(self.decode(inner)?)),
			tag => Err(DecodeError::InvalidOptionTag { offset: start, tag }),
		}
	}

	fn elements(&mut self, len: usize, inner: &TypeSchema) -> Result<Value, DecodeError> {
		if let Some(TypeSchema::Primitive {
			primitive: Primitive::U8,
		}) = self.registry.resolve(inner)
		{
			return Ok(Value::Bytes(self.take(len)?.to_vec()));
		}
		let mut values = Vec::with_capacity(len.min(self.remaining()));
		for _ in 0..len {
			values.push(self.decode(inner)?);
		}
		Ok(Value::Sequence(values))
	}

	fn fields(&mut self, fields: &[Field]) -> Result<Vec<(String, Value)>, DecodeError> {
		fields
			.iter()
			.map(|field| Ok((field.name.clone(), self.decode(&field.ty)?)))
			.collect()
	}

	fn variant(&mut self, variants: &[VariantDef]) -> Result<Value, DecodeError> {
		let start = self.offset;
		let discriminant = self.byte()?;
		let variant = variants
			.iter()
			.find(|variant| variant.index == discriminant)
			.ok_or(DecodeError::UnknownVariantDiscriminant {
				offset: start,
				discriminant,
			})?;
		Ok(Value::Variant {
			index: variant.index,
			name: variant.name.clone(),
			fields: self.fields(&variant.fields)?,
		})
	}

	fn bits(&mut self, store: BitStore, order: BitOrder) -> Result<Value, DecodeError> {
		let len = self.len_prefix()?;
		let store_bytes = store.bits() / 8;
		let words = len.div_ceil(store.bits());
		let raw = self.take(words.saturating_mul(store_bytes))?;

		let mut bits = Vec::with_capacity(len);
		for word in raw.chunks(store_bytes) {
			let mut buffer = [0u8; 8];
			buffer[..store_bytes].copy_from_slice(word);
			let word = u64::from_le_bytes(buffer);
			for position in 0..store.bits() {
				if bits.len() == len {
					break;
				}
				let shift = match order {
					BitOrder::Lsb0 => position,
					BitOrder::Msb0 => store.bits() - 1 - position,
				};
				bits.push((word >> shift) & 1 == 1);
			}
		}
		Ok(Value::BitSequence(bits))
	}
}

/// Whether values of the schema always encode to zero bytes.
fn is_zero_sized(schema: &TypeSchema, registry: &TypeRegistry, depth: usize) -> bool {
	if depth >= MAX_DEPTH {
		return false;
	}
	match schema {
		TypeSchema::Tuple { items } => items
			.iter()
			.all(|item| is_zero_sized(item, registry, depth + 1)),
		TypeSchema::Composite { fields } => fields
			.iter()
			.all(|field| is_zero_sized(&field.ty, registry, depth + 1)),
		TypeSchema::FixedArray { len, inner } => {
			*len == 0 || is_zero_sized(inner, registry, depth + 1)
		},
		TypeSchema::Ref { id } => registry
			.get(*id)
			.is_some_and(|named| is_zero_sized(&named.schema, registry, depth + 1)),
		_ => false,
	}
}
