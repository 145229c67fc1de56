use num::{BigInt, BigUint};
use serde::{
	ser::{SerializeMap, SerializeSeq},
	Serialize, Serializer,
};

/// Decoded value tree, shaped by the [`TypeSchema`](crate::schema::TypeSchema) it was decoded
/// against.
///
/// Fixed arrays and sequences of bytes decode into [`Value::Bytes`], every other array or
/// sequence into [`Value::Sequence`]. Integers up to 128 bits are held natively, wider ones as
/// arbitrary precision integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
	Bool(bool),
	Char(char),
	Str(String),
	Bytes(Vec<u8>),
	UInt(u128),
	Int(i128),
	BigUInt(BigUint),
	BigInt(BigInt),
	Option(Option<Box<Value>>),
	Sequence(Vec<Value>),
	Tuple(Vec<Value>),
	Composite(Vec<(String, Value)>),
	Variant {
		index: u8,
		name: String,
		fields: Vec<(String, Value)>,
	},
	BitSequence(Vec<bool>),
}

impl Value {
	pub fn some(value: Value) -> Self {
		Value::Option(Some(Box::new(value)))
	}

	pub fn none() -> Self {
		Value::Option(None)
	}

	pub fn composite<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
		Value::Composite(
			fields
				.into_iter()
				.map(|(name, value)| (name.into(), value))
				.collect(),
		)
	}

	pub fn variant<N: Into<String>>(
		index: u8,
		name: impl Into<String>,
		fields: impl IntoIterator<Item = (N, Value)>,
	) -> Self {
		Value::Variant {
			index,
			name: name.into(),
			fields: fields
				.into_iter()
				.map(|(name, value)| (name.into(), value))
				.collect(),
		}
	}

	/// Name of the value kind, used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			Value::Bool(_) => "bool",
			Value::Char(_) => "char",
			Value::Str(_) => "string",
			Value::Bytes(_) => "bytes",
			Value::UInt(_) => "unsigned integer",
			Value::Int(_) => "signed integer",
			Value::BigUInt(_) => "big unsigned integer",
			Value::BigInt(_) => "big signed integer",
			Value::Option(_) => "option",
			Value::Sequence(_) => "sequence",
			Value::Tuple(_) => "tuple",
			Value::Composite(_) => "composite",
			Value::Variant { .. } => "variant",
			Value::BitSequence(_) => "bit sequence",
		}
	}

	/// Looks up a named field of a composite or of a variant payload.
	pub fn field(&self, name: &str) -> Option<&Value> {
		let fields = match self {
			Value::Composite(fields) | Value::Variant { fields, .. } => fields,
			_ => return None,
		};
		fields
			.iter()
			.find(|(field, _)| field == name)
			.map(|(_, value)| value)
	}

	pub fn as_u128(&self) -> Option<u128> {
		match self {
			Value::UInt(value) => Some(*value),
			Value::BigUInt(value) => u128::try_from(value).ok(),
			_ => None,
		}
	}

	pub fn as_i128(&self) -> Option<i128> {
		match self {
			Value::Int(value) => Some(*value),
			Value::BigInt(value) => i128::try_from(value).ok(),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Value::Bytes(bytes) => Some(bytes),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(value) => Some(value),
			_ => None,
		}
	}

	/// Variant name, for variant values.
	pub fn variant_name(&self) -> Option<&str> {
		match self {
			Value::Variant { name, .. } => Some(name),
			_ => None,
		}
	}
}

struct Fields<'a>(&'a [(String, Value)]);

impl Serialize for Fields<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (name, value) in self.0 {
			map.serialize_entry(name, value)?;
		}
		map.end()
	}
}

/// JSON friendly rendering: bytes as `0x` hex, integers beyond 64 bits as decimal strings,
/// variants as `{ "name": ..., "fields": {...} }`.
impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::Bool(value) => serializer.serialize_bool(*value),
			Value::Char(value) => serializer.serialize_char(*value),
			Value::Str(value) => serializer.serialize_str(value),
			Value::Bytes(bytes) => serializer.serialize_str(&format!("0x{}", hex::encode(bytes))),
			Value::UInt(value) => match u64::try_from(*value) {
				Ok(value) => serializer.serialize_u64(value),
				Err(_) => serializer.serialize_str(&value.to_string()),
			},
			Value::Int(value) => match i64::try_from(*value) {
				Ok(value) => serializer.serialize_i64(value),
				Err(_) => serializer.serialize_str(&value.to_string()),
			},
			Value::BigUInt(value) => serializer.serialize_str(&value.to_string()),
			Value::BigInt(value) => serializer.serialize_str(&value.to_string()),
			Value::Option(None) => serializer.serialize_none(),
			Value::Option(Some(value)) => serializer.serialize_some(value.as_ref()),
			Value::Sequence(values) | Value::Tuple(values) => {
				let mut seq = serializer.serialize_seq(Some(values.len()))?;
				for value in values {
					seq.serialize_element(value)?;
				}
				seq.end()
			},
			Value::Composite(fields) => Fields(fields).serialize(serializer),
			Value::Variant { name, fields, .. } => {
				let mut map = serializer.serialize_map(Some(2))?;
				map.serialize_entry("name", name)?;
				map.serialize_entry("fields", &Fields(fields))?;
				map.end()
			},
			Value::BitSequence(bits) => {
				let rendered: String = bits.iter().map(|bit| if *bit { '1' } else { '0' }).collect();
				serializer.serialize_str(&rendered)
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn field_lookup() {
		let value = Value::composite([("dest", Value::Bytes(vec![1; 32])), ("value", Value::UInt(7))]);
		assert_eq!(value.field("value"), Some(&Value::UInt(7)));
		assert_eq!(value.field("missing"), None);
		assert_eq!(Value::UInt(1).field("value"), None);
	}

	#[test]
	fn json_rendering() {
		let value = Value::variant(
			1,
			"Transfer",
			[
				("from", Value::Bytes(vec![0xab, 0xcd])),
				("amount", Value::UInt(u128::MAX)),
				("memo", Value::none()),
				("flags", Value::BitSequence(vec![true, false, true])),
			],
		);
		assert_eq!(
			serde_json::to_value(&value).unwrap(),
			json!({
				"name": "Transfer",
				"fields": {
					"from": "0xabcd",
					"amount": "340282366920938463463374607431768211455",
					"memo": null,
					"flags": "101",
				}
			})
		);
	}
}
