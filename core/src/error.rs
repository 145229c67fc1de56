use crate::{
	fingerprint::Fingerprint,
	schema::{ItemKind, ItemName, TypeId},
	types::SpecVersion,
};
use thiserror::Error;

/// Failure to decode bytes against a schema. Every variant carries the byte offset at which the
/// inconsistency was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("Buffer underrun at offset {offset}: {needed} more bytes needed")]
	BufferUnderrun { offset: usize, needed: usize },
	#[error("{remaining} trailing bytes left after offset {offset}")]
	TrailingBytes { offset: usize, remaining: usize },
	#[error("Unknown variant discriminant {discriminant} at offset {offset}")]
	UnknownVariantDiscriminant { offset: usize, discriminant: u8 },
	#[error("Invalid boolean byte {byte:#04x} at offset {offset}")]
	InvalidBooleanByte { offset: usize, byte: u8 },
	#[error("Invalid option tag {tag:#04x} at offset {offset}")]
	InvalidOptionTag { offset: usize, tag: u8 },
	#[error("Invalid UTF-8 string at offset {offset}")]
	InvalidUtf8 { offset: usize },
	#[error("Invalid char code point {code:#x} at offset {offset}")]
	InvalidChar { offset: usize, code: u32 },
	#[error("Compact integer at offset {offset} is not minimally encoded")]
	NonCanonicalCompact { offset: usize },
	#[error("Compact integer at offset {offset} does not fit in {bits} bits")]
	CompactOverflow { offset: usize, bits: u32 },
	#[error("Compact encoding at offset {offset} is not supported for this schema")]
	UnsupportedCompact { offset: usize },
	#[error("Unknown type {id} referenced at offset {offset}")]
	UnknownType { offset: usize, id: TypeId },
	#[error("Recursion limit reached at offset {offset}")]
	RecursionLimit { offset: usize },
	#[error("Sequence of {len} zero-sized elements at offset {offset} exceeds the limit")]
	SequenceTooLong { offset: usize, len: usize },
}

impl DecodeError {
	pub fn offset(&self) -> usize {
		match self {
			DecodeError::BufferUnderrun { offset, .. }
			| DecodeError::TrailingBytes { offset, .. }
			| DecodeError::UnknownVariantDiscriminant { offset, .. }
			| DecodeError::InvalidBooleanByte { offset, .. }
			| DecodeError::InvalidOptionTag { offset, .. }
			| DecodeError::InvalidUtf8 { offset }
			| DecodeError::InvalidChar { offset, .. }
			| DecodeError::NonCanonicalCompact { offset }
			| DecodeError::CompactOverflow { offset, .. }
			| DecodeError::UnsupportedCompact { offset }
			| DecodeError::UnknownType { offset, .. }
			| DecodeError::RecursionLimit { offset }
			| DecodeError::SequenceTooLong { offset, .. } => *offset,
		}
	}
}

/// Failure to encode a value against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
	#[error("Expected {expected} value, found {found}")]
	TypeMismatch {
		expected: &'static str,
		found: &'static str,
	},
	#[error("Expected field {expected:?}, found {found:?}")]
	FieldMismatch { expected: String, found: String },
	#[error("Expected {expected} elements, found {found}")]
	LengthMismatch { expected: usize, found: usize },
	#[error("Length {len} exceeds the maximum of {max}")]
	LengthOutOfRange { len: usize, max: usize },
	#[error("Integer does not fit in {bits} bits")]
	IntegerOutOfRange { bits: u32 },
	#[error("Unknown variant {name:?} (index {index})")]
	UnknownVariant { index: u8, name: String },
	#[error("Unknown type {0}")]
	UnknownType(TypeId),
}

/// Errors surfaced by schema resolution and the decoding façade.
///
/// Errors are cloneable so that every waiter of a shared metadata fetch observes the same
/// failure.
#[derive(Debug, Clone, Error)]
pub enum Error {
	#[error("Cannot decode {item} at runtime {spec_version}: {source}")]
	Decode {
		item: ItemName,
		spec_version: SpecVersion,
		#[source]
		source: DecodeError,
	},
	#[error("Cannot encode {item} at runtime {spec_version}: {source}")]
	Encode {
		item: ItemName,
		spec_version: SpecVersion,
		#[source]
		source: EncodeError,
	},
	#[error("Schema mismatch for {item} at runtime {spec_version}: expected {expected}, resolved {actual}")]
	SchemaMismatch {
		item: ItemName,
		spec_version: SpecVersion,
		expected: Fingerprint,
		actual: Fingerprint,
	},
	#[error("Unknown item {item} at runtime {spec_version}")]
	UnknownItem {
		item: ItemName,
		spec_version: SpecVersion,
	},
	#[error("Cannot read {kind} index at runtime {spec_version}: {source}")]
	ItemIndex {
		kind: ItemKind,
		spec_version: SpecVersion,
		#[source]
		source: DecodeError,
	},
	#[error("Unknown call index {pallet_index}/{call_index} at runtime {spec_version}")]
	UnknownCallIndex {
		spec_version: SpecVersion,
		pallet_index: u8,
		call_index: u8,
	},
	#[error("Unknown event index {pallet_index}/{event_index} at runtime {spec_version}")]
	UnknownEventIndex {
		spec_version: SpecVersion,
		pallet_index: u8,
		event_index: u8,
	},
	#[error("Cannot fetch {target}: {reason}")]
	MetadataFetch { target: String, reason: String },
	#[error("Invalid metadata for runtime {spec_version}: {reason}")]
	InvalidMetadata {
		spec_version: SpecVersion,
		reason: String,
	},
	#[error("Unsupported metadata version V{version} for runtime {spec_version}")]
	UnsupportedMetadata {
		spec_version: SpecVersion,
		version: u32,
	},
	#[error("Runtime version regressed at block #{block_number}: {found} after {previous}")]
	VersionRegression {
		block_number: u32,
		previous: SpecVersion,
		found: SpecVersion,
	},
	#[error("Invalid fingerprint {0:?}")]
	InvalidFingerprint(String),
	#[error("Cannot decode {item} at runtime {spec_version} into the requested type: {reason}")]
	TypedDecode {
		item: ItemName,
		spec_version: SpecVersion,
		reason: String,
	},
	#[error("Background fetch failed: {0}")]
	Task(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	#[test_case(DecodeError::BufferUnderrun { offset: 3, needed: 1 } => 3)]
	#[test_case(DecodeError::TrailingBytes { offset: 5, remaining: 2 } => 5)]
	#[test_case(DecodeError::InvalidUtf8 { offset: 9 } => 9)]
	#[test_case(DecodeError::UnknownType { offset: 1, id: TypeId(4) } => 1)]
	fn decode_error_offset(error: DecodeError) -> usize {
		error.offset()
	}

	#[test]
	fn decode_error_context_in_message() {
		let error = Error::Decode {
			item: ItemName::call("Balances", "transfer"),
			spec_version: SpecVersion(9430),
			source: DecodeError::InvalidBooleanByte { offset: 4, byte: 2 },
		};
		assert_eq!(
			error.to_string(),
			"Cannot decode call Balances.transfer at runtime v9430: Invalid boolean byte 0x02 at offset 4"
		);
	}
}
