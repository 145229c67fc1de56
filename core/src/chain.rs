//! Decoding façade for generated bindings.
//!
//! A binding is generated against one runtime version and embeds the fingerprint of the item it
//! was generated for. Resolving a binding at a block compares that fingerprint with the one of the
//! runtime active there, and only decodes on a match.
use crate::{
	configuration::ResolverConfig,
	error::{DecodeError, Error, Result},
	fingerprint::Fingerprint,
	metadata::{ItemDetail, RuntimeDescription, RuntimeItem},
	resolver::{ResolvedItem, Resolver},
	scale::{self, Value},
	schema::{ItemKind, ItemName},
	source::{MetadataSource, VersionSource},
	types::{BlockRef, SpecVersion},
};
use codec::DecodeAll;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, Level};

/// Item a generated accessor was built for, with the fingerprint it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'a> {
	pub kind: ItemKind,
	pub pallet: &'a str,
	pub item: &'a str,
	pub fingerprint: Fingerprint,
}

impl<'a> Binding<'a> {
	pub const fn new(
		kind: ItemKind,
		pallet: &'a str,
		item: &'a str,
		fingerprint: Fingerprint,
	) -> Self {
		Binding {
			kind,
			pallet,
			item,
			fingerprint,
		}
	}

	pub const fn call(pallet: &'a str, item: &'a str, fingerprint: Fingerprint) -> Self {
		Self::new(ItemKind::Call, pallet, item, fingerprint)
	}

	pub const fn constant(pallet: &'a str, item: &'a str, fingerprint: Fingerprint) -> Self {
		Self::new(ItemKind::Constant, pallet, item, fingerprint)
	}

	pub const fn event(pallet: &'a str, item: &'a str, fingerprint: Fingerprint) -> Self {
		Self::new(ItemKind::Event, pallet, item, fingerprint)
	}

	pub const fn storage(pallet: &'a str, item: &'a str, fingerprint: Fingerprint) -> Self {
		Self::new(ItemKind::StorageEntry, pallet, item, fingerprint)
	}

	pub fn name(&self) -> ItemName {
		ItemName::new(self.kind, self.pallet, self.item)
	}

	fn with_kind(&self, kind: ItemKind) -> Self {
		Binding { kind, ..*self }
	}
}

/// Outcome of resolving a binding at a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
	Matched(T),
	/// The runtime at the block describes the item with a different layout.
	Mismatched {
		expected: Fingerprint,
		actual: Fingerprint,
	},
}

impl<T> Resolved<T> {
	pub fn is_matched(&self) -> bool {
		matches!(self, Resolved::Matched(_))
	}

	pub fn matched(self) -> Option<T> {
		match self {
			Resolved::Matched(value) => Some(value),
			Resolved::Mismatched { .. } => None,
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
		match self {
			Resolved::Matched(value) => Resolved::Matched(f(value)),
			Resolved::Mismatched { expected, actual } => Resolved::Mismatched { expected, actual },
		}
	}
}

/// Call or event identified from its leading indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedItem {
	pub spec_version: SpecVersion,
	pub name: ItemName,
	pub fingerprint: Fingerprint,
	pub value: Value,
}

pub struct Chain<V, M> {
	resolver: Resolver<V, M>,
}

impl<V, M> Clone for Chain<V, M> {
	fn clone(&self) -> Self {
		Chain {
			resolver: self.resolver.clone(),
		}
	}
}

impl<V, M> Chain<V, M>
where
	V: VersionSource + 'static,
	M: MetadataSource + 'static,
{
	pub fn new(versions: Arc<V>, metadata: Arc<M>, config: &ResolverConfig) -> Self {
		Chain {
			resolver: Resolver::new(versions, metadata, config),
		}
	}

	pub fn resolver(&self) -> &Resolver<V, M> {
		&self.resolver
	}

	/// Runtime description active at the block.
	pub async fn describe(&self, block: BlockRef) -> Result<Arc<RuntimeDescription>> {
		self.resolver.describe(block).await
	}

	/// Fingerprint of the item in the runtime active at the block.
	pub async fn item_hash(
		&self,
		block: BlockRef,
		kind: ItemKind,
		pallet: &str,
		item: &str,
	) -> Result<Fingerprint> {
		let name = ItemName::new(kind, pallet, item);
		let resolved = self.resolver.resolve_item(block, &name).await?;
		Ok(resolved.item.fingerprint)
	}

	/// Decodes `bytes` as the bound item, if the runtime at the block still has the layout the
	/// binding was generated against.
	#[instrument(level = Level::DEBUG, skip(self, bytes), fields(item = %binding.name()))]
	pub async fn resolve(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Resolved<Value>> {
		let name = binding.name();
		let resolved = match self.matching(block, &name, binding.fingerprint).await? {
			Resolved::Matched(resolved) => resolved,
			Resolved::Mismatched { expected, actual } => {
				return Ok(Resolved::Mismatched { expected, actual })
			},
		};
		decode_item(&resolved, name, bytes).map(Resolved::Matched)
	}

	/// As [`Chain::resolve`], with a layout mismatch reported as [`Error::SchemaMismatch`].
	pub async fn decode(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Value> {
		let resolved = self.resolve(block, binding, bytes).await?;
		self.expect_match(block, binding.name(), resolved).await
	}

	/// Decodes the bound item straight into a static type once its layout is confirmed.
	pub async fn decode_as<T: DecodeAll>(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Resolved<T>> {
		let name = binding.name();
		let resolved = match self.matching(block, &name, binding.fingerprint).await? {
			Resolved::Matched(resolved) => resolved,
			Resolved::Mismatched { expected, actual } => {
				return Ok(Resolved::Mismatched { expected, actual })
			},
		};
		T::decode_all(&mut &bytes[..])
			.map(Resolved::Matched)
			.map_err(|error| Error::TypedDecode {
				item: name,
				spec_version: resolved.spec_version,
				reason: error.to_string(),
			})
	}

	/// Encodes a value as the bound item.
	pub async fn encode(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		value: &Value,
	) -> Result<Resolved<Vec<u8>>> {
		let name = binding.name();
		let resolved = match self.matching(block, &name, binding.fingerprint).await? {
			Resolved::Matched(resolved) => resolved,
			Resolved::Mismatched { expected, actual } => {
				return Ok(Resolved::Mismatched { expected, actual })
			},
		};
		scale::encode(value, &resolved.item.schema, &resolved.description.types)
			.map(Resolved::Matched)
			.map_err(|source| Error::Encode {
				item: name,
				spec_version: resolved.spec_version,
				source,
			})
	}

	/// Value of a constant, as embedded in the metadata of the runtime active at the block.
	pub async fn constant(&self, block: BlockRef, binding: &Binding<'_>) -> Result<Value> {
		let name = ItemName::constant(binding.pallet, binding.item);
		let resolved = match self.matching(block, &name, binding.fingerprint).await? {
			Resolved::Matched(resolved) => resolved,
			Resolved::Mismatched { expected, actual } => {
				return Err(Error::SchemaMismatch {
					item: name,
					spec_version: self.resolver.spec_version(block).await?,
					expected,
					actual,
				})
			},
		};
		let ItemDetail::Constant { value } = &resolved.item.detail else {
			return Err(Error::UnknownItem {
				item: name,
				spec_version: resolved.spec_version,
			});
		};
		decode_item(&resolved, name, value)
	}

	pub async fn call(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Value> {
		self.decode(block, &binding.with_kind(ItemKind::Call), bytes).await
	}

	pub async fn event(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Value> {
		self.decode(block, &binding.with_kind(ItemKind::Event), bytes)
			.await
	}

	/// Decodes a storage value. Keys are not decoded.
	pub async fn storage(
		&self,
		block: BlockRef,
		binding: &Binding<'_>,
		bytes: &[u8],
	) -> Result<Value> {
		self.decode(block, &binding.with_kind(ItemKind::StorageEntry), bytes)
			.await
	}

	/// Identifies a call from its pallet and call indices and decodes its arguments.
	pub async fn decode_call(&self, block: BlockRef, bytes: &[u8]) -> Result<DecodedItem> {
		let description = self.resolver.describe(block).await?;
		let spec_version = description.spec_version;
		let (pallet_index, call_index) = item_index(ItemKind::Call, spec_version, bytes)?;
		let (name, item) = description
			.call_by_index(pallet_index, call_index)
			.ok_or(Error::UnknownCallIndex {
				spec_version,
				pallet_index,
				call_index,
			})?;
		decoded_item(&description, name, item, &bytes[2..])
	}

	/// Identifies an event from its pallet and event indices and decodes its fields.
	pub async fn decode_event(&self, block: BlockRef, bytes: &[u8]) -> Result<DecodedItem> {
		let description = self.resolver.describe(block).await?;
		let spec_version = description.spec_version;
		let (pallet_index, event_index) = item_index(ItemKind::Event, spec_version, bytes)?;
		let (name, item) = description
			.event_by_index(pallet_index, event_index)
			.ok_or(Error::UnknownEventIndex {
				spec_version,
				pallet_index,
				event_index,
			})?;
		decoded_item(&description, name, item, &bytes[2..])
	}

	async fn matching(
		&self,
		block: BlockRef,
		name: &ItemName,
		expected: Fingerprint,
	) -> Result<Resolved<ResolvedItem>> {
		let resolved = self.resolver.resolve_item(block, name).await?;
		let actual = resolved.item.fingerprint;
		if actual != expected {
			debug!(
				spec_version = %resolved.spec_version,
				%expected,
				%actual,
				"Binding for {name} does not match the runtime at block {block}"
			);
			return Ok(Resolved::Mismatched { expected, actual });
		}
		Ok(Resolved::Matched(resolved))
	}

	async fn expect_match<T>(
		&self,
		block: BlockRef,
		item: ItemName,
		resolved: Resolved<T>,
	) -> Result<T> {
		match resolved {
			Resolved::Matched(value) => Ok(value),
			Resolved::Mismatched { expected, actual } => Err(Error::SchemaMismatch {
				item,
				spec_version: self.resolver.spec_version(block).await?,
				expected,
				actual,
			}),
		}
	}
}

fn decode_item(resolved: &ResolvedItem, item: ItemName, bytes: &[u8]) -> Result<Value> {
	scale::decode_all(bytes, &resolved.item.schema, &resolved.description.types).map_err(
		|source| Error::Decode {
			item,
			spec_version: resolved.spec_version,
			source,
		},
	)
}

fn item_index(kind: ItemKind, spec_version: SpecVersion, bytes: &[u8]) -> Result<(u8, u8)> {
	match bytes {
		[pallet_index, index, ..] => Ok((*pallet_index, *index)),
		_ => Err(Error::ItemIndex {
			kind,
			spec_version,
			source: DecodeError::BufferUnderrun {
				offset: bytes.len(),
				needed: 2 - bytes.len(),
			},
		}),
	}
}

fn decoded_item(
	description: &RuntimeDescription,
	name: &ItemName,
	item: &RuntimeItem,
	bytes: &[u8],
) -> Result<DecodedItem> {
	let value = scale::decode_all(bytes, &item.schema, &description.types).map_err(|source| {
		Error::Decode {
			item: name.clone(),
			spec_version: description.spec_version,
			source: offset_by(source, 2),
		}
	})?;
	Ok(DecodedItem {
		spec_version: description.spec_version,
		name: name.clone(),
		fingerprint: item.fingerprint,
		value,
	})
}

/// Reports decode offsets relative to the full call or event, indices included.
fn offset_by(error: DecodeError, shift: usize) -> DecodeError {
	match error {
		DecodeError::BufferUnderrun { offset, needed } => DecodeError::BufferUnderrun {
			offset: offset + shift,
			needed,
		},
		DecodeError::TrailingBytes { offset, remaining } => DecodeError::TrailingBytes {
			offset: offset + shift,
			remaining,
		},
		DecodeError::UnknownVariantDiscriminant {
			offset,
			discriminant,
		} => DecodeError::UnknownVariantDiscriminant {
			offset: offset + shift,
			discriminant,
		},
		DecodeError::InvalidBooleanByte { offset, byte } => DecodeError::InvalidBooleanByte {
			offset: offset + shift,
			byte,
		},
		DecodeError::InvalidOptionTag { offset, tag } => DecodeError::InvalidOptionTag {
			offset: offset + shift,
			tag,
		},
		DecodeError::InvalidUtf8 { offset } => DecodeError::InvalidUtf8 {
			offset: offset + shift,
		},
		DecodeError::InvalidChar { offset, code } => DecodeError::InvalidChar {
			offset: offset + shift,
			code,
		},
		DecodeError::NonCanonicalCompact { offset } => DecodeError::NonCanonicalCompact {
			offset: offset + shift,
		},
		DecodeError::CompactOverflow { offset, bits } => DecodeError::CompactOverflow {
			offset: offset + shift,
			bits,
		},
		DecodeError::UnsupportedCompact { offset } => DecodeError::UnsupportedCompact {
			offset: offset + shift,
		},
		DecodeError::UnknownType { offset, id } => DecodeError::UnknownType {
			offset: offset + shift,
			id,
		},
		DecodeError::RecursionLimit { offset } => DecodeError::RecursionLimit {
			offset: offset + shift,
		},
		DecodeError::SequenceTooLong { offset, len } => DecodeError::SequenceTooLong {
			offset: offset + shift,
			len,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		configuration::RetryConfig,
		metadata::tests::{
			balances_description, balances_metadata, AccountData, AccountId32, BalancesCall,
			BalancesEvent,
		},
		source::{MockMetadataSource, MockVersionSource},
	};
	use codec::{Compact, Encode};
	use hex_literal::hex;

	const STALE_DEPOSIT: Binding<'static> = Binding::constant(
		"Balances",
		"ExistentialDeposit",
		Fingerprint::from_bytes(hex!(
			"0000000000000000000000000000000000000000000000000000000000000000"
		)),
	);

	fn chain() -> Chain<MockVersionSource, MockMetadataSource> {
		let mut versions = MockVersionSource::new();
		versions
			.expect_spec_version()
			.returning(|_| Box::pin(async move { Ok(SpecVersion(9430)) }));
		let mut metadata = MockMetadataSource::new();
		metadata
			.expect_metadata()
			.returning(|_| Box::pin(async move { Ok(balances_metadata()) }));
		let config = ResolverConfig {
			retry: RetryConfig::immediate(0),
		};
		Chain::new(Arc::new(versions), Arc::new(metadata), &config)
	}

	fn current(kind: ItemKind, pallet: &'static str, item: &'static str) -> Binding<'static> {
		let name = ItemName::new(kind, pallet, item);
		let fingerprint = balances_description(9430).item(&name).unwrap().fingerprint;
		Binding::new(kind, pallet, item, fingerprint)
	}

	#[tokio::test]
	async fn item_hash_of_missing_item() {
		let chain = chain();
		let error = chain
			.item_hash(100.into(), ItemKind::Call, "Balances", "mint")
			.await
			.unwrap_err();
		assert!(
			matches!(
				&error,
				Error::UnknownItem { item, spec_version: SpecVersion(9430) }
					if *item == ItemName::call("Balances", "mint")
			),
			"{error}"
		);

		let hash = chain
			.item_hash(100.into(), ItemKind::Call, "Balances", "transfer")
			.await
			.unwrap();
		assert_eq!(hash, current(ItemKind::Call, "Balances", "transfer").fingerprint);
	}

	#[tokio::test]
	async fn matching_binding_decodes() {
		let chain = chain();
		let binding = current(ItemKind::Call, "Balances", "transfer");
		let bytes = (AccountId32([9; 32]), Compact(25u128)).encode();

		let resolved = chain.resolve(100.into(), &binding, &bytes).await.unwrap();
		let value = resolved.matched().unwrap();
		assert_eq!(value.field("value"), Some(&Value::UInt(25)));
		assert_eq!(chain.call(100.into(), &binding, &bytes).await.unwrap(), value);
	}

	#[tokio::test]
	async fn stale_binding_is_mismatched() {
		let chain = chain();
		let transfer = current(ItemKind::Call, "Balances", "transfer");
		let stale = Binding {
			fingerprint: current(ItemKind::Call, "Balances", "force_unreserve").fingerprint,
			..transfer
		};
		let bytes = (AccountId32([9; 32]), Compact(25u128)).encode();

		let resolved = chain.resolve(100.into(), &stale, &bytes).await.unwrap();
		assert_eq!(
			resolved,
			Resolved::Mismatched {
				expected: stale.fingerprint,
				actual: transfer.fingerprint,
			}
		);

		let error = chain.decode(100.into(), &stale, &bytes).await.unwrap_err();
		assert!(matches!(error, Error::SchemaMismatch { .. }), "{error}");

		let error = chain.constant(100.into(), &STALE_DEPOSIT).await.unwrap_err();
		assert!(matches!(error, Error::SchemaMismatch { .. }), "{error}");
	}

	#[tokio::test]
	async fn malformed_bytes_carry_item_and_offset() {
		let chain = chain();
		let binding = current(ItemKind::Call, "Balances", "transfer");
		let error = chain.decode(100.into(), &binding, &[1; 20]).await.unwrap_err();
		match error {
			Error::Decode {
				item,
				spec_version,
				source,
			} => {
				assert_eq!(item, binding.name());
				assert_eq!(spec_version, SpecVersion(9430));
				assert_eq!(source.offset(), 0);
			},
			other => panic!("Unexpected error {other}"),
		}
	}

	#[tokio::test]
	async fn typed_decode() {
		let chain = chain();
		let binding = current(ItemKind::Call, "Balances", "transfer");
		let bytes = (AccountId32([9; 32]), Compact(25u128)).encode();

		let decoded = chain
			.decode_as::<([u8; 32], Compact<u128>)>(100.into(), &binding, &bytes)
			.await
			.unwrap()
			.matched()
			.unwrap();
		assert_eq!(decoded.0, [9; 32]);
		assert_eq!(decoded.1 .0, 25);

		let error = chain
			.decode_as::<[u8; 32]>(100.into(), &binding, &bytes)
			.await
			.unwrap_err();
		assert!(matches!(error, Error::TypedDecode { .. }), "{error}");
	}

	#[tokio::test]
	async fn encode_matches_codec() {
		let chain = chain();
		let binding = current(ItemKind::StorageEntry, "Balances", "Account");
		let data = AccountData {
			free: 7,
			reserved: 1,
			frozen: None,
		};
		let value = chain.storage(100.into(), &binding, &data.encode()).await.unwrap();
		assert_eq!(value.field("free"), Some(&Value::UInt(7)));

		let bytes = chain
			.encode(100.into(), &binding, &value)
			.await
			.unwrap()
			.matched()
			.unwrap();
		assert_eq!(bytes, data.encode());
	}

	#[tokio::test]
	async fn constants_are_decoded_from_metadata() {
		let chain = chain();
		let binding = current(ItemKind::Constant, "Balances", "ExistentialDeposit");
		let value = chain.constant(100.into(), &binding).await.unwrap();
		assert_eq!(value, Value::UInt(500));
	}

	#[tokio::test]
	async fn calls_and_events_by_index() {
		let chain = chain();
		let call = BalancesCall::force_unreserve {
			who: AccountId32([4; 32]),
			amount: 12,
		};
		let bytes = [vec![5], call.encode()].concat();
		let decoded = chain.decode_call(100.into(), &bytes).await.unwrap();
		assert_eq!(decoded.name, ItemName::call("Balances", "force_unreserve"));
		assert_eq!(decoded.value.field("amount"), Some(&Value::UInt(12)));

		let decoded = chain.decode_call(100.into(), &[5, 3]).await.unwrap();
		assert_eq!(decoded.name, ItemName::call("Balances", "burn_all"));
		assert_eq!(decoded.value, Value::composite::<&str>([]));

		let event = BalancesEvent::Endowed {
			account: AccountId32([1; 32]),
			free_balance: 99,
		};
		let bytes = [vec![5], event.encode()].concat();
		let decoded = chain.decode_event(100.into(), &bytes).await.unwrap();
		assert_eq!(decoded.name, ItemName::event("Balances", "Endowed"));
		assert_eq!(decoded.value.field("free_balance"), Some(&Value::UInt(99)));
	}

	#[tokio::test]
	async fn unknown_indices() {
		let chain = chain();
		let error = chain.decode_call(100.into(), &[5, 1]).await.unwrap_err();
		assert!(matches!(
			error,
			Error::UnknownCallIndex {
				pallet_index: 5,
				call_index: 1,
				..
			}
		));

		let error = chain.decode_event(100.into(), &[6, 0]).await.unwrap_err();
		assert!(matches!(error, Error::UnknownEventIndex { .. }));

		let error = chain.decode_call(100.into(), &[5]).await.unwrap_err();
		assert!(matches!(
			error,
			Error::ItemIndex {
				kind: ItemKind::Call,
				source: DecodeError::BufferUnderrun { offset: 1, needed: 1 },
				..
			}
		));

		// Offsets count the indices
		let error = chain.decode_call(100.into(), &[5, 3, 0]).await.unwrap_err();
		assert!(matches!(
			error,
			Error::Decode {
				source: DecodeError::TrailingBytes {
					offset: 2,
					remaining: 1
				},
				..
			}
		));
	}
}
