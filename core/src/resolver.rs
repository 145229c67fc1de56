//! Maps points in chain history to runtime versions.
//!
//! Runtime versions only move forward with block height, so observed `(height, version)` points
//! partition the chain into windows: a height between two points of the same version belongs to
//! that version without asking the source.
use crate::{
	cache::SingleFlight,
	configuration::{ResolverConfig, RetryConfig},
	error::{Error, Result},
	metadata::{RuntimeDescription, RuntimeItem},
	registry::Registry,
	schema::ItemName,
	source::{with_retries, MetadataSource, VersionSource},
	types::{BlockRef, SpecVersion},
};
use primitive_types::H256;
use serde::Serialize;
use std::{
	collections::BTreeMap,
	ops::Bound::{Excluded, Unbounded},
	sync::{Arc, RwLock},
};
use tracing::{debug, instrument, trace, warn, Level};

/// Contiguous, known range of blocks sharing one runtime version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionWindow {
	pub spec_version: SpecVersion,
	pub first_block: u32,
	pub last_block: u32,
}

/// Observed runtime versions by height.
#[derive(Debug, Default)]
pub struct VersionWindows {
	points: BTreeMap<u32, SpecVersion>,
}

impl VersionWindows {
	pub fn new() -> Self {
		Self::default()
	}

	/// Version at `height`, if it was observed or lies between two points of the same version.
	pub fn lookup(&self, height: u32) -> Option<SpecVersion> {
		if let Some(spec_version) = self.points.get(&height) {
			return Some(*spec_version);
		}
		let (_, below) = self.points.range(..height).next_back()?;
		let (_, above) = self.points.range((Excluded(height), Unbounded)).next()?;
		(below == above).then_some(*below)
	}

	/// Records an observed point. Points that would make versions decrease with height are
	/// rejected and leave the windows unchanged.
	pub fn record(&mut self, height: u32, spec_version: SpecVersion) -> Result<()> {
		if let Some(existing) = self.points.get(&height) {
			if *existing != spec_version {
				return Err(Error::VersionRegression {
					block_number: height,
					previous: *existing,
					found: spec_version,
				});
			}
			return Ok(());
		}
		if let Some((_, below)) = self.points.range(..height).next_back() {
			if spec_version < *below {
				return Err(Error::VersionRegression {
					block_number: height,
					previous: *below,
					found: spec_version,
				});
			}
		}
		if let Some((above_height, above)) = self.points.range((Excluded(height), Unbounded)).next() {
			if spec_version > *above {
				return Err(Error::VersionRegression {
					block_number: *above_height,
					previous: spec_version,
					found: *above,
				});
			}
		}
		self.points.insert(height, spec_version);
		Ok(())
	}

	/// Known windows, in height order. Adjacent windows may leave unobserved gaps between them.
	pub fn windows(&self) -> Vec<VersionWindow> {
		let mut windows: Vec<VersionWindow> = vec![];
		for (height, spec_version) in &self.points {
			match windows.last_mut() {
				Some(window) if window.spec_version == *spec_version => window.last_block = *height,
				_ => windows.push(VersionWindow {
					spec_version: *spec_version,
					first_block: *height,
					last_block: *height,
				}),
			}
		}
		windows
	}

	pub fn len(&self) -> usize {
		self.points.len()
	}

	pub fn is_empty(&self) -> bool {
		self.points.is_empty()
	}
}

/// An item resolved at a point in chain history.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
	pub spec_version: SpecVersion,
	pub description: Arc<RuntimeDescription>,
	pub item: Arc<RuntimeItem>,
}

pub struct Resolver<V, M> {
	source: Arc<V>,
	retry: RetryConfig,
	registry: Registry<M>,
	windows: Arc<RwLock<VersionWindows>>,
	versions: SingleFlight<u32, SpecVersion>,
	heights: SingleFlight<H256, u32>,
}

impl<V, M> Clone for Resolver<V, M> {
	fn clone(&self) -> Self {
		Resolver {
			source: self.source.clone(),
			retry: self.retry.clone(),
			registry: self.registry.clone(),
			windows: self.windows.clone(),
			versions: self.versions.clone(),
			heights: self.heights.clone(),
		}
	}
}

impl<V, M> Resolver<V, M>
where
	V: VersionSource + 'static,
	M: MetadataSource + 'static,
{
	pub fn new(versions: Arc<V>, metadata: Arc<M>, config: &ResolverConfig) -> Self {
		Resolver {
			source: versions,
			retry: config.retry.clone(),
			registry: Registry::new(metadata, config),
			windows: Arc::new(RwLock::new(VersionWindows::new())),
			versions: SingleFlight::new(),
			heights: SingleFlight::new(),
		}
	}

	pub fn registry(&self) -> &Registry<M> {
		&self.registry
	}

	pub fn windows(&self) -> Vec<VersionWindow> {
		self.windows.read().expect("Lock acquired").windows()
	}

	/// Height of the referenced block. Hashes are resolved through the source once.
	pub async fn block_number(&self, block: BlockRef) -> Result<u32> {
		let hash = match block {
			BlockRef::Number(number) => return Ok(number),
			BlockRef::Hash(hash) => hash,
		};
		let source = self.source.clone();
		let retry = self.retry.clone();
		self.heights
			.get_or_fetch(hash, move || async move {
				with_retries(retry, format!("number of block {hash:?}"), || {
					source.block_number(hash)
				})
				.await
			})
			.await
	}

	/// Runtime version active at the referenced block.
	#[instrument(level = Level::DEBUG, skip(self))]
	pub async fn spec_version(&self, block: BlockRef) -> Result<SpecVersion> {
		let height = self.block_number(block).await?;
		if let Some(spec_version) = self.windows.read().expect("Lock acquired").lookup(height) {
			trace!("Block #{height} resolved to runtime {spec_version} from known windows");
			return Ok(spec_version);
		}

		let source = self.source.clone();
		let retry = self.retry.clone();
		let windows = self.windows.clone();
		self.versions
			.get_or_fetch(height, move || async move {
				let spec_version = with_retries(
					retry,
					format!("runtime version at block #{height}"),
					|| source.spec_version(height),
				)
				.await?;
				windows
					.write()
					.expect("Lock acquired")
					.record(height, spec_version)
					.inspect_err(|error| warn!("{error}"))?;
				debug!("Runtime {spec_version} active at block #{height}");
				Ok(spec_version)
			})
			.await
	}

	/// Runtime description active at the referenced block.
	pub async fn describe(&self, block: BlockRef) -> Result<Arc<RuntimeDescription>> {
		let spec_version = self.spec_version(block).await?;
		self.registry.describe(spec_version).await
	}

	/// Looks up an item in the runtime active at the referenced block.
	pub async fn resolve_item(&self, block: BlockRef, name: &ItemName) -> Result<ResolvedItem> {
		let description = self.describe(block).await?;
		let spec_version = description.spec_version;
		let item = description
			.item(name)
			.cloned()
			.ok_or_else(|| Error::UnknownItem {
				item: name.clone(),
				spec_version,
			})?;
		Ok(ResolvedItem {
			spec_version,
			description,
			item,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		metadata::tests::balances_metadata,
		source::{MockMetadataSource, MockVersionSource},
	};
	use color_eyre::eyre::eyre;
	use futures::future::join_all;
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration,
	};
	use test_case::test_case;

	fn windows(points: &[(u32, u32)]) -> VersionWindows {
		let mut windows = VersionWindows::new();
		for (height, version) in points {
			windows.record(*height, SpecVersion(*version)).unwrap();
		}
		windows
	}

	#[test_case(&[(100, 1), (200, 1)], 150 => Some(SpecVersion(1)); "between equal points")]
	#[test_case(&[(100, 1), (200, 2)], 150 => None; "between different points")]
	#[test_case(&[(100, 1), (200, 2)], 200 => Some(SpecVersion(2)); "observed point")]
	#[test_case(&[(100, 1)], 150 => None; "above the last point")]
	#[test_case(&[(100, 1)], 50 => None; "below the first point")]
	#[test_case(&[], 0 => None; "empty")]
	fn lookup(points: &[(u32, u32)], height: u32) -> Option<SpecVersion> {
		windows(points).lookup(height)
	}

	#[test]
	fn regressions_are_rejected() {
		let mut windows = windows(&[(100, 2), (300, 4)]);
		assert!(matches!(
			windows.record(200, SpecVersion(1)),
			Err(Error::VersionRegression {
				block_number: 200,
				previous: SpecVersion(2),
				found: SpecVersion(1)
			})
		));
		assert!(matches!(
			windows.record(200, SpecVersion(5)),
			Err(Error::VersionRegression {
				block_number: 300,
				previous: SpecVersion(5),
				found: SpecVersion(4)
			})
		));
		assert!(windows.record(100, SpecVersion(3)).is_err());
		assert!(windows.record(100, SpecVersion(2)).is_ok());
		assert!(windows.record(200, SpecVersion(3)).is_ok());
		assert_eq!(windows.len(), 3);
	}

	#[test]
	fn windows_group_points() {
		let windows = windows(&[(0, 1), (50, 1), (80, 2), (120, 2), (300, 3)]);
		assert_eq!(
			windows.windows(),
			vec![
				VersionWindow {
					spec_version: SpecVersion(1),
					first_block: 0,
					last_block: 50
				},
				VersionWindow {
					spec_version: SpecVersion(2),
					first_block: 80,
					last_block: 120
				},
				VersionWindow {
					spec_version: SpecVersion(3),
					first_block: 300,
					last_block: 300
				},
			]
		);
	}

	fn upgrade_at_1000() -> (MockVersionSource, Arc<AtomicUsize>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let mut source = MockVersionSource::new();
		source.expect_spec_version().returning(move |height| {
			counter.fetch_add(1, Ordering::SeqCst);
			Box::pin(async move {
				tokio::time::sleep(Duration::from_millis(5)).await;
				Ok(SpecVersion(if height < 1000 { 9420 } else { 9430 }))
			})
		});
		(source, calls)
	}

	fn resolver(versions: MockVersionSource) -> Resolver<MockVersionSource, MockMetadataSource> {
		let mut metadata = MockMetadataSource::new();
		metadata
			.expect_metadata()
			.returning(|_| Box::pin(async move { Ok(balances_metadata()) }));
		let config = ResolverConfig {
			retry: RetryConfig::immediate(2),
		};
		Resolver::new(Arc::new(versions), Arc::new(metadata), &config)
	}

	#[tokio::test]
	async fn inferred_heights_skip_the_source() {
		let (source, calls) = upgrade_at_1000();
		let resolver = resolver(source);

		assert_eq!(resolver.spec_version(100.into()).await.unwrap(), SpecVersion(9420));
		assert_eq!(resolver.spec_version(900.into()).await.unwrap(), SpecVersion(9420));
		assert_eq!(calls.load(Ordering::SeqCst), 2);

		// Between two observed points of the same version
		assert_eq!(resolver.spec_version(500.into()).await.unwrap(), SpecVersion(9420));
		assert_eq!(resolver.spec_version(900.into()).await.unwrap(), SpecVersion(9420));
		assert_eq!(calls.load(Ordering::SeqCst), 2);

		assert_eq!(resolver.spec_version(1500.into()).await.unwrap(), SpecVersion(9430));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert_eq!(resolver.windows().len(), 2);
	}

	#[tokio::test]
	async fn concurrent_lookups_of_one_height_share_a_fetch() {
		let (source, calls) = upgrade_at_1000();
		let resolver = resolver(source);

		let versions = join_all((0..10).map(|_| resolver.spec_version(1200.into()))).await;
		assert!(versions
			.into_iter()
			.all(|version| version.unwrap() == SpecVersion(9430)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn hashes_are_resolved_once() {
		let (mut source, _) = upgrade_at_1000();
		source
			.expect_block_number()
			.times(1)
			.returning(|_| Box::pin(async move { Ok(1234) }));
		let resolver = resolver(source);

		let hash = H256::repeat_byte(7);
		assert_eq!(resolver.spec_version(hash.into()).await.unwrap(), SpecVersion(9430));
		assert_eq!(resolver.block_number(hash.into()).await.unwrap(), 1234);
	}

	#[tokio::test]
	async fn regressing_source_is_an_error() {
		let mut source = MockVersionSource::new();
		source.expect_spec_version().returning(|height| {
			Box::pin(async move { Ok(SpecVersion(if height < 1000 { 5 } else { 4 })) })
		});
		let resolver = resolver(source);

		resolver.spec_version(10.into()).await.unwrap();
		let error = resolver.spec_version(2000.into()).await.unwrap_err();
		assert!(matches!(error, Error::VersionRegression { .. }), "{error}");
		assert_eq!(resolver.windows().len(), 1);
	}

	#[tokio::test]
	async fn failing_source_surfaces_fetch_error() {
		let mut source = MockVersionSource::new();
		source
			.expect_spec_version()
			.times(3)
			.returning(|_| Box::pin(async move { Err(eyre!("timeout")) }));
		let resolver = resolver(source);

		let error = resolver.spec_version(10.into()).await.unwrap_err();
		assert_eq!(
			error.to_string(),
			"Cannot fetch runtime version at block #10: timeout"
		);
	}

	#[tokio::test]
	async fn resolve_item_by_block() {
		let (source, _) = upgrade_at_1000();
		let resolver = resolver(source);

		let resolved = resolver
			.resolve_item(1500.into(), &ItemName::call("Balances", "transfer"))
			.await
			.unwrap();
		assert_eq!(resolved.spec_version, SpecVersion(9430));
		assert!(matches!(resolved.item.schema, crate::TypeSchema::Composite { .. }));

		let missing = ItemName::call("Balances", "mint");
		let error = resolver.resolve_item(1500.into(), &missing).await.unwrap_err();
		assert!(matches!(
			error,
			Error::UnknownItem {
				spec_version: SpecVersion(9430),
				..
			}
		));
	}
}
