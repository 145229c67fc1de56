//! Runtime descriptions, fetched once per runtime version and kept forever.
use crate::{
	cache::SingleFlight,
	configuration::{ResolverConfig, RetryConfig},
	error::Result,
	metadata::RuntimeDescription,
	source::{with_retries, MetadataSource},
	types::SpecVersion,
};
use std::sync::Arc;
use tracing::{info, instrument, trace, Level};

pub struct Registry<M> {
	source: Arc<M>,
	retry: RetryConfig,
	descriptions: SingleFlight<SpecVersion, Arc<RuntimeDescription>>,
}

impl<M> Clone for Registry<M> {
	fn clone(&self) -> Self {
		Registry {
			source: self.source.clone(),
			retry: self.retry.clone(),
			descriptions: self.descriptions.clone(),
		}
	}
}

impl<M: MetadataSource + 'static> Registry<M> {
	pub fn new(source: Arc<M>, config: &ResolverConfig) -> Self {
		Registry {
			source,
			retry: config.retry.clone(),
			descriptions: SingleFlight::new(),
		}
	}

	/// Description of the runtime version, if it was already fetched.
	pub fn cached(&self, spec_version: SpecVersion) -> Option<Arc<RuntimeDescription>> {
		self.descriptions.get(&spec_version)
	}

	/// Returns the description of the runtime version, fetching and parsing its metadata on first
	/// use. Concurrent first requests share a single fetch.
	#[instrument(level = Level::DEBUG, skip(self))]
	pub async fn describe(&self, spec_version: SpecVersion) -> Result<Arc<RuntimeDescription>> {
		if let Some(description) = self.cached(spec_version) {
			trace!("Runtime description cached");
			return Ok(description);
		}
		let source = self.source.clone();
		let retry = self.retry.clone();
		self.descriptions
			.get_or_fetch(spec_version, move || {
				fetch_description(source, retry, spec_version)
			})
			.await
	}
}

async fn fetch_description<M: MetadataSource>(
	source: Arc<M>,
	retry: RetryConfig,
	spec_version: SpecVersion,
) -> Result<Arc<RuntimeDescription>> {
	info!("Fetching metadata of runtime {spec_version}");
	let bytes = with_retries(retry, format!("metadata of runtime {spec_version}"), || {
		source.metadata(spec_version)
	})
	.await?;

	let description = RuntimeDescription::from_metadata(spec_version, &bytes)?;
	info!(
		items = description.len(),
		types = description.types.len(),
		"Described runtime {spec_version}"
	);
	Ok(Arc::new(description))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		error::Error,
		metadata::tests::balances_metadata,
		schema::ItemName,
		source::MockMetadataSource,
	};
	use color_eyre::eyre::eyre;
	use futures::future::join_all;
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration,
	};

	fn config(retries: usize) -> ResolverConfig {
		ResolverConfig {
			retry: RetryConfig::immediate(retries),
		}
	}

	#[tokio::test]
	async fn concurrent_requests_fetch_once() {
		let mut source = MockMetadataSource::new();
		source
			.expect_metadata()
			.times(1)
			.returning(|spec_version| {
				assert_eq!(spec_version, SpecVersion(9430));
				Box::pin(async move {
					tokio::time::sleep(Duration::from_millis(20)).await;
					Ok(balances_metadata())
				})
			});
		let registry = Registry::new(Arc::new(source), &config(0));

		let descriptions = join_all((0..8).map(|_| registry.describe(SpecVersion(9430)))).await;
		let first = descriptions[0].as_ref().unwrap().clone();
		for description in descriptions {
			assert!(Arc::ptr_eq(&first, &description.unwrap()));
		}
		assert!(first
			.item(&ItemName::call("Balances", "transfer"))
			.is_some());

		let cached = registry.cached(SpecVersion(9430)).unwrap();
		assert!(Arc::ptr_eq(&first, &cached));
		assert!(registry.cached(SpecVersion(9420)).is_none());
	}

	#[tokio::test]
	async fn transient_failures_are_retried() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let mut source = MockMetadataSource::new();
		let counter = attempts.clone();
		source.expect_metadata().times(3).returning(move |_| {
			let attempt = counter.fetch_add(1, Ordering::SeqCst);
			Box::pin(async move {
				if attempt < 2 {
					Err(eyre!("connection reset"))
				} else {
					Ok(balances_metadata())
				}
			})
		});
		let registry = Registry::new(Arc::new(source), &config(3));

		let description = registry.describe(SpecVersion(1)).await.unwrap();
		assert_eq!(description.spec_version, SpecVersion(1));
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn exhausted_retries_are_not_cached() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let mut source = MockMetadataSource::new();
		let counter = attempts.clone();
		source.expect_metadata().returning(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
			Box::pin(async move { Err(eyre!("node unavailable")) })
		});
		let registry = Registry::new(Arc::new(source), &config(2));

		let error = registry.describe(SpecVersion(7)).await.unwrap_err();
		assert_eq!(
			error.to_string(),
			"Cannot fetch metadata of runtime v7: node unavailable"
		);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
		assert!(registry.cached(SpecVersion(7)).is_none());

		registry.describe(SpecVersion(7)).await.unwrap_err();
		assert_eq!(attempts.load(Ordering::SeqCst), 6);
	}

	#[tokio::test]
	async fn invalid_metadata_is_reported() {
		let mut source = MockMetadataSource::new();
		source
			.expect_metadata()
			.times(1)
			.returning(|_| Box::pin(async move { Ok(vec![0xde, 0xad]) }));
		let registry = Registry::new(Arc::new(source), &config(3));

		let error = registry.describe(SpecVersion(3)).await.unwrap_err();
		assert!(
			matches!(
				error,
				Error::InvalidMetadata {
					spec_version: SpecVersion(3),
					..
				}
			),
			"{error}"
		);
	}
}
