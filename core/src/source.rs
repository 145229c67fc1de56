//! External collaborators the resolver depends on.
use crate::{configuration::RetryConfig, error::Error, types::SpecVersion};
use async_trait::async_trait;
use color_eyre::Result;
use futures::{Future, TryFutureExt};
use mockall::automock;
use primitive_types::H256;
use tokio_retry::Retry;
use tracing::warn;

mod snapshot;

pub use snapshot::{Snapshot, SnapshotBlock, SnapshotRuntime, SnapshotSource};

/// Runtime version oracle, typically backed by a node or an indexer.
#[async_trait]
#[automock]
pub trait VersionSource: Send + Sync {
	/// Height of the block with the given hash.
	async fn block_number(&self, hash: H256) -> Result<u32>;

	/// Runtime version in effect at the given height.
	async fn spec_version(&self, block_number: u32) -> Result<SpecVersion>;
}

#[async_trait]
#[automock]
pub trait MetadataSource: Send + Sync {
	/// Magic-prefixed, SCALE encoded runtime metadata of the given version.
	async fn metadata(&self, spec_version: SpecVersion) -> Result<Vec<u8>>;
}

/// Calls a source until it succeeds or the retry strategy is exhausted.
pub(crate) async fn with_retries<T, F, Fut>(
	retry: RetryConfig,
	target: String,
	mut fetch: F,
) -> crate::error::Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let target_ref = &target;
	Retry::spawn(retry, || {
		fetch().inspect_err(move |error| warn!("Cannot fetch {target_ref}: {error:#}"))
	})
	.await
	.map_err(|error| Error::MetadataFetch {
		target: target.clone(),
		reason: format!("{error:#}"),
	})
}
