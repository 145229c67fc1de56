//! Permanent cache with collapsed concurrent fetches.
use crate::{
	error::{Error, Result},
	utils::spawn_in_span,
};
use futures::{
	future::{BoxFuture, Shared},
	Future, FutureExt,
};
use std::{
	collections::HashMap,
	fmt::Debug,
	hash::Hash,
	sync::{Arc, Mutex, RwLock},
};
use tracing::{debug, trace};

type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Caches values forever and guarantees at most one fetch in flight per key.
///
/// The first caller for a missing key spawns the fetch as a task. Later callers join the same
/// task, and every one of them observes the same result. Dropping a waiter never cancels the
/// fetch. Successful values are published to the cache before the key leaves the in-flight
/// table; failures (panics included) are not cached, so the next call fetches again.
pub struct SingleFlight<K, V> {
	cache: Arc<RwLock<HashMap<K, V>>>,
	pending: Arc<Mutex<HashMap<K, Flight<V>>>>,
}

impl<K, V> Clone for SingleFlight<K, V> {
	fn clone(&self) -> Self {
		SingleFlight {
			cache: self.cache.clone(),
			pending: self.pending.clone(),
		}
	}
}

impl<K, V> Default for SingleFlight<K, V> {
	fn default() -> Self {
		SingleFlight {
			cache: Arc::new(RwLock::new(HashMap::new())),
			pending: Arc::new(Mutex::new(HashMap::new())),
		}
	}
}

impl<K, V> SingleFlight<K, V>
where
	K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
{
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &K) -> Option<V> {
		let cache = self.cache.read().expect("Lock acquired");
		cache.get(key).cloned()
	}

	pub fn insert(&self, key: K, value: V) {
		let mut cache = self.cache.write().expect("Lock acquired");
		cache.insert(key, value);
	}

	pub fn len(&self) -> usize {
		self.cache.read().expect("Lock acquired").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of fetches currently in flight.
	pub fn in_flight(&self) -> usize {
		self.pending.lock().expect("Lock acquired").len()
	}

	/// Returns the cached value for `key`, or joins (or starts) the single fetch for it.
	pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		if let Some(value) = self.get(&key) {
			trace!(?key, "Cache hit");
			return Ok(value);
		}

		let flight = {
			let mut pending = self.pending.lock().expect("Lock acquired");
			// A fetch may have completed between the cache check and taking the lock
			if let Some(value) = self.get(&key) {
				return Ok(value);
			}
			match pending.get(&key) {
				Some(flight) => {
					debug!(?key, "Joining in-flight fetch");
					flight.clone()
				},
				None => {
					let flight = self.start(key.clone(), fetch());
					pending.insert(key, flight.clone());
					flight
				},
			}
		};

		flight.await
	}

	fn start<Fut>(&self, key: K, fetch: Fut) -> Flight<V>
	where
		Fut: Future<Output = Result<V>> + Send + 'static,
	{
		let cache = self.cache.clone();
		let landing = Landing {
			key,
			pending: self.pending.clone(),
		};
		let task = spawn_in_span(async move {
			let result = fetch.await;
			if let Ok(value) = &result {
				cache
					.write()
					.expect("Lock acquired")
					.insert(landing.key.clone(), value.clone());
			}
			drop(landing);
			result
		});

		async move {
			task.await
				.map_err(|error| Error::Task(error.to_string()))?
		}
		.boxed()
		.shared()
	}
}

/// Removes its key from the in-flight table when dropped, also when the fetch panics.
struct Landing<K: Eq + Hash, V> {
	key: K,
	pending: Arc<Mutex<HashMap<K, Flight<V>>>>,
}

impl<K: Eq + Hash, V> Drop for Landing<K, V> {
	fn drop(&mut self) {
		if let Ok(mut pending) = self.pending.lock() {
			pending.remove(&self.key);
		}
	}
}
