use crate::types::duration_millis_format;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff, FibonacciBackoff};

/// Runtime description and version lookup configuration.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ResolverConfig {
	/// Set the configuration based on which the metadata and runtime version fetches are retried, max duration [in milliseconds] between retries and number of tries.
	/// (default:
	/// fibonacci:
	///     base: 1,
	///     max_delay: 10000,
	///     retries: 6,
	/// )
	pub retry: RetryConfig,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			retry: RetryConfig::Fibonacci(FibonacciConfig {
				base: 1,
				max_delay: Duration::from_millis(10000),
				retries: 6,
			}),
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RetryConfig {
	#[serde(rename = "exponential")]
	Exponential(ExponentialConfig),

	#[serde(rename = "fibonacci")]
	Fibonacci(FibonacciConfig),
}

impl RetryConfig {
	/// Retries immediately, up to `retries` times.
	pub fn immediate(retries: usize) -> Self {
		RetryConfig::Fibonacci(FibonacciConfig {
			base: 0,
			max_delay: Duration::ZERO,
			retries,
		})
	}
}

impl IntoIterator for RetryConfig {
	type Item = Duration;
	type IntoIter = std::vec::IntoIter<Self::Item>;

	fn into_iter(self) -> Self::IntoIter {
		match self {
			RetryConfig::Exponential(config) => ExponentialBackoff::from_millis(config.base)
				.factor(1000)
				.max_delay(config.max_delay)
				.map(jitter)
				.take(config.retries)
				.collect::<Vec<Duration>>()
				.into_iter(),
			RetryConfig::Fibonacci(config) => FibonacciBackoff::from_millis(config.base)
				.factor(1000)
				.max_delay(config.max_delay)
				.map(jitter)
				.take(config.retries)
				.collect::<Vec<Duration>>()
				.into_iter(),
		}
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExponentialConfig {
	pub base: u64,
	#[serde(with = "duration_millis_format")]
	pub max_delay: Duration,
	pub retries: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FibonacciConfig {
	pub base: u64,
	#[serde(with = "duration_millis_format")]
	pub max_delay: Duration,
	pub retries: usize,
}
