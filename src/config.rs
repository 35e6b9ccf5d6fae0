use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::{circular_id::Id, error::ChordError};

pub const DEFAULT_BIT_COUNT: usize = 160;
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_FIX_FINGER_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_RETRIES: u32 = 2;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("failed to parse config: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid config: {0}")]
	Invalid(#[from] ChordError),
}

/// Tunables for a single node. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig{
	pub bit_count: usize,
	pub stabilize_interval_ms: u64,
	pub fix_finger_interval_ms: u64,
	pub check_predecessor_interval_ms: u64,
	/// How long to wait for each attempt of a request.
	pub request_timeout_ms: u64,
	/// Re-sends after the first attempt before giving up.
	pub request_retries: u32,
	pub channel_capacity: usize,
}

impl Default for ChordConfig {
	fn default() -> Self {
		ChordConfig{
			bit_count: DEFAULT_BIT_COUNT,
			stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
			fix_finger_interval_ms: DEFAULT_FIX_FINGER_INTERVAL_MS,
			check_predecessor_interval_ms: DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS,
			request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
			request_retries: DEFAULT_REQUEST_RETRIES,
			channel_capacity: DEFAULT_CHANNEL_CAPACITY,
		}
	}
}

impl ChordConfig {
	/// Parses and validates a JSON config.
	pub fn from_json(s: &str) -> Result<Self, ConfigError> {
		let config: ChordConfig = serde_json::from_str(s)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ChordError> {
		if self.bit_count == 0 || self.bit_count > Id::MAX_BIT_COUNT {
			return Err(ChordError::InvalidBitCount);
		}
		let nonzero = [
			("stabilize_interval_ms", self.stabilize_interval_ms),
			("fix_finger_interval_ms", self.fix_finger_interval_ms),
			("check_predecessor_interval_ms", self.check_predecessor_interval_ms),
			("request_timeout_ms", self.request_timeout_ms),
			("channel_capacity", self.channel_capacity as u64),
		];
		for (name, value) in nonzero {
			if value == 0 {
				return Err(ChordError::InvalidArgument(format!("{} must be greater than zero", name)));
			}
		}
		Ok(())
	}

	pub fn stabilize_interval(&self) -> Duration {
		Duration::from_millis(self.stabilize_interval_ms)
	}

	pub fn fix_finger_interval(&self) -> Duration {
		Duration::from_millis(self.fix_finger_interval_ms)
	}

	pub fn check_predecessor_interval(&self) -> Duration {
		Duration::from_millis(self.check_predecessor_interval_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}
