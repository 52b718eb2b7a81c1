use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MistError, MistResult};
use crate::retry::RetryPolicy;

/// Configuration for a [`MistDb`](crate::MistDb) instance.
///
/// Every field has a default, so a TOML file only needs to name the
/// settings it changes:
///
/// ```toml
/// lock_timeout_ms = 5000
/// user = "alice"
///
/// [retry]
/// max_attempts = 5
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MistConfig {
    /// Deadline for a queued request to reach the front of the lock queue.
    /// `None` waits indefinitely.
    #[serde(rename = "lock_timeout_ms", with = "opt_millis")]
    pub lock_timeout: Option<Duration>,
    /// How many ancestor rows the cycle check fetches per round trip.
    pub ancestor_batch_size: usize,
    /// Backoff applied by [`MistDb::submit_with_retry`](crate::MistDb::submit_with_retry).
    pub retry: RetryPolicy,
    /// Recorded on transactions that do not name a user themselves.
    pub user: Option<String>,
}

impl Default for MistConfig {
    fn default() -> Self {
        Self {
            lock_timeout: None,
            ancestor_batch_size: 64,
            retry: RetryPolicy::default(),
            user: None,
        }
    }
}

impl MistConfig {
    pub fn from_toml_str(text: &str) -> MistResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| MistError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MistResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MistError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> MistResult<String> {
        toml::to_string_pretty(self).map_err(|e| MistError::Config(e.to_string()))
    }

    fn validate(&self) -> MistResult<()> {
        if self.ancestor_batch_size == 0 {
            return Err(MistError::Config("ancestor_batch_size must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MistError::Config("retry.max_attempts must be positive".into()));
        }
        if !(self.retry.backoff_factor >= 1.0) {
            return Err(MistError::Config("retry.backoff_factor must be at least 1".into()));
        }
        Ok(())
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
