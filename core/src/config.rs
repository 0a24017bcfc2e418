//! Dispatch configuration

use serde::{Deserialize, Serialize};

/// Default cap on decoded request bodies, 1 MiB
pub const DEFAULT_MAX_BODY_SIZE: i64 = 1_048_576;

/// Options shared by every request of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum request body size in bytes accepted by `decode_json`
    ///
    /// A negative value disables the limit.
    pub max_body_size: i64,
}

impl Config {
    /// Body limit, or `None` when disabled
    #[inline]
    pub fn body_limit(&self) -> Option<usize> {
        usize::try_from(self.max_body_size).ok()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}
