use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POOL_CAPACITY;
use crate::constants::DEFAULT_POOL_MAX_CAPACITY;
use crate::Error;
use crate::Result;

/// Entry pool sizing.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Soft capacity of the idle queue; doubles (with a warning) when exceeded
    ///
    /// Default: 1024
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Hard capacity; records returned beyond it are abandoned
    ///
    /// Default: 16384
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_max_capacity() -> usize {
    DEFAULT_POOL_MAX_CAPACITY
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_capacity: default_max_capacity(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("pool.capacity must be greater than 0".into()));
        }
        if self.max_capacity < self.capacity {
            return Err(Error::InvalidConfig(format!(
                "pool.max_capacity ({}) must be >= pool.capacity ({})",
                self.max_capacity, self.capacity
            )));
        }
        Ok(())
    }
}
