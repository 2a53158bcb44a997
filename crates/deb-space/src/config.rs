use std::path::Path;

use deb_block::BlockConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SpaceError, SpaceResult};

/// Configuration for a space.
///
/// Loadable from TOML; every field has a default, so an empty document is a
/// valid configuration:
///
/// ```toml
/// read_buffer = 1024
/// write_buffer = 4
/// reuse_tail_block = true
///
/// [block]
/// soft_limit = 1038336
/// record_limit = 1048576
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Transactions buffered between a read flow and its consumer.
    pub read_buffer: usize,
    /// Sealed blocks buffered between a packer and its write flow.
    pub write_buffer: usize,
    /// Whether appends top up the last stored block before opening new ones.
    pub reuse_tail_block: bool,
    pub block: BlockConfig,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            read_buffer: 1024,
            write_buffer: 4,
            reuse_tail_block: true,
            block: BlockConfig::default(),
        }
    }
}

impl SpaceConfig {
    pub fn from_toml_str(s: &str) -> SpaceResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SpaceError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SpaceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SpaceError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SpaceResult<String> {
        toml::to_string_pretty(self).map_err(|e| SpaceError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> SpaceResult<()> {
        self.block.validate()?;
        if self.read_buffer == 0 {
            return Err(SpaceError::InvalidConfig("read_buffer must be positive".into()));
        }
        if self.write_buffer == 0 {
            return Err(SpaceError::InvalidConfig("write_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Validate against the ceiling of the store the space will live in.
    pub fn validate_for(&self, store_record_limit: usize) -> SpaceResult<()> {
        self.validate()?;
        if self.block.record_limit > store_record_limit {
            return Err(SpaceError::InvalidConfig(format!(
                "record_limit {} exceeds the store ceiling of {store_record_limit} bytes",
                self.block.record_limit
            )));
        }
        Ok(())
    }
}
