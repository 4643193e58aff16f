//! Codec configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::automaton::DEFAULT_MAX_DETERMINIZED_STATES;
use crate::error::{QuiverError, Result};

/// Default lower bound on entries per term block.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 25;

/// Default upper bound on entries per term block.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 48;

/// Settings shared by writers and readers of a segment.
///
/// The struct is constructed by the caller and passed by reference; there is
/// no global instance.
///
/// ```
/// use quiver::config::CodecConfig;
///
/// let config = CodecConfig::from_json_str(r#"{"block_tree": {"min_items_in_block": 10, "max_items_in_block": 30}}"#).unwrap();
/// assert_eq!(config.block_tree.min_items_in_block, 10);
/// assert_eq!(config.automaton.max_determinized_states, 10_000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub block_tree: BlockTreeConfig,
    #[serde(default)]
    pub automaton: AutomatonConfig,
}

/// Block sizing of the term dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTreeConfig {
    #[serde(default = "default_min_items")]
    pub min_items_in_block: usize,
    #[serde(default = "default_max_items")]
    pub max_items_in_block: usize,
}

/// Limits applied when compiling patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonConfig {
    /// Determinization aborts with `TooComplexToDeterminize` past this many
    /// DFA states.
    #[serde(default = "default_max_states")]
    pub max_determinized_states: usize,
}

fn default_min_items() -> usize {
    DEFAULT_MIN_BLOCK_SIZE
}

fn default_max_items() -> usize {
    DEFAULT_MAX_BLOCK_SIZE
}

fn default_max_states() -> usize {
    DEFAULT_MAX_DETERMINIZED_STATES
}

impl Default for BlockTreeConfig {
    fn default() -> Self {
        BlockTreeConfig {
            min_items_in_block: DEFAULT_MIN_BLOCK_SIZE,
            max_items_in_block: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        AutomatonConfig {
            max_determinized_states: DEFAULT_MAX_DETERMINIZED_STATES,
        }
    }
}

impl BlockTreeConfig {
    pub fn new(min_items_in_block: usize, max_items_in_block: usize) -> Result<Self> {
        let config = BlockTreeConfig {
            min_items_in_block,
            max_items_in_block,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_items_in_block < 2 {
            return Err(QuiverError::invalid_config(format!(
                "min_items_in_block must be >= 2; got {}",
                self.min_items_in_block
            )));
        }
        if self.max_items_in_block < 2 * (self.min_items_in_block - 1) {
            return Err(QuiverError::invalid_config(format!(
                "max_items_in_block must be >= 2 * (min_items_in_block - 1); got max {} min {}",
                self.max_items_in_block, self.min_items_in_block
            )));
        }
        Ok(())
    }
}

impl CodecConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CodecConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.block_tree.validate()?;
        if self.automaton.max_determinized_states == 0 {
            return Err(QuiverError::invalid_config(
                "max_determinized_states must be > 0",
            ));
        }
        Ok(())
    }
}
