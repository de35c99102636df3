//! Kernel configuration
//!
//! Boot parameters are read from TOML. Every field has a default, so an
//! empty document yields the stock kernel:
//!
//! ```toml
//! heap_size = 50000
//! memory = "heap"
//! shutdown_on_empty = false
//!
//! [serial]
//! base = 0x3F8
//! baud_rate = 1200
//!
//! [[process]]
//! name = "idle"
//! class = "system"
//! priority = 0
//! entry = 0x1000
//! ```

use std::path::Path;

use ember_drivers::serial::COM1;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::objects::ProcessClass;

/// Where kernel records get their memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// First-fit heap with coalescing
    #[default]
    Heap,
    /// Never-freeing region
    Bump,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// I/O port of the UART's first register
    pub base: u16,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            base: COM1,
            baud_rate: 1200,
        }
    }
}

/// A process loaded at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub name: String,
    pub class: ProcessClass,
    #[serde(default)]
    pub priority: u8,
    /// First instruction of the process
    pub entry: u32,
}

impl ProcessConfig {
    pub fn new(name: &str, class: ProcessClass, priority: u8, entry: u32) -> Self {
        Self {
            name: name.to_string(),
            class,
            priority,
            entry,
        }
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Bytes managed by the heap (or bump region)
    pub heap_size: usize,
    pub memory: MemoryMode,
    /// Return to the boot context instead of halting when nothing can run
    pub shutdown_on_empty: bool,
    pub serial: SerialConfig,
    #[serde(rename = "process")]
    pub processes: Vec<ProcessConfig>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            heap_size: 50_000,
            memory: MemoryMode::Heap,
            shutdown_on_empty: false,
            serial: SerialConfig::default(),
            processes: vec![
                ProcessConfig::new("idle", ProcessClass::System, 0, 0x1000),
                ProcessConfig::new("secondaryidle", ProcessClass::System, 0, 0x1100),
            ],
        }
    }
}

impl KernelConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KernelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("[kernel] loading config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Same configuration without any boot processes
    pub fn without_processes(mut self) -> Self {
        self.processes.clear();
        self
    }
}
