//! Simulation files
//!
//! A simulation file is a kernel configuration plus one script per user
//! process:
//!
//! ```toml
//! input = "hello\r"
//!
//! [kernel]
//! heap_size = 50000
//!
//! [[script]]
//! name = "echo"
//! priority = 5
//! steps = ["read:16", "write:got it", "yield", "exit"]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use ember_kernel::{KernelConfig, ProcessClass};
use serde::Deserialize;

/// One action a scripted process takes when it gets the CPU
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Step {
    Yield,
    Write(String),
    Read(usize),
    Exit,
}

impl TryFrom<String> for Step {
    type Error = String;

    fn try_from(text: String) -> std::result::Result<Self, String> {
        match text.split_once(':') {
            None if text == "yield" => Ok(Step::Yield),
            None if text == "exit" => Ok(Step::Exit),
            Some(("write", payload)) => Ok(Step::Write(payload.to_string())),
            Some(("read", count)) => count
                .trim()
                .parse()
                .map(Step::Read)
                .map_err(|_| format!("invalid read count in step '{}'", text)),
            _ => Err(format!("unknown step '{}'", text)),
        }
    }
}

fn user_class() -> ProcessClass {
    ProcessClass::User
}

/// Process created by the harness and driven by `steps`
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default = "user_class")]
    pub class: ProcessClass,
    #[serde(default)]
    pub priority: u8,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimFile {
    #[serde(default)]
    pub kernel: KernelConfig,
    /// Bytes arriving on the serial line before the first trap
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default, rename = "script")]
    pub scripts: Vec<Script>,
}

impl SimFile {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid simulation file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_steps() {
        let step = |s: &str| Step::try_from(s.to_string());
        assert_eq!(step("yield"), Ok(Step::Yield));
        assert_eq!(step("exit"), Ok(Step::Exit));
        assert_eq!(step("write:a:b"), Ok(Step::Write("a:b".into())));
        assert_eq!(step("read: 12"), Ok(Step::Read(12)));
        assert!(step("read:many").is_err());
        assert!(step("sleep").is_err());
    }

    #[test]
    fn test_parses_file() {
        let sim = SimFile::from_toml_str(
            r#"
            input = "hi\r"

            [kernel]
            heap_size = 20000

            [[script]]
            name = "echo"
            priority = 5
            steps = ["read:8", "write:ok", "exit"]
            "#,
        )
        .unwrap();

        assert_eq!(sim.kernel.heap_size, 20000);
        assert_eq!(sim.kernel.processes.len(), 2);
        assert_eq!(sim.input.as_deref(), Some("hi\r"));
        assert_eq!(sim.scripts[0].class, ProcessClass::User);
        assert_eq!(sim.scripts[0].steps[1], Step::Write("ok".into()));
    }

    #[test]
    fn test_rejects_bad_step() {
        let err = SimFile::from_toml_str(
            r#"
            [[script]]
            name = "odd"
            steps = ["jump"]
            "#,
        );
        assert!(err.is_err());
    }
}
