use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::CompileError;

/// Cranelift optimisation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of the `opt_level` Cranelift setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Options for the module assembler, usually read from the `[codegen]`
/// table of a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Target triple; the host is used when absent.
    pub target: Option<String>,
    pub opt_level: OptLevel,
    pub is_pic: bool,
    /// Name of the synthesized function that runs constructors.
    pub entry_symbol: String,
    pub module_name: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            target: None,
            opt_level: OptLevel::None,
            is_pic: true,
            entry_symbol: "entry".to_string(),
            module_name: "seam_module".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TomlConfig {
    #[serde(default)]
    codegen: CodegenOptions,
}

impl CodegenOptions {
    /// Parse options from TOML source. `path` is only used for error reporting.
    pub fn from_toml_str(source: &str, path: &Path) -> Result<Self, CompileError> {
        let config: TomlConfig = toml::from_str(source)
            .map_err(|e| CompileError::config(format!("invalid config: {e}"), path.to_path_buf()))?;
        if config.codegen.entry_symbol.is_empty() {
            return Err(CompileError::config("entry_symbol must not be empty", path.to_path_buf()));
        }
        Ok(config.codegen)
    }

    pub fn load(path: &Path) -> Result<Self, CompileError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::config(format!("cannot read config: {e}"), PathBuf::from(path)))?;
        Self::from_toml_str(&source, path)
    }
}
