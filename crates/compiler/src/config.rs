//! Compiler configuration (spec.md §6).
//!
//! `CompilerConfig` is the object the driver consumes; the CLI binary
//! is one way to produce one (parsing `clap` args), but anything that
//! embeds this crate as a library can construct one directly.

use std::path::PathBuf;

use serde::Deserialize;

/// Target ABI. Chooses both the instruction-selection calling
/// convention (spec §4.6) and whether the Windows shadow area is
/// reserved for calls (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Amd64Windows,
    Amd64Unix,
}

impl Target {
    pub fn banner(self) -> &'static str {
        match self {
            Target::Amd64Windows => "AMD64 Windows",
            Target::Amd64Unix => "AMD64 Unix",
        }
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64-windows" => Ok(Target::Amd64Windows),
            "amd64-unix" => Ok(Target::Amd64Unix),
            other => Err(format!(
                "unknown target '{other}', expected 'amd64-windows' or 'amd64-unix'"
            )),
        }
    }
}

/// Phase gate: the driver stops after running this phase, regardless
/// of whether it produced errors (spec §6 `stop_after`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopAfter {
    Lex,
    Parse,
    Check,
    Ir,
    Codegen,
    Link,
}

impl std::str::FromStr for StopAfter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lex" => Ok(StopAfter::Lex),
            "parse" => Ok(StopAfter::Parse),
            "check" => Ok(StopAfter::Check),
            "ir" => Ok(StopAfter::Ir),
            "codegen" => Ok(StopAfter::Codegen),
            "link" => Ok(StopAfter::Link),
            other => Err(format!("unknown stop-after phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub target: Target,
    pub max_error_count: usize,
    pub max_line_arrow_error_count: usize,
    pub stop_after: StopAfter,
    pub diagnose_memory: bool,
    pub profile_time: bool,
    pub output: Option<PathBuf>,
}

impl CompilerConfig {
    pub fn new(target: Target) -> Self {
        CompilerConfig {
            target,
            max_error_count: 6,
            max_line_arrow_error_count: 4,
            stop_after: StopAfter::Link,
            diagnose_memory: false,
            profile_time: false,
            output: None,
        }
    }

    pub fn with_max_error_count(mut self, n: usize) -> Self {
        self.max_error_count = n;
        self
    }

    pub fn with_max_line_arrow_error_count(mut self, n: usize) -> Self {
        self.max_line_arrow_error_count = n;
        self
    }

    pub fn with_stop_after(mut self, phase: StopAfter) -> Self {
        self.stop_after = phase;
        self
    }

    pub fn with_diagnose_memory(mut self, on: bool) -> Self {
        self.diagnose_memory = on;
        self
    }

    pub fn with_profile_time(mut self, on: bool) -> Self {
        self.profile_time = on;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig::new(Target::Amd64Unix)
    }
}

/// Project-level defaults loaded from a `hollowc.toml`, every field
/// optional so a file can override as little or as much of
/// [`CompilerConfig`] as the project needs. CLI flags always win over
/// whatever a config file sets (see `apply_to`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub target: Option<String>,
    pub max_error_count: Option<usize>,
    pub max_line_arrow_error_count: Option<usize>,
    pub stop_after: Option<String>,
    pub diagnose_memory: Option<bool>,
    pub profile_time: Option<bool>,
}

impl ConfigFile {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("failed to parse config file: {e}"))
    }

    /// Applies every field this file sets onto `config`, leaving fields
    /// it leaves unset untouched.
    pub fn apply_to(&self, mut config: CompilerConfig) -> Result<CompilerConfig, String> {
        use std::str::FromStr;
        if let Some(target) = &self.target {
            config.target = Target::from_str(target)?;
        }
        if let Some(n) = self.max_error_count {
            config.max_error_count = n;
        }
        if let Some(n) = self.max_line_arrow_error_count {
            config.max_line_arrow_error_count = n;
        }
        if let Some(stop_after) = &self.stop_after {
            config.stop_after = StopAfter::from_str(stop_after)?;
        }
        if let Some(on) = self.diagnose_memory {
            config.diagnose_memory = on;
        }
        if let Some(on) = self.profile_time {
            config.profile_time = on;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults_match_spec() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.max_error_count, 6);
        assert_eq!(cfg.max_line_arrow_error_count, 4);
    }

    #[test]
    fn target_parses_from_cli_strings() {
        assert_eq!(Target::from_str("amd64-windows").unwrap(), Target::Amd64Windows);
        assert_eq!(Target::from_str("amd64-unix").unwrap(), Target::Amd64Unix);
        assert!(Target::from_str("arm64").is_err());
    }

    #[test]
    fn stop_after_orders_phases() {
        assert!(StopAfter::Lex < StopAfter::Parse);
        assert!(StopAfter::Codegen < StopAfter::Link);
    }

    #[test]
    fn config_file_overrides_only_what_it_sets() {
        let file = ConfigFile::from_toml("target = \"amd64-windows\"\nmax-error-count = 10\n").unwrap();
        let config = file.apply_to(CompilerConfig::default()).unwrap();
        assert_eq!(config.target, Target::Amd64Windows);
        assert_eq!(config.max_error_count, 10);
        assert_eq!(config.max_line_arrow_error_count, 4);
    }

    #[test]
    fn config_file_rejects_unknown_target() {
        let file = ConfigFile::from_toml("target = \"arm64\"\n").unwrap();
        assert!(file.apply_to(CompilerConfig::default()).is_err());
    }
}
