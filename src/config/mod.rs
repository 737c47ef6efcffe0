//! Configuration system
//!
//! Supports TOML configuration files with environment variable overrides.
//!
//! # Configuration File Locations
//!
//! Configuration files are searched in order (first found wins):
//! 1. `./entail.toml` - Project-local configuration
//! 2. `~/.config/entail/config.toml` - User configuration (XDG)
//! 3. `~/.entail/config.toml` - User configuration (legacy)
//! 4. `/etc/entail/config.toml` - System-wide configuration
//!
//! # Environment Variables
//!
//! - `ENTAIL_MAX_CLAUSES` - Saturation clause limit
//! - `ENTAIL_MAX_NODES` - Tableau node limit
//! - `ENTAIL_MAX_PROPAGATIONS` - Constraint propagation limit
//! - `ENTAIL_DEADLINE_MS` - Wall-clock deadline in milliseconds
//! - `ENTAIL_POLICY` - Resolution policy (unit-preference, set-of-support)
//! - `ENTAIL_MODAL_SYSTEM` - Modal system (k, t, s4, s5)
//! - `ENTAIL_CONCURRENT` - Race strategies on worker threads (true/false)
//! - `ENTAIL_VERBOSE` - Progress output on stderr (true/false)
//!
//! # Example Configuration
//!
//! ```toml
//! # entail.toml
//!
//! [budget]
//! max_clauses = 100000
//! deadline_ms = 60000
//!
//! [resolution]
//! policy = "set-of-support"
//!
//! [tableau]
//! modal_system = "s5"
//!
//! [coordinator]
//! concurrent = true
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::{CoordinatorConfig, InferenceCoordinator};
use crate::error::{ErrorCode, InferError, Result};
use crate::prover::saturation::ResolutionConfig;
use crate::prover::tableau::TableauConfig;
use crate::prover::{
    Budget, ClpProver, ModalSystem, ModalTableauProver, ResolutionPolicy, ResolutionProver,
    SmtStrategy,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-invocation resource limits
    pub budget: Budget,
    /// Resolution prover settings
    pub resolution: ResolutionSection,
    /// Modal tableau settings
    pub tableau: TableauSection,
    /// Dispatch settings
    pub coordinator: CoordinatorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSection {
    pub policy: ResolutionPolicy,
    pub max_clause_weight: usize,
}

impl Default for ResolutionSection {
    fn default() -> Self {
        let defaults = ResolutionConfig::default();
        ResolutionSection {
            policy: defaults.policy,
            max_clause_weight: defaults.max_clause_weight,
        }
    }
}

impl ResolutionSection {
    fn normalized(&self) -> ResolutionConfig {
        let defaults = ResolutionConfig::default();
        ResolutionConfig {
            policy: self.policy,
            max_clause_weight: if self.max_clause_weight == 0 {
                defaults.max_clause_weight
            } else {
                self.max_clause_weight
            },
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TableauSection {
    pub modal_system: ModalSystem,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoordinatorSection {
    pub concurrent: bool,
    pub verbose: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from default locations plus env overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        for path in Self::config_paths() {
            if path.exists() {
                config = Self::load_from_file(&path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InferError::new(
                ErrorCode::ConfigNotFound,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file search paths, most specific first
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("./entail.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("entail").join("config.toml"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".entail").join("config.toml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/entail/config.toml"));

        paths
    }

    /// Apply `ENTAIL_*` environment overrides
    ///
    /// A set but unparsable variable is a configuration error.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        fn numeric(name: &str) -> Result<Option<u64>> {
            match env::var(name) {
                Ok(val) => val.parse::<u64>().map(Some).map_err(|_| {
                    InferError::new(
                        ErrorCode::InvalidConfigValue,
                        format!("{} must be a number, got '{}'", name, val),
                    )
                }),
                Err(_) => Ok(None),
            }
        }

        fn boolean(name: &str) -> Result<Option<bool>> {
            match env::var(name) {
                Ok(val) => match val.as_str() {
                    "true" | "1" | "yes" => Ok(Some(true)),
                    "false" | "0" | "no" => Ok(Some(false)),
                    other => Err(InferError::new(
                        ErrorCode::InvalidConfigValue,
                        format!("{} must be true or false, got '{}'", name, other),
                    )),
                },
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = numeric("ENTAIL_MAX_CLAUSES")? {
            self.budget.max_clauses = v as usize;
        }
        if let Some(v) = numeric("ENTAIL_MAX_NODES")? {
            self.budget.max_nodes = v as usize;
        }
        if let Some(v) = numeric("ENTAIL_MAX_PROPAGATIONS")? {
            self.budget.max_propagations = v as usize;
        }
        if let Some(v) = numeric("ENTAIL_DEADLINE_MS")? {
            self.budget.deadline_ms = v;
        }

        if let Ok(val) = env::var("ENTAIL_POLICY") {
            self.resolution.policy = match val.as_str() {
                "unit-preference" => ResolutionPolicy::UnitPreference,
                "set-of-support" => ResolutionPolicy::SetOfSupport,
                other => {
                    return Err(InferError::new(
                        ErrorCode::InvalidConfigValue,
                        format!("unknown resolution policy '{}'", other),
                    ))
                }
            };
        }

        if let Ok(val) = env::var("ENTAIL_MODAL_SYSTEM") {
            self.tableau.modal_system = ModalSystem::parse(&val)?;
        }

        if let Some(v) = boolean("ENTAIL_CONCURRENT")? {
            self.coordinator.concurrent = v;
        }
        if let Some(v) = boolean("ENTAIL_VERBOSE")? {
            self.coordinator.verbose = v;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.budget.max_clauses == 0 {
            return Err(InferError::new(
                ErrorCode::InvalidConfigValue,
                "budget.max_clauses must be positive",
            ));
        }
        if self.budget.max_nodes == 0 {
            return Err(InferError::new(
                ErrorCode::InvalidConfigValue,
                "budget.max_nodes must be positive",
            ));
        }
        if self.budget.max_propagations == 0 {
            return Err(InferError::new(
                ErrorCode::InvalidConfigValue,
                "budget.max_propagations must be positive",
            ));
        }
        Ok(())
    }

    /// Build a coordinator with the four stock strategies configured from
    /// this config
    pub fn build_coordinator(&self) -> InferenceCoordinator {
        let mut resolution = self.resolution.normalized();
        resolution.verbose = self.coordinator.verbose;

        let mut coordinator = InferenceCoordinator::empty()
            .with_budget(self.budget.clone())
            .with_config(CoordinatorConfig {
                concurrent: self.coordinator.concurrent,
                verbose: self.coordinator.verbose,
            });
        coordinator.register(Arc::new(ResolutionProver::with_config(resolution)));
        coordinator.register(Arc::new(ModalTableauProver::with_config(TableauConfig {
            system: self.tableau.modal_system,
            verbose: self.coordinator.verbose,
        })));
        coordinator.register(Arc::new(ClpProver::new()));
        coordinator.register(Arc::new(SmtStrategy::new()));
        coordinator
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| InferError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::new();
        assert_eq!(config.budget.max_clauses, 100_000);
        assert_eq!(config.resolution.policy, ResolutionPolicy::UnitPreference);
        assert_eq!(config.tableau.modal_system, ModalSystem::S4);
        assert!(!config.coordinator.concurrent);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [budget]
            max_clauses = 5000
            deadline_ms = 1000

            [resolution]
            policy = "set-of-support"
            max_clause_weight = 40

            [tableau]
            modal_system = "s5"

            [coordinator]
            concurrent = true
        "#;

        let config = EngineConfig::load_from_str(toml).unwrap();
        assert_eq!(config.budget.max_clauses, 5000);
        assert_eq!(config.budget.deadline_ms, 1000);
        assert_eq!(config.resolution.policy, ResolutionPolicy::SetOfSupport);
        assert_eq!(config.resolution.max_clause_weight, 40);
        assert_eq!(config.tableau.modal_system, ModalSystem::S5);
        assert!(config.coordinator.concurrent);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = EngineConfig::load_from_str("[tableau]\nmodal_system = \"k\"\n").unwrap();
        assert_eq!(config.tableau.modal_system, ModalSystem::K);
        assert_eq!(config.budget.max_clauses, 100_000);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let result = EngineConfig::load_from_str("[budget]\nmax_clauses = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_syntax_is_config_error() {
        let result = EngineConfig::load_from_str("[budget\nmax_clauses = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_modal_system_rejected() {
        let result = EngineConfig::load_from_str("[tableau]\nmodal_system = \"s9\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_paths() {
        let paths = EngineConfig::config_paths();
        assert!(!paths.is_empty());
        assert!(paths[0].ends_with("entail.toml"));
    }

    #[test]
    fn test_round_trip() {
        let config = EngineConfig::new();
        let toml = config.to_toml().unwrap();
        let back = EngineConfig::load_from_str(&toml).unwrap();
        assert_eq!(back.budget.max_clauses, config.budget.max_clauses);
    }
}
