use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rxcond_core::ReagentKind;
use rxcond_reagents::EngineError;
use serde::{Deserialize, Serialize};

use crate::blend::BlendParams;

/// Environment-driven engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub analytics_dir: PathBuf,
    pub reagents_dir: Option<PathBuf>,
    pub analytics_config: Option<PathBuf>,
    pub has_feature_scaling: bool,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            analytics_dir: data_dir.join("analytics"),
            data_dir,
            reagents_dir: None,
            analytics_config: None,
            has_feature_scaling: true,
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("RXCOND_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        Self {
            analytics_dir: std::env::var("RXCOND_ANALYTICS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("analytics")),
            reagents_dir: std::env::var("RXCOND_REAGENTS_DIR").ok().map(PathBuf::from),
            analytics_config: std::env::var("RXCOND_ANALYTICS_CONFIG").ok().map(PathBuf::from),
            has_feature_scaling: std::env::var("RXCOND_FEATURE_SCALING")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"))
                .unwrap_or(true),
            data_dir,
        }
    }

    pub fn with_reagents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reagents_dir = Some(dir.into());
        self
    }

    pub fn with_analytics_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.analytics_config = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyTo {
    pub ligands: bool,
    pub solvents: bool,
    pub bases: bool,
}

impl Default for ApplyTo {
    fn default() -> Self {
        Self {
            ligands: true,
            solvents: true,
            bases: true,
        }
    }
}

impl ApplyTo {
    pub fn for_kind(&self, kind: ReagentKind) -> bool {
        match kind {
            ReagentKind::Ligand => self.ligands,
            ReagentKind::Solvent => self.solvents,
            ReagentKind::Base => self.bases,
        }
    }
}

/// How analytics priors are blended into table scores. A YAML file only needs the keys it
/// overrides; a per-kind weight or penalty it leaves out falls back to the file's `w_freq`
/// or `penalty_factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsBlendConfig {
    pub enabled: bool,
    pub apply_to: ApplyTo,
    pub w_freq: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_freq_ligands: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_freq_solvents: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_freq_bases: Option<f64>,
    pub soft_penalty: bool,
    pub penalty_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_factor_ligands: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_factor_solvents: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_factor_bases: Option<f64>,
    pub min_support_pct: f64,
}

impl Default for AnalyticsBlendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            apply_to: ApplyTo::default(),
            w_freq: 0.30,
            w_freq_ligands: Some(0.35),
            w_freq_solvents: Some(0.45),
            w_freq_bases: Some(0.40),
            soft_penalty: true,
            penalty_factor: 0.85,
            penalty_factor_ligands: Some(0.88),
            penalty_factor_solvents: Some(0.85),
            penalty_factor_bases: Some(0.85),
            min_support_pct: 0.01,
        }
    }
}

impl AnalyticsBlendConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing analytics blend config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn params_for(&self, kind: ReagentKind) -> BlendParams {
        let (weight, penalty_factor) = match kind {
            ReagentKind::Ligand => (self.w_freq_ligands, self.penalty_factor_ligands),
            ReagentKind::Solvent => (self.w_freq_solvents, self.penalty_factor_solvents),
            ReagentKind::Base => (self.w_freq_bases, self.penalty_factor_bases),
        };
        BlendParams {
            weight: weight.unwrap_or(self.w_freq),
            penalty_factor: penalty_factor.unwrap_or(self.penalty_factor),
            min_support_pct: self.min_support_pct,
            soft_penalty: self.soft_penalty,
        }
    }

    pub fn applies_to(&self, kind: ReagentKind) -> bool {
        self.enabled && self.apply_to.for_kind(kind)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.w_freq.is_finite() || self.w_freq < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "w_freq must be a non-negative number, got {}",
                self.w_freq
            )));
        }
        if !(0.0..=1.0).contains(&self.penalty_factor) {
            return Err(EngineError::InvalidConfig(format!(
                "penalty_factor must be within [0, 1], got {}",
                self.penalty_factor
            )));
        }
        for kind in ReagentKind::ALL {
            self.params_for(kind).validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_only_named_keys() {
        let config = AnalyticsBlendConfig::from_yaml_str(
            "w_freq_solvents: 0.5\napply_to:\n  bases: false\nsoft_penalty: false\n",
        )
        .expect("valid yaml");
        assert_eq!(config.params_for(ReagentKind::Solvent).weight, 0.5);
        assert_eq!(config.params_for(ReagentKind::Ligand).weight, 0.30);
        assert!(config.apply_to.ligands);
        assert!(!config.apply_to.bases);
        assert!(!config.applies_to(ReagentKind::Base));
        assert!(!config.params_for(ReagentKind::Solvent).soft_penalty);
    }

    #[test]
    fn generic_weight_and_penalty_fill_missing_kinds() {
        let config = AnalyticsBlendConfig::from_yaml_str(
            "w_freq: 0.5\npenalty_factor: 0.7\nw_freq_bases: 0.2\npenalty_factor_ligands: 0.9\n",
        )
        .expect("valid yaml");
        let ligand = config.params_for(ReagentKind::Ligand);
        assert_eq!((ligand.weight, ligand.penalty_factor), (0.5, 0.9));
        let solvent = config.params_for(ReagentKind::Solvent);
        assert_eq!((solvent.weight, solvent.penalty_factor), (0.5, 0.7));
        let base = config.params_for(ReagentKind::Base);
        assert_eq!((base.weight, base.penalty_factor), (0.2, 0.7));
    }

    #[test]
    fn built_in_defaults_keep_per_kind_tuning() {
        let config = AnalyticsBlendConfig::default();
        assert_eq!(config.params_for(ReagentKind::Ligand).weight, 0.35);
        assert_eq!(config.params_for(ReagentKind::Ligand).penalty_factor, 0.88);
        assert_eq!(config.params_for(ReagentKind::Solvent).weight, 0.45);
        assert_eq!(config.params_for(ReagentKind::Base).weight, 0.40);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/analytics.yaml");
        let config = AnalyticsBlendConfig::load(&path).expect("shipped config");
        assert_eq!(config, AnalyticsBlendConfig::default());
    }

    #[test]
    fn penalty_above_one_is_rejected() {
        let err = AnalyticsBlendConfig::from_yaml_str("penalty_factor_ligands: 1.5\n").expect_err("invalid");
        assert!(format!("{err:#}").contains("penalty_factor"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let config = AnalyticsBlendConfig {
            w_freq_bases: Some(-0.1),
            ..AnalyticsBlendConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }
}
