//! Prior-blended reagent recommendations, condition ranking and prediction export.

pub mod blend;
pub mod conditions;
pub mod config;
pub mod detect;
pub mod export;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rxcond_adapters::DatasetRegistry;
use rxcond_analytics::{harvest_all, read_dataset_tables, EvidenceSet};
use rxcond_core::{AnalyticsSummary, CombinedCondition, PriorsMap, ReactionCategory, ReagentKind, Recommendation};
use rxcond_reagents::{
    reaction_specific, score, LigandPreferences, ReagentLibrary, ScoreRequest, ScorerOptions, SolventPreferences,
};
use rxcond_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

pub use blend::{blend, evidence_to_priors, BlendParams};
pub use conditions::{rank_combinations, reaction_notes, synergy_bonus, typical_conditions, ConditionFamily};
pub use config::{AnalyticsBlendConfig, ApplyTo, EngineConfig};
pub use detect::{detect_from_smiles, map_reaction_label, resolve_reaction_type, Detection, GENERAL_REACTION};
pub use export::{build_export_payload, ExportInput, ExportPayload};
pub use rxcond_reagents::EngineError;

pub const CRATE_NAME: &str = "rxcond-engine";

pub const ANALYSIS_TYPE: &str = "enhanced";
pub const STATUS_SUCCESS: &str = "success";
pub const RECOMMENDATION_TOP_N: usize = 5;
pub const RECOMMENDATION_MIN_COMPATIBILITY: f64 = 0.4;
pub const ALTERNATIVE_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyAlternatives {
    pub budget_friendly_ligands: Vec<Recommendation>,
    pub low_boiling_solvents: Vec<Recommendation>,
    pub green_solvents: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub ligands_available: usize,
    pub solvents_available: usize,
    pub reaction_types_supported: Vec<String>,
    pub analytics_loaded: bool,
}

/// Everything `get_recommendations` knows about one reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub analysis_type: String,
    pub status: String,
    pub input: ExportInput,
    pub reaction_type: String,
    pub detected_from: String,
    pub detection: Detection,
    pub ligand_recommendations: Vec<Recommendation>,
    pub solvent_recommendations: Vec<Recommendation>,
    pub base_recommendations: Vec<Recommendation>,
    pub combined_conditions: Vec<CombinedCondition>,
    pub property_based_alternatives: PropertyAlternatives,
    pub reaction_specific_notes: String,
    pub dataset_info: DatasetInfo,
    /// Snapshot the priors came from, if one was published for this type.
    #[serde(skip)]
    pub analytics: Option<AnalyticsSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub reaction_smiles: String,
    #[serde(default)]
    pub selected_reaction_type: Option<String>,
    #[serde(default)]
    pub related_reactions: Vec<Value>,
}

/// Where the priors for one request came from.
enum Priors<'a> {
    Snapshot(&'a AnalyticsSummary),
    Evidence(EvidenceSet),
}

impl Priors<'_> {
    fn for_kind(&self, kind: ReagentKind) -> PriorsMap {
        match self {
            Priors::Snapshot(summary) => summary.priors_for(kind),
            Priors::Evidence(evidence) => evidence_to_priors(evidence.for_kind(kind)),
        }
    }
}

pub struct RecommendationEngine {
    config: EngineConfig,
    library: ReagentLibrary,
    blend: AnalyticsBlendConfig,
    registry: DatasetRegistry,
    store: SnapshotStore,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let library = match &config.reagents_dir {
            Some(dir) => ReagentLibrary::from_dir(dir),
            None => ReagentLibrary::embedded(),
        };
        let blend = match &config.analytics_config {
            Some(path) => AnalyticsBlendConfig::load(path)?,
            None => AnalyticsBlendConfig::default(),
        };
        Self::with_parts(config, library, blend).map_err(Into::into)
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env())
    }

    pub fn with_parts(
        config: EngineConfig,
        library: ReagentLibrary,
        blend: AnalyticsBlendConfig,
    ) -> Result<Self, EngineError> {
        blend.validate()?;
        Ok(Self {
            registry: DatasetRegistry::new(&config.data_dir),
            store: SnapshotStore::new(&config.analytics_dir),
            config,
            library,
            blend,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &ReagentLibrary {
        &self.library
    }

    pub fn blend_config(&self) -> &AnalyticsBlendConfig {
        &self.blend
    }

    fn options(&self) -> ScorerOptions {
        ScorerOptions {
            has_feature_scaling: self.config.has_feature_scaling,
        }
    }

    /// Raw table scores for one reagent class; no priors applied.
    pub fn recommend(
        &self,
        kind: ReagentKind,
        reaction_type: &str,
        top_n: usize,
        min_compatibility: f64,
        reference: Option<&str>,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let request = ScoreRequest::new(reaction_type)
            .with_top_n(top_n)
            .with_min_compatibility(min_compatibility)
            .with_reference(reference);
        score(self.library.repository(kind), &request, self.options())
    }

    /// Latest published snapshot; unreadable snapshots are logged and treated as absent.
    pub fn load_summary(&self, reaction_type: &str) -> Option<AnalyticsSummary> {
        match self.store.read_latest::<AnalyticsSummary>(reaction_type) {
            Ok(summary) => summary,
            Err(err) => {
                warn!(reaction_type, error = %format!("{err:#}"), "ignoring unreadable analytics snapshot");
                None
            }
        }
    }

    fn priors<'a>(&self, reaction_type: &str, summary: Option<&'a AnalyticsSummary>) -> Priors<'a> {
        match summary {
            Some(summary) => Priors::Snapshot(summary),
            None => {
                let tables = read_dataset_tables(&self.registry);
                debug!(reaction_type, tables = tables.len(), "harvesting priors from raw datasets");
                Priors::Evidence(harvest_all(&tables, reaction_type))
            }
        }
    }

    fn blended(&self, kind: ReagentKind, reaction_type: &str, priors: &Priors<'_>) -> Result<Vec<Recommendation>, EngineError> {
        let recommendations = self.recommend(
            kind,
            reaction_type,
            RECOMMENDATION_TOP_N,
            RECOMMENDATION_MIN_COMPATIBILITY,
            None,
        )?;
        if !self.blend.applies_to(kind) {
            return Ok(recommendations);
        }
        let priors = priors.for_kind(kind);
        if priors.is_empty() {
            return Ok(recommendations);
        }
        blend(recommendations, &priors, &self.blend.params_for(kind))
    }

    pub fn property_alternatives(&self, reaction_type: &str) -> Result<PropertyAlternatives, EngineError> {
        let options = self.options();
        let take = |mut recs: Vec<Recommendation>| {
            recs.truncate(ALTERNATIVE_LIMIT);
            recs
        };
        let budget = LigandPreferences {
            price_category_max: Some(3.0),
            ..LigandPreferences::default()
        };
        let low_boiling = SolventPreferences {
            bp_max: Some(100.0),
            ..SolventPreferences::default()
        };
        let green = SolventPreferences {
            polarity_min: Some(3.0),
            bp_max: Some(150.0),
            ..SolventPreferences::default()
        };
        Ok(PropertyAlternatives {
            budget_friendly_ligands: take(reaction_specific(&self.library.ligands, reaction_type, &budget, options)?),
            low_boiling_solvents: take(reaction_specific(&self.library.solvents, reaction_type, &low_boiling, options)?),
            green_solvents: take(reaction_specific(&self.library.solvents, reaction_type, &green, options)?),
        })
    }

    pub fn dataset_info(&self, analytics_loaded: bool) -> DatasetInfo {
        DatasetInfo {
            ligands_available: self.library.ligands.len(),
            solvents_available: self.library.solvents.len(),
            reaction_types_supported: ReactionCategory::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            analytics_loaded,
        }
    }

    /// Accepts either a reaction SMILES (`a.b>>c`) or a reaction label.
    pub fn get_recommendations(&self, input: &str) -> Result<RecommendationReport, EngineError> {
        if input.contains(">>") {
            self.get_recommendations_for(input, None)
        } else {
            self.get_recommendations_for("", Some(input))
        }
    }

    pub fn get_recommendations_for(
        &self,
        reaction_smiles: &str,
        selected_reaction_type: Option<&str>,
    ) -> Result<RecommendationReport, EngineError> {
        let (reaction_type, detection) = resolve_reaction_type(reaction_smiles, selected_reaction_type);
        info!(reaction_type = %reaction_type, ?detection, "building recommendations");

        let summary = self.load_summary(&reaction_type);
        let priors = self.priors(&reaction_type, summary.as_ref());
        let ligands = self.blended(ReagentKind::Ligand, &reaction_type, &priors)?;
        let solvents = self.blended(ReagentKind::Solvent, &reaction_type, &priors)?;
        let bases = self.blended(ReagentKind::Base, &reaction_type, &priors)?;

        let suggested_base = bases.first().map(|rec| rec.name.clone());
        let mut combined = rank_combinations(&ligands, &solvents, &reaction_type);
        for condition in &mut combined {
            condition.suggested_base = suggested_base.clone();
        }

        let detected_from = selected_reaction_type
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(reaction_smiles)
            .to_string();

        Ok(RecommendationReport {
            analysis_type: ANALYSIS_TYPE.to_string(),
            status: STATUS_SUCCESS.to_string(),
            input: ExportInput {
                reaction_smiles: reaction_smiles.to_string(),
                selected_reaction_type: selected_reaction_type.map(str::to_string),
            },
            detected_from,
            detection,
            ligand_recommendations: ligands,
            solvent_recommendations: solvents,
            base_recommendations: bases,
            combined_conditions: combined,
            property_based_alternatives: self.property_alternatives(&reaction_type)?,
            reaction_specific_notes: reaction_notes(&reaction_type).to_string(),
            dataset_info: self.dataset_info(summary.is_some()),
            analytics: summary,
            reaction_type,
        })
    }

    pub fn predict(&self, request: &PredictRequest, generated_at: DateTime<Utc>) -> Result<ExportPayload, EngineError> {
        let report = self.get_recommendations_for(&request.reaction_smiles, request.selected_reaction_type.as_deref())?;
        Ok(build_export_payload(
            &report,
            &self.library,
            request.related_reactions.clone(),
            generated_at,
        ))
    }

    /// Re-reads reagent sources and the blend file. A broken blend file keeps the previous settings.
    pub fn reload(&mut self) {
        self.library.reload();
        if let Some(path) = &self.config.analytics_config {
            match AnalyticsBlendConfig::load(path) {
                Ok(blend) => self.blend = blend,
                Err(err) => warn!(path = %path.display(), error = %format!("{err:#}"), "keeping previous blend config"),
            }
        }
    }
}
