//! Core domain model for reagent scoring and reaction analytics.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "rxcond-core";

/// Score used whenever a compatibility value is missing or the category is unknown.
pub const NEUTRAL_COMPATIBILITY: f64 = 0.5;

/// Canonical reaction buckets every compatibility vector is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionCategory {
    #[serde(rename = "Cross-Coupling")]
    CrossCoupling,
    Hydrogenation,
    Metathesis,
    #[serde(rename = "C-H_Activation")]
    ChActivation,
    Carbonylation,
}

impl ReactionCategory {
    pub const ALL: [ReactionCategory; 5] = [
        ReactionCategory::CrossCoupling,
        ReactionCategory::Hydrogenation,
        ReactionCategory::Metathesis,
        ReactionCategory::ChActivation,
        ReactionCategory::Carbonylation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionCategory::CrossCoupling => "Cross-Coupling",
            ReactionCategory::Hydrogenation => "Hydrogenation",
            ReactionCategory::Metathesis => "Metathesis",
            ReactionCategory::ChActivation => "C-H_Activation",
            ReactionCategory::Carbonylation => "Carbonylation",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ReactionCategory::CrossCoupling => 0,
            ReactionCategory::Hydrogenation => 1,
            ReactionCategory::Metathesis => 2,
            ReactionCategory::ChActivation => 3,
            ReactionCategory::Carbonylation => 4,
        }
    }

    /// Exact match on a category name, ignoring case and punctuation.
    pub fn from_label(label: &str) -> Option<Self> {
        let key = alnum_lower(label);
        Self::ALL
            .into_iter()
            .find(|category| alnum_lower(category.as_str()) == key)
    }

    /// Resolves a free-form reaction type to its scoring bucket.
    ///
    /// Named aryl-coupling families (Ullmann, Buchwald-Hartwig, Suzuki, Chan-Lam ...) land in
    /// `Cross-Coupling`. Returns `None` for labels with no sensible bucket; callers then score
    /// with [`NEUTRAL_COMPATIBILITY`].
    pub fn for_reaction_type(label: &str) -> Option<Self> {
        if let Some(category) = Self::from_label(label) {
            return Some(category);
        }
        let lower = label.to_lowercase();
        const COUPLING_HINTS: [&str; 13] = [
            "ullmann",
            "goldberg",
            "buchwald",
            "suzuki",
            "heck",
            "sonogashira",
            "stille",
            "negishi",
            "chan-lam",
            "chan lam",
            "coupling",
            "amination",
            "arylation",
        ];
        if COUPLING_HINTS.iter().any(|hint| lower.contains(hint)) {
            Some(ReactionCategory::CrossCoupling)
        } else if lower.contains("hydrogenation") || lower.contains("reduction") {
            Some(ReactionCategory::Hydrogenation)
        } else if lower.contains("metathesis") {
            Some(ReactionCategory::Metathesis)
        } else if lower.contains("c-h") || lower.contains("oxidation") {
            Some(ReactionCategory::ChActivation)
        } else if lower.contains("carbonylation") {
            Some(ReactionCategory::Carbonylation)
        } else {
            None
        }
    }
}

impl fmt::Display for ReactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copper-mediated amination/etherification families that get the Ullmann reagent heuristics.
pub fn is_copper_mediated(reaction_type: &str) -> bool {
    let lower = reaction_type.to_lowercase();
    lower.contains("ullmann") || lower.contains("goldberg")
}

fn alnum_lower(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Five per-category compatibility scores, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct CompatibilityVector([f64; 5]);

impl CompatibilityVector {
    pub fn new(values: [f64; 5]) -> Self {
        Self(values.map(clamp_unit))
    }

    pub fn neutral() -> Self {
        Self([NEUTRAL_COMPATIBILITY; 5])
    }

    /// Missing trailing slots are filled with the neutral prior; extra values are ignored.
    pub fn from_partial(values: &[f64]) -> Self {
        let mut out = [NEUTRAL_COMPATIBILITY; 5];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = clamp_unit(*value);
        }
        Self(out)
    }

    pub fn get(&self, category: ReactionCategory) -> f64 {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: ReactionCategory, value: f64) {
        self.0[category.index()] = clamp_unit(value);
    }

    pub fn for_reaction_type(&self, reaction_type: &str) -> f64 {
        ReactionCategory::for_reaction_type(reaction_type)
            .map(|category| self.get(category))
            .unwrap_or(NEUTRAL_COMPATIBILITY)
    }

    pub fn values(&self) -> [f64; 5] {
        self.0
    }
}

impl Default for CompatibilityVector {
    fn default() -> Self {
        Self::neutral()
    }
}

impl From<Vec<f64>> for CompatibilityVector {
    fn from(values: Vec<f64>) -> Self {
        Self::from_partial(&values)
    }
}

impl From<CompatibilityVector> for Vec<f64> {
    fn from(vector: CompatibilityVector) -> Self {
        vector.0.to_vec()
    }
}

/// Clamps into `[0, 1]`; NaN becomes the neutral prior.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_COMPATIBILITY
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReagentKind {
    Ligand,
    Solvent,
    Base,
}

impl ReagentKind {
    pub const ALL: [ReagentKind; 3] = [ReagentKind::Ligand, ReagentKind::Solvent, ReagentKind::Base];

    pub fn as_str(self) -> &'static str {
        match self {
            ReagentKind::Ligand => "ligand",
            ReagentKind::Solvent => "solvent",
            ReagentKind::Base => "base",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ReagentKind::Ligand => "ligands",
            ReagentKind::Solvent => "solvents",
            ReagentKind::Base => "bases",
        }
    }

    /// Ordered feature names; `ReagentRecord::features` is aligned to this slice.
    pub fn feature_names(self) -> &'static [&'static str] {
        match self {
            ReagentKind::Ligand => &[
                "cone_angle",
                "electronic_parameter",
                "bite_angle",
                "steric_bulk",
                "donor_pka",
                "price_category",
                "coordination_mode",
            ],
            ReagentKind::Solvent => &[
                "dielectric_constant",
                "polarity_index",
                "boiling_point_c",
                "density_g_ml",
                "dipole_moment_d",
                "donor_number_dn",
                "hydrogen_bond_donor",
            ],
            ReagentKind::Base => &["basicity_pkah", "nucleophilicity_index"],
        }
    }

    pub fn feature_index(self, feature: &str) -> Option<usize> {
        self.feature_names().iter().position(|name| *name == feature)
    }
}

impl fmt::Display for ReagentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ligand, solvent or base with its numeric features and per-category compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReagentRecord {
    pub kind: ReagentKind,
    pub name: String,
    pub abbreviation: Option<String>,
    pub cas: Option<String>,
    pub features: Vec<f64>,
    pub compatibility: CompatibilityVector,
    pub applications: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ReagentRecord {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.kind
            .feature_index(name)
            .and_then(|idx| self.features.get(idx).copied())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Where a historical observation came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_file: Option<String>,
    pub row_index: usize,
    pub reference: Option<String>,
}

/// One historical reaction observation, produced by a format-specific adapter.
///
/// Reagent cells keep their raw text (possibly list-valued); tokenization happens downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedReactionRow {
    pub reaction_type: String,
    pub metal: Option<String>,
    pub catalyst: Option<String>,
    pub ligand: Option<String>,
    pub base: Option<String>,
    pub solvent: Option<String>,
    pub additives: Vec<String>,
    pub temperature_c: Option<f64>,
    pub time_h: Option<f64>,
    pub cat_loading_molpct: Option<f64>,
    pub base_equiv: Option<f64>,
    pub yield_pct: Option<f64>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub name: String,
    pub count: u64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooccurrenceEntry {
    pub a: String,
    pub b: String,
    pub count: u64,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStat {
    pub median: Option<f64>,
    pub p25: Option<f64>,
    pub p75: Option<f64>,
    /// Count before winsorizing.
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryHeader {
    pub total_rows: usize,
    pub analyzed_rows: usize,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub dataset_versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopLists {
    #[serde(default)]
    pub metals: Vec<FrequencyEntry>,
    #[serde(default)]
    pub ligands: Vec<FrequencyEntry>,
    #[serde(default)]
    pub bases: Vec<FrequencyEntry>,
    #[serde(default)]
    pub solvents: Vec<FrequencyEntry>,
    #[serde(default)]
    pub additives: Vec<FrequencyEntry>,
}

impl TopLists {
    pub fn for_kind(&self, kind: ReagentKind) -> &[FrequencyEntry] {
        match kind {
            ReagentKind::Ligand => &self.ligands,
            ReagentKind::Solvent => &self.solvents,
            ReagentKind::Base => &self.bases,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooccurrenceLists {
    #[serde(default)]
    pub ligand_solvent: Vec<CooccurrenceEntry>,
    #[serde(default)]
    pub base_solvent: Vec<CooccurrenceEntry>,
    #[serde(default)]
    pub catalyst_ligand: Vec<CooccurrenceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStatsTable {
    pub temperature_c: NumericStat,
    pub time_h: NumericStat,
    pub yield_pct: NumericStat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryNotes {
    #[serde(default)]
    pub normalizations_applied: Vec<String>,
    #[serde(default)]
    pub missing_columns: Vec<String>,
}

/// Aggregate statistics for one reaction type, persisted as a versioned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub summary: SummaryHeader,
    pub top: TopLists,
    pub cooccurrence: CooccurrenceLists,
    pub numeric_stats: NumericStatsTable,
    #[serde(default)]
    pub notes: SummaryNotes,
}

impl AnalyticsSummary {
    /// Support fractions from `top.<kind>`, skipping unnamed and non-positive entries.
    pub fn priors_for(&self, kind: ReagentKind) -> PriorsMap {
        self.top
            .for_kind(kind)
            .iter()
            .filter(|entry| !entry.name.trim().is_empty() && entry.pct > 0.0)
            .map(|entry| (entry.name.clone(), entry.pct))
            .collect()
    }
}

/// Canonical reagent name -> support fraction in `(0, 1]`.
pub type PriorsMap = BTreeMap<String, f64>;

/// Reagent name -> raw occurrence count mined from historical rows.
pub type EvidenceMap = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Table,
    Curated,
}

/// A ranked reagent suggestion for one reaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rank: usize,
    pub kind: ReagentKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    pub compatibility_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_score: Option<f64>,
    pub applications: String,
    pub reaction_suitability: String,
    pub source: RecommendationSource,
}

impl Recommendation {
    /// Score the list is ordered by: combined when a reference was used, else compatibility.
    pub fn ranking_score(&self) -> f64 {
        self.combined_score.unwrap_or(self.compatibility_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            ConfidenceTier::High
        } else if score > 0.6 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypicalConditions {
    pub temperature: String,
    pub time: String,
    pub atmosphere: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    pub catalyst_loading: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additives: Option<String>,
}

/// A ranked ligand x solvent pairing with its synergy bonus and confidence tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedCondition {
    pub rank: usize,
    pub ligand: String,
    pub ligand_compatibility: f64,
    pub solvent: String,
    pub solvent_abbreviation: Option<String>,
    pub solvent_compatibility: f64,
    pub combined_score: f64,
    pub synergy_bonus: f64,
    pub recommendation_confidence: ConfidenceTier,
    pub typical_conditions: TypicalConditions,
    pub suggested_base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn compatibility_values_are_clamped_and_padded() {
        let vector = CompatibilityVector::from_partial(&[1.4, -0.2, f64::NAN]);
        assert_eq!(vector.values(), [1.0, 0.0, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn aryl_coupling_families_map_to_cross_coupling() {
        assert_eq!(
            ReactionCategory::for_reaction_type("C-N Coupling - Ullmann"),
            Some(ReactionCategory::CrossCoupling)
        );
        assert_eq!(
            ReactionCategory::for_reaction_type("c-h activation"),
            Some(ReactionCategory::ChActivation)
        );
        assert_eq!(
            ReactionCategory::for_reaction_type("C-H_Activation"),
            Some(ReactionCategory::ChActivation)
        );
        assert_eq!(ReactionCategory::for_reaction_type("Diels-Alder"), None);
    }

    #[test]
    fn unknown_reaction_type_scores_neutral() {
        let vector = CompatibilityVector::new([0.9, 0.1, 0.2, 0.3, 0.4]);
        assert_eq!(vector.for_reaction_type("Ullmann"), 0.9);
        assert_eq!(vector.for_reaction_type("Diels-Alder"), NEUTRAL_COMPATIBILITY);
    }

    #[test]
    fn confidence_tiers_use_strict_thresholds() {
        assert_eq!(ConfidenceTier::from_score(0.81), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.8), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.6), ConfidenceTier::Low);
    }

    #[test]
    fn priors_skip_empty_names_and_non_positive_support() {
        let summary = AnalyticsSummary {
            summary: SummaryHeader {
                total_rows: 4,
                analyzed_rows: 4,
                generated_at: Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap(),
                dataset_versions: BTreeMap::new(),
            },
            top: TopLists {
                solvents: vec![
                    FrequencyEntry { name: "dmso".into(), count: 3, pct: 0.75 },
                    FrequencyEntry { name: " ".into(), count: 1, pct: 0.25 },
                    FrequencyEntry { name: "dmf".into(), count: 0, pct: 0.0 },
                ],
                ..Default::default()
            },
            cooccurrence: CooccurrenceLists::default(),
            numeric_stats: NumericStatsTable::default(),
            notes: SummaryNotes::default(),
        };
        let priors = summary.priors_for(ReagentKind::Solvent);
        assert_eq!(priors.len(), 1);
        assert_eq!(priors.get("dmso"), Some(&0.75));

        let json = serde_json::to_string(&summary).expect("serialize");
        let back: AnalyticsSummary = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, summary);
    }
}
