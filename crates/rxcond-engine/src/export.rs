use chrono::{DateTime, Utc};
use rxcond_adapters::canonicalize;
use rxcond_core::{is_copper_mediated, AnalyticsSummary, CooccurrenceEntry, FrequencyEntry, ReagentKind};
use rxcond_reagents::ReagentLibrary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detect::Detection;
use crate::{DatasetInfo, RecommendationReport};

/// Number of combined conditions expanded into full chemical lists.
pub const TOP_CONDITIONS: usize = 3;
pub const SNIPPET_TOP_N: usize = 3;
pub const BASE_EQUIVALENTS: f64 = 2.0;

const COPPER_PRECURSOR: (&str, &str) = ("CuI", "7681-65-4");
const PALLADIUM_PRECURSOR: (&str, &str) = ("Pd(OAc)2", "3375-31-3");

/// Canonical token -> CAS for ligands and bases that commonly lack one in the tables.
const CAS_ALIASES: &[(&str, &str)] = &[
    ("k2co3", "584-08-7"),
    ("cs2co3", "534-17-8"),
    ("k3po4", "7778-53-2"),
    ("kotbu", "865-47-4"),
    ("potassiumtertbutoxide", "865-47-4"),
    ("naotbu", "865-48-5"),
    ("na2co3", "497-19-8"),
    ("dipea", "7087-68-5"),
    ("dbu", "6674-22-2"),
    ("tea", "121-44-8"),
    ("et3n", "121-44-8"),
    ("pyridine", "110-86-1"),
    ("koh", "1310-58-3"),
    ("naoh", "1310-73-2"),
    ("xphos", "564483-18-7"),
    ("sphos", "657408-07-6"),
    ("ruphos", "787618-22-8"),
    ("brettphos", "1070663-78-3"),
    ("tbuxphos", "564483-19-8"),
    ("johnphos", "224311-51-7"),
    ("xantphos", "161265-03-8"),
    ("dppe", "1663-45-2"),
    ("dppf", "12150-46-8"),
    ("binap", "98327-87-8"),
    ("pph3", "603-35-0"),
    ("110phenanthroline", "66-71-7"),
    ("phen", "66-71-7"),
    ("22bipyridine", "366-18-7"),
    ("bipy", "366-18-7"),
    ("lproline", "147-85-3"),
    ("dmeda", "110-70-3"),
    ("ethylenediamine", "107-15-3"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChemicalRole {
    StartingMaterial,
    MetalPrecursor,
    Ligand,
    Base,
    Solvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportChemical {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,
    pub cas: Option<String>,
    pub smiles: Option<String>,
    pub equivalents: Option<f64>,
    pub role: ChemicalRole,
}

impl ExportChemical {
    fn named(name: &str, cas: Option<String>, role: ChemicalRole) -> Self {
        Self {
            name: Some(name.to_string()),
            abbreviation: None,
            cas,
            smiles: None,
            equivalents: None,
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReaction {
    pub smiles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConditions {
    pub temperature: String,
    pub time: String,
    pub atmosphere: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCondition {
    pub reaction: ExportReaction,
    pub chemicals: Vec<ExportChemical>,
    pub conditions: ExportConditions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub generated_at: DateTime<Utc>,
    pub analysis_type: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInput {
    pub reaction_smiles: String,
    pub selected_reaction_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDetection {
    pub reaction_type: String,
    pub method: Detection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetEntry {
    pub name: String,
    pub pct: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetPair {
    pub a: String,
    pub b: String,
    pub pct: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetTop {
    pub ligands: Vec<SnippetEntry>,
    pub solvents: Vec<SnippetEntry>,
    pub bases: Vec<SnippetEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetCooccurrence {
    pub best_ligand_solvent: Option<SnippetPair>,
    pub best_base_solvent: Option<SnippetPair>,
}

/// Compact view of the snapshot the recommendation was blended with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnippet {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub top: SnippetTop,
    pub cooccurrence: SnippetCooccurrence,
}

impl AnalyticsSnippet {
    pub fn from_summary(source: &str, summary: &AnalyticsSummary) -> Self {
        let entries = |kind: ReagentKind| {
            summary
                .top
                .for_kind(kind)
                .iter()
                .take(SNIPPET_TOP_N)
                .map(|FrequencyEntry { name, count, pct }| SnippetEntry {
                    name: name.clone(),
                    pct: *pct,
                    count: *count,
                })
                .collect()
        };
        let best = |pairs: &[CooccurrenceEntry]| {
            pairs.first().map(|entry| SnippetPair {
                a: entry.a.clone(),
                b: entry.b.clone(),
                pct: entry.pct,
                count: entry.count,
            })
        };
        Self {
            source: source.to_string(),
            generated_at: summary.summary.generated_at,
            top: SnippetTop {
                ligands: entries(ReagentKind::Ligand),
                solvents: entries(ReagentKind::Solvent),
                bases: entries(ReagentKind::Base),
            },
            cooccurrence: SnippetCooccurrence {
                best_ligand_solvent: best(&summary.cooccurrence.ligand_solvent),
                best_base_solvent: best(&summary.cooccurrence.base_solvent),
            },
        }
    }
}

/// Consumer-facing prediction document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub meta: ExportMeta,
    pub input: ExportInput,
    pub detection: ExportDetection,
    pub dataset: DatasetInfo,
    pub top_conditions: Vec<TopCondition>,
    pub related_reactions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsSnippet>,
}

/// Splits `a.b>>c` into its reactant SMILES; empty when there is no `>>`.
pub fn split_reactants(reaction_smiles: &str) -> Vec<String> {
    reaction_smiles
        .split_once(">>")
        .map(|(lhs, _)| {
            lhs.split('.')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn alias_cas(name: &str) -> Option<&'static str> {
    let key = canonicalize(name);
    CAS_ALIASES
        .iter()
        .find(|(token, _)| *token == key)
        .map(|(_, cas)| *cas)
}

fn metal_precursor(reaction_type: &str) -> ExportChemical {
    let (name, cas) = if is_copper_mediated(reaction_type) {
        COPPER_PRECURSOR
    } else {
        PALLADIUM_PRECURSOR
    };
    ExportChemical::named(name, Some(cas.to_string()), ChemicalRole::MetalPrecursor)
}

fn reagent_cas(library: &ReagentLibrary, kind: ReagentKind, name: &str) -> Option<String> {
    library
        .repository(kind)
        .resolve(name)
        .and_then(|record| record.cas.clone())
        .or_else(|| alias_cas(name).map(str::to_string))
}

/// Assembles the export document for one report. The top three combined conditions each become
/// a full chemical list: starting materials, a metal precursor, ligand, base and solvent.
pub fn build_export_payload(
    report: &RecommendationReport,
    library: &ReagentLibrary,
    related_reactions: Vec<Value>,
    generated_at: DateTime<Utc>,
) -> ExportPayload {
    let reactants = split_reactants(&report.input.reaction_smiles);
    let top_conditions = report
        .combined_conditions
        .iter()
        .take(TOP_CONDITIONS)
        .map(|condition| {
            let mut chemicals = reactants
                .iter()
                .map(|smiles| ExportChemical {
                    name: None,
                    abbreviation: None,
                    cas: None,
                    smiles: Some(smiles.clone()),
                    equivalents: None,
                    role: ChemicalRole::StartingMaterial,
                })
                .collect::<Vec<_>>();
            chemicals.push(metal_precursor(&report.reaction_type));
            chemicals.push(ExportChemical::named(
                &condition.ligand,
                reagent_cas(library, ReagentKind::Ligand, &condition.ligand),
                ChemicalRole::Ligand,
            ));
            let base = condition
                .suggested_base
                .as_deref()
                .or(condition.typical_conditions.base.as_deref());
            if let Some(base) = base {
                chemicals.push(ExportChemical {
                    equivalents: Some(BASE_EQUIVALENTS),
                    ..ExportChemical::named(base, reagent_cas(library, ReagentKind::Base, base), ChemicalRole::Base)
                });
            }
            chemicals.push(ExportChemical {
                abbreviation: condition.solvent_abbreviation.clone(),
                ..ExportChemical::named(
                    &condition.solvent,
                    library
                        .solvents
                        .resolve(&condition.solvent)
                        .and_then(|record| record.cas.clone()),
                    ChemicalRole::Solvent,
                )
            });
            TopCondition {
                reaction: ExportReaction {
                    smiles: report.input.reaction_smiles.clone(),
                },
                chemicals,
                conditions: ExportConditions {
                    temperature: condition.typical_conditions.temperature.clone(),
                    time: condition.typical_conditions.time.clone(),
                    atmosphere: condition.typical_conditions.atmosphere.clone(),
                },
            }
        })
        .collect();

    ExportPayload {
        meta: ExportMeta {
            generated_at,
            analysis_type: report.analysis_type.clone(),
            status: report.status.clone(),
        },
        input: report.input.clone(),
        detection: ExportDetection {
            reaction_type: report.reaction_type.clone(),
            method: report.detection,
        },
        dataset: report.dataset_info.clone(),
        top_conditions,
        related_reactions,
        analytics: report
            .analytics
            .as_ref()
            .map(|summary| AnalyticsSnippet::from_summary(&report.reaction_type, summary)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxcond_core::{CombinedCondition, ConfidenceTier, TypicalConditions};

    use crate::PropertyAlternatives;

    fn mk_condition(ligand: &str, solvent: &str, base: Option<&str>) -> CombinedCondition {
        CombinedCondition {
            rank: 1,
            ligand: ligand.to_string(),
            ligand_compatibility: 0.8,
            solvent: solvent.to_string(),
            solvent_abbreviation: Some("DMSO".to_string()),
            solvent_compatibility: 0.9,
            combined_score: 0.95,
            synergy_bonus: 0.1,
            recommendation_confidence: ConfidenceTier::High,
            typical_conditions: TypicalConditions {
                temperature: "80-140°C".to_string(),
                time: "12-24 h".to_string(),
                atmosphere: "Inert (N2 or Ar)".to_string(),
                base: Some("K3PO4".to_string()),
                catalyst_loading: "5-20 mol% Cu".to_string(),
                additives: None,
            },
            suggested_base: base.map(str::to_string),
        }
    }

    fn mk_report(reaction_type: &str, conditions: Vec<CombinedCondition>) -> RecommendationReport {
        RecommendationReport {
            analysis_type: "enhanced".to_string(),
            status: "success".to_string(),
            input: ExportInput {
                reaction_smiles: "Clc1ccncc1.NCC>>CCNc1ccncc1".to_string(),
                selected_reaction_type: Some("C-N Coupling - Ullmann".to_string()),
            },
            reaction_type: reaction_type.to_string(),
            detected_from: "C-N Coupling - Ullmann".to_string(),
            detection: Detection::Label,
            ligand_recommendations: Vec::new(),
            solvent_recommendations: Vec::new(),
            base_recommendations: Vec::new(),
            combined_conditions: conditions,
            property_based_alternatives: PropertyAlternatives::default(),
            reaction_specific_notes: String::new(),
            dataset_info: DatasetInfo {
                ligands_available: 10,
                solvents_available: 5,
                reaction_types_supported: vec!["Cross-Coupling".to_string()],
                analytics_loaded: false,
            },
            analytics: None,
        }
    }

    #[test]
    fn reactants_split_on_dots_left_of_arrow() {
        assert_eq!(split_reactants("Clc1ccncc1.NCC>>CCNc1ccncc1"), vec!["Clc1ccncc1", "NCC"]);
        assert!(split_reactants("c1ccccc1").is_empty());
    }

    #[test]
    fn alias_table_matches_canonical_tokens() {
        assert_eq!(alias_cas("Cs2CO3"), Some("534-17-8"));
        assert_eq!(alias_cas("L-Proline"), Some("147-85-3"));
        assert_eq!(alias_cas("1,10-Phenanthroline"), Some("66-71-7"));
        assert_eq!(alias_cas("Unobtainium"), None);
    }

    #[test]
    fn ullmann_conditions_use_copper_and_two_equivalents_of_base() {
        let library = ReagentLibrary::embedded();
        let report = mk_report(
            "Ullmann",
            vec![
                mk_condition("1,10-Phenanthroline", "Dimethyl Sulfoxide", Some("Cs2CO3")),
                mk_condition("L-Proline", "Dimethyl Sulfoxide", None),
                mk_condition("DMEDA", "Dimethyl Sulfoxide", None),
                mk_condition("2,2'-Bipyridine", "Dimethyl Sulfoxide", None),
            ],
        );
        let generated_at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 5, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        let payload = build_export_payload(&report, &library, Vec::new(), generated_at);

        assert_eq!(payload.top_conditions.len(), TOP_CONDITIONS);
        let first = &payload.top_conditions[0];
        let roles = first.chemicals.iter().map(|c| c.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                ChemicalRole::StartingMaterial,
                ChemicalRole::StartingMaterial,
                ChemicalRole::MetalPrecursor,
                ChemicalRole::Ligand,
                ChemicalRole::Base,
                ChemicalRole::Solvent,
            ]
        );
        assert_eq!(first.chemicals[2].name.as_deref(), Some("CuI"));
        assert_eq!(first.chemicals[4].equivalents, Some(2.0));
        assert_eq!(first.chemicals[4].name.as_deref(), Some("Cs2CO3"));
        assert_eq!(first.chemicals[5].cas.as_deref(), Some("67-68-5"));
        assert_eq!(first.conditions.temperature, "80-140°C");

        // Without a suggested base the typical-conditions base is used.
        let second = &payload.top_conditions[1];
        assert_eq!(second.chemicals[4].name.as_deref(), Some("K3PO4"));

        assert_eq!(payload.meta.status, "success");
        assert!(payload.analytics.is_none());
        let json = serde_json::to_value(&payload).expect("serialize");
        assert!(json.get("analytics").is_none());
        assert!(json.get("recommendations").is_none());
        assert_eq!(json["top_conditions"][0]["chemicals"][0]["role"], "starting_material");
    }

    #[test]
    fn palladium_is_the_default_precursor() {
        let library = ReagentLibrary::embedded();
        let report = mk_report("Cross-Coupling", vec![mk_condition("XPhos", "Toluene", Some("K3PO4"))]);
        let payload = build_export_payload(&report, &library, vec![serde_json::json!({"reaction_id": 7})], Utc::now());
        let precursor = &payload.top_conditions[0].chemicals[2];
        assert_eq!(precursor.name.as_deref(), Some("Pd(OAc)2"));
        assert_eq!(precursor.cas.as_deref(), Some("3375-31-3"));
        assert_eq!(payload.top_conditions[0].chemicals[3].cas.as_deref(), Some("564483-18-7"));
        assert_eq!(payload.related_reactions.len(), 1);
    }
}
