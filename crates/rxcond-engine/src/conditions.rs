use rxcond_adapters::{strip_metal_tag, Normalizer};
use rxcond_core::{
    is_copper_mediated, round_to, CombinedCondition, ConfidenceTier, ReactionCategory, Recommendation,
    TypicalConditions,
};

/// Ligands and solvents crossed when building combined conditions.
pub const COMBINATION_WIDTH: usize = 3;
pub const COMBINATION_LIMIT: usize = 5;

/// Lookup key for the condition tables: the five categories plus the copper-mediated family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionFamily {
    Ullmann,
    Category(ReactionCategory),
}

impl ConditionFamily {
    pub fn for_reaction_type(reaction_type: &str) -> Option<Self> {
        if is_copper_mediated(reaction_type) {
            return Some(ConditionFamily::Ullmann);
        }
        ReactionCategory::from_label(strip_metal_tag(reaction_type)).map(ConditionFamily::Category)
    }
}

type Synergy = (&'static str, &'static str, f64);

const CROSS_COUPLING_SYNERGY: &[Synergy] = &[
    ("SPhos", "DMF", 0.10),
    ("XPhos", "THF", 0.10),
    ("RuPhos", "DMF", 0.08),
    ("BINAP", "Toluene", 0.05),
    ("PPh3", "THF", 0.05),
];

const ULLMANN_SYNERGY: &[Synergy] = &[
    ("1,10-Phenanthroline", "DMSO", 0.10),
    ("2,2'-Bipyridine", "DMSO", 0.10),
    ("L-Proline", "DMSO", 0.08),
    ("Ethylenediamine", "DMF", 0.08),
    ("DMEDA", "Toluene", 0.06),
];

const HYDROGENATION_SYNERGY: &[Synergy] = &[
    ("BINAP", "Ethanol", 0.15),
    ("Tol-BINAP", "Methanol", 0.15),
    ("PPh3", "Ethanol", 0.08),
    ("DPPF", "Ethanol", 0.08),
];

const METATHESIS_SYNERGY: &[Synergy] = &[
    ("IPr", "Dichloromethane", 0.12),
    ("IMes", "Dichloromethane", 0.12),
    ("SIPr", "Toluene", 0.10),
];

pub fn synergy_table(family: ConditionFamily) -> &'static [Synergy] {
    match family {
        ConditionFamily::Ullmann => ULLMANN_SYNERGY,
        ConditionFamily::Category(ReactionCategory::CrossCoupling) => CROSS_COUPLING_SYNERGY,
        ConditionFamily::Category(ReactionCategory::Hydrogenation) => HYDROGENATION_SYNERGY,
        ConditionFamily::Category(ReactionCategory::Metathesis) => METATHESIS_SYNERGY,
        ConditionFamily::Category(_) => &[],
    }
}

/// Fixed bonus for a known-good pairing; names compare after synonym mapping, and the
/// solvent may match by abbreviation.
pub fn synergy_bonus(ligand: &str, solvent: &str, solvent_abbreviation: Option<&str>, reaction_type: &str) -> f64 {
    let Some(family) = ConditionFamily::for_reaction_type(reaction_type) else {
        return 0.0;
    };
    let normalizer = Normalizer::default();
    let ligand_key = normalizer.map_ligand(ligand);
    let solvent_keys = std::iter::once(solvent)
        .chain(solvent_abbreviation)
        .map(|name| normalizer.map_solvent(name))
        .collect::<Vec<_>>();
    synergy_table(family)
        .iter()
        .find(|(l, s, _)| normalizer.map_ligand(l) == ligand_key && solvent_keys.contains(&normalizer.map_solvent(s)))
        .map(|(_, _, bonus)| *bonus)
        .unwrap_or(0.0)
}

fn conditions(
    temperature: &str,
    time: &str,
    atmosphere: &str,
    base: Option<&str>,
    catalyst_loading: &str,
    additives: Option<&str>,
) -> TypicalConditions {
    TypicalConditions {
        temperature: temperature.to_string(),
        time: time.to_string(),
        atmosphere: atmosphere.to_string(),
        base: base.map(str::to_string),
        catalyst_loading: catalyst_loading.to_string(),
        additives: additives.map(str::to_string),
    }
}

pub fn typical_conditions(reaction_type: &str) -> TypicalConditions {
    match ConditionFamily::for_reaction_type(reaction_type) {
        Some(ConditionFamily::Ullmann) => conditions(
            "80-140°C",
            "6-24 hours",
            "Inert (N₂ or Ar)",
            Some("K₂CO₃, Cs₂CO₃, K₃PO₄ or KOtBu"),
            "5-20 mol% Cu",
            Some("Ligands: phen, bipy, L-proline, diamines"),
        ),
        Some(ConditionFamily::Category(ReactionCategory::CrossCoupling)) => conditions(
            "80-120°C",
            "4-24 hours",
            "Inert (N₂ or Ar)",
            Some("K₂CO₃ or Cs₂CO₃"),
            "1-5 mol%",
            None,
        ),
        Some(ConditionFamily::Category(ReactionCategory::Hydrogenation)) => conditions(
            "20-80°C",
            "2-16 hours",
            "H₂ (1-50 atm)",
            None,
            "0.1-2 mol%",
            Some("May require acid"),
        ),
        Some(ConditionFamily::Category(ReactionCategory::Metathesis)) => conditions(
            "20-60°C",
            "1-8 hours",
            "Inert (N₂ or Ar)",
            None,
            "1-5 mol%",
            Some("Avoid moisture"),
        ),
        Some(ConditionFamily::Category(ReactionCategory::ChActivation)) => conditions(
            "100-160°C",
            "6-48 hours",
            "Inert or air",
            None,
            "5-10 mol%",
            Some("May require oxidant"),
        ),
        Some(ConditionFamily::Category(ReactionCategory::Carbonylation)) => conditions(
            "60-140°C",
            "4-24 hours",
            "CO (1-20 atm)",
            Some("Organic base (Et₃N)"),
            "1-5 mol%",
            None,
        ),
        None => conditions("20-100°C", "1-24 hours", "Inert", None, "1-5 mol%", None),
    }
}

pub const GENERAL_NOTES: &str = "General organometallic reaction guidelines apply.";

pub fn reaction_notes(reaction_type: &str) -> &'static str {
    match ConditionFamily::for_reaction_type(reaction_type) {
        Some(ConditionFamily::Ullmann) => "Ullmann coupling optimization tips:
- Copper sources: CuI, CuBr, Cu(OAc)₂, Cu₂O; often with simple ligands
- Ligands: diamines (e.g. ethylenediamine), amino acids (e.g. L-proline), phenanthroline
- Bases: K₂CO₃, Cs₂CO₃, K₃PO₄, KOtBu; water sometimes beneficial
- Solvents: DMSO, DMF, toluene, dioxane; 80-140°C typical
- For C-O/C-N: substrate electronics impact rates; consider a stronger base for aryl chlorides",
        Some(ConditionFamily::Category(ReactionCategory::CrossCoupling)) => "Cross-coupling optimization tips:
- Use bulky phosphines (XPhos, SPhos) for challenging substrates
- Polar aprotic solvents (DMF, NMP) often give best results
- Base choice: K₂CO₃ for most substrates, Cs₂CO₃ for difficult cases
- Temperature typically 80-120°C depending on substrate reactivity
- Degassing is critical; use Schlenk techniques or a glovebox",
        Some(ConditionFamily::Category(ReactionCategory::Hydrogenation)) => "Hydrogenation optimization tips:
- Bidentate ligands (BINAP, DuPhos) are excellent for asymmetric reductions
- Protic solvents (alcohols) often enhance reactivity
- Start with low pressure (1-5 atm H₂) and increase if needed
- Temperature usually mild (20-80°C) to avoid over-reduction
- Check for catalyst poisoning from sulfur or nitrogen compounds",
        Some(ConditionFamily::Category(ReactionCategory::Metathesis)) => "Metathesis optimization tips:
- NHC ligands (IPr, IMes) provide high activity and stability
- Non-coordinating solvents (DCM, toluene) are preferred
- Strict exclusion of moisture and oxygen is essential
- Low catalyst loadings (1-5 mol%) are usually sufficient
- Consider ring-closing vs cross-metathesis selectivity",
        Some(ConditionFamily::Category(ReactionCategory::ChActivation)) => "C-H activation optimization tips:
- High temperatures (100-160°C) are often required
- Polar solvents (DMSO, DMF) can facilitate C-H cleavage
- Consider directing groups for regioselectivity
- Oxidants may be required for catalytic turnover
- Screen different bases for optimal reactivity",
        Some(ConditionFamily::Category(ReactionCategory::Carbonylation)) => "Carbonylation optimization tips:
- CO pressure is critical for good conversion (1-20 atm)
- Polar solvents (DMF, NMP) enhance CO solubility
- Phosphine ligands (PPh3, DPPF) are commonly effective
- Base helps remove HX byproducts
- Monitor for catalyst degradation at high CO pressure",
        None => GENERAL_NOTES,
    }
}

/// Crosses the top three ligands with the top three solvents, scores each pair as the mean
/// compatibility plus its synergy bonus, and keeps the best five.
pub fn rank_combinations(
    ligands: &[Recommendation],
    solvents: &[Recommendation],
    reaction_type: &str,
) -> Vec<CombinedCondition> {
    let typical = typical_conditions(reaction_type);
    let mut combined = Vec::new();
    for ligand in ligands.iter().take(COMBINATION_WIDTH) {
        for solvent in solvents.iter().take(COMBINATION_WIDTH) {
            let synergy = synergy_bonus(
                &ligand.name,
                &solvent.name,
                solvent.abbreviation.as_deref(),
                reaction_type,
            );
            let score = (ligand.compatibility_score + solvent.compatibility_score) / 2.0 + synergy;
            combined.push(CombinedCondition {
                rank: combined.len() + 1,
                ligand: ligand.name.clone(),
                ligand_compatibility: ligand.compatibility_score,
                solvent: solvent.name.clone(),
                solvent_abbreviation: solvent.abbreviation.clone(),
                solvent_compatibility: solvent.compatibility_score,
                combined_score: round_to(score, 3),
                synergy_bonus: round_to(synergy, 3),
                recommendation_confidence: ConfidenceTier::from_score(score),
                typical_conditions: typical.clone(),
                suggested_base: None,
            });
        }
    }
    combined.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    combined.truncate(COMBINATION_LIMIT);
    for (idx, condition) in combined.iter_mut().enumerate() {
        condition.rank = idx + 1;
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxcond_core::{ReagentKind, RecommendationSource};

    fn mk_rec(kind: ReagentKind, name: &str, abbreviation: Option<&str>, score: f64) -> Recommendation {
        Recommendation {
            rank: 0,
            kind,
            name: name.to_string(),
            abbreviation: abbreviation.map(str::to_string),
            compatibility_score: score,
            similarity_score: None,
            combined_score: None,
            applications: String::new(),
            reaction_suitability: String::new(),
            source: RecommendationSource::Table,
        }
    }

    #[test]
    fn family_lookup_strips_metal_tags() {
        assert_eq!(ConditionFamily::for_reaction_type("Ullmann"), Some(ConditionFamily::Ullmann));
        assert_eq!(
            ConditionFamily::for_reaction_type("Hydrogenation (Rh)"),
            Some(ConditionFamily::Category(ReactionCategory::Hydrogenation))
        );
        assert_eq!(ConditionFamily::for_reaction_type("General Organic Reaction"), None);
    }

    #[test]
    fn synergy_matches_through_synonyms_and_abbreviations() {
        assert_eq!(synergy_bonus("1,10-Phenanthroline", "Dimethyl Sulfoxide", Some("DMSO"), "Ullmann"), 0.10);
        assert_eq!(synergy_bonus("SPhos", "Dimethylformamide", None, "Cross-Coupling"), 0.10);
        assert_eq!(synergy_bonus("XPhos", "THF", None, "Cross-Coupling"), 0.10);
        assert_eq!(synergy_bonus("XPhos", "THF", None, "Metathesis"), 0.0);
        assert_eq!(synergy_bonus("XPhos", "THF", None, "General Organic Reaction"), 0.0);
    }

    #[test]
    fn typical_conditions_fall_back_for_unknown_types() {
        let ullmann = typical_conditions("Ullmann");
        assert_eq!(ullmann.temperature, "80-140°C");
        assert_eq!(ullmann.catalyst_loading, "5-20 mol% Cu");
        let fallback = typical_conditions("Mystery");
        assert_eq!(fallback.atmosphere, "Inert");
        assert!(fallback.base.is_none());
        assert_eq!(reaction_notes("Mystery"), GENERAL_NOTES);
        assert!(reaction_notes("Ullmann").contains("L-proline"));
    }

    #[test]
    fn combinations_rank_by_mean_plus_synergy() {
        let ligands = vec![
            mk_rec(ReagentKind::Ligand, "XPhos", None, 0.9),
            mk_rec(ReagentKind::Ligand, "SPhos", None, 0.8),
            mk_rec(ReagentKind::Ligand, "PPh3", None, 0.5),
            mk_rec(ReagentKind::Ligand, "BINAP", None, 0.99),
        ];
        let solvents = vec![
            mk_rec(ReagentKind::Solvent, "Toluene", None, 0.9),
            mk_rec(ReagentKind::Solvent, "Dimethylformamide", Some("DMF"), 0.8),
            mk_rec(ReagentKind::Solvent, "THF", None, 0.7),
        ];
        let combined = rank_combinations(&ligands, &solvents, "Cross-Coupling");

        assert_eq!(combined.len(), COMBINATION_LIMIT);
        assert_eq!((combined[0].ligand.as_str(), combined[0].solvent.as_str()), ("XPhos", "Toluene"));
        assert_eq!(combined[0].combined_score, 0.9);
        assert_eq!(combined[0].recommendation_confidence, ConfidenceTier::High);

        let xphos_thf = &combined[1];
        assert_eq!((xphos_thf.ligand.as_str(), xphos_thf.solvent.as_str()), ("XPhos", "THF"));
        assert_eq!(xphos_thf.synergy_bonus, 0.1);

        let sphos_dmf = &combined[2];
        assert_eq!((sphos_dmf.ligand.as_str(), sphos_dmf.solvent.as_str()), ("SPhos", "Dimethylformamide"));
        assert_eq!(sphos_dmf.synergy_bonus, 0.1);
        assert_eq!(sphos_dmf.combined_score, 0.9);
        assert_eq!(sphos_dmf.solvent_abbreviation.as_deref(), Some("DMF"));

        assert!(combined.iter().all(|c| c.ligand != "BINAP"));
        assert!(combined.windows(2).all(|w| w[0].combined_score >= w[1].combined_score));
        assert_eq!(combined.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn confidence_tiers_follow_thresholds() {
        let ligands = vec![mk_rec(ReagentKind::Ligand, "L1", None, 0.6)];
        let solvents = vec![mk_rec(ReagentKind::Solvent, "S1", None, 0.6)];
        let combined = rank_combinations(&ligands, &solvents, "Mystery");
        assert_eq!(combined[0].recommendation_confidence, ConfidenceTier::Low);
        assert!(rank_combinations(&[], &solvents, "Mystery").is_empty());
    }
}
