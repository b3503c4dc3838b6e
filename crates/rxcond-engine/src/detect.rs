use std::sync::OnceLock;

use regex::Regex;
use rxcond_adapters::strip_metal_tag;
use rxcond_core::{is_copper_mediated, ReactionCategory};

pub const GENERAL_REACTION: &str = "General Organic Reaction";

pub const AUTO_DETECT_LABELS: [&str; 2] = ["Auto-detect", "Auto detect reaction type"];

const CROSS_COUPLING_NAMES: [&str; 8] = [
    "suzuki",
    "buchwald",
    "heck",
    "sonogashira",
    "stille",
    "negishi",
    "chan-lam",
    "chan lam",
];

/// Where the resolved type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    Label,
    Smiles,
    Fallback,
}

fn halogen() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Br|Cl|I").expect("halogen pattern compiles"))
}

fn boronic_acid() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"B\(O\)").expect("boron pattern compiles"))
}

fn aliphatic_nitrogen() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"N(?:[^a-z]|$)").expect("nitrogen pattern compiles"))
}

/// Maps a user-facing reaction label to the engine's type, or `None` when unrecognized.
///
/// `"Suzuki-Miyaura Coupling (Pd)"` -> `Cross-Coupling`, `"C-O Coupling - Ullmann (Cu)"` -> `Ullmann`,
/// `"Oxidation"` -> `C-H_Activation`.
pub fn map_reaction_label(label: &str) -> Option<&'static str> {
    let base = strip_metal_tag(label);
    if base.is_empty() {
        return None;
    }
    if is_copper_mediated(base) {
        return Some("Ullmann");
    }
    if let Some(category) = ReactionCategory::from_label(base) {
        return Some(category.as_str());
    }
    let lower = base.to_lowercase();
    if CROSS_COUPLING_NAMES.iter().any(|name| lower.contains(name)) {
        Some(ReactionCategory::CrossCoupling.as_str())
    } else if lower == "oxidation" || lower == "c-h activation" {
        Some(ReactionCategory::ChActivation.as_str())
    } else {
        None
    }
}

fn unsaturation(side: &str) -> usize {
    side.matches('=').count() + side.matches('#').count() * 2
}

fn carbonyls(side: &str) -> usize {
    side.matches("C=O").count() + side.matches("C(=O)").count()
}

fn carbon_atoms(side: &str) -> usize {
    side.chars().filter(|c| matches!(c, 'c' | 'C')).count()
}

/// Token-count heuristics over a `reactants>>products` string; no SMILES parsing.
pub fn detect_from_smiles(reaction_smiles: &str) -> &'static str {
    let Some((reactants, products)) = reaction_smiles.split_once(">>") else {
        return GENERAL_REACTION;
    };
    let has_halogen = halogen().is_match(reactants);
    if has_halogen && (boronic_acid().is_match(reactants) || aliphatic_nitrogen().is_match(reactants)) {
        return ReactionCategory::CrossCoupling.as_str();
    }
    if unsaturation(products) < unsaturation(reactants) {
        return ReactionCategory::Hydrogenation.as_str();
    }
    if carbonyls(products) > carbonyls(reactants) {
        return ReactionCategory::Carbonylation.as_str();
    }
    if carbon_atoms(products) as f64 > carbon_atoms(reactants) as f64 * 1.2 {
        return ReactionCategory::ChActivation.as_str();
    }
    ReactionCategory::CrossCoupling.as_str()
}

/// A selected label wins when it maps; otherwise the SMILES decides.
pub fn resolve_reaction_type(reaction_smiles: &str, selected: Option<&str>) -> (String, Detection) {
    let selected = selected
        .map(str::trim)
        .filter(|label| !label.is_empty() && !AUTO_DETECT_LABELS.contains(label));
    if let Some(mapped) = selected.and_then(map_reaction_label) {
        return (mapped.to_string(), Detection::Label);
    }
    let detected = detect_from_smiles(reaction_smiles);
    let detection = if detected == GENERAL_REACTION {
        Detection::Fallback
    } else {
        Detection::Smiles
    };
    (detected.to_string(), detection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gui_labels_map_to_engine_types() {
        assert_eq!(map_reaction_label("Suzuki-Miyaura Coupling (Pd)"), Some("Cross-Coupling"));
        assert_eq!(map_reaction_label("C-N Coupling - Buchwald-Hartwig"), Some("Cross-Coupling"));
        assert_eq!(map_reaction_label("C-N Oxidative Coupling - Chan-Lam (Cu)"), Some("Cross-Coupling"));
        assert_eq!(map_reaction_label("C-O Coupling - Ullmann Ether (Cu)"), Some("Ullmann"));
        assert_eq!(map_reaction_label("Oxidation"), Some("C-H_Activation"));
        assert_eq!(map_reaction_label("Metathesis"), Some("Metathesis"));
        assert_eq!(map_reaction_label("Carbonylation"), Some("Carbonylation"));
        assert_eq!(map_reaction_label("Diels-Alder"), None);
    }

    #[test]
    fn smiles_heuristics() {
        assert_eq!(detect_from_smiles("Brc1ccccc1.OB(O)c1ccccc1>>c1ccc(-c2ccccc2)cc1"), "Cross-Coupling");
        assert_eq!(detect_from_smiles("Brc1ccccc1.NC1CCCCC1>>c1ccc(NC2CCCCC2)cc1"), "Cross-Coupling");
        assert_eq!(detect_from_smiles("C=CC>>CCC"), "Hydrogenation");
        assert_eq!(detect_from_smiles("Ic1ccccc1.CO>>COC(=O)c1ccccc1"), "Carbonylation");
        assert_eq!(detect_from_smiles("C>>c1ccccc1"), "C-H_Activation");
        assert_eq!(detect_from_smiles("c1ccccc1>>c1ccccc1"), "Cross-Coupling");
        assert_eq!(detect_from_smiles("c1ccccc1"), GENERAL_REACTION);
    }

    #[test]
    fn selected_label_beats_smiles_unless_auto() {
        let smiles = "C=CC>>CCC";
        assert_eq!(
            resolve_reaction_type(smiles, Some("Ullmann Reaction (Cu)")),
            ("Ullmann".to_string(), Detection::Label)
        );
        assert_eq!(
            resolve_reaction_type(smiles, Some("Auto-detect")),
            ("Hydrogenation".to_string(), Detection::Smiles)
        );
        assert_eq!(
            resolve_reaction_type("", Some("Diels-Alder")),
            (GENERAL_REACTION.to_string(), Detection::Fallback)
        );
    }
}
