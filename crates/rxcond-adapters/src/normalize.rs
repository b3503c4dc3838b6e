//! Canonical forms for free-text reagent names and numeric cells.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rxcond_core::ReagentKind;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Lowercased, diacritic-free, `[a-z0-9]`-only form of a token.
///
/// Idempotent: `canonicalize(&canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(token: &str) -> String {
    let folded = token
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .replace(['\u{00b5}', '\u{03bc}'], "u");
    folded
        .nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Canonical key -> synonyms. Lookups are exact on canonical forms, never fuzzy.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    index: HashMap<String, String>,
}

impl SynonymTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [&'a str])>) -> Self {
        let mut index = HashMap::new();
        for (key, synonyms) in entries {
            let canonical_key = canonicalize(key);
            index
                .entry(canonical_key.clone())
                .or_insert_with(|| canonical_key.clone());
            for synonym in synonyms {
                index
                    .entry(canonicalize(synonym))
                    .or_insert_with(|| canonical_key.clone());
            }
        }
        Self { index }
    }

    pub fn builtin(kind: SynonymKind) -> Self {
        match kind {
            SynonymKind::Base => Self::new(BASE_SYNONYMS.iter().copied()),
            SynonymKind::Solvent => Self::new(SOLVENT_SYNONYMS.iter().copied()),
            SynonymKind::Ligand => Self::new(LIGAND_SYNONYMS.iter().copied()),
            SynonymKind::Metal => Self::new(METAL_SYNONYMS.iter().copied()),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Maps a token to its canonical key, or returns the canonicalized token unchanged.
pub fn synonym_lookup(token: &str, table: &SynonymTable) -> String {
    let canonical = canonicalize(token);
    table.index.get(&canonical).cloned().unwrap_or(canonical)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynonymKind {
    Base,
    Solvent,
    Ligand,
    Metal,
}

impl From<ReagentKind> for SynonymKind {
    fn from(kind: ReagentKind) -> Self {
        match kind {
            ReagentKind::Ligand => SynonymKind::Ligand,
            ReagentKind::Solvent => SynonymKind::Solvent,
            ReagentKind::Base => SynonymKind::Base,
        }
    }
}

const BASE_SYNONYMS: &[(&str, &[&str])] = &[
    ("k2co3", &["potassium carbonate", "k_2co_3", "potassium carbonate (k2co3)"]),
    ("cs2co3", &["cesium carbonate", "caesium carbonate", "cesium carbonate (cs2co3)"]),
    ("na2co3", &["sodium carbonate", "sodium carbonate (na2co3)"]),
    ("kotbu", &["potassium tert-butoxide", "potassium t-butoxide", "t-buok", "tbuok", "ko-tbu"]),
    ("naotbu", &["sodium tert-butoxide", "sodium t-butoxide", "tbuona"]),
    ("k3po4", &["tripotassium phosphate", "potassium phosphate", "potassium phosphate tribasic"]),
    ("koac", &["potassium acetate", "k acetate"]),
    ("naome", &["sodium methoxide", "na ome"]),
    ("koh", &["potassium hydroxide"]),
    ("naoh", &["sodium hydroxide"]),
    ("tea", &["triethylamine", "et3n", "net3"]),
    ("dipea", &["diisopropylethylamine", "n,n-diisopropylethylamine", "hunig's base"]),
];

const SOLVENT_SYNONYMS: &[(&str, &[&str])] = &[
    ("dmf", &["n,n-dimethylformamide", "dimethylformamide"]),
    ("dmso", &["dimethyl sulfoxide", "dms o", "dm s o", "dimethylsulfoxide", "dimethyl sulphoxide"]),
    ("toluene", &["phme", "methylbenzene"]),
    ("meoh", &["methanol"]),
    ("etoh", &["ethanol"]),
    ("acn", &["acetonitrile", "me cn", "mecn", "me-c n"]),
    ("nmp", &["n-methyl-2-pyrrolidone", "n-methylpyrrolidone"]),
    ("dioxane", &["1,4-dioxane", "diox"]),
    ("thf", &["tetrahydrofuran"]),
];

const LIGAND_SYNONYMS: &[(&str, &[&str])] = &[
    ("lproline", &["l-proline", "l proline", "proline"]),
    ("phen", &["1,10-phenanthroline", "o-phenanthroline", "phenanthroline"]),
    ("bipy", &["2,2'-bipyridine", "bipyridine", "bpy"]),
    ("pph3", &["triphenylphosphine", "p(ph)3", "p ph3"]),
    ("xphos", &["x-phos"]),
    ("dmeda", &["n,n'-dimethylethylenediamine", "dimethylethylenediamine"]),
];

const METAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("cu", &["copper", "cui", "cu(i)", "cu(ii)", "cuprous iodide", "cupric acetate", "cu2o", "cubr"]),
    ("pd", &["palladium", "pd(oac)2", "pd2(dba)3"]),
    ("ni", &["nickel"]),
];

/// Built-in synonym tables bundled per reagent class.
#[derive(Debug, Clone)]
pub struct Normalizer {
    bases: SynonymTable,
    solvents: SynonymTable,
    ligands: SynonymTable,
    metals: SynonymTable,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            bases: SynonymTable::builtin(SynonymKind::Base),
            solvents: SynonymTable::builtin(SynonymKind::Solvent),
            ligands: SynonymTable::builtin(SynonymKind::Ligand),
            metals: SynonymTable::builtin(SynonymKind::Metal),
        }
    }
}

impl Normalizer {
    pub fn table(&self, kind: SynonymKind) -> &SynonymTable {
        match kind {
            SynonymKind::Base => &self.bases,
            SynonymKind::Solvent => &self.solvents,
            SynonymKind::Ligand => &self.ligands,
            SynonymKind::Metal => &self.metals,
        }
    }

    pub fn map(&self, kind: SynonymKind, name: &str) -> String {
        match kind {
            SynonymKind::Solvent => self.map_solvent(name),
            other => synonym_lookup(name, self.table(other)),
        }
    }

    pub fn map_reagent(&self, kind: ReagentKind, name: &str) -> String {
        self.map(kind.into(), name)
    }

    pub fn map_base(&self, name: &str) -> String {
        synonym_lookup(name, &self.bases)
    }

    pub fn map_solvent(&self, name: &str) -> String {
        synonym_lookup(&name.replace("DMS O", "DMSO"), &self.solvents)
    }

    pub fn map_ligand(&self, name: &str) -> String {
        synonym_lookup(name, &self.ligands)
    }

    pub fn map_metal(&self, name: &str) -> String {
        synonym_lookup(name, &self.metals)
    }
}

/// Splits a solvent mixture such as `"Toluene/EtOH"` or `"DMF and water"`.
pub fn split_mixture(text: &str) -> Vec<String> {
    text.replace(" and ", ";")
        .split(['/', ':', ',', '+', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericUnit {
    #[serde(rename = "c")]
    Celsius,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "mol%")]
    MolPercent,
    #[serde(rename = "equiv")]
    Equivalents,
}

impl NumericUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            NumericUnit::Celsius => "c",
            NumericUnit::Hours => "h",
            NumericUnit::MolPercent => "mol%",
            NumericUnit::Equivalents => "equiv",
        }
    }
}

impl fmt::Display for NumericUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"[-+]?[0-9]*\.?[0-9]+").expect("number pattern compiles"))
}

fn equiv_word_pattern() -> &'static Regex {
    static EQ: OnceLock<Regex> = OnceLock::new();
    EQ.get_or_init(|| Regex::new(r"\beq\b").expect("eq pattern compiles"))
}

/// First decimal number in `text` plus a unit guess; `(None, None)` when there is no number.
///
/// Unit checks run in a fixed order, so `"5 mol% at 110 C"` classifies as `mol%`.
pub fn parse_numeric(text: &str) -> (Option<f64>, Option<NumericUnit>) {
    let normalized = text.nfkc().collect::<String>().trim().replace(',', ".");
    let lower = normalized.to_lowercase();
    let Some(found) = number_pattern().find(&lower) else {
        return (None, None);
    };
    let Ok(value) = found.as_str().parse::<f64>() else {
        return (None, None);
    };

    let unit = if lower.contains("mol") {
        Some(NumericUnit::MolPercent)
    } else if lower.contains("°c") || lower.ends_with(" c") || lower.contains(" deg c") || lower == "c" {
        Some(NumericUnit::Celsius)
    } else if lower.contains('h') || lower.ends_with(" hours") {
        Some(NumericUnit::Hours)
    } else if lower.contains("equiv") || equiv_word_pattern().is_match(&lower) {
        Some(NumericUnit::Equivalents)
    } else {
        None
    };
    (Some(value), unit)
}
