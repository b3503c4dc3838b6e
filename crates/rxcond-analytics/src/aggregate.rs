use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use rxcond_adapters::{canonicalize, parse_list_cell, strip_metal_tag, Normalizer, SynonymKind};
use rxcond_core::{
    is_copper_mediated, round_to, AnalyticsSummary, CooccurrenceEntry, CooccurrenceLists, FrequencyEntry,
    NumericStat, NumericStatsTable, SummaryHeader, SummaryNotes, TopLists, UnifiedReactionRow,
};

pub const WINSOR_LOW: f64 = 0.05;
pub const WINSOR_HIGH: f64 = 0.95;

pub const NORMALIZATIONS_APPLIED: [&str; 3] = [
    "canonicalize tokens",
    "synonym maps (in-module)",
    "split CSV list-like fields",
];

/// Counter that remembers first-seen order so equal counts rank deterministically.
#[derive(Debug, Clone)]
pub(crate) struct Tally<K> {
    entries: Vec<(K, u64)>,
    index: HashMap<K, usize>,
}

impl<K> Default for Tally<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> Tally<K> {
    pub(crate) fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(idx) => self.entries[*idx].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    pub(crate) fn ranked(&self) -> Vec<(K, u64)> {
        let mut out = self.entries.clone();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }
}

/// Substring key a row's reaction type must contain to be counted.
pub fn reaction_match_key(reaction_type: &str) -> String {
    if is_copper_mediated(reaction_type) {
        "ullmann".to_string()
    } else {
        canonicalize(strip_metal_tag(reaction_type))
    }
}

/// An empty key matches nothing.
pub fn row_matches(row: &UnifiedReactionRow, match_key: &str) -> bool {
    !match_key.is_empty() && canonicalize(&row.reaction_type).contains(match_key)
}

/// Splits a raw reagent cell, maps each token through the synonym table and drops repeats.
pub fn normalized_tokens(cell: Option<&str>, kind: SynonymKind, normalizer: &Normalizer) -> Vec<String> {
    let Some(cell) = cell else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    parse_list_cell(cell)
        .iter()
        .map(|token| normalizer.map(kind, token))
        .filter(|token| !token.is_empty() && seen.insert(token.clone()))
        .collect()
}

/// Nearest-rank selection at index `floor((n - 1) * q)` of an ascending slice.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() - 1) as f64 * q).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Sorted copy with values outside the `[low, high]` percentiles clamped to them.
pub fn winsorize(values: &[f64], low: f64, high: f64) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (Some(lo), Some(hi)) = (percentile(&sorted, low), percentile(&sorted, high)) else {
        return sorted;
    };
    sorted.into_iter().map(|value| value.clamp(lo, hi)).collect()
}

pub fn numeric_stat(values: &[f64]) -> NumericStat {
    let winsorized = winsorize(values, WINSOR_LOW, WINSOR_HIGH);
    NumericStat {
        median: percentile(&winsorized, 0.5),
        p25: percentile(&winsorized, 0.25),
        p75: percentile(&winsorized, 0.75),
        n: values.len(),
    }
}

fn top_list(tally: &Tally<String>, total: usize) -> Vec<FrequencyEntry> {
    if total == 0 {
        return Vec::new();
    }
    tally
        .ranked()
        .into_iter()
        .map(|(name, count)| FrequencyEntry {
            name,
            count,
            pct: round_to(count as f64 / total as f64, 4),
        })
        .collect()
}

fn pair_list(tally: &Tally<(String, String)>, total: usize) -> Vec<CooccurrenceEntry> {
    tally
        .ranked()
        .into_iter()
        .map(|((a, b), count)| CooccurrenceEntry {
            a,
            b,
            count,
            pct: if total > 0 {
                round_to(count as f64 / total as f64, 4)
            } else {
                0.0
            },
        })
        .collect()
}

fn pairs(tally: &mut Tally<(String, String)>, left: &[String], right: &[String]) {
    for a in left {
        for b in right {
            tally.add((a.clone(), b.clone()));
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    metals: Tally<String>,
    ligands: Tally<String>,
    bases: Tally<String>,
    solvents: Tally<String>,
    additives: Tally<String>,
    ligand_solvent: Tally<(String, String)>,
    base_solvent: Tally<(String, String)>,
    catalyst_ligand: Tally<(String, String)>,
    temperatures: Vec<f64>,
    times: Vec<f64>,
    yields: Vec<f64>,
}

fn push_finite(values: &mut Vec<f64>, value: Option<f64>) {
    if let Some(value) = value.filter(|v| v.is_finite()) {
        values.push(value);
    }
}

/// Frequency, co-occurrence and winsorized numeric statistics for one reaction type.
///
/// Pure in its inputs: `generated_at` is passed in, and `dataset_versions` and
/// `notes.missing_columns` are left for the caller to fill.
pub fn aggregate(rows: &[UnifiedReactionRow], reaction_type: &str, generated_at: DateTime<Utc>) -> AnalyticsSummary {
    let normalizer = Normalizer::default();
    let key = reaction_match_key(reaction_type);
    let mut counters = Counters::default();
    let mut analyzed = 0usize;

    for row in rows.iter().filter(|row| row_matches(row, &key)) {
        analyzed += 1;
        let metals = normalized_tokens(row.metal.as_deref(), SynonymKind::Metal, &normalizer);
        let ligands = normalized_tokens(row.ligand.as_deref(), SynonymKind::Ligand, &normalizer);
        let bases = normalized_tokens(row.base.as_deref(), SynonymKind::Base, &normalizer);
        let solvents = normalized_tokens(row.solvent.as_deref(), SynonymKind::Solvent, &normalizer);
        let mut seen = HashSet::new();
        let additives = row
            .additives
            .iter()
            .map(|additive| canonicalize(additive))
            .filter(|token| !token.is_empty() && seen.insert(token.clone()))
            .collect::<Vec<_>>();

        for token in &metals {
            counters.metals.add(token.clone());
        }
        for token in &ligands {
            counters.ligands.add(token.clone());
        }
        for token in &bases {
            counters.bases.add(token.clone());
        }
        for token in &solvents {
            counters.solvents.add(token.clone());
        }
        for token in additives {
            counters.additives.add(token);
        }

        pairs(&mut counters.ligand_solvent, &ligands, &solvents);
        pairs(&mut counters.base_solvent, &bases, &solvents);
        pairs(&mut counters.catalyst_ligand, &metals, &ligands);

        push_finite(&mut counters.temperatures, row.temperature_c);
        push_finite(&mut counters.times, row.time_h);
        push_finite(&mut counters.yields, row.yield_pct);
    }

    AnalyticsSummary {
        summary: SummaryHeader {
            total_rows: rows.len(),
            analyzed_rows: analyzed,
            generated_at,
            dataset_versions: BTreeMap::new(),
        },
        top: TopLists {
            metals: top_list(&counters.metals, analyzed),
            ligands: top_list(&counters.ligands, analyzed),
            bases: top_list(&counters.bases, analyzed),
            solvents: top_list(&counters.solvents, analyzed),
            additives: top_list(&counters.additives, analyzed),
        },
        cooccurrence: CooccurrenceLists {
            ligand_solvent: pair_list(&counters.ligand_solvent, analyzed),
            base_solvent: pair_list(&counters.base_solvent, analyzed),
            catalyst_ligand: pair_list(&counters.catalyst_ligand, analyzed),
        },
        numeric_stats: NumericStatsTable {
            temperature_c: numeric_stat(&counters.temperatures),
            time_h: numeric_stat(&counters.times),
            yield_pct: numeric_stat(&counters.yields),
        },
        notes: SummaryNotes {
            normalizations_applied: NORMALIZATIONS_APPLIED.iter().map(|s| s.to_string()).collect(),
            missing_columns: Vec::new(),
        },
    }
}
