use rxcond_adapters::{parse_list_cell, read_raw_table, DatasetRegistry, RawTable};
use rxcond_core::{EvidenceMap, ReagentKind};
use tracing::{debug, warn};

use crate::aggregate::Tally;

/// Evidence maps keep only this many of the most frequent names.
pub const EVIDENCE_LIMIT: usize = 10;

/// Substrings that identify a base inside free-text reagent columns.
pub const BASE_TOKENS: [&str; 11] = [
    "k2co3",
    "cs2co3",
    "k3po4",
    "kotbu",
    "naotbu",
    "na2co3",
    "koh",
    "tbuok",
    "ko-tbu",
    "triethylamine",
    "et3n",
];

const REACTION_TYPE_COLUMNS: &[&str] = &["ReactionType"];
const LIGAND_COLUMNS: &[&str] = &["Ligand"];
const SOLVENT_COLUMNS: &[&str] = &["Solvent", "SOLName"];
const BASE_COLUMNS: &[&str] = &["Base"];
const REAGENT_COLUMNS: &[&str] = &["ReagentRaw", "RGTName", "Reagent", "ReagentRole"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSet {
    pub ligands: EvidenceMap,
    pub solvents: EvidenceMap,
    pub bases: EvidenceMap,
}

impl EvidenceSet {
    pub fn for_kind(&self, kind: ReagentKind) -> &EvidenceMap {
        match kind {
            ReagentKind::Ligand => &self.ligands,
            ReagentKind::Solvent => &self.solvents,
            ReagentKind::Base => &self.bases,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ligands.is_empty() && self.solvents.is_empty() && self.bases.is_empty()
    }
}

fn is_base_token(item: &str) -> bool {
    let lower = item.to_lowercase();
    BASE_TOKENS.iter().any(|token| lower.contains(token))
}

fn row_items(table: &RawTable, row: &[String], kind: ReagentKind) -> Vec<String> {
    match kind {
        ReagentKind::Ligand => table.cell(row, LIGAND_COLUMNS).map(parse_list_cell).unwrap_or_default(),
        ReagentKind::Solvent => table.cell(row, SOLVENT_COLUMNS).map(parse_list_cell).unwrap_or_default(),
        ReagentKind::Base => match table.cell(row, BASE_COLUMNS) {
            Some(cell) => parse_list_cell(cell),
            None => REAGENT_COLUMNS
                .iter()
                .filter_map(|column| table.cell(row, &[*column]))
                .flat_map(parse_list_cell)
                .filter(|item| is_base_token(item))
                .collect(),
        },
    }
}

/// Raw name counts for one reagent class over rows whose `ReactionType` equals
/// `reaction_type` ignoring case, trimmed to the [`EVIDENCE_LIMIT`] most frequent.
pub fn harvest(tables: &[RawTable], reaction_type: &str, kind: ReagentKind) -> EvidenceMap {
    let wanted = reaction_type.trim().to_lowercase();
    let mut tally = Tally::default();
    for table in tables {
        for row in table.rows() {
            let matches = table
                .cell(row, REACTION_TYPE_COLUMNS)
                .map(|value| value.to_lowercase() == wanted)
                .unwrap_or(false);
            if !matches {
                continue;
            }
            for item in row_items(table, row, kind) {
                tally.add(item);
            }
        }
    }
    tally.ranked().into_iter().take(EVIDENCE_LIMIT).collect()
}

pub fn harvest_all(tables: &[RawTable], reaction_type: &str) -> EvidenceSet {
    let evidence = EvidenceSet {
        ligands: harvest(tables, reaction_type, ReagentKind::Ligand),
        solvents: harvest(tables, reaction_type, ReagentKind::Solvent),
        bases: harvest(tables, reaction_type, ReagentKind::Base),
    };
    debug!(
        reaction_type,
        ligands = evidence.ligands.len(),
        solvents = evidence.solvents.len(),
        bases = evidence.bases.len(),
        "harvested evidence"
    );
    evidence
}

/// Every readable table under the registry's `reaction_dataset/`; unreadable files are skipped.
pub fn read_dataset_tables(registry: &DatasetRegistry) -> Vec<RawTable> {
    let files = match registry.discover_tables() {
        Ok(files) => files,
        Err(err) => {
            warn!(error = %err, "dataset directory unreadable; no evidence available");
            return Vec::new();
        }
    };
    files
        .iter()
        .filter_map(|path| match read_raw_table(path) {
            Ok(table) => Some(table),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable dataset");
                None
            }
        })
        .collect()
}
