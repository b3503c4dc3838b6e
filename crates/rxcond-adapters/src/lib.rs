//! Raw reaction-table adapters, list-cell parsing and dataset resolution.

pub mod normalize;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rxcond_core::{Provenance, UnifiedReactionRow};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

pub use normalize::{
    canonicalize, parse_numeric, split_mixture, synonym_lookup, Normalizer, NumericUnit, SynonymKind,
    SynonymTable,
};

pub const CRATE_NAME: &str = "rxcond-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no row adapter registered for reaction type `{0}`")]
    UnsupportedReactionType(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// A header-indexed table read from a delimited text source.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    source: Option<String>,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
    skipped_rows: usize,
}

impl RawTable {
    /// Parses delimited text, sniffing tab/comma/semicolon from the header line.
    /// Rows whose width differs from the header are skipped, not fatal.
    pub fn from_text(text: &str, source: Option<String>) -> Result<Self> {
        let header_line = text.lines().next().unwrap_or_default();
        let delimiter = sniff_delimiter(header_line);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let label = source.clone().unwrap_or_else(|| "<inline>".to_string());
        let headers = reader
            .headers()
            .with_context(|| format!("reading header row of {label}"))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();
        let index = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect::<HashMap<_, _>>();

        let mut rows = Vec::new();
        let mut skipped_rows = 0usize;
        for (line_no, record) in reader.records().enumerate() {
            match record {
                Ok(record) if record.len() == headers.len() => {
                    rows.push(record.iter().map(str::to_string).collect());
                }
                Ok(record) => {
                    skipped_rows += 1;
                    warn!(
                        source = %label,
                        row = line_no + 1,
                        expected = headers.len(),
                        found = record.len(),
                        "skipping row with mismatched column count"
                    );
                }
                Err(err) => {
                    skipped_rows += 1;
                    warn!(source = %label, row = line_no + 1, error = %err, "skipping unreadable row");
                }
            }
        }

        Ok(Self {
            source,
            headers,
            index,
            rows,
            skipped_rows,
        })
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// First non-empty cell among `names`, in order.
    pub fn cell<'a>(&self, row: &'a [String], names: &[&str]) -> Option<&'a str> {
        names.iter().find_map(|name| {
            self.index
                .get(*name)
                .and_then(|idx| row.get(*idx))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
        })
    }
}

pub fn sniff_delimiter(header_line: &str) -> u8 {
    let tabs = header_line.matches('\t').count();
    let commas = header_line.matches(',').count();
    let semicolons = header_line.matches(';').count();
    if tabs > 0 && tabs >= commas && tabs >= semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

pub fn read_raw_table(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    RawTable::from_text(&text, Some(path.display().to_string()))
}

/// `"name|identifier"` keeps the name half.
pub fn strip_identifier(token: &str) -> &str {
    token.split('|').next().unwrap_or(token).trim()
}

/// Splits a list-valued cell written either as a JSON array literal or comma-joined text.
pub fn parse_list_cell(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<JsonValue>>(trimmed) {
            return items
                .iter()
                .map(|item| match item {
                    JsonValue::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .map(|item| strip_identifier(&item).to_string())
                .filter(|item| !item.is_empty() && item != "null")
                .collect();
        }
    }

    let stripped = trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .replace(['"', '\''], "");
    let parts = stripped
        .split(',')
        .map(|part| strip_identifier(part).to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() && !stripped.trim().is_empty() {
        vec![stripped.trim().to_string()]
    } else {
        parts
    }
}

/// Header aliases per unified field, tried in order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    pub reaction_type: &'static [&'static str],
    pub metal: &'static [&'static str],
    pub catalyst: &'static [&'static str],
    pub ligand: &'static [&'static str],
    pub base: &'static [&'static str],
    pub solvent: &'static [&'static str],
    pub additives: &'static [&'static str],
    pub temperature_c: &'static [&'static str],
    pub time_h: &'static [&'static str],
    pub cat_loading_molpct: &'static [&'static str],
    pub base_equiv: &'static [&'static str],
    pub yield_pct: &'static [&'static str],
    pub reference: &'static [&'static str],
}

impl ColumnMap {
    fn fields(&self) -> [(&'static str, &'static [&'static str]); 13] {
        [
            ("reaction_type", self.reaction_type),
            ("metal", self.metal),
            ("catalyst", self.catalyst),
            ("ligand", self.ligand),
            ("base", self.base),
            ("solvent", self.solvent),
            ("additives", self.additives),
            ("temperature_c", self.temperature_c),
            ("time_h", self.time_h),
            ("cat_loading_molpct", self.cat_loading_molpct),
            ("base_equiv", self.base_equiv),
            ("yield_pct", self.yield_pct),
            ("reference", self.reference),
        ]
    }

    /// Unified fields for which the table has none of the aliased headers.
    pub fn missing_columns(&self, table: &RawTable) -> Vec<String> {
        self.fields()
            .into_iter()
            .filter(|(_, aliases)| !aliases.iter().any(|alias| table.has_column(alias)))
            .map(|(field, _)| field.to_string())
            .collect()
    }
}

pub const ULLMANN_COLUMNS: ColumnMap = ColumnMap {
    reaction_type: &["ReactionType", "Reaction Type"],
    metal: &["CoreGeneric", "CoreDetail", "Metal"],
    catalyst: &["Catalyst", "CatalystRaw"],
    ligand: &["Ligand", "LigandRaw"],
    base: &["ReagentRaw", "Base", "RGTName", "Reagent"],
    solvent: &["Solvent", "SOLName"],
    additives: &["Additives", "Additive"],
    temperature_c: &["Temperature_C", "Temperature"],
    time_h: &["Time_h", "Time"],
    cat_loading_molpct: &["CatLoading_mol%", "Catalyst_Loading"],
    base_equiv: &["BaseEquiv", "Base_equiv"],
    yield_pct: &["Yield_%", "Yield"],
    reference: &["Reference", "Ref", "DOI"],
};

pub const GENERIC_COLUMNS: ColumnMap = ColumnMap {
    reaction_type: &["ReactionType", "Reaction Type"],
    metal: &["Metal", "CoreGeneric", "CoreDetail"],
    catalyst: &["Catalyst", "CatalystRaw", "CATName"],
    ligand: &["Ligand", "LigandRaw"],
    base: &["Base", "Reagent", "RGTName", "ReagentRaw"],
    solvent: &["Solvent", "SOLName"],
    additives: &["Additives", "Additive"],
    temperature_c: &["Temperature_C", "Temperature"],
    time_h: &["Time_h", "Time"],
    cat_loading_molpct: &["CatLoading_mol%", "Catalyst_Loading"],
    base_equiv: &["BaseEquiv", "Base_equiv"],
    yield_pct: &["Yield_%", "Yield"],
    reference: &["Reference", "Ref", "DOI"],
};

/// Turns one dataset family's raw table into unified observations.
pub trait RowAdapter: Send + Sync {
    fn reaction_family(&self) -> &'static str;
    fn columns(&self) -> &ColumnMap;
    fn adapt(&self, table: &RawTable) -> Vec<UnifiedReactionRow>;
}

#[derive(Debug, Clone, Copy)]
struct TableRowAdapter {
    family: &'static str,
    columns: ColumnMap,
}

fn numeric_cell(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|text| parse_numeric(text).0)
}

fn owned(cell: Option<&str>) -> Option<String> {
    cell.map(str::to_string)
}

impl RowAdapter for TableRowAdapter {
    fn reaction_family(&self) -> &'static str {
        self.family
    }

    fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    fn adapt(&self, table: &RawTable) -> Vec<UnifiedReactionRow> {
        let cols = &self.columns;
        let rows = table
            .rows()
            .iter()
            .enumerate()
            .map(|(row_index, row)| UnifiedReactionRow {
                reaction_type: table
                    .cell(row, cols.reaction_type)
                    .unwrap_or(self.family)
                    .to_string(),
                metal: owned(table.cell(row, cols.metal)),
                catalyst: owned(table.cell(row, cols.catalyst)),
                ligand: owned(table.cell(row, cols.ligand)),
                base: owned(table.cell(row, cols.base)),
                solvent: owned(table.cell(row, cols.solvent)),
                additives: table
                    .cell(row, cols.additives)
                    .map(parse_list_cell)
                    .unwrap_or_default(),
                temperature_c: numeric_cell(table.cell(row, cols.temperature_c)),
                time_h: numeric_cell(table.cell(row, cols.time_h)),
                cat_loading_molpct: numeric_cell(table.cell(row, cols.cat_loading_molpct)),
                base_equiv: numeric_cell(table.cell(row, cols.base_equiv)),
                yield_pct: numeric_cell(table.cell(row, cols.yield_pct)),
                provenance: Provenance {
                    source_file: table.source().map(str::to_string),
                    row_index,
                    reference: owned(table.cell(row, cols.reference)),
                },
            })
            .collect::<Vec<_>>();
        debug!(family = self.family, rows = rows.len(), "adapted raw table");
        rows
    }
}

pub fn ullmann_adapter() -> impl RowAdapter {
    TableRowAdapter {
        family: "Ullmann",
        columns: ULLMANN_COLUMNS,
    }
}

pub fn buchwald_adapter() -> impl RowAdapter {
    TableRowAdapter {
        family: "Buchwald",
        columns: GENERIC_COLUMNS,
    }
}

/// Generic column aliases for families without a dedicated adapter.
pub fn generic_adapter() -> impl RowAdapter {
    TableRowAdapter {
        family: "Generic",
        columns: GENERIC_COLUMNS,
    }
}

pub fn adapter_for_reaction_type(reaction_type: &str) -> Option<Box<dyn RowAdapter>> {
    let key = canonicalize(reaction_type);
    if key.contains("ullman") || key.contains("goldberg") {
        Some(Box::new(ullmann_adapter()))
    } else if key.contains("buchwald") {
        Some(Box::new(buchwald_adapter()))
    } else if key.contains("amid") {
        Some(Box::new(TableRowAdapter {
            family: "Amidation",
            columns: GENERIC_COLUMNS,
        }))
    } else if key.contains("chanlam") {
        Some(Box::new(TableRowAdapter {
            family: "Chan-Lam",
            columns: GENERIC_COLUMNS,
        }))
    } else {
        None
    }
}

/// Reads and adapts one dataset file with the adapter registered for `reaction_type`.
pub fn adapt_dataset(reaction_type: &str, path: impl AsRef<Path>) -> Result<Vec<UnifiedReactionRow>, AdapterError> {
    let adapter = adapter_for_reaction_type(reaction_type)
        .ok_or_else(|| AdapterError::UnsupportedReactionType(reaction_type.to_string()))?;
    let table = read_raw_table(path)?;
    Ok(adapter.adapt(&table))
}

const DATASET_MAP: &[(&str, &str)] = &[
    ("C-N Coupling - Buchwald-Hartwig", "Buchwald-2021-2014.tsv"),
    ("Buchwald-Hartwig Amination", "Buchwald-2021-2014.tsv"),
    ("C-N Coupling - Ullmann", "Ullman-2020-2024.tsv"),
    ("C-O Coupling - Ullmann Ether", "Ullman-2020-2024.tsv"),
    ("C-O Coupling - Ullmann", "Ullman-2020-2024.tsv"),
    ("Ullmann Reaction", "Ullman-2020-2024.tsv"),
    ("Ullmann Ether Synthesis", "Ullman-2020-2024.tsv"),
    ("Ullmann", "Ullman-2020-2024.tsv"),
    ("Amidation", "Amide-formation.tsv"),
    ("Amide formation", "Amide-formation.tsv"),
];

const KEYWORD_FALLBACKS: &[(&str, &str)] = &[
    ("ullmann", "Ullman-2020-2024.tsv"),
    ("buchwald", "Buchwald-2021-2014.tsv"),
    ("amid", "Amide-formation.tsv"),
    ("cross-coupling", "Buchwald-2021-2014.tsv"),
    ("chan-lam", "Buchwald-2021-2014.tsv"),
];

/// `"C-N Coupling - Ullmann (Cu)"` -> `"C-N Coupling - Ullmann"`.
pub fn strip_metal_tag(label: &str) -> &str {
    let label = label.trim();
    match label.rfind(" (") {
        Some(pos) if label.ends_with(')') => label[..pos].trim_end(),
        _ => label,
    }
}

/// Resolves reaction labels to dataset files under a data directory.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    data_dir: PathBuf,
}

impl DatasetRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn reaction_dataset_dir(&self) -> PathBuf {
        self.data_dir.join("reaction_dataset")
    }

    pub fn dataset_file_for(reaction_type: &str) -> Option<&'static str> {
        let label = strip_metal_tag(reaction_type);
        if let Some((_, file)) = DATASET_MAP.iter().find(|(key, _)| *key == label) {
            return Some(file);
        }
        let lower = label.to_lowercase();
        KEYWORD_FALLBACKS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, file)| *file)
    }

    pub fn candidate_paths(&self, file_name: &str) -> [PathBuf; 2] {
        [
            self.reaction_dataset_dir().join(file_name),
            self.data_dir.join(file_name),
        ]
    }

    pub fn resolve(&self, reaction_type: &str) -> Option<PathBuf> {
        let file = Self::dataset_file_for(reaction_type)?;
        self.candidate_paths(file).into_iter().find(|path| path.is_file())
    }

    /// Every `*.csv`/`*.tsv` under `reaction_dataset/`, sorted; empty when the directory is absent.
    pub fn discover_tables(&self) -> Result<Vec<PathBuf>> {
        let dir = self.reaction_dataset_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = fs::read_dir(&dir)
            .with_context(|| format!("reading {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("tsv"))
                        .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn ullmann_fixture() -> PathBuf {
        workspace_root()
            .join("fixtures")
            .join("data")
            .join("reaction_dataset")
            .join("Ullman-2020-2024.tsv")
    }

    #[test]
    fn delimiter_sniffing_prefers_tabs() {
        assert_eq!(sniff_delimiter("A\tB\tC,D"), b'\t');
        assert_eq!(sniff_delimiter("A;B;C"), b';');
        assert_eq!(sniff_delimiter("A,B"), b',');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn list_cells_accept_json_literals_and_comma_text() {
        assert_eq!(
            parse_list_cell(r#"["1,10-Phenanthroline", "DMSO"]"#),
            vec!["1,10-Phenanthroline", "DMSO"]
        );
        assert_eq!(parse_list_cell("['K2CO3', 'Cs2CO3']"), vec!["K2CO3", "Cs2CO3"]);
        assert_eq!(parse_list_cell("DMF, Toluene"), vec!["DMF", "Toluene"]);
        assert_eq!(parse_list_cell(r#"["CuI|7681-65-4"]"#), vec!["CuI"]);
        assert!(parse_list_cell("  ").is_empty());
        assert!(parse_list_cell("[]").is_empty());
    }

    #[test]
    fn mismatched_rows_are_skipped() {
        let text = "ReactionType,Ligand,Solvent\nUllmann,L-Proline,DMSO\nUllmann,only-two\nUllmann,DMEDA,Toluene\n";
        let table = RawTable::from_text(text, None).expect("parse");
        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped_rows(), 1);
    }

    #[test]
    fn ullmann_adapter_maps_columns_and_numbers() {
        let table = read_raw_table(ullmann_fixture()).expect("fixture table");
        let rows = ullmann_adapter().adapt(&table);
        assert_eq!(rows.len(), 10);

        let first = &rows[0];
        assert_eq!(first.reaction_type, "Ullmann");
        assert_eq!(first.metal.as_deref(), Some("CuI"));
        assert_eq!(first.ligand.as_deref(), Some(r#"["1,10-Phenanthroline"]"#));
        assert_eq!(first.base.as_deref(), Some(r#"["Cs2CO3"]"#));
        assert_eq!(first.temperature_c, Some(110.0));
        assert_eq!(first.time_h, Some(24.0));
        assert_eq!(first.yield_pct, Some(85.0));
        assert_eq!(first.provenance.row_index, 0);
        assert_eq!(first.provenance.reference.as_deref(), Some("doi:10.1000/ull-001"));

        assert!(ULLMANN_COLUMNS.missing_columns(&table).contains(&"catalyst".to_string()));
    }

    #[test]
    fn comma_dataset_uses_alias_headers() {
        let path = workspace_root().join("fixtures").join("data").join("buchwald_sample.csv");
        let rows = adapt_dataset("Buchwald-Hartwig Amination", &path).expect("adapted");
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].catalyst.as_deref(), Some("Pd2(dba)3"));
        assert_eq!(rows[0].base.as_deref(), Some("NaOtBu"));
        assert_eq!(rows[0].temperature_c, Some(100.0));
        assert_eq!(rows[0].base_equiv, Some(1.4));
        assert_eq!(rows[1].ligand.as_deref(), Some("BrettPhos, XPhos"));
        assert_eq!(rows[1].cat_loading_molpct, Some(1.5));
        assert_eq!(split_mixture(rows[1].solvent.as_deref().unwrap_or_default()), vec!["Dioxane", "Water"]);
        assert_eq!(rows[2].reaction_type, "Buchwald");
        assert_eq!(rows[2].time_h, Some(6.0));
        assert_eq!(rows[2].provenance.reference.as_deref(), Some("doi:10.1000/bh-103"));
    }

    #[test]
    fn unsupported_reaction_type_is_reported() {
        let err = adapt_dataset("Hydrogenation", ullmann_fixture()).expect_err("no adapter");
        assert!(matches!(err, AdapterError::UnsupportedReactionType(_)));
    }

    #[test]
    fn registry_strips_metal_tags_and_falls_back_on_keywords() {
        assert_eq!(strip_metal_tag("C-N Coupling - Ullmann (Cu)"), "C-N Coupling - Ullmann");
        assert_eq!(
            DatasetRegistry::dataset_file_for("C-N Coupling - Ullmann (Cu)"),
            Some("Ullman-2020-2024.tsv")
        );
        assert_eq!(
            DatasetRegistry::dataset_file_for("Chan-Lam coupling of boronic acids"),
            Some("Buchwald-2021-2014.tsv")
        );
        assert_eq!(DatasetRegistry::dataset_file_for("Hydrogenation"), None);
    }

    #[test]
    fn registry_resolves_candidate_locations() {
        let dir = tempdir().expect("tempdir");
        let registry = DatasetRegistry::new(dir.path());
        assert!(registry.resolve("Ullmann").is_none());
        assert!(registry.discover_tables().expect("discover").is_empty());

        std::fs::write(dir.path().join("Amide-formation.tsv"), "ReactionType\nAmidation\n").expect("write");
        assert_eq!(
            registry.resolve("Amide formation"),
            Some(dir.path().join("Amide-formation.tsv"))
        );

        let nested = dir.path().join("reaction_dataset");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(nested.join("b.csv"), "ReactionType\n").expect("write");
        std::fs::write(nested.join("a.tsv"), "ReactionType\n").expect("write");
        std::fs::write(nested.join("notes.txt"), "ignore").expect("write");
        let found = registry.discover_tables().expect("discover");
        assert_eq!(found, vec![nested.join("a.tsv"), nested.join("b.csv")]);
    }
}
