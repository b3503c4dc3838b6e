//! Offline analytics: evidence harvesting, aggregation and versioned snapshot publishing.

mod aggregate;
mod harvest;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use rxcond_adapters::{adapter_for_reaction_type, generic_adapter, read_raw_table, DatasetRegistry, RowAdapter};
use rxcond_core::{AnalyticsSummary, CooccurrenceEntry, FrequencyEntry, NumericStat};
use rxcond_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

pub use aggregate::{
    aggregate, normalized_tokens, numeric_stat, percentile, reaction_match_key, row_matches, winsorize,
    NORMALIZATIONS_APPLIED, WINSOR_HIGH, WINSOR_LOW,
};
pub use harvest::{harvest, harvest_all, read_dataset_tables, EvidenceSet, BASE_TOKENS, EVIDENCE_LIMIT};

pub const CRATE_NAME: &str = "rxcond-analytics";

pub const SUMMARY_FILE_NAME: &str = "summary.json";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub data_dir: PathBuf,
    pub analytics_dir: PathBuf,
}

impl AnalyticsConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let analytics_dir = data_dir.join("analytics");
        Self {
            data_dir,
            analytics_dir,
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("RXCOND_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let analytics_dir = std::env::var("RXCOND_ANALYTICS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("analytics"));
        Self {
            data_dir,
            analytics_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub reaction_type: String,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<SnapshotManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRunReport {
    pub reaction_type: String,
    pub generated_at: DateTime<Utc>,
    pub version_dir: PathBuf,
    pub latest_path: PathBuf,
    pub dataset_files: Vec<PathBuf>,
    pub total_rows: usize,
    pub analyzed_rows: usize,
    pub files: Vec<SnapshotManifestFile>,
}

/// Batch job: dataset files -> unified rows -> [`AnalyticsSummary`] -> versioned snapshot.
pub struct AnalyticsPipeline {
    config: AnalyticsConfig,
    registry: DatasetRegistry,
    store: SnapshotStore,
}

impl AnalyticsPipeline {
    pub fn new(config: AnalyticsConfig) -> Self {
        let registry = DatasetRegistry::new(&config.data_dir);
        let store = SnapshotStore::new(&config.analytics_dir);
        Self {
            config,
            registry,
            store,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// The registered dataset for the label, else every table under `reaction_dataset/`.
    pub fn dataset_files(&self, reaction_type: &str) -> Result<Vec<PathBuf>> {
        if let Some(path) = self.registry.resolve(reaction_type) {
            return Ok(vec![path]);
        }
        self.registry.discover_tables()
    }

    pub fn run_once(&self, reaction_type: &str) -> Result<AnalyticsRunReport> {
        self.run_at(reaction_type, Utc::now())
    }

    pub fn run_at(&self, reaction_type: &str, generated_at: DateTime<Utc>) -> Result<AnalyticsRunReport> {
        let span = info_span!("analytics_run", reaction_type);
        let _guard = span.enter();

        if reaction_match_key(reaction_type).is_empty() {
            anyhow::bail!("reaction type `{reaction_type}` has no matchable name");
        }
        let files = self.dataset_files(reaction_type)?;
        if files.is_empty() {
            anyhow::bail!(
                "no dataset files for `{reaction_type}` under {}",
                self.registry.data_dir().display()
            );
        }

        let adapter: Box<dyn RowAdapter> =
            adapter_for_reaction_type(reaction_type).unwrap_or_else(|| Box::new(generic_adapter()));
        let mut rows = Vec::new();
        let mut dataset_versions = BTreeMap::new();
        let mut missing_columns = BTreeSet::new();
        for path in &files {
            let table = read_raw_table(path)?;
            if table.skipped_rows() > 0 {
                warn!(
                    path = %path.display(),
                    skipped = table.skipped_rows(),
                    "skipped malformed dataset rows"
                );
            }
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            dataset_versions.insert(file_label(path), SnapshotStore::sha256_hex(&bytes));
            missing_columns.extend(adapter.columns().missing_columns(&table));
            rows.extend(adapter.adapt(&table));
        }

        let mut summary = aggregate(&rows, reaction_type, generated_at);
        summary.summary.dataset_versions = dataset_versions;
        summary.notes.missing_columns = missing_columns.into_iter().collect();

        let version_dir = self.store.create_version_dir(generated_at, reaction_type)?;
        let mut written = Vec::new();

        let summary_path = version_dir.join(SUMMARY_FILE_NAME);
        let stored = self.store.write_json_immutable(&summary_path, &summary)?;
        written.push(manifest_file("summary", &version_dir, &stored.absolute_path, &stored.content_hash, stored.byte_size));

        for (name, batch) in [
            ("top", top_batch(&summary)?),
            ("cooccurrence", cooccurrence_batch(&summary)?),
            ("numeric_stats", numeric_stats_batch(&summary)?),
        ] {
            let path = version_dir.join(format!("{name}.parquet"));
            let bytes = encode_parquet(&batch).with_context(|| format!("encoding {}", path.display()))?;
            let stored = self.store.write_immutable(&path, &bytes)?;
            written.push(manifest_file(name, &version_dir, &stored.absolute_path, &stored.content_hash, stored.byte_size));
        }

        let manifest = SnapshotManifest {
            schema_version: 1,
            reaction_type: reaction_type.to_string(),
            generated_at,
            files: written.clone(),
        };
        self.store
            .write_json_immutable(&version_dir.join(MANIFEST_FILE_NAME), &manifest)?;
        let latest = self.store.publish_latest(reaction_type, &summary)?;

        info!(
            total_rows = summary.summary.total_rows,
            analyzed_rows = summary.summary.analyzed_rows,
            version_dir = %version_dir.display(),
            "analytics snapshot published"
        );

        Ok(AnalyticsRunReport {
            reaction_type: reaction_type.to_string(),
            generated_at,
            version_dir,
            latest_path: latest.absolute_path,
            dataset_files: files,
            total_rows: summary.summary.total_rows,
            analyzed_rows: summary.summary.analyzed_rows,
            files: written,
        })
    }
}

pub fn run_once_from_env(reaction_type: &str) -> Result<AnalyticsRunReport> {
    AnalyticsPipeline::new(AnalyticsConfig::from_env()).run_once(reaction_type)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn manifest_file(name: &str, version_dir: &Path, path: &Path, sha256: &str, bytes: usize) -> SnapshotManifestFile {
    SnapshotManifestFile {
        name: name.to_string(),
        path: path
            .strip_prefix(version_dir)
            .unwrap_or(path)
            .display()
            .to_string(),
        sha256: sha256.to_string(),
        bytes: bytes as u64,
    }
}

fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None).context("opening parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.into_inner().context("closing parquet writer")
}

fn top_batch(summary: &AnalyticsSummary) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("category", DataType::Utf8, false),
        ArrowField::new("name", DataType::Utf8, false),
        ArrowField::new("count", DataType::UInt64, false),
        ArrowField::new("pct", DataType::Float64, false),
    ]));
    let top = &summary.top;
    let rows: Vec<(&str, &FrequencyEntry)> = [
        ("metals", &top.metals),
        ("ligands", &top.ligands),
        ("bases", &top.bases),
        ("solvents", &top.solvents),
        ("additives", &top.additives),
    ]
    .into_iter()
    .flat_map(|(category, entries)| entries.iter().map(move |entry| (category, entry)))
    .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.iter().map(|(c, _)| Some(*c)).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|(_, e)| Some(e.name.as_str())).collect::<Vec<_>>())),
        Arc::new(UInt64Array::from(rows.iter().map(|(_, e)| e.count).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|(_, e)| e.pct).collect::<Vec<_>>())),
    ];
    RecordBatch::try_new(schema, columns).context("building top-list record batch")
}

fn cooccurrence_batch(summary: &AnalyticsSummary) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("pair", DataType::Utf8, false),
        ArrowField::new("a", DataType::Utf8, false),
        ArrowField::new("b", DataType::Utf8, false),
        ArrowField::new("count", DataType::UInt64, false),
        ArrowField::new("pct", DataType::Float64, false),
    ]));
    let co = &summary.cooccurrence;
    let rows: Vec<(&str, &CooccurrenceEntry)> = [
        ("ligand_solvent", &co.ligand_solvent),
        ("base_solvent", &co.base_solvent),
        ("catalyst_ligand", &co.catalyst_ligand),
    ]
    .into_iter()
    .flat_map(|(pair, entries)| entries.iter().map(move |entry| (pair, entry)))
    .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.iter().map(|(p, _)| Some(*p)).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|(_, e)| Some(e.a.as_str())).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|(_, e)| Some(e.b.as_str())).collect::<Vec<_>>())),
        Arc::new(UInt64Array::from(rows.iter().map(|(_, e)| e.count).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|(_, e)| e.pct).collect::<Vec<_>>())),
    ];
    RecordBatch::try_new(schema, columns).context("building co-occurrence record batch")
}

fn numeric_stats_batch(summary: &AnalyticsSummary) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("metric", DataType::Utf8, false),
        ArrowField::new("median", DataType::Float64, true),
        ArrowField::new("p25", DataType::Float64, true),
        ArrowField::new("p75", DataType::Float64, true),
        ArrowField::new("n", DataType::UInt64, false),
    ]));
    let stats = &summary.numeric_stats;
    let rows: [(&str, &NumericStat); 3] = [
        ("temperature_c", &stats.temperature_c),
        ("time_h", &stats.time_h),
        ("yield_pct", &stats.yield_pct),
    ];

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.iter().map(|(m, _)| Some(*m)).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|(_, s)| s.median).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|(_, s)| s.p25).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|(_, s)| s.p75).collect::<Vec<_>>())),
        Arc::new(UInt64Array::from(rows.iter().map(|(_, s)| s.n as u64).collect::<Vec<_>>())),
    ];
    RecordBatch::try_new(schema, columns).context("building numeric stats record batch")
}

fn format_stat(stat: &NumericStat) -> String {
    match (stat.median, stat.p25, stat.p75) {
        (Some(median), Some(p25), Some(p75)) => format!("{median} (p25 {p25}, p75 {p75}, n={})", stat.n),
        _ => format!("n/a (n={})", stat.n),
    }
}

/// Markdown listing of the newest `runs` snapshots for a reaction type.
pub fn report_snapshots_markdown(store: &SnapshotStore, reaction_type: &str, runs: usize) -> Result<String> {
    let versions = store.list_versions(reaction_type)?;
    let mut lines = vec![format!("# Analytics Snapshots: {reaction_type}"), String::new()];
    if versions.is_empty() {
        lines.push(format!("No snapshots under `{}`.", store.type_dir(reaction_type).display()));
        return Ok(lines.join("\n"));
    }

    for dir in versions.into_iter().take(runs.max(1)) {
        let version = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let summary_path = dir.join(SUMMARY_FILE_NAME);
        let manifest_path = dir.join(MANIFEST_FILE_NAME);

        lines.push(format!("## Snapshot `{version}`"));
        if !summary_path.exists() {
            lines.push("- summary: missing".to_string());
            lines.push(String::new());
            continue;
        }
        let summary: AnalyticsSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        lines.push(format!("- generated_at: {}", summary.summary.generated_at.to_rfc3339()));
        lines.push(format!(
            "- rows: {} analyzed of {}",
            summary.summary.analyzed_rows, summary.summary.total_rows
        ));
        for (label, entries) in [
            ("ligand", &summary.top.ligands),
            ("solvent", &summary.top.solvents),
            ("base", &summary.top.bases),
        ] {
            if let Some(entry) = entries.first() {
                lines.push(format!("- top {label}: {} ({:.1}%)", entry.name, entry.pct * 100.0));
            }
        }
        lines.push(format!("- temperature_c: {}", format_stat(&summary.numeric_stats.temperature_c)));
        if !summary.notes.missing_columns.is_empty() {
            lines.push(format!("- missing columns: {}", summary.notes.missing_columns.join(", ")));
        }
        if manifest_path.exists() {
            lines.push(format!("- manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Array;
    use chrono::TimeZone;
    use rxcond_adapters::{ullmann_adapter, RawTable};
    use rxcond_core::{ReagentKind, UnifiedReactionRow};

    fn fixture_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/data/reaction_dataset/Ullman-2020-2024.tsv")
    }

    fn fixture_table() -> RawTable {
        read_raw_table(fixture_path()).expect("fixture table")
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).single().expect("valid time")
    }

    fn mk_row(reaction_type: &str, ligand: &str, solvent: &str) -> UnifiedReactionRow {
        UnifiedReactionRow {
            reaction_type: reaction_type.to_string(),
            ligand: Some(ligand.to_string()),
            solvent: Some(solvent.to_string()),
            ..UnifiedReactionRow::default()
        }
    }

    #[test]
    fn winsorize_clamps_to_fifth_and_ninety_fifth_percentiles() {
        let mut values = (1..=18).map(f64::from).collect::<Vec<_>>();
        values.push(1000.0);
        values.push(-100.0);

        let clamped = winsorize(&values, WINSOR_LOW, WINSOR_HIGH);
        assert_eq!(clamped.first().copied(), Some(-100.0));
        assert_eq!(clamped.last().copied(), Some(18.0));

        let stat = numeric_stat(&values);
        assert_eq!(stat.n, 20);
        assert_eq!(stat.median, Some(9.0));
        assert_eq!(stat.p25, Some(4.0));
        assert_eq!(stat.p75, Some(14.0));
    }

    #[test]
    fn numeric_stat_of_nothing_is_empty() {
        let stat = numeric_stat(&[]);
        assert_eq!(stat.n, 0);
        assert!(stat.median.is_none());
        assert!(percentile(&[], 0.5).is_none());
    }

    #[test]
    fn aggregates_ullmann_fixture() {
        let rows = ullmann_adapter().adapt(&fixture_table());
        let summary = aggregate(&rows, "Ullmann", fixed_time());

        assert_eq!(summary.summary.total_rows, 10);
        assert_eq!(summary.summary.analyzed_rows, 9);

        let ligands = &summary.top.ligands;
        assert_eq!(ligands[0].name, "phen");
        assert_eq!(ligands[0].count, 4);
        assert_eq!(ligands[0].pct, 0.4444);
        assert_eq!(ligands[1].name, "lproline");

        let solvents = &summary.top.solvents;
        assert_eq!(solvents[0].name, "dmso");
        assert_eq!(solvents[0].count, 5);
        assert_eq!(solvents[0].pct, 0.5556);

        let bases = summary
            .top
            .bases
            .iter()
            .map(|e| (e.name.as_str(), e.count))
            .collect::<Vec<_>>();
        assert_eq!(bases, vec![("cs2co3", 4), ("k2co3", 3), ("k3po4", 2)]);

        assert_eq!(summary.top.metals.len(), 1);
        assert_eq!(summary.top.metals[0].name, "cu");
        assert_eq!(summary.top.metals[0].count, 9);
        assert_eq!(summary.top.additives[0].name, "tbab");

        let first_pair = &summary.cooccurrence.ligand_solvent[0];
        assert_eq!((first_pair.a.as_str(), first_pair.b.as_str(), first_pair.count), ("phen", "dmso", 2));

        assert_eq!(summary.numeric_stats.temperature_c.n, 9);
        assert_eq!(summary.numeric_stats.temperature_c.median, Some(110.0));
        assert_eq!(summary.numeric_stats.yield_pct.n, 9);
        assert_eq!(summary.notes.normalizations_applied.len(), NORMALIZATIONS_APPLIED.len());
    }

    #[test]
    fn aggregation_is_idempotent_for_fixed_input() {
        let rows = ullmann_adapter().adapt(&fixture_table());
        let first = aggregate(&rows, "Ullmann", fixed_time());
        let second = aggregate(&rows, "Ullmann", fixed_time());
        assert_eq!(first, second);
    }

    #[test]
    fn no_matching_rows_yields_zero_percentages() {
        let rows = vec![mk_row("Heck", "PPh3", "DMF")];
        let summary = aggregate(&rows, "Ullmann", fixed_time());
        assert_eq!(summary.summary.total_rows, 1);
        assert_eq!(summary.summary.analyzed_rows, 0);
        assert!(summary.top.ligands.is_empty());
        assert!(summary.cooccurrence.ligand_solvent.is_empty());
        assert!(summary.priors_for(ReagentKind::Ligand).is_empty());
    }

    #[test]
    fn metal_tag_is_ignored_when_matching() {
        let rows = vec![
            mk_row("Heck", "PPh3", "DMF"),
            mk_row("Heck Reaction", "P(o-tol)3", "DMF"),
            mk_row("Suzuki", "SPhos", "Toluene"),
        ];
        let summary = aggregate(&rows, "Heck (Pd)", fixed_time());
        assert_eq!(summary.summary.analyzed_rows, 2);
        assert_eq!(summary.top.solvents[0].name, "dmf");
        assert_eq!(summary.top.solvents[0].pct, 1.0);
        assert_eq!(summary.top.ligands[0].pct, 0.5);
    }

    #[test]
    fn blank_reaction_type_matches_no_rows() {
        let rows = vec![mk_row("Heck", "PPh3", "DMF"), mk_row("Suzuki", "XPhos", "Toluene")];
        for reaction_type in ["", "   ", "(Cu)"] {
            let summary = aggregate(&rows, reaction_type, fixed_time());
            assert_eq!(summary.summary.analyzed_rows, 0, "{reaction_type:?}");
            assert!(summary.top.ligands.is_empty(), "{reaction_type:?}");
        }
    }

    #[test]
    fn numeric_stats_batch_keeps_full_sample_counts() {
        let rows = ullmann_adapter().adapt(&fixture_table());
        let summary = aggregate(&rows, "Ullmann", fixed_time());
        let batch = numeric_stats_batch(&summary).expect("batch");

        let schema = batch.schema();
        let n_field = schema.field_with_name("n").expect("n column");
        assert_eq!(n_field.data_type(), &DataType::UInt64);
        let counts = batch
            .column(4)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .expect("u64 counts");
        assert_eq!(counts.value(0), summary.numeric_stats.temperature_c.n as u64);
        assert_eq!(counts.value(2), summary.numeric_stats.yield_pct.n as u64);
    }

    #[test]
    fn run_with_blank_reaction_type_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset_dir = dir.path().join("reaction_dataset");
        std::fs::create_dir_all(&dataset_dir).expect("dataset dir");
        std::fs::copy(fixture_path(), dataset_dir.join("Ullman-2020-2024.tsv")).expect("copy fixture");

        let pipeline = AnalyticsPipeline::new(AnalyticsConfig::new(dir.path()));
        let err = pipeline.run_at("  ", fixed_time()).expect_err("blank type");
        assert!(err.to_string().contains("no matchable name"));
        assert!(pipeline.store().list_versions("  ").expect("list").is_empty());
    }

    #[test]
    fn repeated_tokens_in_a_cell_count_once() {
        let rows = vec![mk_row("Ullmann", r#"["phen", "1,10-Phenanthroline"]"#, "DMSO")];
        let summary = aggregate(&rows, "Ullmann", fixed_time());
        assert_eq!(summary.top.ligands.len(), 1);
        assert_eq!(summary.top.ligands[0].count, 1);
        assert_eq!(summary.cooccurrence.ligand_solvent[0].count, 1);
    }

    #[test]
    fn harvests_raw_names_for_exact_reaction_type() {
        let tables = vec![fixture_table()];
        let ligands = harvest(&tables, "ullmann", ReagentKind::Ligand);
        assert_eq!(ligands.get("1,10-Phenanthroline"), Some(&4));
        assert_eq!(ligands.get("L-Proline"), Some(&2));
        assert!(!ligands.contains_key("N,N-Dimethylglycine"));
        assert!(!ligands.contains_key("XPhos"));

        let bases = harvest(&tables, "Ullmann", ReagentKind::Base);
        assert_eq!(bases.get("Cs2CO3"), Some(&4));
        assert_eq!(bases.get("K2CO3"), Some(&3));

        let solvents = harvest(&tables, "Ullmann", ReagentKind::Solvent);
        assert_eq!(solvents.get("DMSO"), Some(&5));
    }

    #[test]
    fn harvest_keeps_top_ten_and_filters_base_tokens() {
        let mut text = String::from("ReactionType\tLigand\tRGTName\n");
        for idx in 0..12 {
            let reagent = if idx % 2 == 0 { "potassium tert-butoxide, KOtBu" } else { "water" };
            text.push_str(&format!("Heck\tL{idx}\t{reagent}\n"));
        }
        text.push_str("Heck\tL0\tNaOtBu\n");
        let table = RawTable::from_text(&text, None).expect("inline table");
        let tables = vec![table];

        let ligands = harvest(&tables, "Heck", ReagentKind::Ligand);
        assert_eq!(ligands.len(), EVIDENCE_LIMIT);
        assert_eq!(ligands.get("L0"), Some(&2));
        assert!(!ligands.contains_key("L11"));

        let bases = harvest(&tables, "Heck", ReagentKind::Base);
        assert_eq!(bases.get("KOtBu"), Some(&6));
        assert_eq!(bases.get("NaOtBu"), Some(&1));
        assert!(!bases.contains_key("water"));
        assert!(!bases.contains_key("potassium tert-butoxide"));
    }

    #[test]
    fn evidence_set_is_empty_without_tables() {
        let evidence = harvest_all(&[], "Ullmann");
        assert!(evidence.is_empty());
        assert!(evidence.for_kind(ReagentKind::Base).is_empty());
    }

    #[test]
    fn run_without_datasets_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = AnalyticsPipeline::new(AnalyticsConfig::new(dir.path()));
        let err = pipeline.run_at("Ullmann", fixed_time()).expect_err("no datasets");
        assert!(err.to_string().contains("no dataset files"));
    }

    #[test]
    fn report_lists_newest_snapshot_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset_dir = dir.path().join("reaction_dataset");
        std::fs::create_dir_all(&dataset_dir).expect("dataset dir");
        std::fs::copy(fixture_path(), dataset_dir.join("Ullman-2020-2024.tsv")).expect("copy fixture");

        let pipeline = AnalyticsPipeline::new(AnalyticsConfig::new(dir.path()));
        pipeline.run_at("Ullmann", fixed_time()).expect("first run");
        let later = Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).single().expect("valid time");
        pipeline.run_at("Ullmann", later).expect("second run");

        let report = report_snapshots_markdown(pipeline.store(), "Ullmann", 5).expect("report");
        assert!(report.starts_with("# Analytics Snapshots: Ullmann"));
        let newer = report.find("20240502-083000").expect("newer snapshot listed");
        let older = report.find("20240501-083000").expect("older snapshot listed");
        assert!(newer < older);
        assert!(report.contains("- rows: 9 analyzed of 10"));
        assert!(report.contains("- top ligand: phen (44.4%)"));

        let only_one = report_snapshots_markdown(pipeline.store(), "Ullmann", 1).expect("report");
        assert!(!only_one.contains("20240501-083000"));
    }
}
