//! Reagent property tables, compatibility scoring and property-preference filters.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rxcond_adapters::Normalizer;
use rxcond_core::{
    clamp_unit, is_copper_mediated, round_to, CompatibilityVector, ReactionCategory, ReagentKind,
    ReagentRecord, Recommendation, RecommendationSource,
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "rxcond-reagents";

const EMBEDDED_LIGANDS: &str = include_str!("../data/ligands.json");
const EMBEDDED_SOLVENTS: &str = include_str!("../data/solvents.json");
const EMBEDDED_BASES: &str = include_str!("../data/bases.json");

/// Weight of compatibility vs. similarity when a reference reagent is given.
pub const COMPATIBILITY_WEIGHT: f64 = 0.6;
pub const SIMILARITY_WEIGHT: f64 = 0.4;

/// Additive boost/penalty for copper-mediated couplings. Empirical, tune with care.
pub const ULLMANN_ADJUSTMENT: f64 = 0.2;

pub const N_DONOR_TOKENS: &[&str] = &[
    "phen",
    "phenanthroline",
    "bipy",
    "bipyridine",
    "proline",
    "diamine",
    "dmeda",
    "tmeda",
    "ethylenediamine",
    "neocuproine",
    "pyridine",
    "terpy",
    "pybox",
    "dmap",
];

pub const PHOSPHINE_TOKENS: &[&str] = &[
    "phos", "pph3", "pcy3", "ptbu3", "p(o-tol)3", "binap", "dppe", "dppp", "dppf",
];

pub const ULLMANN_BASE_TOKENS: &[&str] = &[
    "k2co3",
    "cs2co3",
    "k3po4",
    "kotbu",
    "naotbu",
    "potassium carbonate",
    "cesium carbonate",
    "potassium phosphate",
];

pub const CURATED_ULLMANN_LIGANDS: &[(&str, f64)] = &[
    ("1,10-Phenanthroline", 0.80),
    ("2,2'-Bipyridine", 0.78),
    ("L-Proline", 0.77),
    ("DMEDA", 0.76),
    ("Ethylenediamine", 0.75),
];

pub const CURATED_ULLMANN_BASES: &[(&str, f64)] = &[
    ("K2CO3", 0.80),
    ("Cs2CO3", 0.78),
    ("K3PO4", 0.75),
    ("KOtBu", 0.72),
];

const CURATED_APPLICATIONS: &str = "Copper-mediated C-N/C-O coupling (curated default)";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

// Rows follow `ReactionCategory::ALL`; columns follow `ReagentKind::feature_names`.
const LIGAND_WEIGHTS: [[f64; 7]; 5] = [
    [0.25, 0.20, 0.15, 0.15, 0.10, 0.05, 0.10],
    [0.15, 0.30, 0.15, 0.10, 0.15, 0.05, 0.10],
    [0.20, 0.25, 0.10, 0.15, 0.05, 0.10, 0.15],
    [0.20, 0.25, 0.10, 0.10, 0.15, 0.05, 0.15],
    [0.20, 0.20, 0.15, 0.15, 0.15, 0.05, 0.10],
];

const SOLVENT_WEIGHTS: [[f64; 7]; 5] = [
    [0.15, 0.20, 0.10, 0.05, 0.15, 0.25, 0.10],
    [0.10, 0.15, 0.15, 0.05, 0.10, 0.35, 0.10],
    [0.20, 0.25, 0.15, 0.05, 0.10, 0.05, 0.20],
    [0.15, 0.25, 0.20, 0.05, 0.15, 0.10, 0.10],
    [0.15, 0.20, 0.10, 0.05, 0.20, 0.20, 0.10],
];

// Normalized per row in `category_weights`.
const BASE_RAW_WEIGHTS: [[f64; 2]; 5] = [
    [0.35, 0.25],
    [0.10, 0.10],
    [0.15, 0.10],
    [0.25, 0.20],
    [0.20, 0.15],
];

/// Per-feature similarity weights for a reagent kind and category; each table sums to 1.0.
pub fn category_weights(kind: ReagentKind, category: ReactionCategory) -> Vec<f64> {
    let row = category.index();
    match kind {
        ReagentKind::Ligand => LIGAND_WEIGHTS[row].to_vec(),
        ReagentKind::Solvent => SOLVENT_WEIGHTS[row].to_vec(),
        ReagentKind::Base => {
            let raw = BASE_RAW_WEIGHTS[row];
            let total: f64 = raw.iter().sum();
            raw.iter().map(|w| w / total).collect()
        }
    }
}

/// `Σ w·(1 − |a−b| / max(|a|, |b|, 1))` over aligned feature vectors.
pub fn weighted_similarity(a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    weights
        .iter()
        .enumerate()
        .map(|(idx, weight)| {
            let x = a.get(idx).copied().unwrap_or(0.0);
            let y = b.get(idx).copied().unwrap_or(0.0);
            let scale = x.abs().max(y.abs()).max(1.0);
            weight * (1.0 - (x - y).abs() / scale)
        })
        .sum()
}

fn contains_any(name: &str, tokens: &[&str]) -> bool {
    let lower = name.to_lowercase();
    tokens.iter().any(|token| lower.contains(token))
}

pub fn is_n_donor(name: &str) -> bool {
    contains_any(name, N_DONOR_TOKENS)
}

pub fn is_phosphine(name: &str) -> bool {
    contains_any(name, PHOSPHINE_TOKENS)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    Embedded,
    /// A collection file or a directory of record files.
    Path(PathBuf),
    /// Records handed in directly; nothing to reload.
    Records,
}

/// Reagent records of one kind, indexed by lower-cased name and abbreviation.
#[derive(Debug, Clone)]
pub struct ReagentRepository {
    kind: ReagentKind,
    source: RepositorySource,
    records: Vec<ReagentRecord>,
    by_name: HashMap<String, usize>,
    by_abbreviation: HashMap<String, usize>,
    scaled: Vec<Vec<f64>>,
}

impl ReagentRepository {
    pub fn embedded(kind: ReagentKind) -> Self {
        Self::build(kind, RepositorySource::Embedded, embedded_records(kind))
    }

    pub fn from_records(kind: ReagentKind, records: Vec<ReagentRecord>) -> Self {
        Self::build(kind, RepositorySource::Records, records)
    }

    /// Loads from a file or directory. A missing or unreadable source yields an empty repository.
    pub fn load(kind: ReagentKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load_records(kind, &path);
        Self::build(kind, RepositorySource::Path(path), records)
    }

    pub fn reload(&mut self) {
        let records = match &self.source {
            RepositorySource::Embedded => embedded_records(self.kind),
            RepositorySource::Path(path) => load_records(self.kind, path),
            RepositorySource::Records => return,
        };
        debug!(kind = %self.kind, records = records.len(), "reloaded reagent repository");
        *self = Self::build(self.kind, self.source.clone(), records);
    }

    fn build(kind: ReagentKind, source: RepositorySource, records: Vec<ReagentRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut by_name = HashMap::new();
        let mut by_abbreviation = HashMap::new();
        for record in records {
            let key = record.name.trim().to_lowercase();
            if by_name.contains_key(&key) {
                debug!(kind = %kind, name = %record.name, "dropping duplicate reagent entry");
                continue;
            }
            let idx = kept.len();
            by_name.insert(key, idx);
            if let Some(abbreviation) = record.abbreviation.as_deref() {
                by_abbreviation
                    .entry(abbreviation.trim().to_lowercase())
                    .or_insert(idx);
            }
            kept.push(record);
        }
        let scaled = min_max_scale(kind, &kept);
        Self {
            kind,
            source,
            records: kept,
            by_name,
            by_abbreviation,
            scaled,
        }
    }

    pub fn kind(&self) -> ReagentKind {
        self.kind
    }

    pub fn source(&self) -> &RepositorySource {
        &self.source
    }

    pub fn records(&self) -> &[ReagentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact, case-insensitive name lookup.
    pub fn get(&self, name: &str) -> Option<&ReagentRecord> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|idx| &self.records[*idx])
    }

    /// Name first, then abbreviation.
    pub fn position(&self, name: &str) -> Option<usize> {
        let key = name.trim().to_lowercase();
        self.by_name
            .get(&key)
            .or_else(|| self.by_abbreviation.get(&key))
            .copied()
    }

    pub fn resolve(&self, name: &str) -> Option<&ReagentRecord> {
        self.position(name).map(|idx| &self.records[idx])
    }

    fn feature_row(&self, idx: usize, scaled: bool) -> &[f64] {
        if scaled {
            &self.scaled[idx]
        } else {
            &self.records[idx].features
        }
    }
}

fn embedded_records(kind: ReagentKind) -> Vec<ReagentRecord> {
    let text = match kind {
        ReagentKind::Ligand => EMBEDDED_LIGANDS,
        ReagentKind::Solvent => EMBEDDED_SOLVENTS,
        ReagentKind::Base => EMBEDDED_BASES,
    };
    parse_document(kind, text, "embedded table").unwrap_or_else(|err| {
        warn!(kind = %kind, error = %err, "embedded reagent table unreadable");
        Vec::new()
    })
}

fn load_records(kind: ReagentKind, path: &Path) -> Vec<ReagentRecord> {
    if path.is_file() {
        return read_document(kind, path).unwrap_or_else(|err| {
            warn!(kind = %kind, path = %path.display(), error = %err, "reagent source unreadable");
            Vec::new()
        });
    }
    if path.is_dir() {
        let mut files = match fs::read_dir(path) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
                .collect::<Vec<_>>(),
            Err(err) => {
                warn!(kind = %kind, path = %path.display(), error = %err, "reagent directory unreadable");
                return Vec::new();
            }
        };
        files.sort();
        return files
            .iter()
            .flat_map(|file| {
                read_document(kind, file).unwrap_or_else(|err| {
                    warn!(kind = %kind, path = %file.display(), error = %err, "skipping reagent file");
                    Vec::new()
                })
            })
            .collect();
    }
    warn!(kind = %kind, path = %path.display(), "reagent source not found; repository is empty");
    Vec::new()
}

fn read_document(kind: ReagentKind, path: &Path) -> Result<Vec<ReagentRecord>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_document(kind, &text, &path.display().to_string())
}

/// Accepts `{"<plural>": [...]}`, a bare array, `{"<kind>": {...}}` or a single record object.
pub fn parse_document(kind: ReagentKind, text: &str, origin: &str) -> Result<Vec<ReagentRecord>> {
    let value: JsonValue =
        serde_json::from_str(text).with_context(|| format!("parsing reagent JSON from {origin}"))?;
    let entries = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => {
            if matches!(map.get(kind.plural()), Some(JsonValue::Array(_))) {
                match map.remove(kind.plural()) {
                    Some(JsonValue::Array(items)) => items,
                    _ => Vec::new(),
                }
            } else if matches!(map.get(kind.as_str()), Some(JsonValue::Object(_))) {
                map.remove(kind.as_str()).into_iter().collect()
            } else {
                vec![JsonValue::Object(map)]
            }
        }
        other => anyhow::bail!("unexpected reagent document shape in {origin}: {other}"),
    };

    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let record = record_from_entry(kind, entry);
            if record.is_none() {
                warn!(kind = %kind, origin, entry = idx, "skipping reagent entry without a name");
            }
            record
        })
        .collect())
}

/// Compatibility as written in source documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompatibilityInput {
    Mapping(BTreeMap<String, f64>),
    Sequence(Vec<f64>),
    Joined(String),
}

impl CompatibilityInput {
    pub fn resolve(&self) -> CompatibilityVector {
        match self {
            CompatibilityInput::Mapping(map) => {
                let mut vector = CompatibilityVector::neutral();
                for (label, value) in map {
                    if let Some(category) = ReactionCategory::from_label(label) {
                        vector.set(category, *value);
                    }
                }
                vector
            }
            CompatibilityInput::Sequence(values) => CompatibilityVector::from_partial(values),
            CompatibilityInput::Joined(text) => {
                let parsed = text
                    .split(',')
                    .map(|part| part.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>();
                match parsed {
                    Ok(values) => CompatibilityVector::from_partial(&values),
                    Err(_) => CompatibilityVector::neutral(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ApplicationsInput {
    Text(String),
    List(Vec<String>),
}

const COMPATIBILITY_KEYS: &[&str] = &["reaction_compatibility", "Reaction_Compatibility", "compatibility"];
const APPLICATION_KEYS: &[&str] = &["typical_applications", "Typical_Applications", "applications"];
const ABBREVIATION_KEYS: &[&str] = &["abbreviation", "Abbreviation"];
const CAS_KEYS: &[&str] = &["cas", "cas_number", "CAS Number"];

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn take_first(map: &mut Map<String, JsonValue>, keys: &[&str]) -> Option<JsonValue> {
    let mut found = None;
    for key in keys {
        if let Some(value) = map.remove(*key) {
            if found.is_none() && !value.is_null() {
                found = Some(value);
            }
        }
    }
    found
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        JsonValue::Number(number) => Some(number.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn json_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn record_from_entry(kind: ReagentKind, entry: JsonValue) -> Option<ReagentRecord> {
    let JsonValue::Object(mut map) = entry else {
        return None;
    };
    let capital = capitalized(kind.as_str());
    let name = take_first(&mut map, &["name", kind.as_str(), capital.as_str()])
        .as_ref()
        .and_then(json_text)?;

    let compatibility = match take_first(&mut map, COMPATIBILITY_KEYS) {
        Some(raw) => match serde_json::from_value::<CompatibilityInput>(raw) {
            Ok(input) => input.resolve(),
            Err(err) => {
                warn!(kind = %kind, name = %name, error = %err, "unreadable compatibility; using neutral scores");
                CompatibilityVector::neutral()
            }
        },
        None => CompatibilityVector::neutral(),
    };

    let applications = match take_first(&mut map, APPLICATION_KEYS)
        .and_then(|raw| serde_json::from_value::<ApplicationsInput>(raw).ok())
    {
        Some(ApplicationsInput::Text(text)) => text,
        Some(ApplicationsInput::List(items)) => items.join(", "),
        None => String::new(),
    };

    let abbreviation = take_first(&mut map, ABBREVIATION_KEYS).as_ref().and_then(json_text);
    let cas = take_first(&mut map, CAS_KEYS).as_ref().and_then(json_text);

    let features = kind
        .feature_names()
        .iter()
        .map(|feature| {
            map.remove(*feature)
                .as_ref()
                .and_then(json_number)
                .unwrap_or(0.0)
        })
        .collect();

    let attributes = map
        .iter()
        .filter_map(|(key, value)| json_text(value).map(|text| (key.clone(), text)))
        .collect();

    Some(ReagentRecord {
        kind,
        name,
        abbreviation,
        cas,
        features,
        compatibility,
        applications,
        attributes,
    })
}

/// Per-column min-max scaling to `[0, 1]`; constant columns scale to 0.
fn min_max_scale(kind: ReagentKind, records: &[ReagentRecord]) -> Vec<Vec<f64>> {
    let width = kind.feature_names().len();
    let mut bounds = vec![(f64::INFINITY, f64::NEG_INFINITY); width];
    for record in records {
        for (col, (lo, hi)) in bounds.iter_mut().enumerate() {
            let value = record.features.get(col).copied().unwrap_or(0.0);
            *lo = lo.min(value);
            *hi = hi.max(value);
        }
    }
    records
        .iter()
        .map(|record| {
            bounds
                .iter()
                .enumerate()
                .map(|(col, (lo, hi))| {
                    let value = record.features.get(col).copied().unwrap_or(0.0);
                    if hi > lo {
                        (value - lo) / (hi - lo)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Ligand, solvent and base repositories used together by the engine.
#[derive(Debug, Clone)]
pub struct ReagentLibrary {
    pub ligands: ReagentRepository,
    pub solvents: ReagentRepository,
    pub bases: ReagentRepository,
}

impl ReagentLibrary {
    pub fn embedded() -> Self {
        Self {
            ligands: ReagentRepository::embedded(ReagentKind::Ligand),
            solvents: ReagentRepository::embedded(ReagentKind::Solvent),
            bases: ReagentRepository::embedded(ReagentKind::Base),
        }
    }

    /// `<dir>/<plural>.json` or `<dir>/<plural>/*.json` per kind.
    pub fn from_dir(dir: &Path) -> Self {
        let load = |kind: ReagentKind| {
            let file = dir.join(format!("{}.json", kind.plural()));
            let subdir = dir.join(kind.plural());
            if !file.is_file() && subdir.is_dir() {
                ReagentRepository::load(kind, subdir)
            } else {
                ReagentRepository::load(kind, file)
            }
        };
        Self {
            ligands: load(ReagentKind::Ligand),
            solvents: load(ReagentKind::Solvent),
            bases: load(ReagentKind::Base),
        }
    }

    pub fn repository(&self, kind: ReagentKind) -> &ReagentRepository {
        match kind {
            ReagentKind::Ligand => &self.ligands,
            ReagentKind::Solvent => &self.solvents,
            ReagentKind::Base => &self.bases,
        }
    }

    pub fn reload(&mut self) {
        self.ligands.reload();
        self.solvents.reload();
        self.bases.reload();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScorerOptions {
    /// Compare min-max scaled features; raw features otherwise.
    pub has_feature_scaling: bool,
}

impl Default for ScorerOptions {
    fn default() -> Self {
        Self {
            has_feature_scaling: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub reaction_type: &'a str,
    pub min_compatibility: f64,
    pub top_n: usize,
    pub reference: Option<&'a str>,
}

impl<'a> ScoreRequest<'a> {
    pub fn new(reaction_type: &'a str) -> Self {
        Self {
            reaction_type,
            min_compatibility: 0.3,
            top_n: 5,
            reference: None,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_min_compatibility(mut self, min_compatibility: f64) -> Self {
        self.min_compatibility = min_compatibility;
        self
    }

    pub fn with_reference(mut self, reference: Option<&'a str>) -> Self {
        self.reference = reference.filter(|name| !name.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.top_n == 0 {
            return Err(EngineError::InvalidConfig("top_n must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_compatibility) {
            return Err(EngineError::InvalidConfig(format!(
                "min_compatibility must be within [0, 1], got {}",
                self.min_compatibility
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    index: Option<usize>,
    name: String,
    abbreviation: Option<String>,
    compatibility: f64,
    similarity: Option<f64>,
    applications: String,
    source: RecommendationSource,
}

impl Candidate {
    fn from_record(index: usize, record: &ReagentRecord, compatibility: f64) -> Self {
        Self {
            index: Some(index),
            name: record.name.clone(),
            abbreviation: record.abbreviation.clone(),
            compatibility,
            similarity: None,
            applications: record.applications.clone(),
            source: RecommendationSource::Table,
        }
    }

    fn curated(name: &str, score: f64) -> Self {
        Self {
            index: None,
            name: name.to_string(),
            abbreviation: None,
            compatibility: score,
            similarity: None,
            applications: CURATED_APPLICATIONS.to_string(),
            source: RecommendationSource::Curated,
        }
    }

    fn ranking(&self) -> f64 {
        match self.similarity {
            Some(similarity) => COMPATIBILITY_WEIGHT * self.compatibility + SIMILARITY_WEIGHT * similarity,
            None => self.compatibility,
        }
    }
}

// `sort_by` is stable, so equal scores keep their prior order.
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.ranking().total_cmp(&a.ranking()));
}

/// Ranks one repository's reagents for a reaction type.
///
/// Copper-mediated families (Ullmann, Goldberg) get the N-donor/phosphine and base
/// adjustments, an N-donor floor of `top_n / 2` from curated defaults, and a curated base
/// list when nothing in the table qualifies.
pub fn score(
    repository: &ReagentRepository,
    request: &ScoreRequest<'_>,
    options: ScorerOptions,
) -> Result<Vec<Recommendation>, EngineError> {
    request.validate()?;
    let kind = repository.kind();
    let reaction_type = request.reaction_type;

    let mut candidates = repository
        .records()
        .iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let compatibility = record.compatibility.for_reaction_type(reaction_type);
            (compatibility >= request.min_compatibility)
                .then(|| Candidate::from_record(idx, record, compatibility))
        })
        .collect::<Vec<_>>();
    sort_candidates(&mut candidates);

    if let Some(reference) = request.reference {
        match repository.position(reference) {
            Some(reference_idx) => {
                let category = ReactionCategory::for_reaction_type(reaction_type)
                    .unwrap_or(ReactionCategory::CrossCoupling);
                let weights = category_weights(kind, category);
                let target = repository.feature_row(reference_idx, options.has_feature_scaling);
                candidates.retain(|candidate| candidate.index != Some(reference_idx));
                for candidate in &mut candidates {
                    if let Some(idx) = candidate.index {
                        let row = repository.feature_row(idx, options.has_feature_scaling);
                        candidate.similarity = Some(weighted_similarity(target, row, &weights));
                    }
                }
                sort_candidates(&mut candidates);
            }
            None => debug!(kind = %kind, reference, "reference reagent not found; ranking by compatibility"),
        }
    }

    let copper = is_copper_mediated(reaction_type);
    if copper {
        match kind {
            ReagentKind::Ligand => adjust_ullmann_ligands(&mut candidates),
            ReagentKind::Base => adjust_ullmann_bases(&mut candidates),
            ReagentKind::Solvent => {}
        }
    }

    candidates.truncate(request.top_n);

    if copper {
        match kind {
            ReagentKind::Ligand => apply_n_donor_floor(&mut candidates, request.top_n),
            ReagentKind::Base if candidates.is_empty() => {
                debug!(reaction_type, "no tabulated bases qualify; using curated copper defaults");
                candidates = CURATED_ULLMANN_BASES
                    .iter()
                    .take(request.top_n)
                    .map(|(name, score)| Candidate::curated(name, *score))
                    .collect();
            }
            _ => {}
        }
    }

    debug!(kind = %kind, reaction_type, results = candidates.len(), "scored reagents");
    Ok(finish(kind, reaction_type, candidates))
}

fn adjust_ullmann_ligands(candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        if is_n_donor(&candidate.name) {
            candidate.compatibility = clamp_unit(candidate.compatibility + ULLMANN_ADJUSTMENT);
        } else if is_phosphine(&candidate.name) {
            candidate.compatibility = clamp_unit(candidate.compatibility - ULLMANN_ADJUSTMENT);
        }
    }
    sort_candidates(candidates);
}

fn adjust_ullmann_bases(candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        if contains_any(&candidate.name, ULLMANN_BASE_TOKENS) {
            candidate.compatibility = clamp_unit(candidate.compatibility + ULLMANN_ADJUSTMENT);
        }
    }
    sort_candidates(candidates);
}

fn apply_n_donor_floor(candidates: &mut Vec<Candidate>, top_n: usize) {
    let floor = top_n / 2;
    let mut present = candidates.iter().filter(|c| is_n_donor(&c.name)).count();
    if present >= floor {
        return;
    }
    let normalizer = Normalizer::default();
    let mut seen = candidates
        .iter()
        .map(|c| normalizer.map_ligand(&c.name))
        .collect::<HashSet<_>>();

    for (name, score) in CURATED_ULLMANN_LIGANDS {
        if present >= floor {
            break;
        }
        let key = normalizer.map_ligand(name);
        if seen.contains(&key) {
            continue;
        }
        if candidates.len() >= top_n {
            match candidates.iter().rposition(|c| !is_n_donor(&c.name)) {
                Some(pos) => {
                    candidates.remove(pos);
                }
                None => break,
            }
        }
        candidates.push(Candidate::curated(name, *score));
        seen.insert(key);
        present += 1;
    }
    sort_candidates(candidates);
}

fn finish(kind: ReagentKind, reaction_type: &str, candidates: Vec<Candidate>) -> Vec<Recommendation> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(idx, candidate)| Recommendation {
            rank: idx + 1,
            kind,
            combined_score: candidate
                .similarity
                .map(|_| round_to(candidate.ranking(), 3)),
            similarity_score: candidate.similarity.map(|s| round_to(s, 3)),
            compatibility_score: round_to(candidate.compatibility, 3),
            name: candidate.name,
            abbreviation: candidate.abbreviation,
            applications: candidate.applications,
            reaction_suitability: reaction_type.to_string(),
            source: candidate.source,
        })
        .collect()
}

/// Narrowing of ligand suggestions by tabulated properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LigandPreferences {
    pub cone_angle_max: Option<f64>,
    pub price_category_max: Option<f64>,
    pub coordination_mode: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolventPreferences {
    pub bp_max: Option<f64>,
    pub bp_min: Option<f64>,
    pub polarity_max: Option<f64>,
    pub polarity_min: Option<f64>,
    /// `Some(true)` keeps hydrogen-bond donors (HBD > 0.5), `Some(false)` drops them.
    pub protic: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasePreferences {
    pub pkah_min: Option<f64>,
    pub type_in: Option<Vec<String>>,
}

/// Property predicate over a tabulated record; curated entries have none.
pub trait PropertyFilter {
    fn kind(&self) -> ReagentKind;
    fn is_unconstrained(&self) -> bool;
    fn accepts(&self, record: &ReagentRecord) -> bool;
}

fn feature_at_most(record: &ReagentRecord, feature: &str, limit: Option<f64>) -> bool {
    match (limit, record.feature(feature)) {
        (Some(limit), Some(value)) => value <= limit,
        _ => true,
    }
}

fn feature_at_least(record: &ReagentRecord, feature: &str, limit: Option<f64>) -> bool {
    match (limit, record.feature(feature)) {
        (Some(limit), Some(value)) => value >= limit,
        _ => true,
    }
}

impl PropertyFilter for LigandPreferences {
    fn kind(&self) -> ReagentKind {
        ReagentKind::Ligand
    }

    fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    fn accepts(&self, record: &ReagentRecord) -> bool {
        feature_at_most(record, "cone_angle", self.cone_angle_max)
            && feature_at_most(record, "price_category", self.price_category_max)
            && self
                .coordination_mode
                .map(|mode| record.feature("coordination_mode") == Some(mode))
                .unwrap_or(true)
    }
}

impl PropertyFilter for SolventPreferences {
    fn kind(&self) -> ReagentKind {
        ReagentKind::Solvent
    }

    fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    fn accepts(&self, record: &ReagentRecord) -> bool {
        let protic_ok = match (self.protic, record.feature("hydrogen_bond_donor")) {
            (Some(wanted), Some(hbd)) => (hbd > 0.5) == wanted,
            _ => true,
        };
        feature_at_most(record, "boiling_point_c", self.bp_max)
            && feature_at_least(record, "boiling_point_c", self.bp_min)
            && feature_at_most(record, "polarity_index", self.polarity_max)
            && feature_at_least(record, "polarity_index", self.polarity_min)
            && protic_ok
    }
}

impl PropertyFilter for BasePreferences {
    fn kind(&self) -> ReagentKind {
        ReagentKind::Base
    }

    fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    fn accepts(&self, record: &ReagentRecord) -> bool {
        let type_ok = match (&self.type_in, record.attribute("type")) {
            (Some(allowed), Some(kind)) => allowed.iter().any(|t| t.eq_ignore_ascii_case(kind)),
            (Some(_), None) => false,
            (None, _) => true,
        };
        feature_at_least(record, "basicity_pkah", self.pkah_min) && type_ok
    }
}

pub const PREFERENCE_SCAN_TOP_N: usize = 10;
pub const PREFERENCE_MIN_COMPATIBILITY: f64 = 0.4;
pub const PREFERENCE_RESULT_LIMIT: usize = 5;

/// Scores the top ten at `min_compatibility = 0.4`, keeps entries meeting `filter`,
/// and returns at most five, re-ranked.
pub fn reaction_specific<F: PropertyFilter>(
    repository: &ReagentRepository,
    reaction_type: &str,
    filter: &F,
    options: ScorerOptions,
) -> Result<Vec<Recommendation>, EngineError> {
    if repository.kind() != filter.kind() {
        return Err(EngineError::InvalidConfig(format!(
            "{} preferences applied to a {} repository",
            filter.kind(),
            repository.kind()
        )));
    }
    let request = ScoreRequest::new(reaction_type)
        .with_top_n(PREFERENCE_SCAN_TOP_N)
        .with_min_compatibility(PREFERENCE_MIN_COMPATIBILITY);
    let scored = score(repository, &request, options)?;
    let mut kept = scored
        .into_iter()
        .filter(|rec| match repository.get(&rec.name) {
            Some(record) => filter.accepts(record),
            None => filter.is_unconstrained(),
        })
        .take(PREFERENCE_RESULT_LIMIT)
        .collect::<Vec<_>>();
    for (idx, rec) in kept.iter_mut().enumerate() {
        rec.rank = idx + 1;
    }
    Ok(kept)
}
