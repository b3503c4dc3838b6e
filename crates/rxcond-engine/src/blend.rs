use std::collections::HashMap;

use rxcond_adapters::Normalizer;
use rxcond_core::{round_to, EvidenceMap, PriorsMap, Recommendation, ReagentKind};
use rxcond_reagents::EngineError;

/// Constants of one prior blend: `min(1, s * (1 + weight * sqrt(pct)))` when supported,
/// `s * penalty_factor` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendParams {
    pub weight: f64,
    pub penalty_factor: f64,
    pub min_support_pct: f64,
    /// Off: unsupported entries keep their score.
    pub soft_penalty: bool,
}

impl BlendParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "blend weight must be a non-negative number, got {}",
                self.weight
            )));
        }
        if !self.penalty_factor.is_finite() || !(0.0..=1.0).contains(&self.penalty_factor) {
            return Err(EngineError::InvalidConfig(format!(
                "penalty_factor must be within [0, 1], got {}",
                self.penalty_factor
            )));
        }
        if !self.min_support_pct.is_finite() || self.min_support_pct < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "min_support_pct must be a non-negative number, got {}",
                self.min_support_pct
            )));
        }
        Ok(())
    }

    /// Always within [0, 1]; a NaN result counts as zero support.
    pub fn adjust(&self, score: f64, pct: Option<f64>) -> f64 {
        let score = unit_interval(score);
        if score == 0.0 {
            return 0.0;
        }
        let adjusted = match pct {
            Some(pct) if pct >= self.min_support_pct => score * (1.0 + self.weight * pct.sqrt()),
            _ if self.soft_penalty => score * self.penalty_factor,
            _ => score,
        };
        unit_interval(adjusted)
    }
}

fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Raw harvest counts as support fractions `weight / total`.
pub fn evidence_to_priors(evidence: &EvidenceMap) -> PriorsMap {
    let named = evidence
        .iter()
        .filter(|(name, count)| **count > 0 && !name.trim().is_empty())
        .collect::<Vec<_>>();
    let total: u64 = named.iter().map(|(_, count)| **count).sum();
    if total == 0 {
        return PriorsMap::new();
    }
    named
        .into_iter()
        .map(|(name, count)| (name.clone(), *count as f64 / total as f64))
        .collect()
}

/// Folds prior names through the synonym tables so `"Dimethyl sulfoxide"` and `"dmso"` share a key.
fn canonical_priors(kind: ReagentKind, priors: &PriorsMap, normalizer: &Normalizer) -> HashMap<String, f64> {
    let mut out: HashMap<String, f64> = HashMap::new();
    for (name, pct) in priors {
        if *pct > 0.0 {
            *out.entry(normalizer.map_reagent(kind, name)).or_default() += pct;
        }
    }
    out
}

fn support_for(rec: &Recommendation, priors: &HashMap<String, f64>, normalizer: &Normalizer) -> Option<f64> {
    let by_name = priors.get(&normalizer.map_reagent(rec.kind, &rec.name));
    let by_abbreviation = || {
        rec.abbreviation
            .as_deref()
            .and_then(|abbr| priors.get(&normalizer.map_reagent(rec.kind, abbr)))
    };
    by_name.or_else(by_abbreviation).copied()
}

/// Re-weights each recommendation by its support in `priors`, then stably re-sorts by the
/// adjusted compatibility and renumbers ranks. Pure in its inputs.
pub fn blend(
    recommendations: Vec<Recommendation>,
    priors: &PriorsMap,
    params: &BlendParams,
) -> Result<Vec<Recommendation>, EngineError> {
    params.validate()?;
    let Some(kind) = recommendations.first().map(|rec| rec.kind) else {
        return Ok(recommendations);
    };
    let normalizer = Normalizer::default();
    let lookup = canonical_priors(kind, priors, &normalizer);

    let mut blended = recommendations
        .into_iter()
        .map(|mut rec| {
            let pct = support_for(&rec, &lookup, &normalizer);
            rec.compatibility_score = round_to(params.adjust(rec.compatibility_score, pct), 3);
            rec
        })
        .collect::<Vec<_>>();
    blended.sort_by(|a, b| b.compatibility_score.total_cmp(&a.compatibility_score));
    for (idx, rec) in blended.iter_mut().enumerate() {
        rec.rank = idx + 1;
    }
    Ok(blended)
}
