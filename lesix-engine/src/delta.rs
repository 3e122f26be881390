use std::collections::BTreeMap;

use lesix_db::models::{Domain, HistoricalDraw, PICK_COUNT};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::combinatorics::binomial;
use crate::error::EngineError;
use crate::stats::mean_std;

/// Effectif minimal attendu par classe du test du khi-deux.
const MIN_EXPECTED: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaEntry {
    pub gap: u8,
    pub count: u32,
    pub relative: f64,
}

/// Histogramme des écarts entre numéros consécutifs sur tout l'historique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaDistribution {
    pub entries: Vec<DeltaEntry>,
    pub total_gaps: u32,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaTestResult {
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub bins: usize,
    pub p_value: f64,
    pub biased: bool,
}

/// P(G = g) pour l'écart entre deux éléments consécutifs d'une 6-partie
/// uniforme d'un domaine de `domain_size` numéros.
pub fn expected_gap_probability(domain_size: usize, gap: usize) -> f64 {
    let tail = |g: usize| -> f64 {
        if g + PICK_COUNT > domain_size + 1 {
            return 0.0;
        }
        binomial(domain_size + 1 - g, PICK_COUNT) as f64 / binomial(domain_size, PICK_COUNT) as f64
    };
    if gap == 0 {
        return 0.0;
    }
    tail(gap) - tail(gap + 1)
}

impl DeltaDistribution {
    pub fn from_draws(draws: &[HistoricalDraw]) -> Result<Self, EngineError> {
        if draws.is_empty() {
            return Err(EngineError::EmptyHistory);
        }
        let mut counts: BTreeMap<u8, u32> = BTreeMap::new();
        let mut values = Vec::with_capacity(draws.len() * (PICK_COUNT - 1));
        for draw in draws {
            for gap in draw.combination.gaps() {
                *counts.entry(gap).or_insert(0) += 1;
                values.push(gap as f64);
            }
        }
        let total_gaps = values.len() as u32;
        let (mean, std_dev) = mean_std(&values);
        let entries = counts
            .into_iter()
            .map(|(gap, count)| DeltaEntry {
                gap,
                count,
                relative: count as f64 / total_gaps as f64,
            })
            .collect();
        Ok(Self {
            entries,
            total_gaps,
            mean,
            std_dev,
        })
    }

    pub fn count(&self, gap: u8) -> u32 {
        self.entries
            .iter()
            .find(|e| e.gap == gap)
            .map_or(0, |e| e.count)
    }

    pub fn relative(&self, gap: u8) -> f64 {
        self.entries
            .iter()
            .find(|e| e.gap == gap)
            .map_or(0.0, |e| e.relative)
    }

    /// Khi-deux entre écarts observés et loi exacte d'un tirage uniforme.
    /// Les classes de queue sont fusionnées jusqu'à un effectif attendu de 5.
    pub fn deviation_test(
        &self,
        domain: &Domain,
        significance: f64,
    ) -> Result<DeltaTestResult, EngineError> {
        domain.validate()?;
        let n = domain.size();
        let total = self.total_gaps as f64;
        let max_gap = n - (PICK_COUNT - 1);

        let mut bins: Vec<(f64, f64)> = Vec::new();
        let (mut observed, mut expected) = (0.0, 0.0);
        for gap in 1..=max_gap {
            observed += self.count(gap as u8) as f64;
            expected += total * expected_gap_probability(n, gap);
            if expected >= MIN_EXPECTED {
                bins.push((observed, expected));
                observed = 0.0;
                expected = 0.0;
            }
        }
        if expected > 0.0 || observed > 0.0 {
            match bins.last_mut() {
                Some(last) => {
                    last.0 += observed;
                    last.1 += expected;
                }
                None => bins.push((observed, expected)),
            }
        }

        if bins.len() < 2 {
            return Ok(DeltaTestResult {
                chi_square: 0.0,
                degrees_of_freedom: 0,
                bins: bins.len(),
                p_value: 1.0,
                biased: false,
            });
        }

        let chi_square: f64 = bins.iter().map(|(o, e)| (o - e).powi(2) / e).sum();
        let degrees_of_freedom = bins.len() - 1;
        let law = ChiSquared::new(degrees_of_freedom as f64)
            .map_err(|e| EngineError::Statistics(e.to_string()))?;
        let p_value = law.sf(chi_square);

        Ok(DeltaTestResult {
            chi_square,
            degrees_of_freedom,
            bins: bins.len(),
            p_value,
            biased: p_value < significance,
        })
    }
}
