use lesix_db::models::Combination;
use serde::{Deserialize, Serialize};

use crate::affinity::AffinityMatrix;
use crate::entropy::normalized_gap_entropy;
use crate::error::EngineError;
use crate::parallel::Executor;
use crate::stats::{mean_std, DrawProfile, NumberStatistic};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub affinity: f64,
    pub entropy: f64,
    pub amplitude: f64,
    pub frequency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            affinity: 0.15,
            entropy: 0.40,
            amplitude: 0.25,
            frequency: 0.20,
        }
    }
}

impl ScoringWeights {
    pub fn equal() -> Self {
        Self {
            affinity: 0.25,
            entropy: 0.25,
            amplitude: 0.25,
            frequency: 0.25,
        }
    }

    pub fn total(&self) -> f64 {
        self.affinity + self.entropy + self.amplitude + self.frequency
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let all = [self.affinity, self.entropy, self.amplitude, self.frequency];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || self.total() <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "poids de score invalides : {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Bande d'amplitude « saine » déduite de l'historique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmplitudeBand {
    pub healthy_min: u8,
    pub healthy_max: u8,
    pub tolerance: u8,
}

impl Default for AmplitudeBand {
    /// Amplitude d'un tirage uniforme de 6 numéros sur 0-45.
    fn default() -> Self {
        Self {
            healthy_min: 25,
            healthy_max: 39,
            tolerance: 7,
        }
    }
}

impl AmplitudeBand {
    pub const INSIDE: f64 = 1.0;
    pub const ADJACENT: f64 = 0.7;
    pub const OUTSIDE: f64 = 0.3;

    pub fn from_profile(profile: &DrawProfile) -> Self {
        let m = &profile.amplitude;
        Self {
            healthy_min: (m.mean - m.std_dev).round().clamp(0.0, 255.0) as u8,
            healthy_max: (m.mean + m.std_dev).round().clamp(0.0, 255.0) as u8,
            tolerance: m.std_dev.ceil().clamp(1.0, 255.0) as u8,
        }
    }

    pub fn score(&self, amplitude: u8) -> f64 {
        if (self.healthy_min..=self.healthy_max).contains(&amplitude) {
            Self::INSIDE
        } else if amplitude as u16 + self.tolerance as u16 >= self.healthy_min as u16
            && amplitude as u16 <= self.healthy_max as u16 + self.tolerance as u16
        {
            Self::ADJACENT
        } else {
            Self::OUTSIDE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min: f64,
    pub max: f64,
}

impl FrequencyBand {
    pub const INSIDE: f64 = 1.0;
    pub const OUTSIDE: f64 = 0.5;

    /// Moyenne ± un écart-type des fréquences relatives du domaine.
    pub fn from_statistics(statistics: &[NumberStatistic]) -> Self {
        let values: Vec<f64> = statistics.iter().map(|s| s.relative_frequency).collect();
        let (mean, sd) = mean_std(&values);
        Self {
            min: mean - sd,
            max: mean + sd,
        }
    }

    pub fn contains(&self, relative_frequency: f64) -> bool {
        (self.min..=self.max).contains(&relative_frequency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub affinity: f64,
    pub entropy: f64,
    pub amplitude: f64,
    pub frequency: f64,
}

impl ComponentScores {
    pub fn weighted(&self, weights: &ScoringWeights) -> f64 {
        weights.affinity * self.affinity
            + weights.entropy * self.entropy
            + weights.amplitude * self.amplitude
            + weights.frequency * self.frequency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCombination {
    pub combination: Combination,
    pub components: ComponentScores,
    pub score: f64,
    /// Position dans le système d'origine, pour départager les égalités.
    pub generation_index: usize,
}

pub struct CompositeScorer<'a> {
    affinity: &'a AffinityMatrix,
    relative_frequencies: Vec<f64>,
    amplitude_band: AmplitudeBand,
    frequency_band: FrequencyBand,
    weights: ScoringWeights,
}

impl<'a> CompositeScorer<'a> {
    pub fn new(
        affinity: &'a AffinityMatrix,
        statistics: &[NumberStatistic],
        amplitude_band: AmplitudeBand,
        frequency_band: FrequencyBand,
        weights: ScoringWeights,
    ) -> Result<Self, EngineError> {
        weights.validate()?;
        let domain = affinity.domain();
        let mismatch = statistics.len() != domain.size()
            || statistics
                .iter()
                .zip(domain.numbers())
                .any(|(s, n)| s.number != n);
        if mismatch {
            return Err(EngineError::InvalidConfig(format!(
                "statistiques incompatibles avec le domaine {}",
                domain
            )));
        }
        Ok(Self {
            affinity,
            relative_frequencies: statistics.iter().map(|s| s.relative_frequency).collect(),
            amplitude_band,
            frequency_band,
            weights,
        })
    }

    pub fn components(&self, combination: &Combination) -> Result<ComponentScores, EngineError> {
        let domain = self.affinity.domain();
        for &n in combination.numbers() {
            domain.check(n)?;
        }
        let frequency = combination
            .numbers()
            .iter()
            .map(|&n| {
                if self.frequency_band.contains(self.relative_frequencies[domain.index_of(n)]) {
                    FrequencyBand::INSIDE
                } else {
                    FrequencyBand::OUTSIDE
                }
            })
            .sum::<f64>()
            / combination.numbers().len() as f64;

        Ok(ComponentScores {
            affinity: self.affinity.combination_score(combination),
            entropy: normalized_gap_entropy(combination),
            amplitude: self.amplitude_band.score(combination.amplitude()),
            frequency,
        })
    }

    pub fn score(
        &self,
        combination: &Combination,
        generation_index: usize,
    ) -> Result<ScoredCombination, EngineError> {
        let components = self.components(combination)?;
        Ok(ScoredCombination {
            combination: *combination,
            components,
            score: components.weighted(&self.weights),
            generation_index,
        })
    }

    /// Score décroissant ; à égalité, l'ordre de génération est conservé.
    pub fn rank(
        &self,
        combinations: &[Combination],
        executor: &Executor,
    ) -> Result<Vec<ScoredCombination>, EngineError> {
        let mut scored = executor
            .map(combinations.len(), |i| self.score(&combinations[i], i))
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{combo, make_test_draws};
    use crate::stats::compute_number_statistics;
    use lesix_db::models::{Domain, HistoricalDraw};

    struct Fixture {
        draws: Vec<HistoricalDraw>,
        statistics: Vec<NumberStatistic>,
        affinity: AffinityMatrix,
    }

    fn fixture() -> Fixture {
        let draws = make_test_draws(90);
        let statistics = compute_number_statistics(&draws, &Domain::default(), 20).unwrap();
        let affinity = AffinityMatrix::from_draws(&draws, &Domain::default()).unwrap();
        Fixture {
            draws,
            statistics,
            affinity,
        }
    }

    fn scorer(f: &Fixture, weights: ScoringWeights) -> CompositeScorer<'_> {
        let profile = DrawProfile::from_draws(&f.draws).unwrap();
        CompositeScorer::new(
            &f.affinity,
            &f.statistics,
            AmplitudeBand::from_profile(&profile),
            FrequencyBand::from_statistics(&f.statistics),
            weights,
        )
        .unwrap()
    }

    #[test]
    fn test_default_weights() {
        let w = ScoringWeights::default();
        assert!((w.total() - 1.0).abs() < 1e-10);
        assert!(w.entropy > w.amplitude && w.amplitude > w.frequency && w.frequency > w.affinity);
        assert!((ScoringWeights::equal().total() - 1.0).abs() < 1e-10);
        assert!(ScoringWeights { entropy: -0.1, ..w }.validate().is_err());
        assert!(ScoringWeights { affinity: 0.0, entropy: 0.0, amplitude: 0.0, frequency: 0.0 }
            .validate()
            .is_err());
    }

    #[test]
    fn test_amplitude_band_scores() {
        let band = AmplitudeBand {
            healthy_min: 25,
            healthy_max: 39,
            tolerance: 7,
        };
        assert_eq!(band.score(30), 1.0);
        assert_eq!(band.score(25), 1.0);
        assert_eq!(band.score(18), 0.7);
        assert_eq!(band.score(45), 0.7);
        assert_eq!(band.score(17), 0.3);
        assert_eq!(band.score(5), 0.3);
    }

    #[test]
    fn test_amplitude_band_from_profile() {
        let f = fixture();
        let profile = DrawProfile::from_draws(&f.draws).unwrap();
        let band = AmplitudeBand::from_profile(&profile);
        assert!(band.healthy_min <= band.healthy_max);
        assert!(band.tolerance >= 1);
    }

    #[test]
    fn test_score_is_weighted_sum() {
        let f = fixture();
        let weights = ScoringWeights::default();
        let s = scorer(&f, weights);
        let c = combo(&[3, 8, 14, 22, 31, 40]);
        let scored = s.score(&c, 7).unwrap();
        let comp = scored.components;
        let expected = 0.15 * comp.affinity + 0.40 * comp.entropy + 0.25 * comp.amplitude + 0.20 * comp.frequency;
        assert!((scored.score - expected).abs() < 1e-10);
        assert_eq!(scored.generation_index, 7);
        assert!((comp.entropy - normalized_gap_entropy(&c)).abs() < 1e-10);
        assert!((comp.affinity - f.affinity.combination_score(&c)).abs() < 1e-10);
        assert!((0.5..=1.0).contains(&comp.frequency));
    }

    #[test]
    fn test_rank_sorted_and_stable() {
        let f = fixture();
        let s = scorer(&f, ScoringWeights::default());
        let a = combo(&[3, 8, 14, 22, 31, 40]);
        let b = combo(&[5, 10, 15, 20, 25, 30]);
        let ranked = s.rank(&[a, b, a], &Executor::sequential()).unwrap();
        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let a_positions: Vec<usize> = ranked
            .iter()
            .filter(|r| r.combination == a)
            .map(|r| r.generation_index)
            .collect();
        assert_eq!(a_positions, vec![0, 2]);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let f = fixture();
        let s = scorer(&f, ScoringWeights::default());
        let combos: Vec<Combination> = f.draws.iter().take(30).map(|d| d.combination).collect();
        let first = s.rank(&combos, &Executor::sequential()).unwrap();
        let second = s.rank(&combos, &Executor::sequential()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_foreign_domain() {
        let f = fixture();
        let narrow = Domain::new(0, 40).unwrap();
        let history = vec![crate::fixtures::draw(1, 0, &[1, 2, 3, 4, 5, 6])];
        let stats = compute_number_statistics(&history, &narrow, 20).unwrap();
        assert!(CompositeScorer::new(
            &f.affinity,
            &stats,
            AmplitudeBand::default(),
            FrequencyBand::from_statistics(&stats),
            ScoringWeights::default(),
        )
        .is_err());
    }
}
