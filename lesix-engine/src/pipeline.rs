use std::fmt::Write;

use chrono::NaiveDate;
use lesix_db::models::{HistoricalDraw, Modality};
use serde::Serialize;

use crate::affinity::AffinityMatrix;
use crate::bias::{bias_test, BiasTestResult};
use crate::config::EngineConfig;
use crate::delta::{DeltaDistribution, DeltaTestResult};
use crate::error::EngineError;
use crate::filters::CombinationFilter;
use crate::normalize::check_history;
use crate::parallel::Executor;
use crate::scorer::{AmplitudeBand, CompositeScorer, FrequencyBand, ScoredCombination};
use crate::stats::{
    compute_number_statistics, high_delay_numbers, window_activity, DrawProfile,
    NumberStatistic, WindowActivity,
};
use crate::wheel::{self, CoverageReport, ReducedSystem};

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub modality: Modality,
    pub draws: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub statistics: Vec<NumberStatistic>,
    pub high_delay: Vec<u8>,
    pub profile: DrawProfile,
    pub window_activity: Vec<WindowActivity>,
    #[serde(skip)]
    pub affinity: AffinityMatrix,
    pub delta: DeltaDistribution,
    pub delta_test: DeltaTestResult,
    pub bias: BiasTestResult,
    pub system: ReducedSystem,
    pub coverage: CoverageReport,
    /// Toutes les combinaisons du système, score décroissant.
    pub ranked: Vec<ScoredCombination>,
    /// Même ensemble, combinaisons passant les filtres en tête.
    pub shortlist: Vec<ScoredCombination>,
}

/// Base automatique : les `size` numéros au meilleur score de Poisson,
/// à égalité le plus en retard puis le plus petit.
pub fn select_base(statistics: &[NumberStatistic], size: usize) -> Vec<u8> {
    let mut ordered: Vec<&NumberStatistic> = statistics.iter().collect();
    ordered.sort_by(|a, b| {
        b.poisson_score
            .total_cmp(&a.poisson_score)
            .then(b.delay.cmp(&a.delay))
            .then(a.number.cmp(&b.number))
    });
    let mut base: Vec<u8> = ordered.iter().take(size).map(|s| s.number).collect();
    base.sort_unstable();
    base
}

/// Réordonne sans rien retirer : d'abord les combinaisons qui passent les
/// filtres, chaque groupe gardant l'ordre des scores.
pub fn shortlist(ranked: &[ScoredCombination], filter: &CombinationFilter) -> Vec<ScoredCombination> {
    let (mut passing, rejected): (Vec<_>, Vec<_>) = ranked
        .iter()
        .cloned()
        .partition(|s| filter.accepts(&s.combination));
    passing.extend(rejected);
    passing
}

pub fn run_analysis(
    draws: &[HistoricalDraw],
    config: &EngineConfig,
    executor: &Executor,
) -> Result<AnalysisReport, EngineError> {
    config.validate()?;
    let domain = &config.domain;
    let ordered = check_history(draws, domain)?;
    let (first_date, last_date) = match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return Err(EngineError::EmptyHistory),
    };
    if let Some(other) = ordered.iter().find(|d| d.modality != config.modality) {
        return Err(EngineError::MixedModality(config.modality, other.modality));
    }
    log::info!(
        "Analyse de {} tirages ({}) du {} au {}",
        draws.len(),
        config.modality,
        first_date,
        last_date
    );

    let statistics = compute_number_statistics(draws, domain, config.poisson_window)?;
    let high_delay = high_delay_numbers(&statistics, config.anomaly_threshold);
    let profile = DrawProfile::from_draws(draws)?;
    let window_activity =
        window_activity(draws, domain, &config.moving_windows, config.anomaly_threshold)?;
    let affinity = AffinityMatrix::from_draws(draws, domain)?;
    let delta = DeltaDistribution::from_draws(draws)?;
    let delta_test = delta.deviation_test(domain, config.significance)?;
    let bias = bias_test(&statistics, config.significance)?;
    if bias.biased {
        log::info!("Écart significatif à l'uniformité (p = {:.4})", bias.p_value);
    }

    let base = match &config.base {
        Some(base) => base.clone(),
        None => select_base(&statistics, config.base_size),
    };
    let system = wheel::generate(&base, config.guarantee, domain, &config.wheel, executor)?;
    let coverage = wheel::validate(&system, executor);
    if coverage.valid {
        log::info!(
            "Système {} : {} combinaisons, couverture complète",
            system.guarantee,
            system.combinations.len()
        );
    } else {
        log::warn!(
            "Système {} ({}) : couverture partielle {:.2}% ({}/{})",
            system.guarantee,
            system.branch,
            coverage.coverage,
            coverage.covered,
            coverage.total
        );
    }

    let scorer = CompositeScorer::new(
        &affinity,
        &statistics,
        AmplitudeBand::from_profile(&profile),
        FrequencyBand::from_statistics(&statistics),
        config.weights,
    )?;
    let ranked = scorer.rank(&system.combinations, executor)?;
    let shortlist = shortlist(&ranked, &config.filters);

    Ok(AnalysisReport {
        modality: config.modality,
        draws: draws.len(),
        first_date,
        last_date,
        statistics,
        high_delay,
        profile,
        window_activity,
        affinity,
        delta,
        delta_test,
        bias,
        system,
        coverage,
        ranked,
        shortlist,
    })
}

impl AnalysisReport {
    /// Résumé textuel transmis au juge.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} tirages ({}) du {} au {}.",
            self.draws, self.modality, self.first_date, self.last_date
        );
        let _ = writeln!(
            out,
            "Somme moyenne {:.1} (écart-type {:.1}), amplitude moyenne {:.1} (écart-type {:.1}), {} pairs le plus souvent.",
            self.profile.sum.mean,
            self.profile.sum.std_dev,
            self.profile.amplitude.mean,
            self.profile.amplitude.std_dev,
            self.profile.dominant_parity()
        );

        let mut hot: Vec<&NumberStatistic> = self.statistics.iter().collect();
        hot.sort_by(|a, b| b.poisson_score.total_cmp(&a.poisson_score).then(a.number.cmp(&b.number)));
        let hot: Vec<String> = hot.iter().take(8).map(|s| s.number.to_string()).collect();
        let _ = writeln!(out, "Numéros les plus fréquents : {}.", hot.join(", "));

        if self.high_delay.is_empty() {
            let _ = writeln!(out, "Aucun retard anormal.");
        } else {
            let late: Vec<String> = self.high_delay.iter().map(|n| n.to_string()).collect();
            let _ = writeln!(out, "Retards anormaux : {}.", late.join(", "));
        }

        let _ = writeln!(
            out,
            "Khi-deux d'uniformité {:.2} (ddl {}, p = {:.4}) : {}.",
            self.bias.chi_square,
            self.bias.degrees_of_freedom,
            self.bias.p_value,
            if self.bias.biased { "biais détecté" } else { "pas de biais" }
        );
        let _ = writeln!(
            out,
            "Écarts entre numéros : moyenne {:.2}, test p = {:.4}.",
            self.delta.mean, self.delta_test.p_value
        );
        let _ = writeln!(
            out,
            "Système réduit {} sur {} numéros ({}) : {} combinaisons, couverture {:.2}%.",
            self.system.guarantee,
            self.system.base.len(),
            self.system.branch,
            self.system.combinations.len(),
            self.coverage.coverage
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{draw, make_test_draws};
    use crate::judge::select_final;
    use crate::parallel::ParallelConfig;
    use crate::wheel::Branch;

    #[test]
    fn test_full_run() {
        let draws = make_test_draws(120);
        let config = EngineConfig::default();
        let report = run_analysis(&draws, &config, &Executor::new(config.parallel.clone())).unwrap();

        assert_eq!(report.draws, 120);
        assert_eq!(report.statistics.len(), 46);
        assert_eq!(report.system.base.len(), 12);
        assert_eq!(report.system.branch, Branch::Exact);
        assert!(report.coverage.valid);
        assert_eq!(report.ranked.len(), report.system.combinations.len());
        assert_eq!(report.shortlist.len(), report.ranked.len());
        for pair in report.ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(report.summary().contains("120 tirages"));
    }

    #[test]
    fn test_report_serializes_dates() {
        let draws = make_test_draws(30);
        let report = run_analysis(&draws, &EngineConfig::default(), &Executor::sequential()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["first_date"], "2024-01-01");
        assert!(json["statistics"][0]["last_seen"].is_string() || json["statistics"][0]["last_seen"].is_null());
        assert!(json.get("affinity").is_none());
    }

    #[test]
    fn test_fallback_selection_is_top_by_score() {
        let draws = make_test_draws(120);
        let config = EngineConfig::default();
        let report = run_analysis(&draws, &config, &Executor::sequential()).unwrap();
        let selection = select_final(&report.ranked, &report.shortlist, None, &config.judge, &report.summary());
        assert!(selection.is_fallback());
        assert_eq!(selection.picks[..], report.ranked[..config.judge.picks]);
    }

    #[test]
    fn test_explicit_large_base_goes_heuristic() {
        let draws = make_test_draws(60);
        let config = EngineConfig {
            base: Some((1..=40).collect()),
            ..EngineConfig::default()
        };
        let report = run_analysis(&draws, &config, &Executor::sequential()).unwrap();
        assert_eq!(report.system.branch, Branch::Heuristic);
        assert!(report.system.combinations.len() <= config.wheel.max_combinations);
        assert!(report.coverage.coverage > 0.0);
    }

    #[test]
    fn test_deterministic() {
        let draws = make_test_draws(80);
        let config = EngineConfig::default();
        let eager = Executor::new(ParallelConfig {
            limited_threshold: 2,
            pool_threshold: 4,
            ..ParallelConfig::default()
        });
        let a = run_analysis(&draws, &config, &Executor::sequential()).unwrap();
        let b = run_analysis(&draws, &config, &eager).unwrap();
        assert_eq!(a.system, b.system);
        assert_eq!(a.ranked, b.ranked);
        assert_eq!(a.shortlist, b.shortlist);
    }

    #[test]
    fn test_empty_history() {
        assert!(matches!(
            run_analysis(&[], &EngineConfig::default(), &Executor::sequential()),
            Err(EngineError::EmptyHistory)
        ));
    }

    #[test]
    fn test_wrong_modality() {
        let draws = make_test_draws(10);
        let config = EngineConfig {
            modality: Modality::Second,
            ..EngineConfig::default()
        };
        assert!(matches!(
            run_analysis(&draws, &config, &Executor::sequential()),
            Err(EngineError::MixedModality(..))
        ));
    }

    #[test]
    fn test_select_base() {
        let draws = vec![
            draw(1, 0, &[1, 2, 3, 4, 5, 6]),
            draw(2, 1, &[1, 2, 3, 7, 8, 9]),
            draw(3, 2, &[1, 10, 11, 12, 13, 14]),
        ];
        let stats = compute_number_statistics(&draws, &config_domain(), 20).unwrap();
        let base = select_base(&stats, 6);
        // 1 (3 fois), 2 et 3 (2 fois), puis à égalité le plus en retard : 4, 5, 6
        assert_eq!(base, vec![1, 2, 3, 4, 5, 6]);
    }

    fn config_domain() -> lesix_db::models::Domain {
        EngineConfig::default().domain
    }

    #[test]
    fn test_shortlist_puts_passing_first() {
        let draws = make_test_draws(60);
        let report = run_analysis(&draws, &EngineConfig::default(), &Executor::sequential()).unwrap();
        let filter = CombinationFilter::default();
        let first_rejected = report
            .shortlist
            .iter()
            .position(|s| !filter.accepts(&s.combination))
            .unwrap_or(report.shortlist.len());
        assert!(report.shortlist[first_rejected..]
            .iter()
            .all(|s| !filter.accepts(&s.combination)));
    }
}
