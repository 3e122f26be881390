use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::EngineError;
use crate::stats::NumberStatistic;

/// Écart relatif à l'attendu au-delà duquel un numéro est signalé.
pub const CONTRIBUTOR_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasContributor {
    pub number: u8,
    pub observed: u32,
    pub deviation: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasTestResult {
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub expected: f64,
    pub p_value: f64,
    pub significance: f64,
    pub biased: bool,
    pub top_contributors: Vec<BiasContributor>,
}

/// Approximation de Wilson–Hilferty : (χ²/k)^(1/3) suit à peu près une normale.
pub fn wilson_hilferty_p_value(chi_square: f64, degrees_of_freedom: usize) -> Result<f64, EngineError> {
    if degrees_of_freedom == 0 {
        return Err(EngineError::Statistics("zéro degré de liberté".to_string()));
    }
    let k = degrees_of_freedom as f64;
    let variance = 2.0 / (9.0 * k);
    let z = ((chi_square / k).cbrt() - (1.0 - variance)) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).map_err(|e| EngineError::Statistics(e.to_string()))?;
    Ok(normal.sf(z))
}

/// Test d'uniformité du khi-deux sur les effectifs `(numéro, observé)`.
pub fn chi_square_uniformity(
    observed: &[(u8, u32)],
    significance: f64,
) -> Result<BiasTestResult, EngineError> {
    if !(significance > 0.0 && significance < 1.0) {
        return Err(EngineError::InvalidConfig(format!(
            "seuil de signification {} hors de ]0, 1[",
            significance
        )));
    }
    let total: u64 = observed.iter().map(|&(_, o)| o as u64).sum();
    if observed.len() < 2 || total == 0 {
        return Err(EngineError::EmptyHistory);
    }

    let expected = total as f64 / observed.len() as f64;
    let chi_square: f64 = observed
        .iter()
        .map(|&(_, o)| (o as f64 - expected).powi(2) / expected)
        .sum();
    let degrees_of_freedom = observed.len() - 1;
    let p_value = wilson_hilferty_p_value(chi_square, degrees_of_freedom)?;

    let mut top_contributors: Vec<BiasContributor> = observed
        .iter()
        .filter(|&&(_, o)| (o as f64 - expected).abs() > CONTRIBUTOR_THRESHOLD * expected)
        .map(|&(number, o)| {
            let deviation = o as f64 - expected;
            BiasContributor {
                number,
                observed: o,
                deviation,
                contribution: deviation.powi(2) / expected,
            }
        })
        .collect();
    top_contributors.sort_by(|a, b| {
        b.contribution
            .total_cmp(&a.contribution)
            .then(a.number.cmp(&b.number))
    });

    Ok(BiasTestResult {
        chi_square,
        degrees_of_freedom,
        expected,
        p_value,
        significance,
        biased: p_value < significance,
        top_contributors,
    })
}

pub fn bias_test(
    statistics: &[NumberStatistic],
    significance: f64,
) -> Result<BiasTestResult, EngineError> {
    let observed: Vec<(u8, u32)> = statistics.iter().map(|s| (s.number, s.frequency)).collect();
    chi_square_uniformity(&observed, significance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::draw;
    use crate::stats::compute_number_statistics;
    use lesix_db::models::{Domain, HistoricalDraw};

    #[test]
    fn test_perfectly_uniform_history() {
        // 46 tirages qui font sortir chaque numéro exactement 6 fois
        let draws: Vec<HistoricalDraw> = (0..46u32)
            .map(|t| {
                let numbers: Vec<u8> = (0..6).map(|j| ((6 * t + j) % 46) as u8).collect();
                draw(t, t as u64, &numbers)
            })
            .collect();
        let stats = compute_number_statistics(&draws, &Domain::default(), 20).unwrap();
        let result = bias_test(&stats, 0.05).unwrap();
        assert_eq!(result.chi_square, 0.0);
        assert_eq!(result.degrees_of_freedom, 45);
        assert!((result.expected - 6.0).abs() < 1e-10);
        assert!(result.p_value > 0.99);
        assert!(!result.biased);
        assert!(result.top_contributors.is_empty());
    }

    #[test]
    fn test_repeated_draw_is_biased() {
        let draws: Vec<HistoricalDraw> = (0..50u32)
            .map(|t| draw(t, t as u64, &[0, 1, 2, 3, 4, 5]))
            .collect();
        let stats = compute_number_statistics(&draws, &Domain::default(), 20).unwrap();
        let result = bias_test(&stats, 0.05).unwrap();
        assert!(result.biased);
        assert!(result.p_value < 1e-6);
        let top: Vec<u8> = result.top_contributors.iter().take(6).map(|c| c.number).collect();
        assert_eq!(top, vec![0, 1, 2, 3, 4, 5]);
        assert!(result.top_contributors[0].deviation > 0.0);
        assert_eq!(result.top_contributors.len(), 46);
    }

    #[test]
    fn test_contributor_threshold() {
        // E = 10 : 13 dépasse 20 %, 12 non
        let observed = [(1u8, 13u32), (2, 12), (3, 8), (4, 7)];
        let result = chi_square_uniformity(&observed, 0.05).unwrap();
        assert!((result.expected - 10.0).abs() < 1e-10);
        let numbers: Vec<u8> = result.top_contributors.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 4]);
        assert!((result.chi_square - (9.0 + 4.0 + 4.0 + 9.0) / 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_wilson_hilferty_close_to_exact() {
        use statrs::distribution::ChiSquared;
        let exact = ChiSquared::new(45.0).unwrap();
        for chi in [30.0, 45.0, 61.66, 80.0] {
            let approx = wilson_hilferty_p_value(chi, 45).unwrap();
            assert!((approx - exact.sf(chi)).abs() < 0.005, "χ² = {}", chi);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(chi_square_uniformity(&[(1, 0), (2, 0)], 0.05).is_err());
        assert!(chi_square_uniformity(&[(1, 3), (2, 4)], 1.5).is_err());
        assert!(wilson_hilferty_p_value(3.0, 0).is_err());
    }
}
