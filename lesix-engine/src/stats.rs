use std::fmt;

use chrono::NaiveDate;
use lesix_db::models::{Domain, HistoricalDraw, PICK_COUNT};
use serde::Serialize;

use crate::error::EngineError;
use crate::normalize::check_history;

pub const DEFAULT_POISSON_WINDOW: usize = 20;
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberStatistic {
    pub number: u8,
    pub frequency: u32,
    pub relative_frequency: f64,
    pub last_seen: Option<NaiveDate>,
    /// Tirages écoulés depuis la dernière sortie (l'historique entier si jamais sorti).
    pub delay: u32,
    pub mean_delay: f64,
    pub delay_std_dev: f64,
    pub poisson_score: f64,
}

impl NumberStatistic {
    pub fn is_high_delay(&self, threshold: f64) -> bool {
        self.delay as f64 > self.mean_delay + threshold * self.delay_std_dev
    }

    /// Retard courant rapporté à l'écart moyen, 0 sans écart connu.
    pub fn delay_ratio(&self) -> f64 {
        if self.mean_delay > 0.0 {
            self.delay as f64 / self.mean_delay
        } else {
            0.0
        }
    }
}

/// Moyenne et écart-type de population ; (0, 0) sur une série vide.
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub fn compute_number_statistics(
    draws: &[HistoricalDraw],
    domain: &Domain,
    poisson_window: usize,
) -> Result<Vec<NumberStatistic>, EngineError> {
    let ordered = check_history(draws, domain)?;
    let total = ordered.len();

    let mut appearances: Vec<Vec<usize>> = vec![Vec::new(); domain.size()];
    for (t, draw) in ordered.iter().enumerate() {
        for &n in draw.combination.numbers() {
            appearances[domain.index_of(n)].push(t);
        }
    }

    let window = poisson_window.min(total) as f64;

    Ok(domain
        .numbers()
        .zip(&appearances)
        .map(|(number, seen)| {
            let frequency = seen.len() as u32;
            let relative_frequency = frequency as f64 / total as f64;
            let (delay, last_seen) = match seen.last() {
                Some(&t) => ((total - 1 - t) as u32, Some(ordered[t].date)),
                None => (total as u32, None),
            };
            let gaps: Vec<f64> = seen.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
            let (mean_delay, delay_std_dev) = mean_std(&gaps);
            let lambda = relative_frequency * window;

            NumberStatistic {
                number,
                frequency,
                relative_frequency,
                last_seen,
                delay,
                mean_delay,
                delay_std_dev,
                poisson_score: 1.0 - (-lambda).exp(),
            }
        })
        .collect())
}

pub fn high_delay_numbers(statistics: &[NumberStatistic], threshold: f64) -> Vec<u8> {
    statistics
        .iter()
        .filter(|s| s.is_high_delay(threshold))
        .map(|s| s.number)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Moments {
    fn from_values(values: &[f64]) -> Self {
        let (mean, std_dev) = mean_std(values);
        Self {
            mean,
            std_dev,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Forme moyenne des tirages : sommes, amplitudes et parité.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawProfile {
    pub draws: usize,
    pub sum: Moments,
    pub amplitude: Moments,
    /// `even_counts[p]` : nombre de tirages comptant `p` numéros pairs.
    pub even_counts: [u32; PICK_COUNT + 1],
}

impl DrawProfile {
    pub fn from_draws(draws: &[HistoricalDraw]) -> Result<Self, EngineError> {
        if draws.is_empty() {
            return Err(EngineError::EmptyHistory);
        }
        let sums: Vec<f64> = draws.iter().map(|d| d.combination.sum() as f64).collect();
        let amplitudes: Vec<f64> = draws
            .iter()
            .map(|d| d.combination.amplitude() as f64)
            .collect();
        let mut even_counts = [0u32; PICK_COUNT + 1];
        for d in draws {
            even_counts[d.combination.even_count()] += 1;
        }
        Ok(Self {
            draws: draws.len(),
            sum: Moments::from_values(&sums),
            amplitude: Moments::from_values(&amplitudes),
            even_counts,
        })
    }

    /// Nombre de pairs le plus fréquent (le plus petit en cas d'égalité).
    pub fn dominant_parity(&self) -> usize {
        self.even_counts
            .iter()
            .enumerate()
            .fold((0, 0), |best, (p, &c)| if c > best.1 { (p, c) } else { best })
            .0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Hot,
    Cold,
    Normal,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Hot => write!(f, "HOT"),
            Trend::Cold => write!(f, "COLD"),
            Trend::Normal => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberActivity {
    pub number: u8,
    pub count: u32,
    pub z_score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowActivity {
    pub window: usize,
    pub expected: f64,
    pub numbers: Vec<NumberActivity>,
}

impl WindowActivity {
    pub fn anomalies(&self) -> impl Iterator<Item = &NumberActivity> {
        self.numbers.iter().filter(|a| a.trend != Trend::Normal)
    }
}

/// Activité de chaque numéro sur les `w` derniers tirages, comparée à la loi
/// binomiale d'un tirage uniforme.
pub fn window_activity(
    draws: &[HistoricalDraw],
    domain: &Domain,
    windows: &[usize],
    threshold: f64,
) -> Result<Vec<WindowActivity>, EngineError> {
    let ordered = check_history(draws, domain)?;
    let total = ordered.len();
    let p = PICK_COUNT as f64 / domain.size() as f64;

    Ok(windows
        .iter()
        .filter(|&&w| w > 0)
        .map(|&w| {
            let window = w.min(total);
            let mut counts = vec![0u32; domain.size()];
            for draw in &ordered[total - window..] {
                for &n in draw.combination.numbers() {
                    counts[domain.index_of(n)] += 1;
                }
            }
            let expected = window as f64 * p;
            let sd = (window as f64 * p * (1.0 - p)).sqrt();

            let numbers = domain
                .numbers()
                .zip(&counts)
                .map(|(number, &count)| {
                    let z_score = if sd > 0.0 {
                        (count as f64 - expected) / sd
                    } else {
                        0.0
                    };
                    let trend = if z_score > threshold {
                        Trend::Hot
                    } else if z_score < -threshold {
                        Trend::Cold
                    } else {
                        Trend::Normal
                    };
                    NumberActivity {
                        number,
                        count,
                        z_score,
                        trend,
                    }
                })
                .collect();

            WindowActivity {
                window,
                expected,
                numbers,
            }
        })
        .collect())
}
