use std::fmt;
use std::time::Duration;

use lesix_db::models::{Combination, Domain};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::scorer::ScoredCombination;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgeError {
    #[error("délai dépassé ({0:?})")]
    Timeout(Duration),

    #[error("erreur transitoire : {0}")]
    Transient(String),

    #[error("service indisponible : {0}")]
    Unavailable(String),

    #[error("quota épuisé")]
    QuotaExhausted,

    #[error("réponse invalide : {0}")]
    Malformed(String),
}

impl JudgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::Timeout(_) | JudgeError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeRequest {
    /// Nombre de combinaisons à retenir.
    pub picks: usize,
    pub finalists: Vec<ScoredCombination>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub picks: Vec<Combination>,
    pub rationale: String,
}

/// Reclassement externe des finalistes. Les implémentations portent leur
/// propre transport ; le noyau ne fait ni réseau ni disque.
pub trait Judge {
    fn name(&self) -> &str;
    fn rerank(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError>;
}

#[derive(Deserialize)]
struct RawVerdict {
    picks: Vec<Vec<u8>>,
    #[serde(default)]
    rationale: String,
}

/// Lit `{"picks": [[6 numéros], ...], "rationale": "..."}`.
pub fn parse_verdict(raw: &str, domain: &Domain) -> Result<JudgeVerdict, JudgeError> {
    let verdict: RawVerdict =
        serde_json::from_str(raw.trim()).map_err(|e| JudgeError::Malformed(e.to_string()))?;
    let picks = verdict
        .picks
        .iter()
        .map(|numbers| {
            Combination::new(numbers, domain).map_err(|e| JudgeError::Malformed(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JudgeVerdict {
        picks,
        rationale: verdict.rationale,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction aléatoire ajoutée au délai, dans `[0, 1]`.
    pub jitter: f64,
    pub seed: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            jitter: 0.1,
            seed: 0,
        }
    }
}

impl RetryPolicy {
    /// Réessais sans attente ni gigue.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "max_attempts doit être au moins 1".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0) || !(0.0..=1.0).contains(&self.jitter) {
            return Err(EngineError::InvalidConfig(format!(
                "politique de réessai invalide (multiplicateur {}, gigue {})",
                self.multiplier, self.jitter
            )));
        }
        Ok(())
    }

    /// Attente avant le réessai qui suit l'échec numéro `attempt` (à partir de 1).
    pub fn delay_for(&self, attempt: u32, rng: &mut StdRng) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(63) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);
        let jittered = if self.jitter > 0.0 {
            capped * (1.0 + self.jitter * rng.random::<f64>())
        } else {
            capped
        };
        Duration::from_millis(jittered.round() as u64)
    }
}

/// Appelle `op` jusqu'au succès, à une erreur définitive ou à l'épuisement
/// des tentatives. `sleep` est injecté pour les tests.
pub fn call_with_retry<T, F, S>(policy: &RetryPolicy, mut op: F, mut sleep: S) -> Result<T, JudgeError>
where
    F: FnMut(u32) -> Result<T, JudgeError>,
    S: FnMut(Duration),
{
    let mut rng = StdRng::seed_from_u64(policy.seed);
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_for(attempt, &mut rng);
                log::warn!(
                    "Tentative {}/{} échouée ({}), nouvel essai dans {:?}",
                    attempt,
                    attempts,
                    e,
                    delay
                );
                sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub finalists: usize,
    pub picks: usize,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            finalists: 10,
            picks: 3,
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.picks == 0 || self.finalists < self.picks {
            return Err(EngineError::InvalidConfig(format!(
                "juge : {} choix parmi {} finalistes",
                self.picks, self.finalists
            )));
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectionSource {
    Judge(String),
    Fallback(String),
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSource::Judge(name) => write!(f, "juge {}", name),
            SelectionSource::Fallback(_) => write!(f, "repli score"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalSelection {
    pub picks: Vec<ScoredCombination>,
    pub rationale: String,
    pub source: SelectionSource,
}

impl FinalSelection {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SelectionSource::Fallback(_))
    }
}

/// Sélection finale : verdict du juge sur les finalistes de `shortlist`
/// s'il répond correctement, sinon les meilleurs scores de `ranked`
/// (classement par score seul, filtres ignorés).
pub fn select_final(
    ranked: &[ScoredCombination],
    shortlist: &[ScoredCombination],
    judge: Option<&dyn Judge>,
    config: &JudgeConfig,
    summary: &str,
) -> FinalSelection {
    select_final_with(ranked, shortlist, judge, config, summary, std::thread::sleep)
}

pub fn select_final_with<S: FnMut(Duration)>(
    ranked: &[ScoredCombination],
    shortlist: &[ScoredCombination],
    judge: Option<&dyn Judge>,
    config: &JudgeConfig,
    summary: &str,
    sleep: S,
) -> FinalSelection {
    let fallback = |reason: String| FinalSelection {
        picks: ranked.iter().take(config.picks).cloned().collect(),
        rationale: format!("Meilleurs scores composites ({})", reason),
        source: SelectionSource::Fallback(reason),
    };

    let Some(judge) = judge else {
        return fallback("aucun juge configuré".to_string());
    };
    let finalists: Vec<ScoredCombination> =
        shortlist.iter().take(config.finalists).cloned().collect();
    if finalists.is_empty() {
        return fallback("aucun finaliste".to_string());
    }

    let request = JudgeRequest {
        picks: config.picks.min(finalists.len()),
        finalists,
        summary: summary.to_string(),
    };
    let outcome = call_with_retry(
        &config.retry,
        |attempt| {
            log::debug!("Juge {} : tentative {}", judge.name(), attempt);
            judge.rerank(&request)
        },
        sleep,
    )
    .and_then(|verdict| resolve_picks(&request, verdict));

    match outcome {
        Ok(selection) => {
            log::info!("Sélection finale retenue par le juge {}", judge.name());
            FinalSelection {
                picks: selection.0,
                rationale: selection.1,
                source: SelectionSource::Judge(judge.name().to_string()),
            }
        }
        Err(e) => {
            log::warn!("Juge {} en échec ({}), repli sur le score composite", judge.name(), e);
            fallback(format!("juge en échec : {}", e))
        }
    }
}

fn resolve_picks(
    request: &JudgeRequest,
    verdict: JudgeVerdict,
) -> Result<(Vec<ScoredCombination>, String), JudgeError> {
    if verdict.picks.len() != request.picks {
        return Err(JudgeError::Malformed(format!(
            "{} choix attendus, {} reçus",
            request.picks,
            verdict.picks.len()
        )));
    }
    let mut picks: Vec<ScoredCombination> = Vec::with_capacity(verdict.picks.len());
    for combination in &verdict.picks {
        if picks.iter().any(|p| p.combination == *combination) {
            return Err(JudgeError::Malformed(format!("choix en double : {}", combination)));
        }
        let finalist = request
            .finalists
            .iter()
            .find(|f| f.combination == *combination)
            .ok_or_else(|| JudgeError::Malformed(format!("{} n'est pas finaliste", combination)))?;
        picks.push(finalist.clone());
    }
    Ok((picks, verdict.rationale))
}
