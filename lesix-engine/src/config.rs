use std::path::Path;

use lesix_db::models::{Domain, Modality, PICK_COUNT};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::filters::CombinationFilter;
use crate::judge::JudgeConfig;
use crate::parallel::ParallelConfig;
use crate::scorer::ScoringWeights;
use crate::stats::{DEFAULT_ANOMALY_THRESHOLD, DEFAULT_POISSON_WINDOW};
use crate::wheel::{Guarantee, WheelConfig};

/// Paramètres d'une analyse complète. Les champs absents du fichier JSON
/// prennent leur valeur par défaut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub domain: Domain,
    pub modality: Modality,
    pub poisson_window: usize,
    pub moving_windows: Vec<usize>,
    pub anomaly_threshold: f64,
    pub significance: f64,
    pub filters: CombinationFilter,
    pub guarantee: Guarantee,
    /// Taille de la base choisie automatiquement quand `base` est absent.
    pub base_size: usize,
    pub base: Option<Vec<u8>>,
    pub weights: ScoringWeights,
    pub wheel: WheelConfig,
    pub parallel: ParallelConfig,
    pub judge: JudgeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            modality: Modality::First,
            poisson_window: DEFAULT_POISSON_WINDOW,
            moving_windows: vec![10, 25, 50],
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            significance: 0.05,
            filters: CombinationFilter::default(),
            guarantee: Guarantee::default(),
            base_size: 12,
            base: None,
            weights: ScoringWeights::default(),
            wheel: WheelConfig::default(),
            parallel: ParallelConfig::default(),
            judge: JudgeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.domain.validate()?;
        if self.poisson_window == 0 {
            return Err(EngineError::InvalidConfig(
                "fenêtre de Poisson nulle".to_string(),
            ));
        }
        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "seuil d'anomalie {} invalide",
                self.anomaly_threshold
            )));
        }
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "seuil de signification {} hors de ]0, 1[",
                self.significance
            )));
        }
        let base_size = match &self.base {
            Some(base) => base.len(),
            None => self.base_size,
        };
        if base_size < PICK_COUNT {
            return Err(EngineError::BaseTooSmall(base_size));
        }
        if base_size > self.domain.size() {
            return Err(EngineError::InvalidConfig(format!(
                "base de {} numéros pour un domaine de {}",
                base_size,
                self.domain.size()
            )));
        }
        self.guarantee.validate(base_size)?;
        self.filters.validate()?;
        self.weights.validate()?;
        self.parallel.validate()?;
        self.judge.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.domain.size(), 46);
        assert_eq!(config.guarantee, Guarantee::new(4, 5));
        assert_eq!(config.judge.finalists, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"base_size": 10, "weights": {"entropy": 0.7}}"#).unwrap();
        assert_eq!(config.base_size, 10);
        assert_eq!(config.weights.entropy, 0.7);
        assert_eq!(config.weights.affinity, 0.15);
        assert_eq!(config.poisson_window, 20);
        assert_eq!(config.moving_windows, vec![10, 25, 50]);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("lesix_config_{}.json", std::process::id()));
        let config = EngineConfig {
            base: Some(vec![1, 5, 9, 13, 17, 21, 25]),
            modality: Modality::Second,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/lesix.json")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo { .. }));
    }

    #[test]
    fn test_validation_errors() {
        let small_base = EngineConfig {
            base: Some(vec![1, 2, 3]),
            ..EngineConfig::default()
        };
        assert!(matches!(small_base.validate(), Err(EngineError::BaseTooSmall(3))));

        let bad_guarantee = EngineConfig {
            guarantee: Guarantee::new(5, 4),
            ..EngineConfig::default()
        };
        assert!(matches!(
            bad_guarantee.validate(),
            Err(EngineError::InvalidGuarantee { .. })
        ));

        let bad_alpha = EngineConfig {
            significance: 1.2,
            ..EngineConfig::default()
        };
        assert!(bad_alpha.validate().is_err());
    }
}
