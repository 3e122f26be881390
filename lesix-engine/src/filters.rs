use std::fmt;

use lesix_db::models::{Combination, PICK_COUNT};
use serde::{Deserialize, Serialize};

use crate::entropy::{normalized_gap_entropy, EntropyGate};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Bornes de forme d'une combinaison « équilibrée ».
///
/// Les filtres ne retirent jamais une combinaison d'un système réduit, ce qui
/// casserait la garantie : ils servent à ordonner la liste courte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinationFilter {
    pub even: Bounds<usize>,
    pub sum: Bounds<u16>,
    pub max_gap: u8,
    pub amplitude: Bounds<u8>,
    pub entropy: EntropyGate,
}

impl Default for CombinationFilter {
    fn default() -> Self {
        Self {
            even: Bounds::new(2, 4),
            sum: Bounds::new(90, 180),
            max_gap: 18,
            amplitude: Bounds::new(20, 45),
            entropy: EntropyGate::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Parity { even: usize },
    Sum { sum: u16 },
    Spacing { gap: u8 },
    Amplitude { amplitude: u8 },
    Entropy { normalized: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Parity { even } => write!(f, "parité déséquilibrée ({} pairs)", even),
            Rejection::Sum { sum } => write!(f, "somme {} hors bornes", sum),
            Rejection::Spacing { gap } => write!(f, "écart de {} trop grand", gap),
            Rejection::Amplitude { amplitude } => write!(f, "amplitude {} hors bornes", amplitude),
            Rejection::Entropy { normalized } => write!(f, "entropie {:.3} hors fenêtre", normalized),
        }
    }
}

impl CombinationFilter {
    /// Toutes les raisons de rejet, vide si la combinaison passe.
    pub fn check(&self, combination: &Combination) -> Vec<Rejection> {
        let mut rejections = Vec::new();

        let even = combination.even_count();
        if !self.even.contains(even) {
            rejections.push(Rejection::Parity { even });
        }
        let sum = combination.sum();
        if !self.sum.contains(sum) {
            rejections.push(Rejection::Sum { sum });
        }
        let widest = combination.gaps().into_iter().max().unwrap_or(0);
        if widest > self.max_gap {
            rejections.push(Rejection::Spacing { gap: widest });
        }
        let amplitude = combination.amplitude();
        if !self.amplitude.contains(amplitude) {
            rejections.push(Rejection::Amplitude { amplitude });
        }
        let normalized = normalized_gap_entropy(combination);
        if !self.entropy.accepts_value(normalized) {
            rejections.push(Rejection::Entropy { normalized });
        }

        rejections
    }

    pub fn accepts(&self, combination: &Combination) -> bool {
        self.check(combination).is_empty()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |what: &str| Err(EngineError::InvalidConfig(format!("filtre {} incohérent", what)));
        if self.even.min > self.even.max || self.even.max > PICK_COUNT {
            return invalid("de parité");
        }
        if self.sum.min > self.sum.max {
            return invalid("de somme");
        }
        if self.amplitude.min > self.amplitude.max {
            return invalid("d'amplitude");
        }
        if !(0.0..=1.0).contains(&self.entropy.min)
            || !(0.0..=1.0).contains(&self.entropy.max)
            || self.entropy.min > self.entropy.max
        {
            return invalid("d'entropie");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::combo;

    #[test]
    fn test_arithmetic_progression_rejected_by_entropy_only() {
        let rejections = CombinationFilter::default().check(&combo(&[5, 10, 15, 20, 25, 30]));
        assert_eq!(rejections, vec![Rejection::Entropy { normalized: 0.0 }]);
    }

    #[test]
    fn test_balanced_combination_passes() {
        assert!(CombinationFilter::default().accepts(&combo(&[3, 8, 14, 22, 31, 40])));
    }

    #[test]
    fn test_every_reason_is_reported() {
        // 6 pairs, somme 58, écart de 30, amplitude 38 acceptée, entropie ~0.28
        let rejections = CombinationFilter::default().check(&combo(&[0, 2, 4, 6, 8, 38]));
        assert!(rejections.contains(&Rejection::Parity { even: 6 }));
        assert!(rejections.contains(&Rejection::Sum { sum: 58 }));
        assert!(rejections.contains(&Rejection::Spacing { gap: 30 }));
        assert!(rejections.iter().any(|r| matches!(r, Rejection::Entropy { .. })));
        assert!(!rejections.iter().any(|r| matches!(r, Rejection::Amplitude { .. })));
        assert_eq!(rejections.len(), 4);
    }

    #[test]
    fn test_validate() {
        assert!(CombinationFilter::default().validate().is_ok());
        let broken = CombinationFilter {
            sum: Bounds::new(200, 100),
            ..CombinationFilter::default()
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(Rejection::Sum { sum: 58 }.to_string(), "somme 58 hors bornes");
    }
}
