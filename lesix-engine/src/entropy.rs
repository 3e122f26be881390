use lesix_db::models::{Combination, PICK_COUNT};
use serde::{Deserialize, Serialize};

/// Entropie de Shannon (bits) de la distribution des 5 écarts.
pub fn gap_entropy(combination: &Combination) -> f64 {
    let mut gaps = combination.gaps();
    gaps.sort_unstable();
    let total = gaps.len() as f64;

    let mut h = 0.0;
    let mut run = 1;
    for i in 1..=gaps.len() {
        if i < gaps.len() && gaps[i] == gaps[i - 1] {
            run += 1;
            continue;
        }
        let p = run as f64 / total;
        h -= p * p.log2();
        run = 1;
    }
    h
}

/// Entropie ramenée à `[0, 1)` par `log2(6)`.
pub fn normalized_gap_entropy(combination: &Combination) -> f64 {
    gap_entropy(combination) / (PICK_COUNT as f64).log2()
}

/// Fenêtre d'entropie acceptable : ni suite arithmétique, ni dispersion maximale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntropyGate {
    pub min: f64,
    pub max: f64,
}

impl Default for EntropyGate {
    fn default() -> Self {
        Self { min: 0.3, max: 0.9 }
    }
}

impl EntropyGate {
    pub fn accepts_value(&self, normalized: f64) -> bool {
        (self.min..=self.max).contains(&normalized)
    }

    pub fn accepts(&self, combination: &Combination) -> bool {
        self.accepts_value(normalized_gap_entropy(combination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::combo;

    #[test]
    fn test_arithmetic_progression_has_zero_entropy() {
        let c = combo(&[5, 10, 15, 20, 25, 30]);
        assert_eq!(gap_entropy(&c), 0.0);
        assert!(!EntropyGate::default().accepts(&c));
    }

    #[test]
    fn test_distinct_gaps() {
        let c = combo(&[1, 3, 6, 10, 15, 21]);
        assert!((gap_entropy(&c) - 5f64.log2()).abs() < 1e-10);
        let normalized = normalized_gap_entropy(&c);
        assert!((normalized - 5f64.log2() / 6f64.log2()).abs() < 1e-10);
        assert!(EntropyGate::default().accepts(&c));
    }

    #[test]
    fn test_one_repeated_gap() {
        // écarts 5, 6, 8, 9, 9
        let c = combo(&[3, 8, 14, 22, 31, 40]);
        let expected = -(0.4f64 * 0.4f64.log2()) - 3.0 * (0.2f64 * 0.2f64.log2());
        assert!((gap_entropy(&c) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_invariant_under_relabeling() {
        let a = combo(&[1, 3, 6, 10, 15, 21]);
        let shifted = combo(&[20, 22, 25, 29, 34, 40]);
        let reversed = combo(&[1, 7, 12, 16, 19, 21]);
        assert_eq!(gap_entropy(&a), gap_entropy(&shifted));
        assert!((gap_entropy(&a) - gap_entropy(&reversed)).abs() < 1e-12);
    }

    #[test]
    fn test_gate_bounds() {
        let gate = EntropyGate { min: 0.3, max: 0.9 };
        assert!(gate.accepts_value(0.3));
        assert!(gate.accepts_value(0.9));
        assert!(!gate.accepts_value(0.29));
        assert!(!gate.accepts_value(0.95));
    }
}
