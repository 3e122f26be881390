use lesix_db::models::{Combination, Domain, HistoricalDraw, PICK_COUNT};

use crate::error::EngineError;
use crate::normalize::check_history;

/// Matrice de Jaccard entre numéros : tirages communs / tirages contenant l'un ou l'autre.
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityMatrix {
    domain: Domain,
    size: usize,
    values: Vec<f64>,
}

impl AffinityMatrix {
    pub fn from_draws(draws: &[HistoricalDraw], domain: &Domain) -> Result<Self, EngineError> {
        let ordered = check_history(draws, domain)?;
        let size = domain.size();

        let mut counts = vec![0u32; size];
        let mut joint = vec![0u32; size * size];
        for draw in ordered {
            let idx = draw.combination.numbers().map(|n| domain.index_of(n));
            for a in 0..PICK_COUNT {
                counts[idx[a]] += 1;
                for b in a + 1..PICK_COUNT {
                    joint[idx[a] * size + idx[b]] += 1;
                }
            }
        }

        let mut values = vec![0.0; size * size];
        for i in 0..size {
            values[i * size + i] = 1.0;
            for j in i + 1..size {
                let both = joint[i * size + j];
                let union = counts[i] + counts[j] - both;
                let v = if union == 0 {
                    0.0
                } else {
                    both as f64 / union as f64
                };
                values[i * size + j] = v;
                values[j * size + i] = v;
            }
        }

        Ok(Self {
            domain: *domain,
            size,
            values,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Les deux numéros doivent appartenir au domaine de la matrice.
    pub fn get(&self, a: u8, b: u8) -> f64 {
        self.values[self.domain.index_of(a) * self.size + self.domain.index_of(b)]
    }

    /// Moyenne des 15 paires de la combinaison.
    pub fn combination_score(&self, combination: &Combination) -> f64 {
        let numbers = combination.numbers();
        let mut total = 0.0;
        let mut pairs = 0;
        for a in 0..PICK_COUNT {
            for b in a + 1..PICK_COUNT {
                total += self.get(numbers[a], numbers[b]);
                pairs += 1;
            }
        }
        total / pairs as f64
    }

    /// Paires les plus liées, à égalité dans l'ordre des numéros.
    pub fn strongest_pairs(&self, limit: usize) -> Vec<(u8, u8, f64)> {
        let numbers: Vec<u8> = self.domain.numbers().collect();
        let mut pairs: Vec<(u8, u8, f64)> = Vec::new();
        for (i, &a) in numbers.iter().enumerate() {
            for &b in &numbers[i + 1..] {
                pairs.push((a, b, self.get(a, b)));
            }
        }
        pairs.sort_by(|x, y| y.2.total_cmp(&x.2));
        pairs.truncate(limit);
        pairs
    }
}
