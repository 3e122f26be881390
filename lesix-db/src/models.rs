use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nombre de numéros par tirage et par combinaison.
pub const PICK_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Domaine invalide {min}-{max} : {reason}")]
    InvalidDomain {
        min: u8,
        max: u8,
        reason: &'static str,
    },

    #[error("Numéro {number} hors domaine ({min}-{max})")]
    OutOfDomain { number: u8, min: u8, max: u8 },

    #[error("Numéro en double : {0}")]
    Duplicate(u8),

    #[error("Une combinaison compte exactement 6 numéros, reçu {0}")]
    WrongSize(usize),

    #[error("Modalité inconnue : '{0}'")]
    UnknownModality(String),
}

/// Plage fermée des numéros jouables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub min: u8,
    pub max: u8,
}

impl Default for Domain {
    fn default() -> Self {
        Self { min: 0, max: 45 }
    }
}

impl Domain {
    /// Les combinaisons sont manipulées en masques `u64`.
    pub const MAX_NUMBER: u8 = 63;

    pub fn new(min: u8, max: u8) -> Result<Self, ModelError> {
        let domain = Self { min, max };
        domain.validate()?;
        Ok(domain)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason| ModelError::InvalidDomain {
            min: self.min,
            max: self.max,
            reason,
        };
        if self.min > self.max {
            return Err(invalid("min > max"));
        }
        if self.max > Self::MAX_NUMBER {
            return Err(invalid("numéros au-delà de 63"));
        }
        if self.size() < PICK_COUNT {
            return Err(invalid("moins de 6 numéros"));
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        (self.max as usize + 1).saturating_sub(self.min as usize)
    }

    pub fn contains(&self, number: u8) -> bool {
        (self.min..=self.max).contains(&number)
    }

    /// Position du numéro dans le domaine. Suppose `contains(number)`.
    pub fn index_of(&self, number: u8) -> usize {
        (number - self.min) as usize
    }

    pub fn numbers(&self) -> std::ops::RangeInclusive<u8> {
        self.min..=self.max
    }

    pub fn check(&self, number: u8) -> Result<u8, ModelError> {
        if self.contains(number) {
            Ok(number)
        } else {
            Err(ModelError::OutOfDomain {
                number,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Tirage principal ou second tirage d'un même concours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    First,
    Second,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::First => "first",
            Modality::Second => "second",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::First => write!(f, "1er tirage"),
            Modality::Second => write!(f, "2e tirage"),
        }
    }
}

impl FromStr for Modality {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "first" | "premier" => Ok(Modality::First),
            "2" | "second" | "deuxieme" | "deuxième" => Ok(Modality::Second),
            other => Err(ModelError::UnknownModality(other.to_string())),
        }
    }
}

/// Six numéros distincts, toujours stockés en ordre croissant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Combination([u8; PICK_COUNT]);

impl Combination {
    pub fn new(numbers: &[u8], domain: &Domain) -> Result<Self, ModelError> {
        if numbers.len() != PICK_COUNT {
            return Err(ModelError::WrongSize(numbers.len()));
        }
        domain.validate()?;
        let mut sorted = [0u8; PICK_COUNT];
        for (slot, &n) in sorted.iter_mut().zip(numbers) {
            *slot = domain.check(n)?;
        }
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
            return Err(ModelError::Duplicate(pair[0]));
        }
        Ok(Self(sorted))
    }

    pub fn numbers(&self) -> &[u8; PICK_COUNT] {
        &self.0
    }

    pub fn min(&self) -> u8 {
        self.0[0]
    }

    pub fn max(&self) -> u8 {
        self.0[PICK_COUNT - 1]
    }

    pub fn amplitude(&self) -> u8 {
        self.max() - self.min()
    }

    pub fn sum(&self) -> u16 {
        self.0.iter().map(|&n| n as u16).sum()
    }

    pub fn even_count(&self) -> usize {
        self.0.iter().filter(|&&n| n % 2 == 0).count()
    }

    pub fn odd_count(&self) -> usize {
        PICK_COUNT - self.even_count()
    }

    /// Écarts entre numéros consécutifs.
    pub fn gaps(&self) -> [u8; PICK_COUNT - 1] {
        let mut gaps = [0u8; PICK_COUNT - 1];
        for (gap, w) in gaps.iter_mut().zip(self.0.windows(2)) {
            *gap = w[1] - w[0];
        }
        gaps
    }

    pub fn mask(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, &n| acc | (1u64 << n))
    }

    /// Nombre de numéros communs avec l'ensemble décrit par `mask`.
    pub fn shared(&self, mask: u64) -> u32 {
        (self.mask() & mask).count_ones()
    }

    pub fn contains(&self, number: u8) -> bool {
        self.0.binary_search(&number).is_ok()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|n| format!("{:2}", n)).collect();
        write!(f, "{}", parts.join(" - "))
    }
}

/// Ligne brute telle que stockée : numéros dans l'ordre de sortie, non validés.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub seq_id: u32,
    pub date: NaiveDate,
    pub modality: Modality,
    pub numbers: [u8; PICK_COUNT],
    pub extra: Option<u8>,
}

/// Tirage normalisé. La clé d'ordre chronologique est `(date, seq_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalDraw {
    pub seq_id: u32,
    pub date: NaiveDate,
    pub modality: Modality,
    pub combination: Combination,
    pub extra: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub target_date: NaiveDate,
    pub modality: Modality,
    pub rank: u32,
    pub numbers: [u8; PICK_COUNT],
    pub score: f64,
    pub rationale: String,
    pub source: String,
    pub created_at: String,
}
