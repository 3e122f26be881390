use std::collections::HashSet;
use std::fmt;

use lesix_db::models::{Combination, Domain, ModelError, PICK_COUNT};
use serde::{Deserialize, Serialize};

use crate::combinatorics::{binomial, mask_numbers, Subsets};
use crate::error::EngineError;
use crate::parallel::Executor;

/// Taille des tranches de rangs confiées à chaque tâche du validateur.
const VALIDATION_CHUNK: u64 = 4_096;

/// Au-delà de ce nombre de m-sous-ensembles, la vérification est annoncée
/// comme longue. Elle n'est jamais tronquée.
pub const VALIDATION_WARN_LIMIT: u64 = 50_000_000;

/// « k si m » : tout m-sous-ensemble de la base partage au moins k numéros
/// avec une combinaison du système.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantee {
    pub k: usize,
    pub m: usize,
}

impl Default for Guarantee {
    fn default() -> Self {
        Self { k: 4, m: 5 }
    }
}

impl Guarantee {
    pub fn new(k: usize, m: usize) -> Self {
        Self { k, m }
    }

    pub fn validate(&self, base_size: usize) -> Result<(), EngineError> {
        if self.k == 0 || self.k > PICK_COUNT || self.m < self.k || self.m > base_size {
            return Err(EngineError::InvalidGuarantee {
                k: self.k,
                m: self.m,
                base: base_size,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Guarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} si {}", self.k, self.m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Branch {
    Exact,
    Heuristic,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Exact => write!(f, "exacte (glouton)"),
            Branch::Heuristic => write!(f, "heuristique"),
        }
    }
}

/// Limites de la génération. La vérification parcourt toujours les
/// C(|B|, m) objectifs : avec m proche de |B|/2 sur une grande base
/// (40 numéros, m = 20 : 1,4e11), elle dépasse largement
/// [`VALIDATION_WARN_LIMIT`] et peut durer des heures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Nombre maximal de combinaisons de la branche heuristique.
    pub max_combinations: usize,
    pub exact_candidate_limit: u64,
    pub exact_incidence_limit: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            max_combinations: 50,
            exact_candidate_limit: 40_000,
            exact_incidence_limit: 20_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedSystem {
    pub base: Vec<u8>,
    pub combinations: Vec<Combination>,
    pub guarantee: Guarantee,
    pub branch: Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub total: u64,
    pub covered: u64,
    /// En pourcentage.
    pub coverage: f64,
    pub valid: bool,
    pub first_uncovered: Option<Vec<u8>>,
}

/// Base triée, dans le domaine, sans doublon, d'au moins 6 numéros.
pub fn prepare_base(base: &[u8], domain: &Domain) -> Result<Vec<u8>, EngineError> {
    domain.validate()?;
    if base.len() < PICK_COUNT {
        return Err(EngineError::BaseTooSmall(base.len()));
    }
    let mut sorted = base
        .iter()
        .map(|&n| domain.check(n))
        .collect::<Result<Vec<u8>, _>>()?;
    sorted.sort_unstable();
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(ModelError::Duplicate(pair[0]).into());
    }
    Ok(sorted)
}

/// Nombre total d'entrées des listes d'incidence de la branche exacte.
pub fn incidence_size(base_size: usize, guarantee: &Guarantee) -> u64 {
    if base_size < PICK_COUNT {
        return 0;
    }
    let per_candidate = (guarantee.k..=guarantee.m.min(PICK_COUNT))
        .map(|j| binomial(PICK_COUNT, j).saturating_mul(binomial(base_size - PICK_COUNT, guarantee.m - j)))
        .fold(0u64, u64::saturating_add);
    binomial(base_size, PICK_COUNT).saturating_mul(per_candidate)
}

pub fn select_branch(base_size: usize, guarantee: &Guarantee, config: &WheelConfig) -> Branch {
    if binomial(base_size, PICK_COUNT) <= config.exact_candidate_limit
        && incidence_size(base_size, guarantee) <= config.exact_incidence_limit
    {
        Branch::Exact
    } else {
        Branch::Heuristic
    }
}

pub fn generate(
    base: &[u8],
    guarantee: Guarantee,
    domain: &Domain,
    config: &WheelConfig,
    executor: &Executor,
) -> Result<ReducedSystem, EngineError> {
    let base = prepare_base(base, domain)?;
    guarantee.validate(base.len())?;

    let branch = select_branch(base.len(), &guarantee, config);
    log::debug!(
        "Système réduit {} sur {} numéros : branche {} ({} candidats)",
        guarantee,
        base.len(),
        branch,
        binomial(base.len(), PICK_COUNT)
    );

    let masks = match branch {
        Branch::Exact => greedy_cover(&base, &guarantee, executor),
        Branch::Heuristic => {
            if config.max_combinations == 0 {
                return Err(EngineError::InvalidConfig(
                    "max_combinations doit être au moins 1".to_string(),
                ));
            }
            spread_cover(&base, config.max_combinations, executor)
        }
    };

    let combinations = masks
        .into_iter()
        .map(|mask| Combination::new(&mask_numbers(mask), domain))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReducedSystem {
        base,
        combinations,
        guarantee,
        branch,
    })
}

/// Glouton sur les listes d'incidence : à chaque tour, le premier candidat
/// (ordre lexicographique) qui couvre le plus d'objectifs restants.
fn greedy_cover(base: &[u8], guarantee: &Guarantee, executor: &Executor) -> Vec<u64> {
    let n = base.len();
    let k = guarantee.k as u32;
    let candidates: Vec<u64> = Subsets::new(n, PICK_COUNT).masks(base).collect();
    let objectives: Vec<u64> = Subsets::new(n, guarantee.m).masks(base).collect();

    let incidence: Vec<Vec<u32>> = executor.map_with_workload(
        candidates.len(),
        candidates.len().saturating_mul(objectives.len()),
        |c| {
            let candidate = candidates[c];
            objectives
                .iter()
                .enumerate()
                .filter(|&(_, &o)| (candidate & o).count_ones() >= k)
                .map(|(i, _)| i as u32)
                .collect()
        },
    );

    let incidence_total: usize = incidence.iter().map(Vec::len).sum();
    let mut covered = vec![false; objectives.len()];
    let mut remaining = objectives.len();
    let mut chosen = Vec::new();

    while remaining > 0 {
        let gains: Vec<usize> = executor.map_with_workload(incidence.len(), incidence_total, |c| {
            incidence[c].iter().filter(|&&o| !covered[o as usize]).count()
        });
        let (best, gain) = gains
            .iter()
            .enumerate()
            .fold((0, 0), |acc, (i, &g)| if g > acc.1 { (i, g) } else { acc });

        if gain == 0 {
            log::warn!(
                "Couverture {} incomplète : {} objectifs hors d'atteinte",
                guarantee,
                remaining
            );
            break;
        }

        for &o in &incidence[best] {
            covered[o as usize] = true;
        }
        remaining -= gain;
        chosen.push(candidates[best]);
        log::debug!(
            "Tour {} : candidat {} couvre {} objectifs, reste {}",
            chosen.len(),
            best,
            gain,
            remaining
        );
    }

    chosen
}

/// Combinaisons réparties sur la base par pas réguliers, sans doublon.
fn spread_cover(base: &[u8], max_combinations: usize, executor: &Executor) -> Vec<u64> {
    let stride = (base.len() / PICK_COUNT).max(1);
    let picks = executor.map(max_combinations, |i| spread_pick(base, i, stride));
    let mut seen = HashSet::new();
    picks.into_iter().filter(|mask| seen.insert(*mask)).collect()
}

fn spread_pick(base: &[u8], i: usize, stride: usize) -> u64 {
    let n = base.len();
    let offset = i % n;
    let step = match (stride + i / n) % n {
        0 => 1,
        s => s,
    };

    // pas réguliers depuis l'offset, puis complément par les numéros suivants
    let walk = (0..PICK_COUNT)
        .map(|j| (offset + j * step) % n)
        .chain((1..n).map(|d| (offset + d) % n));

    let mut taken = vec![false; n];
    let mut count = 0;
    let mut mask = 0u64;
    for idx in walk {
        if count == PICK_COUNT {
            break;
        }
        if !taken[idx] {
            taken[idx] = true;
            mask |= 1u64 << base[idx];
            count += 1;
        }
    }
    mask
}

/// Nombre de m-sous-ensembles que la vérification doit parcourir.
pub fn validation_size(base_size: usize, guarantee: &Guarantee) -> u64 {
    binomial(base_size, guarantee.m)
}

/// Vérifie la garantie en parcourant tous les m-sous-ensembles de la base.
pub fn validate(system: &ReducedSystem, executor: &Executor) -> CoverageReport {
    let n = system.base.len();
    let m = system.guarantee.m;
    let k = system.guarantee.k as u32;
    let total = validation_size(n, &system.guarantee);
    if total > VALIDATION_WARN_LIMIT {
        log::warn!(
            "Vérification de {} sous-ensembles ({} sur {} numéros) : calcul très long",
            total,
            system.guarantee,
            n
        );
    }
    let masks: Vec<u64> = system.combinations.iter().map(Combination::mask).collect();

    let chunks = total.div_ceil(VALIDATION_CHUNK) as usize;
    let partials: Vec<(u64, Option<u64>)> =
        executor.map_with_workload(chunks, total.min(usize::MAX as u64) as usize, |c| {
            let start = c as u64 * VALIDATION_CHUNK;
            let len = VALIDATION_CHUNK.min(total - start) as usize;
            let mut covered = 0u64;
            let mut first = None;
            for objective in Subsets::starting_at(n, m, start).masks(&system.base).take(len) {
                if masks.iter().any(|&c| (c & objective).count_ones() >= k) {
                    covered += 1;
                } else if first.is_none() {
                    first = Some(objective);
                }
            }
            (covered, first)
        });

    let covered: u64 = partials.iter().map(|p| p.0).sum();
    let first_uncovered = partials.iter().find_map(|p| p.1).map(mask_numbers);
    let coverage = if total == 0 {
        100.0
    } else {
        covered as f64 / total as f64 * 100.0
    };

    CoverageReport {
        total,
        covered,
        coverage,
        valid: covered == total,
        first_uncovered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::combo;
    use crate::parallel::ParallelConfig;

    fn twelve() -> Vec<u8> {
        vec![2, 5, 8, 11, 14, 17, 20, 23, 26, 29, 32, 35]
    }

    fn brute_force_covers(system: &ReducedSystem) -> bool {
        let k = system.guarantee.k;
        Subsets::new(system.base.len(), system.guarantee.m).all(|idx| {
            let subset: Vec<u8> = idx.iter().map(|&i| system.base[i]).collect();
            system
                .combinations
                .iter()
                .any(|c| subset.iter().filter(|n| c.contains(**n)).count() >= k)
        })
    }

    #[test]
    fn test_six_number_base() {
        let system = generate(
            &[21, 1, 17, 5, 13, 9],
            Guarantee::new(4, 5),
            &Domain::default(),
            &WheelConfig::default(),
            &Executor::sequential(),
        )
        .unwrap();
        assert_eq!(system.branch, Branch::Exact);
        assert_eq!(system.combinations, vec![combo(&[1, 5, 9, 13, 17, 21])]);

        let report = validate(&system, &Executor::sequential());
        assert_eq!(report.total, 6);
        assert_eq!(report.covered, 6);
        assert_eq!(report.coverage, 100.0);
        assert!(report.valid);
        assert_eq!(report.first_uncovered, None);
    }

    #[test]
    fn test_twelve_numbers_exact_and_sound() {
        let executor = Executor::new(ParallelConfig::default());
        let system = generate(
            &twelve(),
            Guarantee::default(),
            &Domain::default(),
            &WheelConfig::default(),
            &executor,
        )
        .unwrap();
        assert_eq!(system.branch, Branch::Exact);
        assert!(!system.combinations.is_empty());
        assert!(system.combinations.len() < 924);

        let report = validate(&system, &executor);
        assert_eq!(report.total, 792);
        assert!(report.valid);
        assert!(brute_force_covers(&system));

        let base_mask: u64 = twelve().iter().fold(0, |acc, &n| acc | (1 << n));
        for c in &system.combinations {
            assert_eq!(c.mask() & !base_mask, 0);
        }
    }

    #[test]
    fn test_subset_guarantee() {
        let system = generate(
            &[1, 2, 3, 4, 5, 6, 7, 8],
            Guarantee::new(3, 3),
            &Domain::default(),
            &WheelConfig::default(),
            &Executor::sequential(),
        )
        .unwrap();
        assert!(validate(&system, &Executor::sequential()).valid);
        assert!(brute_force_covers(&system));
    }

    #[test]
    fn test_forty_numbers_heuristic() {
        let base: Vec<u8> = (1..=40).collect();
        let config = WheelConfig::default();
        let system = generate(
            &base,
            Guarantee::default(),
            &Domain::default(),
            &config,
            &Executor::sequential(),
        )
        .unwrap();
        assert_eq!(system.branch, Branch::Heuristic);
        assert!(!system.combinations.is_empty());
        assert!(system.combinations.len() <= config.max_combinations);
        // premier candidat : un numéro sur six depuis le début
        assert_eq!(system.combinations[0], combo(&[1, 7, 13, 19, 25, 31]));

        let unique: HashSet<Combination> = system.combinations.iter().copied().collect();
        assert_eq!(unique.len(), system.combinations.len());
        for c in &system.combinations {
            assert!(c.numbers().iter().all(|n| base.contains(n)));
        }
    }

    #[test]
    fn test_partial_coverage_is_reported() {
        let system = ReducedSystem {
            base: vec![1, 2, 3, 4, 5, 6, 7, 8],
            combinations: vec![combo(&[1, 2, 3, 4, 5, 6])],
            guarantee: Guarantee::new(3, 3),
            branch: Branch::Heuristic,
        };
        let report = validate(&system, &Executor::sequential());
        assert_eq!(report.total, 56);
        assert_eq!(report.covered, 20);
        assert!(!report.valid);
        assert!(report.coverage < 100.0);
        assert_eq!(report.first_uncovered, Some(vec![1, 2, 7]));
    }

    #[test]
    fn test_deterministic_across_execution_modes() {
        let eager = Executor::new(ParallelConfig {
            limited_threshold: 2,
            pool_threshold: 4,
            ..ParallelConfig::default()
        });
        let run = |executor: &Executor| {
            generate(
                &twelve(),
                Guarantee::default(),
                &Domain::default(),
                &WheelConfig::default(),
                executor,
            )
            .unwrap()
        };
        let sequential = run(&Executor::sequential());
        assert_eq!(run(&eager), sequential);
        assert_eq!(run(&Executor::sequential()), sequential);
        assert_eq!(
            validate(&sequential, &eager),
            validate(&sequential, &Executor::sequential())
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let domain = Domain::default();
        let config = WheelConfig::default();
        let executor = Executor::sequential();
        let gen = |base: &[u8], g: Guarantee| generate(base, g, &domain, &config, &executor);

        assert!(matches!(
            gen(&[1, 2, 3, 4, 5], Guarantee::default()),
            Err(EngineError::BaseTooSmall(5))
        ));
        assert!(gen(&[1, 2, 3, 4, 5, 5, 6], Guarantee::default()).is_err());
        assert!(gen(&[1, 2, 3, 4, 5, 46], Guarantee::default()).is_err());
        for g in [Guarantee::new(0, 3), Guarantee::new(7, 7), Guarantee::new(4, 3), Guarantee::new(4, 7)] {
            assert!(matches!(
                gen(&[1, 2, 3, 4, 5, 6], g),
                Err(EngineError::InvalidGuarantee { .. })
            ));
        }
    }

    #[test]
    fn test_validation_size() {
        assert_eq!(validation_size(12, &Guarantee::new(4, 5)), 792);
        assert!(validation_size(12, &Guarantee::new(4, 5)) < VALIDATION_WARN_LIMIT);
        // base 40, m = 20 : C(40, 20) = 137 846 528 820
        assert_eq!(validation_size(40, &Guarantee::new(4, 20)), 137_846_528_820);
        assert!(validation_size(40, &Guarantee::new(4, 20)) > VALIDATION_WARN_LIMIT);
    }

    #[test]
    fn test_branch_routing() {
        let config = WheelConfig::default();
        assert_eq!(incidence_size(6, &Guarantee::new(4, 5)), 6);
        assert_eq!(select_branch(12, &Guarantee::default(), &config), Branch::Exact);
        assert_eq!(select_branch(40, &Guarantee::default(), &config), Branch::Heuristic);
        // 38 760 candidats, mais des listes d'incidence trop lourdes
        assert_eq!(select_branch(20, &Guarantee::new(4, 10), &config), Branch::Heuristic);
    }
}
