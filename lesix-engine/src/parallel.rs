use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    /// En dessous : exécution séquentielle.
    pub limited_threshold: usize,
    /// À partir de ce volume : pool dédié.
    pub pool_threshold: usize,
    /// Tâches simultanées entre les deux seuils.
    pub max_in_flight: usize,
    /// Threads du pool dédié, 0 = tous les cœurs.
    pub worker_threads: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limited_threshold: 5_000,
            pool_threshold: 10_000,
            max_in_flight: 4,
            worker_threads: 0,
        }
    }
}

impl ParallelConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.limited_threshold > self.pool_threshold {
            return Err(EngineError::InvalidConfig(format!(
                "seuil limité {} supérieur au seuil du pool {}",
                self.limited_threshold, self.pool_threshold
            )));
        }
        if self.max_in_flight == 0 {
            return Err(EngineError::InvalidConfig(
                "max_in_flight doit être au moins 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Limited,
    Pool,
}

/// Répartit des tâches pures selon le volume de travail. Un échec du pool
/// (construction ou panique d'un worker) retombe sur l'exécution séquentielle.
pub struct Executor {
    config: ParallelConfig,
    limited: Option<ThreadPool>,
    pool: Option<ThreadPool>,
}

impl Executor {
    pub fn new(config: ParallelConfig) -> Self {
        let (limited, pool) = if config.enabled {
            (
                build_pool("limite", config.max_in_flight.max(1)),
                build_pool("pool", config.worker_threads),
            )
        } else {
            (None, None)
        };
        Self {
            config,
            limited,
            pool,
        }
    }

    pub fn sequential() -> Self {
        Self::new(ParallelConfig {
            enabled: false,
            ..ParallelConfig::default()
        })
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn mode_for(&self, workload: usize) -> ExecutionMode {
        if !self.config.enabled || workload < self.config.limited_threshold {
            ExecutionMode::Sequential
        } else if workload < self.config.pool_threshold {
            ExecutionMode::Limited
        } else {
            ExecutionMode::Pool
        }
    }

    /// `task(i)` pour `i` dans `0..len`, résultats dans l'ordre des indices.
    pub fn map<R, F>(&self, len: usize, task: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        self.map_with_workload(len, len, task)
    }

    /// Comme `map`, quand chaque tâche traite un lot et que le volume réel
    /// (`workload`) diffère du nombre de tâches.
    pub fn map_with_workload<R, F>(&self, len: usize, workload: usize, task: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        let pool = match self.mode_for(workload) {
            ExecutionMode::Sequential => None,
            ExecutionMode::Limited => self.limited.as_ref(),
            ExecutionMode::Pool => self.pool.as_ref(),
        };
        let Some(pool) = pool else {
            return (0..len).map(&task).collect();
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.install(|| (0..len).into_par_iter().map(&task).collect::<Vec<R>>())
        }));
        match outcome {
            Ok(results) => results,
            Err(payload) => {
                log::warn!(
                    "Exécution parallèle interrompue ({}), reprise séquentielle de {} tâches",
                    panic_message(payload.as_ref()),
                    len
                );
                (0..len).map(&task).collect()
            }
        }
    }
}

fn build_pool(name: &'static str, threads: usize) -> Option<ThreadPool> {
    accept_pool(
        name,
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("lesix-{}-{}", name, i))
            .build(),
    )
}

fn accept_pool(name: &str, built: Result<ThreadPool, ThreadPoolBuildError>) -> Option<ThreadPool> {
    built
        .map_err(|e| log::warn!("Pool '{}' indisponible, mode séquentiel : {}", name, e))
        .ok()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panique".to_string()
    }
}
