use std::path::PathBuf;

use lesix_db::models::{Modality, ModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Historique vide : aucun tirage à analyser")]
    EmptyHistory,

    #[error("Tirage {seq_id} invalide : {source}")]
    InvalidDraw {
        seq_id: u32,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Historique mélangeant deux modalités ({0} et {1})")]
    MixedModality(Modality, Modality),

    #[error("Base de {0} numéros : il en faut au moins 6")]
    BaseTooSmall(usize),

    #[error("Garantie invalide ({k} si {m}) pour une base de {base} numéros")]
    InvalidGuarantee { k: usize, m: usize, base: usize },

    #[error("Configuration invalide : {0}")]
    InvalidConfig(String),

    #[error("Impossible de lire ou d'écrire {path:?} : {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration JSON invalide : {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("Calcul statistique impossible : {0}")]
    Statistics(String),
}
