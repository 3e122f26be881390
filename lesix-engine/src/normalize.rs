use lesix_db::models::{Combination, Domain, DrawRecord, HistoricalDraw};

use crate::error::EngineError;

pub fn normalize_draw(record: &DrawRecord, domain: &Domain) -> Result<HistoricalDraw, EngineError> {
    let combination =
        Combination::new(&record.numbers, domain).map_err(|source| EngineError::InvalidDraw {
            seq_id: record.seq_id,
            source,
        })?;
    Ok(HistoricalDraw {
        seq_id: record.seq_id,
        date: record.date,
        modality: record.modality,
        combination,
        extra: record.extra,
    })
}

/// Convertit un lot d'enregistrements bruts d'une seule modalité, trié par
/// `(date, seq_id)`. Le premier tirage invalide fait échouer tout le lot.
pub fn normalize_history(
    records: &[DrawRecord],
    domain: &Domain,
) -> Result<Vec<HistoricalDraw>, EngineError> {
    domain.validate()?;
    let first = records.first().ok_or(EngineError::EmptyHistory)?;

    let mut draws = records
        .iter()
        .map(|record| {
            if record.modality != first.modality {
                return Err(EngineError::MixedModality(first.modality, record.modality));
            }
            normalize_draw(record, domain)
        })
        .collect::<Result<Vec<_>, _>>()?;

    sort_chronologically(&mut draws);
    Ok(draws)
}

pub fn sort_chronologically(draws: &mut [HistoricalDraw]) {
    draws.sort_by(|a, b| a.date.cmp(&b.date).then(a.seq_id.cmp(&b.seq_id)));
}

/// Point d'entrée commun des moteurs : historique non vide, numéros dans le
/// domaine, vue triée chronologiquement quel que soit l'ordre reçu.
pub(crate) fn check_history<'a>(
    draws: &'a [HistoricalDraw],
    domain: &Domain,
) -> Result<Vec<&'a HistoricalDraw>, EngineError> {
    domain.validate()?;
    if draws.is_empty() {
        return Err(EngineError::EmptyHistory);
    }
    for draw in draws {
        for &n in draw.combination.numbers() {
            domain.check(n).map_err(|source| EngineError::InvalidDraw {
                seq_id: draw.seq_id,
                source,
            })?;
        }
    }
    let mut ordered: Vec<&HistoricalDraw> = draws.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.seq_id.cmp(&b.seq_id)));
    Ok(ordered)
}
