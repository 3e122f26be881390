use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::io::Read;
use std::path::Path;

use crate::db::insert_draw;
use crate::models::{DrawRecord, Modality, PICK_COUNT};

/// Accepte `JJ/MM/AAAA` (format des résultats officiels) ou `AAAA-MM-JJ`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .with_context(|| format!("Format de date invalide: '{}'", raw))
}

// Colonnes : seq;date;modalité;n1;n2;n3;n4;n5;n6[;extra]
fn parse_record(record: &csv::StringRecord) -> Result<DrawRecord> {
    let get = |idx: usize| -> Result<String> {
        record
            .get(idx)
            .map(|s| s.trim().to_string())
            .with_context(|| format!("Champ manquant à l'index {}", idx))
    };

    let get_u8 = |idx: usize| -> Result<u8> {
        let s = get(idx)?;
        s.parse::<u8>()
            .with_context(|| format!("Impossible de parser '{}' (index {})", s, idx))
    };

    let seq_raw = get(0)?;
    let seq_id = seq_raw
        .parse::<u32>()
        .with_context(|| format!("Numéro de concours invalide: '{}'", seq_raw))?;
    let date = parse_date(&get(1)?)?;
    let modality: Modality = get(2)?.parse()?;

    let mut numbers = [0u8; PICK_COUNT];
    for (i, n) in numbers.iter_mut().enumerate() {
        *n = get_u8(3 + i)?;
    }

    let extra = match record.get(3 + PICK_COUNT).map(str::trim) {
        None | Some("") => None,
        Some(_) => Some(get_u8(3 + PICK_COUNT)?),
    };

    if record.len() > 4 + PICK_COUNT {
        bail!("Trop de colonnes ({}) pour le concours {}", record.len(), seq_id);
    }

    Ok(DrawRecord {
        seq_id,
        date,
        modality,
        numbers,
        extra,
    })
}

pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
    import_reader(conn, file)
}

pub fn import_reader<R: Read>(conn: &Connection, input: R) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(input);

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    let mut result = ImportResult {
        total_records: 0,
        inserted: 0,
        skipped: 0,
        errors: 0,
    };

    for record_result in reader.records() {
        result.total_records += 1;
        match record_result {
            Ok(record) => {
                match parse_record(&record) {
                    Ok(draw) => {
                        match insert_draw(&tx, &draw) {
                            Ok(true) => result.inserted += 1,
                            Ok(false) => result.skipped += 1,
                            Err(e) => {
                                log::warn!("Erreur insertion tirage {}: {}", result.total_records, e);
                                result.errors += 1;
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("Erreur parsing ligne {}: {:#}", result.total_records, e);
                        result.errors += 1;
                    }
                }
            }
            Err(e) => {
                log::warn!("Erreur lecture ligne {}: {}", result.total_records, e);
                result.errors += 1;
            }
        }
    }

    tx.commit().context("Échec du commit")?;
    Ok(result)
}
