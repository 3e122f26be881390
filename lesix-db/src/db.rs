use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::Path;

use crate::models::{DrawRecord, Modality, PredictionRecord, PICK_COUNT};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    seq_id    INTEGER NOT NULL,
    modality  TEXT NOT NULL,
    date      TEXT NOT NULL,
    n1        INTEGER NOT NULL,
    n2        INTEGER NOT NULL,
    n3        INTEGER NOT NULL,
    n4        INTEGER NOT NULL,
    n5        INTEGER NOT NULL,
    n6        INTEGER NOT NULL,
    extra     INTEGER,
    PRIMARY KEY (seq_id, modality)
);
CREATE INDEX IF NOT EXISTS idx_draws_modality_date ON draws (modality, date);

CREATE TABLE IF NOT EXISTS predictions (
    target_date  TEXT NOT NULL,
    modality     TEXT NOT NULL,
    rank         INTEGER NOT NULL,
    n1           INTEGER NOT NULL,
    n2           INTEGER NOT NULL,
    n3           INTEGER NOT NULL,
    n4           INTEGER NOT NULL,
    n5           INTEGER NOT NULL,
    n6           INTEGER NOT NULL,
    score        REAL NOT NULL,
    rationale    TEXT NOT NULL DEFAULT '',
    source       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (target_date, modality, rank)
);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("lesix.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

pub fn insert_draw(conn: &Connection, draw: &DrawRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO draws (seq_id, modality, date, n1, n2, n3, n4, n5, n6, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            draw.seq_id,
            draw.modality.as_str(),
            draw.date.format(DATE_FORMAT).to_string(),
            draw.numbers[0],
            draw.numbers[1],
            draw.numbers[2],
            draw.numbers[3],
            draw.numbers[4],
            draw.numbers[5],
            draw.extra,
        ],
    ).context("Échec de l'insertion")?;
    Ok(changed > 0)
}

fn text_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| text_error(idx, e))
}

fn modality_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Modality> {
    let raw: String = row.get(idx)?;
    raw.parse::<Modality>().map_err(|e| text_error(idx, e))
}

fn numbers_columns(row: &Row<'_>, first: usize) -> rusqlite::Result<[u8; PICK_COUNT]> {
    let mut numbers = [0u8; PICK_COUNT];
    for (i, n) in numbers.iter_mut().enumerate() {
        *n = row.get::<_, u8>(first + i)?;
    }
    Ok(numbers)
}

fn draw_from_row(row: &Row<'_>) -> rusqlite::Result<DrawRecord> {
    Ok(DrawRecord {
        seq_id: row.get(0)?,
        modality: modality_column(row, 1)?,
        date: date_column(row, 2)?,
        numbers: numbers_columns(row, 3)?,
        extra: row.get(9)?,
    })
}

/// Tirages d'une modalité en ordre chronologique. `years` vide = tout l'historique.
pub fn fetch_draws(conn: &Connection, modality: Modality, years: &[i32]) -> Result<Vec<DrawRecord>> {
    let mut stmt = conn.prepare(
        "SELECT seq_id, modality, date, n1, n2, n3, n4, n5, n6, extra
         FROM draws WHERE modality = ?1 ORDER BY date ASC, seq_id ASC"
    )?;
    let draws = stmt
        .query_map([modality.as_str()], draw_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws
        .into_iter()
        .filter(|d| years.is_empty() || years.contains(&d.date.year()))
        .collect())
}

pub fn fetch_last_draws(conn: &Connection, modality: Modality, limit: u32) -> Result<Vec<DrawRecord>> {
    let mut stmt = conn.prepare(
        "SELECT seq_id, modality, date, n1, n2, n3, n4, n5, n6, extra
         FROM draws WHERE modality = ?1 ORDER BY date DESC, seq_id DESC LIMIT ?2"
    )?;
    let draws = stmt
        .query_map(rusqlite::params![modality.as_str(), limit], draw_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

pub fn count_draws(conn: &Connection, modality: Modality) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM draws WHERE modality = ?1",
        [modality.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Remplace les prédictions d'une date cible.
pub fn save_predictions(conn: &Connection, predictions: &[PredictionRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    for prediction in predictions {
        tx.execute(
            "DELETE FROM predictions WHERE target_date = ?1 AND modality = ?2",
            rusqlite::params![
                prediction.target_date.format(DATE_FORMAT).to_string(),
                prediction.modality.as_str(),
            ],
        )?;
    }

    let mut written = 0;
    for prediction in predictions {
        written += tx.execute(
            "INSERT INTO predictions (target_date, modality, rank, n1, n2, n3, n4, n5, n6, score, rationale, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                prediction.target_date.format(DATE_FORMAT).to_string(),
                prediction.modality.as_str(),
                prediction.rank,
                prediction.numbers[0],
                prediction.numbers[1],
                prediction.numbers[2],
                prediction.numbers[3],
                prediction.numbers[4],
                prediction.numbers[5],
                prediction.score,
                prediction.rationale,
                prediction.source,
                prediction.created_at,
            ],
        ).context("Échec de l'enregistrement de la prédiction")?;
    }

    tx.commit().context("Échec du commit")?;
    Ok(written)
}

pub fn fetch_predictions(conn: &Connection, target_date: NaiveDate, modality: Modality) -> Result<Vec<PredictionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT target_date, modality, rank, n1, n2, n3, n4, n5, n6, score, rationale, source, created_at
         FROM predictions WHERE target_date = ?1 AND modality = ?2 ORDER BY rank ASC"
    )?;
    let predictions = stmt.query_map(
        rusqlite::params![target_date.format(DATE_FORMAT).to_string(), modality.as_str()],
        |row| {
            Ok(PredictionRecord {
                target_date: date_column(row, 0)?,
                modality: modality_column(row, 1)?,
                rank: row.get(2)?,
                numbers: numbers_columns(row, 3)?,
                score: row.get(9)?,
                rationale: row.get(10)?,
                source: row.get(11)?,
                created_at: row.get(12)?,
            })
        },
    )?.collect::<Result<Vec<_>, _>>()?;
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn test_draw(seq_id: u32, day: &str) -> DrawRecord {
        DrawRecord {
            seq_id,
            date: date(day),
            modality: Modality::First,
            numbers: [10, 2, 33, 4, 45, 0],
            extra: None,
        }
    }

    fn test_prediction(day: &str, rank: u32) -> PredictionRecord {
        PredictionRecord {
            target_date: date(day),
            modality: Modality::First,
            rank,
            numbers: [1, 5, 9, 13, 17, 21],
            score: 0.75,
            rationale: "score composite".to_string(),
            source: "fallback".to_string(),
            created_at: "2024-01-01T12:00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_count() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(count_draws(&conn, Modality::First).unwrap(), 0);

        insert_draw(&conn, &test_draw(1, "2024-01-01")).unwrap();
        assert_eq!(count_draws(&conn, Modality::First).unwrap(), 1);
        assert_eq!(count_draws(&conn, Modality::Second).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_ignored() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let inserted = insert_draw(&conn, &test_draw(1, "2024-01-01")).unwrap();
        assert!(inserted);
        let inserted = insert_draw(&conn, &test_draw(1, "2024-01-01")).unwrap();
        assert!(!inserted);
        assert_eq!(count_draws(&conn, Modality::First).unwrap(), 1);
    }

    #[test]
    fn test_same_seq_other_modality() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let mut second = test_draw(1, "2024-01-01");
        second.modality = Modality::Second;
        assert!(insert_draw(&conn, &test_draw(1, "2024-01-01")).unwrap());
        assert!(insert_draw(&conn, &second).unwrap());
    }

    #[test]
    fn test_fetch_order() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        insert_draw(&conn, &test_draw(1, "2024-01-01")).unwrap();
        insert_draw(&conn, &test_draw(2, "2024-01-05")).unwrap();
        insert_draw(&conn, &test_draw(3, "2024-01-03")).unwrap();

        let last = fetch_last_draws(&conn, Modality::First, 10).unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[0].date, date("2024-01-05"));
        assert_eq!(last[2].date, date("2024-01-01"));

        let all = fetch_draws(&conn, Modality::First, &[]).unwrap();
        assert_eq!(all.iter().map(|d| d.seq_id).collect::<Vec<_>>(), vec![1, 3, 2]);
        assert_eq!(all[0].numbers, [10, 2, 33, 4, 45, 0]);
    }

    #[test]
    fn test_fetch_years() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        insert_draw(&conn, &test_draw(1, "2022-06-01")).unwrap();
        insert_draw(&conn, &test_draw(2, "2023-06-01")).unwrap();
        insert_draw(&conn, &test_draw(3, "2024-06-01")).unwrap();

        let draws = fetch_draws(&conn, Modality::First, &[2022, 2024]).unwrap();
        assert_eq!(draws.iter().map(|d| d.seq_id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_extra_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let mut draw = test_draw(7, "2024-02-01");
        draw.extra = Some(3);
        insert_draw(&conn, &draw).unwrap();
        let fetched = fetch_draws(&conn, Modality::First, &[]).unwrap();
        assert_eq!(fetched[0], draw);
    }

    #[test]
    fn test_predictions_replace() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let first = vec![test_prediction("2024-03-02", 1), test_prediction("2024-03-02", 2)];
        assert_eq!(save_predictions(&conn, &first).unwrap(), 2);

        let mut replacement = test_prediction("2024-03-02", 1);
        replacement.source = "judge".to_string();
        save_predictions(&conn, &[replacement.clone()]).unwrap();

        let stored = fetch_predictions(&conn, date("2024-03-02"), Modality::First).unwrap();
        assert_eq!(stored, vec![replacement]);
    }
}
