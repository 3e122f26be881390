use chrono::{Days, NaiveDate};
use lesix_db::models::{Combination, Domain, HistoricalDraw, Modality};

pub fn combo(numbers: &[u8]) -> Combination {
    Combination::new(numbers, &Domain::default()).unwrap()
}

/// Tirage daté de `day` jours après le 1er janvier 2024.
pub fn draw(seq_id: u32, day: u64, numbers: &[u8]) -> HistoricalDraw {
    HistoricalDraw {
        seq_id,
        date: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(day))
            .unwrap(),
        modality: Modality::First,
        combination: combo(numbers),
        extra: None,
    }
}

/// Historique déterministe qui balaie tout le domaine 0-45 avec des écarts variés.
pub fn make_test_draws(n: usize) -> Vec<HistoricalDraw> {
    const OFFSETS: [usize; 6] = [0, 11, 19, 26, 33, 40];
    (0..n)
        .map(|i| {
            let start = (i * 7) % 46;
            let numbers: Vec<u8> = OFFSETS.iter().map(|o| ((start + o) % 46) as u8).collect();
            draw(i as u32 + 1, i as u64, &numbers)
        })
        .collect()
}
