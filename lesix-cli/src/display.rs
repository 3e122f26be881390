use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use textplots::{Chart, Plot, Shape};

use lesix_db::import::ImportResult;
use lesix_db::models::{DrawRecord, PredictionRecord};
use lesix_engine::bias::BiasTestResult;
use lesix_engine::delta::{expected_gap_probability, DeltaDistribution, DeltaTestResult};
use lesix_engine::filters::{CombinationFilter, Rejection};
use lesix_engine::judge::FinalSelection;
use lesix_engine::scorer::ScoredCombination;
use lesix_engine::stats::{DrawProfile, NumberStatistic, Trend, WindowActivity};
use lesix_engine::wheel::{CoverageReport, ReducedSystem};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:2}", n))
        .collect::<Vec<_>>()
        .join(" - ")
}

pub fn display_draws(draws: &[DrawRecord]) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let mut table = new_table(vec!["N°", "Date", "Modalité", "Numéros", "Complémentaire"]);
    for draw in draws {
        let mut sorted = draw.numbers;
        sorted.sort();
        let extra = draw
            .extra
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            draw.seq_id.to_string(),
            draw.date.format("%d/%m/%Y").to_string(),
            draw.modality.to_string(),
            format_numbers(&sorted),
            extra,
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Doublons ignorés  : {}", result.skipped);
    if result.errors > 0 {
        println!("  Erreurs           : {}", result.errors);
    }
}

pub fn display_number_stats(statistics: &[NumberStatistic], draws: usize, threshold: f64) {
    println!("\n── Statistiques par numéro ({} tirages) ──", draws);

    let mut table = new_table(vec![
        "Numéro",
        "Fréquence",
        "Fréq. rel.",
        "Retard",
        "Écart moyen",
        "σ écart",
        "Poisson",
        "Tag",
    ]);

    let mut sorted: Vec<&NumberStatistic> = statistics.iter().collect();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));

    for stat in sorted {
        let tag = if stat.is_high_delay(threshold) {
            Cell::new(format!("RETARD x{:.1}", stat.delay_ratio())).fg(Color::Red)
        } else {
            Cell::new("-").fg(Color::White)
        };
        table.add_row(vec![
            Cell::new(format!("{:2}", stat.number)),
            Cell::new(stat.frequency.to_string()),
            Cell::new(format!("{:.4}", stat.relative_frequency)),
            Cell::new(stat.delay.to_string()),
            Cell::new(format!("{:.2}", stat.mean_delay)),
            Cell::new(format!("{:.2}", stat.delay_std_dev)),
            Cell::new(format!("{:.3}", stat.poisson_score)),
            tag,
        ]);
    }
    println!("{table}");
}

pub fn display_profile(profile: &DrawProfile) {
    println!("\n── Profil des tirages ──");
    let mut table = new_table(vec!["Mesure", "Moyenne", "Écart-type", "Min", "Max"]);
    for (label, moments) in [("Somme", &profile.sum), ("Amplitude", &profile.amplitude)] {
        table.add_row(vec![
            label.to_string(),
            format!("{:.1}", moments.mean),
            format!("{:.1}", moments.std_dev),
            format!("{:.0}", moments.min),
            format!("{:.0}", moments.max),
        ]);
    }
    println!("{table}");

    let mut parity = new_table(vec!["Pairs", "Tirages", "Part"]);
    for (evens, &count) in profile.even_counts.iter().enumerate() {
        let share = count as f64 / profile.draws.max(1) as f64;
        parity.add_row(vec![
            evens.to_string(),
            count.to_string(),
            format!("{:.1}%", share * 100.0),
        ]);
    }
    println!("{parity}");
}

pub fn display_window_activity(activity: &[WindowActivity]) {
    for window in activity {
        println!(
            "\n── Activité sur les {} derniers tirages (attendu {:.2} par numéro) ──",
            window.window, window.expected
        );
        let anomalies: Vec<_> = window.anomalies().collect();
        if anomalies.is_empty() {
            println!("Aucune anomalie.");
            continue;
        }

        let mut table = new_table(vec!["Numéro", "Sorties", "z", "Tendance"]);
        for activity in anomalies {
            let color = match activity.trend {
                Trend::Hot => Color::Green,
                Trend::Cold => Color::Red,
                Trend::Normal => Color::White,
            };
            table.add_row(vec![
                Cell::new(format!("{:2}", activity.number)),
                Cell::new(activity.count.to_string()),
                Cell::new(format!("{:+.2}", activity.z_score)),
                Cell::new(activity.trend.to_string()).fg(color),
            ]);
        }
        println!("{table}");
    }
}

pub fn display_bias(result: &BiasTestResult) {
    println!("\n── Test d'uniformité (khi-deux) ──");
    println!(
        "  χ² = {:.2}  ddl = {}  attendu = {:.2}  p = {:.4}",
        result.chi_square, result.degrees_of_freedom, result.expected, result.p_value
    );
    if result.biased {
        println!("  Écart significatif au seuil {}", result.significance);
    } else {
        println!("  Pas d'écart significatif au seuil {}", result.significance);
    }

    if result.top_contributors.is_empty() {
        return;
    }
    let mut table = new_table(vec!["Numéro", "Observé", "Écart", "Contribution"]);
    for contributor in &result.top_contributors {
        let color = if contributor.deviation > 0.0 {
            Color::Green
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new(format!("{:2}", contributor.number)),
            Cell::new(contributor.observed.to_string()),
            Cell::new(format!("{:+.2}", contributor.deviation)).fg(color),
            Cell::new(format!("{:.3}", contributor.contribution)),
        ]);
    }
    println!("{table}");
}

pub fn display_delta(delta: &DeltaDistribution, test: &DeltaTestResult, domain_size: usize) {
    println!(
        "\n── Écarts entre numéros consécutifs ({} écarts, moyenne {:.2}, σ {:.2}) ──",
        delta.total_gaps, delta.mean, delta.std_dev
    );

    let mut table = new_table(vec!["Écart", "Observé", "Part", "Attendu"]);
    for entry in delta.entries.iter().filter(|e| e.count > 0) {
        let expected = expected_gap_probability(domain_size, entry.gap as usize);
        table.add_row(vec![
            entry.gap.to_string(),
            entry.count.to_string(),
            format!("{:.2}%", entry.relative * 100.0),
            format!("{:.2}%", expected * 100.0),
        ]);
    }
    println!("{table}");

    let observed: Vec<(f32, f32)> = delta
        .entries
        .iter()
        .map(|e| (e.gap as f32, e.relative as f32))
        .collect();
    let expected: Vec<(f32, f32)> = delta
        .entries
        .iter()
        .map(|e| {
            let p = expected_gap_probability(domain_size, e.gap as usize);
            (e.gap as f32, p as f32)
        })
        .collect();
    if let Some(max_gap) = delta.entries.iter().map(|e| e.gap).max() {
        let y_max = observed
            .iter()
            .chain(expected.iter())
            .map(|&(_, y)| y)
            .fold(0.0f32, f32::max)
            .max(0.01);
        println!("\n  Observé (points) / attendu (ligne)");
        let observed_shape = Shape::Points(&observed);
        let expected_shape = Shape::Lines(&expected);
        let mut chart = Chart::new_with_y_range(120, 40, 1.0, max_gap as f32, 0.0, y_max * 1.1);
        println!(
            "{}",
            chart.lineplot(&observed_shape).lineplot(&expected_shape)
        );
    }

    println!(
        "  χ² = {:.2}  ddl = {}  classes = {}  p = {:.4}{}",
        test.chi_square,
        test.degrees_of_freedom,
        test.bins,
        test.p_value,
        if test.biased { "  (écart significatif)" } else { "" }
    );
}

pub fn display_system(system: &ReducedSystem, coverage: &CoverageReport, all: bool) {
    println!(
        "\n── Système réduit {} sur la base {} ({}) ──",
        system.guarantee,
        format_numbers(&system.base),
        system.branch
    );
    println!("  {} combinaisons", system.combinations.len());

    let coverage_line = format!(
        "  Couverture : {}/{} ({:.2}%)",
        coverage.covered, coverage.total, coverage.coverage
    );
    if coverage.valid {
        println!("{}  garantie tenue", coverage_line);
    } else {
        println!("{}  garantie non tenue", coverage_line);
        if let Some(uncovered) = &coverage.first_uncovered {
            println!("  Premier tirage non couvert : {}", format_numbers(uncovered));
        }
    }

    if all {
        let mut table = new_table(vec!["#", "Combinaison"]);
        for (i, combination) in system.combinations.iter().enumerate() {
            table.add_row(vec![(i + 1).to_string(), combination.to_string()]);
        }
        println!("{table}");
    }
}

pub fn display_ranked(ranked: &[ScoredCombination], limit: usize, filter: &CombinationFilter) {
    println!("\n── Classement (composite) ──");
    let mut table = new_table(vec![
        "#",
        "Combinaison",
        "Score",
        "Affinité",
        "Entropie",
        "Amplitude",
        "Fréquence",
        "Filtres",
    ]);
    for (i, scored) in ranked.iter().take(limit).enumerate() {
        let rejections = filter.check(&scored.combination);
        table.add_row(vec![
            Cell::new(format!("{}", i + 1)),
            Cell::new(scored.combination.to_string()),
            Cell::new(format!("{:.4}", scored.score)),
            Cell::new(format!("{:.3}", scored.components.affinity)),
            Cell::new(format!("{:.3}", scored.components.entropy)),
            Cell::new(format!("{:.3}", scored.components.amplitude)),
            Cell::new(format!("{:.3}", scored.components.frequency)),
            filter_cell(&rejections),
        ]);
    }
    println!("{table}");
}

fn filter_cell(rejections: &[Rejection]) -> Cell {
    if rejections.is_empty() {
        Cell::new("OK").fg(Color::Green)
    } else {
        let reasons: Vec<String> = rejections.iter().map(|r| r.to_string()).collect();
        Cell::new(reasons.join(", ")).fg(Color::Red)
    }
}

pub fn display_score(scored: &ScoredCombination, rejections: &[Rejection]) {
    println!("\n── Score de {} ──", scored.combination);
    let mut table = new_table(vec!["Composante", "Valeur"]);
    table.add_row(vec!["Affinité".to_string(), format!("{:.4}", scored.components.affinity)]);
    table.add_row(vec!["Entropie".to_string(), format!("{:.4}", scored.components.entropy)]);
    table.add_row(vec!["Amplitude".to_string(), format!("{:.4}", scored.components.amplitude)]);
    table.add_row(vec!["Fréquence".to_string(), format!("{:.4}", scored.components.frequency)]);
    table.add_row(vec!["Score composite".to_string(), format!("{:.4}", scored.score)]);
    println!("{table}");

    if rejections.is_empty() {
        println!("  Passe tous les filtres");
    } else {
        for rejection in rejections {
            println!("  Rejet : {}", rejection);
        }
    }
}

pub fn display_selection(selection: &FinalSelection) {
    println!("\n── Sélection finale ({}) ──", selection.source);
    let mut table = new_table(vec!["#", "Combinaison", "Score"]);
    for (i, pick) in selection.picks.iter().enumerate() {
        table.add_row(vec![
            format!("{}", i + 1),
            pick.combination.to_string(),
            format!("{:.4}", pick.score),
        ]);
    }
    println!("{table}");
    if !selection.rationale.is_empty() {
        println!("  {}", selection.rationale);
    }
}

pub fn display_predictions(predictions: &[PredictionRecord]) {
    if predictions.is_empty() {
        println!("Aucune prédiction enregistrée pour cette date.");
        return;
    }

    let mut table = new_table(vec!["Rang", "Numéros", "Score", "Source", "Créée le"]);
    for prediction in predictions {
        table.add_row(vec![
            prediction.rank.to_string(),
            format_numbers(&prediction.numbers),
            format!("{:.4}", prediction.score),
            prediction.source.clone(),
            prediction.created_at.clone(),
        ]);
    }
    println!("{table}");
    if let Some(first) = predictions.first() {
        if !first.rationale.is_empty() {
            println!("  {}", first.rationale);
        }
    }
}
