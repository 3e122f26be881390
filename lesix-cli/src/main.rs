mod display;
mod judge;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use lesix_db::db::{
    count_draws, db_path, fetch_draws, fetch_last_draws, fetch_predictions, migrate, open_db,
    save_predictions,
};
use lesix_db::import::{import_csv, parse_date};
use lesix_db::models::{Combination, HistoricalDraw, Modality, PredictionRecord};
use lesix_db::rusqlite::Connection;
use lesix_engine::affinity::AffinityMatrix;
use lesix_engine::bias::bias_test;
use lesix_engine::delta::DeltaDistribution;
use lesix_engine::judge::{select_final, Judge};
use lesix_engine::normalize::normalize_history;
use lesix_engine::pipeline::select_base;
use lesix_engine::scorer::{AmplitudeBand, CompositeScorer, FrequencyBand};
use lesix_engine::stats::{compute_number_statistics, window_activity, DrawProfile};
use lesix_engine::wheel::{self, Guarantee};
use lesix_engine::{run_analysis, EngineConfig, Executor};

use crate::display::{
    display_bias, display_delta, display_draws, display_import_summary, display_number_stats,
    display_predictions, display_profile, display_ranked, display_score, display_selection,
    display_system, display_window_activity,
};
use crate::judge::CommandJudge;

#[derive(Parser)]
#[command(name = "lesix", about = "Réduction combinatoire et classement de grilles à 6 numéros")]
struct Cli {
    /// Fichier de configuration du moteur (JSON)
    #[arg(short, long, global = true, default_value = "lesix.json")]
    config: PathBuf,

    /// Modalité analysée (first / second), prioritaire sur la configuration
    #[arg(long, global = true)]
    modality: Option<Modality>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer les tirages depuis un fichier CSV (seq;date;modalité;n1..n6;extra)
    Import {
        /// Chemin vers le fichier CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages
    List {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Statistiques par numéro, profil des tirages et activité récente
    Stats {
        /// Années analysées, séparées par des virgules (toutes par défaut)
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Test d'uniformité du khi-deux et distribution des écarts
    Bias {
        /// Années analysées, séparées par des virgules (toutes par défaut)
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Construire et vérifier un système réduit
    Wheel {
        /// Numéros de la base, séparés par des virgules (sinon base automatique)
        #[arg(short, long, value_delimiter = ',')]
        base: Vec<u8>,

        /// Numéros garantis
        #[arg(short)]
        k: Option<usize>,

        /// Parmi combien de numéros tirés dans la base
        #[arg(short)]
        m: Option<usize>,

        /// Afficher toutes les combinaisons
        #[arg(long)]
        all: bool,
    },

    /// Scorer une combinaison de 6 numéros
    Score {
        /// Les 6 numéros, séparés par des virgules
        #[arg(value_delimiter = ',', required = true)]
        numbers: Vec<u8>,
    },

    /// Analyse complète : système réduit, classement et sélection finale
    Run {
        /// Commande externe servant de juge (requête JSON sur l'entrée standard)
        #[arg(long)]
        judge: Option<String>,

        /// Date du tirage visé (JJ/MM/AAAA) : enregistre la sélection
        #[arg(long)]
        target: Option<String>,

        /// Nombre de combinaisons classées à afficher
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Années analysées, séparées par des virgules (toutes par défaut)
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<i32>,
    },

    /// Afficher les prédictions enregistrées pour une date
    Predictions {
        /// Date du tirage visé (JJ/MM/AAAA)
        #[arg(short, long)]
        date: String,
    },

    /// Écrire la configuration par défaut
    Config {
        /// Écraser le fichier existant
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Config { force } = cli.command {
        return cmd_config(&cli.config, force);
    }

    let mut config = load_config(&cli.config)?;
    if let Some(modality) = cli.modality {
        config.modality = modality;
    }

    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, &config, last),
        Command::Stats { years } => cmd_stats(&conn, &config, &years),
        Command::Bias { years } => cmd_bias(&conn, &config, &years),
        Command::Wheel { base, k, m, all } => cmd_wheel(&conn, &config, base, k, m, all),
        Command::Score { numbers } => cmd_score(&conn, &config, &numbers),
        Command::Run {
            judge,
            target,
            top,
            years,
        } => cmd_run(&conn, &config, judge.as_deref(), target.as_deref(), top, &years),
        Command::Predictions { date } => cmd_predictions(&conn, &config, &date),
        Command::Config { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        println!("(Pas de fichier {}, configuration par défaut)", path.display());
        return Ok(EngineConfig::default());
    }
    EngineConfig::load(path).with_context(|| format!("Configuration {:?} illisible", path))
}

/// Historique normalisé de la modalité, `None` si la base est vide.
fn load_history(
    conn: &Connection,
    config: &EngineConfig,
    years: &[i32],
) -> Result<Option<Vec<HistoricalDraw>>> {
    if count_draws(conn, config.modality)? == 0 {
        println!("Base vide pour le {}. Lancez d'abord : lesix import", config.modality);
        return Ok(None);
    }
    let records = fetch_draws(conn, config.modality, years)?;
    if records.is_empty() {
        println!("Aucun tirage pour les années {:?}", years);
        return Ok(None);
    }
    let draws = normalize_history(&records, &config.domain)?;
    Ok(Some(draws))
}

fn cmd_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} existe déjà (utilisez --force pour l'écraser)", path.display());
    }
    EngineConfig::default().save(path)?;
    println!("Configuration par défaut écrite dans {}", path.display());
    Ok(())
}

fn cmd_import(conn: &Connection, file: &Path) -> Result<()> {
    let result = import_csv(conn, file)?;
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(conn: &Connection, config: &EngineConfig, last: u32) -> Result<()> {
    if count_draws(conn, config.modality)? == 0 {
        println!("Base vide pour le {}. Lancez d'abord : lesix import", config.modality);
        return Ok(());
    }
    let draws = fetch_last_draws(conn, config.modality, last)?;
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(conn: &Connection, config: &EngineConfig, years: &[i32]) -> Result<()> {
    let Some(draws) = load_history(conn, config, years)? else {
        return Ok(());
    };
    let statistics = compute_number_statistics(&draws, &config.domain, config.poisson_window)?;
    display_number_stats(&statistics, draws.len(), config.anomaly_threshold);

    let profile = DrawProfile::from_draws(&draws)?;
    display_profile(&profile);

    let activity = window_activity(
        &draws,
        &config.domain,
        &config.moving_windows,
        config.anomaly_threshold,
    )?;
    display_window_activity(&activity);
    Ok(())
}

fn cmd_bias(conn: &Connection, config: &EngineConfig, years: &[i32]) -> Result<()> {
    let Some(draws) = load_history(conn, config, years)? else {
        return Ok(());
    };
    let statistics = compute_number_statistics(&draws, &config.domain, config.poisson_window)?;
    let result = bias_test(&statistics, config.significance)?;
    display_bias(&result);

    let delta = DeltaDistribution::from_draws(&draws)?;
    let test = delta.deviation_test(&config.domain, config.significance)?;
    display_delta(&delta, &test, config.domain.size());
    Ok(())
}

fn cmd_wheel(
    conn: &Connection,
    config: &EngineConfig,
    base: Vec<u8>,
    k: Option<usize>,
    m: Option<usize>,
    all: bool,
) -> Result<()> {
    let base = if !base.is_empty() {
        base
    } else if let Some(base) = &config.base {
        base.clone()
    } else {
        let Some(draws) = load_history(conn, config, &[])? else {
            return Ok(());
        };
        let statistics =
            compute_number_statistics(&draws, &config.domain, config.poisson_window)?;
        select_base(&statistics, config.base_size)
    };
    let guarantee = Guarantee::new(
        k.unwrap_or(config.guarantee.k),
        m.unwrap_or(config.guarantee.m),
    );

    let executor = Executor::new(config.parallel.clone());
    let system = wheel::generate(&base, guarantee, &config.domain, &config.wheel, &executor)?;
    let coverage = wheel::validate(&system, &executor);
    display_system(&system, &coverage, all);
    Ok(())
}

fn cmd_score(conn: &Connection, config: &EngineConfig, numbers: &[u8]) -> Result<()> {
    let combination = Combination::new(numbers, &config.domain)?;
    let Some(draws) = load_history(conn, config, &[])? else {
        return Ok(());
    };
    let statistics = compute_number_statistics(&draws, &config.domain, config.poisson_window)?;
    let affinity = AffinityMatrix::from_draws(&draws, &config.domain)?;
    let profile = DrawProfile::from_draws(&draws)?;
    let scorer = CompositeScorer::new(
        &affinity,
        &statistics,
        AmplitudeBand::from_profile(&profile),
        FrequencyBand::from_statistics(&statistics),
        config.weights,
    )?;
    let scored = scorer.score(&combination, 0)?;
    display_score(&scored, &config.filters.check(&combination));
    Ok(())
}

fn cmd_run(
    conn: &Connection,
    config: &EngineConfig,
    judge_command: Option<&str>,
    target: Option<&str>,
    top: usize,
    years: &[i32],
) -> Result<()> {
    let target_date = target.map(parse_date).transpose()?;
    let Some(draws) = load_history(conn, config, years)? else {
        return Ok(());
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Gabarit de progression invalide")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Analyse de {} tirages...", draws.len()));

    let executor = Executor::new(config.parallel.clone());
    let report = run_analysis(&draws, config, &executor);
    spinner.finish_and_clear();
    let report = report?;

    display_bias(&report.bias);
    display_system(&report.system, &report.coverage, false);
    display_ranked(&report.shortlist, top, &config.filters);

    let judge = judge_command
        .map(|command| CommandJudge::from_command_line(command, config.judge.timeout(), config.domain))
        .transpose()?;
    let selection = select_final(
        &report.ranked,
        &report.shortlist,
        judge.as_ref().map(|j| j as &dyn Judge),
        &config.judge,
        &report.summary(),
    );
    display_selection(&selection);

    if let Some(target_date) = target_date {
        let created_at = Utc::now().to_rfc3339();
        let records: Vec<PredictionRecord> = selection
            .picks
            .iter()
            .enumerate()
            .map(|(i, pick)| PredictionRecord {
                target_date,
                modality: config.modality,
                rank: i as u32 + 1,
                numbers: *pick.combination.numbers(),
                score: pick.score,
                rationale: selection.rationale.clone(),
                source: selection.source.to_string(),
                created_at: created_at.clone(),
            })
            .collect();
        let written = save_predictions(conn, &records)?;
        println!("{} prédictions enregistrées pour le {}", written, target_date.format("%d/%m/%Y"));
    }
    Ok(())
}

fn cmd_predictions(conn: &Connection, config: &EngineConfig, date: &str) -> Result<()> {
    let target_date = parse_date(date)?;
    let predictions = fetch_predictions(conn, target_date, config.modality)?;
    display_predictions(&predictions);
    Ok(())
}
