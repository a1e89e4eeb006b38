use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};

mod error;
mod forecast;
mod models;
mod predict;
mod report;
mod score;
mod store;

use models::{Category, Participant, Status, TestResult};
use predict::{LeastSquaresTrainer, ModelSearchTrainer, Predictor};

const DEFAULT_MODEL_PATH: &str = "models/model.json";
const DEFAULT_REPORTS_DIR: &str = "reports";

#[derive(Parser)]
#[command(name = "kurstracker")]
#[command(about = "Participant and score tracking for a maths course", long_about = None)]
struct Cli {
    /// Directory holding the participant and test tables
    /// (falls back to KURSTRACKER_DATA_DIR, then "data")
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory with empty tables
    Init,
    /// Load realistic sample participants and tests
    Seed,
    /// Show the participant roster
    List {
        /// Include inactive participants
        #[arg(long)]
        all: bool,
    },
    /// Register a participant
    AddParticipant {
        #[arg(long)]
        name: String,
        #[arg(long)]
        sv_nummer: String,
        #[arg(long)]
        berufswunsch: Option<String>,
        #[arg(long)]
        eintritt: NaiveDate,
        #[arg(long)]
        austritt: NaiveDate,
        #[arg(long)]
        zielwert: Option<f64>,
    },
    /// Record a test result
    AddTest {
        #[arg(long)]
        teilnehmer: String,
        #[arg(long)]
        datum: NaiveDate,
        #[arg(long)]
        textaufgaben: u32,
        #[arg(long)]
        raumvorstellung: u32,
        #[arg(long)]
        gleichungen: u32,
        #[arg(long)]
        brueche: u32,
        #[arg(long)]
        grundrechenarten: u32,
        #[arg(long)]
        zahlenraum: u32,
    },
    /// Fit the score model on all recorded tests
    Train {
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
        #[arg(long, value_enum, default_value = "search")]
        trainer: TrainerKind,
    },
    /// Print historical and predicted scores for one participant
    Forecast {
        #[arg(long)]
        teilnehmer: String,
        #[arg(long, default_value_t = forecast::DEFAULT_HORIZON_DAYS)]
        horizon: u32,
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
    },
    /// Write the markdown and CSV report for one participant
    Report {
        #[arg(long)]
        teilnehmer: String,
        #[arg(long, default_value_t = forecast::DEFAULT_HORIZON_DAYS)]
        horizon: u32,
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
        #[arg(long, default_value = DEFAULT_REPORTS_DIR)]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TrainerKind {
    /// Plain least-squares fit
    LeastSquares,
    /// Fit several candidates, keep the one with the lowest holdout error
    Search,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kurstracker=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir);
    let participants_path = data_dir.join("participants.csv");
    let tests_path = data_dir.join("tests.csv");

    match cli.command {
        Commands::Init => {
            let participants = store::load_participants(&participants_path)?;
            store::save_participants(&participants, &participants_path)?;
            let tests = store::load_tests(&tests_path)?;
            store::save_tests(&tests, &tests_path)?;
            std::fs::create_dir_all(DEFAULT_REPORTS_DIR)
                .context("creating reports directory")?;
            println!("Initialized data directory {}.", data_dir.display());
        }
        Commands::Seed => {
            let (added, added_tests) = seed(&participants_path, &tests_path)?;
            println!("Seeded {added} participants and {added_tests} tests.");
        }
        Commands::List { all } => {
            let participants = store::load_participants(&participants_path)?;
            print_roster(&participants, Utc::now().date_naive(), all);
        }
        Commands::AddParticipant {
            name,
            sv_nummer,
            berufswunsch,
            eintritt,
            austritt,
            zielwert,
        } => {
            let participants = store::load_participants(&participants_path)?;
            if participants.iter().any(|p| p.name == name) {
                tracing::warn!(%name, "participant name already present, adding a second record");
            }
            if austritt < eintritt {
                tracing::warn!(%name, "exit date precedes entry date");
            }
            let record = Participant {
                name: name.clone(),
                sv_number: sv_nummer,
                career_goal: berufswunsch,
                entry_date: eintritt,
                exit_date: austritt,
                target_score: zielwert,
            };
            let participants = store::append(participants, record);
            store::save_participants(&participants, &participants_path)?;
            println!("Registered {name}.");
        }
        Commands::AddTest {
            teilnehmer,
            datum,
            textaufgaben,
            raumvorstellung,
            gleichungen,
            brueche,
            grundrechenarten,
            zahlenraum,
        } => {
            let participants = store::load_participants(&participants_path)?;
            if !participants.iter().any(|p| p.name == teilnehmer) {
                tracing::warn!(participant = %teilnehmer, "test recorded for unknown participant");
            }

            let scores = [
                textaufgaben,
                raumvorstellung,
                gleichungen,
                brueche,
                grundrechenarten,
                zahlenraum,
            ];
            let mut values = BTreeMap::new();
            for (category, value) in Category::ALL.iter().zip(scores) {
                values.insert(*category, f64::from(value));
            }
            let aggregated = score::aggregate(&values)?;
            let total = aggregated.total;
            let record = aggregated.into_test_result(&teilnehmer, datum);

            let tests = store::load_tests(&tests_path)?;
            let tests = store::append(tests, record);
            store::save_tests(&tests, &tests_path)?;
            println!("Recorded test for {teilnehmer} on {datum} (total {total:.2}).");
        }
        Commands::Train { model, trainer } => {
            let tests = store::load_tests(&tests_path)?;
            let mut predictor = Predictor::untrained();
            match trainer {
                TrainerKind::LeastSquares => predictor.train(&tests, &LeastSquaresTrainer)?,
                TrainerKind::Search => predictor.train(&tests, &ModelSearchTrainer::default())?,
            }
            predictor.save(&model)?;
            println!(
                "Trained {} model on {} tests, saved to {}.",
                predictor.model_kind().unwrap_or("unknown"),
                tests.len(),
                model.display()
            );
        }
        Commands::Forecast {
            teilnehmer,
            horizon,
            model,
        } => {
            let tests = store::load_tests(&tests_path)?;
            let predictor = Predictor::load(&model)?;
            let series = forecast::build_series(&teilnehmer, &tests, &predictor, horizon)?;

            println!("Score series for {teilnehmer}:");
            for point in &series {
                println!("- {} {:.2} ({})", point.date, point.value, point.kind);
            }
        }
        Commands::Report {
            teilnehmer,
            horizon,
            model,
            out_dir,
        } => {
            let participants = store::load_participants(&participants_path)?;
            let tests = store::load_tests(&tests_path)?;
            let predictor = Predictor::load(&model)?;
            let series = forecast::build_series(&teilnehmer, &tests, &predictor, horizon)?;
            let today = Utc::now().date_naive();
            let document = report::assemble(&teilnehmer, &participants, &tests, &series, today)?;
            let (markdown_path, csv_path) = document.write_files(&out_dir)?;
            println!(
                "Report written to {} and {}.",
                markdown_path.display(),
                csv_path.display()
            );
        }
    }

    Ok(())
}

fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("KURSTRACKER_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn print_roster(participants: &[Participant], today: NaiveDate, include_inactive: bool) {
    use comfy_table::{Cell, Table};

    let visible: Vec<&Participant> = participants
        .iter()
        .filter(|p| include_inactive || p.status_on(today) == Status::Active)
        .collect();

    if visible.is_empty() {
        println!("No participants to show.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Name",
        "SV-Nummer",
        "Berufswunsch",
        "Eintritt",
        "Austritt",
        "Zielwert (%)",
        "Status",
    ]);

    for participant in &visible {
        table.add_row(vec![
            Cell::new(&participant.name),
            Cell::new(&participant.sv_number),
            Cell::new(participant.career_goal.as_deref().unwrap_or("")),
            Cell::new(participant.entry_date),
            Cell::new(participant.exit_date),
            Cell::new(
                participant
                    .target_score
                    .map(|v| format!("{v:.1}"))
                    .unwrap_or_default(),
            ),
            Cell::new(participant.status_on(today)),
        ]);
    }

    println!("{table}");
}

fn seed(participants_path: &Path, tests_path: &Path) -> anyhow::Result<(usize, usize)> {
    let mut participants = store::load_participants(participants_path)?;
    let mut tests = store::load_tests(tests_path)?;

    let mut added = 0;
    let mut added_tests = 0;
    for (participant, rows) in seed_records()? {
        if participants.iter().any(|p| p.name == participant.name) {
            tracing::warn!(name = %participant.name, "seed name already present, skipping");
            continue;
        }
        added += 1;
        added_tests += rows.len();
        participants = store::append(participants, participant);
        for row in rows {
            tests = store::append(tests, row);
        }
    }

    store::save_participants(&participants, participants_path)?;
    store::save_tests(&tests, tests_path)?;
    Ok((added, added_tests))
}

fn seed_records() -> anyhow::Result<Vec<(Participant, Vec<TestResult>)>> {
    let records = vec![
        (
            seed_participant(
                "Anna Seidel",
                "1704120599",
                Some("Pflegefachfrau"),
                date(2025, 9, 1)?,
                date(2027, 7, 31)?,
                Some(75.0),
            ),
            vec![
                seed_test("Anna Seidel", date(2026, 3, 2)?, [55, 48, 52, 40, 60, 58]),
                seed_test("Anna Seidel", date(2026, 3, 30)?, [58, 52, 55, 46, 63, 60]),
                seed_test("Anna Seidel", date(2026, 4, 27)?, [62, 55, 60, 50, 68, 64]),
                seed_test("Anna Seidel", date(2026, 5, 25)?, [66, 60, 63, 55, 70, 68]),
                seed_test("Anna Seidel", date(2026, 6, 22)?, [70, 64, 68, 60, 74, 71]),
                seed_test("Anna Seidel", date(2026, 7, 20)?, [74, 68, 71, 64, 78, 75]),
            ],
        ),
        (
            seed_participant(
                "Jonas Brandt",
                "2209030801",
                Some("KFZ-Mechatroniker"),
                date(2025, 10, 6)?,
                date(2027, 7, 31)?,
                Some(70.0),
            ),
            vec![
                seed_test("Jonas Brandt", date(2026, 4, 6)?, [60, 58, 62, 55, 65, 60]),
                seed_test("Jonas Brandt", date(2026, 5, 4)?, [59, 60, 61, 56, 64, 61]),
                seed_test("Jonas Brandt", date(2026, 6, 1)?, [61, 59, 60, 57, 66, 59]),
                seed_test("Jonas Brandt", date(2026, 6, 29)?, [60, 61, 62, 55, 65, 60]),
            ],
        ),
        (
            seed_participant(
                "Melek Aydin",
                "1512221000",
                None,
                date(2026, 2, 2)?,
                date(2027, 7, 31)?,
                None,
            ),
            vec![
                seed_test("Melek Aydin", date(2026, 3, 9)?, [45, 40, 42, 38, 50, 44]),
                seed_test("Melek Aydin", date(2026, 4, 13)?, [50, 46, 47, 42, 55, 49]),
                seed_test("Melek Aydin", date(2026, 5, 18)?, [56, 50, 52, 47, 60, 54]),
            ],
        ),
        (
            seed_participant(
                "Murat Demir",
                "0815050794",
                Some("Einzelhandelskaufmann"),
                date(2025, 2, 3)?,
                date(2026, 6, 30)?,
                Some(65.0),
            ),
            vec![
                seed_test("Murat Demir", date(2025, 10, 13)?, [70, 66, 68, 62, 72, 69]),
                seed_test("Murat Demir", date(2025, 12, 8)?, [66, 62, 64, 58, 69, 65]),
                seed_test("Murat Demir", date(2026, 2, 9)?, [62, 58, 60, 54, 65, 61]),
            ],
        ),
    ];

    Ok(records)
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

fn seed_participant(
    name: &str,
    sv_number: &str,
    career_goal: Option<&str>,
    entry_date: NaiveDate,
    exit_date: NaiveDate,
    target_score: Option<f64>,
) -> Participant {
    Participant {
        name: name.to_string(),
        sv_number: sv_number.to_string(),
        career_goal: career_goal.map(str::to_string),
        entry_date,
        exit_date,
        target_score,
    }
}

fn seed_test(name: &str, date: NaiveDate, scores: [u32; 6]) -> TestResult {
    TestResult {
        participant: name.to_string(),
        date,
        textaufgaben: scores[0],
        raumvorstellung: scores[1],
        gleichungen: scores[2],
        brueche: scores[3],
        grundrechenarten: scores[4],
        zahlenraum: scores[5],
        // recomputed from the categories on save
        total: 0.0,
    }
}
