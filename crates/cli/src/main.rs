use anyhow::Context;
use api_shared::HealthService;
use clap::{Parser, Subcommand};
use opencare_core::models::patients::Patient;
use opencare_core::{
    AccountService, Actor, CoreConfig, Database, InterchangeFormat, PatientInterchange, Repository,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "opencare")]
#[command(about = "OpenCare health information system CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database or bring its schema up to date
    Migrate,
    /// Create an active administrator account
    CreateSuperuser {
        /// Login name
        username: String,
        /// Contact email (optional)
        #[arg(long)]
        email: Option<String>,
        /// Initial password
        #[arg(long, env = "OPENCARE_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List all patients
    ListPatients,
    /// Write every patient to a file, or stdout
    ExportPatients {
        /// json or yaml
        #[arg(long, default_value = "json")]
        format: String,
        /// Output file (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Create patients from a JSON or YAML list
    ImportPatients {
        /// Input file
        input: PathBuf,
        /// json or yaml (defaults to the file extension)
        #[arg(long)]
        format: Option<String>,
    },
    /// Check that the database is reachable and migrated
    Check,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opencare_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'opencare --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::from_env_values(
        std::env::var("OPENCARE_DATABASE_PATH").ok(),
        std::env::var("OPENCARE_BUSY_TIMEOUT_MS").ok(),
        std::env::var("OPENCARE_PAGE_SIZE").ok(),
        std::env::var("OPENCARE_MAX_PAGE_SIZE").ok(),
    )?;
    tracing::debug!("using database {}", cfg.database_path().display());
    let db = Database::open(&cfg)
        .with_context(|| format!("opening {}", cfg.database_path().display()))?;
    let actor = Actor::system();

    match command {
        Commands::Migrate => {
            println!("Database {} is up to date", db.path().display());
        }
        Commands::CreateSuperuser {
            username,
            email,
            password,
        } => {
            let accounts = AccountService::new(db, cfg);
            let user = accounts.create_superuser(&username, email.as_deref(), &password)?;
            println!("Created superuser {} ({})", username, user.id);
        }
        Commands::ListPatients => {
            let patients = Repository::<Patient>::new(db, cfg).all(&actor)?;
            if patients.is_empty() {
                println!("No patients found.");
            }
            for patient in patients {
                println!(
                    "{}  {}  {}  {}",
                    patient.id,
                    patient.record.patient_id,
                    patient.record.full_name(),
                    patient.record.date_of_birth
                );
            }
        }
        Commands::ExportPatients { format, output } => {
            let format: InterchangeFormat = format.parse()?;
            let service = PatientInterchange::new(Repository::new(db, cfg));
            let data = service.export_patients(&actor, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, data)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported patients to {}", path.display());
                }
                None => println!("{}", data),
            }
        }
        Commands::ImportPatients { input, format } => {
            let format = match format {
                Some(format) => format.parse()?,
                None => format_from_extension(&input),
            };
            let data = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let service = PatientInterchange::new(Repository::new(db, cfg));
            let report = service.import_patients(&actor, format, &data)?;
            println!("Created {} patients", report.created);
            for failure in &report.failed {
                eprintln!(
                    "Row {} ({}): {}",
                    failure.index,
                    failure.patient_id.as_deref().unwrap_or("no patient_id"),
                    failure.error
                );
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} rows were not imported", report.failed.len());
            }
        }
        Commands::Check => {
            let res = HealthService::new().check_store(&db);
            println!("{} {} {}", res.service, res.version, res.status);
            if !res.is_ok() {
                anyhow::bail!("database check failed");
            }
        }
    }
    Ok(())
}

fn format_from_extension(path: &Path) -> InterchangeFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => InterchangeFormat::Yaml,
        _ => InterchangeFormat::Json,
    }
}
