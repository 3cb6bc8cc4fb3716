use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lms::infrastructure::AppState;
use lms::{config, db, seed, server};

/// Library circulation server and maintenance commands
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send DUE_REMINDER notifications for loans due within N days
    SendReminders {
        /// Days ahead to look; defaults to REMINDER_DAYS
        #[arg(long)]
        days: Option<i64>,
    },
    /// Move late ACTIVE loans to OVERDUE and send OVERDUE_ALERT notifications
    SweepOverdue,
    /// Create demo users, catalog and copies
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lms=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = config::Config::from_env();

    // Initialize database
    let db = db::init_db(&config.database_url).await?;
    let port = config.port;
    let reminder_days = config.reminder_days;
    let state = AppState::new(db.clone(), config)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port: override_port } => {
            server::serve(state, override_port.unwrap_or(port)).await?;
        }
        Command::SendReminders { days } => {
            let days = days.unwrap_or(reminder_days);
            let report = state.sweeps.send_due_reminders(days, Utc::now()).await?;
            state.notifications.flush().await;
            println!(
                "Reminded {} of {} loan(s) due within {} day(s) ({} already reminded today)",
                report.notified, report.examined, days, report.skipped
            );
        }
        Command::SweepOverdue => {
            let report = state.sweeps.sweep_overdue(Utc::now()).await?;
            state.notifications.flush().await;
            println!(
                "{} loan(s) newly overdue, {} alert(s) sent, {} already alerted today",
                report.marked_overdue, report.notified, report.skipped
            );
        }
        Command::Seed => {
            tracing::info!("Seeding demo data...");
            seed::seed_demo_data(&db).await?;
            tracing::info!("Demo data seeded successfully.");
        }
    }

    Ok(())
}
