use clap::{ArgAction, Parser, Subcommand};
use healthcheck::commands::run::Target;
use healthcheck::output::Format;

#[derive(Parser)]
#[command(
    name = "healthcheck",
    version,
    about = "Resumable data repairs for donation records and payment processor customers"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Log more (-v info, -vv debug); HEALTHCHECK_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .healthcheck/ with a default config and an empty store
    Init,
    /// Load donors, donations and meta rows from a YAML or JSON file
    Import {
        /// Fixture path, or - for stdin
        source: String,
    },
    /// Advance pending upgrade tasks
    Run {
        /// Advance this task instead of the first pending one
        #[arg(long, conflicts_with = "all")]
        task: Option<String>,
        /// Keep going until every task is complete
        #[arg(long)]
        all: bool,
    },
    /// Show completion and progress of every task
    Status,
    /// List registered tasks in run order
    Tasks,
    /// Show recent recorded events
    Events {
        /// Number of events to show
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Clear a task's cursor so it restarts at the first page
    Reset {
        /// Task ID
        task: String,
    },
    /// Mark a task complete without running it
    Complete {
        /// Task ID
        task: String,
    },
}

fn run(cli: Cli, format: Format) -> healthcheck::error::Result<()> {
    let cwd = std::env::current_dir()?;
    match cli.command {
        Commands::Init => healthcheck::commands::init::run(&cwd),
        Commands::Import { source } => healthcheck::commands::import::run(&cwd, source, format),
        Commands::Run { task, all } => {
            let target = match (task, all) {
                (Some(id), _) => Target::Task(id),
                (None, true) => Target::All,
                (None, false) => Target::Next,
            };
            healthcheck::commands::run::run(&cwd, target, format)
        }
        Commands::Status => healthcheck::commands::status::run(&cwd, format),
        Commands::Tasks => healthcheck::commands::list::run(&cwd, format),
        Commands::Events { limit } => healthcheck::commands::events::run(&cwd, limit, format),
        Commands::Reset { task } => healthcheck::commands::lifecycle::reset(&cwd, &task, format),
        Commands::Complete { task } => {
            healthcheck::commands::lifecycle::complete(&cwd, &task, format)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    healthcheck::logging::init(cli.verbose);
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
