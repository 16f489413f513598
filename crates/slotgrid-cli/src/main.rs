use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "slotgrid",
    about = "SlotGrid — executor utilization analysis and admission control",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output on stderr: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a fleet snapshot: utilization, label pressure, queue state
    Analyze {
        /// Fleet snapshot exported from the job host (JSON)
        #[arg(short, long)]
        snapshot: String,
        /// slotgrid.toml (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print ranked recommendations for a fleet snapshot
    Recommend {
        #[arg(short, long)]
        snapshot: String,
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Derive per-label scaling actions and suggested throttles.
    ///
    /// With --apply, each action is handed to --exec (run through `sh -c`
    /// with SLOTGRID_* variables set) or, without --exec, only logged.
    Scale {
        #[arg(short, long)]
        snapshot: String,
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Carry out the actions instead of only listing them
        #[arg(long)]
        apply: bool,
        /// Provisioner command run once per action
        #[arg(long)]
        exec: Option<String>,
    },
    /// Inspect configured throttles and evaluate admissions
    Throttle {
        #[command(subcommand)]
        action: ThrottleAction,
    },
    /// Write a starter slotgrid.toml
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
    },
}

#[derive(Subcommand)]
enum ThrottleAction {
    /// List configured throttle policies
    List {
        #[arg(short, long)]
        config: String,
    },
    /// Decide whether one more build may start.
    ///
    /// Each run starts from an empty execution history, so only the
    /// concurrency caps are evaluated; `period_seconds` rate windows
    /// never deny here.
    Check {
        #[arg(short, long)]
        config: String,
        /// Job about to start
        #[arg(long)]
        job: String,
        /// Label the build is bound to
        #[arg(long)]
        label: Option<String>,
        /// Builds of this job running now
        #[arg(long, default_value = "0")]
        job_running: u32,
        /// Builds on this label running now
        #[arg(long, default_value = "0")]
        label_running: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("slotgrid=info".parse()?),
        )
        .with_writer(std::io::stderr);
    match cli.log_format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }

    match cli.command {
        Commands::Analyze {
            snapshot,
            config,
            format,
        } => commands::report::analyze(&snapshot, config.as_deref(), &format),
        Commands::Recommend {
            snapshot,
            config,
            format,
        } => commands::report::recommend(&snapshot, config.as_deref(), &format),
        Commands::Scale {
            snapshot,
            config,
            format,
            apply,
            exec,
        } => {
            commands::scale::scale(&snapshot, config.as_deref(), &format, apply, exec.as_deref())
                .await
        }
        Commands::Throttle { action } => match action {
            ThrottleAction::List { config } => commands::throttle::list(&config),
            ThrottleAction::Check {
                config,
                job,
                label,
                job_running,
                label_running,
            } => commands::throttle::check(
                &config,
                &job,
                label.as_deref(),
                job_running,
                label_running,
            ),
        },
        Commands::Init { path } => commands::init::init(&path),
    }
}
