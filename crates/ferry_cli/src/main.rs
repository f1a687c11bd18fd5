mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ferry_core::sources::csv::CsvFiles;
use ferry_core::FerryConfig;
use miette::Result;
use tracing::info;

use crate::output::Output;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Move a legacy forum's content into a new one")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Database file path (overrides config)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Identity map namespace (overrides config)
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Records per batch (overrides config)
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Write converted bodies to inspection files instead of importing posts
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a source into the forum
    Import {
        #[command(subcommand)]
        cmd: ImportCommands,
    },
    /// Identity map inspection
    Map {
        #[command(subcommand)]
        cmd: MapCommands,
    },
    /// Convert one legacy body and print the result
    Transcode {
        /// File holding the raw body
        file: PathBuf,

        /// Fail instead of keeping text when a placeholder goes missing
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ImportCommands {
    /// Generic JSON user export
    Json {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// CSV exports
    Csv {
        #[arg(long)]
        users: Option<PathBuf>,
        #[arg(long)]
        emails: Option<PathBuf>,
        #[arg(long)]
        categories: Option<PathBuf>,
        #[arg(long)]
        topics: Option<PathBuf>,
        #[arg(long)]
        sso: Option<PathBuf>,
    },
    /// Flarum MySQL database
    #[cfg(feature = "flarum")]
    Flarum {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum MapCommands {
    /// Target id of a source record
    Lookup {
        /// group, user, category, topic or post
        kind: String,
        source_id: String,
    },
    /// Where replies to a thread go
    Thread { first_post_source_id: String },
    /// Recent mappings of one kind
    List {
        kind: String,
        #[arg(short = 'l', long, default_value_t = 20)]
        limit: i64,
    },
    /// Mapping and forum row counts
    Stats,
}

fn init_tracing(debug: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferry")
        .join("logs");
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = rolling::daily(&log_dir, "ferry.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = if debug {
        EnvFilter::new("ferry_core=debug,ferry_db=debug,ferry=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ferry_core=info,ferry_db=warn,ferry=info,warn"))
    };

    let terminal_layer = if debug {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .pretty()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(terminal_layer.with_filter(env_filter))
        .with(file_layer.with_filter(EnvFilter::new("ferry_core=debug,ferry_db=debug,ferry=debug,info")))
        .init();

    info!("Logging to {}", log_dir.join("ferry.log").display());
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .context_lines(3)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.debug);

    let mut config = FerryConfig::load(cli.config.as_deref()).await?;
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.import.namespace = namespace.clone();
    }
    if let Some(size) = cli.batch_size {
        config.import.batch_size = size;
    }
    if cli.dry_run {
        config.import.dry_run = true;
    }

    let output = Output::new();

    match cli.command {
        Commands::Import { cmd } => match cmd {
            ImportCommands::Json { file } => {
                config.validate()?;
                commands::import::json(&config, file, &output).await?
            }
            ImportCommands::Csv {
                users,
                emails,
                categories,
                topics,
                sso,
            } => {
                config.validate()?;
                let defaults = CsvFiles::from(&config.sources);
                let files = CsvFiles {
                    users: users.or(defaults.users),
                    emails: emails.or(defaults.emails),
                    categories: categories.or(defaults.categories),
                    topics: topics.or(defaults.topics),
                    sso: sso.or(defaults.sso),
                };
                commands::import::csv(&config, files, &output).await?
            }
            #[cfg(feature = "flarum")]
            ImportCommands::Flarum {
                host,
                port,
                database,
                user,
                password,
            } => {
                if let Some(host) = host {
                    config.flarum.host = host;
                }
                if let Some(port) = port {
                    config.flarum.port = port;
                }
                if let Some(database) = database {
                    config.flarum.database = database;
                }
                if let Some(user) = user {
                    config.flarum.user = user;
                }
                if password.is_some() {
                    config.flarum.password = password;
                }
                config.validate()?;
                commands::import::flarum(&config, &output).await?
            }
        },
        Commands::Map { cmd } => match cmd {
            MapCommands::Lookup { kind, source_id } => {
                commands::map::lookup(&config, &kind, &source_id, &output).await?
            }
            MapCommands::Thread {
                first_post_source_id,
            } => commands::map::thread(&config, &first_post_source_id, &output).await?,
            MapCommands::List { kind, limit } => {
                commands::map::list(&config, &kind, limit, &output).await?
            }
            MapCommands::Stats => commands::map::stats(&config, &output).await?,
        },
        Commands::Transcode { file, strict } => {
            commands::transcode::run(&config, &file, strict, &output).await?
        }
    }

    Ok(())
}
