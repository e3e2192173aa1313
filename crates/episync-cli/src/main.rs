use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use commands::{clear, config, daemon, datasets, mappings, overrides, status, sync};
use media_sync_models::LibraryStatus;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "episync")]
#[command(about = "episync - Mirror AniList episode progress onto Trakt")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync new AniList activity to Trakt
    #[command(long_about = "Read AniList 'watched episode' activity since the last run, translate absolute episode numbers into Trakt seasons and add them to your Trakt history.")]
    Sync {
        /// Translate and print what would be sent without writing anything
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Catch a single show up to its AniList progress
    Show {
        /// AniList id or anime URL (https://anilist.co/anime/21)
        show: String,

        /// Sync up to this absolute episode instead of the list progress
        #[arg(long, value_name = "EPISODE")]
        up_to: Option<u32>,

        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Catch up every completed or watching list entry
    Library {
        #[arg(long, default_value = "completed", value_enum)]
        status: ListStatus,

        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Inspect and edit AniList -> Trakt show mappings
    Mappings {
        #[command(subcommand)]
        cmd: MappingCommands,
    },
    /// Manage per-episode overrides
    Override {
        #[command(subcommand)]
        cmd: OverrideCommands,
    },
    /// Show per-show watermarks
    Progress {
        /// Only this show (AniList id or URL)
        #[arg(long)]
        show: Option<String>,

        /// Forget the watermark of --show so it is synced from the start
        #[arg(long, action = ArgAction::SetTrue, requires = "show")]
        reset: bool,
    },
    /// Show recent sync runs
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show cursor, lock and last-run information
    Status,
    /// Manage the cross-reference datasets
    Datasets {
        #[command(subcommand)]
        cmd: DatasetCommands,
    },
    /// Run as daemon with internal scheduler
    #[command(long_about = "Run episync in the foreground and sync on the configured cron schedule. An initial sync runs on startup unless --no-startup-sync is given.")]
    Daemon {
        /// Cron schedule with seconds (e.g. '0 0 */6 * * *' for every 6 hours)
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Configure credentials and settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Clear cached data
    #[command(long_about = "Remove cached breakpoint maps, dataset snapshots, the activity cursor, a stale run lock or stored credentials.")]
    Clear {
        /// Cached breakpoint maps (rebuilt on the next run)
        #[arg(long, action = ArgAction::SetTrue)]
        maps: bool,

        /// Downloaded dataset snapshots
        #[arg(long, action = ArgAction::SetTrue)]
        datasets: bool,

        /// Reset the activity cursor (all activity is re-read, per-show watermarks still apply)
        #[arg(long, action = ArgAction::SetTrue)]
        cursor: bool,

        /// Remove a run lock left behind by a crashed run
        #[arg(long, action = ArgAction::SetTrue)]
        lock: bool,

        /// Remove stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,

        /// Maps, datasets, cursor and lock (not credentials)
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListStatus {
    Completed,
    Watching,
}

impl From<ListStatus> for LibraryStatus {
    fn from(status: ListStatus) -> Self {
        match status {
            ListStatus::Completed => LibraryStatus::Completed,
            ListStatus::Watching => LibraryStatus::Watching,
        }
    }
}

#[derive(Subcommand)]
enum MappingCommands {
    /// List stored mappings
    List {
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "auto")]
        manual: bool,

        #[arg(long, action = ArgAction::SetTrue)]
        auto: bool,
    },
    /// Pin an AniList show to a Trakt show
    Set {
        /// AniList id or anime URL
        show: String,

        /// Trakt numeric show id
        trakt_id: u64,

        #[arg(long)]
        title: Option<String>,
    },
    /// Remove a stored mapping so the show is resolved again
    Remove {
        show: String,
    },
    /// Resolve a show and print its season breakpoints
    Inspect {
        show: String,
    },
}

#[derive(Subcommand)]
enum OverrideCommands {
    /// Send an absolute episode to a fixed Trakt season/episode
    Set {
        /// Trakt numeric show id
        trakt_id: u64,

        /// Absolute episode number as counted on AniList
        episode: u32,

        #[arg(long)]
        season: u32,

        #[arg(long = "as-episode")]
        as_episode: u32,
    },
    List {
        /// Only overrides for this Trakt show
        #[arg(long)]
        trakt_id: Option<u64>,
    },
    Remove {
        trakt_id: u64,
        episode: u32,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Download every enabled dataset now
    Refresh,
    /// Entry counts and last refresh times
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks secrets)
    Show {
        /// Show secrets unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Configure Trakt (OAuth out-of-band flow)
    #[command(long_about = "Configure Trakt API credentials and authorize episync. Create an API application at https://trakt.tv/oauth/applications with 'urn:ietf:wg:oauth:2.0:oob' as redirect URI first.")]
    Trakt {
        #[arg(long)]
        client_id: Option<String>,

        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Store an AniList access token
    Anilist {
        /// Access token (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,
    },
    /// Store a TMDB API key (enables id expansion)
    Tmdb {
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match cli.command {
        Commands::Daemon { .. } => Some(commands::paths().daemon_log_file()),
        _ => None,
    };
    logging::init_logging(cli.verbose, cli.quiet, log_file.as_deref())
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { dry_run } => sync::run_sync(dry_run, &output).await,
        Commands::Show { show, up_to, dry_run } => sync::run_show(&show, up_to, dry_run, &output).await,
        Commands::Library { status, dry_run } => sync::run_library(status.into(), dry_run, &output).await,
        Commands::Mappings { cmd } => match cmd {
            MappingCommands::List { manual, auto } => mappings::list(manual, auto, &output).await,
            MappingCommands::Set { show, trakt_id, title } => mappings::set(&show, trakt_id, title, &output).await,
            MappingCommands::Remove { show } => mappings::remove(&show, &output).await,
            MappingCommands::Inspect { show } => mappings::inspect(&show, &output).await,
        },
        Commands::Override { cmd } => match cmd {
            OverrideCommands::Set {
                trakt_id,
                episode,
                season,
                as_episode,
            } => overrides::set(trakt_id, episode, season, as_episode, &output).await,
            OverrideCommands::List { trakt_id } => overrides::list(trakt_id, &output).await,
            OverrideCommands::Remove { trakt_id, episode } => overrides::remove(trakt_id, episode, &output).await,
        },
        Commands::Progress { show, reset } => status::run_progress(show.as_deref(), reset, &output).await,
        Commands::Logs { limit } => status::run_logs(limit, &output).await,
        Commands::Status => status::run_status(&output).await,
        Commands::Datasets { cmd } => match cmd {
            DatasetCommands::Refresh => datasets::refresh(&output).await,
            DatasetCommands::Status => datasets::status(&output).await,
        },
        Commands::Daemon {
            schedule,
            no_startup_sync,
        } => daemon::run_daemon(schedule, no_startup_sync, &output).await,
        Commands::Config { cmd } => config::run_config(cmd, &output).await,
        Commands::Clear {
            maps,
            datasets,
            cursor,
            lock,
            credentials,
            all,
        } => {
            let targets = clear::ClearTargets {
                maps: maps || all,
                datasets: datasets || all,
                cursor: cursor || all,
                lock: lock || all,
                credentials,
            };
            clear::run_clear(targets, &output).await
        }
    }
}
