use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Longest history window `logs --hours` accepts (30 days)
pub const MAX_HOURS: i64 = 720;

/// r4r - Render.com from the terminal, with live log tailing
#[derive(Parser, Debug)]
#[command(name = "r4r")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Render API key (overrides the stored key)
    #[arg(long, global = true, env = "RENDER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store an API key after checking it against the API
    Login {
        /// Key to store; prompts when omitted
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Remove stored credentials
    Logout,
    /// Show the account behind the current key
    Whoami,
    /// List services
    List(ListArgs),
    /// Show a service and its recent deploys
    Info {
        /// Service name or id
        service: String,
    },
    /// Trigger a deploy
    Deploy(DeployArgs),
    /// Deploy with a cleared build cache
    Rebuild(RebuildArgs),
    /// List recent deploys for a service
    Deploys {
        service: String,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Run a one-off job
    Job(JobArgs),
    /// List recent jobs for a service
    Jobs {
        service: String,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show the status of a job
    Status {
        job_id: String,
    },
    /// Print, follow or export service logs
    Logs(LogsArgs),
    /// Open the interactive log viewer
    Tui(TuiArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show services of this type (web_service, worker, ...)
    #[arg(short = 't', long = "type")]
    pub kind: Option<String>,

    /// Show region, plan and creation date
    #[arg(short, long)]
    pub detailed: bool,

    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    pub service: String,

    /// Rebuild without the build cache
    #[arg(short, long)]
    pub clear_cache: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Wait until the deploy finishes
    #[arg(short, long)]
    pub wait: bool,

    /// Give up waiting after this many minutes
    #[arg(long, default_value_t = 15)]
    pub timeout_minutes: u64,
}

#[derive(Args, Debug)]
pub struct RebuildArgs {
    pub service: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Wait until the deploy finishes
    #[arg(short, long)]
    pub wait: bool,

    /// Give up waiting after this many minutes
    #[arg(long, default_value_t = 15)]
    pub timeout_minutes: u64,
}

impl From<RebuildArgs> for DeployArgs {
    fn from(args: RebuildArgs) -> Self {
        Self {
            service: args.service,
            clear_cache: true,
            yes: args.yes,
            wait: args.wait,
            timeout_minutes: args.timeout_minutes,
        }
    }
}

#[derive(Args, Debug)]
pub struct JobArgs {
    pub service: String,

    /// Command the job runs
    pub command: String,

    /// Wait until the job finishes
    #[arg(short, long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Service name or id
    pub service: String,

    /// Print at most this many of the newest records
    #[arg(short = 'n', long, default_value_t = 100)]
    pub lines: usize,

    /// History window in hours (defaults to the configured window)
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_HOURS))]
    pub hours: Option<i64>,

    /// Only show records at this level (debug, info, warn, error, fatal)
    #[arg(short, long)]
    pub level: Option<String>,

    /// Only show records whose message contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Keep streaming new records until interrupted
    #[arg(short, long)]
    pub follow: bool,

    /// Also write the printed records to this file
    #[arg(short, long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Open the interactive viewer instead of printing
    #[arg(short, long, conflicts_with_all = ["follow", "export"])]
    pub tui: bool,
}

#[derive(Args, Debug)]
pub struct TuiArgs {
    /// Service name or id to open directly
    #[arg(short, long, conflicts_with = "resources")]
    pub service: Option<String>,

    /// Raw resource ids to follow together
    #[arg(short, long, num_args = 1..)]
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_logs_flags() {
        let cli = Cli::try_parse_from([
            "r4r", "logs", "api", "-n", "20", "--level", "error", "--follow", "--search", "timeout",
        ])
        .unwrap();
        let Command::Logs(args) = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(args.service, "api");
        assert_eq!(args.lines, 20);
        assert_eq!(args.level.as_deref(), Some("error"));
        assert_eq!(args.search.as_deref(), Some("timeout"));
        assert!(args.follow);
        assert!(!args.tui);
    }

    #[test]
    fn test_hours_must_be_in_range() {
        assert!(Cli::try_parse_from(["r4r", "logs", "api", "--hours", "0"]).is_err());
        assert!(Cli::try_parse_from(["r4r", "logs", "api", "--hours", "1000000000000"]).is_err());

        let cli = Cli::try_parse_from(["r4r", "logs", "api", "--hours", "720"]).unwrap();
        let Command::Logs(args) = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(args.hours, Some(MAX_HOURS));
    }

    #[test]
    fn test_rebuild_clears_cache() {
        let cli = Cli::try_parse_from(["r4r", "rebuild", "api", "-y"]).unwrap();
        let Command::Rebuild(args) = cli.command else {
            panic!("expected rebuild command");
        };
        let deploy = DeployArgs::from(args);
        assert_eq!(deploy.service, "api");
        assert!(deploy.clear_cache);
        assert!(deploy.yes);
        assert!(!deploy.wait);
    }

    #[test]
    fn test_tui_conflicts_with_follow() {
        assert!(Cli::try_parse_from(["r4r", "logs", "api", "--tui", "--follow"]).is_err());
    }

    #[test]
    fn test_tui_resources() {
        let cli = Cli::try_parse_from(["r4r", "tui", "--resources", "srv-1", "srv-2"]).unwrap();
        let Command::Tui(args) = cli.command else {
            panic!("expected tui command");
        };
        assert_eq!(args.resources, vec!["srv-1", "srv-2"]);
        assert!(args.service.is_none());
    }

    #[test]
    fn test_global_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["r4r", "list", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
