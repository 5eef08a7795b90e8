//! Clap derive structures for the `x8000` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.
//! Compiled into build.rs as well, so only clap types appear here.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// x8000 -- poll and control Smarther thermostats from the command line
#[derive(Debug, Parser)]
#[command(
    name = "x8000",
    version,
    about = "Monitor and control bticino X8000 / Legrand Smarther thermostats",
    long_about = "Talks to the Smarther v2 cloud API on behalf of one developer account.\n\n\
        Polls every configured thermostat on a fixed interval, backs off to a\n\
        cooldown interval as soon as the account is rate limited, and merges\n\
        push notifications delivered to a local webhook.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "X8000_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "X8000_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "X8000_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every thermostat once and print the result
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Poll continuously and listen for push notifications
    Run(RunArgs),

    /// Change a thermostat's setting
    Set(SetArgs),

    /// List the thermostats visible to the account
    Discover(DiscoverArgs),

    /// Manage push (C2C) subscriptions
    #[command(alias = "subs")]
    Subscriptions(SubscriptionsArgs),

    /// Obtain or renew OAuth tokens
    Token(TokenArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status / Run ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Show only this thermostat (module id)
    pub device: Option<String>,

    /// Print coordinator diagnostics instead of thermostat state
    #[arg(long)]
    pub diagnostics: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not start the webhook listener or register push endpoints
    #[arg(long)]
    pub no_webhook: bool,

    /// Listener address (overrides the profile's webhook.listen)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Keep push subscriptions registered on exit
    #[arg(long)]
    pub keep_subscriptions: bool,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Hold a target temperature (manual mode)
    #[command(alias = "temp")]
    Temperature {
        /// Thermostat module id
        device: String,
        /// Target in °C (7-40)
        target: f64,
        #[command(flatten)]
        hold: HoldArgs,
    },

    /// Run the boost function
    Boost {
        /// Thermostat module id
        device: String,
        /// Boost length in minutes
        #[arg(long, short = 'm', default_value = "30", value_parser = ["30", "60", "90"])]
        minutes: String,
    },

    /// Stop a running boost and return to the program
    CancelBoost {
        /// Thermostat module id
        device: String,
    },

    /// Follow a weekly program (automatic mode)
    Program {
        /// Thermostat module id
        device: String,
        /// Program number
        number: u32,
    },

    /// Switch the thermostat off
    Off {
        /// Thermostat module id
        device: String,
        #[command(flatten)]
        hold: HoldArgs,
    },

    /// Switch between automatic, heat, cool and off
    Mode {
        /// Thermostat module id
        device: String,
        mode: ModeArg,
    },
}

/// How long a manual setting lasts. Indefinite when neither flag is given.
#[derive(Debug, Args)]
pub struct HoldArgs {
    /// Hold for a duration, e.g. "90m" or "2h 30m"
    #[arg(long = "for", conflicts_with = "until")]
    pub hold_for: Option<String>,

    /// Hold until a local time, "YYYY-MM-DD HH:MM"
    #[arg(long)]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Auto,
    Heat,
    Cool,
    Off,
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Write the discovered thermostats into the active profile
    #[arg(long)]
    pub save: bool,
}

// ── Subscriptions ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SubscriptionsArgs {
    #[command(subcommand)]
    pub command: SubscriptionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionsCommand {
    /// List subscriptions on the account
    #[command(alias = "ls")]
    List,

    /// Register this installation's webhook
    Add {
        /// Plant id (defaults to every plant in the profile)
        #[arg(long)]
        plant: Option<String>,
    },

    /// Remove this installation's webhook registrations
    #[command(alias = "rm")]
    Remove {
        /// Plant id (defaults to every plant in the profile)
        #[arg(long)]
        plant: Option<String>,
    },
}

// ── Token ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Trade an authorization code for a refresh token and store it
    Exchange {
        /// Code from the consent redirect
        code: String,
        /// Redirect URI registered for the application
        #[arg(long)]
        redirect_uri: String,
    },

    /// Renew the access token now
    Refresh,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Print the resolved configuration (secrets masked)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
