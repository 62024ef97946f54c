//! Clap derive structures for the `buildmart` CLI.
//!
//! Defines the command tree, global flags, and shared argument groups.
//! Only depends on clap and clap_complete so `build.rs` can include it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// buildmart -- manage a Buildmart seller catalog from the command line
#[derive(Debug, Parser)]
#[command(
    name = "buildmart",
    version,
    about = "Manage your Buildmart marketplace catalog from the command line",
    long_about = "Scriptable client for the Buildmart marketplace API.\n\n\
        Lists, creates, updates and deletes products, and uploads or removes\n\
        product media. Every request goes through the same gateway the apps use.",
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
    /// Config profile to use
    #[arg(long, short = 'p', env = "BUILDMART_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API root URL (overrides profile)
    #[arg(long, env = "BUILDMART_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token (overrides profile and keyring)
    #[arg(long, env = "BUILDMART_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BUILDMART_OUTPUT",
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

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "BUILDMART_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "BUILDMART_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
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
    /// Plain text, one id per line (scripting)
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
    /// Manage your product catalog
    #[command(alias = "product", alias = "p")]
    Products(ProductsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// Filtering and pagination for list commands.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Page to fetch
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Results per page (overrides profile)
    #[arg(long)]
    pub per_page: Option<u32>,

    /// Free-text search
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Extra filter as key=value (repeatable), e.g. --filter category_id=2
    #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
}

/// Field input for create/update.
#[derive(Debug, Args)]
pub struct PayloadArgs {
    /// Field as key=value (repeatable). Dotted keys nest: dimensions.width=20.
    /// Values are read as JSON when they parse, otherwise as text.
    #[arg(long = "field", short = 'F', value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Read fields from a JSON object file (flags override its values)
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Attach a file as [field=]path (repeatable). Without a field name the
    /// file is added to the `images` list.
    #[arg(long = "file", value_name = "[FIELD=]PATH")]
    pub files: Vec<String>,
}

// ── Products ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProductsArgs {
    #[command(subcommand)]
    pub command: ProductsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProductsCommand {
    /// List your products
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one product
    Get {
        /// Product ID
        id: String,
    },

    /// Create a product
    Create(PayloadArgs),

    /// Update a product
    Update {
        /// Product ID
        id: String,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Send PATCH instead of POST
        #[arg(long)]
        patch: bool,
    },

    /// Delete a product
    #[command(alias = "rm")]
    Delete {
        /// Product ID
        id: String,
    },

    /// Upload media files to a product
    Upload {
        /// Product ID
        id: String,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Media collection (defaults to "images")
        #[arg(long)]
        collection: Option<String>,
    },

    /// Delete one media item from a product
    DeleteMedia {
        /// Product ID
        id: String,

        /// Media ID
        media_id: u64,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or extend the config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
