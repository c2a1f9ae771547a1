//! Command line definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for userdesk
#[derive(Debug, Parser)]
#[command(
    name = "userdesk",
    version = env!("CARGO_PKG_VERSION"),
    about = "Schema-driven user administration",
    long_about = "Manage the user schema, users and administrator assignments of a remote administration API. Forms, validation and table columns all follow the schema the server reports."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Print JSON instead of tables, and log as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (overrides configuration)
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Bearer token from a previous `login`
    #[arg(long, env = "USERDESK_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in and print a token
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "USERDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Invalidate the current token
    Logout,

    /// Forgotten, reset and changed passwords
    Password {
        /// Password subcommand
        #[command(subcommand)]
        action: PasswordCommands,
    },

    /// The signed-in administrator's profile
    Profile {
        /// Profile subcommand
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// Inspect and edit the user schema
    Schema {
        /// Schema subcommand
        #[command(subcommand)]
        action: SchemaCommands,
    },

    /// List and edit users
    Users {
        /// Users subcommand
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Administrators users can be assigned to
    Admins {
        /// Admins subcommand
        #[command(subcommand)]
        action: AdminCommands,
    },

    /// Show the resolved configuration
    Config {
        /// Config subcommand
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Schema subcommands
#[derive(Debug, Subcommand)]
pub enum SchemaCommands {
    /// Print every field with its constraints
    Show,

    /// Print the table columns and sort keys the schema yields
    Columns,

    /// Add a field
    Add {
        /// Field name (letters and digits, starting with a letter)
        name: String,

        /// Field type: string, string_enum, number, boolean or date
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        kind: String,

        /// Make the field required
        #[arg(long)]
        required: bool,

        /// Field constraints
        #[command(flatten)]
        constraints: ConstraintArgs,
    },

    /// Change the constraints of a field
    Update {
        /// Field name
        name: String,

        /// Make the field required or optional
        #[arg(long, value_name = "BOOL")]
        required: Option<bool>,

        /// Field constraints
        #[command(flatten)]
        constraints: ConstraintArgs,
    },

    /// Remove a field
    Delete {
        /// Field name
        name: String,
    },
}

/// Constraint flags shared by `schema add` and `schema update`
#[derive(Debug, Default, Args)]
pub struct ConstraintArgs {
    /// Allowed values, comma separated
    #[arg(long = "enum", value_name = "VALUES", value_delimiter = ',')]
    pub enum_values: Option<Vec<String>>,

    /// Default value
    #[arg(long)]
    pub default: Option<String>,

    /// Minimum length of text values
    #[arg(long, value_name = "N")]
    pub min_length: Option<usize>,

    /// Maximum length of text values
    #[arg(long, value_name = "N")]
    pub max_length: Option<usize>,

    /// Lower bound for numbers and dates
    #[arg(long)]
    pub min: Option<String>,

    /// Upper bound for numbers and dates
    #[arg(long)]
    pub max: Option<String>,
}

/// Users subcommands
#[derive(Debug, Subcommand)]
pub enum UserCommands {
    /// List one page of users
    List {
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Users per page
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: u32,

        /// Free-text search
        #[arg(short, long, default_value = "")]
        search: String,

        /// Sort key, `-` prefix for descending
        #[arg(long, default_value = "-createdAt")]
        sort: String,

        /// Extra filter as key=value
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
    },

    /// Show one user
    Show {
        /// User id
        id: String,
    },

    /// Create a user from field values
    Create {
        /// Field value as key=value
        #[arg(long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,
    },

    /// Update a user; `key=` clears a field
    Update {
        /// User id
        id: String,

        /// Field value as key=value
        #[arg(long = "set", value_name = "KEY=VALUE")]
        values: Vec<String>,
    },

    /// Delete users
    Delete {
        /// User ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Set the status of users
    Status {
        /// New status: active, inactive or blocked
        status: String,

        /// User ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Assign users to an administrator
    Assign {
        /// Administrator id
        admin: String,

        /// User ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Remove users from their administrator
    Unassign {
        /// Administrator id, when known
        #[arg(long)]
        admin: Option<String>,

        /// User ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Create users from a CSV or spreadsheet file
    Import {
        /// File to upload
        file: PathBuf,
    },

    /// Export users to a file
    Export {
        /// File format: csv, xlsx or json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Fields to include; all columns when omitted
        #[arg(long = "field", value_name = "NAME")]
        fields: Vec<String>,

        /// Output file; a timestamped name when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Password subcommands
#[derive(Debug, Subcommand)]
pub enum PasswordCommands {
    /// Email a reset link to an account
    Forgot {
        /// Account email
        #[arg(short, long)]
        email: String,
    },

    /// Set a new password with the token from a reset email
    Reset {
        /// Token from the reset email
        #[arg(long)]
        reset_token: String,

        /// New password
        #[arg(short, long, env = "USERDESK_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Change the signed-in administrator's password
    Change {
        /// Password in use now
        #[arg(long, env = "USERDESK_PASSWORD", hide_env_values = true)]
        current: String,

        /// Replacement password
        #[arg(long = "new", env = "USERDESK_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
}

/// Profile subcommands
#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    /// Change profile fields
    Update {
        /// Profile value as key=value
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        values: Vec<String>,
    },
}

/// Admins subcommands
#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// List administrators
    List,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration as TOML
    Show,
}
