//! Command-line interface definitions for the `fleeting-plugin-cloudscale`
//! binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `fleeting-plugin-cloudscale` binary.
#[derive(Debug, Parser)]
#[command(
    name = "fleeting-plugin-cloudscale",
    about = "Manage a group of cloudscale.ch servers tagged as one instance group",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Print the plugin version and build information.
    #[command(name = "version", about = "Print the plugin version and build information")]
    Version,
    /// Report the state of every server in the group.
    #[command(name = "status", about = "Report the state of every server in the group")]
    Status(GroupArgs),
    /// Create servers and wait until they run.
    #[command(name = "increase", about = "Create servers and wait until they run")]
    Increase {
        /// Group configuration.
        #[command(flatten)]
        group: GroupArgs,
        /// Number of servers to create.
        #[arg(value_name = "COUNT")]
        count: usize,
        /// Where to write the generated private key when no key path is
        /// configured.
        #[arg(long, value_name = "PATH")]
        key_out: Option<String>,
    },
    /// Delete servers owned by the group.
    #[command(name = "decrease", about = "Delete servers owned by the group")]
    Decrease {
        /// Group configuration.
        #[command(flatten)]
        group: GroupArgs,
        /// Server UUIDs to delete.
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },
    /// Show how to connect to one server.
    #[command(name = "connect-info", about = "Show how to connect to one server")]
    ConnectInfo {
        /// Group configuration.
        #[command(flatten)]
        group: GroupArgs,
        /// Server UUID.
        #[arg(value_name = "ID")]
        id: String,
    },
}

/// Arguments shared by every group subcommand.
#[derive(Debug, Args)]
pub(crate) struct GroupArgs {
    /// Path to the group configuration JSON file.
    #[arg(long, value_name = "PATH", env = "FLEETING_CLOUDSCALE_CONFIG")]
    pub(crate) config: String,
}
