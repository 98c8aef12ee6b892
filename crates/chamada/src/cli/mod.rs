//! Command-line interface for chamada.
//!
//! This module provides the CLI structure and command definitions for the
//! `chamada` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, HistoryCommand, LocationPolicyArg, LoginCommand, ProfileCommand, ScanCommand,
};

/// chamada - Check in to class by scanning the instructor's QR code
///
/// Reads QR payloads, submits attendance with the device position and
/// reports the outcome.
#[derive(Debug, Parser)]
#[command(name = "chamada")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the scanner and submit attendance
    Scan(ScanCommand),

    /// Store a session token
    Login(LoginCommand),

    /// Remove the stored session
    Logout,

    /// Show the logged-in student
    Profile(ProfileCommand),

    /// List recent scan attempts
    History(HistoryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
