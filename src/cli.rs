//! CLI definitions for the release agent
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "qx-release-agent",
    version,
    about = "OTA update distribution server for Quantix hypervisor fleets",
    long_about = "Serves signed release manifests and artifacts to update agents,\ncoordinates host maintenance windows against workload drain, and drives\nthe control-plane appliance's migrate/rollback lifecycle."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the release distribution server
    Serve,

    /// Generate an Ed25519 keypair for manifest signing
    GenerateKeys {
        /// Directory to write signing.key / signing.pub into
        #[arg(long, default_value = "./keys")]
        output_dir: String,
    },
}
