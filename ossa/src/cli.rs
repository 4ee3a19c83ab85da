//! Root CLI structure for ossa

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ossa")]
#[command(about = "Inspect, pose and skin skeletal animation files", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the bone hierarchy and summary of a .skeleton file
    Info {
        /// Path to the .skeleton file
        file: PathBuf,

        /// Also list animations and their tracks
        #[arg(short, long)]
        animations: bool,

        /// Maximum depth of the bone tree to display
        #[arg(long)]
        depth: Option<usize>,

        /// Show bone details inline
        #[arg(long)]
        compact: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Apply one animation at a point in time and print the bone matrices
    Pose {
        /// Path to the .skeleton file
        file: PathBuf,

        /// Name of the animation to apply
        #[arg(short, long)]
        animation: String,

        /// Time position in seconds (wraps at the animation length)
        #[arg(short, long, default_value_t = 0.0)]
        time: f32,

        /// Blend weight of the animation
        #[arg(short, long, default_value_t = 1.0)]
        weight: f32,
    },

    /// Write a sample skeleton (an arm that waves) to try the other commands on
    Demo {
        /// Where to write the .skeleton file
        output: PathBuf,
    },

    /// Report CPU features and check every skinning strategy against the portable one
    Probe {
        /// Number of random vertices to skin
        #[arg(short = 'n', long, default_value_t = 1024)]
        vertices: usize,

        /// Seed for the random test data
        #[arg(long, default_value_t = 0x05_5a)]
        seed: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
