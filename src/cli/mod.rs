// src/cli/mod.rs — CLI definition (clap derive)

pub mod run;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cloudhand",
    about = "Operate a remote cloud instance with natural language",
    version
)]
pub struct Cli {
    /// Intent to run (default command when no subcommand given)
    #[arg(trailing_var_arg = true)]
    pub intent: Vec<String>,

    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one intent from the terminal (answers clarifying questions
    /// interactively)
    Run {
        #[arg(trailing_var_arg = true)]
        intent: Vec<String>,
    },
    /// Start the HTTP bridge the chat platform posts turns to
    Serve,
}
