//! Command-line interface for inkloop, built on clap.
//!
//! Defines [`Cli`] with the [`Command`] subcommands and the global flags
//! (--model, --verbose, --config).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use inkloop::anthropic::ModelTier;

/// inkloop: write, grade and revise articles until they are good enough.
#[derive(Debug, Parser)]
#[command(name = "inkloop", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Model tier used for writing and grading in this session.
    #[arg(long, global = true)]
    pub model: Option<ModelArg>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Path to the configuration file (defaults to ./inkloop.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Model accepted on the command line, mapped to [`ModelTier`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModelArg {
    /// Fast and cheap.
    Haiku,
    /// Balanced quality and cost.
    Sonnet,
    /// Most capable.
    Opus,
}

impl From<ModelArg> for ModelTier {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Haiku => ModelTier::Haiku,
            ModelArg::Sonnet => ModelTier::Sonnet,
            ModelArg::Opus => ModelTier::Opus,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an article for a topic and run the revision loop.
    Generate {
        /// What the article should be about.
        topic: String,

        /// Generate + evaluate cycles allowed before the article is rejected.
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Print an article with its latest evaluation.
    Show {
        id: String,
    },

    /// List stored articles, newest first.
    List,

    /// Delete an article.
    Delete {
        id: String,
    },

    /// Give human feedback on an article waiting for review.
    Feedback {
        id: String,

        /// The critique to apply in the next revision.
        text: String,

        /// Store the feedback without starting another revision.
        #[arg(long, default_value_t = false)]
        save_only: bool,
    },

    /// Continue an interrupted or paused workflow.
    Resume {
        id: String,
    },

    /// Export an article as Markdown.
    Export {
        id: String,

        /// Output file (defaults to <topic>.md in the working directory).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run the HTTP API.
    Serve {
        /// Address to bind, overriding `listen_addr` from the config.
        #[arg(long)]
        listen: Option<String>,
    },
}

impl Command {
    /// Whether the command calls the generation service.
    pub fn needs_generator(&self) -> bool {
        match self {
            Command::Generate { .. } | Command::Resume { .. } | Command::Serve { .. } => true,
            Command::Feedback { save_only, .. } => !save_only,
            Command::Show { .. } | Command::List | Command::Delete { .. } | Command::Export { .. } => {
                false
            }
        }
    }
}
