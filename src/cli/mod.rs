//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lexrag",
    version,
    about = "Question answering over a folder of legal documents, with citations",
    long_about = "Lexrag indexes a folder of PDF and DOCX legal documents into a local vector \
                  index and answers questions from them, returning a synthesized answer together \
                  with the passages that support it."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lexrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the vector index and metadata from a documents folder
    Ingest {
        /// Documents folder (defaults to corpus.documents_dir)
        #[arg(short, long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },

    /// Ask a question about the indexed documents
    Ask {
        /// Question to ask
        question: String,

        /// Number of passages to retrieve (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which resources are loaded and whether queries can be served
    Status {
        /// Print the readiness report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
