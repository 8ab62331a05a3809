use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lorebook_core::models::ResolutionPolicy;

#[derive(Parser)]
#[command(name = "lore")]
#[command(about = "Keep a lorebook of markdown documents, synced with a Git repository")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new document
    #[command(alias = "new")]
    Add {
        /// Document body (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
        /// Title; defaults to the first line of the body
        #[arg(short, long)]
        title: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Upload the document right away
        #[arg(long)]
        push: bool,
    },
    /// Show a document
    Show {
        /// Document ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent documents
    List {
        /// Number of documents to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter documents by tag
        #[arg(long)]
        tag: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search documents by title, body or tag
    Search {
        /// Search query
        query: String,
        /// Number of documents to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing document in $EDITOR
    Edit {
        /// Document ID or unique ID prefix
        id: String,
        /// Replace the title
        #[arg(short, long)]
        title: Option<String>,
        /// Upload the document right away
        #[arg(long)]
        push: bool,
    },
    /// Delete an existing document
    Delete {
        /// Document ID or unique ID prefix
        id: String,
    },
    /// Sync local documents with the remote repository
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Output the sync report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run a full sync pass and list documents that need manual resolution
    ///
    /// Conflicts are found during a pass, so this also uploads and downloads
    /// every other document that changed.
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a full sync pass, then resolve the conflict for one document
    ///
    /// The pass rediscovers the conflict and also uploads and downloads
    /// every other document that changed since the last sync.
    Resolve {
        /// Document ID or unique ID prefix
        id: String,
        /// Which side wins
        #[arg(long, value_enum)]
        policy: PolicyArg,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PolicyArg {
    /// Keep the local copy and overwrite the remote one
    Local,
    /// Keep the remote copy and overwrite the local one
    Remote,
    /// Concatenate both copies
    Merge,
}

impl From<PolicyArg> for ResolutionPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Local => Self::TakeLocal,
            PolicyArg::Remote => Self::TakeRemote,
            PolicyArg::Merge => Self::Merge,
        }
    }
}
