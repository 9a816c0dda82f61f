use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// MinNotes: a small multi-user notebook kept in a local SQLite file.
#[derive(Parser, Debug)]
#[command(name = "minnotes")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the database, config and logs.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an account and sign in to it.
    Signup {
        email: String,
        #[arg(long, env = "MINNOTES_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in to an existing account.
    Signin {
        email: String,
        #[arg(long, env = "MINNOTES_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the current session.
    Signout,

    /// Show the signed-in account.
    Whoami,

    /// List notes, pinned first and most recently edited next.
    List {
        #[arg(long)]
        folder: Option<String>,
        /// Case-insensitive text to look for in titles and content.
        #[arg(long)]
        search: Option<String>,
    },

    /// Create an empty note and print its id.
    New {
        #[arg(long)]
        folder: Option<String>,
    },

    /// Change fields of a note.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Comma-separated tags; replaces the existing list.
        #[arg(long)]
        tags: Option<String>,
    },

    /// Delete a note.
    Delete { id: String },

    /// Pin or unpin a note.
    Pin { id: String },

    /// Attach an image or pdf file to a note.
    Attach {
        id: String,
        path: PathBuf,
        /// MIME type; guessed from the file extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },

    /// Remove an attachment from a note.
    Detach { id: String, attachment_id: String },

    /// Show how many notes each folder holds.
    Folders,

    /// Write notes as pretty JSON.
    Export {
        #[arg(long)]
        folder: Option<String>,
        /// Output file; defaults to `minnotes-export-<date>.json` in the working directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show or change the colour theme.
    Theme {
        #[arg(value_enum)]
        action: Option<ThemeAction>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeAction {
    Dark,
    Light,
    Toggle,
}
