//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::application::PushRequest;
use crate::domain::PushOptions;

/// Push CouchApp bundles to CouchDB databases.
///
/// Databases are given as URLs or as aliases from the `env` section of
/// `~/.couchapp.conf` and the application's `.couchapprc`.
#[derive(Parser, Debug)]
#[command(name = "couchapp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Export flags shared by the push commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Serialize the document(s) as JSON instead of pushing.
    #[arg(long)]
    pub export: bool,

    /// Write exported JSON to this file (stdout if not specified).
    #[arg(short, long, requires = "export")]
    pub output: Option<PathBuf>,

    /// Push attachments in separate requests.
    #[arg(long)]
    pub no_atomic: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an application skeleton.
    Init {
        /// Application directory (current directory if not specified).
        path: Option<PathBuf>,
    },

    /// Push an application to a database.
    ///
    /// `push DB` pushes the enclosing application; `push APP DB` names both.
    /// With `--export`, a single argument is the application.
    Push {
        /// `[APP] [DB]`: application directory and database URL or `env` alias.
        #[arg(num_args = 0..=2, value_names = ["APP", "DB"])]
        targets: Vec<String>,

        #[command(flatten)]
        export: ExportArgs,

        /// Explicit document id.
        #[arg(long)]
        docid: Option<String>,

        /// Push the document without attachments.
        #[arg(long)]
        doc_only: bool,

        /// Print the application URL after pushing.
        #[arg(short, long)]
        browse: bool,
    },

    /// Push every application found under a directory.
    Pushapps {
        /// Directory holding the applications.
        root: PathBuf,

        /// Database URL or `env` alias.
        dest: Option<String>,

        #[command(flatten)]
        export: ExportArgs,

        /// Print each application URL after pushing.
        #[arg(short, long)]
        browse: bool,
    },

    /// Push a directory of plain documents.
    Pushdocs {
        /// Directory holding the documents.
        docs: PathBuf,

        /// Database URL or `env` alias.
        dest: Option<String>,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Show the merged configuration, database aliases, hooks and extensions.
    Config,

    /// Run a configured extension.
    Ext {
        /// Extension name.
        name: String,

        /// Arguments passed to the extension.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Split `push` positionals into the application path and database token.
pub fn push_targets(targets: &[String], export: bool) -> (Option<PathBuf>, Option<String>) {
    match targets {
        [app, db, ..] => (Some(PathBuf::from(app)), Some(db.clone())),
        [app] if export => (Some(PathBuf::from(app)), None),
        [db] => (None, Some(db.clone())),
        [] => (None, None),
    }
}

impl ExportArgs {
    /// Build a push request for `dest` with these flags.
    pub fn request(&self, dest: Option<String>) -> PushRequest {
        PushRequest {
            dest,
            export: self.export,
            output: self.output.clone(),
            docid: None,
            options: PushOptions {
                atomic: !self.no_atomic,
                ..PushOptions::default()
            },
        }
    }
}
