//! Vellum command-line tool.
//!
//! Works on inbound Megolm sessions stored as pickle files. Every command
//! that may advance a session's live ratchet writes the session back.
//!
//! The pickle key is read from `--pickle-key-file` (or
//! `VELLUM_PICKLE_KEY_FILE`), falling back to the `VELLUM_PICKLE_KEY`
//! environment variable. It is never accepted as a command-line value,
//! which would expose it in process listings.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use vellum_core::{MegolmInboundSession, OlmError};

/// Errors surfaced by the command-line tool
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file or stdout failed
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File involved, or `-` for the standard streams
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Session operation failed
    #[error(transparent)]
    Olm(#[from] OlmError),

    /// Inspection output could not be rendered
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither a key file nor `VELLUM_PICKLE_KEY` was provided
    #[error("no pickle key: pass --pickle-key-file or set {PICKLE_KEY_ENV}")]
    MissingPickleKey,

    /// `VELLUM_PICKLE_KEY` is set but not valid UTF-8
    #[error("{PICKLE_KEY_ENV} is not valid UTF-8")]
    InvalidPickleKey,
}

impl CliError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.display().to_string(), source }
    }
}

/// Environment variable holding the pickle key itself
pub const PICKLE_KEY_ENV: &str = "VELLUM_PICKLE_KEY";

/// Megolm session tool
#[derive(Parser, Debug)]
#[command(name = "vellum")]
#[command(about = "Import, decrypt and export Megolm group sessions")]
#[command(version)]
pub struct Cli {
    /// File holding the key protecting session pickles.
    /// Falls back to the VELLUM_PICKLE_KEY environment variable.
    #[arg(long, env = "VELLUM_PICKLE_KEY_FILE")]
    pub pickle_key_file: Option<PathBuf>,

    /// Pickle flavour for session files
    #[arg(long, value_enum, default_value_t = PickleFormat::Libolm)]
    pub format: PickleFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Session file encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PickleFormat {
    /// libolm binary layout
    Libolm,
    /// JSON layout
    Json,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a session from a signed session-sharing message
    ImportShare {
        /// File holding the base64 session key
        #[arg(long)]
        input: PathBuf,
        /// Session file to write
        #[arg(long)]
        session: PathBuf,
    },

    /// Create a session from an unsigned session export
    ImportExport {
        /// File holding the base64 export
        #[arg(long)]
        input: PathBuf,
        /// Session file to write
        #[arg(long)]
        session: PathBuf,
    },

    /// Decrypt a group message and print the plaintext
    Decrypt {
        /// Session file, updated in place
        #[arg(long)]
        session: PathBuf,
        /// File holding the base64 group message
        #[arg(long)]
        message: PathBuf,
    },

    /// Print a session export starting at the given index
    Export {
        /// Session file, updated in place
        #[arg(long)]
        session: PathBuf,
        /// First index the export can decrypt
        #[arg(long)]
        index: u32,
    },

    /// Print session metadata as JSON
    Inspect {
        /// Session file
        #[arg(long)]
        session: PathBuf,
    },
}

/// Session metadata printed by `inspect`
#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    first_known_index: u32,
    live_index: u32,
    verified: bool,
}

impl Cli {
    /// Pickle key from the key file, else from `VELLUM_PICKLE_KEY`.
    ///
    /// Surrounding whitespace in the key file is ignored.
    pub fn pickle_key(&self) -> Result<String, CliError> {
        if let Some(path) = &self.pickle_key_file {
            return read_blob(path);
        }
        match env::var(PICKLE_KEY_ENV) {
            Ok(key) => Ok(key),
            Err(env::VarError::NotPresent) => Err(CliError::MissingPickleKey),
            Err(env::VarError::NotUnicode(_)) => Err(CliError::InvalidPickleKey),
        }
    }
}

/// Execute `cli.command`, writing command output to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let key = cli.pickle_key()?;
    let store = SessionStore { key: key.as_bytes(), format: cli.format };

    match &cli.command {
        Command::ImportShare { input, session } => {
            let imported = MegolmInboundSession::from_session_share(read_blob(input)?.as_bytes())?;
            tracing::info!(session_id = %imported.id(), first_known_index = imported.first_known_index(), "imported session share");
            store.save(session, &imported)
        },
        Command::ImportExport { input, session } => {
            let imported = MegolmInboundSession::from_export(read_blob(input)?.as_bytes())?;
            tracing::info!(session_id = %imported.id(), first_known_index = imported.first_known_index(), "imported session export");
            store.save(session, &imported)
        },
        Command::Decrypt { session, message } => {
            let mut inbound = store.load(session)?;
            let (plaintext, index) = inbound.decrypt(read_blob(message)?.as_bytes())?;
            tracing::info!(session_id = %inbound.id(), index, "decrypted message");

            store.save(session, &inbound)?;
            out.write_all(&plaintext).map_err(|e| CliError::io(Path::new("-"), e))
        },
        Command::Export { session, index } => {
            let mut inbound = store.load(session)?;
            let exported = inbound.export(*index)?;

            store.save(session, &inbound)?;
            writeln!(out, "{exported}").map_err(|e| CliError::io(Path::new("-"), e))
        },
        Command::Inspect { session } => {
            let inbound = store.load(session)?;
            let summary = SessionSummary {
                session_id: inbound.id(),
                first_known_index: inbound.first_known_index(),
                live_index: inbound.live_index(),
                verified: inbound.is_verified(),
            };
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out).map_err(|e| CliError::io(Path::new("-"), e))
        },
    }
}

/// Reads and writes session pickles.
struct SessionStore<'a> {
    key: &'a [u8],
    format: PickleFormat,
}

impl SessionStore<'_> {
    fn load(&self, path: &Path) -> Result<MegolmInboundSession, CliError> {
        let blob = read_blob(path)?;
        let session = match self.format {
            PickleFormat::Libolm => MegolmInboundSession::from_pickle(blob.as_bytes(), self.key)?,
            PickleFormat::Json => MegolmInboundSession::unpickle_json(blob.as_bytes(), self.key)?,
        };
        tracing::debug!(path = %path.display(), session_id = %session.id(), "loaded session");
        Ok(session)
    }

    fn save(&self, path: &Path, session: &MegolmInboundSession) -> Result<(), CliError> {
        let blob = match self.format {
            PickleFormat::Libolm => session.pickle(self.key)?,
            PickleFormat::Json => session.pickle_json(self.key)?,
        };
        fs::write(path, blob).map_err(|e| CliError::io(path, e))?;
        tracing::debug!(path = %path.display(), "saved session");
        Ok(())
    }
}

/// Whole file contents with surrounding whitespace removed.
fn read_blob(path: &Path) -> Result<String, CliError> {
    let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    Ok(text.trim().to_string())
}
