//! Errors that end a run.
//!
//! Framing problems and rejected messages never show up here; they are
//! resynchronized past or counted.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot open input file {}: {source}", path.display())]
    OpenInput { path: PathBuf, source: io::Error },

    #[error("cannot create extraction file {}: {source}", path.display())]
    OpenExtract { path: PathBuf, source: io::Error },

    #[error("cannot create KML file {}: {source}", path.display())]
    OpenKml { path: PathBuf, source: io::Error },

    #[error("write error in extraction file: {0}")]
    ExtractWrite(#[source] io::Error),

    #[error("write error in KML file: {0}")]
    KmlWrite(#[source] io::Error),

    #[error("cannot write decoded output: {0}")]
    Output(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] beast_core::BeastError),

    #[error("read error: {0}")]
    Read(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RunError>;
