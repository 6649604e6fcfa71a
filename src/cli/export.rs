//! Export subcommand for the task-assign CLI
//!
//! Writes the full project snapshot as JSON. The output can be
//! version-controlled, diffed, or loaded back by either backend.

use crate::snapshot::is_gzip_path;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Force gzip compression (auto-detected from .gz extension otherwise)
    #[arg(long)]
    pub gzip: bool,
}

impl ExportArgs {
    /// The file to write, with `.gz` appended when `--gzip` is set on a plain path.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output.as_ref().map(|path| {
            if self.gzip && !is_gzip_path(path) {
                let mut name = path.as_os_str().to_owned();
                name.push(".gz");
                PathBuf::from(name)
            } else {
                path.clone()
            }
        })
    }
}
