// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Retrieve;
use log::debug;
use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} failed with status: {status}\nstderr: \"{stderr}\"")]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Transfer reported success but {} does not exist", .0.display())]
    Missing(PathBuf),
}

/// Fetch certificates by running `rsync <url> <dest>`.
#[derive(Clone, Debug)]
pub struct Rsync {
    program: PathBuf,
}

impl Default for Rsync {
    fn default() -> Self {
        Rsync::new("rsync")
    }
}

impl Rsync {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Rsync {
            program: program.into(),
        }
    }
}

impl Retrieve for Rsync {
    fn retrieve(&self, url: &str, dest: &Path) -> Result<(), RetrievalError> {
        let program = self.program.to_string_lossy().to_string();

        let mut cmd = Command::new(&self.program);
        // `--` keeps a URL starting with `-` from being read as an option.
        cmd.arg("--").arg(url).arg(dest);
        debug!("executing command: {:?}", cmd);

        let output = cmd.output().map_err(|source| RetrievalError::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(RetrievalError::ExitStatus {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        // rsync exits 0 when the source is a directory it was not asked to
        // recurse into, leaving nothing behind.
        if !dest.is_file() {
            return Err(RetrievalError::Missing(dest.to_path_buf()));
        }

        Ok(())
    }
}
