// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{key_lines_from_pem, ExtractPublicKey, KeyExtractionError};
use log::debug;
use std::{
    path::{Path, PathBuf},
    process::Command,
};

/// Extract the public key from a DER certificate with
/// `openssl x509 -inform DER -in <path> -pubkey -noout`.
#[derive(Clone, Debug)]
pub struct OpenSsl {
    program: PathBuf,
}

impl Default for OpenSsl {
    fn default() -> Self {
        OpenSsl::new("openssl")
    }
}

impl OpenSsl {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        OpenSsl {
            program: program.into(),
        }
    }
}

impl ExtractPublicKey for OpenSsl {
    fn extract_public_key(
        &self,
        path: &Path,
    ) -> Result<Vec<String>, KeyExtractionError> {
        let program = self.program.to_string_lossy().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.arg("x509")
            .arg("-inform")
            .arg("DER")
            .arg("-in")
            .arg(path)
            .arg("-pubkey")
            .arg("-noout");
        debug!("executing command: {:?}", cmd);

        let output =
            cmd.output().map_err(|source| KeyExtractionError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(KeyExtractionError::ExitStatus {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let pem = String::from_utf8(output.stdout)?;
        debug!("output: {}", pem);

        let lines = key_lines_from_pem(&pem);
        if lines.is_empty() {
            return Err(KeyExtractionError::Empty(path.to_path_buf()));
        }

        Ok(lines)
    }
}
