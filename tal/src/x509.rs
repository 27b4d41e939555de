// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{key_lines_from_pem, ExtractPublicKey, KeyExtractionError};
use log::debug;
use pem_rfc7468::LineEnding;
use std::{fs, path::Path};
use x509_cert::{
    der::{Decode, Encode},
    Certificate,
};

/// PEM label openssl uses for a bare `subjectPublicKeyInfo`.
const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Extract the public key from a DER certificate without leaving the
/// process. The `subjectPublicKeyInfo` is re-encoded as a `PUBLIC KEY` PEM
/// block with 64 column lines so the result matches what `openssl x509
/// -pubkey` prints for the same certificate.
#[derive(Clone, Copy, Debug, Default)]
pub struct X509;

impl ExtractPublicKey for X509 {
    fn extract_public_key(
        &self,
        path: &Path,
    ) -> Result<Vec<String>, KeyExtractionError> {
        let der = fs::read(path).map_err(|source| KeyExtractionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cert = Certificate::from_der(&der)?;
        debug!("certificate subject: {}", cert.tbs_certificate.subject);

        let spki = cert.tbs_certificate.subject_public_key_info.to_der()?;
        let pem =
            pem_rfc7468::encode_string(PUBLIC_KEY_LABEL, LineEnding::LF, &spki)?;

        let lines = key_lines_from_pem(&pem);
        if lines.is_empty() {
            return Err(KeyExtractionError::Empty(path.to_path_buf()));
        }

        Ok(lines)
    }
}
