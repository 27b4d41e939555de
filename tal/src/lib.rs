// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::{debug, info, warn};
use std::{
    fmt::{self, Formatter},
    io,
    path::{Path, PathBuf},
    process::ExitStatus,
    str::FromStr,
    string::FromUtf8Error,
};
use thiserror::Error;
use x509_cert::der;

pub mod locator;
pub mod openssl;
pub mod rsync;
pub mod x509;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use locator::{TalParseError, TrustAnchorLocator};
pub use openssl::OpenSsl;
pub use rsync::{RetrievalError, Rsync};
pub use x509::X509;

/// File name given to the fetched certificate inside the per-run working
/// directory.
const ARTIFACT_NAME: &str = "root.cer";

/// `TalError` describes everything that can end a TAL generation run. None
/// of these are recoverable: the run stops and nothing is emitted.
#[derive(Debug, Error)]
pub enum TalError {
    #[error("No URL specified. Use -h for help.")]
    MissingUrl,
    #[error("Unknown output format {0}. Please try again with sidr or ripe")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    KeyExtraction(#[from] KeyExtractionError),
    #[error("Failed to create working directory: {0}")]
    TempDir(io::Error),
}

/// Errors produced while pulling the public key out of a fetched
/// certificate.
#[derive(Debug, Error)]
pub enum KeyExtractionError {
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
    #[error("Public key output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("Failed to read certificate {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to decode DER certificate: {0}")]
    Der(#[from] der::Error),
    #[error("Failed to PEM encode public key: {0}")]
    Pem(#[from] pem_rfc7468::Error),
    #[error("No public key found for certificate {}", .0.display())]
    Empty(PathBuf),
}

/// The `Retrieve` trait is implemented by types that can copy the resource
/// named by a URL to a local path.
pub trait Retrieve {
    /// Copy the resource at `url` to `dest`, creating or overwriting it.
    fn retrieve(&self, url: &str, dest: &Path) -> Result<(), RetrievalError>;
}

/// The `ExtractPublicKey` trait is implemented by types that read a DER
/// encoded certificate and produce the base64 body of its `PUBLIC KEY` PEM
/// block, one line per element and without the BEGIN / END delimiters.
/// Implementations return `KeyExtractionError::Empty` rather than an empty
/// list.
pub trait ExtractPublicKey {
    fn extract_public_key(
        &self,
        path: &Path,
    ) -> Result<Vec<String>, KeyExtractionError>;
}

/// Reduce PEM text to the lines of its base64 body. Lines starting with
/// `-----BEGIN` or `-----END` are dropped, every other line is trimmed and
/// lines left empty are skipped.
pub fn key_lines_from_pem(pem: &str) -> Vec<String> {
    pem.lines()
        .map(str::trim)
        .filter(|l| {
            !(l.starts_with("-----BEGIN") || l.starts_with("-----END"))
        })
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// The TAL layouts we know how to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// The IETF SIDR layout: the certificate URI on the first line followed
    /// by the base64 encoded public key.
    Sidr,
    /// The extended `key = value` layout understood by the RIPE NCC
    /// validator. It adds a display name and prefetch URIs for trust
    /// anchors published in flat repositories.
    Ripe,
}

impl FromStr for Format {
    type Err = TalError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "sidr" => Ok(Format::Sidr),
            "ripe" => Ok(Format::Ripe),
            _ => Err(TalError::UnsupportedFormat(input.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Format::Sidr => write!(f, "sidr"),
            Format::Ripe => write!(f, "ripe"),
        }
    }
}

impl Format {
    /// Lay out the TAL for `url` and `key_lines` in this format. `ca_name`
    /// and `prefetch_uri` only have a place in the `ripe` layout.
    pub fn render(
        &self,
        url: &str,
        key_lines: &[String],
        ca_name: Option<&str>,
        prefetch_uri: Option<&str>,
    ) -> Vec<String> {
        match self {
            Format::Sidr => {
                if ca_name.is_some() || prefetch_uri.is_some() {
                    warn!("ca name and prefetch uri ignored by sidr format");
                }
                format_sidr(url, key_lines)
            }
            Format::Ripe => format_ripe(url, key_lines, ca_name, prefetch_uri),
        }
    }
}

/// Produce a TAL in the SIDR layout: the URL then each key line verbatim.
pub fn format_sidr(url: &str, key_lines: &[String]) -> Vec<String> {
    let mut lines = Vec::with_capacity(key_lines.len() + 1);
    lines.push(url.to_string());
    lines.extend(key_lines.iter().cloned());
    lines
}

/// Produce a TAL in the RIPE layout. Empty `ca_name` and `prefetch_uri`
/// values are treated the same as absent ones.
pub fn format_ripe(
    url: &str,
    key_lines: &[String],
    ca_name: Option<&str>,
    prefetch_uri: Option<&str>,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(4);
    match ca_name.filter(|n| !n.is_empty()) {
        Some(name) => lines.push(format!("ca.name = {name}")),
        None => lines.push(format!("ca.name = TAL imported from {url}")),
    }
    lines.push(format!("certificate.location = {url}"));
    lines.push(format!("public.key.info = {}", key_lines.concat()));
    if let Some(uri) = prefetch_uri.filter(|u| !u.is_empty()) {
        lines.push(format!("prefetch.uris = {uri}"));
    }
    lines
}

/// `Generator` ties a `Retrieve` and an `ExtractPublicKey` implementation
/// together to turn a certificate URL into a TAL.
pub struct Generator {
    retriever: Box<dyn Retrieve>,
    extractor: Box<dyn ExtractPublicKey>,
}

impl Generator {
    pub fn new(
        retriever: Box<dyn Retrieve>,
        extractor: Box<dyn ExtractPublicKey>,
    ) -> Self {
        Generator {
            retriever,
            extractor,
        }
    }

    /// Fetch the certificate at `url`, extract its public key and lay it
    /// out as a TAL in the named format.
    ///
    /// The URL and format are checked before anything is fetched. The
    /// certificate is written to a fresh temporary directory that is
    /// removed before this function returns, whether it succeeds or not.
    pub fn run(
        &self,
        url: Option<&str>,
        format: &str,
        ca_name: Option<&str>,
        prefetch_uri: Option<&str>,
    ) -> Result<Vec<String>, TalError> {
        let url =
            url.filter(|u| !u.is_empty()).ok_or(TalError::MissingUrl)?;
        let format = Format::from_str(format)?;

        let work_dir = tempfile::Builder::new()
            .prefix("create-tal-")
            .tempdir()
            .map_err(TalError::TempDir)?;
        let artifact = work_dir.path().join(ARTIFACT_NAME);

        info!("fetching root certificate from {url}");
        self.retriever.retrieve(url, &artifact)?;
        debug!("certificate written to {}", artifact.display());

        let key_lines = self.extractor.extract_public_key(&artifact)?;
        debug!("public key: {}", key_lines.concat());

        Ok(format.render(url, &key_lines, ca_name, prefetch_uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ExtractMock, RetrieveMock};

    const URL: &str = "rsync://example.org/repo/root.cer";
    const CERT: &[u8] = include_bytes!("../data/root.cer");
    const PUBKEY_PEM: &str = include_str!("../data/root-pubkey.pem");

    fn key_lines() -> Vec<String> {
        vec![String::from("MIIB..."), String::from("AQAB")]
    }

    fn count_prefixed(lines: &[String], prefix: &str) -> usize {
        lines.iter().filter(|l| l.starts_with(prefix)).count()
    }

    #[test]
    fn key_lines_strip_delimiters() {
        let pem =
            "-----BEGIN PUBLIC KEY-----\nAAAA\nBBBB\n-----END PUBLIC KEY-----";
        assert_eq!(key_lines_from_pem(pem), vec!["AAAA", "BBBB"]);
    }

    #[test]
    fn key_lines_trim_and_skip_blank() {
        let pem = "-----BEGIN PUBLIC KEY-----\r\n  AAAA \r\n\tBBBB\r\n-----END PUBLIC KEY-----\r\n\n";
        assert_eq!(key_lines_from_pem(pem), vec!["AAAA", "BBBB"]);
    }

    #[test]
    fn key_lines_from_empty_output() {
        assert!(key_lines_from_pem("").is_empty());
    }

    #[test]
    fn format_from_str() {
        assert_eq!(Format::from_str("sidr").unwrap(), Format::Sidr);
        assert_eq!(Format::from_str("ripe").unwrap(), Format::Ripe);
    }

    #[test]
    fn format_from_str_is_case_sensitive() {
        for name in ["SIDR", "Ripe", "garbage", ""] {
            match Format::from_str(name) {
                Err(TalError::UnsupportedFormat(n)) => assert_eq!(n, name),
                r => panic!("unexpected result for {name:?}: {r:?}"),
            }
        }
    }

    #[test]
    fn sidr_is_url_then_key_lines() {
        let lines = key_lines_from_pem(PUBKEY_PEM);
        let tal = format_sidr(URL, &lines);

        assert_eq!(tal[0], URL);
        assert_eq!(&tal[1..], &lines[..]);
    }

    #[test]
    fn ripe_has_one_location_and_key() {
        let lines = key_lines_from_pem(PUBKEY_PEM);
        let tal = format_ripe(URL, &lines, Some("Test TA"), Some(URL));

        assert_eq!(count_prefixed(&tal, "certificate.location = "), 1);
        assert_eq!(count_prefixed(&tal, "public.key.info = "), 1);
        assert_eq!(tal[1], format!("certificate.location = {URL}"));
        assert_eq!(tal[2], format!("public.key.info = {}", lines.concat()));
    }

    #[test]
    fn ripe_ca_name() {
        let tal = format_ripe(URL, &key_lines(), Some("Test TA"), None);
        assert_eq!(tal[0], "ca.name = Test TA");

        let tal = format_ripe(URL, &key_lines(), None, None);
        assert_eq!(tal[0], format!("ca.name = TAL imported from {URL}"));

        let tal = format_ripe(URL, &key_lines(), Some(""), None);
        assert_eq!(tal[0], format!("ca.name = TAL imported from {URL}"));
    }

    #[test]
    fn ripe_prefetch_only_when_non_empty() {
        let prefetch = "rsync://example.org/repo/";

        let tal = format_ripe(URL, &key_lines(), None, Some(prefetch));
        assert_eq!(tal.len(), 4);
        assert_eq!(tal[3], format!("prefetch.uris = {prefetch}"));

        let tal = format_ripe(URL, &key_lines(), None, Some(""));
        assert_eq!(tal.len(), 3);
        assert_eq!(count_prefixed(&tal, "prefetch.uris"), 0);

        let tal = format_ripe(URL, &key_lines(), None, None);
        assert_eq!(tal.len(), 3);
        assert_eq!(count_prefixed(&tal, "prefetch.uris"), 0);
    }

    #[test]
    fn render_sidr_ignores_ripe_fields() {
        let tal =
            Format::Sidr.render(URL, &key_lines(), Some("name"), Some(URL));
        assert_eq!(tal, format_sidr(URL, &key_lines()));
    }

    #[test]
    fn run_sidr_end_to_end() {
        let generator = Generator::new(
            Box::new(RetrieveMock::new(CERT)),
            Box::new(ExtractMock::new(key_lines())),
        );
        let tal = generator.run(Some(URL), "sidr", None, None).unwrap();

        assert_eq!(tal.join("\n"), format!("{URL}\nMIIB...\nAQAB"));
    }

    #[test]
    fn run_ripe_with_x509() {
        let generator = Generator::new(
            Box::new(RetrieveMock::new(CERT)),
            Box::new(X509),
        );
        let tal = generator
            .run(Some(URL), "ripe", Some("Test TA"), Some(URL))
            .unwrap();

        let expected = key_lines_from_pem(PUBKEY_PEM).concat();
        assert_eq!(
            tal,
            vec![
                String::from("ca.name = Test TA"),
                format!("certificate.location = {URL}"),
                format!("public.key.info = {expected}"),
                format!("prefetch.uris = {URL}"),
            ]
        );
    }

    #[test]
    fn run_missing_url_does_no_work() {
        for url in [None, Some("")] {
            let retriever = RetrieveMock::new(CERT);
            let generator = Generator::new(
                Box::new(retriever.clone()),
                Box::new(ExtractMock::new(key_lines())),
            );
            let result = generator.run(url, "sidr", None, None);

            assert!(matches!(result, Err(TalError::MissingUrl)));
            assert_eq!(retriever.last_dest(), None);
        }
    }

    #[test]
    fn run_unsupported_format_does_no_work() {
        let retriever = RetrieveMock::new(CERT);
        let generator = Generator::new(
            Box::new(retriever.clone()),
            Box::new(ExtractMock::new(key_lines())),
        );
        let result = generator.run(Some(URL), "garbage", None, None);

        assert!(matches!(result, Err(TalError::UnsupportedFormat(_))));
        assert_eq!(retriever.last_dest(), None);
    }

    #[test]
    fn run_retrieval_failure_skips_extraction() {
        let extractor = ExtractMock::new(key_lines());
        let generator = Generator::new(
            Box::new(RetrieveMock::failing()),
            Box::new(extractor.clone()),
        );
        let result = generator.run(Some(URL), "sidr", None, None);

        assert!(matches!(result, Err(TalError::Retrieval(_))));
        assert!(!extractor.called());
    }

    #[test]
    fn run_empty_key_is_an_error() {
        let generator = Generator::new(
            Box::new(RetrieveMock::new(CERT)),
            Box::new(ExtractMock::new(Vec::new())),
        );
        let result = generator.run(Some(URL), "sidr", None, None);

        assert!(matches!(
            result,
            Err(TalError::KeyExtraction(KeyExtractionError::Empty(_)))
        ));
    }

    #[test]
    fn run_removes_work_dir() {
        let retriever = RetrieveMock::new(CERT);
        let generator = Generator::new(
            Box::new(retriever.clone()),
            Box::new(ExtractMock::new(key_lines())),
        );
        generator.run(Some(URL), "sidr", None, None).unwrap();

        let dest = retriever.last_dest().unwrap();
        assert!(!dest.exists());
        assert!(!dest.parent().unwrap().exists());
    }

    #[test]
    fn run_removes_work_dir_on_failure() {
        let retriever = RetrieveMock::new(b"not a certificate".to_vec());
        let generator =
            Generator::new(Box::new(retriever.clone()), Box::new(X509));
        let result = generator.run(Some(URL), "sidr", None, None);

        assert!(matches!(
            result,
            Err(TalError::KeyExtraction(KeyExtractionError::Der(_)))
        ));
        let dest = retriever.last_dest().unwrap();
        assert!(!dest.parent().unwrap().exists());
    }

    #[test]
    fn generated_tals_parse_back() {
        for format in ["sidr", "ripe"] {
            let generator = Generator::new(
                Box::new(RetrieveMock::new(CERT)),
                Box::new(X509),
            );
            let tal = generator.run(Some(URL), format, None, None).unwrap();
            let tal =
                TrustAnchorLocator::parse(&tal.join("\n"), None).unwrap();

            assert_eq!(tal.certificate_locations, vec![URL]);
            assert_eq!(
                tal.public_key_info,
                key_lines_from_pem(PUBKEY_PEM).concat()
            );
            assert_eq!(tal.ca_name, format!("TAL imported from {URL}"));
        }
    }
}
