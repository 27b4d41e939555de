// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TalParseError {
    #[error("'ca.name' must be provided")]
    MissingCaName,
    #[error("'certificate.location' must be provided")]
    MissingLocation,
    #[error("'public.key.info' must be provided")]
    MissingPublicKeyInfo,
    #[error("Line {0} is not a 'key = value' pair")]
    MalformedLine(usize),
}

/// A Trust Anchor Locator read back from text in either the SIDR layout
/// (RFC 7730) or the extended `key = value` layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustAnchorLocator {
    pub ca_name: String,
    pub certificate_locations: Vec<String>,
    /// Base64 encoded `subjectPublicKeyInfo` with all whitespace removed.
    pub public_key_info: String,
    pub prefetch_uris: Vec<String>,
}

fn looks_like_uri(s: &str) -> bool {
    s.starts_with("rsync://")
        || s.starts_with("https://")
        || s.starts_with("http://")
}

impl TrustAnchorLocator {
    /// Parse `contents` as a TAL. Text that starts with a URI is read as the
    /// SIDR layout, anything else as the extended layout.
    ///
    /// The SIDR layout has no name field so `ca_name` is used instead
    /// (typically the file stem of the TAL), falling back to a name derived
    /// from the first certificate location.
    pub fn parse(
        contents: &str,
        ca_name: Option<&str>,
    ) -> Result<Self, TalParseError> {
        let tal = if looks_like_uri(contents.trim()) {
            debug!("parsing TAL in sidr format");
            Self::parse_sidr(contents, ca_name)?
        } else {
            debug!("parsing TAL in ripe format");
            Self::parse_ripe(contents)?
        };

        if tal.ca_name.is_empty() {
            return Err(TalParseError::MissingCaName);
        }
        if tal.public_key_info.is_empty() {
            return Err(TalParseError::MissingPublicKeyInfo);
        }

        Ok(tal)
    }

    fn parse_sidr(
        contents: &str,
        ca_name: Option<&str>,
    ) -> Result<Self, TalParseError> {
        let mut lines = contents.lines().map(str::trim).peekable();

        let mut certificate_locations = Vec::new();
        while let Some(uri) = lines.next_if(|l| looks_like_uri(l)) {
            certificate_locations.push(uri.to_string());
        }

        let first = certificate_locations
            .first()
            .ok_or(TalParseError::MissingLocation)?;
        let ca_name = match ca_name {
            Some(name) => name.to_string(),
            None => format!("TAL imported from {first}"),
        };

        Ok(TrustAnchorLocator {
            ca_name,
            certificate_locations,
            public_key_info: lines.collect(),
            prefetch_uris: Vec::new(),
        })
    }

    fn parse_ripe(contents: &str) -> Result<Self, TalParseError> {
        let mut ca_name = None;
        let mut location = None;
        let mut public_key_info = String::new();
        let mut prefetch_uris = Vec::new();

        for (number, line) in logical_lines(contents) {
            let (key, value) = split_property(&line)
                .ok_or(TalParseError::MalformedLine(number))?;

            match key {
                "ca.name" => ca_name = Some(value.to_string()),
                "certificate.location" => location = Some(value.to_string()),
                "public.key.info" => {
                    public_key_info =
                        value.chars().filter(|c| !c.is_whitespace()).collect()
                }
                "prefetch.uris" => prefetch_uris = split_prefetch_uris(value),
                other => debug!("ignoring unknown TAL key: {other}"),
            }
        }

        let location = location
            .filter(|l| !l.is_empty())
            .ok_or(TalParseError::MissingLocation)?;

        Ok(TrustAnchorLocator {
            ca_name: ca_name.ok_or(TalParseError::MissingCaName)?,
            certificate_locations: vec![location],
            public_key_info,
            prefetch_uris,
        })
    }
}

/// Join the extended layout into logical lines, each paired with the
/// 1-based number of the line it starts on. Blank lines and lines starting
/// with `#` or `!` are skipped. A line ending in an odd number of
/// backslashes continues on the next line, whose leading whitespace is
/// dropped.
fn logical_lines(contents: &str) -> Vec<(usize, String)> {
    let mut logical = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, line) in contents.lines().enumerate() {
        let (number, mut text) = match pending.take() {
            Some((number, text)) => (number, text + line.trim_start()),
            None => {
                let line = line.trim_start();
                if line.is_empty()
                    || line.starts_with('#')
                    || line.starts_with('!')
                {
                    continue;
                }
                (index + 1, line.to_string())
            }
        };

        let backslashes =
            text.chars().rev().take_while(|c| *c == '\\').count();
        if backslashes % 2 == 1 {
            text.pop();
            pending = Some((number, text));
        } else {
            logical.push((number, text));
        }
    }

    // A continuation on the last line has nothing left to join.
    logical.extend(pending);
    logical
}

/// Split a logical line into key and value. The key ends at the first `=`,
/// `:` or whitespace. Whitespace around the separator is skipped, so
/// `key = value`, `key:value` and `key value` are all accepted. A line with
/// no separator at all has no value and is rejected.
fn split_property(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let end = line.find(|c: char| c == '=' || c == ':' || c.is_whitespace())?;
    let (key, rest) = line.split_at(end);

    let rest = rest.trim_start();
    let rest = match rest.strip_prefix(|c: char| c == '=' || c == ':') {
        Some(r) => r.trim_start(),
        None => rest,
    };

    Some((key, rest))
}

/// Prefetch URIs are a comma separated list. rsync URIs name a directory to
/// fetch recursively so they always end with `/`.
fn split_prefetch_uris(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| {
            if u.starts_with("rsync://") && !u.ends_with('/') {
                format!("{u}/")
            } else {
                u.to_string()
            }
        })
        .collect()
}
