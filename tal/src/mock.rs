// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory stand-ins for rsync and openssl. Clones share state so a test
//! can hand one copy to a `Generator` and inspect the other afterwards.

use crate::{ExtractPublicKey, KeyExtractionError, Retrieve, RetrievalError};
use std::{
    cell::{Cell, RefCell},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

/// Writes a canned certificate to the destination instead of fetching
/// anything.
#[derive(Clone, Debug)]
pub struct RetrieveMock {
    cert: Option<Rc<Vec<u8>>>,
    last_dest: Rc<RefCell<Option<PathBuf>>>,
}

impl RetrieveMock {
    pub fn new<C: Into<Vec<u8>>>(cert: C) -> Self {
        RetrieveMock {
            cert: Some(Rc::new(cert.into())),
            last_dest: Rc::new(RefCell::new(None)),
        }
    }

    /// A mock that behaves like a transfer that exits cleanly without
    /// producing a file.
    pub fn failing() -> Self {
        RetrieveMock {
            cert: None,
            last_dest: Rc::new(RefCell::new(None)),
        }
    }

    /// The destination passed to the most recent `retrieve` call.
    pub fn last_dest(&self) -> Option<PathBuf> {
        self.last_dest.borrow().clone()
    }
}

impl Retrieve for RetrieveMock {
    fn retrieve(&self, _url: &str, dest: &Path) -> Result<(), RetrievalError> {
        self.last_dest.replace(Some(dest.to_path_buf()));

        match &self.cert {
            Some(cert) => fs::write(dest, cert.as_slice()).map_err(|source| {
                RetrievalError::Spawn {
                    program: String::from("mock"),
                    source,
                }
            }),
            None => Err(RetrievalError::Missing(dest.to_path_buf())),
        }
    }
}

/// Returns canned key lines for any certificate that exists on disk.
#[derive(Clone, Debug)]
pub struct ExtractMock {
    lines: Rc<Vec<String>>,
    called: Rc<Cell<bool>>,
}

impl ExtractMock {
    pub fn new(lines: Vec<String>) -> Self {
        ExtractMock {
            lines: Rc::new(lines),
            called: Rc::new(Cell::new(false)),
        }
    }

    pub fn called(&self) -> bool {
        self.called.get()
    }
}

impl ExtractPublicKey for ExtractMock {
    fn extract_public_key(
        &self,
        path: &Path,
    ) -> Result<Vec<String>, KeyExtractionError> {
        self.called.set(true);

        if !path.is_file() {
            return Err(KeyExtractionError::Read {
                path: path.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            });
        }
        if self.lines.is_empty() {
            return Err(KeyExtractionError::Empty(path.to_path_buf()));
        }

        Ok(self.lines.as_ref().clone())
    }
}
