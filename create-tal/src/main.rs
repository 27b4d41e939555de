// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{debug, LevelFilter};
use rpki_tal::{ExtractPublicKey, Generator, OpenSsl, Rsync, X509};
use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
};

/// Download a root certificate from an rsync URL and print a Trust Anchor
/// Locator for it.
///
/// Besides the standard (sidr) layout this supports the extended layout
/// used by the RIPE NCC RPKI Validator, which adds a descriptive name and
/// extra rsync URIs to prefetch. The latter helps performance for flat
/// repositories.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// rsync URL pointing to the root certificate.
    #[clap(short, long)]
    url: Option<String>,

    /// Output format, either sidr or ripe.
    #[clap(short, long, default_value = "sidr")]
    output_format: String,

    /// Descriptive name, only used by the ripe format.
    #[clap(short = 'n', long)]
    ca_name: Option<String>,

    /// Additional rsync URI to do a recursive fetch on, only used by the
    /// ripe format.
    #[clap(short, long)]
    prefetch_uri: Option<String>,

    /// How the public key is pulled out of the certificate.
    #[clap(value_enum, long, env = "TAL_EXTRACTOR", default_value_t = Extractor::Openssl)]
    extractor: Extractor,

    /// rsync executable used to fetch the certificate.
    #[clap(long, env = "TAL_RSYNC", default_value = "rsync")]
    rsync: PathBuf,

    /// openssl executable used by the openssl extractor.
    #[clap(long, env = "TAL_OPENSSL", default_value = "openssl")]
    openssl: PathBuf,

    /// verbosity
    #[clap(short, long)]
    verbose: bool,
}

/// An enum of the supported public key extractors.
#[derive(Clone, Debug, ValueEnum)]
enum Extractor {
    /// Run `openssl x509 -pubkey`.
    Openssl,
    /// Decode the certificate in process.
    Native,
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Extractor::Openssl => write!(f, "openssl"),
            Extractor::Native => write!(f, "native"),
        }
    }
}

fn get_extractor(args: &Args) -> Box<dyn ExtractPublicKey> {
    match args.extractor {
        Extractor::Openssl => Box::new(OpenSsl::new(&args.openssl)),
        Extractor::Native => Box::new(X509),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = Builder::from_default_env();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    builder.filter(None, level).init();

    debug!("args: {:?}", args);

    let generator = Generator::new(
        Box::new(Rsync::new(&args.rsync)),
        get_extractor(&args),
    );
    let tal = generator.run(
        args.url.as_deref(),
        &args.output_format,
        args.ca_name.as_deref(),
        args.prefetch_uri.as_deref(),
    )?;

    let mut stdout = io::stdout().lock();
    for line in tal {
        writeln!(stdout, "{line}").context("Write TAL to stdout")?;
    }
    stdout.flush().context("Flush stdout")?;

    Ok(())
}
