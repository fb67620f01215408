use std::fs::write;
use std::io::{stdout, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use iprs_primitives::Record;
use tracing::info;

use crate::keys::load_or_generate;

/// Sign an ordered record pointing at some content
#[derive(Debug, Parser)]
pub struct GenosrCommand {
    /// What the record points at, e.g. /ipfs/<cid>
    #[arg(value_name = "CONTENT")]
    pub target: String,

    /// Signing key, an ephemeral one is used when omitted
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<Utf8PathBuf>,

    /// Order of the record, defaults to the current Unix time
    #[arg(short = 'n', long, value_name = "ORDER")]
    pub order: Option<u64>,

    /// Salt, to publish several names under one key
    #[arg(short, long, default_value = "")]
    pub salt: String,

    /// File to write the record to, stdout when omitted
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,
}

impl GenosrCommand {
    pub fn run(self) -> EyreResult<()> {
        let keypair = load_or_generate(self.key.as_deref(), "signing key")?;

        let order = match self.order {
            Some(order) => order,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .wrap_err("system clock is before the Unix epoch")?
                .as_secs(),
        };

        let record = Record::new(self.target, order).with_salt(self.salt);
        let name = record.name(&keypair.public());
        let envelope = record.encode(&keypair)?;

        eprintln!("Generated record: {name}");

        match self.output {
            Some(path) => {
                write(&path, &envelope)
                    .wrap_err_with(|| format!("failed to write record to {path:?}"))?;
                info!(%path, order, "Wrote record");
            }
            None => stdout()
                .lock()
                .write_all(&envelope)
                .wrap_err("failed to write record to stdout")?,
        }

        Ok(())
    }
}
