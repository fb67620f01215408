use camino::Utf8PathBuf;
use clap::Parser;
use eyre::Result as EyreResult;
use iprs_primitives::Name;
use libp2p_identity::Keypair;
use tracing::info;

use crate::keys::write_keypair;

/// Generate an ed25519 key for signing records
#[derive(Debug, Parser)]
pub struct KeygenCommand {
    /// File to write the key to
    #[arg(short, long, value_name = "PATH")]
    pub output: Utf8PathBuf,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

impl KeygenCommand {
    pub fn run(self) -> EyreResult<()> {
        let keypair = Keypair::generate_ed25519();

        write_keypair(&self.output, &keypair, self.force)?;

        let public_key = keypair.public();

        info!(path = %self.output, peer_id = %public_key.to_peer_id(), "Generated key");

        println!("{}", Name::derive(&public_key, ""));

        Ok(())
    }
}
