use std::fs::{read, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use libp2p_identity::Keypair;
use tracing::warn;

/// Reads a protobuf-encoded keypair as written by `keygen`.
pub fn read_keypair(path: &Utf8Path) -> EyreResult<Keypair> {
    let bytes = read(path).wrap_err_with(|| format!("failed to read key from {path:?}"))?;

    Keypair::from_protobuf_encoding(&bytes)
        .wrap_err_with(|| format!("{path:?} does not hold a valid key"))
}

/// Writes `keypair` readable by the owner only. Refuses to replace an
/// existing file unless `force` is set.
pub fn write_keypair(path: &Utf8Path, keypair: &Keypair, force: bool) -> EyreResult<()> {
    let bytes = keypair
        .to_protobuf_encoding()
        .wrap_err("failed to encode key")?;

    let mut options = OpenOptions::new();
    let _options = options.write(true);

    if force {
        let _options = options.create(true).truncate(true);
    } else {
        let _options = options.create_new(true);
    }

    #[cfg(unix)]
    {
        let _options = options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .wrap_err_with(|| format!("failed to create key file {path:?}"))?;

    file.write_all(&bytes)
        .wrap_err_with(|| format!("failed to write key to {path:?}"))
}

/// The key at `path`, or a fresh one when none was given.
pub fn load_or_generate(path: Option<&Utf8Path>, purpose: &str) -> EyreResult<Keypair> {
    match path {
        Some(path) => read_keypair(path),
        None => {
            let keypair = Keypair::generate_ed25519();
            warn!(
                peer_id = %keypair.public().to_peer_id(),
                "No key given, using an ephemeral key as {purpose}"
            );
            Ok(keypair)
        }
    }
}
