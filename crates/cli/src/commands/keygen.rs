use warden_engine::{LocalSigner, Signer as _};

use super::fail;
use crate::OutputFormat;

/// Generate a secp256k1 key and write `<prefix>.secret` (base64 secret,
/// mode 0600 on Unix) and `<prefix>.addr`.
pub(crate) fn cmd_keygen(prefix: &str, output: OutputFormat, quiet: bool) {
    let signer = LocalSigner::random();
    let (secret, addr) = match signer.write_key_files(prefix) {
        Ok(paths) => paths,
        Err(e) => fail(&e, output, quiet),
    };

    match output {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "address": signer.address().to_string(),
                "secret": secret.display().to_string(),
                "addressFile": addr.display().to_string(),
            })
        ),
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "Generated secp256k1 key {}: {}, {}",
                    signer.address(),
                    secret.display(),
                    addr.display()
                );
            }
        }
    }
}
