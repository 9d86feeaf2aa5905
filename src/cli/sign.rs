//! Sign command - compute the `X-Hub-Signature-256` value for a request body
//!
//! Handy for replaying deliveries with curl against a running service.

use anstream::println;
use mergequeue::error::{Error, Result};
use mergequeue::webhook::SignatureVerifier;
use secrecy::SecretString;
use std::io::Read;
use std::path::Path;

/// Run the sign command
///
/// `body` is a file path, or `-` for stdin.
pub fn run_sign(body: &Path, secret: SecretString) -> Result<()> {
    let payload = if body == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        std::fs::read(body)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", body.display())))?
    };

    let verifier = SignatureVerifier::new(secret)?;
    println!("{}", verifier.sign(&payload));
    Ok(())
}
