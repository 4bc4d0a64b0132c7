//! Model signing utility.
//!
//! Writes `manifest.json` (SHA-256 of `model.json`, serial, timestamp, nonce)
//! and its Ed25519 signature `model.sig` into the model directory.
//!
//! ```bash
//! cargo run --bin sign_model -- <model_dir> [--serial <n>]
//! ```
//!
//! The signing seed is read like every other secret: `AGRICREDIT_MODEL_SIGNING_KEY_B64_FD`,
//! `_FILE`, `/run/secrets/agricredit_model_signing_key_b64`, or the plain
//! variable in debug builds. Serial defaults to the current Unix time, which
//! keeps successive signatures monotonic.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use zeroize::Zeroize;

use agricredit::adapters::model::manifest::{self, Manifest};
use agricredit::config::{self, MODEL_SIGNING_SEED};

const USAGE: &str = "Usage: sign_model <model_dir> [--serial <u64>]";

fn parse_args() -> Result<(PathBuf, Option<u64>)> {
    let mut args = std::env::args().skip(1);
    let mut model_dir = None;
    let mut serial = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().context(USAGE)?;
                serial = Some(v.trim().parse::<u64>().context("--serial must be a u64")?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ if model_dir.is_none() => model_dir = Some(PathBuf::from(arg)),
            _ => bail!(USAGE),
        }
    }

    Ok((model_dir.context(USAGE)?, serial))
}

fn main() -> Result<()> {
    let (model_dir, serial) = parse_args()?;
    let model_dir = if model_dir.is_file() {
        model_dir
            .parent()
            .context("Model path has no parent directory")?
            .to_path_buf()
    } else {
        model_dir
    };
    if !model_dir.join(manifest::MODEL_FILE).exists() {
        bail!("No {} found in {}", manifest::MODEL_FILE, model_dir.display());
    }

    let seed_b64 = MODEL_SIGNING_SEED.require()?;
    let mut seed = config::decode_seed_b64(MODEL_SIGNING_SEED.var, &seed_b64)?;
    let signing_key = SigningKey::from_bytes(&seed);
    seed.zeroize();

    let created_at = chrono::Utc::now().timestamp();
    let serial = serial.unwrap_or(created_at.max(1).unsigned_abs());

    Manifest::for_files(&model_dir, &[manifest::MODEL_FILE], serial, created_at)?
        .write_signed(&model_dir, &signing_key)?;

    println!(
        "Signed {} (serial {serial})",
        model_dir.join(manifest::MANIFEST_FILE).display()
    );
    println!(
        "PUBKEY (base64)={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );
    Ok(())
}
