//! Ed25519 key generation for token and model signing.
//!
//! Writes a base64 seed (0600 on Unix) and optionally the base64 public key.
//! The seed serves as `AGRICREDIT_TOKEN_SEED_B64` or
//! `AGRICREDIT_MODEL_SIGNING_KEY_B64`; the public key as
//! `AGRICREDIT_MODEL_PUBKEY_B64`.
//!
//! ```bash
//! cargo run --bin keygen -- --out-seed <path> [--out-pub <path>] [--force]
//! ```

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

const USAGE: &str = "Usage: keygen --out-seed <path> [--out-pub <path>] [--force]";

struct Args {
    out_seed: PathBuf,
    out_pub: Option<PathBuf>,
    force: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut out_seed = None;
    let mut out_pub = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-seed" => out_seed = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--out-pub" => out_pub = Some(PathBuf::from(args.next().context(USAGE)?)),
            "--force" => force = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("Unknown argument `{other}`\n{USAGE}"),
        }
    }

    Ok(Args {
        out_seed: out_seed.context(USAGE)?,
        out_pub,
        force,
    })
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Refusing to overwrite existing file {}. Use --force.", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = opts
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(contents)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let verifying_key = SigningKey::from_bytes(&seed).verifying_key();
    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed));
    seed.zeroize();

    write_file(&args.out_seed, seed_b64.as_bytes(), 0o600, args.force)?;
    println!("Wrote signing seed (base64) to {}", args.out_seed.display());

    let pub_b64 = general_purpose::STANDARD.encode(verifying_key.as_bytes());
    if let Some(out_pub) = &args.out_pub {
        write_file(out_pub, pub_b64.as_bytes(), 0o644, args.force)?;
        println!("Wrote public key (base64) to {}", out_pub.display());
    }
    println!("PUBKEY (base64)={pub_b64}");
    Ok(())
}
