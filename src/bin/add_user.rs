//! Create a login in the credential store.
//!
//! The password is read from the first line of stdin so it never appears in
//! the process list or shell history.
//!
//! ```bash
//! printf '%s\n' "$PASSWORD" | cargo run --bin add_user -- <username> <role> [--db <path>]
//! ```
//!
//! `<role>` is one of `admin`, `analyst`, `lender`, `farmer`.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

use agricredit::adapters::sqlite::SqliteStorage;
use agricredit::config::DEFAULT_DB_PATH;
use agricredit::domain::{password, Credential, Role};
use agricredit::ports::CredentialStore;

const USAGE: &str = "Usage: add_user <username> <role> [--db <path>]";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut positional = Vec::new();
    let mut db_path = std::env::var("AGRICREDIT_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_path = PathBuf::from(args.next().context(USAGE)?),
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }
    let [username, role] = positional.as_slice() else {
        bail!(USAGE);
    };
    let username = username.trim();
    if username.is_empty() {
        bail!("Username must not be empty");
    }
    let role: Role = role.parse()?;

    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let secret = line.trim_end_matches(['\n', '\r']);

    let credential = Credential {
        username: username.to_string(),
        password_hash: password::hash_password(secret)?,
        role,
    };

    let storage = SqliteStorage::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    storage
        .insert_credential(&credential)
        .with_context(|| format!("Failed to add user {username}"))?;

    println!("Added {username} ({role}) to {}", db_path.display());
    Ok(())
}
