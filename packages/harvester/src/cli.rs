//! Command-line interface for the harvester.
//!
//! The CLI works offline: it checks credentials, normalizes documents that
//! are already on disk, and explains remote codes. Online synchronization
//! needs a transport and is left to the host application.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use zeroize::Zeroizing;

use crate::cfdi::{cfdi_usage_info, normalize_package};
use crate::credential::Credential;
use crate::error::{HarvesterError, Result};
use crate::package::read_archive;
use crate::taxonomy::lookup;
use crate::types::InvoiceRecord;

/// Environment variable read for the key passphrase by default.
pub const DEFAULT_PASSWORD_ENV: &str = "CFDI_KEY_PASSWORD";

/// CFDI Harvester - Retrieve and normalize Mexican electronic invoices.
#[derive(Parser)]
#[command(name = "cfdi-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load an e.firma certificate and key and show who they belong to.
    CheckCredential {
        /// DER certificate (.cer)
        #[arg(long)]
        cer: PathBuf,

        /// Encrypted PKCS#8 private key (.key)
        #[arg(long)]
        key: PathBuf,

        /// Environment variable holding the key passphrase
        #[arg(long, default_value = DEFAULT_PASSWORD_ENV)]
        password_env: String,
    },

    /// Normalize CFDI XML files, zip packages, or directories of them.
    Parse {
        /// Files or directories to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Write the records as YAML to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Explain a remote status code or a CFDI-usage code.
    Explain {
        /// Code to look up (e.g., 5003 or G03)
        code: String,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckCredential {
            cer,
            key,
            password_env,
        } => check_credential_command(&cer, &key, &password_env),
        Commands::Parse { paths, output } => parse_command(&paths, output.as_deref()),
        Commands::Explain { code } => explain_command(&code),
    }
}

fn check_credential_command(cer: &Path, key: &Path, password_env: &str) -> Result<()> {
    let passphrase = std::env::var(password_env)
        .map(Zeroizing::new)
        .map_err(|_| HarvesterError::MissingEnv(password_env.to_string()))?;
    let certificate = fs::read(cer)?;
    let private_key = Zeroizing::new(fs::read(key)?);

    let credential = Credential::load(&certificate, &private_key, passphrase)?;

    println!(
        "{} {}",
        style("Credential OK:").green().bold(),
        style(credential.rfc()).cyan()
    );
    println!("  Certificate: {}", credential.certificate_number());
    if let Some(valid_until) = credential.valid_until() {
        println!("  Valid until: {}", valid_until.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

/// Documents read from disk, plus archives that could not be opened.
#[derive(Debug, Default)]
struct Collected {
    documents: Vec<Vec<u8>>,
    unreadable_packages: usize,
}

fn collect_documents(path: &Path, collected: &mut Collected) -> Result<()> {
    if path.is_dir() {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for entry in entries {
            collect_documents(&entry, collected)?;
        }
        return Ok(());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("xml") => collected.documents.push(fs::read(path)?),
        Some("zip") => match read_archive(&fs::read(path)?) {
            Ok(documents) => collected.documents.extend(documents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable package");
                collected.unreadable_packages += 1;
            }
        },
        _ => tracing::debug!(path = %path.display(), "ignoring file"),
    }
    Ok(())
}

fn parse_command(paths: &[PathBuf], output: Option<&Path>) -> Result<()> {
    for path in paths {
        if !path.exists() {
            return Err(HarvesterError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path does not exist: {}", path.display()),
            )));
        }
    }

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    pb.set_message("Reading documents...");
    let mut collected = Collected::default();
    for path in paths {
        if let Err(e) = collect_documents(path, &mut collected) {
            pb.finish_and_clear();
            return Err(e);
        }
    }

    pb.set_message("Normalizing documents...");
    let result = normalize_package(&collected.documents);
    pb.finish_and_clear();

    println!("{} {}", style("Documents:").bold(), collected.documents.len());
    println!("  Records: {}", style(result.records.len()).green());
    if result.unstamped > 0 {
        println!("  Without stamp UUID: {}", style(result.unstamped).yellow().bold());
    }
    if result.malformed > 0 {
        println!("  Malformed: {}", style(result.malformed).yellow().bold());
    }
    if collected.unreadable_packages > 0 {
        println!(
            "  Unreadable packages: {}",
            style(collected.unreadable_packages).yellow().bold()
        );
    }

    if let Some(output) = output {
        save_records(&result.records, output)?;
        println!();
        println!("{} {}", style("Saved to:").green().bold(), output.display());
    }

    Ok(())
}

/// Write records as a YAML sequence.
pub fn save_records(records: &[InvoiceRecord], output: &Path) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(records)?;
    fs::write(output, yaml)?;
    Ok(())
}

fn explain_command(code: &str) -> Result<()> {
    if let Some(entry) = lookup(code) {
        println!("{} {}", style("Code").bold(), style(entry.code).cyan());
        println!("  Category: {}", entry.category);
        println!("  Fatal: {}", if entry.category.is_fatal() { "yes" } else { "no" });
        println!("  Meaning: {}", entry.message);
        println!("  Remediation: {}", entry.remediation);
        return Ok(());
    }

    if let Some(usage) = cfdi_usage_info(code) {
        println!("{} {}", style("CFDI usage").bold(), style(usage.code).cyan());
        println!("  Description: {}", usage.description);
        println!("  Category: {}", usage.category);
        println!("  Tax implication: {}", usage.tax_implication);
        println!("  Guide: {}", usage.guide);
        return Ok(());
    }

    Err(HarvesterError::UnknownCode(code.trim().to_string()))
}
