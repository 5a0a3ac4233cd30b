//! # Certificate Subcommand
//!
//! Inspect an endpoint or SMP certificate before it is stored.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use smp_core::certificate::CertificateInfo;
use smp_core::Certificate;

/// Arguments for the `smp cert` subcommand.
#[derive(Args, Debug)]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommand,
}

/// Certificate subcommands.
#[derive(Subcommand, Debug)]
pub enum CertCommand {
    /// Print subject, issuer, serial and validity of a PEM or base64 certificate.
    Inspect {
        /// Certificate file.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Execute the cert subcommand.
///
/// Returns exit code 1 when the certificate is not valid right now.
pub fn run_cert(args: &CertArgs) -> Result<u8> {
    match &args.command {
        CertCommand::Inspect { file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let info = Certificate::parse(&text)
                .and_then(|cert| cert.info())
                .with_context(|| format!("{} is not a valid certificate", file.display()))?;
            let now = Utc::now();
            println!("{}", describe(&info, now));
            Ok(if info.is_valid_at(now) { 0 } else { 1 })
        }
    }
}

/// Human-readable summary of `info` as of `now`.
pub fn describe(info: &CertificateInfo, now: DateTime<Utc>) -> String {
    let status = if now < info.not_before {
        "not yet valid"
    } else if now > info.not_after {
        "expired"
    } else {
        "valid"
    };
    format!(
        "Subject:    {}\nIssuer:     {}\nSerial:     {}\nNot before: {}\nNot after:  {}\nStatus:     {status}",
        info.subject,
        info.issuer,
        info.serial,
        info.not_before.to_rfc3339(),
        info.not_after.to_rfc3339(),
    )
}
