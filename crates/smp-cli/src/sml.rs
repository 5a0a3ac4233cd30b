//! # SML Subcommand
//!
//! Registration of this SMP at the SML. The SMP ID and client certificate
//! come from the environment (`SMP_ID`, `SML_CLIENT_CERT_PEM`,
//! `SML_CLIENT_KEY_PEM`); the SML itself is chosen by `--sml-info` or by the
//! selection stored in the settings.
//!
//! `smp sml validate` only checks the addresses and needs neither.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use smp_api::state::AppState;
use smp_client::{validate_smp_addresses, SmlClient, SmlClientConfig};
use smp_registry::sml_registration::SmlRegistration;

use crate::{open_state, runtime, CLI_ACTOR};

/// Arguments for the `smp sml` subcommand.
#[derive(Args, Debug)]
pub struct SmlArgs {
    #[command(subcommand)]
    pub command: SmlCommand,
}

/// SML subcommands.
#[derive(Subcommand, Debug)]
pub enum SmlCommand {
    /// Check physical and logical address without contacting the SML.
    Validate {
        /// IPv4 address of the SMP.
        #[arg(long)]
        physical: String,
        /// `http://` URL of the SMP on port 80 without path.
        #[arg(long)]
        logical: String,
    },

    /// Register this SMP at the SML.
    Register {
        /// IPv4 address of the SMP.
        #[arg(long)]
        physical: String,
        /// `http://` URL of the SMP on port 80 without path.
        #[arg(long)]
        logical: String,
        /// SML configuration ID. Defaults to the one selected in the settings.
        #[arg(long, value_name = "ID")]
        sml_info: Option<String>,
    },

    /// Change the addresses of the registered SMP.
    Update {
        /// IPv4 address of the SMP.
        #[arg(long)]
        physical: String,
        /// `http://` URL of the SMP on port 80 without path.
        #[arg(long)]
        logical: String,
    },

    /// Remove this SMP and all its participants from the SML.
    Unregister,

    /// Resolve the DNS name the SML publishes for this SMP.
    Checkdns,
}

/// Execute the sml subcommand.
pub fn run_sml(args: &SmlArgs, data_dir: &Path) -> Result<u8> {
    if let SmlCommand::Validate { physical, logical } = &args.command {
        return Ok(validate(physical, logical));
    }

    let client = match SmlClientConfig::from_env() {
        Ok(config) => Some(SmlClient::new(&config).context("failed to create the SML client")?),
        Err(e) => {
            tracing::warn!("SML client not configured: {e}");
            None
        }
    };
    let state = open_state(data_dir, client)?;
    runtime()?.block_on(execute(&args.command, &state))
}

fn validate(physical: &str, logical: &str) -> u8 {
    match validate_smp_addresses(physical, logical) {
        Ok(addresses) => {
            println!(
                "OK: physical address {}, logical address {}",
                addresses.physical, addresses.logical
            );
            0
        }
        Err(errors) => {
            for error in errors.iter() {
                println!("{}: {}", error.field, error.message);
            }
            1
        }
    }
}

/// Run a registration command against an opened state.
pub async fn execute(command: &SmlCommand, state: &AppState) -> Result<u8> {
    let registry = state.registry.sml_registration();
    match command {
        SmlCommand::Validate { physical, logical } => Ok(validate(physical, logical)),
        SmlCommand::Register {
            physical,
            logical,
            sml_info,
        } => {
            let smp_id = state.sml.smp_id().context("SMP_ID is not set")?;
            let registration = registry
                .register(CLI_ACTOR, smp_id, physical, logical, sml_info.as_deref())
                .await
                .context("SML registration failed")?;
            print_registration(&registration);
            Ok(0)
        }
        SmlCommand::Update { physical, logical } => {
            let registration = registry
                .update(CLI_ACTOR, physical, logical)
                .await
                .context("SML update failed")?;
            print_registration(&registration);
            Ok(0)
        }
        SmlCommand::Unregister => {
            let registration = registry
                .unregister(CLI_ACTOR)
                .await
                .context("SML unregistration failed")?;
            print_registration(&registration);
            Ok(0)
        }
        SmlCommand::Checkdns => {
            let SmlRegistration::Registered {
                smp_id,
                sml_info_id,
                ..
            } = registry.state()
            else {
                bail!("the SMP is not registered at the SML");
            };
            let sml = state
                .registry
                .sml_infos()
                .get(&sml_info_id)
                .with_context(|| format!("SML configuration '{sml_info_id}' no longer exists"))?;
            let status = state.dns.check_smp(&smp_id, &sml).await;
            if status.registered {
                let addresses: Vec<String> =
                    status.addresses.iter().map(ToString::to_string).collect();
                println!("{} resolves to {}", status.host, addresses.join(", "));
                Ok(0)
            } else {
                println!("{} does not resolve", status.host);
                Ok(1)
            }
        }
    }
}

fn print_registration(registration: &SmlRegistration) {
    match serde_json::to_string_pretty(registration) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "failed to render the registration state"),
    }
}
