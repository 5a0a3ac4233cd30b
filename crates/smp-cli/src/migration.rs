//! # Migration Subcommand
//!
//! Participant migration between SMPs. On the source SMP, `start` prints
//! the migration key to hand over; once the target ran `inbound` with that
//! key, `finalize` deletes the local service group (or `cancel` gives up).
//! Every command except `list`, `show`, `delete` and `export` talks to the
//! SML and needs the same environment as `smp sml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use smp_api::state::AppState;
use smp_client::{SmlClient, SmlClientConfig};
use smp_registry::migration::{InboundMigrationInput, MigrationState, ParticipantMigration};

use crate::{open_state, runtime, CLI_ACTOR};

/// Arguments for the `smp migration` subcommand.
#[derive(Args, Debug)]
pub struct MigrationArgs {
    #[command(subcommand)]
    pub command: MigrationCommand,
}

/// Which migrations to list.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// State filter of `list`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateFilter {
    InProgress,
    Migrated,
    Cancelled,
}

impl From<StateFilter> for MigrationState {
    fn from(filter: StateFilter) -> Self {
        match filter {
            StateFilter::InProgress => Self::InProgress,
            StateFilter::Migrated => Self::Migrated,
            StateFilter::Cancelled => Self::Cancelled,
        }
    }
}

/// Migration subcommands.
#[derive(Subcommand, Debug)]
pub enum MigrationCommand {
    /// Announce an outbound migration at the SML and print the key.
    Start {
        /// Participant identifier as `scheme::value`.
        participant: String,
    },

    /// Abandon an outbound migration.
    Cancel {
        /// Migration ID.
        id: String,
    },

    /// Complete an outbound migration and delete the local service group.
    Finalize {
        /// Migration ID.
        id: String,
    },

    /// Take over a participant with the key received from its current SMP.
    Inbound {
        /// Participant identifier as `scheme::value`.
        participant: String,
        /// Migration key.
        #[arg(long)]
        key: String,
        /// Owner of the service group created here.
        #[arg(long)]
        owner: String,
    },

    /// List migrations.
    List {
        #[arg(value_enum, default_value = "outbound")]
        direction: Direction,
        /// Only migrations in this state.
        #[arg(long, value_enum)]
        state: Option<StateFilter>,
    },

    /// Print one migration as JSON.
    Show {
        /// Migration ID.
        id: String,
    },

    /// Forget a migration record. The service group stays.
    Delete {
        /// Migration ID.
        id: String,
    },

    /// Export the service groups of outbound migrations in progress.
    Export {
        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

impl MigrationCommand {
    fn needs_sml(&self) -> bool {
        matches!(
            self,
            Self::Start { .. } | Self::Cancel { .. } | Self::Finalize { .. } | Self::Inbound { .. }
        )
    }
}

/// Execute the migration subcommand.
pub fn run_migration(args: &MigrationArgs, data_dir: &Path) -> Result<u8> {
    let client = if args.command.needs_sml() {
        match SmlClientConfig::from_env() {
            Ok(config) => {
                Some(SmlClient::new(&config).context("failed to create the SML client")?)
            }
            Err(e) => {
                tracing::warn!("SML client not configured: {e}");
                None
            }
        }
    } else {
        None
    };
    let state = open_state(data_dir, client)?;
    runtime()?.block_on(execute(&args.command, &state))
}

/// Run a migration command against an opened state.
pub async fn execute(command: &MigrationCommand, state: &AppState) -> Result<u8> {
    let registry = state.registry.participant_migrations();
    match command {
        MigrationCommand::Start { participant } => {
            let participant = state
                .registry
                .policy()
                .parse_participant(participant)
                .with_context(|| format!("invalid participant '{participant}'"))?;
            let migration = registry
                .start_outbound(CLI_ACTOR, &participant)
                .await
                .context("failed to start the migration")?;
            println!("Migration {} started for {}", migration.id, migration.participant_id);
            println!("Migration key: {}", migration.migration_key);
            Ok(0)
        }
        MigrationCommand::Cancel { id } => {
            let migration = registry
                .cancel_outbound(CLI_ACTOR, id)
                .context("failed to cancel the migration")?;
            println!("Migration {} of {} cancelled", migration.id, migration.participant_id);
            Ok(0)
        }
        MigrationCommand::Finalize { id } => {
            let outcome = registry
                .finalize_outbound(CLI_ACTOR, id)
                .await
                .context("failed to finalize the migration")?;
            println!(
                "Migration {} of {} finalized",
                outcome.value.id, outcome.value.participant_id
            );
            Ok(print_warnings(&outcome.warnings))
        }
        MigrationCommand::Inbound {
            participant,
            key,
            owner,
        } => {
            let input = InboundMigrationInput {
                participant_id: participant.clone(),
                migration_key: key.clone(),
                owner_id: owner.clone(),
                extension: None,
            };
            let outcome = registry
                .migrate_inbound(CLI_ACTOR, &input)
                .await
                .context("inbound migration failed")?;
            println!(
                "{} migrated to this SMP (migration {})",
                outcome.value.migration.participant_id, outcome.value.migration.id
            );
            Ok(print_warnings(&outcome.warnings))
        }
        MigrationCommand::List { direction, state: filter } => {
            let filter = filter.map(MigrationState::from);
            let migrations = match direction {
                Direction::Outbound => registry.all_outbound(filter),
                Direction::Inbound => registry.all_inbound(filter),
            };
            for m in &migrations {
                println!(
                    "{}  {}  {:<11}  {}",
                    m.id,
                    m.initiated_at.format("%Y-%m-%d %H:%M"),
                    m.state.as_str(),
                    m.participant_id
                );
            }
            println!("{} migrations", migrations.len());
            Ok(0)
        }
        MigrationCommand::Show { id } => {
            let migration = registry
                .get(id)
                .with_context(|| format!("participant migration '{id}' does not exist"))?;
            print_json(&migration);
            Ok(0)
        }
        MigrationCommand::Delete { id } => {
            let change = registry
                .delete(CLI_ACTOR, id)
                .context("failed to delete the migration")?;
            if change.is_changed() {
                println!("Migration {id} deleted");
                Ok(0)
            } else {
                println!("Migration {id} does not exist");
                Ok(1)
            }
        }
        MigrationCommand::Export { output } => {
            let xml = state
                .registry
                .exchange()
                .export_outbound_migrations_in_progress()
                .context("failed to write exchange XML")?;
            match output {
                Some(path) => {
                    std::fs::write(path, &xml)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{xml}"),
            }
            Ok(0)
        }
    }
}

/// Exit code 1 when a follow-up step failed.
fn print_warnings(warnings: &[String]) -> u8 {
    for warning in warnings {
        println!("[WARN] {warning}");
    }
    u8::from(!warnings.is_empty())
}

fn print_json(migration: &ParticipantMigration) {
    match serde_json::to_string_pretty(migration) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "failed to render the migration"),
    }
}
