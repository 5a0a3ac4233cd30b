//! # Export and Import Subcommands
//!
//! Move service groups, service information, redirects and business cards
//! between data directories as exchange XML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use smp_registry::exchange::{ImportLevel, ImportSummary};

use crate::{open_state, runtime, CLI_ACTOR};

/// Arguments for the `smp export` subcommand.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Only export service groups of this owner.
    #[arg(long)]
    pub owner: Option<String>,

    /// Output file. Writes to stdout when omitted.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `smp import` subcommand.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Exchange XML file to import.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Replace service groups and business cards that already exist.
    #[arg(long)]
    pub overwrite: bool,

    /// Owner for service groups whose recorded owner is unknown.
    #[arg(long)]
    pub default_owner: Option<String>,
}

/// Execute the export subcommand.
pub fn run_export(args: &ExportArgs, data_dir: &Path) -> Result<u8> {
    let state = open_state(data_dir, None)?;
    let exchange = state.registry.exchange();
    let xml = match &args.owner {
        Some(owner) => exchange.export_of_owner(owner),
        None => exchange.export_all(),
    }
    .context("failed to write exchange XML")?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &xml)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "export written");
            println!("Exported to {}", path.display());
        }
        None => println!("{xml}"),
    }
    Ok(0)
}

/// Execute the import subcommand.
///
/// Returns exit code 1 when the import reported errors.
pub fn run_import(args: &ImportArgs, data_dir: &Path) -> Result<u8> {
    let xml = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let state = open_state(data_dir, None)?;
    let options = state.import_options(args.overwrite, args.default_owner.clone());

    let summary = runtime()?
        .block_on(state.registry.exchange().import_xml(CLI_ACTOR, &xml, &options))
        .with_context(|| format!("failed to import {}", args.file.display()))?;

    print_summary(&summary);
    Ok(if summary.imported && !summary.has_errors() {
        0
    } else {
        1
    })
}

fn print_summary(summary: &ImportSummary) {
    for action in &summary.actions {
        let level = match action.level {
            ImportLevel::Success => "OK",
            ImportLevel::Info => "INFO",
            ImportLevel::Warning => "WARN",
            ImportLevel::Error => "ERROR",
        };
        println!("[{level}] {}", action.message);
    }
    println!(
        "{} service groups created, {} deleted, {} skipped; {} service information merged, {} redirects created, {} business cards saved",
        summary.service_groups_created,
        summary.service_groups_deleted,
        summary.service_groups_skipped,
        summary.service_information_merged,
        summary.redirects_created,
        summary.business_cards_saved,
    );
    if !summary.imported {
        println!("Nothing was imported.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smp_registry::service_group::ServiceGroupInput;

    const SG: &str = "iso6523-actorid-upis::9915:test";

    fn seed(data_dir: &Path, owner: &str) {
        let state = open_state(data_dir, None).unwrap();
        let input = ServiceGroupInput {
            participant_id: SG.to_string(),
            owner_id: owner.to_string(),
            extension: None,
        };
        runtime()
            .unwrap()
            .block_on(state.registry.service_groups().create("test", &input))
            .unwrap();
    }

    #[test]
    fn export_then_import_into_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        let file = dir.path().join("export.xml");
        seed(&source, "alice");

        let code = run_export(
            &ExportArgs {
                owner: None,
                output: Some(file.clone()),
            },
            &source,
        )
        .unwrap();
        assert_eq!(code, 0);
        let xml = std::fs::read_to_string(&file).unwrap();
        assert!(xml.contains(SG));

        let code = run_import(
            &ImportArgs {
                file,
                overwrite: false,
                default_owner: None,
            },
            &target,
        )
        .unwrap();
        assert_eq!(code, 0);

        let state = open_state(&target, None).unwrap();
        let groups = state.registry.service_groups().get_all();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].owner_id, "alice");
    }

    #[test]
    fn export_of_other_owner_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bob.xml");
        seed(dir.path(), "alice");
        run_export(
            &ExportArgs {
                owner: Some("bob".to_string()),
                output: Some(file.clone()),
            },
            dir.path(),
        )
        .unwrap();
        let xml = std::fs::read_to_string(&file).unwrap();
        assert!(!xml.contains(SG));
    }

    #[test]
    fn import_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_import(
            &ImportArgs {
                file: dir.path().join("missing.xml"),
                overwrite: false,
                default_owner: None,
            },
            dir.path(),
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn import_of_foreign_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("other.xml");
        std::fs::write(&file, "<other/>").unwrap();
        let result = run_import(
            &ImportArgs {
                file,
                overwrite: false,
                default_owner: None,
            },
            &dir.path().join("data"),
        );
        assert!(result.is_err());
    }
}
