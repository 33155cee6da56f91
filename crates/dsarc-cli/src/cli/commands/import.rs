use super::super::args::{ImportArgs, OutputFormat};
use super::super::helpers::{find_node, load_config, load_tree, save_tree};
use super::inspect::kind_label;
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::Context;
use dsarc_archive::archive::{EntryStatus, ImportReport, Importer};
use dsarc_archive::tree::ContentTree;
use tracing::info;

pub fn run(args: ImportArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.config.as_deref())?;
    let bytes = std::fs::read(&args.archive)
        .with_context(|| format!("failed to read archive {}", args.archive.display()))?;
    let tree_path = &args.tree.tree;
    let mut tree = load_tree(tree_path, true)?;

    let importer = Importer::new()
        .with_roots(config.resolution_roots())
        .with_limits(config.limits());

    let report = match &args.into {
        Some(path) => {
            let destination = find_node(&tree, path)?;
            importer.import(&bytes, &mut tree, destination)
        }
        None => {
            let parent = tree.ensure_folder(&args.parent)?;
            importer.import_new(&bytes, &mut tree, parent)
        }
    }
    .with_context(|| format!("failed to import {}", args.archive.display()))?;

    save_tree(tree_path, &tree)?;
    info!(tree = %tree_path.display(), nodes = tree.len(), "saved tree file");

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(EXIT_SUCCESS)
}

fn status_label(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Materialized => "materialized",
        EntryStatus::Referenced => "referenced",
        EntryStatus::DescriptiveOnly => "descriptive",
        EntryStatus::PayloadMissing => "missing",
    }
}

fn print_report(report: &ImportReport) {
    println!("Imported data service '{}'", report.data_service);
    println!("{:<12} {:<10} {:<13} PATH", "KIND", "PUBLISH", "STATUS");
    for entry in &report.entries {
        println!(
            "{:<12} {:<10} {:<13} {}",
            kind_label(entry.kind),
            entry.policy.as_xml(),
            status_label(entry.status),
            entry.path
        );
    }
    for path in &report.skipped {
        println!("skipped: {path}");
    }
}
