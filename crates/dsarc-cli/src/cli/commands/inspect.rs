use super::super::args::{InspectArgs, OutputFormat};
use super::super::helpers::load_config;
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::Context;
use dsarc_archive::archive::ManifestInfo;
use dsarc_archive::codec::{write_manifest, WriteOptions, TIMESTAMP_FORMAT};
use dsarc_archive::manifest::{EntryKind, Manifest};
use serde_json::json;

pub fn run(args: InspectArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.config.as_deref())?;
    let bytes = std::fs::read(&args.archive)
        .with_context(|| format!("failed to read archive {}", args.archive.display()))?;
    let info = ManifestInfo::peek_with_limits(&bytes, &config.limits())
        .with_context(|| format!("failed to inspect {}", args.archive.display()))?;

    if args.xml {
        let xml = write_manifest(&info.manifest, WriteOptions::default())?;
        print!("{}", String::from_utf8_lossy(&xml));
        return Ok(EXIT_SUCCESS);
    }

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary_json(&info))?);
        }
        OutputFormat::Text => print_summary(&info),
    }
    Ok(EXIT_SUCCESS)
}

pub(crate) fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::ServiceVdb => "service-vdb",
        EntryKind::Dependency => "dependency",
        EntryKind::Vdb => "vdb",
        EntryKind::Connection => "connection",
        EntryKind::Driver => "driver",
        EntryKind::Metadata => "metadata",
        EntryKind::Udf => "udf",
        EntryKind::Resource => "resource",
    }
}

fn last_modified(manifest: &Manifest) -> Option<String> {
    manifest
        .last_modified()
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
}

fn summary_json(info: &ManifestInfo) -> serde_json::Value {
    let manifest = &info.manifest;
    let entries: Vec<_> = manifest
        .entries()
        .iter()
        .map(|e| {
            json!({
                "path": e.path(),
                "kind": e.kind,
                "publish": e.publish_policy().as_xml(),
            })
        })
        .collect();
    // Name/value pairs keep the manifest's property order.
    let properties: Vec<serde_json::Value> = manifest
        .properties()
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({
        "name": manifest.name(),
        "description": manifest.description(),
        "last_modified": last_modified(manifest),
        "modified_by": manifest.modified_by(),
        "properties": properties,
        "entries": entries,
        "member_count": info.member_count,
        "missing_payloads": info.missing_payloads,
        "undeclared_members": info.undeclared_members,
    })
}

fn print_summary(info: &ManifestInfo) {
    let manifest = &info.manifest;
    println!("Data service: {}", manifest.name());
    if let Some(description) = manifest.description() {
        println!("Description:  {description}");
    }
    if let Some(ts) = last_modified(manifest) {
        let by = manifest.modified_by().unwrap_or("-");
        println!("Modified:     {ts} by {by}");
    }
    for (name, value) in manifest.properties() {
        println!("Property:     {name} = {value}");
    }
    println!(
        "Entries:      {} ({} archive members)",
        manifest.entry_count(),
        info.member_count
    );
    println!();
    println!("{:<12} {:<10} PATH", "KIND", "PUBLISH");
    for entry in manifest.entries() {
        println!(
            "{:<12} {:<10} {}",
            kind_label(entry.kind),
            entry.publish_policy().as_xml(),
            entry.path()
        );
    }
    for path in &info.missing_payloads {
        println!("missing payload: {path}");
    }
    for path in &info.undeclared_members {
        println!("undeclared member: {path}");
    }
}
