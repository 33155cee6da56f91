use super::super::args::ExportArgs;
use super::super::helpers::{find_node, load_config, load_tree, write_output};
use crate::exit_codes::EXIT_SUCCESS;
use anyhow::{bail, Context};
use dsarc_archive::archive::{ExportArtifact, Exporter, FileList};
use std::path::Path;

pub fn run(args: ExportArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.config.as_deref())?;
    let tree = load_tree(&args.tree.tree, false)?;
    let source = find_node(&tree, &args.data_service)?;

    let mut options = config.export_options()?;
    if let Some(kind) = args.kind {
        options = options.with_artifact(kind.into());
    }
    if args.compact {
        options.pretty = false;
    }

    let outcome = Exporter::new(options)
        .export(&tree, source)
        .with_context(|| format!("failed to export '{}'", args.data_service))?;
    for path in &outcome.missing_references {
        eprintln!("warning: no payload exported for {path}");
    }

    match &outcome.artifact {
        ExportArtifact::FileList(files) => {
            if let Some(dir) = &args.out {
                write_file_list(dir, files)?;
            }
            for (path, size, digest) in files.digests() {
                println!("{digest}  {size:>10}  {path}");
            }
        }
        ExportArtifact::ManifestXml(bytes)
        | ExportArtifact::FullZip(bytes)
        | ExportArtifact::ServiceVdbXml(bytes) => {
            write_output(args.out.as_deref(), bytes)?;
        }
    }
    Ok(EXIT_SUCCESS)
}

/// Lay the listed files out under `dir`, one file per archive path.
fn write_file_list(dir: &Path, files: &FileList) -> anyhow::Result<()> {
    for (path, content) in files.iter() {
        if path.split('/').any(|segment| segment == "..") || path.starts_with('/') {
            bail!("refusing to write outside {}: {path}", dir.display());
        }
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, content)
            .with_context(|| format!("failed to write {}", target.display()))?;
    }
    Ok(())
}
