use anyhow::{bail, Context};
use dsarc_archive::config::ArchiveConfig;
use dsarc_archive::tree::{ContentTree, MemoryTree, NodeId};
use std::io::Write;
use std::path::Path;

pub fn load_config(path: Option<&Path>) -> anyhow::Result<ArchiveConfig> {
    match path {
        Some(path) => ArchiveConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ArchiveConfig::default()),
    }
}

/// Load a tree file; a missing file yields an empty tree when `create` is set.
pub fn load_tree(path: &Path, create: bool) -> anyhow::Result<MemoryTree> {
    if !path.exists() {
        if create {
            return Ok(MemoryTree::new());
        }
        bail!("tree file {} does not exist", path.display());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tree file {}", path.display()))?;
    MemoryTree::from_json(&json)
        .with_context(|| format!("failed to parse tree file {}", path.display()))
}

/// Write the tree next to `path` first, then rename over it.
pub fn save_tree(path: &Path, tree: &MemoryTree) -> anyhow::Result<()> {
    let json = tree.to_json(true)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write tree file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace tree file {}", path.display()))?;
    Ok(())
}

pub fn find_node(tree: &MemoryTree, path: &str) -> anyhow::Result<NodeId> {
    tree.lookup(path)
        .with_context(|| format!("no node at '{path}' in tree"))
}

/// Write `bytes` to `out`, or to stdout when no path is given.
pub fn write_output(out: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match out {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
