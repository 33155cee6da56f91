use super::super::args::TreeArgs;
use super::super::helpers::{find_node, load_tree};
use crate::exit_codes::EXIT_SUCCESS;
use dsarc_archive::tree::{props, ContentTree, MemoryTree, NodeId};

pub fn run(args: TreeArgs) -> anyhow::Result<i32> {
    let tree = load_tree(&args.tree.tree, false)?;
    let start = match &args.path {
        Some(path) => find_node(&tree, path)?,
        None => tree.root(),
    };
    let mut out = String::new();
    render(&tree, start, 0, args.all, &mut out)?;
    print!("{out}");
    Ok(EXIT_SUCCESS)
}

fn render(
    tree: &MemoryTree,
    node: NodeId,
    depth: usize,
    all: bool,
    out: &mut String,
) -> anyhow::Result<()> {
    let indent = "  ".repeat(depth);
    let name = tree.name(node)?;
    let label = if name.is_empty() { "/" } else { name };
    out.push_str(&format!("{indent}{label} [{}]", tree.kind(node)?));
    if let Some(size) = tree.content(node)?.map(<[u8]>::len) {
        out.push_str(&format!(" ({size} bytes)"));
    }
    out.push('\n');

    for key in tree.property_names(node)? {
        if !all && props::is_internal(&key) {
            continue;
        }
        if let Some(value) = tree.property(node, &key)? {
            out.push_str(&format!("{indent}  @{key} = {value}\n"));
        }
    }
    for child in tree.children(node)? {
        render(tree, child, depth + 1, all, out)?;
    }
    Ok(())
}
