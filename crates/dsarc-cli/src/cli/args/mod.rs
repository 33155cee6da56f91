use clap::{Parser, Subcommand};

pub mod archive;
pub mod common;
pub use archive::*;
pub use common::*;

#[derive(Parser)]
#[command(
    name = "dsarc",
    version,
    about = "Import and export data service archives"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the manifest of an archive without importing it
    Inspect(InspectArgs),
    /// Schema-check a manifest or an archive
    Validate(ValidateArgs),
    /// Import an archive into a tree file
    Import(ImportArgs),
    /// Export a data service from a tree file
    Export(ExportArgs),
    /// Print the nodes of a tree file
    Tree(TreeArgs),
    Version,
}

#[cfg(test)]
mod tests;
