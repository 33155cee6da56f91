//! Arguments shared by several commands.

use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct TreeFileArgs {
    /// JSON tree file holding the content tree
    #[arg(long, default_value = "dsarc-tree.json", env = "DSARC_TREE")]
    pub tree: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// YAML configuration (roots, limits, export options)
    #[arg(long, env = "DSARC_CONFIG")]
    pub config: Option<PathBuf>,
}
