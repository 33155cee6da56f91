//! Import, export and inspection arguments.

use super::common::{ConfigArgs, OutputFormat, TreeFileArgs};
use clap::{Args, ValueEnum};
use dsarc_archive::archive::ArtifactKind;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Archive (.zip)
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Print the manifest XML instead of a summary
    #[arg(long, conflicts_with = "format")]
    pub xml: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Manifest (.xml) or archive (.zip)
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Archive (.zip)
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    #[command(flatten)]
    pub tree: TreeFileArgs,

    /// Folder path under which a new data service node is created
    #[arg(long, default_value = "")]
    pub parent: String,

    /// Import into this existing data service node instead of creating one
    #[arg(long, conflicts_with = "parent")]
    pub into: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Path of the data service node in the tree
    #[arg(value_name = "DATA_SERVICE")]
    pub data_service: String,

    #[command(flatten)]
    pub tree: TreeFileArgs,

    /// Artifact to produce (defaults to the configured kind, then full-zip)
    #[arg(long, value_enum)]
    pub kind: Option<ArtifactArg>,

    /// Output file; a directory for file-list. Defaults to stdout.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Write the manifest without indentation
    #[arg(long)]
    pub compact: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[command(flatten)]
    pub tree: TreeFileArgs,

    /// Start at this node path instead of the root
    #[arg(long)]
    pub path: Option<String>,

    /// Also print engine bookkeeping properties
    #[arg(long)]
    pub all: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactArg {
    ManifestXml,
    FullZip,
    FileList,
    ServiceVdbXml,
}

impl From<ArtifactArg> for ArtifactKind {
    fn from(arg: ArtifactArg) -> Self {
        match arg {
            ArtifactArg::ManifestXml => ArtifactKind::ManifestXml,
            ArtifactArg::FullZip => ArtifactKind::FullZip,
            ArtifactArg::FileList => ArtifactKind::FileList,
            ArtifactArg::ServiceVdbXml => ArtifactKind::ServiceVdbXml,
        }
    }
}
