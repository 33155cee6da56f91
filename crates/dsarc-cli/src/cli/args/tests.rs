use super::*;
use clap::CommandFactory;
use clap::Parser;

#[test]
fn cli_debug_assert() {
    Cli::command().debug_assert();
}

#[test]
fn export_parses_kind_and_output() {
    let cli = Cli::try_parse_from([
        "dsarc",
        "export",
        "sales",
        "--tree",
        "t.json",
        "--kind",
        "file-list",
        "-o",
        "out",
    ])
    .expect("parse should succeed");

    match cli.cmd {
        Command::Export(args) => {
            assert_eq!(args.data_service, "sales");
            assert_eq!(args.kind, Some(ArtifactArg::FileList));
            assert_eq!(args.tree.tree, std::path::PathBuf::from("t.json"));
            assert!(!args.compact);
        }
        _ => panic!("expected Command::Export"),
    }
}

#[test]
fn import_rejects_parent_with_into() {
    let parsed = Cli::try_parse_from([
        "dsarc", "import", "a.zip", "--parent", "x", "--into", "y",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn import_defaults_to_root_parent() {
    let cli = Cli::try_parse_from(["dsarc", "import", "a.zip"]).expect("parse should succeed");
    match cli.cmd {
        Command::Import(args) => {
            assert_eq!(args.parent, "");
            assert_eq!(args.into, None);
            assert_eq!(args.format, OutputFormat::Text);
        }
        _ => panic!("expected Command::Import"),
    }
}
