use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dataservice name="sales">
  <description>Sales views</description>
  <connections>
    <connection-file path="connections/orders-connection.xml" jndi-name="java:/orders" publish="ALWAYS"/>
  </connections>
  <drivers>
    <driver-file path="drivers/pg.jar" publish="IF_MISSING"/>
  </drivers>
  <udfs>
    <udf-file path="lib/old.jar" publish="NEVER"/>
  </udfs>
</dataservice>
"#;

const CONNECTION: &str = r#"<connection name="orders" jndi-name="java:/orders" driver-name="pg" jdbc="true"><property name="url">jdbc:postgresql://db/orders</property></connection>"#;

fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in members {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    let bytes = writer.finish().unwrap().into_inner();
    std::fs::write(path, bytes).unwrap();
}

fn sales_archive(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("sales.zip");
    write_zip(
        &path,
        &[
            ("META-INF/dataservice.xml", MANIFEST.as_bytes()),
            ("connections/orders-connection.xml", CONNECTION.as_bytes()),
            ("drivers/pg.jar", b"driver-bytes"),
            ("lib/old.jar", b"old-bytes"),
        ],
    );
    path
}

fn dsarc() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dsarc"));
    cmd.env_remove("DSARC_TREE")
        .env_remove("DSARC_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn validate_accepts_archive_and_manifest() {
    let dir = tempdir().unwrap();
    let archive = sales_archive(dir.path());
    dsarc()
        .args(["validate", archive.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("validate: OK"));

    let manifest = dir.path().join("dataservice.xml");
    std::fs::write(&manifest, MANIFEST).unwrap();
    dsarc()
        .args(["validate", manifest.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn validate_reports_schema_violations_as_contract_errors() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("dataservice.xml");
    std::fs::write(
        &manifest,
        r#"<dataservice name="x"><drivers><driver-file path="a.jar"/><driver-file path="a.jar"/></drivers></dataservice>"#,
    )
    .unwrap();
    dsarc()
        .args(["validate", manifest.to_str().unwrap()])
        .assert()
        .code(2);
}

#[test]
fn inspect_prints_json_summary() {
    let dir = tempdir().unwrap();
    let archive = sales_archive(dir.path());
    let output = dsarc()
        .args(["inspect", archive.to_str().unwrap(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["name"], "sales");
    assert_eq!(summary["entries"].as_array().unwrap().len(), 3);
    assert_eq!(summary["member_count"], 4);
    assert_eq!(summary["entries"][0]["kind"], "connection");
}

#[test]
fn import_then_export_through_tree_file() {
    let dir = tempdir().unwrap();
    let archive = sales_archive(dir.path());
    let tree = dir.path().join("tree.json");
    let tree_arg = tree.to_str().unwrap();

    dsarc()
        .args(["import", archive.to_str().unwrap(), "--tree", tree_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported data service 'sales'"))
        .stdout(predicate::str::contains("descriptive"));
    assert!(tree.exists());

    dsarc()
        .args(["tree", "--tree", tree_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("sales [data_service]"))
        .stdout(predicate::str::contains("pg.jar [driver_file] (12 bytes)"));

    let out = dir.path().join("exported.zip");
    dsarc()
        .args([
            "export",
            "sales",
            "--tree",
            tree_arg,
            "--kind",
            "full-zip",
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&out).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    assert!(names.contains(&"META-INF/dataservice.xml".to_string()));
    assert!(names.contains(&"drivers/pg.jar".to_string()));
    assert!(!names.contains(&"lib/old.jar".to_string()));

    let mut driver = Vec::new();
    zip.by_name("drivers/pg.jar")
        .unwrap()
        .read_to_end(&mut driver)
        .unwrap();
    assert_eq!(driver, b"driver-bytes");

    dsarc()
        .args(["export", "sales", "--tree", tree_arg, "--kind", "file-list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sha256:"))
        .stdout(predicate::str::contains("lib/old.jar"));
}

#[test]
fn service_vdb_export_without_service_vdb_exits_4() {
    let dir = tempdir().unwrap();
    let archive = sales_archive(dir.path());
    let tree = dir.path().join("tree.json");
    let tree_arg = tree.to_str().unwrap();

    dsarc()
        .args(["import", archive.to_str().unwrap(), "--tree", tree_arg])
        .assert()
        .success();
    dsarc()
        .args(["export", "sales", "--tree", tree_arg, "--kind", "service-vdb-xml"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("no service VDB"));
}

#[test]
fn missing_manifest_exits_2_and_leaves_no_tree() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("bare.zip");
    write_zip(&archive, &[("drivers/pg.jar", b"x")]);
    let tree = dir.path().join("tree.json");

    dsarc()
        .args([
            "import",
            archive.to_str().unwrap(),
            "--tree",
            tree.to_str().unwrap(),
        ])
        .assert()
        .code(2);
    assert!(!tree.exists());
}

#[test]
fn path_traversal_exits_3() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("evil.zip");
    write_zip(
        &archive,
        &[
            ("META-INF/dataservice.xml", MANIFEST.as_bytes()),
            ("../../evil.jar", b"x"),
        ],
    );
    dsarc()
        .args(["validate", archive.to_str().unwrap()])
        .assert()
        .code(3);
}

#[test]
fn config_limits_apply() {
    let dir = tempdir().unwrap();
    let archive = sales_archive(dir.path());
    let config = dir.path().join("dsarc.yaml");
    std::fs::write(&config, "limits:\n  max_members: 2\n").unwrap();

    dsarc()
        .args([
            "inspect",
            archive.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .code(3);
}
