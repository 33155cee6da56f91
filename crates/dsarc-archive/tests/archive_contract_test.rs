//! Contract, rollback and security behaviour of the importer.

use dsarc_archive::archive::{
    ArchiveError, ArchiveLimits, EntryStatus, ErrorClass, ErrorCode, Importer, ManifestInfo,
};
use dsarc_archive::codec::MANIFEST_PATH;
use dsarc_archive::resolve::{ResolutionRoots, ResourceKind};
use dsarc_archive::tree::{ContentTree, MemoryTree, NodeKind};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

fn zip_of(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data) in members {
        writer
            .start_file(*path, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn driver_manifest(policy: &str) -> Vec<u8> {
    format!(
        r#"<dataservice name="ds"><drivers><driver-file path="drivers/pg.jar" publish="{policy}"/></drivers></dataservice>"#
    )
    .into_bytes()
}

fn tree_with_existing_driver() -> MemoryTree {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let existing = tree.create_child(root, "pg.jar", NodeKind::DriverFile).unwrap();
    tree.set_content(existing, b"old".to_vec()).unwrap();
    tree
}

fn drivers_named(tree: &MemoryTree, name: &str) -> usize {
    let root = tree.root();
    tree.children(root)
        .unwrap()
        .into_iter()
        .filter(|&c| tree.name(c).unwrap() == name && tree.kind(c).unwrap() == NodeKind::DriverFile)
        .count()
}

// ---- publish policy ----

#[test]
fn if_missing_reuses_existing_resource() {
    let mut tree = tree_with_existing_driver();
    let root = tree.root();
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("IF_MISSING")),
        ("drivers/pg.jar", b"new"),
    ]);
    let report = Importer::new().import_new(&archive, &mut tree, root).unwrap();

    assert_eq!(report.entries[0].status, EntryStatus::Referenced);
    assert_eq!(drivers_named(&tree, "pg.jar"), 1);
    let existing = report.entries[0].resource.unwrap();
    assert_eq!(tree.content(existing).unwrap(), Some(&b"old"[..]));
}

#[test]
fn always_materializes_a_sibling() {
    let mut tree = tree_with_existing_driver();
    let root = tree.root();
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("drivers/pg.jar", b"new"),
    ]);
    let report = Importer::new().import_new(&archive, &mut tree, root).unwrap();

    assert_eq!(report.entries[0].status, EntryStatus::Materialized);
    assert_eq!(drivers_named(&tree, "pg.jar"), 2);
    let created = report.entries[0].resource.unwrap();
    assert_eq!(tree.content(created).unwrap(), Some(&b"new"[..]));
}

#[test]
fn never_creates_no_resource() {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("NEVER")),
        ("drivers/pg.jar", b"new"),
    ]);
    let report = Importer::new().import_new(&archive, &mut tree, root).unwrap();

    assert_eq!(report.entries[0].status, EntryStatus::DescriptiveOnly);
    assert_eq!(report.entries[0].resource, None);
    assert_eq!(drivers_named(&tree, "pg.jar"), 0);
    // the descriptive entry node still exists
    let ds = report.data_service_node;
    assert_eq!(tree.children(ds).unwrap().len(), 1);
}

#[test]
fn missing_payload_falls_back_to_existing_resource() {
    let mut tree = tree_with_existing_driver();
    let root = tree.root();
    let archive = zip_of(&[(MANIFEST_PATH, &driver_manifest("IF_MISSING"))]);
    let report = Importer::new().import_new(&archive, &mut tree, root).unwrap();
    assert_eq!(report.entries[0].status, EntryStatus::Referenced);

    let mut empty = MemoryTree::new();
    let root = empty.root();
    let report = Importer::new().import_new(&archive, &mut empty, root).unwrap();
    assert_eq!(report.entries[0].status, EntryStatus::PayloadMissing);
    assert_eq!(report.entries[0].resource, None);
}

#[test]
fn configured_root_receives_resources() {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("drivers/pg.jar", b"jar"),
    ]);
    let importer = Importer::new()
        .with_roots(ResolutionRoots::new().with(ResourceKind::Driver, "shared/jdbc"));
    importer.import_new(&archive, &mut tree, root).unwrap();

    let driver = tree.lookup("shared/jdbc/pg.jar").unwrap();
    assert_eq!(tree.kind(driver).unwrap(), NodeKind::DriverFile);
}

#[test]
fn import_into_existing_data_service() {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let ds = tree.create_child(root, "target", NodeKind::DataService).unwrap();
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("drivers/pg.jar", b"jar"),
    ]);
    let report = Importer::new().import(&archive, &mut tree, ds).unwrap();
    assert_eq!(report.data_service_node, ds);

    let folder = tree.create_child(root, "plain", NodeKind::Folder).unwrap();
    let err = Importer::new().import(&archive, &mut tree, folder).unwrap_err();
    assert!(matches!(err, ArchiveError::NotDataService { .. }));
}

// ---- contract failures ----

#[test]
fn duplicate_paths_fail_schema_validation_before_any_write() {
    let manifest = br#"<dataservice name="ds"><drivers>
        <driver-file path="drivers/pg.jar"/>
        <driver-file path="drivers/pg.jar"/>
    </drivers></dataservice>"#;
    let archive = zip_of(&[(MANIFEST_PATH, manifest), ("drivers/pg.jar", b"jar")]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractSchemaValidation);
    assert!(err.is_pre_materialization());
    assert_eq!(tree.len(), 1);
}

#[test]
fn duplicate_jndi_names_fail_schema_validation() {
    let manifest = br#"<dataservice name="ds"><connections>
        <connection-file path="a-connection.xml" jndi-name="java:/db"/>
        <connection-file path="b-connection.xml" jndi-name="java:/db"/>
    </connections></dataservice>"#;
    let archive = zip_of(&[(MANIFEST_PATH, manifest)]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert!(matches!(err, ArchiveError::SchemaValidation { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn missing_manifest_is_a_contract_error() {
    let archive = zip_of(&[("drivers/pg.jar", b"jar")]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert!(matches!(err, ArchiveError::MissingManifest { expected } if expected == MANIFEST_PATH));
    assert_eq!(err.class(), ErrorClass::Contract);
    assert_eq!(tree.len(), 1);
}

#[test]
fn garbage_bytes_are_an_integrity_error() {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let err = Importer::new()
        .import_new(b"definitely not a zip", &mut tree, root)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Integrity);
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn failed_delegate_rolls_back_the_entry() {
    let manifest = br#"<dataservice name="ds">
        <connections><connection-file path="connections/bad-connection.xml" jndi-name="java:/bad" publish="ALWAYS"/></connections>
        <drivers><driver-file path="drivers/pg.jar" publish="ALWAYS"/></drivers>
    </dataservice>"#;
    let archive = zip_of(&[
        (MANIFEST_PATH, manifest),
        ("drivers/pg.jar", b"jar"),
        ("connections/bad-connection.xml", br#"<connection name="bad"/>"#),
    ]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert!(
        matches!(&err, ArchiveError::DelegateImport { path, .. } if path == "connections/bad-connection.xml"),
        "unexpected error: {err}"
    );

    // the driver imported before the failure stays; the connection left nothing behind
    let ds = tree.lookup("ds").unwrap();
    assert_eq!(tree.children(ds).unwrap().len(), 1);
    assert!(tree.lookup("bad-connection.xml").is_none());
    assert!(tree.lookup("pg.jar").is_some());
}

#[test]
fn failed_first_entry_removes_the_new_data_service() {
    let manifest = br#"<dataservice name="ds">
        <vdbs><vdb-file path="broken-vdb.xml" publish="ALWAYS"/></vdbs>
    </dataservice>"#;
    let archive = zip_of(&[(MANIFEST_PATH, manifest), ("broken-vdb.xml", b"<model/>")]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractDelegateImport);
    assert_eq!(tree.len(), 1);
}

#[test]
fn reserved_manifest_property_fails_schema_validation() {
    let manifest = br#"<dataservice name="ds">
        <property name="dsarc:path">elsewhere.jar</property>
    </dataservice>"#;
    let archive = zip_of(&[(MANIFEST_PATH, manifest)]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert!(matches!(err, ArchiveError::SchemaValidation { .. }), "unexpected error: {err}");
    assert_eq!(tree.len(), 1);
}

#[test]
fn reserved_connection_property_is_a_delegate_failure() {
    let manifest = br#"<dataservice name="ds">
        <connections><connection-file path="c-connection.xml" jndi-name="java:/c" publish="ALWAYS"/></connections>
    </dataservice>"#;
    let payload = br#"<connection name="c" jndi-name="java:/c"><property name="dsarc:jndiName">java:/other</property></connection>"#;
    let archive = zip_of(&[(MANIFEST_PATH, manifest), ("c-connection.xml", payload)]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractDelegateImport);
    assert!(tree.lookup("c-connection.xml").is_none());
}

#[test]
fn failed_reimport_keeps_the_previous_entry() {
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let manifest = br#"<dataservice name="ds">
        <vdbs><vdb-file path="orders-vdb.xml" publish="ALWAYS"/></vdbs>
    </dataservice>"#;
    let good = zip_of(&[
        (MANIFEST_PATH, manifest),
        ("orders-vdb.xml", br#"<vdb name="orders" version="1"/>"#),
    ]);
    let first = Importer::new().import_new(&good, &mut tree, root).unwrap();
    let ds = first.data_service_node;

    let bad = zip_of(&[(MANIFEST_PATH, manifest), ("orders-vdb.xml", b"<model/>")]);
    let err = Importer::new().import(&bad, &mut tree, ds).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractDelegateImport);
    assert_eq!(tree.children(ds).unwrap(), vec![first.entries[0].entry_node]);
}

// ---- security and limits ----

#[test]
fn path_traversal_is_rejected_before_any_write() {
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("../escape.jar", b"jar"),
    ]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityPathTraversal);
    assert_eq!(err.exit_code(), 3);
    assert_eq!(tree.len(), 1);
}

#[test]
fn absolute_member_path_is_rejected() {
    let archive = zip_of(&[(MANIFEST_PATH, &driver_manifest("ALWAYS")), ("/etc/pg.jar", b"jar")]);
    let err = ManifestInfo::peek(&archive).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SecurityAbsolutePath);
}

#[test]
fn member_count_limit_applies() {
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("a.txt", b"a"),
        ("b.txt", b"b"),
    ]);
    let limits = ArchiveLimits {
        max_members: 2,
        ..ArchiveLimits::default()
    };
    let err = ManifestInfo::peek_with_limits(&archive, &limits).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LimitMemberCount);
}

#[test]
fn decompressed_budget_applies_across_members() {
    let big = vec![b'x'; 4096];
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("ALWAYS")),
        ("drivers/pg.jar", &big),
    ]);
    let limits = ArchiveLimits {
        max_decompressed_bytes: 1024,
        ..ArchiveLimits::default()
    };
    let mut tree = MemoryTree::new();
    let root = tree.root();
    let err = Importer::new()
        .with_limits(limits)
        .import_new(&archive, &mut tree, root)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Limits);
    assert_eq!(tree.len(), 1);
}

#[test]
fn deeply_nested_payload_is_rejected() {
    let manifest = br#"<dataservice name="ds"><vdbs><vdb-file path="deep-vdb.xml"/></vdbs></dataservice>"#;
    let deep = format!("{}{}", "<vdb>".repeat(100), "</vdb>".repeat(100));
    let archive = zip_of(&[(MANIFEST_PATH, manifest), ("deep-vdb.xml", deep.as_bytes())]);
    let mut tree = MemoryTree::new();
    let root = tree.root();

    let err = Importer::new().import_new(&archive, &mut tree, root).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LimitXmlDepth);
}

// ---- peek ----

#[test]
fn peek_reports_missing_and_undeclared_members() {
    let archive = zip_of(&[
        (MANIFEST_PATH, &driver_manifest("IF_MISSING")),
        ("stray.txt", b"?"),
    ]);
    let info = ManifestInfo::peek(&archive).unwrap();
    assert_eq!(info.manifest.name(), "ds");
    assert_eq!(info.member_count, 2);
    assert_eq!(info.missing_payloads, vec!["drivers/pg.jar".to_string()]);
    assert_eq!(info.undeclared_members, vec!["stray.txt".to_string()]);
}
