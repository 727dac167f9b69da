use std::io::Write;
use std::path::Path;

use schema_adapter_core::{ColumnDescriptor, IndexDescriptor, MigrationDescriptor, SemanticType};
use schema_adapter_db::{AdapterConfig, AdapterKind, DatabaseError, DescriptorSet, DescriptorSource};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn descriptor(table: &str, version: &str) -> MigrationDescriptor {
    MigrationDescriptor::new(table, version)
        .with_model(table)
        .add_column(ColumnDescriptor::counter("id"))
        .add_column(ColumnDescriptor::new("name", SemanticType::Text).with_size(120))
}

fn write_descriptor(dir: &Path, descriptor: &MigrationDescriptor) {
    let path = dir.join(format!("{}-{}.json", descriptor.applies_to, descriptor.version));
    let mut f = std::fs::File::create(path).unwrap();
    serde_json::to_writer_pretty(&mut f, descriptor).unwrap();
    f.flush().unwrap();
}

// ---------------------------------------------------------------------------
// Directory loading
// ---------------------------------------------------------------------------

#[test]
fn test_directory_loading_orders_by_table_then_version() {
    let dir = tempfile::tempdir().unwrap();

    write_descriptor(dir.path(), &descriptor("Users", "2.0"));
    write_descriptor(dir.path(), &descriptor("Orders", "1.0"));
    write_descriptor(dir.path(), &descriptor("Users", "1.0"));
    write_descriptor(
        dir.path(),
        &MigrationDescriptor::new("Users", "2.1")
            .with_index(IndexDescriptor::new("IX_USERS_NAME", ["name"])),
    );

    let set = DescriptorSet::from_dir(dir.path()).unwrap();
    assert_eq!(set.len(), 4);
    assert_eq!(set.tables(), vec!["Orders", "Users"]);

    let users: Vec<&str> = set.for_table("Users").map(|d| d.version.as_str()).collect();
    assert_eq!(users, vec!["1.0", "2.0", "2.1"]);
    assert_eq!(set.latest("Users").unwrap().indexes.len(), 1);
}

#[test]
fn test_descriptor_file_in_wire_shape() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("table1.json"),
        r#"{
            "appliesTo": "Table1",
            "model": "Table1",
            "version": "1.0",
            "add": [
                { "name": "id", "type": "Counter", "primary": true },
                { "name": "price", "type": "Decimal", "size": 19, "scale": 4, "nullable": false }
            ],
            "indexes": [ { "name": "IX_PRICE", "columns": "price" } ]
        }"#,
    )
    .unwrap();

    let set = DescriptorSet::from_dir(dir.path()).unwrap();
    let loaded = set.latest("Table1").unwrap();
    assert_eq!(loaded.add[1].semantic_type, SemanticType::Decimal);
    assert_eq!(loaded.add[1].scale, Some(4));
    assert_eq!(loaded.indexes[0].columns, vec!["price"]);
}

#[test]
fn test_malformed_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    assert!(matches!(
        DescriptorSet::from_dir(dir.path()),
        Err(DatabaseError::JsonError(_))
    ));
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

#[test]
fn test_fallback_skips_invalid_source() {
    let bad_dir = tempfile::tempdir().unwrap();
    write_descriptor(
        bad_dir.path(),
        &descriptor("Users", "1.0").add_column(ColumnDescriptor::new("name", SemanticType::Text)),
    );

    let good_dir = tempfile::tempdir().unwrap();
    let bundle = good_dir.path().join("bundle.json");
    std::fs::write(&bundle, serde_json::to_string(&vec![descriptor("Users", "1.0")]).unwrap())
        .unwrap();

    let set = DescriptorSet::builder()
        .from_dir(bad_dir.path())
        .from_bundle(&bundle)
        .build()
        .unwrap();
    assert_eq!(set.len(), 1);
    assert!(matches!(set.source(), DescriptorSource::Multiple(_)));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_config_drives_descriptor_loading() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    std::fs::create_dir_all(&migrations).unwrap();
    write_descriptor(&migrations, &descriptor("Users", "1.0"));

    let mut config = AdapterConfig::in_memory();
    config.migrations.push(migrations.clone());
    let config_path = dir.path().join("schema-adapter.yml");
    config.save(&config_path).unwrap();

    let loaded = AdapterConfig::load(&config_path).unwrap();
    let adapter = loaded.default_adapter().unwrap();
    assert_eq!(adapter.invariant_name, AdapterKind::Sqlite);
    assert!(adapter.options.is_in_memory());

    let mut builder = DescriptorSet::builder();
    for path in &loaded.migrations {
        builder = builder.from_path(path);
    }
    let set = builder.build().unwrap();
    assert_eq!(set.tables(), vec!["Users"]);
}
