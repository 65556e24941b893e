//! Integration tests for route table registry editing.
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use hostnet_common::{HostnetError, SystemPaths};
use hostnet_network::backup::{FileOps, LocalFs};
use hostnet_network::{HostContext, RouteTableRegistry, SystemRunner};

const STOCK: &str = "#\n\
                     # reserved values\n\
                     #\n\
                     255\tlocal\n\
                     254\tmain\n\
                     253\tdefault\n\
                     0\tunspec\n\
                     #\n\
                     # local\n\
                     #\n";

fn registry_in(root: &Path, content: &str) -> RouteTableRegistry {
    let paths = SystemPaths::with_root(root);
    fs::create_dir_all(paths.rt_tables.parent().unwrap()).unwrap();
    fs::write(&paths.rt_tables, content).unwrap();
    RouteTableRegistry::new(&HostContext::new(Arc::new(SystemRunner), paths))
}

#[test]
fn add_then_delete_restores_file() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry_in(root.path(), STOCK);

    let vnic = registry.add_table("ens5").unwrap();
    assert_eq!(vnic.number, 1);
    assert_eq!(registry.delete_table("ens5").unwrap(), 1);

    assert_eq!(fs::read_to_string(registry.path()).unwrap(), STOCK);
    assert!(!registry.backup_path().exists());
}

#[test]
fn numbers_are_never_reused() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry_in(root.path(), "0\ta\n1\tb\n2\tc\n");

    assert_eq!(registry.add_table("d").unwrap().number, 3);
    assert_eq!(registry.add_table("e").unwrap().number, 4);

    let numbers: Vec<u32> = registry.entries().unwrap().iter().map(|e| e.number).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
}

/// Backups work, but the live file cannot be rewritten.
struct WriteFails;

impl FileOps for WriteFails {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        LocalFs.read_to_string(path)
    }
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        LocalFs.copy(from, to)
    }
    fn write(&self, path: &Path, _contents: &str) -> io::Result<()> {
        // Leave a torn file behind, as an interrupted write would.
        fs::write(path, "25")?;
        Err(io::Error::other("no space left on device"))
    }
    fn remove(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove(path)
    }
}

#[test]
fn failed_write_leaves_registry_unchanged() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry_in(root.path(), STOCK).with_fs(WriteFails);

    let err = registry.add_table("ens5").unwrap_err();
    assert!(matches!(err, HostnetError::Commit { .. }));
    assert_eq!(fs::read_to_string(registry.path()).unwrap(), STOCK);

    let err = registry.delete_table("main").unwrap_err();
    assert!(matches!(err, HostnetError::Commit { .. }));
    assert_eq!(fs::read_to_string(registry.path()).unwrap(), STOCK);
}

#[test]
fn missing_registry_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    let registry = RouteTableRegistry::at(root.path().join("rt_tables"));
    assert!(registry.add_table("ens5").is_err());
    assert!(!registry.path().exists());
}
