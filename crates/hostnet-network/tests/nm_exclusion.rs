//! Integration tests for NetworkManager exclusions.
use std::fs;
use std::sync::Arc;

use hostnet_common::SystemPaths;
use hostnet_network::{HostContext, NmExclusions, SystemRunner};

#[test]
fn exclusion_lifecycle() {
    let root = tempfile::tempdir().unwrap();
    let paths = SystemPaths::with_root(root.path());
    let conf_dir = paths.nm_conf_dir.clone();
    let nm = NmExclusions::new(&HostContext::new(Arc::new(SystemRunner), paths));

    // The conf.d directory does not exist yet.
    assert!(!conf_dir.exists());
    let path = nm.unmanage("00:00:17:02:9a:3c").unwrap();
    assert_eq!(path, conf_dir.join("00_00_17_02_9A_3C.conf"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "[keyfile]\nunmanaged-devices+=mac00:00:17:02:9a:3c\n"
    );

    // Rewriting is harmless.
    nm.unmanage("00:00:17:02:9a:3c").unwrap();
    assert_eq!(fs::read_dir(&conf_dir).unwrap().count(), 1);

    assert!(nm.manage("00:00:17:02:9a:3c").unwrap());
    assert!(!path.exists());
    assert!(!nm.manage("00:00:17:02:9a:3c").unwrap());
}
