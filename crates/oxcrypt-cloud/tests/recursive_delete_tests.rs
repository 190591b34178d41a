//! Folder deletion over nested ciphertext directories.

mod common;

use common::TestVault;
use oxcrypt_cloud::{CloudPath, CloudProvider, VaultFormat};

async fn build_tree(vault: &TestVault) {
    vault.mkdir("/top").await;
    vault.mkdir("/top/sub1").await;
    vault.mkdir("/top/sub2").await;
    vault.mkdir("/top/sub2/deep").await;
    vault.mkdir("/top/sub3").await;
    vault.write_file("/top/file", b"t").await.unwrap();
    vault.write_file("/top/sub1/a", b"a").await.unwrap();
    vault.write_file("/top/sub2/deep/b", b"b").await.unwrap();
}

async fn ciphertext_dir(vault: &TestVault, path: &str) -> CloudPath {
    vault
        .vault
        .resolve_ciphertext_dir(&CloudPath::new(path))
        .await
        .unwrap_or_else(|e| panic!("Failed to resolve {path}: {e}"))
}

// ============================================================================
// Complete deletion
// ============================================================================

async fn delete_removes_every_level(format: VaultFormat) {
    let vault = TestVault::new(format).await;
    build_tree(&vault).await;

    let mut dirs = Vec::new();
    for path in ["/top", "/top/sub1", "/top/sub2", "/top/sub2/deep", "/top/sub3"] {
        dirs.push(ciphertext_dir(&vault, path).await);
    }

    vault.vault.delete_folder(&CloudPath::new("/top")).await.unwrap();

    for dir in &dirs {
        assert!(!vault.backend.contains(dir), "{dir} survived deletion");
    }
    assert!(vault.names("/").await.is_empty());
    assert!(vault.vault.dir_id_cache().len() <= 1);
}

#[tokio::test]
async fn delete_removes_every_level_format7() {
    delete_removes_every_level(VaultFormat::Format7).await;
}

#[tokio::test]
async fn delete_removes_every_level_format6() {
    delete_removes_every_level(VaultFormat::Format6).await;
}

// ============================================================================
// Partial failures
// ============================================================================

#[tokio::test]
async fn failed_subdirectories_do_not_abort_deletion() {
    let vault = TestVault::new(VaultFormat::Format7).await;
    build_tree(&vault).await;

    let top = ciphertext_dir(&vault, "/top").await;
    let sub1 = ciphertext_dir(&vault, "/top/sub1").await;
    let sub2 = ciphertext_dir(&vault, "/top/sub2").await;
    let deep = ciphertext_dir(&vault, "/top/sub2/deep").await;
    let sub3 = ciphertext_dir(&vault, "/top/sub3").await;
    vault.backend.fail_folder_deletion(sub1.clone());
    vault.backend.fail_folder_deletion(deep.clone());

    vault.vault.delete_folder(&CloudPath::new("/top")).await.unwrap();

    let err = vault
        .vault
        .fetch_item_metadata(&CloudPath::new("/top"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!vault.backend.contains(&top));
    assert!(!vault.backend.contains(&sub2));
    assert!(!vault.backend.contains(&sub3));

    // Orphaned, but unreachable from the vault
    assert!(vault.backend.is_folder(&sub1));
    assert!(vault.backend.is_folder(&deep));
    assert!(vault.names("/").await.is_empty());
}

#[tokio::test]
async fn failing_top_directory_is_reported() {
    let vault = TestVault::new(VaultFormat::Format7).await;
    build_tree(&vault).await;
    let top = ciphertext_dir(&vault, "/top").await;
    vault.backend.fail_folder_deletion(top);

    let result = vault.vault.delete_folder(&CloudPath::new("/top")).await;
    assert!(result.is_err());
    assert_eq!(vault.names("/").await, ["top"]);
}

#[tokio::test]
async fn entries_without_marker_are_not_descended() {
    let vault = TestVault::new(VaultFormat::Format7).await;
    vault.mkdir("/top").await;
    let top = ciphertext_dir(&vault, "/top").await;

    // A symlink entry: a `.c9r` folder holding `symlink.c9r` instead of `dir.c9r`
    let link = top.join("bGluaw==.c9r");
    vault.backend.create_folder(&link).await.unwrap();
    vault.backend.insert_file(link.join("symlink.c9r"), b"OXC1".to_vec());

    vault.vault.delete_folder(&CloudPath::new("/top")).await.unwrap();
    assert!(!vault.backend.contains(&link));
    assert!(vault.names("/").await.is_empty());
}

#[tokio::test]
async fn vault_root_cannot_be_deleted() {
    let vault = TestVault::new(VaultFormat::Format7).await;
    assert!(vault.vault.delete_folder(&CloudPath::root()).await.is_err());
    assert!(vault.vault.fetch_item_metadata(&CloudPath::root()).await.is_ok());
}
