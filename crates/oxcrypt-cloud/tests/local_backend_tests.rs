//! Tests for the local filesystem backend, alone and under a vault.

mod common;

use std::sync::Arc;

use common::{download, list_names, upload};
use oxcrypt_cloud::testing::TestCryptor;
use oxcrypt_cloud::{
    open_vault, CloudItemType, CloudPath, CloudProvider, CloudProviderError, LocalBackend, VaultFormat,
    VaultProviderConfig,
};
use tempfile::TempDir;

fn backend() -> (TempDir, LocalBackend) {
    common::init_tracing();
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = LocalBackend::new(root.path()).expect("Failed to create backend");
    (root, backend)
}

// ============================================================================
// Basic operations
// ============================================================================

#[tokio::test]
async fn upload_and_download() {
    let (root, backend) = backend();
    let meta = upload(&backend, "/a.txt", b"hello").await.unwrap();
    assert_eq!(meta.item_type, CloudItemType::File);
    assert_eq!(meta.size, Some(5));
    assert_eq!(std::fs::read(root.path().join("a.txt")).unwrap(), b"hello");
    assert_eq!(download(&backend, "/a.txt").await.unwrap(), b"hello");
}

#[tokio::test]
async fn folders_and_listing() {
    let (_root, backend) = backend();
    backend.create_folder(&CloudPath::new("/dir")).await.unwrap();
    upload(&backend, "/dir/b", b"b").await.unwrap();
    upload(&backend, "/dir/a", b"a").await.unwrap();
    backend.create_folder(&CloudPath::new("/dir/sub")).await.unwrap();

    assert_eq!(list_names(&backend, "/dir").await, ["a", "b", "sub"]);
    let sub = backend.fetch_item_metadata(&CloudPath::new("/dir/sub")).await.unwrap();
    assert_eq!(sub.item_type, CloudItemType::Folder);
    assert_eq!(sub.size, None);
}

#[tokio::test]
async fn listing_is_paged() {
    let (_root, backend) = backend();
    let backend = backend.with_page_size(2);
    for name in ["/e", "/d", "/c", "/b", "/a"] {
        upload(&backend, name, b"").await.unwrap();
    }

    let first = backend.fetch_item_list(&CloudPath::root(), None).await.unwrap();
    let names: Vec<_> = first.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    let token = first.next_page_token.expect("expected a second page");

    let second = backend
        .fetch_item_list(&CloudPath::root(), Some(&token))
        .await
        .unwrap();
    let names: Vec<_> = second.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["c", "d"]);
    assert!(second.next_page_token.is_some());

    let err = backend
        .fetch_item_list(&CloudPath::root(), Some("bogus"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudProviderError::InvalidPageToken { .. }));
}

#[tokio::test]
async fn moves_and_deletes() {
    let (root, backend) = backend();
    backend.create_folder(&CloudPath::new("/x")).await.unwrap();
    upload(&backend, "/x/f", b"f").await.unwrap();

    backend
        .move_folder(&CloudPath::new("/x"), &CloudPath::new("/y"))
        .await
        .unwrap();
    backend
        .move_file(&CloudPath::new("/y/f"), &CloudPath::new("/g"))
        .await
        .unwrap();
    assert!(root.path().join("g").is_file());
    assert!(root.path().join("y").is_dir());

    backend.delete_file(&CloudPath::new("/g")).await.unwrap();
    backend.delete_folder(&CloudPath::new("/y")).await.unwrap();
    assert!(list_names(&backend, "/").await.is_empty());
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn errors_are_classified() {
    let (_root, backend) = backend();
    upload(&backend, "/file", b"x").await.unwrap();

    let err = backend.fetch_item_metadata(&CloudPath::new("/missing")).await.unwrap_err();
    assert!(err.is_not_found());

    let err = upload(&backend, "/file", b"y").await.unwrap_err();
    assert!(err.is_already_exists());

    let err = backend.create_folder(&CloudPath::new("/no/such")).await.unwrap_err();
    assert!(matches!(err, CloudProviderError::ParentMissing { .. }), "got {err:?}");

    let err = backend.fetch_item_list(&CloudPath::new("/file"), None).await.unwrap_err();
    assert!(matches!(err, CloudProviderError::TypeMismatch { .. }), "got {err:?}");

    let err = backend.delete_folder(&CloudPath::new("/file")).await.unwrap_err();
    assert!(matches!(err, CloudProviderError::TypeMismatch { .. }), "got {err:?}");

    backend.create_folder(&CloudPath::new("/dir")).await.unwrap();
    let err = backend
        .move_file(&CloudPath::new("/file"), &CloudPath::new("/dir"))
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    let err = backend
        .move_folder(&CloudPath::new("/dir"), &CloudPath::new("/dir/inner"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudProviderError::Generic { .. }), "got {err:?}");
}

#[test]
fn root_must_be_a_directory() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(LocalBackend::new(file.path()).is_err());
}

// ============================================================================
// Vault on disk
// ============================================================================

#[tokio::test]
async fn vault_over_local_backend() {
    let (root, backend) = backend();
    let backend = Arc::new(backend);
    backend.create_folder(&CloudPath::new("/vault")).await.unwrap();

    for format in [VaultFormat::Format6, VaultFormat::Format7] {
        let path = CloudPath::new(format!("/vault/{}", format.version()));
        backend.create_folder(&path).await.unwrap();
        let config = VaultProviderConfig::new(path, format);
        let vault = open_vault(&config, backend.clone(), Arc::new(TestCryptor::new(format.version()))).unwrap();
        vault.initialize_root().await.unwrap();

        let long = "long".repeat(60);
        vault.create_folder(&CloudPath::new("/docs")).await.unwrap();
        upload(&vault, "/docs/readme", b"on disk").await.unwrap();
        upload(&vault, &format!("/{long}"), b"long name").await.unwrap();

        let reopened =
            open_vault(&config, backend.clone(), Arc::new(TestCryptor::new(format.version()))).unwrap();
        assert_eq!(list_names(&reopened, "/").await, ["docs".to_string(), long.clone()]);
        assert_eq!(download(&reopened, "/docs/readme").await.unwrap(), b"on disk");
        assert_eq!(download(&reopened, &format!("/{long}")).await.unwrap(), b"long name");

        reopened.delete_folder(&CloudPath::new("/docs")).await.unwrap();
        assert_eq!(list_names(&reopened, "/").await, [long.clone()]);
    }

    assert!(root.path().join("vault/6/d").is_dir());
    assert!(root.path().join("vault/6/m").is_dir());
    assert!(root.path().join("vault/7/d").is_dir());
}
