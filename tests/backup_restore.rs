//! End-to-end backup and restore: archive round trips, ignore filtering,
//! token guarding, and the automatic post-restore integrity check.

use std::io::Cursor;

use tempfile::TempDir;

use treevault::archive::{self, ArchiveReader, EncryptionMode};
use treevault::backup::{BackupError, BackupManager, RestoreToken};
use treevault::config::VaultConfig;
use treevault::repo::LocalRepository;
use treevault::store::{FileObject, NodeStore, SizeChecker};

fn open_store() -> (NodeStore<LocalRepository>, TempDir) {
    let temp = TempDir::new().unwrap();
    let repo = LocalRepository::init(temp.path()).unwrap();
    (NodeStore::new(repo), temp)
}

fn seed(store: &mut NodeStore<LocalRepository>) {
    let checker = SizeChecker::new(10_000);
    store.ensure_node(None, "world/europe/germany").unwrap();
    store.ensure_node(None, "world/datatransfer").unwrap();
    store
        .store_property("/world/europe", "germany", "capital", "Berlin")
        .unwrap();

    let mut logo = FileObject::new("/world/europe/germany", "assets", "logo.png")
        .with_content(b"logo".to_vec());
    store.store_file(&mut logo, &checker, None).unwrap();

    let mut secret = FileObject::new("/world/europe/germany", "assets", "treaty.pdf")
        .with_content(b"sealed treaty".to_vec());
    store.store_file(&mut secret, &checker, Some("pw")).unwrap();

    let mut spool = FileObject::new("/world/datatransfer", "spool", "chunk.bin")
        .with_content(b"transient".to_vec());
    store.store_file(&mut spool, &checker, None).unwrap();
}

// ============================================================
// Round trip
// ============================================================

#[test]
fn test_backup_then_restore_reproduces_tree() {
    let (mut source, _a) = open_store();
    seed(&mut source);

    let manager = BackupManager::new();
    let mut archive_bytes = Vec::new();
    let report = manager.backup_to_archive(&source, "world", &mut archive_bytes).unwrap();
    assert_eq!(report.files, 3);

    let (mut target, _b) = open_store();
    let check = manager
        .restore_from_archive(&mut target, &RestoreToken::default(), Cursor::new(&archive_bytes))
        .unwrap();
    assert!(check.is_clean(), "post-restore check: {}", check);
    assert_eq!(check.visited_files, 3);

    assert_eq!(
        target
            .retrieve_property("/world/europe", "germany", "capital")
            .unwrap()
            .as_deref(),
        Some("Berlin")
    );
    let mut src_logo = FileObject::new("/world/europe/germany", "assets", "logo.png");
    source.retrieve_file(&mut src_logo, None).unwrap();
    let original_id = src_logo.file_id.unwrap();

    let mut logo = FileObject::new("/world/europe/germany", "assets", "logo.png");
    assert_eq!(
        target.retrieve_file(&mut logo, None).unwrap().content(),
        Some(b"logo".as_slice())
    );
    // ids and checksums are preserved, not reassigned
    assert_eq!(logo.file_id, Some(original_id));

    let mut treaty = FileObject::new("/world/europe/germany", "assets", "treaty.pdf");
    assert_eq!(
        target.retrieve_file(&mut treaty, Some("pw")).unwrap().content(),
        Some(b"sealed treaty".as_slice())
    );
}

// ============================================================
// Ignored segments
// ============================================================

#[test]
fn test_ignored_segments_filter_backup_and_restore() {
    let (mut source, _a) = open_store();
    seed(&mut source);

    let mut manager = BackupManager::new();
    manager.register_ignored_segment("datatransfer");
    let mut filtered = Vec::new();
    let report = manager.backup_to_archive(&source, "world", &mut filtered).unwrap();
    assert_eq!(report.files, 2);

    let mut names = Vec::new();
    ArchiveReader::new(Cursor::new(&filtered))
        .for_each(|name, _| -> archive::ArchiveResult<()> {
            names.push(name.to_string());
            Ok(())
        })
        .unwrap();
    assert!(names.iter().all(|n| !n.contains("datatransfer")), "{:?}", names);

    // an unfiltered archive restored through a filtering manager is trimmed too
    let open_manager = BackupManager::new();
    let mut full = Vec::new();
    open_manager.backup_to_archive(&source, "world", &mut full).unwrap();

    let (mut target, _b) = open_store();
    let check = manager
        .restore_from_archive(&mut target, &RestoreToken::default(), Cursor::new(&full))
        .unwrap();
    assert!(check.is_clean(), "{}", check);
    let mut spool = FileObject::new("/world/datatransfer", "spool", "chunk.bin");
    assert!(!target.retrieve_file(&mut spool, None).unwrap().is_found());
}

// ============================================================
// Token guarding
// ============================================================

#[test]
fn test_restore_requires_matching_token() {
    let (mut source, _a) = open_store();
    seed(&mut source);
    let manager = BackupManager::new();
    let mut archive_bytes = Vec::new();
    manager.backup_to_archive(&source, "world", &mut archive_bytes).unwrap();

    let (mut target, _b) = open_store();
    let result = manager.restore_from_archive(
        &mut target,
        &RestoreToken::new("yes really"),
        Cursor::new(&archive_bytes),
    );
    assert!(matches!(result, Err(BackupError::ConfirmationMismatch)));
    // nothing was created
    let mut logo = FileObject::new("/world/europe/germany", "assets", "logo.png");
    assert!(!target.retrieve_file(&mut logo, None).unwrap().is_found());
}

#[test]
fn test_config_driven_manager_accepts_configured_phrase() {
    let config: VaultConfig =
        serde_json::from_str(r#"{"restore_token": "my deployment phrase"}"#).unwrap();
    let manager = config.backup_manager();

    let (mut source, _a) = open_store();
    seed(&mut source);
    let mut archive_bytes = Vec::new();
    manager.backup_to_archive(&source, "world", &mut archive_bytes).unwrap();

    let (mut target, _b) = open_store();
    assert!(matches!(
        manager.restore_from_archive(
            &mut target,
            &RestoreToken::default(),
            Cursor::new(&archive_bytes)
        ),
        Err(BackupError::ConfirmationMismatch)
    ));
    let check = manager
        .restore_from_archive(
            &mut target,
            &RestoreToken::new("my deployment phrase"),
            Cursor::new(&archive_bytes),
        )
        .unwrap();
    assert!(check.is_clean());
}

// ============================================================
// Archive codec surface
// ============================================================

#[test]
fn test_single_entry_archive_modes() {
    let content = b"standalone attachment";
    for mode in [
        EncryptionMode::Standard,
        EncryptionMode::Aes128,
        EncryptionMode::Aes256,
    ] {
        let mut sealed = Vec::new();
        archive::encrypt("doc.bin", "pw", mode, &mut Cursor::new(content), &mut sealed).unwrap();

        assert!(archive::is_encrypted(Cursor::new(&sealed)).unwrap());
        assert!(archive::test_decrypt("pw", Cursor::new(&sealed)).unwrap());
        assert!(!archive::test_decrypt("other", Cursor::new(&sealed)).unwrap());
        assert_eq!(
            archive::decrypt_entry("doc.bin", Some("pw"), Cursor::new(&sealed)).unwrap(),
            content
        );
    }
}

#[test]
fn test_backup_archives_are_not_encrypted() {
    let (mut source, _a) = open_store();
    seed(&mut source);
    let mut archive_bytes = Vec::new();
    BackupManager::new().backup_to_archive(&source, "world", &mut archive_bytes).unwrap();
    // first entry is the plain manifest
    assert!(!archive::is_encrypted(Cursor::new(&archive_bytes)).unwrap());
}
