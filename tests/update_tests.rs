use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use craft_warden::error::{Error, Result};
use craft_warden::server::{AdminCommand, ServerControl, ServerStatus};
use craft_warden::update::manifest::{
    DownloadItem, ManifestSource, ReleaseDetails, ReleaseDownloads, VersionManifest,
};
use craft_warden::update::{UpdateCoordinator, UpdateOutcome, UpdateTransaction};
use craft_warden::version::{
    CurrentVersion, InstanceStore, ServerType, VersionCatalog, VersionDescriptor,
};
use mockall::predicate::*;
use mockall::{Sequence, mock};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

mock! {
    pub Control {}

    #[async_trait]
    impl ServerControl for Control {
        fn status(&self) -> ServerStatus;
        async fn start(&self) -> Result<()>;
        async fn stop(&self, force: bool) -> Result<()>;
        async fn send_command(&self, command: AdminCommand) -> Result<()>;
        fn active_sessions(&self) -> usize;
        fn clear_dirty(&self);
        fn clear_corrupt_artifact(&self);
    }
}

mock! {
    pub Catalog {}

    #[async_trait]
    impl VersionCatalog for Catalog {
        async fn find_current(&self, server_type: ServerType) -> Result<Option<VersionDescriptor>>;
        async fn find_by_id(&self, id: i64) -> Result<Option<VersionDescriptor>>;
        async fn find_by_name(
            &self,
            server_type: ServerType,
            version_name: &str,
        ) -> Result<Option<VersionDescriptor>>;
        async fn record(
            &self,
            server_type: ServerType,
            version_name: &str,
            release_timestamp: DateTime<Utc>,
        ) -> Result<VersionDescriptor>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl InstanceStore for Store {
        async fn save_current_version(&self, version_id: i64) -> Result<()>;
    }
}

mock! {
    pub Source {}

    #[async_trait]
    impl ManifestSource for Source {
        async fn fetch_manifest(&self) -> Result<VersionManifest>;
        async fn fetch_release(&self, url: &str) -> Result<ReleaseDetails>;
        async fn download(&self, url: &str, destination: &Path) -> Result<()>;
    }
}

fn version(id: i64, name: &str, server_type: ServerType) -> VersionDescriptor {
    VersionDescriptor {
        id,
        version_name: name.to_string(),
        server_type,
        release_timestamp: Utc.with_ymd_and_hms(2024, 12, 3, 10, 12, 57).unwrap(),
    }
}

fn coordinator(
    control: MockControl,
    catalog: MockCatalog,
    store: MockStore,
    current: CurrentVersion,
) -> UpdateCoordinator {
    coordinator_in(Path::new("/srv/jar"), control, catalog, store, current)
}

fn coordinator_in(
    artifact_dir: &Path,
    control: MockControl,
    catalog: MockCatalog,
    store: MockStore,
    current: CurrentVersion,
) -> UpdateCoordinator {
    UpdateCoordinator::new(
        "test-server",
        ServerType::Release,
        artifact_dir,
        Arc::new(control),
        Arc::new(catalog),
        Arc::new(store),
        current,
    )
}

#[tokio::test]
async fn test_same_version_is_a_no_op() -> Result<()> {
    let mut store = MockStore::new();
    store.expect_save_current_version().never();

    let current = CurrentVersion::new(Some(version(3, "1.21.3", ServerType::Release)));
    let updates = coordinator(MockControl::new(), MockCatalog::new(), store, current);

    let outcome = updates
        .apply_version(&version(3, "1.21.3", ServerType::Release))
        .await?;

    assert_eq!(outcome, UpdateOutcome::AlreadyCurrent);
    assert_eq!(updates.current_version()?.map(|v| v.id), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_running_server_is_restarted_on_the_new_version() -> Result<()> {
    let mut seq = Sequence::new();
    let mut control = MockControl::new();
    let mut store = MockStore::new();

    control
        .expect_status()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| ServerStatus::Running);
    control
        .expect_stop()
        .with(eq(false))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    store
        .expect_save_current_version()
        .with(eq(4))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    control
        .expect_clear_corrupt_artifact()
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    control
        .expect_start()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));

    let current = CurrentVersion::new(Some(version(3, "1.21.3", ServerType::Release)));
    let updates = coordinator(control, MockCatalog::new(), store, current.clone());

    let outcome = updates
        .apply_version(&version(4, "1.21.4", ServerType::Release))
        .await?;

    assert_eq!(
        outcome,
        UpdateOutcome::Applied(UpdateTransaction {
            from_version: Some(3),
            to_version: 4,
            was_running: true,
        })
    );
    assert_eq!(current.id()?, Some(4));
    Ok(())
}

#[tokio::test]
async fn test_stopped_server_stays_stopped() -> Result<()> {
    let mut control = MockControl::new();
    control
        .expect_status()
        .returning(|| ServerStatus::Stopped);
    control.expect_stop().never();
    control.expect_start().never();
    control.expect_clear_corrupt_artifact().return_const(());

    let mut store = MockStore::new();
    store
        .expect_save_current_version()
        .with(eq(4))
        .times(1)
        .returning(|_| Ok(()));

    let updates = coordinator(control, MockCatalog::new(), store, CurrentVersion::default());
    let outcome = updates
        .apply_version(&version(4, "1.21.4", ServerType::Release))
        .await?;

    assert_eq!(
        outcome,
        UpdateOutcome::Applied(UpdateTransaction {
            from_version: None,
            to_version: 4,
            was_running: false,
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_type_mismatch_changes_nothing() {
    let mut store = MockStore::new();
    store.expect_save_current_version().never();

    let current = CurrentVersion::new(Some(version(3, "1.21.3", ServerType::Release)));
    let updates = coordinator(MockControl::new(), MockCatalog::new(), store, current.clone());

    let result = updates
        .apply_version(&version(9, "25w02a", ServerType::Snapshot))
        .await;

    assert!(matches!(
        result,
        Err(Error::VersionTypeMismatch {
            version_id: 9,
            requested: ServerType::Snapshot,
            configured: ServerType::Release,
        })
    ));
    assert_eq!(current.id().unwrap(), Some(3));
}

#[tokio::test]
async fn test_failed_save_restarts_on_the_old_version() {
    let mut control = MockControl::new();
    control
        .expect_status()
        .returning(|| ServerStatus::Running);
    control.expect_stop().times(1).returning(|_| Ok(()));
    control.expect_start().times(1).returning(|| Ok(()));
    control.expect_clear_corrupt_artifact().never();

    let mut store = MockStore::new();
    store
        .expect_save_current_version()
        .returning(|_| Err(Error::Other("database is gone".to_string())));

    let current = CurrentVersion::new(Some(version(3, "1.21.3", ServerType::Release)));
    let updates = coordinator(control, MockCatalog::new(), store, current.clone());

    let result = updates
        .apply_version(&version(4, "1.21.4", ServerType::Release))
        .await;

    assert!(matches!(result, Err(Error::Other(_))));
    assert_eq!(current.id().unwrap(), Some(3));
}

#[tokio::test]
async fn test_apply_latest_and_by_id() -> Result<()> {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_find_current()
        .with(eq(ServerType::Release))
        .returning(|_| Ok(Some(version(4, "1.21.4", ServerType::Release))));
    catalog
        .expect_find_by_id()
        .with(eq(99))
        .returning(|_| Ok(None));

    let current = CurrentVersion::new(Some(version(4, "1.21.4", ServerType::Release)));
    let updates = coordinator(MockControl::new(), catalog, MockStore::new(), current);

    assert_eq!(updates.apply_latest().await?, UpdateOutcome::AlreadyCurrent);
    assert!(matches!(
        updates.apply_version_id(99).await,
        Err(Error::VersionNotFound(_))
    ));
    Ok(())
}

const MANIFEST: &str = r#"{
    "latest": { "release": "1.21.4", "snapshot": "25w02a" },
    "versions": [
        { "id": "25w02a", "type": "snapshot", "url": "https://example.invalid/25w02a.json",
          "time": "2025-01-08T13:00:00+00:00", "releaseTime": "2025-01-08T12:00:00+00:00" },
        { "id": "1.21.4", "type": "release", "url": "https://example.invalid/1.21.4.json",
          "time": "2024-12-03T10:12:57+00:00", "releaseTime": "2024-12-03T10:12:57+00:00" },
        { "id": "1.21.3", "type": "release", "url": "https://example.invalid/1.21.3.json",
          "time": "2024-10-23T12:28:15+00:00", "releaseTime": "2024-10-23T12:28:15+00:00" }
    ]
}"#;

fn release_with_server() -> ReleaseDetails {
    ReleaseDetails {
        id: "1.21.4".to_string(),
        downloads: ReleaseDownloads {
            client: None,
            server: Some(DownloadItem {
                sha1: "4707d00eb834b446575d89a61a11b5d548d8c001".to_string(),
                size: 57_000_000,
                url: "https://example.invalid/server.jar".to_string(),
            }),
        },
    }
}

fn write_download(destination: &Path) -> Result<()> {
    std::fs::write(destination, "jar").map_err(|e| Error::Io(e.to_string()))
}

#[tokio::test]
async fn test_check_records_and_downloads_unknown_versions() -> Result<()> {
    let artifacts = TempDir::new().unwrap();
    std::fs::write(artifacts.path().join("release_3.jar"), "jar").unwrap();
    let manifest = VersionManifest::parse_from_str(MANIFEST)?;

    let mut source = MockSource::new();
    source
        .expect_fetch_manifest()
        .times(1)
        .returning(move || Ok(manifest.clone()));
    source
        .expect_fetch_release()
        .with(eq("https://example.invalid/1.21.4.json"))
        .times(1)
        .returning(|_| Ok(release_with_server()));
    source
        .expect_download()
        .withf(|url, destination| {
            url == "https://example.invalid/server.jar"
                && destination.file_name() == Some(OsStr::new("release_5.jar.part"))
        })
        .times(1)
        .returning(|_, destination| write_download(destination));

    let mut catalog = MockCatalog::new();
    catalog
        .expect_find_by_name()
        .withf(|_, name| name == "1.21.3")
        .returning(|_, _| Ok(Some(version(3, "1.21.3", ServerType::Release))));
    catalog
        .expect_find_by_name()
        .withf(|_, name| name == "1.21.4")
        .returning(|_, _| Ok(None));
    catalog
        .expect_record()
        .withf(|server_type, name, _| *server_type == ServerType::Release && name == "1.21.4")
        .times(1)
        .returning(|_, _, _| Ok(version(5, "1.21.4", ServerType::Release)));

    let updates = coordinator_in(
        artifacts.path(),
        MockControl::new(),
        catalog,
        MockStore::new(),
        CurrentVersion::default(),
    );
    let added = updates.check_for_new_versions(&source).await?;

    assert_eq!(added.len(), 1);
    assert_eq!(added[0].id, 5);
    assert!(artifacts.path().join("release_5.jar").exists());
    assert!(!artifacts.path().join("release_5.jar.part").exists());
    Ok(())
}

#[tokio::test]
async fn test_failed_download_is_retried_by_next_check() -> Result<()> {
    let artifacts = TempDir::new().unwrap();
    std::fs::write(artifacts.path().join("release_3.jar"), "jar").unwrap();
    let manifest = VersionManifest::parse_from_str(MANIFEST)?;

    let mut source = MockSource::new();
    source
        .expect_fetch_manifest()
        .times(2)
        .returning(move || Ok(manifest.clone()));
    source
        .expect_fetch_release()
        .times(2)
        .returning(|_| Ok(release_with_server()));

    let mut seq = Sequence::new();
    source
        .expect_download()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, destination| {
            // Half a file, then the connection drops
            std::fs::write(destination, "ja").unwrap();
            Err(Error::Io("network down".to_string()))
        });
    source
        .expect_download()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, destination| write_download(destination));

    // 1.21.4 is unknown on the first check and recorded once
    let lookups = Arc::new(AtomicUsize::new(0));
    let mut catalog = MockCatalog::new();
    catalog
        .expect_find_by_name()
        .withf(|_, name| name == "1.21.3")
        .returning(|_, _| Ok(Some(version(3, "1.21.3", ServerType::Release))));
    catalog
        .expect_find_by_name()
        .withf(|_, name| name == "1.21.4")
        .returning(move |_, _| {
            if lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(version(5, "1.21.4", ServerType::Release)))
            }
        });
    catalog
        .expect_record()
        .times(1)
        .returning(|_, _, _| Ok(version(5, "1.21.4", ServerType::Release)));

    let updates = coordinator_in(
        artifacts.path(),
        MockControl::new(),
        catalog,
        MockStore::new(),
        CurrentVersion::default(),
    );

    let first = updates.check_for_new_versions(&source).await;
    assert!(matches!(first, Err(Error::Io(_))));
    assert!(!artifacts.path().join("release_5.jar").exists());
    assert!(!artifacts.path().join("release_5.jar.part").exists());

    let second = updates.check_for_new_versions(&source).await?;
    assert_eq!(second.iter().map(|v| v.id).collect::<Vec<_>>(), vec![5]);
    assert!(artifacts.path().join("release_5.jar").exists());
    Ok(())
}
