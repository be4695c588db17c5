//! Headless loading integration tests
//!
//! Drives the loader through the serial main-context dispatcher with
//! persistent stores, delivering fetch callbacks from other threads.

use std::sync::Arc;
use std::time::Duration;

use headless_host::config::HostConfig;
use headless_host::coordination::SerialDispatcher;
use headless_host::domain::{ExperienceId, Manifest, SdkVersion};
use headless_host::error::Result;
use headless_host::fetch::{FetchListener, ManualFetcher};
use headless_host::loader::{HeadlessAppLoader, HostEnvironment, LoadOptions, linking_uri};
use headless_host::runtime::{BuilderRegistry, DryRunRuntimeFactory, RuntimeEvent};
use headless_host::storage::{
    ErrorRecoveryStore, JsonlStorage, LAST_ERRORS_KEY, MetadataStore, StorageMetadataStore, StorageRecoveryStore,
    UNREAD_REMOTE_NOTIFICATIONS_KEY,
};
use serde_json::{Value, json};
use tempfile::TempDir;

const APP_URL: &str = "https://exp.host/@user/app";

struct Setup {
    loader: HeadlessAppLoader,
    fetcher: Arc<ManualFetcher>,
    factory: Arc<DryRunRuntimeFactory>,
    storage: Arc<JsonlStorage>,
    _temp: TempDir,
}

fn setup() -> Setup {
    let temp = TempDir::new().unwrap();
    let storage = Arc::new(JsonlStorage::new(temp.path()).unwrap());
    let factory = Arc::new(DryRunRuntimeFactory::new(SdkVersion::numbered(28, 0, 0)));
    let env = HostEnvironment::new(HostConfig::default(), BuilderRegistry::new().with(factory.clone()))
        .with_metadata_store(Arc::new(StorageMetadataStore::new(storage.clone())))
        .with_recovery_store(Arc::new(StorageRecoveryStore::new(storage.clone())));
    let fetcher = Arc::new(ManualFetcher::new());
    let (dispatcher, _task) = SerialDispatcher::spawn();
    let loader = HeadlessAppLoader::new(Arc::new(env), fetcher.clone(), Arc::new(dispatcher));
    Setup {
        loader,
        fetcher,
        factory,
        storage,
        _temp: temp,
    }
}

fn manifest() -> Manifest {
    Manifest::from_value(json!({
        "id": "@user/app",
        "sdkVersion": "28.0.0",
        "bundleUrl": "exps://exp.host/@user/app/bundle"
    }))
    .unwrap()
}

async fn wait_for_listener(fetcher: &ManualFetcher) -> Arc<dyn FetchListener> {
    for _ in 0..100 {
        if let Some(listener) = fetcher.last_listener() {
            return listener;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("fetch never started");
}

/// Deliver callbacks from a plain thread, bundle first
fn deliver_from_thread(listener: Arc<dyn FetchListener>, bundle_first: bool) {
    std::thread::spawn(move || {
        if bundle_first {
            listener.on_bundle_ready("/cache/app.bundle".to_string());
            listener.on_manifest_ready(manifest());
        } else {
            listener.on_manifest_ready(manifest());
            listener.on_bundle_ready("/cache/app.bundle".to_string());
        }
    });
}

#[tokio::test]
async fn test_either_arrival_order_builds_exactly_once() -> Result<()> {
    for bundle_first in [false, true] {
        let s = setup();
        let load = s.loader.load(APP_URL, LoadOptions::default());
        let fetcher = s.fetcher.clone();
        let driver = async move {
            deliver_from_thread(wait_for_listener(&fetcher).await, bundle_first);
        };

        let (record, ()) = tokio::join!(load, driver);
        let record = record?;

        assert!(record.is_loaded());
        assert_eq!(s.factory.build_count(), 1, "bundle_first={}", bundle_first);
    }
    Ok(())
}

#[tokio::test]
async fn test_persisted_metadata_is_consumed_at_launch() -> Result<()> {
    let s = setup();
    let id = ExperienceId::new("@user/app")?;
    let metadata = StorageMetadataStore::new(s.storage.clone());
    let Value::Object(initial) = json!({
        "lastErrors": [{"message": "TypeError"}],
        "unreadRemoteNotifications": [{"title": "hi"}],
        "lastUsed": 1700000000
    }) else {
        unreachable!()
    };
    metadata.update_metadata(&id, initial)?;
    StorageRecoveryStore::new(s.storage.clone()).record_recovery_props(&id, json!({"attempt": 1}))?;

    let load = s.loader.load(APP_URL, LoadOptions::default());
    let fetcher = s.fetcher.clone();
    let driver = async move {
        deliver_from_thread(wait_for_listener(&fetcher).await, false);
    };
    let (record, ()) = tokio::join!(load, driver);
    record?;

    let props = s.factory.last_props().unwrap();
    assert_eq!(props.exp[LAST_ERRORS_KEY], json!([{"message": "TypeError"}]));
    assert_eq!(props.exp[UNREAD_REMOTE_NOTIFICATIONS_KEY], json!([{"title": "hi"}]));
    assert_eq!(props.exp["errorRecovery"], json!({"attempt": 1}));

    // Reopen storage from disk: consumed fields are gone, the rest stays
    let reopened = Arc::new(JsonlStorage::new(s.storage.base_path())?);
    let remaining = StorageMetadataStore::new(reopened.clone()).get_metadata(&id)?.unwrap();
    assert!(!remaining.contains_key(LAST_ERRORS_KEY));
    assert!(!remaining.contains_key(UNREAD_REMOTE_NOTIFICATIONS_KEY));
    assert_eq!(remaining["lastUsed"], json!(1700000000));
    assert!(StorageRecoveryStore::new(reopened).pop_recovery_props(&id)?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_version_reports_error() {
    let s = setup();
    let load = s.loader.load(APP_URL, LoadOptions::default());
    let fetcher = s.fetcher.clone();
    let driver = async move {
        let listener = wait_for_listener(&fetcher).await;
        listener.on_manifest_ready(
            Manifest::from_value(json!({
                "id": "@user/app",
                "sdkVersion": "12.0.0",
                "bundleUrl": "https://exp.host/bundle"
            }))
            .unwrap(),
        );
    };

    let (result, ()) = tokio::join!(load, driver);
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "12.0.0 is not a valid SDK version.");
    assert_eq!(s.factory.build_count(), 0);
}

#[tokio::test]
async fn test_reload_tears_down_previous_runtime_first() -> Result<()> {
    let s = setup();
    for _ in 0..2 {
        let load = s.loader.load(APP_URL, LoadOptions::default());
        let fetcher = s.fetcher.clone();
        let started = fetcher.started_urls().len();
        let driver = async move {
            while fetcher.started_urls().len() == started {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            deliver_from_thread(fetcher.last_listener().unwrap(), false);
        };
        let (record, ()) = tokio::join!(load, driver);
        record?;
    }

    let events = s.factory.events();
    let host_destroyed = events
        .iter()
        .position(|e| *e == RuntimeEvent::HostDestroyed(0))
        .unwrap();
    let second_build = events
        .iter()
        .position(|e| matches!(e, RuntimeEvent::Built { instance: 1, .. }))
        .unwrap();
    assert!(host_destroyed < second_build);
    Ok(())
}

#[test]
fn test_linking_uri_cases() {
    let config = HostConfig::default();
    let sdk = SdkVersion::numbered(27, 0, 0);
    assert_eq!(linking_uri(&config, APP_URL, &sdk), "https://exp.host/@user/app/--/");
    assert_eq!(
        linking_uri(&config, "https://example.com/app", &sdk),
        "https://example.com/app"
    );
}
