mod common;

use common::{ScriptedFetcher, env, uniform_document};
use pvflags_core::overrides::MemoryOverrideStore;
use pvflags_core::remote::DocumentLocation;
use pvflags_core::{Channel, FeatureFlagService, FlagEvent, LoadError};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const WAIT: Duration = Duration::from_secs(10);

fn scripted_service() -> (Arc<FeatureFlagService>, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let svc = Arc::new(FeatureFlagService::with_fetcher(
        env(Channel::Standard, None, "1.0"),
        Box::new(MemoryOverrideStore::new()),
        fetcher.clone(),
    ));
    (svc, fetcher)
}

fn url(s: &str) -> DocumentLocation {
    DocumentLocation::Url(s.to_string())
}

#[test]
fn loads_document_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flags.json");
    fs::write(
        &path,
        r#"{"features": {"inAppFreeROMs": {"enabled": true, "description": "Free ROM downloads"}}}"#,
    )
    .unwrap();

    let svc = common::memory_service(env(Channel::Standard, None, "1.0"));
    let rx = svc.subscribe();
    let summary = svc
        .load_configuration(DocumentLocation::File(path))
        .wait()
        .unwrap();

    assert_eq!(summary.features, 1);
    assert!(svc.is_enabled("inAppFreeROMs"));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        FlagEvent::ConfigurationLoaded { features: 1 }
    );
}

#[test]
fn failed_loads_keep_previous_flags() {
    let (svc, fetcher) = scripted_service();
    fetcher.serve("mem://good", br#"{"features": {"f": {"enabled": true}}}"#);
    fetcher.serve("mem://bad", br#"{"features": {"f": {"enabled": "#);

    svc.load_configuration(url("mem://good")).wait().unwrap();
    let rx = svc.subscribe();

    let parse = svc.load_configuration(url("mem://bad")).wait();
    assert!(matches!(parse, Err(LoadError::Parse(_))));

    let missing = svc.load_configuration(url("mem://missing")).wait();
    assert!(matches!(missing, Err(LoadError::Fetch(_))));

    assert!(svc.is_enabled("f"));
    assert_eq!(svc.snapshot().len(), 1);

    let events: Vec<FlagEvent> = rx.try_iter().collect();
    assert_eq!(events.len(), 2);
    assert!(
        events
            .iter()
            .all(|e| matches!(e, FlagEvent::LoadFailed { .. }))
    );
}

#[test]
fn older_load_finishing_late_is_discarded() {
    let (svc, fetcher) = scripted_service();
    fetcher.serve("mem://v1", br#"{"features": {"f": {"enabled": false}, "old": {"enabled": true}}}"#);
    fetcher.serve("mem://v2", br#"{"features": {"f": {"enabled": true}}}"#);
    let release_v1 = fetcher.gate("mem://v1");

    let first = svc.load_configuration(url("mem://v1"));
    let second = svc.load_configuration(url("mem://v2"));
    assert!(first.ticket() < second.ticket());

    second.wait().unwrap();
    release_v1.send(()).unwrap();

    let stale = first.wait();
    assert!(matches!(stale, Err(LoadError::Superseded { .. })));
    assert!(svc.is_enabled("f"));
    assert!(!svc.snapshot().contains("old"));
}

#[test]
fn pending_load_can_be_polled() {
    let (svc, fetcher) = scripted_service();
    fetcher.serve("mem://slow", br#"{"features": {}}"#);
    let release = fetcher.gate("mem://slow");

    let handle = svc.load_configuration(url("mem://slow"));
    assert!(handle.try_result().is_none());

    release.send(()).unwrap();
    let result = handle.wait_timeout(WAIT).expect("load did not finish");
    assert_eq!(result.unwrap().features, 0);
}

#[test]
fn readers_never_see_a_mixed_flag_set() {
    let keys: Vec<String> = (0..64).map(|i| format!("feature{i}")).collect();
    let all_on = uniform_document(&keys, true);
    let all_off = uniform_document(&keys, false);

    let svc = common::memory_service(env(Channel::Standard, None, "1.0"));
    svc.apply_document(&all_on).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snapshot = svc.snapshot();
                    let enabled: Vec<bool> = snapshot.iter().map(|(_, f)| f.enabled).collect();
                    assert_eq!(enabled.len(), 64);
                    assert!(
                        enabled.iter().all(|&e| e == enabled[0]),
                        "observed a torn flag set"
                    );
                }
            })
        })
        .collect();

    for i in 0..200 {
        let doc = if i % 2 == 0 { &all_off } else { &all_on };
        svc.apply_document(doc).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn racing_overrides_report_the_final_state_last() {
    for _ in 0..500 {
        let svc = common::memory_service(env(Channel::Standard, None, "1.0"));
        let rx = svc.subscribe();
        let barrier = Arc::new(Barrier::new(2));

        let writers: Vec<_> = [true, false]
            .into_iter()
            .map(|value| {
                let svc = Arc::clone(&svc);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    svc.set_override("k", value).unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = rx.try_iter().last();
        assert_eq!(
            last,
            Some(FlagEvent::OverrideChanged {
                key: "k".to_string(),
                value: svc.get_override("k"),
            })
        );
    }
}
