#![allow(clippy::float_cmp)]
use minicsc_analysis::Analyzer;
use minicsc_core::{
    AnalysisConfig, ClctDigi, DetId, DigiEvent, Layer, SeriesKey, SeriesTag, StoreOptions,
    StripDigi, WireDigi,
};
use minicsc_io::{
    open_container, open_store, read_metadata, write_events, write_store, Error, EventReader,
};
use tempfile::tempdir;

fn layer(n: u8) -> Layer {
    Layer::new(n).unwrap()
}

fn synthetic_events() -> Vec<DigiEvent> {
    (0..4)
        .map(|id| {
            let peak = 100 + 25 * i32::try_from(id).unwrap();
            DigiEvent::new(id)
                .with_wires(
                    DetId::new(4, 1),
                    vec![WireDigi::new(30, vec![5]), WireDigi::new(31, vec![5, 6])],
                )
                .with_strips(
                    DetId::new(4, 3),
                    vec![
                        StripDigi::new(12, vec![1020, 1028, 1024 + peak, 1030, 1024, 1024]),
                        StripDigi::new(13, vec![1024, 1024, 1024 + 2 * peak, 1100, 1024, 1024]),
                        StripDigi::new(20, vec![1024, 1024, 1030, 1024, 1024, 1024]),
                    ],
                )
                .with_clcts(DetId::chamber(4), vec![ClctDigi::new(4, 25)])
        })
        .collect()
}

fn analyze(events: &[DigiEvent]) -> Analyzer {
    let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    for event in events {
        analyzer.process_event(event).unwrap();
    }
    analyzer.finalize().unwrap();
    analyzer
}

#[test]
fn test_json_roundtrip_reproduces_non_empty_series() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.json");
    let analyzer = analyze(&synthetic_events());
    let store = analyzer.store();

    let written = write_store(&path, store, analyzer.counters().events_processed).unwrap();
    assert_eq!(written, store.persistable().count());
    assert!(written < store.len());

    let reopened = open_store(&path, StoreOptions::strict()).unwrap();
    assert_eq!(reopened.len(), written);
    assert_eq!(reopened.source_name(), Some("run.json"));
    for (key, series) in store.persistable() {
        assert_eq!(
            reopened.get(key.tag, key.layer).unwrap(),
            Some(series),
            "{key} differs after reopening"
        );
    }

    let metadata = read_metadata(&path).unwrap();
    assert_eq!(metadata.events_processed, 4);
    assert_eq!(metadata.strip_width_charges, 5);
}

#[test]
fn test_reopened_store_policies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.json");
    let analyzer = analyze(&synthetic_events());
    write_store(&path, analyzer.store(), 4).unwrap();

    let strict = open_store(&path, StoreOptions::strict()).unwrap();
    assert!(strict.half_strip_occupancy(layer(1)).is_none());
    assert_eq!(
        strict
            .half_strip_occupancy(layer(3))
            .unwrap()
            .content_at(153.0),
        4.0
    );

    let tolerant = open_store(&path, StoreOptions::default()).unwrap();
    let empty = tolerant.half_strip_occupancy(layer(1)).unwrap();
    assert_eq!(empty.entries(), 0);
    assert_eq!(empty.integral(), 0.0);

    let charge = tolerant.get_all(SeriesTag::ChargeSpectra).unwrap();
    assert_eq!(charge.layer(layer(3)).unwrap().entries(), 4);
    assert_eq!(charge.layer(layer(4)).unwrap().entries(), 0);
}

#[test]
fn test_event_file_drives_analysis() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let events = synthetic_events();
    assert_eq!(write_events(&path, &events).unwrap(), 4);

    let read: Vec<DigiEvent> = EventReader::open(&path)
        .unwrap()
        .collect::<minicsc_io::Result<_>>()
        .unwrap();
    assert_eq!(read, events);

    let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
    let processed = analyzer
        .process_all::<_, Error>(EventReader::open(&path).unwrap())
        .unwrap();
    assert_eq!(processed, 4);
    let summary = analyzer.finalize().unwrap();
    assert_eq!(summary.charge_entries(layer(3)), 4);
    assert_eq!(summary.empty_wire_collections, 0);
}

#[test]
fn test_unknown_series_path_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        r#"{"metadata": {"format_version": "0.1", "producer": "minicsc", "strip_width_charges": 5, "adc_threshold": 32, "events_processed": 0}, "series": {"/Cathode/bogus": {"kind": "h1", "title": "", "axis": {"bins": 1, "low": 0.0, "high": 1.0}, "sum_w": [0.0, 0.0, 0.0], "sum_w2": [0.0, 0.0, 0.0], "entries": 0}}}"#,
    )
    .unwrap();
    assert!(matches!(
        open_store(&path, StoreOptions::default()),
        Err(Error::Core(_))
    ));
    assert!(SeriesKey::from_path("/Cathode/bogus").is_err());
}

#[test]
fn test_pedestal_baseline_survives_reopening() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("baseline.json");
    let mut analyzer =
        Analyzer::new(AnalysisConfig::default().with_pedestal_baseline(1000.0)).unwrap();
    for event in &synthetic_events() {
        analyzer.process_event(event).unwrap();
    }
    analyzer.finalize().unwrap();
    write_store(&path, analyzer.store(), 4).unwrap();

    let (metadata, store) = open_container(&path, StoreOptions::strict()).unwrap();
    assert_eq!(metadata.pedestal_baseline, 1000.0);
    assert_eq!(metadata.events_processed, 4);
    assert_eq!(store.config().pedestal_baseline, 1000.0);
    assert_eq!(store.source_name(), Some("baseline.json"));
}

#[test]
fn test_metadata_without_baseline_uses_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("old.json");
    std::fs::write(
        &path,
        r#"{"metadata": {"format_version": "0.1", "producer": "minicsc", "strip_width_charges": 5, "adc_threshold": 32, "events_processed": 2}, "series": {}}"#,
    )
    .unwrap();
    let metadata = read_metadata(&path).unwrap();
    assert_eq!(metadata.pedestal_baseline, 1024.0);
}

#[test]
fn test_series_with_wrong_bin_count_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.json");
    std::fs::write(
        &path,
        r#"{"metadata": {"format_version": "0.1", "producer": "minicsc", "strip_width_charges": 5, "adc_threshold": 32, "events_processed": 0}, "series": {"/Cathode/firedStrip": {"kind": "h1", "title": "", "axis": {"bins": 20, "low": 0.5, "high": 20.5}, "sum_w": [0.0, 1.0], "sum_w2": [0.0, 1.0], "entries": 1}}}"#,
    )
    .unwrap();
    assert!(matches!(
        open_store(&path, StoreOptions::default()),
        Err(Error::Json(_))
    ));
}

#[test]
fn test_unwritable_destination() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("run.json");
    let analyzer = analyze(&synthetic_events());
    assert!(matches!(
        write_store(&path, analyzer.store(), 4),
        Err(Error::Destination { .. })
    ));
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn test_hdf5_requires_feature() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.h5");
    let analyzer = analyze(&synthetic_events());
    assert!(matches!(
        write_store(&path, analyzer.store(), 4),
        Err(Error::UnsupportedFormat(_))
    ));
}
