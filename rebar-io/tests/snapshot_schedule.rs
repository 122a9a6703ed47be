use std::path::PathBuf;

use rebar_core::rebar::{NotationFamily, ShapeKind, StirrupKind};
use rebar_engine::ScheduleBuilder;
use rebar_engine::errors::ScheduleError;
use rebar_io::{
    JsonSnapshotFacade, RecordLayout, ScheduleDocument, ScheduleSaver, SnapshotLoader,
    fingerprint,
};
use rebar_layout::ShapeDiagramLayout;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_snapshot_preserves_entity_order_and_zones() {
    let snapshot = JsonSnapshotFacade::new()
        .load(&fixture("two_zone_drawing.json"))
        .expect("读取快照失败");
    assert_eq!(snapshot.name.as_deref(), Some("B1F 基礎配筋"));
    assert_eq!(snapshot.entities.len(), 11);

    let zones = snapshot.zones("$P-");
    let names: Vec<_> = zones.iter().map(|zone| zone.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);

    let mtext = &snapshot.entities[4];
    assert_eq!(
        mtext.text_lines(),
        vec!["V113°#10-900+200x2", "安#3-390x40"]
    );
}

#[test]
fn snapshot_builds_expected_zone_schedule() {
    let snapshot = JsonSnapshotFacade::new()
        .load(&fixture("two_zone_drawing.json"))
        .expect("读取快照失败");
    let schedule = ScheduleBuilder::default()
        .build_snapshot(&snapshot)
        .expect("构建计料表失败");

    let zone_a: Vec<_> = schedule
        .zone("A")
        .expect("zone A")
        .records
        .iter()
        .map(|record| record.raw_text())
        .collect();
    assert_eq!(zone_a, vec!["#4-300x10", "#99-120x2", "#5 x4 梁底"]);

    let zone_b = &schedule.zone("B").expect("zone B").records;
    assert_eq!(zone_b.len(), 3);
    assert_eq!(zone_b[0].shape(), ShapeKind::Stirrup(StirrupKind::Ground));
    assert_eq!(zone_b[1].angles(), &[113.0]);
    assert_eq!(zone_b[2].spec.family, NotationFamily::Anchor);
    assert!((zone_b[2].total_weight_kg - 0.561 * 3.9 * 40.0).abs() < 1e-9);

    let stats = schedule.stats();
    assert_eq!(stats.parsed_records, 5);
    assert_eq!(stats.malformed_notation, 1);
    assert_eq!(stats.clustered_records, 1);
    assert_eq!(stats.unlabeled_groups, 1);
    assert_eq!(stats.unknown_designations, 1);
    assert_eq!(stats.zone_misses, 1);

    let summary = schedule.designation_summary();
    let designations: Vec<_> = summary.iter().map(|s| s.designation.as_str()).collect();
    assert_eq!(designations, vec!["#3", "#4", "#5", "#10", "#99"]);
    let five = &summary[2];
    assert_eq!(five.records, 2);
    assert_eq!(five.bars, 24);

    let totals = schedule.totals();
    assert_eq!(totals.records, 6);
    assert_eq!(totals.bars, 10 + 20 + 2 + 40 + 2 + 4);
}

#[test]
fn invalid_zone_polygon_fails_the_build() {
    let snapshot = JsonSnapshotFacade::new()
        .load(&fixture("broken_zone.json"))
        .expect("读取快照失败");
    let err = ScheduleBuilder::default()
        .build_snapshot(&snapshot)
        .unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidZone { ref name, vertices: 2 } if name == "X"));
}

#[test]
fn missing_snapshot_is_a_read_error() {
    let err = JsonSnapshotFacade::new()
        .load(&fixture("does_not_exist.json"))
        .unwrap_err();
    assert!(matches!(err, rebar_io::IoError::ReadError { .. }));
}

#[test]
fn saved_document_round_trips_with_layouts_and_fingerprint() {
    let facade = JsonSnapshotFacade::new();
    let snapshot = facade
        .load(&fixture("two_zone_drawing.json"))
        .expect("读取快照失败");
    let schedule = ScheduleBuilder::default()
        .build_snapshot(&snapshot)
        .expect("构建计料表失败");

    let layout = ShapeDiagramLayout::default();
    let layouts: Vec<RecordLayout> = schedule
        .records()
        .map(|record| RecordLayout {
            record: record.id,
            layout: layout.layout_record(record),
        })
        .collect();
    let document = ScheduleDocument::new(schedule.clone(), layouts)
        .expect("生成输出文档失败")
        .with_source("two_zone_drawing.json");
    assert_eq!(document.layouts.len(), 6);
    assert_eq!(document.fingerprint, fingerprint(&schedule).expect("fingerprint"));

    let dir = tempfile::tempdir().expect("create temp dir");
    let output = dir.path().join("schedule.json");
    facade.save(&document, &output).expect("写出计料表失败");

    let written = std::fs::read_to_string(&output).expect("read output");
    let restored: ScheduleDocument = serde_json::from_str(&written).expect("decode output");
    assert_eq!(restored.fingerprint, document.fingerprint);
    assert_eq!(restored.schedule.len(), schedule.len());
    assert_eq!(restored.source.as_deref(), Some("two_zone_drawing.json"));
}

#[test]
fn fingerprint_is_reproducible_across_runs() {
    let facade = JsonSnapshotFacade::new();
    let builder = ScheduleBuilder::default();
    let run = || {
        let snapshot = facade
            .load(&fixture("two_zone_drawing.json"))
            .expect("读取快照失败");
        let schedule = builder.build_snapshot(&snapshot).expect("构建计料表失败");
        fingerprint(&schedule).expect("fingerprint")
    };
    assert_eq!(run(), run());
}
