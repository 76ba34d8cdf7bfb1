//! Integration tests for per-connection command handling.
//!
//! Each test drives a `LayoutViewEndpoint` with JSON text, exactly as the
//! WebSocket layer would, and inspects what it sent through a recording
//! sink.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{config_for, rdb_json, registry_with, sample_gds, RecordingSink, ScratchDir, StubEngine};
use gdsview_core::{decode_frame, EngineError, EngineOptions, Frame, GeometryEngine, LayoutFile, RenderRequest};
use gdsview_engine::GdsEngine;
use gdsview_server::application::{Flow, LayoutViewEndpoint, SessionRegistry};
use mockall::mock;

fn endpoint(registry: &SessionRegistry) -> LayoutViewEndpoint<RecordingSink> {
    LayoutViewEndpoint::new(registry.clone(), RecordingSink::default())
}

/// Scratch root holding `a.gds`, served by the stub engine.
async fn connected(dir: &ScratchDir, registry: &SessionRegistry) -> LayoutViewEndpoint<RecordingSink> {
    dir.write("a.gds", b"x");
    let mut ep = endpoint(registry);
    ep.on_connect(Some("a.gds")).await.unwrap();
    ep.sink_mut().clear();
    ep
}

/// Scratch root holding the real `sample.gds`, served by the GDSII engine.
async fn connected_sample(dir: &ScratchDir, registry: &SessionRegistry) -> LayoutViewEndpoint<RecordingSink> {
    dir.write("sample.gds", &sample_gds());
    let mut ep = endpoint(registry);
    ep.on_connect(Some("sample.gds")).await.unwrap();
    ep.sink_mut().clear();
    ep
}

/// `markers` of the last frame header sent.
fn last_frame_markers(sink: &RecordingSink) -> u64 {
    sink.messages()
        .iter()
        .rev()
        .find(|m| m["msg"] == "frame")
        .and_then(|m| m["markers"].as_u64())
        .expect("a frame was sent")
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_sends_initial_state_in_order() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("sample.gds", &sample_gds());
    let registry = registry_with(Arc::new(GdsEngine::new()), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    // Act
    ep.on_connect(Some("sample.gds")).await.unwrap();

    // Assert
    let sink = ep.sink();
    assert_eq!(sink.tags(), ["opened", "layer-list", "hierarchy", "metainfo", "frame"]);
    let msgs = sink.messages();
    assert_eq!(msgs[0]["cell"], "TOP");
    assert_eq!(msgs[0]["top_cells"], serde_json::json!(["TOP"]));
    assert_eq!(msgs[0]["editable"], false);
    assert_eq!(msgs[1]["layers"].as_array().unwrap().len(), 2);
    assert_eq!(msgs[3]["entries"]["owner"], "chip-team");

    let binaries = sink.binaries();
    assert_eq!(binaries.len(), 1);
    assert_eq!(msgs[4]["bytes"], binaries[0].len());
    let (frame, _) = decode_frame(&binaries[0]).unwrap();
    assert_eq!(msgs[4]["seq"], frame.seq);
    assert_eq!((frame.width, frame.height), (800, 600));
}

#[tokio::test]
async fn test_connect_without_file_reports_no_session() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    ep.on_connect(None).await.unwrap();

    assert_eq!(ep.sink().tags(), ["error"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("no-session"));
    assert!(ep.session().is_none());
}

#[tokio::test]
async fn test_connect_uses_default_file() {
    let dir = ScratchDir::new();
    let file = dir.write("default.gds", b"x");
    let mut config = config_for(dir.path());
    config.default_file = Some(file);
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = endpoint(&registry);

    ep.on_connect(None).await.unwrap();

    assert_eq!(ep.sink().tags()[0], "opened");
    assert!(ep.session().is_some());
}

#[tokio::test]
async fn test_connect_to_escaping_path_reports_path_escape() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    ep.on_connect(Some("../../etc/passwd")).await.unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("path-escape"));
}

// ── Command parsing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_and_malformed_commands_keep_connection() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    let unknown = ep.handle_text(r#"{"msg":"fly-to-moon"}"#).await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("unknown-command"));

    let malformed = ep.handle_text(r#"{"msg":"set-viewport","x":"left"}"#).await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("malformed-command"));

    let garbage = ep.handle_text("not json").await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("malformed-command"));

    assert_eq!([unknown, malformed, garbage], [Flow::Continue; 3]);
    assert!(ep.session().is_some());
}

#[tokio::test]
async fn test_close_detaches_and_ends_connection() {
    // Arrange
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    // Act
    let flow = ep.handle_text(r#"{"msg":"close"}"#).await.unwrap();

    // Assert
    assert_eq!(flow, Flow::Close);
    assert_eq!(ep.sink().tags(), ["closed"]);
    assert!(ep.session().is_none());
    assert_eq!(registry.session_count(), 0);
}

// ── View commands ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_viewport_sends_header_then_frame() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"set-viewport","x":1.5,"y":-2,"scale":4}"#).await.unwrap();

    let sink = ep.sink();
    assert_eq!(sink.tags(), ["frame"]);
    assert_eq!(sink.binaries().len(), 1);
    let header = &sink.messages()[0];
    assert_eq!(header["viewport"]["x"], 1.5);
    assert_eq!(header["viewport"]["scale"], 4.0);
}

#[tokio::test]
async fn test_invalid_viewport_is_reported() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"set-viewport","x":0,"y":0,"scale":0}"#).await.unwrap();

    assert_eq!(ep.sink().tags(), ["error"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("invalid-viewport"));
}

#[tokio::test]
async fn test_layer_visibility_sends_layer_list_and_frame() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"set-layer-visibility","layer":2,"visible":false}"#)
        .await
        .unwrap();

    let sink = ep.sink();
    assert_eq!(sink.tags(), ["layer-list", "frame"]);
    let layers = sink.messages()[0]["layers"].as_array().unwrap().clone();
    let hidden = layers.iter().find(|l| l["layer"] == 2).unwrap();
    assert_eq!(hidden["visible"], false);
}

#[tokio::test]
async fn test_style_change_on_read_only_server() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r##"{"msg":"set-layer-style","layer":1,"color":"#00ff00"}"##)
        .await
        .unwrap();

    assert_eq!(ep.sink().tags(), ["error"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("read-only"));
}

#[tokio::test]
async fn test_bad_color_is_invalid_style() {
    let dir = ScratchDir::new();
    let mut config = config_for(dir.path());
    config.editable = true;
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"set-layer-style","layer":1,"color":"chartreuse-ish"}"#)
        .await
        .unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("invalid-style"));
}

#[tokio::test]
async fn test_huge_line_width_is_refused_and_rendering_continues() {
    // Arrange
    let dir = ScratchDir::new();
    let mut config = config_for(dir.path());
    config.editable = true;
    let registry = registry_with(Arc::new(GdsEngine::new()), config);
    let mut ep = connected_sample(&dir, &registry).await;

    // Act
    ep.handle_text(r#"{"msg":"set-layer-style","layer":1,"line_width":65535}"#)
        .await
        .unwrap();
    ep.handle_text(r#"{"msg":"set-viewport","x":5,"y":5,"scale":60}"#)
        .await
        .unwrap();

    // Assert
    assert_eq!(ep.sink().tags(), ["error", "frame"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("invalid-style"));
    let layers = ep.session().unwrap().snapshot().layers;
    assert!(layers.iter().all(|l| l.style.line_width == 1));
}

#[tokio::test]
async fn test_select_unknown_cell() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"select-cell","cell":"NOPE"}"#).await.unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("unknown-cell"));
}

#[tokio::test]
async fn test_set_format_switches_this_connection_only() {
    // Arrange
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut vector = connected(&dir, &registry).await;
    let mut raster = connected(&dir, &registry).await;

    // Act
    vector.handle_text(r#"{"msg":"set-format","format":"vector"}"#).await.unwrap();
    raster.handle_text(r#"{"msg":"zoom-fit"}"#).await.unwrap();

    // Assert
    assert_eq!(vector.sink().messages()[0]["format"], "vector");
    assert_eq!(raster.sink().messages()[0]["format"], "raster");
    assert_eq!(vector.session().unwrap().id(), raster.session().unwrap().id());
}

#[tokio::test]
async fn test_get_layers_does_not_render() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"get-layers"}"#).await.unwrap();

    assert_eq!(ep.sink().tags(), ["layer-list"]);
    assert!(ep.sink().binaries().is_empty());
}

#[tokio::test]
async fn test_commands_before_open_report_no_session() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    ep.handle_text(r#"{"msg":"zoom-fit"}"#).await.unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("no-session"));
}

#[tokio::test]
async fn test_open_switches_session_and_releases_old_one() {
    let dir = ScratchDir::new();
    dir.write("b.gds", b"x");
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;
    let old = ep.session().unwrap().id();

    ep.handle_text(r#"{"msg":"open","path":"b.gds"}"#).await.unwrap();

    assert_ne!(ep.session().unwrap().id(), old);
    assert_eq!(ep.sink().tags()[0], "opened");
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test]
async fn test_failed_open_keeps_current_session() {
    let dir = ScratchDir::new();
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;
    let current = ep.session().unwrap().id();

    ep.handle_text(r#"{"msg":"open","path":"missing.gds"}"#).await.unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("not-found"));
    assert_eq!(ep.session().unwrap().id(), current);
}

// ── Markers ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rdb_over_limit_reports_omitted_count() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(7).as_bytes());
    let mut config = config_for(dir.path());
    config.max_rdb_limit = 4;
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = connected(&dir, &registry).await;

    // Act
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();

    // Assert
    let sink = ep.sink();
    assert_eq!(sink.tags(), ["rdb-summary", "rdb-info", "frame"]);
    let summary = &sink.messages()[0];
    assert_eq!(summary["total"], 7);
    assert_eq!(summary["shown"], 4);
    assert_eq!(summary["truncated"], true);
    assert_eq!(summary["omitted_count"], 3);
    assert_eq!(ep.session().unwrap().snapshot().marker_groups, 2);
}

#[tokio::test]
async fn test_reloading_rdb_replaces_markers() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(7).as_bytes());
    let mut config = config_for(dir.path());
    config.max_rdb_limit = 4;
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = connected(&dir, &registry).await;

    // Act
    for _ in 0..3 {
        ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    }

    // Assert: the overlay is the last load only, still under the limit
    let sink = ep.sink();
    assert_eq!(last_frame_markers(sink), 4);
    let last_summary = sink.messages().into_iter().rev().find(|m| m["msg"] == "rdb-summary").unwrap();
    assert_eq!(last_summary["omitted_count"], 3);
    assert_eq!(ep.session().unwrap().snapshot().marker_groups, 2);
}

#[tokio::test]
async fn test_markers_follow_their_cell() {
    // Arrange: one violation in TOP (by default), two recorded in SUB
    let dir = ScratchDir::new();
    dir.write(
        "drc.json",
        br#"{"top_cell":"TOP","rules":[{"name":"M2.A.1"}],"items":[
            {"rule":"M2.A.1","shape":{"type":"box","x1":0.2,"y1":0.2,"x2":0.4,"y2":0.4}},
            {"rule":"M2.A.1","cell":"SUB","shape":{"type":"box","x1":0.5,"y1":0.5,"x2":1.0,"y2":1.0}},
            {"rule":"M2.A.1","cell":"SUB","shape":{"type":"edge","x1":0,"y1":1.5,"x2":2,"y2":1.5}}
        ]}"#,
    );
    let registry = registry_with(Arc::new(GdsEngine::new()), config_for(dir.path()));
    let mut ep = connected_sample(&dir, &registry).await;

    // Act / Assert: TOP view draws only the TOP violation
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    assert_eq!(last_frame_markers(ep.sink()), 1);

    // Act / Assert: SUB view draws only the SUB violations
    ep.handle_text(r#"{"msg":"select-cell","cell":"SUB"}"#).await.unwrap();
    assert_eq!(last_frame_markers(ep.sink()), 2);
}

#[tokio::test]
async fn test_rdb_info_and_records_browse_the_database() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(7).as_bytes());
    let mut config = config_for(dir.path());
    config.max_rdb_limit = 3;
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = connected(&dir, &registry).await;
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    let info = ep.sink().messages()[1].clone();
    ep.sink_mut().clear();

    // Act: category 1 is M1.W.1 (items 0, 3, 6)
    ep.handle_text(r#"{"msg":"rdb-records","category_id":1,"cell_id":0}"#)
        .await
        .unwrap();

    // Assert
    assert_eq!(info["categories"][1]["name"], "M1.W.1");
    assert_eq!(info["cells"], serde_json::json!([{"id": 0, "name": "TOP"}]));
    let items = &ep.sink().messages()[0];
    assert_eq!(items["msg"], "rdb-items");
    let ids: Vec<u64> = items["items"].as_array().unwrap().iter().map(|i| i["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![0, 3, 6]);
    assert_eq!(items["items"][0]["rule"], "M1.W.1");
    assert_eq!(items["truncated"], false);
}

#[tokio::test]
async fn test_rdb_records_are_capped_by_the_limit() {
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(7).as_bytes());
    let mut config = config_for(dir.path());
    config.max_rdb_limit = 3;
    let registry = registry_with(Arc::new(StubEngine::new()), config);
    let mut ep = connected(&dir, &registry).await;
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    ep.sink_mut().clear();

    ep.handle_text(r#"{"msg":"rdb-records"}"#).await.unwrap();

    let items = &ep.sink().messages()[0];
    assert_eq!(items["items"].as_array().unwrap().len(), 3);
    assert_eq!(items["matched"], 7);
    assert_eq!(items["truncated"], true);
}

#[tokio::test]
async fn test_rdb_selected_draws_only_chosen_items() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(7).as_bytes());
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    ep.sink_mut().clear();

    // Act
    ep.handle_text(r#"{"msg":"rdb-selected","items":[4]}"#).await.unwrap();

    // Assert
    assert_eq!(ep.sink().tags(), ["frame"]);
    assert_eq!(last_frame_markers(ep.sink()), 1);
    assert_eq!(ep.session().unwrap().snapshot().marker_groups, 1);
}

#[tokio::test]
async fn test_rdb_browsing_errors() {
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(2).as_bytes());
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"rdb-records"}"#).await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("no-rdb"));

    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    ep.handle_text(r#"{"msg":"rdb-selected","items":[9]}"#).await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("unknown-rdb-entry"));
    ep.handle_text(r#"{"msg":"rdb-records","cell_id":5}"#).await.unwrap();
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("unknown-rdb-entry"));
}

#[tokio::test]
async fn test_rdb_under_limit_omits_nothing() {
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(2).as_bytes());
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();

    let summary = &ep.sink().messages()[0];
    assert_eq!(summary["truncated"], false);
    assert_eq!(summary["omitted_count"], 0);
}

#[tokio::test]
async fn test_clear_markers_empties_groups() {
    let dir = ScratchDir::new();
    dir.write("drc.json", rdb_json(3).as_bytes());
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;
    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();
    ep.sink_mut().clear();

    ep.handle_text(r#"{"msg":"clear-markers"}"#).await.unwrap();

    assert_eq!(ep.sink().messages()[0]["markers"], 0);
    assert_eq!(ep.session().unwrap().snapshot().marker_groups, 0);
}

#[tokio::test]
async fn test_malformed_rdb_is_format_error() {
    let dir = ScratchDir::new();
    dir.write("drc.json", b"{\"items\": 3}");
    let registry = registry_with(Arc::new(StubEngine::new()), config_for(dir.path()));
    let mut ep = connected(&dir, &registry).await;

    ep.handle_text(r#"{"msg":"load-rdb","path":"drc.json"}"#).await.unwrap();

    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("format"));
    assert_eq!(ep.session().unwrap().snapshot().marker_groups, 0);
}

// ── Engine failures ───────────────────────────────────────────────────────────

mock! {
    pub Engine {}

    impl GeometryEngine for Engine {
        fn open_file(&self, path: &Path, options: &EngineOptions) -> Result<LayoutFile, EngineError>;
        fn render(&self, file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError>;
    }
}

#[tokio::test]
async fn test_engine_render_failure_is_reported() {
    // Arrange
    let dir = ScratchDir::new();
    dir.write("a.gds", b"x");
    let mut engine = MockEngine::new();
    engine
        .expect_open_file()
        .returning(|path, options| StubEngine::new().open_file(path, options));
    engine
        .expect_render()
        .returning(|_, _| Err(EngineError::Render("out of memory".to_string())));
    let registry = registry_with(Arc::new(engine), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    // Act
    ep.on_connect(Some("a.gds")).await.unwrap();
    ep.handle_text(r#"{"msg":"zoom-fit"}"#).await.unwrap();

    // Assert: initial state arrives without a frame, then the error
    let tags = ep.sink().tags();
    assert_eq!(tags[..4], ["opened", "layer-list", "hierarchy", "metainfo"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("engine"));
    assert!(ep.sink().binaries().is_empty());
}

#[tokio::test]
async fn test_engine_open_failure_is_reported() {
    let dir = ScratchDir::new();
    dir.write("a.gds", b"x");
    let mut engine = MockEngine::new();
    engine
        .expect_open_file()
        .times(1)
        .returning(|_, _| Err(EngineError::Format("bad header".to_string())));
    let registry = registry_with(Arc::new(engine), config_for(dir.path()));
    let mut ep = endpoint(&registry);

    ep.on_connect(Some("a.gds")).await.unwrap();

    assert_eq!(ep.sink().tags(), ["error"]);
    assert_eq!(ep.sink().last_error_kind().as_deref(), Some("format"));
    assert_eq!(registry.session_count(), 0);
}
