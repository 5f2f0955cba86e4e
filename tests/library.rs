use std::collections::HashSet;

use anyhow::{Context, Result};
use flowcanvas::canvas::edge_geometry;
use flowcanvas::{
    CanvasConfig, CanvasEvent, Editor, GraphCanvas, GraphError, GraphModel, Mode, NodeType,
    Point, PointerEvent, Size, Status,
};
use serde_json::json;

fn single_node_payload() -> serde_json::Value {
    json!({
        "nodes": [{
            "id": "node-1",
            "type": "process",
            "position": {"x": 10, "y": 10},
            "size": {"width": 100, "height": 60}
        }]
    })
}

#[test]
fn node_ids_stay_unique_and_deletes_cascade() -> Result<()> {
    let mut model = GraphModel::default();
    let mut live: Vec<String> = Vec::new();

    for round in 0..6 {
        let id = model.add_node(NodeType::Process, round as f64 * 150.0, 0.0)?.id.clone();
        if let Some(previous) = live.last().cloned() {
            model.add_connection(&previous, &id, "")?;
        }
        live.push(id);
        if round % 2 == 1 {
            let victim = live.remove(0);
            model.delete_node(&victim)?;
            assert!(
                model.connections().iter().all(|c| !c.touches(&victim)),
                "no connection may reference a deleted node"
            );
        }
    }

    let ids: Vec<&str> = model.nodes().iter().map(|node| node.id.as_str()).collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(ids.len(), 3);
    Ok(())
}

#[test]
fn export_then_load_preserves_the_graph() -> Result<()> {
    let mut model = GraphModel::default();
    model.add_node(NodeType::Start, 0.0, 0.0)?;
    model.add_node(NodeType::Decision, 200.0, 0.0)?;
    model.add_connection("node-1", "node-2", "check")?;
    model.add_question("risk", "What can fail?")?;
    model.update_node_status("node-2", Status::Approved)?;

    let exported = model.export_data();
    let mut reloaded = GraphModel::default();
    reloaded.load_from_data(serde_json::to_value(&exported)?)?;

    assert_eq!(reloaded.diagram().flowcharts, exported.flowcharts);
    assert_eq!(reloaded.diagram().title, exported.title);
    Ok(())
}

#[test]
fn counters_resume_after_highest_loaded_id() -> Result<()> {
    let mut model = GraphModel::default();
    model.load_from_data(json!({
        "nodes": [
            {"id": "node-3", "type": "start"},
            {"id": "node-7", "type": "end"}
        ],
        "connections": [{"id": "conn-4", "from": "node-3", "to": "node-7"}]
    }))?;

    assert_eq!(model.add_node(NodeType::Process, 0.0, 0.0)?.id, "node-8");
    assert_eq!(model.add_connection("node-3", "node-8", "")?.id, "conn-5");
    Ok(())
}

#[test]
fn aligned_process_nodes_connect_at_edge_midpoints() -> Result<()> {
    let mut model = GraphModel::default();
    let left = model.add_node(NodeType::Process, -60.0, -30.0)?.id.clone();
    let right = model.add_node(NodeType::Process, 140.0, -30.0)?.id.clone();
    let id = model.add_connection(&left, &right, "")?.id.clone();

    let connection = model.connection(&id).context("connection missing")?;
    let (path, anchor) = edge_geometry(&model, connection).context("edge not drawable")?;

    assert_eq!(path.start, Point::new(60.0, 0.0));
    assert_eq!(path.end, Point::new(140.0, 0.0));
    assert_eq!(anchor, Point::new(100.0, 0.0));
    Ok(())
}

#[test]
fn fit_to_screen_centres_padded_bounds() -> Result<()> {
    let mut model = GraphModel::default();
    model.load_from_data(single_node_payload())?;
    let config = CanvasConfig {
        viewport: Size::new(800.0, 600.0),
        fit_padding: 50.0,
        ..CanvasConfig::default()
    };
    let mut canvas = GraphCanvas::new(model, config);

    assert!(canvas.fit_to_screen());
    let transform = canvas.transform();
    assert!((transform.k - 3.75).abs() < 1e-9);
    assert!((transform.x - 175.0).abs() < 1e-9);
    assert!((transform.y - 150.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn deleting_a_node_removes_incoming_and_outgoing_connections() -> Result<()> {
    let mut model = GraphModel::default();
    for x in [0.0, 200.0, 400.0, 600.0] {
        model.add_node(NodeType::Process, x, 0.0)?;
    }
    let c = model.add_connection("node-2", "node-3", "C")?.id.clone();
    let d = model.add_connection("node-1", "node-2", "D")?.id.clone();
    let other = model.add_connection("node-3", "node-4", "")?.id.clone();

    let removed = model.delete_node("node-2")?;
    let removed_ids: HashSet<&str> = removed
        .connections
        .iter()
        .map(|connection| connection.id.as_str())
        .collect();
    assert_eq!(removed_ids, HashSet::from([c.as_str(), d.as_str()]));
    assert_eq!(model.connections().len(), 1);
    assert_eq!(model.connections()[0].id, other);
    Ok(())
}

#[test]
fn status_can_jump_between_any_values() -> Result<()> {
    let mut model = GraphModel::default();
    model.add_node(NodeType::Decision, 0.0, 0.0)?;
    model.update_node_status("node-1", Status::Approved)?;
    let node = model.update_node_status("node-1", Status::Rejected)?;
    assert_eq!(node.metadata.status, Status::Rejected);
    Ok(())
}

#[test]
fn stale_ids_are_reported_not_ignored() {
    let mut model = GraphModel::default();
    let before = model.diagram().clone();

    assert_eq!(
        model.update_node_text("node-42", "ghost").err(),
        Some(GraphError::NodeNotFound("node-42".into()))
    );
    assert!(matches!(
        model.delete_connection("conn-9"),
        Err(GraphError::ConnectionNotFound(_))
    ));
    assert_eq!(model.diagram(), &before);
}

#[test]
fn editor_session_renders_to_svg() -> Result<()> {
    let mut editor = Editor::new(GraphModel::default(), CanvasConfig::default());

    editor.set_mode(Mode::Add(NodeType::Start));
    editor.handle_pointer(PointerEvent::Click { x: 20.0, y: 20.0 });
    editor.set_mode(Mode::Add(NodeType::End));
    editor.handle_pointer(PointerEvent::Click { x: 320.0, y: 20.0 });

    editor.set_mode(Mode::Connect);
    editor.handle_pointer(PointerEvent::Down { x: 50.0, y: 40.0 });
    editor.handle_pointer(PointerEvent::Move { x: 200.0, y: 40.0 });
    let event = editor.handle_pointer(PointerEvent::Up { x: 350.0, y: 40.0 });
    assert_eq!(
        event,
        Some(CanvasEvent::ConnectionAdded {
            id: "conn-1".into()
        })
    );

    let svg = editor.export_svg("white");
    assert!(svg.contains("<svg"), "rendered svg should contain root element");
    assert!(svg.contains(">Start</text>"), "node labels should appear in output");
    assert!(svg.contains("id=\"conn-1\""), "connections should be drawn");

    let text = editor.export_text();
    assert!(text.contains("conn-1: node-1 -> node-2"));
    Ok(())
}

#[cfg(feature = "png")]
#[test]
fn svg_rasterises_to_png() -> Result<()> {
    let mut editor = Editor::new(GraphModel::default(), CanvasConfig::default());
    editor
        .canvas_mut()
        .add_node(NodeType::Process, Point::new(40.0, 40.0))?;
    let svg = editor.export_svg("white");
    let png = flowcanvas::render::render_png(&svg, 0.5)?;

    const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
    assert!(
        png.starts_with(PNG_MAGIC),
        "rendered png should start with PNG header"
    );
    Ok(())
}
