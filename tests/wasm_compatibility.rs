#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use flowcanvas::{CanvasConfig, Editor, GraphModel, Mode, NodeType, PointerEvent};
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_model_round_trip() {
        let mut model = GraphModel::default();
        model.add_node(NodeType::Start, 0.0, 0.0).expect("Failed to add node");
        model.add_node(NodeType::End, 200.0, 0.0).expect("Failed to add node");
        model
            .add_connection("node-1", "node-2", "done")
            .expect("Failed to connect nodes");

        let json = model.export_json().expect("Failed to export flowchart");
        let mut reloaded = GraphModel::default();
        reloaded
            .load_from_json(&json)
            .expect("Failed to reload flowchart");

        assert_eq!(reloaded.nodes().len(), 2);
        assert_eq!(reloaded.connections()[0].label, "done");
    }

    #[wasm_bindgen_test]
    fn test_editor_renders_svg() {
        let mut editor = Editor::new(GraphModel::default(), CanvasConfig::default());
        editor.set_mode(Mode::Add(NodeType::Decision));
        editor.handle_pointer(PointerEvent::Click { x: 10.0, y: 10.0 });

        let svg = editor.export_svg("white");
        assert!(svg.contains("<svg"));
        assert!(svg.contains("viewBox"));
        assert!(svg.contains("Decision?"));
    }
}
