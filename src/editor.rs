use log::{Level, error, info, log};
use serde_json::Value;

use crate::canvas::{CanvasEvent, GraphCanvas, InteractionContext, Mode, PointerEvent};
use crate::config::CanvasConfig;
use crate::error::LoadError;
use crate::graph::{GraphModel, GraphResult};
use crate::model::Diagram;
use crate::render;

pub const LOAD_ERROR_MESSAGE: &str = "Error loading flowchart data";

/// Non-fatal, user-facing notifications (toasts in a browser front-end).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);
}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: Level, message: &str) {
        log!(level, "{message}");
    }
}

/// The application around a canvas: owns the interaction mode and the import/export flow.
pub struct Editor {
    canvas: GraphCanvas,
    context: InteractionContext,
    notifier: Box<dyn Notifier>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("canvas", &self.canvas)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Editor {
    pub fn new(model: GraphModel, config: CanvasConfig) -> Self {
        Self::with_notifier(model, config, Box::new(LogNotifier))
    }

    pub fn with_notifier(
        model: GraphModel,
        config: CanvasConfig,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            canvas: GraphCanvas::new(model, config),
            context: InteractionContext::default(),
            notifier,
        }
    }

    pub fn canvas(&self) -> &GraphCanvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut GraphCanvas {
        &mut self.canvas
    }

    pub fn model(&self) -> &GraphModel {
        self.canvas.model()
    }

    pub fn mode(&self) -> Mode {
        self.context.mode()
    }

    /// Switching modes abandons any connection being drawn.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.canvas.cancel_pending_connection() {
            info!("pending connection cancelled by mode change");
        }
        self.context.set_mode(mode);
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<CanvasEvent> {
        let outcome = self.canvas.handle_pointer(&self.context, event);
        if let Some(CanvasEvent::NodeAdded { .. }) = outcome {
            self.context.set_mode(Mode::Select);
        }
        outcome
    }

    pub fn commit_label(&mut self, text: &str) -> GraphResult<Option<String>> {
        self.canvas.commit_text_edit(text)
    }

    pub fn cancel_label(&mut self) {
        self.canvas.cancel_text_edit();
    }

    pub fn delete_selected(&mut self) -> GraphResult<bool> {
        self.canvas.delete_selected()
    }

    /// Replaces the diagram from JSON text. Failures are reported to the user and leave the
    /// current diagram in place; the return value says whether the import was applied.
    pub fn import_json(&mut self, json: &str) -> bool {
        let outcome = serde_json::from_str::<Value>(json)
            .map_err(LoadError::from)
            .and_then(|payload| self.import_data(payload));
        match outcome {
            Ok(()) => true,
            Err(err) => {
                error!("rejected flowchart import: {err}");
                self.notifier.notify(Level::Error, LOAD_ERROR_MESSAGE);
                false
            }
        }
    }

    /// Replaces the diagram from an already parsed payload, surfacing the failure instead of
    /// notifying.
    pub fn import_data(&mut self, payload: Value) -> Result<(), LoadError> {
        self.canvas.model_mut().load_from_data(payload)?;
        self.canvas.reset_view_state();
        self.context.set_mode(Mode::Select);
        Ok(())
    }

    pub fn export(&self) -> Diagram {
        self.canvas.model().export_data()
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        self.canvas.model().export_json()
    }

    pub fn export_svg(&mut self, background: &str) -> String {
        let scene = self.canvas.scene();
        render::render_svg(&scene, background)
    }

    pub fn export_text(&self) -> String {
        render::render_text(self.canvas.model().diagram())
    }

    pub fn clear(&mut self) {
        self.canvas.model_mut().clear_all();
        self.canvas.reset_view_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Selection;
    use crate::model::NodeType;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(Level, String)>>>);

    impl Notifier for Recorder {
        fn notify(&self, level: Level, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    fn editor_with_recorder() -> (Editor, Recorder) {
        let recorder = Recorder::default();
        let editor = Editor::with_notifier(
            GraphModel::default(),
            CanvasConfig::default(),
            Box::new(recorder.clone()),
        );
        (editor, recorder)
    }

    #[test]
    fn placing_a_node_returns_to_select_mode() {
        let (mut editor, _) = editor_with_recorder();
        editor.set_mode(Mode::Add(NodeType::Start));

        let event = editor.handle_pointer(PointerEvent::Click { x: 40.0, y: 40.0 });
        assert_eq!(
            event,
            Some(CanvasEvent::NodeAdded {
                id: "node-1".into()
            })
        );
        assert_eq!(editor.mode(), Mode::Select);

        editor.handle_pointer(PointerEvent::Click { x: 600.0, y: 600.0 });
        assert_eq!(editor.model().nodes().len(), 1);
    }

    #[test]
    fn mode_change_cancels_pending_connection() {
        let (mut editor, _) = editor_with_recorder();
        editor.set_mode(Mode::Add(NodeType::Process));
        editor.handle_pointer(PointerEvent::Click { x: 0.0, y: 0.0 });
        editor.set_mode(Mode::Connect);
        editor.handle_pointer(PointerEvent::Down { x: 10.0, y: 10.0 });
        assert!(editor.canvas().pending_connection().is_some());

        editor.set_mode(Mode::Select);
        assert!(editor.canvas().pending_connection().is_none());
    }

    #[test]
    fn malformed_import_notifies_and_keeps_state() {
        let (mut editor, recorder) = editor_with_recorder();
        editor.set_mode(Mode::Add(NodeType::Process));
        editor.handle_pointer(PointerEvent::Click { x: 0.0, y: 0.0 });
        let before = editor.model().diagram().clone();

        assert!(!editor.import_json("definitely not json"));
        assert!(!editor.import_json(r#"{"nodes": "wrong"}"#));

        assert_eq!(editor.model().diagram(), &before);
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(level, msg)| *level == Level::Error && msg == LOAD_ERROR_MESSAGE));
    }

    #[test]
    fn import_resets_view_state() {
        let (mut editor, recorder) = editor_with_recorder();
        editor.set_mode(Mode::Add(NodeType::Process));
        editor.handle_pointer(PointerEvent::Click { x: 0.0, y: 0.0 });
        editor.handle_pointer(PointerEvent::Click { x: 10.0, y: 10.0 });
        assert_eq!(
            editor.canvas().selection(),
            Some(&Selection::Node("node-1".into()))
        );

        let payload = r#"{"nodes": [{"id": "node-4", "type": "end"}], "questions": [{"id": "q-2", "text": "Owner?"}]}"#;
        assert!(editor.import_json(payload));
        assert_eq!(editor.canvas().selection(), None);
        assert_eq!(editor.model().nodes()[0].id, "node-4");
        assert!(recorder.0.lock().unwrap().is_empty());

        let scene = editor.canvas_mut().scene();
        assert_eq!(scene.nodes.len(), 1);
        assert_eq!(scene.nodes[0].id, "node-4");
    }

    #[test]
    fn clear_empties_active_section() {
        let (mut editor, _) = editor_with_recorder();
        editor.set_mode(Mode::Add(NodeType::Process));
        editor.handle_pointer(PointerEvent::Click { x: 0.0, y: 0.0 });
        editor.canvas_mut().model_mut().add_question("scope", "In?").unwrap();
        editor.clear();
        assert!(editor.model().nodes().is_empty());
        assert!(editor.model().questions().is_empty());
        assert!(editor.canvas_mut().scene().nodes.is_empty());
    }
}
