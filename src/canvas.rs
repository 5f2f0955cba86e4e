use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::CanvasConfig;
use crate::geometry::{CubicPath, Point, Rect, Shape, Size, Transform};
use crate::graph::{ConnectionPatch, GraphModel, GraphResult, NodePatch};
use crate::model::{Connection, LineStyle, Node, NodeType, Status};

/// Meaning currently assigned to pointer gestures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "nodeType", rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Select,
    Add(NodeType),
    Connect,
}

/// Interaction state owned by the surrounding application and lent to the canvas per event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionContext {
    mode: Mode,
}

impl InteractionContext {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

/// Pointer input in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PointerEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up { x: f64, y: f64 },
    Click { x: f64, y: f64 },
    DoubleClick { x: f64, y: f64 },
    Wheel { x: f64, y: f64, delta: f64 },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { x, y }
            | PointerEvent::Move { x, y }
            | PointerEvent::Up { x, y }
            | PointerEvent::Click { x, y }
            | PointerEvent::DoubleClick { x, y }
            | PointerEvent::Wheel { x, y, .. } => Point::new(x, y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Selection {
    Node(String),
    Connection(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hit {
    Node(String),
    Connection(String),
}

/// What a handled pointer event did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CanvasEvent {
    NodeAdded { id: String },
    NodeMoved { id: String },
    ConnectionStarted { from: String },
    ConnectionAdded { id: String },
    ConnectionDiscarded,
    Selected { selection: Selection },
    SelectionCleared,
    TextEditRequested { id: String, text: String },
    ViewportChanged { transform: Transform },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingConnection {
    pub from: String,
    pub cursor: Point,
}

#[derive(Debug, Clone, PartialEq)]
enum Gesture {
    Idle,
    Dragging { node_id: String, grab: Point },
    Panning { last: Point },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: String,
    pub node_type: NodeType,
    #[serde(skip)]
    pub shape: Shape,
    pub bounds: Rect,
    pub text: String,
    pub fill: String,
    pub stroke: String,
    pub text_color: String,
    pub status: Status,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeView {
    pub id: String,
    pub from: String,
    pub to: String,
    pub path: CubicPath,
    pub label: String,
    pub label_anchor: Point,
    pub line_style: LineStyle,
    pub status: Status,
    pub selected: bool,
}

/// Ordered snapshot of everything currently drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub transform: Transform,
    pub viewport: Size,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub rubber_band: Option<(Point, Point)>,
}

/// Elements touched by one `render` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDelta {
    pub updated_nodes: Vec<String>,
    pub updated_edges: Vec<String>,
    pub removed_nodes: Vec<String>,
    pub removed_edges: Vec<String>,
}

impl RenderDelta {
    pub fn is_empty(&self) -> bool {
        self.updated_nodes.is_empty()
            && self.updated_edges.is_empty()
            && self.removed_nodes.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[derive(Debug, Default)]
struct Dirty {
    full: bool,
    nodes: HashSet<String>,
    edges: HashSet<String>,
}

/// Curve and label anchor for a connection whose endpoints both resolve.
pub fn edge_geometry(model: &GraphModel, connection: &Connection) -> Option<(CubicPath, Point)> {
    let from = model.node(&connection.from)?;
    let to = model.node(&connection.to)?;

    if connection.is_self_loop() {
        let path = CubicPath::self_loop(&from.bounds());
        return Some((path, path.point_at(0.5)));
    }

    let path = CubicPath::between(from.shape(), &from.bounds(), to.shape(), &to.bounds());
    Some((path, from.center().midpoint(to.center())))
}

/// View/controller over a [`GraphModel`]: retained scene, viewport and gesture handling.
#[derive(Debug)]
pub struct GraphCanvas {
    model: GraphModel,
    config: CanvasConfig,
    transform: Transform,
    selection: Option<Selection>,
    pending: Option<PendingConnection>,
    editing: Option<String>,
    gesture: Gesture,
    node_views: HashMap<String, NodeView>,
    edge_views: HashMap<String, EdgeView>,
    dirty: Dirty,
}

impl GraphCanvas {
    pub fn new(model: GraphModel, config: CanvasConfig) -> Self {
        Self {
            model,
            config,
            transform: Transform::IDENTITY,
            selection: None,
            pending: None,
            editing: None,
            gesture: Gesture::Idle,
            node_views: HashMap::new(),
            edge_views: HashMap::new(),
            dirty: Dirty {
                full: true,
                ..Dirty::default()
            },
        }
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    /// Direct model access for changes the canvas does not draw incrementally.
    /// The next render rebuilds the whole scene.
    pub fn model_mut(&mut self) -> &mut GraphModel {
        self.dirty.full = true;
        &mut self.model
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn pending_connection(&self) -> Option<&PendingConnection> {
        self.pending.as_ref()
    }

    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn set_viewport_size(&mut self, size: Size) {
        self.config.viewport = size;
    }

    pub fn to_model(&self, screen: Point) -> Point {
        self.transform.invert(screen)
    }

    fn mark_node(&mut self, id: &str) {
        self.dirty.nodes.insert(id.to_string());
        let incident: Vec<String> = self
            .model
            .incident_connections(id)
            .map(|conn| conn.id.clone())
            .collect();
        self.dirty.edges.extend(incident);
    }

    fn mark_selection(&mut self, selection: &Selection) {
        match selection {
            Selection::Node(id) => {
                self.dirty.nodes.insert(id.clone());
            }
            Selection::Connection(id) => {
                self.dirty.edges.insert(id.clone());
            }
        }
    }

    // Selection

    pub fn select(&mut self, selection: Selection) {
        if let Some(previous) = self.selection.take() {
            self.mark_selection(&previous);
        }
        self.mark_selection(&selection);
        self.selection = Some(selection);
    }

    pub fn clear_selection(&mut self) {
        if let Some(previous) = self.selection.take() {
            self.mark_selection(&previous);
        }
    }

    fn forget_selection_of(&mut self, removed_nodes: &[&str], removed_edges: &[&str]) {
        let stale = match &self.selection {
            Some(Selection::Node(id)) => removed_nodes.contains(&id.as_str()),
            Some(Selection::Connection(id)) => removed_edges.contains(&id.as_str()),
            None => false,
        };
        if stale {
            self.selection = None;
        }
    }

    // Hit testing

    pub fn node_at(&self, point: Point) -> Option<&Node> {
        self.model
            .nodes()
            .iter()
            .rev()
            .find(|node| node.shape().contains(&node.bounds(), point))
    }

    /// Topmost element under a model-space point; nodes are drawn above connections.
    pub fn hit_test(&self, point: Point) -> Option<Hit> {
        if let Some(node) = self.node_at(point) {
            return Some(Hit::Node(node.id.clone()));
        }

        let tolerance = self.config.hit_tolerance / self.transform.k;
        self.model
            .connections()
            .iter()
            .filter_map(|conn| {
                let (path, _) = edge_geometry(&self.model, conn)?;
                let distance = path.distance_to(point);
                (distance <= tolerance).then_some((distance, conn.id.clone()))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id)| Hit::Connection(id))
    }

    // Pointer input

    pub fn handle_pointer(
        &mut self,
        context: &InteractionContext,
        event: PointerEvent,
    ) -> Option<CanvasEvent> {
        let screen = event.position();
        let point = self.to_model(screen);
        trace!("pointer {event:?} at model ({:.1}, {:.1})", point.x, point.y);

        match event {
            PointerEvent::Down { .. } => self.pointer_down(context, screen, point),
            PointerEvent::Move { .. } => self.pointer_move(screen, point),
            PointerEvent::Up { .. } => self.pointer_up(point),
            PointerEvent::Click { .. } => self.click(context, point),
            PointerEvent::DoubleClick { .. } => self.double_click(point),
            PointerEvent::Wheel { delta, .. } => {
                let factor = 2_f64.powf(-delta * self.config.wheel_sensitivity);
                Some(self.zoom_by(factor, screen))
            }
        }
    }

    fn pointer_down(
        &mut self,
        context: &InteractionContext,
        screen: Point,
        point: Point,
    ) -> Option<CanvasEvent> {
        let hit = self
            .node_at(point)
            .map(|node| (node.id.clone(), node.position));

        match hit {
            Some((id, _)) if context.mode() == Mode::Connect => {
                self.pending = Some(PendingConnection {
                    from: id.clone(),
                    cursor: point,
                });
                Some(CanvasEvent::ConnectionStarted { from: id })
            }
            Some((id, position)) => {
                let grab = Point::new(point.x - position.x, point.y - position.y);
                self.gesture = Gesture::Dragging { node_id: id, grab };
                None
            }
            None => {
                self.gesture = Gesture::Panning { last: screen };
                None
            }
        }
    }

    fn pointer_move(&mut self, screen: Point, point: Point) -> Option<CanvasEvent> {
        if let Some(pending) = self.pending.as_mut() {
            pending.cursor = point;
            return None;
        }

        match self.gesture.clone() {
            Gesture::Idle => None,
            Gesture::Dragging { node_id, grab } => {
                self.move_node(&node_id, point.x - grab.x, point.y - grab.y)
                    .ok()
                    .map(|_| CanvasEvent::NodeMoved { id: node_id })
            }
            Gesture::Panning { last } => {
                self.transform = self.transform.translated(screen.x - last.x, screen.y - last.y);
                self.gesture = Gesture::Panning { last: screen };
                Some(CanvasEvent::ViewportChanged {
                    transform: self.transform,
                })
            }
        }
    }

    fn pointer_up(&mut self, point: Point) -> Option<CanvasEvent> {
        self.gesture = Gesture::Idle;
        let pending = self.pending.take()?;

        let target = self
            .node_at(point)
            .map(|node| node.id.clone())
            .filter(|id| *id != pending.from);

        match target {
            Some(to) => match self.connect(&pending.from, &to) {
                Ok(id) => Some(CanvasEvent::ConnectionAdded { id }),
                Err(err) => {
                    debug!("discarding connection from '{}': {err}", pending.from);
                    Some(CanvasEvent::ConnectionDiscarded)
                }
            },
            None => Some(CanvasEvent::ConnectionDiscarded),
        }
    }

    fn click(&mut self, context: &InteractionContext, point: Point) -> Option<CanvasEvent> {
        match self.hit_test(point) {
            Some(Hit::Node(id)) => {
                let selection = Selection::Node(id);
                self.select(selection.clone());
                Some(CanvasEvent::Selected { selection })
            }
            Some(Hit::Connection(id)) => {
                let selection = Selection::Connection(id);
                self.select(selection.clone());
                Some(CanvasEvent::Selected { selection })
            }
            None => match context.mode() {
                Mode::Add(node_type) => match self.add_node(node_type, point) {
                    Ok(id) => Some(CanvasEvent::NodeAdded { id }),
                    Err(err) => {
                        warn!("could not add {} node: {err}", node_type.as_str());
                        None
                    }
                },
                Mode::Select | Mode::Connect => {
                    self.clear_selection();
                    Some(CanvasEvent::SelectionCleared)
                }
            },
        }
    }

    fn double_click(&mut self, point: Point) -> Option<CanvasEvent> {
        let (id, text) = self
            .node_at(point)
            .map(|node| (node.id.clone(), node.text.clone()))?;
        self.editing = Some(id.clone());
        Some(CanvasEvent::TextEditRequested { id, text })
    }

    /// Drops an in-progress connection draw without creating an edge.
    pub fn cancel_pending_connection(&mut self) -> bool {
        self.gesture = Gesture::Idle;
        self.pending.take().is_some()
    }

    /// Applies the label typed into an open text edit.
    pub fn commit_text_edit(&mut self, text: impl Into<String>) -> GraphResult<Option<String>> {
        let Some(id) = self.editing.take() else {
            return Ok(None);
        };
        self.model.update_node_text(&id, text)?;
        self.dirty.nodes.insert(id.clone());
        Ok(Some(id))
    }

    pub fn cancel_text_edit(&mut self) {
        self.editing = None;
    }

    // Mutations initiated by the controller

    /// Adds a node and redraws any dangling connection that now resolves to it.
    pub fn add_node(&mut self, node_type: NodeType, point: Point) -> GraphResult<String> {
        let id = self.model.add_node(node_type, point.x, point.y)?.id.clone();
        self.mark_node(&id);
        Ok(id)
    }

    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> GraphResult<()> {
        self.model.update_node_position(id, x, y)?;
        self.mark_node(id);
        Ok(())
    }

    pub fn connect(&mut self, from: &str, to: &str) -> GraphResult<String> {
        let id = self.model.add_connection(from, to, "")?.id.clone();
        self.dirty.edges.insert(id.clone());
        Ok(id)
    }

    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> GraphResult<()> {
        self.model.apply_node_patch(id, patch)?;
        self.mark_node(id);
        Ok(())
    }

    pub fn update_connection(&mut self, id: &str, patch: ConnectionPatch) -> GraphResult<()> {
        self.model.apply_connection_patch(id, patch)?;
        self.dirty.edges.insert(id.to_string());
        Ok(())
    }

    pub fn delete_node(&mut self, id: &str) -> GraphResult<()> {
        let removed = self.model.delete_node(id)?;
        let edge_ids: Vec<&str> = removed.connections.iter().map(|c| c.id.as_str()).collect();
        self.forget_selection_of(&[id], &edge_ids);
        if self.editing.as_deref() == Some(id) {
            self.editing = None;
        }
        if self.pending.as_ref().is_some_and(|p| p.from == id) {
            self.pending = None;
        }
        self.dirty.nodes.insert(id.to_string());
        self.dirty
            .edges
            .extend(edge_ids.into_iter().map(str::to_string));
        Ok(())
    }

    pub fn delete_connection(&mut self, id: &str) -> GraphResult<()> {
        self.model.delete_connection(id)?;
        self.forget_selection_of(&[], &[id]);
        self.dirty.edges.insert(id.to_string());
        Ok(())
    }

    /// Deletes whatever is selected. Returns `false` when nothing was selected.
    pub fn delete_selected(&mut self) -> GraphResult<bool> {
        match self.selection.clone() {
            Some(Selection::Node(id)) => self.delete_node(&id).map(|_| true),
            Some(Selection::Connection(id)) => self.delete_connection(&id).map(|_| true),
            None => Ok(false),
        }
    }

    /// Drops all transient state after the model was replaced wholesale.
    pub fn reset_view_state(&mut self) {
        self.selection = None;
        self.pending = None;
        self.editing = None;
        self.gesture = Gesture::Idle;
        self.dirty.full = true;
    }

    // Viewport

    pub fn zoom_by(&mut self, factor: f64, anchor: Point) -> CanvasEvent {
        self.transform = self.transform.zoomed_about(
            factor,
            anchor,
            self.config.min_zoom,
            self.config.max_zoom,
        );
        CanvasEvent::ViewportChanged {
            transform: self.transform,
        }
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.transform = self.transform.translated(dx, dy);
    }

    pub fn content_bounds(&self) -> Option<Rect> {
        Rect::enclosing(self.model.nodes().iter().map(Node::bounds))
    }

    /// Centres every node in the viewport. Returns `false` (and changes nothing) when empty.
    pub fn fit_to_screen(&mut self) -> bool {
        let Some(bounds) = self.content_bounds() else {
            return false;
        };
        self.transform = Transform::fit(
            &bounds,
            self.config.viewport,
            self.config.fit_padding,
            self.config.min_zoom,
            self.config.max_zoom,
        );
        true
    }

    pub fn reset_zoom(&mut self) {
        self.transform = Transform::IDENTITY;
    }

    // Rendering

    fn build_node_view(&self, node: &Node) -> NodeView {
        let style = node.style();
        NodeView {
            id: node.id.clone(),
            node_type: node.node_type,
            shape: node.shape(),
            bounds: node.bounds(),
            text: node.text.clone(),
            fill: style.background_color,
            stroke: style.border_color,
            text_color: style.text_color,
            status: node.metadata.status,
            selected: self.selection.as_ref() == Some(&Selection::Node(node.id.clone())),
        }
    }

    fn build_edge_view(&self, conn: &Connection) -> Option<EdgeView> {
        let (path, label_anchor) = edge_geometry(&self.model, conn)?;
        Some(EdgeView {
            id: conn.id.clone(),
            from: conn.from.clone(),
            to: conn.to.clone(),
            path,
            label: conn.label.clone(),
            label_anchor,
            line_style: conn.style,
            status: conn.metadata.status,
            selected: self.selection.as_ref() == Some(&Selection::Connection(conn.id.clone())),
        })
    }

    /// Rebuilds every scene element invalidated since the previous pass.
    pub fn render(&mut self) -> RenderDelta {
        let dirty = std::mem::take(&mut self.dirty);
        let mut delta = RenderDelta::default();

        let (node_ids, edge_ids): (Vec<String>, Vec<String>) = if dirty.full {
            let mut nodes: HashSet<String> = self.node_views.keys().cloned().collect();
            nodes.extend(self.model.nodes().iter().map(|n| n.id.clone()));
            let mut edges: HashSet<String> = self.edge_views.keys().cloned().collect();
            edges.extend(self.model.connections().iter().map(|c| c.id.clone()));
            (nodes.into_iter().collect(), edges.into_iter().collect())
        } else {
            (
                dirty.nodes.into_iter().collect(),
                dirty.edges.into_iter().collect(),
            )
        };

        for id in node_ids {
            let view = self.model.node(&id).map(|node| self.build_node_view(node));
            match view {
                Some(view) => {
                    self.node_views.insert(id.clone(), view);
                    delta.updated_nodes.push(id);
                }
                None => {
                    if self.node_views.remove(&id).is_some() {
                        delta.removed_nodes.push(id);
                    }
                }
            }
        }

        for id in edge_ids {
            let view = self
                .model
                .connection(&id)
                .and_then(|conn| self.build_edge_view(conn));
            match view {
                Some(view) => {
                    self.edge_views.insert(id.clone(), view);
                    delta.updated_edges.push(id);
                }
                None => {
                    if self.model.connection(&id).is_some() {
                        debug!("skipping connection '{id}' with a missing endpoint");
                    }
                    if self.edge_views.remove(&id).is_some() {
                        delta.removed_edges.push(id);
                    }
                }
            }
        }

        for list in [
            &mut delta.updated_nodes,
            &mut delta.updated_edges,
            &mut delta.removed_nodes,
            &mut delta.removed_edges,
        ] {
            list.sort();
        }
        delta
    }

    /// Line from the pending connection's source centre to the pointer, in model space.
    pub fn rubber_band(&self) -> Option<(Point, Point)> {
        let pending = self.pending.as_ref()?;
        let from = self.model.node(&pending.from)?;
        Some((from.center(), pending.cursor))
    }

    /// Renders outstanding changes and returns the scene in model order.
    pub fn scene(&mut self) -> Scene {
        self.render();
        let nodes = self
            .model
            .nodes()
            .iter()
            .filter_map(|node| self.node_views.get(&node.id).cloned())
            .collect();
        let edges = self
            .model
            .connections()
            .iter()
            .filter_map(|conn| self.edge_views.get(&conn.id).cloned())
            .collect();

        Scene {
            transform: self.transform,
            viewport: self.config.viewport,
            nodes,
            edges,
            rubber_band: self.rubber_band(),
        }
    }
}

impl From<GraphModel> for GraphCanvas {
    fn from(model: GraphModel) -> Self {
        GraphCanvas::new(model, CanvasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas_with_two_processes() -> GraphCanvas {
        let mut model = GraphModel::default();
        model.add_node(NodeType::Process, -60.0, -30.0).unwrap();
        model.add_node(NodeType::Process, 140.0, -30.0).unwrap();
        model.add_node(NodeType::End, 400.0, 300.0).unwrap();
        model.add_connection("node-1", "node-2", "next").unwrap();
        model.add_connection("node-2", "node-3", "").unwrap();
        let mut canvas = GraphCanvas::from(model);
        canvas.render();
        canvas
    }

    fn select_mode() -> InteractionContext {
        InteractionContext::default()
    }

    #[test]
    fn edge_geometry_between_aligned_processes() {
        let canvas = canvas_with_two_processes();
        let conn = canvas.model().connection("conn-1").unwrap();
        let (path, anchor) = edge_geometry(canvas.model(), conn).unwrap();
        assert_eq!(path.start, Point::new(60.0, 0.0));
        assert_eq!(path.end, Point::new(140.0, 0.0));
        assert_eq!(anchor, Point::new(100.0, 0.0));
    }

    #[test]
    fn dangling_edges_are_skipped() {
        let mut model = GraphModel::default();
        model.add_node(NodeType::Start, 0.0, 0.0).unwrap();
        model.add_connection("node-1", "node-5", "").unwrap();
        let mut canvas = GraphCanvas::from(model);

        let scene = canvas.scene();
        assert_eq!(scene.nodes.len(), 1);
        assert!(scene.edges.is_empty());
    }

    #[test]
    fn dangling_edge_appears_once_its_endpoint_is_added() {
        let mut model = GraphModel::default();
        model.add_node(NodeType::Start, 0.0, 0.0).unwrap();
        model.add_connection("node-1", "node-2", "").unwrap();
        let mut canvas = GraphCanvas::from(model);
        assert!(canvas.scene().edges.is_empty());

        let id = canvas.add_node(NodeType::Process, Point::new(300.0, 0.0)).unwrap();
        assert_eq!(id, "node-2");

        let delta = canvas.render();
        assert_eq!(delta.updated_nodes, vec!["node-2".to_string()]);
        assert_eq!(delta.updated_edges, vec!["conn-1".to_string()]);
        assert_eq!(canvas.scene().edges.len(), 1);
    }

    #[test]
    fn dragging_rerenders_only_incident_edges() {
        let mut canvas = canvas_with_two_processes();
        let ctx = select_mode();

        assert_eq!(
            canvas.handle_pointer(&ctx, PointerEvent::Down { x: 0.0, y: 0.0 }),
            None
        );
        let moved = canvas.handle_pointer(&ctx, PointerEvent::Move { x: 10.0, y: 20.0 });
        assert_eq!(
            moved,
            Some(CanvasEvent::NodeMoved {
                id: "node-1".into()
            })
        );

        let delta = canvas.render();
        assert_eq!(delta.updated_nodes, vec!["node-1".to_string()]);
        assert_eq!(delta.updated_edges, vec!["conn-1".to_string()]);
        assert_eq!(
            canvas.model().node("node-1").unwrap().position,
            Point::new(-50.0, -10.0)
        );

        canvas.handle_pointer(&ctx, PointerEvent::Up { x: 10.0, y: 20.0 });
        assert!(canvas.render().is_empty());
    }

    #[test]
    fn connect_gesture_creates_edge_on_other_node() {
        let mut canvas = canvas_with_two_processes();
        let ctx = InteractionContext::new(Mode::Connect);

        assert_eq!(
            canvas.handle_pointer(&ctx, PointerEvent::Down { x: 0.0, y: 0.0 }),
            Some(CanvasEvent::ConnectionStarted {
                from: "node-1".into()
            })
        );
        canvas.handle_pointer(&ctx, PointerEvent::Move { x: 300.0, y: 200.0 });
        let (start, end) = canvas.rubber_band().unwrap();
        assert_eq!(start, Point::new(0.0, 0.0));
        assert_eq!(end, Point::new(300.0, 200.0));

        let done = canvas.handle_pointer(&ctx, PointerEvent::Up { x: 460.0, y: 330.0 });
        assert_eq!(
            done,
            Some(CanvasEvent::ConnectionAdded {
                id: "conn-3".into()
            })
        );
        let conn = canvas.model().connection("conn-3").unwrap();
        assert_eq!((conn.from.as_str(), conn.to.as_str()), ("node-1", "node-3"));
        assert!(canvas.pending_connection().is_none());
    }

    #[test]
    fn connect_gesture_over_empty_space_or_same_node_is_discarded() {
        let mut canvas = canvas_with_two_processes();
        let ctx = InteractionContext::new(Mode::Connect);

        canvas.handle_pointer(&ctx, PointerEvent::Down { x: 0.0, y: 0.0 });
        assert_eq!(
            canvas.handle_pointer(&ctx, PointerEvent::Up { x: 1000.0, y: 1000.0 }),
            Some(CanvasEvent::ConnectionDiscarded)
        );

        canvas.handle_pointer(&ctx, PointerEvent::Down { x: 0.0, y: 0.0 });
        assert_eq!(
            canvas.handle_pointer(&ctx, PointerEvent::Up { x: 5.0, y: 5.0 }),
            Some(CanvasEvent::ConnectionDiscarded)
        );
        assert_eq!(canvas.model().connections().len(), 2);
    }

    #[test]
    fn click_selects_one_element_at_a_time() {
        let mut canvas = canvas_with_two_processes();
        let ctx = select_mode();

        canvas.handle_pointer(&ctx, PointerEvent::Click { x: 0.0, y: 0.0 });
        assert_eq!(canvas.selection(), Some(&Selection::Node("node-1".into())));

        canvas.handle_pointer(&ctx, PointerEvent::Click { x: 100.0, y: 1.0 });
        assert_eq!(
            canvas.selection(),
            Some(&Selection::Connection("conn-1".into()))
        );

        let scene = canvas.scene();
        assert!(scene.nodes.iter().all(|n| !n.selected));
        assert_eq!(scene.edges.iter().filter(|e| e.selected).count(), 1);

        canvas.handle_pointer(&ctx, PointerEvent::Click { x: -500.0, y: -500.0 });
        assert_eq!(canvas.selection(), None);
    }

    #[test]
    fn add_mode_places_node_in_model_space() {
        let mut canvas = canvas_with_two_processes();
        canvas.pan_by(100.0, 50.0);
        canvas.zoom_by(2.0, Point::new(100.0, 50.0));
        let ctx = InteractionContext::new(Mode::Add(NodeType::Decision));

        let event = canvas.handle_pointer(&ctx, PointerEvent::Click { x: 300.0, y: 250.0 });
        assert_eq!(
            event,
            Some(CanvasEvent::NodeAdded {
                id: "node-4".into()
            })
        );
        let node = canvas.model().node("node-4").unwrap();
        assert_eq!(node.position, Point::new(100.0, 100.0));
        assert_eq!(node.node_type, NodeType::Decision);
    }

    #[test]
    fn double_click_opens_label_edit() {
        let mut canvas = canvas_with_two_processes();
        let event = canvas.handle_pointer(&select_mode(), PointerEvent::DoubleClick { x: 200.0, y: 0.0 });
        assert_eq!(
            event,
            Some(CanvasEvent::TextEditRequested {
                id: "node-2".into(),
                text: "Process".into()
            })
        );

        assert_eq!(canvas.commit_text_edit("Ship order").unwrap(), Some("node-2".into()));
        assert_eq!(canvas.model().node("node-2").unwrap().text, "Ship order");
        assert_eq!(canvas.commit_text_edit("ignored").unwrap(), None);
    }

    #[test]
    fn panning_on_empty_space_moves_viewport() {
        let mut canvas = canvas_with_two_processes();
        let ctx = select_mode();
        canvas.handle_pointer(&ctx, PointerEvent::Down { x: 900.0, y: 900.0 });
        canvas.handle_pointer(&ctx, PointerEvent::Move { x: 930.0, y: 880.0 });
        canvas.handle_pointer(&ctx, PointerEvent::Up { x: 930.0, y: 880.0 });

        assert_eq!(
            canvas.transform(),
            Transform {
                k: 1.0,
                x: 30.0,
                y: -20.0
            }
        );
    }

    #[test]
    fn wheel_zoom_is_clamped() {
        let mut canvas = canvas_with_two_processes();
        let ctx = select_mode();
        for _ in 0..20 {
            canvas.handle_pointer(&ctx, PointerEvent::Wheel { x: 0.0, y: 0.0, delta: -500.0 });
        }
        assert_eq!(canvas.transform().k, 4.0);
        for _ in 0..40 {
            canvas.handle_pointer(&ctx, PointerEvent::Wheel { x: 0.0, y: 0.0, delta: 500.0 });
        }
        assert!((canvas.transform().k - 0.1).abs() < 1e-12);
    }

    #[test]
    fn fit_and_reset() {
        let mut model = GraphModel::default();
        model
            .load_from_data(serde_json::json!({
                "nodes": [{
                    "id": "node-1",
                    "type": "process",
                    "position": {"x": 10, "y": 10},
                    "size": {"width": 100, "height": 60}
                }]
            }))
            .unwrap();
        let mut canvas = GraphCanvas::new(
            model,
            CanvasConfig {
                viewport: Size::new(800.0, 600.0),
                ..CanvasConfig::default()
            },
        );

        assert!(canvas.fit_to_screen());
        let t = canvas.transform();
        assert!((t.k - 3.75).abs() < 1e-9);
        assert!((t.x - 175.0).abs() < 1e-9);
        assert!((t.y - 150.0).abs() < 1e-9);

        canvas.reset_zoom();
        assert_eq!(canvas.transform(), Transform::IDENTITY);

        let mut empty = GraphCanvas::from(GraphModel::default());
        assert!(!empty.fit_to_screen());
        assert_eq!(empty.transform(), Transform::IDENTITY);
    }

    #[test]
    fn deleting_selected_node_clears_its_views() {
        let mut canvas = canvas_with_two_processes();
        canvas.select(Selection::Node("node-2".into()));
        assert!(canvas.delete_selected().unwrap());

        let delta = canvas.render();
        assert_eq!(delta.removed_nodes, vec!["node-2".to_string()]);
        assert_eq!(
            delta.removed_edges,
            vec!["conn-1".to_string(), "conn-2".to_string()]
        );
        assert_eq!(canvas.selection(), None);
        assert!(!canvas.delete_selected().unwrap());
    }

    #[test]
    fn loaded_self_loops_render_as_fixed_loop() {
        let mut model = GraphModel::default();
        model
            .load_from_data(serde_json::json!({
                "nodes": [{"id": "node-1", "type": "process", "position": {"x": 0, "y": 0}}],
                "connections": [{"id": "conn-1", "from": "node-1", "to": "node-1"}]
            }))
            .unwrap();
        let mut canvas = GraphCanvas::from(model);
        let scene = canvas.scene();
        let edge = &scene.edges[0];
        assert_eq!(edge.path.start, Point::new(120.0, 30.0));
        assert_eq!(edge.path.end, Point::new(60.0, 0.0));
    }
}
