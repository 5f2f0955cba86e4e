use std::sync::LazyLock;

use chrono::Utc;
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{GraphError, LoadError};
use crate::geometry::Point;
use crate::model::{
    Connection, Diagram, Flowchart, LegacyPayload, LineStyle, Node, NodeType, Question, Status,
};

pub type GraphResult<T> = Result<T, GraphError>;

static NUMERIC_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)$").unwrap_or_else(|err| panic!("invalid suffix pattern: {err}"))
});

/// A node removed from the graph together with the connections that went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    pub connections: Vec<Connection>,
}

/// Partial node update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConnectionPatch {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<LineStyle>,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Owns a diagram and every structural mutation applied to its active section.
#[derive(Debug, Clone)]
pub struct GraphModel {
    diagram: Diagram,
    next_node_id: u64,
    next_connection_id: u64,
    next_question_id: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new(Diagram::default())
    }
}

impl GraphModel {
    pub fn new(diagram: Diagram) -> Self {
        let mut model = Self {
            diagram,
            next_node_id: 1,
            next_connection_id: 1,
            next_question_id: 1,
        };
        model.diagram.active_mut();
        let counters = IdCounters::scan(&model.diagram);
        model.next_node_id = counters.node.unwrap_or_else(|| exhausted("node"));
        model.next_connection_id = counters.connection.unwrap_or_else(|| exhausted("connection"));
        model.next_question_id = counters.question.unwrap_or_else(|| exhausted("question"));
        model
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    fn section(&self) -> Option<&Flowchart> {
        self.diagram.active()
    }

    fn section_mut(&mut self) -> &mut Flowchart {
        self.diagram.active_mut()
    }

    pub fn nodes(&self) -> &[Node] {
        self.section().map(|s| s.nodes.as_slice()).unwrap_or(&[])
    }

    pub fn connections(&self) -> &[Connection] {
        self.section()
            .map(|s| s.connections.as_slice())
            .unwrap_or(&[])
    }

    pub fn questions(&self) -> &[Question] {
        self.section().map(|s| s.questions.as_slice()).unwrap_or(&[])
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes().iter().find(|node| node.id == id)
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections().iter().find(|conn| conn.id == id)
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions().iter().find(|q| q.id == id)
    }

    pub fn incident_connections<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections()
            .iter()
            .filter(move |conn| conn.touches(node_id))
    }

    fn node_mut(&mut self, id: &str) -> GraphResult<&mut Node> {
        self.section_mut()
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn connection_mut(&mut self, id: &str) -> GraphResult<&mut Connection> {
        self.section_mut()
            .connections
            .iter_mut()
            .find(|conn| conn.id == id)
            .ok_or_else(|| GraphError::ConnectionNotFound(id.to_string()))
    }

    fn question_mut(&mut self, id: &str) -> GraphResult<&mut Question> {
        self.section_mut()
            .questions
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| GraphError::QuestionNotFound(id.to_string()))
    }

    pub fn add_node(&mut self, node_type: NodeType, x: f64, y: f64) -> GraphResult<&Node> {
        let id = issue_id(&mut self.next_node_id, "node")?;
        debug!("adding {} node '{id}' at ({x:.1}, {y:.1})", node_type.as_str());

        let nodes = &mut self.section_mut().nodes;
        nodes.push(Node::new(id, node_type, Point::new(x, y)));
        Ok(&nodes[nodes.len() - 1])
    }

    pub fn update_node_position(&mut self, id: &str, x: f64, y: f64) -> GraphResult<&Node> {
        let node = self.node_mut(id)?;
        node.position = Point::new(x, y);
        Ok(node)
    }

    pub fn update_node_text(&mut self, id: &str, text: impl Into<String>) -> GraphResult<&Node> {
        let node = self.node_mut(id)?;
        node.text = text.into();
        Ok(node)
    }

    pub fn update_node_type(&mut self, id: &str, node_type: NodeType) -> GraphResult<&Node> {
        let node = self.node_mut(id)?;
        node.retype(node_type);
        debug!("node '{id}' is now {}", node_type.as_str());
        Ok(node)
    }

    pub fn update_node_status(&mut self, id: &str, status: Status) -> GraphResult<&Node> {
        let node = self.node_mut(id)?;
        node.metadata.status = status;
        Ok(node)
    }

    pub fn update_node_notes(&mut self, id: &str, notes: impl Into<String>) -> GraphResult<&Node> {
        let node = self.node_mut(id)?;
        node.metadata.note = notes.into();
        Ok(node)
    }

    pub fn apply_node_patch(&mut self, id: &str, patch: NodePatch) -> GraphResult<&Node> {
        self.node_mut(id)?;
        if let Some(node_type) = patch.node_type {
            self.update_node_type(id, node_type)?;
        }
        if let Some(text) = patch.text {
            self.update_node_text(id, text)?;
        }
        if let Some(position) = patch.position {
            self.update_node_position(id, position.x, position.y)?;
        }
        if let Some(status) = patch.status {
            self.update_node_status(id, status)?;
        }
        if let Some(notes) = patch.notes {
            self.update_node_notes(id, notes)?;
        }
        self.node(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Removes a node and, unconditionally, every connection that starts or ends at it.
    pub fn delete_node(&mut self, id: &str) -> GraphResult<RemovedNode> {
        let section = self.section_mut();
        let index = section
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        let node = section.nodes.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut section.connections)
            .into_iter()
            .partition(|conn| conn.touches(id));
        section.connections = kept;

        debug!(
            "deleted node '{id}' and {} incident connection(s)",
            removed.len()
        );
        Ok(RemovedNode {
            node,
            connections: removed,
        })
    }

    /// Adds a directed connection. Endpoints are weak references and are not resolved here.
    pub fn add_connection(
        &mut self,
        from: &str,
        to: &str,
        label: impl Into<String>,
    ) -> GraphResult<&Connection> {
        if from == to {
            return Err(GraphError::SelfLoop(from.to_string()));
        }

        let id = issue_id(&mut self.next_connection_id, "conn")?;
        debug!("connecting '{from}' -> '{to}' as '{id}'");

        let connections = &mut self.section_mut().connections;
        connections.push(Connection {
            id,
            from: from.to_string(),
            to: to.to_string(),
            label: label.into(),
            style: LineStyle::default(),
            metadata: Default::default(),
        });
        Ok(&connections[connections.len() - 1])
    }

    pub fn update_connection_label(
        &mut self,
        id: &str,
        label: impl Into<String>,
    ) -> GraphResult<&Connection> {
        let conn = self.connection_mut(id)?;
        conn.label = label.into();
        Ok(conn)
    }

    pub fn update_connection_style(
        &mut self,
        id: &str,
        style: LineStyle,
    ) -> GraphResult<&Connection> {
        let conn = self.connection_mut(id)?;
        conn.style = style;
        Ok(conn)
    }

    pub fn update_connection_status(
        &mut self,
        id: &str,
        status: Status,
    ) -> GraphResult<&Connection> {
        let conn = self.connection_mut(id)?;
        conn.metadata.status = status;
        Ok(conn)
    }

    pub fn apply_connection_patch(
        &mut self,
        id: &str,
        patch: ConnectionPatch,
    ) -> GraphResult<&Connection> {
        self.connection_mut(id)?;
        if let Some(label) = patch.label {
            self.update_connection_label(id, label)?;
        }
        if let Some(style) = patch.style {
            self.update_connection_style(id, style)?;
        }
        if let Some(status) = patch.status {
            self.update_connection_status(id, status)?;
        }
        self.connection(id)
            .ok_or_else(|| GraphError::ConnectionNotFound(id.to_string()))
    }

    pub fn delete_connection(&mut self, id: &str) -> GraphResult<Connection> {
        let connections = &mut self.section_mut().connections;
        let index = connections
            .iter()
            .position(|conn| conn.id == id)
            .ok_or_else(|| GraphError::ConnectionNotFound(id.to_string()))?;
        debug!("deleted connection '{id}'");
        Ok(connections.remove(index))
    }

    pub fn add_question(
        &mut self,
        category: impl Into<String>,
        text: impl Into<String>,
    ) -> GraphResult<&Question> {
        let id = issue_id(&mut self.next_question_id, "q")?;

        let questions = &mut self.section_mut().questions;
        questions.push(Question {
            id,
            category: category.into(),
            text: text.into(),
            answer: String::new(),
        });
        Ok(&questions[questions.len() - 1])
    }

    pub fn update_question_answer(
        &mut self,
        id: &str,
        answer: impl Into<String>,
    ) -> GraphResult<&Question> {
        let question = self.question_mut(id)?;
        question.answer = answer.into();
        Ok(question)
    }

    pub fn delete_question(&mut self, id: &str) -> GraphResult<Question> {
        let questions = &mut self.section_mut().questions;
        let index = questions
            .iter()
            .position(|q| q.id == id)
            .ok_or_else(|| GraphError::QuestionNotFound(id.to_string()))?;
        Ok(questions.remove(index))
    }

    /// Replaces the diagram-level descriptive fields. `None` leaves a field untouched.
    pub fn update_details(
        &mut self,
        title: Option<String>,
        description: Option<String>,
        general_notes: Option<String>,
    ) {
        if let Some(title) = title {
            self.diagram.title = title;
        }
        if let Some(description) = description {
            self.diagram.description = description;
        }
        if let Some(notes) = general_notes {
            self.diagram.general_notes = notes;
        }
    }

    /// Replaces the diagram with `payload`, which may be the versioned shape or a legacy
    /// bare `{nodes, connections, questions}` object. Nothing changes when decoding fails.
    pub fn load_from_data(&mut self, payload: Value) -> Result<(), LoadError> {
        let diagram = decode_payload(payload)?;
        let counters = IdCounters::scan(&diagram);
        let overflow = |kind: &str| {
            LoadError::Structure(format!("{kind} id suffix leaves no room for new ids"))
        };
        let next_node_id = counters.node.ok_or_else(|| overflow("node"))?;
        let next_connection_id = counters.connection.ok_or_else(|| overflow("connection"))?;
        let next_question_id = counters.question.ok_or_else(|| overflow("question"))?;

        self.diagram = diagram;
        self.next_node_id = next_node_id;
        self.next_connection_id = next_connection_id;
        self.next_question_id = next_question_id;
        info!(
            "loaded flowchart '{}' with {} node(s), {} connection(s), {} question(s)",
            self.diagram.title,
            self.nodes().len(),
            self.connections().len(),
            self.questions().len()
        );
        Ok(())
    }

    pub fn load_from_json(&mut self, json: &str) -> Result<(), LoadError> {
        let payload: Value = serde_json::from_str(json)?;
        self.load_from_data(payload)
    }

    /// Independent snapshot of the diagram with a fresh timestamp.
    pub fn export_data(&self) -> Diagram {
        let mut snapshot = self.diagram.clone();
        snapshot.timestamp = Utc::now();
        snapshot
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.export_data())
    }

    pub fn clear_all(&mut self) {
        let section = self.section_mut();
        section.nodes.clear();
        section.connections.clear();
        section.questions.clear();
        info!("cleared active flowchart");
    }
}

/// Next free numeric suffix per id kind; `None` when a loaded suffix is already `u64::MAX`.
struct IdCounters {
    node: Option<u64>,
    connection: Option<u64>,
    question: Option<u64>,
}

impl IdCounters {
    fn scan(diagram: &Diagram) -> Self {
        let sections = &diagram.flowcharts;
        Self {
            node: next_after(
                sections
                    .iter()
                    .flat_map(|s| s.nodes.iter().map(|n| n.id.as_str())),
            ),
            connection: next_after(
                sections
                    .iter()
                    .flat_map(|s| s.connections.iter().map(|c| c.id.as_str())),
            ),
            question: next_after(
                sections
                    .iter()
                    .flat_map(|s| s.questions.iter().map(|q| q.id.as_str())),
            ),
        }
    }
}

fn exhausted(kind: &str) -> u64 {
    warn!("{kind} ids are exhausted; new {kind}s will be refused");
    u64::MAX
}

/// Hands out the current counter value. The counter never issues `u64::MAX` itself.
fn issue_id(counter: &mut u64, prefix: &str) -> GraphResult<String> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or_else(|| GraphError::IdsExhausted(prefix.to_string()))?;
    Ok(format!("{prefix}-{id}"))
}

fn numeric_suffix(id: &str) -> Option<u64> {
    NUMERIC_SUFFIX
        .captures(id)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn next_after<'a>(ids: impl Iterator<Item = &'a str>) -> Option<u64> {
    match ids.filter_map(numeric_suffix).max() {
        Some(max) => max.checked_add(1),
        None => Some(1),
    }
}

fn decode_payload(payload: Value) -> Result<Diagram, LoadError> {
    let Some(object) = payload.as_object() else {
        return Err(LoadError::Structure(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    let mut diagram = if object.contains_key("flowcharts") {
        let diagram: Diagram = serde_json::from_value(payload)?;
        if diagram.flowcharts.is_empty() {
            return Err(LoadError::Structure(
                "diagram must contain at least one flowchart".to_string(),
            ));
        }
        diagram
    } else {
        let legacy: LegacyPayload = serde_json::from_value(payload)?;
        let mut diagram = Diagram::default();
        let section = diagram.active_mut();
        section.nodes = legacy.nodes;
        section.connections = legacy.connections;
        section.questions = legacy.questions;
        diagram
    };

    for section in &mut diagram.flowcharts {
        for node in &mut section.nodes {
            node.normalize();
        }
    }
    Ok(diagram)
}
