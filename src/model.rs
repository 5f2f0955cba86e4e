use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Shape, Size};

pub const FORMAT_VERSION: u32 = 1;
pub const DEFAULT_BORDER_COLOR: &str = "#2d3748";
pub const DEFAULT_TEXT_COLOR: &str = "#1a202c";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    Process,
    Decision,
    End,
    Connector,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::Start,
        NodeType::Process,
        NodeType::Decision,
        NodeType::End,
        NodeType::Connector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::Process => "process",
            NodeType::Decision => "decision",
            NodeType::End => "end",
            NodeType::Connector => "connector",
        }
    }

    pub fn default_text(&self) -> &'static str {
        match self {
            NodeType::Start => "Start",
            NodeType::Process => "Process",
            NodeType::Decision => "Decision?",
            NodeType::End => "End",
            NodeType::Connector => "",
        }
    }

    pub fn default_size(&self) -> Size {
        match self {
            NodeType::Start | NodeType::Process | NodeType::End => Size::new(120.0, 60.0),
            NodeType::Decision => Size::new(140.0, 80.0),
            NodeType::Connector => Size::new(40.0, 40.0),
        }
    }

    pub fn default_fill_color(&self) -> &'static str {
        match self {
            NodeType::Start => "#c6f6d5",
            NodeType::Process => "#bee3f8",
            NodeType::Decision => "#fefcbf",
            NodeType::End => "#fed7d7",
            NodeType::Connector => "#e2e8f0",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            NodeType::Start | NodeType::End => Shape::Ellipse,
            NodeType::Decision => Shape::Diamond,
            NodeType::Process | NodeType::Connector => Shape::Rectangle,
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown node type '{value}'"))
    }
}

/// Review state shared by nodes and connections. Any state may be assigned from any other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Status::Pending => "status-pending",
            Status::Approved => "status-approved",
            Status::Rejected => "status-rejected",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "approved" => Ok(Status::Approved),
            "rejected" => Ok(Status::Rejected),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    #[serde(default)]
    pub background_color: String,
    #[serde(default = "default_border_color")]
    pub border_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
}

impl NodeStyle {
    pub fn for_type(node_type: NodeType) -> Self {
        Self {
            background_color: node_type.default_fill_color().to_string(),
            border_color: DEFAULT_BORDER_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }
}

fn default_border_color() -> String {
    DEFAULT_BORDER_COLOR.to_string()
}

fn default_text_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default)]
    pub size: Size,
    pub style: Option<NodeStyle>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl Node {
    pub fn new(id: String, node_type: NodeType, position: Point) -> Self {
        Self {
            id,
            node_type,
            text: node_type.default_text().to_string(),
            position,
            size: node_type.default_size(),
            style: Some(NodeStyle::for_type(node_type)),
            metadata: NodeMetadata::default(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    pub fn shape(&self) -> Shape {
        self.node_type.shape()
    }

    /// Switches the type and re-derives the size and background colour from it.
    pub fn retype(&mut self, node_type: NodeType) {
        self.node_type = node_type;
        self.size = node_type.default_size();
        let style = self
            .style
            .get_or_insert_with(|| NodeStyle::for_type(node_type));
        style.background_color = node_type.default_fill_color().to_string();
    }

    /// Fills in geometry and style that older payloads may omit.
    pub(crate) fn normalize(&mut self) {
        let node_type = self.node_type;
        if self.size.is_empty() {
            self.size = node_type.default_size();
        }
        let style = self
            .style
            .get_or_insert_with(|| NodeStyle::for_type(node_type));
        if style.background_color.trim().is_empty() {
            style.background_color = node_type.default_fill_color().to_string();
        }
    }

    pub fn style(&self) -> NodeStyle {
        self.style
            .clone()
            .unwrap_or_else(|| NodeStyle::for_type(self.node_type))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStyle::Solid => "solid",
            LineStyle::Dashed => "dashed",
            LineStyle::Dotted => "dotted",
        }
    }

    /// SVG `stroke-dasharray` value, if any.
    pub fn dash_array(&self) -> Option<&'static str> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some("8 6"),
            LineStyle::Dotted => Some("2 4"),
        }
    }
}

impl std::str::FromStr for LineStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "solid" => Ok(LineStyle::Solid),
            "dashed" => Ok(LineStyle::Dashed),
            "dotted" => Ok(LineStyle::Dotted),
            other => Err(format!("unknown line style '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub style: LineStyle,
    #[serde(default)]
    pub metadata: ConnectionMetadata,
}

impl Connection {
    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub answer: String,
}

/// One independent node/connection/question graph within a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flowchart {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Flowchart {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: format!("flowchart-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            description: String::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
            questions: Vec::new(),
        }
    }

    /// Connections with an endpoint that no longer names a node in this section.
    pub fn dangling_connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|connection| {
            let resolves = |id: &str| self.nodes.iter().any(|node| node.id == id);
            !resolves(&connection.from) || !resolves(&connection.to)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub general_notes: String,
    pub flowcharts: Vec<Flowchart>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

impl Default for Diagram {
    fn default() -> Self {
        Self::new("Untitled flowchart")
    }
}

impl Diagram {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            version: FORMAT_VERSION,
            timestamp: Utc::now(),
            flowcharts: vec![Flowchart::new(title.clone())],
            title,
            description: String::new(),
            general_notes: String::new(),
        }
    }

    /// The section the editor operates on.
    pub fn active(&self) -> Option<&Flowchart> {
        self.flowcharts.first()
    }

    pub(crate) fn active_mut(&mut self) -> &mut Flowchart {
        if self.flowcharts.is_empty() {
            self.flowcharts.push(Flowchart::new(self.title.clone()));
        }
        &mut self.flowcharts[0]
    }
}

/// Pre-versioning payload: a single bare section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyPayload {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub questions: Vec<Question>,
}
