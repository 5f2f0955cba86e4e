pub mod canvas;
pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod model;
pub mod render;
#[cfg(feature = "server")]
pub mod serve;
pub mod utils;

pub use canvas::{
    CanvasEvent, GraphCanvas, InteractionContext, Mode, PointerEvent, RenderDelta, Scene,
    Selection,
};
pub use config::CanvasConfig;
pub use editor::{Editor, LogNotifier, Notifier};
pub use error::{GraphError, LoadError};
pub use geometry::{CubicPath, Point, Rect, Shape, Size, Transform};
pub use graph::{ConnectionPatch, GraphModel, GraphResult, NodePatch};
pub use model::{Connection, Diagram, Flowchart, LineStyle, Node, NodeType, Question, Status};
