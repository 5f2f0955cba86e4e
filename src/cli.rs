use anyhow::{Context, Result, bail, ensure};
use clap::{ArgAction, Parser, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flowcanvas::geometry::Size;
use flowcanvas::model::Diagram;
#[cfg(feature = "server")]
use flowcanvas::serve::{ServeArgs, run_serve};
use flowcanvas::{CanvasConfig, Editor, GraphModel, NodeType};

const DEFAULT_NEW_FLOWCHART_NAME: &str = "flowchart.json";

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "flowcanvas",
    about = "Render flowchart JSON to SVG, PNG or a text outline."
)]
pub struct RenderArgs {
    /// Path to the flowchart JSON file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Scale factor when rasterizing PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// Background color for the rendered flowchart.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Canvas configuration file (JSON).
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Zoom and centre the viewport on the whole flowchart.
    #[arg(long = "fit", action = ArgAction::SetTrue)]
    fit: bool,

    /// Viewport width in pixels, overriding the configuration.
    #[arg(long = "width")]
    width: Option<f64>,

    /// Viewport height in pixels, overriding the configuration.
    #[arg(long = "height")]
    height: Option<f64>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(name = "flowcanvas new", about = "Create an empty flowchart file.")]
pub struct NewArgs {
    /// Where to write the flowchart. An existing file is never overwritten.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Title of the new flowchart.
    #[arg(long = "title", default_value = "Untitled flowchart")]
    title: String,

    /// Seed the flowchart with a start and an end node.
    #[arg(long = "template", action = ArgAction::SetTrue)]
    template: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(name = "flowcanvas inspect", about = "Summarise a flowchart file.")]
pub struct InspectArgs {
    /// Path to the flowchart JSON file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Svg,
    Png,
    Text,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "svg" => Some(OutputFormat::Svg),
            Some(ext) if ext == "png" => Some(OutputFormat::Png),
            Some(ext) if ext == "txt" => Some(OutputFormat::Text),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Text => "txt",
        }
    }
}

/// `flowchart.json` becomes `flowchart1.json`, `flowchart2.json`, ... until a free name is found.
fn ensure_unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map_or_else(|| "flowchart".into(), |stem| stem.to_string_lossy().into_owned());
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let free = (1u32..)
        .map(|n| path.with_file_name(format!("{stem}{n}{suffix}")))
        .find(|candidate| !candidate.exists());
    free.unwrap_or(path)
}

fn run_new(args: NewArgs) -> Result<()> {
    let requested = args
        .output
        .unwrap_or_else(|| PathBuf::from(DEFAULT_NEW_FLOWCHART_NAME));
    let path = ensure_unique_path(requested);

    let mut model = GraphModel::new(Diagram::new(args.title));
    if args.template {
        let start = model.add_node(NodeType::Start, 100.0, 100.0)?.id.clone();
        let end = model.add_node(NodeType::End, 400.0, 100.0)?.id.clone();
        model.add_connection(&start, &end, "")?;
    }

    let json = model
        .export_json()
        .context("failed to serialize new flowchart")?;
    fs::write(&path, json.as_bytes())
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    if !args.quiet {
        println!("Created flowchart -> {}", path.display());
    }
    Ok(())
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source, cli.output_format)?;
    let format = determine_format(cli.output_format, &output_dest)?;

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let config = resolve_config(cli.config.as_deref(), cli.width, cli.height)?;
    let model = load_model(&input_source)?;
    let mut editor = Editor::new(model, config);
    if cli.fit && !editor.canvas_mut().fit_to_screen() {
        log::warn!("nothing to fit; the flowchart has no nodes");
    }

    let output_bytes = match format {
        OutputFormat::Svg => editor.export_svg(&cli.background_color).into_bytes(),
        OutputFormat::Text => editor.export_text().into_bytes(),
        OutputFormat::Png => render_png(&mut editor, &cli.background_color, cli.scale)?,
    };

    write_output(output_dest, &output_bytes, cli.quiet)?;

    Ok(())
}

#[cfg(feature = "png")]
fn render_png(editor: &mut Editor, background: &str, scale: f32) -> Result<Vec<u8>> {
    let svg = editor.export_svg(background);
    flowcanvas::render::render_png(&svg, scale)
}

#[cfg(not(feature = "png"))]
fn render_png(_editor: &mut Editor, _background: &str, _scale: f32) -> Result<Vec<u8>> {
    bail!("PNG output requires the 'png' feature to be enabled")
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let input_source = parse_input(args.input.as_deref())?;
    let model = load_model(&input_source)?;
    print!("{}", summarize(model.diagram()));
    Ok(())
}

fn summarize(diagram: &Diagram) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} (format v{}, saved {})\n",
        diagram.title,
        diagram.version,
        diagram.timestamp.to_rfc3339()
    ));

    for (index, flowchart) in diagram.flowcharts.iter().enumerate() {
        let marker = if index == 0 { " [active]" } else { "" };
        out.push_str(&format!("section {}{marker}: {}\n", index + 1, flowchart.id));

        let by_type = NodeType::ALL
            .iter()
            .map(|node_type| {
                let count = flowchart
                    .nodes
                    .iter()
                    .filter(|node| node.node_type == *node_type)
                    .count();
                format!("{} {}", count, node_type.as_str())
            })
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "  nodes: {} ({by_type})\n",
            flowchart.nodes.len()
        ));
        out.push_str(&format!(
            "  connections: {}\n",
            flowchart.connections.len()
        ));

        let answered = flowchart
            .questions
            .iter()
            .filter(|question| !question.answer.trim().is_empty())
            .count();
        out.push_str(&format!(
            "  questions: {} ({answered} answered)\n",
            flowchart.questions.len()
        ));

        for connection in flowchart.dangling_connections() {
            out.push_str(&format!(
                "  dangling: {} ({} -> {})\n",
                connection.id, connection.from, connection.to
            ));
        }
    }
    out
}

#[cfg(feature = "server")]
pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("serve") {
        return run_serve(ServeArgs::parse_from(subcommand_args(&args))).await;
    }
    dispatch_offline(&args)
}

#[cfg(not(feature = "server"))]
pub fn dispatch_sync() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("serve") {
        bail!("'serve' command requires the 'server' feature to be enabled");
    }
    dispatch_offline(&args)
}

fn dispatch_offline(args: &[String]) -> Result<()> {
    match args.get(1).map(|s| s.as_str()) {
        Some("new") => run_new(NewArgs::parse_from(subcommand_args(args))),
        Some("inspect") => run_inspect(InspectArgs::parse_from(subcommand_args(args))),
        Some("render") => run_render(RenderArgs::parse_from(subcommand_args(args))),
        _ => run_render(RenderArgs::parse_from(args)),
    }
}

/// Drops the subcommand name so the remaining flags parse against its own argument struct.
fn subcommand_args(args: &[String]) -> Vec<String> {
    args.iter().take(1).chain(args.iter().skip(2)).cloned().collect()
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    let Some(path) = input.filter(|raw| *raw != "-") else {
        return Ok(InputSource::Stdin);
    };
    let path = PathBuf::from(path);
    ensure!(path.exists(), "input file '{}' does not exist", path.display());
    Ok(InputSource::File(path))
}

fn resolve_config(
    path: Option<&Path>,
    width: Option<f64>,
    height: Option<f64>,
) -> Result<CanvasConfig> {
    let mut config = match path {
        Some(path) => CanvasConfig::from_file(path)?,
        None => CanvasConfig::default(),
    };
    if width.is_some() || height.is_some() {
        config.viewport = Size::new(
            width.unwrap_or(config.viewport.width),
            height.unwrap_or(config.viewport.height),
        );
    }
    config.validate()?;
    Ok(config)
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    let path = match output {
        Some("-") => return Ok(OutputDestination::Stdout),
        Some(raw) => PathBuf::from(raw),
        None => return Ok(OutputDestination::File(default_output_path(input, format_hint))),
    };
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        ensure!(dir.exists(), "output directory '{}' does not exist", dir.display());
    }
    Ok(OutputDestination::File(path))
}

/// `release.json` renders next to itself as `release.svg`; stdin renders to `flowchart.svg`.
fn default_output_path(input: &InputSource, format_hint: Option<OutputFormat>) -> PathBuf {
    let extension = format_hint.unwrap_or(OutputFormat::Svg).extension();
    match input {
        InputSource::File(path) => path.with_extension(extension),
        InputSource::Stdin => Path::new("flowchart").with_extension(extension),
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    match (preference, output) {
        (Some(format), _) => Ok(format),
        (None, OutputDestination::Stdout) => Ok(OutputFormat::Svg),
        (None, OutputDestination::File(path)) => OutputFormat::from_path(path).with_context(|| {
            format!(
                "cannot tell the output format of '{}'; pass --output-format",
                path.display()
            )
        }),
    }
}

fn load_definition(source: &InputSource) -> Result<String> {
    let (contents, origin) = match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            (buffer, "stdin".to_string())
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            (contents, format!("'{}'", path.display()))
        }
    };
    ensure!(!contents.trim().is_empty(), "no flowchart JSON found in {origin}");
    Ok(contents)
}

fn load_model(source: &InputSource) -> Result<GraphModel> {
    let definition = load_definition(source)?;
    let mut model = GraphModel::default();
    model
        .load_from_json(&definition)
        .context("input is not a valid flowchart")?;
    Ok(model)
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    let OutputDestination::File(path) = dest else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        return stdout.flush().map_err(Into::into);
    };
    fs::write(&path, bytes).with_context(|| format!("failed to write '{}'", path.display()))?;
    if !quiet {
        println!("Generated flowchart -> {}", path.display());
    }
    Ok(())
}
