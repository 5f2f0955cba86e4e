pub const LABEL_CHAR_WIDTH: f64 = 7.0;
pub const LABEL_LINE_HEIGHT: f64 = 16.0;
pub const LABEL_HORIZONTAL_PADDING: f64 = 12.0;
pub const LABEL_VERTICAL_PADDING: f64 = 6.0;

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::new();
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Splits a label into display lines, keeping blank lines as a single space.
pub fn label_lines(label: &str) -> Vec<String> {
    if label.trim().is_empty() {
        return Vec::new();
    }
    label
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                " ".to_string()
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Approximate width and height of the box behind a multi-line label.
pub fn measure_label_box(lines: &[String]) -> (f64, f64) {
    let max_chars = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);

    let width = LABEL_CHAR_WIDTH * max_chars as f64 + LABEL_HORIZONTAL_PADDING;
    let height = LABEL_LINE_HEIGHT * lines.len() as f64 + LABEL_VERTICAL_PADDING;
    (width, height)
}
