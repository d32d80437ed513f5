//! Plot a single-variable expression as an SVG line chart

use super::expr::{self, format_number, Expr};
use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;

const MAX_SAMPLES: u32 = 10_000;
const MARKER_LIMIT: usize = 200;
const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 60.0;

pub struct PlotGraphTool;

fn default_variable() -> String {
    "x".to_string()
}

fn default_end() -> f64 {
    10.0
}

fn default_step() -> f64 {
    1.0
}

fn default_title() -> String {
    "Graph".to_string()
}

#[derive(Debug, Deserialize)]
struct PlotInput {
    expression: String,
    #[serde(default = "default_variable")]
    variable: String,
    #[serde(default)]
    range_start: f64,
    #[serde(default = "default_end")]
    range_end: f64,
    #[serde(default = "default_step")]
    step: f64,
    #[serde(default = "default_title")]
    title: String,
}

/// Sampled curve; `None` marks points outside the expression's domain
struct Series {
    points: Vec<(f64, Option<f64>)>,
}

impl Series {
    fn sample(input: &PlotInput, expr: &Expr) -> Result<Self, String> {
        if !input.step.is_finite() || input.step <= 0.0 {
            return Err("step must be a positive number".to_string());
        }
        if !input.range_start.is_finite() || !input.range_end.is_finite() {
            return Err("range bounds must be finite".to_string());
        }
        if input.range_end < input.range_start {
            return Err("range_end must not be less than range_start".to_string());
        }
        let span = (input.range_end - input.range_start) / input.step;
        if span > f64::from(MAX_SAMPLES - 1) {
            return Err(format!("too many samples (max {MAX_SAMPLES}); increase step"));
        }

        let tolerance = input.step * 1e-9;
        let mut points = Vec::new();
        let mut i = 0u32;
        loop {
            let x = input.range_start + input.step * f64::from(i);
            if x > input.range_end + tolerance {
                break;
            }
            let y = expr
                .eval(&[(input.variable.as_str(), x)])
                .ok()
                .filter(|y| y.is_finite());
            points.push((x, y));
            i += 1;
        }

        if points.iter().all(|(_, y)| y.is_none()) {
            return Err("expression has no finite values in the given range".to_string());
        }
        Ok(Self { points })
    }

    fn y_bounds(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points
            .iter()
            .filter_map(|(_, y)| *y)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
                (lo.min(y), hi.max(y))
            });
        if (hi - lo).abs() < f64::EPSILON {
            (lo - 1.0, hi + 1.0)
        } else {
            (lo, hi)
        }
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn flush_polyline(run: &mut Vec<String>, svg: &mut String) {
    if run.len() > 1 {
        let _ = writeln!(
            svg,
            r##"<polyline fill="none" stroke="#1f77b4" stroke-width="2" points="{}"/>"##,
            run.join(" ")
        );
    }
    run.clear();
}

fn render_svg(series: &Series, input: &PlotInput) -> String {
    let (x_min, x_max) = (
        input.range_start,
        if input.range_end > input.range_start {
            input.range_end
        } else {
            input.range_start + 1.0
        },
    );
    let (y_min, y_max) = series.y_bounds();
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let px = |x: f64| MARGIN + (x - x_min) / (x_max - x_min) * plot_w;
    let py = |y: f64| HEIGHT - MARGIN - (y - y_min) / (y_max - y_min) * plot_h;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
        WIDTH / 2.0,
        escape_xml(&input.title)
    );

    // Axes frame
    let _ = writeln!(
        svg,
        r##"<rect x="{MARGIN}" y="{MARGIN}" width="{plot_w}" height="{plot_h}" fill="none" stroke="#888"/>"##
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="14">{}</text>"#,
        WIDTH / 2.0,
        HEIGHT - 15.0,
        escape_xml(&input.variable)
    );
    let _ = writeln!(
        svg,
        r#"<text x="18" y="{}" text-anchor="middle" font-size="14" transform="rotate(-90 18 {})">{}</text>"#,
        HEIGHT / 2.0,
        HEIGHT / 2.0,
        escape_xml(&input.expression)
    );
    for (x, anchor) in [(x_min, "start"), (x_max, "end")] {
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{}" text-anchor="{anchor}" font-size="11">{}</text>"#,
            px(x),
            HEIGHT - MARGIN + 16.0,
            format_number(x)
        );
    }
    for y in [y_min, y_max] {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" text-anchor="end" font-size="11">{}</text>"#,
            MARGIN - 6.0,
            py(y) + 4.0,
            format_number((y * 1000.0).round() / 1000.0)
        );
    }

    // One polyline per contiguous run of defined points
    let mut run: Vec<String> = Vec::new();
    for (x, y) in &series.points {
        match y {
            Some(y) => run.push(format!("{:.2},{:.2}", px(*x), py(*y))),
            None => flush_polyline(&mut run, &mut svg),
        }
    }
    flush_polyline(&mut run, &mut svg);

    if series.points.len() <= MARKER_LIMIT {
        for (x, y) in &series.points {
            if let Some(y) = y {
                let _ = writeln!(
                    svg,
                    r##"<circle cx="{:.2}" cy="{:.2}" r="3" fill="#1f77b4"/>"##,
                    px(*x),
                    py(*y)
                );
            }
        }
    }

    svg.push_str("</svg>\n");
    svg
}

#[async_trait]
impl Tool for PlotGraphTool {
    fn name(&self) -> &'static str {
        "plot_graph"
    }

    fn description(&self) -> String {
        "Plot a mathematical expression of one variable over a range and save the \
         chart as an image. Returns the image path. Defaults: variable x, range 0 to 10, \
         step 1, title \"Graph\"."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["expression"],
            "properties": {
                "expression": {"type": "string", "description": "Expression to plot, e.g. \"x**2 + 1\""},
                "variable": {"type": "string", "description": "Variable name used in the expression (default x)"},
                "range_start": {"type": "number", "description": "First value of the variable (default 0)"},
                "range_end": {"type": "number", "description": "Last value of the variable, inclusive (default 10)"},
                "step": {"type": "number", "description": "Sampling step, greater than 0 (default 1)"},
                "title": {"type": "string", "description": "Chart title (default Graph)"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: PlotInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        let expr = match expr::parse(&input.expression) {
            Ok(e) => e,
            Err(e) => return ToolOutput::error(format!("Error parsing expression: {e}")),
        };
        if let Some(name) = expr.free_names().into_iter().find(|n| *n != input.variable) {
            return ToolOutput::error(format!(
                "Error parsing expression: name '{name}' is not defined (variable is '{}')",
                input.variable
            ));
        }

        let series = match Series::sample(&input, &expr) {
            Ok(s) => s,
            Err(e) => return ToolOutput::error(format!("Error plotting graph: {e}")),
        };
        let svg = render_svg(&series, &input);

        if let Err(e) = tokio::fs::create_dir_all(&ctx.artifact_dir).await {
            return ToolOutput::error(format!(
                "Failed to create {}: {e}",
                ctx.artifact_dir.display()
            ));
        }
        let path = ctx
            .artifact_dir
            .join(format!("graph_{}.svg", uuid::Uuid::new_v4()));

        match tokio::fs::write(&path, svg).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), samples = series.points.len(), "Graph written");
                ToolOutput::image_path(&path)
            }
            Err(e) => ToolOutput::error(format!("Failed to write {}: {e}", path.display())),
        }
    }
}
