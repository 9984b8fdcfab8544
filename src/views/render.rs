use serde_json::Value;

/// Turns a named view and its model into an HTML document.
pub trait Renderer: Send + Sync {
    fn render(&self, view: &str, title: &str, model: &Value) -> anyhow::Result<String>;
}

/// Bare HTML page that hands the model to client-side code as a JSON data island.
#[derive(Debug, Default, Clone)]
pub struct ShellRenderer;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON safe to embed inside a `<script>` element.
fn script_json(model: &Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string(model)?
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

impl Renderer for ShellRenderer {
    fn render(&self, view: &str, title: &str, model: &Value) -> anyhow::Result<String> {
        Ok(format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>Natours | {title}</title>\n</head>\n<body data-view=\"{view}\">\n\
             <script id=\"view-model\" type=\"application/json\">{json}</script>\n\
             </body>\n</html>\n",
            title = escape_html(title),
            view = escape_html(view),
            json = script_json(model)?,
        ))
    }
}
