//! Static files compiled into the binary

use serde_json::json;

use crate::config::Config;

const INDEX_TEMPLATE: &str = include_str!("../assets/index.html");

const ASSETS: &[(&str, &[u8])] = &[
    ("dist/main.js", include_bytes!("../assets/dist/main.js")),
    ("dist/main.css", include_bytes!("../assets/dist/main.css")),
];

/// An embedded file and its content type
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    /// File contents
    pub body: &'static [u8],
    /// Guessed MIME type
    pub content_type: &'static str,
}

/// Look up an asset by its path below `vfs/`
pub fn asset(name: &str) -> Option<Asset> {
    ASSETS
        .iter()
        .find(|(path, _)| *path == name)
        .map(|(path, body)| Asset {
            body,
            content_type: mime_guess::from_path(path).first_raw().unwrap_or("application/octet-stream"),
        })
}

/// The index page with the client settings filled in
pub fn render_index(config: &Config) -> String {
    let client_config = json!({
        "relativeRoot": config.relative_root,
        "allowDownload": config.allow_download,
        "tailLinesInitial": config.tail_lines_initial,
    });

    INDEX_TEMPLATE
        .replace("{{title}}", &escape_html(&config.title))
        .replace("{{relative_root}}", &escape_html(&config.relative_root))
        // `</` would end the inline script early
        .replace("{{client_config}}", &client_config.to_string().replace("</", "<\\/"))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
