//! Static file serving
//!
//! Files come from the configured web root on disk. When the root has no
//! `index.html`, `/` is answered with a small embedded page so a bare
//! install still shows something useful.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Static file handler rooted at a web directory
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `rel` relative to the web root. Directories resolve to their `index.html`.
    pub async fn serve(&self, rel: &str) -> Response {
        let rel = rel.trim_start_matches('/');
        let requested = if rel.is_empty() {
            self.root.join("index.html")
        } else {
            self.root.join(rel)
        };

        let Ok(canon_root) = self.root.canonicalize() else {
            return self.missing(rel);
        };
        let Ok(mut canon_req) = requested.canonicalize() else {
            return self.missing(rel);
        };
        if !canon_req.starts_with(&canon_root) {
            debug!("Refusing path outside web root: {}", rel);
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }
        if canon_req.is_dir() {
            canon_req = canon_req.join("index.html");
        }

        match tokio::fs::read(&canon_req).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(&canon_req).first_or_octet_stream();
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                    bytes,
                )
                    .into_response()
            }
            Err(_) => self.missing(rel),
        }
    }

    fn missing(&self, rel: &str) -> Response {
        if rel.is_empty() || rel == "index.html" {
            return serve_embedded(FALLBACK_INDEX_HTML, "text/html; charset=utf-8");
        }
        (StatusCode::NOT_FOUND, "Not found").into_response()
    }
}

fn serve_embedded(content: &'static str, content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content,
    )
        .into_response()
}

const FALLBACK_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>PoP Node Console</title>
<style>
body { font-family: sans-serif; margin: 2rem; color: #222; }
pre { background: #f4f4f4; padding: 1rem; }
</style>
</head>
<body>
<h1>PoP Node Console</h1>
<p>No web UI was found in the configured web root. The API is available:</p>
<ul>
<li><a href="/api/status">/api/status</a></li>
<li><a href="/api/config">/api/config</a></li>
<li><a href="/api/logs?limit=50">/api/logs</a></li>
</ul>
<pre id="status">loading…</pre>
<script>
fetch('/api/status')
  .then(r => r.json())
  .then(j => { document.getElementById('status').textContent = JSON.stringify(j, null, 2); })
  .catch(e => { document.getElementById('status').textContent = String(e); });
</script>
</body>
</html>
"#;
