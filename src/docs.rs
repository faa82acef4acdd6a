//! Interactive API reference page.
//!
//! Serves a [Scalar](https://github.com/scalar/scalar) page that loads an
//! OpenAPI document from `spec_url`:
//!
//! ```rust,no_run
//! use kiln::{docs, Router};
//!
//! let app = Router::new().handle("GET /docs", docs::api_reference("/openapi.yaml", "Users API"));
//! ```
//!
//! The page is rendered once, when the handler is built.

use std::sync::Arc;

use http::StatusCode;
use serde_json::json;

use crate::context::Context;
use crate::error::Error;
use crate::handler::Handler;

const SCALAR_CDN: &str = "https://cdn.jsdelivr.net/npm/@scalar/api-reference";

/// A handler answering every request with the API reference page.
pub fn api_reference(spec_url: &str, title: &str) -> impl Handler {
    let page: Arc<str> = render(spec_url, title).into();

    move |ctx: Context| {
        let page = Arc::clone(&page);
        async move {
            ctx.html(StatusCode::OK, &*page);
            Ok::<(), Error>(())
        }
    }
}

fn render(spec_url: &str, title: &str) -> String {
    let configuration = json!({
        "darkMode": true,
        "layout": "classic",
        "theme": "alternate",
        "hideModels": false,
        "showSidebar": true,
        "hideDownloadButton": true,
    });
    // A JSON string may still contain `</script>`.
    let configuration = configuration.to_string().replace("</", "<\\/");

    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>{title}</title>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
  </head>
  <body>
    <script id="api-reference" data-url="{spec_url}"></script>
    <script>
      document.getElementById("api-reference").dataset.configuration = JSON.stringify({configuration});
    </script>
    <script src="{SCALAR_CDN}"></script>
  </body>
</html>
"#,
        title = html_escape(title),
        spec_url = html_escape(spec_url),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
