// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Build descriptor and entrypoint templates, keyed by runtime.

use crate::model::Language;

/// Port every function container listens on.
pub const FUNCTION_PORT: u16 = 8080;

/// Path of the readiness endpoint served by every entrypoint shim.
pub const HEALTH_PATH: &str = "/health";

/// Runtime-specific build settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeTemplate {
    /// Base image of the function image.
    pub base_image: &'static str,
    /// Commands run at build time, in order.
    pub install: &'static [&'static str],
    /// Interpreter that runs the entrypoint.
    pub command: &'static str,
    /// File name of the entrypoint shim.
    pub entrypoint: &'static str,
}

/// Build settings for a runtime.
pub fn runtime_template(language: Language) -> RuntimeTemplate {
    match language {
        Language::NodeJs => RuntimeTemplate {
            base_image: "node:18",
            install: &["npm install"],
            command: "node",
            entrypoint: "entrypoint.js",
        },
    }
}

/// Render the Dockerfile for a runtime.
pub fn dockerfile(template: &RuntimeTemplate) -> String {
    let mut out = format!("FROM {}\nWORKDIR /app\nCOPY . .\n", template.base_image);
    for step in template.install {
        out.push_str(&format!("RUN {}\n", step));
    }
    out.push_str(&format!(
        "ENV PORT={port}\nEXPOSE {port}\nCMD [\"{}\", \"{}\"]\n",
        template.command,
        template.entrypoint,
        port = FUNCTION_PORT,
    ));
    out
}

/// Render the entrypoint shim that loads the declared entry module.
pub fn entrypoint(language: Language, main: &str) -> String {
    match language {
        Language::NodeJs => node_entrypoint(main),
    }
}

fn node_entrypoint(main: &str) -> String {
    // JSON string syntax is a valid JS string literal.
    let module = serde_json::to_string(&format!("./{}", main.trim_start_matches("./")))
        .unwrap_or_else(|_| "\"./index.js\"".to_string());

    format!(
        r#"const http = require("http");

const loaded = require({module});
const handler = typeof loaded === "function" ? loaded : loaded.handler || loaded.default;

const server = http.createServer((req, res) => {{
  if (req.url === "{health}") {{
    res.writeHead(200, {{ "Content-Type": "application/json" }});
    res.end(JSON.stringify({{ status: "ok" }}));
    return;
  }}

  const chunks = [];
  req.on("data", (chunk) => chunks.push(chunk));
  req.on("end", async () => {{
    const raw = Buffer.concat(chunks).toString();
    let body = raw;
    try {{
      body = raw.length > 0 ? JSON.parse(raw) : null;
    }} catch (_) {{}}

    try {{
      const result = await handler({{
        method: req.method,
        path: req.url,
        headers: req.headers,
        body,
      }});
      const status = result && Number.isInteger(result.statusCode) ? result.statusCode : 200;
      const payload = result && result.body !== undefined ? result.body : result;
      res.writeHead(status, {{ "Content-Type": "application/json" }});
      res.end(JSON.stringify(payload === undefined ? null : payload));
    }} catch (err) {{
      res.writeHead(500, {{ "Content-Type": "application/json" }});
      res.end(JSON.stringify({{ error: String(err && err.message ? err.message : err) }}));
    }}
  }});
}});

server.listen(process.env.PORT || {port});
"#,
        module = module,
        health = HEALTH_PATH,
        port = FUNCTION_PORT,
    )
}
