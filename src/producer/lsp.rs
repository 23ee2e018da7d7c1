//! Optional semantic-server producer.
//!
//! Talks LSP over stdio to a user-supplied language server command. The
//! producer degrades to `Unavailable` on every failure mode: no command
//! configured, binary not on PATH, handshake failure, request timeout.
//! A verdict is only ever `Found`/`NotFound` when the server answered a
//! `textDocument/documentSymbol` request for the claimed file.

use crate::model::{SourceRef, SymbolKind, ValidationSource};
use crate::producer::{EvidenceProducer, ProducerVerdict};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

pub struct LspProducer {
    cmd: Vec<String>,
    timeout: Duration,
    conn: Option<Connection>,
    broken: bool,
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    incoming: Receiver<Value>,
    next_id: i64,
}

impl LspProducer {
    /// `cmd` is the server command line, e.g. `["pyright-langserver", "--stdio"]`.
    pub fn new(cmd: Vec<String>, timeout: Duration) -> Self {
        LspProducer {
            cmd,
            timeout,
            conn: None,
            broken: false,
        }
    }

    fn ensure_connected(&mut self, repo_root: &Path) -> Option<&mut Connection> {
        if self.broken {
            return None;
        }
        if self.conn.is_none() {
            match Connection::start(&self.cmd, repo_root, self.timeout) {
                Some(conn) => self.conn = Some(conn),
                None => {
                    self.broken = true;
                    return None;
                }
            }
        }
        self.conn.as_mut()
    }
}

impl Drop for LspProducer {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            let _ = conn.child.kill();
            let _ = conn.child.wait();
        }
    }
}

impl EvidenceProducer for LspProducer {
    fn source(&self) -> ValidationSource {
        ValidationSource::SemanticServer
    }

    fn is_available(&self, repo_root: &Path, claim: &SourceRef) -> bool {
        if self.broken || self.cmd.is_empty() {
            return false;
        }
        if !repo_root.join(&claim.file_path).is_file() {
            return false;
        }
        self.conn.is_some() || find_in_path(&self.cmd[0]).is_some()
    }

    fn confirm(&mut self, repo_root: &Path, claim: &SourceRef) -> ProducerVerdict {
        let abs = repo_root.join(&claim.file_path);
        let Ok(text) = std::fs::read_to_string(&abs) else {
            return ProducerVerdict::Unavailable;
        };
        let timeout = self.timeout;
        let Some(conn) = self.ensure_connected(repo_root) else {
            return ProducerVerdict::Unavailable;
        };
        let uri = file_uri(&abs);
        let symbols = conn.document_symbols(&uri, &text, timeout);
        let Some(symbols) = symbols else {
            // One failed exchange poisons the session; later claims skip it.
            self.broken = true;
            return ProducerVerdict::Unavailable;
        };
        let mut flat = Vec::new();
        flatten_symbols(&symbols, &mut flat);
        let mut matches: Vec<&FlatSymbol> = flat
            .iter()
            .filter(|sym| sym.name == claim.symbol_name)
            .collect();
        if matches.is_empty() {
            return ProducerVerdict::NotFound;
        }
        if claim.line_number > 0 {
            matches.sort_by_key(|sym| (sym.line as i64 - claim.line_number as i64).abs());
        }
        let best = matches[0];
        ProducerVerdict::Found {
            line: best.line,
            kind: best.kind,
            signature: best.detail.clone(),
        }
    }
}

impl Connection {
    fn start(cmd: &[String], repo_root: &Path, timeout: Duration) -> Option<Connection> {
        let program = cmd.first()?;
        let mut child = Command::new(program)
            .args(&cmd[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;
        let stdin = child.stdin.take()?;
        let stdout = child.stdout.take()?;
        let (tx, rx) = channel();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            while let Some(message) = read_frame(&mut reader) {
                if tx.send(message).is_err() {
                    break;
                }
            }
        });
        let mut conn = Connection {
            child,
            stdin,
            incoming: rx,
            next_id: 0,
        };
        let root_uri = file_uri(repo_root);
        let response = conn.request(
            "initialize",
            json!({
                "processId": Value::Null,
                "rootUri": root_uri,
                "capabilities": {},
            }),
            timeout,
        )?;
        if response.get("error").is_some() {
            let _ = conn.child.kill();
            return None;
        }
        conn.notify("initialized", json!({}))?;
        Some(conn)
    }

    fn document_symbols(&mut self, uri: &str, text: &str, timeout: Duration) -> Option<Vec<Value>> {
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "plaintext",
                    "version": 1,
                    "text": text,
                }
            }),
        )?;
        let response = self.request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": uri } }),
            timeout,
        )?;
        self.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )?;
        response
            .get("result")
            .and_then(|result| result.as_array())
            .cloned()
    }

    fn request(&mut self, method: &str, params: Value, timeout: Duration) -> Option<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        write_frame(&mut self.stdin, &payload)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.incoming.recv_timeout(remaining) {
                Ok(message) => {
                    if message.get("id").and_then(|v| v.as_i64()) == Some(id) {
                        return Some(message);
                    }
                    // Server-initiated requests and notifications are ignored.
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn notify(&mut self, method: &str, params: Value) -> Option<()> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        write_frame(&mut self.stdin, &payload)
    }
}

fn write_frame(stdin: &mut ChildStdin, payload: &Value) -> Option<()> {
    let body = payload.to_string();
    let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    stdin.write_all(framed.as_bytes()).ok()?;
    stdin.flush().ok()
}

fn read_frame(reader: &mut BufReader<impl Read>) -> Option<Value> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix("Content-Length:") {
            content_length = rest.trim().parse().ok();
        }
    }
    let length = content_length?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

#[derive(Debug)]
struct FlatSymbol {
    name: String,
    kind: SymbolKind,
    line: u32,
    detail: Option<String>,
}

/// Accepts both DocumentSymbol trees and flat SymbolInformation lists.
fn flatten_symbols(symbols: &[Value], out: &mut Vec<FlatSymbol>) {
    for sym in symbols {
        let Some(name) = sym.get("name").and_then(|v| v.as_str()) else {
            continue;
        };
        let kind = sym
            .get("kind")
            .and_then(|v| v.as_u64())
            .map(map_lsp_kind)
            .unwrap_or(SymbolKind::Unknown);
        let range = sym
            .get("selectionRange")
            .or_else(|| sym.get("range"))
            .or_else(|| sym.get("location").and_then(|loc| loc.get("range")));
        let line = range
            .and_then(|r| r.get("start"))
            .and_then(|s| s.get("line"))
            .and_then(|v| v.as_u64())
            .map(|zero_based| zero_based as u32 + 1)
            .unwrap_or(0);
        let detail = sym
            .get("detail")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        out.push(FlatSymbol {
            name: name.to_string(),
            kind,
            line,
            detail,
        });
        if let Some(children) = sym.get("children").and_then(|v| v.as_array()) {
            flatten_symbols(children, out);
        }
    }
}

fn map_lsp_kind(kind: u64) -> SymbolKind {
    match kind {
        5 | 10 | 11 | 23 => SymbolKind::Class, // class, enum, interface, struct
        6 | 9 => SymbolKind::Method,           // method, constructor
        12 => SymbolKind::Function,
        7 | 8 | 13 | 14 => SymbolKind::Variable, // property, field, variable, constant
        _ => SymbolKind::Unknown,
    }
}

fn file_uri(path: &Path) -> String {
    let abs: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    format!("file://{}", abs.display())
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
