use crate::model::{SourceRef, SymbolKind, ValidationSource};
use crate::producer::{EvidenceProducer, ProducerVerdict};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Python,
    Rust,
    Javascript,
    Typescript,
    Tsx,
    Go,
}

pub fn language_for_path(path: &Path) -> Option<Lang> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    match ext {
        "py" | "pyi" => Some(Lang::Python),
        "rs" => Some(Lang::Rust),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::Javascript),
        "ts" | "mts" | "cts" => Some(Lang::Typescript),
        "tsx" => Some(Lang::Tsx),
        "go" => Some(Lang::Go),
        _ => None,
    }
}

/// One definition found in a source file.
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub signature: Option<String>,
}

/// Locates definitions by building a full syntax tree and walking it.
pub struct StructuralProducer {
    parsers: HashMap<Lang, Parser>,
}

impl StructuralProducer {
    pub fn new() -> Result<Self> {
        let mut parsers = HashMap::new();
        parsers.insert(Lang::Python, make_parser(tree_sitter_python::LANGUAGE)?);
        parsers.insert(Lang::Rust, make_parser(tree_sitter_rust::LANGUAGE)?);
        parsers.insert(
            Lang::Javascript,
            make_parser(tree_sitter_javascript::LANGUAGE)?,
        );
        parsers.insert(
            Lang::Typescript,
            make_parser(tree_sitter_typescript::LANGUAGE_TYPESCRIPT)?,
        );
        parsers.insert(Lang::Tsx, make_parser(tree_sitter_typescript::LANGUAGE_TSX)?);
        parsers.insert(Lang::Go, make_parser(tree_sitter_go::LANGUAGE)?);
        Ok(Self { parsers })
    }

    /// All top-level definitions in `source`. `None` when the parse itself
    /// failed, which callers treat as "could not run".
    pub fn definitions(&mut self, lang: Lang, source: &str) -> Option<Vec<Definition>> {
        let parser = self.parsers.get_mut(&lang)?;
        let tree = parser.parse(source, None)?;
        let mut out = Vec::new();
        let ctx = WalkContext { in_type: false };
        walk(lang, tree.root_node(), ctx, source, &mut out);
        Some(out)
    }
}

impl EvidenceProducer for StructuralProducer {
    fn source(&self) -> ValidationSource {
        ValidationSource::StructuralParse
    }

    fn is_available(&self, repo_root: &Path, claim: &SourceRef) -> bool {
        let path = repo_root.join(&claim.file_path);
        language_for_path(&path).is_some() && path.is_file()
    }

    fn confirm(&mut self, repo_root: &Path, claim: &SourceRef) -> ProducerVerdict {
        let path = repo_root.join(&claim.file_path);
        let Some(lang) = language_for_path(&path) else {
            return ProducerVerdict::Unavailable;
        };
        let Ok(source) = std::fs::read_to_string(&path) else {
            return ProducerVerdict::Unavailable;
        };
        let Some(defs) = self.definitions(lang, &source) else {
            return ProducerVerdict::Unavailable;
        };
        match best_match(&defs, claim) {
            Some(def) => ProducerVerdict::Found {
                line: def.line,
                kind: def.kind,
                signature: def.signature.clone(),
            },
            None => ProducerVerdict::NotFound,
        }
    }
}

/// Among same-name definitions, prefer the one nearest the claimed line;
/// with an unknown claimed line, prefer a kind match.
pub fn best_match<'a>(defs: &'a [Definition], claim: &SourceRef) -> Option<&'a Definition> {
    let mut named: Vec<&Definition> = defs
        .iter()
        .filter(|def| def.name == claim.symbol_name)
        .collect();
    if named.is_empty() {
        return None;
    }
    if claim.line_number > 0 {
        named.sort_by_key(|def| (def.line as i64 - claim.line_number as i64).abs());
    } else if claim.symbol_type != SymbolKind::Unknown {
        named.sort_by_key(|def| (def.kind != claim.symbol_type, def.line));
    }
    named.first().copied()
}

fn make_parser(language: impl Into<tree_sitter::Language>) -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&language.into())?;
    Ok(parser)
}

#[derive(Clone, Copy)]
struct WalkContext {
    in_type: bool,
}

fn walk(lang: Lang, node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(lang, child, ctx, source, out);
    }
}

fn visit(lang: Lang, node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    match lang {
        Lang::Python => visit_python(node, ctx, source, out),
        Lang::Rust => visit_rust(node, ctx, source, out),
        Lang::Javascript | Lang::Typescript | Lang::Tsx => visit_js(lang, node, ctx, source, out),
        Lang::Go => visit_go(node, ctx, source, out),
    }
}

fn visit_python(node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    match node.kind() {
        "decorated_definition" => {
            walk(Lang::Python, node, ctx, source, out);
        }
        "class_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Class,
                    line: line_of(node),
                    signature: None,
                });
            }
            if let Some(body) = node.child_by_field_name("body") {
                let inner = WalkContext { in_type: true };
                walk(Lang::Python, body, inner, source, out);
            }
        }
        "function_definition" | "async_function_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                let kind = if ctx.in_type {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                out.push(Definition {
                    name,
                    kind,
                    line: line_of(node),
                    signature: python_signature(node, source),
                });
            }
        }
        "expression_statement" | "assignment" => {
            if ctx.in_type {
                return;
            }
            let assignment = if node.kind() == "assignment" {
                Some(node)
            } else {
                node.named_child(0).filter(|n| n.kind() == "assignment")
            };
            if let Some(assignment) = assignment {
                if let Some(left) = assignment.child_by_field_name("left") {
                    if left.kind() == "identifier" {
                        out.push(Definition {
                            name: node_text(left, source),
                            kind: SymbolKind::Variable,
                            line: line_of(assignment),
                            signature: None,
                        });
                    }
                }
            }
        }
        _ => walk(Lang::Python, node, ctx, source, out),
    }
}

fn visit_rust(node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    match node.kind() {
        "struct_item" | "enum_item" | "trait_item" | "union_item" | "type_item" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Class,
                    line: line_of(node),
                    signature: None,
                });
            }
            if node.kind() == "trait_item" {
                if let Some(body) = node.child_by_field_name("body") {
                    let inner = WalkContext {
                        in_type: true,
                        ..ctx
                    };
                    walk(Lang::Rust, body, inner, source, out);
                }
            }
        }
        "function_item" | "function_signature_item" => {
            if let Some(name) = field_text(node, "name", source) {
                let kind = if ctx.in_type {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                out.push(Definition {
                    name,
                    kind,
                    line: line_of(node),
                    signature: rust_signature(node, source),
                });
            }
        }
        "const_item" | "static_item" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Variable,
                    line: line_of(node),
                    signature: None,
                });
            }
        }
        "impl_item" => {
            if let Some(body) = node.child_by_field_name("body") {
                let inner = WalkContext { in_type: true };
                walk(Lang::Rust, body, inner, source, out);
            }
        }
        "mod_item" => {
            if let Some(body) = node.child_by_field_name("body") {
                walk(Lang::Rust, body, ctx, source, out);
            }
        }
        _ => {}
    }
}

fn visit_js(lang: Lang, node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    match node.kind() {
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Class,
                    line: line_of(node),
                    signature: None,
                });
            }
            if let Some(body) = node.child_by_field_name("body") {
                let inner = WalkContext { in_type: true };
                walk(lang, body, inner, source, out);
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Function,
                    line: line_of(node),
                    signature: field_text(node, "parameters", source),
                });
            }
        }
        "method_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Method,
                    line: line_of(node),
                    signature: field_text(node, "parameters", source),
                });
            }
        }
        "interface_declaration" | "enum_declaration" | "type_alias_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Class,
                    line: line_of(node),
                    signature: None,
                });
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            if ctx.in_type {
                return;
            }
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                if let Some(name_node) = declarator.child_by_field_name("name") {
                    if name_node.kind() == "identifier" {
                        out.push(Definition {
                            name: node_text(name_node, source),
                            kind: SymbolKind::Variable,
                            line: line_of(declarator),
                            signature: None,
                        });
                    }
                }
            }
        }
        "export_statement" => {
            walk(lang, node, ctx, source, out);
        }
        _ => {}
    }
}

fn visit_go(node: Node<'_>, ctx: WalkContext, source: &str, out: &mut Vec<Definition>) {
    match node.kind() {
        "function_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Function,
                    line: line_of(node),
                    signature: go_signature(node, source),
                });
            }
        }
        "method_declaration" => {
            if let Some(name) = field_text(node, "name", source) {
                out.push(Definition {
                    name,
                    kind: SymbolKind::Method,
                    line: line_of(node),
                    signature: go_signature(node, source),
                });
            }
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() == "type_spec" {
                    if let Some(name) = field_text(spec, "name", source) {
                        out.push(Definition {
                            name,
                            kind: SymbolKind::Class,
                            line: line_of(spec),
                            signature: None,
                        });
                    }
                }
            }
        }
        "const_declaration" | "var_declaration" => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if matches!(spec.kind(), "const_spec" | "var_spec") {
                    if let Some(name) = field_text(spec, "name", source) {
                        out.push(Definition {
                            name,
                            kind: SymbolKind::Variable,
                            line: line_of(spec),
                            signature: None,
                        });
                    }
                }
            }
        }
        _ => walk(Lang::Go, node, ctx, source, out),
    }
}

fn python_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = field_text(node, "parameters", source);
    let return_type = field_text(node, "return_type", source);
    match (params, return_type) {
        (Some(p), Some(r)) => Some(format!("{p} -> {r}")),
        (Some(p), None) => Some(p),
        _ => None,
    }
}

fn rust_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = field_text(node, "parameters", source);
    let return_type = field_text(node, "return_type", source);
    match (params, return_type) {
        (Some(p), Some(r)) => Some(format!("{p} -> {r}")),
        (Some(p), None) => Some(p),
        _ => None,
    }
}

fn go_signature(node: Node<'_>, source: &str) -> Option<String> {
    let params = field_text(node, "parameters", source);
    let result = field_text(node, "result", source);
    match (params, result) {
        (Some(p), Some(r)) => Some(format!("{p} {r}")),
        (Some(p), None) => Some(p),
        _ => None,
    }
}

fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(child, source))
        .filter(|text| !text.is_empty())
}

fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn line_of(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_python_classes_and_methods() {
        let source = r#"
class StateGraph:
    def add_node(self, name):
        pass

def compile_graph(graph):
    return graph

VERSION = "1.0"
"#;
        let mut producer = StructuralProducer::new().unwrap();
        let defs = producer.definitions(Lang::Python, source).unwrap();
        let graph = defs.iter().find(|d| d.name == "StateGraph").unwrap();
        assert_eq!(graph.kind, SymbolKind::Class);
        assert_eq!(graph.line, 2);
        let add_node = defs.iter().find(|d| d.name == "add_node").unwrap();
        assert_eq!(add_node.kind, SymbolKind::Method);
        assert_eq!(add_node.signature.as_deref(), Some("(self, name)"));
        let compile = defs.iter().find(|d| d.name == "compile_graph").unwrap();
        assert_eq!(compile.kind, SymbolKind::Function);
        let version = defs.iter().find(|d| d.name == "VERSION").unwrap();
        assert_eq!(version.kind, SymbolKind::Variable);
    }

    #[test]
    fn extracts_rust_items() {
        let source = r#"
pub struct Tracker;

impl Tracker {
    pub fn record(&mut self, n: u64) -> bool {
        true
    }
}

pub fn standalone() {}

const LIMIT: usize = 8;
"#;
        let mut producer = StructuralProducer::new().unwrap();
        let defs = producer.definitions(Lang::Rust, source).unwrap();
        assert_eq!(
            defs.iter().find(|d| d.name == "Tracker").unwrap().kind,
            SymbolKind::Class
        );
        let record = defs.iter().find(|d| d.name == "record").unwrap();
        assert_eq!(record.kind, SymbolKind::Method);
        assert!(record.signature.as_deref().unwrap().contains("-> bool"));
        assert_eq!(
            defs.iter().find(|d| d.name == "standalone").unwrap().kind,
            SymbolKind::Function
        );
        assert_eq!(
            defs.iter().find(|d| d.name == "LIMIT").unwrap().kind,
            SymbolKind::Variable
        );
    }

    #[test]
    fn extracts_go_and_typescript_definitions() {
        let mut producer = StructuralProducer::new().unwrap();

        let go = "package main\n\ntype Server struct{}\n\nfunc (s *Server) Run() {}\n\nfunc main() {}\n";
        let defs = producer.definitions(Lang::Go, go).unwrap();
        assert_eq!(
            defs.iter().find(|d| d.name == "Server").unwrap().kind,
            SymbolKind::Class
        );
        assert_eq!(
            defs.iter().find(|d| d.name == "Run").unwrap().kind,
            SymbolKind::Method
        );

        let ts = "export interface Claim { name: string }\nexport function check(claim: Claim): boolean { return true }\n";
        let defs = producer.definitions(Lang::Typescript, ts).unwrap();
        assert_eq!(
            defs.iter().find(|d| d.name == "Claim").unwrap().kind,
            SymbolKind::Class
        );
        assert_eq!(
            defs.iter().find(|d| d.name == "check").unwrap().kind,
            SymbolKind::Function
        );
    }

    #[test]
    fn best_match_prefers_nearest_line() {
        let defs = vec![
            Definition {
                name: "load".into(),
                kind: SymbolKind::Function,
                line: 10,
                signature: None,
            },
            Definition {
                name: "load".into(),
                kind: SymbolKind::Method,
                line: 90,
                signature: None,
            },
        ];
        let claim = SourceRef::new("load", SymbolKind::Unknown, "a.py", 88, None);
        assert_eq!(best_match(&defs, &claim).unwrap().line, 90);
        let claim = SourceRef::new("load", SymbolKind::Function, "a.py", 0, None);
        assert_eq!(best_match(&defs, &claim).unwrap().line, 10);
    }
}
