//! Declaration extraction from Python source.
//!
//! Parses a file with tree-sitter and returns every function declaration
//! with its parameter list, whether it carries a marker decorator and the
//! raw text of each parameter annotation. Nothing here decides indexability; that is the job of
//! [`crate::signature`].
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use iproxy_indexer::parsing::parse_declarations;
//!
//! let source = "@injected\ndef load_user(repo, /, user_id: int):\n    ...\n";
//! let markers = vec!["injected".to_string()];
//! let decls = parse_declarations(Path::new("svc.py"), source, &markers).unwrap();
//!
//! assert_eq!(decls.len(), 1);
//! assert!(decls[0].has_marker);
//! assert!(decls[0].parameters[0].positional_only);
//! ```

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::{IndexerError, Result};

/// How a parameter binds arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Plain or keyword-only parameter
    Regular,
    /// `*args`
    VarPositional,
    /// `**kwargs`
    VarKeyword,
}

/// One parameter as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParameter {
    pub name: String,
    pub kind: ParamKind,
    /// Declared before a `/` separator
    pub positional_only: bool,
    pub has_default: bool,
    /// Annotation text as written, if any
    pub annotation: Option<String>,
}

/// A function declaration candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeclaration {
    /// Bare function name
    pub name: String,
    /// Enclosing class/function names joined with `.`
    pub qualified_name: String,
    /// 1-based line of the `def`
    pub line: usize,
    pub is_async: bool,
    /// Carries one of the configured marker decorators
    pub has_marker: bool,
    pub parameters: Vec<RawParameter>,
}

/// Cheap pre-check: does the text mention any marker at all?
///
/// Files that fail this check cannot contain a marked declaration and
/// may be skipped before parsing.
pub fn mentions_marker(source: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| source.contains(marker.as_str()))
}

/// Parse Python source into a syntax tree.
///
/// # Errors
///
/// Returns `ParseFailure` when the grammar cannot be loaded, parsing is
/// aborted, or the resulting tree contains syntax errors.
pub fn parse_source(file_path: &Path, source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| IndexerError::ParseFailure {
            path: file_path.to_path_buf(),
            message: format!("Failed to set language: {}", e),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexerError::ParseFailure {
            path: file_path.to_path_buf(),
            message: "Parser returned no tree".to_string(),
        })?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(&root).unwrap_or(root.start_position().row + 1);
        return Err(IndexerError::ParseFailure {
            path: file_path.to_path_buf(),
            message: format!("syntax error near line {}", line),
        });
    }

    Ok(tree)
}

/// Extract all function declarations from a file, in source order.
pub fn parse_declarations(
    file_path: &Path,
    source: &str,
    markers: &[String],
) -> Result<Vec<RawDeclaration>> {
    let tree = parse_source(file_path, source)?;
    let mut collector = Collector {
        source,
        markers,
        scope: Vec::new(),
        declarations: Vec::new(),
    };
    collector.visit(&tree.root_node());
    Ok(collector.declarations)
}

struct Collector<'a> {
    source: &'a str,
    markers: &'a [String],
    scope: Vec<String>,
    declarations: Vec<RawDeclaration>,
}

impl<'a> Collector<'a> {
    fn visit(&mut self, node: &Node) {
        match node.kind() {
            "decorated_definition" => {
                let decorators = self.decorator_names(node);
                if let Some(def) = node.child_by_field_name("definition") {
                    match def.kind() {
                        "function_definition" => self.visit_function(&def, &decorators),
                        _ => self.visit(&def),
                    }
                }
            }
            "function_definition" => self.visit_function(node, &[]),
            "class_definition" => {
                let name = self.field_text(node, "name");
                self.visit_scoped(node, name);
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: &Node) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(&child);
        }
    }

    fn visit_scoped(&mut self, node: &Node, name: Option<String>) {
        let pushed = name.map(|n| self.scope.push(n)).is_some();
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(&body);
        }
        if pushed {
            self.scope.pop();
        }
    }

    /// `decorators` holds the last dotted segment of each decorator
    fn visit_function(&mut self, node: &Node, decorators: &[String]) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };

        let qualified_name = if self.scope.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", self.scope.join("."), name)
        };

        let has_marker = decorators
            .iter()
            .any(|d| self.markers.iter().any(|m| m == d));

        let parameters = node
            .child_by_field_name("parameters")
            .map(|params| self.parameters(&params))
            .unwrap_or_default();

        self.declarations.push(RawDeclaration {
            name: name.clone(),
            qualified_name,
            line: node.start_position().row + 1,
            is_async: is_async_function(node),
            has_marker,
            parameters,
        });

        // Nested definitions are qualified by their enclosing function
        self.visit_scoped(node, Some(name));
    }

    fn parameters(&self, params: &Node) -> Vec<RawParameter> {
        let mut out: Vec<RawParameter> = Vec::new();
        let mut cursor = params.walk();

        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "positional_separator" => {
                    for p in out.iter_mut() {
                        p.positional_only = true;
                    }
                }
                "identifier" => out.push(RawParameter {
                    name: self.text(&child),
                    kind: ParamKind::Regular,
                    positional_only: false,
                    has_default: false,
                    annotation: None,
                }),
                "typed_parameter" => {
                    let annotation = self.field_text(&child, "type");
                    let mut inner = child.walk();
                    let target = child
                        .named_children(&mut inner)
                        .find(|c| c.kind() != "type");
                    if let Some(target) = target {
                        let (name, kind) = self.param_target(&target);
                        out.push(RawParameter {
                            name,
                            kind,
                            positional_only: false,
                            has_default: false,
                            annotation,
                        });
                    }
                }
                "default_parameter" | "typed_default_parameter" => out.push(RawParameter {
                    name: self.field_text(&child, "name").unwrap_or_default(),
                    kind: ParamKind::Regular,
                    positional_only: false,
                    has_default: true,
                    annotation: self.field_text(&child, "type"),
                }),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let (name, kind) = self.param_target(&child);
                    out.push(RawParameter {
                        name,
                        kind,
                        positional_only: false,
                        has_default: false,
                        annotation: None,
                    });
                }
                // keyword_separator ("*"), comments
                _ => {}
            }
        }

        out
    }

    fn param_target(&self, node: &Node) -> (String, ParamKind) {
        let kind = match node.kind() {
            "list_splat_pattern" => ParamKind::VarPositional,
            "dictionary_splat_pattern" => ParamKind::VarKeyword,
            _ => ParamKind::Regular,
        };
        let name = self
            .text(node)
            .trim_start_matches('*')
            .trim()
            .to_string();
        (name, kind)
    }

    fn decorator_names(&self, decorated: &Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = decorated.walk();
        for child in decorated.named_children(&mut cursor) {
            if child.kind() != "decorator" {
                continue;
            }
            let mut inner = child.walk();
            let expr = child
                .named_children(&mut inner)
                .find(|c| c.kind() != "comment");
            if let Some(name) = expr.and_then(|e| self.decorator_target(&e)) {
                names.push(name);
            }
        }
        names
    }

    /// `@marker`, `@pkg.marker`, `@marker(...)` all resolve to `marker`
    fn decorator_target(&self, expr: &Node) -> Option<String> {
        match expr.kind() {
            "identifier" => Some(self.text(expr)),
            "attribute" => self.field_text(expr, "attribute"),
            "call" => expr
                .child_by_field_name("function")
                .and_then(|f| self.decorator_target(&f)),
            _ => None,
        }
    }

    fn field_text(&self, node: &Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).map(|n| self.text(&n))
    }

    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.source.as_bytes())
            .unwrap_or("")
            .to_string()
    }
}

fn is_async_function(node: &Node) -> bool {
    let mut cursor = node.walk();
    let result = node
        .children(&mut cursor)
        .take_while(|c| c.kind() != "def")
        .any(|c| c.kind() == "async");
    result
}

fn first_error_line(node: &Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.iter().find_map(first_error_line)
}
