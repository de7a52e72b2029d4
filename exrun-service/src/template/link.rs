// Link Resolution
// Replaces `%link` and `%linkFile` directives with the values they reference

use crate::document::{find_in_search_paths, load_document, names, normalize_pointer, pointer_tokens};
use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum depth of nested `%linkFile` inclusion
const MAX_INCLUDE_DEPTH: usize = 50;

/// Resolve every link directive in a document.
///
/// `base_dir` is the directory of the file the document came from; relative
/// `%linkFile` names are looked up there first and then in `search_paths`.
pub fn resolve_links(
    document: &Document,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> ServiceResult<Document> {
    LinkResolver::new(document, base_dir, search_paths, Vec::new()).resolve_value(document)
}

struct LinkResolver<'a> {
    root: &'a Document,
    base_dir: Option<PathBuf>,
    search_paths: &'a [PathBuf],
    /// Link targets currently being resolved, outermost first
    stack: Vec<String>,
    /// Files currently being included, outermost first
    files: Vec<String>,
    resolved: HashMap<String, Document>,
}

impl<'a> LinkResolver<'a> {
    fn new(
        root: &'a Document,
        base_dir: Option<&Path>,
        search_paths: &'a [PathBuf],
        files: Vec<String>,
    ) -> Self {
        Self {
            root,
            base_dir: base_dir.map(Path::to_path_buf),
            search_paths,
            stack: Vec::new(),
            files,
            resolved: HashMap::new(),
        }
    }

    fn resolve_value(&mut self, node: &Document) -> ServiceResult<Document> {
        match node {
            Value::Object(map) if map.contains_key(names::LINK) => self.resolve_link(map),
            Value::Object(map) if map.contains_key(names::LINK_FILE) => self.resolve_file(map),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve_value(value)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<ServiceResult<Vec<_>>>()
                .map(Value::Array),
            scalar => Ok(scalar.clone()),
        }
    }

    fn resolve_link(&mut self, map: &Map<String, Value>) -> ServiceResult<Document> {
        let path = directive_string(map, names::LINK)?;
        let pointer = normalize_pointer(path);

        match self.resolve_target(&pointer)? {
            Some(value) => Ok(value),
            None => self.fallback(map, path),
        }
    }

    fn resolve_target(&mut self, pointer: &str) -> ServiceResult<Option<Document>> {
        if let Some(value) = self.resolved.get(pointer) {
            return Ok(Some(value.clone()));
        }

        if self.stack.iter().any(|p| p == pointer) {
            let mut chain = self.stack.clone();
            chain.push(pointer.to_string());
            return Err(ServiceError::LinkCycle { chain });
        }

        self.stack.push(pointer.to_string());
        let result = self.lookup(pointer);
        self.stack.pop();

        let value = result?;
        if let Some(value) = &value {
            self.resolved.insert(pointer.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Walk a pointer through the root, resolving links met along the way
    fn lookup(&mut self, pointer: &str) -> ServiceResult<Option<Document>> {
        let root = self.root;
        let mut current: Cow<'_, Document> = Cow::Borrowed(root);

        for token in pointer_tokens(pointer) {
            if is_link_node(&current) {
                current = Cow::Owned(self.resolve_value(&current)?);
            }

            current = match current {
                Cow::Borrowed(node) => match child(node, &token) {
                    Some(next) => Cow::Borrowed(next),
                    None => return Ok(None),
                },
                Cow::Owned(node) => match child(&node, &token) {
                    Some(next) => Cow::Owned(next.clone()),
                    None => return Ok(None),
                },
            };
        }

        self.resolve_value(&current).map(Some)
    }

    fn resolve_file(&mut self, map: &Map<String, Value>) -> ServiceResult<Document> {
        let name = directive_string(map, names::LINK_FILE)?;

        let path = match find_in_search_paths(name, self.base_dir.as_deref(), self.search_paths) {
            Ok(path) => path,
            Err(ServiceError::NotFound(_)) => return self.fallback(map, name),
            Err(e) => return Err(e),
        };

        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| path.clone())
            .to_string_lossy()
            .to_string();

        if self.files.len() >= MAX_INCLUDE_DEPTH {
            return Err(ServiceError::ConfigShape(format!(
                "maximum '{}' depth ({}) exceeded:\n  {}",
                names::LINK_FILE,
                MAX_INCLUDE_DEPTH,
                self.files.join("\n  -> ")
            )));
        }

        if self.files.contains(&canonical) {
            let mut chain = self.files.clone();
            chain.push(canonical);
            return Err(ServiceError::LinkCycle { chain });
        }

        debug!(file = %path.display(), "including linked file");
        let document = load_document(&path)?;

        let mut files = self.files.clone();
        files.push(canonical);
        LinkResolver::new(&document, path.parent(), self.search_paths, files).resolve_value(&document)
    }

    fn fallback(&mut self, map: &Map<String, Value>, path: &str) -> ServiceResult<Document> {
        match map.get(names::LINK_DEFAULT) {
            Some(default) => self.resolve_value(default),
            None => Err(ServiceError::LinkMissing {
                path: path.to_string(),
            }),
        }
    }
}

fn is_link_node(node: &Document) -> bool {
    node.as_object()
        .map(|map| map.contains_key(names::LINK) || map.contains_key(names::LINK_FILE))
        .unwrap_or(false)
}

fn child<'d>(node: &'d Document, token: &str) -> Option<&'d Document> {
    match node {
        Value::Object(map) => map.get(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn directive_string<'m>(map: &'m Map<String, Value>, key: &str) -> ServiceResult<&'m str> {
    map.get(key).and_then(Value::as_str).ok_or_else(|| {
        ServiceError::ConfigShape(format!("'{}' expects a string path", key))
    })
}
