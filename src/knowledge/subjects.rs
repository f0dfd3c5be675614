//! Subject forest and its document index
//!
//! `subjects.json` holds a forest of help topics. A node may carry several
//! names; every alias becomes its own document keyed by the ` > `-joined
//! path of aliases leading to it, and all of them point back at the same
//! node.

use super::search::{SearchDocument, SearchIndex};
use super::{Definitions, DefinitionReader, FileTracker, LoadError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const SUBJECTS_FILE: &str = "subjects.json";
pub const KEY_SEPARATOR: &str = " > ";

/// Position of a node in the subject arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An action offered by a subject, loading a registry state when picked
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectAction {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct SubjectNode {
    pub names: Vec<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub url: Option<String>,
    pub actions: Vec<SubjectAction>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// One searchable alias of a node
#[derive(Debug, Clone)]
pub struct SubjectDocument {
    pub key: String,
    pub name: String,
    pub node: NodeId,
}

/// A search hit, one per node
#[derive(Debug, Clone)]
pub struct SubjectMatch {
    pub key: String,
    pub node: NodeId,
    pub score: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Deserialize)]
struct RawSubject {
    name: OneOrMany,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Option<OneOrMany>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    actions: Vec<SubjectAction>,
    #[serde(default)]
    children: Vec<Value>,
}

pub struct SubjectIndex {
    nodes: Vec<SubjectNode>,
    documents: Vec<SubjectDocument>,
    by_key: HashMap<String, usize>,
    search: SearchIndex,
}

impl std::fmt::Debug for SubjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectIndex")
            .field("nodes", &self.nodes.len())
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

impl Definitions for SubjectIndex {
    const KIND: &'static str = "subjects";

    fn load(data_dir: &Path, files: &mut FileTracker) -> Result<Self, LoadError> {
        let mut nodes = Vec::new();
        let mut roots = Vec::new();
        let mut reader = DefinitionReader::new(data_dir, files);
        reader.read_list(SUBJECTS_FILE, &mut |reader, path, entry| {
            let ids = add_tree(reader, path, &mut nodes, entry, None, &Map::new())?;
            roots.extend(ids);
            Ok(())
        })?;
        Self::from_nodes(nodes, &roots)
    }
}

/// Add a tree to the arena, splicing redirects. `inherited` holds the
/// attributes of the redirect node the tree was reached through.
fn add_tree(
    reader: &mut DefinitionReader<'_>,
    path: &Path,
    nodes: &mut Vec<SubjectNode>,
    entry: Value,
    parent: Option<NodeId>,
    inherited: &Map<String, Value>,
) -> Result<Vec<NodeId>, LoadError> {
    let Value::Object(mut object) = entry else {
        return Err(LoadError::definition(path, "subject must be an object"));
    };
    object.extend(inherited.iter().map(|(k, v)| (k.clone(), v.clone())));

    if let Some(target) = object.remove("redirect") {
        let Value::String(target) = target else {
            return Err(LoadError::definition(path, "redirect must be a file name"));
        };
        let mut spliced = Vec::new();
        reader.read_list(&target, &mut |reader, path, tree| {
            let ids = add_tree(reader, path, nodes, tree, parent, &object)?;
            spliced.extend(ids);
            Ok(())
        })?;
        return Ok(spliced);
    }

    let raw: RawSubject = serde_json::from_value(Value::Object(object))
        .map_err(|e| LoadError::definition(path, format!("invalid subject: {e}")))?;
    let names = raw.name.into_vec();
    if names.is_empty() {
        return Err(LoadError::definition(path, "subject without a name"));
    }

    let id = NodeId(nodes.len());
    nodes.push(SubjectNode {
        names,
        description: raw.description,
        keywords: raw.keywords.map(|k| k.into_vec().join(" ")),
        url: raw.url,
        actions: raw.actions,
        parent,
        children: Vec::new(),
    });

    let mut children = Vec::new();
    for child in raw.children {
        children.extend(add_tree(reader, path, nodes, child, Some(id), &Map::new())?);
    }
    nodes[id.0].children = children;
    Ok(vec![id])
}

impl SubjectIndex {
    fn from_nodes(nodes: Vec<SubjectNode>, roots: &[NodeId]) -> Result<Self, LoadError> {
        // Depth-first over every alias path
        let mut documents = Vec::new();
        let mut visit: Vec<(Option<String>, NodeId)> =
            roots.iter().map(|id| (None, *id)).collect();
        while let Some((prefix, id)) = visit.pop() {
            let node = &nodes[id.0];
            for name in &node.names {
                let key = match &prefix {
                    Some(prefix) => format!("{prefix}{KEY_SEPARATOR}{name}"),
                    None => name.clone(),
                };
                visit.extend(node.children.iter().map(|child| (Some(key.clone()), *child)));
                documents.push(SubjectDocument {
                    key,
                    name: name.clone(),
                    node: id,
                });
            }
        }

        let by_key = documents
            .iter()
            .enumerate()
            .map(|(position, doc)| (doc.key.clone(), position))
            .collect();

        let search = SearchIndex::build(documents.iter().map(|doc| {
            let node = &nodes[doc.node.0];
            SearchDocument {
                key: &doc.key,
                name: &doc.name,
                description: node.description.as_deref().unwrap_or(""),
                keywords: node.keywords.as_deref().unwrap_or(""),
            }
        }))?;

        Ok(Self {
            nodes,
            documents,
            by_key,
            search,
        })
    }

    pub fn node(&self, id: NodeId) -> &SubjectNode {
        &self.nodes[id.0]
    }

    pub fn lookup(&self, key: &str) -> Option<&SubjectDocument> {
        self.by_key.get(key).map(|position| &self.documents[*position])
    }

    /// Ranked matches, at most one per node
    pub fn search(&self, query: &str) -> Vec<SubjectMatch> {
        let mut seen = HashSet::new();
        self.search
            .search(query, self.documents.len())
            .into_iter()
            .filter_map(|(key, score)| {
                let node = self.lookup(&key)?.node;
                seen.insert(node).then_some(SubjectMatch { key, node, score })
            })
            .collect()
    }
}

/// Display name of a subject: the last segment of its key
pub fn subject_name(key: &str) -> &str {
    key.rsplit(KEY_SEPARATOR).next().unwrap_or(key)
}

/// Key of the parent of the subject at `key`
pub fn parent_key(key: &str) -> &str {
    key.rsplit_once(KEY_SEPARATOR).map_or(key, |(parent, _)| parent)
}
