//! Structural diff between a desired spec and an observed state.
//!
//! Both sides are compared in their JSON representation. The result is a tree
//! of [`DiffNode`]s rooted at the whole document; an empty diff has no root.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Value, json};

/// What changed at a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Present in desired state, missing from observed state.
    Added { desired: Value },
    /// Present in observed state, missing from desired state.
    Removed { current: Value },
    /// Present on both sides with different values.
    Changed { desired: Value, current: Value },
    /// Container whose children carry the changes.
    Nested,
}

/// A node of the change tree. The root has depth 0 and every child sits one
/// level below its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffNode {
    pub path: String,
    pub depth: usize,
    pub change: Change,
    pub children: Vec<DiffNode>,
}

impl DiffNode {
    fn leaf(path: String, depth: usize, change: Change) -> Self {
        Self {
            path,
            depth,
            change,
            children: Vec::new(),
        }
    }

    /// Last path segment, used when rendering the tree.
    fn label(&self) -> &str {
        if self.depth == 0 {
            return "<root>";
        }
        match self.path.rfind(['.', '[']) {
            Some(idx) if self.path.as_bytes().get(idx) == Some(&b'[') => &self.path[idx..],
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a DiffNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// Transient diff of one actuation pass. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDiff {
    root: Option<DiffNode>,
}

impl ResourceDiff {
    /// Diff `desired` against `current`. A missing observed state diffs the
    /// whole desired document as added.
    pub fn new(desired: &Value, current: Option<&Value>) -> Self {
        Self {
            root: compare(String::new(), 0, Some(desired), current),
        }
    }

    /// Diff two serializable values.
    pub fn of<T: Serialize>(desired: &T, current: Option<&T>) -> Result<Self, serde_json::Error> {
        let desired = serde_json::to_value(desired)?;
        let current = current.map(serde_json::to_value).transpose()?;
        Ok(Self::new(&desired, current.as_ref()))
    }

    pub fn has_changes(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&DiffNode> {
        self.root.as_ref()
    }

    /// All nodes in depth-first order, root first.
    pub fn nodes(&self) -> Vec<&DiffNode> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.walk(&mut out);
        }
        out
    }

    /// Nodes carrying a concrete change (everything except containers).
    pub fn changes(&self) -> Vec<&DiffNode> {
        self.nodes()
            .into_iter()
            .filter(|n| n.change != Change::Nested)
            .collect()
    }

    /// Human readable rendering, one node per line, indented by depth.
    pub fn to_debug(&self) -> String {
        let mut out = String::new();
        for node in self.nodes() {
            let indent = "  ".repeat(node.depth);
            let _ = match &node.change {
                Change::Nested => writeln!(out, "{indent}{}:", node.label()),
                Change::Added { desired } => {
                    writeln!(out, "{indent}{}: (missing) -> {desired}", node.label())
                }
                Change::Removed { current } => {
                    writeln!(out, "{indent}{}: {current} -> (removed)", node.label())
                }
                Change::Changed { desired, current } => {
                    writeln!(out, "{indent}{}: {current} -> {desired}", node.label())
                }
            };
        }
        out
    }

    /// Flat JSON delta keyed by path: `{"replicas": {"desired": 3, "current": 1}}`.
    pub fn to_delta_json(&self) -> Value {
        let mut delta = Map::new();
        for node in self.changes() {
            let key = if node.path.is_empty() {
                "<root>".to_string()
            } else {
                node.path.clone()
            };
            let entry = match &node.change {
                Change::Added { desired } => json!({ "desired": desired, "current": null }),
                Change::Removed { current } => json!({ "desired": null, "current": current }),
                Change::Changed { desired, current } => {
                    json!({ "desired": desired, "current": current })
                }
                Change::Nested => continue,
            };
            delta.insert(key, entry);
        }
        Value::Object(delta)
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn compare(
    path: String,
    depth: usize,
    desired: Option<&Value>,
    current: Option<&Value>,
) -> Option<DiffNode> {
    match (desired, current) {
        (None, None) => None,
        (Some(d), Some(c)) if d == c => None,
        (Some(Value::Object(d)), Some(Value::Object(c))) => {
            let keys: BTreeSet<&String> = d.keys().chain(c.keys()).collect();
            let children: Vec<DiffNode> = keys
                .into_iter()
                .filter_map(|k| compare(child_path(&path, k), depth + 1, d.get(k), c.get(k)))
                .collect();
            nested(path, depth, children)
        }
        (Some(Value::Array(d)), Some(Value::Array(c))) if d.len() == c.len() => {
            let children: Vec<DiffNode> = d
                .iter()
                .zip(c.iter())
                .enumerate()
                .filter_map(|(i, (d, c))| {
                    compare(format!("{path}[{i}]"), depth + 1, Some(d), Some(c))
                })
                .collect();
            nested(path, depth, children)
        }
        (Some(d), Some(c)) => Some(DiffNode::leaf(
            path,
            depth,
            Change::Changed {
                desired: d.clone(),
                current: c.clone(),
            },
        )),
        (Some(d), None) => Some(DiffNode::leaf(
            path,
            depth,
            Change::Added { desired: d.clone() },
        )),
        (None, Some(c)) => Some(DiffNode::leaf(
            path,
            depth,
            Change::Removed { current: c.clone() },
        )),
    }
}

fn nested(path: String, depth: usize, children: Vec<DiffNode>) -> Option<DiffNode> {
    if children.is_empty() {
        return None;
    }
    Some(DiffNode {
        path,
        depth,
        change: Change::Nested,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_has_no_changes() {
        let spec = json!({"replicas": 3, "ports": [80, 443]});
        let diff = ResourceDiff::new(&spec, Some(&spec.clone()));
        assert!(!diff.has_changes());
        assert!(diff.nodes().is_empty());
        assert_eq!(diff.to_delta_json(), json!({}));
    }

    #[test]
    fn test_changed_field() {
        let diff = ResourceDiff::new(&json!({"replicas": 3}), Some(&json!({"replicas": 1})));
        assert!(diff.has_changes());

        let changes = diff.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "replicas");
        assert_eq!(
            changes[0].change,
            Change::Changed {
                desired: json!(3),
                current: json!(1)
            }
        );
        assert_eq!(
            diff.to_delta_json(),
            json!({"replicas": {"desired": 3, "current": 1}})
        );
    }

    #[test]
    fn test_depths_follow_tree() {
        let desired = json!({"network": {"ports": [80, 8443]}, "name": "web"});
        let current = json!({"network": {"ports": [80, 443]}, "name": "web"});
        let diff = ResourceDiff::new(&desired, Some(&current));

        let root = diff.root().unwrap();
        assert_eq!(root.depth, 0);
        for node in diff.nodes() {
            for child in &node.children {
                assert_eq!(child.depth, node.depth + 1);
            }
        }

        let changes = diff.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "network.ports[1]");
        assert_eq!(changes[0].depth, 3);
    }

    #[test]
    fn test_added_and_removed_keys() {
        let diff = ResourceDiff::new(&json!({"a": 1}), Some(&json!({"b": 2})));
        let changes = diff.changes();
        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0].change, Change::Added { .. }));
        assert!(matches!(changes[1].change, Change::Removed { .. }));
    }

    #[test]
    fn test_array_length_change_is_leaf() {
        let diff = ResourceDiff::new(&json!({"ports": [80, 443]}), Some(&json!({"ports": [80]})));
        let changes = diff.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "ports");
    }

    #[test]
    fn test_missing_current_diffs_whole_document() {
        let diff = ResourceDiff::new(&json!({"replicas": 3}), None);
        let root = diff.root().unwrap();
        assert_eq!(root.depth, 0);
        assert!(matches!(root.change, Change::Added { .. }));
    }

    #[test]
    fn test_to_debug_indents_by_depth() {
        let desired = json!({"network": {"port": 8443}, "replicas": 3});
        let current = json!({"network": {"port": 443}, "replicas": 1});
        let rendered = ResourceDiff::new(&desired, Some(&current)).to_debug();

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec![
                "<root>:",
                "  network:",
                "    port: 443 -> 8443",
                "  replicas: 1 -> 3",
            ]
        );
    }

    #[test]
    fn test_of_serializable() {
        #[derive(Serialize)]
        struct Spec {
            replicas: u32,
        }
        let diff = ResourceDiff::of(&Spec { replicas: 3 }, Some(&Spec { replicas: 3 })).unwrap();
        assert!(!diff.has_changes());
    }
}
