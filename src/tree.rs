//! Immutable, validated node tree shared by all resolutions.

use std::sync::Arc;

use crate::builder::InstanceBuilder;
use crate::error::{NotFoundReason, ResolveTargetNotFound};
use crate::identifier::Identifier;
use crate::multiplicity::MultiplicityConfig;

#[cfg(feature = "ahash")]
pub(crate) type Map<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
pub(crate) type Map<K, V> = std::collections::HashMap<K, V>;

/// Arena index of a node in a [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Resolved construction plan of a component node.
pub(crate) struct Plan {
    pub(crate) dependencies: Vec<(Identifier, NodeId)>,
    pub(crate) builder: Arc<dyn InstanceBuilder>,
}

pub(crate) struct ComponentNode {
    pub(crate) identifier: Identifier,
    pub(crate) multiplicity: MultiplicityConfig,
    pub(crate) plan: Plan,
}

pub(crate) enum NodeKind {
    Component(ComponentNode),
    Scope { name: String },
}

pub(crate) struct TreeNode {
    #[cfg(feature = "diagnostics")]
    pub(crate) children: Vec<NodeId>,
    /// Nearest enclosing scope boundary, excluding the node itself
    pub(crate) boundary: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

/// Validated node tree.
///
/// Built once by [`ContainerConfig::build`](crate::ContainerConfig::build) and
/// never mutated afterwards.
pub struct NodeTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
    index: Map<Identifier, Vec<NodeId>>,
    boundaries: Map<(Option<NodeId>, String), NodeId>,
}

impl NodeTree {
    pub(crate) fn new(nodes: Vec<TreeNode>, roots: Vec<NodeId>) -> Self {
        let mut index: Map<Identifier, Vec<NodeId>> = Map::default();
        let mut boundaries = Map::default();
        for (i, node) in nodes.iter().enumerate() {
            let id = NodeId::new(i);
            match &node.kind {
                NodeKind::Component(component) => {
                    index.entry(component.identifier.clone()).or_default().push(id);
                }
                NodeKind::Scope { name } => {
                    boundaries.insert((node.boundary, name.clone()), id);
                }
            }
        }
        Self {
            nodes,
            roots,
            index,
            boundaries,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub(crate) fn component(&self, id: NodeId) -> Option<&ComponentNode> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Component(component) => Some(component),
            NodeKind::Scope { .. } => None,
        }
    }

    /// The single node carrying `identifier`.
    pub(crate) fn lookup(&self, identifier: &Identifier) -> Result<NodeId, ResolveTargetNotFound> {
        match self.index.get(identifier).map(Vec::as_slice) {
            Some([only]) => Ok(*only),
            Some(candidates) if candidates.len() > 1 => Err(ResolveTargetNotFound {
                identifier: identifier.clone(),
                reason: NotFoundReason::Ambiguous {
                    candidates: candidates.len(),
                },
            }),
            _ => Err(ResolveTargetNotFound {
                identifier: identifier.clone(),
                reason: NotFoundReason::Unregistered,
            }),
        }
    }

    /// Node carrying `identifier` as seen from a resolver inside the scope
    /// boundaries `enclosing`, innermost first.
    ///
    /// When several nodes carry the identifier, the one under the innermost
    /// of those boundaries (or at top level, last) wins. Several candidates
    /// under that same boundary stay ambiguous.
    pub(crate) fn lookup_from(
        &self,
        identifier: &Identifier,
        enclosing: &[NodeId],
    ) -> Result<NodeId, ResolveTargetNotFound> {
        let candidates = match self.index.get(identifier) {
            Some(candidates) if candidates.len() > 1 => candidates,
            _ => return self.lookup(identifier),
        };
        let levels = enclosing.iter().copied().map(Some).chain(std::iter::once(None));
        for level in levels {
            let mut matching = candidates.iter().filter(|id| self.node(**id).boundary == level);
            match (matching.next(), matching.next()) {
                (Some(only), None) => return Ok(*only),
                (Some(_), Some(_)) => break,
                _ => {}
            }
        }
        self.lookup(identifier)
    }

    /// Scope boundary named `name` directly nested in `enclosing`.
    pub(crate) fn boundary(&self, enclosing: Option<NodeId>, name: &str) -> Option<NodeId> {
        self.boundaries.get(&(enclosing, name.to_string())).copied()
    }

    pub(crate) fn scope_name(&self, id: NodeId) -> &str {
        match &self.node(id).kind {
            NodeKind::Scope { name } => name,
            NodeKind::Component(_) => "",
        }
    }

    pub(crate) fn component_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Component(_)))
            .map(|(i, _)| NodeId::new(i))
    }

    /// Number of nodes, scope boundaries included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identifiers of every component node, in declaration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Component(component) => Some(&component.identifier),
            NodeKind::Scope { .. } => None,
        })
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.index.contains_key(identifier)
    }

    /// Multiplicity of the node addressed by `identifier`, if it is unique.
    pub fn multiplicity_of(&self, identifier: &Identifier) -> Option<MultiplicityConfig> {
        let id = self.lookup(identifier).ok()?;
        self.component(id).map(|component| component.multiplicity)
    }

    /// Dependencies chosen for the node addressed by `identifier`, in order.
    pub fn dependencies_of(&self, identifier: &Identifier) -> Option<Vec<Identifier>> {
        let id = self.lookup(identifier).ok()?;
        self.component(id).map(|component| {
            component
                .plan
                .dependencies
                .iter()
                .map(|(dependency, _)| dependency.clone())
                .collect()
        })
    }

    /// Names of every scope boundary, in declaration order.
    pub fn scope_boundaries(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Scope { name } => Some(name.as_str()),
                NodeKind::Component(_) => None,
            })
            .collect()
    }

    /// Indented dump of the tree.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.write_node(&mut out, *root, 0);
        }
        out
    }

    #[cfg(feature = "diagnostics")]
    fn write_node(&self, out: &mut String, id: NodeId, depth: usize) {
        use std::fmt::Write;

        let node = self.node(id);
        let indent = "  ".repeat(depth);
        let _ = match &node.kind {
            NodeKind::Component(component) => {
                let deps: Vec<String> = component
                    .plan
                    .dependencies
                    .iter()
                    .map(|(dependency, _)| dependency.to_string())
                    .collect();
                writeln!(
                    out,
                    "{}{} [{}] -> [{}]",
                    indent,
                    component.identifier,
                    component.multiplicity,
                    deps.join(", ")
                )
            }
            NodeKind::Scope { name } => writeln!(out, "{}scope `{}`", indent, name),
        };
        for child in &node.children {
            self.write_node(out, *child, depth + 1);
        }
    }
}

impl std::fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots.len())
            .field("boundaries", &self.boundaries.len())
            .finish()
    }
}
