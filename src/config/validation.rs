//! Build-time validation of the configuration tree.
//!
//! Flattens the declarative tree into an arena, checks it and compiles it
//! into a [`NodeTree`]. All issues found in one pass are reported together.
//!
//! # Validation Rules
//!
//! - component identifiers are not empty and match the builder's output type
//! - sibling identifiers are unique, so are scope names under one boundary
//! - every dependency is visible from the node (siblings, then ancestors' siblings)
//! - class builders have at least one constructor whose dependencies are all visible
//! - per-scope nodes sit below a scope boundary
//! - no dependency cycles
//! - no singleton depends, even transitively, on a per-scope node

use std::collections::HashSet;

use crate::builder::BuilderConfig;
use crate::config::{NodeConfigKind, ProviderNodeConfig};
use crate::error::{ConfigResult, ConfigurationError};
use crate::identifier::Identifier;
use crate::multiplicity::MultiplicityConfig;
use crate::tree::{ComponentNode, NodeId, NodeKind, NodeTree, Plan, TreeNode};

struct Draft<'a> {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    boundary: Option<NodeId>,
    kind: &'a NodeConfigKind,
}

impl Draft<'_> {
    fn identifier(&self) -> Option<&Identifier> {
        match self.kind {
            NodeConfigKind::Component { identifier, .. } => Some(identifier),
            NodeConfigKind::Scope { .. } => None,
        }
    }

    fn multiplicity(&self) -> Option<MultiplicityConfig> {
        match self.kind {
            NodeConfigKind::Component { multiplicity, .. } => Some(*multiplicity),
            NodeConfigKind::Scope { .. } => None,
        }
    }
}

/// Chosen constructor of a component node and its resolved dependencies.
struct Selection {
    candidate: usize,
    dependencies: Vec<(Identifier, NodeId)>,
}

struct Validator<'a> {
    drafts: Vec<Draft<'a>>,
    roots: Vec<NodeId>,
    issues: Vec<ConfigurationError>,
}

pub(crate) fn compile(roots: &[ProviderNodeConfig]) -> ConfigResult<NodeTree> {
    let mut drafts = Vec::new();
    let roots = flatten(roots, None, None, &mut drafts);
    let mut validator = Validator {
        drafts,
        roots,
        issues: Vec::new(),
    };

    validator.check_identifiers();
    validator.check_siblings();
    let selections = validator.select_constructors();
    validator.check_scope_boundaries();
    validator.check_cycles(&selections);
    validator.check_captive_dependencies(&selections);

    if let Some(error) = ConfigurationError::from_issues(std::mem::take(&mut validator.issues)) {
        return Err(error);
    }
    Ok(validator.assemble(selections))
}

fn flatten<'a>(
    configs: &'a [ProviderNodeConfig],
    parent: Option<NodeId>,
    boundary: Option<NodeId>,
    drafts: &mut Vec<Draft<'a>>,
) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity(configs.len());
    for config in configs {
        let id = NodeId::new(drafts.len());
        drafts.push(Draft {
            parent,
            children: Vec::new(),
            boundary,
            kind: &config.kind,
        });
        let inner = match config.kind {
            NodeConfigKind::Scope { .. } => Some(id),
            NodeConfigKind::Component { .. } => boundary,
        };
        let children = flatten(&config.children, Some(id), inner, drafts);
        drafts[id.index()].children = children;
        ids.push(id);
    }
    ids
}

impl<'a> Validator<'a> {
    fn draft(&self, id: NodeId) -> &Draft<'a> {
        &self.drafts[id.index()]
    }

    fn label(&self, parent: Option<NodeId>) -> String {
        match parent.map(|id| self.draft(id).kind) {
            None => "<root>".to_string(),
            Some(NodeConfigKind::Component { identifier, .. }) => identifier.to_string(),
            Some(NodeConfigKind::Scope { name }) => format!("scope `{}`", name),
        }
    }

    fn siblings(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => &self.draft(id).children,
            None => &self.roots,
        }
    }

    fn components(&self) -> impl Iterator<Item = (NodeId, &Identifier, &'a BuilderConfig)> + '_ {
        self.drafts.iter().enumerate().filter_map(|(i, draft)| match draft.kind {
            NodeConfigKind::Component { identifier, builder, .. } => Some((NodeId::new(i), identifier, builder)),
            NodeConfigKind::Scope { .. } => None,
        })
    }

    /// Lexical lookup: siblings first, then each ancestor's siblings.
    fn lookup_visible(&self, from: NodeId, dependency: &Identifier) -> Option<NodeId> {
        let mut level = self.draft(from).parent;
        loop {
            let found = self
                .siblings(level)
                .iter()
                .copied()
                .find(|sibling| self.draft(*sibling).identifier() == Some(dependency));
            if found.is_some() {
                return found;
            }
            level = self.draft(level?).parent;
        }
    }

    fn check_identifiers(&mut self) {
        let mut issues = Vec::new();
        for (id, identifier, builder) in self.components() {
            if identifier.is_empty() {
                issues.push(ConfigurationError::EmptyIdentifier {
                    parent: self.label(self.draft(id).parent),
                });
                continue;
            }
            let produced = builder.contract();
            if identifier.contract() != produced {
                issues.push(ConfigurationError::ContractMismatch {
                    identifier: identifier.clone(),
                    produced: produced.type_name(),
                });
            } else if let Some(teardown) = builder.teardown_mismatch() {
                issues.push(ConfigurationError::ContractMismatch {
                    identifier: identifier.clone(),
                    produced: teardown.type_name(),
                });
            }
        }
        self.issues.extend(issues);
    }

    fn check_siblings(&mut self) {
        let mut issues = Vec::new();
        let parents = std::iter::once(None).chain((0..self.drafts.len()).map(|i| Some(NodeId::new(i))));
        for parent in parents {
            let mut seen = HashSet::new();
            for sibling in self.siblings(parent) {
                if let Some(identifier) = self.draft(*sibling).identifier() {
                    if !identifier.is_empty() && !seen.insert(identifier) {
                        issues.push(ConfigurationError::DuplicateIdentifier {
                            identifier: identifier.clone(),
                            parent: self.label(parent),
                        });
                    }
                }
            }
        }

        let mut scopes = HashSet::new();
        for draft in &self.drafts {
            if let NodeConfigKind::Scope { name } = draft.kind {
                if !scopes.insert((draft.boundary, name.as_str())) {
                    issues.push(ConfigurationError::DuplicateScope {
                        name: name.clone(),
                        parent: self.label(draft.boundary),
                    });
                }
            }
        }
        self.issues.extend(issues);
    }

    fn select_constructors(&mut self) -> Vec<Option<Selection>> {
        let mut selections: Vec<Option<Selection>> = (0..self.drafts.len()).map(|_| None).collect();
        let mut issues = Vec::new();

        for (id, identifier, builder) in self.components() {
            let candidates = builder.candidates();
            let mut best: Option<Selection> = None;
            for (candidate, dependencies) in candidates.iter().enumerate() {
                let resolved: Option<Vec<(Identifier, NodeId)>> = dependencies
                    .iter()
                    .map(|dependency| {
                        self.lookup_visible(id, dependency)
                            .map(|node| (dependency.clone(), node))
                    })
                    .collect();
                if let Some(dependencies) = resolved {
                    // Most dependencies wins, earlier declaration on ties
                    if best
                        .as_ref()
                        .map_or(true, |chosen| dependencies.len() > chosen.dependencies.len())
                    {
                        best = Some(Selection {
                            candidate,
                            dependencies,
                        });
                    }
                }
            }

            match (best, candidates.as_slice()) {
                (Some(selection), _) => selections[id.index()] = Some(selection),
                (None, [only]) => {
                    for dependency in only.iter() {
                        if self.lookup_visible(id, dependency).is_none() {
                            issues.push(ConfigurationError::UnresolvableDependency {
                                identifier: identifier.clone(),
                                dependency: dependency.clone(),
                            });
                        }
                    }
                }
                (None, _) => issues.push(ConfigurationError::NoUsableConstructor {
                    identifier: identifier.clone(),
                }),
            }
        }

        self.issues.extend(issues);
        selections
    }

    fn check_scope_boundaries(&mut self) {
        let mut issues = Vec::new();
        for draft in &self.drafts {
            if let NodeConfigKind::Component {
                identifier,
                multiplicity,
                ..
            } = draft.kind
            {
                if multiplicity.requires_scope() && draft.boundary.is_none() {
                    issues.push(ConfigurationError::MissingScopeBoundary {
                        identifier: identifier.clone(),
                    });
                }
            }
        }
        self.issues.extend(issues);
    }

    fn check_cycles(&mut self, selections: &[Option<Selection>]) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            node: NodeId,
            selections: &[Option<Selection>],
            marks: &mut [Mark],
            path: &mut Vec<NodeId>,
            cycles: &mut Vec<Vec<NodeId>>,
        ) {
            match marks[node.index()] {
                Mark::Done => return,
                Mark::InProgress => {
                    if let Some(start) = path.iter().position(|entry| *entry == node) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(node);
                        cycles.push(cycle);
                    }
                    return;
                }
                Mark::Unvisited => {}
            }
            marks[node.index()] = Mark::InProgress;
            path.push(node);
            if let Some(selection) = &selections[node.index()] {
                for (_, dependency) in &selection.dependencies {
                    visit(*dependency, selections, marks, path, cycles);
                }
            }
            path.pop();
            marks[node.index()] = Mark::Done;
        }

        let mut marks = vec![Mark::Unvisited; self.drafts.len()];
        let mut path = Vec::new();
        let mut cycles = Vec::new();
        for i in 0..self.drafts.len() {
            visit(NodeId::new(i), selections, &mut marks, &mut path, &mut cycles);
        }

        for cycle in cycles {
            let path = cycle
                .into_iter()
                .filter_map(|node| self.draft(node).identifier().cloned())
                .collect();
            self.issues.push(ConfigurationError::CyclicDependency { path });
        }
    }

    fn check_captive_dependencies(&mut self, selections: &[Option<Selection>]) {
        let mut issues = Vec::new();
        for (id, identifier, _) in self.components() {
            if self.draft(id).multiplicity() != Some(MultiplicityConfig::Singleton) {
                continue;
            }
            let mut visited = HashSet::new();
            let mut pending = vec![id];
            while let Some(node) = pending.pop() {
                let Some(selection) = &selections[node.index()] else {
                    continue;
                };
                for (dependency, target) in &selection.dependencies {
                    if !visited.insert(*target) {
                        continue;
                    }
                    if self.draft(*target).multiplicity() == Some(MultiplicityConfig::PerScope) {
                        issues.push(ConfigurationError::CaptiveDependency {
                            identifier: identifier.clone(),
                            dependency: dependency.clone(),
                        });
                        pending.clear();
                        break;
                    }
                    pending.push(*target);
                }
            }
        }
        self.issues.extend(issues);
    }

    fn assemble(self, mut selections: Vec<Option<Selection>>) -> NodeTree {
        let nodes = self
            .drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                let kind = match draft.kind {
                    NodeConfigKind::Component {
                        identifier,
                        builder,
                        multiplicity,
                    } => {
                        let Selection {
                            candidate,
                            dependencies,
                        } = selections[i].take().unwrap_or(Selection {
                            candidate: 0,
                            dependencies: Vec::new(),
                        });
                        NodeKind::Component(ComponentNode {
                            identifier: identifier.clone(),
                            multiplicity: *multiplicity,
                            plan: Plan {
                                dependencies,
                                builder: builder.select(candidate),
                            },
                        })
                    }
                    NodeConfigKind::Scope { name } => NodeKind::Scope { name: name.clone() },
                };
                TreeNode {
                    #[cfg(feature = "diagnostics")]
                    children: draft.children,
                    boundary: draft.boundary,
                    kind,
                }
            })
            .collect();
        NodeTree::new(nodes, self.roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Component, Constructor, DelegateBuilder};

    struct A;
    struct B;

    fn a() -> DelegateBuilder {
        DelegateBuilder::new(|_| Ok(A))
    }

    fn b() -> DelegateBuilder {
        DelegateBuilder::new(|_| Ok(B))
    }

    #[test]
    fn siblings_are_visible_descendants_are_not() {
        let nodes = vec![
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::singleton(b().depends_on_type::<A>()),
        ];
        let tree = compile(&nodes).unwrap();
        assert_eq!(
            tree.dependencies_of(&Identifier::of::<B>()),
            Some(vec![Identifier::of::<A>()])
        );

        let nested = vec![ProviderNodeConfig::singleton(a().depends_on_type::<B>())
            .child(ProviderNodeConfig::singleton(b()))];
        let err = compile(&nested).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnresolvableDependency { .. }));
    }

    #[test]
    fn ancestors_siblings_are_visible() {
        let nodes = vec![
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::scope("request")
                .child(ProviderNodeConfig::per_scope(b().depends_on_type::<A>())),
        ];
        let tree = compile(&nodes).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.scope_boundaries(), vec!["request"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let nodes = vec![ProviderNodeConfig::singleton(a().depends_on_type::<A>())];
        match compile(&nodes).unwrap_err() {
            ConfigurationError::CyclicDependency { path } => {
                assert_eq!(path, vec![Identifier::of::<A>(), Identifier::of::<A>()]);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn all_issues_are_collected() {
        let nodes = vec![
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::per_scope(b()),
        ];
        let err = compile(&nodes).unwrap_err();
        let issues = err.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .any(|issue| matches!(issue, ConfigurationError::DuplicateIdentifier { .. })));
        assert!(issues
            .iter()
            .any(|issue| matches!(issue, ConfigurationError::MissingScopeBoundary { .. })));
    }

    struct Repository;

    impl Component for Repository {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![
                Constructor::new(|_| Ok(Repository)).depends_on_type::<A>(),
                Constructor::new(|_| Ok(Repository))
                    .depends_on_type::<A>()
                    .depends_on_type::<B>(),
                Constructor::new(|_| Ok(Repository)),
            ]
        }
    }

    #[test]
    fn class_builder_picks_most_specific_visible_constructor() {
        let with_both = vec![
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::singleton(b()),
            ProviderNodeConfig::singleton(BuilderConfig::class::<Repository>()),
        ];
        let tree = compile(&with_both).unwrap();
        assert_eq!(
            tree.dependencies_of(&Identifier::of::<Repository>()).map(|deps| deps.len()),
            Some(2)
        );

        let only_a = vec![
            ProviderNodeConfig::singleton(a()),
            ProviderNodeConfig::singleton(BuilderConfig::class::<Repository>()),
        ];
        let tree = compile(&only_a).unwrap();
        assert_eq!(
            tree.dependencies_of(&Identifier::of::<Repository>()),
            Some(vec![Identifier::of::<A>()])
        );

        let none = vec![ProviderNodeConfig::singleton(BuilderConfig::class::<Repository>())];
        let tree = compile(&none).unwrap();
        assert_eq!(tree.dependencies_of(&Identifier::of::<Repository>()), Some(vec![]));
    }
}
