//! Declarative node configuration.
//!
//! A container is described by a tree of [`ProviderNodeConfig`] nodes. Each
//! component node pairs an [`Identifier`] with a builder and a multiplicity;
//! scope boundary nodes mark where scope instances can be entered. A node's
//! dependencies are looked up lexically: among its siblings, then its
//! parent's siblings, up to the root level.

use std::fmt;
use std::sync::Arc;

use crate::builder::BuilderConfig;
use crate::container::Container;
use crate::error::ConfigResult;
use crate::identifier::Identifier;
use crate::multiplicity::MultiplicityConfig;
use crate::observer::{ContainerObserver, Observers};
use crate::options::ContainerOptions;

pub(crate) mod validation;

#[derive(Clone)]
pub(crate) enum NodeConfigKind {
    Component {
        identifier: Identifier,
        builder: BuilderConfig,
        multiplicity: MultiplicityConfig,
    },
    Scope {
        name: String,
    },
}

/// One node of the configuration tree.
///
/// # Examples
///
/// ```
/// use indirectx::{DelegateBuilder, Identifier, MultiplicityConfig, ProviderNodeConfig};
///
/// struct Pool;
/// struct Session;
///
/// let root = ProviderNodeConfig::singleton(DelegateBuilder::new(|_| Ok(Pool)));
/// let request = ProviderNodeConfig::scope("request").child(
///     ProviderNodeConfig::per_scope(
///         DelegateBuilder::new(|_| Ok(Session)).depends_on(Identifier::of::<Pool>()),
///     ),
/// );
///
/// assert_eq!(root.identifier(), Some(&Identifier::of::<Pool>()));
/// assert_eq!(root.multiplicity(), Some(MultiplicityConfig::Singleton));
/// assert!(request.is_scope());
/// ```
#[derive(Clone)]
pub struct ProviderNodeConfig {
    pub(crate) kind: NodeConfigKind,
    pub(crate) children: Vec<ProviderNodeConfig>,
}

impl ProviderNodeConfig {
    /// Component node with an explicit identifier.
    pub fn component(
        identifier: Identifier,
        builder: impl Into<BuilderConfig>,
        multiplicity: MultiplicityConfig,
    ) -> Self {
        Self {
            kind: NodeConfigKind::Component {
                identifier,
                builder: builder.into(),
                multiplicity,
            },
            children: Vec::new(),
        }
    }

    /// Singleton node identified by its builder's contract.
    pub fn singleton(builder: impl Into<BuilderConfig>) -> Self {
        Self::contract_node(builder.into(), MultiplicityConfig::Singleton)
    }

    /// Per-resolve node identified by its builder's contract.
    pub fn per_resolve(builder: impl Into<BuilderConfig>) -> Self {
        Self::contract_node(builder.into(), MultiplicityConfig::PerResolve)
    }

    /// Per-scope node identified by its builder's contract.
    pub fn per_scope(builder: impl Into<BuilderConfig>) -> Self {
        Self::contract_node(builder.into(), MultiplicityConfig::PerScope)
    }

    fn contract_node(builder: BuilderConfig, multiplicity: MultiplicityConfig) -> Self {
        let identifier = Identifier::from(builder.contract());
        Self::component(identifier, builder, multiplicity)
    }

    /// Scope boundary node. Per-scope descendants get one instance per
    /// entered scope of this boundary.
    pub fn scope(name: impl Into<String>) -> Self {
        Self {
            kind: NodeConfigKind::Scope { name: name.into() },
            children: Vec::new(),
        }
    }

    /// Names the node's identifier, or renames a scope boundary.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        let name: Arc<str> = name.into();
        match &mut self.kind {
            NodeConfigKind::Component { identifier, .. } => {
                *identifier = identifier.with_name(name);
            }
            NodeConfigKind::Scope { name: scope } => {
                *scope = name.to_string();
            }
        }
        self
    }

    pub fn child(mut self, child: ProviderNodeConfig) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ProviderNodeConfig>) -> Self {
        self.children.extend(children);
        self
    }

    /// Identifier of a component node.
    pub fn identifier(&self) -> Option<&Identifier> {
        match &self.kind {
            NodeConfigKind::Component { identifier, .. } => Some(identifier),
            NodeConfigKind::Scope { .. } => None,
        }
    }

    pub fn multiplicity(&self) -> Option<MultiplicityConfig> {
        match &self.kind {
            NodeConfigKind::Component { multiplicity, .. } => Some(*multiplicity),
            NodeConfigKind::Scope { .. } => None,
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self.kind, NodeConfigKind::Scope { .. })
    }
}

impl fmt::Debug for ProviderNodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeConfigKind::Component {
                identifier,
                multiplicity,
                ..
            } => f
                .debug_struct("Component")
                .field("identifier", identifier)
                .field("multiplicity", multiplicity)
                .field("children", &self.children)
                .finish(),
            NodeConfigKind::Scope { name } => f
                .debug_struct("Scope")
                .field("name", name)
                .field("children", &self.children)
                .finish(),
        }
    }
}

/// Container configuration: root nodes, options and observers.
///
/// # Examples
///
/// ```
/// use indirectx::{ContainerConfig, ContainerOptions, DelegateBuilder, ProviderNodeConfig};
///
/// let container = ContainerConfig::new()
///     .with_options(ContainerOptions::default().with_name("app"))
///     .add(ProviderNodeConfig::singleton(DelegateBuilder::new(|_| Ok(7u8))))
///     .build()
///     .unwrap();
///
/// assert_eq!(container.tree().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ContainerConfig {
    nodes: Vec<ProviderNodeConfig>,
    options: ContainerOptions,
    observers: Observers,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root-level node.
    pub fn add(mut self, node: ProviderNodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_observer(mut self, observer: Arc<dyn ContainerObserver>) -> Self {
        self.observers.add(observer);
        self
    }

    pub fn nodes(&self) -> &[ProviderNodeConfig] {
        &self.nodes
    }

    /// Runs build-time validation without creating a container.
    pub fn validate(&self) -> ConfigResult<()> {
        validation::compile(&self.nodes).map(|_| ())
    }

    /// Validates the tree and creates the container.
    ///
    /// Every configuration issue found is reported; several issues come back
    /// as [`ConfigurationError::Multiple`](crate::ConfigurationError::Multiple).
    pub fn build(self) -> ConfigResult<Container> {
        let tree = validation::compile(&self.nodes).map_err(|error| {
            tracing::warn!(container = %self.options.name, %error, "container configuration rejected");
            error
        })?;
        tracing::debug!(
            container = %self.options.name,
            nodes = tree.len(),
            observers = self.observers.has_observers(),
            "container built"
        );
        Ok(Container::new(tree, self.options, self.observers))
    }
}

impl fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfig")
            .field("nodes", &self.nodes)
            .field("options", &self.options)
            .finish()
    }
}
