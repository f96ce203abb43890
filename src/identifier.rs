//! Identifier types addressing nodes in the configuration tree.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Contract type of a node.
///
/// Equality and hashing only look at the `TypeId`; the type name is kept for
/// diagnostics.
///
/// # Examples
///
/// ```rust
/// use indirectx::Contract;
///
/// let contract = Contract::of::<String>();
/// assert_eq!(contract.type_name(), "alloc::string::String");
/// assert_eq!(contract, Contract::of::<String>());
/// assert_ne!(contract, Contract::of::<u32>());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    type_id: TypeId,
    type_name: &'static str,
}

impl Contract {
    /// Contract for the type `T`.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for Contract {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Contract {}

impl Hash for Contract {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

// Marker contract backing the reserved empty identifier.
enum EmptyContract {}

/// Immutable key identifying a contract/role pair.
///
/// Identifiers address component nodes both when the tree is built and at
/// resolve time. An optional name distinguishes several nodes sharing a
/// contract type.
///
/// # Examples
///
/// ```rust
/// use indirectx::Identifier;
///
/// let plain = Identifier::of::<u32>();
/// let port = Identifier::named::<u32>("port");
///
/// assert_ne!(plain, port);
/// assert_eq!(port.name(), Some("port"));
/// assert_eq!(port.to_string(), "u32#port");
/// assert!(Identifier::empty().is_empty());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    contract: Contract,
    name: Option<Arc<str>>,
}

impl Identifier {
    /// Unnamed identifier for contract `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            contract: Contract::of::<T>(),
            name: None,
        }
    }

    /// Named identifier for contract `T`.
    pub fn named<T: ?Sized + 'static>(name: impl Into<Arc<str>>) -> Self {
        Self {
            contract: Contract::of::<T>(),
            name: Some(name.into()),
        }
    }

    /// The reserved invalid identifier. Never addresses a node.
    pub fn empty() -> Self {
        Self::of::<EmptyContract>()
    }

    /// Same contract with a different name.
    pub fn with_name(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            contract: self.contract,
            name: Some(name.into()),
        }
    }

    pub(crate) fn from_contract(contract: Contract) -> Self {
        Self {
            contract,
            name: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contract.type_id == TypeId::of::<EmptyContract>()
    }

    pub fn contract(&self) -> Contract {
        self.contract
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        match &self.name {
            Some(name) => write!(f, "{}#{}", self.contract.type_name, name),
            None => f.write_str(self.contract.type_name),
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self)
    }
}

impl From<Contract> for Identifier {
    fn from(contract: Contract) -> Self {
        Self::from_contract(contract)
    }
}
