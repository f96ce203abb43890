/// Unit tests for error display and source chains

use indirectx::{ConfigurationError, DisposeError, Identifier, NotFoundReason, ResolveError, ResolveTargetNotFound};
use std::error::Error;

#[test]
fn test_not_found_display() {
    let error = ResolveError::from(ResolveTargetNotFound {
        identifier: Identifier::of::<String>(),
        reason: NotFoundReason::Unregistered,
    });
    let display_str = error.to_string();
    assert_eq!(display_str, "resolve target alloc::string::String not found: not registered");
    assert_eq!(error.not_found().map(|inner| inner.identifier.clone()), Some(Identifier::of::<String>()));
}

#[test]
fn test_ambiguous_display() {
    let error = ResolveTargetNotFound {
        identifier: Identifier::named::<u32>("port"),
        reason: NotFoundReason::Ambiguous { candidates: 3 },
    };
    assert_eq!(error.to_string(), "resolve target u32#port not found: ambiguous between 3 nodes");
}

#[test]
fn test_build_failed_keeps_source() {
    let error = ResolveError::BuildFailed {
        identifier: Identifier::of::<u8>(),
        source: "connection refused".into(),
    };
    assert_eq!(error.to_string(), "builder for u8 failed: connection refused");
    assert_eq!(error.source().map(|source| source.to_string()), Some("connection refused".to_string()));
    assert!(error.not_found().is_none());
}

#[test]
fn test_scope_error_display() {
    let ended = ResolveError::ScopeEnded {
        scope: "request".to_string(),
        key: "r1".to_string(),
    };
    assert_eq!(ended.to_string(), "scope `request` (r1) has ended");

    let not_active = ResolveError::ScopeNotActive {
        identifier: Identifier::of::<u16>(),
        scope: "session".to_string(),
    };
    assert_eq!(not_active.to_string(), "u16 needs an active `session` scope");
}

#[test]
fn test_double_release_display() {
    let error = ResolveError::DoubleRelease {
        identifier: Identifier::of::<u64>(),
        lease: 4,
    };
    assert_eq!(error.to_string(), "lock 4 on u64 was already released");
}

#[test]
fn test_cycle_display_joins_path() {
    let error = ConfigurationError::CyclicDependency {
        path: vec![Identifier::of::<u8>(), Identifier::of::<u16>(), Identifier::of::<u8>()],
    };
    assert_eq!(error.to_string(), "cyclic dependency: u8 -> u16 -> u8");
}

#[test]
fn test_multiple_issues_flatten() {
    let error = ConfigurationError::Multiple(vec![
        ConfigurationError::MissingScopeBoundary {
            identifier: Identifier::of::<u8>(),
        },
        ConfigurationError::NoUsableConstructor {
            identifier: Identifier::of::<u16>(),
        },
    ]);
    assert_eq!(error.issues().len(), 2);
    assert_eq!(
        error.to_string(),
        "2 configuration errors, first: per-scope node u8 has no enclosing scope boundary"
    );

    let single = ConfigurationError::EmptyIdentifier {
        parent: "<root>".to_string(),
    };
    assert_eq!(single.issues().len(), 1);
}

#[test]
fn test_dispose_error_chains_resolve_error() {
    let error = DisposeError::DependencyRelease {
        identifier: Identifier::of::<u8>(),
        dependency: Identifier::of::<u16>(),
        source: ResolveError::ContainerDisposed,
    };
    assert_eq!(
        error.to_string(),
        "releasing dependency u16 of u8 failed: container has been disposed"
    );
    assert!(error.source().is_some());
}

#[test]
fn test_interrupted_disposal_message() {
    let error = DisposeError::Interrupted {
        identifier: Identifier::named::<u32>("port"),
    };
    assert_eq!(error.to_string(), "disposal of u32#port was interrupted");
    assert!(error.source().is_none());
}
