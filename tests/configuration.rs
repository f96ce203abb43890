//! Build-time validation of configuration trees.

use async_trait::async_trait;
use indirectx::{
    AsyncDispose, BoxError, ClassBuilder, Component, ConfigurationError, Constructor, ContainerConfig,
    DelegateBuilder, Identifier, MultiplicityConfig, ProviderNodeConfig, Resolver,
};

struct Database;
struct Cache;
struct Service;
struct Missing;

fn database() -> DelegateBuilder {
    DelegateBuilder::new(|_| Ok(Database))
}

fn cache() -> DelegateBuilder {
    DelegateBuilder::new(|_| Ok(Cache))
}

fn service() -> DelegateBuilder {
    DelegateBuilder::new(|_| Ok(Service))
}

fn build_error(config: ContainerConfig) -> ConfigurationError {
    match config.build() {
        Ok(_) => panic!("configuration should have been rejected"),
        Err(error) => error,
    }
}

#[test]
fn test_valid_tree_builds() {
    let config = ContainerConfig::new()
        .add(ProviderNodeConfig::singleton(database()))
        .add(
            ProviderNodeConfig::scope("request")
                .child(ProviderNodeConfig::per_scope(cache().depends_on_type::<Database>()))
                .child(ProviderNodeConfig::per_resolve(service().depends_on_type::<Cache>())),
        );
    assert!(config.validate().is_ok());

    let container = config.build().unwrap();
    let tree = container.tree();
    assert_eq!(tree.len(), 4);
    assert_eq!(tree.multiplicity_of(&Identifier::of::<Cache>()), Some(MultiplicityConfig::PerScope));
    assert_eq!(
        tree.dependencies_of(&Identifier::of::<Service>()),
        Some(vec![Identifier::of::<Cache>()])
    );
    assert_eq!(tree.scope_boundaries(), vec!["request"]);
}

#[test]
fn test_duplicate_siblings_are_rejected() {
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::singleton(database()))
            .add(ProviderNodeConfig::per_resolve(database())),
    );
    assert!(matches!(
        err,
        ConfigurationError::DuplicateIdentifier { ref identifier, ref parent }
            if *identifier == Identifier::of::<Database>() && parent == "<root>"
    ));
}

#[test]
fn test_same_identifier_under_different_parents_is_allowed() {
    let config = ContainerConfig::new()
        .add(ProviderNodeConfig::scope("a").child(ProviderNodeConfig::per_scope(database())))
        .add(ProviderNodeConfig::scope("b").child(ProviderNodeConfig::per_scope(database())));
    assert!(config.validate().is_ok());
}

#[test]
fn test_named_identifiers_do_not_collide() {
    let config = ContainerConfig::new()
        .add(ProviderNodeConfig::singleton(database()).named("primary"))
        .add(ProviderNodeConfig::singleton(database()).named("replica"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_duplicate_scope_names_are_rejected() {
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::scope("request"))
            .add(ProviderNodeConfig::scope("request")),
    );
    assert!(matches!(err, ConfigurationError::DuplicateScope { ref name, .. } if name == "request"));
}

#[test]
fn test_cycles_report_their_path() {
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::singleton(database().depends_on_type::<Cache>()))
            .add(ProviderNodeConfig::singleton(cache().depends_on_type::<Database>())),
    );
    match err {
        ConfigurationError::CyclicDependency { path } => {
            assert_eq!(
                path,
                vec![
                    Identifier::of::<Database>(),
                    Identifier::of::<Cache>(),
                    Identifier::of::<Database>(),
                ]
            );
        }
        other => panic!("expected a cycle, got {}", other),
    }
}

#[test]
fn test_singleton_capturing_per_scope_is_rejected() {
    let err = build_error(ContainerConfig::new().add(
        ProviderNodeConfig::scope("request")
            .child(ProviderNodeConfig::per_scope(cache()))
            .child(ProviderNodeConfig::per_resolve(database().depends_on_type::<Cache>()))
            .child(ProviderNodeConfig::singleton(service().depends_on_type::<Database>())),
    ));
    assert!(matches!(
        err,
        ConfigurationError::CaptiveDependency { ref identifier, ref dependency }
            if *identifier == Identifier::of::<Service>() && *dependency == Identifier::of::<Cache>()
    ));
}

#[test]
fn test_per_scope_outside_boundary_is_rejected() {
    let err = build_error(ContainerConfig::new().add(ProviderNodeConfig::per_scope(cache())));
    assert!(matches!(err, ConfigurationError::MissingScopeBoundary { .. }));
}

#[test]
fn test_invisible_dependencies_are_rejected() {
    // Missing entirely
    let err = build_error(
        ContainerConfig::new().add(ProviderNodeConfig::singleton(service().depends_on_type::<Missing>())),
    );
    assert!(matches!(
        err,
        ConfigurationError::UnresolvableDependency { ref dependency, .. } if *dependency == Identifier::of::<Missing>()
    ));

    // Registered, but nested below a sibling
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::scope("request").child(ProviderNodeConfig::per_scope(cache())))
            .add(ProviderNodeConfig::singleton(service().depends_on_type::<Cache>())),
    );
    assert!(matches!(err, ConfigurationError::UnresolvableDependency { .. }));
}

#[test]
fn test_builder_output_must_match_identifier() {
    let err = build_error(ContainerConfig::new().add(ProviderNodeConfig::component(
        Identifier::of::<Database>(),
        cache(),
        MultiplicityConfig::Singleton,
    )));
    assert!(matches!(
        err,
        ConfigurationError::ContractMismatch { ref identifier, produced }
            if *identifier == Identifier::of::<Database>() && produced.ends_with("Cache")
    ));
}

#[test]
fn test_async_dispose_must_match_output() {
    struct Other;

    #[async_trait]
    impl AsyncDispose for Other {
        async fn dispose(&self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    let err = build_error(
        ContainerConfig::new().add(ProviderNodeConfig::singleton(database().with_async_dispose::<Other>())),
    );
    assert!(matches!(err, ConfigurationError::ContractMismatch { .. }));
}

#[test]
fn test_empty_identifier_is_rejected() {
    let err = build_error(ContainerConfig::new().add(ProviderNodeConfig::component(
        Identifier::empty(),
        service(),
        MultiplicityConfig::Singleton,
    )));
    assert!(matches!(err, ConfigurationError::EmptyIdentifier { .. }));
}

struct Report;

#[async_trait]
impl Component for Report {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|_| Ok(Report)).depends_on_type::<Missing>(),
            Constructor::new(|_| Ok(Report))
                .depends_on_type::<Database>()
                .depends_on_type::<Missing>(),
        ]
    }
}

#[test]
fn test_class_without_usable_constructor_is_rejected() {
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::singleton(database()))
            .add(ProviderNodeConfig::singleton(ClassBuilder::of::<Report>())),
    );
    assert!(matches!(
        err,
        ConfigurationError::NoUsableConstructor { ref identifier } if *identifier == Identifier::of::<Report>()
    ));
}

struct Dashboard {
    with_cache: bool,
}

#[async_trait]
impl Component for Dashboard {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new(|_| Ok(Dashboard { with_cache: false })).depends_on_type::<Database>(),
            Constructor::new(|ctx| {
                ctx.get::<Cache>()?;
                Ok(Dashboard { with_cache: true })
            })
            .depends_on_type::<Database>()
            .depends_on_type::<Cache>(),
        ]
    }
}

#[tokio::test]
async fn test_class_picks_constructor_with_most_visible_dependencies() {
    let without_cache = ContainerConfig::new()
        .add(ProviderNodeConfig::singleton(database()))
        .add(ProviderNodeConfig::singleton(ClassBuilder::of::<Dashboard>()))
        .build()
        .unwrap();
    assert!(!without_cache.resolve::<Dashboard>().await.unwrap().with_cache);

    let with_cache = ContainerConfig::new()
        .add(ProviderNodeConfig::singleton(database()))
        .add(ProviderNodeConfig::singleton(cache()))
        .add(ProviderNodeConfig::singleton(ClassBuilder::of::<Dashboard>()))
        .build()
        .unwrap();
    assert!(with_cache.resolve::<Dashboard>().await.unwrap().with_cache);
}

#[test]
fn test_all_issues_reported_together() {
    let err = build_error(
        ContainerConfig::new()
            .add(ProviderNodeConfig::per_scope(cache()))
            .add(ProviderNodeConfig::singleton(service().depends_on_type::<Missing>()))
            .add(ProviderNodeConfig::scope("request"))
            .add(ProviderNodeConfig::scope("request")),
    );
    let issues = err.issues();
    assert_eq!(issues.len(), 3);
    assert!(issues.iter().any(|issue| matches!(issue, ConfigurationError::DuplicateScope { .. })));
    assert!(issues
        .iter()
        .any(|issue| matches!(issue, ConfigurationError::UnresolvableDependency { .. })));
    assert!(issues
        .iter()
        .any(|issue| matches!(issue, ConfigurationError::MissingScopeBoundary { .. })));
    assert!(err.to_string().starts_with("3 configuration errors"));
}
