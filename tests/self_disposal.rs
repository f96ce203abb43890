use indirectx::{ContainerConfig, DelegateBuilder, MultiplicityConfig, ProviderNodeConfig, Resolver, SelfHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Cache {
    generation: usize,
    handle: SelfHandle,
}

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    disposed: AtomicUsize,
}

fn cache_container(counters: &Arc<Counters>, multiplicity: MultiplicityConfig) -> indirectx::Container {
    let counters = counters.clone();
    let builder = DelegateBuilder::new(move |ctx| {
        let generation = counters.built.fetch_add(1, Ordering::SeqCst);
        let on_dispose = counters.clone();
        ctx.register_disposer_fn(move || async move {
            on_dispose.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(Cache {
            generation,
            handle: ctx.self_handle().ok_or("self handle already taken")?,
        })
    });
    ContainerConfig::new()
        .add(ProviderNodeConfig::component(
            indirectx::Identifier::of::<Cache>(),
            builder,
            multiplicity,
        ))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_idle_singleton_disposes_immediately_and_rebuilds() {
    let counters = Arc::new(Counters::default());
    let container = cache_container(&counters, MultiplicityConfig::Singleton);

    let lock = container.resolve::<Cache>().await.unwrap();
    let cache = lock.target().clone();
    let handle = &cache.handle;
    lock.release().await.unwrap();
    assert!(handle.is_resolvable());

    handle.dispose_async().await;
    assert!(!handle.is_resolvable());
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);

    let fresh = container.resolve::<Cache>().await.unwrap();
    assert_eq!(fresh.generation, 1);
    assert!(fresh.handle.is_resolvable());
}

#[tokio::test]
async fn test_self_disposal_waits_for_outstanding_locks() {
    let counters = Arc::new(Counters::default());
    let container = cache_container(&counters, MultiplicityConfig::Singleton);

    let first = container.resolve::<Cache>().await.unwrap();
    let second = container.resolve::<Cache>().await.unwrap();

    first.handle.dispose_async().await;
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 0);

    // Detached at once: new resolves get a new instance
    let replacement = container.resolve::<Cache>().await.unwrap();
    assert_eq!(replacement.generation, 1);
    assert_eq!(first.generation, 0);

    first.release().await.unwrap();
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 0);
    second.release().await.unwrap();
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);

    replacement.release().await.unwrap();
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_self_disposal_is_a_no_op() {
    let counters = Arc::new(Counters::default());
    let container = cache_container(&counters, MultiplicityConfig::PerResolve);

    let lock = container.resolve::<Cache>().await.unwrap();
    let cache = lock.target().clone();
    let handle = &cache.handle;
    handle.dispose_async().await;
    handle.dispose_async().await;
    lock.release().await.unwrap();
    handle.dispose_async().await;

    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_self_disposal_during_build_detaches_new_instance() {
    struct Ephemeral {
        generation: usize,
    }

    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let container = ContainerConfig::new()
        .add(ProviderNodeConfig::singleton(DelegateBuilder::new_async(move |ctx| {
            let counter = counter.clone();
            async move {
                let generation = counter.fetch_add(1, Ordering::SeqCst);
                let handle = ctx.self_handle().expect("first request gets the handle");
                if generation == 0 {
                    handle.dispose_async().await;
                }
                Ok(Ephemeral { generation })
            }
        })))
        .build()
        .unwrap();

    let doomed = container.resolve::<Ephemeral>().await.unwrap();
    assert_eq!(doomed.generation, 0);

    let next = container.resolve::<Ephemeral>().await.unwrap();
    assert_eq!(next.generation, 1);

    doomed.release().await.unwrap();
    let again = container.resolve::<Ephemeral>().await.unwrap();
    assert_eq!(again.generation, 1);
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_self_handle_is_handed_out_once() {
    struct Loner;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = seen.clone();
    let container = ContainerConfig::new()
        .add(ProviderNodeConfig::per_resolve(DelegateBuilder::new(move |ctx| {
            let first = ctx.self_handle();
            let second = ctx.self_handle();
            record.lock().unwrap().push((first.is_some(), second.is_some()));
            Ok(Loner)
        })))
        .build()
        .unwrap();

    container.resolve::<Loner>().await.unwrap().release().await.unwrap();
    container.resolve::<Loner>().await.unwrap().release().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(true, false), (true, false)]);
}
