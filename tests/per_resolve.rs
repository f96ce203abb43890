use indirectx::{AsyncDispose, BoxError, ContainerConfig, DelegateBuilder, Identifier, Lock, ProviderNodeConfig, Resolver};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Worker {
    id: usize,
    disposals: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl AsyncDispose for Worker {
    async fn dispose(&self) -> Result<(), BoxError> {
        self.disposals.lock().unwrap().push(self.id);
        Ok(())
    }
}

fn worker_container(disposals: Arc<Mutex<Vec<usize>>>) -> indirectx::Container {
    let next = Arc::new(AtomicUsize::new(0));
    ContainerConfig::new()
        .add(ProviderNodeConfig::per_resolve(
            DelegateBuilder::new(move |_| {
                Ok(Worker {
                    id: next.fetch_add(1, Ordering::SeqCst),
                    disposals: disposals.clone(),
                })
            })
            .with_async_dispose::<Worker>(),
        ))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_give_distinct_instances() {
    let disposals = Arc::new(Mutex::new(Vec::new()));
    let container = worker_container(disposals.clone());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let container = container.clone();
        handles.push(tokio::spawn(async move { container.resolve::<Worker>().await.unwrap() }));
    }
    let mut locks = Vec::new();
    for handle in handles {
        locks.push(handle.await.unwrap());
    }

    let ids: HashSet<usize> = locks.iter().map(|lock| lock.id).collect();
    assert_eq!(ids.len(), 16);
    assert_eq!(container.instance_count(&Identifier::of::<Worker>()), 16);

    for lock in locks {
        lock.release().await.unwrap();
    }

    let mut disposed = disposals.lock().unwrap().clone();
    disposed.sort_unstable();
    assert_eq!(disposed, (0..16).collect::<Vec<_>>());
    assert_eq!(container.instance_count(&Identifier::of::<Worker>()), 0);
}

#[tokio::test]
async fn test_release_disposes_only_its_own_instance() {
    let disposals = Arc::new(Mutex::new(Vec::new()));
    let container = worker_container(disposals.clone());

    let first = container.resolve::<Worker>().await.unwrap();
    let second = container.resolve::<Worker>().await.unwrap();
    assert_ne!(first.id, second.id);

    let first_id = first.id;
    first.release().await.unwrap();
    assert_eq!(*disposals.lock().unwrap(), vec![first_id]);

    second.release().await.unwrap();
    assert_eq!(disposals.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_resolve_with_passes_arguments_to_builder() {
    struct Greeting(String);

    let container = ContainerConfig::new()
        .add(ProviderNodeConfig::per_resolve(DelegateBuilder::new(|ctx| {
            let name = ctx.args::<String>().cloned().unwrap_or_else(|| "nobody".to_string());
            Ok(Greeting(format!("hello {}", name)))
        })))
        .build()
        .unwrap();

    let id = Identifier::of::<Greeting>();
    let named = container
        .resolve_with::<Greeting, _>(&id, "ada".to_string())
        .await
        .unwrap();
    assert_eq!(named.0, "hello ada");

    let anonymous = container.resolve::<Greeting>().await.unwrap();
    assert_eq!(anonymous.0, "hello nobody");
}

#[tokio::test]
async fn test_per_resolve_child_owns_lock_on_singleton_parent() {
    struct Parent;
    struct Child;

    #[derive(Default)]
    struct Tally {
        parent_built: AtomicUsize,
        parent_disposed: AtomicUsize,
        child_built: AtomicUsize,
        child_disposed: AtomicUsize,
    }

    let tally = Arc::new(Tally::default());
    let parent_tally = tally.clone();
    let child_tally = tally.clone();

    let container = ContainerConfig::new()
        .add(
            ProviderNodeConfig::singleton(DelegateBuilder::new(move |ctx| {
                parent_tally.parent_built.fetch_add(1, Ordering::SeqCst);
                let tally = parent_tally.clone();
                ctx.register_disposer_fn(move || async move {
                    tally.parent_disposed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                Ok(Parent)
            }))
            .child(ProviderNodeConfig::per_resolve(
                DelegateBuilder::new(move |ctx| {
                    ctx.get::<Parent>()?;
                    child_tally.child_built.fetch_add(1, Ordering::SeqCst);
                    let tally = child_tally.clone();
                    ctx.register_disposer_fn(move || async move {
                        tally.child_disposed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    Ok(Child)
                })
                .depends_on_type::<Parent>(),
            )),
        )
        .build()
        .unwrap();

    let first = container.resolve::<Child>().await.unwrap();
    let second = container.resolve::<Child>().await.unwrap();
    first.release().await.unwrap();
    second.release().await.unwrap();

    assert_eq!(tally.parent_built.load(Ordering::SeqCst), 1);
    assert_eq!(tally.child_built.load(Ordering::SeqCst), 2);
    assert_eq!(tally.child_disposed.load(Ordering::SeqCst), 2);
    assert_eq!(tally.parent_disposed.load(Ordering::SeqCst), 0);
    assert_eq!(container.instance_count(&Identifier::of::<Parent>()), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_instance_holding_lock_on_its_own_node_disposes() {
    struct Link {
        next: Mutex<Option<Lock<Link>>>,
    }

    let container = ContainerConfig::new()
        .add(ProviderNodeConfig::per_resolve(DelegateBuilder::new(|_| {
            Ok(Link { next: Mutex::new(None) })
        })))
        .build()
        .unwrap();

    let head = container.resolve::<Link>().await.unwrap();
    let tail = container.resolve::<Link>().await.unwrap();
    *head.next.lock().unwrap() = Some(tail);

    // The head's slot drops the last reference to the head, which releases the tail
    drop(head);

    let id = Identifier::of::<Link>();
    let drained = tokio::time::timeout(Duration::from_secs(3), async {
        while container.instance_count(&id) > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "both links should dispose");
}
