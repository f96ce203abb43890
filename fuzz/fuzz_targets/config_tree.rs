#![no_main]

use indirectx::{ContainerConfig, DelegateBuilder, MultiplicityConfig, ProviderNodeConfig, Resolver};
use libfuzzer_sys::fuzz_target;

struct N0;
struct N1;
struct N2;
struct N3;

fn builder(kind: u8, dependency: u8) -> DelegateBuilder {
    let builder = match kind % 4 {
        0 => DelegateBuilder::new(|_| Ok(N0)),
        1 => DelegateBuilder::new(|_| Ok(N1)),
        2 => DelegateBuilder::new(|_| Ok(N2)),
        _ => DelegateBuilder::new(|_| Ok(N3)),
    };
    match dependency % 5 {
        0 => builder.depends_on_type::<N0>(),
        1 => builder.depends_on_type::<N1>(),
        2 => builder.depends_on_type::<N2>(),
        3 => builder.depends_on_type::<N3>(),
        _ => builder,
    }
}

fn multiplicity(byte: u8) -> MultiplicityConfig {
    match byte % 3 {
        0 => MultiplicityConfig::Singleton,
        1 => MultiplicityConfig::PerResolve,
        _ => MultiplicityConfig::PerScope,
    }
}

fn component(chunk: &[u8]) -> ProviderNodeConfig {
    let builder = builder(chunk[0], chunk[1]);
    let contract = builder.contract();
    ProviderNodeConfig::component(contract.into(), builder, multiplicity(chunk[2]))
}

// Every 3-byte chunk is a component; a chunk starting with 0xff opens a scope
// that holds the following chunks.
fuzz_target!(|data: &[u8]| {
    let mut config = ContainerConfig::new();
    let mut scope: Option<ProviderNodeConfig> = None;
    for chunk in data.chunks_exact(3).take(16) {
        if chunk[0] == 0xff {
            if let Some(open) = scope.take() {
                config = config.add(open);
            }
            scope = Some(ProviderNodeConfig::scope(format!("s{}", chunk[1] % 2)));
            continue;
        }
        match scope.take() {
            Some(open) => scope = Some(open.child(component(chunk))),
            None => config = config.add(component(chunk)),
        }
    }
    if let Some(open) = scope {
        config = config.add(open);
    }

    // Rejected trees are fine; accepted ones must resolve without panicking
    let Ok(container) = config.build() else {
        return;
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let identifiers: Vec<_> = container.tree().identifiers().cloned().collect();
        let scope = container.create_scope("s0", "fuzz").ok();
        for identifier in &identifiers {
            if let Ok(lock) = container.resolve_erased(identifier, None).await {
                let _ = lock.release().await;
            }
            if let Some(scope) = &scope {
                if let Ok(lock) = scope.resolve_erased(identifier, None).await {
                    let _ = lock.release().await;
                }
            }
        }
        drop(scope);
        container.dispose_all().await;
    });
});
