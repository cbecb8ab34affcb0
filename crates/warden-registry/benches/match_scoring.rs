use criterion::{Criterion, black_box, criterion_group, criterion_main};
use uuid::Uuid;

use warden_registry::{CapabilityQuery, CapabilityRegistry};
use warden_types::{AgentCapabilityManifest, Capability, TlpLevel};

fn seeded_registry(agents: usize) -> CapabilityRegistry {
    let registry = CapabilityRegistry::new();
    let pool = [
        "documentation",
        "code_review",
        "content_search",
        "testing",
        "refactoring",
        "design_tokens",
    ];
    for i in 0..agents {
        let caps = pool
            .iter()
            .take(1 + i % pool.len())
            .map(|id| {
                Capability::new(*id, *id)
                    .with_confidence(0.3 + 0.1 * (i % 7) as f64)
                    .with_clearance(TlpLevel::Green)
            })
            .collect();
        let manifest =
            AgentCapabilityManifest::new(Uuid::new_v4(), format!("agent-{i}")).with_capabilities(caps);
        registry.register_manifest(manifest).unwrap();
    }
    registry
}

fn bench_match_agents(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_agents");

    for size in [10, 100, 1000] {
        group.bench_with_input(
            criterion::BenchmarkId::new("match", size),
            &size,
            |b, &n| {
                let registry = seeded_registry(n);
                let query = CapabilityQuery {
                    required_categories: vec![
                        "documentation".to_string(),
                        "code_review".to_string(),
                    ],
                    only_available: true,
                    ..Default::default()
                };
                b.iter(|| black_box(registry.match_agents(&query)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_match_agents);
criterion_main!(benches);
