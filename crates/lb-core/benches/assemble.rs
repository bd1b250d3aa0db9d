use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lb_core::{Block, CanonicalLookup, Zone, assemble, canonical_ids, resolve_many};

fn workspace(n: usize) -> (Vec<Block>, CanonicalLookup) {
    let mut blocks = Vec::with_capacity(n);
    let mut lookup = CanonicalLookup::new();
    for i in 0..n {
        let zone = Zone::ALL[i % 3];
        if i % 4 == 0 {
            let canonical = Block::new_regular("other", "guideline", zone, i as f64, "shared text");
            lookup.insert(canonical.id, canonical.content.clone());
            blocks.push(Block::new_linked("ws", "guideline", zone, i as f64, canonical.id));
        } else {
            let text = format!("block {i} with a few words of working content");
            blocks.push(Block::new_regular("ws", "note", zone, (n - i) as f64, &text));
        }
    }
    (blocks, lookup)
}

fn bench_resolve_assemble(c: &mut Criterion) {
    let (blocks, lookup) = workspace(500);
    c.bench_function("resolve_and_assemble_500", |b| {
        b.iter(|| {
            let ids = canonical_ids(black_box(&blocks));
            let resolved = resolve_many(&blocks, &lookup);
            let out = assemble(&resolved.blocks, "prompt", None);
            black_box((ids, out))
        })
    });
}

criterion_group!(benches, bench_resolve_assemble);
criterion_main!(benches);
