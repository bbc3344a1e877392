//! # TwinBridge benchmarks
//!
//! ## Groups
//! - `marshal`: guest value conversion and lowering
//! - `dispatch`: full bridge command round trips
//!
//! ## Usage
//! ```bash
//! cargo bench            # all groups
//! cargo bench marshal    # conversion only
//! ```

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use twinbridge::bridge::marshal::DEFAULT_MAX_DEPTH;
use twinbridge::bridge::{Bootstrap, CrossValue, Embedding, Marshaller};
use twinbridge::runtime::command::{CmdValue, CommandInterp};
use twinbridge::runtime::object::{Obj, ObjectVm};
use twinbridge::util::config::BridgeConfig;

// ============================================================================
// Marshal
// ============================================================================

fn records(count: usize) -> Obj {
    let rows = (0..count)
        .map(|i| {
            Obj::dict(vec![
                (Obj::str("id"), Obj::int(i)),
                (Obj::str("name"), Obj::str(format!("row-{}", i))),
                (Obj::str("tags"), Obj::list(vec![Obj::bool(i % 2 == 0), Obj::none()])),
            ])
            .unwrap_or_else(|_| Obj::none())
        })
        .collect();
    Obj::list(rows)
}

fn bench_marshal_records(c: &mut Criterion) {
    let vm = ObjectVm::new();
    let value = records(1000);
    c.bench_function("marshal_records_1000", |b| {
        b.iter(|| Marshaller::new(&vm, DEFAULT_MAX_DEPTH).marshal(black_box(&value)))
    });
}

fn bench_marshal_big_int(c: &mut Criterion) {
    let vm = ObjectVm::new();
    let value = Obj::int(i128::MAX - 12345);
    c.bench_function("marshal_big_int", |b| {
        b.iter(|| Marshaller::new(&vm, DEFAULT_MAX_DEPTH).marshal(black_box(&value)))
    });
}

fn bench_lower_records(c: &mut Criterion) {
    let vm = ObjectVm::new();
    let value = Marshaller::new(&vm, DEFAULT_MAX_DEPTH)
        .marshal(&records(1000))
        .unwrap_or(CrossValue::Null);
    c.bench_function("lower_records_1000", |b| {
        b.iter(|| CmdValue::from(black_box(value.clone())))
    });
}

// ============================================================================
// Dispatch
// ============================================================================

fn bench_call_round_trip(c: &mut Criterion) {
    let embedding: &'static Embedding = Box::leak(Box::new(Embedding::new()));
    let bootstrap = Bootstrap::with_embedding(embedding, BridgeConfig::default());
    let interp = CommandInterp::new();
    if bootstrap.load_into_command_host(&interp).is_err() {
        return;
    }
    let _ = interp.eval("guest eval {def add(a, b):\n    return int(a) + int(b)}");
    c.bench_function("guest_call_add", |b| {
        b.iter(|| interp.eval(black_box("guest call add 20 22")))
    });
}

criterion_group!(
    marshal,
    bench_marshal_records,
    bench_marshal_big_int,
    bench_lower_records
);
criterion_group!(dispatch, bench_call_round_trip);
criterion_main!(marshal, dispatch);
