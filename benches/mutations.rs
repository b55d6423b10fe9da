use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use rnoh_bridge::logging::{LogEvent, LogSink};
use rnoh_bridge::{
    DescriptorRegistry, InstanceConfig, InstanceId, InstanceRegistry, Logger, LoggingResult,
    Mutation, PropMap, RecordingBoundary, Tag,
};
use serde_json::json;

#[derive(Clone, Default)]
struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _event: &LogEvent) -> LoggingResult<()> {
        Ok(())
    }
}

const WIDTH: Tag = 500;

fn mount_batch() -> Vec<Mutation> {
    let mut batch = Vec::with_capacity(WIDTH as usize * 2);
    for offset in 0..WIDTH {
        let tag = 2 + offset;
        let mut props = PropMap::new();
        props.insert("testID".to_string(), json!(format!("row-{offset}")));
        batch.push(Mutation::Create {
            tag,
            kind: "View".to_string(),
            props,
        });
        batch.push(Mutation::insert(1, tag, offset as usize));
    }
    batch
}

fn update_batch() -> Vec<Mutation> {
    (0..WIDTH)
        .map(|offset| {
            let mut props = PropMap::new();
            props.insert("opacity".to_string(), json!(0.5));
            Mutation::update_props(2 + offset, props)
        })
        .collect()
}

fn unmount_batch() -> Vec<Mutation> {
    let mut batch = Vec::with_capacity(WIDTH as usize * 2);
    for offset in 0..WIDTH {
        batch.push(Mutation::remove(1, 2 + offset));
        batch.push(Mutation::delete(2 + offset));
    }
    batch
}

fn wide_tree_mount(c: &mut Criterion) {
    let mount = mount_batch();
    c.bench_function("wide_tree_mount", |b| {
        b.iter(|| {
            let mut registry = DescriptorRegistry::new();
            registry.subscribe(|changes| {
                black_box(changes.updated.len());
            });
            let report = registry.apply_mutations(black_box(&mount)).expect("mount");
            black_box(report);
        });
    });
}

fn wide_tree_update_cycle(c: &mut Criterion) {
    let mount = mount_batch();
    let update = update_batch();
    let unmount = unmount_batch();
    c.bench_function("wide_tree_update_cycle", |b| {
        b.iter(|| {
            let mut registry = DescriptorRegistry::new()
                .with_logger(Some(Logger::new(NullSink)));
            registry.apply_mutations(&mount).expect("mount");
            registry.apply_mutations(black_box(&update)).expect("update");
            registry.apply_mutations(black_box(&unmount)).expect("unmount");
        });
    });
}

fn instance_shadow_tree_drain(c: &mut Criterion) {
    let mount = mount_batch();
    let unmount = unmount_batch();
    c.bench_function("instance_shadow_tree_drain", |b| {
        b.iter(|| {
            let boundary = RecordingBoundary::new();
            let config = InstanceConfig::default().with_shadow_tree_capacity(4);
            let mut registry = InstanceRegistry::new(Arc::new(boundary.clone()), config);
            let instance = registry.create_instance(|_| Vec::new()).expect("instance");
            let id: InstanceId = instance.id();

            boundary
                .push_mutations(id, mount.clone())
                .expect("subscribed")
                .expect("queued");
            boundary
                .push_mutations(id, unmount.clone())
                .expect("subscribed")
                .expect("queued");
            let processed = instance.process_shadow_tree_events().expect("drain");
            black_box(processed);
        });
    });
}

criterion_group!(
    benches,
    wide_tree_mount,
    wide_tree_update_cycle,
    instance_shadow_tree_drain
);
criterion_main!(benches);
