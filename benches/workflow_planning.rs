//! Benchmarks for execution planning and bus publish/consume throughput.

use std::sync::Arc;
use std::time::Duration;

use convoy::adapters::sqlite::{create_migrated_test_pool, SqliteQueueStore};
use convoy::domain::models::{BusConfig, DurationEstimates, Task, TaskPriority};
use convoy::services::{MessageBus, WorkflowOptimizer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use uuid::Uuid;

/// Layered graph: `width` tasks per layer, each depending on two tasks of the previous layer.
fn layered_tasks(layers: usize, width: usize) -> Vec<Task> {
    let agents = ["build", "test", "lint", "docs"];
    let mut tasks: Vec<Task> = Vec::with_capacity(layers * width);
    let mut previous: Vec<Uuid> = Vec::new();

    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for i in 0..width {
            let mut task = Task::new(agents[i % agents.len()], json!({"layer": layer, "i": i}));
            if !previous.is_empty() {
                task = task
                    .with_dependency(previous[i % previous.len()])
                    .with_dependency(previous[(i + 1) % previous.len()]);
            }
            current.push(task.id);
            tasks.push(task);
        }
        previous = current;
    }
    tasks
}

fn bench_create_execution_plan(c: &mut Criterion) {
    let optimizer = WorkflowOptimizer::new();
    let estimates = DurationEstimates::new(60.0)
        .with_estimate("build", 120.0)
        .with_estimate("test", 45.0);

    let mut group = c.benchmark_group("create_execution_plan");
    for (layers, width) in [(5, 10), (10, 50), (20, 100)] {
        let tasks = layered_tasks(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(tasks.len()),
            &tasks,
            |b, tasks| {
                b.iter(|| {
                    optimizer
                        .create_execution_plan(black_box(tasks), &estimates)
                        .map(|plan| plan.total_batches())
                        .unwrap_or_default()
                });
            },
        );
    }
    group.finish();
}

fn bench_publish_consume(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let priorities = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Critical,
    ];

    c.bench_function("publish_consume_100", |b| {
        b.to_async(&runtime).iter(|| async {
            let pool = create_migrated_test_pool().await.unwrap();
            let store = Arc::new(SqliteQueueStore::new(pool));
            let bus = MessageBus::open(store, BusConfig::default()).await.unwrap();

            for i in 0..100 {
                let task = Task::new("build", json!(i)).with_priority(priorities[i % priorities.len()]);
                bus.publish("agent.build", task).await.unwrap();
            }
            let mut drained = 0;
            while bus.consume("agent.build", Duration::ZERO).await.is_some() {
                drained += 1;
            }
            black_box(drained)
        });
    });
}

criterion_group!(benches, bench_create_execution_plan, bench_publish_consume);
criterion_main!(benches);
