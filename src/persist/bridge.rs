// src/persist/bridge.rs

//! One-way mirror from in-memory graphs to records.
//!
//! Sentinels never get a record; edges into `start` or out to `end` simply
//! vanish from the id lists.

use std::collections::HashMap;

use tracing::error;

use crate::dag::{TaskGraph, TaskNode};
use crate::persist::records::{JobRecord, TaskRecord};
use crate::persist::store::RecordStore;
use crate::types::{JobId, TaskId};

/// Position of every node in the graph's dependency order.
pub fn dependency_order(graph: &TaskGraph) -> HashMap<TaskId, usize> {
    graph
        .task_ids_in_order()
        .unwrap_or_else(|_| graph.task_ids())
        .into_iter()
        .enumerate()
        .map(|(pos, id)| (id, pos))
        .collect()
}

pub fn task_record(graph: &TaskGraph, node: &TaskNode, order: usize) -> TaskRecord {
    let id = node.id();
    TaskRecord {
        id,
        name: node.name().to_string(),
        status: node.status(),
        guard: node.guard(),
        fail_reason: node.fail_reason().map(str::to_string),
        queued_at: node.queued_at(),
        started_at: node.started_at(),
        completed_at: node.completed_at(),
        dependency_order: order,
        predecessor_ids: graph.predecessors(id),
        successor_ids: graph.successors(id),
        producer_id: node.producer(),
    }
}

/// Records for every work node, in dependency order.
pub fn task_records(graph: &TaskGraph) -> Vec<TaskRecord> {
    let order = dependency_order(graph);
    let mut records: Vec<TaskRecord> = graph
        .nodes()
        .map(|n| task_record(graph, n, order.get(&n.id()).copied().unwrap_or(0)))
        .collect();
    records.sort_by_key(|r| r.dependency_order);
    records
}

/// Write a job record; failures are logged, never returned.
pub fn store_job(store: &dyn RecordStore, record: &JobRecord) {
    if let Err(err) = store.save_job(record) {
        error!(job = %record.id, error = %err, "failed to persist job record");
    }
}

/// Write task records; failures are logged, never returned.
pub fn store_tasks(store: &dyn RecordStore, job: JobId, records: &[TaskRecord]) {
    for record in records {
        if let Err(err) = store.save_task(job, record) {
            error!(
                job = %job,
                task = %record.name,
                error = %err,
                "failed to persist task record"
            );
        }
    }
}
