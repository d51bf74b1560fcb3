//! Tests for the node cost model

use nodequeue::config::JobConfig;
use nodequeue::core::{resource_cost, Footprint, PoolKind, ResourceCost, SchedulerError};

fn cluster() -> JobConfig {
    JobConfig {
        nnodes: 4,
        cpus_per_node: 40,
        gpus_per_node: 4,
        node_splittable: true,
        ..JobConfig::default()
    }
}

fn footprint(nprocs: u64) -> Footprint {
    Footprint {
        nprocs,
        cpus_per_proc: 1,
        gpus_per_proc: 0,
        mps: None,
        multiprocessing: false,
    }
}

#[test]
fn test_ranks_packed_onto_partial_node() {
    let cost = resource_cost(&footprint(10), &cluster()).unwrap();
    assert_eq!(cost, ResourceCost::node_fraction(1, 4));
    assert_eq!(cost.pool(), PoolKind::Nodes);
    assert_eq!(cost.to_string(), "1/4 nodes");
}

#[test]
fn test_cost_can_exceed_capacity() {
    let cost = resource_cost(&footprint(400), &cluster()).unwrap();
    assert_eq!(cost, ResourceCost::nodes(10));
}

#[test]
fn test_whole_nodes_when_not_splittable() {
    let job = JobConfig {
        node_splittable: false,
        ..cluster()
    };
    assert_eq!(resource_cost(&footprint(1), &job).unwrap(), ResourceCost::nodes(1));
    assert_eq!(resource_cost(&footprint(41), &job).unwrap(), ResourceCost::nodes(2));
}

#[test]
fn test_workers_ignore_node_shape() {
    let fp = Footprint {
        cpus_per_proc: 40,
        gpus_per_proc: 4,
        multiprocessing: true,
        ..footprint(3)
    };
    let cost = resource_cost(&fp, &cluster()).unwrap();
    assert_eq!(cost, ResourceCost::Workers(3));
    assert_eq!(cost.pool(), PoolKind::Workers);
}

#[test]
fn test_rejects_zero_processes() {
    let err = resource_cost(&footprint(0), &cluster()).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTask(_)));
}

#[test]
fn test_rejects_gpus_without_gpu_nodes() {
    let job = JobConfig {
        gpus_per_node: 0,
        ..cluster()
    };
    let fp = Footprint {
        gpus_per_proc: 1,
        ..footprint(2)
    };
    assert!(matches!(resource_cost(&fp, &job), Err(SchedulerError::InvalidTask(_))));
}

#[test]
fn test_rejects_zero_mps() {
    let fp = Footprint {
        mps: Some(0),
        ..footprint(2)
    };
    assert!(matches!(resource_cost(&fp, &cluster()), Err(SchedulerError::InvalidTask(_))));
}
