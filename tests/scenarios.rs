use std::collections::HashMap;
use std::sync::Arc;

use replistate::core::StateCore;
use replistate::dump::InMemoryValueStorage;
use replistate::entry::LogIndex;
use replistate::follower::{FollowerState, SnapshotSource};
use replistate::leader::LeaderState;
use replistate::log::InMemoryLog;
use replistate::options::WriteOptions;
use replistate::{Error, LogId, Result};

async fn new_leader() -> (Arc<LeaderState>, Arc<InMemoryLog>) {
    let log = Arc::new(InMemoryLog::new());
    let core = StateCore::construct(LogId::new(), Arc::new(InMemoryValueStorage::new()), 1000)
        .await
        .unwrap();
    let leader = LeaderState::new(core, log.clone());
    leader.start();
    (leader, log)
}

fn applied(options: WriteOptions) -> WriteOptions {
    WriteOptions { wait_for_applied: true, ..options }
}

#[tokio::test]
async fn scenario_1_sequential_write_read() {
    let (leader, _log) = new_leader().await;

    let index = leader
        .set([("x".to_string(), "1".to_string())].into(), applied(WriteOptions::default()))
        .await
        .unwrap();
    assert_eq!(index, LogIndex(1));
    assert_eq!(leader.get("x", index).await.unwrap(), Some("1".to_string()));

    let index = leader
        .remove(vec!["x".to_string()], applied(WriteOptions::default()))
        .await
        .unwrap();
    assert_eq!(index, LogIndex(2));
    assert_eq!(leader.get("x", index).await.unwrap(), None);
}

#[tokio::test]
async fn scenario_2_batch_insert_ordering() {
    let (leader, _log) = new_leader().await;

    let first = leader
        .set(
            [("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())].into(),
            applied(WriteOptions::default()),
        )
        .await
        .unwrap();
    assert_eq!(first, LogIndex(1));

    let second = leader
        .set([("a".to_string(), "10".to_string())].into(), applied(WriteOptions::default()))
        .await
        .unwrap();
    assert_eq!(second, LogIndex(2));

    let snapshot = leader.get_snapshot(second).await.unwrap();
    let expected: HashMap<String, String> =
        [("a".to_string(), "10".to_string()), ("b".to_string(), "2".to_string())].into();
    assert_eq!(snapshot, expected);
}

#[tokio::test]
async fn scenario_3_cas_success_then_fail() {
    let (leader, _log) = new_leader().await;

    let seed = leader
        .set([("k".to_string(), "0".to_string())].into(), applied(WriteOptions::default()))
        .await
        .unwrap();
    leader.wait_for_applied(seed).await.unwrap();

    let (first, second) = tokio::join!(
        leader.compare_exchange("k".to_string(), "0".to_string(), "A".to_string(), applied(WriteOptions::default())),
        leader.compare_exchange("k".to_string(), "0".to_string(), "B".to_string(), applied(WriteOptions::default())),
    );

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let failures = outcomes
        .iter()
        .filter(|r| matches!(r, Err(Error::PreconditionFailed)))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(failures, 1);

    let winner_index = *outcomes.iter().find_map(|r| r.as_ref().ok()).unwrap();
    let winner_value = if first.is_ok() { "A" } else { "B" };
    assert_eq!(leader.get("k", winner_index).await.unwrap(), Some(winner_value.to_string()));
}

#[tokio::test]
async fn scenario_4_concurrent_writers_last_index_wins() {
    let (leader, _log) = new_leader().await;

    let mut handles = Vec::new();
    for i in 0..200 {
        let leader_a = leader.clone();
        let leader_b = leader.clone();
        handles.push(tokio::spawn(async move {
            leader_a
                .set([(i.to_string(), "A".to_string())].into(), WriteOptions::default())
                .await
        }));
        handles.push(tokio::spawn(async move {
            leader_b
                .set([(i.to_string(), "B".to_string())].into(), WriteOptions::default())
                .await
        }));
    }

    let mut last_index = LogIndex::ZERO;
    for handle in handles {
        let index = handle.await.unwrap().unwrap();
        if index > last_index {
            last_index = index;
        }
    }

    leader.wait_for_applied(last_index).await.unwrap();
    let snapshot = leader.get_snapshot(last_index).await.unwrap();
    assert_eq!(snapshot.len(), 200);
}

struct LeaderSnapshotSource(Arc<LeaderState>);

#[async_trait::async_trait]
impl SnapshotSource for LeaderSnapshotSource {
    async fn get_snapshot(&self, wait_for_index: LogIndex) -> Result<HashMap<String, String>> {
        self.0.get_snapshot(wait_for_index).await
    }
}

#[tokio::test]
async fn scenario_5_follower_bootstrap_from_snapshot() {
    let (leader, _log) = new_leader().await;
    for i in 1..=100u64 {
        leader
            .set([(i.to_string(), "seed".to_string())].into(), WriteOptions::default())
            .await
            .unwrap();
    }
    leader.wait_for_applied(LogIndex(100)).await.unwrap();
    let leader_snapshot = leader.get_snapshot(LogIndex(100)).await.unwrap();

    let follower_log = Arc::new(InMemoryLog::new());
    let follower_core = StateCore::construct(LogId::new(), Arc::new(InMemoryValueStorage::new()), 1000)
        .await
        .unwrap();
    let follower = FollowerState::new(follower_core, follower_log);

    let source = LeaderSnapshotSource(leader.clone());
    follower.acquire_snapshot(&source, LogIndex(50)).await.unwrap();

    assert_eq!(follower.get_many(&[]).unwrap().len(), 0);
    let bootstrapped = follower.get("1").unwrap();
    assert_eq!(bootstrapped, Some("seed".to_string()));
    assert_eq!(follower.get("100").unwrap(), Some("seed".to_string()));

    let full = HashMap::from_iter((1..=100u64).map(|i| i.to_string()).map(|k| (k, "seed".to_string())));
    let mut merged_check = HashMap::new();
    for (k, v) in &leader_snapshot {
        merged_check.insert(k.clone(), v.clone());
    }
    assert_eq!(merged_check, full);
}

#[tokio::test]
async fn scenario_6_resign_fails_pending_wait_and_subsequent_writes() {
    let (leader, _log) = new_leader().await;
    leader
        .set([("a".to_string(), "1".to_string())].into(), applied(WriteOptions::default()))
        .await
        .unwrap();

    let waiter = {
        let leader = leader.clone();
        tokio::spawn(async move { leader.wait_for_applied(LogIndex(100)).await })
    };
    tokio::task::yield_now().await;

    leader.resign().unwrap();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::ResignedDuringOperation { .. })));

    let after_resign = leader
        .set([("b".to_string(), "2".to_string())].into(), WriteOptions::default())
        .await;
    assert!(matches!(after_resign, Err(Error::NotLeader { .. })));
}
