//! Multi-node scenarios against the in-process ensemble.

use std::time::Duration;

use subreg::{
    ChannelSink, CodecKind, Completion, DispatchMode, RegistrationInfo, RegistrationUpdate,
    RegistryBuilder, RegistryConfig, RegistryError, SubsRegistry,
};
use subreg_coord::{MemoryClient, MemoryEnsemble, StorePath};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

struct Node {
    client: MemoryClient,
    registry: SubsRegistry,
    updates: mpsc::UnboundedReceiver<RegistrationUpdate>,
}

fn start(ensemble: &MemoryEnsemble, node_id: &str) -> Node {
    start_with(ensemble, RegistryConfig::with_node_id(node_id))
}

fn start_with(ensemble: &MemoryEnsemble, config: RegistryConfig) -> Node {
    init_tracing();
    let client = ensemble.connect();
    let (sink, updates) = ChannelSink::new();
    let registry = RegistryBuilder::new(client.clone(), sink)
        .config(config)
        .build()
        .unwrap();
    Node {
        client,
        registry,
        updates,
    }
}

fn cluster(node: &str, seq: u64, payload: &'static str) -> RegistrationInfo {
    RegistrationInfo::cluster(node, seq, payload).unwrap()
}

fn local(node: &str, seq: u64) -> RegistrationInfo {
    RegistrationInfo::local(node, seq, "local").unwrap()
}

/// Wait for an update of `address` that satisfies `accept`.
async fn wait_for(
    updates: &mut mpsc::UnboundedReceiver<RegistrationUpdate>,
    address: &str,
    accept: impl Fn(&[RegistrationInfo]) -> bool,
) -> Vec<RegistrationInfo> {
    timeout(WAIT, async {
        loop {
            let update = updates.recv().await.expect("sink channel closed");
            if update.address == address && accept(&update.registrations) {
                return update.registrations;
            }
        }
    })
    .await
    .expect("timed out waiting for registration update")
}

async fn reconnect_and_recover(node: &Node) -> subreg::RecoveryReport {
    let mut reports = node.registry.recovery_reports();
    node.client.reconnect().unwrap();
    timeout(WAIT, reports.changed())
        .await
        .expect("timed out waiting for recovery")
        .unwrap();
    let report = reports.borrow().clone();
    report.expect("recovery report")
}

#[tokio::test]
async fn get_merges_local_and_remote() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let mut b = start(&ensemble, "B");

    for seq in 1..=3 {
        a.registry.put_async("svc", cluster("A", seq, "r")).await.unwrap();
    }
    for seq in 1..=2 {
        b.registry.put_async("svc", local("B", seq)).await.unwrap();
    }
    wait_for(&mut b.updates, "svc", |regs| regs.len() == 5).await;

    let merged = b.registry.get("svc").unwrap();
    assert_eq!(merged.len(), 5);
    assert!(merged[..2].iter().all(|r| r.is_local_only()));
    assert!(merged[2..].iter().all(|r| r.node_id() == "A"));
    for seq in 1..=3 {
        assert!(merged.contains(&cluster("A", seq, "")));
    }

    // A never sees B's local-only registrations.
    assert_eq!(a.registry.get("svc").unwrap().len(), 3);
}

#[tokio::test]
async fn absent_address_is_an_empty_list() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    assert_eq!(a.registry.get("svc.none").unwrap(), Vec::new());
}

#[tokio::test]
async fn remote_put_reaches_other_sinks() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let mut b = start(&ensemble, "B");

    let record = cluster("A", 1, "p1");
    a.registry.put_async("news", record.clone()).await.unwrap();

    let regs = wait_for(&mut b.updates, "news", |regs| !regs.is_empty()).await;
    assert_eq!(regs, vec![record.clone()]);
    assert_eq!(regs[0].payload().as_ref(), b"p1");

    a.registry.remove_async("news", record).await.unwrap();
    wait_for(&mut b.updates, "news", |regs| regs.is_empty()).await;
    assert!(b.registry.get("news").unwrap().is_empty());
}

#[tokio::test]
async fn session_expiry_removes_a_nodes_registrations_elsewhere() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let mut b = start(&ensemble, "B");

    a.registry.put_async("svc", cluster("A", 1, "")).await.unwrap();
    wait_for(&mut b.updates, "svc", |regs| regs.len() == 1).await;

    a.client.suspend();
    a.client.expire_session();

    wait_for(&mut b.updates, "svc", |regs| regs.is_empty()).await;
    // A still intends to be registered.
    assert_eq!(a.registry.ledger_snapshot().len(), 1);
}

#[tokio::test]
async fn reconnection_replays_every_ledger_entry() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");

    let addresses = ["a1", "a2", "a3"];
    let mut written = 0;
    for (i, address) in addresses.iter().enumerate() {
        for seq in 0..=i as u64 {
            a.registry
                .put_async(address, cluster("A", seq, "p"))
                .await
                .unwrap();
            written += 1;
        }
    }
    let mut before = a.registry.ledger_snapshot();
    assert_eq!(before.len(), written);

    a.client.reset_write_log();
    a.client.suspend();
    let report = reconnect_and_recover(&a).await;

    assert!(report.is_success());
    assert_eq!(report.attempted, written);
    assert_eq!(report.succeeded, written);
    assert_eq!(a.client.write_count(), written);

    let mut after = a.registry.ledger_snapshot();
    before.sort_by_key(|(address, r)| (address.clone(), r.seq()));
    after.sort_by_key(|(address, r)| (address.clone(), r.seq()));
    assert_eq!(before, after);
}

#[tokio::test]
async fn one_failed_replay_keeps_the_rest() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let mut b = start(&ensemble, "B");

    for seq in 1..=4 {
        a.registry.put_async("svc", cluster("A", seq, "")).await.unwrap();
    }
    wait_for(&mut b.updates, "svc", |regs| regs.len() == 4).await;

    a.client.suspend();
    a.client.expire_session();
    wait_for(&mut b.updates, "svc", |regs| regs.is_empty()).await;

    a.client.fail_next_writes(1);
    let report = reconnect_and_recover(&a).await;

    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].error, RegistryError::Store(_)));
    assert_eq!(b.registry.get("svc").unwrap().len(), 3);
    // Nothing is rolled back or dropped from the ledger.
    assert_eq!(a.registry.ledger_snapshot().len(), 4);

    let retry = a.registry.recover().await.unwrap();
    assert!(retry.is_success());
    wait_for(&mut b.updates, "svc", |regs| regs.len() == 4).await;
}

#[tokio::test]
async fn recovery_restores_the_latest_payload() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    a.registry.put_async("svc", cluster("A", 1, "p1")).await.unwrap();
    a.registry.put_async("svc", cluster("A", 1, "p2")).await.unwrap();

    let ledger = a.registry.ledger_snapshot();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].1.payload().as_ref(), b"p2");

    a.client.suspend();
    a.client.expire_session();
    let leaf = StorePath::parse("/__vertx.subs/svc/A-1").unwrap();
    assert!(ensemble.data(&leaf).is_none());

    let report = reconnect_and_recover(&a).await;
    assert_eq!(report.succeeded, 1);
    let restored = a.registry.get("svc").unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].payload().as_ref(), b"p2");
}

#[tokio::test]
async fn removal_during_recovery_stays_removed() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let record = cluster("A", 1, "p");
    a.registry.put_async("svc", record.clone()).await.unwrap();

    let (removed, report) = tokio::join!(
        a.registry.remove_async("svc", record),
        a.registry.recover()
    );
    removed.unwrap();
    let report = report.unwrap();
    assert_eq!(report.attempted, 1);
    assert!(report.is_success());
    assert_eq!(report.succeeded + report.withdrawn, 1);

    let leaf = StorePath::parse("/__vertx.subs/svc/A-1").unwrap();
    assert!(ensemble.data(&leaf).is_none());
    assert!(a.registry.ledger_snapshot().is_empty());
    assert!(a.registry.get("svc").unwrap().is_empty());
}

#[tokio::test]
async fn restored_leaves_belong_to_the_new_session() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    a.registry.put_async("svc", cluster("A", 1, "")).await.unwrap();

    a.client.suspend();
    a.client.expire_session();
    assert_eq!(ensemble.node_count(), 0);
    reconnect_and_recover(&a).await;

    let leaf = StorePath::parse("/__vertx.subs/svc/A-1").unwrap();
    assert!(ensemble.is_ephemeral(&leaf));

    // A second expiry removes the restored leaf again.
    a.client.expire_session();
    assert!(ensemble.data(&leaf).is_none());
}

// put("svc.foo", {A, 1, cluster, p1}), disconnect, reconnect: still exactly
// one record, equal to the original.
#[tokio::test]
async fn replayed_registration_is_an_idempotent_overwrite() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let record = cluster("A", 1, "p1");

    let (completion, rx) = Completion::channel();
    a.registry.put("svc.foo", record.clone(), completion);
    Completion::wait(rx, WAIT).await.unwrap();
    assert_eq!(
        a.registry.ledger_snapshot(),
        vec![("svc.foo".to_string(), record.clone())]
    );

    a.client.reset_write_log();
    a.client.suspend();
    reconnect_and_recover(&a).await;

    let leaf = StorePath::parse("/__vertx.subs/svc.foo/A-1").unwrap();
    assert_eq!(a.client.written_paths(), vec![leaf]);
    let regs = a.registry.get("svc.foo").unwrap();
    assert_eq!(regs, vec![record]);
    assert_eq!(regs[0].payload().as_ref(), b"p1");
}

// put("svc.bar", {A, 1, local}) then get: one record, no store traffic, and
// the sink ran before the completion.
#[tokio::test]
async fn local_put_is_visible_without_the_store() {
    let ensemble = MemoryEnsemble::new();
    let mut a = start(&ensemble, "A");
    let record = local("A", 1);

    let completed_ok = std::sync::Arc::new(parking_lot::Mutex::new(None));
    let observed = std::sync::Arc::clone(&completed_ok);
    let (tx, rx) = tokio::sync::oneshot::channel();
    a.registry.put(
        "svc.bar",
        record.clone(),
        Completion::new(move |result| {
            *observed.lock() = Some(result.is_ok());
            let _ = tx.send(());
        }),
    );

    let update = a.updates.try_recv().expect("sink invoked synchronously");
    assert_eq!(update.registrations, vec![record.clone()]);
    rx.await.unwrap();
    assert_eq!(*completed_ok.lock(), Some(true));

    assert_eq!(a.registry.get("svc.bar").unwrap(), vec![record]);
    assert_eq!(a.client.write_count(), 0);
    assert_eq!(ensemble.node_count(), 0);
}

#[tokio::test]
async fn completion_fires_when_store_is_unreachable() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    a.client.suspend();

    let (completion, rx) = Completion::channel();
    a.registry.put("svc", cluster("A", 1, ""), completion);
    let result = Completion::wait(rx, WAIT).await;
    assert!(matches!(
        result,
        Err(RegistryError::Store(subreg_coord::Error::ConnectionLoss))
    ));
    assert!(a.registry.ledger_snapshot().is_empty());
}

#[tokio::test]
async fn guaranteed_delete_lands_after_reconnect() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let record = cluster("A", 1, "");
    a.registry.put_async("svc", record.clone()).await.unwrap();

    a.client.suspend();
    let result = a.registry.remove_async("svc", record).await;
    assert!(result.is_err());
    assert_eq!(a.client.pending_delete_count(), 1);

    reconnect_and_recover(&a).await;
    assert_eq!(a.client.pending_delete_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_puts_on_one_address() {
    let ensemble = MemoryEnsemble::new();
    let a = std::sync::Arc::new(start(&ensemble, "A").registry);

    let mut tasks = tokio::task::JoinSet::new();
    for seq in 0..32u64 {
        let registry = std::sync::Arc::clone(&a);
        tasks.spawn(async move {
            let record = if seq % 2 == 0 {
                local("A", seq)
            } else {
                cluster("A", seq, "")
            };
            registry.put_async("hot", record).await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(a.get("hot").unwrap().len(), 32);
    assert_eq!(a.ledger_snapshot().len(), 16);
    assert_eq!(a.local_snapshot().len(), 16);
}

#[tokio::test]
async fn json_codec_and_custom_root_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("subreg.json");
    std::fs::write(
        &path,
        r#"{ "node_id": "A", "root": "/apps/subs", "codec": "json", "dispatch": "inline" }"#,
    )
    .unwrap();
    let config = RegistryConfig::from_json_file(&path).unwrap();
    assert_eq!(config.codec, CodecKind::Json);
    assert_eq!(config.dispatch, DispatchMode::Inline);

    let ensemble = MemoryEnsemble::new();
    let a = start_with(&ensemble, config);
    let record = cluster("A", 9, "j");
    a.registry.put_async("svc", record.clone()).await.unwrap();

    let leaf = StorePath::parse("/apps/subs/svc/A-9").unwrap();
    let stored = ensemble.data(&leaf).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&stored).unwrap();
    assert_eq!(json["node_id"], "A");
    assert_eq!(a.registry.get("svc").unwrap(), vec![record]);
}

#[tokio::test]
async fn close_stops_notifications() {
    let ensemble = MemoryEnsemble::new();
    let a = start(&ensemble, "A");
    let mut b = start(&ensemble, "B");

    b.registry.close();
    a.registry.put_async("svc", cluster("A", 1, "")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(b.updates.try_recv().is_err());
    assert!(matches!(b.registry.get("svc"), Err(RegistryError::Closed)));
}
