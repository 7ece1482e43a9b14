mod common;

use std::sync::Arc;

use waypack::Arg;
use wayproto::core_protocol::display;
use wayproto::core_protocol::registry;
use wayrun::ClientMap;
use wayrun::Session;
use wayrun::SessionConfig;
use wayrun::SessionState;

use common::factory;
use common::id;
use common::item;
use common::labels;
use common::Log;
use common::Peer;

// --- Shared definitions, separate sessions ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_run_concurrently() -> anyhow::Result<()> {
    common::init_tracing();
    let registry = common::registry()?;
    let log = Log::default();
    let globals = Arc::new(common::globals(&log));
    let clients = Arc::new(ClientMap::new());

    let mut tasks = Vec::new();
    for n in 0..16u32 {
        let registry = Arc::clone(&registry);
        let globals = Arc::clone(&globals);
        let clients = Arc::clone(&clients);
        tasks.push(tokio::spawn(async move {
            let session = Session::new(Arc::clone(&registry), globals, SessionConfig::default())?;
            let client = clients.insert(session);
            let mut peer = Peer::new(registry);

            let mut bytes = peer.encode(1, display::GET_REGISTRY, vec![Arg::NewId(id(2))]);
            let bind = Arg::GenericNewId { interface: "ts_factory".into(), version: 2, id: id(3) };
            bytes.extend(peer.encode(2, registry::BIND, vec![Arg::Uint(1), bind]));
            bytes.extend(peer.encode(3, factory::CREATE_ITEM, vec![Arg::NewId(id(4))]));
            bytes.extend(peer.encode(4, item::PING, vec![Arg::Uint(n)]));

            let output = clients
                .with(client, |session| -> anyhow::Result<Vec<u8>> {
                    session.feed(&bytes)?;
                    Ok(session.drain_outbound())
                })
                .ok_or_else(|| anyhow::anyhow!("{client} vanished"))??;
            tokio::task::yield_now().await;

            let events = peer.decode(&output, Vec::new())?;
            anyhow::ensure!(
                labels(&events) == ["wl_registry.global", "ts_factory.ready", "ts_item.pong"],
                "unexpected events {:?}",
                labels(&events)
            );
            anyhow::ensure!(events[2].uint(0) == n, "pong carried the wrong serial");
            Ok::<_, anyhow::Error>(client)
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await??);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(clients.len(), 16);

    // Every session created its own item; ids only mean something per client.
    let items = log.lock().unwrap().iter().filter(|e| *e == "create_item 4").count();
    assert_eq!(items, 16);
    Ok(())
}

#[tokio::test]
async fn test_client_map_reaps_closed_sessions() -> anyhow::Result<()> {
    common::init_tracing();
    let registry = common::registry()?;
    let log = Log::default();
    let globals = Arc::new(common::globals(&log));
    let clients = ClientMap::new();

    let config = SessionConfig::default();
    let open = || Session::new(Arc::clone(&registry), Arc::clone(&globals), config.clone());
    let healthy = clients.insert(open()?);
    let broken = clients.insert(open()?);
    assert_ne!(healthy, broken);

    let mut peer = Peer::new(Arc::clone(&registry));
    let bytes = peer.encode(77, 0, vec![]);
    let state = clients
        .with(broken, |session| {
            assert!(session.feed(&bytes).is_err());
            session.drain_outbound();
            session.state()
        })
        .unwrap();
    assert_eq!(state, SessionState::Closed);

    assert_eq!(clients.reap(), [broken]);
    assert_eq!(clients.ids(), [healthy]);
    assert!(clients.with(broken, |s| s.state()).is_none());

    let session = clients.remove(healthy).unwrap();
    assert_eq!(session.state(), SessionState::Closing);
    assert!(clients.is_empty());
    Ok(())
}
