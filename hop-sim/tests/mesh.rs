use std::collections::HashSet;
use std::time::Duration;

use hop_core::{Phase, WatchdogConfig};
use hop_sim::{Config, Mesh, Scenario};

const ROUNDS: usize = 50;

async fn mesh(names: &[&str], links: &[(&str, &str)], config: WatchdogConfig) -> Mesh {
    let mut mesh = Mesh::new(config);
    for name in names {
        mesh.add_node(name, &name.to_uppercase()).await.unwrap();
    }
    for (a, b) in links {
        mesh.connect(a, b).unwrap();
    }
    mesh
}

async fn discovered(names: &[&str], links: &[(&str, &str)]) -> Mesh {
    let mut m = mesh(names, links, WatchdogConfig::default()).await;
    m.announce().await.unwrap();
    let stats = m.run_until_idle(ROUNDS).await.unwrap();
    assert!(stats.settled);
    m
}

#[tokio::test]
async fn two_nodes_discover_each_other() {
    let mut m = mesh(&["a", "b"], &[("a", "b")], WatchdogConfig::default()).await;
    let mut finished = m.handle("a").unwrap().watch_discovery();
    m.announce().await.unwrap();
    let stats = m.run_until_idle(ROUNDS).await.unwrap();

    assert!(stats.settled);
    assert_eq!(stats.exchanges, 1);
    let (a, b) = (m.id("a").unwrap(), m.id("b").unwrap());
    assert_eq!(m.handle("a").unwrap().reachable_peers(), HashSet::from([b]));
    assert_eq!(m.handle("b").unwrap().reachable_peers(), HashSet::from([a]));
    assert_eq!(finished.try_recv().unwrap(), HashSet::from([b]));
    assert_eq!(m.phase("a"), Some(Phase::Docked));
    assert_eq!(m.phase("b"), Some(Phase::Docked));

    let b_address = m.node("b").unwrap().address().to_owned();
    assert_eq!(m.node("a").unwrap().watchdog().address_of(&b), Some(b_address.as_str()));
}

#[tokio::test]
async fn direct_message_is_delivered() {
    let mut m = discovered(&["a", "b"], &[("a", "b")]).await;
    let mut available = m.handle("b").unwrap().listen(m.id("a").unwrap());

    assert_eq!(m.send("a", "b", "hi").unwrap(), 1);
    let stats = m.run_until_idle(ROUNDS).await.unwrap();

    assert!(stats.settled);
    assert_eq!(stats.exchanges, 1);
    assert_eq!(stats.invitations, 1);
    assert_eq!(available.try_recv().unwrap(), m.id("a").unwrap());
    assert_eq!(m.receive("b", "a").unwrap(), Some(b"hi".to_vec()));
    assert_eq!(m.receive("b", "a").unwrap(), None);
    assert_eq!(m.phase("a"), Some(Phase::Docked));
    assert_eq!(m.phase("b"), Some(Phase::Docked));
}

#[tokio::test]
async fn replies_travel_back() {
    let mut m = discovered(&["a", "b"], &[("a", "b")]).await;
    m.send("a", "b", "ping").unwrap();
    m.run_until_idle(ROUNDS).await.unwrap();
    assert_eq!(m.receive("b", "a").unwrap(), Some(b"ping".to_vec()));

    m.send("b", "a", "pong").unwrap();
    m.run_until_idle(ROUNDS).await.unwrap();
    assert_eq!(m.receive("a", "b").unwrap(), Some(b"pong".to_vec()));
}

#[tokio::test]
async fn message_is_relayed_along_a_line() {
    let mut m = discovered(&["a", "b", "c"], &[("a", "b"), ("b", "c")]).await;
    let c = m.id("c").unwrap();
    assert!(!m.handle("a").unwrap().reachable_peers().contains(&c));

    // Not directly reachable, so it is flooded to the only neighbour.
    assert_eq!(m.send("a", "c", "over the hill").unwrap(), 1);
    let stats = m.run_until_idle(ROUNDS).await.unwrap();

    assert!(stats.settled);
    assert_eq!(stats.exchanges, 2);
    assert_eq!(m.receive("c", "a").unwrap(), Some(b"over the hill".to_vec()));
    assert_eq!(m.receive("b", "a").unwrap(), None);
    assert_eq!(m.handle("b").unwrap().queued_for(&c), 0);
}

#[tokio::test]
async fn star_swaps_messages_through_the_hub() {
    let mut m = discovered(&["h", "x", "y", "z"], &[("h", "x"), ("h", "y"), ("h", "z")]).await;
    assert_eq!(m.handle("h").unwrap().reachable_peers().len(), 3);

    m.send("x", "z", "to z").unwrap();
    m.send("z", "x", "to x").unwrap();
    let stats = m.run_until_idle(ROUNDS).await.unwrap();

    assert!(stats.settled);
    assert_eq!(m.receive("z", "x").unwrap(), Some(b"to z".to_vec()));
    assert_eq!(m.receive("x", "z").unwrap(), Some(b"to x".to_vec()));
    assert_eq!(m.receive("y", "x").unwrap(), None);
}

#[tokio::test]
async fn flood_never_returns_to_the_sender() {
    let mut m = discovered(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "d")]).await;
    let (a, c) = (m.id("a").unwrap(), m.id("c").unwrap());
    assert_eq!(m.send("a", "d", "far end").unwrap(), 1);

    // One round: a hands the packet to b, which floods it onwards.
    let stats = m.run_until_idle(1).await.unwrap();
    assert_eq!(stats.exchanges, 1);
    let b = m.handle("b").unwrap();
    assert_eq!(b.queued_for(&c), 1);
    assert_eq!(b.queued_for(&a), 0);

    let stats = m.run_until_idle(ROUNDS).await.unwrap();
    assert!(stats.settled);
    assert_eq!(m.receive("d", "a").unwrap(), Some(b"far end".to_vec()));
    assert_eq!(m.receive("d", "a").unwrap(), None);
    assert_eq!(b.queued_for(&a), 0);
    assert_eq!(m.handle("c").unwrap().queued_for(&b.id()), 0);
}

#[tokio::test]
async fn request_cycle_around_a_triangle_delivers() {
    let mut m = discovered(&["n0", "n1", "n2"], &[("n0", "n1"), ("n1", "n2"), ("n2", "n0")]).await;
    m.send("n0", "n1", "0 to 1").unwrap();
    m.send("n1", "n2", "1 to 2").unwrap();
    m.send("n2", "n0", "2 to 0").unwrap();
    let stats = m.run_until_idle(100).await.unwrap();

    assert!(stats.settled);
    assert_eq!(stats.aborted, 0);
    assert_eq!(m.receive("n1", "n0").unwrap(), Some(b"0 to 1".to_vec()));
    assert_eq!(m.receive("n2", "n1").unwrap(), Some(b"1 to 2".to_vec()));
    assert_eq!(m.receive("n0", "n2").unwrap(), Some(b"2 to 0".to_vec()));
    for name in ["n0", "n1", "n2"] {
        assert_eq!(m.phase(name), Some(Phase::Docked));
    }
}

#[tokio::test]
async fn full_mesh_delivers_all_to_all() {
    let names = ["a", "b", "c", "d", "e"];
    let mut links = Vec::new();
    for (i, x) in names.iter().enumerate() {
        for y in &names[i + 1..] {
            links.push((*x, *y));
        }
    }
    let mut m = discovered(&names, &links).await;
    for from in names {
        assert_eq!(m.handle(from).unwrap().reachable_peers().len(), 4);
        for to in names.iter().filter(|to| **to != from) {
            assert_eq!(m.send(from, to, format!("{from} to {to}")).unwrap(), 1);
        }
    }
    let stats = m.run_until_idle(200).await.unwrap();

    assert!(stats.settled);
    for from in names {
        for to in names.iter().filter(|to| **to != from) {
            let expected = format!("{from} to {to}").into_bytes();
            assert_eq!(m.receive(to, from).unwrap(), Some(expected), "{from} -> {to}");
        }
    }
}

#[tokio::test]
async fn lost_neighbours_stop_being_reachable() {
    let mut m = discovered(&["a", "b"], &[("a", "b")]).await;
    m.disconnect("a", "b").unwrap();
    m.announce().await.unwrap();

    assert!(m.handle("a").unwrap().reachable_peers().is_empty());
    assert_eq!(m.send("a", "b", "nobody home").unwrap(), 0);
    let stats = m.run_until_idle(ROUNDS).await.unwrap();
    assert!(stats.settled);
    assert_eq!(stats.exchanges, 0);
}

#[tokio::test]
async fn expired_packets_are_not_sent() {
    let config = WatchdogConfig::default().with_ttl(Duration::from_millis(1));
    let mut m = mesh(&["a", "b"], &[("a", "b")], config).await;
    m.announce().await.unwrap();
    m.run_until_idle(ROUNDS).await.unwrap();

    assert_eq!(m.send("a", "b", "stale").unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    m.run_until_idle(ROUNDS).await.unwrap();

    assert_eq!(m.receive("b", "a").unwrap(), None);
    assert_eq!(m.handle("a").unwrap().queued_for(&m.id("b").unwrap()), 0);
}

#[tokio::test]
async fn busy_radio_is_retried_during_discovery() {
    let config = WatchdogConfig::default().with_drop_retries(4, Duration::from_millis(1));
    let mut m = mesh(&["a", "b"], &[("a", "b")], config).await;
    m.node("a").unwrap().link().set_busy(2);
    m.announce().await.unwrap();
    let stats = m.run_until_idle(ROUNDS).await.unwrap();

    assert!(stats.settled);
    assert!(m.node("a").unwrap().link().removals() >= 3);
    assert_eq!(m.handle("a").unwrap().reachable_peers().len(), 1);
}

#[tokio::test]
async fn default_scenario_delivers() {
    let report = Scenario::new(Config::default()).run().await.unwrap();
    assert_eq!(report.deliveries.len(), 1);
    assert!(report.all_delivered());
    assert!(report.discovery.settled);
    assert!(report.delivery.settled);
}

#[tokio::test]
async fn scenario_from_toml() {
    let config = Config::from_toml(
        r#"
        max_rounds = 80
        nodes = [{ name = "h" }, { name = "x" }, { name = "z" }, { name = "lonely" }]
        links = [["h", "x"], ["h", "z"]]

        [[messages]]
        from = "x"
        to = "z"
        text = "across"

        [[messages]]
        from = "lonely"
        to = "x"
        text = "unheard"
        "#,
    )
    .unwrap();
    let report = Scenario::new(config).run().await.unwrap();

    assert_eq!(report.delivered(), 1);
    assert!(!report.all_delivered());
    let unheard = &report.deliveries[1];
    assert_eq!(unheard.queued, 0);
    assert!(!unheard.delivered);
}

#[tokio::test]
async fn scenario_rejects_links_to_unknown_nodes() {
    let config = Config::from_toml(
        r#"
        nodes = [{ name = "a" }]
        links = [["a", "ghost"]]
        "#,
    )
    .unwrap();
    assert!(Scenario::new(config).run().await.is_err());
}
