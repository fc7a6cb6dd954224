use chrono::{Duration as ChronoDuration, Utc};
use pow_ledger_node::blockchain::Blockchain;
use pow_ledger_node::error::ValidationError;
use pow_ledger_node::p2p::{P2PConfig, P2PNetwork};
use pow_ledger_node::transaction::{Transaction, TransactionPool};
use pow_ledger_node::wallet::{generate_keypair_hex, sign_in_place};

#[test]
fn mined_transfer_moves_balances_without_prior_credit() {
    let mut chain = Blockchain::new(2, 10.0);
    let block = chain.mine(vec![Transaction::new("alice", "bob", 5.0).with_id()], "miner");
    assert!(block.hash.starts_with("00"));
    chain.append(block).unwrap();

    assert_eq!(chain.len(), 2);
    assert_eq!(chain.balance_of("bob"), 5.0);
    assert_eq!(chain.balance_of("alice"), -5.0);
    assert_eq!(chain.balance_of("miner"), 10.0);
    assert!(chain.is_valid_chain());
}

#[test]
fn zero_amount_is_rejected_and_pool_stays_empty() {
    let chain = Blockchain::new(1, 10.0);
    let mut pool = TransactionPool::new(10);
    let (sk, _pk, alice) = generate_keypair_hex();
    let mut tx = Transaction::new(alice, "bob", 0.0);
    sign_in_place(&sk, &mut tx).unwrap();

    let err = pool.admit(tx, &chain).unwrap_err();
    assert_eq!(err, ValidationError::NonPositiveAmount);
    assert_eq!(err.to_string(), "Transaction amount must be positive");
    assert_eq!(pool.len(), 0);
}

#[tokio::test]
async fn exhausted_silent_peer_is_evicted_by_maintenance() {
    let mut cfg = P2PConfig::new("127.0.0.1", 6000);
    cfg.connect_timeout = std::time::Duration::from_millis(500);
    let network = P2PNetwork::new(cfg);

    // Nothing listens on a port freed right after binding it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    network.add_peer("127.0.0.1", port).unwrap();
    let peer_id = format!("127.0.0.1:{port}");

    for _ in 0..3 {
        network.maintain().await;
    }
    let peer = network.peer(&peer_id).unwrap();
    assert_eq!(peer.connection_attempts, 3);
    assert!(!peer.is_connected);

    let report = network
        .maintain_at(Utc::now() + ChronoDuration::seconds(301))
        .await;
    assert_eq!(report.evicted, vec![peer_id.clone()]);
    assert!(network.peer(&peer_id).is_none());
    assert!(network.peers().is_empty());
}
