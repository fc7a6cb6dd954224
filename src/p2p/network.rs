use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::codec::{read_frame, write_frame};
use super::message::{Message, MessagePayload};
use super::peer::{Peer, PeerInfo, PeerTable};
use crate::blockchain::Block;
use crate::config::{NodeConfig, parse_peer_addr};
use crate::error::NetworkError;
use crate::transaction::Transaction;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for the body of one frame; sized for full-chain responses.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct P2PConfig {
    pub host: String,
    /// `0` picks a free port at start; the node id follows the bound port.
    pub port: u16,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub frame_timeout: Duration,
    /// Zero disables the background maintenance loop.
    pub maintenance_interval: Duration,
}

impl P2PConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            frame_timeout: FRAME_TIMEOUT,
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl From<&NodeConfig> for P2PConfig {
    fn from(cfg: &NodeConfig) -> Self {
        Self {
            maintenance_interval: cfg.maintenance_interval,
            ..Self::new(cfg.host.clone(), cfg.p2p_port)
        }
    }
}

/// Ledger-side reactions to peer traffic. Called from the dispatch thread, so
/// implementations may block on ledger locks.
pub trait ChainHandler: Send + Sync {
    /// A peer announced a block. The returned payload is sent back to that peer.
    fn on_new_block(
        &self,
        network: &Arc<P2PNetwork>,
        from: &str,
        block: Block,
    ) -> Option<MessagePayload>;
    fn on_new_transaction(&self, network: &Arc<P2PNetwork>, from: &str, tx: Transaction);
    /// Full local chain, served to REQUEST_CHAIN.
    fn chain(&self) -> Vec<Block>;
    fn on_chain_response(&self, from: &str, chain: Vec<Block>);
}

struct Inbound {
    message: Message,
    reply: mpsc::Sender<Message>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub pinged: usize,
    pub reconnected: usize,
    pub failed: usize,
    pub evicted: Vec<String>,
    pub chain_requests: usize,
}

/// Peer network: listener, per-connection reader/writer tasks, one dispatch
/// thread and the peer table.
pub struct P2PNetwork {
    config: P2PConfig,
    node_id: RwLock<String>,
    peers: Mutex<PeerTable>,
    handler: RwLock<Option<Arc<dyn ChainHandler>>>,
    running: AtomicBool,
    next_conn_id: AtomicU64,
    runtime: Mutex<Option<Handle>>,
    inbox: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    shutdown: watch::Sender<bool>,
}

impl P2PNetwork {
    pub fn new(config: P2PConfig) -> Arc<Self> {
        let node_id = format!("{}:{}", config.host, config.port);
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            node_id: RwLock::new(node_id),
            peers: Mutex::new(PeerTable::new()),
            handler: RwLock::new(None),
            running: AtomicBool::new(false),
            next_conn_id: AtomicU64::new(1),
            runtime: Mutex::new(None),
            inbox: Mutex::new(None),
            shutdown,
        })
    }

    pub fn node_id(&self) -> String {
        self.node_id.read().expect("rwlock poisoned").clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_handler(&self, handler: Arc<dyn ChainHandler>) {
        *self.handler.write().expect("rwlock poisoned") = Some(handler);
    }

    /// Bind the listener and spawn the background machinery. Must be called
    /// from within a tokio runtime. A stopped network cannot be restarted.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, NetworkError> {
        if *self.shutdown.borrow() {
            return Err(NetworkError::NotRunning);
        }
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local = listener.local_addr()?;
        if self.config.port == 0 {
            *self.node_id.write().expect("rwlock poisoned") =
                format!("{}:{}", self.config.host, local.port());
        }

        *self.runtime.lock().expect("mutex poisoned") = Some(Handle::current());
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock().expect("mutex poisoned") = Some(tx);
        self.running.store(true, Ordering::SeqCst);

        let dispatcher = self.clone();
        thread::Builder::new()
            .name("p2p-dispatch".into())
            .spawn(move || dispatcher.dispatch_loop(rx))?;

        tokio::spawn(self.clone().accept_loop(listener, self.shutdown.subscribe()));
        if !self.config.maintenance_interval.is_zero() {
            tokio::spawn(self.clone().maintenance_loop(self.shutdown.subscribe()));
        }

        let pending = self.peers.lock().expect("mutex poisoned").reconnect_candidates();
        for peer_id in pending {
            tokio::spawn(self.clone().connect_peer(peer_id));
        }

        info!("P2P network started on {} (node id {})", local, self.node_id());
        Ok(local)
    }

    /// Close the listener and every connection. Queued messages are dropped.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        self.inbox.lock().expect("mutex poisoned").take();
        self.peers.lock().expect("mutex poisoned").disconnect_all();
        info!("P2P network stopped");
    }

    /// Register a peer and, when running, start connecting to it.
    /// `Ok(false)` when the peer is already known.
    pub fn add_peer(self: &Arc<Self>, address: &str, port: u16) -> Result<bool, NetworkError> {
        let peer = Peer::new(address, port);
        let peer_id = peer.peer_id.clone();
        if peer_id == self.node_id() {
            return Err(NetworkError::SelfConnection(peer_id));
        }
        if !self.peers.lock().expect("mutex poisoned").insert(peer) {
            return Ok(false);
        }
        info!("Added peer: {}", peer_id);

        if self.is_running() {
            if let Some(rt) = self.runtime.lock().expect("mutex poisoned").clone() {
                rt.spawn(self.clone().connect_peer(peer_id));
            }
        }
        Ok(true)
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.lock().expect("mutex poisoned").infos()
    }

    pub fn peer(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.lock().expect("mutex poisoned").get(peer_id).map(Peer::info)
    }

    pub fn connected_count(&self) -> usize {
        self.peers.lock().expect("mutex poisoned").connected_count()
    }

    /// Queue `payload` for every connected peer. Returns how many accepted it;
    /// always 0 once the network is stopped.
    pub fn broadcast(&self, payload: MessagePayload) -> usize {
        self.broadcast_except(payload, None)
    }

    pub fn broadcast_except(&self, payload: MessagePayload, except: Option<&str>) -> usize {
        if !self.is_running() {
            return 0;
        }
        let kind = payload.kind();
        let message = self.message(payload);
        let targets = self.peers.lock().expect("mutex poisoned").outboxes(except);

        let mut sent = 0;
        for outbox in targets {
            match outbox.sender.try_send(message.clone()) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbox of {} is full, dropping {}", outbox.peer_id, kind)
                }
                Err(TrySendError::Closed(_)) => self.connection_lost(&outbox.peer_id, outbox.conn_id),
            }
        }
        debug!("Broadcast {} to {} peers", kind, sent);
        sent
    }

    /// Ask every connected peer for its chain.
    pub fn request_chains(&self) -> usize {
        self.broadcast(MessagePayload::RequestChain {})
    }

    /// Ping connected peers, retry the ones that may still come back, evict the
    /// dead and request chains for synchronisation.
    pub async fn maintain(self: &Arc<Self>) -> MaintenanceReport {
        self.maintain_at(Utc::now()).await
    }

    /// [`P2PNetwork::maintain`] with eviction judged at `now`.
    pub async fn maintain_at(self: &Arc<Self>, now: DateTime<Utc>) -> MaintenanceReport {
        let (evicted, candidates) = {
            let mut peers = self.peers.lock().expect("mutex poisoned");
            (peers.evict_dead(now), peers.reconnect_candidates())
        };
        for peer_id in &evicted {
            info!("Removed dead peer: {}", peer_id);
        }

        let mut report = MaintenanceReport {
            pinged: self.broadcast(MessagePayload::ping()),
            evicted,
            ..Default::default()
        };

        for peer_id in candidates {
            if self.clone().connect_peer(peer_id).await {
                report.reconnected += 1;
            } else {
                report.failed += 1;
            }
        }

        if self.handler.read().expect("rwlock poisoned").is_some() {
            report.chain_requests = self.request_chains();
        }
        report
    }

    fn message(&self, payload: MessagePayload) -> Message {
        Message::new(payload, self.node_id())
    }

    async fn connect_peer(self: Arc<Self>, peer_id: String) -> bool {
        let target = {
            let mut peers = self.peers.lock().expect("mutex poisoned");
            match peers.get_mut(&peer_id) {
                Some(peer) if peer.is_connected() => return true,
                Some(peer) => {
                    peer.mark_connecting();
                    (peer.address.clone(), peer.port)
                }
                None => return false,
            }
        };

        let result = timeout(
            self.config.connect_timeout,
            TcpStream::connect((target.0.as_str(), target.1)),
        )
        .await;
        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.connect_failed(&peer_id, &e.to_string()),
            Err(_) => return self.connect_failed(&peer_id, "timed out"),
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let outbox = self.attach(stream, Some(peer_id.clone()), conn_id);
        {
            let mut peers = self.peers.lock().expect("mutex poisoned");
            match peers.get_mut(&peer_id) {
                Some(peer) => peer.mark_connected(conn_id, outbox.clone()),
                None => return false,
            }
        }
        info!("Connected to peer: {}", peer_id);

        if outbox.try_send(self.message(MessagePayload::ping())).is_err() {
            warn!("Could not queue PING for {}", peer_id);
        }
        true
    }

    fn connect_failed(&self, peer_id: &str, reason: &str) -> bool {
        let mut peers = self.peers.lock().expect("mutex poisoned");
        if let Some(peer) = peers.get_mut(peer_id) {
            peer.mark_failed();
            warn!(
                "Failed to connect to peer {} (attempt {}): {}",
                peer_id, peer.connection_attempts, reason
            );
        }
        false
    }

    fn connection_lost(&self, peer_id: &str, conn_id: u64) {
        let mut peers = self.peers.lock().expect("mutex poisoned");
        if let Some(peer) = peers.get_mut(peer_id) {
            if peer.connection_lost(conn_id) {
                info!("Peer {} disconnected", peer_id);
            }
        }
    }

    /// Spawn the reader and writer tasks of one connection and return its outbox.
    fn attach(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_id: Option<String>,
        conn_id: u64,
    ) -> mpsc::Sender<Message> {
        let _ = stream.set_nodelay(true);
        let label = match (&peer_id, stream.peer_addr()) {
            (Some(id), _) => id.clone(),
            (None, Ok(addr)) => addr.to_string(),
            (None, Err(_)) => format!("conn-{conn_id}"),
        };
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);

        tokio::spawn(self.clone().write_loop(
            write_half,
            rx,
            peer_id.clone(),
            conn_id,
            label.clone(),
        ));
        tokio::spawn(self.clone().read_loop(
            read_half,
            tx.clone(),
            peer_id,
            conn_id,
            label,
            self.shutdown.subscribe(),
        ));
        tx
    }

    async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New peer connection from {}", addr);
                        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                        self.attach(stream, None, conn_id);
                    }
                    Err(e) => warn!("Error accepting peer connection: {}", e),
                },
            }
        }
        debug!("Listener closed");
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: OwnedReadHalf,
        reply: mpsc::Sender<Message>,
        peer_id: Option<String>,
        conn_id: u64,
        label: String,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => break,
                frame = read_frame(&mut reader, self.config.frame_timeout) => frame,
            };
            match frame {
                Ok(Some(bytes)) => match Message::decode(&bytes) {
                    Ok(message) => {
                        debug!("Received {} from {}", message.kind(), message.sender_id);
                        self.enqueue(Inbound {
                            message,
                            reply: reply.clone(),
                        });
                    }
                    Err(e) => warn!("Dropping message from {}: {}", label, e),
                },
                Ok(None) => {
                    debug!("Connection to {} closed by remote", label);
                    break;
                }
                Err(e) => {
                    warn!("Closing connection to {}: {}", label, e);
                    break;
                }
            }
        }
        if let Some(peer_id) = peer_id {
            self.connection_lost(&peer_id, conn_id);
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: OwnedWriteHalf,
        mut outbox: mpsc::Receiver<Message>,
        peer_id: Option<String>,
        conn_id: u64,
        label: String,
    ) {
        while let Some(message) = outbox.recv().await {
            let bytes = match message.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.kind(), e);
                    continue;
                }
            };
            match timeout(self.config.send_timeout, write_frame(&mut writer, &bytes)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Failed to send {} to {}: {}", message.kind(), label, e);
                    break;
                }
                Err(_) => {
                    warn!("Sending {} to {} timed out", message.kind(), label);
                    break;
                }
            }
        }
        if let Some(peer_id) = peer_id {
            self.connection_lost(&peer_id, conn_id);
        }
        let _ = writer.shutdown().await;
    }

    async fn maintenance_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.maintenance_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let report = self.maintain().await;
                    debug!("Maintenance pass: {:?}", report);
                }
            }
        }
    }

    fn enqueue(&self, inbound: Inbound) {
        if let Some(inbox) = self.inbox.lock().expect("mutex poisoned").as_ref() {
            let _ = inbox.send(inbound);
        }
    }

    /// Single consumer of every received message, in arrival order.
    fn dispatch_loop(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(Inbound { message, reply }) = inbox.blocking_recv() {
            if !self.is_running() {
                break;
            }
            let kind = message.kind();
            let sender = message.sender_id.clone();
            if let Some(response) = self.dispatch(message) {
                if let Err(e) = reply.try_send(self.message(response)) {
                    warn!("Could not reply to {} from {}: {}", kind, sender, e);
                }
            }
        }
        debug!("Dispatcher stopped");
    }

    fn dispatch(self: &Arc<Self>, message: Message) -> Option<MessagePayload> {
        let Message {
            payload, sender_id, ..
        } = message;
        if let Some(peer) = self.peers.lock().expect("mutex poisoned").get_mut(&sender_id) {
            peer.touch(Utc::now());
        }
        let handler = self.handler.read().expect("rwlock poisoned").clone();

        match payload {
            MessagePayload::Ping { .. } => {
                self.learn_sender(&sender_id);
                Some(MessagePayload::pong())
            }
            MessagePayload::Pong { .. } => None,
            MessagePayload::PeerDiscovery {} => Some(MessagePayload::PeerList {
                peers: self.peers.lock().expect("mutex poisoned").addresses(),
            }),
            MessagePayload::PeerList { peers } => {
                for peer in peers {
                    if let Err(e) = self.add_peer(&peer.address, peer.port) {
                        debug!("Skipping listed peer: {}", e);
                    }
                }
                None
            }
            MessagePayload::NewBlock(block) => match handler {
                Some(h) => h.on_new_block(self, &sender_id, block),
                None => None,
            },
            MessagePayload::NewTransaction(tx) => {
                if let Some(h) = handler {
                    h.on_new_transaction(self, &sender_id, tx);
                }
                None
            }
            MessagePayload::RequestChain {} => {
                handler.map(|h| MessagePayload::chain_response(h.chain()))
            }
            MessagePayload::ChainResponse { chain, length } => {
                if chain.len() != length {
                    warn!(
                        "CHAIN_RESPONSE from {} claims {} blocks but carries {}",
                        sender_id,
                        length,
                        chain.len()
                    );
                }
                if let Some(h) = handler {
                    h.on_chain_response(&sender_id, chain);
                }
                None
            }
        }
    }

    /// A PING identifies its sender's listening address; remember it so that
    /// broadcasts reach nodes that dialled in.
    fn learn_sender(self: &Arc<Self>, sender_id: &str) {
        if self.peers.lock().expect("mutex poisoned").contains(sender_id) {
            return;
        }
        if let Some((host, port)) = parse_peer_addr(sender_id) {
            if let Err(e) = self.add_peer(&host, port) {
                debug!("Not adding {}: {}", sender_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::peer::PeerState;
    use chrono::Duration as ChronoDuration;

    fn unstarted() -> Arc<P2PNetwork> {
        let mut cfg = P2PConfig::new("127.0.0.1", 6000);
        cfg.connect_timeout = Duration::from_millis(500);
        P2PNetwork::new(cfg)
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn add_peer_rejects_self_and_duplicates() {
        let net = unstarted();
        assert!(matches!(
            net.add_peer("127.0.0.1", 6000),
            Err(NetworkError::SelfConnection(_))
        ));
        assert!(net.add_peer("10.0.0.9", 6000).unwrap());
        assert!(!net.add_peer("10.0.0.9", 6000).unwrap());
        assert_eq!(net.peers().len(), 1);
        assert_eq!(net.peers()[0].state, PeerState::Discovered);
    }

    #[test]
    fn broadcast_is_noop_when_stopped() {
        let net = unstarted();
        assert_eq!(net.broadcast(MessagePayload::RequestChain {}), 0);
    }

    #[tokio::test]
    async fn stopped_network_stops_broadcasting() {
        let mut cfg = P2PConfig::new("127.0.0.1", 0);
        cfg.maintenance_interval = Duration::ZERO;
        let (a, b) = (P2PNetwork::new(cfg.clone()), P2PNetwork::new(cfg));
        a.start().await.unwrap();
        let b_addr = b.start().await.unwrap();

        a.add_peer("127.0.0.1", b_addr.port()).unwrap();
        timeout(Duration::from_secs(5), async {
            while a.connected_count() == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(a.broadcast(MessagePayload::RequestChain {}), 1);

        a.stop();
        assert!(!a.is_running());
        assert_eq!(a.connected_count(), 0);
        assert_eq!(a.broadcast(MessagePayload::RequestChain {}), 0);
        b.stop();
    }

    #[tokio::test]
    async fn dead_or_full_outbox_does_not_block_other_peers() {
        let net = unstarted();
        net.running.store(true, Ordering::SeqCst);

        let (closed_tx, closed_rx) = mpsc::channel(1);
        drop(closed_rx);
        let (full_tx, mut full_rx) = mpsc::channel(1);
        full_tx
            .try_send(Message::new(MessagePayload::ping(), "filler"))
            .unwrap();
        let (live_tx, mut live_rx) = mpsc::channel(4);

        {
            let mut peers = net.peers.lock().unwrap();
            for (port, outbox) in [(7001, closed_tx), (7002, full_tx), (7003, live_tx)] {
                let mut peer = Peer::new("10.0.0.1", port);
                peer.mark_connected(u64::from(port), outbox);
                peers.insert(peer);
            }
        }

        assert_eq!(net.broadcast(MessagePayload::RequestChain {}), 1);
        let delivered = live_rx.try_recv().unwrap();
        assert_eq!(delivered.payload, MessagePayload::RequestChain {});

        assert_eq!(net.peer("10.0.0.1:7001").unwrap().state, PeerState::Disconnected);
        assert!(net.peer("10.0.0.1:7002").unwrap().is_connected);
        assert!(matches!(
            full_rx.try_recv().unwrap().payload,
            MessagePayload::Ping { .. }
        ));
        net.running.store(false, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn unreachable_peer_is_evicted_after_retries() {
        let net = unstarted();
        let port = closed_port();
        net.add_peer("127.0.0.1", port).unwrap();
        let id = format!("127.0.0.1:{port}");

        for attempt in 1..=3 {
            let report = net.maintain().await;
            assert_eq!(report.failed, 1);
            assert_eq!(net.peer(&id).unwrap().connection_attempts, attempt);
        }

        // Out of retries but not yet silent long enough.
        let report = net.maintain().await;
        assert_eq!(report.failed, 0);
        assert!(net.peer(&id).is_some());

        let later = Utc::now() + ChronoDuration::seconds(301);
        let report = net.maintain_at(later).await;
        assert_eq!(report.evicted, vec![id.clone()]);
        assert!(net.peer(&id).is_none());
    }

    #[tokio::test]
    async fn ping_is_answered_on_the_same_connection() {
        let mut cfg = P2PConfig::new("127.0.0.1", 0);
        cfg.maintenance_interval = Duration::ZERO;
        let net = P2PNetwork::new(cfg);
        let addr = net.start().await.unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let ping = Message::new(MessagePayload::ping(), "test-client");
        write_frame(&mut stream, &ping.encode().unwrap()).await.unwrap();

        let bytes = timeout(Duration::from_secs(5), read_frame(&mut stream, FRAME_TIMEOUT))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply = Message::decode(&bytes).unwrap();
        assert!(matches!(reply.payload, MessagePayload::Pong { .. }));
        assert_eq!(reply.sender_id, net.node_id());
        net.stop();
    }

    #[tokio::test]
    async fn garbage_does_not_close_the_connection() {
        let mut cfg = P2PConfig::new("127.0.0.1", 0);
        cfg.maintenance_interval = Duration::ZERO;
        let net = P2PNetwork::new(cfg);
        let addr = net.start().await.unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, b"{\"type\":\"gossip\",\"data\":{},\"sender_id\":\"x\",\"timestamp\":1}")
            .await
            .unwrap();
        write_frame(&mut stream, b"not json").await.unwrap();
        let discovery = Message::new(MessagePayload::PeerDiscovery {}, "test-client");
        write_frame(&mut stream, &discovery.encode().unwrap()).await.unwrap();

        let bytes = timeout(Duration::from_secs(5), read_frame(&mut stream, FRAME_TIMEOUT))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let reply = Message::decode(&bytes).unwrap();
        assert!(matches!(reply.payload, MessagePayload::PeerList { .. }));
        net.stop();
    }
}
