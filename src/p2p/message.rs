use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::{Block, unix_now};
use crate::error::NetworkError;
use crate::transaction::Transaction;

/// Listening address of a peer as exchanged in PEER_LIST.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub address: String,
    pub port: u16,
}

/// Every message the peer protocol understands. On the wire the variant name is
/// the envelope's `type` and the variant body is its `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    NewBlock(Block),
    NewTransaction(Transaction),
    RequestChain {},
    ChainResponse {
        chain: Vec<Block>,
        length: usize,
    },
    PeerDiscovery {},
    PeerList {
        peers: Vec<PeerAddress>,
    },
}

/// Message type names, as they appear in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Pong,
    NewBlock,
    NewTransaction,
    RequestChain,
    ChainResponse,
    PeerDiscovery,
    PeerList,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::NewBlock,
        MessageKind::NewTransaction,
        MessageKind::RequestChain,
        MessageKind::ChainResponse,
        MessageKind::PeerDiscovery,
        MessageKind::PeerList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::NewBlock => "new_block",
            MessageKind::NewTransaction => "new_transaction",
            MessageKind::RequestChain => "request_chain",
            MessageKind::ChainResponse => "chain_response",
            MessageKind::PeerDiscovery => "peer_discovery",
            MessageKind::PeerList => "peer_list",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::Ping { .. } => MessageKind::Ping,
            MessagePayload::Pong { .. } => MessageKind::Pong,
            MessagePayload::NewBlock(_) => MessageKind::NewBlock,
            MessagePayload::NewTransaction(_) => MessageKind::NewTransaction,
            MessagePayload::RequestChain {} => MessageKind::RequestChain,
            MessagePayload::ChainResponse { .. } => MessageKind::ChainResponse,
            MessagePayload::PeerDiscovery {} => MessageKind::PeerDiscovery,
            MessagePayload::PeerList { .. } => MessageKind::PeerList,
        }
    }

    pub fn ping() -> Self {
        MessagePayload::Ping {
            timestamp: Some(unix_now()),
        }
    }

    pub fn pong() -> Self {
        MessagePayload::Pong {
            timestamp: Some(unix_now()),
        }
    }

    pub fn chain_response(chain: Vec<Block>) -> Self {
        MessagePayload::ChainResponse {
            length: chain.len(),
            chain,
        }
    }
}

/// Protocol envelope: `{type, data, sender_id, timestamp}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub payload: MessagePayload,
    /// Node id (`host:port`) of the originating node.
    pub sender_id: String,
    pub timestamp: f64,
}

impl Message {
    pub fn new(payload: MessagePayload, sender_id: impl Into<String>) -> Self {
        Self {
            payload,
            sender_id: sender_id.into(),
            timestamp: unix_now(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// UTF-8 JSON object with exactly `type`, `data`, `sender_id` and `timestamp`.
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        let mut value =
            serde_json::to_value(&self.payload).map_err(|e| NetworkError::Malformed(e.to_string()))?;
        let Value::Object(map) = &mut value else {
            return Err(NetworkError::Malformed("payload is not an object".into()));
        };
        map.insert("sender_id".into(), Value::from(self.sender_id.clone()));
        map.insert("timestamp".into(), Value::from(self.timestamp));
        serde_json::to_vec(&value).map_err(|e| NetworkError::Malformed(e.to_string()))
    }

    /// Decode one envelope. An unrecognised `type` is reported separately from
    /// an envelope that cannot be decoded at all.
    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| NetworkError::Malformed(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(NetworkError::Malformed("envelope is not an object".into()));
        };

        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::Malformed("missing type".into()))?;
        if MessageKind::from_name(kind).is_none() {
            return Err(NetworkError::UnknownType(kind.to_string()));
        }

        let sender_id = match map.remove("sender_id") {
            Some(Value::String(s)) => s,
            _ => return Err(NetworkError::Malformed("missing sender_id".into())),
        };
        let timestamp = map
            .remove("timestamp")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| NetworkError::Malformed("missing timestamp".into()))?;

        let payload: MessagePayload = serde_json::from_value(Value::Object(map))
            .map_err(|e| NetworkError::Malformed(e.to_string()))?;

        Ok(Self {
            payload,
            sender_id,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_exactly_four_fields() {
        let msg = Message::new(MessagePayload::ping(), "127.0.0.1:6000");
        let value: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["data", "sender_id", "timestamp", "type"]);
        assert_eq!(obj["type"], "ping");
    }

    #[test]
    fn every_kind_survives_the_wire() {
        let block = Block::genesis();
        let payloads = vec![
            MessagePayload::ping(),
            MessagePayload::pong(),
            MessagePayload::NewBlock(block.clone()),
            MessagePayload::NewTransaction(Transaction::new("a", "b", 1.0)),
            MessagePayload::RequestChain {},
            MessagePayload::chain_response(vec![block]),
            MessagePayload::PeerDiscovery {},
            MessagePayload::PeerList {
                peers: vec![PeerAddress {
                    address: "10.0.0.1".into(),
                    port: 6001,
                }],
            },
        ];
        for payload in payloads {
            let msg = Message::new(payload, "n1");
            let back = Message::decode(&msg.encode().unwrap()).unwrap();
            assert_eq!(back, msg);
            assert_eq!(
                MessageKind::from_name(back.kind().as_str()),
                Some(back.kind())
            );
        }
    }

    #[test]
    fn accepts_foreign_envelope() {
        let raw = br#"{"type":"request_chain","data":{},"sender_id":"10.0.0.2:6000","timestamp":1.5}"#;
        let msg = Message::decode(raw).unwrap();
        assert_eq!(msg.payload, MessagePayload::RequestChain {});
        assert_eq!(msg.sender_id, "10.0.0.2:6000");

        let raw = br#"{"type":"ping","data":{},"sender_id":"x","timestamp":1}"#;
        assert_eq!(
            Message::decode(raw).unwrap().payload,
            MessagePayload::Ping { timestamp: None }
        );
    }

    #[test]
    fn unknown_type_is_distinguished() {
        let raw = br#"{"type":"gossip","data":{},"sender_id":"x","timestamp":1}"#;
        assert!(matches!(
            Message::decode(raw),
            Err(NetworkError::UnknownType(t)) if t == "gossip"
        ));
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        for raw in [
            &b"not json"[..],
            br#"[1,2,3]"#,
            br#"{"data":{},"sender_id":"x","timestamp":1}"#,
            br#"{"type":"ping","data":{},"timestamp":1}"#,
            br#"{"type":"new_block","data":{"index":"zero"},"sender_id":"x","timestamp":1}"#,
        ] {
            assert!(matches!(
                Message::decode(raw),
                Err(NetworkError::Malformed(_))
            ));
        }
    }
}
