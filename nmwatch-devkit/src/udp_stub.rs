/*!
Émetteur UDP qui se fait passer pour un mineur NMMiner

Envoie des datagrammes JSON vers un listener (unicast ou broadcast LAN)
et garde la trace de tout ce qui a été émis pour les assertions.
*/

use anyhow::Result;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;

#[derive(Debug, Clone)]
pub struct SentPacket {
    pub target: SocketAddr,
    pub payload: Vec<u8>,
}

#[derive(Clone)]
pub struct TelemetrySender {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    sent_packets: Arc<Mutex<Vec<SentPacket>>>,
}

impl TelemetrySender {
    /// Socket locale éphémère, broadcast autorisé
    pub async fn new(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(local).await?;
        socket.set_broadcast(true)?;

        Ok(Self {
            socket: Arc::new(socket),
            target,
            sent_packets: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Envoie des octets bruts (utile pour les paquets corrompus)
    pub async fn send_raw<V: Into<Vec<u8>>>(&self, payload: V) -> Result<()> {
        let payload = payload.into();
        self.socket.send_to(&payload, self.target).await?;

        log::debug!("📤 [STUB] sent {} bytes to {}", payload.len(), self.target);
        self.sent_packets.lock().unwrap().push(SentPacket {
            target: self.target,
            payload,
        });
        Ok(())
    }

    pub async fn send_json(&self, packet: &Value) -> Result<()> {
        self.send_raw(serde_json::to_vec(packet)?).await
    }

    /// Tous les paquets émis (pour assertions de tests)
    pub fn get_sent_packets(&self) -> Vec<SentPacket> {
        self.sent_packets.lock().unwrap().clone()
    }

    /// Dernier paquet émis, parsé en JSON
    pub fn get_last_json_packet(&self) -> Result<Option<Value>> {
        let packets = self.sent_packets.lock().unwrap();
        match packets.last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.sent_packets.lock().unwrap().clear();
    }
}
