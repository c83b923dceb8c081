use presence::PlayerId;
use tokio::sync::mpsc;

/// Why a push connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Client sent a close frame or the stream ended.
    Closed,
    /// Nothing heard from the client within the silence timeout.
    Silent,
    /// Socket read failed.
    Error,
}

/// Messages from push connections to the presence bridge.
#[derive(Debug)]
pub enum NetEvent {
    /// A push connection was accepted for a player.
    Connected { player_id: PlayerId, conn_id: u64 },
    /// Client sent `{"type":"ping"}`.
    Ping { player_id: PlayerId },
    /// Connection ended; the writer has already been unregistered.
    Disconnected {
        player_id: PlayerId,
        conn_id: u64,
        cause: DisconnectCause,
    },
}

/// Sender from connection tasks to the presence bridge.
pub type NetTx = mpsc::UnboundedSender<NetEvent>;
/// Receiver in the presence bridge.
pub type NetRx = mpsc::UnboundedReceiver<NetEvent>;

pub fn net_channel() -> (NetTx, NetRx) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (tx, mut rx) = net_channel();

        tx.send(NetEvent::Connected {
            player_id: 1,
            conn_id: 7,
        })
        .unwrap();
        tx.send(NetEvent::Ping { player_id: 1 }).unwrap();
        tx.send(NetEvent::Disconnected {
            player_id: 1,
            conn_id: 7,
            cause: DisconnectCause::Silent,
        })
        .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), NetEvent::Connected { conn_id: 7, .. }));
        assert!(matches!(rx.recv().await.unwrap(), NetEvent::Ping { player_id: 1 }));
        match rx.recv().await.unwrap() {
            NetEvent::Disconnected { cause, .. } => assert_eq!(cause, DisconnectCause::Silent),
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
}
