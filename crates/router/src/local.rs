use std::time::Instant;

use srouter_core::{Outbound, Router};
use tokio::sync::mpsc;

enum RouterCmd {
    Packet {
        iface: String,
        frame: Vec<u8>,
        now: Instant,
    },
    Tick { now: Instant },
}

/// In-process router driven over channels instead of a controller link.
pub struct LocalRouter {
    cmd: mpsc::Sender<RouterCmd>,
    out: mpsc::Receiver<Outbound>,
}

impl LocalRouter {
    /// Spawn an actor task that owns `router`.
    pub fn spawn(router: Router) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(32);
        let (out_tx, out_rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut router = router;
            while let Some(cmd) = cmd_rx.recv().await {
                let out = match cmd {
                    RouterCmd::Packet { iface, frame, now } => {
                        router.handle_packet(&frame, &iface, now)
                    }
                    RouterCmd::Tick { now } => router.tick(now),
                };
                for frame in out {
                    if out_tx.send(frame).await.is_err() {
                        return;
                    }
                }
            }
        });
        Self {
            cmd: cmd_tx,
            out: out_rx,
        }
    }

    /// Hand the router a frame received on `iface` at `now`, on the same
    /// clock the caller passes to [`tick`](Self::tick).
    pub async fn deliver(&self, iface: &str, frame: Vec<u8>, now: Instant) {
        let _ = self
            .cmd
            .send(RouterCmd::Packet {
                iface: iface.into(),
                frame,
                now,
            })
            .await;
    }

    pub async fn tick(&self, now: Instant) {
        let _ = self.cmd.send(RouterCmd::Tick { now }).await;
    }

    /// Next frame the router wants to transmit.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.out.recv().await
    }

    /// A frame that is already waiting, without blocking.
    pub fn try_outbound(&mut self) -> Option<Outbound> {
        self.out.try_recv().ok()
    }
}
