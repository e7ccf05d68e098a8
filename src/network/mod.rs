//! Network glue around the device core
//!
//! [`DeviceServer`] owns the UDP socket and a [`Device`], and runs the
//! control loop on a tokio runtime: one datagram (or a poll-timer wakeup)
//! per iteration, then [`Device::tick`], then the outbound queue is flushed.
//! The poll timer bounds how long the loop can go without a liveness check.

mod connection;

pub use self::connection::Connection;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::{Config, Result, MAX_PACKET_SIZE};
use crate::device::{Device, OutputDriver};
use crate::protocol::Message;

/// UDP front end for a [`Device`]
pub struct DeviceServer {
    device: Device,
    connection: Connection,
    outbound_rx: mpsc::Receiver<(Message, SocketAddr)>,
    recv_buffer: Vec<u8>,
}

impl DeviceServer {
    /// Boots a device and binds its socket to `config.listen_addr`
    pub async fn bind(config: Config, driver: impl OutputDriver + 'static) -> Result<Self> {
        let (tx, rx) = mpsc::channel(config.outbound_queue.max(1));
        let connection = Connection::bind(config.listen_addr)?;
        let device = Device::new(config, driver, tx)?;

        info!(addr = %connection.local_addr()?, "Listening for OSC");

        Ok(DeviceServer {
            device,
            connection,
            outbound_rx: rx,
            recv_buffer: vec![0u8; MAX_PACKET_SIZE],
        })
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.connection.local_addr()
    }

    /// The device being driven
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Mutable access, e.g. to install a telemetry provider before running
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Runs the control loop until `shutdown` completes, then idles the
    /// outputs and hands the device back.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<Device>
    where
        F: Future<Output = ()>,
    {
        futures::pin_mut!(shutdown);

        let mut poll = interval(self.device.config().poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = self.connection.recv(&mut self.recv_buffer) => match received {
                    Ok(received) => Some(received),
                    Err(e) => {
                        warn!(error = %e, "Receive failed");
                        None
                    }
                },
                _ = poll.tick() => None,
            };

            let now = Instant::now();
            match received {
                Some((len, source)) => {
                    self.device
                        .step(Some((&self.recv_buffer[..len], source)), now);
                }
                None => {
                    self.device.step(None, now);
                }
            }

            self.flush().await;
        }

        info!("Shutting down, idling outputs");
        self.device.idle_outputs();
        self.flush().await;
        Ok(self.device)
    }

    /// Sends everything the device queued. Send errors are logged only.
    async fn flush(&mut self) {
        while let Ok((message, target)) = self.outbound_rx.try_recv() {
            debug!(%target, %message, "Sending");
            if let Err(e) = self.connection.send(message, target).await {
                warn!(error = %e, "Dropping outbound message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDriver;
    use crate::protocol::{decode, Argument};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    /// Controller sockets: sends from port P, listens on P + 1
    async fn controller_pair() -> (UdpSocket, UdpSocket) {
        for _ in 0..50 {
            let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let port = tx.local_addr().unwrap().port();
            if port == u16::MAX {
                continue;
            }
            if let Ok(rx) = UdpSocket::bind(("127.0.0.1", port + 1)).await {
                return (tx, rx);
            }
        }
        panic!("could not find adjacent free ports");
    }

    async fn recv_message(socket: &UdpSocket) -> Message {
        let mut buf = [0u8; 256];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for device")
            .unwrap();
        decode(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn test_discovery_motors_and_timeout_over_udp() {
        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            liveness_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let server = DeviceServer::bind(config, NullDriver).await.unwrap();
        let device_addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let (ctl_tx, ctl_rx) = controller_pair().await;

        let probe = crate::protocol::encode(&Message::new("/patpatpat/discover"));
        ctl_tx.send_to(&probe, device_addr).await.unwrap();

        // Ack first, then the first heartbeat of the new session
        let ack = recv_message(&ctl_rx).await;
        assert_eq!(ack.address, "/patpatpat/noticeme/senpai");
        assert_eq!(ack.arguments[1], Argument::Int(2));
        let heartbeat = recv_message(&ctl_rx).await;
        assert_eq!(heartbeat.address, "/patpatpat/heartbeat");

        let motors = crate::protocol::encode(&Message::new("/m").arg(100).arg(50));
        ctl_tx.send_to(&motors, device_addr).await.unwrap();

        // Go silent past the liveness timeout
        tokio::time::sleep(Duration::from_millis(500)).await;
        stop_tx.send(()).unwrap();

        let device = handle.await.unwrap().unwrap();
        let stats = device.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.acks_sent, 1);
        assert_eq!(stats.timeouts, 1);
        assert!(device.channels().all_idle());
        assert!(!device.session().is_connected());
    }

    #[tokio::test]
    async fn test_malformed_packet_over_udp() {
        let config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = DeviceServer::bind(config, NullDriver).await.unwrap();
        let device_addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"/m\0\0,ix\0", device_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();

        let device = handle.await.unwrap().unwrap();
        assert_eq!(device.stats().malformed, 1);
        assert!(!device.session().is_connected());
    }
}
