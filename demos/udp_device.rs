use oscbuzz::core::{Config, Level};
use oscbuzz::device::{OutputDriver, Telemetry};
use oscbuzz::protocol::{decode, encode, Message};
use oscbuzz::{util, DeviceServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

/// Prints every output write instead of driving pins
struct ConsoleDriver;

impl OutputDriver for ConsoleDriver {
    fn set_duty(&mut self, channel: usize, level: Level) {
        println!("  [out] channel {} -> {}", channel, level.value());
    }

    fn set_link_indicator(&mut self, on: bool) {
        println!("  [led] {}", if on { "on" } else { "off" });
    }
}

#[tokio::main]
async fn main() -> oscbuzz::Result<()> {
    util::init_tracing("info");

    // Optional config file as the first argument
    let mut config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.listen_addr = "127.0.0.1:0".parse().expect("valid address");

    println!("Device configuration:");
    println!("- Device id: {}", config.device_id);
    println!("- Channels: {}", config.channel_count);
    println!("- Liveness timeout: {:?}", config.liveness_timeout);
    println!("- Heartbeat interval: {:?}", config.heartbeat_interval);

    let mut server = DeviceServer::bind(config.clone(), ConsoleDriver).await?;
    server.device_mut().set_telemetry_provider(|| Telemetry {
        supply: 3300,
        signal: -60,
    });
    let device_addr = server.local_addr()?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let device_task = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    // Controller: send from an ephemeral port, listen one port above it
    let ctl_tx = UdpSocket::bind("127.0.0.1:0").await?;
    let reply_port = ctl_tx
        .local_addr()?
        .port()
        .checked_add(config.reply_port_offset)
        .ok_or_else(|| oscbuzz::Error::network("controller port leaves no room for a reply port"))?;
    let ctl_rx = UdpSocket::bind(("127.0.0.1", reply_port)).await?;

    let listener = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        while let Ok(Ok((len, from))) =
            timeout(Duration::from_secs(3), ctl_rx.recv_from(&mut buf)).await
        {
            match decode(&buf[..len]) {
                Ok(msg) => println!("  [ctl] <- {} from {}", msg, from),
                Err(e) => println!("  [ctl] <- undecodable reply: {}", e),
            }
        }
    });

    println!("\nDiscovering device at {}", device_addr);
    send(&ctl_tx, &Message::new(config.addresses.discover.as_str()), device_addr).await?;
    send(&ctl_tx, &Message::new(config.addresses.discover.as_str()), device_addr).await?;

    println!("\nRamping motors for 2 seconds");
    for step in 0..20i32 {
        let level = step * 12;
        let mut msg = Message::new(config.addresses.actuation.as_str());
        for _ in 0..config.channel_count {
            msg = msg.arg(level);
        }
        send(&ctl_tx, &msg, device_addr).await?;
        sleep(Duration::from_millis(100)).await;
    }

    println!("\nController going silent");
    sleep(config.liveness_timeout * 2).await;

    let _ = stop_tx.send(());
    let device = device_task
        .await
        .map_err(|e| oscbuzz::Error::network(format!("device task failed: {}", e)))??;
    let _ = listener.await;

    let stats = device.stats();
    println!("\nDevice stats:");
    println!("- Received: {}", stats.received);
    println!("- Discovery acks: {}", stats.acks_sent);
    println!("- Heartbeats: {}", stats.heartbeats_sent);
    println!("- Timeouts: {}", stats.timeouts);
    println!("- Outputs idle: {}", device.channels().all_idle());

    println!("\nDone");
    Ok(())
}

async fn send(socket: &UdpSocket, message: &Message, to: SocketAddr) -> oscbuzz::Result<()> {
    socket.send_to(&encode(message), to).await?;
    Ok(())
}
