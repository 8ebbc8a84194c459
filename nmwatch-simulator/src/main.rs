//! Flotte NMMiner factice : broadcast de paquets télémétrie sur le LAN
//! pour exercer le kernel sans matériel.

use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use nmwatch_devkit::{TelemetryPacketBuilder, TelemetrySender};
use rand::Rng;
use std::net::SocketAddr;
use tokio::time::{sleep, Duration};

const BOARD_TYPES: &[&str] = &["NMLotto", "NMMiner-S3", "NMMiner-C3", "NMMiner-2.8"];

#[derive(Parser)]
#[command(name = "nmwatch-simulator")]
#[command(about = "Broadcast fake NMMiner telemetry to exercise the fleet monitor")]
struct Cli {
    /// Destination of the datagrams (broadcast or the kernel's address)
    #[arg(long, default_value = "255.255.255.255:12345")]
    target: SocketAddr,

    /// Number of simulated miners (last octet starts at .101)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=154))]
    miners: u8,

    /// First octets of the simulated miners' IPs
    #[arg(long, default_value = "192.168.50")]
    subnet: String,

    /// Seconds between two reports of the same miner
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Firmware version announced by the miners
    #[arg(long, default_value = "v0.3.01")]
    version: String,

    /// Percentage of reports sent corrupted
    #[arg(long, default_value_t = 0)]
    corrupt_percent: u8,

    /// Stop after this many rounds (runs forever when omitted)
    #[arg(long)]
    rounds: Option<u64>,
}

struct SimulatedMiner {
    ip: String,
    board_type: &'static str,
    base_khs: f64,
    accepted: u64,
    rejected: u64,
    uptime_secs: u64,
}

impl SimulatedMiner {
    fn new(ip: String, rng: &mut impl Rng) -> Self {
        Self {
            ip,
            board_type: BOARD_TYPES[rng.random_range(0..BOARD_TYPES.len())],
            base_khs: rng.random_range(50.0..1200.0),
            accepted: 0,
            rejected: 0,
            uptime_secs: rng.random_range(0..86_400),
        }
    }

    /// Fait avancer l'état d'un intervalle et produit le paquet à émettre
    fn tick(&mut self, elapsed_secs: u64, version: &str, rng: &mut impl Rng) -> TelemetryPacketBuilder {
        self.uptime_secs += elapsed_secs;
        self.accepted += rng.random_range(0..4);
        if rng.random_bool(0.02) {
            self.rejected += 1;
        }

        let khs = self.base_khs * rng.random_range(0.9..1.1);
        TelemetryPacketBuilder::valid(self.ip.clone())
            .set_string("BoardType", self.board_type)
            .hashrate(format_raw_hashrate(khs))
            .shares(self.rejected, self.accepted)
            .temp(rng.random_range(38.0..62.0))
            .rssi(rng.random_range(-85..-40))
            .set_string("Uptime", format_uptime(self.uptime_secs))
            .version(version)
    }
}

/// Même notation que le firmware : suffixe K/M, deux décimales
fn format_raw_hashrate(khs: f64) -> String {
    if khs >= 1000.0 {
        format!("{:.2}M", khs / 1000.0)
    } else {
        format!("{:.2}K", khs)
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{:03}d {:02}:{:02}:{:02}", days, hours, minutes, secs % 60)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    info!(
        "🚀 Simulating {} miners towards {} every {}s",
        cli.miners, cli.target, cli.interval_secs
    );

    let sender = TelemetrySender::new(cli.target).await?;
    let mut miners: Vec<SimulatedMiner> = {
        let mut rng = rand::rng();
        (1..=cli.miners)
            .map(|n| SimulatedMiner::new(format!("{}.{}", cli.subnet, 100 + n as u16), &mut rng))
            .collect()
    };

    let mut round = 0u64;
    loop {
        round += 1;

        // ThreadRng n'est pas Send : les paquets sont préparés avant tout await
        let batch: Vec<Vec<u8>> = {
            let mut rng = rand::rng();
            miners
                .iter_mut()
                .map(|miner| {
                    let packet = miner.tick(cli.interval_secs, &cli.version, &mut rng);
                    if rng.random_range(0..100) < cli.corrupt_percent {
                        packet.without("HashRate").to_bytes()
                    } else {
                        packet.to_bytes()
                    }
                })
                .collect::<Result<_>>()?
        };

        for payload in batch {
            if let Err(e) = sender.send_raw(payload).await {
                warn!("⚠️ Send failed: {}", e);
            }
        }
        debug!("📤 Round {} sent ({} miners)", round, miners.len());
        sender.clear();

        if cli.rounds.is_some_and(|max| round >= max) {
            info!("✅ {} rounds sent, stopping", round);
            return Ok(());
        }
        sleep(Duration::from_secs(cli.interval_secs)).await;
    }
}
