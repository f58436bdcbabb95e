use clap::{Parser, Subcommand};
use fwdplane::capture::AfPacketSocket;
use fwdplane::config::Config;
use fwdplane::dataplane::{Iface, RouteEntry, Router};
use fwdplane::protocol::MacAddr;
use fwdplane::telemetry::logging::init_logging;
use fwdplane::telemetry::metrics::MetricsRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const FRAME_BUF_SIZE: usize = 2048;
const DISPATCH_QUEUE_DEPTH: usize = 1024;
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "fwdplane")]
#[command(about = "Forwarding-plane core of a software IP router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Validate config.toml and exit
    Check {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Check { config }) => cmd_check(&config),
        Some(Commands::Run { config }) => cmd_run(&config),
        None => cmd_run(Path::new("config.toml")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {e}");
        std::process::exit(1);
    }
}

fn cmd_check(config_path: &Path) -> Result<(), String> {
    let config = Config::load(config_path).map_err(|e| e.to_string())?;
    println!(
        "{} OK: {} interface(s), {} route(s)",
        config_path.display(),
        config.interface.len(),
        config.route.len()
    );
    Ok(())
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    let config = Config::load(config_path).map_err(|e| e.to_string())?;
    init_logging(Some(&config.log));
    info!("loading {}", config_path.display());

    let rt = Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    rt.block_on(async move {
        let mut router = Router::new(Arc::new(MetricsRegistry::new()));
        let mut sockets: HashMap<String, Arc<AfPacketSocket>> = HashMap::new();

        for iface_cfg in &config.interface {
            let socket = AfPacketSocket::bind(&iface_cfg.name).map_err(|e| {
                format!(
                    "failed to bind {}: {e} (CAP_NET_RAW required)",
                    iface_cfg.name
                )
            })?;

            // config override wins; validation already checked the syntax
            let mac = match &iface_cfg.mac {
                Some(s) => s.parse::<MacAddr>().map_err(|e| e.to_string())?,
                None => socket.mac(),
            };

            info!(name = %iface_cfg.name, %mac, ip = %iface_cfg.address, "interface up");
            router.add_interface(Iface {
                name: iface_cfg.name.clone(),
                mac,
                ip: iface_cfg.address,
            });
            sockets.insert(iface_cfg.name.clone(), Arc::new(socket));
        }

        for route_cfg in &config.route {
            router
                .add_route(RouteEntry {
                    network: route_cfg.network,
                    mask: route_cfg.mask,
                    gateway: route_cfg.gateway,
                    interface: route_cfg.interface.clone(),
                })
                .map_err(|e| e.to_string())?;
            debug!(
                network = %route_cfg.network,
                mask = %route_cfg.mask,
                interface = %route_cfg.interface,
                "route added"
            );
        }

        let (tx, mut rx) = mpsc::channel::<(String, Vec<u8>)>(DISPATCH_QUEUE_DEPTH);

        // one reader task per interface, all feeding the single dispatcher
        for (name, socket) in &sockets {
            let name = name.clone();
            let socket = Arc::clone(socket);
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; FRAME_BUF_SIZE];
                loop {
                    match socket.recv(&mut buf).await {
                        Ok(len) => {
                            if tx.send((name.clone(), buf[..len].to_vec())).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            error!(interface = %name, "receive error: {e}");
                            return;
                        }
                    }
                }
            });
        }
        drop(tx);

        info!("router started");
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);

        loop {
            let result = tokio::select! {
                _ = ticker.tick() => router.run_maintenance(),
                received = rx.recv() => match received {
                    Some((ingress, frame)) => router.process_frame(&ingress, &frame),
                    None => return Err("all interface readers exited".to_string()),
                },
            };

            match result {
                Ok(output) => {
                    for (egress, frame) in output {
                        let Some(socket) = sockets.get(&egress) else {
                            return Err(format!("no socket for interface {egress}"));
                        };
                        if let Err(e) = socket.send(&frame).await {
                            warn!(interface = %egress, "send error: {e}");
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("fatal error: {e}");
                    return Err(e.to_string());
                }
                Err(e) => debug!("frame dropped: {e}"),
            }
        }
    })
}
