mod simulation;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use rocketmen::{FixedTimestep, PacketLossSimulation, Server, ServerConfig, UdpEndpoint};
use simulation::Game;

#[derive(Parser)]
#[command(name = "rocketmen-server")]
#[command(about = "RocketMen dedicated server")]
struct Args {
    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long)]
    max_clients: Option<usize>,

    #[arg(long, default_value_t = 4, help = "Props spawned at startup")]
    props: usize,

    #[arg(long, help = "Stop after this many ticks")]
    ticks: Option<u64>,

    #[arg(long, help = "Enable global packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }

    let mut endpoint = UdpEndpoint::bind(("0.0.0.0", config.port))
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    if args.simulate_packet_loss {
        log::warn!("Simulating {}% packet loss", args.loss_percent);
        endpoint.set_packet_loss(PacketLossSimulation::new(args.loss_percent));
    }

    let mut timestep = FixedTimestep::new(config.tick_rate);
    let mut server = Server::with_socket(config, Box::new(endpoint));
    let mut game = Game::new();
    game.spawn_props(&mut server, args.props);

    log::info!("Server started on {}", server.local_addr());

    let mut last_tick_time = Instant::now();
    let mut ticks = 0u64;
    while args.ticks.is_none_or(|limit| ticks < limit) {
        let now = Instant::now();
        timestep.accumulate((now - last_tick_time).as_secs_f64());
        last_tick_time = now;

        while timestep.consume_tick().is_some() {
            let dt = timestep.dt();
            for event in server.update(dt, &mut game.world)? {
                game.handle_event(&mut server, event);
            }
            game.step(dt as f32);
            ticks += 1;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!("Server shutting down after {} ticks", ticks);
    Ok(())
}
