mod input;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use rocketmen::net::INDEX_NONE;
use rocketmen::{
    Client, ClientConfig, Entity, EntityCollection, FixedTimestep, Frame, PlayerId, SessionEvent,
    World,
};

use input::ScriptedInput;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Headless RocketMen client")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27015",
        help = "Server address to connect to"
    )]
    server: SocketAddr,

    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1, help = "Local players sharing this connection")]
    players: usize,

    #[arg(short, long, default_value_t = rocketmen::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, help = "Disconnect after this many ticks")]
    ticks: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    let mut client = Client::new(config);
    for controller_id in 0..args.players {
        if client
            .add_local_player(controller_id as i32, controller_id == 0)
            .is_none()
        {
            break;
        }
    }
    client
        .connect(args.server)
        .with_context(|| format!("Failed to connect to {}", args.server))?;

    let mut world = World::new();
    let mut input = ScriptedInput::new();
    let mut timestep = FixedTimestep::new(args.tick_rate);
    let mut last_tick_time = Instant::now();
    let mut ticks = 0u64;

    'running: loop {
        let now = Instant::now();
        timestep.accumulate((now - last_tick_time).as_secs_f64());
        last_tick_time = now;

        while let Some(frame_id) = timestep.consume_tick() {
            let dt = timestep.dt();
            input.advance();

            for event in client.update(dt, &mut world, &mut input)? {
                match event {
                    SessionEvent::Connected { client_id } => {
                        log::info!("Connected as client {}", client_id);
                    }
                    SessionEvent::PlayersAccepted { player_ids } => {
                        for player_id in player_ids {
                            spawn_avatar(&mut client, &mut world, player_id);
                        }
                    }
                    SessionEvent::EntityAccepted {
                        temp_id,
                        network_id,
                    } => log::info!("Avatar {} is now entity {}", temp_id, network_id),
                    SessionEvent::LatencyMeasured { latency_ms } => {
                        log::info!("Latency {:.1} ms", latency_ms);
                    }
                    SessionEvent::Disconnected { reason } => {
                        log::info!("Session over: {}", reason.as_str());
                        break 'running;
                    }
                    other => log::debug!("{:?}", other),
                }
            }

            let frame = client.simulate(frame_id);
            apply_frame(&client, &mut world, &frame, dt as f32);
            world.step(dt as f32);
            world.remove_dead();

            ticks += 1;
            if args.ticks.is_some_and(|limit| ticks == limit) {
                client.disconnect()?;
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}

fn spawn_avatar(client: &mut Client, world: &mut World, player_id: PlayerId) {
    let entity = world.insert(Entity::rocket_man(INDEX_NONE, player_id));
    match client.spawn_predicted(entity) {
        Ok(temp_id) => log::info!("Spawning avatar for player {} as {}", player_id, temp_id),
        Err(e) => log::warn!("Could not spawn avatar for player {}: {}", player_id, e),
    }
}

/// Predicts local players' avatars from this frame's actions.
fn apply_frame(client: &Client, world: &mut World, frame: &Frame, dt: f32) {
    for (player, actions) in client.local_players().iter().zip(&frame.actions) {
        let Some(player_id) = player.player_id else {
            continue;
        };
        let avatar = world
            .entities()
            .find(|e| e.alive && e.owner == Some(player_id))
            .map(|e| e.network_id);
        if let Some(network_id) = avatar {
            world.apply_actions(network_id, actions, dt);
        }
    }
}
