//! Mole Buster Match Server
//!
//! Runs the WebSocket server, or with `--demo` plays a scripted match twice
//! in-process and checks both runs produce the same events.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mole_buster::{
    VERSION,
    config::{ConfigCatalog, GameModeId, MatchSettings},
    game::{GameEvent, HitRequest, MatchId, MatchState, Millis, PlayerId},
    network::{GameServer, ServerConfig, ServerMessage},
};

const DEMO_SEED: u64 = 12345;
const DEMO_STEP_MS: Millis = 50;
const DEMO_PLAYERS: [&str; 3] = ["alice", "bob", "carol"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Mole Buster Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let catalog = config.load_catalog().context("failed to load config catalog")?;

    if std::env::args().any(|arg| arg == "--demo") {
        return demo_match(catalog, config.session.match_settings);
    }

    let server = GameServer::new(config, catalog);
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

/// Play the scripted match twice and compare the event streams.
fn demo_match(catalog: Arc<ConfigCatalog>, settings: MatchSettings) -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");
    info!("RNG Seed: {}", DEMO_SEED);

    let first = play_scripted(catalog.clone(), &settings)?;
    let second = play_scripted(catalog, &settings)?;

    info!("Total events: {}", first.len());

    info!("=== Verifying Determinism ===");
    if first != second {
        bail!("DETERMINISM FAILURE: event streams differ");
    }
    info!("DETERMINISM VERIFIED: {} events match", first.len());

    Ok(())
}

/// One scripted timed match. Every mole draws a hit from one player after a
/// reaction delay derived from its id; every third mole is contested by a
/// second player one millisecond later.
fn play_scripted(catalog: Arc<ConfigCatalog>, settings: &MatchSettings) -> anyhow::Result<Vec<GameEvent>> {
    let match_id = MatchId::from_bytes([1; 16]);
    let mut state = MatchState::new(match_id, GameModeId::Timed, catalog, settings, DEMO_SEED);

    let mut log = state.start(0)?;
    let mut scripted: Vec<(Millis, HitRequest)> = Vec::new();
    let mut now = 0;

    while !state.is_finished() {
        now += DEMO_STEP_MS;

        let (due, later): (Vec<_>, Vec<_>) = scripted.into_iter().partition(|(at, _)| *at <= now);
        scripted = later;
        for (at, request) in due {
            state.enqueue_hit(request, at);
        }

        let result = state.tick(now);
        for event in &result.events {
            debug!("{}", ServerMessage::from_game_event(match_id, event).to_json()?);

            if let GameEvent::MoleSpawned { mole_id, spawned_at, .. } = event {
                let n = mole_id.0 as usize;
                let reaction = 400 + (u64::from(mole_id.0) * 379) % 4000;
                let player = DEMO_PLAYERS[n % DEMO_PLAYERS.len()];
                scripted.push((spawned_at + reaction, HitRequest {
                    mole_id: *mole_id,
                    match_id,
                    player_id: PlayerId::new(player),
                }));
                if n % 3 == 0 {
                    let rival = DEMO_PLAYERS[(n + 1) % DEMO_PLAYERS.len()];
                    scripted.push((spawned_at + reaction + 1, HitRequest {
                        mole_id: *mole_id,
                        match_id,
                        player_id: PlayerId::new(rival),
                    }));
                }
            }
        }
        log.extend(result.events);

        if now % 30_000 == 0 {
            info!(
                "t={}s: {} active moles, {:?}s remaining",
                now / 1000,
                state.board().active_count(),
                state.remaining_time_seconds()
            );
        }
    }

    info!("=== Match Results ===");
    let summary = state.summary();
    info!(
        "Finished ({:?}): {} moles, {} hits accepted, {} rejected",
        summary.finish_reason, summary.moles_spawned, summary.hits_accepted, summary.hits_rejected
    );
    for (place, standing) in summary.standings.iter().enumerate() {
        info!("#{}: {} - Score: {}", place + 1, standing.player_id, standing.total_score);
    }

    Ok(log)
}
