use anyhow::Context;
use clap::{Parser, Subcommand};
use shoebox_simulator::{
    config::{ServerConfig, SimulatorSettings},
    store::{MemoryStore, Store},
    Api, Simulator,
};
use shoebox_types::{api::SimulationResponse, SimulationConfig};
use std::{fmt::Write, fs, path::PathBuf, str::FromStr, sync::Arc};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the simulation API over HTTP.
    Serve {
        /// YAML server configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        log_level: Option<String>,

        #[arg(long)]
        json_logs: bool,
    },
    /// Run one simulation and print the response as JSON.
    Run {
        /// Print per-play tallies and timing instead of JSON.
        #[arg(long)]
        summary: bool,

        /// JSON simulation request. Overrides the flags below.
        #[arg(short, long)]
        request: Option<PathBuf>,

        #[arg(long, default_value_t = 1)]
        plays: u32,

        #[arg(long, default_value_t = 10)]
        games_per_play: u32,

        #[arg(long, default_value_t = 60)]
        hands_per_game: u32,

        #[arg(long, default_value_t = 8)]
        deck_count: u32,

        #[arg(long, default_value_t = 0)]
        skip_card: u32,

        #[arg(long, default_value_t = 0)]
        small_card_reduction_pct: u8,

        #[arg(long, default_value_t = 0)]
        big_card_reduction_pct: u8,

        #[arg(long)]
        continuous: bool,

        #[arg(long)]
        seed: Option<u64>,

        /// Worker pool size; 0 selects the available parallelism.
        #[arg(long, default_value_t = 0)]
        workers: usize,

        #[arg(long, default_value = "warn")]
        log_level: String,
    },
}

fn init_logging(level: Level, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Per-play tallies and timing as a plain table.
fn summary(response: &SimulationResponse) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "simulation {} ({}, seed {})",
        response.simulation_id, response.tier, response.seed
    );
    let _ = writeln!(
        out,
        "{:>6} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}",
        "play", "hands", "banker", "player", "tie", "banker pair", "player pair"
    );
    for play in &response.results {
        let tally = play.play.tally();
        let _ = writeln!(
            out,
            "{:>6} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}",
            play.play.play_number,
            tally.total_hands,
            tally.banker_wins,
            tally.player_wins,
            tally.tie_wins,
            tally.banker_pairs,
            tally.player_pairs,
        );
    }
    let timing = &response.timing;
    let _ = writeln!(
        out,
        "{} hands in {:.3}s ({} hands/s)",
        timing.total_hands, timing.duration_seconds, timing.hands_per_second
    );
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    match args.command {
        Command::Serve {
            config,
            port,
            log_level,
            json_logs,
        } => {
            let mut server_config = match config {
                Some(path) => ServerConfig::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => ServerConfig::default(),
            };
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(log_level) = log_level {
                server_config.log_level = log_level;
            }
            server_config.json_logs |= json_logs;
            let config = server_config
                .validate()
                .context("invalid server configuration")?;

            // Create logger
            init_logging(config.log_level, config.json_logs);

            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let simulator = Arc::new(
                Simulator::new(config.settings, store).context("failed to start simulator")?,
            );
            let app = Api::new(simulator)
                .with_rate_limit(config.rate_limit_per_second)
                .router();

            // Start server
            let addr = format!("0.0.0.0:{}", config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!("Listening on {}", addr);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .context("axum server error")?;
        }
        Command::Run {
            summary,
            request,
            plays,
            games_per_play,
            hands_per_game,
            deck_count,
            skip_card,
            small_card_reduction_pct,
            big_card_reduction_pct,
            continuous,
            seed,
            workers,
            log_level,
        } => {
            let level = Level::from_str(&log_level)
                .map_err(|_| anyhow::anyhow!("invalid log level: {log_level}"))?;
            init_logging(level, false);

            let config = match request {
                Some(path) => {
                    let contents = fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&contents)
                        .with_context(|| format!("failed to parse {}", path.display()))?
                }
                None => SimulationConfig {
                    plays,
                    games_per_play,
                    hands_per_game,
                    deck_count,
                    skip_card,
                    small_card_reduction_pct,
                    big_card_reduction_pct,
                    continuous_mode: continuous,
                    use_in_memory: true,
                    seed,
                },
            };

            let settings = SimulatorSettings {
                worker_threads: workers,
                ..Default::default()
            };
            let simulator = Simulator::new(settings, Arc::new(MemoryStore::new()))
                .context("failed to start simulator")?;
            let response = simulator.run(config).await.context("simulation failed")?;
            if summary {
                print!("{}", self::summary(&response));
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&response)
                        .context("failed to encode response")?
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_summary_lists_every_play() {
        let settings = SimulatorSettings {
            worker_threads: 2,
            ..Default::default()
        };
        let simulator = Simulator::new(settings, Arc::new(MemoryStore::new())).unwrap();
        let response = simulator
            .run(SimulationConfig {
                plays: 2,
                games_per_play: 3,
                hands_per_game: 10,
                use_in_memory: true,
                seed: Some(9),
                ..Default::default()
            })
            .await
            .unwrap();

        let text = summary(&response);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("in-memory, seed 9"));
        assert!(lines[1].contains("banker pair"));
        let first: Vec<&str> = lines[2].split_whitespace().collect();
        assert_eq!(first[0], "1");
        assert_eq!(first[1], "30");
        let counted: u32 = first[2..5].iter().map(|n| n.parse::<u32>().unwrap()).sum();
        assert_eq!(counted, 30);
        assert!(lines[3].trim_start().starts_with("2 "));
        assert!(lines[4].starts_with("60 hands in "));
    }
}
