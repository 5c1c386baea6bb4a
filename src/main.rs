use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use world_of_bits::config::GameConfig;
use world_of_bits::explorer;
use world_of_bits::movement::{LocationFeed, TrackFeed};
use world_of_bits::persistence::FileSlot;
use world_of_bits::session::GameSession;

#[derive(Parser, Debug)]
#[command(name = "world_of_bits")]
#[command(about = "Explore a map grid, collect caches and merge equal values")]
struct Args {
    /// Directory holding the save file and the log
    #[arg(long, default_value = ".")]
    save_dir: PathBuf,

    /// JSON file overriding gameplay settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Location track for GEO mode (one "lat,lng" per line)
    #[arg(short, long)]
    track: Option<PathBuf>,

    /// Milliseconds between track positions
    #[arg(long, default_value = "1000")]
    track_interval_ms: u64,

    /// Ignore any saved game and start fresh
    #[arg(long)]
    fresh: bool,
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    // The terminal belongs to the map, so logs go to a file
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(args.save_dir.join("world_of_bits.log"))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

fn open_track(args: &Args) -> Option<Box<dyn LocationFeed>> {
    let path = args.track.as_ref()?;
    match TrackFeed::load(path, Duration::from_millis(args.track_interval_ms)) {
        Ok(feed) => {
            log::info!("Loaded track {} ({} points)", path.display(), feed.remaining());
            Some(Box::new(feed))
        }
        Err(e) => {
            log::warn!("Failed to load track {}: {}", path.display(), e);
            None
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    fs::create_dir_all(&args.save_dir)?;
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => GameConfig::load(path)?,
        None => GameConfig::default(),
    };
    log::info!(
        "Origin ({}, {}), view radius {}, spawn probability {}",
        config.origin.lat,
        config.origin.lng,
        config.view_radius,
        config.spawn_probability
    );

    let slot = FileSlot::new(&args.save_dir);
    let feed = open_track(&args);
    let session = if args.fresh {
        GameSession::new(config, slot, feed)
    } else {
        GameSession::open(config, slot, feed)
    };

    explorer::run_explorer(session)
}
