use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tapbot_controller::{AdbController, DeviceController, DeviceNotifier, MockController};
use tapbot_events::{log_events, LocalBus};
use tapbot_ops::{
    ensure_telemetry_dir, init_file_tracing, init_tracing, write_report, TelemetryStore,
};
use tapbot_orchestrator::{compute_scale, hydrate_setup, Orchestrator};
use tapbot_types::{
    config::TapbotConfig,
    geometry::{self, ReferenceCoordinate, REFERENCE_RESOLUTION},
    setup::{SessionSetup, SetupFile},
    telemetry::SessionReport,
    timing::Timings,
    vision::{TemplateRole, DEFAULT_MATCH_THRESHOLD},
};
use tapbot_vision::{load_template, ScreenMatcher};
use tracing::{error, info};

mod ui;

#[derive(Parser)]
#[command(name = "tapbot", about = "Template-matched tap automation for Android tap games")]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(long, env = "TAPBOT_CONFIG", default_value = "configs/dev.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record coordinates and template images into the setup file.
    Setup {
        /// "Play" button, as X,Y against 1080x1920.
        #[arg(long)]
        play: Option<ReferenceCoordinate>,
        /// Area tapped repeatedly during a round.
        #[arg(long = "move")]
        move_coords: Option<ReferenceCoordinate>,
        /// "Play again" button.
        #[arg(long)]
        play_again: Option<ReferenceCoordinate>,
        /// Image shown when a game is won.
        #[arg(long)]
        won: Option<PathBuf>,
        /// Image shown when a game is lost.
        #[arg(long)]
        lost: Option<PathBuf>,
    },
    /// Play a session of games.
    Run {
        /// Overrides session.game_count.
        #[arg(long)]
        games: Option<u32>,
        /// Use an in-process device instead of adb.
        #[arg(long)]
        dry_run: bool,
        /// Show the status display instead of plain logs.
        #[arg(long)]
        tui: bool,
    },
    /// Print the scale factor for the connected device.
    Scale,
    /// Capture the screen once and score one template.
    Detect { role: TemplateRole },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    let tui = matches!(cli.command, Command::Run { tui: true, .. });
    if tui {
        // The status display owns the terminal.
        match ensure_telemetry_dir(&config.ops.telemetry_dir)
            .and_then(|dir| init_file_tracing(&config.ops, &dir))
        {
            Ok(path) => eprintln!("Logging to {}", path.display()),
            Err(err) => eprintln!("File logging unavailable: {err}"),
        }
    } else {
        init_tracing(&config.ops)?;
    }

    match cli.command {
        Command::Setup {
            play,
            move_coords,
            play_again,
            won,
            lost,
        } => setup(&config, play, move_coords, play_again, won, lost),
        Command::Run {
            games,
            dry_run,
            tui,
        } => run(&config, games, dry_run, tui).await,
        Command::Scale => {
            let controller = connect(&config).await?;
            let scale = compute_scale(controller.as_ref(), config.device.fixed_resolution).await;
            println!("reference {REFERENCE_RESOLUTION}, scale {scale}");
            let file = read_setup_file(&config);
            for (name, coord) in [
                ("play", file.play_coords),
                ("move", file.move_coords),
                ("play_again", file.play_again_coords),
            ] {
                match (coord, geometry::scale(coord, scale)) {
                    (Some(coord), Some(point)) => println!("  {name}: {coord} -> {point}"),
                    _ => println!("  {name}: not configured"),
                }
            }
            Ok(())
        }
        Command::Detect { role } => detect(&config, role).await,
    }
}

fn load_config(path: &Path) -> TapbotConfig {
    match TapbotConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                TapbotConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            TapbotConfig::default()
        }
    }
}

/// Read-only callers carry on with an empty setup; the start gate then
/// reports what is missing.
fn read_setup_file(config: &TapbotConfig) -> SetupFile {
    match SetupFile::load_or_default(&config.session.setup_path) {
        Ok(file) => file,
        Err(err) => {
            error!("{}", err);
            SetupFile::default()
        }
    }
}

/// Loads, edits and saves the setup file. Nothing is written when the
/// existing file cannot be read.
fn update_setup_file(
    path: &str,
    edit: impl FnOnce(&mut SetupFile),
) -> tapbot_types::Result<SetupFile> {
    let mut file = SetupFile::load_or_default(path)?;
    edit(&mut file);
    file.save(path)?;
    Ok(file)
}

fn setup(
    config: &TapbotConfig,
    play: Option<ReferenceCoordinate>,
    move_coords: Option<ReferenceCoordinate>,
    play_again: Option<ReferenceCoordinate>,
    won: Option<PathBuf>,
    lost: Option<PathBuf>,
) -> Result<()> {
    let mut images = Vec::new();
    for (role, path) in [(TemplateRole::Won, won), (TemplateRole::Lost, lost)] {
        let Some(path) = path else { continue };
        // Reject images that would only fail later, at session start.
        match load_template(&path, role) {
            Ok(template) => {
                println!(
                    "Uploaded {role} image: {} ({}x{})",
                    path.display(),
                    template.width,
                    template.height
                );
                images.push((role, path));
            }
            Err(err) => {
                error!("{}", err);
                println!("Error uploading {role} image: {err}");
            }
        }
    }

    let updated = update_setup_file(&config.session.setup_path, |file| {
        file.play_coords = play.or(file.play_coords);
        file.move_coords = move_coords.or(file.move_coords);
        file.play_again_coords = play_again.or(file.play_again_coords);
        for (role, path) in images {
            match role {
                TemplateRole::Won => file.images.won = Some(path),
                TemplateRole::Lost => file.images.lost = Some(path),
            }
        }
    });
    let file = match updated {
        Ok(file) => {
            println!("Configuration saved to {}", config.session.setup_path);
            file
        }
        Err(err) => {
            error!("{}", err);
            println!("Error saving configuration: {err}");
            return Ok(());
        }
    };

    let mut setup = SessionSetup::new();
    file.coordinates_into(&mut setup);
    let missing: Vec<String> = setup
        .missing_fields()
        .into_iter()
        .filter(|field| match field.key() {
            "images.won" => file.images.won.is_none(),
            "images.lost" => file.images.lost.is_none(),
            _ => true,
        })
        .map(|field| field.to_string())
        .collect();
    if missing.is_empty() {
        println!("Setup complete.");
    } else {
        println!("Still missing: {}", missing.join(", "));
    }
    Ok(())
}

async fn connect(config: &TapbotConfig) -> Result<Arc<AdbController>> {
    let mut controller = AdbController::new(config.device.clone())?;
    controller.connect().await?;
    Ok(Arc::new(controller))
}

async fn run(config: &TapbotConfig, games: Option<u32>, dry_run: bool, tui: bool) -> Result<()> {
    let setup = hydrate_setup(&read_setup_file(config));
    let game_count = games.unwrap_or(config.session.game_count);
    let bus = LocalBus::new(256);

    let report = if tui {
        let (tx, rx) = mpsc::channel();
        let mut events = bus.subscribe();
        let forward = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        let summary = format!("games={game_count} dry_run={dry_run}");
        let display = thread::spawn(move || ui::run(rx, summary));

        let result = play_session(config, &setup, game_count, dry_run, bus).await;
        forward.abort();
        match display.join() {
            Ok(Err(err)) => eprintln!("status display error: {err}"),
            Err(_) => eprintln!("status display panicked"),
            Ok(Ok(())) => {}
        }
        result?
    } else {
        let logger = tokio::spawn(log_events(bus.subscribe()));
        let result = play_session(config, &setup, game_count, dry_run, bus).await;
        // The bus is gone once the session returns, which ends the stream.
        if let Err(err) = logger.await {
            error!("event logger failed: {}", err);
        }
        result?
    };

    match ensure_telemetry_dir(&config.ops.telemetry_dir)
        .and_then(|dir| write_report(&dir, &report))
    {
        Ok(path) => info!("Session report written to {:?}", path),
        Err(err) => {
            error!("{}", err);
            println!("Error saving session report: {err}");
        }
    }
    println!("{}", report.summary());
    Ok(())
}

async fn play_session(
    config: &TapbotConfig,
    setup: &SessionSetup,
    game_count: u32,
    dry_run: bool,
    bus: LocalBus,
) -> Result<SessionReport> {
    if dry_run {
        let config = TapbotConfig {
            timing: Timings::instant(),
            ..config.clone()
        };
        let controller = Arc::new(MockController::new(
            config.device.fixed_resolution.unwrap_or(REFERENCE_RESOLUTION),
        ));
        let detector = ScreenMatcher::new(controller.clone(), &config.vision);
        let mut orchestrator =
            Orchestrator::new(&config, controller, detector, bus, TelemetryStore::new());
        return Ok(orchestrator.run(setup, game_count).await?);
    }

    let controller = connect(config).await?;
    let detector = ScreenMatcher::new(controller.clone(), &config.vision);
    let mut orchestrator =
        Orchestrator::new(config, controller.clone(), detector, bus, TelemetryStore::new());
    if config.ops.notifications {
        orchestrator = orchestrator.with_notifier(Arc::new(DeviceNotifier::new(controller)));
    }
    Ok(orchestrator.run(setup, game_count).await?)
}

async fn detect(config: &TapbotConfig, role: TemplateRole) -> Result<()> {
    let file = read_setup_file(config);
    let Some(path) = file.images.get(role) else {
        bail!("no {role} template configured in {}", config.session.setup_path);
    };
    let template = load_template(path, role)?;
    let controller = connect(config).await?;
    let matcher = ScreenMatcher::new(controller, &config.vision);
    let threshold = config.vision.confidence_threshold;
    let result = matcher
        .evaluate(&template, threshold)
        .await
        .with_context(|| format!("matching {role} template"))?;
    println!(
        "{role}: score {:.4} (threshold {:.2}, default {:.2}) -> {}",
        result.score,
        threshold,
        DEFAULT_MATCH_THRESHOLD,
        if result.matched { "match" } else { "no match" }
    );
    Ok(())
}
