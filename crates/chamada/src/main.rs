//! `chamada` - CLI for the attendance scanner
//!
//! This binary stores the session token, runs the scanner against codes
//! read from a terminal or file, and shows the attempt journal.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

use chamada::camera::LineCamera;
use chamada::cli::{Cli, Command, ConfigCommand, HistoryCommand, ProfileCommand, ScanCommand};
use chamada::credentials::{TokenClaims, STUDENT_ID_KEY, TOKEN_KEY};
use chamada::device::{ConsoleNavigator, Coordinates, FixedGeolocator, StaticPermissions};
use chamada::notify::ConsoleSink;
use chamada::submit::HttpAttendanceApi;
use chamada::{init_logging, Config, Platform, ScanScreen, ScreenExit, ScreenOptions};
use chamada::{SharedStorage, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    // Execute the command
    match cli.command {
        Command::Scan(scan_cmd) => {
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            let result = runtime.block_on(handle_scan(config, scan_cmd));
            // A pending stdin read must not hold up exit.
            runtime.shutdown_background();
            result
        }
        Command::Login(login_cmd) => handle_login(&config, &login_cmd.token),
        Command::Logout => handle_logout(&config),
        Command::Profile(profile_cmd) => handle_profile(&config, &profile_cmd),
        Command::History(history_cmd) => handle_history(&config, &history_cmd),
        Command::Config(config_cmd) => handle_config(&config, cli.config, config_cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening database at {}", path.display()))
}

async fn handle_scan(mut config: Config, cmd: ScanCommand) -> anyhow::Result<()> {
    if let (Some(lat), Some(long)) = (cmd.lat, cmd.long) {
        config.location.latitude = Some(lat);
        config.location.longitude = Some(long);
    }
    if let Some(repeat) = cmd.repeat {
        config.camera.repeat = repeat;
    }
    if let Some(policy) = cmd.location_policy {
        config.location.policy = policy.into();
    }
    config.validate()?;

    let storage = SharedStorage::new(open_storage(&config)?, config.storage.max_attempts);
    let api = HttpAttendanceApi::new(config.attendance_url(), config.request_timeout())?;
    let position = config
        .location
        .latitude
        .zip(config.location.longitude)
        .map(|(lat, long)| Coordinates::new(lat, long));
    info!(url = api.url(), position = ?position, "starting scanner");

    let platform = Platform {
        permissions: Arc::new(StaticPermissions::new(!cmd.deny_camera, !cmd.deny_location)),
        geolocator: Arc::new(FixedGeolocator::new(position)),
        api: Arc::new(api),
        store: Arc::new(storage),
        navigator: Box::new(ConsoleNavigator),
        sink: Box::new(ConsoleSink::new(std::io::stdout())),
    };
    let screen = ScanScreen::new(ScreenOptions::from_config(&config), platform);

    let exit = match &cmd.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            run_screen(screen, &config, BufReader::new(file)).await?
        }
        None => run_screen(screen, &config, BufReader::new(tokio::io::stdin())).await?,
    };

    if exit == ScreenExit::CameraClosed {
        println!("No attendance recorded.");
    }
    Ok(())
}

async fn run_screen<R>(screen: ScanScreen, config: &Config, reader: R) -> anyhow::Result<ScreenExit>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let camera = LineCamera::new(reader, config.camera.repeat, config.frame_interval());
    Ok(screen.run(camera).await?)
}

fn handle_login(config: &Config, token: &str) -> anyhow::Result<()> {
    let claims = TokenClaims::decode(token)?;
    let student_id = claims.student_id()?;

    let storage = open_storage(config)?;
    storage.set(TOKEN_KEY, token.trim())?;
    storage.set(STUDENT_ID_KEY, &student_id.to_string())?;

    match &claims.nome {
        Some(nome) => println!("Logged in as {nome} (id {student_id})."),
        None => println!("Logged in (id {student_id})."),
    }
    Ok(())
}

fn handle_logout(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let had_token = storage.remove(TOKEN_KEY)?;
    storage.remove(STUDENT_ID_KEY)?;

    if had_token {
        println!("Logged out.");
    } else {
        println!("No session stored.");
    }
    Ok(())
}

fn handle_profile(config: &Config, cmd: &ProfileCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let token = storage
        .get(TOKEN_KEY)?
        .ok_or(chamada::Error::MissingCredential { key: TOKEN_KEY })?;
    let claims = TokenClaims::decode(&token)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&claims)?);
    } else {
        println!("Profile");
        println!("=======");
        println!("  Id:    {}", claims.id);
        println!("  Name:  {}", claims.nome.as_deref().unwrap_or("-"));
        println!("  CPF:   {}", claims.cpf.as_deref().unwrap_or("-"));
        println!("  RA:    {}", claims.ra.as_deref().unwrap_or("-"));
        if let Some(exp) = claims.exp.and_then(|exp| chrono::DateTime::from_timestamp(exp, 0)) {
            println!("  Valid until: {}", exp.to_rfc3339());
        }
    }
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let attempts = storage.recent_attempts(cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No attempts recorded.");
        return Ok(());
    }
    for attempt in &attempts {
        println!(
            "{}  {:<20}  call {:<8}  {}",
            attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
            attempt.outcome,
            attempt.call_id.as_deref().unwrap_or("-"),
            attempt.message
        );
    }
    Ok(())
}

fn handle_config(
    config: &Config,
    config_path: Option<std::path::PathBuf>,
    cmd: ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[API]");
                println!("  Endpoint:           {}", config.attendance_url());
                println!("  Timeout (s):        {}", config.api.timeout_secs);
                println!();
                println!("[Gate]");
                println!("  Quiet interval:     {} ms", config.gate.quiet_interval_ms);
                println!("  Fail-safe interval: {} ms", config.gate.failsafe_interval_ms);
                println!("  Success delay:      {} ms", config.gate.success_delay_ms);
                println!();
                println!("[Banner]");
                println!("  Hold:               {} ms", config.banner.hold_ms);
                println!("  Fade:               {} ms", config.banner.fade_ms);
                println!();
                println!("[Location]");
                println!("  Policy:             {:?}", config.location.policy);
                match config.location.latitude.zip(config.location.longitude) {
                    Some((lat, long)) => {
                        println!("  Fixed position:     {}", Coordinates::new(lat, long));
                    }
                    None => println!("  Fixed position:     none"),
                }
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max attempts:       {}", config.storage.max_attempts);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
