//! navcharts CLI entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;

use navcharts::auth::{AuthSession, ChartCredentials};
use navcharts::config::{self, Config};
use navcharts::tiles::{ChartTileSource, TileAddress, TileSource};
use navcharts::{ui, Error};

#[derive(Parser)]
#[command(name = "navcharts")]
#[command(about = "Chart provider login and enroute chart tiles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Log in to the chart provider in the browser
    Login {
        /// Print the login URL without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Log in again with the saved login
    Relogin,

    /// Forget the saved login
    Logout,

    /// Show login status
    Status,

    /// Show which tile covers a position
    Locate {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(short, long, default_value_t = 10)]
        zoom: u32,
    },

    /// Download one enroute chart tile as PNG
    Tile {
        #[arg(short, long)]
        x: i32,

        #[arg(short, long)]
        y: i32,

        #[arg(short, long, default_value_t = 10)]
        zoom: u32,

        /// Output file
        #[arg(short, long, default_value = "tile.png")]
        out: PathBuf,

        /// Night colors
        #[arg(long)]
        night: bool,

        /// High-altitude routes
        #[arg(long)]
        high: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let path = config::config_path();
            if path.exists() && !force {
                ui::print_warning(&format!("Config already exists at {:?} (use --force to overwrite)", path));
                return Ok(());
            }
            config::save(&Config::default())?;
            ui::print_success(&format!("Wrote {:?}", path));
        }

        Commands::Login { no_browser } => {
            run_login(no_browser).await?;
        }

        Commands::Relogin => {
            let (_, session) = open_session()?;
            if relogin(&session).await? {
                ui::print_success("Logged in with the saved login");
            }
        }

        Commands::Logout => {
            let (_, session) = open_session()?;
            session.logout();
            ui::print_success("Logged out successfully");
        }

        Commands::Status => {
            let (config, session) = open_session()?;
            ui::print_header("Status");
            ui::print_step(&format!("Config: {:?}", config::config_path()));
            ui::print_step(&format!("Cache: {:?}", config.cache_dir));
            ui::print_step(&format!("Client id: {}", config.client_id));
            ui::print_step(&format!(
                "Login supported: {}",
                if session.is_supported() { "✓" } else { "no (built without client secret)" }
            ));
            ui::print_step(&format!(
                "Saved login: {}",
                if session.can_relogin() { "✓" } else { "none (run 'navcharts login')" }
            ));
            ui::print_step(&format!("Session: {}", ui::state_label(session.state())));
        }

        Commands::Locate { lon, lat, zoom } => {
            let (config, session) = open_session()?;
            let credentials: Arc<dyn ChartCredentials> = session;
            let source = ChartTileSource::from_config(credentials, &config);

            let point = source.world_to_xy(lon, lat, zoom);
            let tile = TileAddress::new(0, point.x.floor() as i32, point.y.floor() as i32, zoom);
            let corner = source.xy_to_world(f64::from(tile.x), f64::from(tile.y), zoom);

            println!("Tile position: {:.4}, {:.4}", point.x, point.y);
            println!("Tile: {}", tile);
            println!("North-west corner: {:.6}, {:.6}", corner.x, corner.y);
            match source.unique_tile_name(&tile) {
                Ok(name) => println!("Path: {}", name),
                Err(e) => ui::print_warning(&e.to_string()),
            }
        }

        Commands::Tile { x, y, zoom, out, night, high } => {
            run_tile(TileAddress::new(0, x, y, zoom), out, night, high).await?;
        }
    }

    Ok(())
}

fn open_session() -> Result<(Config, Arc<AuthSession>)> {
    let config = config::load_or_default()?;
    let session = AuthSession::from_config(&config)?;
    Ok((config, Arc::new(session)))
}

/// Relogin, reporting the expected failures. Returns whether it worked.
async fn relogin(session: &AuthSession) -> Result<bool> {
    if !session.is_supported() {
        ui::print_error("This build has no client secret, chart login is unavailable");
        return Ok(false);
    }

    let spinner = ui::spinner("Logging in");
    let result = session.relogin().await;
    spinner.finish_and_clear();

    match result {
        Ok(()) => Ok(true),
        Err(Error::NoRefreshToken) => {
            ui::print_warning("No saved login, run 'navcharts login' first");
            Ok(false)
        }
        Err(Error::LoginExpired) => {
            ui::print_warning("Saved login is no longer valid, run 'navcharts login' again");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_login(no_browser: bool) -> Result<()> {
    let (config, session) = open_session()?;

    if !session.is_supported() {
        ui::print_error("This build has no client secret, chart login is unavailable");
        return Ok(());
    }

    let pending = session.start_auth().await?;

    let handle = Arc::clone(&session);
    ui::on_interrupt(move || handle.cancel_auth());

    ui::print_step("Log in to the chart provider in your browser");
    println!("\nIf the browser doesn't open, visit this URL:\n{}\n", pending.url());

    if !no_browser {
        if let Err(e) = open::that(pending.url()) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let spinner = ui::spinner("Waiting for authorization (Ctrl+C to cancel)");
    let result = pending.wait().await;
    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            ui::print_success("Logged in");
            ui::print_step(&format!("Login saved to {:?}", config.cache_dir));
        }
        Err(Error::Cancelled) => ui::print_warning("Login cancelled"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn run_tile(tile: TileAddress, out: PathBuf, night: bool, high: bool) -> Result<()> {
    let (mut config, session) = open_session()?;
    if night {
        config.charts.day_mode = false;
    }
    if high {
        config.charts.high_routes = true;
    }

    if !relogin(&session).await? {
        return Ok(());
    }

    let credentials: Arc<dyn ChartCredentials> = session.clone();
    let source = Arc::new(ChartTileSource::from_config(credentials, &config));

    let handle = Arc::clone(&source);
    let auth = Arc::clone(&session);
    ui::on_interrupt(move || {
        handle.cancel_pending_loads();
        auth.cancel_auth();
    });

    let spinner = ui::spinner(&format!("Downloading tile {}", tile));
    let result = source.load_tile_image(&tile).await;
    spinner.finish_and_clear();

    let image = result?;
    image.save(&out)?;
    ui::print_success(&format!("Saved {}x{} tile to {:?}", image.width(), image.height(), out));
    Ok(())
}
