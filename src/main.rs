// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use padboard::audio::{self, PlaybackEnd};
use padboard::board::{describe_pad, Board};
use padboard::config::{store, BoardConfig, Settings};
use padboard::controller::{self, keyboard, Controller, Event};
use padboard::playback::{master_volume_from_percent, TriggerError};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A grid sound-trigger pad board."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start runs the pad board, reading commands from the keyboard.
    Start {
        /// The path to the board file. Defaults to config.json beside the executable.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The path to a YAML settings file.
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
    /// Lists the pads in the board file and flags missing media.
    Pads {
        /// The path to the board file. Defaults to config.json beside the executable.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Plays a single file to the end through the configured backend.
    Play {
        /// The audio file to play.
        path: PathBuf,
        /// The volume, 0 to 100.
        #[arg(short, long, default_value_t = 100.0)]
        volume: f64,
        /// The path to a YAML settings file.
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, settings } => {
            let settings = Settings::load(settings.as_deref())?;
            let path = config.unwrap_or_else(store::resolve_config_path);
            let backend = audio::get_backend(settings.backend())?;

            let (events_tx, events_rx) = controller::channel();
            let reload_tx = events_tx.clone();
            let board = Board::open(&path, &settings, backend, move || {
                if reload_tx.blocking_send(Event::Reload).is_err() {
                    debug!("Controller closed before reload");
                }
            })?;

            let mut controller = Controller::new(
                board,
                Arc::new(keyboard::Driver::new()),
                (events_tx, events_rx),
            );
            let interrupted = tokio::select! {
                result = controller.join() => {
                    result?;
                    false
                }
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                controller.quit().await;
                controller.join().await?;
                // The keyboard driver is blocked on stdin and can't be joined.
                std::process::exit(0);
            }
        }
        Commands::Pads { config } => {
            let path = config.unwrap_or_else(store::resolve_config_path);
            let mut board = match store::read(&path) {
                Ok(board) => board,
                Err(e) => {
                    println!("Unable to read {}: {}", path.display(), e);
                    println!("Showing the default board.");
                    BoardConfig::default()
                }
            };
            board.reconcile();

            println!(
                "Board {}x{} (pads: {}):",
                board.rows(),
                board.cols(),
                board.pads().len()
            );
            for (slot, pad) in board.pads().iter().enumerate() {
                println!("{}", describe_pad(slot, pad));
            }
        }
        Commands::Play {
            path,
            volume,
            settings,
        } => {
            if !path.is_file() {
                return Err(TriggerError::MediaNotFound(path).into());
            }
            let settings = Settings::load(settings.as_deref())?;
            let backend = audio::get_backend(settings.backend())?;

            let (end_tx, end_rx) = oneshot::channel();
            let mut handle = backend.open(
                &path,
                Box::new(move |end| {
                    let _ = end_tx.send(end);
                }),
            )?;
            handle.set_volume(master_volume_from_percent(volume));
            handle.play()?;

            let end = end_rx.await;
            handle.dispose()?;
            match end? {
                PlaybackEnd::Finished => println!("Finished playing {}.", path.display()),
                PlaybackEnd::Failed(reason) => return Err(reason.into()),
            }
        }
    }

    Ok(())
}
