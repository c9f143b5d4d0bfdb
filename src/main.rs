/*
 *  main.rs
 *
 *  teeloc - where am I
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use anyhow::{bail, Context};
use env_logger::Env;
use log::{error, info, warn};
use std::io::{self, IsTerminal};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{signal, SignalKind}; // Import specific Unix signals

use teeloc::config::{self, OutputFormat};
use teeloc::controller::{Controller, ControllerState, ViewState};
use teeloc::geocode::build_geocoder;
use teeloc::location::build_provider;
use teeloc::render::{self, Screen};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

/// Spinner frame period while the view is loading
const SPINNER_PERIOD: Duration = Duration::from_millis(100);

/// Render the view on every state change until the controller goes away.
/// A live view clears the screen between frames and animates the spinner.
async fn show_states(
    mut states: watch::Receiver<ControllerState>,
    format: OutputFormat,
    live: bool,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut spinner = tokio::time::interval(SPINNER_PERIOD);
    spinner.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0u64;
    let mut view = states.borrow_and_update().view_state();
    let mut redraw = true;

    loop {
        if redraw {
            if live {
                render::clear_screen(&mut stdout)?;
            }
            render::render(&mut stdout, &view, format, Screen::detect(), tick)?;
        }
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = states.borrow_and_update().view_state();
                redraw = next != view;
                view = next;
            }
            _ = spinner.tick(), if live && view == ViewState::Loading => {
                tick += 1;
                redraw = true;
            }
        }
    }
    Ok(())
}

enum OneShot {
    Answered(ViewState),
    TimedOut,
    Interrupted,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;

    // logs go to stderr, stdout is for the view
    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} v.{} built {} ({})",
        env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), BUILD_DATE, BUILD_PROFILE);

    let provider = build_provider(&cfg);
    let geocoder = build_geocoder(&cfg).context("building reverse geocoder")?;
    let mut controller = Controller::new(provider, geocoder);
    let format = cfg.output();
    let live = io::stdout().is_terminal() && format == OutputFormat::Banners;
    let watching = cfg.update_interval().is_some();

    // subscribe first so the prompt and Loading states are drawn too
    let viewer = (live || watching)
        .then(|| tokio::spawn(show_states(controller.subscribe(), format, live)));

    controller.on_appear();

    if !watching {
        let settle_timeout = cfg.settle_timeout();
        let outcome = tokio::select! {
            answered = tokio::time::timeout(settle_timeout, controller.run_until_answered()) => {
                match answered {
                    Ok(view) => OneShot::Answered(view),
                    Err(_) => OneShot::TimedOut,
                }
            }
            res = signal_handler() => {
                res?;
                OneShot::Interrupted
            }
        };

        let last_view = controller.view_state();
        // dropping the controller closes the state channel and ends the viewer
        drop(controller);
        if let Some(viewer) = viewer {
            viewer.await??;
        }

        let view = match outcome {
            OneShot::Interrupted => return Ok(()),
            OneShot::Answered(view) => view,
            OneShot::TimedOut => {
                warn!("No address within {:?}, giving up", settle_timeout);
                last_view
            }
        };
        if !live {
            render::render(&mut io::stdout(), &view, format, Screen::detect(), 0)?;
        }
        if !view.is_settled() {
            bail!("no address found for the current location");
        }
        return Ok(());
    }

    controller.run(async {
        if let Err(e) = signal_handler().await {
            error!("Signal handler failed: {}", e);
        }
    }).await;

    drop(controller);
    if let Some(viewer) = viewer {
        viewer.await??;
    }
    Ok(())
}
