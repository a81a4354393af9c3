/*
 *  main.rs
 *
 *  LyMarq - the big squeeze
 *	(c) 2020-25 Stuart Hunter
 *
 *	TODO:
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use env_logger::Env;
use log::info;
use std::sync::{Arc, Mutex};

mod config;
mod constants;
mod layout;
mod lms;
mod motion;
mod renderable;
mod rpc;
mod snapshot;
mod stage;
mod surface;
mod typeset;
mod window;

use layout::Layout;
use lms::{Control, PollCtx, Poller};
use rpc::RpcClient;
use stage::Stage;
use typeset::FontRasterizer;
use window::WindowConfig;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::load()?;
    env_logger::Builder::from_env(
        Env::default().default_filter_or(settings.log_level.clone()),
    )
    .init();

    info!(
        "LyMarq v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_DATE
    );

    let layout = Layout::for_viewport(settings.width, settings.height);
    let raster = FontRasterizer::from_file(&settings.font, layout.font_px, constants::TEXT_COLOR)?;
    let stage = Arc::new(Mutex::new(Stage::new(layout, settings.pace, Box::new(raster))));

    // Server named in config, or the first one answering on the LAN.
    let (host, port) = match settings.server.clone() {
        Some((host, port)) => (host, port),
        None => {
            let found = lms::discover()?;
            (found.host.to_string(), found.port)
        }
    };

    let rpc = RpcClient::new();
    let player = lms::pick_player(&rpc, &host, port, &settings.player).await?;

    let control = Control::new(rpc.clone(), host.clone(), port, player.player_id.clone());
    let _poller = Poller::spawn(
        PollCtx {
            rpc,
            host,
            port,
            player_mac: player.player_id,
            stage: Arc::clone(&stage),
            art_height: layout.art_height,
            icon_size: layout.icon_size,
        },
        settings.poll_interval,
    );

    // Owns the main thread until quit.
    window::run(
        WindowConfig {
            width: settings.width,
            height: settings.height,
            windowed: settings.windowed,
            frame_rate: settings.frame_rate,
        },
        stage,
        control,
        tokio::runtime::Handle::current(),
    )
}
