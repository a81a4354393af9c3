/*
 *  window.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  The big-screen window: event loop, keyboard transport control and the
 *  paced per-frame draw.
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

use log::error;
use pixels::{Pixels, SurfaceTexture};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use winit::{
    dpi::PhysicalSize,
    event::{Event, VirtualKeyCode},
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, WindowBuilder},
};
use winit_input_helper::WinitInputHelper;

use crate::constants::BACKGROUND;
use crate::lms::{Control, TransportKey};
use crate::stage::Stage;
use crate::surface::Surface;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub windowed: bool,
    pub frame_rate: u32,
}

/// Run the render loop. Never returns on the happy path; the event loop
/// owns the main thread until quit, at which point the process exits.
/// In-flight poll workers hold their own Arc to the stage lock, so a late
/// merge can never observe torn-down state.
pub fn run(
    config: WindowConfig,
    stage: Arc<Mutex<Stage>>,
    control: Control,
    rt: tokio::runtime::Handle,
) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new();
    let mut input = WinitInputHelper::new();

    let mut builder = WindowBuilder::new()
        .with_title("LyMarq")
        .with_resizable(false);
    if config.windowed {
        // PhysicalSize avoids Wayland DPI scaling surprises
        builder = builder.with_inner_size(PhysicalSize::new(config.width, config.height));
    } else {
        builder = builder.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    let window = builder.build(&event_loop)?;

    let window_size = window.inner_size();
    let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, &window);
    let mut pixels = Pixels::new(config.width, config.height, surface_texture)?;

    println!("═══════════════════════════════════════════");
    println!("  LyMarq  {}x{}", config.width, config.height);
    println!("  ─────────────────────────────────────────");
    println!("    ESC / Q     - Quit");
    println!("    SPACE       - Play / pause");
    println!("    LEFT/RIGHT  - Previous / next track");
    println!("    UP/DOWN     - Volume");
    println!("═══════════════════════════════════════════");

    let frame_budget = Duration::from_secs(1) / config.frame_rate.max(1);
    let mut last_frame = Instant::now();

    let send = move |rt: &tokio::runtime::Handle, control: &Control, key: TransportKey| {
        let control = control.clone();
        rt.spawn(async move { control.send(key).await });
    };

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        if let Event::RedrawRequested(_) = event {
            // cap the frame rate with a plain sleep; the stage advances one
            // tick per rendered frame
            let elapsed = last_frame.elapsed();
            if elapsed < frame_budget {
                std::thread::sleep(frame_budget - elapsed);
            }
            last_frame = Instant::now();

            {
                let mut stage = stage.lock().unwrap();
                let mut surface =
                    Surface::new(pixels.frame_mut(), config.width, config.height);
                surface.clear(BACKGROUND);
                stage.advance_and_draw(&mut surface);
            }

            if let Err(err) = pixels.render() {
                error!("pixels.render() failed: {}", err);
                *control_flow = ControlFlow::Exit;
                return;
            }
        }

        if input.update(&event) {
            if input.key_pressed(VirtualKeyCode::Escape) || input.key_pressed(VirtualKeyCode::Q) {
                *control_flow = ControlFlow::Exit;
                return;
            }
            if input.key_pressed(VirtualKeyCode::Space) {
                send(&rt, &control, TransportKey::TogglePause);
            }
            if input.key_pressed(VirtualKeyCode::Right) {
                send(&rt, &control, TransportKey::NextTrack);
            }
            if input.key_pressed(VirtualKeyCode::Left) {
                send(&rt, &control, TransportKey::PreviousTrack);
            }
            if input.key_pressed(VirtualKeyCode::Up) {
                send(&rt, &control, TransportKey::VolumeUp);
            }
            if input.key_pressed(VirtualKeyCode::Down) {
                send(&rt, &control, TransportKey::VolumeDown);
            }
        }

        // keep frames coming even without input events
        window.request_redraw();
    });
}
