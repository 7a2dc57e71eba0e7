#![deny(clippy::all)]
#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use error_iter::ErrorIter as _;
use log::error;
use pixels::{Error, Pixels, SurfaceTexture};
use tokio::sync::watch;
use winit::dpi::LogicalSize;
use winit::event::{Event, VirtualKeyCode};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;
use winit_input_helper::WinitInputHelper;

use crate::models::frame::CompositeResult;

struct World {
    width: u32,
    height: u32,
    latest: Arc<Mutex<Option<CompositeResult>>>,
}

/// Opens the display window and blits whatever frame is currently in the
/// handoff slot. Delivered frames may be smaller than the window when a
/// reduction factor is active; they are upsampled on the fly.
pub async fn start_viewer(
    width: u32,
    height: u32,
    mut rx: watch::Receiver<Option<CompositeResult>>,
) -> Result<(), Error> {
    let event_loop = EventLoop::new();
    let mut input = WinitInputHelper::new();

    let latest: Arc<Mutex<Option<CompositeResult>>> = Arc::new(Mutex::new(None));
    let latest_writer = Arc::clone(&latest);
    let world = World {
        width,
        height,
        latest,
    };
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let frame = rx.borrow_and_update().clone();
            if let Ok(mut slot) = latest_writer.lock() {
                *slot = frame;
            }
        }
    });

    let window = {
        let size = LogicalSize::new(world.width as f64, world.height as f64);
        WindowBuilder::new()
            .with_title("Delivered Frame")
            .with_inner_size(size)
            .with_min_inner_size(size)
            .build(&event_loop)
            .unwrap()
    };

    let mut pixels = {
        let window_size = window.inner_size();
        let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, &window);
        Pixels::new(world.width, world.height, surface_texture)?
    };

    event_loop.run(move |event, _, control_flow| {
        // Draw the current frame
        if let Event::RedrawRequested(_) = event {
            world.draw(pixels.frame_mut());
            if let Err(err) = pixels.render() {
                log_error("pixels.render", err);
                *control_flow = ControlFlow::Exit;
                return;
            }
        }

        // Handle input events
        if input.update(&event) {
            // Close events
            if input.key_pressed(VirtualKeyCode::Escape) || input.close_requested() {
                *control_flow = ControlFlow::Exit;
                return;
            }

            // Resize the window
            if let Some(size) = input.window_resized() {
                if let Err(err) = pixels.resize_surface(size.width, size.height) {
                    log_error("pixels.resize_surface", err);
                    *control_flow = ControlFlow::Exit;
                    return;
                }
            }

            window.request_redraw();
        }
    });
}

fn log_error<E: std::error::Error + 'static>(method_name: &str, err: E) {
    error!("{method_name}() failed: {err}");
    for source in err.sources().skip(1) {
        error!("  Caused by: {source}");
    }
}

impl World {
    fn draw(&self, surface: &mut [u8]) {
        let slot = match self.latest.lock() {
            Ok(slot) => slot,
            Err(_) => return,
        };
        let Some(frame) = slot.as_ref() else {
            for pixel in surface.chunks_exact_mut(4) {
                pixel.copy_from_slice(&[0x0, 0x0, 0x0, 0xff]);
            }
            return;
        };

        for y in 0..self.height {
            let src_y = (y as u64 * frame.height as u64 / self.height as u64) as u32;
            for x in 0..self.width {
                let src_x = (x as u64 * frame.width as u64 / self.width as u64) as u32;
                let src = ((src_y * frame.width + src_x) * 4) as usize;
                let dst = ((y * self.width + x) * 4) as usize;
                surface[dst..dst + 4].copy_from_slice(&frame.pixels[src..src + 4]);
            }
        }
    }
}
