//! Drives the surface producer with a simulated rasterizer and a loopback
//! compositor, then prints what the pool did.
//!
//! Runs on the first available GPU; falls back to the headless backend when
//! no adapter can be opened or `--headless` is passed.

use std::mem;
use std::time::{Duration, Instant};

use anyhow::Result;

use stratum_engine::backend::{
    HeadlessBackend, HeadlessTarget, SurfaceBackend, WgpuBackend, WgpuTarget,
};
use stratum_engine::device::{GpuContext, GpuInit};
use stratum_engine::logging::{LoggingConfig, init_logging};
use stratum_engine::producer::{PresentedSurface, Presenter, SurfaceProducer};
use stratum_engine::surface::{ContentId, RetainedKey, SurfaceSize};
use stratum_engine::time::IDLE_SHRINK_DELAY;

const FRAMES: u32 = 240;
const FRAME_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 60);

const OVERLAY: SurfaceSize = SurfaceSize::new(200, 48);
/// The overlay is drawn from its retained surface until this frame.
const OVERLAY_UNTIL: u32 = 180;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let headless = std::env::args().any(|arg| arg == "--headless");
    if !headless {
        match GpuContext::new_blocking(GpuInit::default()) {
            Ok(ctx) => {
                let info = ctx.adapter_info();
                println!("  adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
                let backend = WgpuBackend::new(&ctx)?;
                return run(&backend);
            }
            Err(err) => log::warn!("no GPU device ({err:#}); falling back to headless"),
        }
    }

    let backend = HeadlessBackend::new();
    run(&backend)?;
    log::info!(
        "headless ledger: {} live allocations, {} bytes, {} made in total",
        backend.live_allocations(),
        backend.live_bytes(),
        backend.allocations_made()
    );
    Ok(())
}

/// Records painting commands into a surface's render target.
trait Paint: SurfaceBackend {
    fn paint(&self, target: &Self::Target, frame: u32) -> Result<()>;
}

impl Paint for HeadlessBackend {
    fn paint(&self, _target: &HeadlessTarget, _frame: u32) -> Result<()> {
        Ok(())
    }
}

impl Paint for WgpuBackend<'_> {
    fn paint(&self, target: &WgpuTarget, frame: u32) -> Result<()> {
        let ctx = self.context();
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stratum-bench paint"),
            });

        let shade = (frame % 60) as f64 / 60.0;
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stratum-bench clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: shade,
                            g: 0.2,
                            b: 1.0 - shade,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        ctx.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

/// Compositor stand-in with one frame of latency: surfaces presented in
/// frame N are released once frame N+1 has been presented.
struct Loopback<B: SurfaceBackend> {
    current: Vec<PresentedSurface<B>>,
    previous: Vec<PresentedSurface<B>>,
    presented: u64,
    late: u64,
}

impl<B: SurfaceBackend> Loopback<B> {
    fn new() -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
            presented: 0,
            late: 0,
        }
    }

    /// Releases last frame's surfaces and latches this frame's.
    fn vsync(&mut self) {
        for surface in self.previous.drain(..) {
            if !surface.ready.is_signaled() {
                self.late += 1;
                log::debug!("surface {} released before it became ready", surface.id);
            }
            surface.release.signal();
        }
        self.previous = mem::take(&mut self.current);
    }

    fn release_all(&mut self) {
        self.vsync();
        self.vsync();
    }
}

impl<B: SurfaceBackend> Presenter<B> for Loopback<B> {
    fn present(&mut self, surface: PresentedSurface<B>) {
        self.presented += 1;
        self.current.push(surface);
    }
}

/// Layer sizes the simulated scene asks for in `frame`.
fn layers_for(frame: u32) -> Vec<SurfaceSize> {
    match frame {
        0..80 => vec![SurfaceSize::new(640, 480), SurfaceSize::new(256, 256)],
        // Window shrinks: the 640x480 allocation is reused for 600x400.
        80..160 => vec![SurfaceSize::new(600, 400), SurfaceSize::new(256, 256)],
        _ => vec![SurfaceSize::new(256, 256)],
    }
}

fn run<B: Paint>(backend: &B) -> Result<()> {
    let mut producer = SurfaceProducer::new(backend);
    let mut compositor = Loopback::new();
    let overlay_key = RetainedKey::untransformed(ContentId(1));

    let start = Instant::now();
    let mut retained_hits = 0u64;
    let mut frame_errors = 0u64;

    for frame in 0..FRAMES {
        let now = start + FRAME_INTERVAL * frame;
        let mut surfaces = Vec::new();

        for size in layers_for(frame) {
            let Some(surface) = producer.produce_surface(size, None) else {
                continue;
            };
            backend.paint(surface.target(), frame)?;
            surfaces.push(surface);
        }

        if frame < OVERLAY_UNTIL {
            if producer.retained(&overlay_key).is_some() {
                retained_hits += 1;
            } else if let Some(surface) = producer.produce_surface(OVERLAY, Some(overlay_key)) {
                backend.paint(surface.target(), frame)?;
                surfaces.push(surface);
            }
        }

        if let Err(err) = producer.finish_frame(surfaces, &mut compositor, now) {
            frame_errors += 1;
            log::warn!("frame {frame}: {err}");
        }

        compositor.vsync();
        producer.dispatch_releases();
        producer.idle_tick(now);
    }

    // Go quiet long enough for the idle shrink to run.
    compositor.release_all();
    producer.dispatch_releases();
    let quiet = start + FRAME_INTERVAL * FRAMES + IDLE_SHRINK_DELAY;
    let shrunk = producer.idle_tick(quiet);

    let stats = producer.stats();
    let pool = producer.pool();
    println!();
    println!("  stratum-bench on {}", backend.name());
    println!("  ─────────────────────────────────────────");
    println!("  frames            {}", producer.frames());
    println!("  presented         {}", compositor.presented);
    println!("  released late     {}", compositor.late);
    println!("  frame errors      {frame_errors}");
    println!("  retained hits     {retained_hits}");
    println!("  created           {}", stats.created);
    println!("  reused exact      {}", stats.reused_exact);
    println!("  reused best-fit   {}", stats.reused_best_fit);
    println!("  evicted           {}", stats.evicted);
    println!("  compacted         {}", stats.compacted);
    println!("  capacity drops    {}", stats.capacity_drops);
    println!("  idle shrink ran   {shrunk}");
    println!(
        "  cached            {} surfaces, {} bytes",
        pool.available_count(),
        pool.cached_bytes()
    );
    println!();

    Ok(())
}
