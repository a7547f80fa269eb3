use crate::assets::{AssetSource, AssetStore, Manifest};
use crate::bridge::HostBridge;
use crate::config::{load_or_init_settings, project_paths, Cli, Settings};
use crate::input::{collect_input_nonblocking, map_event_to_action, PondAction};
use crate::render::{draw_help, draw_hud, Hud, Surface, Terminal};
use crate::scene::{Scene, SceneOptions};
use anyhow::Context;
use crossterm::tty::IsTty;
use rand::{rngs::StdRng, SeedableRng};
use std::io;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const DT_CLAMP: f32 = 0.05;
/// Ticker deltas are measured in 60 Hz frames.
const TICKS_PER_SEC: f32 = 60.0;
const DEFAULT_HEADLESS_FRAMES: u64 = 600;
const HEADLESS_COLS: u16 = 80;
const HEADLESS_ROWS: u16 = 24;

impl From<&Settings> for SceneOptions {
    fn from(s: &Settings) -> Self {
        Self {
            fish_count: s.fish_count,
            fish_aliases: s.fish_aliases.clone(),
            displacement_scale: s.displacement_scale,
            overlay_speed: s.overlay_speed,
        }
    }
}

/// Converts a frame time into ticker frames, clamping stalls.
pub fn ticker_delta(dt_secs: f32) -> f32 {
    dt_secs.clamp(0.0, DT_CLAMP) * TICKS_PER_SEC
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadlessReport {
    pub frames: u64,
    pub fish: usize,
    pub status: String,
}

/// Drives the scene off-screen at a fixed one-frame delta. `loaded` goes out after the first frame.
pub fn drive_headless(
    scene: &mut Scene,
    bridge: &mut HostBridge,
    surface: &mut Surface,
    units_per_pixel: f32,
    frames: u64,
) -> HeadlessReport {
    let viewport = surface.viewport(units_per_pixel);
    for frame in 0..frames {
        bridge.pump();
        scene.update(1.0, viewport);
        surface.paint(scene.stage(), units_per_pixel);
        if frame == 0 {
            if let Err(e) = bridge.notify_loaded() {
                log::warn!("could not signal host: {e}");
            }
        }
    }
    HeadlessReport {
        frames,
        fish: scene.fishes().len(),
        status: bridge.status().to_string(),
    }
}

struct App {
    settings: Settings,
    scene: Scene,
    bridge: HostBridge,
    term: Terminal,
    paused: bool,
    show_hud: bool,
    show_help: bool,
    full_redraw: bool,
    should_quit: bool,
    fps_est: f32,
}

impl App {
    fn run(&mut self) -> anyhow::Result<()> {
        let frame_dt = Duration::from_secs_f32(1.0 / self.settings.fps() as f32);
        let k = units_per_pixel(&self.settings);

        let mut last = Instant::now();
        let mut fps_acc = 0.0f32;
        let mut fps_frames = 0u32;
        let mut presented = false;

        while !self.should_quit {
            let frame_start = Instant::now();
            if self.term.resize_if_needed()? {
                self.full_redraw = true;
            }

            for ev in collect_input_nonblocking(frame_dt)? {
                if let Some(action) = map_event_to_action(ev) {
                    self.apply(action);
                }
            }
            if self.should_quit {
                break;
            }

            self.bridge.pump();

            let now = Instant::now();
            let dt = (now - last).as_secs_f32();
            last = now;

            fps_acc += dt;
            fps_frames += 1;
            if fps_acc >= 0.5 {
                self.fps_est = fps_frames as f32 / fps_acc;
                fps_acc = 0.0;
                fps_frames = 0;
            }

            let viewport = self.term.viewport(k);
            if self.paused {
                if viewport != self.scene.viewport() {
                    self.scene.resize(viewport);
                }
            } else {
                self.scene.update(ticker_delta(dt), viewport);
            }

            self.render_frame(k)?;

            if !presented {
                presented = true;
                if let Err(e) = self.bridge.notify_loaded() {
                    log::warn!("could not signal host: {e}");
                }
            }

            spin_sleep(frame_dt, frame_start);
        }
        Ok(())
    }

    fn apply(&mut self, action: PondAction) {
        match action {
            PondAction::Quit => self.should_quit = true,
            PondAction::TogglePause => {
                self.paused = !self.paused;
                log::info!("{}", if self.paused { "paused" } else { "resumed" });
            }
            PondAction::ToggleHud => {
                self.show_hud = !self.show_hud;
                self.full_redraw = true;
            }
            PondAction::ToggleFilter => {
                let on = !self.scene.filter_enabled();
                self.scene.set_filter_enabled(on);
            }
            PondAction::ToggleOverlay => {
                let on = !self.scene.overlay_visible();
                self.scene.set_overlay_visible(on);
            }
            PondAction::ToggleHelp => {
                self.show_help = !self.show_help;
                self.full_redraw = true;
            }
            PondAction::Redraw => self.full_redraw = true,
        }
    }

    fn render_frame(&mut self, units_per_pixel: f32) -> anyhow::Result<()> {
        self.term.paint(self.scene.stage(), units_per_pixel);

        if self.show_hud {
            let hud = Hud {
                status: self.bridge.status(),
                fish: self.scene.fishes().len(),
                fps: self.fps_est,
                paused: self.paused,
                filter: self.scene.filter_enabled(),
                overlay: self.scene.overlay_visible(),
            };
            draw_hud(&mut self.term.cur, &hud);
        }
        if self.show_help {
            draw_help(&mut self.term.cur);
        }

        let diff_only = !self.full_redraw;
        self.full_redraw = false;
        self.term.present(diff_only)
    }

    fn shutdown(self) -> anyhow::Result<()> {
        let App { scene, mut term, .. } = self;
        scene.teardown();
        term.end()
    }
}

fn units_per_pixel(settings: &Settings) -> f32 {
    settings.units_per_pixel.max(0.5)
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x00F1_5D00)
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = project_paths()?;
    let settings_path = cli.config.clone().unwrap_or_else(|| paths.settings_path.clone());
    let mut settings = load_or_init_settings(&settings_path)?;
    settings.apply_cli(&cli);
    crate::logging::init(&settings.log_level, &paths.log_path)?;
    log::info!("settings from {}", settings_path.display());

    let seed = resolve_seed(settings.seed);
    log::info!("seed {seed}");
    let mut rng = StdRng::seed_from_u64(seed);

    // every texture is in memory before the terminal is touched
    let source = AssetSource::from_dir(settings.asset_dir.as_deref());
    let assets = AssetStore::load(&Manifest::default_pond(), &source)
        .context("loading pond assets")?;
    log::info!("loaded {} textures", assets.len());

    let inbox = settings
        .host_inbox
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let mut bridge = HostBridge::connect(inbox.as_deref(), settings.host_outbox.as_deref())
        .context("connecting host bridge")?;

    let opts = SceneOptions::from(&settings);
    let k = units_per_pixel(&settings);

    if cli.frames.is_some() || !io::stdout().is_tty() {
        let frames = cli.frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
        let mut surface = Surface::new(HEADLESS_COLS, HEADLESS_ROWS);
        let mut scene = Scene::setup(&assets, surface.viewport(k), &opts, &mut rng)?;
        scene.set_filter_enabled(settings.enable_filter);
        log::info!("no terminal attached, running {frames} frames headless");
        let report = drive_headless(&mut scene, &mut bridge, &mut surface, k, frames);
        log::info!(
            "headless run done: {} frames, {} fish, status {:?}",
            report.frames,
            report.fish,
            report.status
        );
        scene.teardown();
        return Ok(());
    }

    let term = Terminal::begin()?;
    let mut scene = Scene::setup(&assets, term.viewport(k), &opts, &mut rng)?;
    scene.set_filter_enabled(settings.enable_filter);

    let mut app = App {
        show_hud: settings.show_hud,
        settings,
        scene,
        bridge,
        term,
        paused: false,
        show_help: false,
        full_redraw: true,
        should_quit: false,
        fps_est: 0.0,
    };
    let result = app.run();
    let closed = app.shutdown();
    result.and(closed)
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, start: Instant) {
    let end = start + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}
