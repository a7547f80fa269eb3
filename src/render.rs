use crate::motion::Viewport;
use crate::stage::{DrawItem, Sprite, Stage, TilingSprite, Vec2};
use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

/// Clear colour behind every layer.
pub const STAGE_BACKGROUND: Pixel = Pixel {
    r: 0x10,
    g: 0x99,
    b: 0xbb,
    a: 255,
};

const HALF_BLOCK: char = '\u{2580}';
/// Right half of a double-width glyph; the glyph in the cell before it covers it.
pub const WIDE_TAIL: char = '\0';
const HUD_FG: Color = Color::Rgb {
    r: 220,
    g: 240,
    b: 250,
};
const HUD_BG: Color = Color::Rgb { r: 6, g: 30, b: 40 };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub struct CellBuffer {
    pub w: u16,
    pub h: u16,
    pub cells: Vec<Cell>,
}

impl CellBuffer {
    pub fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    pub fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub fn get(&self, x: u16, y: u16) -> Option<Cell> {
        if x < self.w && y < self.h {
            Some(self.cells[self.idx(x, y)])
        } else {
            None
        }
    }
    pub fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    fn from_rgba(p: [u8; 4], alpha: f32) -> Self {
        Self {
            r: p[0],
            g: p[1],
            b: p[2],
            a: (p[3] as f32 * alpha.clamp(0.0, 1.0) + 0.5) as u8,
        }
    }

    fn color(self) -> Color {
        Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

pub struct PixelCanvas {
    pub w: u32,
    pub h: u32,
    pub px: Vec<Pixel>,
}

impl PixelCanvas {
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Pixel::default(); (w as usize) * (h as usize)],
        }
    }
    pub fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub fn get(&self, x: u32, y: u32) -> Pixel {
        self.px[self.idx(x, y)]
    }
    pub fn clear(&mut self, p: Pixel) {
        self.px.fill(p);
    }
    fn blend_over(&mut self, x: i32, y: i32, src: Pixel) {
        if x < 0 || y < 0 || src.a == 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.w || y >= self.h {
            return;
        }
        let i = self.idx(x, y);
        let dst = self.px[i];

        let sa = src.a as f32 / 255.0;
        let da = dst.a as f32 / 255.0;

        let out_a = sa + da * (1.0 - sa);
        if out_a <= 1e-6 {
            self.px[i] = Pixel::default();
            return;
        }

        let blend = |sc: u8, dc: u8| -> u8 {
            let sc = sc as f32 / 255.0;
            let dc = dc as f32 / 255.0;
            let out = (sc * sa + dc * da * (1.0 - sa)) / out_a;
            (out.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
        };

        self.px[i] = Pixel {
            r: blend(src.r, dst.r),
            g: blend(src.g, dst.g),
            b: blend(src.b, dst.b),
            a: (out_a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        };
    }
}

/// Stage size covered by a canvas of `w` x `h` pixels.
pub fn stage_viewport(w: u32, h: u32, units_per_pixel: f32) -> Viewport {
    Viewport::new(w as f32 * units_per_pixel, h as f32 * units_per_pixel)
}

/* -----------------------------
   Stage compositing
------------------------------ */

/// Paints the stage into `canvas`, one pixel per `units_per_pixel` stage units,
/// then runs the enabled displacement filters over the result.
pub fn compose(stage: &Stage, canvas: &mut PixelCanvas, scratch: &mut PixelCanvas, units_per_pixel: f32) {
    let k = units_per_pixel.max(1e-3);
    canvas.clear(STAGE_BACKGROUND);

    for item in stage.draw_list() {
        match item {
            DrawItem::Sprite(s) => draw_sprite(canvas, s, k),
            DrawItem::Tiling(t) => draw_tiling(canvas, t, k),
        }
    }

    for filter in stage.filters.iter().filter(|f| f.enabled) {
        if let Some(map) = stage.sprite(filter.map) {
            apply_displacement(canvas, scratch, map, filter.scale, k);
        }
    }
}

fn pixel_center(x: u32, y: u32, k: f32) -> Vec2 {
    Vec2::new((x as f32 + 0.5) * k, (y as f32 + 0.5) * k)
}

fn draw_sprite(canvas: &mut PixelCanvas, sprite: &Sprite, k: f32) {
    if canvas.w == 0 || canvas.h == 0 {
        return;
    }
    let reach = sprite.reach();
    let max_x = canvas.w as i32 - 1;
    let max_y = canvas.h as i32 - 1;
    let x0 = (((sprite.position.x - reach) / k).floor() as i32).clamp(0, max_x);
    let x1 = (((sprite.position.x + reach) / k).ceil() as i32).clamp(0, max_x);
    let y0 = (((sprite.position.y - reach) / k).floor() as i32).clamp(0, max_y);
    let y1 = (((sprite.position.y + reach) / k).ceil() as i32).clamp(0, max_y);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let Some(local) = sprite.to_local(pixel_center(x as u32, y as u32, k)) else {
                return;
            };
            if let Some(texel) = sprite.texture.texel(local.x, local.y) {
                canvas.blend_over(x, y, Pixel::from_rgba(texel, sprite.alpha));
            }
        }
    }
}

fn draw_tiling(canvas: &mut PixelCanvas, tiling: &TilingSprite, k: f32) {
    for y in 0..canvas.h {
        for x in 0..canvas.w {
            let Some(uv) = tiling.to_tile(pixel_center(x, y, k)) else {
                continue;
            };
            let (tw, th) = (tiling.texture.width(), tiling.texture.height());
            if let Some(texel) = tiling
                .texture
                .texel(uv.x.rem_euclid(tw.max(1.0)), uv.y.rem_euclid(th.max(1.0)))
            {
                canvas.blend_over(x as i32, y as i32, Pixel::from_rgba(texel, tiling.alpha));
            }
        }
    }
}

// Red shifts horizontally, green vertically; 128 means no shift.
fn apply_displacement(
    canvas: &mut PixelCanvas,
    scratch: &mut PixelCanvas,
    map: &Sprite,
    scale: Vec2,
    k: f32,
) {
    if canvas.w == 0 || canvas.h == 0 {
        return;
    }
    scratch.w = canvas.w;
    scratch.h = canvas.h;
    scratch.px.clone_from(&canvas.px);

    let max_x = canvas.w as f32 - 1.0;
    let max_y = canvas.h as f32 - 1.0;
    for y in 0..canvas.h {
        for x in 0..canvas.w {
            let p = pixel_center(x, y, k);
            let Some(local) = map.to_local(p) else {
                return;
            };
            let Some(m) = map.texture.texel(local.x, local.y) else {
                continue;
            };
            let dx = (m[0] as f32 / 255.0 - 0.5) * scale.x;
            let dy = (m[1] as f32 / 255.0 - 0.5) * scale.y;
            let sx = ((p.x + dx) / k).floor().clamp(0.0, max_x) as u32;
            let sy = ((p.y + dy) / k).floor().clamp(0.0, max_y) as u32;
            let i = canvas.idx(x, y);
            canvas.px[i] = scratch.get(sx, sy);
        }
    }
}

/// Two canvas rows per terminal row: upper half block in the foreground colour over the background colour.
pub fn canvas_to_cells(canvas: &PixelCanvas, out: &mut CellBuffer) {
    for cy in 0..out.h as u32 {
        for cx in 0..out.w as u32 {
            if cx >= canvas.w {
                continue;
            }
            let top = if cy * 2 < canvas.h {
                canvas.get(cx, cy * 2)
            } else {
                Pixel::default()
            };
            let bottom = if cy * 2 + 1 < canvas.h {
                canvas.get(cx, cy * 2 + 1)
            } else {
                Pixel::default()
            };
            out.set(
                cx as u16,
                cy as u16,
                Cell {
                    ch: HALF_BLOCK,
                    fg: top.color(),
                    bg: bottom.color(),
                },
            );
        }
    }
}

/* -----------------------------
   Text overlays
------------------------------ */

/// Control characters become spaces. A wide glyph takes its cell plus a [`WIDE_TAIL`]
/// cell that `present` never prints; zero-width marks are dropped.
pub fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color, bg: Color) {
    let mut xx = x as usize;
    for ch in s.chars() {
        let ch = if ch.is_control() { ' ' } else { ch };
        let width = ch.width().unwrap_or(0);
        if width == 0 {
            continue;
        }
        if xx + width > buf.w as usize {
            break;
        }
        buf.set(xx as u16, y, Cell { ch, fg, bg });
        if width == 2 {
            buf.set(
                (xx + 1) as u16,
                y,
                Cell {
                    ch: WIDE_TAIL,
                    fg,
                    bg,
                },
            );
        }
        xx += width;
    }
}

pub struct Hud<'a> {
    pub status: &'a str,
    pub fish: usize,
    pub fps: f32,
    pub paused: bool,
    pub filter: bool,
    pub overlay: bool,
}

pub fn draw_hud(buf: &mut CellBuffer, hud: &Hud<'_>) {
    if buf.h == 0 {
        return;
    }
    for x in 0..buf.w {
        buf.set(
            x,
            0,
            Cell {
                ch: ' ',
                fg: HUD_FG,
                bg: HUD_BG,
            },
        );
    }
    let status = if hud.status.is_empty() { "-" } else { hud.status };
    let line = format!(
        " message: {}  | fish: {}  | ripple: {}  | overlay: {}  | {}  | {:.0} fps  | ? help ",
        status,
        hud.fish,
        if hud.filter { "on" } else { "off" },
        if hud.overlay { "on" } else { "off" },
        if hud.paused { "paused" } else { "running" },
        hud.fps
    );
    draw_text(buf, 0, 0, &line, HUD_FG, HUD_BG);
}

pub fn draw_help(buf: &mut CellBuffer) {
    let lines = [
        "Fish Pond",
        "",
        "Q / Esc: quit",
        "P: pause/resume",
        "H: toggle status line",
        "D: toggle ripple filter",
        "O: toggle water overlay",
        "?: toggle this help",
    ];

    let w = buf.w as i32;
    let h = buf.h as i32;
    let box_w = 34.min(w - 2);
    let box_h = (lines.len() as i32 + 2).min(h - 2);
    if box_w < 4 || box_h < 3 {
        return;
    }
    let x0 = (w - box_w) / 2;
    let y0 = (h - box_h) / 2;

    for y in 0..box_h {
        for x in 0..box_w {
            let ch = match (x, y) {
                (0, 0) => '┌',
                (x, 0) if x == box_w - 1 => '┐',
                (0, y) if y == box_h - 1 => '└',
                (x, y) if x == box_w - 1 && y == box_h - 1 => '┘',
                (_, y) if y == 0 || y == box_h - 1 => '─',
                (x, _) if x == 0 || x == box_w - 1 => '│',
                _ => ' ',
            };
            buf.set(
                (x0 + x) as u16,
                (y0 + y) as u16,
                Cell {
                    ch,
                    fg: HUD_FG,
                    bg: HUD_BG,
                },
            );
        }
    }

    for (row, s) in lines.iter().enumerate() {
        let yy = y0 + 1 + row as i32;
        if yy >= y0 + box_h - 1 {
            break;
        }
        let text: String = s.chars().take((box_w - 4) as usize).collect();
        draw_text(buf, (x0 + 2) as u16, yy as u16, &text, HUD_FG, HUD_BG);
    }
}

/* -----------------------------
   Terminal surface
------------------------------ */

pub struct Terminal {
    out: io::Stdout,
    pub cols: u16,
    pub rows: u16,
    prev: CellBuffer,
    pub cur: CellBuffer,
    pub canvas: PixelCanvas,
    scratch: PixelCanvas,
    active: bool,
}

impl Terminal {
    pub fn begin() -> anyhow::Result<Self> {
        let (cols, rows) = terminal::size()?;
        // exists before any mode switch so Drop can undo a half-finished setup
        let mut term = Self {
            out: io::stdout(),
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            canvas: PixelCanvas::new(cols as u32, rows as u32 * 2),
            scratch: PixelCanvas::new(cols as u32, rows as u32 * 2),
            active: true,
        };
        terminal::enable_raw_mode()?;
        execute!(
            term.out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            Clear(ClearType::All)
        )?;
        Ok(term)
    }

    pub fn end(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        self.canvas = PixelCanvas::new(c as u32, r as u32 * 2);
        self.scratch = PixelCanvas::new(c as u32, r as u32 * 2);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    pub fn viewport(&self, units_per_pixel: f32) -> Viewport {
        stage_viewport(self.canvas.w, self.canvas.h, units_per_pixel)
    }

    /// Composites the stage into the cell buffer. Text overlays go on top afterwards.
    pub fn paint(&mut self, stage: &Stage, units_per_pixel: f32) {
        compose(stage, &mut self.canvas, &mut self.scratch, units_per_pixel);
        canvas_to_cells(&self.canvas, &mut self.cur);
    }

    pub fn present(&mut self, diff_only: bool) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if c.ch == WIDE_TAIL || (diff_only && c == self.prev.cells[i]) {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.active {
            let _ = self.end();
        }
    }
}

/// Off-screen surface for headless runs and tests.
pub struct Surface {
    pub canvas: PixelCanvas,
    scratch: PixelCanvas,
    pub cells: CellBuffer,
}

impl Surface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            canvas: PixelCanvas::new(cols as u32, rows as u32 * 2),
            scratch: PixelCanvas::new(cols as u32, rows as u32 * 2),
            cells: CellBuffer::new(cols, rows),
        }
    }

    pub fn viewport(&self, units_per_pixel: f32) -> Viewport {
        stage_viewport(self.canvas.w, self.canvas.h, units_per_pixel)
    }

    pub fn paint(&mut self, stage: &Stage, units_per_pixel: f32) {
        compose(stage, &mut self.canvas, &mut self.scratch, units_per_pixel);
        canvas_to_cells(&self.canvas, &mut self.cells);
    }
}
