use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("unknown texture alias '{0}'")]
    UnknownAlias(String),
    #[error("failed to load '{alias}' from {}: {source}", path.display())]
    Load {
        alias: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no built-in texture for alias '{0}'")]
    NoBuiltin(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetEntry {
    pub alias: String,
    pub src: String,
}

impl AssetEntry {
    fn new(alias: &str, src: &str) -> Self {
        Self {
            alias: alias.to_string(),
            src: src.to_string(),
        }
    }
}

/// Ordered list of images the scene needs before the first frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<AssetEntry>,
}

impl Manifest {
    pub fn default_pond() -> Self {
        let mut entries = vec![AssetEntry::new("background", "pond_background.jpg")];
        for i in 1..=8 {
            entries.push(AssetEntry::new(&format!("fish{i}"), &format!("fish{i}.png")));
        }
        entries.push(AssetEntry::new("overlay", "wave_overlay.png"));
        entries.push(AssetEntry::new("displacement", "displacement_map.png"));
        Self { entries }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSource {
    Directory(PathBuf),
    Builtin,
}

impl AssetSource {
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(d) => AssetSource::Directory(d.to_path_buf()),
            None => AssetSource::Builtin,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

/// Shared image plus how out-of-range lookups behave.
#[derive(Clone, Debug)]
pub struct Texture {
    pixels: Rc<RgbaImage>,
    pub wrap: WrapMode,
}

impl Texture {
    pub fn new(pixels: Rc<RgbaImage>) -> Self {
        Self {
            pixels,
            wrap: WrapMode::Clamp,
        }
    }

    pub fn width(&self) -> f32 {
        self.pixels.width() as f32
    }

    pub fn height(&self) -> f32 {
        self.pixels.height() as f32
    }

    /// Nearest-texel lookup. Clamp mode returns `None` outside the image.
    pub fn texel(&self, u: f32, v: f32) -> Option<[u8; 4]> {
        let (w, h) = (self.pixels.width(), self.pixels.height());
        if w == 0 || h == 0 {
            return None;
        }
        let (x, y) = match self.wrap {
            WrapMode::Clamp => {
                if u < 0.0 || v < 0.0 || u >= w as f32 || v >= h as f32 {
                    return None;
                }
                (u as u32, v as u32)
            }
            WrapMode::Repeat => (
                (u.rem_euclid(w as f32) as u32).min(w - 1),
                (v.rem_euclid(h as f32) as u32).min(h - 1),
            ),
        };
        Some(self.pixels.get_pixel(x, y).0)
    }
}

pub struct AssetStore {
    images: HashMap<String, Rc<RgbaImage>>,
}

impl AssetStore {
    /// Resolves every manifest entry. The first failure aborts the whole load.
    pub fn load(manifest: &Manifest, source: &AssetSource) -> Result<Self, AssetError> {
        let mut images = HashMap::with_capacity(manifest.entries.len());
        for entry in &manifest.entries {
            let img = match source {
                AssetSource::Directory(dir) => {
                    let path = dir.join(&entry.src);
                    image::open(&path)
                        .map_err(|source| AssetError::Load {
                            alias: entry.alias.clone(),
                            path: path.clone(),
                            source,
                        })?
                        .to_rgba8()
                }
                AssetSource::Builtin => builtin::texture(&entry.alias)
                    .ok_or_else(|| AssetError::NoBuiltin(entry.alias.clone()))?,
            };
            log::debug!(
                "loaded asset '{}' ({}x{})",
                entry.alias,
                img.width(),
                img.height()
            );
            images.insert(entry.alias.clone(), Rc::new(img));
        }
        log::info!("loaded {} assets from {:?}", images.len(), source);
        Ok(Self { images })
    }

    pub fn texture(&self, alias: &str) -> Result<Texture, AssetError> {
        self.images
            .get(alias)
            .map(|img| Texture::new(Rc::clone(img)))
            .ok_or_else(|| AssetError::UnknownAlias(alias.to_string()))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Procedural stand-ins for the pond images so the scene runs without an asset directory.
pub mod builtin {
    use super::*;

    const FISH_W: u32 = 160;
    const FISH_H: u32 = 80;
    const TILE: u32 = 128;

    // (body, accent) per fish alias
    const KOI: [([u8; 3], [u8; 3]); 8] = [
        ([240, 236, 228], [222, 64, 32]),
        ([246, 150, 40], [250, 224, 170]),
        ([250, 248, 240], [30, 30, 36]),
        ([214, 48, 40], [250, 240, 230]),
        ([242, 206, 86], [250, 250, 240]),
        ([90, 110, 150], [230, 140, 60]),
        ([40, 40, 46], [236, 236, 236]),
        ([236, 120, 150], [250, 250, 250]),
    ];

    pub fn texture(alias: &str) -> Option<RgbaImage> {
        match alias {
            "background" => Some(pond_floor(480, 320)),
            "overlay" => Some(wave_overlay(TILE)),
            "displacement" => Some(displacement_map(TILE)),
            _ => {
                let n: usize = alias.strip_prefix("fish")?.parse().ok()?;
                let (body, accent) = *KOI.get(n.checked_sub(1)?)?;
                Some(koi(body, accent, n as u32))
            }
        }
    }

    fn hash2(x: i32, y: i32, seed: u32) -> u32 {
        let x = x ^ (seed as i32).wrapping_mul(374761393);
        let y = y ^ (seed as i32).wrapping_mul(668265263);
        let mut n = (x as u32).wrapping_mul(2654435761) ^ (y as u32).wrapping_mul(2246822519);
        n ^= n >> 13;
        n = n.wrapping_mul(3266489917);
        n ^= n >> 16;
        n
    }

    fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    fn mix(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        let f = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t) as u8;
        [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2])]
    }

    fn pond_floor(w: u32, h: u32) -> RgbaImage {
        let deep = [12, 58, 70];
        let shallow = [46, 112, 104];
        let pebble = [120, 126, 104];
        RgbaImage::from_fn(w, h, |x, y| {
            let nx = x as f32 / w as f32;
            let ny = y as f32 / h as f32;
            let depth = 0.5 + 0.25 * (nx * 5.0).sin() * (ny * 4.0).cos();
            let mut c = mix(deep, shallow, depth);

            // pebbles on an 8px grid
            let cell = hash2((x / 8) as i32, (y / 8) as i32, 0x5EED);
            if cell & 7 == 0 {
                let cx = (x % 8) as f32 - 3.5;
                let cy = (y % 8) as f32 - 3.5;
                let r = 2.0 + ((cell >> 8) & 3) as f32 * 0.5;
                if cx * cx + cy * cy <= r * r {
                    c = mix(c, pebble, 0.55);
                }
            }
            let grain = (hash2(x as i32, y as i32, 7) & 15) as f32 / 15.0 - 0.5;
            let c = mix(c, [0, 0, 0], 0.05 + grain * 0.06);
            Rgba([c[0], c[1], c[2], 255])
        })
    }

    // Head points towards -x, the tail fans out towards +x.
    fn koi(body: [u8; 3], accent: [u8; 3], seed: u32) -> RgbaImage {
        let (w, h) = (FISH_W as f32, FISH_H as f32);
        let (cx, cy) = (w * 0.42, h * 0.5);
        let (rx, ry) = (w * 0.34, h * 0.24);
        RgbaImage::from_fn(FISH_W, FISH_H, |x, y| {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let dx = (px - cx) / rx;
            let dy = (py - cy) / ry;
            // taper the body towards the tail
            let taper = 1.0 - 0.45 * smoothstep(-0.2, 1.0, dx);
            let d = dx * dx + (dy / taper) * (dy / taper);
            if d <= 1.0 {
                let spot = hash2((px / 14.0) as i32, (py / 14.0) as i32, seed) & 3 == 0;
                let mut c = if spot { accent } else { body };
                // darker flank edge
                c = mix(c, [0, 0, 0], smoothstep(0.6, 1.0, d) * 0.35);
                if (px - (cx - rx * 0.7)).powi(2) + (py - (cy - ry * 0.35)).powi(2) < 9.0 {
                    c = [16, 16, 20];
                }
                return Rgba([c[0], c[1], c[2], 255]);
            }

            let tail_x0 = cx + rx * 0.85;
            let tail_x1 = w - 2.0;
            if px >= tail_x0 && px <= tail_x1 {
                let t = (px - tail_x0) / (tail_x1 - tail_x0);
                let spread = h * (0.06 + 0.32 * t);
                if (py - cy).abs() <= spread {
                    let c = mix(accent, body, 0.5);
                    return Rgba([c[0], c[1], c[2], (220.0 - 90.0 * t) as u8]);
                }
            }

            // pectoral fins
            let fx = cx - rx * 0.25;
            let fin = ((px - fx) / (rx * 0.28)).powi(2) + ((py - cy).abs() - ry * 1.05).powi(2) / 40.0;
            if fin <= 1.0 && (py - cy).abs() > ry * 0.6 {
                return Rgba([body[0], body[1], body[2], 150]);
            }
            Rgba([0, 0, 0, 0])
        })
    }

    // Integer frequencies keep both textures seamless when repeated.
    fn wave_overlay(size: u32) -> RgbaImage {
        let s = size as f32;
        RgbaImage::from_fn(size, size, |x, y| {
            let u = x as f32 / s;
            let v = y as f32 / s;
            let a = (TAU * (2.0 * u + 0.35 * (TAU * v).sin())).sin();
            let b = (TAU * (3.0 * v + 0.25 * (TAU * 2.0 * u).cos())).sin();
            let crest = smoothstep(0.55, 1.0, (a * 0.6 + b * 0.4).abs());
            Rgba([200, 236, 255, (crest * 90.0) as u8])
        })
    }

    fn displacement_map(size: u32) -> RgbaImage {
        let s = size as f32;
        RgbaImage::from_fn(size, size, |x, y| {
            let u = x as f32 / s;
            let v = y as f32 / s;
            let r = (TAU * (2.0 * u + 0.5 * (TAU * v).sin())).sin();
            let g = (TAU * (2.0 * v + 0.5 * (TAU * u).cos())).sin();
            let enc = |n: f32| (127.5 + 127.5 * n).clamp(0.0, 255.0) as u8;
            Rgba([enc(r), enc(g), 128, 255])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_the_whole_manifest() {
        let store = AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap();
        assert_eq!(store.len(), 11);
        for entry in &Manifest::default_pond().entries {
            assert!(store.texture(&entry.alias).is_ok(), "{}", entry.alias);
        }
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let store = AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap();
        assert!(matches!(
            store.texture("fish42"),
            Err(AssetError::UnknownAlias(a)) if a == "fish42"
        ));
    }

    #[test]
    fn builtin_fish_face_left() {
        let img = builtin::texture("fish1").unwrap();
        let mid = img.height() / 2;
        // eye sits on the left half, tail tip is translucent on the right
        let leftmost_opaque = (0..img.width())
            .find(|&x| img.get_pixel(x, mid).0[3] == 255)
            .unwrap();
        assert!(leftmost_opaque < img.width() / 4);
        assert!(img.get_pixel(img.width() - 3, mid).0[3] < 255);
        assert!(builtin::texture("fish9").is_none());
        assert!(builtin::texture("fish0").is_none());
    }

    #[test]
    fn directory_source_reports_the_missing_alias() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest {
            entries: vec![
                AssetEntry::new("fish1", "fish1.png"),
                AssetEntry::new("overlay", "wave_overlay.png"),
            ],
        };
        builtin::texture("fish1")
            .unwrap()
            .save(dir.path().join("fish1.png"))
            .unwrap();

        let err = AssetStore::load(&manifest, &AssetSource::Directory(dir.path().to_path_buf()))
            .err()
            .unwrap();
        match err {
            AssetError::Load { alias, path, .. } => {
                assert_eq!(alias, "overlay");
                assert!(path.ends_with("wave_overlay.png"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn directory_source_decodes_images() {
        let dir = tempfile::tempdir().unwrap();
        builtin::texture("displacement")
            .unwrap()
            .save(dir.path().join("displacement_map.png"))
            .unwrap();
        let manifest = Manifest {
            entries: vec![AssetEntry::new("displacement", "displacement_map.png")],
        };
        let store =
            AssetStore::load(&manifest, &AssetSource::Directory(dir.path().to_path_buf())).unwrap();
        let tex = store.texture("displacement").unwrap();
        assert_eq!(tex.width(), 128.0);
    }

    #[test]
    fn repeat_wrap_tiles_and_clamp_does_not() {
        let img = RgbaImage::from_fn(4, 2, |x, _| Rgba([x as u8, 0, 0, 255]));
        let mut tex = Texture::new(Rc::new(img));
        assert_eq!(tex.texel(5.0, 0.0), None);
        tex.wrap = WrapMode::Repeat;
        assert_eq!(tex.texel(5.0, 0.0).unwrap()[0], 1);
        assert_eq!(tex.texel(-1.0, 3.0).unwrap()[0], 3);
    }
}
