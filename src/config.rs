use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fps_cap: u32,
    /// 0 picks a seed from the clock at startup.
    pub seed: u64,
    pub fish_count: usize,
    pub fish_aliases: Vec<String>,
    /// Directory holding the pond images. `None` renders the built-in textures.
    pub asset_dir: Option<PathBuf>,
    /// Stage units covered by one rendered pixel.
    pub units_per_pixel: f32,
    pub displacement_scale: f32,
    pub overlay_speed: f32,
    pub enable_filter: bool,
    pub show_hud: bool,
    pub host_inbox: Option<PathBuf>,
    pub host_outbox: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            seed: 0,
            fish_count: 20,
            fish_aliases: (1..=5).map(|i| format!("fish{i}")).collect(),
            asset_dir: None,
            units_per_pixel: 8.0,
            displacement_scale: 50.0,
            overlay_speed: 1.0,
            enable_filter: true,
            show_hud: true,
            host_inbox: None,
            host_outbox: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "fishpond")]
#[command(about = "Animated koi pond with a water ripple filter, in your terminal")]
pub struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory with pond_background.jpg, fish1..8.png, wave_overlay.png, displacement_map.png
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Number of fish to spawn
    #[arg(long)]
    pub fish: Option<usize>,

    /// RNG seed (0 = random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Frame rate cap
    #[arg(long)]
    pub fps: Option<u32>,

    /// Disable the displacement (ripple) filter
    #[arg(long, default_value_t = false)]
    pub no_filter: bool,

    /// Read host messages (one JSON object per line) from this path, `-` for stdin
    #[arg(long)]
    pub inbox: Option<PathBuf>,

    /// Append outbound host signals to this path
    #[arg(long)]
    pub outbox: Option<PathBuf>,

    /// Run this many frames without a terminal, then exit
    #[arg(long)]
    pub frames: Option<u64>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Settings {
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.assets {
            self.asset_dir = Some(dir.clone());
        }
        if let Some(n) = cli.fish {
            self.fish_count = n;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(fps) = cli.fps {
            self.fps_cap = fps;
        }
        if cli.no_filter {
            self.enable_filter = false;
        }
        if let Some(p) = &cli.inbox {
            self.host_inbox = Some(p.clone());
        }
        if let Some(p) = &cli.outbox {
            self.host_outbox = Some(p.clone());
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps_cap.clamp(10, 240)
    }
}

pub struct Paths {
    pub settings_path: PathBuf,
    pub log_path: PathBuf,
}

pub fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "fishpond", "Fishpond")
        .context("could not resolve project directories")?;
    let config_dir = proj.config_dir().to_path_buf();
    let data_dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&config_dir).ok();
    fs::create_dir_all(&data_dir).ok();
    Ok(Paths {
        settings_path: config_dir.join("settings.json"),
        log_path: data_dir.join("fishpond.log"),
    })
}

/// Reads `path`, falling back to defaults (with a warning) when it is missing or malformed.
pub fn load_settings(path: &Path) -> Settings {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("settings {}: {e}, using defaults", path.display());
            return Settings::default();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        log::warn!("settings {} are malformed ({e}), using defaults", path.display());
        Settings::default()
    })
}

/// Loads settings, writing the defaults out first if the file does not exist yet.
pub fn load_or_init_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        return Ok(load_settings(path));
    }
    let settings = Settings::default();
    save_settings_atomic(path, &settings)
        .with_context(|| format!("writing default settings to {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings_atomic(path: &Path, s: &Settings) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(s)?;
    fs::write(&tmp, data)?;
    atomic_rename(&tmp, path)?;
    Ok(())
}

fn atomic_rename(from: &Path, to: &Path) -> Result<()> {
    // Windows refuses to rename over an existing file
    if cfg!(windows) && to.exists() {
        fs::remove_file(to).with_context(|| format!("replacing {}", to.display()))?;
    }
    fs::rename(from, to).with_context(|| format!("moving {} into place", from.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let s = load_or_init_settings(&path).unwrap();
        assert_eq!(s, Settings::default());
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "fish_count": 7, "enable_filter": false }"#).unwrap();

        let s = load_settings(&path);
        assert_eq!(s.fish_count, 7);
        assert!(!s.enable_filter);
        assert_eq!(s.fps_cap, 60);
        assert_eq!(s.fish_aliases.len(), 5);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();
        assert_eq!(load_settings(&path), Settings::default());
    }

    #[test]
    fn saving_over_an_existing_file_replaces_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        save_settings_atomic(&path, &Settings::default()).unwrap();
        let tuned = Settings {
            fish_count: 7,
            ..Settings::default()
        };
        save_settings_atomic(&path, &tuned).unwrap();
        assert_eq!(load_settings(&path), tuned);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn cli_overrides_only_given_fields() {
        let mut s = Settings::default();
        let cli = Cli::parse_from(["fishpond", "--fish", "3", "--no-filter", "--inbox", "-"]);
        s.apply_cli(&cli);

        assert_eq!(s.fish_count, 3);
        assert!(!s.enable_filter);
        assert_eq!(s.host_inbox, Some(PathBuf::from("-")));
        assert_eq!(s.fps_cap, 60);
        assert_eq!(s.asset_dir, None);
    }

    #[test]
    fn fps_is_clamped() {
        let s = Settings {
            fps_cap: 1000,
            ..Settings::default()
        };
        assert_eq!(s.fps(), 240);
    }
}
