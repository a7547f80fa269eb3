use fishpond::app::drive_headless;
use fishpond::assets::{AssetSource, AssetStore, Manifest};
use fishpond::bridge::HostBridge;
use fishpond::motion::{Viewport, STAGE_PADDING};
use fishpond::render::Surface;
use fishpond::scene::{Scene, SceneOptions};
use image::{Rgb, RgbImage};
use rand::{rngs::StdRng, SeedableRng};

fn builtin() -> AssetStore {
    AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap()
}

#[test]
fn fish_stay_in_the_padded_band_over_a_long_run() {
    let mut rng = StdRng::seed_from_u64(2024);
    let vp = Viewport::new(640.0, 384.0);
    let mut scene = Scene::setup(&builtin(), vp, &SceneOptions::default(), &mut rng).unwrap();

    for _ in 0..2000 {
        scene.update(1.0, vp);
        for f in scene.fishes() {
            let p = scene.stage().sprite(f.sprite).unwrap().position;
            assert!(p.x >= -STAGE_PADDING && p.x <= vp.width + STAGE_PADDING);
            assert!(p.y >= -STAGE_PADDING && p.y <= vp.height + STAGE_PADDING);
        }
    }
    assert_eq!(scene.fishes().len(), 20);
    assert_eq!(scene.overlay_offset().unwrap().x, -2000.0);
}

#[test]
fn same_seed_gives_the_same_pond() {
    let store = builtin();
    let vp = Viewport::new(500.0, 500.0);
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scene = Scene::setup(&store, vp, &SceneOptions::default(), &mut rng).unwrap();
        for _ in 0..50 {
            scene.update(1.0, vp);
        }
        let positions: Vec<_> = scene
            .fishes()
            .iter()
            .map(|f| scene.stage().sprite(f.sprite).unwrap().position)
            .collect();
        positions
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
}

#[test]
fn headless_run_signals_loaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let outbox = dir.path().join("outbox.txt");
    let mut bridge = HostBridge::connect(None, Some(&outbox)).unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut surface = Surface::new(32, 10);
    let opts = SceneOptions {
        fish_count: 4,
        ..SceneOptions::default()
    };
    let mut scene = Scene::setup(&builtin(), surface.viewport(8.0), &opts, &mut rng).unwrap();

    let report = drive_headless(&mut scene, &mut bridge, &mut surface, 8.0, 30);
    assert_eq!(report.frames, 30);
    assert_eq!(report.fish, 4);
    drop(bridge);
    assert_eq!(std::fs::read_to_string(&outbox).unwrap(), "loaded\n");
    assert_eq!(scene.teardown(), 7);
}

#[test]
fn assets_load_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = Manifest::default_pond();
    for entry in &manifest.entries {
        let img = RgbImage::from_pixel(16, 8, Rgb([10, 20, 30]));
        img.save(dir.path().join(&entry.src)).unwrap();
    }
    let store = AssetStore::load(&manifest, &AssetSource::Directory(dir.path().to_path_buf())).unwrap();
    assert_eq!(store.len(), manifest.entries.len());

    let mut rng = StdRng::seed_from_u64(3);
    let scene = Scene::setup(&store, Viewport::new(160.0, 90.0), &SceneOptions::default(), &mut rng).unwrap();
    assert_eq!(scene.fishes().len(), 20);
}

#[test]
fn a_missing_file_fails_the_whole_load() {
    let dir = tempfile::tempdir().unwrap();
    let err = AssetStore::load(
        &Manifest::default_pond(),
        &AssetSource::Directory(dir.path().to_path_buf()),
    )
    .err()
    .unwrap();
    assert!(err.to_string().contains("background"), "{err}");
}
