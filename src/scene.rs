use crate::assets::{AssetStore, WrapMode};
use crate::motion::{animate_fishes, facing_rotation, fold_into_band, Fish, SwimTraits, Viewport};
use crate::overlay::{add_water_overlay, animate_water_overlay, fit_overlay};
use crate::stage::{
    ContainerId, DisplacementFilter, Node, SpriteId, Stage, StageError, TilingId, Vec2,
};
use rand::Rng;

/// Background is oversized so the ripple filter never pulls in the stage edge.
const BACKGROUND_COVER: f32 = 1.2;
/// Upper bound on fish per pond, whatever the settings ask for.
pub const MAX_FISH: usize = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct SceneOptions {
    pub fish_count: usize,
    pub fish_aliases: Vec<String>,
    pub displacement_scale: f32,
    pub overlay_speed: f32,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            fish_count: 20,
            fish_aliases: (1..=5).map(|i| format!("fish{i}")).collect(),
            displacement_scale: 50.0,
            overlay_speed: 1.0,
        }
    }
}

/// Owns the stage and everything animated on it, from setup until [`Scene::teardown`].
pub struct Scene {
    stage: Stage,
    fishes: Vec<Fish>,
    fish_container: ContainerId,
    background: SpriteId,
    overlay: Option<TilingId>,
    displacement: SpriteId,
    viewport: Viewport,
    overlay_speed: f32,
}

impl Scene {
    pub fn setup<R: Rng + ?Sized>(
        assets: &AssetStore,
        viewport: Viewport,
        opts: &SceneOptions,
        rng: &mut R,
    ) -> Result<Self, StageError> {
        let mut stage = Stage::new();

        let background = add_background(&mut stage, assets, viewport)?;
        let (fish_container, fishes) = add_fishes(&mut stage, assets, viewport, opts, rng);
        let overlay = add_water_overlay(&mut stage, assets, viewport)?;
        let displacement = add_displacement_effect(&mut stage, assets, viewport, opts.displacement_scale)?;

        log::info!(
            "scene ready: {} fish, viewport {:.0}x{:.0}",
            fishes.len(),
            viewport.width,
            viewport.height
        );

        Ok(Self {
            stage,
            fishes,
            fish_container,
            background,
            overlay: Some(overlay),
            displacement,
            viewport,
            overlay_speed: opts.overlay_speed,
        })
    }

    /// One ticker step. `delta` is in frames (1.0 at 60 fps).
    pub fn update(&mut self, delta: f32, viewport: Viewport) {
        if viewport != self.viewport {
            self.resize(viewport);
        }
        if !self.fishes.is_empty() {
            animate_fishes(&mut self.stage, &mut self.fishes, self.viewport);
        }
        if let Some(overlay) = self.overlay.and_then(|id| self.stage.tiling_mut(id)) {
            animate_water_overlay(overlay, delta * self.overlay_speed);
        }
    }

    /// Refits the screen-sized objects and folds every fish into the new padded band.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        for fish in &self.fishes {
            if let Some(sprite) = self.stage.sprite_mut(fish.sprite) {
                sprite.position.x = fold_into_band(sprite.position.x, viewport.width);
                sprite.position.y = fold_into_band(sprite.position.y, viewport.height);
            }
        }
        if let Some(bg) = self.stage.sprite_mut(self.background) {
            fit_background(bg, viewport);
        }
        if let Some(overlay) = self.overlay.and_then(|id| self.stage.tiling_mut(id)) {
            fit_overlay(overlay, viewport);
        }
        if let Some(map) = self.stage.sprite_mut(self.displacement) {
            map.position = viewport.center();
        }
        log::debug!("scene resized to {:.0}x{:.0}", viewport.width, viewport.height);
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    pub fn fishes(&self) -> &[Fish] {
        &self.fishes
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn overlay_offset(&self) -> Option<Vec2> {
        self.overlay
            .and_then(|id| self.stage.tiling(id))
            .map(|o| o.tile_position)
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        for f in &mut self.stage.filters {
            f.enabled = enabled;
        }
    }

    pub fn filter_enabled(&self) -> bool {
        self.stage.filters.iter().any(|f| f.enabled)
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        if let Some(overlay) = self.overlay.and_then(|id| self.stage.tiling_mut(id)) {
            overlay.visible = visible;
        }
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay
            .and_then(|id| self.stage.tiling(id))
            .is_some_and(|o| o.visible)
    }

    /// Removes the fish from their container, then destroys every stage object.
    /// Returns the number of objects released.
    pub fn teardown(mut self) -> usize {
        for fish in self.fishes.drain(..) {
            self.stage.remove_from_container(self.fish_container, fish.sprite);
        }
        self.overlay = None;
        let released = self.stage.destroy();
        log::info!("scene torn down, released {released} objects");
        released
    }
}

fn fit_background(bg: &mut crate::stage::Sprite, viewport: Viewport) {
    if viewport.is_landscape() {
        bg.set_width(viewport.width * BACKGROUND_COVER);
        bg.scale.y = bg.scale.x;
    } else {
        bg.set_height(viewport.height * BACKGROUND_COVER);
        bg.scale.x = bg.scale.y;
    }
    bg.position = viewport.center();
}

fn add_background(
    stage: &mut Stage,
    assets: &AssetStore,
    viewport: Viewport,
) -> Result<SpriteId, StageError> {
    let id = stage.sprite_from(assets, "background")?;
    let bg = stage.sprite_mut(id).ok_or(StageError::DeadSprite(id))?;
    bg.anchor = Vec2::splat(0.5);
    fit_background(bg, viewport);
    stage.add_child(Node::Sprite(id));
    Ok(id)
}

fn add_fishes<R: Rng + ?Sized>(
    stage: &mut Stage,
    assets: &AssetStore,
    viewport: Viewport,
    opts: &SceneOptions,
    rng: &mut R,
) -> (ContainerId, Vec<Fish>) {
    let container = stage.new_container();
    stage.add_child(Node::Container(container));

    let count = opts.fish_count.min(MAX_FISH);
    if count < opts.fish_count {
        log::warn!("fish count {} capped at {MAX_FISH}", opts.fish_count);
    }
    let mut fishes = Vec::with_capacity(count);
    if opts.fish_aliases.is_empty() {
        log::warn!("no fish aliases configured, the pond stays empty");
        return (container, fishes);
    }

    for i in 0..count {
        let alias = &opts.fish_aliases[i % opts.fish_aliases.len()];
        let id = match stage.sprite_from(assets, alias) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("skipping fish {i}: {e}");
                continue;
            }
        };
        let traits = SwimTraits::roll(rng);
        let Some(sprite) = stage.sprite_mut(id) else {
            continue;
        };
        sprite.anchor = Vec2::splat(0.5);
        sprite.position = Vec2::new(
            rng.gen::<f32>() * viewport.width,
            rng.gen::<f32>() * viewport.height,
        );
        sprite.scale = Vec2::splat(traits.scale);
        sprite.rotation = facing_rotation(traits.heading);

        stage.add_to_container(container, id);
        fishes.push(Fish {
            sprite: id,
            heading: traits.heading,
            speed: traits.speed,
            turn_rate: traits.turn_rate,
        });
    }
    (container, fishes)
}

fn add_displacement_effect(
    stage: &mut Stage,
    assets: &AssetStore,
    viewport: Viewport,
    scale: f32,
) -> Result<SpriteId, StageError> {
    let id = stage.sprite_from(assets, "displacement")?;
    let map = stage.sprite_mut(id).ok_or(StageError::DeadSprite(id))?;
    map.texture.wrap = WrapMode::Repeat;
    map.anchor = Vec2::splat(0.5);
    map.position = viewport.center();
    // only sampled by the filter
    map.visible = false;
    stage.add_child(Node::Sprite(id));
    stage.filters.push(DisplacementFilter {
        map: id,
        scale: Vec2::splat(scale),
        enabled: true,
    });
    Ok(id)
}
