use crate::assets::AssetStore;
use crate::motion::Viewport;
use crate::stage::{Node, Stage, StageError, TilingId, TilingSprite};

/// Adds a full-screen tiling water overlay on top of whatever is already on the stage.
pub fn add_water_overlay(
    stage: &mut Stage,
    assets: &AssetStore,
    viewport: Viewport,
) -> Result<TilingId, StageError> {
    let texture = assets.texture("overlay")?;
    let overlay = TilingSprite::new(texture, viewport.width, viewport.height);
    let id = stage.add_tiling(overlay);
    stage.add_child(Node::Tiling(id));
    Ok(id)
}

/// Scrolls the overlay diagonally. The texture repeats, so the offset is never wrapped.
pub fn animate_water_overlay(overlay: &mut TilingSprite, delta: f32) {
    overlay.tile_position.x -= delta;
    overlay.tile_position.y -= delta;
}

pub fn fit_overlay(overlay: &mut TilingSprite, viewport: Viewport) {
    overlay.width = viewport.width;
    overlay.height = viewport.height;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetSource, Manifest};
    use crate::stage::Vec2;

    fn overlay() -> TilingSprite {
        let store = AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap();
        TilingSprite::new(store.texture("overlay").unwrap(), 640.0, 480.0)
    }

    #[test]
    fn offset_moves_by_delta_each_tick() {
        let mut o = overlay();
        o.tile_position = Vec2::new(10.0, -4.0);
        for _ in 0..40 {
            animate_water_overlay(&mut o, 0.5);
        }
        assert_eq!(o.tile_position, Vec2::new(10.0 - 20.0, -4.0 - 20.0));
    }

    #[test]
    fn offset_keeps_decreasing_without_wrapping() {
        let mut o = overlay();
        let mut last = o.tile_position.x;
        for _ in 0..1000 {
            animate_water_overlay(&mut o, 1.0);
            assert!(o.tile_position.x < last);
            last = o.tile_position.x;
        }
        assert_eq!(o.tile_position, Vec2::new(-1000.0, -1000.0));
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        let mut o = overlay();
        animate_water_overlay(&mut o, 0.0);
        assert_eq!(o.tile_position, Vec2::default());
    }

    #[test]
    fn added_overlay_covers_the_viewport() {
        let store = AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap();
        let mut stage = Stage::new();
        let id = add_water_overlay(&mut stage, &store, Viewport::new(320.0, 200.0)).unwrap();
        let o = stage.tiling_mut(id).unwrap();
        assert_eq!((o.width, o.height), (320.0, 200.0));
        fit_overlay(o, Viewport::new(100.0, 90.0));
        assert_eq!((o.width, o.height), (100.0, 90.0));
        assert_eq!(stage.children(), &[Node::Tiling(id)]);
    }
}
