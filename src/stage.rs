use crate::assets::{AssetError, AssetStore, Texture};
use std::ops::{Add, AddAssign, Mul, Sub};

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("sprite {0:?} is not alive")]
    DeadSprite(SpriteId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}
impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}
impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}
impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Generational handle into the stage's sprite slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpriteId {
    index: u32,
    generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TilingId(usize);

#[derive(Clone, Debug)]
pub struct Sprite {
    pub texture: Texture,
    pub position: Vec2,
    pub anchor: Vec2,
    pub scale: Vec2,
    /// Radians, clockwise on screen.
    pub rotation: f32,
    pub alpha: f32,
    pub visible: bool,
}

impl Sprite {
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            position: Vec2::default(),
            anchor: Vec2::default(),
            scale: Vec2::splat(1.0),
            rotation: 0.0,
            alpha: 1.0,
            visible: true,
        }
    }

    pub fn width(&self) -> f32 {
        self.texture.width() * self.scale.x.abs()
    }

    pub fn height(&self) -> f32 {
        self.texture.height() * self.scale.y.abs()
    }

    pub fn set_width(&mut self, w: f32) {
        let tw = self.texture.width();
        if tw > 0.0 {
            self.scale.x = w / tw;
        }
    }

    pub fn set_height(&mut self, h: f32) {
        let th = self.texture.height();
        if th > 0.0 {
            self.scale.y = h / th;
        }
    }

    /// Maps a stage point into texel coordinates, or `None` for a degenerate scale.
    pub fn to_local(&self, p: Vec2) -> Option<Vec2> {
        if self.scale.x.abs() < 1e-6 || self.scale.y.abs() < 1e-6 {
            return None;
        }
        let d = p - self.position;
        let (s, c) = self.rotation.sin_cos();
        let lx = d.x * c + d.y * s;
        let ly = -d.x * s + d.y * c;
        Some(Vec2::new(
            lx / self.scale.x + self.anchor.x * self.texture.width(),
            ly / self.scale.y + self.anchor.y * self.texture.height(),
        ))
    }

    /// Radius around `position` that contains every drawn texel.
    pub fn reach(&self) -> f32 {
        let w = self.width();
        let h = self.height();
        let ax = self.anchor.x.abs().max((1.0 - self.anchor.x).abs());
        let ay = self.anchor.y.abs().max((1.0 - self.anchor.y).abs());
        (w * ax).hypot(h * ay)
    }
}

/// A rectangle filled by repeating a texture, scrolled via `tile_position`.
#[derive(Clone, Debug)]
pub struct TilingSprite {
    pub texture: Texture,
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub tile_position: Vec2,
    pub tile_scale: Vec2,
    pub alpha: f32,
    pub visible: bool,
}

impl TilingSprite {
    pub fn new(texture: Texture, width: f32, height: f32) -> Self {
        Self {
            texture,
            position: Vec2::default(),
            width,
            height,
            tile_position: Vec2::default(),
            tile_scale: Vec2::splat(1.0),
            alpha: 1.0,
            visible: true,
        }
    }

    /// Texel coordinates for a stage point, or `None` outside the rectangle.
    pub fn to_tile(&self, p: Vec2) -> Option<Vec2> {
        let d = p - self.position;
        if d.x < 0.0 || d.y < 0.0 || d.x >= self.width || d.y >= self.height {
            return None;
        }
        let sx = if self.tile_scale.x.abs() < 1e-6 { 1.0 } else { self.tile_scale.x };
        let sy = if self.tile_scale.y.abs() < 1e-6 { 1.0 } else { self.tile_scale.y };
        Some(Vec2::new(
            (d.x - self.tile_position.x) / sx,
            (d.y - self.tile_position.y) / sy,
        ))
    }
}

/// Offsets every stage pixel by the red/green channels of `map`'s texture.
#[derive(Clone, Copy, Debug)]
pub struct DisplacementFilter {
    pub map: SpriteId,
    pub scale: Vec2,
    pub enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    Sprite(SpriteId),
    Container(ContainerId),
    Tiling(TilingId),
}

pub enum DrawItem<'a> {
    Sprite(&'a Sprite),
    Tiling(&'a TilingSprite),
}

struct Slot {
    generation: u32,
    sprite: Option<Sprite>,
}

/// Owns every visual object of a scene. Children draw in insertion order.
#[derive(Default)]
pub struct Stage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    containers: Vec<Vec<SpriteId>>,
    tilings: Vec<Option<TilingSprite>>,
    children: Vec<Node>,
    pub filters: Vec<DisplacementFilter>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached sprite from a loaded texture alias.
    pub fn sprite_from(&mut self, assets: &AssetStore, alias: &str) -> Result<SpriteId, StageError> {
        let texture = assets.texture(alias)?;
        Ok(self.insert_sprite(Sprite::new(texture)))
    }

    pub fn insert_sprite(&mut self, sprite: Sprite) -> SpriteId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.sprite = Some(sprite);
            return SpriteId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            sprite: Some(sprite),
        });
        SpriteId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn sprite(&self, id: SpriteId) -> Option<&Sprite> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.sprite.as_ref())
    }

    pub fn sprite_mut(&mut self, id: SpriteId) -> Option<&mut Sprite> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.sprite.as_mut())
    }

    /// Frees the slot; every outstanding handle to it stops resolving.
    pub fn destroy_sprite(&mut self, id: SpriteId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation || slot.sprite.is_none() {
            return false;
        }
        slot.sprite = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        true
    }

    pub fn new_container(&mut self) -> ContainerId {
        self.containers.push(Vec::new());
        ContainerId(self.containers.len() - 1)
    }

    pub fn add_to_container(&mut self, container: ContainerId, id: SpriteId) {
        if let Some(c) = self.containers.get_mut(container.0) {
            c.push(id);
        }
    }

    pub fn remove_from_container(&mut self, container: ContainerId, id: SpriteId) -> bool {
        let Some(c) = self.containers.get_mut(container.0) else {
            return false;
        };
        let before = c.len();
        c.retain(|s| *s != id);
        c.len() != before
    }

    pub fn container_len(&self, container: ContainerId) -> usize {
        self.containers.get(container.0).map_or(0, Vec::len)
    }

    pub fn add_tiling(&mut self, tiling: TilingSprite) -> TilingId {
        self.tilings.push(Some(tiling));
        TilingId(self.tilings.len() - 1)
    }

    pub fn tiling(&self, id: TilingId) -> Option<&TilingSprite> {
        self.tilings.get(id.0).and_then(Option::as_ref)
    }

    pub fn tiling_mut(&mut self, id: TilingId) -> Option<&mut TilingSprite> {
        self.tilings.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn add_child(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Visible objects in paint order.
    pub fn draw_list(&self) -> Vec<DrawItem<'_>> {
        let mut out = Vec::new();
        for node in &self.children {
            match *node {
                Node::Sprite(id) => {
                    if let Some(s) = self.sprite(id).filter(|s| s.visible) {
                        out.push(DrawItem::Sprite(s));
                    }
                }
                Node::Container(cid) => {
                    for &id in self.containers.get(cid.0).into_iter().flatten() {
                        if let Some(s) = self.sprite(id).filter(|s| s.visible) {
                            out.push(DrawItem::Sprite(s));
                        }
                    }
                }
                Node::Tiling(tid) => {
                    if let Some(t) = self.tiling(tid).filter(|t| t.visible) {
                        out.push(DrawItem::Tiling(t));
                    }
                }
            }
        }
        out
    }

    pub fn live_sprites(&self) -> usize {
        self.slots.iter().filter(|s| s.sprite.is_some()).count()
    }

    pub fn live_objects(&self) -> usize {
        self.live_sprites() + self.tilings.iter().filter(|t| t.is_some()).count()
    }

    /// Releases every sprite, tiling sprite, container and filter. Returns how many objects were freed.
    pub fn destroy(&mut self) -> usize {
        let released = self.live_objects();
        for slot in &mut self.slots {
            if slot.sprite.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).collect();
        self.tilings.clear();
        self.containers.clear();
        self.children.clear();
        self.filters.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetSource, Manifest};
    use std::f32::consts::FRAC_PI_2;

    fn assets() -> AssetStore {
        AssetStore::load(&Manifest::default_pond(), &AssetSource::Builtin).unwrap()
    }

    #[test]
    fn destroyed_handles_stop_resolving_even_after_reuse() {
        let store = assets();
        let mut stage = Stage::new();
        let a = stage.sprite_from(&store, "fish1").unwrap();
        assert!(stage.destroy_sprite(a));
        assert!(!stage.destroy_sprite(a));

        let b = stage.sprite_from(&store, "fish2").unwrap();
        assert!(stage.sprite(a).is_none());
        assert!(stage.sprite(b).is_some());
        assert_eq!(stage.live_sprites(), 1);
    }

    #[test]
    fn unknown_alias_does_not_allocate() {
        let store = assets();
        let mut stage = Stage::new();
        assert!(matches!(
            stage.sprite_from(&store, "nope"),
            Err(StageError::Asset(AssetError::UnknownAlias(_)))
        ));
        assert_eq!(stage.live_sprites(), 0);
    }

    #[test]
    fn local_coordinates_follow_anchor_scale_and_rotation() {
        let store = assets();
        let mut sprite = Sprite::new(store.texture("fish1").unwrap());
        sprite.anchor = Vec2::splat(0.5);
        sprite.position = Vec2::new(100.0, 50.0);
        sprite.scale = Vec2::splat(2.0);

        let centre = sprite.to_local(Vec2::new(100.0, 50.0)).unwrap();
        assert_eq!(centre, Vec2::new(80.0, 40.0));

        // a quarter turn clockwise sends the texture's +x axis to screen +y
        sprite.rotation = FRAC_PI_2;
        let below = sprite.to_local(Vec2::new(100.0, 70.0)).unwrap();
        assert!((below.x - 90.0).abs() < 1e-3, "{below:?}");
        assert!((below.y - 40.0).abs() < 1e-3, "{below:?}");
    }

    #[test]
    fn draw_list_respects_child_order_and_visibility() {
        let store = assets();
        let mut stage = Stage::new();
        let bg = stage.sprite_from(&store, "background").unwrap();
        stage.add_child(Node::Sprite(bg));
        let fish = stage.new_container();
        stage.add_child(Node::Container(fish));
        for alias in ["fish1", "fish2"] {
            let id = stage.sprite_from(&store, alias).unwrap();
            stage.add_to_container(fish, id);
        }
        let overlay = TilingSprite::new(store.texture("overlay").unwrap(), 10.0, 10.0);
        let tid = stage.add_tiling(overlay);
        stage.add_child(Node::Tiling(tid));
        let hidden = stage.sprite_from(&store, "displacement").unwrap();
        stage.sprite_mut(hidden).unwrap().visible = false;
        stage.add_child(Node::Sprite(hidden));

        let list = stage.draw_list();
        assert_eq!(list.len(), 4);
        assert!(matches!(list[0], DrawItem::Sprite(_)));
        assert!(matches!(list[3], DrawItem::Tiling(_)));
    }

    #[test]
    fn destroy_releases_everything() {
        let store = assets();
        let mut stage = Stage::new();
        let id = stage.sprite_from(&store, "fish3").unwrap();
        stage.add_child(Node::Sprite(id));
        let tid = stage.add_tiling(TilingSprite::new(store.texture("overlay").unwrap(), 4.0, 4.0));
        stage.add_child(Node::Tiling(tid));

        assert_eq!(stage.destroy(), 2);
        assert_eq!(stage.live_objects(), 0);
        assert!(stage.sprite(id).is_none());
        assert!(stage.children().is_empty());
        assert_eq!(stage.destroy(), 0);
    }

    #[test]
    fn tiling_lookup_is_offset_by_tile_position() {
        let store = assets();
        let mut t = TilingSprite::new(store.texture("overlay").unwrap(), 50.0, 50.0);
        t.tile_position = Vec2::new(-3.0, -4.0);
        assert_eq!(t.to_tile(Vec2::new(1.0, 1.0)), Some(Vec2::new(4.0, 5.0)));
        assert_eq!(t.to_tile(Vec2::new(60.0, 1.0)), None);
    }
}
