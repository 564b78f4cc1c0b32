//! Texture atlas and material table.
//!
//! All texture data lives in one flat array of 32-bit textels; a material is
//! a slice of that array plus a depth and a stepping rule.  The atlas is
//! per-frame scratch: `reset` rewinds the counters so the next frame's
//! materials overwrite the old ones without reallocating.

use thiserror::Error;

use super::Rgba;

/// Runtime handle for a material.  Stable until the next [`TextureAtlas::reset`].
pub type MaterialId = u16;

/// Reserved id meaning "no material"; never allocated.
pub const NO_MATERIAL: MaterialId = 0;

/// Hard cap on live materials, set by the 16-bit id.
pub const OBJECT_MAX: usize = 65_535;

/// Draw properties of one material: a slice of the atlas and a Z depth.
///
/// `increment` is the per-pixel step through the atlas (0 for flat colour)
/// and `length` the power-of-two cycle before the phase wraps.  When
/// `screen_space` is set the texture phase is a function of the absolute
/// screen column rather than of the span's start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Material {
    pub start_index: u32,
    pub start_offset: u16,
    pub increment: u16,
    pub length: u16,
    pub depth: i16,
    pub screen_space: bool,
}

/// Things that can go wrong while building materials.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AtlasError {
    /// No textel space left for the requested pixels.
    #[error("texture atlas is out of textel space")]
    TextelsFull,

    /// The material table reached [`OBJECT_MAX`].
    #[error("material table is full")]
    MaterialsFull,

    /// Cycle lengths must be a power of two so the phase can be masked.
    #[error("material length {0} is not a power of two")]
    BadLength(u16),
}

/// Append-only textel store plus the material table that indexes it.
pub struct TextureAtlas {
    textels: Vec<Rgba>,
    materials: Vec<Material>,
    textel_space: usize,
    textel_mark: usize,
    material_mark: usize,
}

impl TextureAtlas {
    /// Create an atlas with room for `textel_space` 32-bit textels.
    pub fn new(textel_space: usize) -> Self {
        let mut materials = Vec::with_capacity(256);
        materials.push(Material::default()); // id 0 stays reserved
        TextureAtlas {
            textels: Vec::with_capacity(textel_space),
            materials,
            textel_space,
            textel_mark: 0,
            material_mark: 1,
        }
    }

    /// Rewind the counters; new materials will overwrite old ones.
    pub fn reset(&mut self) {
        self.textels.clear();
        self.materials.truncate(1);
        self.textel_mark = 0;
        self.material_mark = 1;
    }

    /// Snapshot the current fill level so [`Self::reset_to_mark`] can return
    /// to it.  Pairs with [`super::ScanBuffer::set_reset_point`] to keep a
    /// static layer's materials alive across per-frame resets.
    pub fn set_reset_point(&mut self) {
        self.textel_mark = self.textels.len();
        self.material_mark = self.materials.len();
    }

    /// Roll back to the last reset point.
    pub fn reset_to_mark(&mut self) {
        self.textels.truncate(self.textel_mark);
        self.materials.truncate(self.material_mark);
    }

    /// Number of live materials, the reserved id 0 excluded.
    pub fn material_count(&self) -> usize {
        self.materials.len() - 1
    }

    pub fn textel_count(&self) -> usize {
        self.textels.len()
    }

    /// Material for `id`; unallocated ids resolve to an inert default.
    pub fn material(&self, id: MaterialId) -> Material {
        self.materials.get(id as usize).copied().unwrap_or_default()
    }

    /// Textel at `index`; out-of-range reads yield black.
    pub fn textel(&self, index: u32) -> Rgba {
        self.textels.get(index as usize).copied().unwrap_or(0)
    }

    /// Append packed R,G,B byte triplets as 0x00RRGGBB textels and return the
    /// base index of the run.  Trailing bytes short of a triplet are ignored.
    pub fn add_texture_rgb(&mut self, bytes: &[u8]) -> Result<u32, AtlasError> {
        let pixels = bytes.len() / 3;
        if pixels > self.textel_space.saturating_sub(self.textels.len()) {
            return Err(AtlasError::TextelsFull);
        }
        let base = self.textels.len() as u32;
        for rgb in bytes.chunks_exact(3) {
            self.textels
                .push(u32::from(rgb[0]) << 16 | u32::from(rgb[1]) << 8 | u32::from(rgb[2]));
        }
        Ok(base)
    }

    /// Create a flat-colour material at the given depth.
    pub fn set_single_color_material(
        &mut self,
        depth: i16,
        color: Rgba,
    ) -> Result<MaterialId, AtlasError> {
        if self.materials.len() > OBJECT_MAX {
            return Err(AtlasError::MaterialsFull);
        }
        if self.textels.len() >= self.textel_space {
            return Err(AtlasError::TextelsFull);
        }
        let start_index = self.textels.len() as u32;
        self.textels.push(color);
        self.push_material(Material {
            start_index,
            start_offset: 0,
            increment: 0,
            length: 1,
            depth,
            screen_space: false,
        })
    }

    pub fn set_single_color_material_rgb(
        &mut self,
        depth: i16,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<MaterialId, AtlasError> {
        let color = u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b);
        self.set_single_color_material(depth, color)
    }

    /// Create a tiled material over an existing textel run.
    pub fn add_texture_material(
        &mut self,
        depth: i16,
        base: u32,
        increment: u16,
        length: u16,
    ) -> Result<MaterialId, AtlasError> {
        if !length.is_power_of_two() {
            return Err(AtlasError::BadLength(length));
        }
        self.push_material(Material {
            start_index: base,
            start_offset: 0,
            increment,
            length,
            depth,
            screen_space: false,
        })
    }

    /// As [`Self::add_texture_material`], but the texture phase follows the
    /// absolute screen column, giving a pattern fixed to the screen.
    pub fn add_texture_material_screen_space(
        &mut self,
        depth: i16,
        base: u32,
        increment: u16,
        length: u16,
    ) -> Result<MaterialId, AtlasError> {
        let id = self.add_texture_material(depth, base, increment, length)?;
        self.materials[id as usize].screen_space = true;
        Ok(id)
    }

    /// Shift a material's texture phase in place (texture animation).
    /// Unallocated ids are ignored.
    pub fn set_material_offset(&mut self, id: MaterialId, offset: u16) {
        if id == NO_MATERIAL {
            return;
        }
        if let Some(m) = self.materials.get_mut(id as usize) {
            m.start_offset = offset;
        }
    }

    /// Re-stack a material in place.  Unallocated ids are ignored.
    pub fn set_material_depth(&mut self, id: MaterialId, depth: i16) {
        if id == NO_MATERIAL {
            return;
        }
        if let Some(m) = self.materials.get_mut(id as usize) {
            m.depth = depth;
        }
    }

    /// Copy the full atlas state of `src`, for buffer-pair pipelines that
    /// carry the previous frame's drawing forward.
    pub fn copy_from(&mut self, src: &TextureAtlas) {
        self.textels.clear();
        self.textels.extend_from_slice(&src.textels);
        self.materials.clear();
        self.materials.extend_from_slice(&src.materials);
        self.textel_mark = src.textel_mark;
        self.material_mark = src.material_mark;
    }

    fn push_material(&mut self, material: Material) -> Result<MaterialId, AtlasError> {
        if self.materials.len() > OBJECT_MAX {
            return Err(AtlasError::MaterialsFull);
        }
        let id = self.materials.len() as MaterialId;
        self.materials.push(material);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_material_gets_id_one() {
        let mut atlas = TextureAtlas::new(16);
        let id = atlas.set_single_color_material(10, 0xFF0000).unwrap();
        assert_eq!(id, 1);
        assert_eq!(atlas.material_count(), 1);

        let m = atlas.material(id);
        assert_eq!(m.depth, 10);
        assert_eq!(m.increment, 0);
        assert_eq!(m.length, 1);
        assert_eq!(atlas.textel(m.start_index), 0xFF0000);
    }

    #[test]
    fn rgb_texture_round_trip() {
        let mut atlas = TextureAtlas::new(16);
        let base = atlas
            .add_texture_rgb(&[0xFF, 0, 0, 0, 0xFF, 0, 0, 0, 0xFF])
            .unwrap();
        assert_eq!(atlas.textel(base), 0xFF0000);
        assert_eq!(atlas.textel(base + 1), 0x00FF00);
        assert_eq!(atlas.textel(base + 2), 0x0000FF);

        let id = atlas.add_texture_material(5, base, 1, 2).unwrap();
        assert!(!atlas.material(id).screen_space);
        let ss = atlas
            .add_texture_material_screen_space(5, base, 1, 2)
            .unwrap();
        assert!(atlas.material(ss).screen_space);
    }

    #[test]
    fn non_power_of_two_length_rejected() {
        let mut atlas = TextureAtlas::new(16);
        assert_eq!(
            atlas.add_texture_material(0, 0, 1, 3),
            Err(AtlasError::BadLength(3))
        );
        assert_eq!(
            atlas.add_texture_material(0, 0, 1, 0),
            Err(AtlasError::BadLength(0))
        );
    }

    #[test]
    fn textel_space_is_enforced() {
        let mut atlas = TextureAtlas::new(2);
        atlas.set_single_color_material(0, 1).unwrap();
        atlas.set_single_color_material(0, 2).unwrap();
        assert_eq!(
            atlas.set_single_color_material(0, 3),
            Err(AtlasError::TextelsFull)
        );
        assert_eq!(atlas.add_texture_rgb(&[1, 2, 3]), Err(AtlasError::TextelsFull));
    }

    #[test]
    fn mutators_ignore_bad_ids() {
        let mut atlas = TextureAtlas::new(4);
        let id = atlas.set_single_color_material(7, 0xABCDEF).unwrap();

        atlas.set_material_depth(NO_MATERIAL, -5);
        atlas.set_material_depth(999, -5);
        atlas.set_material_offset(999, 3);
        assert_eq!(atlas.material(id).depth, 7);

        atlas.set_material_depth(id, -5);
        atlas.set_material_offset(id, 3);
        assert_eq!(atlas.material(id).depth, -5);
        assert_eq!(atlas.material(id).start_offset, 3);
    }

    #[test]
    fn reset_rewinds_ids_and_textels() {
        let mut atlas = TextureAtlas::new(8);
        atlas.set_single_color_material(0, 0x111111).unwrap();
        atlas.set_single_color_material(0, 0x222222).unwrap();
        atlas.reset();
        assert_eq!(atlas.material_count(), 0);
        assert_eq!(atlas.textel_count(), 0);

        let id = atlas.set_single_color_material(0, 0x333333).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn reset_point_preserves_static_layer() {
        let mut atlas = TextureAtlas::new(8);
        let stat = atlas.set_single_color_material(100, 0x111111).unwrap();
        atlas.set_reset_point();

        atlas.set_single_color_material(1, 0x222222).unwrap();
        atlas.set_single_color_material(2, 0x333333).unwrap();
        atlas.reset_to_mark();

        assert_eq!(atlas.material_count(), 1);
        assert_eq!(atlas.material(stat).depth, 100);
        let next = atlas.set_single_color_material(1, 0x444444).unwrap();
        assert_eq!(next, 2);
    }
}
