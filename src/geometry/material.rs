use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u32);

impl MaterialId {
    /// Faces that appear before any `usemtl` directive.
    pub const DEFAULT: Self = Self(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Vec3,
    /// Occluder geometry only ever reaches the occlusion depth buffer.
    pub occluder: bool,
}

impl Material {
    pub const OCCLUDE: &'static str = "OCCLUDE";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            color: name_color(name),
            occluder: name.eq_ignore_ascii_case(Self::OCCLUDE),
        }
    }
}

/// Stable colour for a material name, so the same world always looks the same.
fn name_color(name: &str) -> Vec3 {
    // fnv-1a
    let mut hash: u32 = 0x811c9dc5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }

    let channel = |shift: u32| 0.35 + ((hash >> shift) & 0xff) as f32 / 255.0 * 0.6;
    Vec3::new(channel(0), channel(8), channel(16))
}

#[derive(Clone, Debug)]
pub struct Materials {
    materials: Vec<Material>,
}

impl Default for Materials {
    fn default() -> Self {
        Self::new()
    }
}

impl Materials {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new() -> Self {
        Self {
            materials: vec![Material::new(Self::DEFAULT_NAME)],
        }
    }

    pub fn intern(&mut self, name: &str) -> MaterialId {
        if let Some(index) = self.materials.iter().position(|m| m.name == name) {
            return MaterialId(index as u32);
        }

        self.materials.push(Material::new(name));
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.index())
    }

    pub fn is_occluder(&self, id: MaterialId) -> bool {
        self.get(id).map_or(false, |m| m.occluder)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        (self.materials.iter())
            .enumerate()
            .map(|(i, m)| (MaterialId(i as u32), m))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut materials = Materials::new();

        let stone = materials.intern("stone");
        let wood = materials.intern("wood");

        assert_eq!(materials.intern("stone"), stone);
        assert_ne!(stone, wood);
        assert_eq!(materials.intern(Materials::DEFAULT_NAME), MaterialId::DEFAULT);
        assert_eq!(materials.len(), 3);
    }

    #[test]
    fn occluder_sentinel() {
        let mut materials = Materials::new();

        let upper = materials.intern("OCCLUDE");
        let lower = materials.intern("occlude");
        let stone = materials.intern("stone");

        assert!(materials.is_occluder(upper));
        assert!(materials.is_occluder(lower));
        assert!(!materials.is_occluder(stone));
        assert!(!materials.is_occluder(MaterialId(99)));
    }

    #[test]
    fn colors_are_deterministic() {
        assert_eq!(Material::new("brick").color, Material::new("brick").color);

        let color = Material::new("brick").color;
        assert!(color.cmpge(Vec3::splat(0.35)).all());
        assert!(color.cmple(Vec3::splat(0.95)).all());
    }
}
