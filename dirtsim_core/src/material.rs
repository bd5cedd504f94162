// The material table — immutable per-material properties consumed by the
// physics stepper and the light pipeline.
//
// A `BTreeMap` keyed by a closed material enum, populated with concrete
// tuned constants in a `Default` impl: optical properties (opacity, tint,
// emission, scatter, saturation) and physical properties (density class,
// solidity) rather than structural stiffness.
//
// Lookup is by enum ordinal via `MaterialTable::get`, and contents are never
// mutated after construction — scenarios may not edit the table, only the
// grid.
//
// See also: `types.rs` for the `Material` enum, `grid.rs` for the cells this
// table describes, `light.rs` for the consumer of `opacity`/`tint`/`emission`.

use crate::types::{Material, NUM_MATERIALS};
use serde::{Deserialize, Serialize};

/// Linear HDR color, channels typically in `[0, 2]` (see `light.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn scale(self, s: f32) -> Rgb {
        Rgb::new(self.r * s, self.g * s, self.b * s)
    }

    pub fn add(self, other: Rgb) -> Rgb {
        Rgb::new(self.r + other.r, self.g + other.g, self.b + other.b)
    }

    pub fn mul(self, other: Rgb) -> Rgb {
        Rgb::new(self.r * other.r, self.g * other.g, self.b * other.b)
    }

    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
        )
    }

    /// HDR accumulators clamp to 2.0 per channel on `+=`.
    pub fn clamp_hdr(self) -> Rgb {
        Rgb::new(
            self.r.clamp(0.0, 2.0),
            self.g.clamp(0.0, 2.0),
            self.b.clamp(0.0, 2.0),
        )
    }

    /// Display conversion clamps to 1.0 per channel, packed as RGBA8888.
    pub fn to_packed_rgba(self) -> u32 {
        let r = (self.r.clamp(0.0, 1.0) * 255.0).round() as u32;
        let g = (self.g.clamp(0.0, 1.0) * 255.0).round() as u32;
        let b = (self.b.clamp(0.0, 1.0) * 255.0).round() as u32;
        (r << 24) | (g << 16) | (b << 8) | 0xFF
    }

    pub fn max_channel(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }
}

/// Relative mass class used by the gravity/pressure stepper. Kept as a
/// closed enum rather than a bare float — branch by kind, don't hide the
/// ordering in an open-ended number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DensityClass {
    Weightless,
    Light,
    Medium,
    Heavy,
    Immovable,
}

impl DensityClass {
    /// Relative weight multiplier fed into `pending_force.y += gravity *
    /// density_weight(material)`.
    pub fn weight(self) -> f32 {
        match self {
            DensityClass::Weightless => 0.0,
            DensityClass::Light => 0.3,
            DensityClass::Medium => 1.0,
            DensityClass::Heavy => 2.2,
            DensityClass::Immovable => 1000.0,
        }
    }
}

/// Static properties of one material kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    pub opacity: f32,
    pub tint: Rgb,
    pub emission: f32,
    pub emission_color: Rgb,
    pub scatter: f32,
    pub saturation: f32,
    pub density_class: DensityClass,
    pub is_solid: bool,
    /// Per-tick velocity retention applied during integration (`velocity *=
    /// damping`), before the global `PhysicsSettings::air_resistance`
    /// multiplier. `1.0` retains all velocity; lower values drain momentum
    /// faster, e.g. water sheds speed quicker than a coasting metal cell.
    pub damping: f32,
}

/// The full material table, one entry per `Material` ordinal. Statically
/// initialized and never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable {
    entries: [MaterialProperties; NUM_MATERIALS],
}

impl MaterialTable {
    pub fn get(&self, material: Material) -> &MaterialProperties {
        &self.entries[material.index()]
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        use DensityClass::*;
        let air = MaterialProperties {
            opacity: 0.0,
            tint: Rgb::WHITE,
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.0,
            saturation: 0.0,
            density_class: Weightless,
            is_solid: false,
            damping: 1.0,
        };
        let dirt = MaterialProperties {
            opacity: 0.95,
            tint: Rgb::new(0.36, 0.25, 0.16),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.05,
            saturation: 0.8,
            density_class: Heavy,
            is_solid: true,
            damping: 0.90,
        };
        let leaf = MaterialProperties {
            opacity: 0.6,
            tint: Rgb::new(0.20, 0.55, 0.15),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.3,
            saturation: 0.7,
            density_class: Light,
            is_solid: false,
            damping: 0.85,
        };
        let metal = MaterialProperties {
            opacity: 1.0,
            tint: Rgb::new(0.75, 0.76, 0.8),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.0,
            saturation: 0.2,
            density_class: Immovable,
            is_solid: true,
            damping: 0.99,
        };
        let root = MaterialProperties {
            opacity: 0.9,
            tint: Rgb::new(0.45, 0.33, 0.2),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.05,
            saturation: 0.75,
            density_class: Heavy,
            is_solid: true,
            damping: 0.90,
        };
        let sand = MaterialProperties {
            opacity: 0.85,
            tint: Rgb::new(0.86, 0.78, 0.55),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.1,
            saturation: 0.6,
            density_class: Medium,
            is_solid: true,
            damping: 0.92,
        };
        let seed = MaterialProperties {
            opacity: 0.7,
            tint: Rgb::new(0.5, 0.35, 0.15),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.05,
            saturation: 0.8,
            density_class: Medium,
            is_solid: true,
            damping: 0.95,
        };
        let wall = MaterialProperties {
            opacity: 1.0,
            tint: Rgb::new(0.5, 0.5, 0.5),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.0,
            saturation: 0.1,
            density_class: Immovable,
            is_solid: true,
            damping: 0.99,
        };
        let water = MaterialProperties {
            opacity: 0.05,
            tint: Rgb::new(0.2, 0.45, 0.85),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.15,
            saturation: 0.9,
            density_class: Medium,
            is_solid: false,
            damping: 0.97,
        };
        let wood = MaterialProperties {
            opacity: 0.98,
            tint: Rgb::new(0.4, 0.26, 0.13),
            emission: 0.0,
            emission_color: Rgb::BLACK,
            scatter: 0.02,
            saturation: 0.85,
            density_class: Heavy,
            is_solid: true,
            damping: 0.96,
        };

        Self {
            entries: [
                air, dirt, leaf, metal, root, sand, seed, wall, water, wood,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_transparent_and_weightless() {
        let table = MaterialTable::default();
        let air = table.get(Material::Air);
        assert_eq!(air.opacity, 0.0);
        assert!(!air.is_solid);
        assert_eq!(air.density_class.weight(), 0.0);
    }

    #[test]
    fn water_drains_momentum_faster_than_metal() {
        let table = MaterialTable::default();
        assert!(table.get(Material::Water).damping < table.get(Material::Metal).damping);
    }

    #[test]
    fn metal_and_wall_are_solid() {
        let table = MaterialTable::default();
        assert!(table.get(Material::Metal).is_solid);
        assert!(table.get(Material::Wall).is_solid);
    }

    #[test]
    fn water_has_low_opacity_and_blue_tint() {
        let table = MaterialTable::default();
        let water = table.get(Material::Water);
        assert!(water.opacity < 0.1);
        assert!(water.tint.b > water.tint.r);
    }

    #[test]
    fn rgb_hdr_clamp() {
        let c = Rgb::new(3.0, -1.0, 1.5).clamp_hdr();
        assert_eq!(c, Rgb::new(2.0, 0.0, 1.5));
    }

    #[test]
    fn rgb_lerp_endpoints() {
        let a = Rgb::BLACK;
        let b = Rgb::WHITE;
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn table_lookup_is_stable_by_ordinal() {
        let table = MaterialTable::default();
        for m in Material::ALL {
            let _ = table.get(m);
        }
    }
}
