// Core types shared across the simulation: grid coordinates, entity
// identifiers, and the small closed enums (materials, organism kinds,
// growth stages) that the rest of the crate branches on by ordinal.
//
// Organism IDs are plain manager-assigned `u32` handles (0 reserved as
// invalid) — they are *not* derived from the PRNG, since organism lifetime
// is local bookkeeping,
// not something that needs global uniqueness across a save file. Genome and
// training-session identifiers, by contrast, need to survive being shipped
// to persistent storage and compared across processes, so they're
// deterministic UUID v4s drawn from the sim's `SimRng`.
//
// **Critical constraint: determinism.** `SimUuid` values are generated from
// the simulation's `SimRng` (see `dirtsim_prng`). Do not use external UUID
// libraries or OS entropy anywhere in this crate.

use dirtsim_prng::SimRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position in the 2-D cell grid, in cell units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: Self) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The 4 face-adjacent neighbor coordinates (N, S, E, W), in that order.
    pub fn face_neighbors(self) -> [CellPos; 4] {
        [
            CellPos::new(self.x, self.y - 1),
            CellPos::new(self.x, self.y + 1),
            CellPos::new(self.x + 1, self.y),
            CellPos::new(self.x - 1, self.y),
        ]
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Deterministic UUID v4 — used for genome and training-session identity.
// ---------------------------------------------------------------------------

/// A UUID v4, generated deterministically from the simulation PRNG.
///
/// Layout follows RFC 4122: 128 bits with the version nibble (bits 48-51)
/// set to `0100` and the variant bits (bits 64-65) set to `10`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimUuid([u8; 16]);

impl SimUuid {
    pub fn new_v4(rng: &mut SimRng) -> Self {
        let mut bytes = rng.next_128_bits();
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    pub const NIL: SimUuid = SimUuid([0u8; 16]);

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Parse a UUID from its 8-4-4-4-12 hex string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for i in 0..16 {
            bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// A short 8-hex-character prefix, used in auto-generated genome names
    /// (`training_<short id>_rank_N`).
    pub fn short(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

// Custom serde: serialize as the 8-4-4-4-12 hex string so SimUuid can be
// used as a JSON map key.
impl Serialize for SimUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SimUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SimUuid::from_str(&s).ok_or_else(|| serde::de::Error::custom("invalid UUID format"))
    }
}

impl fmt::Debug for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimUuid({self})")
    }
}

impl fmt::Display for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3],
            b[4], b[5],
            b[6], b[7],
            b[8], b[9],
            b[10], b[11], b[12], b[13], b[14], b[15],
        )
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub SimUuid);

        impl $name {
            pub fn new(rng: &mut SimRng) -> Self {
                Self(SimUuid::new_v4(rng))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_id!(/// Content-address of a stored genome.
GenomeId);
uuid_id!(/// Identifies one `EvolutionStart .. EvolutionStop` lifecycle.
TrainingSessionId);

// ---------------------------------------------------------------------------
// Organism identity — plain manager-assigned handles, not UUIDs.
// ---------------------------------------------------------------------------

/// Stable handle to an organism. `0` is reserved as the invalid handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganismId(pub u32);

impl OrganismId {
    pub const INVALID: OrganismId = OrganismId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Organism({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

/// The fixed material palette. Ordinal position matters: the tree brain's
/// sensory histogram is indexed by `Material as usize`, so reordering this
/// enum changes the meaning of every trained genome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Material {
    Air,
    Dirt,
    Leaf,
    Metal,
    Root,
    Sand,
    Seed,
    Wall,
    Water,
    Wood,
}

pub const NUM_MATERIALS: usize = 10;

impl Material {
    pub const ALL: [Material; NUM_MATERIALS] = [
        Material::Air,
        Material::Dirt,
        Material::Leaf,
        Material::Metal,
        Material::Root,
        Material::Sand,
        Material::Seed,
        Material::Wall,
        Material::Water,
        Material::Wood,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::Air
    }
}

/// Organism species. `Goose` is a named-but-unimplemented kind (out of
/// scope per spec Non-goals) — present in the enum because the fitness
/// table and wire protocol must be able to name it without a schema break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrganismKind {
    Tree,
    Duck,
    Goose,
}

/// A tree's growth lifecycle stage. Ordered: transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GrowthStage {
    Seed,
    Germination,
    Sapling,
    Mature,
    Decline,
}

impl Default for GrowthStage {
    fn default() -> Self {
        GrowthStage::Seed
    }
}

/// Which endpoint of a bone (if any) is a pivot hinge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HingeEnd {
    None,
    A,
    B,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v4_version_and_variant_bits() {
        let mut rng = SimRng::new(42);
        for _ in 0..1000 {
            let uuid = SimUuid::new_v4(&mut rng);
            let bytes = uuid.as_bytes();
            assert_eq!(bytes[6] >> 4, 4, "UUID version must be 4");
            assert_eq!(bytes[8] >> 6, 2, "UUID variant must be RFC 4122");
        }
    }

    #[test]
    fn uuid_determinism() {
        let mut rng_a = SimRng::new(42);
        let mut rng_b = SimRng::new(42);
        for _ in 0..100 {
            assert_eq!(SimUuid::new_v4(&mut rng_a), SimUuid::new_v4(&mut rng_b));
        }
    }

    #[test]
    fn genome_id_determinism() {
        let mut rng_a = SimRng::new(99);
        let mut rng_b = SimRng::new(99);
        assert_eq!(GenomeId::new(&mut rng_a), GenomeId::new(&mut rng_b));
    }

    #[test]
    fn uuid_display_format() {
        let mut rng = SimRng::new(42);
        let uuid = SimUuid::new_v4(&mut rng);
        let s = uuid.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(&s[8..9], "-");
        assert_eq!(&s[13..14], "-");
        assert_eq!(&s[18..19], "-");
        assert_eq!(&s[23..24], "-");
    }

    #[test]
    fn uuid_serialization_roundtrip() {
        let mut rng = SimRng::new(42);
        let uuid = SimUuid::new_v4(&mut rng);
        let json = serde_json::to_string(&uuid).unwrap();
        let restored: SimUuid = serde_json::from_str(&json).unwrap();
        assert_eq!(uuid, restored);
    }

    #[test]
    fn cell_pos_manhattan_distance() {
        let a = CellPos::new(0, 0);
        let b = CellPos::new(3, 4);
        assert_eq!(a.manhattan_distance(b), 7);
    }

    #[test]
    fn cell_pos_ordering() {
        let a = CellPos::new(0, 0);
        let b = CellPos::new(1, 0);
        assert!(a < b);
    }

    #[test]
    fn material_index_matches_ordinal() {
        assert_eq!(Material::Air.index(), 0);
        assert_eq!(Material::Wood.index(), 9);
        assert_eq!(Material::ALL.len(), NUM_MATERIALS);
    }

    #[test]
    fn organism_id_invalid_is_zero() {
        assert!(!OrganismId::INVALID.is_valid());
        assert!(OrganismId(1).is_valid());
    }
}
