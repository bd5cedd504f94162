// Light transport — a fixed nine-pass pipeline producing per-cell HDR
// radiance: clear, ambient prefix-scan sky access, directional sunlight,
// emissive materials, scenario overlays, point/spot/rotating lights ray
// traced against an optical buffer, neighbor diffusion, and material tint.

use crate::grid::Grid;
use crate::material::{MaterialTable, Rgb};
use crate::types::{CellPos, Material};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Point,
    Spot { direction: f32, arc_width: f32, focus: f32 },
    Rotating { direction: f32, arc_width: f32, focus: f32, angular_speed: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub pos: [f32; 2],
    pub radius: f32,
    pub intensity: f32,
    pub attenuation: f32,
    pub color: Rgb,
    pub kind: LightKind,
}

impl Light {
    fn spot_factor(&self, to_target: [f32; 2]) -> f32 {
        let (direction, arc_width, focus) = match self.kind {
            LightKind::Point => return 1.0,
            LightKind::Spot { direction, arc_width, focus } => (direction, arc_width, focus),
            LightKind::Rotating { direction, arc_width, focus, .. } => (direction, arc_width, focus),
        };
        let angle = to_target[1].atan2(to_target[0]);
        let mut delta = angle - direction;
        while delta > std::f32::consts::PI {
            delta -= std::f32::consts::TAU;
        }
        while delta <= -std::f32::consts::PI {
            delta += std::f32::consts::TAU;
        }
        let half = arc_width / 2.0;
        if delta.abs() > half {
            return 0.0;
        }
        (1.0 - delta.abs() / half).max(0.0).powf(focus)
    }

    /// Advance a rotating light's current direction by `dt` seconds.
    pub fn advance_rotation(&mut self, dt: f32) {
        if let LightKind::Rotating { direction, angular_speed, .. } = &mut self.kind {
            *direction += *angular_speed * dt;
        }
    }
}

/// Per-cell HDR lighting state, parallel to `Grid`.
#[derive(Clone, Debug)]
pub struct LightGrid {
    width: i32,
    height: i32,
    colors: Vec<Rgb>,
    light_buffer: Vec<Rgb>,
    raw_light: Vec<u32>,
    emissive_overlay: Vec<Rgb>,
    optical_buffer: Vec<Rgb>,
}

/// Tunable pipeline-wide parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub ambient_color: Rgb,
    pub ambient_intensity: f32,
    pub ambient_boost: f32,
    pub sky_access_enabled: bool,
    pub sky_access_multi_directional: bool,
    pub sun_color: Rgb,
    pub sun_intensity: f32,
    pub diffusion_iterations: u32,
    pub diffusion_rate: f32,
    pub air_scatter_rate: f32,
    pub falloff: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            ambient_color: Rgb::new(0.5, 0.55, 0.65),
            ambient_intensity: 0.3,
            ambient_boost: 0.0,
            sky_access_enabled: true,
            sky_access_multi_directional: true,
            sun_color: Rgb::WHITE,
            sun_intensity: 1.0,
            diffusion_iterations: 2,
            diffusion_rate: 0.5,
            air_scatter_rate: 0.1,
            falloff: 1.0,
        }
    }
}

impl LightGrid {
    pub fn new(width: i32, height: i32) -> Self {
        let count = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            colors: vec![Rgb::BLACK; count],
            light_buffer: vec![Rgb::BLACK; count],
            raw_light: vec![0; count],
            emissive_overlay: vec![Rgb::BLACK; count],
            optical_buffer: vec![Rgb::WHITE; count],
        }
    }

    fn index(&self, pos: CellPos) -> Option<usize> {
        if pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height {
            Some((pos.y * self.width + pos.x) as usize)
        } else {
            None
        }
    }

    pub fn color_at(&self, pos: CellPos) -> Option<Rgb> {
        self.index(pos).map(|i| self.colors[i])
    }

    pub fn raw_light_at(&self, pos: CellPos) -> Option<u32> {
        self.index(pos).map(|i| self.raw_light[i])
    }

    pub fn set_overlay(&mut self, pos: CellPos, value: Rgb) {
        if let Some(i) = self.index(pos) {
            self.emissive_overlay[i] = value;
        }
    }

    fn attenuate(&self, grid: &Grid, materials: &MaterialTable, pos: CellPos, config: &LightConfig) -> f32 {
        let Some(cell) = grid.at(pos) else { return 1.0 };
        let opacity = materials.get(cell.material).opacity;
        (1.0 - opacity * cell.fill_ratio * config.falloff).clamp(0.0, 1.0)
    }

    /// Run the full fixed-order pipeline once.
    pub fn compute(&mut self, grid: &Grid, materials: &MaterialTable, lights: &[Light], config: &LightConfig) {
        let w = self.width as usize;
        let h = self.height as usize;

        // 1. Clear.
        for c in &mut self.colors {
            *c = Rgb::BLACK;
        }

        // 2. Ambient, with optional multi-directional prefix-scan sky access.
        let base = config.ambient_color.scale(config.ambient_intensity).add(Rgb::new(
            config.ambient_boost,
            config.ambient_boost,
            config.ambient_boost,
        ));
        if !config.sky_access_enabled {
            for c in &mut self.colors {
                *c = c.add(base).clamp_hdr();
            }
        } else if config.sky_access_multi_directional {
            let mut prev_v = vec![1.0f32; w];
            let mut prev_ul = vec![1.0f32; w];
            let mut prev_ur = vec![1.0f32; w];
            for y in 0..h as i32 {
                let mut curr_v = vec![0.0f32; w];
                let mut curr_ul = vec![0.0f32; w];
                let mut curr_ur = vec![0.0f32; w];
                for x in 0..w as i32 {
                    let (sky_factor, v, ul, ur) = if y == 0 {
                        (1.0, 1.0, 1.0, 1.0)
                    } else {
                        let atten_here = self.attenuate(grid, materials, CellPos::new(x, y - 1), config);
                        let v = prev_v[x as usize] * atten_here;
                        let ul = if x == 0 {
                            1.0
                        } else {
                            let atten_left = self.attenuate(grid, materials, CellPos::new(x - 1, y - 1), config);
                            prev_ul[(x - 1) as usize] * atten_left
                        };
                        let ur = if x == w as i32 - 1 {
                            1.0
                        } else {
                            let atten_right = self.attenuate(grid, materials, CellPos::new(x + 1, y - 1), config);
                            prev_ur[(x + 1) as usize] * atten_right
                        };
                        (0.5 * v + 0.25 * ul + 0.25 * ur, v, ul, ur)
                    };
                    curr_v[x as usize] = v;
                    curr_ul[x as usize] = ul;
                    curr_ur[x as usize] = ur;
                    let idx = (y as usize) * w + x as usize;
                    self.colors[idx] = self.colors[idx].add(base.scale(sky_factor)).clamp_hdr();
                }
                prev_v = curr_v;
                prev_ul = curr_ul;
                prev_ur = curr_ur;
            }
        } else {
            // Single-directional: vertical transmittance only, column-major.
            for x in 0..w as i32 {
                let mut t = 1.0f32;
                for y in 0..h as i32 {
                    if y > 0 {
                        t *= self.attenuate(grid, materials, CellPos::new(x, y - 1), config);
                    }
                    let idx = (y as usize) * w + x as usize;
                    self.colors[idx] = self.colors[idx].add(base.scale(t)).clamp_hdr();
                }
            }
        }

        // 3. Sunlight: top-to-bottom accumulator per column.
        let sun_base = config.sun_color.scale(config.sun_intensity);
        for x in 0..w as i32 {
            let mut sun = sun_base;
            for y in 0..h as i32 {
                let pos = CellPos::new(x, y);
                let idx = (y as usize) * w + x as usize;
                self.colors[idx] = self.colors[idx].add(sun).clamp_hdr();
                if let Some(cell) = grid.at(pos) {
                    let def = materials.get(cell.material);
                    let transmit = (1.0 - def.opacity * cell.fill_ratio).clamp(0.0, 1.0);
                    let tint = Rgb::WHITE.lerp(def.tint, cell.fill_ratio);
                    sun = sun.scale(transmit).mul(tint);
                }
            }
        }

        // 4. Emissive cells.
        for pos in grid.positions() {
            let Some(cell) = grid.at(pos) else { continue };
            let def = materials.get(cell.material);
            if def.emission <= 0.0 {
                continue;
            }
            if let Some(idx) = self.index(pos) {
                self.colors[idx] = self.colors[idx].add(def.emission_color.scale(def.emission)).clamp_hdr();
            }
        }

        // 5. Emissive overlay.
        for (idx, overlay) in self.emissive_overlay.iter().enumerate() {
            self.colors[idx] = self.colors[idx].add(*overlay).clamp_hdr();
        }

        // 6. Point/spot/rotating lights via DDA against the optical buffer.
        for pos in grid.positions() {
            let Some(cell) = grid.at(pos) else { continue };
            let def = materials.get(cell.material);
            let tint = Rgb::WHITE.lerp(def.tint, cell.fill_ratio);
            let transmit = (1.0 - def.opacity * cell.fill_ratio).clamp(0.0, 1.0);
            if let Some(idx) = self.index(pos) {
                self.optical_buffer[idx] = tint.scale(transmit);
            }
        }
        for light in lights {
            let radius_sq = light.radius * light.radius;
            let min_x = (light.pos[0] - light.radius).floor().max(0.0) as i32;
            let max_x = (light.pos[0] + light.radius).ceil().min(self.width as f32) as i32;
            let min_y = (light.pos[1] - light.radius).floor().max(0.0) as i32;
            let max_y = (light.pos[1] + light.radius).ceil().min(self.height as f32) as i32;
            for y in min_y..max_y {
                for x in min_x..max_x {
                    let target = CellPos::new(x, y);
                    let center = [x as f32 + 0.5, y as f32 + 0.5];
                    let dx = center[0] - light.pos[0];
                    let dy = center[1] - light.pos[1];
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq > radius_sq {
                        continue;
                    }
                    let spot = light.spot_factor([dx, dy]);
                    if spot <= 0.0 {
                        continue;
                    }
                    let falloff = spot / (1.0 + dist_sq * light.attenuation);
                    let mut carried = light.color.scale(light.intensity * falloff);
                    if carried.max_channel() < 1e-3 {
                        continue;
                    }
                    grid.trace_line(light.pos, center, |occluder| {
                        if let Some(i) = self.index(occluder) {
                            carried = carried.mul(self.optical_buffer[i]);
                        }
                        carried.max_channel() >= 1e-3
                    });
                    if let Some(idx) = self.index(target) {
                        self.colors[idx] = self.colors[idx].add(carried).clamp_hdr();
                    }
                }
            }
        }

        // 7. Diffusion.
        for _ in 0..config.diffusion_iterations {
            self.light_buffer.copy_from_slice(&self.colors);
            for pos in grid.positions() {
                let Some(cell) = grid.at(pos) else { continue };
                let def = materials.get(cell.material);
                let scatter = if cell.is_empty() { config.air_scatter_rate } else { def.scatter };
                if scatter <= 0.0 {
                    continue;
                }
                let cardinals = [
                    CellPos::new(pos.x, pos.y - 1),
                    CellPos::new(pos.x, pos.y + 1),
                    CellPos::new(pos.x - 1, pos.y),
                    CellPos::new(pos.x + 1, pos.y),
                ];
                let diagonals = [
                    CellPos::new(pos.x - 1, pos.y - 1),
                    CellPos::new(pos.x + 1, pos.y - 1),
                    CellPos::new(pos.x - 1, pos.y + 1),
                    CellPos::new(pos.x + 1, pos.y + 1),
                ];
                let diag_weight = std::f32::consts::FRAC_1_SQRT_2;
                let mut sum = Rgb::BLACK;
                let mut total_weight = 0.0f32;
                for n in cardinals {
                    if let Some(i) = self.index(n) {
                        sum = sum.add(self.light_buffer[i]);
                        total_weight += 1.0;
                    }
                }
                for n in diagonals {
                    if let Some(i) = self.index(n) {
                        sum = sum.add(self.light_buffer[i].scale(diag_weight));
                        total_weight += diag_weight;
                    }
                }
                if total_weight <= 0.0 {
                    continue;
                }
                let avg = sum.scale(1.0 / total_weight);
                if let Some(idx) = self.index(pos) {
                    self.colors[idx] = self.light_buffer[idx].lerp(avg, scatter * config.diffusion_rate);
                }
            }
        }

        // 8. Store raw light.
        for (idx, c) in self.colors.iter().enumerate() {
            self.raw_light[idx] = c.to_packed_rgba();
        }

        // 9. Material tint.
        for pos in grid.positions() {
            let Some(cell) = grid.at(pos) else { continue };
            let def = materials.get(cell.material);
            let tint = Rgb::WHITE.lerp(def.tint, def.saturation);
            if let Some(idx) = self.index(pos) {
                self.colors[idx] = self.colors[idx].mul(tint);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_air_world_single_and_multi_directional_ambient_match() {
        let grid = Grid::new(6, 6);
        let materials = MaterialTable::default();
        let mut multi = LightGrid::new(6, 6);
        let mut single = LightGrid::new(6, 6);
        let mut config = LightConfig::default();
        config.diffusion_iterations = 0;

        config.sky_access_multi_directional = true;
        multi.compute(&grid, &materials, &[], &config);
        config.sky_access_multi_directional = false;
        single.compute(&grid, &materials, &[], &config);

        for pos in grid.positions() {
            let a = multi.color_at(pos).unwrap();
            let b = single.color_at(pos).unwrap();
            assert!((a.r - b.r).abs() < 1e-4);
            assert!((a.g - b.g).abs() < 1e-4);
            assert!((a.b - b.b).abs() < 1e-4);
        }
    }

    #[test]
    fn opaque_wall_darkens_cells_below_it() {
        let mut grid = Grid::new(10, 10);
        for x in 0..10 {
            grid.replace_material(CellPos::new(x, 3), Material::Wall, 1.0);
        }
        let materials = MaterialTable::default();
        let mut light = LightGrid::new(10, 10);
        let mut config = LightConfig::default();
        config.ambient_intensity = 0.0;
        config.diffusion_iterations = 0;
        config.sun_intensity = 1.0;
        config.sun_color = Rgb::WHITE;
        light.compute(&grid, &materials, &[], &config);
        for x in 1..9 {
            let below = light.color_at(CellPos::new(x, 4)).unwrap();
            assert!(below.max_channel() < 0.1, "cell below wall should be dark: {below:?}");
        }
    }

    #[test]
    fn point_light_occluded_by_wall_is_zero() {
        let mut grid = Grid::new(15, 15);
        grid.replace_material(CellPos::new(6, 6), Material::Wall, 1.0);
        let materials = MaterialTable::default();
        let mut light = LightGrid::new(15, 15);
        let mut config = LightConfig::default();
        config.ambient_intensity = 0.0;
        config.sun_intensity = 0.0;
        config.diffusion_iterations = 0;
        let lights = [Light {
            pos: [5.5, 5.5],
            radius: 10.0,
            intensity: 2.0,
            attenuation: 0.1,
            color: Rgb::WHITE,
            kind: LightKind::Point,
        }];
        light.compute(&grid, &materials, &lights, &config);
        let occluded = light.color_at(CellPos::new(7, 7)).unwrap();
        assert_eq!(occluded, Rgb::BLACK);
    }
}
