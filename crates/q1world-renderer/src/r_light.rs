// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_light.rs
// Lightstyles, dynamic light marking, lightmap building and point light sampling.

use crate::r_local::{DLight, WorldRenderState, LIGHT_PROBE_DEPTH};
use crate::r_model_types::{BrushModel, MSurface, NodeRef, SurfaceFlags};
use q1world_common::q_shared::*;
use q1world_common::qfiles::MAXLIGHTMAPS;

// ============================================================
// Lightstyles
// ============================================================

/// Animation strings and their current 8.8 scale values.
/// 'm' is normal light, 'a' is no light, 'z' is double bright.
#[derive(Debug, Clone)]
pub struct LightStyleTable {
    maps: Vec<String>,
    values: [i32; MAX_STYLE_VALUES],
}

/// Value of the styles that never animate.
pub const STATIC_STYLE_VALUE: i32 = 264;

impl Default for LightStyleTable {
    fn default() -> Self {
        let mut values = [STATIC_STYLE_VALUE; MAX_STYLE_VALUES];
        values[..MAX_LIGHTSTYLES].fill(256);
        Self {
            maps: vec![String::new(); MAX_LIGHTSTYLES],
            values,
        }
    }
}

impl LightStyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lightstyle(&mut self, style: usize, map: &str) {
        if style >= MAX_LIGHTSTYLES {
            log::warn!("lightstyle {} out of range", style);
            return;
        }
        log::debug!("lightstyle {} = \"{}\"", style, map);
        self.maps[style] = map.to_string();
    }

    pub fn map(&self, style: usize) -> &str {
        &self.maps[style]
    }

    #[inline]
    pub fn value(&self, style: u8) -> i32 {
        self.values[style as usize]
    }

    pub fn values(&self) -> &[i32; MAX_STYLE_VALUES] {
        &self.values
    }

    /// Step every style to the frame for `time` (ten frames a second).
    pub fn r_animate_light(&mut self, time: f32) {
        let i = (time * 10.0) as i32;
        for (map, value) in self.maps.iter().zip(self.values.iter_mut()) {
            let map = map.as_bytes();
            if map.is_empty() {
                *value = 256;
                continue;
            }
            let k = i.rem_euclid(map.len() as i32) as usize;
            *value = (map[k] as i32 - b'a' as i32) * 22;
        }
    }
}

// ============================================================
// DYNAMIC LIGHTS
// ============================================================

/// Flag every surface that `light` can reach with `bit`. A surface whose
/// `dlightframe` is stale has its bits replaced, otherwise they accumulate.
pub fn r_mark_lights(world: &mut BrushModel, light: &DLight, bit: u32, dlightframecount: i32, node: NodeRef) {
    let mut node = node;
    loop {
        let n = match node {
            NodeRef::Leaf(_) => return,
            NodeRef::Node(n) => n,
        };

        let nd = &world.nodes[n];
        let dist = world.planes[nd.plane].distance(&light.origin);

        if dist > light.radius {
            node = nd.children[0];
            continue;
        }
        if dist < -light.radius {
            node = nd.children[1];
            continue;
        }

        let children = nd.children;
        let first = nd.firstsurface;
        let maxdist = light.radius * light.radius;

        // mark the polygons
        for i in first..first + nd.numsurfaces {
            if !light_reaches_surface(world, &world.surfaces[i], light, dist, maxdist) {
                continue;
            }
            let surf = &mut world.surfaces[i];
            if surf.dlightframe != dlightframecount {
                // not dynamic until now
                surf.dlightbits = bit;
                surf.dlightframe = dlightframecount;
            } else {
                surf.dlightbits |= bit;
            }
        }

        r_mark_lights(world, light, bit, dlightframecount, children[0]);
        node = children[1];
    }
}

/// Clamp the light's projection to the surface rectangle and compare the
/// remaining distance against the radius.
fn light_reaches_surface(world: &BrushModel, surf: &MSurface, light: &DLight, dist: f32, maxdist: f32) -> bool {
    let normal = &world.planes[surf.plane].normal;
    let tex = &world.texinfo[surf.texinfo];
    let impact = vector_ma(&light.origin, -dist, normal);

    let mut st = [0i32; 2];
    for (axis, out) in st.iter_mut().enumerate() {
        let l = tex.project(axis, &impact) - surf.texturemins[axis] as f32;
        let corner = ((l + 0.5) as i32).clamp(0, surf.extents[axis].max(0));
        *out = (l - corner as f32) as i32;
    }

    let (s, t) = (st[0] as f32, st[1] as f32);
    s * s + t * t + dist * dist < maxdist
}

impl WorldRenderState {
    /// Mark surfaces touched by this frame's lights. Runs before the frame
    /// counter advances, so the marks carry next frame's number.
    pub fn r_push_dlights(&mut self) {
        if !self.settings.dynamic {
            return;
        }

        self.dlightframecount = self.framecount + 1;
        let head = self.world.headnode();

        for (i, dl) in self.dlights.iter().enumerate().take(MAX_DLIGHTS) {
            if !dl.is_active(self.time) {
                continue;
            }
            r_mark_lights(&mut self.world, dl, 1 << i, self.dlightframecount, head);
        }
    }
}

// ============================================================
// LIGHTMAP BUILDING
// ============================================================

/// Inputs the builder reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct LightFrame<'a> {
    pub framecount: i32,
    pub fullbright: bool,
    pub styles: &'a [i32; MAX_STYLE_VALUES],
    pub dlights: &'a [DLight],
}

/// What a built lightmap was built from, for change detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightCache {
    pub cached_light: [i32; MAXLIGHTMAPS],
    pub cached_dlight: bool,
}

pub fn r_set_cache_state(surf: &mut MSurface, cache: LightCache) {
    surf.cached_light = cache.cached_light;
    surf.cached_dlight = cache.cached_dlight;
}

/// Add each marked light's falloff to the 8.8 RGB accumulators.
pub fn r_add_dynamic_lights(world: &BrushModel, surf: &MSurface, dlights: &[DLight], blocklights: &mut [i32]) {
    let (smax, tmax) = surf.lightmap_size();
    let plane = &world.planes[surf.plane];
    let tex = &world.texinfo[surf.texinfo];

    for (lnum, dl) in dlights.iter().enumerate().take(MAX_DLIGHTS) {
        if surf.dlightbits & (1 << lnum) == 0 {
            continue; // not lit by this light
        }

        let dist = dot_product(&dl.origin, &plane.normal) - plane.dist;
        let rad = dl.radius - dist.abs();
        if rad < dl.minlight {
            continue;
        }
        let minlight = rad - dl.minlight;

        let impact = vector_ma(&dl.origin, -dist, &plane.normal);
        let local = [
            tex.project(0, &impact) - surf.texturemins[0] as f32,
            tex.project(1, &impact) - surf.texturemins[1] as f32,
        ];
        let color = [dl.color[0] * 256.0, dl.color[1] * 256.0, dl.color[2] * 256.0];

        for t in 0..tmax {
            let td = ((local[1] - (t * 16) as f32) as i32).abs();
            for s in 0..smax {
                let sd = ((local[0] - (s * 16) as f32) as i32).abs();
                let dist = (if sd > td { sd + (td >> 1) } else { td + (sd >> 1) }) as f32;
                if dist < minlight {
                    let brightness = rad - dist;
                    let bl = &mut blocklights[(t * smax + s) * 3..][..3];
                    for (c, channel) in bl.iter_mut().enumerate() {
                        *channel += (brightness * color[c]) as i32;
                    }
                }
            }
        }
    }
}

/// Combine the surface's styled samples and marked dynamic lights into
/// RGBA texels at `dest`, rows `stride` bytes apart.
pub fn r_build_light_map(
    world: &BrushModel,
    surf: &MSurface,
    frame: &LightFrame,
    dest: &mut [u8],
    stride: usize,
) -> LightCache {
    let mut cache = LightCache {
        cached_dlight: surf.dlightframe == frame.framecount,
        ..Default::default()
    };

    let (smax, tmax) = surf.lightmap_size();
    let size = smax * tmax;
    let mut blocklights = vec![0i32; size * 3];

    for (map, style) in surf.active_styles() {
        cache.cached_light[map] = frame.styles[style as usize];
    }

    match world.lightdata.as_deref() {
        // set to full bright if no light data
        Some(_) if frame.fullbright => blocklights.fill(255 * 256),
        None => blocklights.fill(255 * 256),
        Some(lightdata) => {
            if let Some(mut ofs) = surf.samples {
                for (map, _) in surf.active_styles() {
                    let scale = cache.cached_light[map];
                    let samples = &lightdata[ofs..ofs + size * 3];
                    for (bl, &sample) in blocklights.iter_mut().zip(samples) {
                        *bl += sample as i32 * scale;
                    }
                    ofs += size * 3;
                }
            }

            if surf.dlightframe == frame.framecount {
                r_add_dynamic_lights(world, surf, frame.dlights, &mut blocklights);
            }
        }
    }

    // bound and shift
    for t in 0..tmax {
        let row = &mut dest[t * stride..t * stride + smax * 4];
        let bl = &blocklights[t * smax * 3..(t + 1) * smax * 3];
        for (texel, rgb) in row.chunks_exact_mut(4).zip(bl.chunks_exact(3)) {
            for c in 0..3 {
                texel[c] = (rgb[c] >> 7).clamp(0, 255) as u8;
            }
            texel[3] = 255;
        }
    }

    cache
}

// ============================================================
// LIGHT SAMPLING
// ============================================================

/// Bilinear blend of four samples with 4-bit fractional weights.
#[inline]
fn blend(a00: i32, a01: i32, a10: i32, a11: i32, sfrac: i32, tfrac: i32) -> i32 {
    let top = (((a01 - a00) * sfrac) >> 4) + a00;
    let bottom = (((a11 - a10) * sfrac) >> 4) + a10;
    (((bottom - top) * tfrac) >> 4) + top
}

/// Styled, interpolated light at texel position (`ds`, `dt`) of a surface.
fn sample_surface(lightdata: &[u8], surf: &MSurface, ofs: usize, styles: &[i32; MAX_STYLE_VALUES], ds: i32, dt: i32) -> Vec3 {
    let (smax, tmax) = surf.lightmap_size();
    let (sx, ty) = ((ds >> 4) as usize, (dt >> 4) as usize);
    let (dsfrac, dtfrac) = (ds & 15, dt & 15);

    // neighbours past the last row or column reuse the edge sample
    let next_s = if sx + 1 < smax { 3 } else { 0 };
    let next_t = if ty + 1 < tmax { smax * 3 } else { 0 };

    // [r00 g00 b00 r01 g01 b01 r10 g10 b10 r11 g11 b11]
    let mut acc = [0i32; 12];
    let mut lightmap = ofs + (ty * smax + sx) * 3;
    for (_, style) in surf.active_styles() {
        let scale = styles[style as usize] as f32 * (1.0 / 256.0);
        let corners = [lightmap, lightmap + next_s, lightmap + next_t, lightmap + next_t + next_s];
        for (k, &corner) in corners.iter().enumerate() {
            for c in 0..3 {
                let a = &mut acc[k * 3 + c];
                *a = (*a as f32 + lightdata[corner + c] as f32 * scale) as i32;
            }
        }
        lightmap += smax * tmax * 3;
    }

    let mut color = [0.0; 3];
    for (c, out) in color.iter_mut().enumerate() {
        *out = blend(acc[c], acc[3 + c], acc[6 + c], acc[9 + c], dsfrac, dtfrac) as f32;
    }
    color
}

/// Trace `start`..`end` through the tree and sample the first lightmapped
/// surface crossed. `lightspot`/`lightplane` track the last crossing tested.
pub fn recursive_light_point(
    world: &BrushModel,
    styles: &[i32; MAX_STYLE_VALUES],
    node: NodeRef,
    start: &Vec3,
    end: &Vec3,
    lightspot: &mut Vec3,
    lightplane: &mut Option<usize>,
) -> Option<Vec3> {
    let mut node = node;
    let n = loop {
        let n = match node {
            NodeRef::Leaf(_) => return None, // didn't hit anything
            NodeRef::Node(n) => n,
        };
        let plane = &world.planes[world.nodes[n].plane];
        let front = plane.distance(start);
        let back = plane.distance(end);
        if (back < 0.0) == (front < 0.0) {
            node = world.nodes[n].children[(front < 0.0) as usize];
            continue;
        }
        break n;
    };

    let nd = &world.nodes[n];
    let plane = &world.planes[nd.plane];
    let front = plane.distance(start);
    let back = plane.distance(end);
    let side = (front < 0.0) as usize;

    let frac = front / (front - back);
    let mid = [
        start[0] + (end[0] - start[0]) * frac,
        start[1] + (end[1] - start[1]) * frac,
        start[2] + (end[2] - start[2]) * frac,
    ];

    // go down front side
    if let Some(color) = recursive_light_point(world, styles, nd.children[side], start, &mid, lightspot, lightplane) {
        return Some(color);
    }

    // check for impact on this node
    *lightspot = mid;
    *lightplane = Some(nd.plane);

    for surf in &world.surfaces[nd.firstsurface..nd.firstsurface + nd.numsurfaces] {
        if surf.flags.contains(SurfaceFlags::DRAWTILED) {
            continue; // no lightmaps
        }

        let tex = &world.texinfo[surf.texinfo];
        let mut ds = tex.project(0, &mid) as i32;
        let mut dt = tex.project(1, &mid) as i32;

        if ds < surf.texturemins[0] || dt < surf.texturemins[1] {
            continue;
        }
        ds -= surf.texturemins[0];
        dt -= surf.texturemins[1];
        if ds > surf.extents[0] || dt > surf.extents[1] {
            continue;
        }

        let color = match (world.lightdata.as_deref(), surf.samples) {
            (Some(lightdata), Some(ofs)) => sample_surface(lightdata, surf, ofs, styles, ds, dt),
            _ => VEC3_ORIGIN,
        };
        return Some(color);
    }

    // go down back side
    recursive_light_point(world, styles, nd.children[side ^ 1], &mid, end, lightspot, lightplane)
}

impl WorldRenderState {
    /// Static light at a world point, probing straight down. None when the
    /// probe reaches a leaf without crossing a lit surface.
    pub fn r_light_point(&mut self, p: &Vec3) -> Option<Vec3> {
        if self.settings.fullbright || self.world.lightdata.is_none() {
            return Some([255.0; 3]);
        }

        let end = [p[0], p[1], p[2] - LIGHT_PROBE_DEPTH];
        recursive_light_point(
            &self.world,
            self.lightstyles.values(),
            self.world.headnode(),
            p,
            &end,
            &mut self.lightspot,
            &mut self.lightplane,
        )
    }

    /// Mean of the sampled channels, 0 on a miss.
    pub fn r_light_point_intensity(&mut self, p: &Vec3) -> f32 {
        self.r_light_point(p).map_or(0.0, |c| (c[0] + c[1] + c[2]) * (1.0 / 3.0))
    }
}
