// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_local.rs
// Per-level render state, settings, and the interfaces to the host renderer.

use crate::r_light::LightStyleTable;
use crate::r_lightmap::{LightmapAtlasSet, LightmapRect};
use crate::r_model_types::{BrushModel, EfragRef};
use q1world_common::cvar::{CvarContext, CvarFlags};
use q1world_common::q_shared::{angle_vectors, Vec3};

use thiserror::Error;

// ============================================================
// Constants
// ============================================================

pub const BACKFACE_EPSILON: f32 = 0.01;

/// Length of the downward probe used for point lighting.
pub const LIGHT_PROBE_DEPTH: f32 = 2048.0;

/// Animation cycles longer than this are treated as corrupt.
pub const MAX_ANIM_CYCLE_STEPS: usize = 100;

// ============================================================
// Frame errors
// ============================================================

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("texture animation: broken cycle on {name}")]
    BrokenAnimationCycle { name: String },

    #[error("texture animation: infinite cycle on {name}")]
    InfiniteAnimationCycle { name: String },
}

// ============================================================
// Dynamic lights
// ============================================================

/// A point light owned by the game simulation and read once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DLight {
    pub key: i32,
    pub origin: Vec3,
    pub radius: f32,
    /// stop lighting after this time
    pub die: f32,
    /// don't add when contributing less
    pub minlight: f32,
    pub color: [f32; 3],
}

impl DLight {
    pub fn new(origin: Vec3, radius: f32, color: [f32; 3]) -> Self {
        Self {
            key: 0,
            origin,
            radius,
            die: f32::MAX,
            minlight: 0.0,
            color,
        }
    }

    pub fn is_active(&self, time: f32) -> bool {
        self.radius > 0.0 && self.die >= time
    }
}

// ============================================================
// View
// ============================================================

#[derive(Debug, Clone, Copy)]
pub struct RefDef {
    pub vieworg: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// degrees
    pub fov_x: f32,
    pub fov_y: f32,
    /// seconds since the level started
    pub time: f32,
}

impl Default for RefDef {
    fn default() -> Self {
        Self {
            vieworg: [0.0; 3],
            forward: [1.0, 0.0, 0.0],
            right: [0.0, -1.0, 0.0],
            up: [0.0, 0.0, 1.0],
            fov_x: 90.0,
            fov_y: 73.74,
            time: 0.0,
        }
    }
}

impl RefDef {
    /// View from `vieworg` looking along pitch/yaw/roll `angles` (degrees).
    pub fn from_angles(vieworg: Vec3, angles: &Vec3, fov_x: f32, fov_y: f32, time: f32) -> Self {
        let (forward, right, up) = angle_vectors(angles);
        Self {
            vieworg,
            forward,
            right,
            up,
            fov_x,
            fov_y,
            time,
        }
    }
}

// ============================================================
// Settings (snapshot of the r_* cvars)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub fullbright: bool,
    pub novis: bool,
    pub dynamic: bool,
    /// false submits surfaces in traversal order instead of chaining by texture
    pub texsort: bool,
    pub drawworld: bool,
    pub wateralpha: f32,
    /// keep colinear polygon vertices (level load only)
    pub keeptjunctions: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fullbright: false,
            novis: false,
            dynamic: true,
            texsort: true,
            drawworld: true,
            wateralpha: 1.0,
            keeptjunctions: false,
        }
    }
}

impl RenderSettings {
    /// Create the renderer's cvars with their default values.
    pub fn register(cvars: &mut CvarContext) {
        cvars.get("r_fullbright", "0", CvarFlags::empty());
        cvars.get("r_novis", "0", CvarFlags::empty());
        cvars.get("r_dynamic", "1", CvarFlags::empty());
        cvars.get("r_drawworld", "1", CvarFlags::empty());
        cvars.get("r_wateralpha", "1", CvarFlags::ARCHIVE);
        cvars.get("gl_texsort", "1", CvarFlags::empty());
        cvars.get("gl_keeptjunctions", "0", CvarFlags::ARCHIVE | CvarFlags::LATCH);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self {
            fullbright: cvars.variable_value("r_fullbright") != 0.0,
            novis: cvars.variable_value("r_novis") != 0.0,
            dynamic: cvars.variable_value("r_dynamic") != 0.0,
            texsort: cvars.variable_value("gl_texsort") != 0.0,
            drawworld: cvars.variable_value("r_drawworld") != 0.0,
            wateralpha: cvars.variable_value("r_wateralpha"),
            keeptjunctions: cvars.variable_value("gl_keeptjunctions") != 0.0,
        }
    }

    /// Re-read the cvars if any were set since the last call.
    pub fn update(&mut self, cvars: &mut CvarContext) -> bool {
        if cvars.take_modified().is_empty() {
            return false;
        }
        *self = Self::from_cvars(cvars);
        true
    }
}

// ============================================================
// Host renderer interfaces
// ============================================================

/// Box-vs-view test. Returns true when the box is entirely outside.
pub trait FrustumCuller {
    fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool;
}

impl<F: Fn(&Vec3, &Vec3) -> bool> FrustumCuller for F {
    fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        self(mins, maxs)
    }
}

/// Accepts every box.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCull;

impl FrustumCuller for NoCull {
    fn cull_box(&self, _mins: &Vec3, _maxs: &Vec3) -> bool {
        false
    }
}

/// Receives visible world surfaces. Each surface carries its built
/// polygon (`polys`) and atlas placement.
pub trait SurfaceSink {
    fn submit_surface(&mut self, world: &BrushModel, surf: usize, texture: usize);

    /// Translucent liquids, drawn after the opaque world.
    fn submit_water_surface(&mut self, world: &BrushModel, surf: usize, texture: usize) {
        self.submit_surface(world, surf, texture);
    }

    /// Entity fragments linked into a visible leaf.
    fn store_efrags(&mut self, _leaf: usize, _efrags: &[EfragRef]) {}
}

/// Copies a changed atlas region to the GPU. `pixels` starts at the
/// rectangle's top-left texel; rows are `stride` bytes apart.
pub trait LightmapUploader {
    fn upload_lightmap(&mut self, atlas: usize, rect: LightmapRect, pixels: &[u8], stride: usize);
}

// ============================================================
// Texture chains
// ============================================================

/// Visible surfaces collected per texture for batched submission.
#[derive(Debug, Clone, Default)]
pub struct TextureChains {
    pub chains: Vec<Vec<usize>>,
    /// sky surfaces collected in no-sort mode
    pub sky: Vec<usize>,
    /// deferred liquids
    pub water: Vec<usize>,
}

impl TextureChains {
    pub fn new(numtextures: usize) -> Self {
        Self {
            chains: vec![Vec::new(); numtextures],
            sky: Vec::new(),
            water: Vec::new(),
        }
    }

    pub fn push(&mut self, texture: usize, surf: usize) {
        self.chains[texture].push(surf);
    }

    pub fn clear(&mut self) {
        for chain in &mut self.chains {
            chain.clear();
        }
        self.sky.clear();
        self.water.clear();
    }

    /// Every chained surface, in chain order.
    pub fn surfaces(&self) -> impl Iterator<Item = usize> + '_ {
        self.chains
            .iter()
            .flatten()
            .chain(self.sky.iter())
            .chain(self.water.iter())
            .copied()
    }
}

// ============================================================
// World render state
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub brush_polys: usize,
    pub lightmaps_rebuilt: usize,
    pub lightmaps_uploaded: usize,
}

/// Everything the world renderer mutates, for one loaded level.
pub struct WorldRenderState {
    pub world: BrushModel,
    pub settings: RenderSettings,

    pub time: f32,
    pub framecount: i32,
    pub visframecount: i32,
    pub dlightframecount: i32,

    pub viewleaf: Option<usize>,
    pub oldviewleaf: Option<usize>,
    /// view origin in world space
    pub modelorg: Vec3,

    pub lightstyles: LightStyleTable,
    /// lights pushed this frame; bit i of a surface's dlightbits is dlights[i]
    pub dlights: Vec<DLight>,
    pub lightmaps: LightmapAtlasSet,
    pub chains: TextureChains,

    /// last point light hit, for shadow projection
    pub lightspot: Vec3,
    pub lightplane: Option<usize>,

    pub stats: FrameStats,
}
