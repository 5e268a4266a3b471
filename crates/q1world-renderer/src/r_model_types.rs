// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_model_types.rs
// In-memory brush model: planes, nodes, leafs and surfaces.
// d*_t structures are on-disk (q1world_common::qfiles), m*_t structures live here.

use q1world_common::q_shared::{CPlane, Vec3, CONTENTS_SOLID};
use q1world_common::qfiles::{MAXLIGHTMAPS, NUM_AMBIENTS};

// ============================================================================
// BRUSH MODELS
// ============================================================================

// --- Constants ---

pub const VERTEXSIZE: usize = 7;

/// Style slot terminator.
pub const STYLE_UNUSED: u8 = 255;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SurfaceFlags: u32 {
        const PLANEBACK      = 0x02;
        const DRAWSKY        = 0x04;
        const DRAWSPRITE     = 0x08;
        const DRAWTURB       = 0x10;
        const DRAWTILED      = 0x20;
        const DRAWBACKGROUND = 0x40;
        const UNDERWATER     = 0x80;
    }
}

/// Child slot of a node. The file stores leaf `n` as `-1 - n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Node(usize),
    Leaf(usize),
}

impl NodeRef {
    /// Decode an on-disk child number.
    pub fn from_child(p: i32) -> Self {
        if p >= 0 {
            NodeRef::Node(p as usize)
        } else {
            NodeRef::Leaf((-1 - p) as usize)
        }
    }
}

/// Opaque handle to an entity fragment linked into a leaf by the entity
/// collaborator; the world walker only hands these back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EfragRef(pub usize);

// --- In-memory representation ---

#[derive(Debug, Clone, Copy, Default)]
pub struct MVertex {
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MEdge {
    pub v: [u16; 2],
}

#[derive(Debug, Clone, Default)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// total tenths in sequence ( 0 = no)
    pub anim_total: i32,
    /// time for this frame min <=time< max
    pub anim_min: i32,
    pub anim_max: i32,
    /// in the animation sequence
    pub anim_next: Option<usize>,
    /// bmodels in frame 1 use these
    pub alternate_anims: Option<usize>,
}

impl Texture {
    pub fn is_sky(&self) -> bool {
        self.name.starts_with("sky")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub mipadjust: f32,
    pub texture: usize,
    pub flags: i32,
}

impl MTexInfo {
    /// Project a point onto axis 0 (s) or 1 (t).
    #[inline]
    pub fn project(&self, axis: usize, p: &Vec3) -> f32 {
        let v = &self.vecs[axis];
        p[0] * v[0] + p[1] * v[1] + p[2] * v[2] + v[3]
    }
}

/// Polygon vertex arrays: xyz, s1 t1 (texture), s2 t2 (lightmap).
#[derive(Debug, Clone, Default)]
pub struct GlPoly {
    pub flags: SurfaceFlags,
    pub verts: Vec<[f32; VERTEXSIZE]>,
}

#[derive(Debug, Clone, Default)]
pub struct MSurface {
    /// should be drawn when node is crossed
    pub visframe: i32,

    pub plane: usize,
    pub flags: SurfaceFlags,

    /// look up in model.surfedges[], negative numbers are backwards edges
    pub firstedge: usize,
    pub numedges: usize,

    pub texturemins: [i32; 2],
    pub extents: [i32; 2],

    /// lightmap atlas coordinates
    pub light_s: i32,
    pub light_t: i32,

    pub polys: Option<GlPoly>,

    pub texinfo: usize,

    // lighting info
    pub dlightframe: i32,
    pub dlightbits: u32,

    pub lightmaptexturenum: Option<usize>,
    pub styles: [u8; MAXLIGHTMAPS],
    /// values currently used in lightmap
    pub cached_light: [i32; MAXLIGHTMAPS],
    /// true if dynamic light in cache
    pub cached_dlight: bool,
    /// byte offset into the model's RGB light data
    pub samples: Option<usize>,
}

impl MSurface {
    /// Lightmap footprint in texels.
    #[inline]
    pub fn lightmap_size(&self) -> (usize, usize) {
        (
            ((self.extents[0] >> 4) + 1) as usize,
            ((self.extents[1] >> 4) + 1) as usize,
        )
    }

    /// Active style slots, stopping at the first unused one.
    pub fn active_styles(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.styles
            .iter()
            .copied()
            .enumerate()
            .take_while(|&(_, style)| style != STYLE_UNUSED)
    }
}

#[derive(Debug, Clone)]
pub struct MNode {
    /// node needs to be traversed if current
    pub visframe: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub parent: Option<usize>,

    pub plane: usize,
    pub children: [NodeRef; 2],

    pub firstsurface: usize,
    pub numsurfaces: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MLeaf {
    /// will be a negative contents number
    pub contents: i32,
    /// node needs to be traversed if current
    pub visframe: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub parent: Option<usize>,

    /// offset into the model's visdata
    pub compressed_vis: Option<usize>,
    pub efrags: Vec<EfragRef>,

    pub firstmarksurface: usize,
    pub nummarksurfaces: usize,
    pub ambient_sound_level: [u8; NUM_AMBIENTS],
}

impl MLeaf {
    pub fn is_solid(&self) -> bool {
        self.contents == CONTENTS_SOLID
    }
}

/// Inline submodel (doors, platforms, and the world itself at index 0).
#[derive(Debug, Clone, Copy, Default)]
pub struct MModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub headnode: i32,
    pub visleafs: usize,
    pub firstface: usize,
    pub numfaces: usize,
}

// ============================================================================
// Whole model
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BrushModel {
    pub name: String,
    pub bspversion: i32,

    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,

    pub firstmodelsurface: usize,
    pub nummodelsurfaces: usize,

    pub submodels: Vec<MModel>,
    pub planes: Vec<CPlane>,
    /// number of visible leafs, not counting 0
    pub numleafs: usize,
    pub leafs: Vec<MLeaf>,
    pub vertexes: Vec<MVertex>,
    pub edges: Vec<MEdge>,
    pub nodes: Vec<MNode>,
    pub texinfo: Vec<MTexInfo>,
    pub surfaces: Vec<MSurface>,
    pub surfedges: Vec<i32>,
    pub marksurfaces: Vec<usize>,
    pub textures: Vec<Texture>,

    pub visdata: Vec<u8>,
    /// RGB triples, already expanded from monochrome data
    pub lightdata: Option<Vec<u8>>,
    pub entities: String,
}

impl BrushModel {
    /// Root of the world tree.
    pub fn headnode(&self) -> NodeRef {
        if self.nodes.is_empty() {
            NodeRef::Leaf(0)
        } else {
            NodeRef::Node(0)
        }
    }

    /// Vertex `i` of a surface's edge loop.
    pub fn surface_vertex(&self, surf: &MSurface, i: usize) -> &Vec3 {
        let e = self.surfedges[surf.firstedge + i];
        let v = if e >= 0 {
            self.edges[e as usize].v[0]
        } else {
            self.edges[(-e) as usize].v[1]
        };
        &self.vertexes[v as usize].position
    }
}
