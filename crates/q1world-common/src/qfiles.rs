// qfiles.rs: on-disk BSP structures (Quake version 29, Half-Life version 30)
//
// Every struct is plain old data so lumps can be read with
// `bytemuck::pod_read_unaligned`; fields are little-endian on disk.

use bytemuck::{Pod, Zeroable};

// ============================================================
// .BSP file format
// ============================================================

pub const BSPVERSION: i32 = 29;
/// Half-Life maps: same lump layout, RGB lighting stored inline.
pub const HL_BSPVERSION: i32 = 30;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_TEXTURES: usize = 2;
pub const LUMP_VERTEXES: usize = 3;
pub const LUMP_VISIBILITY: usize = 4;
pub const LUMP_NODES: usize = 5;
pub const LUMP_TEXINFO: usize = 6;
pub const LUMP_FACES: usize = 7;
pub const LUMP_LIGHTING: usize = 8;
pub const LUMP_CLIPNODES: usize = 9;
pub const LUMP_LEAFS: usize = 10;
pub const LUMP_MARKSURFACES: usize = 11;
pub const LUMP_EDGES: usize = 12;
pub const LUMP_SURFEDGES: usize = 13;
pub const LUMP_MODELS: usize = 14;
pub const HEADER_LUMPS: usize = 15;

pub const MAX_MAP_HULLS: usize = 4;
pub const MAXLIGHTMAPS: usize = 4;
pub const NUM_AMBIENTS: usize = 4;
pub const MIPLEVELS: usize = 4;

/// texinfo flag: sky or slime, no lightmap or 256 subdivision
pub const TEX_SPECIAL: i32 = 1;

#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Lump {
    pub fileofs: i32,
    pub filelen: i32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DHeader {
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DModel {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub origin: [f32; 3],
    pub headnode: [i32; MAX_MAP_HULLS],
    /// not including the solid leaf 0
    pub visleafs: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DMiptexLump {
    pub nummiptex: i32,
    // followed by nummiptex i32 offsets, -1 for a missing texture
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct MipTex {
    pub name: [u8; 16],
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; MIPLEVELS],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DVertex {
    pub point: [f32; 3],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DPlane {
    pub normal: [f32; 3],
    pub dist: f32,
    /// PLANE_X - PLANE_ANYZ
    pub plane_type: i32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DNode {
    pub planenum: i32,
    /// negative numbers are -(leafs+1), not nodes
    pub children: [i16; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    /// counting both sides
    pub numfaces: u16,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct TexInfo {
    /// [s/t][xyz offset]
    pub vecs: [[f32; 4]; 2],
    pub miptex: i32,
    pub flags: i32,
}

/// Note that edge 0 is never used, because negative edge nums are used
/// for counterclockwise use of the edge in a face.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DEdge {
    pub v: [u16; 2],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DFace {
    pub planenum: i16,
    pub side: i16,
    /// we must support > 64k edges
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    /// start of [numstyles*surfsize] samples
    pub lightofs: i32,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DLeaf {
    pub contents: i32,
    /// -1 = no visibility info
    pub visofs: i32,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstmarksurface: u16,
    pub nummarksurfaces: u16,
    pub ambient_level: [u8; NUM_AMBIENTS],
}

// ============================================================
// .LIT colored lighting sidecar
// ============================================================

/// "QLIT" in little-endian
pub const LIT_IDENT: [u8; 4] = *b"QLIT";
pub const LIT_VERSION: i32 = 1;
pub const LIT_HEADER_SIZE: usize = 8;
