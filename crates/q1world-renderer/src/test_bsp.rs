// test_bsp.rs: assembles small level images for unit tests

use q1world_common::q_shared::{plane_type_for_normal, Vec3, CONTENTS_EMPTY, CONTENTS_SOLID};
use q1world_common::qfiles::*;

const BIG: i16 = 4096;

pub struct BspBuilder {
    pub version: i32,
    pub planes: Vec<DPlane>,
    pub extra_plane_bytes: usize,
    pub textures: Vec<MipTex>,
    pub vertexes: Vec<DVertex>,
    pub visdata: Vec<u8>,
    pub nodes: Vec<DNode>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub lighting: Vec<u8>,
    pub leafs: Vec<DLeaf>,
    pub marksurfaces: Vec<u16>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub models: Vec<DModel>,
}

impl BspBuilder {
    pub fn new() -> Self {
        Self {
            version: BSPVERSION,
            planes: Vec::new(),
            extra_plane_bytes: 0,
            textures: Vec::new(),
            vertexes: Vec::new(),
            visdata: Vec::new(),
            nodes: Vec::new(),
            texinfo: Vec::new(),
            faces: Vec::new(),
            lighting: Vec::new(),
            leafs: Vec::new(),
            marksurfaces: Vec::new(),
            // edge 0 is never used
            edges: vec![DEdge { v: [0, 0] }],
            surfedges: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn add_plane(&mut self, normal: Vec3, dist: f32) -> i32 {
        self.planes.push(DPlane {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal) as i32,
        });
        self.planes.len() as i32 - 1
    }

    pub fn add_texture(&mut self, name: &str, width: u32, height: u32) -> i32 {
        let mut raw = [0u8; 16];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        self.textures.push(MipTex {
            name: raw,
            width,
            height,
            offsets: [0; MIPLEVELS],
        });
        self.textures.len() as i32 - 1
    }

    pub fn add_texinfo(&mut self, s: [f32; 4], t: [f32; 4], miptex: i32, flags: i32) -> i16 {
        self.texinfo.push(TexInfo { vecs: [s, t], miptex, flags });
        self.texinfo.len() as i16 - 1
    }

    /// Adds the vertex loop as fresh vertexes and forward edges.
    pub fn add_face(
        &mut self,
        plane: i32,
        side: i16,
        texinfo: i16,
        verts: &[Vec3],
        styles: [u8; MAXLIGHTMAPS],
        lightofs: i32,
    ) -> u16 {
        let first_vert = self.vertexes.len() as u16;
        for v in verts {
            self.vertexes.push(DVertex { point: *v });
        }
        let firstedge = self.surfedges.len() as i32;
        let n = verts.len() as u16;
        for i in 0..n {
            self.edges.push(DEdge { v: [first_vert + i, first_vert + (i + 1) % n] });
            self.surfedges.push(self.edges.len() as i32 - 1);
        }
        self.faces.push(DFace {
            planenum: plane as i16,
            side,
            firstedge,
            numedges: n as i16,
            texinfo,
            styles,
            lightofs,
        });
        self.faces.len() as u16 - 1
    }

    pub fn add_leaf(&mut self, contents: i32, visofs: i32, marks: &[u16]) -> i16 {
        let firstmarksurface = self.marksurfaces.len() as u16;
        self.marksurfaces.extend_from_slice(marks);
        self.leafs.push(DLeaf {
            contents,
            visofs,
            mins: [-BIG; 3],
            maxs: [BIG; 3],
            firstmarksurface,
            nummarksurfaces: marks.len() as u16,
            ambient_level: [0; NUM_AMBIENTS],
        });
        self.leafs.len() as i16 - 1
    }

    pub fn add_node(&mut self, plane: i32, children: [i16; 2], firstface: u16, numfaces: u16) -> i16 {
        self.nodes.push(DNode {
            planenum: plane,
            children,
            mins: [-BIG; 3],
            maxs: [BIG; 3],
            firstface,
            numfaces,
        });
        self.nodes.len() as i16 - 1
    }

    pub fn add_model(&mut self, visleafs: i32, firstface: i32, numfaces: i32) {
        self.models.push(DModel {
            mins: [-BIG as f32; 3],
            maxs: [BIG as f32; 3],
            origin: [0.0; 3],
            headnode: [0; MAX_MAP_HULLS],
            visleafs,
            firstface,
            numfaces,
        });
    }

    fn texture_lump(&self) -> Vec<u8> {
        if self.textures.is_empty() {
            return Vec::new();
        }
        let count = self.textures.len();
        let mut out = (count as i32).to_le_bytes().to_vec();
        let base = 4 + count * 4;
        for i in 0..count {
            let ofs = base + i * std::mem::size_of::<MipTex>();
            out.extend_from_slice(&(ofs as i32).to_le_bytes());
        }
        for t in &self.textures {
            out.extend_from_slice(bytemuck::bytes_of(t));
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); HEADER_LUMPS];
        lumps[LUMP_ENTITIES] = b"{\n\"classname\" \"worldspawn\"\n}\n\0".to_vec();
        lumps[LUMP_PLANES] = bytemuck::cast_slice(&self.planes).to_vec();
        lumps[LUMP_PLANES].extend(std::iter::repeat(0u8).take(self.extra_plane_bytes));
        lumps[LUMP_TEXTURES] = self.texture_lump();
        lumps[LUMP_VERTEXES] = bytemuck::cast_slice(&self.vertexes).to_vec();
        lumps[LUMP_VISIBILITY] = self.visdata.clone();
        lumps[LUMP_NODES] = bytemuck::cast_slice(&self.nodes).to_vec();
        lumps[LUMP_TEXINFO] = bytemuck::cast_slice(&self.texinfo).to_vec();
        lumps[LUMP_FACES] = bytemuck::cast_slice(&self.faces).to_vec();
        lumps[LUMP_LIGHTING] = self.lighting.clone();
        lumps[LUMP_LEAFS] = bytemuck::cast_slice(&self.leafs).to_vec();
        lumps[LUMP_MARKSURFACES] = bytemuck::cast_slice(&self.marksurfaces).to_vec();
        lumps[LUMP_EDGES] = bytemuck::cast_slice(&self.edges).to_vec();
        lumps[LUMP_SURFEDGES] = bytemuck::cast_slice(&self.surfedges).to_vec();
        lumps[LUMP_MODELS] = bytemuck::cast_slice(&self.models).to_vec();

        let mut header = DHeader {
            version: self.version,
            lumps: [Lump::default(); HEADER_LUMPS],
        };
        let mut body = Vec::new();
        let mut ofs = std::mem::size_of::<DHeader>();
        for (i, data) in lumps.iter().enumerate() {
            header.lumps[i] = Lump { fileofs: ofs as i32, filelen: data.len() as i32 };
            body.extend_from_slice(data);
            ofs += data.len();
        }

        let mut out = bytemuck::bytes_of(&header).to_vec();
        out.extend_from_slice(&body);
        out
    }
}

/// Quad on the x=0 plane spanning y,z in 0..48, facing +x.
pub const WALL_QUAD: [Vec3; 4] = [
    [0.0, 0.0, 0.0],
    [0.0, 48.0, 0.0],
    [0.0, 48.0, 48.0],
    [0.0, 0.0, 48.0],
];

/// One split plane at x=0. Front: empty leaf 1 holding a 4x4 lightmapped
/// wall with every style-0 sample set to `sample`. Back: solid leaf 0.
/// The PVS of leaf 1 contains only itself.
pub fn wall_level(sample: u8) -> BspBuilder {
    let mut b = BspBuilder::new();
    let p = b.add_plane([1.0, 0.0, 0.0], 0.0);
    let t = b.add_texture("wall", 64, 64);
    let ti = b.add_texinfo([0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], t, 0);
    b.add_face(p, 0, ti, &WALL_QUAD, [0, 255, 255, 255], 0);
    b.lighting = vec![sample; 16];
    b.visdata = vec![0x01];
    b.add_leaf(CONTENTS_SOLID, -1, &[]);
    b.add_leaf(CONTENTS_EMPTY, 0, &[0]);
    b.add_node(p, [-2, -1], 0, 1);
    b.add_model(1, 0, 1);
    b
}

/// Split plane at x=0 with an empty room on each side. Leaf 1 (x>0) holds
/// surface 0 facing +x, leaf 2 (x<0) holds surface 1 facing -x. Neither
/// room can see the other. No light data.
pub fn two_room_level() -> BspBuilder {
    let mut b = BspBuilder::new();
    let p = b.add_plane([1.0, 0.0, 0.0], 0.0);
    let t = b.add_texture("wall", 64, 64);
    let ti = b.add_texinfo([0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], t, 0);
    b.add_face(p, 0, ti, &WALL_QUAD, [0, 255, 255, 255], -1);
    b.add_face(p, 1, ti, &WALL_QUAD, [0, 255, 255, 255], -1);
    b.visdata = vec![0x01, 0x02];
    b.add_leaf(CONTENTS_SOLID, -1, &[]);
    b.add_leaf(CONTENTS_EMPTY, 0, &[0]);
    b.add_leaf(CONTENTS_EMPTY, 1, &[1]);
    b.add_node(p, [-2, -3], 0, 2);
    b.add_model(2, 0, 2);
    b
}

/// Floor on the z=0 plane spanning x,y in 0..64 (5x5 lightmap), fully
/// lit at 255 on style 0. Above: empty leaf 1. Below: solid leaf 0.
pub fn floor_level() -> BspBuilder {
    let mut b = BspBuilder::new();
    let p = b.add_plane([0.0, 0.0, 1.0], 0.0);
    let t = b.add_texture("floor", 64, 64);
    let ti = b.add_texinfo([1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], t, 0);
    let quad = [[0.0, 0.0, 0.0], [64.0, 0.0, 0.0], [64.0, 64.0, 0.0], [0.0, 64.0, 0.0]];
    b.add_face(p, 0, ti, &quad, [0, 255, 255, 255], 0);
    b.lighting = vec![255; 25];
    b.visdata = vec![0x01];
    b.add_leaf(CONTENTS_SOLID, -1, &[]);
    b.add_leaf(CONTENTS_EMPTY, 0, &[0]);
    b.add_node(p, [-2, -1], 0, 1);
    b.add_model(1, 0, 1);
    b
}
