// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_model.rs
// Brush model loading from level bytes, PVS decompression and point lookup.

use crate::r_model_types::*;
use q1world_common::q_shared::{
    add_point_to_bounds, clear_bounds, little_float, little_long, little_short, little_ushort,
    radius_from_bounds, CPlane, Vec3, CONTENTS_EMPTY, PLANE_ANYZ,
};
use q1world_common::qfiles::*;

use bytemuck::Pod;
use thiserror::Error;

// ============================================================
// Errors
// ============================================================

/// Level load failures. Any of these aborts the load; nothing is kept.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{name} has wrong version number ({version} should be {} or {})", BSPVERSION, HL_BSPVERSION)]
    BadVersion { name: String, version: i32 },

    #[error("{name}: file is truncated")]
    ShortFile { name: String },

    #[error("funny lump size in {name} (lump {lump})")]
    FunnyLumpSize { name: String, lump: usize },

    #[error("bad surface extents {extents:?} on surface {surface}")]
    BadExtents { surface: usize, extents: [i32; 2] },

    #[error("texture {name} is not 16 aligned")]
    BadTextureSize { name: String },

    #[error("texinfo {texinfo}: miptex {miptex} >= numtextures")]
    BadTexinfo { texinfo: usize, miptex: i32 },

    #[error("{what} {index} references plane {plane}")]
    BadPlane { what: &'static str, index: usize, plane: i32 },

    #[error("node {node} has bad child {child}")]
    BadChild { node: usize, child: i32 },

    #[error("{what} {index} references a missing surface")]
    BadSurface { what: &'static str, index: usize },

    #[error("bad edge reference {edge}")]
    BadEdge { edge: i32 },

    #[error("surface {surface} lighting offset {lightofs} is outside the light data")]
    BadLightofs { surface: usize, lightofs: i32 },

    #[error("bad animating texture {name}")]
    BadAnimatingTexture { name: String },

    #[error("missing frame {frame} of {name}")]
    MissingAnimFrame { frame: usize, name: String },

    #[error("{name} has no submodels")]
    NoSubmodels { name: String },

    #[error("lightmaps full, no room for a {width}x{height} block")]
    LightmapsFull { width: i32, height: i32 },
}

const ANIM_CYCLE: i32 = 2;

// ============================================================
// Lump access
// ============================================================

fn lump_bytes<'a>(name: &str, buffer: &'a [u8], l: &Lump) -> Result<&'a [u8], LoadError> {
    let ofs = little_long(l.fileofs);
    let len = little_long(l.filelen);
    if ofs < 0 || len < 0 || ofs as usize + len as usize > buffer.len() {
        return Err(LoadError::ShortFile { name: name.to_string() });
    }
    Ok(&buffer[ofs as usize..ofs as usize + len as usize])
}

fn lump_records<T: Pod>(name: &str, data: &[u8], lump: usize) -> Result<Vec<T>, LoadError> {
    let in_size = std::mem::size_of::<T>();
    if data.len() % in_size != 0 {
        return Err(LoadError::FunnyLumpSize { name: name.to_string(), lump });
    }
    Ok(data.chunks_exact(in_size).map(bytemuck::pod_read_unaligned).collect())
}

fn c_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

// ============================================================
// PVS
// ============================================================

/// Expand a run-length encoded visibility row. A zero byte is followed by
/// a count of zero bytes; anything else is literal. The result is always
/// exactly `row` bytes; short or overlong input is truncated silently.
/// Without input every leaf is visible.
pub fn mod_decompress_vis(input: Option<&[u8]>, row: usize) -> Vec<u8> {
    let input = match input {
        Some(input) => input,
        None => return vec![0xff; row], // no vis info, so make all visible
    };

    let mut out = Vec::with_capacity(row);
    let mut i = 0;
    while out.len() < row {
        let Some(&b) = input.get(i) else {
            break;
        };
        if b != 0 {
            out.push(b);
            i += 1;
            continue;
        }

        let c = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        let c = c.min(row - out.len());
        out.resize(out.len() + c, 0);
    }
    out.resize(row, 0);
    out
}

impl BrushModel {
    /// Length in bytes of one decompressed PVS row.
    pub fn vis_row(&self) -> usize {
        (self.numleafs + 7) >> 3
    }

    /// Decompressed PVS for a leaf. Bit `i` refers to leaf `i + 1`.
    pub fn leaf_pvs(&self, leaf: usize) -> Vec<u8> {
        let row = self.vis_row();
        if leaf == 0 {
            return mod_decompress_vis(None, row);
        }
        let compressed = self.leafs[leaf].compressed_vis.map(|ofs| &self.visdata[ofs..]);
        mod_decompress_vis(compressed, row)
    }

    /// Leaf containing `p`. Points exactly on a plane go to the back side.
    pub fn point_in_leaf(&self, p: &Vec3) -> usize {
        let mut node = self.headnode();
        loop {
            match node {
                NodeRef::Leaf(l) => return l,
                NodeRef::Node(n) => {
                    let nd = &self.nodes[n];
                    let plane = &self.planes[nd.plane];
                    let d = q1world_common::q_shared::dot_product(p, &plane.normal) - plane.dist;
                    node = if d > 0.0 { nd.children[0] } else { nd.children[1] };
                }
            }
        }
    }
}

// ===============================================================
//  BRUSHMODEL LOADING
// ===============================================================

fn mod_load_vertexes(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DVertex> = lump_records(&m.name, data, LUMP_VERTEXES)?;
    m.vertexes = input
        .iter()
        .map(|v| MVertex {
            position: [
                little_float(v.point[0]),
                little_float(v.point[1]),
                little_float(v.point[2]),
            ],
        })
        .collect();
    Ok(())
}

fn mod_load_edges(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DEdge> = lump_records(&m.name, data, LUMP_EDGES)?;
    let numvertexes = m.vertexes.len();
    m.edges = Vec::with_capacity(input.len());
    for (i, e) in input.iter().enumerate() {
        let v = [little_ushort(e.v[0]), little_ushort(e.v[1])];
        if v.iter().any(|&v| v as usize >= numvertexes) {
            return Err(LoadError::BadEdge { edge: i as i32 });
        }
        m.edges.push(MEdge { v });
    }
    Ok(())
}

fn mod_load_surfedges(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<i32> = lump_records(&m.name, data, LUMP_SURFEDGES)?;
    let numedges = m.edges.len() as i64;
    m.surfedges = Vec::with_capacity(input.len());
    for e in input {
        let e = little_long(e);
        if (e as i64).abs() >= numedges {
            return Err(LoadError::BadEdge { edge: e });
        }
        m.surfedges.push(e);
    }
    Ok(())
}

fn mod_load_entities(m: &mut BrushModel, data: &[u8]) {
    m.entities = c_name(data);
}

fn mod_load_textures(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    m.textures.clear();

    if data.len() >= std::mem::size_of::<DMiptexLump>() {
        let header: DMiptexLump = bytemuck::pod_read_unaligned(&data[..4]);
        let nummiptex = little_long(header.nummiptex).max(0) as usize;
        let offsets_end = 4 + nummiptex * 4;
        if offsets_end > data.len() {
            return Err(LoadError::FunnyLumpSize { name: m.name.clone(), lump: LUMP_TEXTURES });
        }

        for i in 0..nummiptex {
            let ofs: i32 = bytemuck::pod_read_unaligned(&data[4 + i * 4..8 + i * 4]);
            let ofs = little_long(ofs);
            if ofs == -1 {
                m.textures.push(notexture());
                continue;
            }
            let end = usize::try_from(ofs)
                .ok()
                .and_then(|ofs| ofs.checked_add(std::mem::size_of::<MipTex>()))
                .filter(|&end| end <= data.len());
            let Some(end) = end else {
                return Err(LoadError::FunnyLumpSize { name: m.name.clone(), lump: LUMP_TEXTURES });
            };
            let ofs = ofs as usize;
            let mt: MipTex = bytemuck::pod_read_unaligned(&data[ofs..end]);
            let name = c_name(&mt.name);
            let width = u32::from_le(mt.width);
            let height = u32::from_le(mt.height);
            if (width & 15) != 0 || (height & 15) != 0 {
                return Err(LoadError::BadTextureSize { name });
            }
            m.textures.push(Texture {
                name,
                width,
                height,
                ..Default::default()
            });
        }
    }

    mod_sequence_animations(&mut m.textures)?;
    log::debug!("{}: {} textures", m.name, m.textures.len());
    Ok(())
}

/// Checkerboard stand-in for textures missing from the level.
fn notexture() -> Texture {
    Texture {
        name: "notexture".to_string(),
        width: 16,
        height: 16,
        ..Default::default()
    }
}

fn anim_frame_slot(name: &str) -> Result<(bool, usize), LoadError> {
    let c = name.as_bytes().get(1).copied().unwrap_or(0).to_ascii_uppercase();
    match c {
        b'0'..=b'9' => Ok((false, (c - b'0') as usize)),
        b'A'..=b'J' => Ok((true, (c - b'A') as usize)),
        _ => Err(LoadError::BadAnimatingTexture { name: name.to_string() }),
    }
}

/// Link `+0name`..`+9name` frames into a cycle, with `+aname`..`+jname`
/// as the alternate cycle.
pub fn mod_sequence_animations(textures: &mut [Texture]) -> Result<(), LoadError> {
    for i in 0..textures.len() {
        if !textures[i].name.starts_with('+') || textures[i].anim_next.is_some() {
            continue; // not animated, or already sequenced
        }

        let mut anims: [Option<usize>; 10] = [None; 10];
        let mut altanims: [Option<usize>; 10] = [None; 10];
        let mut max = 0;
        let mut altmax = 0;

        let base = textures[i].name.get(2..).unwrap_or("").to_string();
        for j in i..textures.len() {
            let tx2 = &textures[j];
            if !tx2.name.starts_with('+') || tx2.name.get(2..) != Some(base.as_str()) {
                continue;
            }
            let (alt, num) = anim_frame_slot(&tx2.name)?;
            if alt {
                altanims[num] = Some(j);
                altmax = altmax.max(num + 1);
            } else {
                anims[num] = Some(j);
                max = max.max(num + 1);
            }
        }

        link_anim_cycle(textures, &anims[..max], altanims[0], &base)?;
        link_anim_cycle(textures, &altanims[..altmax], anims[0], &base)?;
    }
    Ok(())
}

fn link_anim_cycle(
    textures: &mut [Texture],
    frames: &[Option<usize>],
    alternate: Option<usize>,
    base: &str,
) -> Result<(), LoadError> {
    let count = frames.len() as i32;
    for (j, frame) in frames.iter().enumerate() {
        let tx = frame.ok_or_else(|| LoadError::MissingAnimFrame {
            frame: j,
            name: base.to_string(),
        })?;
        let next = frames[(j + 1) % frames.len()];
        let t = &mut textures[tx];
        t.anim_total = count * ANIM_CYCLE;
        t.anim_min = j as i32 * ANIM_CYCLE;
        t.anim_max = (j as i32 + 1) * ANIM_CYCLE;
        t.anim_next = next;
        t.alternate_anims = alternate;
    }
    Ok(())
}

/// Light data is always stored as RGB. Quake maps take colored data
/// from a `.lit` sidecar when one is supplied, otherwise the monochrome
/// lump is expanded into all three channels.
fn mod_load_lighting(m: &mut BrushModel, data: &[u8], lit: Option<&[u8]>) {
    m.lightdata = None;

    if m.bspversion == HL_BSPVERSION {
        if !data.is_empty() {
            m.lightdata = Some(data.to_vec());
        }
        return;
    }

    if let Some(lit) = lit {
        if lit.len() >= LIT_HEADER_SIZE && lit[..4] == LIT_IDENT {
            let version = little_long(bytemuck::pod_read_unaligned(&lit[4..8]));
            if version == LIT_VERSION {
                log::debug!("{}: colored lighting loaded", m.name);
                m.lightdata = Some(lit[LIT_HEADER_SIZE..].to_vec());
                return;
            }
            log::warn!("Unknown .lit file version ({})", version);
        } else {
            log::warn!("Corrupt .lit file (old version?), ignoring");
        }
    }

    if data.is_empty() {
        return;
    }
    m.lightdata = Some(data.iter().flat_map(|&d| [d, d, d]).collect());
}

fn mod_load_planes(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DPlane> = lump_records(&m.name, data, LUMP_PLANES)?;
    m.planes = input
        .iter()
        .map(|p| {
            let normal = [
                little_float(p.normal[0]),
                little_float(p.normal[1]),
                little_float(p.normal[2]),
            ];
            let mut out = CPlane::new(normal, little_float(p.dist));
            // trust the compiler's type, it was snapped with more care
            let plane_type = little_long(p.plane_type);
            if (0..=PLANE_ANYZ as i32).contains(&plane_type) {
                out.plane_type = plane_type as u8;
            }
            out
        })
        .collect();
    Ok(())
}

fn mod_load_texinfo(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<TexInfo> = lump_records(&m.name, data, LUMP_TEXINFO)?;
    let mut missing: Option<usize> = None;
    let no_textures = m.textures.is_empty();
    m.texinfo = Vec::with_capacity(input.len());

    for (i, tin) in input.iter().enumerate() {
        let mut out = MTexInfo::default();
        for j in 0..2 {
            for k in 0..4 {
                out.vecs[j][k] = little_float(tin.vecs[j][k]);
            }
        }
        let len1 = (out.vecs[0][0].powi(2) + out.vecs[0][1].powi(2) + out.vecs[0][2].powi(2)).sqrt();
        let len2 = (out.vecs[1][0].powi(2) + out.vecs[1][1].powi(2) + out.vecs[1][2].powi(2)).sqrt();
        let len = (len1 + len2) / 2.0;
        out.mipadjust = if len < 0.32 {
            4.0
        } else if len < 0.49 {
            3.0
        } else if len < 0.99 {
            2.0
        } else {
            1.0
        };

        let miptex = little_long(tin.miptex);
        out.flags = little_long(tin.flags);

        out.texture = if no_textures {
            // no textures lump at all
            out.flags = 0;
            *missing.get_or_insert_with(|| {
                m.textures.push(notexture());
                m.textures.len() - 1
            })
        } else if miptex < 0 || miptex as usize >= m.textures.len() {
            return Err(LoadError::BadTexinfo { texinfo: i, miptex });
        } else {
            if m.textures[miptex as usize].name == "notexture" {
                log::warn!("{}: texinfo {} has no texture", m.name, i);
                out.flags = 0;
            }
            miptex as usize
        };
        m.texinfo.push(out);
    }
    Ok(())
}

/// Fills in `texturemins` and `extents` from the surface's projected edge loop.
pub fn calc_surface_extents(m: &BrushModel, s: &mut MSurface, surfnum: usize) -> Result<(), LoadError> {
    let mut mins = [999999.0f32; 2];
    let mut maxs = [-99999.0f32; 2];
    let tex = &m.texinfo[s.texinfo];

    for i in 0..s.numedges {
        let v = m.surface_vertex(s, i);
        for j in 0..2 {
            let val = tex.project(j, v);
            if val < mins[j] {
                mins[j] = val;
            }
            if val > maxs[j] {
                maxs[j] = val;
            }
        }
    }

    for i in 0..2 {
        let bmins = (mins[i] / 16.0).floor() as i32;
        let bmaxs = (maxs[i] / 16.0).ceil() as i32;

        s.texturemins[i] = bmins * 16;
        s.extents[i] = (bmaxs - bmins) * 16;
        if tex.flags & TEX_SPECIAL == 0 && s.extents[i] > 512 {
            return Err(LoadError::BadExtents { surface: surfnum, extents: s.extents });
        }
    }
    Ok(())
}

fn mod_load_faces(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DFace> = lump_records(&m.name, data, LUMP_FACES)?;
    let mut surfaces = Vec::with_capacity(input.len());

    for (surfnum, fin) in input.iter().enumerate() {
        let mut out = MSurface::default();
        let firstedge = little_long(fin.firstedge);
        let numedges = little_short(fin.numedges);
        if firstedge < 0 || numedges < 0 || (firstedge as usize + numedges as usize) > m.surfedges.len() {
            return Err(LoadError::BadEdge { edge: firstedge });
        }
        out.firstedge = firstedge as usize;
        out.numedges = numedges as usize;

        let planenum = little_short(fin.planenum) as i32;
        if planenum < 0 || planenum as usize >= m.planes.len() {
            return Err(LoadError::BadPlane { what: "face", index: surfnum, plane: planenum });
        }
        out.plane = planenum as usize;
        if little_short(fin.side) != 0 {
            out.flags |= SurfaceFlags::PLANEBACK;
        }

        let texinfo = little_short(fin.texinfo);
        if texinfo < 0 || texinfo as usize >= m.texinfo.len() {
            return Err(LoadError::BadTexinfo { texinfo: surfnum, miptex: texinfo as i32 });
        }
        out.texinfo = texinfo as usize;

        calc_surface_extents(m, &mut out, surfnum)?;

        // lighting info
        out.styles = fin.styles;
        let lightofs = little_long(fin.lightofs);
        let bad_lightofs = move || LoadError::BadLightofs { surface: surfnum, lightofs };
        out.samples = match lightofs {
            -1 => None,
            ofs if ofs < 0 => return Err(bad_lightofs()),
            ofs if m.bspversion == HL_BSPVERSION => Some(ofs as usize),
            ofs => Some((ofs as usize).checked_mul(3).ok_or_else(bad_lightofs)?),
        };

        let tex = &m.textures[m.texinfo[out.texinfo].texture];
        let tex_name = &tex.name;
        if tex.is_sky() {
            out.flags |= SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTILED;
        } else if tex_name.starts_with('*') || (m.bspversion == HL_BSPVERSION && tex_name.starts_with('!')) {
            out.flags |= SurfaceFlags::DRAWTURB | SurfaceFlags::DRAWTILED;
            out.extents = [16384, 16384];
            out.texturemins = [-8192, -8192];
        }

        if let (Some(ofs), false) = (out.samples, out.flags.contains(SurfaceFlags::DRAWTILED)) {
            let (smax, tmax) = out.lightmap_size();
            let needed = ofs.checked_add(smax * tmax * 3 * out.active_styles().count());
            let available = m.lightdata.as_ref().map_or(0, Vec::len);
            if m.lightdata.is_some() && needed.map_or(true, |n| n > available) {
                return Err(bad_lightofs());
            }
        }

        surfaces.push(out);
    }

    m.surfaces = surfaces;
    Ok(())
}

fn mod_load_marksurfaces(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<u16> = lump_records(&m.name, data, LUMP_MARKSURFACES)?;
    m.marksurfaces = Vec::with_capacity(input.len());
    for (i, j) in input.iter().enumerate() {
        let j = little_ushort(*j) as usize;
        if j >= m.surfaces.len() {
            return Err(LoadError::BadSurface { what: "marksurface", index: i });
        }
        m.marksurfaces.push(j);
    }
    Ok(())
}

fn mod_load_visibility(m: &mut BrushModel, data: &[u8]) {
    m.visdata = data.to_vec();
}

fn short_bounds(mins: &[i16; 3], maxs: &[i16; 3]) -> (Vec3, Vec3) {
    let mut out_mins = [0.0; 3];
    let mut out_maxs = [0.0; 3];
    for j in 0..3 {
        out_mins[j] = little_short(mins[j]) as f32;
        out_maxs[j] = little_short(maxs[j]) as f32;
    }
    (out_mins, out_maxs)
}

fn mod_load_leafs(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DLeaf> = lump_records(&m.name, data, LUMP_LEAFS)?;
    m.leafs = Vec::with_capacity(input.len());

    for (i, lin) in input.iter().enumerate() {
        let (mins, maxs) = short_bounds(&lin.mins, &lin.maxs);
        let firstmarksurface = little_ushort(lin.firstmarksurface) as usize;
        let nummarksurfaces = little_ushort(lin.nummarksurfaces) as usize;
        if firstmarksurface + nummarksurfaces > m.marksurfaces.len() {
            return Err(LoadError::BadSurface { what: "leaf", index: i });
        }

        let visofs = little_long(lin.visofs);
        let compressed_vis = if visofs < 0 || visofs as usize >= m.visdata.len() {
            None
        } else {
            Some(visofs as usize)
        };

        let leaf = MLeaf {
            contents: little_long(lin.contents),
            visframe: 0,
            mins,
            maxs,
            parent: None,
            compressed_vis,
            efrags: Vec::new(),
            firstmarksurface,
            nummarksurfaces,
            ambient_sound_level: lin.ambient_level,
        };

        // gl underwater warp
        if leaf.contents != CONTENTS_EMPTY {
            for &s in &m.marksurfaces[firstmarksurface..firstmarksurface + nummarksurfaces] {
                m.surfaces[s].flags |= SurfaceFlags::UNDERWATER;
            }
        }
        m.leafs.push(leaf);
    }
    Ok(())
}

fn mod_load_nodes(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DNode> = lump_records(&m.name, data, LUMP_NODES)?;
    let numnodes = input.len();
    m.nodes = Vec::with_capacity(numnodes);

    for (i, nin) in input.iter().enumerate() {
        let (mins, maxs) = short_bounds(&nin.mins, &nin.maxs);

        let p = little_long(nin.planenum);
        if p < 0 || p as usize >= m.planes.len() {
            return Err(LoadError::BadPlane { what: "node", index: i, plane: p });
        }

        let firstsurface = little_ushort(nin.firstface) as usize;
        let numsurfaces = little_ushort(nin.numfaces) as usize;
        if firstsurface + numsurfaces > m.surfaces.len() {
            return Err(LoadError::BadSurface { what: "node", index: i });
        }

        let mut children = [NodeRef::Leaf(0); 2];
        for j in 0..2 {
            let c = little_short(nin.children[j]) as i32;
            children[j] = match NodeRef::from_child(c) {
                NodeRef::Node(n) if n < numnodes => NodeRef::Node(n),
                NodeRef::Leaf(l) if l < m.leafs.len() => NodeRef::Leaf(l),
                _ => return Err(LoadError::BadChild { node: i, child: c }),
            };
        }

        m.nodes.push(MNode {
            visframe: 0,
            mins,
            maxs,
            parent: None,
            plane: p as usize,
            children,
            firstsurface,
            numsurfaces,
        });
    }

    if !m.nodes.is_empty() {
        mod_set_parent(m)?;
    }
    Ok(())
}

/// Give every node and leaf under the root its parent. A child reached
/// twice means the tree has a cycle or shared subtree.
fn mod_set_parent(m: &mut BrushModel) -> Result<(), LoadError> {
    let mut seen_node = vec![false; m.nodes.len()];
    let mut seen_leaf = vec![false; m.leafs.len()];
    let mut stack = vec![0usize];
    seen_node[0] = true;

    while let Some(n) = stack.pop() {
        for child in m.nodes[n].children {
            match child {
                NodeRef::Node(c) => {
                    if seen_node[c] {
                        return Err(LoadError::BadChild { node: n, child: c as i32 });
                    }
                    seen_node[c] = true;
                    m.nodes[c].parent = Some(n);
                    stack.push(c);
                }
                NodeRef::Leaf(l) => {
                    // the solid leaf 0 is shared by every solid region
                    if l != 0 && seen_leaf[l] {
                        return Err(LoadError::BadChild { node: n, child: -1 - l as i32 });
                    }
                    seen_leaf[l] = true;
                    m.leafs[l].parent = Some(n);
                }
            }
        }
    }
    Ok(())
}

fn mod_load_submodels(m: &mut BrushModel, data: &[u8]) -> Result<(), LoadError> {
    let input: Vec<DModel> = lump_records(&m.name, data, LUMP_MODELS)?;
    m.submodels = input
        .iter()
        .map(|b| {
            let mut out = MModel::default();
            for j in 0..3 {
                // spread the mins / maxs by a pixel
                out.mins[j] = little_float(b.mins[j]) - 1.0;
                out.maxs[j] = little_float(b.maxs[j]) + 1.0;
                out.origin[j] = little_float(b.origin[j]);
            }
            out.radius = radius_from_bounds(&out.mins, &out.maxs);
            out.headnode = little_long(b.headnode[0]);
            out.visleafs = little_long(b.visleafs).max(0) as usize;
            out.firstface = little_long(b.firstface).max(0) as usize;
            out.numfaces = little_long(b.numfaces).max(0) as usize;
            out
        })
        .collect();
    Ok(())
}

/// Parse a complete level. `lit` is the optional colored lighting sidecar.
pub fn mod_load_brush_model(name: &str, buffer: &[u8], lit: Option<&[u8]>) -> Result<BrushModel, LoadError> {
    let header_size = std::mem::size_of::<DHeader>();
    if buffer.len() < header_size {
        return Err(LoadError::ShortFile { name: name.to_string() });
    }
    let header: DHeader = bytemuck::pod_read_unaligned(&buffer[..header_size]);

    let mut m = BrushModel {
        name: name.to_string(),
        bspversion: little_long(header.version),
        ..Default::default()
    };
    if m.bspversion != BSPVERSION && m.bspversion != HL_BSPVERSION {
        return Err(LoadError::BadVersion { name: m.name, version: m.bspversion });
    }

    let lump = |i: usize| lump_bytes(name, buffer, &header.lumps[i]);

    mod_load_vertexes(&mut m, lump(LUMP_VERTEXES)?)?;
    mod_load_edges(&mut m, lump(LUMP_EDGES)?)?;
    mod_load_surfedges(&mut m, lump(LUMP_SURFEDGES)?)?;
    mod_load_entities(&mut m, lump(LUMP_ENTITIES)?);
    mod_load_textures(&mut m, lump(LUMP_TEXTURES)?)?;
    mod_load_lighting(&mut m, lump(LUMP_LIGHTING)?, lit);
    mod_load_planes(&mut m, lump(LUMP_PLANES)?)?;
    mod_load_texinfo(&mut m, lump(LUMP_TEXINFO)?)?;
    mod_load_faces(&mut m, lump(LUMP_FACES)?)?;
    mod_load_marksurfaces(&mut m, lump(LUMP_MARKSURFACES)?)?;
    mod_load_visibility(&mut m, lump(LUMP_VISIBILITY)?);
    mod_load_leafs(&mut m, lump(LUMP_LEAFS)?)?;
    mod_load_nodes(&mut m, lump(LUMP_NODES)?)?;
    mod_load_submodels(&mut m, lump(LUMP_MODELS)?)?;

    let world = *m
        .submodels
        .first()
        .ok_or_else(|| LoadError::NoSubmodels { name: name.to_string() })?;
    if world.firstface + world.numfaces > m.surfaces.len() {
        return Err(LoadError::BadSurface { what: "submodel", index: 0 });
    }

    m.firstmodelsurface = world.firstface;
    m.nummodelsurfaces = world.numfaces;
    m.numleafs = world.visleafs.min(m.leafs.len().saturating_sub(1));
    m.mins = world.mins;
    m.maxs = world.maxs;
    m.radius = world.radius;

    if m.mins == m.maxs {
        clear_bounds(&mut m.mins, &mut m.maxs);
        for v in &m.vertexes {
            add_point_to_bounds(&v.position, &mut m.mins, &mut m.maxs);
        }
    }

    log::info!(
        "{}: {} nodes, {} leafs ({} visible), {} surfaces, {} submodels",
        m.name,
        m.nodes.len(),
        m.leafs.len(),
        m.numleafs,
        m.surfaces.len(),
        m.submodels.len()
    );
    Ok(m)
}
