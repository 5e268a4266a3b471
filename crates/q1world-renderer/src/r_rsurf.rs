// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_rsurf.rs
// Surface-related refresh code: leaf marking, world traversal, texture
// chains and lightmap maintenance.

use crate::r_light::{r_build_light_map, r_set_cache_state, LightFrame};
use crate::r_lightmap::{LightmapAtlasSet, BLOCK_HEIGHT, BLOCK_WIDTH, PAGE_STRIDE};
use crate::r_local::*;
use crate::r_model::LoadError;
use crate::r_model_types::*;
use q1world_common::q_shared::{vector_normalize, vector_subtract, Vec3};

use rayon::prelude::*;

const COLINEAR_EPSILON: f32 = 0.001;

// ============================================================
// Texture animation
// ============================================================

/// Frame of an animated texture at `time`. Brush entities on a nonzero
/// `frame` use the alternate sequence when there is one.
pub fn r_texture_animation(textures: &[Texture], base: usize, frame: i32, time: f32) -> Result<usize, FrameError> {
    let mut base = base;
    if frame != 0 {
        if let Some(alternate) = textures[base].alternate_anims {
            base = alternate;
        }
    }

    if textures[base].anim_total == 0 {
        return Ok(base);
    }

    let relative = ((time * 10.0) as i32).rem_euclid(textures[base].anim_total);

    let mut count = 0;
    while textures[base].anim_min > relative || textures[base].anim_max <= relative {
        base = match textures[base].anim_next {
            Some(next) => next,
            None => {
                return Err(FrameError::BrokenAnimationCycle {
                    name: textures[base].name.clone(),
                })
            }
        };
        count += 1;
        if count > MAX_ANIM_CYCLE_STEPS {
            return Err(FrameError::InfiniteAnimationCycle {
                name: textures[base].name.clone(),
            });
        }
    }

    Ok(base)
}

// ============================================================
// Polygon building
// ============================================================

#[inline]
fn xyz(v: &[f32; VERTEXSIZE]) -> Vec3 {
    [v[0], v[1], v[2]]
}

/// Polygon for a surface with texture and lightmap coordinates. Colinear
/// vertices are dropped unless `keep_tjunctions` is set.
pub fn build_surface_display_list(world: &BrushModel, surfnum: usize, keep_tjunctions: bool) -> GlPoly {
    let fa = &world.surfaces[surfnum];
    let texinfo = &world.texinfo[fa.texinfo];
    let texture = &world.textures[texinfo.texture];
    let width = texture.width.max(1) as f32;
    let height = texture.height.max(1) as f32;

    let mut verts = Vec::with_capacity(fa.numedges);
    for i in 0..fa.numedges {
        let vec = world.surface_vertex(fa, i);
        let s = texinfo.project(0, vec);
        let t = texinfo.project(1, vec);

        // lightmap texture coordinates
        let ls = (s - fa.texturemins[0] as f32 + (fa.light_s * 16) as f32 + 8.0) / (BLOCK_WIDTH * 16) as f32;
        let lt = (t - fa.texturemins[1] as f32 + (fa.light_t * 16) as f32 + 8.0) / (BLOCK_HEIGHT * 16) as f32;

        verts.push([vec[0], vec[1], vec[2], s / width, t / height, ls, lt]);
    }

    if !keep_tjunctions && !fa.flags.contains(SurfaceFlags::UNDERWATER) {
        let mut i = 0;
        while i < verts.len() && verts.len() > 3 {
            let n = verts.len();
            let prev = xyz(&verts[(i + n - 1) % n]);
            let this = xyz(&verts[i]);
            let next = xyz(&verts[(i + 1) % n]);

            let mut v1 = vector_subtract(&this, &prev);
            vector_normalize(&mut v1);
            let mut v2 = vector_subtract(&next, &prev);
            vector_normalize(&mut v2);

            // skip co-linear points
            if (0..3).all(|k| (v1[k] - v2[k]).abs() <= COLINEAR_EPSILON) {
                verts.remove(i);
            } else {
                i += 1;
            }
        }
    }

    GlPoly { flags: fa.flags, verts }
}

// ============================================================
// Lightmap placement and level build
// ============================================================

/// Reserve atlas space for a lightmapped surface.
pub fn gl_create_surface_lightmap(lightmaps: &mut LightmapAtlasSet, surf: &mut MSurface) -> Result<(), LoadError> {
    if surf.flags.intersects(SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTURB) {
        return Ok(());
    }

    let (smax, tmax) = surf.lightmap_size();
    let (texnum, s, t) = lightmaps.alloc_block(smax as i32, tmax as i32)?;
    surf.lightmaptexturenum = Some(texnum);
    surf.light_s = s;
    surf.light_t = t;
    Ok(())
}

/// Place and build every surface lightmap of a level and build the
/// surface polygons. Every used page is left dirty for its first upload.
pub fn gl_build_lightmaps(
    world: &mut BrushModel,
    lightmaps: &mut LightmapAtlasSet,
    frame: &LightFrame,
    keep_tjunctions: bool,
) -> Result<(), LoadError> {
    lightmaps.reset();

    for surf in world.surfaces.iter_mut() {
        gl_create_surface_lightmap(lightmaps, surf)?;
    }

    // Phase 1 (parallel): build each static block on its own
    let model: &BrushModel = world;
    let blocks: Vec<_> = model
        .surfaces
        .par_iter()
        .map(|surf| {
            surf.lightmaptexturenum?;
            let (smax, tmax) = surf.lightmap_size();
            let mut block = vec![0u8; smax * tmax * 4];
            let cache = r_build_light_map(model, surf, frame, &mut block, smax * 4);
            Some((block, cache))
        })
        .collect();

    // Phase 2 (sequential): copy into the atlases
    for (surf, built) in world.surfaces.iter_mut().zip(blocks) {
        let (Some((block, cache)), Some(texnum)) = (built, surf.lightmaptexturenum) else {
            continue;
        };
        let (smax, _) = surf.lightmap_size();
        lightmaps.blit(texnum, surf.light_s, surf.light_t, smax, &block);
        r_set_cache_state(surf, cache);
    }

    for i in 0..world.surfaces.len() {
        let poly = build_surface_display_list(world, i, keep_tjunctions);
        world.surfaces[i].polys = Some(poly);
    }

    for texnum in 0..lightmaps.num_pages() {
        lightmaps.mark_dirty(texnum, 0, 0, BLOCK_WIDTH as i32, BLOCK_HEIGHT as i32);
    }

    log::info!("{}: {} lightmap pages", world.name, lightmaps.num_pages());
    Ok(())
}

// ============================================================
// World traversal
// ============================================================

impl WorldRenderState {
    /// Stamp the leaves potentially visible from the view leaf, and every
    /// node above them, with a fresh `visframecount`.
    pub fn r_mark_leaves(&mut self) {
        if self.oldviewleaf == self.viewleaf && !self.settings.novis {
            return;
        }

        self.visframecount += 1;
        self.oldviewleaf = self.viewleaf;

        let vis = if self.settings.novis {
            vec![0xff; self.world.vis_row()]
        } else {
            self.world.leaf_pvs(self.viewleaf.unwrap_or(0))
        };

        let visframecount = self.visframecount;
        for i in 0..self.world.numleafs {
            if vis[i >> 3] & (1 << (i & 7)) == 0 {
                continue;
            }

            let leaf = &mut self.world.leafs[i + 1];
            if leaf.visframe == visframecount {
                continue;
            }
            leaf.visframe = visframecount;

            let mut node = leaf.parent;
            while let Some(n) = node {
                let nd = &mut self.world.nodes[n];
                if nd.visframe == visframecount {
                    break;
                }
                nd.visframe = visframecount;
                node = nd.parent;
            }
        }
    }

    /// Walk the marked part of the tree front to back, stamping leaf
    /// surfaces and collecting the ones facing the view.
    pub fn r_recursive_world_node(
        &mut self,
        node: NodeRef,
        culler: &dyn FrustumCuller,
        sink: &mut dyn SurfaceSink,
    ) -> Result<(), FrameError> {
        let n = match node {
            NodeRef::Leaf(l) => {
                self.draw_leaf(l, culler, sink);
                return Ok(());
            }
            NodeRef::Node(n) => n,
        };

        let nd = &self.world.nodes[n];
        if nd.visframe != self.visframecount || culler.cull_box(&nd.mins, &nd.maxs) {
            return Ok(());
        }

        // find which side of the node we are on
        let dot = self.world.planes[nd.plane].distance(&self.modelorg);
        let side = (dot < 0.0) as usize;
        let children = nd.children;
        let surfaces = nd.firstsurface..nd.firstsurface + nd.numsurfaces;

        // recurse down the children, front side first
        self.r_recursive_world_node(children[side], culler, sink)?;

        for surfnum in surfaces {
            let surf = &self.world.surfaces[surfnum];
            if surf.visframe != self.framecount {
                continue;
            }

            // don't backface underwater surfaces, because they warp
            if !surf.flags.contains(SurfaceFlags::UNDERWATER) {
                let wrong_side = if surf.flags.contains(SurfaceFlags::PLANEBACK) {
                    dot > BACKFACE_EPSILON
                } else {
                    dot < -BACKFACE_EPSILON
                };
                if wrong_side {
                    continue;
                }
            }

            self.chain_surface(surfnum, sink)?;
        }

        // recurse down the back side
        self.r_recursive_world_node(children[side ^ 1], culler, sink)
    }

    fn draw_leaf(&mut self, l: usize, culler: &dyn FrustumCuller, sink: &mut dyn SurfaceSink) {
        let leaf = &self.world.leafs[l];
        if leaf.is_solid() || leaf.visframe != self.visframecount || culler.cull_box(&leaf.mins, &leaf.maxs) {
            return;
        }

        let marks = leaf.firstmarksurface..leaf.firstmarksurface + leaf.nummarksurfaces;
        for mark in marks {
            let surfnum = self.world.marksurfaces[mark];
            self.world.surfaces[surfnum].visframe = self.framecount;
        }

        // deal with model fragments in this leaf
        if !leaf.efrags.is_empty() {
            sink.store_efrags(l, &leaf.efrags);
        }
    }

    fn chain_surface(&mut self, surfnum: usize, sink: &mut dyn SurfaceSink) -> Result<(), FrameError> {
        let surf = &self.world.surfaces[surfnum];
        let flags = surf.flags;
        let base = self.world.texinfo[surf.texinfo].texture;

        if flags.contains(SurfaceFlags::DRAWTURB) && (!self.settings.texsort || self.settings.wateralpha < 1.0) {
            self.chains.water.push(surfnum);
            return Ok(());
        }

        if self.settings.texsort {
            // if sorting by texture, just store it out
            let texture = r_texture_animation(&self.world.textures, base, 0, self.time)?;
            self.chains.push(texture, surfnum);
        } else if flags.contains(SurfaceFlags::DRAWSKY) {
            self.chains.sky.push(surfnum);
        } else {
            let texture = r_texture_animation(&self.world.textures, base, 0, self.time)?;
            self.r_render_brush_poly(surfnum, texture, sink);
        }
        Ok(())
    }

    // ============================================================
    // Submission
    // ============================================================

    /// Refresh the surface's lightmap if needed, then hand it to the sink.
    pub fn r_render_brush_poly(&mut self, surfnum: usize, texture: usize, sink: &mut dyn SurfaceSink) {
        self.stats.brush_polys += 1;
        self.r_render_dynamic_lightmaps(surfnum);
        sink.submit_surface(&self.world, surfnum, texture);
    }

    /// Rebuild a lightmap in place when a style changed value or a dynamic
    /// light touches it now or did last time, and grow its page's dirty
    /// rectangle.
    pub fn r_render_dynamic_lightmaps(&mut self, surfnum: usize) {
        let fa = &self.world.surfaces[surfnum];
        if fa.flags.intersects(SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTURB) {
            return;
        }
        let Some(texnum) = fa.lightmaptexturenum else {
            return;
        };

        // check for lightmap modification
        let styles_changed = fa
            .active_styles()
            .any(|(map, style)| self.lightstyles.value(style) != fa.cached_light[map]);
        let dynamic = fa.dlightframe == self.framecount // dynamic this frame
            || fa.cached_dlight; // dynamic previously
        if !(styles_changed || dynamic) || !self.settings.dynamic {
            return;
        }

        let (smax, tmax) = fa.lightmap_size();
        let (light_s, light_t) = (fa.light_s, fa.light_t);
        self.lightmaps.mark_dirty(texnum, light_s, light_t, smax as i32, tmax as i32);

        let frame = LightFrame {
            framecount: self.framecount,
            fullbright: self.settings.fullbright,
            styles: self.lightstyles.values(),
            dlights: &self.dlights,
        };
        let dest = self.lightmaps.block_mut(texnum, light_s, light_t);
        let cache = r_build_light_map(&self.world, &self.world.surfaces[surfnum], &frame, dest, PAGE_STRIDE);
        r_set_cache_state(&mut self.world.surfaces[surfnum], cache);
        self.stats.lightmaps_rebuilt += 1;
    }

    /// Submit the per-texture chains, then the no-sort sky chain.
    pub fn draw_texture_chains(&mut self, sink: &mut dyn SurfaceSink) {
        let mut chains = std::mem::take(&mut self.chains.chains);
        for (texture, chain) in chains.iter_mut().enumerate() {
            for &surfnum in chain.iter() {
                self.r_render_brush_poly(surfnum, texture, sink);
            }
            chain.clear();
        }
        self.chains.chains = chains;

        let sky = std::mem::take(&mut self.chains.sky);
        for &surfnum in &sky {
            let texture = self.world.texinfo[self.world.surfaces[surfnum].texinfo].texture;
            self.stats.brush_polys += 1;
            sink.submit_surface(&self.world, surfnum, texture);
        }
        self.chains.sky = sky;
        self.chains.sky.clear();
    }

    /// Late pass for liquids held back from the opaque chains.
    pub fn r_draw_water_surfaces(&mut self, sink: &mut dyn SurfaceSink) -> Result<(), FrameError> {
        let water = std::mem::take(&mut self.chains.water);
        let mut result = Ok(());
        for &surfnum in &water {
            let base = self.world.texinfo[self.world.surfaces[surfnum].texinfo].texture;
            let texture = match r_texture_animation(&self.world.textures, base, 0, self.time) {
                Ok(texture) => texture,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            self.stats.brush_polys += 1;
            sink.submit_water_surface(&self.world, surfnum, texture);
        }
        self.chains.water = water;
        self.chains.water.clear();
        result
    }

    pub fn r_draw_world(&mut self, culler: &dyn FrustumCuller, sink: &mut dyn SurfaceSink) -> Result<(), FrameError> {
        if !self.settings.drawworld {
            return Ok(());
        }

        self.chains.clear();
        self.r_recursive_world_node(self.world.headnode(), culler, sink)?;
        self.draw_texture_chains(sink);
        Ok(())
    }

    /// Send every page's dirty rectangle to the uploader.
    pub fn r_upload_lightmaps(&mut self, uploader: &mut dyn LightmapUploader) {
        self.stats.lightmaps_uploaded += self.lightmaps.upload_dirty(uploader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_lightmap::LightmapRect;
    use crate::r_model::mod_load_brush_model;
    use crate::test_bsp::{self, BspBuilder};
    use q1world_common::q_shared::{CONTENTS_EMPTY, CONTENTS_SOLID};

    #[derive(Default)]
    struct Recorder {
        surfaces: Vec<(usize, usize)>,
        water: Vec<usize>,
        efrags: Vec<(usize, Vec<EfragRef>)>,
    }

    impl SurfaceSink for Recorder {
        fn submit_surface(&mut self, _world: &BrushModel, surf: usize, texture: usize) {
            self.surfaces.push((surf, texture));
        }

        fn submit_water_surface(&mut self, _world: &BrushModel, surf: usize, _texture: usize) {
            self.water.push(surf);
        }

        fn store_efrags(&mut self, leaf: usize, efrags: &[EfragRef]) {
            self.efrags.push((leaf, efrags.to_vec()));
        }
    }

    fn state_for(b: BspBuilder, settings: RenderSettings) -> WorldRenderState {
        let world = mod_load_brush_model("test.bsp", &b.build(), None).unwrap();
        WorldRenderState::new(world, settings).unwrap()
    }

    /// Mark and walk from `org` the way a frame does, without drawing chains.
    fn walk(state: &mut WorldRenderState, org: Vec3, sink: &mut Recorder) {
        state.framecount += 1;
        state.modelorg = org;
        state.viewleaf = Some(state.world.point_in_leaf(&org));
        state.r_mark_leaves();
        state.chains.clear();
        state.r_recursive_world_node(state.world.headnode(), &NoCull, sink).unwrap();
    }

    fn chained(state: &WorldRenderState) -> Vec<usize> {
        let mut v: Vec<_> = state.chains.surfaces().collect();
        v.sort();
        v
    }

    // ============================================================
    // Texture animation
    // ============================================================

    fn frame(name: &str, min: i32, max: i32, next: Option<usize>) -> Texture {
        Texture {
            name: name.to_string(),
            anim_total: 4,
            anim_min: min,
            anim_max: max,
            anim_next: next,
            ..Default::default()
        }
    }

    #[test]
    fn test_texture_animation_cycle() {
        let textures = vec![frame("+0lava", 0, 2, Some(1)), frame("+1lava", 2, 4, Some(0))];
        assert_eq!(r_texture_animation(&textures, 0, 0, 0.0).unwrap(), 0);
        assert_eq!(r_texture_animation(&textures, 0, 0, 0.25).unwrap(), 1);
        assert_eq!(r_texture_animation(&textures, 1, 0, 0.45).unwrap(), 0);
    }

    #[test]
    fn test_texture_animation_alternate() {
        let mut textures = vec![Texture::default(), Texture::default()];
        textures[0].alternate_anims = Some(1);
        assert_eq!(r_texture_animation(&textures, 0, 0, 0.0).unwrap(), 0);
        assert_eq!(r_texture_animation(&textures, 0, 1, 0.0).unwrap(), 1);
    }

    #[test]
    fn test_texture_animation_broken_cycle() {
        let textures = vec![frame("+0slime", 0, 2, None)];
        assert!(matches!(
            r_texture_animation(&textures, 0, 0, 0.3),
            Err(FrameError::BrokenAnimationCycle { .. })
        ));
    }

    #[test]
    fn test_texture_animation_infinite_cycle() {
        // neither frame ever covers tenths 2..4
        let textures = vec![frame("+0slime", 0, 1, Some(1)), frame("+1slime", 1, 2, Some(0))];
        assert!(matches!(
            r_texture_animation(&textures, 0, 0, 0.3),
            Err(FrameError::InfiniteAnimationCycle { .. })
        ));
    }

    // ============================================================
    // Leaf marking and traversal
    // ============================================================

    #[test]
    fn test_mark_leaves_follows_pvs() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);

        let vf = state.visframecount;
        assert_eq!(state.world.leafs[1].visframe, vf);
        assert_ne!(state.world.leafs[2].visframe, vf);
        assert_eq!(state.world.nodes[0].visframe, vf);
    }

    #[test]
    fn test_mark_leaves_only_on_leaf_change() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        let vf = state.visframecount;
        walk(&mut state, [20.0, 10.0, 10.0], &mut sink);
        assert_eq!(state.visframecount, vf);
        walk(&mut state, [-20.0, 10.0, 10.0], &mut sink);
        assert_eq!(state.visframecount, vf + 1);
        assert_eq!(state.world.leafs[2].visframe, vf + 1);
    }

    #[test]
    fn test_novis_marks_every_frame() {
        let settings = RenderSettings { novis: true, ..Default::default() };
        let mut state = state_for(test_bsp::two_room_level(), settings);
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        let vf = state.visframecount;
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(state.visframecount, vf + 1);
        assert_eq!(state.world.leafs[2].visframe, vf + 1);
    }

    #[test]
    fn test_walk_respects_pvs() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        let mut sink = Recorder::default();

        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(chained(&state), vec![0]);
        assert_ne!(state.world.surfaces[1].visframe, state.framecount);

        walk(&mut state, [-16.0, 24.0, 24.0], &mut sink);
        assert_eq!(chained(&state), vec![1]);
        assert_ne!(state.world.surfaces[0].visframe, state.framecount);
    }

    /// Two rooms where leaf 1 also lists the back-facing surface 1, so
    /// both are stamped before the node's surfaces are tested.
    fn shared_marks_level() -> BspBuilder {
        let mut b = test_bsp::two_room_level();
        b.marksurfaces = vec![0, 1, 1];
        b.leafs[1].nummarksurfaces = 2;
        b.leafs[2].firstmarksurface = 2;
        b
    }

    #[test]
    fn test_backface_culling() {
        let mut state = state_for(shared_marks_level(), RenderSettings::default());
        let mut sink = Recorder::default();

        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(state.world.surfaces[1].visframe, state.framecount);
        assert_eq!(chained(&state), vec![0]);

        // within the epsilon both sides are kept
        walk(&mut state, [0.005, 24.0, 24.0], &mut sink);
        assert_eq!(chained(&state), vec![0, 1]);
    }

    #[test]
    fn test_underwater_surfaces_not_backfaced() {
        let mut state = state_for(shared_marks_level(), RenderSettings::default());
        state.world.surfaces[1].flags |= SurfaceFlags::UNDERWATER;
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(chained(&state), vec![0, 1]);
    }

    #[test]
    fn test_culled_nodes_contribute_nothing() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        let mut sink = Recorder::default();
        state.framecount += 1;
        state.modelorg = [16.0, 24.0, 24.0];
        state.viewleaf = Some(1);
        state.r_mark_leaves();
        let cull_all = |_: &Vec3, _: &Vec3| true;
        state.r_recursive_world_node(state.world.headnode(), &cull_all, &mut sink).unwrap();
        assert!(chained(&state).is_empty());
        assert_ne!(state.world.surfaces[0].visframe, state.framecount);
    }

    #[test]
    fn test_efrags_handed_to_sink() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        state.world.leafs[1].efrags.push(EfragRef(42));
        state.world.leafs[2].efrags.push(EfragRef(7));
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(sink.efrags, vec![(1, vec![EfragRef(42)])]);
    }

    #[test]
    fn test_no_sort_submits_in_traversal() {
        let settings = RenderSettings { texsort: false, ..Default::default() };
        let mut state = state_for(test_bsp::two_room_level(), settings);
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert!(chained(&state).is_empty());
        assert_eq!(sink.surfaces, vec![(0, 0)]);
        assert_eq!(state.stats.brush_polys, 1);
    }

    #[test]
    fn test_draw_world_submits_chains() {
        let mut state = state_for(test_bsp::two_room_level(), RenderSettings::default());
        let mut sink = Recorder::default();
        state.framecount += 1;
        state.modelorg = [16.0, 24.0, 24.0];
        state.viewleaf = Some(1);
        state.r_mark_leaves();
        state.r_draw_world(&NoCull, &mut sink).unwrap();
        assert_eq!(sink.surfaces, vec![(0, 0)]);
        assert!(chained(&state).is_empty());
    }

    fn water_level() -> BspBuilder {
        let mut b = BspBuilder::new();
        let p = b.add_plane([1.0, 0.0, 0.0], 0.0);
        let t = b.add_texture("*water", 64, 64);
        let ti = b.add_texinfo([0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], t, 0);
        b.add_face(p, 0, ti, &test_bsp::WALL_QUAD, [0, 255, 255, 255], -1);
        b.visdata = vec![0x01];
        b.add_leaf(CONTENTS_SOLID, -1, &[]);
        b.add_leaf(CONTENTS_EMPTY, 0, &[0]);
        b.add_node(p, [-2, -1], 0, 1);
        b.add_model(1, 0, 1);
        b
    }

    #[test]
    fn test_translucent_water_deferred() {
        let settings = RenderSettings { wateralpha: 0.5, ..Default::default() };
        let mut state = state_for(water_level(), settings);
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert_eq!(state.chains.water, vec![0]);

        state.draw_texture_chains(&mut sink);
        assert!(sink.surfaces.is_empty());
        state.r_draw_water_surfaces(&mut sink).unwrap();
        assert_eq!(sink.water, vec![0]);
        assert!(state.chains.water.is_empty());
    }

    #[test]
    fn test_opaque_water_chained_by_texture() {
        let mut state = state_for(water_level(), RenderSettings::default());
        let mut sink = Recorder::default();
        walk(&mut state, [16.0, 24.0, 24.0], &mut sink);
        assert!(state.chains.water.is_empty());
        assert_eq!(state.chains.chains[0], vec![0]);
        // no lightmap to place or rebuild
        assert_eq!(state.world.surfaces[0].lightmaptexturenum, None);
    }

    // ============================================================
    // Lightmap maintenance
    // ============================================================

    struct Uploads(Vec<LightmapRect>);

    impl LightmapUploader for Uploads {
        fn upload_lightmap(&mut self, _atlas: usize, rect: LightmapRect, _pixels: &[u8], _stride: usize) {
            self.0.push(rect);
        }
    }

    #[test]
    fn test_initial_upload_covers_pages() {
        let mut state = state_for(test_bsp::wall_level(64), RenderSettings::default());
        let mut uploads = Uploads(Vec::new());
        state.r_upload_lightmaps(&mut uploads);
        assert_eq!(uploads.0, vec![LightmapRect { l: 0, t: 0, w: 128, h: 128 }]);
        assert_eq!(state.lightmaps.page(0).pixels[..4], [128, 128, 128, 255]);
    }

    #[test]
    fn test_style_change_rebuilds_lightmap() {
        let mut state = state_for(test_bsp::wall_level(64), RenderSettings::default());
        state.r_upload_lightmaps(&mut Uploads(Vec::new()));
        state.framecount += 1;

        // unchanged: nothing to do
        state.r_render_dynamic_lightmaps(0);
        assert_eq!(state.stats.lightmaps_rebuilt, 0);

        state.lightstyles.set_lightstyle(0, "a");
        state.lightstyles.r_animate_light(0.0);
        state.r_render_dynamic_lightmaps(0);
        assert_eq!(state.stats.lightmaps_rebuilt, 1);
        assert_eq!(state.world.surfaces[0].cached_light[0], 0);

        let s = &state.world.surfaces[0];
        let page = state.lightmaps.page(0);
        assert!(page.modified);
        assert_eq!(page.rect, LightmapRect { l: s.light_s, t: s.light_t, w: 4, h: 4 });
        assert_eq!(page.pixels[..4], [0, 0, 0, 255]);

        let mut uploads = Uploads(Vec::new());
        state.r_upload_lightmaps(&mut uploads);
        assert_eq!(uploads.0.len(), 1);

        // cached now
        state.r_render_dynamic_lightmaps(0);
        assert_eq!(state.stats.lightmaps_rebuilt, 1);
    }

    #[test]
    fn test_dynamic_light_rebuilds_then_clears() {
        let mut state = state_for(test_bsp::wall_level(64), RenderSettings::default());
        state.dlights = vec![DLight::new([0.0, 24.0, 24.0], 32.0, [1.0, 0.0, 0.0])];
        state.r_push_dlights();
        state.framecount += 1;
        state.r_render_dynamic_lightmaps(0);
        assert!(state.world.surfaces[0].cached_dlight);
        let texel = ((state.world.surfaces[0].light_t as usize + 1) * BLOCK_WIDTH
            + state.world.surfaces[0].light_s as usize
            + 1)
            * 4;
        assert_eq!(state.lightmaps.page(0).pixels[texel], 168);

        // light gone: one more rebuild restores the static block
        state.dlights.clear();
        state.r_push_dlights();
        state.framecount += 1;
        state.r_render_dynamic_lightmaps(0);
        assert!(!state.world.surfaces[0].cached_dlight);
        assert_eq!(state.lightmaps.page(0).pixels[texel], 128);
        assert_eq!(state.stats.lightmaps_rebuilt, 2);
    }

    #[test]
    fn test_dynamic_lightmaps_disabled() {
        let settings = RenderSettings { dynamic: false, ..Default::default() };
        let mut state = state_for(test_bsp::wall_level(64), settings);
        state.lightstyles.set_lightstyle(0, "a");
        state.lightstyles.r_animate_light(0.0);
        state.r_render_dynamic_lightmaps(0);
        assert_eq!(state.stats.lightmaps_rebuilt, 0);
    }

    // ============================================================
    // Polygons
    // ============================================================

    #[test]
    fn test_display_list_coordinates() {
        let state = state_for(test_bsp::wall_level(64), RenderSettings::default());
        let surf = &state.world.surfaces[0];
        let poly = surf.polys.as_ref().unwrap();
        assert_eq!(poly.verts.len(), 4);

        let v = poly.verts[2];
        assert_eq!(&v[..3], &[0.0, 48.0, 48.0]);
        assert_eq!(v[3], 48.0 / 64.0);
        assert_eq!(v[4], 48.0 / 64.0);
        let ls = (48.0 + (surf.light_s * 16) as f32 + 8.0) / 2048.0;
        assert_eq!(v[5], ls);
    }

    fn colinear_level() -> BspBuilder {
        let mut b = test_bsp::wall_level(64);
        // same wall with a midpoint on its bottom edge
        b.faces.clear();
        let quad = [
            [0.0, 0.0, 0.0],
            [0.0, 24.0, 0.0],
            [0.0, 48.0, 0.0],
            [0.0, 48.0, 48.0],
            [0.0, 0.0, 48.0],
        ];
        b.add_face(0, 0, 0, &quad, [0, 255, 255, 255], 0);
        b
    }

    #[test]
    fn test_display_list_drops_colinear_points() {
        let state = state_for(colinear_level(), RenderSettings::default());
        let poly = state.world.surfaces[0].polys.as_ref().unwrap();
        assert_eq!(poly.verts.len(), 4);
        assert!(poly.verts.iter().all(|v| v[1] != 24.0));

        let settings = RenderSettings { keeptjunctions: true, ..Default::default() };
        let state = state_for(colinear_level(), settings);
        assert_eq!(state.world.surfaces[0].polys.as_ref().unwrap().verts.len(), 5);
    }
}
