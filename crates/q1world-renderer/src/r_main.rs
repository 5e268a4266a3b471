// Copyright (C) 1996-1997 Id Software, Inc.
// GPL-2.0-or-later
//
// r_main.rs
// View frustum, level setup and the per-frame world pipeline.

use crate::r_light::{LightFrame, LightStyleTable};
use crate::r_lightmap::LightmapAtlasSet;
use crate::r_local::*;
use crate::r_model::LoadError;
use crate::r_model_types::BrushModel;
use crate::r_rsurf::gl_build_lightmaps;
use q1world_common::cvar::CvarContext;
use q1world_common::q_shared::{box_on_plane_side, dot_product, CPlane, Vec3};

// ============================================================
// Frustum
// ============================================================

/// The four side planes of the view volume, normals facing inward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [CPlane; 4],
}

impl Frustum {
    /// Build the side planes for a view. Field of view angles are in
    /// degrees; each plane is the forward vector turned outward by half
    /// the angle, then back by a right angle.
    pub fn from_view(origin: &Vec3, forward: &Vec3, right: &Vec3, up: &Vec3, fov_x: f32, fov_y: f32) -> Self {
        let (sx, cx) = (fov_x.to_radians() * 0.5).sin_cos();
        let (sy, cy) = (fov_y.to_radians() * 0.5).sin_cos();

        let side = |axis: &Vec3, s: f32, c: f32, sign: f32| -> CPlane {
            let normal = [
                forward[0] * s + sign * axis[0] * c,
                forward[1] * s + sign * axis[1] * c,
                forward[2] * s + sign * axis[2] * c,
            ];
            CPlane::new(normal, dot_product(origin, &normal))
        };

        Self {
            planes: [
                side(right, sx, cx, 1.0),  // left
                side(right, sx, cx, -1.0), // right
                side(up, sy, cy, -1.0),    // top
                side(up, sy, cy, 1.0),     // bottom
            ],
        }
    }

    pub fn from_refdef(refdef: &RefDef) -> Self {
        Self::from_view(
            &refdef.vieworg,
            &refdef.forward,
            &refdef.right,
            &refdef.up,
            refdef.fov_x,
            refdef.fov_y,
        )
    }

    /// Returns true if the box is completely outside the frustum.
    pub fn r_cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        self.planes.iter().any(|p| box_on_plane_side(mins, maxs, p) == 2)
    }
}

impl FrustumCuller for Frustum {
    fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        self.r_cull_box(mins, maxs)
    }
}

// ============================================================
// Level setup
// ============================================================

impl WorldRenderState {
    /// Take ownership of a loaded level and build its lightmaps.
    pub fn new(world: BrushModel, settings: RenderSettings) -> Result<Self, LoadError> {
        let numtextures = world.textures.len();
        let mut state = Self {
            world,
            settings,
            time: 0.0,
            framecount: 0,
            visframecount: 0,
            dlightframecount: 0,
            viewleaf: None,
            oldviewleaf: None,
            modelorg: [0.0; 3],
            lightstyles: LightStyleTable::new(),
            dlights: Vec::new(),
            lightmaps: LightmapAtlasSet::new(),
            chains: TextureChains::new(numtextures),
            lightspot: [0.0; 3],
            lightplane: None,
            stats: FrameStats::default(),
        };
        state.r_new_map()?;
        Ok(state)
    }

    /// Apply latched cvars, then start the level over with the current
    /// settings.
    pub fn r_new_map_with_cvars(&mut self, cvars: &mut CvarContext) -> Result<(), LoadError> {
        cvars.get_latched_vars();
        cvars.take_modified();
        self.settings = RenderSettings::from_cvars(cvars);
        self.r_new_map()
    }

    /// Reset per-level counters and caches and rebuild every lightmap
    /// from the current lightstyle values.
    pub fn r_new_map(&mut self) -> Result<(), LoadError> {
        // no dlightcache
        self.framecount = 1;
        self.visframecount = 0;
        self.dlightframecount = 0;
        self.viewleaf = None;
        self.oldviewleaf = None;
        self.dlights.clear();
        self.stats = FrameStats::default();

        for leaf in &mut self.world.leafs {
            leaf.efrags.clear();
            leaf.visframe = 0;
        }
        for node in &mut self.world.nodes {
            node.visframe = 0;
        }
        for surf in &mut self.world.surfaces {
            surf.visframe = 0;
            surf.dlightframe = 0;
            surf.dlightbits = 0;
        }
        self.chains = TextureChains::new(self.world.textures.len());

        let frame = LightFrame {
            framecount: self.framecount,
            fullbright: self.settings.fullbright,
            styles: self.lightstyles.values(),
            dlights: &[],
        };
        gl_build_lightmaps(&mut self.world, &mut self.lightmaps, &frame, self.settings.keeptjunctions)?;

        log::debug!(
            "{}: {} leafs, {} surfaces ready",
            self.world.name,
            self.world.numleafs,
            self.world.surfaces.len()
        );
        Ok(())
    }

    // ============================================================
    // Frame
    // ============================================================

    /// Advance the frame and locate the view.
    pub fn r_setup_frame(&mut self, refdef: &RefDef) {
        self.framecount += 1;
        self.lightstyles.r_animate_light(refdef.time);

        self.modelorg = refdef.vieworg;
        self.viewleaf = Some(self.world.point_in_leaf(&refdef.vieworg));
    }

    /// Render the world for one view. `dlights` are this frame's dynamic
    /// lights; index i owns bit i of the surface masks.
    pub fn r_render_view(
        &mut self,
        refdef: &RefDef,
        dlights: &[DLight],
        culler: &dyn FrustumCuller,
        sink: &mut dyn SurfaceSink,
        uploader: &mut dyn LightmapUploader,
    ) -> Result<(), FrameError> {
        self.time = refdef.time;
        self.dlights.clear();
        self.dlights.extend_from_slice(dlights);
        self.stats = FrameStats::default();

        self.r_push_dlights();
        self.r_setup_frame(refdef);
        self.r_mark_leaves();
        self.r_draw_world(culler, sink)?;
        self.r_draw_water_surfaces(sink)?;
        self.r_upload_lightmaps(uploader);

        log::trace!(
            "frame {}: {} polys, {} lightmaps rebuilt, {} uploaded",
            self.framecount,
            self.stats.brush_polys,
            self.stats.lightmaps_rebuilt,
            self.stats.lightmaps_uploaded
        );
        Ok(())
    }
}
