//! Lightmap atlases
//!
//! Surface lightmaps are packed into fixed-size RGBA pages with a skyline
//! allocator. Each page keeps a CPU copy of its pixels plus the bounding
//! rectangle of texels changed since the last upload, so one deferred
//! upload per page covers every surface rebuilt in a frame.

use crate::r_local::LightmapUploader;
use crate::r_model::LoadError;

/// Maximum number of lightmap pages.
pub const MAX_LIGHTMAPS: usize = 128;

/// Lightmap page dimensions.
pub const BLOCK_WIDTH: usize = 128;
pub const BLOCK_HEIGHT: usize = 128;

/// Lightmap format (RGBA = 4 bytes per texel).
pub const LIGHTMAP_BYTES: usize = 4;

/// Bytes between rows of a page.
pub const PAGE_STRIDE: usize = BLOCK_WIDTH * LIGHTMAP_BYTES;

/// Region of a page, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightmapRect {
    pub l: i32,
    pub t: i32,
    pub w: i32,
    pub h: i32,
}

impl LightmapRect {
    /// Nothing changed; the first `add` replaces it.
    pub const EMPTY: Self = Self {
        l: BLOCK_WIDTH as i32,
        t: BLOCK_HEIGHT as i32,
        w: 0,
        h: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Grow to cover the `smax` x `tmax` block at (`s`, `t`).
    pub fn add(&mut self, s: i32, t: i32, smax: i32, tmax: i32) {
        if t < self.t {
            if self.h != 0 {
                self.h += self.t - t;
            }
            self.t = t;
        }
        if s < self.l {
            if self.w != 0 {
                self.w += self.l - s;
            }
            self.l = s;
        }
        if self.w + self.l < s + smax {
            self.w = (s - self.l) + smax;
        }
        if self.h + self.t < t + tmax {
            self.h = (t - self.t) + tmax;
        }
    }
}

/// One lightmap page.
#[derive(Debug, Clone)]
pub struct LightmapAtlas {
    /// Skyline: first free row in each column.
    pub allocated: [i32; BLOCK_WIDTH],
    pub pixels: Vec<u8>,
    pub modified: bool,
    pub rect: LightmapRect,
}

impl LightmapAtlas {
    fn new() -> Self {
        Self {
            allocated: [0; BLOCK_WIDTH],
            pixels: vec![0; BLOCK_WIDTH * BLOCK_HEIGHT * LIGHTMAP_BYTES],
            modified: false,
            rect: LightmapRect::EMPTY,
        }
    }

    /// Lowest placement for a `w` x `h` block, or None if it does not fit.
    fn find_spot(&self, w: usize, h: usize) -> Option<(usize, i32)> {
        let mut best = BLOCK_HEIGHT as i32;
        let mut x = 0;

        for i in 0..=(BLOCK_WIDTH - w) {
            let mut best2 = 0;
            let mut j = 0;
            while j < w {
                if self.allocated[i + j] >= best {
                    break;
                }
                best2 = best2.max(self.allocated[i + j]);
                j += 1;
            }
            if j == w {
                // this is a valid spot
                x = i;
                best = best2;
            }
        }

        if best as usize + h > BLOCK_HEIGHT {
            return None;
        }
        Some((x, best))
    }
}

/// All lightmap pages of a level. Pages are created on first use.
#[derive(Debug, Clone, Default)]
pub struct LightmapAtlasSet {
    pages: Vec<LightmapAtlas>,
    /// search starts here; earlier pages are rarely worth revisiting
    last_lightmap_allocated: usize,
}

impl LightmapAtlasSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.pages.clear();
        self.last_lightmap_allocated = 0;
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, texnum: usize) -> &LightmapAtlas {
        &self.pages[texnum]
    }

    /// Reserve a `w` x `h` block, returning (page, s, t).
    pub fn alloc_block(&mut self, w: i32, h: i32) -> Result<(usize, i32, i32), LoadError> {
        let full = LoadError::LightmapsFull { width: w, height: h };
        if w <= 0 || h <= 0 || w as usize > BLOCK_WIDTH || h as usize > BLOCK_HEIGHT {
            return Err(full);
        }
        let (w, h) = (w as usize, h as usize);

        while self.last_lightmap_allocated < MAX_LIGHTMAPS {
            let texnum = self.last_lightmap_allocated;
            if texnum == self.pages.len() {
                self.pages.push(LightmapAtlas::new());
                log::debug!("lightmap page {} opened", texnum);
            }

            let page = &mut self.pages[texnum];
            if let Some((x, y)) = page.find_spot(w, h) {
                for col in &mut page.allocated[x..x + w] {
                    *col = y + h as i32;
                }
                return Ok((texnum, x as i32, y));
            }
            self.last_lightmap_allocated += 1;
        }

        Err(full)
    }

    /// Destination for a block at (`s`, `t`): the page bytes from that
    /// texel onward, with rows `PAGE_STRIDE` apart.
    pub fn block_mut(&mut self, texnum: usize, s: i32, t: i32) -> &mut [u8] {
        let ofs = (t as usize * BLOCK_WIDTH + s as usize) * LIGHTMAP_BYTES;
        &mut self.pages[texnum].pixels[ofs..]
    }

    /// Copy a packed `smax` x `tmax` block into a page.
    pub fn blit(&mut self, texnum: usize, s: i32, t: i32, smax: usize, block: &[u8]) {
        let row = smax * LIGHTMAP_BYTES;
        let dest = self.block_mut(texnum, s, t);
        for (r, src) in block.chunks_exact(row).enumerate() {
            dest[r * PAGE_STRIDE..r * PAGE_STRIDE + row].copy_from_slice(src);
        }
    }

    pub fn mark_dirty(&mut self, texnum: usize, s: i32, t: i32, smax: i32, tmax: i32) {
        let page = &mut self.pages[texnum];
        page.modified = true;
        page.rect.add(s, t, smax, tmax);
    }

    /// Hand every modified region to the uploader and reset it.
    /// Returns the number of pages uploaded.
    pub fn upload_dirty(&mut self, uploader: &mut dyn LightmapUploader) -> usize {
        let mut uploaded = 0;
        for (texnum, page) in self.pages.iter_mut().enumerate() {
            if !page.modified {
                continue;
            }
            page.modified = false;
            let rect = std::mem::replace(&mut page.rect, LightmapRect::EMPTY);
            if rect.is_empty() {
                continue;
            }
            let ofs = (rect.t as usize * BLOCK_WIDTH + rect.l as usize) * LIGHTMAP_BYTES;
            uploader.upload_lightmap(texnum, rect, &page.pixels[ofs..], PAGE_STRIDE);
            uploaded += 1;
        }
        uploaded
    }
}
