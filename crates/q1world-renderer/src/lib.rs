#![allow(clippy::too_many_arguments, clippy::manual_range_contains, clippy::needless_range_loop,
         clippy::identity_op, clippy::float_cmp, clippy::comparison_chain)]
// World visibility and lighting for BSP levels

// Level data
pub mod r_model_types;
pub mod r_model;

// Refresh
pub mod r_local;
pub mod r_lightmap;
pub mod r_light;
pub mod r_rsurf;
pub mod r_main;

#[cfg(test)]
mod test_bsp;
