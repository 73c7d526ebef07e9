//! Software rendering of the scene: dirty-flag driven renderer, render pass
//! pipeline, rasterizer, post effects, image based lighting and the overlay painter.

pub mod camera;
pub mod coloring;
pub mod colormap;
pub mod dirty;
pub mod egui_overlay;
pub mod hdri;
pub mod ibl;
pub mod passes;
pub mod post;
pub mod raster;
pub mod renderer;
pub mod shading;
pub mod volume;

pub use camera::{Camera, StandardView};
pub use coloring::{ColoringRenderer, CycleType, ScalarBar};
pub use colormap::{ColorTransferFunction, OpacityFunction};
pub use dirty::{DirtyGraph, Node};
pub use egui_overlay::EguiPainter;
pub use hdri::HdriChain;
pub use raster::Layer;
pub use renderer::{AntiAliasing, GridSetup, HudState, Renderer, SurfaceOverrides};
