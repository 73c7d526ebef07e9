//! lumaview: a viewer for meshes, point clouds, volumes and glTF scenes.
//!
//! Files are read by [`readers`] into [`importer`]s, aggregated by the
//! [`scene`], drawn by the software [`render`] pipeline with an egui HUD
//! ([`ui`]) and shown through a [`window`] either offscreen or inside the
//! desktop [`app`]. The [`interactor`] maps keys and string commands to
//! option changes.

pub mod app;
pub mod cli;
pub mod dataset;
pub mod importer;
pub mod interactor;
pub mod options;
pub mod readers;
pub mod render;
pub mod scene;
pub mod ui;
pub mod window;
