use super::{Reader, ReaderOptions};
use crate::importer::{GltfImporter, Importer};
use std::path::Path;

/// glTF 2.0 scenes, both the JSON and the binary flavour.
pub struct GltfReader;

impl Reader for GltfReader {
    fn name(&self) -> &str {
        "GLTF"
    }

    fn short_description(&self) -> &str {
        "GL Transmission Format"
    }

    fn long_description(&self) -> &str {
        "glTF 2.0 scenes with meshes, PBR materials, cameras, punctual lights and node animations"
    }

    fn extensions(&self) -> &[&str] {
        &["gltf", "glb"]
    }

    fn mime_types(&self) -> &[&str] {
        &["model/gltf+json", "model/gltf-binary"]
    }

    fn score(&self) -> i32 {
        80
    }

    fn create_scene_reader(
        &self,
        path: &Path,
        _options: &ReaderOptions,
    ) -> Option<Box<dyn Importer>> {
        Some(Box::new(GltfImporter::new(path)))
    }
}
