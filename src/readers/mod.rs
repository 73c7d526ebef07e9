//! Reader plugins and the registry that picks one for a given file.

mod gltf;
mod metaimage;
mod ply;

pub use self::gltf::GltfReader;
pub use metaimage::MetaImageReader;
pub use ply::PlyReader;

use crate::dataset::{Dataset, DatasetError};
use crate::importer::Importer;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {reason}")]
    Format { path: String, reason: String },
    #[error("{path}: {source}")]
    Dataset {
        path: String,
        #[source]
        source: DatasetError,
    },
}

impl ReaderError {
    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Free-form options forwarded to every reader the registry creates.
pub type ReaderOptions = BTreeMap<String, String>;

/// Low-level reader producing a single dataset, possibly time dependent.
pub trait GeometryReader {
    fn read(&mut self) -> Result<Dataset, ReaderError>;

    /// Time values of a temporal dataset, empty for static data.
    fn time_steps(&self) -> Vec<f64> {
        Vec::new()
    }

    fn read_at(&mut self, _time: f64) -> Result<Dataset, ReaderError> {
        self.read()
    }

    fn description(&self) -> String;
}

/// A file format plugin.
pub trait Reader {
    fn name(&self) -> &str;

    fn short_description(&self) -> &str;

    fn long_description(&self) -> &str {
        self.short_description()
    }

    /// Lowercase extensions, without the dot.
    fn extensions(&self) -> &[&str];

    fn mime_types(&self) -> &[&str];

    fn can_read(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        let extension = extension.to_ascii_lowercase();
        self.extensions().iter().any(|ext| *ext == extension) && path.is_file()
    }

    /// Preference among readers able to read the same file, `0..=100`.
    fn score(&self) -> i32 {
        50
    }

    fn create_geometry_reader(
        &self,
        _path: &Path,
        _options: &ReaderOptions,
    ) -> Option<Box<dyn GeometryReader>> {
        None
    }

    fn create_scene_reader(
        &self,
        _path: &Path,
        _options: &ReaderOptions,
    ) -> Option<Box<dyn Importer>> {
        None
    }
}

/// Registered readers, in registration order.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: Vec<Box<dyn Reader>>,
    options: ReaderOptions,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PlyReader));
        registry.register(Box::new(MetaImageReader));
        registry.register(Box::new(GltfReader));
        registry
    }

    pub fn register(&mut self, reader: Box<dyn Reader>) {
        log::debug!("Registering reader {}", reader.name());
        self.readers.push(reader);
    }

    pub fn readers(&self) -> impl Iterator<Item = &dyn Reader> {
        self.readers.iter().map(|reader| reader.as_ref() as &dyn Reader)
    }

    pub fn set_reader_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn reader_options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Highest scoring reader able to read `path`; ties go to the earliest registered.
    pub fn reader_for(&self, path: &Path) -> Option<&dyn Reader> {
        let mut best: Option<&dyn Reader> = None;
        for reader in self.readers() {
            if !reader.can_read(path) {
                continue;
            }
            let better = best
                .map(|current| reader.score() > current.score())
                .unwrap_or(true);
            if better {
                best = Some(reader);
            }
        }
        best
    }

    pub fn reader_for_mime_type(&self, mime_type: &str) -> Option<&dyn Reader> {
        let mut best: Option<&dyn Reader> = None;
        for reader in self.readers() {
            if !reader.mime_types().iter().any(|mime| *mime == mime_type) {
                continue;
            }
            if best.map(|b| reader.score() > b.score()).unwrap_or(true) {
                best = Some(reader);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::{Reader, ReaderRegistry};
    use std::path::{Path, PathBuf};

    struct FakeReader {
        name: &'static str,
        score: i32,
    }

    impl Reader for FakeReader {
        fn name(&self) -> &str {
            self.name
        }

        fn short_description(&self) -> &str {
            "fake"
        }

        fn extensions(&self) -> &[&str] {
            &["fake"]
        }

        fn mime_types(&self) -> &[&str] {
            &["application/x-fake"]
        }

        fn score(&self) -> i32 {
            self.score
        }
    }

    fn temp_file(extension: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("lumaview_reader_{}_{}.{}", std::process::id(), nonce, extension));
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn highest_score_wins_and_ties_keep_registration_order() {
        let mut registry = ReaderRegistry::new();
        registry.register(Box::new(FakeReader { name: "first", score: 50 }));
        registry.register(Box::new(FakeReader { name: "second", score: 50 }));
        registry.register(Box::new(FakeReader { name: "low", score: 10 }));
        let path = temp_file("FAKE");

        assert_eq!(registry.reader_for(&path).map(|r| r.name()), Some("first"));
        registry.register(Box::new(FakeReader { name: "best", score: 90 }));
        assert_eq!(registry.reader_for(&path).map(|r| r.name()), Some("best"));
        assert_eq!(
            registry
                .reader_for_mime_type("application/x-fake")
                .map(|r| r.name()),
            Some("best")
        );

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_files_and_unknown_extensions_have_no_reader() {
        let registry = ReaderRegistry::with_builtin_readers();
        assert!(registry.reader_for(Path::new("/nonexistent/model.ply")).is_none());
        let path = temp_file("unknownext");
        assert!(registry.reader_for(&path).is_none());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn long_description_defaults_to_short() {
        let reader = FakeReader { name: "f", score: 1 };
        assert_eq!(reader.long_description(), "fake");
    }
}
