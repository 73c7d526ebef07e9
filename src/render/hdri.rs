//! Environment lighting chain: reader, hash, texture, LUT, spherical
//! harmonics, prefiltered specular and skybox. Every stage has its own
//! validity flag so that, for example, the hash is skipped when only the
//! skybox is displayed.

use super::ibl::{
    BrdfLut, EnvironmentMap, IblCache, SpecularMap, SphericalHarmonics, LUT_SAMPLES, LUT_SIZE,
    SPECULAR_LEVELS, SPECULAR_SIZE,
};
use glam::Vec3;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Hash naming the cache of the built-in environment.
pub const DEFAULT_HASH: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HdriSource {
    File(PathBuf),
    Default,
}

/// How many times each resource was computed instead of loaded from the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BakeCounters {
    pub lut: usize,
    pub sh: usize,
    pub specular: usize,
}

/// Built-in environment: a sky gradient over a darker ground.
pub fn default_environment() -> EnvironmentMap {
    let zenith = Vec3::new(0.25, 0.45, 0.9);
    let horizon = Vec3::new(0.85, 0.85, 0.8);
    let ground = Vec3::new(0.25, 0.22, 0.2);
    EnvironmentMap::from_fn(64, 32, |x, y| {
        let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / 32.0;
        let color = if elevation >= 0.0 {
            horizon.lerp(zenith, elevation.powf(0.6))
        } else {
            horizon.lerp(ground, (-elevation).powf(0.3))
        };
        // A brighter patch standing for the sun.
        let sun = if (8..12).contains(&x) && (5..8).contains(&y) { 6.0 } else { 1.0 };
        color * sun
    })
}

/// State of the environment lighting chain.
#[derive(Debug, Default)]
pub struct HdriChain {
    file: Option<PathBuf>,
    cache: Option<IblCache>,
    use_ibl: bool,
    skybox_visible: bool,

    source: Option<HdriSource>,
    hash: Option<String>,
    texture: Option<Arc<EnvironmentMap>>,
    lut: Option<Arc<BrdfLut>>,
    sh: Option<Arc<SphericalHarmonics>>,
    specular: Option<Arc<SpecularMap>>,
    skybox: Option<Arc<EnvironmentMap>>,

    counters: BakeCounters,
}

impl HdriChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the value changed.
    pub fn set_file(&mut self, file: Option<PathBuf>) -> bool {
        if self.file == file {
            return false;
        }
        self.file = file;
        self.source = None;
        self.hash = None;
        self.texture = None;
        self.sh = None;
        self.specular = None;
        true
    }

    pub fn set_cache_path(&mut self, path: Option<PathBuf>) -> bool {
        let cache = path.map(IblCache::new);
        if self.cache == cache {
            return false;
        }
        self.cache = cache;
        self.lut = None;
        self.sh = None;
        self.specular = None;
        true
    }

    pub fn set_use_image_based_lighting(&mut self, use_ibl: bool) -> bool {
        if self.use_ibl == use_ibl {
            return false;
        }
        self.use_ibl = use_ibl;
        true
    }

    pub fn set_skybox_visible(&mut self, visible: bool) -> bool {
        if self.skybox_visible == visible {
            return false;
        }
        self.skybox_visible = visible;
        true
    }

    pub fn use_image_based_lighting(&self) -> bool {
        self.use_ibl
    }

    pub fn skybox_visible(&self) -> bool {
        self.skybox_visible
    }

    pub fn configure_reader(&mut self) {
        if self.source.is_some() || !(self.skybox_visible || self.use_ibl) {
            return;
        }
        let source = match &self.file {
            Some(file) if !file.is_file() => {
                log::warn!("HDRI file does not exist {}", file.display());
                HdriSource::Default
            }
            Some(file) if image::ImageFormat::from_path(file).is_err() => {
                log::warn!("Cannot open HDRI file {}. Using default HDRI", file.display());
                HdriSource::Default
            }
            Some(file) => HdriSource::File(file.clone()),
            None => HdriSource::Default,
        };
        self.source = Some(source);
    }

    pub fn configure_hash(&mut self) {
        if self.hash.is_some() || !self.use_ibl {
            return;
        }
        let Some(source) = &self.source else {
            return;
        };
        let hash = match source {
            HdriSource::Default => Some(DEFAULT_HASH.to_string()),
            HdriSource::File(path) => match file_hash(path) {
                Ok(hash) => Some(hash),
                Err(err) => {
                    log::warn!("Cannot hash HDRI file {}: {}", path.display(), err);
                    None
                }
            },
        };
        if let (Some(hash), Some(cache)) = (&hash, &self.cache) {
            if let Err(err) = cache.create_environment_dir(hash) {
                log::warn!("Cannot create HDRI cache directory: {err}");
            }
        }
        self.hash = hash;
    }

    fn cached(&self, path: impl Fn(&IblCache, &str) -> PathBuf) -> Option<PathBuf> {
        let (cache, hash) = (self.cache.as_ref()?, self.hash.as_deref()?);
        Some(path(cache, hash)).filter(|path| path.is_file())
    }

    pub fn configure_texture(&mut self) {
        if self.texture.is_none() {
            let mut needed = self.skybox_visible || self.use_ibl;
            if self.hash.is_some() && self.cache.is_some() {
                let sh_cached = self.cached(IblCache::sh_path).is_some();
                let specular_cached = self.cached(IblCache::specular_path).is_some();
                needed = self.skybox_visible || (self.use_ibl && !(sh_cached && specular_cached));
            }
            if needed {
                self.texture = Some(Arc::new(self.decode_source()));
            }
        }
    }

    fn decode_source(&self) -> EnvironmentMap {
        if let Some(HdriSource::File(path)) = &self.source {
            match image::open(path) {
                Ok(decoded) => {
                    // 8 bit images are gamma encoded.
                    let srgb = !matches!(
                        decoded.color(),
                        image::ColorType::Rgb32F | image::ColorType::Rgba32F
                    );
                    let mut pixels = decoded.to_rgba32f();
                    if srgb {
                        for pixel in pixels.pixels_mut() {
                            for channel in &mut pixel.0[..3] {
                                *channel = crate::importer::srgb_to_linear(*channel);
                            }
                        }
                    }
                    if let Some(map) = EnvironmentMap::from_image(&pixels) {
                        return map;
                    }
                    log::warn!("HDRI file {} is empty. Using default HDRI", path.display());
                }
                Err(err) => {
                    log::warn!("Cannot read HDRI file {}: {}. Using default HDRI", path.display(), err);
                }
            }
        }
        default_environment()
    }

    fn environment(&mut self) -> Arc<EnvironmentMap> {
        match &self.texture {
            Some(texture) => Arc::clone(texture),
            None => {
                let texture = Arc::new(self.decode_source());
                self.texture = Some(Arc::clone(&texture));
                texture
            }
        }
    }

    pub fn configure_lut(&mut self) {
        if !self.use_ibl || self.lut.is_some() {
            return;
        }
        let path = self.cache.as_ref().map(IblCache::lut_path);
        if let Some(path) = path.as_ref().filter(|path| path.is_file()) {
            match BrdfLut::load(path) {
                Ok(lut) => {
                    self.lut = Some(Arc::new(lut));
                    return;
                }
                Err(err) => log::warn!("Ignoring LUT cache: {err}"),
            }
        }
        let lut = BrdfLut::compute(LUT_SIZE, LUT_SAMPLES);
        self.counters.lut += 1;
        if let Some(path) = path {
            if let Err(err) = lut.save(&path) {
                log::warn!("Cannot write LUT cache: {err}");
            }
        }
        self.lut = Some(Arc::new(lut));
    }

    pub fn configure_spherical_harmonics(&mut self) {
        if !self.use_ibl || self.sh.is_some() {
            return;
        }
        if let Some(path) = self.cached(IblCache::sh_path) {
            match SphericalHarmonics::load(&path) {
                Ok(sh) => {
                    self.sh = Some(Arc::new(sh));
                    return;
                }
                Err(err) => log::warn!("Ignoring spherical harmonics cache: {err}"),
            }
        }
        let sh = SphericalHarmonics::compute(&self.environment());
        self.counters.sh += 1;
        if let (Some(cache), Some(hash)) = (&self.cache, &self.hash) {
            if let Err(err) = sh.save(&cache.sh_path(hash)) {
                log::warn!("Cannot write spherical harmonics cache: {err}");
            }
        }
        self.sh = Some(Arc::new(sh));
    }

    pub fn configure_specular(&mut self) {
        if !self.use_ibl || self.specular.is_some() {
            return;
        }
        if let Some(path) = self.cached(IblCache::specular_path) {
            match SpecularMap::load(&path) {
                Ok(specular) => {
                    self.specular = Some(Arc::new(specular));
                    return;
                }
                Err(err) => log::warn!("Ignoring specular cache: {err}"),
            }
        }
        let specular = SpecularMap::compute(&self.environment(), SPECULAR_SIZE, SPECULAR_LEVELS);
        self.counters.specular += 1;
        if let (Some(cache), Some(hash)) = (&self.cache, &self.hash) {
            if let Err(err) = specular.save(&cache.specular_path(hash)) {
                log::warn!("Cannot write specular cache: {err}");
            }
        }
        self.specular = Some(Arc::new(specular));
    }

    pub fn configure_skybox(&mut self) {
        self.skybox = if self.skybox_visible {
            self.texture.clone()
        } else {
            None
        };
    }

    /// Runs every stage in order.
    pub fn configure_all(&mut self) {
        self.configure_reader();
        self.configure_hash();
        self.configure_texture();
        self.configure_lut();
        self.configure_spherical_harmonics();
        self.configure_specular();
        self.configure_skybox();
    }

    pub fn source(&self) -> Option<&HdriSource> {
        self.source.as_ref()
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn has_valid_texture(&self) -> bool {
        self.texture.is_some()
    }

    pub fn lut(&self) -> Option<&BrdfLut> {
        self.lut.as_deref()
    }

    pub fn spherical_harmonics(&self) -> Option<&SphericalHarmonics> {
        self.sh.as_deref()
    }

    pub fn specular(&self) -> Option<&SpecularMap> {
        self.specular.as_deref()
    }

    pub fn skybox(&self) -> Option<&EnvironmentMap> {
        self.skybox.as_deref()
    }

    /// Lighting resources, when image based lighting is fully configured.
    pub fn lighting(&self) -> Option<ImageBasedLighting<'_>> {
        if !self.use_ibl {
            return None;
        }
        Some(ImageBasedLighting {
            lut: self.lut.as_deref()?,
            sh: self.sh.as_deref()?,
            specular: self.specular.as_deref()?,
        })
    }

    pub fn counters(&self) -> BakeCounters {
        self.counters
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageBasedLighting<'a> {
    pub lut: &'a BrdfLut,
    pub sh: &'a SphericalHarmonics,
    pub specular: &'a SpecularMap,
}

/// Hex encoded SHA-256 of a file.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::{file_hash, BakeCounters, HdriChain, HdriSource, DEFAULT_HASH};
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("lumaview_hdri_{tag}_{}_{nonce}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(dir: &PathBuf) -> PathBuf {
        let path = dir.join("env.png");
        let image = image::RgbImage::from_fn(16, 8, |_, y| {
            if y < 4 { image::Rgb([120, 160, 255]) } else { image::Rgb([40, 30, 20]) }
        });
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn second_configuration_is_served_from_the_cache() {
        let dir = temp_dir("cache");
        let file = write_png(&dir);
        let cache = dir.join("cache");

        let mut first = HdriChain::new();
        first.set_file(Some(file.clone()));
        first.set_cache_path(Some(cache.clone()));
        first.set_use_image_based_lighting(true);
        first.configure_all();
        assert_eq!(first.counters(), BakeCounters { lut: 1, sh: 1, specular: 1 });
        let hash = first.hash().unwrap().to_string();
        assert_eq!(hash, file_hash(&file).unwrap());
        assert!(cache.join("lut.vti").is_file());
        assert!(cache.join(&hash).join("sh.vtt").is_file());
        assert!(cache.join(&hash).join("specular.vtm").is_file());

        let mut second = HdriChain::new();
        second.set_file(Some(file));
        second.set_cache_path(Some(cache));
        second.set_use_image_based_lighting(true);
        second.configure_all();
        assert_eq!(second.counters(), BakeCounters::default());
        assert!(!second.has_valid_texture());
        assert_eq!(second.lut(), first.lut());
        assert_eq!(second.spherical_harmonics(), first.spherical_harmonics());
        assert_eq!(second.specular(), first.specular());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn skybox_only_skips_hash_and_lighting() {
        let mut chain = HdriChain::new();
        chain.set_skybox_visible(true);
        chain.configure_all();
        assert_eq!(chain.source(), Some(&HdriSource::Default));
        assert!(chain.hash().is_none());
        assert!(chain.skybox().is_some());
        assert!(chain.lighting().is_none());
        assert_eq!(chain.counters(), BakeCounters::default());
    }

    #[test]
    fn missing_file_falls_back_to_default_and_bakes_in_memory() {
        let mut chain = HdriChain::new();
        chain.set_file(Some(PathBuf::from("/nonexistent/lumaview/sky.hdr")));
        chain.set_use_image_based_lighting(true);
        chain.configure_all();
        assert_eq!(chain.hash(), Some(DEFAULT_HASH));
        assert!(chain.lighting().is_some());
        assert_eq!(chain.counters(), BakeCounters { lut: 1, sh: 1, specular: 1 });

        chain.configure_all();
        assert_eq!(chain.counters(), BakeCounters { lut: 1, sh: 1, specular: 1 });
        assert!(!chain.set_use_image_based_lighting(true));
    }
}
