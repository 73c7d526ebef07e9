//! Image based lighting resources and their on-disk cache.
//!
//! Layout under the cache directory:
//! `lut.vti` (shared by every environment), `<hash>/sh.vtt` and
//! `<hash>/specular.vtm`. Binary files start with an 8 byte magic, a little
//! endian `u32` version and a length-prefixed JSON header, followed by the
//! little endian `f32` blobs the header describes.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"LUMAIBL\0";
const VERSION: u32 = 1;

pub const LUT_SIZE: u32 = 32;
pub const LUT_SAMPLES: u32 = 64;
pub const SPECULAR_SIZE: u32 = 64;
pub const SPECULAR_LEVELS: u32 = 5;
const SPECULAR_SAMPLES: u32 = 32;
/// Environments are reduced to this width before integration.
const SOURCE_WIDTH: u32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum IblError {
    #[error("cache file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache file {path} is invalid: {reason}")]
    Format { path: String, reason: String },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, IblError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> IblError + '_ {
    move |source| IblError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn format_error(path: &Path, reason: impl Into<String>) -> IblError {
    IblError::Format {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Texel count of a `width` x `height` grid, `None` on overflow.
fn texel_count(width: u32, height: u32) -> Option<usize> {
    (width as usize).checked_mul(height as usize)
}

/// Equirectangular environment in linear RGB. Row 0 is the zenith.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    width: u32,
    height: u32,
    texels: Vec<Vec3>,
}

impl EnvironmentMap {
    pub fn new(width: u32, height: u32, texels: Vec<Vec3>) -> Option<Self> {
        (width > 0 && height > 0 && texel_count(width, height) == Some(texels.len())).then_some(Self {
            width,
            height,
            texels,
        })
    }

    /// Builds a map from a texel function, at least 1 x 1.
    pub fn from_fn(width: u32, height: u32, mut texel: impl FnMut(u32, u32) -> Vec3) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                texels.push(texel(x, y));
            }
        }
        Self { width, height, texels }
    }

    pub fn from_image(image: &image::Rgba32FImage) -> Option<Self> {
        let texels = image
            .pixels()
            .map(|pixel| Vec3::new(pixel.0[0], pixel.0[1], pixel.0[2]))
            .collect();
        Self::new(image.width(), image.height(), texels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[Vec3] {
        &self.texels
    }

    fn texel(&self, x: u32, y: u32) -> Vec3 {
        self.texels[(y * self.width + x) as usize]
    }

    /// Bilinear lookup in the direction `direction`.
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        let uv = direction_to_equirect(direction);
        let x = uv.x * self.width as f32 - 0.5;
        let y = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let wrap = |xi: f32| (xi as i64).rem_euclid(self.width as i64) as u32;
        let y0i = y0 as u32;
        let y1i = (y0i + 1).min(self.height - 1);
        let top = self.texel(wrap(x0), y0i).lerp(self.texel(wrap(x0 + 1.0), y0i), fx);
        let bottom = self.texel(wrap(x0), y1i).lerp(self.texel(wrap(x0 + 1.0), y1i), fx);
        top.lerp(bottom, fy)
    }

    /// Box filtered copy no wider than `max_width`.
    pub fn reduced(&self, max_width: u32) -> EnvironmentMap {
        let mut current = self.clone();
        while current.width > max_width.max(2) && current.height >= 2 {
            let width = current.width / 2;
            let height = current.height / 2;
            let mut texels = Vec::with_capacity(width as usize * height as usize);
            for y in 0..height {
                for x in 0..width {
                    let sum = current.texel(2 * x, 2 * y)
                        + current.texel(2 * x + 1, 2 * y)
                        + current.texel(2 * x, 2 * y + 1)
                        + current.texel(2 * x + 1, 2 * y + 1);
                    texels.push(sum * 0.25);
                }
            }
            current = EnvironmentMap { width, height, texels };
        }
        current
    }
}

/// Normalized equirectangular coordinates of a direction, `v = 0` at +Y.
pub fn direction_to_equirect(direction: Vec3) -> Vec2 {
    let d = direction.normalize_or_zero();
    let u = 0.5 + d.z.atan2(d.x) / (2.0 * PI);
    let v = d.y.clamp(-1.0, 1.0).acos() / PI;
    Vec2::new(u, v)
}

pub fn equirect_to_direction(uv: Vec2) -> Vec3 {
    let phi = (uv.x - 0.5) * 2.0 * PI;
    let theta = uv.y * PI;
    Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
}

fn radical_inverse(mut bits: u32) -> f32 {
    bits = bits.rotate_right(16);
    bits = ((bits & 0x5555_5555) << 1) | ((bits & 0xAAAA_AAAA) >> 1);
    bits = ((bits & 0x3333_3333) << 2) | ((bits & 0xCCCC_CCCC) >> 2);
    bits = ((bits & 0x0F0F_0F0F) << 4) | ((bits & 0xF0F0_F0F0) >> 4);
    bits = ((bits & 0x00FF_00FF) << 8) | ((bits & 0xFF00_FF00) >> 8);
    bits as f32 * 2.328_306_4e-10
}

fn hammersley(i: u32, count: u32) -> Vec2 {
    Vec2::new(i as f32 / count as f32, radical_inverse(i))
}

/// GGX importance sampled half vector around `normal`.
fn importance_sample_ggx(xi: Vec2, normal: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).max(0.0).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    (tangent * h.x + bitangent * h.y + normal * h.z).normalize()
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = roughness * roughness / 2.0;
    let gv = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let gl = n_dot_l / (n_dot_l * (1.0 - k) + k);
    gv * gl
}

/// Split sum BRDF integration table: scale and bias of F0 indexed by
/// `(n.v, roughness)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrdfLut {
    size: u32,
    values: Vec<Vec2>,
}

impl BrdfLut {
    pub fn compute(size: u32, samples: u32) -> Self {
        let size = size.max(2);
        let samples = samples.max(1);
        let mut values = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            let roughness = (y as f32 + 0.5) / size as f32;
            for x in 0..size {
                let n_dot_v = ((x as f32 + 0.5) / size as f32).max(1e-3);
                let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
                let mut scale = 0.0;
                let mut bias = 0.0;
                for i in 0..samples {
                    let h = importance_sample_ggx(hammersley(i, samples), Vec3::Z, roughness);
                    let l = 2.0 * v.dot(h) * h - v;
                    let n_dot_l = l.z.max(0.0);
                    let n_dot_h = h.z.max(0.0);
                    let v_dot_h = v.dot(h).max(0.0);
                    if n_dot_l > 0.0 {
                        let g = geometry_smith(n_dot_v, n_dot_l, roughness);
                        let g_vis = g * v_dot_h / (n_dot_h * n_dot_v).max(1e-6);
                        let fc = (1.0 - v_dot_h).powi(5);
                        scale += (1.0 - fc) * g_vis;
                        bias += fc * g_vis;
                    }
                }
                values.push(Vec2::new(scale, bias) / samples as f32);
            }
        }
        Self { size, values }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn lookup(&self, n_dot_v: f32, roughness: f32) -> Vec2 {
        let clamp = |t: f32| ((t * self.size as f32) as u32).min(self.size - 1);
        let x = clamp(n_dot_v.clamp(0.0, 1.0));
        let y = clamp(roughness.clamp(0.0, 1.0));
        self.values[y as usize * self.size as usize + x as usize]
    }

    fn to_blob(&self) -> Vec<f32> {
        self.values.iter().flat_map(|v| [v.x, v.y]).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let header = BlobHeader {
            kind: "lut".to_string(),
            levels: vec![[self.size, self.size]],
            channels: 2,
        };
        write_blob_file(path, &header, &[self.to_blob()])
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, blobs) = read_blob_file(path)?;
        let [size, _] = *header
            .levels
            .first()
            .ok_or_else(|| format_error(path, "no lut level"))?;
        if header.kind != "lut" || header.channels != 2 || blobs.len() != 1 || size < 2 {
            return Err(format_error(path, "not a lut file"));
        }
        let values = blobs[0]
            .chunks_exact(2)
            .map(|pair| Vec2::new(pair[0], pair[1]))
            .collect::<Vec<_>>();
        if texel_count(size, size) != Some(values.len()) {
            return Err(format_error(path, "lut size mismatch"));
        }
        Ok(Self { size, values })
    }
}

/// Nine coefficient irradiance approximation of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphericalHarmonics {
    pub coefficients: Vec<[f32; 3]>,
}

fn sh_basis(d: Vec3) -> [f32; 9] {
    [
        0.282_095,
        0.488_603 * d.y,
        0.488_603 * d.z,
        0.488_603 * d.x,
        1.092_548 * d.x * d.y,
        1.092_548 * d.y * d.z,
        0.315_392 * (3.0 * d.z * d.z - 1.0),
        1.092_548 * d.x * d.z,
        0.546_274 * (d.x * d.x - d.y * d.y),
    ]
}

/// Cosine lobe convolution weights per band.
const SH_BAND: [f32; 9] = [
    PI,
    2.094_395,
    2.094_395,
    2.094_395,
    0.785_398,
    0.785_398,
    0.785_398,
    0.785_398,
    0.785_398,
];

impl SphericalHarmonics {
    pub fn compute(environment: &EnvironmentMap) -> Self {
        let source = environment.reduced(SOURCE_WIDTH);
        let mut sums = [Vec3::ZERO; 9];
        let mut total_weight = 0.0;
        for y in 0..source.height {
            let theta = (y as f32 + 0.5) / source.height as f32 * PI;
            let weight = theta.sin();
            for x in 0..source.width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / source.width as f32,
                    (y as f32 + 0.5) / source.height as f32,
                );
                let direction = equirect_to_direction(uv);
                let radiance = source.texel(x, y);
                for (sum, basis) in sums.iter_mut().zip(sh_basis(direction)) {
                    *sum += radiance * basis * weight;
                }
                total_weight += weight;
            }
        }
        let norm = 4.0 * PI / total_weight.max(f32::EPSILON);
        Self {
            coefficients: sums.iter().map(|sum| (*sum * norm).to_array()).collect(),
        }
    }

    /// Diffuse irradiance divided by pi, for a unit normal.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        let basis = sh_basis(normal);
        let mut result = Vec3::ZERO;
        for ((coefficient, basis), band) in self.coefficients.iter().zip(basis).zip(SH_BAND) {
            result += Vec3::from_array(*coefficient) * basis * band;
        }
        (result / PI).max(Vec3::ZERO)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| IblError::Json {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, text).map_err(io_error(path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        let sh: Self = serde_json::from_str(&text).map_err(|source| IblError::Json {
            path: path.display().to_string(),
            source,
        })?;
        if sh.coefficients.len() != 9 {
            return Err(format_error(path, "expected 9 coefficients"));
        }
        Ok(sh)
    }
}

/// Prefiltered specular environment, one equirectangular level per roughness step.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecularMap {
    levels: Vec<EnvironmentMap>,
}

impl SpecularMap {
    pub fn compute(environment: &EnvironmentMap, size: u32, level_count: u32) -> Self {
        let source = environment.reduced(SOURCE_WIDTH);
        let level_count = level_count.max(1);
        let mut levels = Vec::with_capacity(level_count as usize);
        for level in 0..level_count {
            let width = (size >> level).max(2);
            let height = (width / 2).max(1);
            let roughness = if level_count > 1 {
                level as f32 / (level_count - 1) as f32
            } else {
                0.0
            };
            let mut texels = Vec::with_capacity((width * height) as usize);
            for y in 0..height {
                for x in 0..width {
                    let uv = Vec2::new(
                        (x as f32 + 0.5) / width as f32,
                        (y as f32 + 0.5) / height as f32,
                    );
                    let normal = equirect_to_direction(uv);
                    texels.push(prefilter(&source, normal, roughness));
                }
            }
            levels.push(EnvironmentMap { width, height, texels });
        }
        Self { levels }
    }

    pub fn levels(&self) -> &[EnvironmentMap] {
        &self.levels
    }

    /// Radiance reflected along `direction`, blending the two nearest levels.
    pub fn sample(&self, direction: Vec3, roughness: f32) -> Vec3 {
        let Some(last) = self.levels.len().checked_sub(1) else {
            return Vec3::ZERO;
        };
        let level = roughness.clamp(0.0, 1.0) * last as f32;
        let lower = level.floor() as usize;
        let upper = (lower + 1).min(last);
        let t = level - lower as f32;
        self.levels[lower]
            .sample(direction)
            .lerp(self.levels[upper].sample(direction), t)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let header = BlobHeader {
            kind: "specular".to_string(),
            levels: self.levels.iter().map(|l| [l.width, l.height]).collect(),
            channels: 3,
        };
        let blobs: Vec<Vec<f32>> = self
            .levels
            .iter()
            .map(|level| level.texels.iter().flat_map(|t| t.to_array()).collect())
            .collect();
        write_blob_file(path, &header, &blobs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let (header, blobs) = read_blob_file(path)?;
        if header.kind != "specular" || header.channels != 3 || blobs.len() != header.levels.len()
        {
            return Err(format_error(path, "not a specular file"));
        }
        let mut levels = Vec::with_capacity(blobs.len());
        for ([width, height], blob) in header.levels.iter().zip(blobs) {
            let texels = blob
                .chunks_exact(3)
                .map(|t| Vec3::new(t[0], t[1], t[2]))
                .collect();
            let level = EnvironmentMap::new(*width, *height, texels)
                .ok_or_else(|| format_error(path, "level size mismatch"))?;
            levels.push(level);
        }
        if levels.is_empty() {
            return Err(format_error(path, "no specular level"));
        }
        Ok(Self { levels })
    }
}

fn prefilter(source: &EnvironmentMap, normal: Vec3, roughness: f32) -> Vec3 {
    if roughness <= 0.0 {
        return source.sample(normal);
    }
    let mut color = Vec3::ZERO;
    let mut weight = 0.0;
    for i in 0..SPECULAR_SAMPLES {
        let h = importance_sample_ggx(hammersley(i, SPECULAR_SAMPLES), normal, roughness);
        let l = 2.0 * normal.dot(h) * h - normal;
        let n_dot_l = normal.dot(l);
        if n_dot_l > 0.0 {
            color += source.sample(l) * n_dot_l;
            weight += n_dot_l;
        }
    }
    if weight > 0.0 {
        color / weight
    } else {
        source.sample(normal)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    kind: String,
    /// `[width, height]` of every blob.
    levels: Vec<[u32; 2]>,
    channels: u32,
}

fn write_blob_file(path: &Path, header: &BlobHeader, blobs: &[Vec<f32>]) -> Result<()> {
    let json = serde_json::to_vec(header).map_err(|source| IblError::Json {
        path: path.display().to_string(),
        source,
    })?;
    let payload: usize = blobs.iter().map(|blob| 8 + blob.len() * 4).sum();
    let mut bytes = Vec::with_capacity(16 + json.len() + payload);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&json);
    for blob in blobs {
        bytes.extend_from_slice(&(blob.len() as u64).to_le_bytes());
        for value in blob {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    std::fs::write(path, bytes).map_err(io_error(path))
}

fn read_blob_file(path: &Path) -> Result<(BlobHeader, Vec<Vec<f32>>)> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let mut cursor = ByteCursor { bytes: &bytes, offset: 0 };
    if cursor.take(8) != Some(MAGIC.as_slice()) {
        return Err(format_error(path, "bad magic"));
    }
    let version = cursor.u32().ok_or_else(|| format_error(path, "truncated"))?;
    if version != VERSION {
        return Err(format_error(path, format!("unsupported version {version}")));
    }
    let json_len = cursor.u32().ok_or_else(|| format_error(path, "truncated"))? as usize;
    let json = cursor
        .take(json_len)
        .ok_or_else(|| format_error(path, "truncated header"))?;
    let header: BlobHeader = serde_json::from_slice(json).map_err(|source| IblError::Json {
        path: path.display().to_string(),
        source,
    })?;
    let mut blobs = Vec::with_capacity(header.levels.len());
    for _ in 0..header.levels.len() {
        let len = cursor.u64().ok_or_else(|| format_error(path, "truncated blob"))? as usize;
        let raw = cursor
            .take(len.saturating_mul(4))
            .ok_or_else(|| format_error(path, "truncated blob"))?;
        blobs.push(
            raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        );
    }
    Ok((header, blobs))
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        let slice = self.bytes.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(b);
        Some(u64::from_le_bytes(array))
    }
}

/// Paths of the cache files under a cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IblCache {
    root: PathBuf,
}

impl IblCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lut_path(&self) -> PathBuf {
        self.root.join("lut.vti")
    }

    pub fn environment_dir(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    pub fn sh_path(&self, hash: &str) -> PathBuf {
        self.environment_dir(hash).join("sh.vtt")
    }

    pub fn specular_path(&self, hash: &str) -> PathBuf {
        self.environment_dir(hash).join("specular.vtm")
    }

    pub fn create_environment_dir(&self, hash: &str) -> Result<()> {
        let dir = self.environment_dir(hash);
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))
    }
}
