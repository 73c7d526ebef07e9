use super::{GeometryReader, Reader, ReaderError, ReaderOptions};
use crate::dataset::{DataArray, Dataset, ImageData};
use glam::Vec3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name given to the voxel array of every MetaImage volume.
pub const SCALARS_NAME: &str = "MetaImage";

/// MetaImage volumes (`.mhd` header with raw data, or single file `.mha`).
pub struct MetaImageReader;

impl Reader for MetaImageReader {
    fn name(&self) -> &str {
        "MetaImage"
    }

    fn short_description(&self) -> &str {
        "MetaImage volume"
    }

    fn extensions(&self) -> &[&str] {
        &["mhd", "mha"]
    }

    fn mime_types(&self) -> &[&str] {
        &["application/x-metaimage"]
    }

    fn create_geometry_reader(
        &self,
        path: &Path,
        _options: &ReaderOptions,
    ) -> Option<Box<dyn GeometryReader>> {
        Some(Box::new(MetaImageGeometryReader {
            path: path.to_path_buf(),
        }))
    }
}

pub struct MetaImageGeometryReader {
    path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ElementType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "MET_CHAR" => Self::I8,
            "MET_UCHAR" => Self::U8,
            "MET_SHORT" => Self::I16,
            "MET_USHORT" => Self::U16,
            "MET_INT" => Self::I32,
            "MET_UINT" => Self::U32,
            "MET_FLOAT" => Self::F32,
            "MET_DOUBLE" => Self::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8], big_endian: bool) -> f64 {
        let mut buf = [0u8; 8];
        let size = self.size();
        buf[..size].copy_from_slice(&bytes[..size]);
        if big_endian {
            buf[..size].reverse();
        }
        match self {
            Self::I8 => buf[0] as i8 as f64,
            Self::U8 => buf[0] as f64,
            Self::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            Self::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            Self::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::F64 => f64::from_le_bytes(buf),
        }
    }
}

struct Header {
    fields: HashMap<String, String>,
    data_offset: usize,
}

fn parse_header(bytes: &[u8]) -> Header {
    let mut fields = HashMap::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p + 1)
            .unwrap_or(bytes.len());
        let line = String::from_utf8_lossy(&bytes[offset..end]);
        offset = end;
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            let is_data_file = key == "ElementDataFile";
            fields.insert(key, value);
            // ElementDataFile is always the last header entry.
            if is_data_file {
                break;
            }
        }
    }
    Header {
        fields,
        data_offset: offset,
    }
}

fn numbers<T: std::str::FromStr>(text: Option<&String>, count: usize) -> Option<Vec<T>> {
    let values: Vec<T> = text?
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    (values.len() >= count).then_some(values)
}

fn vec3(values: Option<Vec<f32>>, fallback: f32) -> Vec3 {
    match values {
        Some(v) if v.len() >= 3 => Vec3::new(v[0], v[1], v[2]),
        Some(v) if v.len() == 2 => Vec3::new(v[0], v[1], fallback),
        _ => Vec3::splat(fallback),
    }
}

impl MetaImageGeometryReader {
    fn parse(&self, bytes: &[u8]) -> Result<ImageData, ReaderError> {
        let header = parse_header(bytes);
        let get = |key: &str| header.fields.get(key);
        let fail = |reason: &str| ReaderError::format(&self.path, reason);

        if get("CompressedData").map(|v| v.eq_ignore_ascii_case("true")) == Some(true) {
            return Err(fail("compressed MetaImage data is not supported"));
        }
        let dims: Vec<usize> = numbers(get("DimSize"), 2).ok_or_else(|| fail("missing DimSize"))?;
        let dimensions = [dims[0], dims[1], dims.get(2).copied().unwrap_or(1)];
        let element = get("ElementType")
            .and_then(|name| ElementType::parse(name))
            .ok_or_else(|| fail("missing or unsupported ElementType"))?;
        let channels = get("ElementNumberOfChannels")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let big_endian = get("BinaryDataByteOrderMSB")
            .or_else(|| get("ElementByteOrderMSB"))
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let spacing = vec3(
            numbers(get("ElementSpacing").or_else(|| get("ElementSize")), 2),
            1.0,
        );
        let origin = vec3(numbers(get("Offset").or_else(|| get("Origin")), 2), 0.0);
        let data_file = get("ElementDataFile").ok_or_else(|| fail("missing ElementDataFile"))?;

        let external;
        let data: &[u8] = if data_file.eq_ignore_ascii_case("LOCAL") {
            &bytes[header.data_offset..]
        } else {
            let raw_path = self
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(data_file);
            external = std::fs::read(&raw_path).map_err(|err| ReaderError::io(&raw_path, err))?;
            &external
        };

        let count = dimensions.iter().product::<usize>() * channels;
        let size = element.size();
        if data.len() < count * size {
            return Err(fail(&format!(
                "expected {} bytes of voxel data, found {}",
                count * size,
                data.len()
            )));
        }
        let values: Vec<f64> = data[..count * size]
            .chunks_exact(size)
            .map(|chunk| element.decode(chunk, big_endian))
            .collect();

        let mut image = ImageData::new(dimensions, spacing, origin);
        let array =
            DataArray::new(SCALARS_NAME, channels, values).map_err(|source| ReaderError::Dataset {
                path: self.path.display().to_string(),
                source,
            })?;
        image.point_data.add_array(array);
        Ok(image)
    }
}

impl GeometryReader for MetaImageGeometryReader {
    fn read(&mut self) -> Result<Dataset, ReaderError> {
        let bytes = std::fs::read(&self.path).map_err(|err| ReaderError::io(&self.path, err))?;
        let image = self.parse(&bytes)?;
        log::debug!(
            "Read MetaImage volume {}x{}x{} from {}",
            image.dimensions[0],
            image.dimensions[1],
            image.dimensions[2],
            self.path.display()
        );
        Ok(Dataset::Image(Arc::new(image)))
    }

    fn description(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("volume")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{MetaImageGeometryReader, SCALARS_NAME};
    use std::path::PathBuf;

    fn reader() -> MetaImageGeometryReader {
        MetaImageGeometryReader {
            path: PathBuf::from("/tmp/volume.mha"),
        }
    }

    #[test]
    fn local_data_with_spacing_and_origin() {
        let mut bytes = b"ObjectType = Image\nNDims = 3\nDimSize = 2 2 1\nElementSpacing = 0.5 0.5 1\nOffset = 1 2 3\nElementType = MET_USHORT\nElementDataFile = LOCAL\n".to_vec();
        for value in [0u16, 10, 20, 300] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let image = reader().parse(&bytes).unwrap();
        assert_eq!(image.dimensions, [2, 2, 1]);
        assert_eq!(image.origin.z, 3.0);
        assert_eq!(image.spacing.x, 0.5);
        let array = image.point_data.array(SCALARS_NAME).unwrap();
        assert_eq!(array.range(0), Some([0.0, 300.0]));
    }

    #[test]
    fn big_endian_floats() {
        let mut bytes =
            b"DimSize = 1 1 1\nElementType = MET_FLOAT\nBinaryDataByteOrderMSB = True\nElementDataFile = LOCAL\n"
                .to_vec();
        bytes.extend_from_slice(&2.5f32.to_be_bytes());
        let image = reader().parse(&bytes).unwrap();
        assert_eq!(image.point_data.array(SCALARS_NAME).unwrap().values(), &[2.5]);
    }

    #[test]
    fn short_data_is_rejected() {
        let bytes = b"DimSize = 4 4 4\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n\x01\x02";
        assert!(reader().parse(bytes).is_err());
    }
}
