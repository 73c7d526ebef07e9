use super::{GeometryReader, Reader, ReaderError, ReaderOptions};
use crate::dataset::{DataArray, Dataset, PolyData};
use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stanford PLY meshes and point clouds.
pub struct PlyReader;

impl Reader for PlyReader {
    fn name(&self) -> &str {
        "PLY"
    }

    fn short_description(&self) -> &str {
        "Stanford polygon file"
    }

    fn long_description(&self) -> &str {
        "Stanford polygon file (ASCII or binary little endian): meshes or point clouds with per-vertex and per-face properties"
    }

    fn extensions(&self) -> &[&str] {
        &["ply"]
    }

    fn mime_types(&self) -> &[&str] {
        &["application/vnd.ply"]
    }

    fn create_geometry_reader(
        &self,
        path: &Path,
        _options: &ReaderOptions,
    ) -> Option<Box<dyn GeometryReader>> {
        Some(Box::new(PlyGeometryReader {
            path: path.to_path_buf(),
        }))
    }
}

pub struct PlyGeometryReader {
    path: PathBuf,
}

impl GeometryReader for PlyGeometryReader {
    fn read(&mut self) -> Result<Dataset, ReaderError> {
        let bytes = std::fs::read(&self.path).map_err(|err| ReaderError::io(&self.path, err))?;
        let poly = parse_ply(&bytes).map_err(|reason| ReaderError::format(&self.path, reason))?;
        poly.validate().map_err(|source| ReaderError::Dataset {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(Dataset::Poly(Arc::new(poly)))
    }

    fn description(&self) -> String {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("ply")
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
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
}

#[derive(Debug, Clone)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { name: String, count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
}

trait ValueSource {
    fn next(&mut self, ty: ScalarType) -> Result<f64, String>;
}

struct AsciiSource<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
}

impl ValueSource for AsciiSource<'_> {
    fn next(&mut self, _ty: ScalarType) -> Result<f64, String> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| "unexpected end of data".to_string())?;
        token
            .parse::<f64>()
            .map_err(|_| format!("invalid number {token:?}"))
    }
}

struct BinarySource<'a> {
    data: &'a [u8],
    offset: usize,
}

impl ValueSource for BinarySource<'_> {
    fn next(&mut self, ty: ScalarType) -> Result<f64, String> {
        let size = ty.size();
        let bytes = self
            .data
            .get(self.offset..self.offset + size)
            .ok_or_else(|| "unexpected end of binary data".to_string())?;
        self.offset += size;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(bytes);
        Ok(match ty {
            ScalarType::I8 => buf[0] as i8 as f64,
            ScalarType::U8 => buf[0] as f64,
            ScalarType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            ScalarType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            ScalarType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            ScalarType::F64 => f64::from_le_bytes(buf),
        })
    }
}

fn parse_header(text: &str) -> Result<(Encoding, Vec<Element>), String> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some("ply") {
        return Err("missing ply magic".to_string());
    }
    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();
    for line in lines {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("format") => {
                encoding = Some(match words.next() {
                    Some("ascii") => Encoding::Ascii,
                    Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                    Some(other) => return Err(format!("unsupported encoding {other}")),
                    None => return Err("missing encoding".to_string()),
                });
            }
            Some("element") => {
                let name = words.next().ok_or("element without name")?.to_string();
                let count = words
                    .next()
                    .and_then(|c| c.parse::<usize>().ok())
                    .ok_or("element without count")?;
                elements.push(Element {
                    name,
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements.last_mut().ok_or("property before element")?;
                let first = words.next().ok_or("property without type")?;
                let property = if first == "list" {
                    let count = words.next().and_then(ScalarType::parse);
                    let item = words.next().and_then(ScalarType::parse);
                    let name = words.next();
                    match (count, item, name) {
                        (Some(count), Some(item), Some(name)) => Property::List {
                            name: name.to_string(),
                            count,
                            item,
                        },
                        _ => return Err(format!("malformed list property: {line}")),
                    }
                } else {
                    let ty = ScalarType::parse(first)
                        .ok_or_else(|| format!("unknown property type {first}"))?;
                    let name = words.next().ok_or("property without name")?;
                    Property::Scalar {
                        name: name.to_string(),
                        ty,
                    }
                };
                element.properties.push(property);
            }
            Some("end_header") => break,
            _ => {}
        }
    }
    let encoding = encoding.ok_or("missing format line")?;
    Ok((encoding, elements))
}

fn header_length(bytes: &[u8]) -> Option<usize> {
    let marker = b"end_header";
    let start = bytes.windows(marker.len()).position(|w| w == marker)?;
    let newline = bytes[start..].iter().position(|&b| b == b'\n')?;
    Some(start + newline + 1)
}

/// Element rows: one `Vec<f64>` of scalars plus one list per list property.
struct Rows {
    scalars: Vec<Vec<f64>>,
    lists: Vec<Vec<Vec<u32>>>,
}

fn read_element(source: &mut dyn ValueSource, element: &Element) -> Result<Rows, String> {
    let mut rows = Rows {
        scalars: Vec::with_capacity(element.count),
        lists: Vec::with_capacity(element.count),
    };
    for _ in 0..element.count {
        let mut scalars = Vec::new();
        let mut lists = Vec::new();
        for property in &element.properties {
            match property {
                Property::Scalar { ty, .. } => scalars.push(source.next(*ty)?),
                Property::List { count, item, .. } => {
                    let n = source.next(*count)? as usize;
                    let mut ids = Vec::with_capacity(n);
                    for _ in 0..n {
                        ids.push(source.next(*item)? as u32);
                    }
                    lists.push(ids);
                }
            }
        }
        rows.scalars.push(scalars);
        rows.lists.push(lists);
    }
    Ok(rows)
}

fn scalar_names(element: &Element) -> Vec<(String, ScalarType)> {
    element
        .properties
        .iter()
        .filter_map(|p| match p {
            Property::Scalar { name, ty } => Some((name.clone(), *ty)),
            Property::List { .. } => None,
        })
        .collect()
}

fn column(rows: &Rows, index: usize) -> impl Iterator<Item = f64> + '_ {
    rows.scalars.iter().map(move |row| row[index])
}

fn parse_ply(bytes: &[u8]) -> Result<PolyData, String> {
    let header_end = header_length(bytes).ok_or("missing end_header")?;
    let header = std::str::from_utf8(&bytes[..header_end]).map_err(|_| "header is not text")?;
    let (encoding, elements) = parse_header(header)?;
    let body = &bytes[header_end..];

    let text;
    let mut ascii;
    let mut binary;
    let source: &mut dyn ValueSource = match encoding {
        Encoding::Ascii => {
            text = std::str::from_utf8(body).map_err(|_| "ascii body is not text")?;
            ascii = AsciiSource {
                tokens: text.split_ascii_whitespace(),
            };
            &mut ascii
        }
        Encoding::BinaryLittleEndian => {
            binary = BinarySource {
                data: body,
                offset: 0,
            };
            &mut binary
        }
    };

    let mut poly = PolyData::default();
    for element in &elements {
        let rows = read_element(source, element)?;
        match element.name.as_str() {
            "vertex" => fill_vertices(&mut poly, element, &rows)?,
            "face" => fill_cells(&mut poly, element, &rows, false),
            "edge" | "line" => fill_cells(&mut poly, element, &rows, true),
            other => log::debug!("Skipping PLY element {other}"),
        }
    }
    Ok(poly)
}

fn fill_vertices(poly: &mut PolyData, element: &Element, rows: &Rows) -> Result<(), String> {
    let names = scalar_names(element);
    let find = |wanted: &[&str]| names.iter().position(|(n, _)| wanted.contains(&n.as_str()));
    let (Some(x), Some(y), Some(z)) = (find(&["x"]), find(&["y"]), find(&["z"])) else {
        return Err("vertex element lacks x, y or z".to_string());
    };
    poly.points = rows
        .scalars
        .iter()
        .map(|row| Vec3::new(row[x] as f32, row[y] as f32, row[z] as f32))
        .collect();

    let mut used = vec![x, y, z];
    if let (Some(nx), Some(ny), Some(nz)) = (find(&["nx"]), find(&["ny"]), find(&["nz"])) {
        poly.normals = Some(
            rows.scalars
                .iter()
                .map(|row| Vec3::new(row[nx] as f32, row[ny] as f32, row[nz] as f32))
                .collect(),
        );
        used.extend([nx, ny, nz]);
    }
    if let (Some(u), Some(v)) = (find(&["u", "s", "texture_u"]), find(&["v", "t", "texture_v"])) {
        poly.tcoords = Some(
            rows.scalars
                .iter()
                .map(|row| Vec2::new(row[u] as f32, row[v] as f32))
                .collect(),
        );
        used.extend([u, v]);
    }
    if let (Some(r), Some(g), Some(b)) = (
        find(&["red", "r", "diffuse_red"]),
        find(&["green", "g", "diffuse_green"]),
        find(&["blue", "b", "diffuse_blue"]),
    ) {
        let mut channels = vec![r, g, b];
        if let Some(a) = find(&["alpha", "a"]) {
            channels.push(a);
        }
        let scale = if names[r].1 == ScalarType::U8 { 255.0 } else { 1.0 };
        let mut values = Vec::with_capacity(rows.scalars.len() * channels.len());
        for row in &rows.scalars {
            values.extend(channels.iter().map(|&c| row[c] / scale));
        }
        let name = if channels.len() == 4 { "RGBA" } else { "RGB" };
        poly.point_data.add_array(
            DataArray::new(name, channels.len(), values).map_err(|err| err.to_string())?,
        );
        used.extend(channels);
    }
    for (index, (name, _)) in names.iter().enumerate() {
        if used.contains(&index) {
            continue;
        }
        let array = DataArray::new(name.clone(), 1, column(rows, index).collect())
            .map_err(|err| err.to_string())?;
        poly.point_data.add_array(array);
    }
    Ok(())
}

fn fill_cells(poly: &mut PolyData, element: &Element, rows: &Rows, lines: bool) {
    for list in &rows.lists {
        if let Some(ids) = list.first() {
            if lines {
                poly.lines.push(ids.clone());
            } else {
                poly.polys.push(ids.clone());
            }
        }
    }
    // Line properties are dropped, cell arrays only describe faces.
    if lines {
        return;
    }
    for (index, (name, _)) in scalar_names(element).iter().enumerate() {
        if let Ok(array) = DataArray::new(name.clone(), 1, column(rows, index).collect()) {
            poly.cell_data.add_array(array);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_ply;
    use glam::Vec3;

    const TRIANGLE: &str = "ply
format ascii 1.0
comment a single triangle with a height array
element vertex 3
property float x
property float y
property float z
property float height
element face 1
property list uchar int vertex_indices
property float quality
end_header
0 0 0 0
1 0 0 0.5
0 1 0 1
3 0 1 2 7
";

    #[test]
    fn ascii_mesh_with_point_and_cell_arrays() {
        let poly = parse_ply(TRIANGLE.as_bytes()).unwrap();
        assert_eq!(poly.points.len(), 3);
        assert_eq!(poly.points[1], Vec3::X);
        assert_eq!(poly.polys, vec![vec![0, 1, 2]]);
        let height = poly.point_data.array("height").unwrap();
        assert_eq!(height.range(0), Some([0.0, 1.0]));
        assert_eq!(poly.cell_data.array("quality").unwrap().values(), &[7.0]);
    }

    #[test]
    fn binary_point_cloud_with_colors() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n".to_vec();
        for (p, c) in [([1.0f32, 2.0, 3.0], [255u8, 0, 0]), ([4.0, 5.0, 6.0], [0, 255, 51])] {
            for v in p {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            bytes.extend_from_slice(&c);
        }
        let poly = parse_ply(&bytes).unwrap();
        assert_eq!(poly.points, vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)]);
        assert!(poly.polys.is_empty());
        let rgb = poly.point_data.array("RGB").unwrap();
        assert_eq!(rgb.number_of_components(), 3);
        assert_eq!(rgb.tuple(1), &[0.0, 1.0, 0.2]);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let text = TRIANGLE.replace("3 0 1 2 7\n", "");
        assert!(parse_ply(text.as_bytes()).is_err());
        assert!(parse_ply(b"not a ply").is_err());
    }
}
