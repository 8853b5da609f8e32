//! MetaImage (`.mha`/`.mhd`) volume codec.
//!
//! Reads and writes the ITK MetaImage format: an ASCII `Key = Value` header
//! followed by a raw little-endian voxel payload, either embedded in the
//! same file (`ElementDataFile = LOCAL`, the `.mha` layout) or in a sibling
//! raw file named by the header (the `.mhd` layout).
//!
//! The header lists dimensions, spacing, offset, and direction cosines in
//! x-fastest order and in the LPS world convention, while the in-memory
//! [`Volume`] stores `[D, H, W]` arrays with RAS-world geometry. The codec
//! reverses the axis order and negates the first two world components in
//! both directions of the conversion.

use crate::core::errors::SegError;
use crate::core::traits::VolumeCodec;
use crate::domain::geometry::{Affine, Geometry, axcodes_from_directions};
use crate::domain::volume::{LabelVolume, Volume};
use ndarray::Array4;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Codec for MetaImage volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaImageCodec;

impl MetaImageCodec {
    /// Creates a new MetaImageCodec.
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementType {
    UChar,
    Char,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ElementType {
    fn parse(s: &str) -> Result<Self, SegError> {
        match s {
            "MET_UCHAR" => Ok(Self::UChar),
            "MET_CHAR" => Ok(Self::Char),
            "MET_SHORT" => Ok(Self::Short),
            "MET_USHORT" => Ok(Self::UShort),
            "MET_INT" => Ok(Self::Int),
            "MET_UINT" => Ok(Self::UInt),
            "MET_FLOAT" => Ok(Self::Float),
            "MET_DOUBLE" => Ok(Self::Double),
            other => Err(SegError::invalid_input(format!(
                "unsupported MetaImage ElementType '{other}'"
            ))),
        }
    }

    fn byte_width(self) -> usize {
        match self {
            Self::UChar | Self::Char => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    fn decode_f32(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            Self::UChar => bytes.iter().map(|&b| b as f32).collect(),
            Self::Char => bytes.iter().map(|&b| b as i8 as f32).collect(),
            Self::Short => chunks::<2>(bytes)
                .map(|c| i16::from_le_bytes(c) as f32)
                .collect(),
            Self::UShort => chunks::<2>(bytes)
                .map(|c| u16::from_le_bytes(c) as f32)
                .collect(),
            Self::Int => chunks::<4>(bytes)
                .map(|c| i32::from_le_bytes(c) as f32)
                .collect(),
            Self::UInt => chunks::<4>(bytes)
                .map(|c| u32::from_le_bytes(c) as f32)
                .collect(),
            Self::Float => chunks::<4>(bytes).map(f32::from_le_bytes).collect(),
            Self::Double => chunks::<8>(bytes)
                .map(|c| f64::from_le_bytes(c) as f32)
                .collect(),
        }
    }
}

fn chunks<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    bytes.chunks_exact(N).map(|c| {
        let mut buf = [0u8; N];
        buf.copy_from_slice(c);
        buf
    })
}

struct Header {
    dim_size: [usize; 3],
    spacing_xyz: [f64; 3],
    offset_xyz: [f64; 3],
    // Row i is the LPS direction of header axis i.
    directions_xyz: [[f64; 3]; 3],
    element_type: ElementType,
    data_file: String,
    data_offset: usize,
}

fn parse_header(raw: &[u8], path: &Path) -> Result<Header, SegError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut cursor = 0usize;
    let mut data_offset = raw.len();
    while cursor < raw.len() {
        let end = raw[cursor..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| cursor + p)
            .unwrap_or(raw.len());
        let line = std::str::from_utf8(&raw[cursor..end]).map_err(|_| {
            SegError::invalid_input(format!(
                "{}: MetaImage header contains non-ASCII bytes",
                path.display()
            ))
        })?;
        cursor = end + 1;
        let Some((key, value)) = line.split_once('=') else {
            break;
        };
        let key = key.trim().to_string();
        let done = key == "ElementDataFile";
        fields.insert(key, value.trim().to_string());
        if done {
            data_offset = cursor.min(raw.len());
            break;
        }
    }

    let field = |key: &str| {
        fields.get(key).cloned().ok_or_else(|| {
            SegError::invalid_input(format!(
                "{}: MetaImage header missing '{key}'",
                path.display()
            ))
        })
    };

    let ndims: usize = parse_scalar(&field("NDims")?, "NDims")?;
    if ndims != 3 {
        return Err(SegError::invalid_input(format!(
            "{}: expected a 3-dimensional MetaImage, got NDims = {ndims}",
            path.display()
        )));
    }
    if let Some(msb) = fields.get("BinaryDataByteOrderMSB") {
        if msb.eq_ignore_ascii_case("true") {
            return Err(SegError::invalid_input(format!(
                "{}: big-endian MetaImage payloads are not supported",
                path.display()
            )));
        }
    }
    if let Some(compressed) = fields.get("CompressedData") {
        if compressed.eq_ignore_ascii_case("true") {
            return Err(SegError::invalid_input(format!(
                "{}: compressed MetaImage payloads are not supported",
                path.display()
            )));
        }
    }
    if let Some(channels) = fields.get("ElementNumberOfChannels") {
        let channels: usize = parse_scalar(channels, "ElementNumberOfChannels")?;
        if channels != 1 {
            return Err(SegError::invalid_input(format!(
                "{}: only single-channel MetaImage volumes are supported, got {channels}",
                path.display()
            )));
        }
    }

    let dim: Vec<usize> = parse_list(&field("DimSize")?, 3, "DimSize")?;
    let spacing: Vec<f64> = match fields.get("ElementSpacing") {
        Some(v) => parse_list(v, 3, "ElementSpacing")?,
        None => vec![1.0, 1.0, 1.0],
    };
    let offset: Vec<f64> = match fields.get("Offset") {
        Some(v) => parse_list(v, 3, "Offset")?,
        None => vec![0.0, 0.0, 0.0],
    };
    let matrix: Vec<f64> = match fields.get("TransformMatrix") {
        Some(v) => parse_list(v, 9, "TransformMatrix")?,
        None => vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };
    let mut directions_xyz = [[0.0; 3]; 3];
    for i in 0..3 {
        for c in 0..3 {
            directions_xyz[i][c] = matrix[i * 3 + c];
        }
    }

    Ok(Header {
        dim_size: [dim[0], dim[1], dim[2]],
        spacing_xyz: [spacing[0], spacing[1], spacing[2]],
        offset_xyz: [offset[0], offset[1], offset[2]],
        directions_xyz,
        element_type: ElementType::parse(&field("ElementType")?)?,
        data_file: field("ElementDataFile")?,
        data_offset,
    })
}

fn parse_scalar<T: FromStr>(value: &str, key: &str) -> Result<T, SegError> {
    value
        .parse()
        .map_err(|_| SegError::invalid_input(format!("malformed MetaImage field '{key} = {value}'")))
}

fn parse_list<T: FromStr>(value: &str, n: usize, key: &str) -> Result<Vec<T>, SegError> {
    let parsed: Result<Vec<T>, _> = value.split_whitespace().map(str::parse).collect();
    match parsed {
        Ok(items) if items.len() == n => Ok(items),
        _ => Err(SegError::invalid_input(format!(
            "MetaImage field '{key} = {value}' must hold {n} numbers"
        ))),
    }
}

/// LPS world coordinates to RAS and back (the map is its own inverse).
fn lps_ras(v: [f64; 3]) -> [f64; 3] {
    [-v[0], -v[1], v[2]]
}

fn geometry_from_header(header: &Header) -> Result<Geometry, SegError> {
    // Header axes are x, y, z fastest-first; array axes [D, H, W] are the
    // reverse, so array axis j corresponds to header axis 2 - j.
    let mut spacing = [0.0; 3];
    let mut columns = [[0.0; 3]; 3];
    for j in 0..3 {
        let i = 2 - j;
        spacing[j] = header.spacing_xyz[i];
        let dir = lps_ras(header.directions_xyz[i]);
        columns[j] = [
            dir[0] * spacing[j],
            dir[1] * spacing[j],
            dir[2] * spacing[j],
        ];
    }
    let mut affine = Affine::identity();
    for (j, col) in columns.iter().enumerate() {
        affine.set_column(j, *col);
    }
    affine.set_origin(lps_ras(header.offset_xyz));
    Geometry::new(spacing, axcodes_from_directions(&columns), affine)
}

fn header_lines(geometry: &Geometry, shape: [usize; 3], element_type: &str) -> Vec<String> {
    let mut matrix = [0.0; 9];
    for i in 0..3 {
        let j = 2 - i;
        let col = geometry.affine.column(j);
        let dir = lps_ras([
            col[0] / geometry.spacing[j],
            col[1] / geometry.spacing[j],
            col[2] / geometry.spacing[j],
        ]);
        matrix[i * 3..i * 3 + 3].copy_from_slice(&dir);
    }
    let offset = lps_ras(geometry.affine.origin());
    vec![
        "ObjectType = Image".to_string(),
        "NDims = 3".to_string(),
        "BinaryData = True".to_string(),
        "BinaryDataByteOrderMSB = False".to_string(),
        "CompressedData = False".to_string(),
        format!(
            "TransformMatrix = {}",
            matrix.map(|v| v.to_string()).join(" ")
        ),
        format!("Offset = {} {} {}", offset[0], offset[1], offset[2]),
        format!(
            "ElementSpacing = {} {} {}",
            geometry.spacing[2], geometry.spacing[1], geometry.spacing[0]
        ),
        format!("DimSize = {} {} {}", shape[2], shape[1], shape[0]),
        format!("ElementType = {element_type}"),
    ]
}

fn write_volume_bytes(
    path: &Path,
    geometry: &Geometry,
    shape: [usize; 3],
    element_type: &str,
    payload: &[u8],
) -> Result<(), SegError> {
    let mut lines = header_lines(geometry, shape, element_type);
    let external = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("mhd"))
        .unwrap_or(false);
    if external {
        let raw_name = path
            .with_extension("raw")
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SegError::invalid_input(format!("cannot derive raw file name from {}", path.display()))
            })?;
        lines.push(format!("ElementDataFile = {raw_name}"));
        fs::write(path, lines.join("\n") + "\n")?;
        fs::write(path.with_extension("raw"), payload)?;
    } else {
        lines.push("ElementDataFile = LOCAL".to_string());
        let mut file = fs::File::create(path)?;
        file.write_all((lines.join("\n") + "\n").as_bytes())?;
        file.write_all(payload)?;
    }
    Ok(())
}

impl VolumeCodec for MetaImageCodec {
    type Error = SegError;

    fn read(&self, path: &Path) -> Result<Volume, SegError> {
        let raw = fs::read(path)?;
        let header = parse_header(&raw, path)?;

        let payload = if header.data_file == "LOCAL" {
            raw[header.data_offset..].to_vec()
        } else {
            let sibling = path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&header.data_file);
            fs::read(sibling)?
        };

        let [nx, ny, nz] = header.dim_size;
        let voxels = nx * ny * nz;
        let expected = voxels * header.element_type.byte_width();
        if payload.len() < expected {
            return Err(SegError::invalid_input(format!(
                "{}: payload holds {} bytes, header promises {expected}",
                path.display(),
                payload.len()
            )));
        }
        let samples = header.element_type.decode_f32(&payload[..expected]);

        // x-fastest payload order matches row-major [z, y, x].
        let data = Array4::from_shape_vec((1, nz, ny, nx), samples)?;
        let geometry = geometry_from_header(&header)?;
        debug!(
            path = %path.display(),
            shape = ?[nz, ny, nx],
            spacing = ?geometry.spacing,
            "read MetaImage volume"
        );
        Volume::new(data, geometry)
    }

    fn write(&self, volume: &Volume, path: &Path) -> Result<(), SegError> {
        if volume.channels() != 1 {
            return Err(SegError::invalid_input(format!(
                "MetaImage output requires a single channel, volume has {}",
                volume.channels()
            )));
        }
        let mut payload = Vec::with_capacity(volume.data.len() * 4);
        for &v in volume.data.iter() {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        write_volume_bytes(
            path,
            &volume.geometry,
            volume.spatial_shape(),
            "MET_FLOAT",
            &payload,
        )
    }

    fn write_labels(&self, labels: &LabelVolume, path: &Path) -> Result<(), SegError> {
        let mut payload = Vec::with_capacity(labels.data.len() * 4);
        for &v in labels.data.iter() {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        write_volume_bytes(
            path,
            &labels.geometry,
            labels.spatial_shape(),
            "MET_UINT",
            &payload,
        )
    }
}
