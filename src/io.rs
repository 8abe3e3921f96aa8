//! On-disk formats used by the pipeline.
//!
//! * `.npy` — precomputed ROI time series (read), plus a writer used to
//!   produce fixtures.
//! * safetensors — connectivity matrices and per-subject records.
//! * JSON — the valid-subject hand-off between the two stages.
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use ndarray::{Array2, ArrayD, IxDyn, ShapeBuilder};

use crate::error::{Error, Result};

// ── NPY ───────────────────────────────────────────────────────────────────────

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Value of `key` in a numpy header dict (`{'descr': '<f8', ...}`), as raw text
/// up to the next top-level comma.
fn npy_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{key}'"))? + key.len() + 2;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find([',', '}']).unwrap_or(rest.len())
    };
    Some(rest[..end].trim())
}

/// Read a 2-D `.npy` array of `f4` or `f8` into `f64`.
///
/// Both C and Fortran order are accepted; the returned array is always in
/// logical `[rows, cols]` order of the stored shape.
pub fn read_npy(path: &Path) -> Result<Array2<f64>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(Error::format(path, "not an npy file"));
    }
    let (hlen, hstart) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(Error::format(path, format!("unsupported npy version {v}"))),
    };
    let data_start = hstart + hlen;
    if bytes.len() < data_start {
        return Err(Error::format(path, "truncated npy header"));
    }
    let header = std::str::from_utf8(&bytes[hstart..data_start])
        .map_err(|_| Error::format(path, "npy header is not utf-8"))?;

    let descr = npy_field(header, "descr")
        .map(|d| d.trim_matches(['\'', '"']))
        .ok_or_else(|| Error::format(path, "npy header missing 'descr'"))?;
    let fortran = match npy_field(header, "fortran_order") {
        Some("True") => true,
        Some("False") => false,
        _ => return Err(Error::format(path, "npy header missing 'fortran_order'")),
    };
    let shape: Vec<usize> = npy_field(header, "shape")
        .ok_or_else(|| Error::format(path, "npy header missing 'shape'"))?
        .trim_matches(['(', ')'])
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::format(path, "bad npy shape"))?;
    let [rows, cols] = shape[..] else {
        return Err(Error::format(path, format!("expected 2-D array, got shape {shape:?}")));
    };

    let raw = &bytes[data_start..];
    let width = match descr {
        "<f8" => 8,
        "<f4" => 4,
        other => return Err(Error::format(path, format!("unsupported npy dtype {other}"))),
    };
    let n = rows
        .checked_mul(cols)
        .filter(|n| n.checked_mul(width).is_some_and(|len| len <= raw.len()))
        .ok_or_else(|| Error::format(path, format!("truncated npy data for shape {shape:?}")))?;
    let values: Vec<f64> = match descr {
        "<f8" => raw
            .chunks_exact(8)
            .take(n)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        _ => raw
            .chunks_exact(4)
            .take(n)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
    };

    let arr = if fortran {
        Array2::from_shape_vec((rows, cols).f(), values)?
    } else {
        Array2::from_shape_vec((rows, cols), values)?
    };
    Ok(arr)
}

/// Write a 2-D `f64` array as a version 1.0 C-order `.npy` file.
pub fn write_npy(path: &Path, arr: &Array2<f64>) -> Result<()> {
    let (rows, cols) = arr.dim();
    let dict = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {cols}), }}");
    // magic(6) + version(2) + len(2) + dict + '\n' must be a multiple of 64.
    let unpadded = 10 + dict.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    let header = format!("{dict}{}\n", " ".repeat(pad));

    let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
    f.write_all(NPY_MAGIC)?;
    f.write_all(&[1, 0])?;
    f.write_all(&(header.len() as u16).to_le_bytes())?;
    f.write_all(header.as_bytes())?;
    for v in arr.iter() {
        f.write_all(&v.to_le_bytes())?;
    }
    f.flush()?;
    Ok(())
}

// ── Safetensors writer ────────────────────────────────────────────────────────

/// Simple safetensors file writer for F64 tensors with optional
/// string metadata.
///
/// ```rust,no_run
/// use fcprep::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("connectivity", &[1.0, 0.2, 0.2, 1.0], &[2, 2]);
/// w.add_metadata("subject", "0010001");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: Vec<(String, String)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    /// Row-major copy of `arr`, whatever its memory layout.
    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.push((key.to_string(), value.to_string()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header_map = serde_json::Map::new();
        if !self.metadata.is_empty() {
            let meta: serde_json::Map<String, serde_json::Value> = self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            header_map.insert("__metadata__".into(), serde_json::Value::Object(meta));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        f.flush()?;
        Ok(())
    }
}

// ── Safetensors reader ────────────────────────────────────────────────────────

/// Every numeric tensor of a safetensors file, widened to `f64`.
#[derive(Debug, Clone, Default)]
pub struct StFile {
    pub tensors: HashMap<String, ArrayD<f64>>,
    pub metadata: HashMap<String, String>,
}

impl StFile {
    /// Parse a safetensors file. Handles F64, F32, I32 and I64.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < 8 {
            return Err(Error::format(path, "safetensors file too small"));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let data_start = usize::try_from(u64::from_le_bytes(len))
            .ok()
            .and_then(|n| n.checked_add(8))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| Error::format(path, "truncated safetensors header"))?;
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..data_start])?;
        let data = &bytes[data_start..];

        let mut out = StFile::default();
        for (key, val) in &header {
            if key == "__metadata__" {
                if let Some(meta) = val.as_object() {
                    for (k, v) in meta {
                        if let Some(s) = v.as_str() {
                            out.metadata.insert(k.clone(), s.to_string());
                        }
                    }
                }
                continue;
            }
            let bad = || Error::format(path, format!("malformed entry for tensor '{key}'"));
            let dtype = val["dtype"].as_str().ok_or_else(bad)?;
            let offsets = val["data_offsets"].as_array().ok_or_else(bad)?;
            let (s, e) = match offsets.as_slice() {
                [s, e] => (
                    s.as_u64().ok_or_else(bad)? as usize,
                    e.as_u64().ok_or_else(bad)? as usize,
                ),
                _ => return Err(bad()),
            };
            if s > e || e > data.len() {
                return Err(bad());
            }
            let shape: Vec<usize> = val["shape"]
                .as_array()
                .ok_or_else(bad)?
                .iter()
                .map(|v| v.as_u64().map(|x| x as usize).ok_or_else(bad))
                .collect::<Result<_>>()?;

            let raw = &data[s..e];
            let vals: Vec<f64> = match dtype {
                "F64" => raw.chunks_exact(8)
                    .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                    .collect(),
                "F32" => raw.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                    .collect(),
                "I32" => raw.chunks_exact(4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                    .collect(),
                "I64" => raw.chunks_exact(8)
                    .map(|b| {
                        i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64
                    })
                    .collect(),
                other => {
                    let msg = format!("unsupported dtype {other} for '{key}'");
                    return Err(Error::format(path, msg));
                }
            };
            let arr = ArrayD::from_shape_vec(IxDyn(&shape), vals)?;
            out.tensors.insert(key.clone(), arr);
        }
        Ok(out)
    }

    /// Tensor `name` as a 2-D array, `None` if absent.
    pub fn get_arr2(&self, name: &str) -> Result<Option<Array2<f64>>> {
        match self.tensors.get(name) {
            Some(t) => Ok(Some(t.clone().into_dimensionality()?)),
            None => Ok(None),
        }
    }
}

// ── Valid-subject hand-off ────────────────────────────────────────────────────

/// Persist the filtered subject list produced by the fetch stage.
pub fn write_subject_list(path: &Path, subjects: &[String]) -> Result<()> {
    let f = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(f, subjects)?;
    Ok(())
}

/// Read the list written by [`write_subject_list`].
pub fn read_subject_list(path: &Path) -> Result<Vec<String>> {
    let f = std::io::BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(f)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn npy_header_is_64_byte_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.npy");
        write_npy(&p, &Array2::zeros((3, 5))).unwrap();
        let bytes = std::fs::read(&p).unwrap();
        let hlen = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + hlen) % 64, 0);
        assert_eq!(bytes.len(), 10 + hlen + 15 * 8);
    }

    #[test]
    fn npy_reads_back_values() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.npy");
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        write_npy(&p, &a).unwrap();
        assert_eq!(read_npy(&p).unwrap(), a);
    }

    #[test]
    fn npy_fortran_f4() {
        // Hand-built Fortran-order float32 file: logical [[1, 2], [3, 4]].
        let dict = "{'descr': '<f4', 'fortran_order': True, 'shape': (2, 2), }";
        let mut header = dict.to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for v in [1.0f32, 3.0, 2.0, 4.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f.npy");
        std::fs::write(&p, bytes).unwrap();
        assert_eq!(read_npy(&p).unwrap(), array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn npy_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("g.npy");
        std::fs::write(&p, b"definitely not numpy").unwrap();
        assert!(matches!(read_npy(&p), Err(Error::Format { .. })));
    }

    #[test]
    fn safetensors_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t.safetensors");
        let mut w = StWriter::new();
        w.add_f64_arr2("m", &array![[1.0, -0.5], [-0.5, 1.0]]);
        w.add_metadata("subject", "s1");
        w.write(&p).unwrap();

        let f = StFile::load(&p).unwrap();
        assert_eq!(f.metadata.get("subject").map(String::as_str), Some("s1"));
        assert_eq!(f.get_arr2("m").unwrap().unwrap(), array![[1.0, -0.5], [-0.5, 1.0]]);
        assert!(f.get_arr2("missing").unwrap().is_none());
    }

    #[test]
    fn npy_oversized_shape_is_a_format_error() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (4294967296, 4294967296), }";
        let mut header = dict.to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("huge.npy");
        std::fs::write(&p, bytes).unwrap();
        assert!(matches!(read_npy(&p), Err(Error::Format { .. })));
    }

    #[test]
    fn safetensors_header_length_overflow_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("corrupt.safetensors");
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        std::fs::write(&p, bytes).unwrap();
        assert!(matches!(StFile::load(&p), Err(Error::Format { .. })));

        std::fs::write(&p, 64u64.to_le_bytes()).unwrap();
        assert!(matches!(StFile::load(&p), Err(Error::Format { .. })));
    }

    #[test]
    fn subject_list_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("valid_subject_list.json");
        let subjects = vec!["A".to_string(), "C".to_string()];
        write_subject_list(&p, &subjects).unwrap();
        assert_eq!(read_subject_list(&p).unwrap(), subjects);
    }
}
