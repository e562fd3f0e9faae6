//! Native .sabha binary format for historical buckets.
//!
//! One file per (day, hour) bucket, named `{day}_{hour}.sabha`.
//!
//! Format:
//! - Header:
//!   - Magic: "SABHA" (5 bytes)
//!   - Version: u8
//!   - Day: u8, Hour: u8
//!   - Layer count: u8
//! - Per layer:
//!   - Kind tag: u8
//!   - Overlay count: u32 (little-endian, as are all multi-byte values)
//!   - Per overlay:
//!     - Floor id: u16 length + UTF-8 bytes
//!     - Rows: u32, Cols: u32
//!     - Height: f64, Width: f64 (meters)
//!     - Exposure: u32
//!     - Indoor mask: rows*cols bytes (0/1)
//!     - Masked frames: exposure * rows * cols f32
//!     - Unmasked frames: exposure * rows * cols f32
//!     - Unfixed counts: exposure f32
//!     - Sample count: u32
//!
//! Raw little-endian f32 keeps the round-trip exact.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::DenseGrid;
use crate::overlay::{Layer, LayerKind, Overlay};

use super::{TimeKey, TimeSlotAverage};

/// Magic bytes for .sabha files
const MAGIC: &[u8; 5] = b"SABHA";

/// Current format version
pub const FORMAT_VERSION: u8 = 1;

/// Bucket persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },
}

/// Directory-backed store of historical buckets.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory the store persists into
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing one bucket.
    pub fn bucket_path(&self, key: TimeKey) -> PathBuf {
        self.dir.join(format!("{}_{}.sabha", key.day, key.hour))
    }

    /// Persist a bucket, replacing any previous file for its key.
    pub fn save(&self, bucket: &TimeSlotAverage) -> Result<(), StoreError> {
        let file = File::create(self.bucket_path(bucket.key()))?;
        let mut writer = BufWriter::new(file);
        write_bucket(bucket, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load the bucket for `key`; `None` when no file exists yet.
    pub fn load(&self, key: TimeKey) -> Result<Option<TimeSlotAverage>, StoreError> {
        let path = self.bucket_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = BufReader::new(File::open(&path)?);
        read_bucket(&mut reader, &path).map(Some)
    }
}

fn write_bucket<W: Write>(bucket: &TimeSlotAverage, w: &mut W) -> Result<(), StoreError> {
    w.write_all(MAGIC)?;
    w.write_all(&[FORMAT_VERSION, bucket.key().day, bucket.key().hour])?;

    let layers = bucket.layers();
    w.write_all(&[layers.len() as u8])?;
    for (kind, layer) in layers {
        w.write_all(&[kind.as_u8()])?;
        let counts = bucket.counts().get(kind);

        let ids: Vec<&str> = layer.floor_ids().collect();
        w.write_all(&(ids.len() as u32).to_le_bytes())?;
        for id in ids {
            let overlay = layer
                .overlay(id)
                .ok_or_else(|| StoreError::InvalidFormat(format!("missing overlay {id}")))?;
            let count = counts.and_then(|c| c.get(id)).copied().unwrap_or(0);
            write_overlay(id, overlay, count, w)?;
        }
    }
    Ok(())
}

fn write_overlay<W: Write>(
    floor_id: &str,
    overlay: &Overlay,
    count: u32,
    w: &mut W,
) -> Result<(), StoreError> {
    w.write_all(&(floor_id.len() as u16).to_le_bytes())?;
    w.write_all(floor_id.as_bytes())?;

    let (rows, cols) = overlay.grid_shape();
    let (height, width) = overlay.physical_shape();
    w.write_all(&(rows as u32).to_le_bytes())?;
    w.write_all(&(cols as u32).to_le_bytes())?;
    w.write_all(&height.to_le_bytes())?;
    w.write_all(&width.to_le_bytes())?;
    w.write_all(&(overlay.exposure() as u32).to_le_bytes())?;

    let mask_bytes: Vec<u8> = overlay.indoor_mask().iter().map(|b| *b as u8).collect();
    w.write_all(&mask_bytes)?;

    let (masked, unmasked, unfixed) = overlay.frames();
    for frame in masked.iter().chain(unmasked.iter()) {
        for v in frame.iter() {
            w.write_all(&v.to_le_bytes())?;
        }
    }
    for v in unfixed {
        w.write_all(&v.to_le_bytes())?;
    }
    w.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn read_bucket<R: Read>(r: &mut R, path: &Path) -> Result<TimeSlotAverage, StoreError> {
    let mut magic = [0u8; 5];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(StoreError::InvalidFormat(format!(
            "{} is not a .sabha file",
            path.display()
        )));
    }
    let mut head = [0u8; 3];
    r.read_exact(&mut head)?;
    let [version, day, hour] = head;
    if version != FORMAT_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: version,
        });
    }
    let key = TimeKey::new(day, hour)
        .map_err(|_| StoreError::InvalidFormat(format!("bad time slot {day}_{hour}")))?;

    let layer_count = read_u8(r)?;
    let mut layers = HashMap::new();
    let mut counts: HashMap<LayerKind, HashMap<String, u32>> = HashMap::new();
    for _ in 0..layer_count {
        let tag = read_u8(r)?;
        let kind = LayerKind::from_u8(tag)
            .ok_or_else(|| StoreError::InvalidFormat(format!("unknown layer tag {tag}")))?;

        let overlay_count = read_u32(r)?;
        let mut overlays = HashMap::with_capacity(overlay_count as usize);
        let mut layer_counts = HashMap::with_capacity(overlay_count as usize);
        let mut exposure = 1;
        for _ in 0..overlay_count {
            let (id, overlay, count) = read_overlay(r)?;
            exposure = overlay.exposure();
            layer_counts.insert(id.clone(), count);
            overlays.insert(id, overlay);
        }
        layers.insert(kind, Layer::from_overlays(exposure, overlays));
        counts.insert(kind, layer_counts);
    }
    Ok(TimeSlotAverage::from_parts(key, layers, counts))
}

fn read_overlay<R: Read>(r: &mut R) -> Result<(String, Overlay, u32), StoreError> {
    let id_len = read_u16(r)? as usize;
    let mut id_bytes = vec![0u8; id_len];
    r.read_exact(&mut id_bytes)?;
    let floor_id = String::from_utf8(id_bytes)
        .map_err(|_| StoreError::InvalidFormat("floor id is not UTF-8".into()))?;

    let rows = read_u32(r)? as usize;
    let cols = read_u32(r)? as usize;
    let height = read_f64(r)?;
    let width = read_f64(r)?;
    let exposure = read_u32(r)? as usize;
    if exposure == 0 {
        return Err(StoreError::InvalidFormat(format!(
            "overlay {floor_id} has zero exposure"
        )));
    }

    let mut mask_bytes = vec![0u8; rows * cols];
    r.read_exact(&mut mask_bytes)?;
    let mut indoor = DenseGrid::<bool>::new(rows, cols);
    for (slot, byte) in indoor.as_mut_slice().iter_mut().zip(mask_bytes.iter()) {
        *slot = *byte != 0;
    }

    let read_frames = |r: &mut R| -> Result<Vec<DenseGrid<f32>>, StoreError> {
        let mut frames = Vec::with_capacity(exposure);
        for _ in 0..exposure {
            let mut frame = DenseGrid::<f32>::new(rows, cols);
            for slot in frame.as_mut_slice() {
                *slot = read_f32(r)?;
            }
            frames.push(frame);
        }
        Ok(frames)
    };
    let masked = read_frames(r)?;
    let unmasked = read_frames(r)?;
    let mut unfixed = vec![0.0f32; exposure];
    for slot in &mut unfixed {
        *slot = read_f32(r)?;
    }
    let count = read_u32(r)?;

    let mut overlay =
        Overlay::from_geometry(floor_id.clone(), rows, cols, height, width, indoor, exposure)
            .map_err(|e| StoreError::InvalidFormat(e.to_string()))?;
    overlay
        .set_frames(masked, unmasked, unfixed)
        .map_err(|e| StoreError::InvalidFormat(e.to_string()))?;
    Ok((floor_id, overlay, count))
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, StoreError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R) -> Result<u16, StoreError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, StoreError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, StoreError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64, StoreError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use approx::assert_relative_eq;

    use super::*;
    use crate::core::{GeoPoint, PlanPoint};
    use crate::overlay::Observation;
    use crate::plan::{Floor, FloorPlan};

    fn floors() -> HashMap<String, Floor> {
        let plan = FloorPlan::new(
            "fp_1",
            "Ground",
            GeoPoint::new(51.5, -0.1),
            6.0,
            8.0,
            GeoPoint::new(51.5005, -0.1005),
            GeoPoint::new(51.5005, -0.0995),
            300,
            400,
            "",
        )
        .unwrap();
        HashMap::from([("fp_1".to_string(), Floor::new(plan))])
    }

    #[test]
    fn bucket_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();

        let floors = floors();
        let mut layers =
            HashMap::from([(LayerKind::Wifi, Layer::new(&floors, 1).unwrap())]);
        let key = TimeKey::new(4, 17).unwrap();
        let mut bucket = TimeSlotAverage::new(&layers, key);

        let obs = vec![Observation::client_fix(
            "fp_1",
            PlanPoint::new(3.3, 2.2),
            1.7,
            "aa",
        )];
        layers
            .get_mut(&LayerKind::Wifi)
            .unwrap()
            .set_observations(&obs)
            .unwrap();
        bucket.update(&layers, key).unwrap();
        store.save(&bucket).unwrap();

        let loaded = store.load(key).unwrap().expect("bucket file exists");
        assert_eq!(loaded.key(), key);
        assert_eq!(loaded.sample_count(LayerKind::Wifi, "fp_1"), 1);

        let orig = bucket.floor_averages("fp_1")[&LayerKind::Wifi].get_delta(false, None);
        let back = loaded.floor_averages("fp_1")[&LayerKind::Wifi].get_delta(false, None);
        assert_eq!(orig.as_slice(), back.as_slice());
        assert_relative_eq!(back.sum(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn missing_bucket_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(store.load(TimeKey::new(0, 0).unwrap()).unwrap().is_none());
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();
        let key = TimeKey::new(1, 2).unwrap();
        std::fs::write(store.bucket_path(key), b"not a bucket at all").unwrap();
        assert!(matches!(
            store.load(key),
            Err(StoreError::InvalidFormat(_))
        ));
    }
}
