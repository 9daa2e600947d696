use serde::{Deserialize, Serialize};

use super::point::BoundingVolume;

/// Layout flags of a point data record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFormat {
    pub id: u8,
    pub has_gps_time: bool,
    pub has_color: bool,
    pub has_nir: bool,
    pub has_waveform: bool,
    pub is_extended: bool,
}

impl PointFormat {
    /// Flags as defined for the LAS 1.4 point data record formats 0 to 10.
    /// Unknown ids get no optional fields; the orchestrator rejects them.
    pub fn from_id(id: u8) -> Self {
        PointFormat {
            id,
            has_gps_time: matches!(id, 1 | 3..=10),
            has_color: matches!(id, 2 | 3 | 5 | 7 | 8 | 10),
            has_nir: matches!(id, 8 | 10),
            has_waveform: matches!(id, 4 | 5 | 9 | 10),
            is_extended: id >= 6,
        }
    }
}

impl Default for PointFormat {
    fn default() -> Self {
        Self::from_id(0)
    }
}

/// One entry of the extra-bytes description, as declared by the source.
///
/// `no_data`, `min` and `max` hold the raw (pre-scale) value of the first
/// element, widened to `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraBytesEntry {
    pub data_type: u8,
    pub options: u8,
    pub name: String,
    pub description: String,
    pub no_data: f64,
    pub min: f64,
    pub max: f64,
    pub scale: f64,
    pub offset: f64,
}

impl Default for ExtraBytesEntry {
    fn default() -> Self {
        ExtraBytesEntry {
            data_type: 0,
            options: 0,
            name: String::new(),
            description: String::new(),
            no_data: 0.0,
            min: 0.0,
            max: 0.0,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl ExtraBytesEntry {
    /// Number of bytes the entry occupies in a point record.
    ///
    /// Type 0 is an opaque run of `options` bytes. Types 1 to 30 are scalars
    /// or 2/3 element arrays of the ten base types.
    pub fn record_size(&self) -> Option<usize> {
        match self.data_type {
            0 => Some(self.options as usize),
            1..=30 => {
                let base = (self.data_type - 1) % 10;
                let dimension = (self.data_type - 1) / 10 + 1;
                let size = match base {
                    0 | 1 => 1,
                    2 | 3 => 2,
                    4 | 5 | 8 => 4,
                    _ => 8,
                };
                Some(size * dimension as usize)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSchema {
    pub format: PointFormat,
    pub number_of_points: u64,
    pub bounding_volume: BoundingVolume,
    pub extra_bytes: Vec<ExtraBytesEntry>,
}

impl PointSchema {
    pub fn number_attributes(&self) -> usize {
        self.extra_bytes.len()
    }

    /// Start of attribute `id` inside a point's extra-byte region.
    pub fn attribute_byte_offset(&self, id: usize) -> Option<usize> {
        if id >= self.extra_bytes.len() {
            return None;
        }
        self.extra_bytes[..id]
            .iter()
            .try_fold(0usize, |acc, entry| Some(acc + entry.record_size()?))
    }

    /// Total size of the extra-byte region, if every entry has a known size.
    pub fn extra_bytes_len(&self) -> Option<usize> {
        self.extra_bytes
            .iter()
            .try_fold(0usize, |acc, entry| Some(acc + entry.record_size()?))
    }
}
