use std::io;

use byteorder::{ByteOrder as _, LittleEndian};
use pcd_core::pointcloud::schema::ExtraBytesEntry;

pub const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;
pub const DESCRIPTOR_LEN: usize = 192;

const NAME: std::ops::Range<usize> = 4..36;
const NO_DATA: usize = 40;
const MIN: usize = 64;
const MAX: usize = 88;
const SCALE: usize = 112;
const OFFSET: usize = 136;
const DESCRIPTION: std::ops::Range<usize> = 160..192;

#[derive(Clone, Copy)]
enum Kind {
    Unsigned,
    Signed,
    Float,
}

fn kind(data_type: u8) -> Kind {
    if data_type == 0 || data_type > 30 {
        return Kind::Unsigned;
    }
    match (data_type - 1) % 10 {
        0 | 2 | 4 | 6 => Kind::Unsigned,
        1 | 3 | 5 | 7 => Kind::Signed,
        _ => Kind::Float,
    }
}

// no_data, min and max are stored in the attribute's own type, widened to 8 bytes
fn read_any(bytes: &[u8], kind: Kind) -> f64 {
    match kind {
        Kind::Unsigned => LittleEndian::read_u64(bytes) as f64,
        Kind::Signed => LittleEndian::read_i64(bytes) as f64,
        Kind::Float => LittleEndian::read_f64(bytes),
    }
}

fn write_any(bytes: &mut [u8], value: f64, kind: Kind) {
    match kind {
        Kind::Unsigned => LittleEndian::write_u64(bytes, value as u64),
        Kind::Signed => LittleEndian::write_i64(bytes, value as i64),
        Kind::Float => LittleEndian::write_f64(bytes, value),
    }
}

fn read_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

fn write_string(bytes: &mut [u8], value: &str) {
    let src = value.as_bytes();
    // keep a terminating NUL
    let n = src.len().min(bytes.len() - 1);
    bytes[..n].copy_from_slice(&src[..n]);
}

/// Parses the payload of an Extra Bytes VLR into its description entries.
pub fn parse_extra_bytes(data: &[u8]) -> io::Result<Vec<ExtraBytesEntry>> {
    if data.len() % DESCRIPTOR_LEN != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Extra Bytes record of {} bytes is not a multiple of {}",
                data.len(),
                DESCRIPTOR_LEN
            ),
        ));
    }

    let entries = data
        .chunks_exact(DESCRIPTOR_LEN)
        .map(|d| {
            let data_type = d[2];
            let kind = kind(data_type);
            ExtraBytesEntry {
                data_type,
                options: d[3],
                name: read_string(&d[NAME]),
                description: read_string(&d[DESCRIPTION]),
                no_data: read_any(&d[NO_DATA..NO_DATA + 8], kind),
                min: read_any(&d[MIN..MIN + 8], kind),
                max: read_any(&d[MAX..MAX + 8], kind),
                scale: LittleEndian::read_f64(&d[SCALE..SCALE + 8]),
                offset: LittleEndian::read_f64(&d[OFFSET..OFFSET + 8]),
            }
        })
        .collect();

    Ok(entries)
}

/// Serializes description entries into an Extra Bytes VLR payload.
pub fn serialize_extra_bytes(entries: &[ExtraBytesEntry]) -> Vec<u8> {
    let mut data = vec![0u8; entries.len() * DESCRIPTOR_LEN];

    for (entry, d) in entries.iter().zip(data.chunks_exact_mut(DESCRIPTOR_LEN)) {
        let kind = kind(entry.data_type);
        d[2] = entry.data_type;
        d[3] = entry.options;
        write_string(&mut d[NAME], &entry.name);
        write_string(&mut d[DESCRIPTION], &entry.description);
        write_any(&mut d[NO_DATA..NO_DATA + 8], entry.no_data, kind);
        write_any(&mut d[MIN..MIN + 8], entry.min, kind);
        write_any(&mut d[MAX..MAX + 8], entry.max, kind);
        LittleEndian::write_f64(&mut d[SCALE..SCALE + 8], entry.scale);
        LittleEndian::write_f64(&mut d[OFFSET..OFFSET + 8], entry.offset);
    }

    data
}
