use std::{io, path::PathBuf};

use las::{point::ScanDirection, Header, Reader};
use pcd_core::pointcloud::{
    point::{BoundingVolume, Color, Point, PointAttributes},
    schema::{ExtraBytesEntry, PointFormat, PointSchema},
};

use super::PointReader;
use crate::extra_bytes::{parse_extra_bytes, EXTRA_BYTES_RECORD_ID, EXTRA_BYTES_USER_ID};

/// Reads one or more LAS/LAZ files as a single merged stream.
///
/// The schema (point format, extra bytes) comes from the first file; the point
/// count and bounds cover every file.
pub struct LasPointReader {
    pub files: Vec<PathBuf>,
    pub current_file_index: usize,
    pub current_reader: Option<Reader>,
    header: Header,
    schema: PointSchema,
}

impl LasPointReader {
    pub fn new(files: Vec<PathBuf>) -> io::Result<Self> {
        if files.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no input file given",
            ));
        }

        let mut first_header: Option<Header> = None;
        let mut number_of_points = 0;
        let mut bounding_volume = BoundingVolume::empty();

        for file in &files {
            let reader = Reader::from_path(file).map_err(|e| {
                io::Error::other(format!("cannot open {}: {}", file.display(), e))
            })?;
            let header = reader.header();
            number_of_points += header.number_of_points();
            let bounds = header.bounds();
            bounding_volume.extend(bounds.min.x, bounds.min.y, bounds.min.z);
            bounding_volume.extend(bounds.max.x, bounds.max.y, bounds.max.z);

            if first_header.is_none() {
                first_header = Some(header.clone());
            }
        }

        let header = first_header.ok_or_else(|| io::Error::other("no readable header"))?;
        let schema = PointSchema {
            format: convert_format(header.point_format())?,
            number_of_points,
            bounding_volume,
            extra_bytes: extra_bytes_entries(&header)?,
        };

        log::debug!(
            "opened {} file(s): format {}, {} points, {} extra bytes attribute(s)",
            files.len(),
            schema.format.id,
            schema.number_of_points,
            schema.extra_bytes.len()
        );

        Ok(Self {
            files,
            current_file_index: 0,
            current_reader: None,
            header,
            schema,
        })
    }

    /// Header of the first input file.
    pub fn header(&self) -> &Header {
        &self.header
    }

    fn open_next_file(&mut self) -> io::Result<()> {
        if self.current_file_index < self.files.len() {
            let file = &self.files[self.current_file_index];
            let reader = las::Reader::from_path(file).map_err(io::Error::other)?;
            self.current_reader = Some(reader);
            self.current_file_index += 1;
            Ok(())
        } else {
            self.current_reader = None;
            Ok(())
        }
    }

    fn convert_las_point(las_point: las::Point) -> Point {
        let color = las_point.color.map(|c| Color {
            r: c.red,
            g: c.green,
            b: c.blue,
        });

        let attributes = PointAttributes {
            intensity: las_point.intensity,
            return_number: las_point.return_number,
            number_of_returns: las_point.number_of_returns,
            scan_direction_flag: las_point.scan_direction == ScanDirection::LeftToRight,
            edge_of_flight_line: las_point.is_edge_of_flight_line,
            classification: u8::from(las_point.classification),
            synthetic: las_point.is_synthetic,
            key_point: las_point.is_key_point,
            withheld: las_point.is_withheld,
            overlap: las_point.is_overlap,
            scanner_channel: las_point.scanner_channel,
            scan_angle: las_point.scan_angle,
            user_data: las_point.user_data,
            point_source_id: las_point.point_source_id,
            gps_time: las_point.gps_time,
            nir: las_point.nir,
        };

        Point {
            x: las_point.x,
            y: las_point.y,
            z: las_point.z,
            color,
            attributes,
            extra_bytes: las_point.extra_bytes,
        }
    }
}

pub(crate) fn convert_format(format: &las::point::Format) -> io::Result<PointFormat> {
    let id = format.to_u8().map_err(io::Error::other)?;
    Ok(PointFormat {
        id,
        has_gps_time: format.has_gps_time,
        has_color: format.has_color,
        has_nir: format.has_nir,
        has_waveform: format.has_waveform,
        is_extended: format.is_extended,
    })
}

fn extra_bytes_entries(header: &Header) -> io::Result<Vec<ExtraBytesEntry>> {
    let vlr = header
        .vlrs()
        .iter()
        .chain(header.evlrs().iter())
        .find(|vlr| vlr.user_id == EXTRA_BYTES_USER_ID && vlr.record_id == EXTRA_BYTES_RECORD_ID);

    match vlr {
        Some(vlr) => parse_extra_bytes(&vlr.data),
        None => Ok(Vec::new()),
    }
}

impl PointReader for LasPointReader {
    fn schema(&self) -> &PointSchema {
        &self.schema
    }

    fn next_point(&mut self) -> io::Result<Option<Point>> {
        loop {
            if self.current_reader.is_none() {
                self.open_next_file()?;
                if self.current_reader.is_none() {
                    return Ok(None);
                }
            }

            let Some(reader) = self.current_reader.as_mut() else {
                continue;
            };
            match reader.points().next() {
                Some(Ok(las_point)) => {
                    let p = Self::convert_las_point(las_point);
                    return Ok(Some(p));
                }
                Some(Err(e)) => {
                    log::error!("Error reading LAS point: {}", e);
                    return Err(io::Error::other(e));
                }
                None => {
                    self.current_reader = None;
                }
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.current_reader = None;
        self.current_file_index = self.files.len();
        Ok(())
    }
}
