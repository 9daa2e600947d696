use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use las::{
    point::{Classification, Format, ScanDirection},
    Builder, Header, Transform, Vector, Vlr, Writer,
};
use pcd_core::pointcloud::{point::Point, schema::PointSchema};

use super::PointWriter;
use crate::extra_bytes::{serialize_extra_bytes, EXTRA_BYTES_RECORD_ID, EXTRA_BYTES_USER_ID};

pub static SCALE_FACTOR: f64 = 0.001;

pub struct LasPointWriter {
    path: PathBuf,
    format: Format,
    writer: Option<Writer<BufWriter<File>>>,
}

impl LasPointWriter {
    /// Writes with the given header, typically the one of the input being filtered.
    /// Compression follows the output extension.
    pub fn from_header<P: AsRef<Path>>(path: P, header: Header) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut builder = Builder::from(header);
        builder.point_format.is_compressed = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("laz"));
        let header = builder.into_header().map_err(io::Error::other)?;

        let format = *header.point_format();
        let writer = Writer::from_path(&path, header).map_err(|e| {
            io::Error::other(format!("cannot create {}: {}", path.display(), e))
        })?;

        Ok(Self {
            path,
            format,
            writer: Some(writer),
        })
    }

    /// Builds a LAS 1.4 header for `schema`, declaring its extra bytes.
    pub fn create<P: AsRef<Path>>(path: P, schema: &PointSchema) -> io::Result<Self> {
        let mut builder = Builder::from((1, 4));
        builder.point_format = Format::new(schema.format.id).map_err(io::Error::other)?;

        let extra_bytes_len = schema.extra_bytes_len().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "extra bytes description contains an attribute of unknown size",
            )
        })?;
        builder.point_format.extra_bytes = u16::try_from(extra_bytes_len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many extra bytes"))?;

        if !schema.extra_bytes.is_empty() {
            builder.vlrs.push(Vlr {
                user_id: EXTRA_BYTES_USER_ID.to_string(),
                record_id: EXTRA_BYTES_RECORD_ID,
                description: "Extra Bytes".to_string(),
                data: serialize_extra_bytes(&schema.extra_bytes),
            });
        }

        let origin = if schema.bounding_volume.is_empty() {
            [0.0; 3]
        } else {
            schema.bounding_volume.min
        };
        builder.transforms = Vector {
            x: Transform {
                scale: SCALE_FACTOR,
                offset: origin[0],
            },
            y: Transform {
                scale: SCALE_FACTOR,
                offset: origin[1],
            },
            z: Transform {
                scale: SCALE_FACTOR,
                offset: origin[2],
            },
        };

        let header = builder.into_header().map_err(io::Error::other)?;
        Self::from_header(path, header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // The record layout is fixed by the header, so optional fields follow the format.
    fn convert_point(&self, point: &Point) -> io::Result<las::Point> {
        let a = &point.attributes;
        let format = &self.format;

        let mut extra_bytes = point.extra_bytes.clone();
        extra_bytes.resize(format.extra_bytes as usize, 0);

        Ok(las::Point {
            x: point.x,
            y: point.y,
            z: point.z,
            intensity: a.intensity,
            return_number: a.return_number,
            number_of_returns: a.number_of_returns,
            scan_direction: if a.scan_direction_flag {
                ScanDirection::LeftToRight
            } else {
                ScanDirection::RightToLeft
            },
            is_edge_of_flight_line: a.edge_of_flight_line,
            classification: Classification::new(a.classification).map_err(io::Error::other)?,
            is_synthetic: a.synthetic,
            is_key_point: a.key_point,
            is_withheld: a.withheld,
            is_overlap: a.overlap,
            scanner_channel: a.scanner_channel,
            scan_angle: a.scan_angle,
            user_data: a.user_data,
            point_source_id: a.point_source_id,
            gps_time: format.has_gps_time.then(|| a.gps_time.unwrap_or(0.0)),
            color: format.has_color.then(|| match point.color {
                Some(c) => las::Color {
                    red: c.r,
                    green: c.g,
                    blue: c.b,
                },
                None => las::Color::default(),
            }),
            nir: format.has_nir.then(|| a.nir.unwrap_or(0)),
            extra_bytes,
            ..Default::default()
        })
    }
}

impl PointWriter for LasPointWriter {
    fn write_point(&mut self, point: &Point) -> io::Result<()> {
        let las_point = self.convert_point(point)?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "writing to a closed LAS writer")
        })?;
        writer.write_point(las_point).map_err(io::Error::other)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.close().map_err(io::Error::other)?;
            log::debug!("closed {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{las::LasPointReader, PointReader};
    use pcd_core::pointcloud::{
        point::{BoundingVolume, Color},
        schema::{ExtraBytesEntry, PointFormat},
    };

    fn schema() -> PointSchema {
        PointSchema {
            format: PointFormat::from_id(3),
            number_of_points: 0,
            bounding_volume: BoundingVolume {
                min: [100.0, 200.0, 0.0],
                max: [110.0, 210.0, 10.0],
            },
            extra_bytes: vec![ExtraBytesEntry {
                data_type: 4,
                options: 0x09,
                name: "Amplitude".to_string(),
                description: "echo amplitude".to_string(),
                no_data: -32768.0,
                scale: 0.01,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn written_points_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.las");

        let mut writer = LasPointWriter::create(&path, &schema()).unwrap();
        for i in 0..3 {
            let mut p = Point::new(100.0 + i as f64, 200.5, 1.25);
            p.color = Some(Color { r: 1, g: 2, b: 3 });
            p.attributes.classification = 2 + i as u8;
            p.attributes.return_number = 1;
            p.attributes.number_of_returns = 1;
            p.attributes.gps_time = Some(10.0 * i as f64);
            p.extra_bytes = (500i16 * i as i16).to_le_bytes().to_vec();
            writer.write_point(&p).unwrap();
        }
        writer.close().unwrap();
        writer.close().unwrap();

        let mut reader = LasPointReader::new(vec![path]).unwrap();
        assert_eq!(reader.schema().format.id, 3);
        assert_eq!(reader.schema().number_of_points, 3);
        assert_eq!(reader.schema().extra_bytes.len(), 1);
        assert_eq!(reader.schema().extra_bytes[0].name, "Amplitude");
        assert_eq!(reader.schema().extra_bytes[0].no_data, -32768.0);

        let mut points = Vec::new();
        while let Some(p) = reader.next_point().unwrap() {
            points.push(p);
        }
        assert_eq!(points.len(), 3);
        assert!((points[2].x - 102.0).abs() < 1e-9);
        assert_eq!(points[1].attributes.classification, 3);
        assert_eq!(points[2].attributes.gps_time, Some(20.0));
        assert_eq!(points[0].color, Some(Color { r: 1, g: 2, b: 3 }));
        assert_eq!(points[1].extra_bytes, 500i16.to_le_bytes().to_vec());
    }

    #[test]
    fn merged_inputs_chain_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for (n, name) in [(2, "a.las"), (3, "b.las")] {
            let path = dir.path().join(name);
            let mut writer = LasPointWriter::create(&path, &schema()).unwrap();
            for i in 0..n {
                writer
                    .write_point(&Point::new(100.0 + i as f64, 200.0, 0.0))
                    .unwrap();
            }
            writer.close().unwrap();
            files.push(path);
        }

        let mut reader = LasPointReader::new(files).unwrap();
        assert_eq!(reader.schema().number_of_points, 5);
        let mut xs = Vec::new();
        while let Some(p) = reader.next_point().unwrap() {
            xs.push(p.x.round() as i64);
        }
        assert_eq!(xs, vec![100, 101, 100, 101, 102]);
    }

    #[test]
    fn missing_input_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LasPointReader::new(vec![dir.path().join("missing.las")]).is_err());
        assert!(LasPointReader::new(Vec::new()).is_err());
    }
}
