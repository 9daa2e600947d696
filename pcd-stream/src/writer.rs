use pcd_core::pointcloud::{
    column::Column,
    extra_bytes::{encode_into, AttributeDescriptor},
    point::{BoundingVolume, Point},
    schema::{PointFormat, PointSchema},
};
use pcd_parser::writer::PointWriter;

use crate::{error::StreamError, field::Field, result::PointColumns};

/// Rebuilds points from materialized columns and writes them to a sink.
///
/// Constant columns are applied once to a template point. Extra-bytes
/// columns are re-encoded into a packed layout in column order.
pub struct ColumnWriter<'a> {
    number_of_points: usize,
    template: Point,
    fields: Vec<(Field, &'a Column)>,
    attributes: Vec<(AttributeDescriptor, &'a Column)>,
    descriptors: Vec<AttributeDescriptor>,
    format: PointFormat,
}

impl<'a> ColumnWriter<'a> {
    pub fn new(columns: &'a PointColumns) -> Result<Self, StreamError> {
        let n = columns.number_of_points;
        let mut template = Point::default();
        let mut fields = Vec::new();
        let mut attributes = Vec::new();
        let mut present = Vec::new();
        let mut extra_bytes_len = 0;

        for (name, column) in &columns.columns {
            if column.len() != n {
                return Err(StreamError::config(format!(
                    "column {} holds {} values for {} points",
                    name,
                    column.len(),
                    n
                )));
            }

            let described = columns.attributes.iter().find(|d| &d.name == name);
            let mut descriptor = match (described, Field::from_name(name)) {
                (Some(descriptor), _) => descriptor.clone(),
                (None, Some(field)) => {
                    present.push(field);
                    match column.constant_f64() {
                        Some(value) => field.assign(&mut template, value),
                        None => fields.push((field, column)),
                    }
                    continue;
                }
                (None, None) => {
                    return Err(StreamError::config(format!(
                        "column {} is neither a point field nor a described attribute",
                        name
                    )))
                }
            };
            descriptor.id = attributes.len();
            descriptor.byte_offset = extra_bytes_len;
            extra_bytes_len += descriptor.type_tag.size();
            attributes.push((descriptor, column));
        }

        for coordinate in [Field::X, Field::Y, Field::Z] {
            if !present.contains(&coordinate) {
                return Err(StreamError::config(format!(
                    "column {} is required to write points",
                    coordinate.name()
                )));
            }
        }

        template.extra_bytes = vec![0; extra_bytes_len];
        let descriptors = attributes.iter().map(|(d, _)| d.clone()).collect();
        let mut per_point = Vec::new();
        for (descriptor, column) in attributes {
            match column.constant_f64() {
                Some(value) => encode_into(&mut template.extra_bytes, Some(value), &descriptor)?,
                None => per_point.push((descriptor, column)),
            }
        }

        Ok(ColumnWriter {
            number_of_points: n,
            template,
            fields,
            attributes: per_point,
            descriptors,
            format: point_format(&present),
        })
    }

    /// Smallest standard format that carries every field present.
    pub fn point_format(&self) -> PointFormat {
        self.format
    }

    /// Schema declaring the packed extra-bytes layout, for creating the sink.
    pub fn schema(&self) -> Result<PointSchema, StreamError> {
        let mut bounding_volume = BoundingVolume::empty();
        for index in 0..self.number_of_points {
            let p = self.point(index)?;
            bounding_volume.extend(p.x, p.y, p.z);
        }

        Ok(PointSchema {
            format: self.format,
            number_of_points: self.number_of_points as u64,
            bounding_volume,
            extra_bytes: self.descriptors.iter().map(|d| d.to_entry()).collect(),
        })
    }

    pub fn point(&self, index: usize) -> Result<Point, StreamError> {
        let mut point = self.template.clone();
        for (field, column) in &self.fields {
            if let Some(value) = column.get_f64(index) {
                field.assign(&mut point, value);
            }
        }
        for (descriptor, column) in &self.attributes {
            encode_into(&mut point.extra_bytes, column.get_f64(index), descriptor)?;
        }
        Ok(point)
    }

    pub fn write_to(&self, writer: &mut dyn PointWriter) -> Result<usize, StreamError> {
        for index in 0..self.number_of_points {
            writer.write_point(&self.point(index)?)?;
        }
        Ok(self.number_of_points)
    }
}

fn point_format(fields: &[Field]) -> PointFormat {
    let has = |field: Field| fields.contains(&field);
    let color = has(Field::Red) || has(Field::Green) || has(Field::Blue);
    let extended = has(Field::Overlap) || has(Field::ScannerChannel);

    let id = if has(Field::Nir) {
        8
    } else if extended {
        if color {
            7
        } else {
            6
        }
    } else {
        match (has(Field::GpsTime), color) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    };
    PointFormat::from_id(id)
}
