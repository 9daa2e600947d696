use pcd_core::pointcloud::{
    column::{AdaptiveColumn, Column, ColumnKind},
    point::Point,
    schema::PointFormat,
};
use serde::Serialize;

/// Standard per-point fields that can be materialized into columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    X,
    Y,
    Z,
    GpsTime,
    Intensity,
    ReturnNumber,
    NumberOfReturns,
    ScanDirectionFlag,
    EdgeOfFlightline,
    Classification,
    Synthetic,
    KeyPoint,
    Withheld,
    Overlap,
    ScanAngle,
    UserData,
    PointSourceId,
    Red,
    Green,
    Blue,
    Nir,
    ScannerChannel,
}

#[derive(Clone, Copy)]
enum Accessor {
    Integer(fn(&Point) -> i32),
    Double(fn(&Point) -> f64),
    Logical(fn(&Point) -> bool),
}

struct FieldInfo {
    name: &'static str,
    code: char,
    accessor: Accessor,
}

fn color(point: &Point) -> (u16, u16, u16) {
    point.color.map(|c| (c.r, c.g, c.b)).unwrap_or_default()
}

impl Field {
    /// Every field, in output column order.
    pub const ALL: [Field; 22] = [
        Field::X,
        Field::Y,
        Field::Z,
        Field::GpsTime,
        Field::Intensity,
        Field::ReturnNumber,
        Field::NumberOfReturns,
        Field::ScanDirectionFlag,
        Field::EdgeOfFlightline,
        Field::Classification,
        Field::Synthetic,
        Field::KeyPoint,
        Field::Withheld,
        Field::Overlap,
        Field::ScanAngle,
        Field::UserData,
        Field::PointSourceId,
        Field::Red,
        Field::Green,
        Field::Blue,
        Field::Nir,
        Field::ScannerChannel,
    ];

    fn info(self) -> FieldInfo {
        use Accessor::*;
        let (name, code, accessor) = match self {
            Field::X => ("X", 'x', Double(|p| p.x)),
            Field::Y => ("Y", 'y', Double(|p| p.y)),
            Field::Z => ("Z", 'z', Double(|p| p.z)),
            Field::GpsTime => (
                "gpstime",
                't',
                Double(|p| p.attributes.gps_time.unwrap_or(0.0)),
            ),
            Field::Intensity => ("Intensity", 'i', Integer(|p| p.attributes.intensity as i32)),
            Field::ReturnNumber => (
                "ReturnNumber",
                'r',
                Integer(|p| p.attributes.return_number as i32),
            ),
            Field::NumberOfReturns => (
                "NumberOfReturns",
                'n',
                Integer(|p| p.attributes.number_of_returns as i32),
            ),
            Field::ScanDirectionFlag => (
                "ScanDirectionFlag",
                'd',
                Integer(|p| p.attributes.scan_direction_flag as i32),
            ),
            Field::EdgeOfFlightline => (
                "EdgeOfFlightline",
                'e',
                Integer(|p| p.attributes.edge_of_flight_line as i32),
            ),
            Field::Classification => (
                "Classification",
                'c',
                Integer(|p| p.attributes.classification as i32),
            ),
            Field::Synthetic => ("Synthetic_flag", 's', Logical(|p| p.attributes.synthetic)),
            Field::KeyPoint => ("Keypoint_flag", 'k', Logical(|p| p.attributes.key_point)),
            Field::Withheld => ("Withheld_flag", 'w', Logical(|p| p.attributes.withheld)),
            Field::Overlap => ("Overlap_flag", 'o', Logical(|p| p.attributes.overlap)),
            Field::ScanAngle => (
                "ScanAngle",
                'a',
                Double(|p| p.attributes.scan_angle as f64),
            ),
            Field::UserData => ("UserData", 'u', Integer(|p| p.attributes.user_data as i32)),
            Field::PointSourceId => (
                "PointSourceID",
                'p',
                Integer(|p| p.attributes.point_source_id as i32),
            ),
            Field::Red => ("R", 'R', Integer(|p| color(p).0 as i32)),
            Field::Green => ("G", 'G', Integer(|p| color(p).1 as i32)),
            Field::Blue => ("B", 'B', Integer(|p| color(p).2 as i32)),
            Field::Nir => ("NIR", 'N', Integer(|p| p.attributes.nir.unwrap_or(0) as i32)),
            Field::ScannerChannel => (
                "ScannerChannel",
                'C',
                Integer(|p| p.attributes.scanner_channel as i32),
            ),
        };
        FieldInfo {
            name,
            code,
            accessor,
        }
    }

    /// Column name in the materialized result.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Character selecting the field in a select string.
    pub fn code(self) -> char {
        self.info().code
    }

    pub fn from_code(code: char) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Stores `value` into the field of `point`, saturating at the field's range.
    pub fn assign(self, point: &mut Point, value: f64) {
        let a = &mut point.attributes;
        match self {
            Field::X => point.x = value,
            Field::Y => point.y = value,
            Field::Z => point.z = value,
            Field::GpsTime => a.gps_time = Some(value),
            Field::Intensity => a.intensity = value as u16,
            Field::ReturnNumber => a.return_number = value as u8,
            Field::NumberOfReturns => a.number_of_returns = value as u8,
            Field::ScanDirectionFlag => a.scan_direction_flag = value != 0.0,
            Field::EdgeOfFlightline => a.edge_of_flight_line = value != 0.0,
            Field::Classification => a.classification = value as u8,
            Field::Synthetic => a.synthetic = value != 0.0,
            Field::KeyPoint => a.key_point = value != 0.0,
            Field::Withheld => a.withheld = value != 0.0,
            Field::Overlap => a.overlap = value != 0.0,
            Field::ScanAngle => a.scan_angle = value as f32,
            Field::UserData => a.user_data = value as u8,
            Field::PointSourceId => a.point_source_id = value as u16,
            Field::Red => point.color.get_or_insert_with(Default::default).r = value as u16,
            Field::Green => point.color.get_or_insert_with(Default::default).g = value as u16,
            Field::Blue => point.color.get_or_insert_with(Default::default).b = value as u16,
            Field::Nir => a.nir = Some(value as u16),
            Field::ScannerChannel => a.scanner_channel = value as u8,
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self.info().accessor {
            Accessor::Integer(_) => ColumnKind::Integer,
            Accessor::Double(_) => ColumnKind::Double,
            Accessor::Logical(_) => ColumnKind::Logical,
        }
    }

    pub fn is_coordinate(self) -> bool {
        matches!(self, Field::X | Field::Y | Field::Z)
    }

    /// Whether records of `format` carry this field at all.
    pub fn is_available(self, format: &PointFormat) -> bool {
        match self {
            Field::GpsTime => format.has_gps_time,
            Field::Red | Field::Green | Field::Blue => format.has_color,
            Field::Nir => format.has_nir,
            Field::Overlap | Field::ScannerChannel => format.is_extended,
            _ => true,
        }
    }
}

enum Slot {
    Integer(fn(&Point) -> i32, AdaptiveColumn<i32>),
    Double(fn(&Point) -> f64, AdaptiveColumn<f64>),
    Logical(fn(&Point) -> bool, AdaptiveColumn<bool>),
}

/// Adaptive column of one selected field, fed point by point.
pub struct FieldMaterializer {
    field: Field,
    slot: Slot,
}

impl FieldMaterializer {
    pub fn new(field: Field, capacity: usize) -> Self {
        let slot = match field.info().accessor {
            Accessor::Integer(get) => Slot::Integer(get, AdaptiveColumn::with_capacity(capacity)),
            Accessor::Double(get) => Slot::Double(get, AdaptiveColumn::with_capacity(capacity)),
            Accessor::Logical(get) => Slot::Logical(get, AdaptiveColumn::with_capacity(capacity)),
        };
        Self { field, slot }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn push(&mut self, point: &Point) {
        match &mut self.slot {
            Slot::Integer(get, column) => column.push(get(point)),
            Slot::Double(get, column) => column.push(get(point)),
            Slot::Logical(get, column) => column.push(get(point)),
        }
    }

    pub fn is_populated(&self) -> bool {
        match &self.slot {
            Slot::Integer(_, column) => column.is_populated(),
            Slot::Double(_, column) => column.is_populated(),
            Slot::Logical(_, column) => column.is_populated(),
        }
    }

    pub fn finish(self) -> Column {
        match self.slot {
            Slot::Integer(_, column) => Column::Integer(column.finish()),
            Slot::Double(_, column) => Column::Double(column.finish()),
            Slot::Logical(_, column) => Column::Logical(column.finish()),
        }
    }
}
