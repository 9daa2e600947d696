use pcd_core::pointcloud::{
    column::Column,
    extra_bytes::AttributeDescriptor,
    point::{BoundingVolume, Point},
};
use serde::Serialize;

/// Materialized stream: named columns in selection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PointColumns {
    pub number_of_points: usize,
    pub columns: Vec<(String, Column)>,
    /// Descriptors of the decoded extra-bytes columns, keyed by column name.
    pub attributes: Vec<AttributeDescriptor>,
    pub advisories: Advisories,
}

impl PointColumns {
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(column_name, _)| column_name == name)
            .map(|(_, column)| column)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.number_of_points
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_points == 0
    }
}

/// Flags that are reported after a successful stream, not treated as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Advisories {
    pub withheld: u64,
    pub synthetic: u64,
}

impl Advisories {
    pub fn observe(&mut self, point: &Point) {
        self.withheld += point.attributes.withheld as u64;
        self.synthetic += point.attributes.synthetic as u64;
    }

    pub fn report(&self) {
        if self.withheld > 0 {
            log::warn!(
                "{} points flagged 'withheld' were kept in the output",
                self.withheld
            );
        }
        if self.synthetic > 0 {
            log::warn!(
                "{} points flagged 'synthetic' were kept in the output",
                self.synthetic
            );
        }
    }
}

/// Running summary of the points forwarded to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inventory {
    pub number_of_points: u64,
    /// Index `i` counts points with return number `i + 1`.
    pub number_of_points_by_return: [u64; 15],
    pub bounding_volume: BoundingVolume,
    pub advisories: Advisories,
}

impl Default for Inventory {
    fn default() -> Self {
        Inventory {
            number_of_points: 0,
            number_of_points_by_return: [0; 15],
            bounding_volume: BoundingVolume::empty(),
            advisories: Advisories::default(),
        }
    }
}

impl Inventory {
    pub fn add(&mut self, point: &Point) {
        self.number_of_points += 1;
        let return_number = point.attributes.return_number as usize;
        if (1..=15).contains(&return_number) {
            self.number_of_points_by_return[return_number - 1] += 1;
        }
        self.bounding_volume.extend(point.x, point.y, point.z);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutput {
    Materialized(PointColumns),
    Written(Inventory),
}

impl StreamOutput {
    pub fn advisories(&self) -> Advisories {
        match self {
            StreamOutput::Materialized(columns) => columns.advisories,
            StreamOutput::Written(inventory) => inventory.advisories,
        }
    }

    pub fn into_columns(self) -> Option<PointColumns> {
        match self {
            StreamOutput::Materialized(columns) => Some(columns),
            StreamOutput::Written(_) => None,
        }
    }

    pub fn into_inventory(self) -> Option<Inventory> {
        match self {
            StreamOutput::Materialized(_) => None,
            StreamOutput::Written(inventory) => Some(inventory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_point(x: f64, return_number: u8) -> Point {
        let mut p = Point::new(x, 1.0, 2.0);
        p.attributes.return_number = return_number;
        p
    }

    #[test]
    fn inventory_counts_returns_and_bounds() {
        let mut inventory = Inventory::default();
        for p in [make_point(0.0, 1), make_point(4.0, 2), make_point(2.0, 1), make_point(1.0, 0)] {
            inventory.add(&p);
        }
        assert_eq!(inventory.number_of_points, 4);
        assert_eq!(inventory.number_of_points_by_return[0], 2);
        assert_eq!(inventory.number_of_points_by_return[1], 1);
        assert_eq!(inventory.bounding_volume.min, [0.0, 1.0, 2.0]);
        assert_eq!(inventory.bounding_volume.max, [4.0, 1.0, 2.0]);
    }

    #[test]
    fn advisories_count_flags() {
        let mut advisories = Advisories::default();
        let mut p = make_point(0.0, 1);
        advisories.observe(&p);
        p.attributes.withheld = true;
        advisories.observe(&p);
        p.attributes.synthetic = true;
        advisories.observe(&p);
        assert_eq!(
            advisories,
            Advisories {
                withheld: 2,
                synthetic: 1
            }
        );
    }
}
