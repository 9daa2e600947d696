use std::collections::BTreeSet;

use pcd_core::pointcloud::schema::{PointFormat, PointSchema};

use crate::{error::StreamError, field::Field};

/// Extra-bytes attributes to decode, by ordinal in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraByteSelection {
    All,
    /// Every attribute but the listed ordinals.
    AllExcept(Vec<usize>),
    Indices(Vec<usize>),
}

impl Default for ExtraByteSelection {
    fn default() -> Self {
        ExtraByteSelection::Indices(Vec::new())
    }
}

impl ExtraByteSelection {
    pub fn is_empty(&self) -> bool {
        matches!(self, ExtraByteSelection::Indices(ids) if ids.is_empty())
    }

    fn add(&mut self, id: usize) {
        match self {
            ExtraByteSelection::All => {}
            ExtraByteSelection::AllExcept(except) => {
                except.retain(|&i| i != id);
                if except.is_empty() {
                    *self = ExtraByteSelection::All;
                }
            }
            ExtraByteSelection::Indices(ids) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }

    fn remove(&mut self, id: usize) {
        match self {
            ExtraByteSelection::All => *self = ExtraByteSelection::AllExcept(vec![id]),
            ExtraByteSelection::AllExcept(except) => {
                if !except.contains(&id) {
                    except.push(id);
                }
            }
            ExtraByteSelection::Indices(ids) => ids.retain(|&i| i != id),
        }
    }

    /// Ordinals present in `schema`, in selection order. Ordinals past the
    /// attribute count are dropped: merged inputs may declare fewer attributes.
    pub fn resolve(&self, schema: &PointSchema) -> Vec<usize> {
        let count = schema.number_attributes();
        match self {
            ExtraByteSelection::All => (0..count).collect(),
            ExtraByteSelection::AllExcept(except) => {
                (0..count).filter(|id| !except.contains(id)).collect()
            }
            ExtraByteSelection::Indices(ids) => ids
                .iter()
                .copied()
                .filter(|&id| {
                    let present = id < count;
                    if !present {
                        log::debug!(
                            "extra bytes attribute {} ignored, the schema declares {}",
                            id,
                            count
                        );
                    }
                    present
                })
                .collect(),
        }
    }
}

/// Which standard fields and extra-bytes attributes a stream materializes.
///
/// Coordinates are always part of the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    fields: BTreeSet<Field>,
    extra_bytes: ExtraByteSelection,
}

impl Default for FieldSelection {
    fn default() -> Self {
        FieldSelection {
            fields: [Field::X, Field::Y, Field::Z].into_iter().collect(),
            extra_bytes: ExtraByteSelection::default(),
        }
    }
}

impl FieldSelection {
    /// Coordinates only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every standard field and every extra-bytes attribute.
    pub fn all() -> Self {
        FieldSelection {
            fields: Field::ALL.into_iter().collect(),
            extra_bytes: ExtraByteSelection::All,
        }
    }

    pub fn with(mut self, field: Field) -> Self {
        self.fields.insert(field);
        self
    }

    pub fn without(mut self, field: Field) -> Self {
        if !field.is_coordinate() {
            self.fields.remove(&field);
        }
        self
    }

    pub fn with_extra_bytes(mut self, extra_bytes: ExtraByteSelection) -> Self {
        self.extra_bytes = extra_bytes;
        self
    }

    /// Parses a select string such as `"xyzic"`, `"* -t -0"` or `"xyz1 3"`.
    ///
    /// Letters select fields, `*` selects everything, `-` unselects the next
    /// item, `1`-`9` select an extra-bytes attribute (1-based) and `0` all of
    /// them. Whitespace is ignored.
    pub fn parse(select: &str) -> Result<Self, StreamError> {
        let mut selection = Self::new();
        let mut negate = false;

        for c in select.chars() {
            if c.is_whitespace() {
                continue;
            }
            if c == '-' {
                if negate {
                    return Err(StreamError::config(format!(
                        "select string '{}' has a dangling '-'",
                        select
                    )));
                }
                negate = true;
                continue;
            }

            match (c, negate) {
                ('*', false) => selection = Self::all(),
                ('*', true) => selection = Self::new(),
                ('0', false) => selection.extra_bytes = ExtraByteSelection::All,
                ('0', true) => selection.extra_bytes = ExtraByteSelection::default(),
                ('1'..='9', _) => {
                    let id = c as usize - '1' as usize;
                    if negate {
                        selection.extra_bytes.remove(id);
                    } else {
                        selection.extra_bytes.add(id);
                    }
                }
                (c, negate) => {
                    let field = Field::from_code(c).ok_or_else(|| {
                        StreamError::config(format!(
                            "unknown field '{}' in select string '{}'",
                            c, select
                        ))
                    })?;
                    selection = if negate {
                        selection.without(field)
                    } else {
                        selection.with(field)
                    };
                }
            }
            negate = false;
        }

        if negate {
            return Err(StreamError::config(format!(
                "select string '{}' has a dangling '-'",
                select
            )));
        }
        Ok(selection)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    pub fn extra_bytes(&self) -> &ExtraByteSelection {
        &self.extra_bytes
    }

    /// Selected fields that records of `format` carry, in output order.
    pub fn resolve(&self, format: &PointFormat) -> Vec<Field> {
        self.fields()
            .filter(|field| {
                let available = field.is_available(format);
                if !available {
                    log::debug!(
                        "field {} skipped, point format {} does not carry it",
                        field.name(),
                        format.id
                    );
                }
                available
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcd_core::pointcloud::schema::ExtraBytesEntry;

    fn schema_with_attributes(n: usize) -> PointSchema {
        PointSchema {
            extra_bytes: vec![
                ExtraBytesEntry {
                    data_type: 1,
                    ..Default::default()
                };
                n
            ],
            ..Default::default()
        }
    }

    #[test]
    fn coordinates_are_always_selected() {
        let selection = FieldSelection::parse("ic").unwrap();
        let fields: Vec<_> = selection.fields().collect();
        assert_eq!(
            fields,
            vec![
                Field::X,
                Field::Y,
                Field::Z,
                Field::Intensity,
                Field::Classification
            ]
        );
        assert!(FieldSelection::parse("-x").unwrap().contains(Field::X));
    }

    #[test]
    fn star_and_negation() {
        let selection = FieldSelection::parse("* -t -R -G -B").unwrap();
        assert!(selection.contains(Field::Intensity));
        assert!(!selection.contains(Field::GpsTime));
        assert!(!selection.contains(Field::Green));
        assert_eq!(selection.extra_bytes(), &ExtraByteSelection::All);

        let selection = FieldSelection::parse("*-0").unwrap();
        assert!(selection.extra_bytes().is_empty());
    }

    #[test]
    fn digits_select_extra_bytes() {
        let selection = FieldSelection::parse("xyz1 3 3").unwrap();
        assert_eq!(
            selection.extra_bytes(),
            &ExtraByteSelection::Indices(vec![0, 2])
        );
        let selection = FieldSelection::parse("13-1").unwrap();
        assert_eq!(
            selection.extra_bytes(),
            &ExtraByteSelection::Indices(vec![2])
        );
    }

    #[test]
    fn malformed_select_strings() {
        assert!(matches!(
            FieldSelection::parse("xyzq"),
            Err(StreamError::Config(_))
        ));
        assert!(FieldSelection::parse("xyz-").is_err());
        assert!(FieldSelection::parse("--i").is_err());
    }

    #[test]
    fn unavailable_fields_are_dropped_on_resolve() {
        let selection = FieldSelection::parse("tRN").unwrap();
        let fields = selection.resolve(&PointFormat::from_id(0));
        assert_eq!(fields, vec![Field::X, Field::Y, Field::Z]);

        let fields = selection.resolve(&PointFormat::from_id(8));
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn out_of_range_attributes_are_dropped() {
        let schema = schema_with_attributes(2);
        let selection = ExtraByteSelection::Indices(vec![1, 5, 0]);
        assert_eq!(selection.resolve(&schema), vec![1, 0]);
        assert_eq!(ExtraByteSelection::All.resolve(&schema), vec![0, 1]);
        assert!(ExtraByteSelection::All
            .resolve(&schema_with_attributes(0))
            .is_empty());
    }

    #[test]
    fn negated_digits_carve_out_of_all() {
        let schema = schema_with_attributes(4);

        let selection = FieldSelection::parse("* -2").unwrap();
        assert_eq!(
            selection.extra_bytes(),
            &ExtraByteSelection::AllExcept(vec![1])
        );
        assert_eq!(selection.extra_bytes().resolve(&schema), vec![0, 2, 3]);

        let selection = FieldSelection::parse("0 -1 -4").unwrap();
        assert_eq!(selection.extra_bytes().resolve(&schema), vec![1, 2]);
        assert!(!selection.extra_bytes().is_empty());

        let selection = FieldSelection::parse("0 -1 1").unwrap();
        assert_eq!(selection.extra_bytes(), &ExtraByteSelection::All);
    }
}
