use serde::Serialize;

/// Finished column values: either one value repeated `len` times or a full vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Values<T> {
    Constant { value: T, len: usize },
    PerPoint(Vec<T>),
}

impl<T: Copy> Values<T> {
    pub fn len(&self) -> usize {
        match self {
            Values::Constant { len, .. } => *len,
            Values::PerPoint(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Values::Constant { .. })
    }

    pub fn constant(&self) -> Option<T> {
        match self {
            Values::Constant { value, .. } => Some(*value),
            Values::PerPoint(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        match self {
            Values::Constant { value, len } => (index < *len).then_some(*value),
            Values::PerPoint(values) => values.get(index).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Expands a constant column to `len` copies.
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Values::Constant { value, len } => vec![*value; *len],
            Values::PerPoint(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum State<T> {
    Unobserved,
    AssumedConstant { sentinel: T, count: usize },
    Populated(Vec<T>),
}

/// Per-point storage that stays a single value until the field first varies.
///
/// On the first differing value the column is backfilled with the sentinel
/// for every earlier point and grows point by point from then on.
#[derive(Debug, Clone)]
pub struct AdaptiveColumn<T> {
    state: State<T>,
    capacity: usize,
}

impl<T: Copy + PartialEq> Default for AdaptiveColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq> AdaptiveColumn<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// `capacity` is only reserved once the column gets populated.
    pub fn with_capacity(capacity: usize) -> Self {
        AdaptiveColumn {
            state: State::Unobserved,
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        match &mut self.state {
            State::Unobserved => {
                self.state = State::AssumedConstant {
                    sentinel: value,
                    count: 1,
                };
            }
            State::AssumedConstant { sentinel, count } => {
                if value == *sentinel {
                    *count += 1;
                    return;
                }
                let (sentinel, count) = (*sentinel, *count);
                let mut values = Vec::with_capacity(self.capacity.max(count + 1));
                values.resize(count, sentinel);
                values.push(value);
                self.state = State::Populated(values);
            }
            State::Populated(values) => values.push(value),
        }
    }

    pub fn len(&self) -> usize {
        match &self.state {
            State::Unobserved => 0,
            State::AssumedConstant { count, .. } => *count,
            State::Populated(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_populated(&self) -> bool {
        matches!(self.state, State::Populated(_))
    }

    /// Constant collapse when no variation was ever seen. An empty stream
    /// yields an empty per-point column.
    pub fn finish(self) -> Values<T> {
        match self.state {
            State::Unobserved => Values::PerPoint(Vec::new()),
            State::AssumedConstant { sentinel, count } => Values::Constant {
                value: sentinel,
                len: count,
            },
            State::Populated(values) => Values::PerPoint(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Integer,
    Double,
    Logical,
}

/// One output column of a materialized stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Integer(Values<i32>),
    Double(Values<f64>),
    Logical(Values<bool>),
    /// Narrow extra-bytes attribute; `None` is the missing value.
    NullableInteger(Vec<Option<i64>>),
    /// Wide or scaled extra-bytes attribute; `None` is the missing value.
    NullableDouble(Vec<Option<f64>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Integer(v) => v.len(),
            Column::Double(v) => v.len(),
            Column::Logical(v) => v.len(),
            Column::NullableInteger(v) => v.len(),
            Column::NullableDouble(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Integer(_) | Column::NullableInteger(_) => ColumnKind::Integer,
            Column::Double(_) | Column::NullableDouble(_) => ColumnKind::Double,
            Column::Logical(_) => ColumnKind::Logical,
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Column::Integer(v) => v.is_constant(),
            Column::Double(v) => v.is_constant(),
            Column::Logical(v) => v.is_constant(),
            Column::NullableInteger(_) | Column::NullableDouble(_) => false,
        }
    }

    /// Value at `index` widened to `f64`; `None` for missing values or past the end.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            Column::Integer(v) => v.get(index).map(f64::from),
            Column::Double(v) => v.get(index),
            Column::Logical(v) => v.get(index).map(|b| if b { 1.0 } else { 0.0 }),
            Column::NullableInteger(v) => v.get(index).copied().flatten().map(|i| i as f64),
            Column::NullableDouble(v) => v.get(index).copied().flatten(),
        }
    }

    /// The repeated value of a constant column, widened to `f64`.
    pub fn constant_f64(&self) -> Option<f64> {
        match self {
            Column::Integer(v) => v.constant().map(f64::from),
            Column::Double(v) => v.constant(),
            Column::Logical(v) => v.constant().map(|b| if b { 1.0 } else { 0.0 }),
            Column::NullableInteger(_) | Column::NullableDouble(_) => None,
        }
    }
}
