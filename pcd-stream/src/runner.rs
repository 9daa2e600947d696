use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use pcd_core::pointcloud::{
    column::Column,
    decimation::decimator::{DecimatorChain, PointCloudDecimator},
    extra_bytes::{decode, describe, AttributeDescriptor, AttributeValue, CodecError},
    point::Point,
    schema::PointSchema,
};
use pcd_parser::{
    reader::{las::LasPointReader, PointReader},
    writer::{las::LasPointWriter, PointWriter},
};

use crate::{
    builder::StreamConfig,
    error::StreamError,
    field::FieldMaterializer,
    result::{Advisories, Inventory, PointColumns, StreamOutput},
};

/// The cancellation flag is checked once per this many points read.
pub const CANCEL_POLL_INTERVAL: u64 = 5_000;

/// Shared stop request for a running stream.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unconfigured,
    Initialized,
    Allocated,
    Streaming,
    Terminated,
}

enum AttributeValues {
    Integer(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
}

struct AttributeColumn {
    descriptor: AttributeDescriptor,
    values: AttributeValues,
}

impl AttributeColumn {
    fn new(descriptor: AttributeDescriptor, capacity: usize) -> Self {
        let values = if descriptor.is_narrow() {
            AttributeValues::Integer(Vec::with_capacity(capacity))
        } else {
            AttributeValues::Double(Vec::with_capacity(capacity))
        };
        Self { descriptor, values }
    }

    fn push(&mut self, extra_bytes: &[u8]) -> Result<(), CodecError> {
        let value = decode(extra_bytes, &self.descriptor)?;
        match &mut self.values {
            AttributeValues::Integer(values) => values.push(value.map(|v| match v {
                AttributeValue::Integer(i) => i,
                AttributeValue::Double(d) => d as i64,
            })),
            AttributeValues::Double(values) => values.push(value.map(AttributeValue::as_f64)),
        }
        Ok(())
    }

    fn finish(self) -> (AttributeDescriptor, Column) {
        let column = match self.values {
            AttributeValues::Integer(values) => Column::NullableInteger(values),
            AttributeValues::Double(values) => Column::NullableDouble(values),
        };
        (self.descriptor, column)
    }
}

/// Pulls points from a source, filters them and either forwards them to a
/// sink or materializes the selected fields.
///
/// `Unconfigured -> Initialized -> Allocated -> Streaming -> Terminated`.
/// The source and sink are closed on termination, on error inside [`run`],
/// and on drop.
///
/// [`run`]: Streamer::run
pub struct Streamer {
    config: StreamConfig,
    state: StreamState,
    source: Option<Box<dyn PointReader>>,
    sink: Option<Box<dyn PointWriter>>,
    chain: DecimatorChain,
    fields: Vec<FieldMaterializer>,
    attributes: Vec<AttributeColumn>,
    inventory: Inventory,
    advisories: Advisories,
    points_read: u64,
    points_kept: usize,
}

impl Streamer {
    pub fn new(config: StreamConfig) -> Self {
        Streamer {
            config,
            state: StreamState::Unconfigured,
            source: None,
            sink: None,
            chain: DecimatorChain::default(),
            fields: Vec::new(),
            attributes: Vec::new(),
            inventory: Inventory::default(),
            advisories: Advisories::default(),
            points_read: 0,
            points_kept: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn points_read(&self) -> u64 {
        self.points_read
    }

    pub fn is_pass_through(&self) -> bool {
        self.sink.is_some()
    }

    /// Schema of the open source.
    pub fn schema(&self) -> Option<&PointSchema> {
        self.source.as_ref().map(|source| source.schema())
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[StreamState],
    ) -> Result<(), StreamError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StreamError::State {
                operation,
                state: self.state,
            })
        }
    }

    /// Attaches an already opened source, and a sink for pass-through mode.
    pub fn open(
        &mut self,
        source: Box<dyn PointReader>,
        sink: Option<Box<dyn PointWriter>>,
    ) -> Result<(), StreamError> {
        self.expect_state("open", &[StreamState::Unconfigured])?;
        if sink.is_some() && !self.config.has_filter() {
            return Err(StreamError::config(
                "writing an output without a filter is useless",
            ));
        }

        let schema = source.schema();
        log::info!(
            "stream opened: point format {}, {} points, {} extra bytes attribute(s)",
            schema.format.id,
            schema.number_of_points,
            schema.number_attributes()
        );

        self.source = Some(source);
        self.sink = sink;
        self.state = StreamState::Initialized;
        Ok(())
    }

    /// Opens the configured LAS/LAZ inputs and, if set, the output.
    pub fn open_files(&mut self) -> Result<(), StreamError> {
        self.expect_state("open", &[StreamState::Unconfigured])?;

        let reader = LasPointReader::new(self.config.inputs.clone())?;
        let writer = match &self.config.output {
            Some(path) => {
                let writer = LasPointWriter::from_header(path, reader.header().clone())?;
                Some(Box::new(writer) as Box<dyn PointWriter>)
            }
            None => None,
        };

        self.open(Box::new(reader), writer)
    }

    /// Builds the filter chain and the per-field storage for the open schema.
    pub fn allocate(&mut self) -> Result<(), StreamError> {
        self.expect_state("allocate", &[StreamState::Initialized])?;
        let schema = match &self.source {
            Some(source) => source.schema().clone(),
            None => return Err(StreamError::config("no point source is open")),
        };

        let format = schema.format;
        if format.has_waveform || format.id > 10 {
            return Err(StreamError::Unsupported(format!(
                "point data record format {}",
                format.id
            )));
        }

        let grid = match &self.config.voxel {
            Some(voxel) => Some(voxel.grid(&schema)?),
            None => None,
        };
        self.chain = self.config.filter.build(grid);
        if !self.chain.is_empty() {
            log::debug!("filters: {}", self.chain.names().join(", "));
        }

        if self.sink.is_none() {
            let capacity = self.config.capacity_hint(schema.number_of_points);
            self.fields = self
                .config
                .selection
                .resolve(&format)
                .into_iter()
                .map(|field| FieldMaterializer::new(field, capacity))
                .collect();

            for id in self.config.selection.extra_bytes().resolve(&schema) {
                let offset = schema.attribute_byte_offset(id).ok_or_else(|| {
                    StreamError::Unsupported(format!(
                        "extra bytes attribute {} follows an attribute of unknown size",
                        id
                    ))
                })?;
                let mut descriptor = describe(id, offset, &schema.extra_bytes[id])?;
                let taken = |name: &str| {
                    self.fields.iter().any(|f| f.field().name() == name)
                        || self.attributes.iter().any(|a| a.descriptor.name == name)
                };
                if taken(&descriptor.name) {
                    let mut renamed = format!("{}_{}", descriptor.name, id + 1);
                    while taken(&renamed) {
                        renamed.push('_');
                    }
                    log::warn!(
                        "extra bytes attribute '{}' renamed to '{}', the name is already in use",
                        descriptor.name,
                        renamed
                    );
                    descriptor.name = renamed;
                }
                log::debug!(
                    "extra bytes attribute '{}' decoded as {:?} at byte {}",
                    descriptor.name,
                    descriptor.type_tag,
                    offset
                );
                self.attributes.push(AttributeColumn::new(descriptor, capacity));
            }
        }

        self.state = StreamState::Allocated;
        Ok(())
    }

    /// Processes the next point of the source. Returns `false` at the end of
    /// the stream.
    pub fn process_next(&mut self) -> Result<bool, StreamError> {
        self.expect_state("read", &[StreamState::Allocated, StreamState::Streaming])?;
        self.state = StreamState::Streaming;

        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(false),
        };
        let Some(point) = source.next_point()? else {
            return Ok(false);
        };
        self.points_read += 1;

        if !self.chain.keep(&point)? {
            return Ok(true);
        }
        self.accept(&point)?;
        Ok(true)
    }

    fn accept(&mut self, point: &Point) -> Result<(), StreamError> {
        self.advisories.observe(point);

        if let Some(sink) = self.sink.as_mut() {
            sink.write_point(point)?;
            self.inventory.add(point);
        } else {
            for field in self.fields.iter_mut() {
                field.push(point);
            }
            for attribute in self.attributes.iter_mut() {
                attribute.push(&point.extra_bytes)?;
            }
        }

        self.points_kept += 1;
        Ok(())
    }

    fn stream(&mut self) -> Result<(), StreamError> {
        if self.state == StreamState::Initialized {
            self.allocate()?;
        }

        while self.process_next()? {
            if self.points_read % CANCEL_POLL_INTERVAL == 0 {
                if let Some(cancel) = &self.config.cancel {
                    if cancel.is_cancelled() {
                        log::info!("stream cancelled after {} points", self.points_read);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Streams until the source is exhausted or cancelled, then terminates.
    pub fn run(&mut self) -> Result<StreamOutput, StreamError> {
        match self.stream() {
            Ok(()) => self.terminate(),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    /// Closes the source and sink and assembles the result.
    pub fn terminate(&mut self) -> Result<StreamOutput, StreamError> {
        self.expect_state("terminate", &[StreamState::Allocated, StreamState::Streaming])?;
        self.state = StreamState::Terminated;

        if let Some(mut source) = self.source.take() {
            source.close()?;
        }
        self.advisories.report();
        log::info!("{} of {} points kept", self.points_kept, self.points_read);

        if let Some(mut sink) = self.sink.take() {
            sink.close()?;
            let mut inventory = mem::take(&mut self.inventory);
            inventory.advisories = self.advisories;
            return Ok(StreamOutput::Written(inventory));
        }

        let mut columns = Vec::with_capacity(self.fields.len() + self.attributes.len());
        for field in self.fields.drain(..) {
            columns.push((field.field().name().to_string(), field.finish()));
        }
        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attribute in self.attributes.drain(..) {
            let (descriptor, column) = attribute.finish();
            columns.push((descriptor.name.clone(), column));
            attributes.push(descriptor);
        }

        Ok(StreamOutput::Materialized(PointColumns {
            number_of_points: self.points_kept,
            columns,
            attributes,
            advisories: self.advisories,
        }))
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                log::debug!("closing the point source failed: {}", e);
            }
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                log::debug!("closing the point sink failed: {}", e);
            }
        }
        if self.state != StreamState::Unconfigured {
            self.state = StreamState::Terminated;
        }
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StreamBuilder;
    use pcd_parser::reader::memory::MemoryPointReader;

    fn make_points(n: usize) -> Vec<Point> {
        (0..n).map(|i| Point::new(i as f64, 0.0, 0.0)).collect()
    }

    fn streamer(builder: StreamBuilder) -> Streamer {
        Streamer::new(builder.input("memory").build().unwrap())
    }

    #[test]
    fn reading_before_allocation_is_an_error() {
        let mut s = streamer(StreamBuilder::new());
        assert!(matches!(
            s.process_next(),
            Err(StreamError::State {
                state: StreamState::Unconfigured,
                ..
            })
        ));

        let reader = MemoryPointReader::new(PointSchema::default(), make_points(2));
        s.open(Box::new(reader), None).unwrap();
        assert_eq!(s.state(), StreamState::Initialized);
        assert!(s.process_next().is_err());

        s.allocate().unwrap();
        assert!(s.process_next().unwrap());
        assert_eq!(s.state(), StreamState::Streaming);
    }

    #[test]
    fn terminating_twice_is_an_error() {
        let mut s = streamer(StreamBuilder::new());
        let reader = MemoryPointReader::new(PointSchema::default(), make_points(3));
        s.open(Box::new(reader), None).unwrap();

        let output = s.run().unwrap();
        assert_eq!(output.into_columns().unwrap().len(), 3);
        assert_eq!(s.state(), StreamState::Terminated);
        assert!(matches!(
            s.terminate(),
            Err(StreamError::State {
                state: StreamState::Terminated,
                ..
            })
        ));
        assert!(s.process_next().is_err());
    }

    #[test]
    fn cancellation_is_polled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut s = streamer(StreamBuilder::new().select("xyz").cancel_flag(cancel));
        let n = CANCEL_POLL_INTERVAL as usize * 2 + 10;
        let reader = MemoryPointReader::new(PointSchema::default(), make_points(n));
        s.open(Box::new(reader), None).unwrap();

        let columns = s.run().unwrap().into_columns().unwrap();
        assert_eq!(columns.len(), CANCEL_POLL_INTERVAL as usize);
        assert_eq!(s.points_read(), CANCEL_POLL_INTERVAL);
    }

    #[test]
    fn attribute_names_do_not_shadow_fields() {
        use crate::writer::ColumnWriter;
        use pcd_core::pointcloud::schema::ExtraBytesEntry;
        use pcd_parser::writer::memory::MemoryPointWriter;

        let schema = PointSchema {
            extra_bytes: vec![ExtraBytesEntry {
                data_type: 3,
                name: "Intensity".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let points = [(10u16, 1000u16), (20, 2000)]
            .iter()
            .map(|&(intensity, raw)| {
                let mut p = Point::new(0.0, 0.0, 0.0);
                p.attributes.intensity = intensity;
                p.extra_bytes = raw.to_le_bytes().to_vec();
                p
            })
            .collect();

        let mut s = streamer(StreamBuilder::new().select("xyzi1"));
        s.open(Box::new(MemoryPointReader::new(schema, points)), None)
            .unwrap();
        let columns = s.run().unwrap().into_columns().unwrap();
        let names: Vec<_> = columns.names().collect();
        assert_eq!(names, vec!["X", "Y", "Z", "Intensity", "Intensity_1"]);
        assert_eq!(columns.get("Intensity").unwrap().get_f64(1), Some(20.0));
        assert_eq!(columns.get("Intensity_1").unwrap().get_f64(1), Some(2000.0));

        let mut sink = MemoryPointWriter::new();
        let written = sink.points();
        ColumnWriter::new(&columns)
            .unwrap()
            .write_to(&mut sink)
            .unwrap();
        let written = written.borrow();
        assert_eq!(written[0].attributes.intensity, 10);
        assert_eq!(written[0].extra_bytes, 1000u16.to_le_bytes().to_vec());
    }

    #[test]
    fn static_voxel_over_an_empty_source() {
        let mut s = streamer(StreamBuilder::new().static_voxel(1.0, None));
        let reader = MemoryPointReader::new(PointSchema::default(), Vec::new());
        s.open(Box::new(reader), None).unwrap();

        let columns = s.run().unwrap().into_columns().unwrap();
        assert!(columns.is_empty());
        assert_eq!(columns.get("X").unwrap().len(), 0);
    }

    #[test]
    fn waveform_formats_are_refused() {
        let mut s = streamer(StreamBuilder::new());
        let schema = PointSchema {
            format: pcd_core::pointcloud::schema::PointFormat::from_id(4),
            ..Default::default()
        };
        s.open(Box::new(MemoryPointReader::new(schema, Vec::new())), None)
            .unwrap();
        assert!(matches!(s.allocate(), Err(StreamError::Unsupported(_))));
    }
}
