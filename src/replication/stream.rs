//! Per-stream handles owned by the capture engine

use super::{LifeNum, StreamCategory, StreamDescriptor, StreamNames};

/// Lifecycle of one replication stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Not requested yet
    Closed,
    /// Open requested, waiting for the gateway to report it online
    Opening,
    /// Replicating
    Online,
}

/// Handle to one replication stream
#[derive(Debug, Clone)]
pub struct DataStream {
    descriptor: StreamDescriptor,
    status: StreamStatus,
    life_num: Option<LifeNum>,
    generation: u64,
}

impl DataStream {
    pub fn new(descriptor: StreamDescriptor) -> Self {
        Self {
            descriptor,
            status: StreamStatus::Closed,
            life_num: None,
            generation: 0,
        }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn category(&self) -> StreamCategory {
        self.descriptor.category
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Last generation reported for this stream
    pub fn life_num(&self) -> Option<LifeNum> {
        self.life_num
    }

    /// Number of generation changes seen by this handle. Work captured under
    /// an older generation must not move the stream's revision.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the stream has been requested from the connection
    pub fn exists(&self) -> bool {
        self.status != StreamStatus::Closed
    }

    pub(crate) fn mark_opening(&mut self) {
        self.status = StreamStatus::Opening;
    }

    pub(crate) fn mark_online(&mut self) {
        self.status = StreamStatus::Online;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.status = StreamStatus::Closed;
    }

    /// Record a new generation, returning the previous one
    pub(crate) fn observe_life_num(&mut self, life_num: LifeNum) -> Option<LifeNum> {
        self.generation += 1;
        self.life_num.replace(life_num)
    }
}

/// The five stream handles of a capture session
#[derive(Debug, Clone)]
pub struct StreamSet {
    streams: [DataStream; 5],
}

impl StreamSet {
    pub fn new(names: &StreamNames) -> Self {
        Self {
            streams: StreamCategory::ALL.map(|category| DataStream::new(names.descriptor(category))),
        }
    }

    pub fn get(&self, category: StreamCategory) -> &DataStream {
        &self.streams[category.index()]
    }

    pub(crate) fn get_mut(&mut self, category: StreamCategory) -> &mut DataStream {
        &mut self.streams[category.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataStream> {
        self.streams.iter()
    }

    /// Mark every stream closed, returning how many were open
    pub(crate) fn close_all(&mut self) -> usize {
        let open = self.streams.iter().filter(|s| s.exists()).count();
        for stream in &mut self.streams {
            stream.mark_closed();
        }
        open
    }
}
