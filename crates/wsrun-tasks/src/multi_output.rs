//! Fan-in of many process output channels
//!
//! A [`MultiProcessOutput`] merges several channels into one stream of
//! [`OutputItem`]s. Items are emitted as soon as any channel has one; each
//! channel's own chunks keep their relative order.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::chunk::{OutputChunk, OutputStreamName};
use crate::output::{ByteStream, OutputError, ProcessOutput, TextStream};

/// One chunk tagged with the metadata of the channel it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem<M, T> {
    pub metadata: M,
    pub chunk: T,
}

/// Channel metadata for script output: the script's own metadata plus the stream name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutputMetadata<M> {
    #[serde(flatten)]
    pub metadata: M,
    pub stream_name: OutputStreamName,
}

impl<M> OutputItem<ScriptOutputMetadata<M>, Bytes> {
    /// Split into the script metadata and a decodable [`OutputChunk`]
    pub fn into_chunk(self) -> (M, OutputChunk) {
        let OutputItem { metadata, chunk } = self;
        let output_chunk = OutputChunk::new(metadata.stream_name, chunk);
        (metadata.metadata, output_chunk)
    }
}

/// Merged stream of raw byte chunks
pub type MultiByteStream<M> = BoxStream<'static, OutputItem<M, Bytes>>;

/// Merged stream of decoded text chunks
pub type MultiTextStream<M> = BoxStream<'static, OutputItem<M, String>>;

/// A single channel inside a [`MultiProcessOutput`]
pub struct OutputLane<M> {
    pub metadata: M,
    pub bytes: ByteStream,
}

/// Aggregate over many output channels.
///
/// Every member channel is opened when the aggregate is built, so a channel
/// whose process finishes early cannot drain away before a consumer
/// attaches. The merged views consume the aggregate, which makes them
/// single-use.
pub struct MultiProcessOutput<M> {
    lanes: Vec<OutputLane<M>>,
}

impl<M> MultiProcessOutput<M>
where
    M: Clone + Send + 'static,
{
    /// Aggregate existing channels, opening the byte view of each
    pub fn new(outputs: Vec<ProcessOutput<M>>) -> Result<Self, OutputError> {
        let lanes = outputs
            .iter()
            .map(|output| {
                Ok(OutputLane {
                    metadata: output.metadata().clone(),
                    bytes: output.bytes()?,
                })
            })
            .collect::<Result<Vec<_>, OutputError>>()?;
        Ok(Self { lanes })
    }

    /// An aggregate with no channels; its streams end immediately
    pub fn empty() -> Self {
        Self { lanes: Vec::new() }
    }

    pub(crate) fn from_lanes(lanes: Vec<OutputLane<M>>) -> Self {
        Self { lanes }
    }

    /// Number of member channels
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Merged raw byte chunks
    pub fn bytes(self) -> MultiByteStream<M> {
        let streams = self.lanes.into_iter().map(|lane| {
            let metadata = lane.metadata;
            lane.bytes
                .map(move |chunk| OutputItem {
                    metadata: metadata.clone(),
                    chunk,
                })
                .boxed()
        });
        stream::select_all(streams).boxed()
    }

    /// Merged text chunks, each channel decoded independently
    pub fn text(self) -> MultiTextStream<M> {
        let streams = self.lanes.into_iter().map(|lane| {
            let metadata = lane.metadata;
            let text: TextStream = lane.bytes.into_text();
            text.map(move |chunk| OutputItem {
                metadata: metadata.clone(),
                chunk,
            })
            .boxed()
        });
        stream::select_all(streams).boxed()
    }

    /// Per-channel access, in the order the channels were added
    pub fn into_lanes(self) -> Vec<OutputLane<M>> {
        self.lanes
    }
}
