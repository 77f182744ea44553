//! Transport doubles for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::SendError;
use crate::transport::{Frame, Transport};

/// Records every frame it accepts, or fails every send with a fixed error.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    frames: Mutex<Vec<Frame>>,
    fail_with: Option<SendError>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(err: SendError) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            fail_with: Some(err),
        })
    }

    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().iter().map(|f| f.to_string()).collect()
    }

    pub(crate) fn raw_frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, frame: Frame) -> Result<(), SendError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}
