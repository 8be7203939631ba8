//! A [`RenderDevice`] that keeps every executed command instead of drawing.
//!
//! Used by tests and by the demo when no GPU is requested.

use log::trace;

use crate::batching::DrawBatch;
use crate::command::{CommandBuffer, RenderCommand, RenderDevice};

/// Commands executed between two submits, with the buffer names they came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmittedFrame {
    /// Names of the executed command buffers, in execution order.
    pub buffer_names: Vec<&'static str>,
    /// Every executed command, in order.
    pub commands: Vec<RenderCommand>,
}

impl SubmittedFrame {
    /// Draw batches in execution order.
    pub fn draw_batches(&self) -> impl Iterator<Item = &DrawBatch> {
        self.commands.iter().filter_map(|command| match command {
            RenderCommand::DrawRenderers(batch) => Some(batch),
            _ => None,
        })
    }

    /// Total draw calls across all batches.
    pub fn draw_call_count(&self) -> usize {
        self.draw_batches().map(DrawBatch::len).sum()
    }

    /// Total device draws after grouping.
    pub fn device_draw_count(&self) -> usize {
        self.draw_batches().map(DrawBatch::device_draw_count).sum()
    }
}

/// Records command buffers and groups them into submitted frames.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pending: SubmittedFrame,
    frames: Vec<SubmittedFrame>,
}

impl RecordingDevice {
    /// Create a device with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames submitted so far.
    pub fn frames(&self) -> &[SubmittedFrame] {
        &self.frames
    }

    /// Work executed but not yet submitted.
    pub fn pending(&self) -> &SubmittedFrame {
        &self.pending
    }

    /// Total commands across every submitted frame.
    pub fn total_commands(&self) -> usize {
        self.frames.iter().map(|frame| frame.commands.len()).sum()
    }

    /// Drop everything recorded.
    pub fn reset(&mut self) {
        self.pending = SubmittedFrame::default();
        self.frames.clear();
    }
}

impl RenderDevice for RecordingDevice {
    fn execute_command_buffer(&mut self, buffer: &CommandBuffer) {
        self.pending.buffer_names.push(buffer.name());
        self.pending.commands.extend(buffer.commands().iter().cloned());
    }

    fn submit(&mut self) {
        let frame = std::mem::take(&mut self.pending);
        trace!(
            "Submitted frame {} with {} commands",
            self.frames.len(),
            frame.commands.len()
        );
        self.frames.push(frame);
    }
}
