// Stage backend - the boundary to the rendering/asset collaborators
// Operations call synchronously into whatever implements StageBackend;
// the engine itself never draws or touches the file system

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Number of addressable sprite slots, as in the original runtime.
pub const SPRITE_SLOTS: usize = 256;

/// Collaborator-side failures. `ResourceUnavailable` is a sentinel the
/// executing operation handles itself; it is not an engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
}

/// Rendering/asset primitives invoked by executed operations.
pub trait StageBackend: Send {
    fn open_window(&mut self, width: u32, height: u32);
    fn load_image(&mut self, slot: usize, path: &str) -> Result<(), StageError>;
    fn move_sprite(&mut self, slot: usize, x: i64, y: i64);
    fn show_sprite(&mut self, slot: usize, visible: bool);
    fn print(&mut self, text: &str);
}

/// Stage that discards everything. Used when a host only needs the
/// variable-store side of script execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStage;

impl StageBackend for NullStage {
    fn open_window(&mut self, _width: u32, _height: u32) {}

    fn load_image(&mut self, _slot: usize, _path: &str) -> Result<(), StageError> {
        Ok(())
    }

    fn move_sprite(&mut self, _slot: usize, _x: i64, _y: i64) {}

    fn show_sprite(&mut self, _slot: usize, _visible: bool) {}

    fn print(&mut self, _text: &str) {}
}

/// One recorded stage primitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCall {
    OpenWindow { width: u32, height: u32 },
    LoadImage { slot: usize, path: String },
    MoveSprite { slot: usize, x: i64, y: i64 },
    ShowSprite { slot: usize, visible: bool },
    Print(String),
}

/// Stage that records every call, for deterministic-trace assertions.
/// Cloning shares the underlying trace, so tests keep a handle while the
/// scheduler owns the stage.
#[derive(Debug, Clone, Default)]
pub struct RecordingStage {
    calls: Arc<Mutex<Vec<StageCall>>>,
    missing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded calls so far
    pub fn calls(&self) -> Vec<StageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make `load_image` report the given path as unavailable
    pub fn mark_missing(&self, path: &str) {
        self.missing.lock().unwrap().insert(path.to_string());
    }

    fn record(&self, call: StageCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StageBackend for RecordingStage {
    fn open_window(&mut self, width: u32, height: u32) {
        self.record(StageCall::OpenWindow { width, height });
    }

    fn load_image(&mut self, slot: usize, path: &str) -> Result<(), StageError> {
        if self.missing.lock().unwrap().contains(path) {
            return Err(StageError::ResourceUnavailable(path.to_string()));
        }
        self.record(StageCall::LoadImage {
            slot,
            path: path.to_string(),
        });
        Ok(())
    }

    fn move_sprite(&mut self, slot: usize, x: i64, y: i64) {
        self.record(StageCall::MoveSprite { slot, x, y });
    }

    fn show_sprite(&mut self, slot: usize, visible: bool) {
        self.record(StageCall::ShowSprite { slot, visible });
    }

    fn print(&mut self, text: &str) {
        self.record(StageCall::Print(text.to_string()));
    }
}
