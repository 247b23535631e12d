//! Replay of recorded host traces

use crate::host::{HostIntrospector, ObjectRecord};
use anyhow::{Context, Result};
use leakscope_core::LifecycleEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::Mutex;

/// What the host reported for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub events: Vec<LifecycleEvent>,
}

/// A recorded sequence of host frames, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub frames: Vec<TraceFrame>,
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let json_str = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        let trace: Trace = serde_json::from_str(&json_str)
            .with_context(|| format!("parsing trace {}", path.display()))?;
        tracing::debug!("Loaded trace {} ({} frames)", path.display(), trace.frames.len());
        Ok(trace)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json_str = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_str).with_context(|| format!("writing trace {}", path.display()))?;
        Ok(())
    }
}

/// A host that plays back a trace one frame per collection. Once the frames
/// run out the host reports itself unreachable.
pub struct TraceHost {
    name: String,
    frames: Mutex<VecDeque<TraceFrame>>,
    pending_events: Mutex<Vec<LifecycleEvent>>,
}

impl TraceHost {
    pub fn new(name: impl Into<String>, trace: Trace) -> Self {
        TraceHost {
            name: name.into(),
            frames: Mutex::new(trace.frames.into()),
            pending_events: Mutex::new(Vec::new()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(path.display().to_string(), Trace::load(path)?))
    }

    /// Frames not yet played back.
    pub async fn remaining(&self) -> usize {
        self.frames.lock().await.len()
    }
}

#[async_trait::async_trait]
impl HostIntrospector for TraceHost {
    async fn enumerate_objects(&self) -> Result<Vec<ObjectRecord>> {
        let frame = self
            .frames
            .lock()
            .await
            .pop_front()
            .context("trace exhausted")?;
        self.pending_events.lock().await.extend(frame.events);
        Ok(frame.objects)
    }

    async fn drain_events(&self) -> Result<Vec<LifecycleEvent>> {
        Ok(std::mem::take(&mut *self.pending_events.lock().await))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
