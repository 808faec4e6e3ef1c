//! Simulated acceleration backend
//!
//! Encodes each frame into a one-byte packet holding the frame's first data
//! byte. Faults and completion order are configurable so callers can drive
//! every pipeline path without hardware.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use device::{DeviceHandle, RawHandle};
use shared_types::{
    AccelerationType, BackendStatus, Codec, Direction, EncodeParameters, GraphicsApi, MemoryType,
    SurfaceFormat,
};

use crate::{
    AccelBackend, BackendResult, CapabilityDescriptor, Component, ComponentTable, ContextId,
    EncodedPacket, IoCapability, OutputStatus, RawFrame, SubmitStatus,
};

/// Default number of frames a component holds before reporting `InputFull`
pub const DEFAULT_INPUT_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct BackendLedger {
    live_contexts: HashSet<ContextId>,
    graphics_binds: Vec<GraphicsApi>,
    compute_binds: usize,
    component_creates: HashMap<String, usize>,
    live_components: usize,
    caps_before_init: usize,
    params: Option<EncodeParameters>,
    submitted: u64,
    input_full: u64,
    drained: usize,
}

#[derive(Debug, Clone)]
struct Faults {
    context: Option<BackendStatus>,
    graphics: Option<BackendStatus>,
    compute: Option<BackendStatus>,
    failing_components: HashSet<String>,
    component_init: Option<BackendStatus>,
    resolution_change_at: Option<u64>,
    output_failure_at: Option<u64>,
    input_full_every: Option<u64>,
    /// Report `InputFull` and `Repeat` as failed statuses
    status_flow_control: bool,
}

/// Backend with injectable faults and a call ledger
pub struct SimBackend {
    components: ComponentTable,
    max_profiles: HashMap<Codec, u32>,
    max_levels: HashMap<Codec, u32>,
    max_bitrate: u64,
    faults: Faults,
    completion_batch: usize,
    input_capacity: usize,
    next_context: AtomicU64,
    ledger: Arc<Mutex<BackendLedger>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            components: ComponentTable::new(),
            max_profiles: HashMap::from([(Codec::H264, 100), (Codec::Hevc, 1)]),
            max_levels: HashMap::from([(Codec::H264, 52), (Codec::Hevc, 186)]),
            max_bitrate: 100_000_000,
            faults: Faults {
                context: None,
                graphics: None,
                compute: None,
                failing_components: HashSet::new(),
                component_init: None,
                resolution_change_at: None,
                output_failure_at: None,
                input_full_every: None,
                status_flow_control: false,
            },
            completion_batch: 1,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            next_context: AtomicU64::new(1),
            ledger: Arc::new(Mutex::new(BackendLedger::default())),
        }
    }

    pub fn fail_context(mut self, status: BackendStatus) -> Self {
        self.faults.context = Some(status);
        self
    }

    pub fn fail_graphics(mut self, status: BackendStatus) -> Self {
        self.faults.graphics = Some(status);
        self
    }

    pub fn fail_compute(mut self, status: BackendStatus) -> Self {
        self.faults.compute = Some(status);
        self
    }

    /// Make creating every component of `codec` fail
    pub fn fail_component(mut self, codec: Codec) -> Self {
        for direction in [Direction::Encode, Direction::Decode] {
            if let Some(id) = self.components.component_id(codec, direction) {
                self.faults.failing_components.insert(id.to_string());
            }
        }
        self
    }

    pub fn fail_component_init(mut self, status: BackendStatus) -> Self {
        self.faults.component_init = Some(status);
        self
    }

    /// Report a resolution change when the frame at zero-based `index` is
    /// submitted
    pub fn resolution_change_at(mut self, index: u64) -> Self {
        self.faults.resolution_change_at = Some(index);
        self
    }

    /// Fail the output query for the frame at zero-based `index`
    pub fn output_failure_at(mut self, index: u64) -> Self {
        self.faults.output_failure_at = Some(index);
        self
    }

    /// Refuse the first submission attempt of every `n`-th frame with
    /// `InputFull`
    pub fn input_full_every(mut self, n: u64) -> Self {
        self.faults.input_full_every = Some(n.max(1));
        self
    }

    pub fn max_profile(mut self, codec: Codec, profile: u32) -> Self {
        self.max_profiles.insert(codec, profile);
        self
    }

    pub fn max_level(mut self, codec: Codec, level: u32) -> Self {
        self.max_levels.insert(codec, level);
        self
    }

    /// Signal a full input queue and pending output through the status
    /// channel, the way the hardware runtime does
    pub fn status_flow_control(mut self) -> Self {
        self.faults.status_flow_control = true;
        self
    }

    /// Maximum bitrate in bits per second
    pub fn max_bitrate(mut self, bps: u64) -> Self {
        self.max_bitrate = bps;
        self
    }

    /// Complete frames in batches of `batch`, each batch in reverse order
    pub fn completion_batch(mut self, batch: usize) -> Self {
        self.completion_batch = batch.max(1);
        self
    }

    pub fn input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = capacity.max(1);
        self
    }

    pub fn live_contexts(&self) -> usize {
        self.ledger.lock().live_contexts.len()
    }

    pub fn graphics_binds(&self) -> Vec<GraphicsApi> {
        self.ledger.lock().graphics_binds.clone()
    }

    pub fn compute_binds(&self) -> usize {
        self.ledger.lock().compute_binds
    }

    pub fn component_creates(&self, component_id: &str) -> usize {
        self.ledger
            .lock()
            .component_creates
            .get(component_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_component_creates(&self) -> usize {
        self.ledger.lock().component_creates.values().sum()
    }

    pub fn live_components(&self) -> usize {
        self.ledger.lock().live_components
    }

    /// Caps queries made on an encoder before its init
    pub fn caps_before_init(&self) -> usize {
        self.ledger.lock().caps_before_init
    }

    /// Parameters most recently pushed to a component
    pub fn pushed_params(&self) -> Option<EncodeParameters> {
        self.ledger.lock().params.clone()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.ledger.lock().submitted
    }

    pub fn input_full_count(&self) -> u64 {
        self.ledger.lock().input_full
    }

    pub fn drain_count(&self) -> usize {
        self.ledger.lock().drained
    }

    fn descriptor(&self, component_id: &str) -> CapabilityDescriptor {
        let (codec, encode) = self.lookup(component_id).unwrap_or((Codec::H264, false));
        let h264_encode = encode && codec == Codec::H264;

        let raw_formats = vec![
            (SurfaceFormat::Nv12, true),
            (SurfaceFormat::Yuv420p, false),
            (SurfaceFormat::Yv12, false),
            (SurfaceFormat::Bgra, false),
            (SurfaceFormat::Argb, false),
            (SurfaceFormat::Rgba, false),
        ];
        let memory = vec![
            (MemoryType::Dx11, true),
            (MemoryType::Dx9, false),
            (MemoryType::OpenCl, false),
            (MemoryType::Host, false),
        ];
        let raw = IoCapability {
            min_width: 64,
            max_width: 4096,
            min_height: 64,
            max_height: 2160,
            vert_align: 32,
            interlace: false,
            formats: raw_formats,
            memory: memory.clone(),
        };
        let compressed = IoCapability {
            formats: vec![(SurfaceFormat::Nv12, true)],
            memory,
            ..raw.clone()
        };

        CapabilityDescriptor {
            accel: AccelerationType::Hardware,
            max_profile: self.max_profiles.get(&codec).copied().unwrap_or(0),
            max_level: self.max_levels.get(&codec).copied().unwrap_or(0),
            max_bitrate: self.max_bitrate,
            min_ref_frames: 1,
            max_ref_frames: 16,
            max_streams: 16,
            bframes: h264_encode.then_some(true),
            hw_instances: h264_encode.then_some(1),
            input: Some(if encode { raw.clone() } else { compressed.clone() }),
            output: Some(if encode { compressed } else { raw }),
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AccelBackend for SimBackend {
    fn create_context(&self) -> BackendResult<ContextId> {
        if let Some(status) = self.faults.context {
            return Err(status);
        }
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        self.ledger.lock().live_contexts.insert(id);
        Ok(id)
    }

    fn init_graphics(&self, context: ContextId, device: &DeviceHandle) -> BackendResult<()> {
        if let Some(status) = self.faults.graphics {
            return Err(status);
        }
        let mut ledger = self.ledger.lock();
        if !ledger.live_contexts.contains(&context) {
            return Err(BackendStatus::NotInitialized);
        }
        ledger.graphics_binds.push(device.api);
        Ok(())
    }

    fn init_compute(&self, context: ContextId, _queue: RawHandle) -> BackendResult<()> {
        if let Some(status) = self.faults.compute {
            return Err(status);
        }
        let mut ledger = self.ledger.lock();
        if !ledger.live_contexts.contains(&context) {
            return Err(BackendStatus::NotInitialized);
        }
        ledger.compute_binds += 1;
        Ok(())
    }

    fn create_component(
        &self,
        context: ContextId,
        component_id: &str,
    ) -> BackendResult<Box<dyn Component>> {
        let mut ledger = self.ledger.lock();
        *ledger
            .component_creates
            .entry(component_id.to_string())
            .or_default() += 1;
        if !ledger.live_contexts.contains(&context) {
            return Err(BackendStatus::NotInitialized);
        }
        if self.faults.failing_components.contains(component_id) {
            return Err(BackendStatus::CodecNotSupported);
        }
        let Some((_, encode)) = self.lookup(component_id) else {
            return Err(BackendStatus::NotFound);
        };
        ledger.live_components += 1;

        Ok(Box::new(SimComponent {
            caps: self.descriptor(component_id),
            encode,
            faults: self.faults.clone(),
            completion_batch: self.completion_batch,
            input_capacity: self.input_capacity,
            ledger: self.ledger.clone(),
            initialized: false,
            terminated: false,
            draining: false,
            submitted: 0,
            refused: false,
            encoding: Vec::new(),
            completed: VecDeque::new(),
        }))
    }

    fn release_context(&self, context: ContextId) -> BackendResult<()> {
        if self.ledger.lock().live_contexts.remove(&context) {
            Ok(())
        } else {
            Err(BackendStatus::InvalidArg)
        }
    }
}

impl SimBackend {
    /// Codec of `component_id` and whether it is an encoder
    fn lookup(&self, component_id: &str) -> Option<(Codec, bool)> {
        Codec::ALL.into_iter().find_map(|codec| {
            if self.components.component_id(codec, Direction::Encode) == Some(component_id) {
                Some((codec, true))
            } else if self.components.component_id(codec, Direction::Decode) == Some(component_id)
            {
                Some((codec, false))
            } else {
                None
            }
        })
    }
}

struct SimComponent {
    caps: CapabilityDescriptor,
    encode: bool,
    faults: Faults,
    completion_batch: usize,
    input_capacity: usize,
    ledger: Arc<Mutex<BackendLedger>>,
    initialized: bool,
    terminated: bool,
    draining: bool,
    submitted: u64,
    /// Last attempt was refused by `input_full_every`
    refused: bool,
    /// Accepted but not yet completed
    encoding: Vec<EncodedPacket>,
    completed: VecDeque<EncodedPacket>,
}

impl SimComponent {
    fn complete(&mut self) {
        while let Some(packet) = self.encoding.pop() {
            self.completed.push_back(packet);
        }
    }

    fn live(&self) -> BackendResult<()> {
        if self.terminated {
            Err(BackendStatus::WrongState)
        } else if !self.initialized {
            Err(BackendStatus::NotInitialized)
        } else {
            Ok(())
        }
    }
}

impl Component for SimComponent {
    fn set_params(&mut self, params: &EncodeParameters) -> BackendResult<()> {
        if self.initialized {
            return Err(BackendStatus::AlreadyInitialized);
        }
        self.ledger.lock().params = Some(params.clone());
        Ok(())
    }

    fn init(&mut self, _format: SurfaceFormat, width: u32, height: u32) -> BackendResult<()> {
        if let Some(status) = self.faults.component_init {
            return Err(status);
        }
        if let Some(input) = &self.caps.input {
            if self.encode && !input.supports_size(width, height) {
                return Err(BackendStatus::InvalidResolution);
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn caps(&self) -> BackendResult<CapabilityDescriptor> {
        if self.encode && !self.initialized {
            self.ledger.lock().caps_before_init += 1;
            return Err(BackendStatus::NotInitialized);
        }
        Ok(self.caps.clone())
    }

    fn submit_input(&mut self, frame: &RawFrame) -> BackendResult<SubmitStatus> {
        self.live()?;
        if self.draining {
            return Err(BackendStatus::Eof);
        }
        if self.faults.resolution_change_at == Some(self.submitted) {
            return Err(BackendStatus::ResolutionChanged);
        }
        let busy = match self.faults.input_full_every {
            Some(n) => !self.refused && (self.submitted + 1) % n == 0,
            None => false,
        };
        if busy || self.encoding.len() + self.completed.len() >= self.input_capacity {
            self.refused = true;
            self.ledger.lock().input_full += 1;
            if self.faults.status_flow_control {
                return Err(BackendStatus::InputFull);
            }
            return Ok(SubmitStatus::InputFull);
        }
        self.refused = false;

        let byte = frame.data.first().copied().unwrap_or(0);
        self.encoding.push(EncodedPacket {
            data: Bytes::from(vec![byte]),
            pts: frame.pts,
            sequence: frame.sequence,
            keyframe: frame.sequence == 0,
        });
        self.submitted += 1;
        self.ledger.lock().submitted += 1;

        if self.encoding.len() >= self.completion_batch {
            self.complete();
            Ok(SubmitStatus::Accepted)
        } else {
            Ok(SubmitStatus::NeedMoreInput)
        }
    }

    fn query_output(&mut self) -> BackendResult<OutputStatus> {
        self.live()?;
        match self.completed.pop_front() {
            Some(packet) if self.faults.output_failure_at == Some(packet.sequence) => {
                Err(BackendStatus::Fail)
            }
            Some(packet) => Ok(OutputStatus::Packet(packet)),
            None if self.draining && self.encoding.is_empty() => Ok(OutputStatus::Eof),
            None if self.faults.status_flow_control => Err(BackendStatus::Repeat),
            None => Ok(OutputStatus::Repeat),
        }
    }

    fn drain(&mut self) -> BackendResult<()> {
        self.live()?;
        if !self.draining {
            self.draining = true;
            self.complete();
            self.ledger.lock().drained += 1;
        }
        Ok(())
    }

    fn terminate(&mut self) -> BackendResult<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        self.encoding.clear();
        self.completed.clear();
        self.ledger.lock().live_components -= 1;
        Ok(())
    }
}

impl Drop for SimComponent {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
