//! Pipeline driver - init, run loop and teardown
//!
//! `init` acquires everything in a fixed order and `terminate` releases it in
//! reverse. The run loop is the hot path: source -> submit -> query -> sink.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use device::{ComputeRuntime, GraphicsDriver};
use encoder::{
    describe_all, AccelBackend, AccelerationContext, BindPlan, CapabilityCatalog, Component,
    DeviceSet, EncodedPacket, OutputStatus, RawFrame, SubmitStatus,
};
use shared_types::{
    BackendStatus, CodecTables, DeviceConfig, Direction, EncodeParameters, HwError, HwResult,
    OutputInfo, PipelineConfig, PipelineState,
};
use tracing::{debug, error, info, warn};

use crate::{EncodeStats, FrameSource, PacketSink};

/// Idle wait when an iteration moved no data
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Result of `PipelineDriver::probe_device`
#[derive(Debug, Clone)]
pub struct DeviceProbe {
    /// Normalized device name
    pub name: String,
    /// Capability report for every codec component
    pub report: String,
}

/// Orchestrates one encode pipeline from device binding to teardown
pub struct PipelineDriver {
    graphics: Arc<dyn GraphicsDriver>,
    compute: Arc<dyn ComputeRuntime>,
    backend: Arc<dyn AccelBackend>,
    tables: CodecTables,
    state: RwLock<PipelineState>,
    params: Option<EncodeParameters>,
    device_name: Option<String>,
    // Acquisition order; released back to front
    devices: Option<DeviceSet>,
    context: Option<AccelerationContext>,
    catalog: Option<CapabilityCatalog>,
    encoder: Option<Box<dyn Component>>,
    source: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn PacketSink>>,
    teardown_errors: Vec<HwError>,
}

impl PipelineDriver {
    pub fn new(
        graphics: Arc<dyn GraphicsDriver>,
        compute: Arc<dyn ComputeRuntime>,
        backend: Arc<dyn AccelBackend>,
    ) -> Self {
        Self {
            graphics,
            compute,
            backend,
            tables: CodecTables::new(),
            state: RwLock::new(PipelineState::Uninitialized),
            params: None,
            device_name: None,
            devices: None,
            context: None,
            catalog: None,
            encoder: None,
            source: None,
            sink: None,
            teardown_errors: Vec::new(),
        }
    }

    /// Current state; safe to poll from other threads
    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    pub fn tables(&self) -> &CodecTables {
        &self.tables
    }

    /// Name of the bound device, once devices are acquired
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn catalog(&self) -> Option<&CapabilityCatalog> {
        self.catalog.as_ref()
    }

    /// Properties of the stream `run` will produce
    pub fn output_info(&self) -> Option<OutputInfo> {
        self.params.as_ref().map(EncodeParameters::output_info)
    }

    /// Errors swallowed by `terminate`
    pub fn teardown_errors(&self) -> &[HwError] {
        &self.teardown_errors
    }

    /// Bind devices, validate `config` and create the encoder
    ///
    /// Any failure leaves the driver `Failed`; call `terminate` to release
    /// whatever was acquired.
    pub fn init(
        &mut self,
        config: &PipelineConfig,
        source: Box<dyn FrameSource>,
        sink: Box<dyn PacketSink>,
    ) -> HwResult<()> {
        let current = self.state();
        if current != PipelineState::Uninitialized {
            return Err(HwError::InvalidStateTransition {
                from: current,
                to: PipelineState::DeviceBound,
            });
        }

        let result = self.init_steps(config, source, sink);
        if let Err(e) = &result {
            error!(error = %e, state = %self.state(), "Pipeline init failed");
            self.fail();
        }
        result
    }

    fn init_steps(
        &mut self,
        config: &PipelineConfig,
        source: Box<dyn FrameSource>,
        sink: Box<dyn PacketSink>,
    ) -> HwResult<()> {
        let params = &config.params;
        params.check(&self.tables)?;
        let plan = BindPlan::from_config(&config.device)?;

        let devices = DeviceSet::acquire(
            self.graphics.clone(),
            self.compute.clone(),
            &plan,
            &config.device,
        )?;
        self.device_name = Some(devices.device_name());
        self.devices = Some(devices);
        self.advance(PipelineState::DeviceBound)?;

        let mut context = AccelerationContext::create(self.backend.clone())?;
        if let Some(devices) = &self.devices {
            context.bind(&plan, devices)?;
        }
        let catalog = CapabilityCatalog::for_context(&context)?;
        self.context = Some(context);
        self.catalog = Some(catalog);
        self.advance(PipelineState::ContextReady)?;

        let (Some(context), Some(catalog)) = (&self.context, &self.catalog) else {
            return Err(HwError::InvalidStateTransition {
                from: self.state(),
                to: PipelineState::EncoderReady,
            });
        };
        catalog.validate(params, &self.tables)?;

        let component_id = catalog
            .components()
            .component_id(params.codec, Direction::Encode)
            .ok_or_else(|| {
                HwError::UnsupportedConfiguration(format!("no {} encoder", params.codec))
            })?;
        let mut encoder = self
            .backend
            .create_component(context.id()?, component_id)
            .map_err(|s| s.into_error(format!("CreateComponent({})", component_id)))?;
        encoder
            .set_params(params)
            .map_err(|s| s.into_error("SetProperty"))?;
        encoder
            .init(params.input_format, params.width, params.height)
            .map_err(|s| s.into_error("Init"))?;

        self.encoder = Some(encoder);
        self.source = Some(source);
        self.sink = Some(sink);
        self.params = Some(params.clone());
        self.advance(PipelineState::EncoderReady)?;

        info!(
            device = self.device_name.as_deref().unwrap_or_default(),
            codec = %params.codec,
            width = params.width,
            height = params.height,
            "Encoder ready"
        );
        debug!("\n{}", params.describe(&self.tables));
        Ok(())
    }

    /// Encode until the source is exhausted or a fatal error occurs
    ///
    /// On success the pipeline is drained, released and `Terminated`. On
    /// failure it is `Failed` and still holds its resources until
    /// `terminate`.
    pub fn run(&mut self) -> HwResult<EncodeStats> {
        let current = self.state();
        if current != PipelineState::EncoderReady {
            return Err(HwError::InvalidStateTransition {
                from: current,
                to: PipelineState::Running,
            });
        }
        self.advance(PipelineState::Running)?;
        info!("Pipeline running");

        match self.pump() {
            Ok(stats) => {
                info!(%stats, "Pipeline finished");
                self.terminate();
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, "Pipeline run failed");
                self.fail();
                Err(e)
            }
        }
    }

    fn pump(&mut self) -> HwResult<EncodeStats> {
        let frame_rate = self.params.as_ref().map(|p| p.fps.as_f64()).unwrap_or(0.0);
        let (width, height) = self
            .params
            .as_ref()
            .map(|p| (p.width, p.height))
            .unwrap_or_default();
        let (Some(encoder), Some(source), Some(sink)) =
            (self.encoder.as_mut(), self.source.as_mut(), self.sink.as_mut())
        else {
            return Err(HwError::InvalidStateTransition {
                from: *self.state.read(),
                to: PipelineState::Running,
            });
        };

        let mut run = RunLoop {
            encoder: encoder.as_mut(),
            source: source.as_mut(),
            sink: sink.as_mut(),
            state: &self.state,
            width,
            height,
            stats: EncodeStats {
                frame_rate,
                ..Default::default()
            },
            pending: None,
            input_done: false,
            next_sequence: 0,
            next_output: 0,
            reorder: BTreeMap::new(),
        };
        let started = Instant::now();
        run.run()?;
        run.stats.elapsed = started.elapsed();
        Ok(run.stats)
    }

    /// Release everything in reverse acquisition order
    ///
    /// Callable in any state and idempotent. Teardown errors are logged and
    /// kept in `teardown_errors`, never returned. A failed pipeline stays
    /// `Failed`.
    pub fn terminate(&mut self) {
        let mut errors = Vec::new();

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(status) = encoder.terminate() {
                errors.push(status.into_error("Terminate encoder"));
            }
        }
        self.source = None;
        self.sink = None;
        self.catalog = None;
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.release() {
                errors.push(e);
            }
        }
        if let Some(mut devices) = self.devices.take() {
            errors.extend(devices.release());
        }

        for e in &errors {
            warn!(error = %e, "Teardown error");
        }
        self.teardown_errors.extend(errors);

        let mut state = self.state.write();
        if *state != PipelineState::Failed && *state != PipelineState::Terminated {
            debug!(from = %*state, "Pipeline terminated");
            *state = PipelineState::Terminated;
        }
    }

    /// Bind a device with its own context and report its capabilities
    ///
    /// Leaves the pipeline state untouched.
    pub fn probe_device(&self, device: &DeviceConfig) -> HwResult<DeviceProbe> {
        let plan = BindPlan::from_config(device)?;
        let devices =
            DeviceSet::acquire(self.graphics.clone(), self.compute.clone(), &plan, device)?;
        let mut context = AccelerationContext::create(self.backend.clone())?;
        context.bind(&plan, &devices)?;
        let catalog = CapabilityCatalog::for_context(&context)?;

        let probe = DeviceProbe {
            name: devices.device_name(),
            report: describe_all(&catalog, &self.tables),
        };
        drop(catalog);
        context.release()?;
        Ok(probe)
    }

    fn advance(&self, next: PipelineState) -> HwResult<()> {
        let mut state = self.state.write();
        let from = *state;
        *state = from.transition(next)?;
        debug!(%from, to = %next, "Pipeline state changed");
        Ok(())
    }

    fn fail(&self) {
        let mut state = self.state.write();
        if !state.is_terminal() {
            *state = PipelineState::Failed;
        }
    }
}

impl Drop for PipelineDriver {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("state", &self.state())
            .field("device", &self.device_name)
            .field("params", &self.params)
            .finish()
    }
}

/// Borrowed pieces of a running pipeline
struct RunLoop<'a> {
    encoder: &'a mut dyn Component,
    source: &'a mut dyn FrameSource,
    sink: &'a mut dyn PacketSink,
    state: &'a RwLock<PipelineState>,
    width: u32,
    height: u32,
    stats: EncodeStats,
    /// Frame refused with `InputFull`, resubmitted next iteration
    pending: Option<RawFrame>,
    input_done: bool,
    next_sequence: u64,
    next_output: u64,
    /// Packets that completed ahead of an earlier frame
    reorder: BTreeMap<u64, EncodedPacket>,
}

impl RunLoop<'_> {
    fn run(&mut self) -> HwResult<()> {
        loop {
            let mut progress = false;
            let mut pull = true;

            if !self.input_done {
                match self.feed()? {
                    Fed::Submitted { more_input } => {
                        progress = true;
                        pull = !more_input;
                    }
                    Fed::Blocked => {}
                    Fed::EndOfStream => progress = true,
                }
            }

            if pull || self.input_done {
                let (moved, eof) = self.collect()?;
                progress |= moved;
                if eof {
                    self.flush_stragglers()?;
                    self.sink.finish()?;
                    return Ok(());
                }
            }

            if !progress {
                std::thread::sleep(IDLE_WAIT);
            }
        }
    }

    /// Submit the pending frame or the next one from the source
    fn feed(&mut self) -> HwResult<Fed> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => match self.source.next_frame()? {
                Some(mut frame) => {
                    if frame.width != self.width || frame.height != self.height {
                        warn!(
                            frame = self.next_sequence,
                            width = frame.width,
                            height = frame.height,
                            "Input geometry changed"
                        );
                        return Err(HwError::StreamGeometryChanged {
                            frame: self.next_sequence,
                        });
                    }
                    frame.sequence = self.next_sequence;
                    self.next_sequence += 1;
                    frame
                }
                None => {
                    self.input_done = true;
                    self.set_state(PipelineState::Draining)?;
                    debug!(frames = self.next_sequence, "Input exhausted, draining");
                    self.encoder
                        .drain()
                        .map_err(|s| s.into_error("Drain"))?;
                    return Ok(Fed::EndOfStream);
                }
            },
        };

        // Flow control may also arrive through the status channel
        let submitted = match self.encoder.submit_input(&frame) {
            Err(BackendStatus::NeedMoreInput) => Ok(SubmitStatus::NeedMoreInput),
            Err(status) if status.is_transient() => {
                debug!(frame = frame.sequence, %status, "Submission deferred");
                Ok(SubmitStatus::InputFull)
            }
            other => other,
        };

        match submitted {
            Ok(SubmitStatus::Accepted) => {
                self.stats.frames_submitted += 1;
                Ok(Fed::Submitted { more_input: false })
            }
            Ok(SubmitStatus::NeedMoreInput) => {
                self.stats.frames_submitted += 1;
                Ok(Fed::Submitted { more_input: true })
            }
            Ok(SubmitStatus::InputFull) => {
                self.stats.input_full_retries += 1;
                self.pending = Some(frame);
                Ok(Fed::Blocked)
            }
            Err(BackendStatus::ResolutionChanged) => {
                warn!(frame = frame.sequence, "Backend reported a resolution change");
                Err(HwError::StreamGeometryChanged {
                    frame: frame.sequence,
                })
            }
            Err(status) => Err(status.into_error(format!("SubmitInput(frame {})", frame.sequence))),
        }
    }

    /// Pull every ready packet; returns (any moved, end of stream)
    fn collect(&mut self) -> HwResult<(bool, bool)> {
        let mut moved = false;
        loop {
            match self.encoder.query_output() {
                Ok(OutputStatus::Packet(packet)) => {
                    moved = true;
                    if packet.sequence != self.next_output {
                        self.stats.reordered_packets += 1;
                    }
                    self.reorder.insert(packet.sequence, packet);
                    self.emit_ready()?;
                }
                Ok(OutputStatus::Repeat) => return Ok((moved, false)),
                Err(status) if status.is_transient() => return Ok((moved, false)),
                Ok(OutputStatus::Eof) => return Ok((moved, true)),
                Err(BackendStatus::ResolutionChanged) => {
                    return Err(HwError::StreamGeometryChanged {
                        frame: self.next_output,
                    });
                }
                Err(status) => return Err(status.into_error("QueryOutput")),
            }
        }
    }

    /// Write buffered packets that are next in submission order
    fn emit_ready(&mut self) -> HwResult<()> {
        while let Some(packet) = self.reorder.remove(&self.next_output) {
            self.write(&packet)?;
            self.next_output = packet.sequence + 1;
        }
        Ok(())
    }

    /// After end-of-stream, write packets left behind a frame the backend
    /// never returned
    fn flush_stragglers(&mut self) -> HwResult<()> {
        if self.reorder.is_empty() {
            return Ok(());
        }
        warn!(
            missing = self.next_output,
            buffered = self.reorder.len(),
            "Backend dropped a frame; flushing later packets"
        );
        let rest = std::mem::take(&mut self.reorder);
        for packet in rest.into_values() {
            self.write(&packet)?;
        }
        Ok(())
    }

    fn write(&mut self, packet: &EncodedPacket) -> HwResult<()> {
        self.sink.write_packet(packet)?;
        self.stats.packets_written += 1;
        self.stats.bytes_written += packet.data.len() as u64;
        if packet.keyframe {
            self.stats.keyframes += 1;
        }
        Ok(())
    }

    fn set_state(&self, next: PipelineState) -> HwResult<()> {
        let mut state = self.state.write();
        *state = state.transition(next)?;
        Ok(())
    }
}

enum Fed {
    Submitted { more_input: bool },
    /// Backend queue full; frame kept for retry
    Blocked,
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySink, VecFrameSource};
    use device::sim::{SimComputeRuntime, SimGraphicsDriver};
    use encoder::sim::SimBackend;
    use shared_types::SurfaceFormat;

    fn driver(backend: SimBackend) -> PipelineDriver {
        PipelineDriver::new(
            Arc::new(SimGraphicsDriver::new(["AMD Radeon(TM) RX 6800"])),
            Arc::new(SimComputeRuntime::new("AMD", ["gfx1030"])),
            Arc::new(backend),
        )
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.params.width = 64;
        config.params.height = 64;
        config
    }

    #[test]
    fn test_init_reaches_encoder_ready() {
        let mut driver = driver(SimBackend::new());
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::default()),
                Box::new(MemorySink::new()),
            )
            .unwrap();
        assert_eq!(driver.state(), PipelineState::EncoderReady);
        assert_eq!(driver.device_name(), Some("AMD Radeon RX 6800"));
        assert_eq!(driver.output_info().unwrap().width, 64);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let mut driver = driver(SimBackend::new());
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::default()),
                Box::new(MemorySink::new()),
            )
            .unwrap();
        let err = driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::default()),
                Box::new(MemorySink::new()),
            )
            .unwrap_err();
        assert!(matches!(err, HwError::InvalidStateTransition { .. }));
        assert_eq!(driver.state(), PipelineState::EncoderReady);
    }

    #[test]
    fn test_run_before_init_is_rejected() {
        let mut driver = driver(SimBackend::new());
        assert!(matches!(
            driver.run(),
            Err(HwError::InvalidStateTransition {
                from: PipelineState::Uninitialized,
                to: PipelineState::Running
            })
        ));
    }

    #[test]
    fn test_empty_source_terminates() {
        let mut driver = driver(SimBackend::new());
        let sink = MemorySink::new();
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::default()),
                Box::new(sink.clone()),
            )
            .unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(stats.packets_written, 0);
        assert!(sink.is_finished());
        assert_eq!(driver.state(), PipelineState::Terminated);
    }

    #[test]
    fn test_geometry_mismatch_fails() {
        let mut driver = driver(SimBackend::new());
        let mut source = VecFrameSource::synthetic(3, 64, 64, SurfaceFormat::Nv12);
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }
        frames[2].width = 128;

        let sink = MemorySink::new();
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::new(frames)),
                Box::new(sink.clone()),
            )
            .unwrap();
        assert!(matches!(
            driver.run(),
            Err(HwError::StreamGeometryChanged { frame: 2 })
        ));
        assert_eq!(driver.state(), PipelineState::Failed);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_input_full_is_retried() {
        let backend = Arc::new(SimBackend::new().input_full_every(2));
        let mut driver = PipelineDriver::new(
            Arc::new(SimGraphicsDriver::new(["GPU"])),
            Arc::new(SimComputeRuntime::new("AMD", ["gfx1030"])),
            backend.clone(),
        );
        let sink = MemorySink::new();
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::synthetic(5, 64, 64, SurfaceFormat::Nv12)),
                Box::new(sink.clone()),
            )
            .unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(sink.sequences(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.input_full_retries, 2);
        assert_eq!(backend.input_full_count(), 2);
        assert_eq!(backend.frames_submitted(), 5);
    }

    #[test]
    fn test_flow_control_statuses_are_retried() {
        let backend = Arc::new(
            SimBackend::new()
                .input_full_every(2)
                .completion_batch(2)
                .status_flow_control(),
        );
        let mut driver = PipelineDriver::new(
            Arc::new(SimGraphicsDriver::new(["GPU"])),
            Arc::new(SimComputeRuntime::new("AMD", ["gfx1030"])),
            backend.clone(),
        );
        let sink = MemorySink::new();
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::synthetic(5, 64, 64, SurfaceFormat::Nv12)),
                Box::new(sink.clone()),
            )
            .unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(sink.sequences(), vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.input_full_retries, 2);
        assert_eq!(backend.frames_submitted(), 5);
        assert_eq!(driver.state(), PipelineState::Terminated);
    }

    #[test]
    fn test_output_failure_is_fatal() {
        let mut driver = driver(SimBackend::new().output_failure_at(3));
        let sink = MemorySink::new();
        driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::synthetic(6, 64, 64, SurfaceFormat::Nv12)),
                Box::new(sink.clone()),
            )
            .unwrap();
        let err = driver.run().unwrap_err();
        assert_eq!(err.status(), Some(BackendStatus::Fail));
        assert_eq!(sink.sequences(), vec![0, 1, 2]);
        driver.terminate();
        assert_eq!(driver.state(), PipelineState::Failed);
        assert!(driver.teardown_errors().is_empty());
    }

    #[test]
    fn test_component_init_failure() {
        let mut driver =
            driver(SimBackend::new().fail_component_init(BackendStatus::InvalidResolution));
        let err = driver
            .init(
                &small_config(),
                Box::new(VecFrameSource::default()),
                Box::new(MemorySink::new()),
            )
            .unwrap_err();
        // The catalog probe fails first, so the codec counts as unavailable
        assert!(matches!(err, HwError::UnsupportedConfiguration(_)));
        assert_eq!(driver.state(), PipelineState::Failed);
    }

    #[test]
    fn test_probe_device_reports_all_components() {
        let driver = driver(SimBackend::new());
        let probe = driver.probe_device(&DeviceConfig::default()).unwrap();
        assert_eq!(probe.name, "AMD Radeon RX 6800");
        assert!(probe.report.contains("H.264/AVC Encode"));
        assert!(probe.report.contains("MPEG2 Decode"));
        assert_eq!(driver.state(), PipelineState::Uninitialized);
    }
}
