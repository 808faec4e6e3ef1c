//! End-to-end pipeline scenarios on the simulated backend

use std::sync::Arc;

use device::sim::{SimComputeRuntime, SimGraphicsDriver};
use encoder::sim::SimBackend;
use pipeline::{BoundedFrameSource, MemorySink, PipelineDriver, VecFrameSource};
use shared_types::{
    BackendStatus, Codec, CodecTables, GraphicsApi, HwError, ParamStore, PipelineConfig,
    PipelineState, SurfaceFormat,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 64;

struct Harness {
    graphics: Arc<SimGraphicsDriver>,
    compute: Arc<SimComputeRuntime>,
    backend: Arc<SimBackend>,
    driver: PipelineDriver,
}

impl Harness {
    fn new(backend: SimBackend) -> Self {
        let graphics = Arc::new(SimGraphicsDriver::new(["AMD Radeon(TM) RX 7600 Series"]));
        let compute = Arc::new(SimComputeRuntime::new("AMD", ["gfx1102"]));
        let backend = Arc::new(backend);
        let driver = PipelineDriver::new(graphics.clone(), compute.clone(), backend.clone());
        Self {
            graphics,
            compute,
            backend,
            driver,
        }
    }

    fn assert_released(&self) {
        assert_eq!(self.graphics.live_devices(), 0);
        assert_eq!(self.compute.live_queues(), 0);
        assert_eq!(self.backend.live_contexts(), 0);
        assert_eq!(self.backend.live_components(), 0);
    }
}

fn config(entries: &[&str]) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.params.width = WIDTH;
    config.params.height = HEIGHT;
    let store = ParamStore::from_entries(entries.iter().copied()).unwrap();
    store.apply(&mut config, &CodecTables::new()).unwrap();
    config
}

fn frames(count: u64) -> Box<VecFrameSource> {
    Box::new(VecFrameSource::synthetic(
        count,
        WIDTH,
        HEIGHT,
        SurfaceFormat::Nv12,
    ))
}

#[test]
fn ten_frames_produce_ten_echo_packets() {
    let mut h = Harness::new(SimBackend::new());
    let sink = MemorySink::new();
    h.driver
        .init(&config(&[]), frames(10), Box::new(sink.clone()))
        .unwrap();
    assert_eq!(h.driver.state(), PipelineState::EncoderReady);

    let stats = h.driver.run().unwrap();
    assert_eq!(h.driver.state(), PipelineState::Terminated);
    assert_eq!(stats.frames_submitted, 10);
    assert_eq!(stats.packets_written, 10);
    assert_eq!(stats.bytes_written, 10);

    let packets = sink.packets();
    assert_eq!(packets.len(), 10);
    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(&packet.data[..], &[i as u8]);
    }
    assert!(sink.is_finished());
    assert_eq!(h.backend.drain_count(), 1);
    h.assert_released();

    h.driver.terminate();
    assert_eq!(h.driver.state(), PipelineState::Terminated);
    assert!(h.driver.teardown_errors().is_empty());
}

#[test]
fn packets_follow_submission_order() {
    let mut h = Harness::new(SimBackend::new().completion_batch(4));
    let sink = MemorySink::new();
    h.driver
        .init(&config(&[]), frames(4), Box::new(sink.clone()))
        .unwrap();
    let stats = h.driver.run().unwrap();
    assert_eq!(sink.sequences(), vec![0, 1, 2, 3]);
    assert!(stats.reordered_packets > 0);
}

#[test]
fn partial_batches_are_flushed_by_drain() {
    let mut h = Harness::new(SimBackend::new().completion_batch(3));
    let sink = MemorySink::new();
    h.driver
        .init(&config(&[]), frames(7), Box::new(sink.clone()))
        .unwrap();
    h.driver.run().unwrap();
    assert_eq!(sink.sequences(), (0..7).collect::<Vec<_>>());
}

#[test]
fn legacy_interop_binds_only_legacy_graphics() {
    let mut h = Harness::new(SimBackend::new());
    h.driver
        .init(
            &config(&["interop=d3d9"]),
            frames(1),
            Box::new(MemorySink::new()),
        )
        .unwrap();
    assert_eq!(h.graphics.open_count_for(GraphicsApi::Legacy), 1);
    assert_eq!(h.graphics.open_count_for(GraphicsApi::Modern), 0);
    assert_eq!(h.backend.graphics_binds(), vec![GraphicsApi::Legacy]);
    assert_eq!(h.compute.last_interop(), Some(GraphicsApi::Legacy));
}

#[test]
fn modern_interop_binds_only_modern_graphics() {
    let mut h = Harness::new(SimBackend::new());
    h.driver
        .init(
            &config(&["interop=d3d11"]),
            frames(1),
            Box::new(MemorySink::new()),
        )
        .unwrap();
    assert_eq!(h.graphics.open_count_for(GraphicsApi::Legacy), 0);
    assert_eq!(h.graphics.open_count_for(GraphicsApi::Modern), 1);
    assert_eq!(h.backend.graphics_binds(), vec![GraphicsApi::Modern]);
    assert_eq!(h.backend.compute_binds(), 1);
}

#[test]
fn bitrate_above_ceiling_is_rejected_before_run() {
    let mut h = Harness::new(SimBackend::new().max_bitrate(10_000_000));
    let err = h
        .driver
        .init(
            &config(&["rc=cbr", "bitrate=12000"]),
            frames(3),
            Box::new(MemorySink::new()),
        )
        .unwrap_err();
    assert!(matches!(err, HwError::UnsupportedConfiguration(_)));
    assert_eq!(h.driver.state(), PipelineState::Failed);
    assert!(matches!(
        h.driver.run(),
        Err(HwError::InvalidStateTransition { .. })
    ));
    assert_eq!(h.backend.frames_submitted(), 0);

    h.driver.terminate();
    assert_eq!(h.driver.state(), PipelineState::Failed);
    h.assert_released();
}

#[test]
fn capabilities_are_probed_once_per_codec() {
    let mut h = Harness::new(SimBackend::new());
    h.driver
        .init(&config(&[]), frames(2), Box::new(MemorySink::new()))
        .unwrap();
    let catalog = h.driver.catalog().unwrap();
    let first = catalog.encode_caps(Codec::H264).unwrap();
    let second = catalog.encode_caps(Codec::H264).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // One probe component plus the encoder itself
    assert_eq!(h.backend.component_creates("AMFVideoEncoderVCE_AVC"), 2);
    assert_eq!(h.backend.caps_before_init(), 0);
}

#[test]
fn unavailable_codec_caches_absent_descriptor() {
    let mut h = Harness::new(SimBackend::new().fail_component(Codec::Hevc));
    let err = h
        .driver
        .init(
            &config(&["codec=hevc"]),
            frames(2),
            Box::new(MemorySink::new()),
        )
        .unwrap_err();
    assert!(matches!(err, HwError::UnsupportedConfiguration(_)));
    assert_eq!(h.backend.component_creates("AMFVideoEncoder_HEVC"), 1);
}

#[test]
fn context_creation_failure_fails_init() {
    let mut h = Harness::new(SimBackend::new().fail_context(BackendStatus::Fail));
    let err = h
        .driver
        .init(&config(&[]), frames(2), Box::new(MemorySink::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        HwError::DeviceLost(_) | HwError::BackendFailure { .. }
    ));
    assert_eq!(h.driver.state(), PipelineState::Failed);

    h.driver.terminate();
    assert!(h.driver.teardown_errors().is_empty());
    assert_eq!(h.driver.state(), PipelineState::Failed);
    h.assert_released();
}

#[test]
fn graphics_bind_failure_is_device_lost() {
    let graphics =
        Arc::new(SimGraphicsDriver::new(["GPU"]).fail_api(GraphicsApi::Modern));
    let compute = Arc::new(SimComputeRuntime::new("AMD", ["gfx1102"]));
    let mut driver = PipelineDriver::new(graphics, compute, Arc::new(SimBackend::new()));
    let err = driver
        .init(&config(&[]), frames(1), Box::new(MemorySink::new()))
        .unwrap_err();
    assert!(matches!(err, HwError::DeviceLost(_)));
    assert_eq!(driver.state(), PipelineState::Failed);
}

#[test]
fn backend_interop_rejection_is_device_lost() {
    let mut h = Harness::new(SimBackend::new().fail_graphics(BackendStatus::Fail));
    let err = h
        .driver
        .init(
            &config(&["interop=d3d9"]),
            frames(1),
            Box::new(MemorySink::new()),
        )
        .unwrap_err();
    assert!(matches!(err, HwError::DeviceLost(_)));
    assert_eq!(h.driver.state(), PipelineState::Failed);
    assert_eq!(h.backend.compute_binds(), 0);

    h.driver.terminate();
    assert!(h.driver.teardown_errors().is_empty());
    h.assert_released();
}

#[test]
fn resolution_change_mid_stream_fails_run() {
    let mut h = Harness::new(SimBackend::new().resolution_change_at(4));
    let sink = MemorySink::new();
    h.driver
        .init(&config(&[]), frames(10), Box::new(sink.clone()))
        .unwrap();

    let err = h.driver.run().unwrap_err();
    assert!(matches!(err, HwError::StreamGeometryChanged { frame: 4 }));
    assert_eq!(h.driver.state(), PipelineState::Failed);
    assert!(sink.len() < 10);

    h.driver.terminate();
    assert!(h.driver.teardown_errors().is_empty());
    assert_eq!(h.driver.state(), PipelineState::Failed);
    h.assert_released();
}

#[test]
fn bounded_reader_feeds_the_pipeline() {
    let mut h = Harness::new(SimBackend::new().completion_batch(2));
    let sink = MemorySink::new();
    let source = BoundedFrameSource::spawn(frames(25), 4).unwrap();
    h.driver
        .init(&config(&[]), Box::new(source), Box::new(sink.clone()))
        .unwrap();
    let stats = h.driver.run().unwrap();
    assert_eq!(stats.packets_written, 25);
    assert_eq!(sink.sequences(), (0..25).collect::<Vec<_>>());
}

#[test]
fn invalid_parameters_fail_before_devices_open() {
    let mut h = Harness::new(SimBackend::new());
    let mut cfg = config(&[]);
    cfg.params.qp_min = 40;
    cfg.params.qp_max = 30;
    let err = h
        .driver
        .init(&cfg, frames(1), Box::new(MemorySink::new()))
        .unwrap_err();
    assert!(matches!(err, HwError::UnsupportedConfiguration(_)));
    assert_eq!(h.graphics.open_count(), 0);
}

#[test]
fn both_interop_flags_are_rejected() {
    let mut h = Harness::new(SimBackend::new());
    let mut cfg = config(&[]);
    cfg.device.interop_legacy = true;
    cfg.device.interop_modern = true;
    let err = h
        .driver
        .init(&cfg, frames(1), Box::new(MemorySink::new()))
        .unwrap_err();
    assert!(matches!(err, HwError::UnsupportedConfiguration(_)));
    assert_eq!(h.graphics.open_count(), 0);
}

#[test]
fn pushed_parameters_reach_the_encoder() {
    let mut h = Harness::new(SimBackend::new());
    h.driver
        .init(
            &config(&["profile=main", "qp-i=20"]),
            frames(1),
            Box::new(MemorySink::new()),
        )
        .unwrap();
    let pushed = h.backend.pushed_params().unwrap();
    assert_eq!(pushed.profile, 77);
    assert_eq!(pushed.qp_i, 20);
    assert_eq!(pushed.width, WIDTH);
}

#[test]
fn dropping_the_driver_releases_resources() {
    let h = {
        let mut h = Harness::new(SimBackend::new());
        h.driver
            .init(&config(&[]), frames(1), Box::new(MemorySink::new()))
            .unwrap();
        assert_eq!(h.graphics.live_devices(), 1);
        h
    };
    let Harness {
        graphics,
        compute,
        backend,
        driver,
    } = h;
    drop(driver);
    assert_eq!(graphics.live_devices(), 0);
    assert_eq!(compute.live_queues(), 0);
    assert_eq!(backend.live_contexts(), 0);
}
