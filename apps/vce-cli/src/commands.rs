use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use device::sim::{SimComputeRuntime, SimGraphicsDriver};
use encoder::sim::SimBackend;
use pipeline::{
    BoundedFrameSource, DeviceProbe, EncodeStats, FileSink, FrameSource, PipelineDriver,
    RawFileSource,
};
use shared_types::{CodecTables, ParamStore, PipelineConfig};

use crate::{CapsArgs, DeviceArgs, EncodeArgs};

const SIM_ADAPTER: &str = "Simulated Radeon(TM) Graphics";
const SIM_COMPUTE_DEVICE: &str = "gfx1100";

fn simulated_driver(vendor: &str) -> PipelineDriver {
    PipelineDriver::new(
        Arc::new(SimGraphicsDriver::new([SIM_ADAPTER])),
        Arc::new(SimComputeRuntime::new(vendor, [SIM_COMPUTE_DEVICE])),
        Arc::new(SimBackend::new()),
    )
}

fn device_config(args: &DeviceArgs, config: &mut PipelineConfig) -> Result<()> {
    let store = ParamStore::from_entries([
        format!("device={}", args.device).as_str(),
        format!("interop={}", args.interop).as_str(),
        format!("vendor={}", args.vendor).as_str(),
    ])?;
    store.apply(config, &CodecTables::new())?;
    Ok(())
}

pub fn caps(args: &CapsArgs) -> Result<DeviceProbe> {
    let mut config = PipelineConfig::default();
    device_config(&args.device, &mut config)?;
    let driver = simulated_driver(&config.device.vendor);
    driver
        .probe_device(&config.device)
        .context("Device probe failed")
}

pub fn encode(args: &EncodeArgs) -> Result<EncodeStats> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let store = ParamStore::from_entries(args.set.iter().map(String::as_str))?;
    store
        .apply(&mut config, &CodecTables::new())
        .context("Invalid parameter override")?;

    let mut driver = simulated_driver(&config.device.vendor);
    debug!("\n{}", config.params.describe(driver.tables()));

    let params = &config.params;
    let reader = RawFileSource::open(&args.input, params.width, params.height, params.input_format)
        .with_context(|| format!("Failed to open {}", args.input.display()))?
        .with_pic_struct(params.interlace);
    let source: Box<dyn FrameSource> = if args.queue_depth > 0 {
        Box::new(BoundedFrameSource::spawn(Box::new(reader), args.queue_depth)?)
    } else {
        Box::new(reader)
    };
    let sink = FileSink::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    if let Err(e) = driver.init(&config, source, Box::new(sink)) {
        driver.terminate();
        return Err(e).context("Pipeline init failed");
    }
    info!(
        device = driver.device_name().unwrap_or_default(),
        codec = %params.codec,
        "Encoding {}",
        args.input.display()
    );

    let result = driver.run();
    driver.terminate();
    result.context("Encode failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SurfaceFormat;

    fn encode_args(dir: &tempfile::TempDir, frames: usize, set: &[&str]) -> EncodeArgs {
        let input = dir.path().join("in.yuv");
        let size = SurfaceFormat::Nv12.frame_size(64, 64);
        let data: Vec<u8> = (0..frames).flat_map(|i| vec![i as u8; size]).collect();
        std::fs::write(&input, data).unwrap();

        let mut overrides = vec!["width=64".to_string(), "height=64".to_string()];
        overrides.extend(set.iter().map(|s| s.to_string()));
        EncodeArgs {
            input,
            output: dir.path().join("out.264"),
            config: None,
            set: overrides,
            queue_depth: 0,
        }
    }

    #[test]
    fn test_encode_writes_one_byte_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let args = encode_args(&dir, 5, &[]);
        let stats = encode(&args).unwrap();
        assert_eq!(stats.packets_written, 5);
        assert_eq!(std::fs::read(&args.output).unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_encode_with_reader_thread_and_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = encode_args(&dir, 8, &["codec=hevc"]);
        let config_path = dir.path().join("encode.json");
        std::fs::write(&config_path, r#"{ "params": { "fps": { "num": 60, "den": 1 } } }"#)
            .unwrap();
        args.config = Some(config_path);
        args.queue_depth = 2;

        let stats = encode(&args).unwrap();
        assert_eq!(stats.packets_written, 8);
        assert_eq!(stats.frame_rate, 60.0);
    }

    #[test]
    fn test_encode_rejects_truncated_input() {
        let dir = tempfile::tempdir().unwrap();
        let args = encode_args(&dir, 2, &[]);
        let mut data = std::fs::read(&args.input).unwrap();
        data.truncate(data.len() - 1);
        std::fs::write(&args.input, data).unwrap();
        assert!(encode(&args).is_err());
    }

    #[test]
    fn test_encode_vendor_override_selects_platform() {
        let dir = tempfile::tempdir().unwrap();
        let args = encode_args(&dir, 3, &["vendor=Intel"]);
        let stats = encode(&args).unwrap();
        assert_eq!(stats.packets_written, 3);
    }

    #[test]
    fn test_encode_rejects_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let args = encode_args(&dir, 1, &["turbo=1"]);
        assert!(encode(&args).is_err());
    }

    #[test]
    fn test_caps_report() {
        let args = CapsArgs {
            device: DeviceArgs {
                device: 0,
                interop: "d3d11".to_string(),
                vendor: "AMD".to_string(),
            },
        };
        let probe = caps(&args).unwrap();
        assert_eq!(probe.name, "Simulated Radeon");
        assert!(probe.report.contains("H.265/HEVC Encode"));
    }
}
