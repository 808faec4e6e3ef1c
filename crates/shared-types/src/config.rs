//! Configuration surface: device selection plus a flat key/value store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::{
    Codec, CodecTables, EncodeParameters, FrameRate, GraphicsApi, HwError, HwResult, MemoryType,
    PicStruct, RateControl, SurfaceFormat, Usage,
};

/// Which graphics API the acceleration context must interoperate with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteropMode {
    /// Share surfaces with the legacy graphics API
    Legacy,
    /// Share surfaces with the modern graphics API
    Modern,
    /// No graphics interop requested
    None,
}

impl InteropMode {
    /// Build from the two interop flags; both at once is rejected
    pub fn from_flags(legacy: bool, modern: bool) -> HwResult<Self> {
        match (legacy, modern) {
            (true, true) => Err(HwError::UnsupportedConfiguration(
                "legacy and modern graphics interop are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(InteropMode::Legacy),
            (false, true) => Ok(InteropMode::Modern),
            (false, false) => Ok(InteropMode::None),
        }
    }

    /// Graphics API the compute device must be interop-compatible with
    pub fn interop_api(&self) -> Option<GraphicsApi> {
        match self {
            InteropMode::Legacy => Some(GraphicsApi::Legacy),
            InteropMode::Modern => Some(GraphicsApi::Modern),
            InteropMode::None => None,
        }
    }
}

/// Device selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Adapter ordinal
    pub ordinal: u32,
    /// Interop with the legacy graphics API
    pub interop_legacy: bool,
    /// Interop with the modern graphics API
    pub interop_modern: bool,
    /// Compute platform vendor filter
    pub vendor: String,
    /// Create graphics devices without a window
    pub windowless: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ordinal: 0,
            interop_legacy: false,
            interop_modern: false,
            vendor: "AMD".to_string(),
            windowless: true,
        }
    }
}

impl DeviceConfig {
    pub fn interop_mode(&self) -> HwResult<InteropMode> {
        InteropMode::from_flags(self.interop_legacy, self.interop_modern)
    }
}

/// Full pipeline configuration consumed once by `init`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub device: DeviceConfig,
    pub params: EncodeParameters,
}

impl PipelineConfig {
    /// Parse a JSON config document
    pub fn from_json(json: &str) -> HwResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> HwResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> HwResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Flat key/value parameter store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamStore {
    values: BTreeMap<String, String>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse one `key=value` entry
    pub fn parse_entry(&mut self, entry: &str) -> HwResult<()> {
        let (key, value) = entry.split_once('=').ok_or_else(|| HwError::InvalidParameter {
            key: entry.to_string(),
            reason: "expected key=value".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(HwError::InvalidParameter {
                key: entry.to_string(),
                reason: "empty key".to_string(),
            });
        }
        self.set(key, value.trim());
        Ok(())
    }

    /// Build from `key=value` entries
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> HwResult<Self> {
        let mut store = Self::new();
        for entry in entries {
            store.parse_entry(entry)?;
        }
        Ok(store)
    }

    /// Apply every entry on top of `config`. The codec is applied first so
    /// that profile and level names resolve against the right table.
    pub fn apply(&self, config: &mut PipelineConfig, tables: &CodecTables) -> HwResult<()> {
        if let Some(value) = self.get("codec") {
            let codec = Codec::from_name(value).ok_or_else(|| invalid("codec", value))?;
            if codec != config.params.codec {
                config.params.codec = codec;
                config.params.profile = tables.default_profile(codec);
                config.params.level = 0;
            }
        }

        for (key, value) in &self.values {
            let value = value.as_str();
            let params = &mut config.params;
            let device = &mut config.device;
            match key.as_str() {
                "codec" => {}
                "device" => device.ordinal = parse(key, value)?,
                "interop" => match value {
                    "none" => {
                        device.interop_legacy = false;
                        device.interop_modern = false;
                    }
                    "d3d9" | "legacy" => {
                        device.interop_legacy = true;
                        device.interop_modern = false;
                    }
                    "d3d11" | "modern" => {
                        device.interop_legacy = false;
                        device.interop_modern = true;
                    }
                    _ => return Err(invalid(key, value)),
                },
                "vendor" => device.vendor = value.to_string(),
                "windowless" => device.windowless = parse_bool(key, value)?,
                "width" => params.width = parse(key, value)?,
                "height" => params.height = parse(key, value)?,
                "input-format" => {
                    params.input_format = match value.to_ascii_lowercase().as_str() {
                        "nv12" => SurfaceFormat::Nv12,
                        "yv12" => SurfaceFormat::Yv12,
                        "yuy2" => SurfaceFormat::Yuy2,
                        "p010" => SurfaceFormat::P010,
                        "argb" => SurfaceFormat::Argb,
                        "bgra" => SurfaceFormat::Bgra,
                        _ => return Err(invalid(key, value)),
                    }
                }
                "input-memory" => {
                    params.input_memory = match value.to_ascii_lowercase().as_str() {
                        "host" => MemoryType::Host,
                        "dx9" => MemoryType::Dx9,
                        "dx11" => MemoryType::Dx11,
                        "opencl" => MemoryType::OpenCl,
                        _ => return Err(invalid(key, value)),
                    }
                }
                "fps" => params.fps = parse_rate(key, value)?,
                "usage" => {
                    params.usage = match value {
                        "transcoding" => Usage::Transcoding,
                        "ultralowlatency" => Usage::UltraLowLatency,
                        "lowlatency" => Usage::LowLatency,
                        "webcam" => Usage::Webcam,
                        _ => return Err(invalid(key, value)),
                    }
                }
                "profile" => {
                    params.profile = tables
                        .profile_by_name(params.codec, value)
                        .ok_or_else(|| invalid(key, value))?
                }
                "level" => {
                    params.level = tables
                        .level_by_name(params.codec, value)
                        .ok_or_else(|| invalid(key, value))?
                }
                "rc" => {
                    params.rate_control =
                        RateControl::from_name(value).ok_or_else(|| invalid(key, value))?
                }
                "bitrate" => params.bitrate_kbps = parse(key, value)?,
                "max-bitrate" => params.max_bitrate_kbps = parse(key, value)?,
                "vbv-bufsize" => params.vbv_buffer_kbits = parse(key, value)?,
                "vbv-init" => params.initial_vbv_percent = parse(key, value)?,
                "qp-i" => params.qp_i = parse(key, value)?,
                "qp-p" => params.qp_p = parse(key, value)?,
                "qp-b" => params.qp_b = parse(key, value)?,
                "qp-min" => params.qp_min = parse(key, value)?,
                "qp-max" => params.qp_max = parse(key, value)?,
                "bframes" => params.bframes = parse(key, value)?,
                "b-pyramid" => params.b_pyramid = parse_bool(key, value)?,
                "b-deltaqp" => params.delta_qp_bframe = parse(key, value)?,
                "bref-deltaqp" => params.delta_qp_bframe_ref = parse(key, value)?,
                "gop-len" => params.gop_len = parse(key, value)?,
                "idr-period" => params.idr_period = parse(key, value)?,
                "slices" => params.slices = parse(key, value)?,
                "deblock" => params.deblock = parse_bool(key, value)?,
                "motion-est" => {
                    let (half_pel, quarter_pel) = match value {
                        "full" => (false, false),
                        "half" => (true, false),
                        "quater" | "quarter" => (true, true),
                        _ => return Err(invalid(key, value)),
                    };
                    params.motion_est.half_pel = half_pel;
                    params.motion_est.quarter_pel = quarter_pel;
                }
                "interlace" => {
                    params.interlace = match value {
                        "progressive" | "frame" => PicStruct::Frame,
                        "tff" => PicStruct::Tff,
                        "bff" => PicStruct::Bff,
                        _ => return Err(invalid(key, value)),
                    }
                }
                _ => {
                    return Err(HwError::InvalidParameter {
                        key: key.clone(),
                        reason: "unknown key".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> HwError {
    HwError::InvalidParameter {
        key: key.to_string(),
        reason: format!("invalid value '{}'", value),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> HwResult<T> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> HwResult<bool> {
    match value {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_rate(key: &str, value: &str) -> HwResult<FrameRate> {
    match value.split_once('/') {
        Some((num, den)) => Ok(FrameRate::new(parse(key, num)?, parse(key, den)?)),
        None => Ok(FrameRate::new(parse(key, value)?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interop_flags() {
        assert_eq!(InteropMode::from_flags(true, false).unwrap(), InteropMode::Legacy);
        assert_eq!(InteropMode::from_flags(false, true).unwrap(), InteropMode::Modern);
        assert_eq!(InteropMode::from_flags(false, false).unwrap(), InteropMode::None);
        assert!(matches!(
            InteropMode::from_flags(true, true),
            Err(HwError::UnsupportedConfiguration(_))
        ));
        assert_eq!(InteropMode::None.interop_api(), None);
    }

    #[test]
    fn test_store_applies_overrides() {
        let tables = CodecTables::new();
        let store = ParamStore::from_entries([
            "codec=hevc",
            "level=5.1",
            "width=3840",
            "height=2160",
            "rc=vbr",
            "bitrate=12000",
            "fps=60000/1001",
            "interop=d3d11",
            "device=1",
        ])
        .unwrap();

        let mut config = PipelineConfig::default();
        store.apply(&mut config, &tables).unwrap();

        assert_eq!(config.params.codec, Codec::Hevc);
        assert_eq!(config.params.profile, 1);
        assert_eq!(config.params.level, 153);
        assert_eq!(config.params.width, 3840);
        assert_eq!(config.params.rate_control, RateControl::Vbr);
        assert_eq!(config.params.fps, FrameRate::new(60000, 1001));
        assert_eq!(config.device.ordinal, 1);
        assert_eq!(config.device.interop_mode().unwrap(), InteropMode::Modern);
    }

    #[test]
    fn test_store_rejects_unknown_key_and_bad_value() {
        let tables = CodecTables::new();
        let mut config = PipelineConfig::default();

        let store = ParamStore::from_entries(["bogus=1"]).unwrap();
        assert!(matches!(
            store.apply(&mut config, &tables),
            Err(HwError::InvalidParameter { .. })
        ));

        let store = ParamStore::from_entries(["width=wide"]).unwrap();
        assert!(store.apply(&mut config, &tables).is_err());

        assert!(ParamStore::from_entries(["noequals"]).is_err());
    }

    #[test]
    fn test_json_config_uses_defaults_for_missing_fields() {
        let config = PipelineConfig::from_json(
            r#"{ "device": { "ordinal": 2 }, "params": { "width": 1280, "height": 720 } }"#,
        )
        .unwrap();
        assert_eq!(config.device.ordinal, 2);
        assert_eq!(config.device.vendor, "AMD");
        assert_eq!(config.params.width, 1280);
        assert_eq!(config.params.qp_i, 22);

        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }
}
