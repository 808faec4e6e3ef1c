//! Encode parameters and their defaults

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Codec, CodecTables, HwError, HwResult, MemoryType, PicStruct, SurfaceFormat};

/// Default peak bitrate in kbps
pub const DEFAULT_MAX_BITRATE_KBPS: u32 = 20000;
/// Default VBV buffer size in kbits
pub const DEFAULT_VBV_BUFFER_KBITS: u32 = 20000;
/// Highest QP accepted by the encoder
pub const MAX_QP: u8 = 51;

/// Rate control method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateControl {
    /// Constant QP
    Cqp,
    /// Constant bitrate
    Cbr,
    /// Peak-constrained variable bitrate
    Vbr,
    /// Latency-constrained variable bitrate
    VbrLat,
}

impl RateControl {
    pub fn name(&self) -> &'static str {
        match self {
            RateControl::Cqp => "CQP",
            RateControl::Cbr => "CBR",
            RateControl::Vbr => "VBR",
            RateControl::VbrLat => "VBR_LAT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cqp" => Some(RateControl::Cqp),
            "cbr" => Some(RateControl::Cbr),
            "vbr" => Some(RateControl::Vbr),
            "vbr-lat" | "vbr_lat" => Some(RateControl::VbrLat),
            _ => None,
        }
    }

    /// Whether the target bitrate drives this mode
    pub fn uses_bitrate(&self) -> bool {
        !matches!(self, RateControl::Cqp)
    }

    /// Whether the peak bitrate constrains this mode
    pub fn uses_peak_bitrate(&self) -> bool {
        matches!(self, RateControl::Vbr | RateControl::VbrLat)
    }
}

impl Default for RateControl {
    fn default() -> Self {
        Self::Cqp
    }
}

/// Encoder usage preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Usage {
    Transcoding,
    UltraLowLatency,
    LowLatency,
    Webcam,
}

impl Usage {
    pub fn name(&self) -> &'static str {
        match self {
            Usage::Transcoding => "transcoding",
            Usage::UltraLowLatency => "ultra low latency",
            Usage::LowLatency => "low latency",
            Usage::Webcam => "webcam",
        }
    }
}

impl Default for Usage {
    fn default() -> Self {
        Self::Transcoding
    }
}

/// Motion estimation precision flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEstimation {
    pub half_pel: bool,
    pub quarter_pel: bool,
}

impl Default for MotionEstimation {
    fn default() -> Self {
        Self {
            half_pel: true,
            quarter_pel: true,
        }
    }
}

impl MotionEstimation {
    pub fn name(&self) -> &'static str {
        match (self.half_pel, self.quarter_pel) {
            (true, true) => "half + quarter pel",
            (true, false) => "half pel",
            (false, true) => "quarter pel",
            (false, false) => "full pel",
        }
    }
}

/// Frame rate as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Validated encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParameters {
    /// Target codec
    pub codec: Codec,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel format of submitted frames
    pub input_format: SurfaceFormat,
    /// Memory type of submitted frames
    pub input_memory: MemoryType,
    /// Frame rate
    pub fps: FrameRate,
    /// Usage preset
    pub usage: Usage,
    /// Profile value from the codec's profile table
    pub profile: u32,
    /// Level value from the codec's level table, 0 = auto
    pub level: u32,
    /// Rate control mode
    pub rate_control: RateControl,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Peak bitrate in kbps
    pub max_bitrate_kbps: u32,
    /// VBV buffer size in kbits
    pub vbv_buffer_kbits: u32,
    /// Initial VBV fullness, percent
    pub initial_vbv_percent: u8,
    pub qp_i: u8,
    pub qp_p: u8,
    pub qp_b: u8,
    pub qp_min: u8,
    pub qp_max: u8,
    /// QP offset of non-reference B-frames
    pub delta_qp_bframe: i8,
    /// QP offset of reference B-frames
    pub delta_qp_bframe_ref: i8,
    /// Consecutive B-frames
    pub bframes: u32,
    pub b_pyramid: bool,
    /// GOP length in frames, 0 = auto
    pub gop_len: u32,
    /// IDR period in GOPs
    pub idr_period: u32,
    pub slices: u32,
    pub deblock: bool,
    pub motion_est: MotionEstimation,
    pub interlace: PicStruct,
}

impl Default for EncodeParameters {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            width: 1920,
            height: 1080,
            input_format: SurfaceFormat::Nv12,
            input_memory: MemoryType::Dx9,
            fps: FrameRate::default(),
            usage: Usage::Transcoding,
            profile: 100, // High
            level: 0,
            rate_control: RateControl::Cqp,
            bitrate_kbps: 5000,
            max_bitrate_kbps: DEFAULT_MAX_BITRATE_KBPS,
            vbv_buffer_kbits: DEFAULT_VBV_BUFFER_KBITS,
            initial_vbv_percent: 64,
            qp_i: 22,
            qp_p: 24,
            qp_b: 27,
            qp_min: 0,
            qp_max: MAX_QP,
            delta_qp_bframe: 6,
            delta_qp_bframe_ref: 4,
            bframes: 0,
            b_pyramid: false,
            gop_len: 0,
            idr_period: 1,
            slices: 1,
            deblock: true,
            motion_est: MotionEstimation::default(),
            interlace: PicStruct::Frame,
        }
    }
}

impl EncodeParameters {
    /// Defaults for a given codec, with the codec's default profile
    pub fn for_codec(codec: Codec, tables: &CodecTables) -> Self {
        Self {
            codec,
            profile: tables.default_profile(codec),
            ..Self::default()
        }
    }

    /// Internal consistency checks that need no capability data
    pub fn check(&self, tables: &CodecTables) -> HwResult<()> {
        if self.codec == Codec::Mpeg2 {
            return Err(unsupported("MPEG2 is decode-only"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(unsupported(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(unsupported(format!("invalid frame rate {}", self.fps)));
        }
        if self.qp_min > self.qp_max || self.qp_max > MAX_QP {
            return Err(unsupported(format!(
                "QP range {}-{} outside 0-{}",
                self.qp_min, self.qp_max, MAX_QP
            )));
        }
        for qp in [self.qp_i, self.qp_p, self.qp_b] {
            if qp < self.qp_min || qp > self.qp_max {
                return Err(unsupported(format!(
                    "QP {} outside {}-{}",
                    qp, self.qp_min, self.qp_max
                )));
            }
        }
        if self.slices == 0 {
            return Err(unsupported("slice count must be at least 1"));
        }
        if self.initial_vbv_percent > 100 {
            return Err(unsupported("initial VBV fullness above 100%"));
        }
        if self.rate_control.uses_peak_bitrate() && self.bitrate_kbps > self.max_bitrate_kbps {
            return Err(unsupported(format!(
                "target bitrate {} kbps above peak {} kbps",
                self.bitrate_kbps, self.max_bitrate_kbps
            )));
        }
        if self.codec != Codec::H264 && self.bframes > 0 {
            return Err(unsupported(format!("B-frames are not supported by {}", self.codec)));
        }
        if tables.profile_rank(self.codec, self.profile).is_none() {
            return Err(unsupported(format!(
                "unknown {} profile {}",
                self.codec, self.profile
            )));
        }
        if !tables.levels(self.codec).iter().any(|l| l.value == self.level) {
            return Err(unsupported(format!("unknown {} level {}", self.codec, self.level)));
        }
        Ok(())
    }

    /// Multi-line parameter dump for diagnostics
    pub fn describe<'a>(&'a self, tables: &'a CodecTables) -> ParamsReport<'a> {
        ParamsReport {
            params: self,
            tables,
        }
    }

    /// Stream properties a muxer needs for the encoded output
    pub fn output_info(&self) -> OutputInfo {
        let bframes = if self.codec == Codec::H264 { self.bframes } else { 0 };
        OutputInfo {
            codec: self.codec,
            profile: self.profile,
            level: self.level,
            width: self.width,
            height: self.height,
            fps: self.fps,
            pic_struct: self.interlace,
            video_delay: (bframes > 0) as u32 + (bframes > 2) as u32,
        }
    }
}

/// Properties of the encoded elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub codec: Codec,
    pub profile: u32,
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    pub pic_struct: PicStruct,
    /// Frames of reordering delay introduced by B-frames
    pub video_delay: u32,
}

fn unsupported(reason: impl Into<String>) -> HwError {
    HwError::UnsupportedConfiguration(reason.into())
}

/// Text dump of encode parameters, one field per line
pub struct ParamsReport<'a> {
    pub params: &'a EncodeParameters,
    pub tables: &'a CodecTables,
}

impl fmt::Display for ParamsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.params;
        writeln!(f, "codec:          {}", p.codec)?;
        writeln!(
            f,
            "profile:        {} @ Level {}",
            self.tables.profile_name(p.codec, p.profile),
            self.tables.level_name(p.codec, p.level)
        )?;
        writeln!(
            f,
            "input:          {}x{} {} ({})",
            p.width, p.height, p.input_format, p.input_memory
        )?;
        writeln!(f, "frame rate:     {}", p.fps)?;
        writeln!(f, "picstruct:      {}", p.interlace.name())?;
        writeln!(f, "usage:          {}", p.usage.name())?;
        match p.rate_control {
            RateControl::Cqp => writeln!(
                f,
                "rate control:   CQP  I:{}  P:{}  B:{}",
                p.qp_i, p.qp_p, p.qp_b
            )?,
            rc => writeln!(
                f,
                "rate control:   {}  {} kbps (max {} kbps)",
                rc.name(),
                p.bitrate_kbps,
                p.max_bitrate_kbps
            )?,
        }
        writeln!(
            f,
            "vbv buffer:     {} kbits, initial {}%",
            p.vbv_buffer_kbits, p.initial_vbv_percent
        )?;
        writeln!(f, "qp range:       {}-{}", p.qp_min, p.qp_max)?;
        if p.gop_len == 0 {
            writeln!(f, "gop len:        auto, idr period {}", p.idr_period)?;
        } else {
            writeln!(f, "gop len:        {}, idr period {}", p.gop_len, p.idr_period)?;
        }
        if p.codec == Codec::H264 {
            writeln!(
                f,
                "bframes:        {}{}, deltaQP {}/{}",
                p.bframes,
                if p.b_pyramid { " (pyramid)" } else { "" },
                p.delta_qp_bframe,
                p.delta_qp_bframe_ref
            )?;
        }
        writeln!(f, "slices:         {}", p.slices)?;
        writeln!(f, "deblock:        {}", if p.deblock { "on" } else { "off" })?;
        writeln!(f, "motion est:     {}", p.motion_est.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_check() {
        let tables = CodecTables::new();
        EncodeParameters::default().check(&tables).unwrap();
        EncodeParameters::for_codec(Codec::Hevc, &tables)
            .check(&tables)
            .unwrap();
    }

    #[test]
    fn test_check_rejects_bad_qp_range() {
        let tables = CodecTables::new();
        let params = EncodeParameters {
            qp_min: 30,
            qp_max: 20,
            ..Default::default()
        };
        assert!(matches!(
            params.check(&tables),
            Err(HwError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_check_rejects_hevc_bframes() {
        let tables = CodecTables::new();
        let params = EncodeParameters {
            bframes: 2,
            ..EncodeParameters::for_codec(Codec::Hevc, &tables)
        };
        assert!(params.check(&tables).is_err());
    }

    #[test]
    fn test_video_delay_from_bframes() {
        let mut params = EncodeParameters::default();
        assert_eq!(params.output_info().video_delay, 0);
        params.bframes = 1;
        assert_eq!(params.output_info().video_delay, 1);
        params.bframes = 3;
        assert_eq!(params.output_info().video_delay, 2);
    }

    #[test]
    fn test_describe_mentions_rate_control() {
        let tables = CodecTables::new();
        let text = EncodeParameters::default().describe(&tables).to_string();
        assert!(text.contains("High @ Level auto"));
        assert!(text.contains("CQP  I:22  P:24  B:27"));

        let vbr = EncodeParameters {
            rate_control: RateControl::Vbr,
            ..Default::default()
        };
        assert!(vbr.describe(&tables).to_string().contains("VBR  5000 kbps (max 20000 kbps)"));

        let hevc = EncodeParameters::for_codec(Codec::Hevc, &tables);
        let text = format!("{}", hevc.describe(&tables));
        assert!(text.starts_with("codec:          H.265/HEVC\n"));
        assert!(!text.contains("bframes:"));
        assert!(text.ends_with("motion est:     half + quarter pel\n"));
    }
}
