//! Codec, surface and device enums plus per-codec profile/level tables

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Hevc,
    Mpeg2,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::H264, Codec::Hevc, Codec::Mpeg2];

    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "H.264/AVC",
            Codec::Hevc => "H.265/HEVC",
            Codec::Mpeg2 => "MPEG2",
        }
    }

    /// Parse a codec from a config value (`h264`, `avc`, `hevc`, `h265`, `mpeg2`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "h.264" => Some(Codec::H264),
            "hevc" | "h265" | "h.265" => Some(Codec::Hevc),
            "mpeg2" => Some(Codec::Mpeg2),
            _ => None,
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::H264
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Direction of a codec component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Encode,
    Decode,
}

/// Surface (pixel) format understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceFormat {
    Nv12,
    Yv12,
    Bgra,
    Argb,
    Rgba,
    Gray8,
    Yuv420p,
    U8v8,
    Yuy2,
    P010,
}

impl SurfaceFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceFormat::Nv12 => "NV12",
            SurfaceFormat::Yv12 => "YV12",
            SurfaceFormat::Bgra => "BGRA",
            SurfaceFormat::Argb => "ARGB",
            SurfaceFormat::Rgba => "RGBA",
            SurfaceFormat::Gray8 => "GRAY8",
            SurfaceFormat::Yuv420p => "YUV420P",
            SurfaceFormat::U8v8 => "U8V8",
            SurfaceFormat::Yuy2 => "YUY2",
            SurfaceFormat::P010 => "P010",
        }
    }

    /// Size in bytes of one frame of this format, for 4:2:0 and packed layouts
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            SurfaceFormat::Nv12 | SurfaceFormat::Yv12 | SurfaceFormat::Yuv420p => pixels * 3 / 2,
            SurfaceFormat::P010 => pixels * 3,
            SurfaceFormat::Bgra | SurfaceFormat::Argb | SurfaceFormat::Rgba => pixels * 4,
            SurfaceFormat::Gray8 => pixels,
            SurfaceFormat::U8v8 | SurfaceFormat::Yuy2 => pixels * 2,
        }
    }
}

impl std::fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Memory domain a surface lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Host,
    Dx9,
    Dx11,
    OpenCl,
    OpenGl,
    Xv,
    Vulkan,
}

impl MemoryType {
    pub fn name(&self) -> &'static str {
        match self {
            MemoryType::Host => "HOST",
            MemoryType::Dx9 => "DX9",
            MemoryType::Dx11 => "DX11",
            MemoryType::OpenCl => "OpenCL",
            MemoryType::OpenGl => "OpenGL",
            MemoryType::Xv => "XV",
            MemoryType::Vulkan => "Vulkan",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a codec component is accelerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationType {
    NotSupported,
    Hardware,
    Gpu,
    Software,
}

impl std::fmt::Display for AccelerationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccelerationType::NotSupported => "not supported",
            AccelerationType::Hardware => "hardware",
            AccelerationType::Gpu => "GPU",
            AccelerationType::Software => "software",
        };
        write!(f, "{}", name)
    }
}

/// Picture structure of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PicStruct {
    /// Progressive frame
    Frame,
    /// Interlaced, top field first
    Tff,
    /// Interlaced, bottom field first
    Bff,
}

impl PicStruct {
    pub fn is_interlaced(&self) -> bool {
        !matches!(self, PicStruct::Frame)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PicStruct::Frame => "progressive",
            PicStruct::Tff => "interlaced (tff)",
            PicStruct::Bff => "interlaced (bff)",
        }
    }
}

impl Default for PicStruct {
    fn default() -> Self {
        Self::Frame
    }
}

/// Graphics API used to obtain a device context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsApi {
    /// Legacy graphics API (Direct3D 9)
    Legacy,
    /// Modern graphics API (Direct3D 11)
    Modern,
}

impl GraphicsApi {
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsApi::Legacy => "DirectX9",
            GraphicsApi::Modern => "DirectX11",
        }
    }
}

impl std::fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A named numeric value in a codec table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedValue {
    pub name: &'static str,
    pub value: u32,
}

const fn nv(name: &'static str, value: u32) -> NamedValue {
    NamedValue { name, value }
}

#[derive(Debug, Clone, Default)]
struct CodecTable {
    /// Ordered from least to most capable
    profiles: Vec<NamedValue>,
    /// Ordered by increasing level, `auto` (0) first
    levels: Vec<NamedValue>,
}

/// Profile and level tables for every encodable codec
#[derive(Debug, Clone)]
pub struct CodecTables {
    tables: HashMap<Codec, CodecTable>,
}

impl CodecTables {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            Codec::H264,
            CodecTable {
                profiles: vec![nv("Baseline", 66), nv("Main", 77), nv("High", 100)],
                levels: vec![
                    nv("auto", 0),
                    nv("1", 10),
                    nv("1.1", 11),
                    nv("1.2", 12),
                    nv("1.3", 13),
                    nv("2", 20),
                    nv("2.1", 21),
                    nv("2.2", 22),
                    nv("3", 30),
                    nv("3.1", 31),
                    nv("3.2", 32),
                    nv("4", 40),
                    nv("4.1", 41),
                    nv("4.2", 42),
                    nv("5", 50),
                    nv("5.1", 51),
                    nv("5.2", 52),
                ],
            },
        );
        tables.insert(
            Codec::Hevc,
            CodecTable {
                profiles: vec![nv("Main", 1), nv("Main10", 2)],
                levels: vec![
                    nv("auto", 0),
                    nv("1", 30),
                    nv("2", 60),
                    nv("2.1", 63),
                    nv("3", 90),
                    nv("3.1", 93),
                    nv("4", 120),
                    nv("4.1", 123),
                    nv("5", 150),
                    nv("5.1", 153),
                    nv("5.2", 156),
                    nv("6", 180),
                    nv("6.1", 183),
                    nv("6.2", 186),
                ],
            },
        );
        Self { tables }
    }

    pub fn profiles(&self, codec: Codec) -> &[NamedValue] {
        self.tables
            .get(&codec)
            .map(|t| t.profiles.as_slice())
            .unwrap_or(&[])
    }

    pub fn levels(&self, codec: Codec) -> &[NamedValue] {
        self.tables
            .get(&codec)
            .map(|t| t.levels.as_slice())
            .unwrap_or(&[])
    }

    /// Default profile for a codec (the most capable 8-bit profile)
    pub fn default_profile(&self, codec: Codec) -> u32 {
        match codec {
            Codec::H264 => 100,
            Codec::Hevc => 1,
            Codec::Mpeg2 => 0,
        }
    }

    /// Position of a profile in the capability ordering
    pub fn profile_rank(&self, codec: Codec, value: u32) -> Option<usize> {
        self.profiles(codec).iter().position(|p| p.value == value)
    }

    pub fn profile_name(&self, codec: Codec, value: u32) -> &'static str {
        describe(self.profiles(codec), value)
    }

    pub fn level_name(&self, codec: Codec, value: u32) -> &'static str {
        describe(self.levels(codec), value)
    }

    pub fn profile_by_name(&self, codec: Codec, name: &str) -> Option<u32> {
        lookup(self.profiles(codec), name)
    }

    pub fn level_by_name(&self, codec: Codec, name: &str) -> Option<u32> {
        lookup(self.levels(codec), name)
    }
}

impl Default for CodecTables {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(table: &[NamedValue], value: u32) -> &'static str {
    table
        .iter()
        .find(|e| e.value == value)
        .map(|e| e.name)
        .unwrap_or("unknown")
}

fn lookup(table: &[NamedValue], name: &str) -> Option<u32> {
    table
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(|e| e.value)
}
