//! Text report of codec capabilities

use std::fmt;

use shared_types::{Codec, CodecTables, Direction};

use crate::{CapabilityCatalog, CapabilityDescriptor, IoCapability};

/// Display adapter rendering one codec's capabilities
pub struct CapsReport<'a> {
    pub codec: Codec,
    pub direction: Direction,
    pub caps: Option<&'a CapabilityDescriptor>,
    pub tables: &'a CodecTables,
}

impl CapsReport<'_> {
    fn role(&self) -> &'static str {
        match self.direction {
            Direction::Encode => "encoder",
            Direction::Decode => "decoder",
        }
    }
}

impl fmt::Display for CapsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(caps) = self.caps else {
            return writeln!(f, "failed to get {} capability", self.role());
        };
        let codec = self.codec;

        writeln!(f, "acceleration:   {}", caps.accel)?;
        writeln!(
            f,
            "max profile:    {}",
            self.tables.profile_name(codec, caps.max_profile)
        )?;
        writeln!(
            f,
            "max level:      {}",
            self.tables.level_name(codec, caps.max_level)
        )?;
        writeln!(f, "max bitrate:    {} kbps", caps.max_bitrate / 1000)?;
        writeln!(
            f,
            "ref frames:     {}-{}",
            caps.min_ref_frames, caps.max_ref_frames
        )?;
        if let Some(bframes) = caps.bframes {
            writeln!(f, "Bframe support: {}", yes_no(bframes))?;
        }
        if let Some(instances) = caps.hw_instances {
            writeln!(f, "HW instances:   {}", instances)?;
        }
        writeln!(f, "max streams:    {}", caps.max_streams)?;

        for (side, io) in [("input", &caps.input), ("output", &caps.output)] {
            writeln!(f)?;
            writeln!(f, "{} {} {}:", codec.name(), self.role(), side)?;
            match io {
                Some(io) => write_io(f, io)?,
                None => writeln!(f, "failed to get io capability")?,
            }
        }
        Ok(())
    }
}

fn write_io(f: &mut fmt::Formatter<'_>, io: &IoCapability) -> fmt::Result {
    writeln!(f, "Width:       {} - {}", io.min_width, io.max_width)?;
    writeln!(f, "Height:      {} - {}", io.min_height, io.max_height)?;
    writeln!(f, "alignment:   {}", io.vert_align)?;
    writeln!(f, "Interlace:   {}", yes_no(io.interlace))?;

    let formats: Vec<String> = io
        .formats
        .iter()
        .map(|(format, native)| native_tag(format.name(), *native))
        .collect();
    writeln!(f, "pix format:  {}", formats.join(", "))?;

    let memory: Vec<String> = io
        .memory
        .iter()
        .map(|(memory, native)| native_tag(memory.name(), *native))
        .collect();
    writeln!(f, "memory type: {}", memory.join(", "))
}

fn native_tag(name: &str, native: bool) -> String {
    if native {
        format!("{}(native)", name)
    } else {
        name.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Render one codec's capabilities
pub fn describe(
    codec: Codec,
    direction: Direction,
    caps: Option<&CapabilityDescriptor>,
    tables: &CodecTables,
) -> String {
    CapsReport {
        codec,
        direction,
        caps,
        tables,
    }
    .to_string()
}

/// Render every codec in the catalog, one titled section each
pub fn describe_all(catalog: &CapabilityCatalog, tables: &CodecTables) -> String {
    let mut out = String::new();
    for (codec, direction, caps) in catalog.all_caps() {
        let title = match direction {
            Direction::Encode => "Encode",
            Direction::Decode => "Decode",
        };
        out.push_str(&format!("{} {}\n", codec.name(), title));
        out.push_str(&describe(codec, direction, caps.as_deref(), tables));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;
    use crate::AccelBackend;
    use std::sync::Arc;

    #[test]
    fn test_missing_caps() {
        let tables = CodecTables::new();
        assert_eq!(
            describe(Codec::H264, Direction::Encode, None, &tables),
            "failed to get encoder capability\n"
        );
        assert_eq!(
            describe(Codec::Mpeg2, Direction::Decode, None, &tables),
            "failed to get decoder capability\n"
        );
    }

    #[test]
    fn test_h264_encoder_report() {
        let backend = Arc::new(SimBackend::new());
        let catalog = CapabilityCatalog::new(backend.clone(), backend.create_context().unwrap());
        let tables = CodecTables::new();
        let caps = catalog.encode_caps(Codec::H264).unwrap();
        let text = describe(Codec::H264, Direction::Encode, Some(&caps), &tables);

        assert!(text.starts_with("acceleration:   hardware\n"));
        assert!(text.contains("max profile:    High\n"));
        assert!(text.contains("max bitrate:    100000 kbps\n"));
        assert!(text.contains("Bframe support: yes\n"));
        assert!(text.contains("\nH.264/AVC encoder input:\n"));
        assert!(text.contains("pix format:  NV12(native), "));
        assert!(text.contains("\nH.264/AVC encoder output:\n"));
    }

    #[test]
    fn test_hevc_report_omits_h264_fields() {
        let backend = Arc::new(SimBackend::new());
        let catalog = CapabilityCatalog::new(backend.clone(), backend.create_context().unwrap());
        let tables = CodecTables::new();
        let caps = catalog.encode_caps(Codec::Hevc).unwrap();
        let text = describe(Codec::Hevc, Direction::Encode, Some(&caps), &tables);
        assert!(!text.contains("Bframe support"));
        assert!(!text.contains("HW instances"));
        assert!(text.contains("max profile:    Main\n"));
    }

    #[test]
    fn test_describe_all_lists_every_component() {
        let backend = Arc::new(SimBackend::new());
        let catalog = CapabilityCatalog::new(backend.clone(), backend.create_context().unwrap());
        let text = describe_all(&catalog, &CodecTables::new());
        assert!(text.contains("H.264/AVC Encode\n"));
        assert!(text.contains("H.265/HEVC Encode\n"));
        assert!(text.contains("MPEG2 Decode\n"));
        assert!(!text.contains("MPEG2 Encode"));
    }
}
