//! Backend component identifiers per codec and direction

use std::collections::HashMap;

use shared_types::{Codec, Direction};

/// Maps (codec, direction) to the backend component identifier
#[derive(Debug, Clone)]
pub struct ComponentTable {
    encode: HashMap<Codec, &'static str>,
    decode: HashMap<Codec, &'static str>,
}

impl ComponentTable {
    pub fn new() -> Self {
        let encode = HashMap::from([
            (Codec::H264, "AMFVideoEncoderVCE_AVC"),
            (Codec::Hevc, "AMFVideoEncoder_HEVC"),
        ]);
        let decode = HashMap::from([
            (Codec::H264, "AMFVideoDecoderUVD_H264_AVC"),
            (Codec::Hevc, "AMFVideoDecoderHW_H265_HEVC"),
            (Codec::Mpeg2, "AMFVideoDecoderUVD_MPEG2"),
        ]);
        Self { encode, decode }
    }

    pub fn component_id(&self, codec: Codec, direction: Direction) -> Option<&'static str> {
        match direction {
            Direction::Encode => self.encode.get(&codec).copied(),
            Direction::Decode => self.decode.get(&codec).copied(),
        }
    }

    /// Codecs with a component for `direction`, in `Codec::ALL` order
    pub fn codecs(&self, direction: Direction) -> Vec<Codec> {
        Codec::ALL
            .into_iter()
            .filter(|c| self.component_id(*c, direction).is_some())
            .collect()
    }
}

impl Default for ComponentTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpeg2_is_decode_only() {
        let table = ComponentTable::new();
        assert_eq!(table.component_id(Codec::Mpeg2, Direction::Encode), None);
        assert!(table.component_id(Codec::Mpeg2, Direction::Decode).is_some());
        assert_eq!(table.codecs(Direction::Encode), vec![Codec::H264, Codec::Hevc]);
        assert_eq!(table.codecs(Direction::Decode).len(), 3);
    }
}
