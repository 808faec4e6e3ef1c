use std::fmt;
use std::time::Duration;

/// Throughput figures of one completed run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeStats {
    pub frames_submitted: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    pub keyframes: u64,
    /// Submissions retried after `InputFull`
    pub input_full_retries: u64,
    /// Packets that completed ahead of an earlier frame
    pub reordered_packets: u64,
    /// Nominal stream frame rate
    pub frame_rate: f64,
    pub elapsed: Duration,
}

impl EncodeStats {
    /// Encoded frames per wall-clock second
    pub fn encode_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.packets_written as f64 / secs
        } else {
            0.0
        }
    }

    /// Average stream bitrate at the nominal frame rate
    pub fn bitrate_kbps(&self) -> f64 {
        if self.packets_written == 0 || self.frame_rate <= 0.0 {
            return 0.0;
        }
        let duration = self.packets_written as f64 / self.frame_rate;
        self.bytes_written as f64 * 8.0 / duration / 1000.0
    }
}

impl fmt::Display for EncodeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "encoded {} frames, {} bytes in {:.2} secs, {:.2} fps, {:.2} kbps",
            self.packets_written,
            self.bytes_written,
            self.elapsed.as_secs_f64(),
            self.encode_fps(),
            self.bitrate_kbps()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let stats = EncodeStats {
            packets_written: 30,
            bytes_written: 3750,
            frame_rate: 30.0,
            elapsed: Duration::from_millis(500),
            ..Default::default()
        };
        assert!((stats.encode_fps() - 60.0).abs() < 1e-9);
        // 3750 bytes over one second of stream
        assert!((stats.bitrate_kbps() - 30.0).abs() < 1e-9);
        assert_eq!(
            stats.to_string(),
            "encoded 30 frames, 3750 bytes in 0.50 secs, 60.00 fps, 30.00 kbps"
        );
    }

    #[test]
    fn test_empty_run() {
        let stats = EncodeStats::default();
        assert_eq!(stats.encode_fps(), 0.0);
        assert_eq!(stats.bitrate_kbps(), 0.0);
    }
}
