//! Device name normalization

/// Marketing suffixes stripped from adapter names
#[derive(Debug, Clone)]
pub struct VendorSuffixes {
    suffixes: Vec<&'static str>,
}

impl VendorSuffixes {
    pub fn new() -> Self {
        Self {
            suffixes: vec!["(TM)", "(R)", " Series", " Graphics"],
        }
    }

    /// Strip every known suffix and surrounding whitespace
    pub fn normalize(&self, name: &str) -> String {
        let mut out = name.to_string();
        for suffix in &self.suffixes {
            out = out.replace(suffix, "");
        }
        out.trim().to_string()
    }
}

impl Default for VendorSuffixes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let names = VendorSuffixes::new();
        assert_eq!(
            names.normalize("AMD Radeon(TM) RX 7900 XTX Series"),
            "AMD Radeon RX 7900 XTX"
        );
        assert_eq!(names.normalize("AMD Radeon(R) Graphics"), "AMD Radeon");
        assert_eq!(names.normalize("  Plain  "), "Plain");
    }
}
