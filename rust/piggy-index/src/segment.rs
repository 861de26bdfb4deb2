//! Segment and segment-file naming.

/// Extension of the stored-fields data file.
pub const DATA_EXTENSION: &str = "fdt";

/// Extension of the stored-fields metadata file.
pub const META_EXTENSION: &str = "fdm";

/// Returns the segment name for a writer number: `_` followed by the number in base 36.
pub fn segment_name(number: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    let mut n = number;
    loop {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.push(b'_');
    digits.iter().rev().map(|&d| d as char).collect()
}

pub fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::{segment_file_name, segment_name};

    #[test]
    fn test_segment_name() {
        assert_eq!(segment_name(0), "_0");
        assert_eq!(segment_name(35), "_z");
        assert_eq!(segment_name(36), "_10");
        assert_eq!(segment_name(36 * 36 + 1), "_101");
        assert_eq!(segment_file_name("_a", "fdt"), "_a.fdt");
    }
}
