use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected when sniffing for binary content
const SNIFF_BYTES: usize = 2048;

/// Share of non-text bytes above which a file counts as binary
const NON_TEXT_RATIO: f64 = 0.30;

/// Check if a file is binary
///
/// A file is binary when its first 2 KiB contain a NUL byte or more than
/// 30% of bytes outside the text set (BEL, BS, TAB, LF, FF, CR, ESC and
/// everything from 0x20 upward). Unreadable files count as binary.
pub fn is_binary_file(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return true,
    };

    let mut buffer = [0u8; SNIFF_BYTES];
    let bytes_read = match file.read(&mut buffer) {
        Ok(n) => n,
        Err(_) => return true,
    };

    is_binary_content(&buffer[..bytes_read])
}

/// Same heuristic over an in-memory prefix
pub fn is_binary_content(data: &[u8]) -> bool {
    let data = &data[..data.len().min(SNIFF_BYTES)];

    // Empty file is not binary
    if data.is_empty() {
        return false;
    }

    if data.contains(&0) {
        return true;
    }

    let non_text = data.iter().filter(|&&b| !is_text_byte(b)).count();
    (non_text as f64 / data.len() as f64) > NON_TEXT_RATIO
}

#[inline]
fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7 | 8 | 9 | 10 | 12 | 13 | 27 | 0x20..=0xFF)
}
