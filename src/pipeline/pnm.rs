//! Split a concatenated PNM stream into individual page frames.
//!
//! In streaming mode the raster tool writes every page to stdout back to back
//! (`P6 …pixels… P6 …pixels…`). Frame boundaries are found by parsing each
//! header and skipping exactly `width × height × bytes-per-pixel` bytes; the
//! pixel data itself is never inspected.

use crate::error::PipelineError;

/// Split `data` into one byte slice per frame, each including its header.
///
/// Returns an error describing the offset of the first malformed frame.
/// Empty input yields no frames.
pub fn split_frames(data: &[u8]) -> Result<Vec<&[u8]>, PipelineError> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if data[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let len = frame_len(&data[pos..]).map_err(|detail| {
            PipelineError::InvalidInput(format!("malformed PNM frame at byte {pos}: {detail}"))
        })?;
        frames.push(&data[pos..pos + len]);
        pos += len;
    }
    Ok(frames)
}

/// Total length (header + raster) of the frame at the start of `data`.
fn frame_len(data: &[u8]) -> Result<usize, String> {
    if data.len() < 2 || data[0] != b'P' {
        return Err("missing 'P' magic".into());
    }
    let channels = match data[1] {
        b'4' => 0,
        b'5' => 1,
        b'6' => 3,
        other => return Err(format!("unsupported PNM kind 'P{}'", other as char)),
    };

    let mut cursor = Cursor { data, pos: 2 };
    let width = cursor.number()?;
    let height = cursor.number()?;
    let bytes_per_sample = if channels == 0 {
        1
    } else {
        match cursor.number()? {
            0 => return Err("maxval is zero".into()),
            1..=255 => 1,
            256..=65535 => 2,
            m => return Err(format!("maxval {m} out of range")),
        }
    };
    // Exactly one whitespace byte separates the header from the raster.
    if !cursor.peek().is_some_and(|b| b.is_ascii_whitespace()) {
        return Err("header not terminated by whitespace".into());
    }
    let header = cursor.pos + 1;

    let raster = if channels == 0 {
        width.div_ceil(8).checked_mul(height)
    } else {
        width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(channels * bytes_per_sample))
    }
    .ok_or_else(|| "dimensions overflow".to_string())?;

    let total = header + raster;
    if total > data.len() {
        return Err(format!(
            "truncated raster: need {raster} bytes, have {}",
            data.len() - header
        ));
    }
    Ok(total)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_separators(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'#' {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn number(&mut self) -> Result<usize, String> {
        self.skip_separators();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("expected a number at header offset {start}"));
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| "header number out of range".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: usize, height: usize, fill: u8) -> Vec<u8> {
        let mut v = format!("P5\n{width} {height}\n255\n").into_bytes();
        v.extend(std::iter::repeat(fill).take(width * height));
        v
    }

    #[test]
    fn splits_concatenated_frames() {
        let mut data = gray(3, 2, 1);
        data.extend(gray(1, 1, 2));
        data.extend(gray(2, 2, 3));
        let frames = split_frames(&data).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), "P5\n3 2\n255\n".len() + 6);
        assert_eq!(*frames[1].last().unwrap(), 2);
    }

    #[test]
    fn rgb_and_comments() {
        let mut data = b"P6\n# created by test\n2 1\n255\n".to_vec();
        data.extend([0u8; 6]);
        let frames = split_frames(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), data.len());
    }

    #[test]
    fn sixteen_bit_samples() {
        let mut data = b"P5 2 2 65535\n".to_vec();
        data.extend([0u8; 8]);
        assert_eq!(split_frames(&data).unwrap().len(), 1);
    }

    #[test]
    fn bitmap_rows_are_padded() {
        let mut data = b"P4\n9 2\n".to_vec();
        data.extend([0u8; 4]);
        assert_eq!(split_frames(&data).unwrap()[0].len(), data.len());
    }

    #[test]
    fn empty_input_has_no_frames() {
        assert!(split_frames(b"").unwrap().is_empty());
        assert!(split_frames(b"\n").unwrap().is_empty());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut data = gray(4, 4, 0);
        data.truncate(data.len() - 1);
        let err = split_frames(&data).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(split_frames(b"%PDF-1.4").is_err());
        assert!(split_frames(b"P3\n1 1\n255\n0 0 0").is_err());
    }
}
