//! WAV framing for HTTP responses
//!
//! The proxy forwards raw PCM; WAV headers are added only at the HTTP edge.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

use tts_proxy_core::AudioFormat;

/// Placeholder size for headers written before the length is known
const UNKNOWN_SIZE: u32 = 0xFFFF_FFFF;

/// 44-byte PCM WAV header with unknown RIFF and data sizes
pub fn streaming_header(format: AudioFormat) -> Bytes {
    let mut header = BytesMut::with_capacity(44);
    header.put_slice(b"RIFF");
    header.put_u32_le(UNKNOWN_SIZE);
    header.put_slice(b"WAVE");
    header.put_slice(b"fmt ");
    header.put_u32_le(16);
    header.put_u16_le(1);
    header.put_u16_le(format.channels);
    header.put_u32_le(format.rate);
    header.put_u32_le(format.byte_rate());
    header.put_u16_le(format.block_align());
    header.put_u16_le(format.bits_per_sample());
    header.put_slice(b"data");
    header.put_u32_le(UNKNOWN_SIZE);
    header.freeze()
}

/// Complete WAV file for buffered little-endian PCM
pub fn encode(format: AudioFormat, pcm: &[u8]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.rate,
        bits_per_sample: format.bits_per_sample(),
        sample_format: hound::SampleFormat::Int,
    };

    let frame = usize::from(format.block_align()).max(1);
    let trailing = pcm.len() % frame;
    if trailing > 0 {
        tracing::warn!(
            trailing_bytes = trailing,
            frame_bytes = frame,
            "PCM does not end on a frame boundary; dropping the partial frame"
        );
    }
    let pcm = &pcm[..pcm.len() - trailing];

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    match format.width {
        // 8-bit PCM is unsigned on the wire
        1 => {
            for &sample in pcm {
                writer.write_sample((sample as i16 - 128) as i8)?;
            }
        }
        2 => {
            for sample in pcm.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
            }
        }
        3 => {
            for sample in pcm.chunks_exact(3) {
                writer.write_sample(i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8)?;
            }
        }
        4 => {
            for sample in pcm.chunks_exact(4) {
                writer.write_sample(i32::from_le_bytes([
                    sample[0], sample[1], sample[2], sample[3],
                ]))?;
            }
        }
        _ => return Err(hound::Error::Unsupported),
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}
