//! Frame transport
//!
//! Frame:   [4-byte length BE] [payload]
//! Message: one or more non-empty frames followed by one empty frame
//!
//! The empty frame is the end-of-message marker in both directions, so a
//! client can read a streamed response without knowing its length upfront.

use std::io::{ErrorKind, Read, Write};

/// Largest frame payload accepted from a peer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Largest total payload of one message.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Read one frame. Returns `Ok(None)` on a clean EOF at a frame boundary.
pub fn read_frame<R: Read>(stream: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("Frame too large: {} bytes", len),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(Some(buf))
}

pub fn write_frame<W: Write>(stream: &mut W, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(data)?;
    Ok(())
}

/// Read frames up to the empty end-of-message frame.
///
/// Returns `Ok(None)` when the peer closed the connection between messages;
/// EOF in the middle of a message is an error.
pub fn read_message<R: Read>(stream: &mut R) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    read_message_capped(stream, MAX_MESSAGE_LEN)
}

fn read_message_capped<R: Read>(stream: &mut R, max_len: usize) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut frames = Vec::new();
    let mut total = 0usize;
    loop {
        match read_frame(stream)? {
            Some(frame) if frame.is_empty() => return Ok(Some(frames)),
            Some(frame) => {
                total += frame.len();
                if total > max_len {
                    return Err(std::io::Error::new(
                        ErrorKind::InvalidData,
                        format!("Message too large: more than {} bytes", max_len),
                    ));
                }
                frames.push(frame);
            }
            None if frames.is_empty() => return Ok(None),
            None => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "Connection closed in the middle of a message",
                ))
            }
        }
    }
}

/// Write a complete message: every frame, then the empty terminator.
pub fn write_message<W: Write>(stream: &mut W, frames: &[Vec<u8>]) -> std::io::Result<()> {
    for frame in frames.iter().filter(|f| !f.is_empty()) {
        write_frame(stream, frame)?;
    }
    write_frame(stream, &[])?;
    stream.flush()
}
