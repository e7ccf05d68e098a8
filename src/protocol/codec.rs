use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, ProtocolError};
use super::message::{Argument, Message};

/// OSC strings and arguments are aligned to 4 bytes
const ALIGN: usize = 4;

/// Decodes one datagram into a [`Message`].
///
/// The whole buffer must be consumed: trailing bytes, a truncated argument or
/// an unknown type tag all fail with [`ProtocolError::Malformed`]. Bundles are
/// not supported.
pub fn decode(datagram: &[u8]) -> Result<Message, ProtocolError> {
    if datagram.is_empty() {
        return Err(ProtocolError::malformed("empty datagram"));
    }
    if datagram.len() % ALIGN != 0 {
        return Err(ProtocolError::malformed(format!(
            "length {} is not a multiple of {}",
            datagram.len(),
            ALIGN
        )));
    }
    if datagram[0] == b'#' {
        return Err(ProtocolError::malformed("bundles are not supported"));
    }

    let mut src = datagram;
    let address = read_string(&mut src)?;
    if !address.starts_with('/') {
        return Err(ProtocolError::malformed(format!(
            "address {:?} does not start with '/'",
            address
        )));
    }

    // A bare address is indistinguishable from a truncated message
    if src.is_empty() {
        return Err(ProtocolError::malformed("missing type tag string"));
    }

    let tags = read_string(&mut src)?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(ProtocolError::malformed("type tag string must start with ','"));
    };

    let mut arguments = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let argument = match tag {
            'i' => Argument::Int(read_word(&mut src, tag)? as i32),
            'f' => Argument::Float(f32::from_bits(read_word(&mut src, tag)?)),
            's' => Argument::Str(read_string(&mut src)?),
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown type tag {:?}",
                    other
                )))
            }
        };
        arguments.push(argument);
    }

    if !src.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "{} trailing bytes after arguments",
            src.len()
        )));
    }

    Ok(Message { address, arguments })
}

/// Encodes a message into a freshly allocated buffer
pub fn encode(message: &Message) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(message));
    encode_into(message, &mut dst);
    dst.freeze()
}

/// Encodes a message, appending to `dst`.
///
/// Strings are cut at their first interior NUL so the output always decodes.
pub fn encode_into(message: &Message, dst: &mut BytesMut) {
    dst.reserve(encoded_len(message));
    write_string(&message.address, dst);
    write_string(&message.type_tags(), dst);
    for argument in &message.arguments {
        match argument {
            Argument::Int(v) => dst.put_i32(*v),
            Argument::Float(v) => dst.put_u32(v.to_bits()),
            Argument::Str(s) => write_string(s, dst),
        }
    }
}

fn encoded_len(message: &Message) -> usize {
    let args: usize = message
        .arguments
        .iter()
        .map(|a| match a {
            Argument::Int(_) | Argument::Float(_) => ALIGN,
            Argument::Str(s) => padded_len(s.len()),
        })
        .sum();
    padded_len(message.address.len()) + padded_len(message.arguments.len() + 1) + args
}

/// Length of a string plus its terminator, rounded up to the alignment
fn padded_len(len: usize) -> usize {
    (len + ALIGN) & !(ALIGN - 1)
}

fn write_string(s: &str, dst: &mut BytesMut) {
    let s = s.split('\0').next().unwrap_or_default();
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, padded_len(s.len()) - s.len());
}

fn read_word(src: &mut &[u8], tag: char) -> Result<u32, ProtocolError> {
    if src.remaining() < ALIGN {
        return Err(ProtocolError::malformed(format!(
            "truncated '{}' argument",
            tag
        )));
    }
    Ok(src.get_u32())
}

fn read_string(src: &mut &[u8]) -> Result<String, ProtocolError> {
    let Some(nul) = src.iter().position(|&b| b == 0) else {
        return Err(ProtocolError::malformed("unterminated string"));
    };
    let padded = padded_len(nul);
    if padded > src.len() {
        return Err(ProtocolError::malformed("truncated string padding"));
    }
    if src[nul..padded].iter().any(|&b| b != 0) {
        return Err(ProtocolError::malformed("non-zero string padding"));
    }
    let s = std::str::from_utf8(&src[..nul])
        .map_err(|e| ProtocolError::malformed(format!("invalid UTF-8 string: {}", e)))?
        .to_string();
    src.advance(padded);
    Ok(s)
}

/// Datagram codec: one buffer in, one message out
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // A datagram is always a complete message, so take all of it
        let datagram = src.split_to(src.len());
        Ok(Some(decode(&datagram)?))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst);
        Ok(())
    }
}
