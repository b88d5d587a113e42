use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::peer::message::{Message, frame_len};

/// Frames peer wire messages on a connection once the handshake is done.
///
/// Keep-alives are consumed silently, so the stream only yields typed messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }

            let len = frame_len(&src[..4])?;
            if src.len() < 4 + len {
                // Wait for the rest of the frame.
                src.reserve(4 + len - src.len());
                return Ok(None);
            }

            let frame = src.split_to(4 + len);
            if let Some(message) = Message::deserialize(&frame)? {
                return Ok(Some(message));
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.serialize());
        Ok(())
    }
}
