use crate::config::{WsConfig, MAX_CONTROL_PAYLOAD};
use crate::error::Error;
use crate::stream::ByteStream;
use rand::random;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub final_fragment: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(final_fragment: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            final_fragment,
            opcode,
            payload,
        }
    }
}

/// XOR the payload with the 4-byte masking key; applying it twice restores
/// the original bytes.
pub(crate) fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Read and validate one frame off the stream.
///
/// `fragment_in_progress` tells the policing rules whether a fragmented data
/// message is being reassembled: while one is, another Text or Binary frame
/// is a protocol violation whatever its FIN bit says. Control frames must be
/// final and carry at most 125 payload bytes. EOF mid-frame surfaces
/// [`Error::IncompleteRead`].
pub async fn read_frame(
    stream: &mut ByteStream,
    fragment_in_progress: bool,
    config: &WsConfig,
) -> Result<Frame, Error> {
    let header = stream.read_exactly(2).await?;

    let final_fragment = (header[0] & 0b10000000) != 0;
    let opcode = OpCode::from(header[0] & 0b00001111)?;

    // RSV1..3 must be zero, no extension is ever negotiated
    if header[0] & 0b01110000 != 0 {
        return Err(Error::ProtocolError("non-zero reserved bits"));
    }

    if opcode.is_control() && !final_fragment {
        return Err(Error::ProtocolError("fragmented control frame"));
    }

    if fragment_in_progress && matches!(opcode, OpCode::Text | OpCode::Binary) {
        return Err(Error::ProtocolError(
            "data frame while a fragmented message is in progress",
        ));
    }

    let masked = (header[1] & 0b10000000) != 0;
    let mut length = (header[1] & 0b01111111) as usize;

    if opcode.is_control() && length > MAX_CONTROL_PAYLOAD {
        return Err(Error::FrameTooLarge);
    }

    if length == 126 {
        let be_bytes = stream.read_exactly(2).await?;
        length = u16::from_be_bytes([be_bytes[0], be_bytes[1]]) as usize;
    } else if length == 127 {
        let be_bytes = stream.read_exactly(8).await?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&be_bytes);
        length = u64::from_be_bytes(buf) as usize;
    }

    if let Some(max) = config.max_frame_size {
        if length > max {
            return Err(Error::MaxFrameSize);
        }
    }

    let mask = if masked {
        let key = stream.read_exactly(4).await?;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    let mut payload = stream.read_exactly(length).await?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Frame::new(final_fragment, opcode, payload))
}

/// Which side of the connection a writer serves. Client writers mask every
/// outbound frame with a fresh random key; server writers never mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Writes frames to the transport. Outbound frames are never fragmented, so
/// the FIN bit is always set.
pub struct FrameWriter<W> {
    transport: W,
    role: Role,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(transport: W, role: Role) -> Self {
        Self { transport, role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.transport
    }

    pub async fn write_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::FrameTooLarge);
        }

        let mask = match self.role {
            Role::Client => Some(random::<[u8; 4]>()),
            Role::Server => None,
        };
        let mask_bit = if mask.is_some() { 0b10000000 } else { 0 };

        let mut header = Vec::with_capacity(14);
        header.push(0b10000000 | opcode.as_u8());

        let len = payload.len();
        if len <= 125 {
            header.push(mask_bit | len as u8);
        } else if len <= 65535 {
            header.push(mask_bit | 126);
            header.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            header.push(mask_bit | 127);
            header.extend_from_slice(&(len as u64).to_be_bytes());
        }

        if let Some(key) = mask {
            header.extend_from_slice(&key);
        }
        self.transport.write_all(&header).await?;

        match mask {
            Some(key) => {
                let mut masked = payload.to_vec();
                apply_mask(&mut masked, key);
                self.transport.write_all(&masked).await?;
            }
            None => self.transport.write_all(payload).await?,
        }
        self.transport.flush().await?;
        Ok(())
    }
}
