use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_message, Message};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 512;
const READ_CHUNK_SIZE: usize = 256;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads and resynchronization internally; callers always
/// get complete, checksum-verified messages.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf) {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_message;
    use crate::protocol::ProtocolId;

    fn wire_of(messages: &[Message]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for msg in messages {
            encode_message(msg, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn read_single_message() {
        let msg = Message::read(ProtocolId::GetPose);
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[msg.clone()])));

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn read_multiple_messages() {
        let one = Message::read(ProtocolId::DeviceSn);
        let two = Message::write(ProtocolId::HomeCmd, vec![0u8; 4]).queued(true);
        let three = Message::write(ProtocolId::AlarmsState, Vec::new());
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[
            one.clone(),
            two.clone(),
            three.clone(),
        ])));

        assert_eq!(reader.read_message().unwrap(), one);
        assert_eq!(reader.read_message().unwrap(), two);
        assert_eq!(reader.read_message().unwrap(), three);
    }

    #[test]
    fn partial_read_handling() {
        let msg = Message::write(ProtocolId::PtpCmd, vec![0x11; 17]).queued(true);
        let byte_reader = ByteByByteReader {
            bytes: wire_of(&[msg.clone()]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn noise_between_messages_is_skipped() {
        let first = Message::read(ProtocolId::GetPose);
        let second = Message::read(ProtocolId::QueuedCmdLeftSpace);
        let mut bytes = vec![0x13, 0x37];
        bytes.extend(wire_of(&[first.clone()]));
        bytes.extend([0xAA, 0x00, 0xFF]);
        bytes.extend(wire_of(&[second.clone()]));

        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });
        assert_eq!(reader.read_message().unwrap(), first);
        assert_eq!(reader.read_message().unwrap(), second);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let partial = vec![0xAA, 0xAA, 0x06, 0x1F, 0x03, 0x00];
        let mut reader = FrameReader::new(Cursor::new(partial));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_read_retries() {
        let msg = Message::read(ProtocolId::DeviceVersion);
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire_of(&[msg.clone()])),
        };
        let mut framed = FrameReader::new(reader);

        assert_eq!(framed.read_message().unwrap(), msg);
    }

    #[test]
    fn read_error_propagates() {
        let mut framed = FrameReader::new(FailingReader);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let msg = Message::write(ProtocolId::EndEffectorGripper, vec![1, 0]).queued(true);
        writer.write_message(&msg).unwrap();

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
