use armlink_frame::{Message, ProtocolId};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::device::error::{DeviceError, Result};

/// A fixed-layout parameter block.
///
/// Fields are packed without padding, scalars little-endian, floats as their
/// IEEE-754 bit pattern.
pub trait Payload {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the encoded form to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// A parameter block the device also reports back.
pub trait Decode: Payload + Sized {
    /// Decode from `buf`, which holds at least [`Payload::SIZE`] bytes.
    fn decode(buf: &mut &[u8]) -> Self;
}

/// Decode the parameters of `reply` as `T`, checking the length first.
pub fn decode_reply<T: Decode>(reply: &Message) -> Result<T> {
    if reply.params.len() < T::SIZE {
        return Err(short_reply(reply.id, T::SIZE, reply.params.len()));
    }
    let mut params = reply.params.as_ref();
    Ok(T::decode(&mut params))
}

pub(crate) fn short_reply(id: ProtocolId, expected: usize, actual: usize) -> DeviceError {
    DeviceError::InvalidResponse {
        id,
        expected,
        actual,
    }
}

macro_rules! scalar_payload {
    ($($ty:ty => $size:expr, $put:ident, $get:ident;)+) => {
        $(
            impl Payload for $ty {
                const SIZE: usize = $size;

                fn encode(&self, buf: &mut BytesMut) {
                    buf.$put(*self);
                }
            }

            impl Decode for $ty {
                fn decode(buf: &mut &[u8]) -> Self {
                    buf.$get()
                }
            }
        )+
    };
}

scalar_payload! {
    u8 => 1, put_u8, get_u8;
    u16 => 2, put_u16_le, get_u16_le;
    u32 => 4, put_u32_le, get_u32_le;
    u64 => 8, put_u64_le, get_u64_le;
    i32 => 4, put_i32_le, get_i32_le;
    f32 => 4, put_f32_le, get_f32_le;
}

impl Payload for bool {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(buf: &mut &[u8]) -> Self {
        buf.get_u8() != 0
    }
}

impl<T: Payload, const N: usize> Payload for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn encode(&self, buf: &mut BytesMut) {
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(buf: &mut &[u8]) -> Self {
        std::array::from_fn(|_| T::decode(buf))
    }
}

impl<A: Payload, B: Payload> Payload for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn encode(&self, buf: &mut BytesMut) {
        self.0.encode(buf);
        self.1.encode(buf);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(buf: &mut &[u8]) -> Self {
        let a = A::decode(buf);
        (a, B::decode(buf))
    }
}

/// Implements [`Payload`] for a struct by packing its fields in order, and
/// [`Decode`] too unless the struct is marked `encode`.
macro_rules! packed_payload {
    (encode $name:ident { $($field:ident: $ty:ty),+ $(,)? }) => {
        impl $crate::device::payload::Payload for $name {
            const SIZE: usize =
                0 $(+ <$ty as $crate::device::payload::Payload>::SIZE)+;

            fn encode(&self, buf: &mut ::bytes::BytesMut) {
                $( $crate::device::payload::Payload::encode(&self.$field, buf); )+
            }
        }
    };
    ($name:ident { $($field:ident: $ty:ty),+ $(,)? }) => {
        packed_payload!(encode $name { $($field: $ty),+ });

        impl $crate::device::payload::Decode for $name {
            fn decode(buf: &mut &[u8]) -> Self {
                Self {
                    $( $field: <$ty as $crate::device::payload::Decode>::decode(buf), )+
                }
            }
        }
    };
}

/// A `u8`-valued enum on the wire.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, ::serde::Serialize)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value, )+
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> std::result::Result<Self, u8> {
                match value {
                    $( $value => Ok($name::$variant), )+
                    other => Err(other),
                }
            }
        }

        impl $crate::device::payload::Payload for $name {
            const SIZE: usize = 1;

            fn encode(&self, buf: &mut ::bytes::BytesMut) {
                ::bytes::BufMut::put_u8(buf, u8::from(*self));
            }
        }
    };
}

pub(crate) use {packed_payload, wire_enum};

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Sample {
        mode: u8,
        speed: f32,
        flags: [bool; 2],
    }

    packed_payload!(Sample {
        mode: u8,
        speed: f32,
        flags: [bool; 2],
    });

    #[test]
    fn fields_pack_without_padding() {
        assert_eq!(Sample::SIZE, 7);
        let sample = Sample {
            mode: 2,
            speed: 1.5,
            flags: [true, false],
        };
        assert_eq!(
            sample.to_bytes().as_ref(),
            &[0x02, 0x00, 0x00, 0xC0, 0x3F, 0x01, 0x00]
        );
    }

    #[test]
    fn decode_reply_checks_length() {
        let reply = Message::new(ProtocolId::GetPoseL, false, false, vec![0x00, 0x00]);
        let err = decode_reply::<f32>(&reply).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InvalidResponse {
                id: ProtocolId::GetPoseL,
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn decode_reply_ignores_trailing_bytes() {
        let reply = Message::new(
            ProtocolId::QueuedCmdLeftSpace,
            false,
            false,
            vec![0x20, 0x00, 0x00, 0x00, 0xFF],
        );
        assert_eq!(decode_reply::<u32>(&reply).unwrap(), 32);
    }

    #[test]
    fn nonzero_byte_decodes_as_true() {
        let mut bytes: &[u8] = &[0x02];
        assert!(bool::decode(&mut bytes));
    }
}
