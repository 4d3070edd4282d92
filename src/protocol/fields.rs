//! Scalar field codec
//!
//! Typed reads and writes on a [`Packet`] body. Every multi-byte number goes
//! through [`NetworkOrder`], so byte order is decided in exactly one place.
//! Zero coding is handled underneath by [`Packet::write_bytes`] and
//! [`Packet::read_bytes`].

use uuid::Uuid;

use super::types::{Quaternion, Vector3, Vector3d, Vector4};
use super::{CodecError, CodecResult, Packet};

/// Conversion between a numeric value and its big-endian wire bytes.
pub trait NetworkOrder: Sized + Copy {
    const SIZE: usize;

    /// Write `self` into `out[..SIZE]`.
    fn to_network(self, out: &mut [u8]);

    /// Read a value from `bytes[..SIZE]`.
    fn from_network(bytes: &[u8]) -> Self;
}

macro_rules! network_order {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NetworkOrder for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn to_network(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_be_bytes());
                }

                #[inline]
                fn from_network(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_be_bytes(raw)
                }
            }
        )*
    };
}

network_order!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

const SCALAR_MAX: usize = 8;

macro_rules! scalar_accessors {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            pub fn $read(&mut self) -> CodecResult<$ty> {
                self.read_scalar::<$ty>()
            }

            pub fn $write(&mut self, value: $ty) -> CodecResult<()> {
                self.write_scalar(value)
            }
        )*
    };
}

impl Packet {
    fn write_scalar<T: NetworkOrder>(&mut self, value: T) -> CodecResult<()> {
        let mut raw = [0u8; SCALAR_MAX];
        value.to_network(&mut raw);
        self.write_bytes(&raw[..T::SIZE])
    }

    fn read_scalar<T: NetworkOrder>(&mut self) -> CodecResult<T> {
        let mut raw = [0u8; SCALAR_MAX];
        self.read_bytes(&mut raw[..T::SIZE])?;
        Ok(T::from_network(&raw))
    }

    scalar_accessors! {
        u8 => read_u8, write_u8;
        i8 => read_i8, write_i8;
        u16 => read_u16, write_u16;
        i16 => read_i16, write_i16;
        u32 => read_u32, write_u32;
        i32 => read_i32, write_i32;
        u64 => read_u64, write_u64;
        i64 => read_i64, write_i64;
        f32 => read_f32, write_f32;
        f64 => read_f64, write_f64;
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        self.write_u8(value as u8)
    }

    /// 16 raw bytes, never byte swapped
    pub fn read_uuid(&mut self) -> CodecResult<Uuid> {
        let mut raw = [0u8; 16];
        self.read_bytes(&mut raw)?;
        Ok(Uuid::from_bytes(raw))
    }

    pub fn write_uuid(&mut self, value: &Uuid) -> CodecResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Text with an 8-bit length prefix that counts the trailing NUL
    pub fn read_string8(&mut self) -> CodecResult<String> {
        let len = self.read_u8()? as usize;
        self.read_text(len)
    }

    pub fn write_string8(&mut self, value: &str) -> CodecResult<()> {
        let len = text_len(value, u8::MAX as usize)?;
        self.write_u8(len as u8)?;
        self.write_text(value)
    }

    /// Text with a 16-bit length prefix that counts the trailing NUL
    pub fn read_string16(&mut self) -> CodecResult<String> {
        let len = self.read_u16()? as usize;
        self.read_text(len)
    }

    pub fn write_string16(&mut self, value: &str) -> CodecResult<()> {
        let len = text_len(value, u16::MAX as usize)?;
        self.write_u16(len as u16)?;
        self.write_text(value)
    }

    fn read_text(&mut self, len: usize) -> CodecResult<String> {
        if len > self.readable_bound() {
            return Err(CodecError::BufferOverrun {
                offset: self.len() - self.remaining(),
                needed: len,
                limit: self.len(),
            });
        }
        let mut raw = vec![0u8; len];
        self.read_bytes(&mut raw)?;
        if raw.last() == Some(&0) {
            raw.pop();
        }
        String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
    }

    fn write_text(&mut self, value: &str) -> CodecResult<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    pub fn read_vector3(&mut self) -> CodecResult<Vector3> {
        Ok(Vector3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn write_vector3(&mut self, value: &Vector3) -> CodecResult<()> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)
    }

    pub fn read_vector3d(&mut self) -> CodecResult<Vector3d> {
        Ok(Vector3d::new(self.read_f64()?, self.read_f64()?, self.read_f64()?))
    }

    pub fn write_vector3d(&mut self, value: &Vector3d) -> CodecResult<()> {
        self.write_f64(value.x)?;
        self.write_f64(value.y)?;
        self.write_f64(value.z)
    }

    pub fn read_vector4(&mut self) -> CodecResult<Vector4> {
        Ok(Vector4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn write_vector4(&mut self, value: &Vector4) -> CodecResult<()> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)?;
        self.write_f32(value.z)?;
        self.write_f32(value.w)
    }

    /// Three floats; `w` is rebuilt on read.
    pub fn read_quaternion(&mut self) -> CodecResult<Quaternion> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Quaternion::from_xyz(x, y, z))
    }

    pub fn write_quaternion(&mut self, value: &Quaternion) -> CodecResult<()> {
        let q = value.normalized();
        self.write_f32(q.x)?;
        self.write_f32(q.y)?;
        self.write_f32(q.z)
    }
}

fn text_len(value: &str, max: usize) -> CodecResult<usize> {
    let len = value.len() + 1;
    if len > max {
        return Err(CodecError::StringTooLong { len, max });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packet(zero_coded: bool) -> Packet {
        let mut packet = Packet::new();
        packet.set_zero_coded(zero_coded);
        packet
    }

    #[test]
    fn test_big_endian_on_the_wire() {
        let mut p = packet(false);
        p.write_u32(0x0102_0304).unwrap();
        p.write_i16(-2).unwrap();
        p.write_f32(1.0).unwrap();
        assert_eq!(
            p.body(),
            &[0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE, 0x3F, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_zero_coded_field_shrinks() {
        let mut p = packet(true);
        p.write_u32(0).unwrap();
        p.write_u64(0).unwrap();
        p.write_u8(9).unwrap();
        p.flush().unwrap();
        assert_eq!(p.body(), &[0x00, 12, 9]);

        p.reset();
        assert_eq!(p.read_u32().unwrap(), 0);
        assert_eq!(p.read_u64().unwrap(), 0);
        assert_eq!(p.read_u8().unwrap(), 9);
    }

    #[test]
    fn test_string_layout() {
        let mut p = packet(false);
        p.write_string8("hi").unwrap();
        p.write_string16("").unwrap();
        assert_eq!(p.body(), &[3, b'h', b'i', 0, 0, 1, 0]);

        p.reset();
        assert_eq!(p.read_string8().unwrap(), "hi");
        assert_eq!(p.read_string16().unwrap(), "");
    }

    #[test]
    fn test_string_too_long() {
        let mut p = packet(false);
        let long = "x".repeat(255);
        assert_eq!(
            p.write_string8(&long),
            Err(CodecError::StringTooLong { len: 256, max: 255 })
        );
        assert!(p.write_string16(&long).is_ok());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut p = packet(false);
        p.write_u8(3).unwrap();
        p.write_bytes(&[0xC3, 0x28, 0]).unwrap();
        p.reset();
        assert_eq!(p.read_string8(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_declared_text_longer_than_packet() {
        let mut p = packet(false);
        p.write_u16(500).unwrap();
        p.write_bytes(b"abc").unwrap();
        p.reset();
        assert!(matches!(
            p.read_string16(),
            Err(CodecError::BufferOverrun { needed: 500, .. })
        ));
    }

    #[test]
    fn test_declared_text_longer_than_zero_coded_body() {
        let mut p = packet(true);
        p.write_u16(60_000).unwrap();
        p.write_bytes(b"abc").unwrap();
        p.flush().unwrap();
        p.reset();
        assert!(matches!(
            p.read_string16(),
            Err(CodecError::BufferOverrun { needed: 60_000, .. })
        ));
    }

    #[test]
    fn test_zero_coded_text_within_bound() {
        // 300 NULs collapse to two marker pairs but still read back
        let text = "\0".repeat(299);
        let mut p = packet(true);
        p.write_string16(&text).unwrap();
        p.flush().unwrap();
        p.reset();
        assert_eq!(p.body().len(), 2 + 4);
        assert_eq!(p.read_string16().unwrap().len(), 299);
    }

    #[test]
    fn test_uuid_is_not_swapped() {
        let id = Uuid::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let mut p = packet(false);
        p.write_uuid(&id).unwrap();
        assert_eq!(p.body(), id.as_bytes());
    }

    #[test]
    fn test_quaternion_roundtrip() {
        let q = Quaternion::new(0.0, 0.0, -0.7071068, -0.7071068);
        let mut p = packet(true);
        p.write_quaternion(&q).unwrap();
        p.flush().unwrap();
        p.reset();

        let back = p.read_quaternion().unwrap();
        assert!((back.z - 0.7071068).abs() < 1e-5);
        assert!((back.w - 0.7071068).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_scalar_roundtrip(
            zero_coded in any::<bool>(),
            flag in any::<bool>(),
            (a, b, c, d) in (any::<u8>(), any::<i8>(), any::<u16>(), any::<i16>()),
            (e, f, g, h) in (
                prop_oneof![Just(0u32), any::<u32>()],
                any::<i32>(),
                prop_oneof![Just(0u64), any::<u64>()],
                any::<i64>(),
            ),
            (x, y) in (any::<f32>(), any::<f64>()),
            id in any::<[u8; 16]>(),
            text in "[a-zA-Z0-9 ]{0,40}",
            v in (any::<f32>(), any::<f32>(), any::<f32>()),
            vd in (any::<f64>(), any::<f64>(), any::<f64>()),
        ) {
            let mut p = packet(zero_coded);
            p.write_bool(flag).unwrap();
            p.write_u8(a).unwrap();
            p.write_i8(b).unwrap();
            p.write_u16(c).unwrap();
            p.write_i16(d).unwrap();
            p.write_u32(e).unwrap();
            p.write_i32(f).unwrap();
            p.write_u64(g).unwrap();
            p.write_i64(h).unwrap();
            p.write_f32(x).unwrap();
            p.write_f64(y).unwrap();
            p.write_uuid(&Uuid::from_bytes(id)).unwrap();
            p.write_string8(&text).unwrap();
            p.write_string16(&text).unwrap();
            p.write_vector3(&Vector3::new(v.0, v.1, v.2)).unwrap();
            p.write_vector3d(&Vector3d::new(vd.0, vd.1, vd.2)).unwrap();
            p.write_vector4(&Vector4::new(v.2, v.1, v.0, x)).unwrap();
            p.flush().unwrap();

            let mut p = Packet::parse(p.as_bytes()).unwrap();
            prop_assert_eq!(p.read_bool().unwrap(), flag);
            prop_assert_eq!(p.read_u8().unwrap(), a);
            prop_assert_eq!(p.read_i8().unwrap(), b);
            prop_assert_eq!(p.read_u16().unwrap(), c);
            prop_assert_eq!(p.read_i16().unwrap(), d);
            prop_assert_eq!(p.read_u32().unwrap(), e);
            prop_assert_eq!(p.read_i32().unwrap(), f);
            prop_assert_eq!(p.read_u64().unwrap(), g);
            prop_assert_eq!(p.read_i64().unwrap(), h);
            prop_assert_eq!(p.read_f32().unwrap().to_bits(), x.to_bits());
            prop_assert_eq!(p.read_f64().unwrap().to_bits(), y.to_bits());
            prop_assert_eq!(p.read_uuid().unwrap(), Uuid::from_bytes(id));
            prop_assert_eq!(p.read_string8().unwrap(), text.clone());
            prop_assert_eq!(p.read_string16().unwrap(), text);
            let v3 = p.read_vector3().unwrap();
            prop_assert_eq!(
                (v3.x.to_bits(), v3.y.to_bits(), v3.z.to_bits()),
                (v.0.to_bits(), v.1.to_bits(), v.2.to_bits())
            );
            let v3d = p.read_vector3d().unwrap();
            prop_assert_eq!(
                (v3d.x.to_bits(), v3d.y.to_bits(), v3d.z.to_bits()),
                (vd.0.to_bits(), vd.1.to_bits(), vd.2.to_bits())
            );
            let v4 = p.read_vector4().unwrap();
            prop_assert_eq!(v4.w.to_bits(), x.to_bits());
            prop_assert_eq!(p.remaining(), 0);
        }
    }
}
