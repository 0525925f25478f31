use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use crc::{Crc, CRC_64_REDIS};

const CHECKSUM: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

pub fn checksum(data: &[u8]) -> u64 {
    let mut digest = CHECKSUM.digest();
    digest.update(data);
    digest.finalize()
}

/// Checked reads on top of [Buf]. The names avoid clashing with `Buf`'s own `try_get_*`
///  methods, which exist only in recent versions of the `bytes` crate.
pub trait BufExt: Buf + VarIntSupport {
    fn try_u8(&mut self) -> anyhow::Result<u8> {
        if !self.has_remaining() {
            bail!("buffer underflow");
        }
        Ok(self.get_u8())
    }

    fn try_u64(&mut self) -> anyhow::Result<u64> {
        if self.remaining() < size_of::<u64>() {
            bail!("buffer underflow");
        }
        Ok(self.get_u64())
    }

    fn try_bool(&mut self) -> anyhow::Result<bool> {
        match self.try_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(anyhow!("invalid value for a boolean: {}", b)),
        }
    }

    fn try_varint_u64(&mut self) -> anyhow::Result<u64> {
        self.try_get_u64_varint()
            .map_err(|e| anyhow!("varint error: {:?}", e))
    }

    fn try_varint_u32(&mut self) -> anyhow::Result<u32> {
        self.try_get_u32_varint()
            .map_err(|e| anyhow!("varint error: {:?}", e))
    }

    fn try_varint_usize(&mut self) -> anyhow::Result<usize> {
        self.try_get_usize_varint()
            .map_err(|e| anyhow!("varint error: {:?}", e))
    }

    /// zig-zag decoding, see [BufMutExt::put_varint_i32]
    fn try_varint_i32(&mut self) -> anyhow::Result<i32> {
        let raw = self.try_varint_u32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    fn try_string(&mut self) -> anyhow::Result<String> {
        let len = self.try_varint_usize()?;
        if self.remaining() < len {
            bail!("buffer underflow: string of length {} with {} bytes remaining", len, self.remaining());
        }
        let bytes = self.copy_to_bytes(len);
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl <T: Buf> BufExt for T {}

pub trait BufMutExt: BufMut + VarIntSupportMut {
    fn put_bool(&mut self, value: bool) {
        self.put_u8(if value { 1 } else { 0 });
    }

    /// zig-zag encoding: small negative numbers (e.g. coordinates) stay short
    fn put_varint_i32(&mut self, value: i32) {
        self.put_u32_varint(((value << 1) ^ (value >> 31)) as u32);
    }

    fn put_string(&mut self, s: &str) {
        self.put_usize_varint(s.len());
        self.put_slice(s.as_bytes());
    }
}

impl <T: BufMut> BufMutExt for T {}

#[cfg(test)]
mod tests {
    use bytes::{Buf, BytesMut};
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::empty("", vec![0])]
    #[case::a("a", vec![1,97])]
    #[case::abc("abc", vec![3,97,98,99])]
    #[case::umlaut("ä", vec![2,0xc3,0xa4])]
    #[case::heart("❤️", vec![6, 226,157,164,239,184,143])]
    fn test_put_string(#[case] s: &str, #[case] expected: Vec<u8>) {
        let mut buf = BytesMut::new();
        buf.put_string(s);
        assert_eq!(&buf, &expected);

        let mut deser_buf = buf.as_ref();
        let deser = deser_buf.try_string().unwrap();
        assert!(deser_buf.is_empty());
        assert_eq!(&deser, s);
    }

    #[test]
    fn test_try_string_remaining() {
        let mut deser_buf: &[u8] = b"\x01abc";
        let actual = deser_buf.try_string().unwrap();
        assert_eq!(&actual, "a");
        assert_eq!(deser_buf.chunk(), b"bc");
    }

    #[test]
    fn test_try_string_too_short() {
        let mut deser_buf: &[u8] = b"\x02a";
        assert!(deser_buf.try_string().is_err());
    }

    #[test]
    fn test_try_string_not_unicode() {
        let mut deser_buf: &[u8] = b"\x02\xc0\xaf";
        assert!(deser_buf.try_string().is_err());
    }

    #[rstest]
    #[case::zero(0, vec![0])]
    #[case::one(1, vec![2])]
    #[case::minus_one(-1, vec![1])]
    #[case::minus_two(-2, vec![3])]
    #[case::large(300, vec![0xd8, 0x04])]
    fn test_varint_i32(#[case] value: i32, #[case] expected: Vec<u8>) {
        let mut buf = BytesMut::new();
        buf.put_varint_i32(value);
        assert_eq!(buf.as_ref(), expected.as_slice());

        let mut deser_buf = buf.as_ref();
        assert_eq!(deser_buf.try_varint_i32().unwrap(), value);
    }

    #[rstest]
    #[case::min(i32::MIN)]
    #[case::max(i32::MAX)]
    fn test_varint_i32_extremes(#[case] value: i32) {
        let mut buf = BytesMut::new();
        buf.put_varint_i32(value);
        let mut deser_buf = buf.as_ref();
        assert_eq!(deser_buf.try_varint_i32().unwrap(), value);
    }

    #[rstest]
    #[case::zero(0, true)]
    #[case::one(1, true)]
    #[case::two(2, false)]
    fn test_try_bool(#[case] raw: u8, #[case] is_valid: bool) {
        let data = [raw];
        let mut deser_buf = data.as_slice();
        assert_eq!(deser_buf.try_bool().is_ok(), is_valid);
    }

    #[test]
    fn test_try_u64_underflow() {
        let mut deser_buf: &[u8] = &[1, 2, 3];
        assert!(deser_buf.try_u64().is_err());
    }

    #[test]
    fn test_checksum_differs() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }
}
