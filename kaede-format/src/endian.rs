//! バイトオーダーとワード幅を考慮したペイロード読み取り
//!
//! ダンプのレコードメタデータはすべてvarintですが、オブジェクトペイロードは
//! ダンプ元プロセスのバイトオーダー・ポインタ幅で格納されています。
//! WordReaderはParamsレコードの値で構成し、ペイロード解釈時に使用します。

use crate::error::FormatError;
use crate::Result;

/// ダンプ元プロセスのバイトオーダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// 固定幅ワードの読み取り器
///
/// 各メソッドはスライス先頭からちょうど自分の幅だけを消費します。
/// スライスが短い場合は `FormatError::Malformed` を返します。
#[derive(Debug, Clone, Copy)]
pub struct WordReader {
    order: ByteOrder,
    ptr_size: u64,
}

impl WordReader {
    /// 新しいWordReaderを作成する
    ///
    /// ポインタサイズが4または8以外の場合は
    /// `FormatError::UnsupportedParameters` を返します。
    pub fn new(order: ByteOrder, ptr_size: u64) -> Result<Self> {
        if ptr_size != 4 && ptr_size != 8 {
            return Err(FormatError::UnsupportedParameters(format!(
                "pointer size {} (expected 4 or 8)",
                ptr_size
            ))
            .into());
        }
        Ok(Self { order, ptr_size })
    }

    /// バイトオーダーを取得する
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// ポインタサイズ（バイト数）を取得する
    pub fn ptr_size(&self) -> u64 {
        self.ptr_size
    }

    /// 16bit整数を読み取る
    pub fn read_u16(&self, b: &[u8]) -> Result<u64> {
        let b = take(b, 2)?;
        let v = match self.order {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        };
        Ok(v as u64)
    }

    /// 32bit整数を読み取る
    pub fn read_u32(&self, b: &[u8]) -> Result<u64> {
        let b = take(b, 4)?;
        let v = match self.order {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        };
        Ok(v as u64)
    }

    /// 64bit整数を読み取る
    pub fn read_u64(&self, b: &[u8]) -> Result<u64> {
        let b = take(b, 8)?;
        let arr: [u8; 8] = b[..8].try_into().expect("length checked");
        let v = match self.order {
            ByteOrder::Little => u64::from_le_bytes(arr),
            ByteOrder::Big => u64::from_be_bytes(arr),
        };
        Ok(v)
    }

    /// ネイティブ幅のポインタを読み取る
    ///
    /// ポインタサイズ（4または8）に応じてディスパッチします。
    pub fn read_ptr(&self, b: &[u8]) -> Result<u64> {
        match self.ptr_size {
            4 => self.read_u32(b),
            8 => self.read_u64(b),
            other => Err(FormatError::UnsupportedParameters(format!(
                "pointer size {} (expected 4 or 8)",
                other
            ))
            .into()),
        }
    }
}

/// スライス先頭のnバイトを取り出す。足りなければMalformed。
fn take(b: &[u8], n: usize) -> Result<&[u8]> {
    if b.len() < n {
        return Err(FormatError::Malformed(format!(
            "need {} bytes, have {}",
            n,
            b.len()
        ))
        .into());
    }
    Ok(&b[..n])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16() {
        let le = WordReader::new(ByteOrder::Little, 8).unwrap();
        let be = WordReader::new(ByteOrder::Big, 8).unwrap();
        assert_eq!(le.read_u16(&[0x34, 0x12]).unwrap(), 0x1234);
        assert_eq!(be.read_u16(&[0x12, 0x34]).unwrap(), 0x1234);
    }

    #[test]
    fn test_read_u32() {
        let le = WordReader::new(ByteOrder::Little, 8).unwrap();
        let be = WordReader::new(ByteOrder::Big, 8).unwrap();
        assert_eq!(le.read_u32(&[0x78, 0x56, 0x34, 0x12]).unwrap(), 0x12345678);
        assert_eq!(be.read_u32(&[0x12, 0x34, 0x56, 0x78]).unwrap(), 0x12345678);
    }

    #[test]
    fn test_read_u64() {
        let le = WordReader::new(ByteOrder::Little, 8).unwrap();
        let be = WordReader::new(ByteOrder::Big, 8).unwrap();
        let bytes = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        assert_eq!(le.read_u64(&bytes).unwrap(), 0x8877665544332211);
        assert_eq!(be.read_u64(&bytes).unwrap(), 0x1122334455667788);
    }

    #[test]
    fn test_read_ptr_dispatch() {
        // 4バイトポインタと8バイトポインタの両方で同じ値が読めること
        let bytes = [0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let w4 = WordReader::new(ByteOrder::Little, 4).unwrap();
        let w8 = WordReader::new(ByteOrder::Little, 8).unwrap();
        assert_eq!(w4.read_ptr(&bytes[..4]).unwrap(), 0x2000);
        assert_eq!(w8.read_ptr(&bytes).unwrap(), 0x2000);

        let b4 = WordReader::new(ByteOrder::Big, 4).unwrap();
        assert_eq!(b4.read_ptr(&[0x00, 0x00, 0x20, 0x00]).unwrap(), 0x2000);
    }

    #[test]
    fn test_short_input_is_malformed() {
        let w = WordReader::new(ByteOrder::Little, 8).unwrap();
        let err = w.read_ptr(&[0x01, 0x02]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::Malformed(_))
        ));
    }

    #[test]
    fn test_bad_ptr_size_rejected() {
        let err = WordReader::new(ByteOrder::Little, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::UnsupportedParameters(_))
        ));
    }
}
