//! レコードストリームの読み取り
//!
//! ヘッダ行を確認したあと、(タグvarint, 本体) の並びをEOFタグまで消費して
//! RawDumpを構築します。整数はbase-128 varint、文字列は長さ接頭辞付き
//! バイト列、真偽値は1バイトです。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::endian::ByteOrder;
use crate::error::FormatError;
use crate::record::*;
use crate::Result;

/// フォーマットバージョンを識別するヘッダ行
const HEADER: &[u8] = b"go1.3 heap dump\n";

/// ダンプファイルリーダー
pub struct DumpReader;

impl DumpReader {
    /// ファイルからダンプを読み取る
    ///
    /// ファイルハンドルは読み取りの間だけ保持され、終了時（エラー時含む）に
    /// 解放されます。
    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<RawDump> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open dump file {:?}: {}", path, e))?;
        Self::read(BufReader::new(file))
    }

    /// 任意のストリームからダンプを読み取る
    pub fn read<R: BufRead>(mut r: R) -> Result<RawDump> {
        read_header(&mut r)?;

        let mut d = RawDump::default();
        loop {
            let tag = read_uvarint(&mut r)?;
            match tag {
                TAG_EOF => break,
                TAG_OBJECT => {
                    let addr = read_uvarint(&mut r)?;
                    let type_addr = read_uvarint(&mut r)?;
                    let kind = ObjectKind::from_u64(read_uvarint(&mut r)?);
                    let size = read_uvarint(&mut r)?;
                    let data = read_bytes(&mut r, size)?;
                    d.objects.push(RawObject {
                        addr,
                        type_addr,
                        kind,
                        data,
                    });
                }
                TAG_STACK_ROOT => {
                    d.stack_roots.push(RawStackRoot {
                        from_addr: read_uvarint(&mut r)?,
                        to_addr: read_uvarint(&mut r)?,
                        frame_addr: read_uvarint(&mut r)?,
                        depth: read_uvarint(&mut r)?,
                    });
                }
                TAG_DATA_ROOT => {
                    d.data_roots.push(RawDataRoot {
                        from_addr: read_uvarint(&mut r)?,
                        to_addr: read_uvarint(&mut r)?,
                    });
                }
                TAG_OTHER_ROOT => {
                    d.other_roots.push(RawOtherRoot {
                        description: read_string(&mut r)?,
                        to_addr: read_uvarint(&mut r)?,
                    });
                }
                TAG_TYPE => {
                    let addr = read_uvarint(&mut r)?;
                    let size = read_uvarint(&mut r)?;
                    let name = read_string(&mut r)?;
                    let eface_ptr = read_bool(&mut r)?;
                    let nptr = read_uvarint(&mut r)?;
                    let mut fields = Vec::with_capacity(nptr as usize);
                    for _ in 0..nptr {
                        let kind = FieldKind::from_u64(read_uvarint(&mut r)?);
                        let offset = read_uvarint(&mut r)?;
                        fields.push(Field { kind, offset });
                    }
                    d.types.push(RawType {
                        addr,
                        size,
                        name,
                        eface_ptr,
                        fields,
                    });
                }
                TAG_GOROUTINE => {
                    d.goroutines.push(RawGoRoutine {
                        addr: read_uvarint(&mut r)?,
                        tos_addr: read_uvarint(&mut r)?,
                        goid: read_uvarint(&mut r)?,
                        gopc: read_uvarint(&mut r)?,
                        status: read_uvarint(&mut r)?,
                        is_system: read_bool(&mut r)?,
                        is_background: read_bool(&mut r)?,
                        wait_since: read_uvarint(&mut r)?,
                        wait_reason: read_string(&mut r)?,
                        ctxt_addr: read_uvarint(&mut r)?,
                        m_addr: read_uvarint(&mut r)?,
                    });
                }
                TAG_STACK_FRAME => {
                    let addr = read_uvarint(&mut r)?;
                    let depth = read_uvarint(&mut r)?;
                    let parent_addr = read_uvarint(&mut r)?;
                    let entry = read_uvarint(&mut r)?;
                    let pc = read_uvarint(&mut r)?;
                    let name = read_string(&mut r)?;
                    // 生フレームデータは現状使い道がないため読み捨てる
                    read_string(&mut r)?;
                    d.frames.push(RawStackFrame {
                        addr,
                        depth,
                        parent_addr,
                        entry,
                        pc,
                        name,
                    });
                }
                TAG_PARAMS => {
                    let order = if read_uvarint(&mut r)? == 0 {
                        ByteOrder::Little
                    } else {
                        ByteOrder::Big
                    };
                    d.params = Some(Params {
                        order,
                        ptr_size: read_uvarint(&mut r)?,
                        h_chan_size: read_uvarint(&mut r)?,
                        heap_start: read_uvarint(&mut r)?,
                        heap_end: read_uvarint(&mut r)?,
                        arch_char: read_uvarint(&mut r)? as u8,
                        experiment: read_string(&mut r)?,
                        ncpu: read_uvarint(&mut r)?,
                    });
                }
                TAG_FINALIZER => {
                    d.finalizers.push(RawFinalizer {
                        obj: read_uvarint(&mut r)?,
                        fn_addr: read_uvarint(&mut r)?,
                        code: read_uvarint(&mut r)?,
                        fint: read_uvarint(&mut r)?,
                        ot: read_uvarint(&mut r)?,
                    });
                }
                TAG_ITAB => {
                    d.itabs.push(RawItab {
                        addr: read_uvarint(&mut r)?,
                        ptr: read_bool(&mut r)?,
                    });
                }
                TAG_OS_THREAD => {
                    d.os_threads.push(RawOsThread {
                        addr: read_uvarint(&mut r)?,
                        id: read_uvarint(&mut r)?,
                        proc_id: read_uvarint(&mut r)?,
                    });
                }
                TAG_MEM_STATS => {
                    d.mem_stats = Some(read_mem_stats(&mut r)?);
                }
                other => return Err(FormatError::UnknownRecord(other).into()),
            }
        }

        debug!(
            objects = d.objects.len(),
            types = d.types.len(),
            frames = d.frames.len(),
            goroutines = d.goroutines.len(),
            "dump records read"
        );
        Ok(d)
    }
}

/// ヘッダ行を検証する
fn read_header<R: BufRead>(r: &mut R) -> Result<()> {
    let mut line = Vec::with_capacity(HEADER.len());
    r.read_until(b'\n', &mut line)
        .map_err(|e| anyhow::anyhow!("Failed to read dump header: {}", e))?;
    if line != HEADER {
        return Err(FormatError::UnknownFormat.into());
    }
    Ok(())
}

/// 1バイト読み取る。EOFはMalformed。
fn read_byte<R: BufRead>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    match r.read_exact(&mut b) {
        Ok(()) => Ok(b[0]),
        Err(_) => Err(FormatError::Malformed("unexpected end of stream".into()).into()),
    }
}

/// base-128 varintを読み取る
///
/// 7bitずつリトルエンディアンで、最上位ビットが継続フラグ。
/// 64bitを超える値はMalformed。
fn read_uvarint<R: BufRead>(r: &mut R) -> Result<u64> {
    let mut x: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let b = read_byte(r)?;
        if shift == 63 && b > 1 {
            return Err(FormatError::Malformed("varint overflows 64 bits".into()).into());
        }
        x |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok(x);
        }
        shift += 7;
        if shift > 63 {
            return Err(FormatError::Malformed("varint overflows 64 bits".into()).into());
        }
    }
}

/// nバイトを読み取る
fn read_bytes<R: BufRead>(r: &mut R, n: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n as usize];
    r.read_exact(&mut buf)
        .map_err(|_| FormatError::Malformed(format!("record body truncated ({} bytes)", n)))?;
    Ok(buf)
}

/// 長さ接頭辞付き文字列を読み取る
fn read_string<R: BufRead>(r: &mut R) -> Result<String> {
    let n = read_uvarint(r)?;
    let bytes = read_bytes(r, n)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 1バイト真偽値を読み取る（0以外はtrue）
fn read_bool<R: BufRead>(r: &mut R) -> Result<bool> {
    Ok(read_byte(r)? != 0)
}

/// メモリ統計レコードを読み取る
///
/// フィールドの並びは固定で、256要素のGC停止ヒストグラムを含みます。
fn read_mem_stats<R: BufRead>(r: &mut R) -> Result<MemStats> {
    let mut s = MemStats {
        alloc: read_uvarint(r)?,
        total_alloc: read_uvarint(r)?,
        sys: read_uvarint(r)?,
        lookups: read_uvarint(r)?,
        mallocs: read_uvarint(r)?,
        frees: read_uvarint(r)?,
        heap_alloc: read_uvarint(r)?,
        heap_sys: read_uvarint(r)?,
        heap_idle: read_uvarint(r)?,
        heap_inuse: read_uvarint(r)?,
        heap_released: read_uvarint(r)?,
        heap_objects: read_uvarint(r)?,
        stack_inuse: read_uvarint(r)?,
        stack_sys: read_uvarint(r)?,
        mspan_inuse: read_uvarint(r)?,
        mspan_sys: read_uvarint(r)?,
        mcache_inuse: read_uvarint(r)?,
        mcache_sys: read_uvarint(r)?,
        buck_hash_sys: read_uvarint(r)?,
        gc_sys: read_uvarint(r)?,
        other_sys: read_uvarint(r)?,
        next_gc: read_uvarint(r)?,
        last_gc: read_uvarint(r)?,
        pause_total_ns: read_uvarint(r)?,
        pause_ns: Box::new([0u64; 256]),
        num_gc: 0,
    };
    for i in 0..256 {
        s.pause_ns[i] = read_uvarint(r)?;
    }
    s.num_gc = read_uvarint(r)? as u32;
    Ok(s)
}
