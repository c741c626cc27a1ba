//! テスト用のダンプストリーム組み立て
//!
//! リーダーが消費するバイト列をレコード単位で組み立てるビルダー。
//! エンコードはリーダーの逆操作（varint、長さ接頭辞付き文字列、1バイト
//! 真偽値）です。

#![allow(dead_code)]

use std::io::Cursor;

use kaede_core::{ByteOrder, Dump};
use kaede_dwarf::GlobalTable;
use kaede_format::DumpReader;

const HEADER: &[u8] = b"go1.3 heap dump\n";

/// バイトオーダーとポインタ幅に従ってポインタ値をエンコードする
pub fn ptr_bytes(order: ByteOrder, ptr_size: u64, v: u64) -> Vec<u8> {
    match (order, ptr_size) {
        (ByteOrder::Little, 4) => (v as u32).to_le_bytes().to_vec(),
        (ByteOrder::Big, 4) => (v as u32).to_be_bytes().to_vec(),
        (ByteOrder::Little, 8) => v.to_le_bytes().to_vec(),
        (ByteOrder::Big, 8) => v.to_be_bytes().to_vec(),
        _ => panic!("unsupported pointer size {}", ptr_size),
    }
}

/// 複数のポインタ値を連結したペイロードを作る
pub fn ptrs(order: ByteOrder, ptr_size: u64, vals: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    for &v in vals {
        out.extend_from_slice(&ptr_bytes(order, ptr_size, v));
    }
    out
}

/// リトルエンディアン8バイトポインタのペイロード（既定の構成）
pub fn le8(vals: &[u64]) -> Vec<u8> {
    ptrs(ByteOrder::Little, 8, vals)
}

/// ダンプストリームビルダー
pub struct DumpBuilder {
    body: Vec<u8>,
}

impl DumpBuilder {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn uvarint(&mut self, mut v: u64) -> &mut Self {
        while v >= 0x80 {
            self.body.push((v as u8 & 0x7f) | 0x80);
            v >>= 7;
        }
        self.body.push(v as u8);
        self
    }

    fn string(&mut self, s: &str) -> &mut Self {
        self.uvarint(s.len() as u64);
        self.body.extend_from_slice(s.as_bytes());
        self
    }

    fn boolean(&mut self, b: bool) -> &mut Self {
        self.body.push(b as u8);
        self
    }

    /// Paramsレコード（タグ10）
    pub fn params(&mut self, order: ByteOrder, ptr_size: u64, h_chan_size: u64) -> &mut Self {
        self.uvarint(10);
        self.uvarint(match order {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        });
        self.uvarint(ptr_size);
        self.uvarint(h_chan_size);
        self.uvarint(0x1000); // heap start
        self.uvarint(0x100000); // heap end
        self.uvarint(b'6' as u64);
        self.string("");
        self.uvarint(1)
    }

    /// 既定のParams（LE、8バイトポインタ、チャネルヘッダ96バイト）
    pub fn params_le8(&mut self) -> &mut Self {
        self.params(ByteOrder::Little, 8, 96)
    }

    /// 型レコード（タグ7）。fieldsは (kind, offset) の列
    pub fn type_rec(
        &mut self,
        addr: u64,
        size: u64,
        name: &str,
        eface_ptr: bool,
        fields: &[(u64, u64)],
    ) -> &mut Self {
        self.uvarint(7);
        self.uvarint(addr);
        self.uvarint(size);
        self.string(name);
        self.boolean(eface_ptr);
        self.uvarint(fields.len() as u64);
        for &(kind, offset) in fields {
            self.uvarint(kind);
            self.uvarint(offset);
        }
        self
    }

    /// オブジェクトレコード（タグ1）。kindは 0:plain 1:array 2:chan
    pub fn object(&mut self, addr: u64, type_addr: u64, kind: u64, data: &[u8]) -> &mut Self {
        self.uvarint(1);
        self.uvarint(addr);
        self.uvarint(type_addr);
        self.uvarint(kind);
        self.uvarint(data.len() as u64);
        self.body.extend_from_slice(data);
        self
    }

    /// ゴルーチンレコード（タグ8）
    pub fn goroutine(&mut self, addr: u64, tos_addr: u64, status: u64, wait: &str) -> &mut Self {
        self.uvarint(8);
        self.uvarint(addr);
        self.uvarint(tos_addr);
        self.uvarint(1); // goid
        self.uvarint(0x400000); // gopc
        self.uvarint(status);
        self.boolean(false);
        self.boolean(false);
        self.uvarint(0); // wait since
        self.string(wait);
        self.uvarint(0); // ctxt
        self.uvarint(0) // m
    }

    /// コンテキストアドレス付きのゴルーチンレコード
    pub fn goroutine_with_ctxt(
        &mut self,
        addr: u64,
        tos_addr: u64,
        status: u64,
        ctxt_addr: u64,
    ) -> &mut Self {
        self.uvarint(8);
        self.uvarint(addr);
        self.uvarint(tos_addr);
        self.uvarint(2); // goid
        self.uvarint(0x400000);
        self.uvarint(status);
        self.boolean(false);
        self.boolean(false);
        self.uvarint(0);
        self.string("");
        self.uvarint(ctxt_addr);
        self.uvarint(0)
    }

    /// スタックフレームレコード（タグ9）
    pub fn frame(&mut self, addr: u64, depth: u64, parent_addr: u64, name: &str) -> &mut Self {
        self.uvarint(9);
        self.uvarint(addr);
        self.uvarint(depth);
        self.uvarint(parent_addr);
        self.uvarint(0x400100); // entry
        self.uvarint(0x400123); // pc
        self.string(name);
        self.string("") // 生フレームデータ
    }

    /// スタックルートレコード（タグ4）
    pub fn stack_root(&mut self, from: u64, to: u64, frame_addr: u64, depth: u64) -> &mut Self {
        self.uvarint(4);
        self.uvarint(from);
        self.uvarint(to);
        self.uvarint(frame_addr);
        self.uvarint(depth)
    }

    /// データルートレコード（タグ5）
    pub fn data_root(&mut self, from: u64, to: u64) -> &mut Self {
        self.uvarint(5);
        self.uvarint(from);
        self.uvarint(to)
    }

    /// その他ルートレコード（タグ6）
    pub fn other_root(&mut self, description: &str, to: u64) -> &mut Self {
        self.uvarint(6);
        self.string(description);
        self.uvarint(to)
    }

    /// itabレコード（タグ12）
    pub fn itab(&mut self, addr: u64, ptr: bool) -> &mut Self {
        self.uvarint(12);
        self.uvarint(addr);
        self.boolean(ptr)
    }

    /// ファイナライザレコード（タグ11）
    pub fn finalizer(&mut self, obj: u64, fn_addr: u64, fint: u64, ot: u64) -> &mut Self {
        self.uvarint(11);
        self.uvarint(obj);
        self.uvarint(fn_addr);
        self.uvarint(0x400200); // code
        self.uvarint(fint);
        self.uvarint(ot)
    }

    /// ヘッダとEOFタグを付けた完全なストリームを得る
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::from(HEADER);
        out.extend_from_slice(&self.body);
        out.push(3); // EOF tag
        out
    }

    /// 読み取りとリンクを実行する（グローバルは匿名）
    pub fn link(&self) -> anyhow::Result<Dump> {
        self.link_with(&GlobalTable::anonymous())
    }

    /// グローバル表を指定して読み取りとリンクを実行する
    pub fn link_with(&self, globals: &GlobalTable) -> anyhow::Result<Dump> {
        let raw = DumpReader::read(Cursor::new(self.bytes()))?;
        kaede_core::link::link(raw, globals)
    }
}
